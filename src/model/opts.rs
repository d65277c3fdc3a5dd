use crate::encode::sink::CaptureFormat;
use crate::foundation::core::{Canvas, Fps, Rgba8};
use crate::foundation::error::{ComposeError, ComposeResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Composer configuration. Every field has a default, so an empty JSON object is valid.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ComposerOpts {
    /// Output surface size.
    pub canvas: Canvas,
    /// Tick and capture rate.
    pub fps: Fps,
    /// Upper bound on a single tick's time delta.
    pub max_tick_delta_ms: u64,
    /// Deadline for a video clip to reach its prefill buffer.
    pub video_load_timeout_ms: u64,
    /// Deadline for an image clip to decode.
    pub image_load_timeout_ms: u64,
    /// Concurrent loads in flight.
    pub load_concurrency: usize,
    /// Layout cache bound before FIFO eviction.
    pub layout_cache_capacity: usize,
    /// Caption width as a fraction of canvas width.
    pub caption_width_ratio: f64,
    /// Mixed audio sample rate.
    pub sample_rate: u32,
    /// Mixed audio channel count.
    pub channels: u16,
    /// Job fails when no frame is produced for this long.
    pub stall_timeout_ms: u64,
    /// Decoded frames a video must buffer before it counts as ready.
    pub min_buffer_frames: usize,
    /// Color the surface is cleared to before each frame.
    pub clear_color: Rgba8,
    /// Capture formats in order of preference.
    pub capture_formats: Vec<CaptureFormat>,
    /// Font file used for captions.
    pub caption_font: Option<PathBuf>,
}

impl Default for ComposerOpts {
    fn default() -> Self {
        Self {
            canvas: Canvas::default(),
            fps: Fps::default(),
            max_tick_delta_ms: 33,
            video_load_timeout_ms: 60_000,
            image_load_timeout_ms: 30_000,
            load_concurrency: 4,
            layout_cache_capacity: 50,
            caption_width_ratio: 0.85,
            sample_rate: 48_000,
            channels: 2,
            stall_timeout_ms: 10_000,
            min_buffer_frames: 8,
            clear_color: Rgba8::BLACK,
            capture_formats: vec![
                CaptureFormat::WebmVp9Opus,
                CaptureFormat::Mp4H264Aac,
                CaptureFormat::RawRgba,
            ],
            caption_font: None,
        }
    }
}

impl ComposerOpts {
    /// Parse options from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> ComposeResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            ComposeError::validation(format!("read composer opts '{}': {e}", path.display()))
        })?;
        let opts: Self = serde_json::from_slice(&bytes)
            .map_err(|e| ComposeError::validation(format!("parse composer opts JSON: {e}")))?;
        opts.validate()?;
        Ok(opts)
    }

    /// Reject nonsensical values.
    pub fn validate(&self) -> ComposeResult<()> {
        Canvas::new(self.canvas.width, self.canvas.height)?;
        Fps::new(self.fps.num, self.fps.den)?;
        if self.max_tick_delta_ms == 0 {
            return Err(ComposeError::validation("max_tick_delta_ms must be > 0"));
        }
        if self.load_concurrency == 0 {
            return Err(ComposeError::validation("load_concurrency must be > 0"));
        }
        if self.layout_cache_capacity == 0 {
            return Err(ComposeError::validation("layout_cache_capacity must be > 0"));
        }
        let r = self.caption_width_ratio;
        if !r.is_finite() || r <= 0.0 || r > 1.0 {
            return Err(ComposeError::validation(
                "caption_width_ratio must be in (0,1]",
            ));
        }
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(ComposeError::validation(
                "sample_rate and channels must be > 0",
            ));
        }
        if self.capture_formats.is_empty() {
            return Err(ComposeError::validation(
                "capture_formats must list at least one format",
            ));
        }
        Ok(())
    }

    /// Caption wrap width for the configured canvas.
    pub fn caption_max_width(&self) -> f32 {
        caption_width_for(self.canvas.width, self.caption_width_ratio)
    }

    /// Clamp applied to each tick delta.
    pub fn max_tick_delta(&self) -> Duration {
        Duration::from_millis(self.max_tick_delta_ms)
    }

    /// Stall watchdog window.
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }
}

/// Caption wrap width for a surface of `surface_width` pixels.
pub(crate) fn caption_width_for(surface_width: u32, ratio: f64) -> f32 {
    (f64::from(surface_width) * ratio).floor() as f32
}
