use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;

use crate::foundation::core::Fps;
use crate::foundation::error::{ComposeError, ComposeResult};
use crate::render::backend::FrameRGBA;

/// Container/codec pairing a sink can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureFormat {
    /// WebM with VP9 video and Opus audio.
    WebmVp9Opus,
    /// Fragmented MP4 with H.264 video and AAC audio.
    Mp4H264Aac,
    /// Uncompressed RGBA frames, video only.
    RawRgba,
}

impl CaptureFormat {
    /// MIME type of the finished asset.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::WebmVp9Opus => "video/webm;codecs=vp9,opus",
            Self::Mp4H264Aac => "video/mp4;codecs=avc1,mp4a",
            Self::RawRgba => "application/x-raw-rgba",
        }
    }

    /// Usual file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::WebmVp9Opus => "webm",
            Self::Mp4H264Aac => "mp4",
            Self::RawRgba => "rgba",
        }
    }
}

/// First entry of `preferred` that `supported` contains.
pub fn negotiate_format(
    preferred: &[CaptureFormat],
    supported: &[CaptureFormat],
) -> Option<CaptureFormat> {
    preferred.iter().copied().find(|f| supported.contains(f))
}

/// Configuration provided to an [`EncodeSink`] when recording starts.
#[derive(Clone, Debug, PartialEq)]
pub struct SinkConfig {
    /// Negotiated output format.
    pub format: CaptureFormat,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Nominal frame rate.
    pub fps: Fps,
    /// Mixed audio sample rate.
    pub sample_rate: u32,
    /// Mixed audio channel count.
    pub channels: u16,
}

/// Encoder consuming captured frames and mixed audio, producing encoded chunks.
///
/// Call order: `begin`, then any interleaving of `push_frame`/`push_audio`/`take_chunks`, then
/// either `finish` followed by `finalize`, or `abort`.
pub trait EncodeSink: Send {
    /// Formats this sink can produce. Empty means capture is unavailable.
    fn supported_formats(&self) -> Vec<CaptureFormat>;
    /// Start recording.
    fn begin(&mut self, cfg: SinkConfig) -> ComposeResult<()>;
    /// Push one frame captured at job time `ts`.
    fn push_frame(&mut self, ts: Duration, frame: &FrameRGBA) -> ComposeResult<()>;
    /// Push interleaved mixed audio.
    fn push_audio(&mut self, samples: &[f32]) -> ComposeResult<()>;
    /// Encoded chunks produced since the last call.
    fn take_chunks(&mut self) -> Vec<Bytes>;
    /// Flush the encoder and return its trailing chunks.
    fn finish(&mut self) -> ComposeResult<Vec<Bytes>>;
    /// Turn every chunk of the recording into the final asset bytes.
    fn finalize(&mut self, chunks: Vec<Bytes>) -> ComposeResult<Bytes> {
        Ok(concat_chunks(&chunks))
    }
    /// Stop without output. Idempotent.
    fn abort(&mut self);
}

/// Creates one fresh sink per job.
pub trait SinkFactory: Send + Sync {
    /// New, not yet begun sink.
    fn create(&self) -> ComposeResult<Box<dyn EncodeSink>>;
}

impl<F> SinkFactory for F
where
    F: Fn() -> ComposeResult<Box<dyn EncodeSink>> + Send + Sync,
{
    fn create(&self) -> ComposeResult<Box<dyn EncodeSink>> {
        self()
    }
}

pub(crate) fn concat_chunks(chunks: &[Bytes]) -> Bytes {
    let len = chunks.iter().map(Bytes::len).sum();
    let mut out = Vec::with_capacity(len);
    for c in chunks {
        out.extend_from_slice(c);
    }
    Bytes::from(out)
}

/// What an [`InMemorySink`] has seen, shared with the test that owns the probe.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SinkLog {
    /// Config passed to `begin`, if it ran.
    pub config: Option<SinkConfig>,
    /// Frames accepted.
    pub frames: u64,
    /// Timestamps of accepted frames.
    pub timestamps: Vec<Duration>,
    /// Interleaved audio samples accepted.
    pub audio_samples: u64,
    /// `finish` ran.
    pub finished: bool,
    /// `abort` ran.
    pub aborted: bool,
}

/// Shared view of an [`InMemorySink`].
#[derive(Clone, Debug, Default)]
pub struct SinkProbe {
    log: Arc<Mutex<SinkLog>>,
}

impl SinkProbe {
    fn lock(&self) -> MutexGuard<'_, SinkLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the log.
    pub fn log(&self) -> SinkLog {
        self.lock().clone()
    }

    /// Whether `begin` ran.
    pub fn begun(&self) -> bool {
        self.lock().config.is_some()
    }
}

/// Sink producing raw RGBA chunks in memory, with failure injection.
#[derive(Debug)]
pub struct InMemorySink {
    formats: Vec<CaptureFormat>,
    fail_after_frames: Option<u64>,
    probe: SinkProbe,
    pending: Vec<Bytes>,
    active: Option<SinkConfig>,
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySink {
    /// Sink supporting [`CaptureFormat::RawRgba`].
    pub fn new() -> Self {
        Self {
            formats: vec![CaptureFormat::RawRgba],
            fail_after_frames: None,
            probe: SinkProbe::default(),
            pending: Vec::new(),
            active: None,
        }
    }

    /// Sink that supports no format.
    pub fn unsupported() -> Self {
        Self {
            formats: Vec::new(),
            ..Self::new()
        }
    }

    /// Writes fail once `n` frames were accepted.
    pub fn fail_after_frames(mut self, n: u64) -> Self {
        self.fail_after_frames = Some(n);
        self
    }

    /// Report to `probe` instead of a private one.
    pub fn with_probe(mut self, probe: SinkProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Shared log handle.
    pub fn probe(&self) -> SinkProbe {
        self.probe.clone()
    }

    fn active(&self) -> ComposeResult<&SinkConfig> {
        self.active
            .as_ref()
            .ok_or_else(|| ComposeError::capture_io("in-memory sink is not recording"))
    }
}

impl EncodeSink for InMemorySink {
    fn supported_formats(&self) -> Vec<CaptureFormat> {
        self.formats.clone()
    }

    fn begin(&mut self, cfg: SinkConfig) -> ComposeResult<()> {
        if !self.formats.contains(&cfg.format) {
            return Err(ComposeError::capture_unsupported(format!(
                "in-memory sink cannot produce {:?}",
                cfg.format
            )));
        }
        self.probe.lock().config = Some(cfg.clone());
        self.active = Some(cfg);
        Ok(())
    }

    fn push_frame(&mut self, ts: Duration, frame: &FrameRGBA) -> ComposeResult<()> {
        let cfg = self.active()?;
        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(ComposeError::capture_io(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        let mut log = self.probe.lock();
        if self.fail_after_frames.is_some_and(|n| log.frames >= n) {
            return Err(ComposeError::capture_io("injected chunk write failure"));
        }
        log.frames += 1;
        log.timestamps.push(ts);
        drop(log);
        self.pending.push(Bytes::copy_from_slice(&frame.data));
        Ok(())
    }

    fn push_audio(&mut self, samples: &[f32]) -> ComposeResult<()> {
        self.active()?;
        self.probe.lock().audio_samples += samples.len() as u64;
        Ok(())
    }

    fn take_chunks(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.pending)
    }

    fn finish(&mut self) -> ComposeResult<Vec<Bytes>> {
        self.active()?;
        self.active = None;
        self.probe.lock().finished = true;
        Ok(self.take_chunks())
    }

    fn abort(&mut self) {
        self.active = None;
        self.pending.clear();
        self.probe.lock().aborted = true;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/sink.rs"]
mod tests;
