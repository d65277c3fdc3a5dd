use std::sync::{Arc, Mutex, MutexGuard};

use crate::assets::decode::PreparedImage;
use crate::foundation::core::{Point, Rect, Rgba8};
use crate::foundation::error::{ComposeError, ComposeResult};
use crate::render::backend::{FontSpec, FrameRGBA, Surface, TextPaint};

/// One recorded surface call.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawOp {
    /// `clear(color)`.
    Clear(Rgba8),
    /// `draw_image_cover` of an image of this size.
    Image {
        /// Source width.
        width: u32,
        /// Source height.
        height: u32,
    },
    /// `fill_rect`.
    Rect(Rect, Rgba8),
    /// `draw_text`.
    Text {
        /// Drawn string.
        text: String,
        /// Box center.
        center: Point,
        /// Size in pixels.
        size_px: f32,
        /// Paint used.
        paint: TextPaint,
    },
    /// `present`.
    Present,
}

/// Shared view of a [`RecordingSurface`]'s log, usable after the surface moved into a job.
#[derive(Clone, Debug, Default)]
pub struct SurfaceProbe {
    ops: Arc<Mutex<Vec<DrawOp>>>,
}

impl SurfaceProbe {
    fn lock(&self) -> MutexGuard<'_, Vec<DrawOp>> {
        self.ops.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of everything recorded so far.
    pub fn ops(&self) -> Vec<DrawOp> {
        self.lock().clone()
    }

    /// Drain the recorded ops.
    pub fn take_ops(&self) -> Vec<DrawOp> {
        std::mem::take(&mut *self.lock())
    }

    /// Frames presented so far.
    pub fn presented(&self) -> usize {
        self.lock()
            .iter()
            .filter(|op| matches!(op, DrawOp::Present))
            .count()
    }
}

/// Surface that records calls instead of rasterizing. Text is measured as `size * 0.5` per char.
#[derive(Debug)]
pub struct RecordingSurface {
    width: u32,
    height: u32,
    probe: SurfaceProbe,
    fail_image_draws: usize,
}

impl RecordingSurface {
    /// Recorder reporting `width`x`height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            probe: SurfaceProbe::default(),
            fail_image_draws: 0,
        }
    }

    /// The next `n` image draws fail.
    pub fn fail_image_draws(mut self, n: usize) -> Self {
        self.fail_image_draws = n;
        self
    }

    /// Handle onto the recorded log.
    pub fn probe(&self) -> SurfaceProbe {
        self.probe.clone()
    }

    fn record(&self, op: DrawOp) {
        self.probe.lock().push(op);
    }
}

impl Surface for RecordingSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn resize(&mut self, width: u32, height: u32) -> ComposeResult<()> {
        if width == 0 || height == 0 {
            return Err(ComposeError::validation("surface width/height must be > 0"));
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn clear(&mut self, color: Rgba8) {
        self.record(DrawOp::Clear(color));
    }

    fn draw_image_cover(&mut self, image: &PreparedImage) -> ComposeResult<()> {
        if self.fail_image_draws > 0 {
            self.fail_image_draws -= 1;
            return Err(ComposeError::render("scripted image draw failure"));
        }
        self.record(DrawOp::Image {
            width: image.width,
            height: image.height,
        });
        Ok(())
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba8) {
        self.record(DrawOp::Rect(rect, color));
    }

    fn measure_text(&mut self, text: &str, font: &FontSpec) -> f32 {
        text.chars().count() as f32 * font.size_px * 0.5
    }

    fn draw_text(
        &mut self,
        text: &str,
        center: Point,
        font: &FontSpec,
        paint: &TextPaint,
    ) -> ComposeResult<()> {
        self.record(DrawOp::Text {
            text: text.to_owned(),
            center,
            size_px: font.size_px,
            paint: *paint,
        });
        Ok(())
    }

    fn present(&mut self) -> ComposeResult<FrameRGBA> {
        self.record(DrawOp::Present);
        Ok(FrameRGBA {
            width: self.width,
            height: self.height,
            data: Vec::new(),
            premultiplied: true,
        })
    }
}
