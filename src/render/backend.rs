use crate::assets::decode::PreparedImage;
use crate::foundation::core::{Affine, Point, Rect, Rgba8, Vec2};
use crate::foundation::error::ComposeResult;

/// A rendered frame as RGBA8 pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    /// Whether the `data` is premultiplied alpha.
    pub premultiplied: bool,
}

/// Font request for a text draw.
#[derive(Clone, Debug, PartialEq)]
pub struct FontSpec {
    /// Requested family name.
    pub family: String,
    /// Size in pixels.
    pub size_px: f32,
}

/// Drop shadow painted under filled text.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Shadow {
    /// Shadow color.
    pub color: Rgba8,
    /// Offset from the text position.
    pub offset: Vec2,
    /// Softening radius in pixels.
    pub blur: f32,
}

/// How a text draw is painted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TextPaint {
    /// Outline only, never shadowed.
    Stroke {
        /// Outline color.
        color: Rgba8,
        /// Outline width in pixels.
        width: f32,
    },
    /// Solid fill with an optional shadow.
    Fill {
        /// Fill color.
        color: Rgba8,
        /// Optional shadow.
        shadow: Option<Shadow>,
    },
}

/// The drawing target a job renders into.
///
/// Draw calls accumulate until [`Surface::present`], which returns the finished frame.
pub trait Surface: Send {
    /// Width in pixels.
    fn width(&self) -> u32;
    /// Height in pixels.
    fn height(&self) -> u32;
    /// Change the surface size; drops any pending draws.
    fn resize(&mut self, width: u32, height: u32) -> ComposeResult<()>;
    /// Start a new frame filled with `color`.
    fn clear(&mut self, color: Rgba8);
    /// Draw `image` scaled to cover the whole surface, centered, cropping the overflow.
    fn draw_image_cover(&mut self, image: &PreparedImage) -> ComposeResult<()>;
    /// Fill an axis-aligned rectangle.
    fn fill_rect(&mut self, rect: Rect, color: Rgba8);
    /// Advance width of `text` in `font`.
    fn measure_text(&mut self, text: &str, font: &FontSpec) -> f32;
    /// Draw one line of text whose box is centered on `center`.
    fn draw_text(
        &mut self,
        text: &str,
        center: Point,
        font: &FontSpec,
        paint: &TextPaint,
    ) -> ComposeResult<()>;
    /// Rasterize the pending draws into a frame.
    fn present(&mut self) -> ComposeResult<FrameRGBA>;
}

/// Transform mapping an `img_w`x`img_h` image onto a `dst_w`x`dst_h` target with cover fit.
pub fn cover_transform(img_w: u32, img_h: u32, dst_w: u32, dst_h: u32) -> Affine {
    if img_w == 0 || img_h == 0 {
        return Affine::IDENTITY;
    }
    let (iw, ih) = (f64::from(img_w), f64::from(img_h));
    let (dw, dh) = (f64::from(dst_w), f64::from(dst_h));
    let scale = (dw / iw).max(dh / ih);
    let tx = (dw - iw * scale) / 2.0;
    let ty = (dh - ih * scale) / 2.0;
    Affine::translate((tx, ty)) * Affine::scale(scale)
}

#[cfg(test)]
#[path = "../../tests/unit/render/backend.rs"]
mod tests;
