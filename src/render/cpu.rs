use std::path::Path;
use std::sync::Arc;

use crate::assets::decode::PreparedImage;
use crate::foundation::core::{Affine, Point, Rect, Rgba8, Vec2};
use crate::foundation::error::{ComposeError, ComposeResult};
use crate::render::backend::{FontSpec, FrameRGBA, Surface, TextPaint, cover_transform};
use crate::text::engine::{TextLayoutEngine, estimate_text_width};

struct CpuText {
    engine: TextLayoutEngine,
    font: vello_cpu::peniko::FontData,
}

/// CPU raster surface backed by `vello_cpu`, with Parley text shaping.
///
/// Without a registered font, text is measured by estimate and not drawn.
pub struct CpuSurface {
    width: u32,
    height: u32,
    ctx: vello_cpu::RenderContext,
    pixmap: vello_cpu::Pixmap,
    text: Option<CpuText>,
    warned_no_font: bool,
}

impl CpuSurface {
    /// Blank surface of `width`x`height`.
    pub fn new(width: u32, height: u32) -> ComposeResult<Self> {
        let (w, h) = dims_u16(width, height)?;
        Ok(Self {
            width,
            height,
            ctx: vello_cpu::RenderContext::new(w, h),
            pixmap: vello_cpu::Pixmap::new(w, h),
            text: None,
            warned_no_font: false,
        })
    }

    /// Register the caption font from raw bytes.
    pub fn with_font_bytes(mut self, bytes: Vec<u8>) -> ComposeResult<Self> {
        let engine = TextLayoutEngine::new(bytes)?;
        let font = vello_cpu::peniko::FontData::new(
            vello_cpu::peniko::Blob::from(engine.font_bytes().to_vec()),
            0,
        );
        tracing::debug!(family = engine.family_name(), "caption font registered");
        self.text = Some(CpuText { engine, font });
        Ok(self)
    }

    /// Register the caption font from a file.
    pub fn with_font_file(self, path: &Path) -> ComposeResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            ComposeError::validation(format!("read caption font '{}': {e}", path.display()))
        })?;
        self.with_font_bytes(bytes)
    }

    fn draw_glyphs(
        &mut self,
        glyphs: &[vello_cpu::Glyph],
        origin: Vec2,
        size_px: f32,
        color: Rgba8,
        stroke_width: Option<f32>,
    ) {
        let Some(text) = self.text.as_ref() else {
            return;
        };
        self.ctx
            .set_transform(affine_to_cpu(Affine::translate(origin)));
        self.ctx
            .set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        self.ctx.set_paint(color_to_cpu(color));
        let glyphs = glyphs.iter().map(|g| vello_cpu::Glyph {
            id: g.id,
            x: g.x,
            y: g.y,
        });
        match stroke_width {
            Some(w) => {
                self.ctx
                    .set_stroke(vello_cpu::kurbo::Stroke::new(f64::from(w)));
                self.ctx
                    .glyph_run(&text.font)
                    .font_size(size_px)
                    .stroke_glyphs(glyphs);
            }
            None => self
                .ctx
                .glyph_run(&text.font)
                .font_size(size_px)
                .fill_glyphs(glyphs),
        }
    }
}

impl Surface for CpuSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn resize(&mut self, width: u32, height: u32) -> ComposeResult<()> {
        let (w, h) = dims_u16(width, height)?;
        self.ctx = vello_cpu::RenderContext::new(w, h);
        self.pixmap = vello_cpu::Pixmap::new(w, h);
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn clear(&mut self, color: Rgba8) {
        self.ctx.reset();
        self.fill_rect(
            Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height)),
            color,
        );
    }

    fn draw_image_cover(&mut self, image: &PreparedImage) -> ComposeResult<()> {
        let pixmap = pixmap_from_premul_bytes(&image.rgba8_premul, image.width, image.height)?;
        let paint = vello_cpu::Image {
            image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
            sampler: vello_cpu::peniko::ImageSampler::default(),
        };
        let tr = cover_transform(image.width, image.height, self.width, self.height);
        self.ctx.set_transform(affine_to_cpu(tr));
        self.ctx
            .set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        self.ctx.set_paint(paint);
        self.ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            f64::from(image.width),
            f64::from(image.height),
        ));
        Ok(())
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba8) {
        self.ctx
            .set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        self.ctx
            .set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        self.ctx.set_paint(color_to_cpu(color));
        self.ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            rect.x0, rect.y0, rect.x1, rect.y1,
        ));
    }

    fn measure_text(&mut self, text: &str, font: &FontSpec) -> f32 {
        match self.text.as_mut() {
            Some(t) => t
                .engine
                .measure(text, font.size_px)
                .unwrap_or_else(|_| estimate_text_width(text, font.size_px)),
            None => estimate_text_width(text, font.size_px),
        }
    }

    fn draw_text(
        &mut self,
        text: &str,
        center: Point,
        font: &FontSpec,
        paint: &TextPaint,
    ) -> ComposeResult<()> {
        let Some(t) = self.text.as_mut() else {
            if !self.warned_no_font {
                self.warned_no_font = true;
                tracing::warn!("no caption font registered, captions are not drawn");
            }
            return Ok(());
        };
        let layout = t.engine.layout_line(text, font.size_px)?;
        let origin = Vec2::new(
            center.x - f64::from(layout.width()) / 2.0,
            center.y - f64::from(layout.height()) / 2.0,
        );
        let mut glyphs = Vec::new();
        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                glyphs.extend(run.positioned_glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                }));
            }
        }

        match *paint {
            TextPaint::Stroke { color, width } => {
                self.draw_glyphs(&glyphs, origin, font.size_px, color, Some(width));
            }
            TextPaint::Fill { color, shadow } => {
                if let Some(s) = shadow {
                    // Soften by spreading the shadow over a few offsets at reduced alpha.
                    let spread = f64::from(s.blur.max(0.0)) / 2.0;
                    let taps: &[Vec2] = if spread > 0.0 {
                        &[
                            Vec2::new(-spread, -spread),
                            Vec2::new(spread, -spread),
                            Vec2::new(-spread, spread),
                            Vec2::new(spread, spread),
                        ]
                    } else {
                        &[Vec2::ZERO]
                    };
                    let alpha = (u16::from(s.color.a) / taps.len() as u16).max(1) as u8;
                    for tap in taps {
                        self.draw_glyphs(
                            &glyphs,
                            origin + s.offset + *tap,
                            font.size_px,
                            s.color.with_alpha(alpha),
                            None,
                        );
                    }
                }
                self.draw_glyphs(&glyphs, origin, font.size_px, color, None);
            }
        }
        Ok(())
    }

    fn present(&mut self) -> ComposeResult<FrameRGBA> {
        self.ctx.flush();
        self.ctx.render_to_pixmap(&mut self.pixmap);
        self.ctx.reset();
        Ok(FrameRGBA {
            width: self.width,
            height: self.height,
            data: self.pixmap.data_as_u8_slice().to_vec(),
            premultiplied: true,
        })
    }
}

fn dims_u16(width: u32, height: u32) -> ComposeResult<(u16, u16)> {
    if width == 0 || height == 0 {
        return Err(ComposeError::validation("surface width/height must be > 0"));
    }
    let w: u16 = width
        .try_into()
        .map_err(|_| ComposeError::validation("surface width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| ComposeError::validation("surface height exceeds u16"))?;
    Ok((w, h))
}

fn color_to_cpu(c: Rgba8) -> vello_cpu::peniko::Color {
    vello_cpu::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a)
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn pixmap_from_premul_bytes(
    bytes: &[u8],
    width: u32,
    height: u32,
) -> ComposeResult<vello_cpu::Pixmap> {
    let (w, h) = dims_u16(width, height)?;
    if bytes.len()
        != (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(4)
    {
        return Err(ComposeError::render("pixmap byte len mismatch"));
    }
    let pixels = bytes
        .chunks_exact(4)
        .map(|px| vello_cpu::peniko::color::PremulRgba8::from_u8_array([px[0], px[1], px[2], px[3]]))
        .collect::<Vec<_>>();
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels, w, h, true,
    ))
}

#[cfg(test)]
#[path = "../../tests/unit/render/cpu.rs"]
mod tests;
