use std::sync::Arc;

use crate::foundation::core::{Point, Rect, Rgba8, Vec2};
use crate::model::opts::caption_width_for;
use crate::model::request::{CaptionAnchor, CaptionSpec, CaptionStyle};
use crate::render::backend::{FontSpec, Shadow, Surface, TextPaint};
use crate::text::wrap::SharedLayoutCache;

const LINE_SPACING: f32 = 1.3;
const STROKE_PER_SIZE: f32 = 1.0 / 8.0;
const BACKGROUND_PAD_PER_SIZE: f32 = 0.4;
const OUTLINE_COLOR: Rgba8 = Rgba8::BLACK;
const CAPTION_SHADOW: Shadow = Shadow {
    color: Rgba8::new(0, 0, 0, 153),
    offset: Vec2::new(2.0, 2.0),
    blur: 4.0,
};

/// Vertical center of a caption block as a fraction of surface height.
pub fn anchor_fraction(anchor: CaptionAnchor) -> f64 {
    match anchor {
        CaptionAnchor::Top => 0.15,
        CaptionAnchor::Center => 0.5,
        CaptionAnchor::Bottom => 0.80,
    }
}

/// Draws wrapped, uppercased captions with an outline pass then a shadowed fill pass.
///
/// Never fails: layout or draw faults are logged and the caption is skipped.
#[derive(Clone)]
pub struct CaptionOverlayRenderer {
    cache: SharedLayoutCache,
    width_ratio: f64,
}

impl CaptionOverlayRenderer {
    /// Renderer wrapping at `width_ratio` of the surface width.
    pub fn new(cache: SharedLayoutCache, width_ratio: f64) -> Self {
        Self { cache, width_ratio }
    }

    /// Wrap width for `surface`.
    pub fn max_width_for(&self, surface: &dyn Surface) -> f32 {
        caption_width_for(surface.width(), self.width_ratio)
    }

    /// Move the shared cache to the width band of a resized surface.
    pub fn surface_resized(&self, width: u32) {
        let band = caption_width_for(width, self.width_ratio);
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .set_width_band(band);
    }

    /// Uppercased, wrapped lines for `text`, through the layout cache.
    pub fn layout(
        &self,
        surface: &mut dyn Surface,
        text: &str,
        style: &CaptionStyle,
    ) -> Arc<[String]> {
        let upper = text.to_uppercase();
        let font = font_of(style);
        let max_width = self.max_width_for(surface);
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        match cache.wrap_with_font(&upper, max_width, &font, |s| surface.measure_text(s, &font)) {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!(error = %e, "caption layout failed, skipping caption");
                Arc::from(Vec::new())
            }
        }
    }

    /// Lay out and draw `caption`.
    pub fn draw_caption(&self, surface: &mut dyn Surface, caption: &CaptionSpec, tick: u64) {
        let lines = self.layout(surface, &caption.text, &caption.style);
        self.draw(surface, &lines, caption.anchor, &caption.style, tick);
    }

    /// Draw pre-wrapped `lines` centered horizontally and vertically on the anchor.
    pub fn draw(
        &self,
        surface: &mut dyn Surface,
        lines: &[String],
        anchor: CaptionAnchor,
        style: &CaptionStyle,
        tick: u64,
    ) {
        if lines.is_empty() {
            return;
        }
        let font = font_of(style);
        let size = f64::from(style.font_size);
        let line_height = size * f64::from(LINE_SPACING);
        let cx = f64::from(surface.width()) / 2.0;
        let anchor_y = f64::from(surface.height()) * anchor_fraction(anchor);
        let first_y = anchor_y - line_height * (lines.len() as f64 - 1.0) / 2.0;
        let centers: Vec<Point> = (0..lines.len())
            .map(|i| Point::new(cx, first_y + line_height * i as f64))
            .collect();

        if let Some(bg) = style.background {
            let widest = lines
                .iter()
                .map(|l| f64::from(surface.measure_text(l, &font)))
                .fold(0.0, f64::max);
            let pad = size * f64::from(BACKGROUND_PAD_PER_SIZE);
            let half_w = widest / 2.0 + pad;
            let half_h = line_height * lines.len() as f64 / 2.0 + pad;
            surface.fill_rect(
                Rect::new(cx - half_w, anchor_y - half_h, cx + half_w, anchor_y + half_h),
                bg,
            );
        }

        let stroke = TextPaint::Stroke {
            color: OUTLINE_COLOR,
            width: style.font_size * STROKE_PER_SIZE,
        };
        let fill = TextPaint::Fill {
            color: style.color,
            shadow: Some(CAPTION_SHADOW),
        };
        for paint in [stroke, fill] {
            for (line, center) in lines.iter().zip(&centers) {
                if let Err(e) = surface.draw_text(line, *center, &font, &paint) {
                    tracing::warn!(tick, error = %e, "caption draw failed, skipping caption");
                    return;
                }
            }
        }
        tracing::trace!(tick, lines = lines.len(), "caption drawn");
    }
}

fn font_of(style: &CaptionStyle) -> FontSpec {
    FontSpec {
        family: style.font_family.clone(),
        size_px: style.font_size,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/text/overlay.rs"]
mod tests;
