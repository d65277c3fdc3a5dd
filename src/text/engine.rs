use crate::foundation::error::{ComposeError, ComposeResult};

/// Parley brush. Color is applied by the surface at draw time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct GlyphBrush;

/// Single-font Parley layout helper.
///
/// The font is registered once; every layout uses its family regardless of the requested name.
pub(crate) struct TextLayoutEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<GlyphBrush>,
    family_name: String,
    font_bytes: Vec<u8>,
}

impl TextLayoutEngine {
    /// Register `font_bytes` and keep its first family.
    pub(crate) fn new(font_bytes: Vec<u8>) -> ComposeResult<Self> {
        let mut font_ctx = parley::FontContext::default();
        let families = font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(font_bytes.clone()), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            ComposeError::validation("no font families registered from font bytes")
        })?;
        let family_name = font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| ComposeError::validation("registered font family has no name"))?
            .to_string();

        Ok(Self {
            font_ctx,
            layout_ctx: parley::LayoutContext::new(),
            family_name,
            font_bytes,
        })
    }

    /// Load and register a font file.
    pub(crate) fn from_path(path: &std::path::Path) -> ComposeResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            ComposeError::validation(format!("read caption font '{}': {e}", path.display()))
        })?;
        Self::new(bytes)
    }

    pub(crate) fn family_name(&self) -> &str {
        &self.family_name
    }

    pub(crate) fn font_bytes(&self) -> &[u8] {
        &self.font_bytes
    }

    /// Shape `text` on one unbroken line.
    pub(crate) fn layout_line(
        &mut self,
        text: &str,
        size_px: f32,
    ) -> ComposeResult<parley::Layout<GlyphBrush>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(ComposeError::validation(
                "text size_px must be finite and > 0",
            ));
        }

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(self.family_name.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(GlyphBrush));

        let mut layout: parley::Layout<GlyphBrush> = builder.build(text);
        layout.break_all_lines(None);
        Ok(layout)
    }

    /// Advance width of `text` at `size_px`.
    pub(crate) fn measure(&mut self, text: &str, size_px: f32) -> ComposeResult<f32> {
        Ok(self.layout_line(text, size_px)?.width())
    }
}

/// Width estimate used when no font is registered.
pub(crate) fn estimate_text_width(text: &str, size_px: f32) -> f32 {
    text.chars().count() as f32 * size_px * 0.55
}
