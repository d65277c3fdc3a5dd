use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::foundation::error::{ComposeError, ComposeResult};
use crate::render::backend::FontSpec;

/// Greedy word wrap.
///
/// The running line grows while its measured width stays within `max_width`. Words are never
/// split; a word wider than `max_width` sits on a line of its own.
pub fn wrap_words(text: &str, max_width: f32, mut measure: impl FnMut(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if line.is_empty() {
            line.push_str(word);
            continue;
        }
        let candidate = format!("{line} {word}");
        if measure(&candidate) <= max_width {
            line = candidate;
        } else {
            lines.push(std::mem::take(&mut line));
            line.push_str(word);
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct LayoutKey {
    text: String,
    max_width_bits: u32,
    family: String,
    size_bits: u32,
}

impl LayoutKey {
    fn new(text: &str, max_width: f32, font: Option<&FontSpec>) -> Self {
        Self {
            text: text.to_owned(),
            max_width_bits: max_width.to_bits(),
            family: font.map(|f| f.family.clone()).unwrap_or_default(),
            size_bits: font.map_or(0, |f| f.size_px.to_bits()),
        }
    }
}

/// Hit/miss counters of a [`CaptionLayoutCache`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayoutCacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that ran the wrapper.
    pub misses: u64,
    /// Entries dropped by the capacity bound.
    pub evictions: u64,
    /// Full clears caused by a width band change.
    pub invalidations: u64,
}

/// Bounded memo of wrapped caption lines keyed by `(text, max_width)` and the measuring font.
///
/// Entries are immutable once inserted and evicted oldest-first past `capacity`. All entries share
/// one width band; asking for a different width clears the cache first.
#[derive(Debug)]
pub struct CaptionLayoutCache {
    capacity: usize,
    width_band: Option<u32>,
    entries: HashMap<LayoutKey, Arc<[String]>>,
    order: VecDeque<LayoutKey>,
    stats: LayoutCacheStats,
}

/// Cache handle shared between jobs.
pub type SharedLayoutCache = Arc<Mutex<CaptionLayoutCache>>;

impl CaptionLayoutCache {
    /// Default entry bound.
    pub const DEFAULT_CAPACITY: usize = 50;

    /// Empty cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            width_band: None,
            entries: HashMap::new(),
            order: VecDeque::new(),
            stats: LayoutCacheStats::default(),
        }
    }

    /// Empty cache wrapped for sharing.
    pub fn shared(capacity: usize) -> SharedLayoutCache {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    /// Wrapped lines for `text` at `max_width`, computing them on a miss.
    pub fn wrap(
        &mut self,
        text: &str,
        max_width: f32,
        measure: impl FnMut(&str) -> f32,
    ) -> ComposeResult<Arc<[String]>> {
        self.wrap_keyed(LayoutKey::new(text, max_width, None), max_width, measure)
    }

    /// Like [`wrap`](Self::wrap), for widths measured with `font`. Line breaks depend on the
    /// font, so each font gets its own entries.
    pub fn wrap_with_font(
        &mut self,
        text: &str,
        max_width: f32,
        font: &FontSpec,
        measure: impl FnMut(&str) -> f32,
    ) -> ComposeResult<Arc<[String]>> {
        self.wrap_keyed(LayoutKey::new(text, max_width, Some(font)), max_width, measure)
    }

    fn wrap_keyed(
        &mut self,
        key: LayoutKey,
        max_width: f32,
        measure: impl FnMut(&str) -> f32,
    ) -> ComposeResult<Arc<[String]>> {
        let text = key.text.as_str();
        if !max_width.is_finite() || max_width <= 0.0 {
            return Err(ComposeError::validation(format!(
                "caption max width must be finite and > 0, got {max_width}"
            )));
        }
        if text.trim().is_empty() {
            return Ok(Arc::from(Vec::new()));
        }
        self.set_width_band(max_width);

        if let Some(lines) = self.entries.get(&key) {
            self.stats.hits += 1;
            return Ok(lines.clone());
        }

        self.stats.misses += 1;
        let lines: Arc<[String]> = Arc::from(wrap_words(text, max_width, measure));
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
            self.stats.evictions += 1;
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, lines.clone());
        Ok(lines)
    }

    /// Move to a new width band, dropping every entry if it changed.
    pub fn set_width_band(&mut self, max_width: f32) {
        let bits = max_width.to_bits();
        if self.width_band == Some(bits) {
            return;
        }
        if !self.entries.is_empty() {
            self.stats.invalidations += 1;
            tracing::debug!(
                entries = self.entries.len(),
                max_width,
                "caption width band changed, clearing layout cache"
            );
        }
        self.entries.clear();
        self.order.clear();
        self.width_band = Some(bits);
    }

    /// Current width band.
    pub fn width_band(&self) -> Option<f32> {
        self.width_band.map(f32::from_bits)
    }

    /// Drop all entries and reset the band and counters.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.width_band = None;
        self.stats = LayoutCacheStats::default();
    }

    /// Entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Counter snapshot.
    pub fn stats(&self) -> LayoutCacheStats {
        self.stats
    }

    /// Whether `(text, max_width)` is cached for font-less measurement.
    pub fn contains(&self, text: &str, max_width: f32) -> bool {
        self.entries
            .contains_key(&LayoutKey::new(text, max_width, None))
    }

    /// Whether `(text, max_width)` is cached for `font`.
    pub fn contains_with_font(&self, text: &str, max_width: f32, font: &FontSpec) -> bool {
        self.entries
            .contains_key(&LayoutKey::new(text, max_width, Some(font)))
    }
}

impl Default for CaptionLayoutCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/text/wrap.rs"]
mod tests;
