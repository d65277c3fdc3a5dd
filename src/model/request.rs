use crate::foundation::core::Rgba8;
use crate::foundation::error::{ComposeError, ComposeResult};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// JSON job document: the ordered clips plus narration, music and caption settings.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ComposeRequest {
    /// Clips in playback order.
    pub clips: Vec<ClipDescriptor>,
    /// Narration synthesis settings.
    #[serde(default)]
    pub narration: NarrationSettings,
    /// Background music settings.
    #[serde(default)]
    pub music: MusicSettings,
    /// Whether caption overlays are drawn.
    #[serde(default = "default_true")]
    pub captions_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl ComposeRequest {
    /// Parse a request from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> ComposeResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| ComposeError::validation(format!("parse compose request JSON: {e}")))
    }

    /// Parse a request from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> ComposeResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            ComposeError::validation(format!("open compose request '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Check field-level constraints. An empty clip list is accepted here; the state machine
    /// refuses to start on it.
    pub fn validate(&self) -> ComposeResult<()> {
        let mut seen = HashSet::new();
        for (i, clip) in self.clips.iter().enumerate() {
            clip.validate()
                .map_err(|e| ComposeError::validation(format!("clips[{i}]: {e}")))?;
            if !seen.insert(clip.id.as_str()) {
                return Err(ComposeError::validation(format!(
                    "clips[{i}]: duplicate clip id '{}'",
                    clip.id
                )));
            }
        }
        let v = self.music.volume;
        if !v.is_finite() || !(0.0..=1.0).contains(&v) {
            return Err(ComposeError::validation(format!(
                "music.volume must be in [0,1], got {v}"
            )));
        }
        if self.music.enabled && self.music.track_id.as_deref().is_none_or(str::is_empty) {
            return Err(ComposeError::validation(
                "music.track_id is required when music is enabled",
            ));
        }
        Ok(())
    }
}

/// Narration input flags.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NarrationSettings {
    /// Synthesize narration from caption text.
    #[serde(default)]
    pub enabled: bool,
    /// Voice passed through to the provider.
    #[serde(default)]
    pub voice_id: String,
}

/// Background music input flags.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MusicSettings {
    /// Whether the bed plays at all.
    #[serde(default)]
    pub enabled: bool,
    /// Source reference for the bed, resolved by the media backend.
    #[serde(default)]
    pub track_id: Option<String>,
    /// Bus gain in `[0,1]`.
    #[serde(default = "default_music_volume")]
    pub volume: f32,
}

fn default_music_volume() -> f32 {
    0.3
}

impl Default for MusicSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            track_id: None,
            volume: default_music_volume(),
        }
    }
}

/// Kind of visual media behind a clip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Decoded video stream.
    Video,
    /// Still image.
    Image,
}

/// Source window of a video clip, in seconds from the start of the source.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrimWindow {
    /// First source second shown.
    pub start_offset: f64,
    /// Source second after which the last frame holds.
    pub end_offset: f64,
}

impl TrimWindow {
    /// Length of the window in seconds.
    pub fn len_secs(&self) -> f64 {
        (self.end_offset - self.start_offset).max(0.0)
    }
}

/// One clip of the composition. Immutable once a job starts.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClipDescriptor {
    /// Unique id within the request.
    pub id: String,
    /// Media kind.
    pub kind: MediaKind,
    /// Source reference resolved by the media backend.
    pub source: String,
    /// Nominal on-screen duration in seconds.
    #[serde(rename = "duration")]
    pub duration_sec: f64,
    /// Optional source window for video clips.
    #[serde(default)]
    pub trim: Option<TrimWindow>,
    /// Optional caption overlay.
    #[serde(default)]
    pub caption: Option<CaptionSpec>,
}

impl ClipDescriptor {
    fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("id must be non-empty".to_owned());
        }
        if self.source.trim().is_empty() {
            return Err(format!("clip '{}': source must be non-empty", self.id));
        }
        if !self.duration_sec.is_finite() || self.duration_sec <= 0.0 {
            return Err(format!(
                "clip '{}': duration must be finite and > 0, got {}",
                self.id, self.duration_sec
            ));
        }
        if let Some(t) = &self.trim {
            if !(t.start_offset.is_finite() && t.end_offset.is_finite()) {
                return Err(format!("clip '{}': trim offsets must be finite", self.id));
            }
            if t.start_offset < 0.0 || t.end_offset <= t.start_offset {
                return Err(format!(
                    "clip '{}': trim must satisfy 0 <= start_offset < end_offset",
                    self.id
                ));
            }
        }
        if let Some(c) = &self.caption {
            let sz = c.style.font_size;
            if !sz.is_finite() || sz <= 0.0 {
                return Err(format!(
                    "clip '{}': caption font_size must be finite and > 0",
                    self.id
                ));
            }
        }
        Ok(())
    }

    /// Caption text when present and non-blank.
    pub fn caption_text(&self) -> Option<&str> {
        self.caption
            .as_ref()
            .map(|c| c.text.as_str())
            .filter(|t| !t.trim().is_empty())
    }
}

/// Caption overlay of a clip. Text arrives already cleaned.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CaptionSpec {
    /// Display text.
    pub text: String,
    /// Vertical placement.
    #[serde(default)]
    pub anchor: CaptionAnchor,
    /// Font and color.
    #[serde(default)]
    pub style: CaptionStyle,
}

/// Vertical anchor of a caption block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionAnchor {
    /// Upper band.
    Top,
    /// Middle of the frame.
    Center,
    /// Lower band.
    #[default]
    Bottom,
}

/// Caption font and colors.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CaptionStyle {
    /// Requested family; the surface falls back to its registered font.
    #[serde(default = "default_font_family")]
    pub font_family: String,
    /// Font size in pixels.
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    /// Fill color.
    #[serde(default = "default_caption_color")]
    pub color: Rgba8,
    /// Optional box painted behind the text block.
    #[serde(default)]
    pub background: Option<Rgba8>,
}

fn default_font_family() -> String {
    "sans-serif".to_owned()
}

fn default_font_size() -> f32 {
    48.0
}

fn default_caption_color() -> Rgba8 {
    Rgba8::WHITE
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_family: default_font_family(),
            font_size: default_font_size(),
            color: default_caption_color(),
            background: None,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/model/request.rs"]
mod tests;
