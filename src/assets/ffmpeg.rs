use std::path::{Path, PathBuf};

use crate::assets::decode::decode_image;
use crate::assets::handle::MediaSource;
use crate::assets::loader::{DecodeTarget, MediaBackend};
use crate::assets::media::{AudioPcm, decode_audio_f32_stereo, decode_wav, open_video_stream};
use crate::foundation::error::{ComposeError, ComposeResult};
use crate::model::request::{ClipDescriptor, MediaKind};

/// File-backed media: stills through `image`, video and compressed audio through `ffmpeg`.
///
/// Sources are relative paths resolved under `assets_root`. Blocking decode work runs on the
/// blocking pool.
#[derive(Clone, Debug)]
pub struct FfmpegMediaBackend {
    assets_root: PathBuf,
}

impl FfmpegMediaBackend {
    /// Resolve sources under `assets_root`.
    pub fn new(assets_root: impl Into<PathBuf>) -> Self {
        Self {
            assets_root: assets_root.into(),
        }
    }

    fn resolve(&self, source: &str) -> ComposeResult<PathBuf> {
        let rel = normalize_rel_path(source)?;
        Ok(self.assets_root.join(rel))
    }
}

#[async_trait::async_trait]
impl MediaBackend for FfmpegMediaBackend {
    async fn open(
        &self,
        clip: &ClipDescriptor,
        target: &DecodeTarget,
    ) -> ComposeResult<MediaSource> {
        let path = self
            .resolve(&clip.source)
            .map_err(|e| ComposeError::load(&clip.id, e.to_string()))?;
        let kind = clip.kind;
        let trim = clip.trim;
        let target = *target;
        let joined = tokio::task::spawn_blocking(move || -> ComposeResult<MediaSource> {
            match kind {
                MediaKind::Image => {
                    let bytes = read_bytes(&path)?;
                    decode_image(&bytes).map(MediaSource::Image)
                }
                MediaKind::Video => {
                    open_video_stream(&path, trim, &target).map(MediaSource::Video)
                }
            }
        })
        .await
        .map_err(|e| ComposeError::load(&clip.id, format!("decode task failed: {e}")))?;
        joined.map_err(|e| ComposeError::load(&clip.id, e.to_string()))
    }

    async fn open_audio(&self, source: &str, sample_rate: u32) -> ComposeResult<AudioPcm> {
        let path = self
            .resolve(source)
            .map_err(|e| ComposeError::load(source, e.to_string()))?;
        let joined = tokio::task::spawn_blocking(move || -> ComposeResult<AudioPcm> {
            let is_wav = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
            if is_wav {
                decode_wav(&read_bytes(&path)?)
            } else {
                decode_audio_f32_stereo(&path, sample_rate)
            }
        })
        .await
        .map_err(|e| ComposeError::load(source, format!("decode task failed: {e}")))?;
        joined.map_err(|e| ComposeError::load(source, e.to_string()))
    }
}

fn read_bytes(path: &Path) -> ComposeResult<Vec<u8>> {
    use anyhow::Context as _;
    Ok(std::fs::read(path).with_context(|| format!("read asset '{}'", path.display()))?)
}

/// Normalize a relative asset path, rejecting absolute paths and `..` segments.
pub(crate) fn normalize_rel_path(source: &str) -> ComposeResult<String> {
    let s = source.replace('\\', "/");
    if s.starts_with('/') {
        return Err(ComposeError::validation("asset paths must be relative"));
    }
    if s.is_empty() {
        return Err(ComposeError::validation("asset path must be non-empty"));
    }

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(ComposeError::validation("asset paths must not contain '..'"));
        }
        out.push(part);
    }

    if out.is_empty() {
        return Err(ComposeError::validation(
            "asset path must contain a file name",
        ));
    }

    Ok(out.join("/"))
}
