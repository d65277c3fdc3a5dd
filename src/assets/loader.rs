use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::assets::handle::{MediaHandle, MediaSource};
use crate::assets::media::AudioPcm;
use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{ComposeError, ComposeResult};
use crate::foundation::ledger::HandleLedger;
use crate::model::opts::ComposerOpts;
use crate::model::request::{ClipDescriptor, MediaKind};

/// Shape every opened video stream is decoded to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeTarget {
    /// Frame size; sources are cover-fit into it.
    pub canvas: Canvas,
    /// Frame rate.
    pub fps: Fps,
    /// Frames buffered before a video counts as ready.
    pub min_buffer_frames: usize,
}

impl DecodeTarget {
    /// Target derived from composer options.
    pub fn from_opts(opts: &ComposerOpts) -> Self {
        Self {
            canvas: opts.canvas,
            fps: opts.fps,
            min_buffer_frames: opts.min_buffer_frames,
        }
    }
}

/// Resolves clip sources into drawable media and audio.
///
/// `open` returns once the source is ready to draw: decoded for images, prefilled for video.
#[async_trait::async_trait]
pub trait MediaBackend: Send + Sync {
    /// Open the visual media of `clip`.
    async fn open(&self, clip: &ClipDescriptor, target: &DecodeTarget)
    -> ComposeResult<MediaSource>;

    /// Decode an audio source to interleaved PCM at `sample_rate`.
    async fn open_audio(&self, source: &str, sample_rate: u32) -> ComposeResult<AudioPcm>;
}

/// Loads clip media with deadlines and bounded fan-out, registering every handle.
#[derive(Clone)]
pub struct AssetLoader {
    backend: Arc<dyn MediaBackend>,
    ledger: HandleLedger,
    target: DecodeTarget,
    video_timeout: Duration,
    image_timeout: Duration,
    concurrency: usize,
}

impl AssetLoader {
    /// Loader using the deadlines and fan-out of `opts`.
    pub fn new(backend: Arc<dyn MediaBackend>, ledger: HandleLedger, opts: &ComposerOpts) -> Self {
        Self {
            backend,
            ledger,
            target: DecodeTarget::from_opts(opts),
            video_timeout: Duration::from_millis(opts.video_load_timeout_ms),
            image_timeout: Duration::from_millis(opts.image_load_timeout_ms),
            concurrency: opts.load_concurrency.max(1),
        }
    }

    /// Deadline applied to a clip of `kind`.
    pub fn timeout_for(&self, kind: MediaKind) -> Duration {
        match kind {
            MediaKind::Video => self.video_timeout,
            MediaKind::Image => self.image_timeout,
        }
    }

    /// Load one clip.
    ///
    /// Fails with `LoadTimeout` past the deadline and `LoadError` for any backend fault.
    #[tracing::instrument(skip(self, clip), fields(clip = %clip.id, kind = ?clip.kind))]
    pub async fn load(&self, clip: &ClipDescriptor) -> ComposeResult<MediaHandle> {
        let timeout = self.timeout_for(clip.kind);
        let opened = tokio::time::timeout(timeout, self.backend.open(clip, &self.target)).await;
        let source = match opened {
            Err(_) => return Err(ComposeError::load_timeout(&clip.id, timeout)),
            Ok(Err(e @ (ComposeError::Load { .. } | ComposeError::LoadTimeout { .. }))) => {
                return Err(e);
            }
            Ok(Err(e)) => return Err(ComposeError::load(&clip.id, e.to_string())),
            Ok(Ok(source)) => source,
        };
        tracing::debug!(?source, "clip media ready");
        Ok(MediaHandle::new(clip, source, &self.ledger))
    }

    /// Load every clip concurrently. Results keep descriptor order.
    ///
    /// The first failure (or cancellation) releases everything loaded so far and drops the
    /// remaining in-flight loads.
    pub async fn load_all(
        &self,
        clips: &[ClipDescriptor],
        cancel: &CancellationToken,
    ) -> ComposeResult<Vec<MediaHandle>> {
        let mut slots: Vec<Option<MediaHandle>> = clips.iter().map(|_| None).collect();
        let mut pending = futures_util::stream::iter(clips.iter().enumerate())
            .map(|(i, clip)| async move { (i, self.load(clip).await) })
            .buffer_unordered(self.concurrency);

        let failure = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Some(ComposeError::Cancelled),
                next = pending.next() => match next {
                    None => break None,
                    Some((i, Ok(handle))) => slots[i] = Some(handle),
                    Some((i, Err(e))) => {
                        tracing::warn!(clip = %clips[i].id, error = %e, "clip load failed");
                        break Some(e);
                    }
                },
            }
        };
        drop(pending);

        if let Some(e) = failure {
            for h in slots.iter_mut().flatten() {
                h.release();
            }
            return Err(e);
        }
        slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ComposeError::Other(anyhow::anyhow!("load stream ended early")))
    }

    /// Decode an audio bed through the backend, bounded by the image deadline.
    pub async fn load_audio(&self, source: &str, sample_rate: u32) -> ComposeResult<AudioPcm> {
        match tokio::time::timeout(
            self.image_timeout,
            self.backend.open_audio(source, sample_rate),
        )
        .await
        {
            Err(_) => Err(ComposeError::load_timeout(source, self.image_timeout)),
            Ok(r) => r,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assets/loader.rs"]
mod tests;
