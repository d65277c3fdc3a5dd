use crate::assets::decode::PreparedImage;
use crate::foundation::core::Fps;
use crate::foundation::ledger::{HandleId, HandleKind, HandleLedger};
use crate::model::request::{ClipDescriptor, MediaKind};

/// Result of asking a decoder for its next frame without blocking.
#[derive(Debug)]
pub enum FramePoll {
    /// Next frame in presentation order.
    Frame(PreparedImage),
    /// Decoder is still buffering; hold the current frame.
    Pending,
    /// Stream exhausted.
    Ended,
    /// Decoder fault.
    Failed(String),
}

/// Sequential, non-blocking frame source for one video clip.
///
/// Frames start at the clip's trim start and arrive at the decoder's `fps`.
pub trait VideoDecoder: Send {
    /// Rate frames are produced at.
    fn fps(&self) -> Fps;
    /// Pull the next frame if one is buffered.
    fn poll_frame(&mut self) -> FramePoll;
    /// Stop decoding and free buffers. Called once from [`MediaHandle::release`].
    fn close(&mut self);
}

/// What a backend produced for a clip.
pub enum MediaSource {
    /// Decoded still.
    Image(PreparedImage),
    /// Buffered video stream.
    Video(Box<dyn VideoDecoder>),
}

impl std::fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image(img) => write!(f, "Image({}x{})", img.width, img.height),
            Self::Video(d) => write!(f, "Video({:?})", d.fps()),
        }
    }
}

type EndedCallback = Box<dyn FnMut() + Send>;
type ErrorCallback = Box<dyn FnMut(&str) + Send>;

/// A loaded clip asset, registered in the [`HandleLedger`] until released.
///
/// `ended` and `error` callbacks run synchronously from [`MediaHandle::frame_at`], at most once
/// each. After either, the last good frame keeps being returned.
pub struct MediaHandle {
    clip_id: String,
    kind: MediaKind,
    source: MediaSource,
    trim_len: Option<f64>,
    ledger: HandleLedger,
    ledger_id: HandleId,
    released: bool,
    playing: bool,
    current: Option<PreparedImage>,
    frames_pulled: u64,
    ended: bool,
    failed: bool,
    on_ended: Option<EndedCallback>,
    on_error: Option<ErrorCallback>,
}

impl MediaHandle {
    pub(crate) fn new(clip: &ClipDescriptor, source: MediaSource, ledger: &HandleLedger) -> Self {
        let ledger_id = ledger.acquire(HandleKind::Media, clip.id.clone());
        let current = match &source {
            MediaSource::Image(img) => Some(img.clone()),
            MediaSource::Video(_) => None,
        };
        Self {
            clip_id: clip.id.clone(),
            kind: clip.kind,
            source,
            trim_len: clip.trim.map(|t| t.len_secs()),
            ledger: ledger.clone(),
            ledger_id,
            released: false,
            playing: false,
            current,
            frames_pulled: 0,
            ended: false,
            failed: false,
            on_ended: None,
            on_error: None,
        }
    }

    /// Id of the owning clip.
    pub fn clip_id(&self) -> &str {
        &self.clip_id
    }

    /// Declared media kind.
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Register the end-of-stream callback.
    pub fn on_ended(&mut self, f: impl FnMut() + Send + 'static) {
        self.on_ended = Some(Box::new(f));
    }

    /// Register the decode-fault callback.
    pub fn on_error(&mut self, f: impl FnMut(&str) + Send + 'static) {
        self.on_error = Some(Box::new(f));
    }

    /// Start advancing on [`Self::frame_at`].
    pub fn play(&mut self) {
        if !self.released {
            self.playing = true;
        }
    }

    /// Freeze on the current frame.
    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Whether playback is advancing.
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Whether the stream has ended (or the trim window is exhausted).
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Whether the ledger entry is gone.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Frame to show `elapsed_secs` into the clip.
    ///
    /// Video advances only while playing. When the stream or trim window ends before the clip's
    /// on-screen interval does, the last frame holds.
    pub fn frame_at(&mut self, elapsed_secs: f64) -> Option<&PreparedImage> {
        if self.playing && !self.ended && !self.failed {
            self.advance_video(elapsed_secs);
        }
        self.current.as_ref()
    }

    fn advance_video(&mut self, elapsed_secs: f64) {
        let MediaSource::Video(decoder) = &mut self.source else {
            return;
        };
        let fps = decoder.fps();
        let mut source_secs = elapsed_secs.max(0.0);
        let mut window_done = false;
        if let Some(len) = self.trim_len
            && source_secs >= len
        {
            source_secs = len;
            window_done = true;
        }
        let target = fps.secs_to_frames_floor(source_secs);

        let mut ended = false;
        let mut fault = None;
        while self.current.is_none() || self.frames_pulled <= target {
            match decoder.poll_frame() {
                FramePoll::Frame(f) => {
                    self.current = Some(f);
                    self.frames_pulled += 1;
                }
                FramePoll::Pending => break,
                FramePoll::Ended => {
                    ended = true;
                    break;
                }
                FramePoll::Failed(msg) => {
                    fault = Some(msg);
                    break;
                }
            }
        }

        if let Some(msg) = fault {
            self.failed = true;
            tracing::warn!(clip = %self.clip_id, error = %msg, "video decode fault, holding last frame");
            if let Some(mut cb) = self.on_error.take() {
                cb(&msg);
            }
        } else if ended || window_done {
            self.ended = true;
            tracing::debug!(clip = %self.clip_id, frames = self.frames_pulled, "video ended");
            if let Some(mut cb) = self.on_ended.take() {
                cb();
            }
        }
    }

    /// Pause, close the decoder and release the ledger entry. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.playing = false;
        if let MediaSource::Video(decoder) = &mut self.source {
            decoder.close();
        }
        self.ledger.release(self.ledger_id);
    }
}

impl Drop for MediaHandle {
    fn drop(&mut self) {
        if !self.released {
            if let MediaSource::Video(decoder) = &mut self.source {
                decoder.close();
            }
            self.ledger.release_on_drop(self.ledger_id);
        }
    }
}

impl std::fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaHandle")
            .field("clip_id", &self.clip_id)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("released", &self.released)
            .field("frames_pulled", &self.frames_pulled)
            .finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assets/handle.rs"]
mod tests;
