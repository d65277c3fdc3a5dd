use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::assets::decode::PreparedImage;
use crate::assets::handle::{FramePoll, MediaSource, VideoDecoder};
use crate::assets::loader::{DecodeTarget, MediaBackend};
use crate::assets::media::AudioPcm;
use crate::foundation::core::Fps;
use crate::foundation::error::{ComposeError, ComposeResult};
use crate::model::request::ClipDescriptor;

#[derive(Clone, Debug)]
enum Scripted {
    Image(PreparedImage),
    Video {
        frames: u64,
        rgba: [u8; 4],
        fail_at: Option<u64>,
    },
    Fail(String),
}

#[derive(Clone, Debug)]
struct Entry {
    media: Scripted,
    delay: Duration,
}

/// Media backend serving scripted images, solid-color videos, failures and delays.
///
/// Delays use `tokio::time::sleep`, so they honor paused test time.
#[derive(Debug, Default)]
pub struct InMemoryMediaBackend {
    entries: HashMap<String, Entry>,
    audio: HashMap<String, Result<AudioPcm, String>>,
    audio_delays: HashMap<String, Duration>,
    opened: Mutex<Vec<String>>,
}

impl InMemoryMediaBackend {
    /// Empty backend; unknown sources fail to load.
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(mut self, source: &str, media: Scripted) -> Self {
        let delay = self
            .entries
            .get(source)
            .map(|e| e.delay)
            .unwrap_or_default();
        self.entries
            .insert(source.to_owned(), Entry { media, delay });
        self
    }

    /// Serve `source` as a solid `w`x`h` image.
    pub fn with_image(self, source: &str, w: u32, h: u32, rgba: [u8; 4]) -> Self {
        self.insert(source, Scripted::Image(PreparedImage::solid(w, h, rgba)))
    }

    /// Serve `source` as a solid-color video of `frames` frames at the target size and rate.
    pub fn with_video(self, source: &str, frames: u64, rgba: [u8; 4]) -> Self {
        self.insert(
            source,
            Scripted::Video {
                frames,
                rgba,
                fail_at: None,
            },
        )
    }

    /// Video whose decoder faults when asked for frame `fail_at`.
    pub fn with_faulty_video(self, source: &str, frames: u64, fail_at: u64) -> Self {
        self.insert(
            source,
            Scripted::Video {
                frames,
                rgba: [255, 255, 255, 255],
                fail_at: Some(fail_at),
            },
        )
    }

    /// Opening `source` fails with `message`.
    pub fn with_failure(self, source: &str, message: &str) -> Self {
        self.insert(source, Scripted::Fail(message.to_owned()))
    }

    /// Opening `source` takes `delay` before resolving.
    pub fn with_delay(mut self, source: &str, delay: Duration) -> Self {
        let entry = self.entries.entry(source.to_owned()).or_insert(Entry {
            media: Scripted::Fail(format!("no media scripted for '{source}'")),
            delay,
        });
        entry.delay = delay;
        self
    }

    /// Serve `source` as audio.
    pub fn with_audio(mut self, source: &str, pcm: AudioPcm) -> Self {
        self.audio.insert(source.to_owned(), Ok(pcm));
        self
    }

    /// Audio decode of `source` takes `delay` before resolving.
    pub fn with_audio_delay(mut self, source: &str, delay: Duration) -> Self {
        self.audio_delays.insert(source.to_owned(), delay);
        self
    }

    /// Audio decode of `source` fails.
    pub fn with_audio_failure(mut self, source: &str, message: &str) -> Self {
        self.audio
            .insert(source.to_owned(), Err(message.to_owned()));
        self
    }

    /// Sources opened so far, in call order.
    pub fn opened(&self) -> Vec<String> {
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait::async_trait]
impl MediaBackend for InMemoryMediaBackend {
    async fn open(
        &self,
        clip: &ClipDescriptor,
        target: &DecodeTarget,
    ) -> ComposeResult<MediaSource> {
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(clip.source.clone());
        let entry = self
            .entries
            .get(&clip.source)
            .cloned()
            .ok_or_else(|| ComposeError::load(&clip.id, format!("unknown source '{}'", clip.source)))?;
        if !entry.delay.is_zero() {
            tokio::time::sleep(entry.delay).await;
        }
        match entry.media {
            Scripted::Image(img) => Ok(MediaSource::Image(img)),
            Scripted::Video {
                frames,
                rgba,
                fail_at,
            } => Ok(MediaSource::Video(Box::new(SolidVideoDecoder {
                frame: PreparedImage::solid(target.canvas.width, target.canvas.height, rgba),
                fps: target.fps,
                remaining: frames,
                produced: 0,
                fail_at,
                closed: false,
            }))),
            Scripted::Fail(msg) => Err(ComposeError::load(&clip.id, msg)),
        }
    }

    async fn open_audio(&self, source: &str, sample_rate: u32) -> ComposeResult<AudioPcm> {
        if let Some(delay) = self.audio_delays.get(source) {
            tokio::time::sleep(*delay).await;
        }
        match self.audio.get(source) {
            Some(Ok(pcm)) => Ok(AudioPcm {
                sample_rate: if pcm.sample_rate == 0 {
                    sample_rate
                } else {
                    pcm.sample_rate
                },
                ..pcm.clone()
            }),
            Some(Err(msg)) => Err(ComposeError::load(source, msg.clone())),
            None => Err(ComposeError::load(source, "unknown audio source")),
        }
    }
}

struct SolidVideoDecoder {
    frame: PreparedImage,
    fps: Fps,
    remaining: u64,
    produced: u64,
    fail_at: Option<u64>,
    closed: bool,
}

impl VideoDecoder for SolidVideoDecoder {
    fn fps(&self) -> Fps {
        self.fps
    }

    fn poll_frame(&mut self) -> FramePoll {
        if self.closed || self.remaining == 0 {
            return FramePoll::Ended;
        }
        if self.fail_at == Some(self.produced) {
            return FramePoll::Failed(format!("scripted fault at frame {}", self.produced));
        }
        self.remaining -= 1;
        self.produced += 1;
        FramePoll::Frame(self.frame.clone())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
