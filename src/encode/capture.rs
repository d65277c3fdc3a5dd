use std::path::Path;
use std::time::Duration;

use bytes::Bytes;

use crate::audio::mix::AudioMixGraph;
use crate::encode::ffmpeg::ensure_parent_dir;
use crate::encode::sink::{CaptureFormat, EncodeSink, SinkConfig, negotiate_format};
use crate::foundation::error::{ComposeError, ComposeResult};
use crate::foundation::ledger::{HandleId, HandleKind, HandleLedger};
use crate::model::opts::ComposerOpts;
use crate::render::backend::{FrameRGBA, Surface};

/// The finished recording of one job.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputAsset {
    /// MIME type of `data`.
    pub mime_type: String,
    /// Encoded bytes.
    pub data: Bytes,
    /// Format the sink produced.
    pub format: CaptureFormat,
    /// Job time covered by the recording.
    pub duration: Duration,
    /// Frames captured.
    pub frames: u64,
}

impl OutputAsset {
    /// Write `data` to `path`, creating parent directories.
    pub fn write_to(&self, path: impl AsRef<Path>) -> ComposeResult<()> {
        let path = path.as_ref();
        ensure_parent_dir(path)?;
        std::fs::write(path, &self.data).map_err(|e| {
            ComposeError::capture_io(format!("write output '{}': {e}", path.display()))
        })
    }
}

/// Binds surface frames and mixed audio to an [`EncodeSink`] and collects its chunks.
///
/// Sink failures during recording are fatal [`ComposeError::CaptureIo`].
pub struct CaptureController {
    sink: Box<dyn EncodeSink>,
    format: CaptureFormat,
    chunks: Vec<Bytes>,
    frames: u64,
    last_ts: Duration,
    ledger: HandleLedger,
    ledger_id: HandleId,
    open: bool,
}

impl CaptureController {
    /// Negotiate a format and start recording frames of `surface` and audio of `mix`.
    ///
    /// Fails with `CaptureUnsupported` when the sink supports none of `opts.capture_formats`.
    pub fn start(
        mut sink: Box<dyn EncodeSink>,
        surface: &dyn Surface,
        mix: &AudioMixGraph,
        opts: &ComposerOpts,
        ledger: &HandleLedger,
    ) -> ComposeResult<Self> {
        let supported = sink.supported_formats();
        let format = negotiate_format(&opts.capture_formats, &supported).ok_or_else(|| {
            ComposeError::capture_unsupported(format!(
                "no capture format available (preferred {:?}, sink supports {:?})",
                opts.capture_formats, supported
            ))
        })?;

        let cfg = SinkConfig {
            format,
            width: surface.width(),
            height: surface.height(),
            fps: opts.fps,
            sample_rate: mix.sample_rate(),
            channels: mix.channels(),
        };
        sink.begin(cfg).map_err(|e| match e {
            e @ (ComposeError::CaptureUnsupported(_) | ComposeError::Validation(_)) => {
                ComposeError::capture_unsupported(e.to_string())
            }
            e => ComposeError::capture_io(e.to_string()),
        })?;
        tracing::info!(?format, "capture started");

        Ok(Self {
            sink,
            format,
            chunks: Vec::new(),
            frames: 0,
            last_ts: Duration::ZERO,
            ledger_id: ledger.acquire(HandleKind::Capture, format.extension()),
            ledger: ledger.clone(),
            open: true,
        })
    }

    /// Negotiated format.
    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    /// Frames recorded so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Whether recording is still running.
    pub fn is_recording(&self) -> bool {
        self.open
    }

    /// Record the frame presented at job time `ts`.
    pub fn record_frame(&mut self, ts: Duration, frame: &FrameRGBA) -> ComposeResult<()> {
        self.ensure_open()?;
        self.sink.push_frame(ts, frame).map_err(as_capture_io)?;
        self.frames += 1;
        self.last_ts = self.last_ts.max(ts);
        self.chunks.extend(self.sink.take_chunks());
        Ok(())
    }

    /// Record interleaved mixed audio.
    pub fn record_audio(&mut self, samples: &[f32]) -> ComposeResult<()> {
        self.ensure_open()?;
        if samples.is_empty() {
            return Ok(());
        }
        self.sink.push_audio(samples).map_err(as_capture_io)
    }

    /// Finish recording and concatenate every chunk into one asset.
    ///
    /// `duration` is the job time the recording covers.
    pub fn stop(&mut self, duration: Duration) -> ComposeResult<OutputAsset> {
        self.ensure_open()?;
        self.open = false;
        let finished = self
            .sink
            .finish()
            .and_then(|tail| {
                let mut chunks = std::mem::take(&mut self.chunks);
                chunks.extend(tail);
                self.sink.finalize(chunks)
            })
            .map_err(as_capture_io);
        self.ledger.release(self.ledger_id);

        let data = match finished {
            Ok(data) => data,
            Err(e) => {
                self.sink.abort();
                return Err(e);
            }
        };
        tracing::info!(frames = self.frames, bytes = data.len(), "capture finalized");
        Ok(OutputAsset {
            mime_type: self.format.mime_type().to_owned(),
            data,
            format: self.format,
            duration: duration.max(self.last_ts),
            frames: self.frames,
        })
    }

    /// Discard the recording and release the sink. Idempotent.
    pub fn abort(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.chunks.clear();
        self.sink.abort();
        self.ledger.release(self.ledger_id);
    }

    fn ensure_open(&self) -> ComposeResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(ComposeError::capture_io("capture already stopped"))
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        if self.open {
            self.sink.abort();
            self.ledger.release_on_drop(self.ledger_id);
        }
    }
}

impl std::fmt::Debug for CaptureController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureController")
            .field("format", &self.format)
            .field("frames", &self.frames)
            .field("chunks", &self.chunks.len())
            .field("open", &self.open)
            .finish()
    }
}

fn as_capture_io(e: ComposeError) -> ComposeError {
    match e {
        e @ ComposeError::CaptureIo(_) => e,
        e => ComposeError::capture_io(e.to_string()),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/capture.rs"]
mod tests;
