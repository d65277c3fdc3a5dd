use std::path::{Path, PathBuf};

use crate::assets::handle::VideoDecoder;
use crate::assets::loader::DecodeTarget;
use crate::foundation::error::{ComposeError, ComposeResult};
use crate::model::request::TrimWindow;

#[derive(Clone, Debug)]
/// Basic metadata about a source video file.
pub struct VideoSourceInfo {
    /// Source path used for probing/decoding.
    pub source_path: PathBuf,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Container duration in seconds, when reported.
    pub duration_sec: Option<f64>,
    /// Whether ffprobe detected at least one audio stream.
    pub has_audio: bool,
}

#[derive(Clone, Debug, PartialEq)]
/// Decoded interleaved floating-point PCM.
pub struct AudioPcm {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Interleaved `f32` PCM samples.
    pub interleaved_f32: Vec<f32>,
}

impl AudioPcm {
    /// Frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.interleaved_f32.len() / usize::from(self.channels)
    }

    /// Playback length in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }
}

/// Decode a WAV file held in memory into interleaved `f32` PCM at its native rate.
pub fn decode_wav(bytes: &[u8]) -> ComposeResult<AudioPcm> {
    let mut reader = hound::WavReader::new(std::io::Cursor::new(bytes))
        .map_err(|e| ComposeError::Other(anyhow::anyhow!("parse wav: {e}")))?;
    let spec = reader.spec();
    let interleaved_f32 = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ComposeError::Other(anyhow::anyhow!("read wav samples: {e}")))?,
        hound::SampleFormat::Int => {
            let bits = u32::from(spec.bits_per_sample.clamp(1, 32));
            let scale = (1u64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ComposeError::Other(anyhow::anyhow!("read wav samples: {e}")))?
        }
    };
    if spec.channels == 0 {
        return Err(ComposeError::Other(anyhow::anyhow!("wav has zero channels")));
    }
    Ok(AudioPcm {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        interleaved_f32,
    })
}

/// Probe source video metadata through `ffprobe`.
#[cfg(feature = "media-ffmpeg")]
pub fn probe_video(source_path: &Path) -> ComposeResult<VideoSourceInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(source_path)
        .output()
        .map_err(|e| ComposeError::Other(anyhow::anyhow!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(ComposeError::Other(anyhow::anyhow!(
            "ffprobe failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| ComposeError::Other(anyhow::anyhow!("ffprobe json parse failed: {e}")))?;
    let video_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| ComposeError::Other(anyhow::anyhow!("no video stream found")))?;
    let (Some(width), Some(height)) = (video_stream.width, video_stream.height) else {
        return Err(ComposeError::Other(anyhow::anyhow!(
            "missing video dimensions from ffprobe"
        )));
    };
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));
    let duration_sec = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok());

    Ok(VideoSourceInfo {
        source_path: source_path.to_path_buf(),
        width,
        height,
        duration_sec,
        has_audio,
    })
}

#[cfg(not(feature = "media-ffmpeg"))]
/// Probe source video metadata through `ffprobe`.
///
/// Returns an error when `media-ffmpeg` feature is disabled.
pub fn probe_video(_source_path: &Path) -> ComposeResult<VideoSourceInfo> {
    Err(feature_disabled())
}

#[cfg(feature = "media-ffmpeg")]
mod stream {
    use std::collections::VecDeque;
    use std::io::Read;
    use std::process::{Child, Command, Stdio};
    use std::sync::mpsc::{Receiver, TryRecvError, sync_channel};

    use crate::assets::decode::PreparedImage;
    use crate::assets::handle::{FramePoll, VideoDecoder};
    use crate::assets::loader::DecodeTarget;
    use crate::assets::media::VideoSourceInfo;
    use crate::foundation::core::Fps;
    use crate::foundation::error::{ComposeError, ComposeResult};
    use crate::foundation::math::premultiply_rgba8_in_place;
    use crate::model::request::TrimWindow;

    enum Msg {
        Frame(Vec<u8>),
        End,
        Fault(String),
    }

    /// Reads `rawvideo` RGBA frames from an `ffmpeg` child on a background thread.
    ///
    /// The channel is bounded, so decoding runs at most `capacity` frames ahead of playback.
    pub(crate) struct FfmpegVideoDecoder {
        child: Option<Child>,
        rx: Option<Receiver<Msg>>,
        prefill: VecDeque<PreparedImage>,
        width: u32,
        height: u32,
        fps: Fps,
        finished: bool,
    }

    impl FfmpegVideoDecoder {
        /// Spawn the decoder and block until `min_buffer_frames` are buffered or the stream ends.
        pub(crate) fn open(
            info: &VideoSourceInfo,
            trim: Option<TrimWindow>,
            target: &DecodeTarget,
        ) -> ComposeResult<Self> {
            let (w, h) = (target.canvas.width, target.canvas.height);
            let frame_len = (w as usize) * (h as usize) * 4;
            let mut cmd = Command::new("ffmpeg");
            cmd.args(["-v", "error", "-nostdin"]);
            if let Some(t) = trim {
                cmd.args(["-ss", &format!("{:.6}", t.start_offset)]);
                cmd.args(["-t", &format!("{:.6}", t.len_secs())]);
            }
            cmd.arg("-i").arg(&info.source_path);
            cmd.args([
                "-an",
                "-vf",
                &format!(
                    "fps={}/{},scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}",
                    target.fps.num, target.fps.den
                ),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "pipe:1",
            ]);
            cmd.stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());

            let mut child = cmd
                .spawn()
                .map_err(|e| ComposeError::Other(anyhow::anyhow!("failed to spawn ffmpeg: {e}")))?;
            let mut stdout = child.stdout.take().ok_or_else(|| {
                ComposeError::Other(anyhow::anyhow!("failed to open ffmpeg stdout (unexpected)"))
            })?;
            let mut stderr = child.stderr.take().ok_or_else(|| {
                ComposeError::Other(anyhow::anyhow!("failed to open ffmpeg stderr (unexpected)"))
            })?;
            let stderr_drain = std::thread::spawn(move || {
                let mut bytes = Vec::new();
                let _ = stderr.read_to_end(&mut bytes);
                bytes
            });

            let capacity = target.min_buffer_frames.max(1) * 2;
            let (tx, rx) = sync_channel::<Msg>(capacity);
            std::thread::spawn(move || {
                loop {
                    let mut buf = vec![0u8; frame_len];
                    match stdout.read_exact(&mut buf) {
                        Ok(()) => {
                            if tx.send(Msg::Frame(buf)).is_err() {
                                return;
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                            let stderr = stderr_drain.join().unwrap_or_default();
                            let msg = String::from_utf8_lossy(&stderr).trim().to_owned();
                            let _ = if msg.is_empty() {
                                tx.send(Msg::End)
                            } else {
                                tx.send(Msg::Fault(msg))
                            };
                            return;
                        }
                        Err(e) => {
                            let _ = tx.send(Msg::Fault(format!("read ffmpeg stdout: {e}")));
                            return;
                        }
                    }
                }
            });

            let mut dec = Self {
                child: Some(child),
                rx: Some(rx),
                prefill: VecDeque::new(),
                width: w,
                height: h,
                fps: target.fps,
                finished: false,
            };

            while dec.prefill.len() < target.min_buffer_frames.max(1) {
                let msg = dec.rx.as_ref().and_then(|rx| rx.recv().ok());
                match msg {
                    Some(Msg::Frame(bytes)) => {
                        let img = dec.to_image(bytes);
                        dec.prefill.push_back(img);
                    }
                    Some(Msg::Fault(e)) if dec.prefill.is_empty() => {
                        dec.close_inner();
                        return Err(ComposeError::Other(anyhow::anyhow!(
                            "ffmpeg decode failed for '{}': {e}",
                            info.source_path.display()
                        )));
                    }
                    Some(Msg::Fault(_) | Msg::End) | None => {
                        dec.finished = true;
                        break;
                    }
                }
            }
            if dec.prefill.is_empty() {
                dec.close_inner();
                return Err(ComposeError::Other(anyhow::anyhow!(
                    "ffmpeg produced no frames for '{}'",
                    info.source_path.display()
                )));
            }
            Ok(dec)
        }

        fn to_image(&self, mut bytes: Vec<u8>) -> PreparedImage {
            premultiply_rgba8_in_place(&mut bytes);
            PreparedImage::from_premul(self.width, self.height, bytes)
        }

        fn close_inner(&mut self) {
            self.rx = None;
            if let Some(mut child) = self.child.take() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }

    impl VideoDecoder for FfmpegVideoDecoder {
        fn fps(&self) -> Fps {
            self.fps
        }

        fn poll_frame(&mut self) -> FramePoll {
            if let Some(img) = self.prefill.pop_front() {
                return FramePoll::Frame(img);
            }
            if self.finished {
                return FramePoll::Ended;
            }
            let Some(rx) = self.rx.as_ref() else {
                return FramePoll::Ended;
            };
            match rx.try_recv() {
                Ok(Msg::Frame(bytes)) => FramePoll::Frame(self.to_image(bytes)),
                Ok(Msg::End) | Err(TryRecvError::Disconnected) => {
                    self.finished = true;
                    FramePoll::Ended
                }
                Ok(Msg::Fault(e)) => {
                    self.finished = true;
                    FramePoll::Failed(e)
                }
                Err(TryRecvError::Empty) => FramePoll::Pending,
            }
        }

        fn close(&mut self) {
            self.prefill.clear();
            self.finished = true;
            self.close_inner();
        }
    }

    impl Drop for FfmpegVideoDecoder {
        fn drop(&mut self) {
            self.close_inner();
        }
    }
}

/// Open a streaming decoder for `path`, cover-fit to `target` and prefilled.
#[cfg(feature = "media-ffmpeg")]
pub fn open_video_stream(
    path: &Path,
    trim: Option<TrimWindow>,
    target: &DecodeTarget,
) -> ComposeResult<Box<dyn VideoDecoder>> {
    let info = probe_video(path)?;
    let dec = stream::FfmpegVideoDecoder::open(&info, trim, target)?;
    Ok(Box::new(dec))
}

#[cfg(not(feature = "media-ffmpeg"))]
/// Open a streaming decoder for `path`, cover-fit to `target` and prefilled.
///
/// Returns an error when `media-ffmpeg` feature is disabled.
pub fn open_video_stream(
    _path: &Path,
    _trim: Option<TrimWindow>,
    _target: &DecodeTarget,
) -> ComposeResult<Box<dyn VideoDecoder>> {
    Err(feature_disabled())
}

#[cfg(feature = "media-ffmpeg")]
/// Decode audio from media source to stereo interleaved `f32` PCM.
pub fn decode_audio_f32_stereo(path: &Path, sample_rate: u32) -> ComposeResult<AudioPcm> {
    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            "2",
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| {
            ComposeError::Other(anyhow::anyhow!("failed to run ffmpeg for audio decode: {e}"))
        })?;

    if !out.status.success() {
        let msg = String::from_utf8_lossy(&out.stderr);
        // A source without an audio stream decodes to silence.
        if msg.contains("matches no streams")
            || msg.contains("Output file #0 does not contain any stream")
        {
            return Ok(AudioPcm {
                sample_rate,
                channels: 2,
                interleaved_f32: Vec::new(),
            });
        }
        return Err(ComposeError::Other(anyhow::anyhow!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            msg.trim()
        )));
    }

    if !out.stdout.len().is_multiple_of(4) {
        return Err(ComposeError::Other(anyhow::anyhow!(
            "decoded audio byte length is not aligned to f32 samples"
        )));
    }
    let pcm = out
        .stdout
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Ok(AudioPcm {
        sample_rate,
        channels: 2,
        interleaved_f32: pcm,
    })
}

#[cfg(not(feature = "media-ffmpeg"))]
/// Decode audio from media source to stereo interleaved `f32` PCM.
///
/// Returns an error when `media-ffmpeg` feature is disabled.
pub fn decode_audio_f32_stereo(_path: &Path, _sample_rate: u32) -> ComposeResult<AudioPcm> {
    Err(feature_disabled())
}

#[cfg(not(feature = "media-ffmpeg"))]
fn feature_disabled() -> ComposeError {
    ComposeError::Other(anyhow::anyhow!(
        "video/audio assets require the 'media-ffmpeg' feature"
    ))
}

#[cfg(test)]
#[path = "../../tests/unit/assets/media.rs"]
mod tests;
