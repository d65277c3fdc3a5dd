use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use bytes::Bytes;

use crate::encode::sink::{CaptureFormat, EncodeSink, SinkConfig, concat_chunks};
use crate::foundation::core::Rgba8;
use crate::foundation::error::{ComposeError, ComposeResult};
use crate::foundation::math::mul_div255_u16;
use crate::render::backend::FrameRGBA;

const READ_CHUNK: usize = 64 * 1024;

/// Options for [`FfmpegSink`].
#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    /// Background used to flatten alpha.
    pub background: Rgba8,
    /// Directory for the audio/mux scratch files.
    pub scratch_dir: PathBuf,
}

impl Default for FfmpegSinkOpts {
    fn default() -> Self {
        Self {
            background: Rgba8::BLACK,
            scratch_dir: std::env::temp_dir(),
        }
    }
}

/// Sink that streams frames into the system `ffmpeg` and collects fragmented output from its
/// stdout while recording.
///
/// Mixed audio is spooled to an `f32le` scratch file and muxed onto the video in
/// [`EncodeSink::finalize`].
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,
    formats: Vec<CaptureFormat>,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    chunks_rx: Option<mpsc::Receiver<Bytes>>,
    stdout_pump: Option<std::thread::JoinHandle<std::io::Result<()>>>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    audio: Option<(PathBuf, BufWriter<File>)>,
    audio_samples: u64,
    scratch: Vec<u8>,
    cfg: Option<SinkConfig>,
    last_ts: Option<Duration>,
}

impl FfmpegSink {
    /// Sink whose formats are detected from `ffmpeg -encoders`.
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        let formats = detect_formats();
        Self::with_formats(opts, formats)
    }

    /// Sink with a fixed format list.
    pub fn with_formats(opts: FfmpegSinkOpts, formats: Vec<CaptureFormat>) -> Self {
        Self {
            opts,
            formats,
            child: None,
            stdin: None,
            chunks_rx: None,
            stdout_pump: None,
            stderr_drain: None,
            audio: None,
            audio_samples: 0,
            scratch: Vec::new(),
            cfg: None,
            last_ts: None,
        }
    }

    fn kill(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.chunks_rx = None;
        self.stdout_pump = None;
        self.stderr_drain = None;
        if let Some((path, _)) = self.audio.take() {
            let _ = std::fs::remove_file(path);
        }
        self.cfg = None;
    }
}

impl EncodeSink for FfmpegSink {
    fn supported_formats(&self) -> Vec<CaptureFormat> {
        self.formats.clone()
    }

    fn begin(&mut self, cfg: SinkConfig) -> ComposeResult<()> {
        if !self.formats.contains(&cfg.format) {
            return Err(ComposeError::capture_unsupported(format!(
                "ffmpeg cannot produce {:?} on this system",
                cfg.format
            )));
        }
        if cfg.fps.num == 0 || cfg.fps.den == 0 {
            return Err(ComposeError::validation("fps must be non-zero"));
        }
        if cfg.width == 0 || cfg.height == 0 {
            return Err(ComposeError::validation(
                "ffmpeg sink width/height must be non-zero",
            ));
        }
        if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
            return Err(ComposeError::validation(
                "ffmpeg sink width/height must be even (required for yuv420p output)",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // ffmpeg does not understand premul, so frames are flattened in push_frame.
        cmd.args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &format!("{}/{}", cfg.fps.num, cfg.fps.den),
            "-i",
            "pipe:0",
            "-an",
        ]);
        cmd.args(video_codec_args(cfg.format));
        cmd.arg("pipe:1");

        let mut child = cmd.spawn().map_err(|e| {
            ComposeError::capture_unsupported(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ComposeError::capture_io("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ComposeError::capture_io("failed to open ffmpeg stdout (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ComposeError::capture_io("failed to open ffmpeg stderr (unexpected)"))?;

        let (tx, rx) = mpsc::channel();
        let stdout_pump = std::thread::spawn(move || {
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                let n = stdout.read(&mut buf)?;
                if n == 0 || tx.send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                    return Ok(());
                }
            }
        });
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        let audio_path = scratch_path(&self.opts.scratch_dir, "pcm");
        ensure_parent_dir(&audio_path)?;
        let audio_file = File::create(&audio_path).map_err(|e| {
            ComposeError::capture_io(format!(
                "create audio spool '{}': {e}",
                audio_path.display()
            ))
        })?;

        tracing::info!(format = ?cfg.format, width = cfg.width, height = cfg.height, "ffmpeg capture started");
        self.scratch = vec![0u8; (cfg.width as usize) * (cfg.height as usize) * 4];
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.chunks_rx = Some(rx);
        self.stdout_pump = Some(stdout_pump);
        self.stderr_drain = Some(stderr_drain);
        self.audio = Some((audio_path, BufWriter::new(audio_file)));
        self.audio_samples = 0;
        self.cfg = Some(cfg);
        self.last_ts = None;
        Ok(())
    }

    fn push_frame(&mut self, ts: Duration, frame: &FrameRGBA) -> ComposeResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| ComposeError::capture_io("ffmpeg sink not started"))?;
        if self.last_ts.is_some_and(|last| ts < last) {
            return Err(ComposeError::capture_io(
                "ffmpeg sink received out-of-order frame timestamp",
            ));
        }
        self.last_ts = Some(ts);

        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(ComposeError::capture_io(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        if frame.premultiplied {
            flatten_premul_over_bg_to_opaque_rgba8(
                &mut self.scratch,
                &frame.data,
                self.opts.background,
            )?;
        } else {
            if frame.data.len() != self.scratch.len() {
                return Err(ComposeError::capture_io(
                    "frame.data size mismatch with width*height*4",
                ));
            }
            self.scratch.copy_from_slice(&frame.data);
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ComposeError::capture_io("ffmpeg sink is already finalized"));
        };
        stdin.write_all(&self.scratch).map_err(|e| {
            ComposeError::capture_io(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        Ok(())
    }

    fn push_audio(&mut self, samples: &[f32]) -> ComposeResult<()> {
        let Some((_, w)) = self.audio.as_mut() else {
            return Err(ComposeError::capture_io("ffmpeg sink not started"));
        };
        for s in samples {
            w.write_all(&s.to_le_bytes())
                .map_err(|e| ComposeError::capture_io(format!("write audio spool: {e}")))?;
        }
        self.audio_samples += samples.len() as u64;
        Ok(())
    }

    fn take_chunks(&mut self) -> Vec<Bytes> {
        match self.chunks_rx.as_ref() {
            Some(rx) => rx.try_iter().collect(),
            None => Vec::new(),
        }
    }

    fn finish(&mut self) -> ComposeResult<Vec<Bytes>> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| ComposeError::capture_io("ffmpeg sink not started"))?;
        let status = child.wait().map_err(|e| {
            ComposeError::capture_io(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;

        if let Some(pump) = self.stdout_pump.take() {
            pump.join()
                .map_err(|_| ComposeError::capture_io("ffmpeg stdout pump thread panicked"))?
                .map_err(|e| ComposeError::capture_io(format!("ffmpeg stdout read failed: {e}")))?;
        }
        let tail = self.take_chunks();
        self.chunks_rx = None;

        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ComposeError::capture_io("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| ComposeError::capture_io(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };
        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(ComposeError::capture_io(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        if let Some((_, w)) = self.audio.as_mut() {
            w.flush()
                .map_err(|e| ComposeError::capture_io(format!("flush audio spool: {e}")))?;
        }
        Ok(tail)
    }

    fn finalize(&mut self, chunks: Vec<Bytes>) -> ComposeResult<Bytes> {
        let video = concat_chunks(&chunks);
        let cfg = self
            .cfg
            .take()
            .ok_or_else(|| ComposeError::capture_io("ffmpeg sink not started"))?;
        let Some((audio_path, writer)) = self.audio.take() else {
            return Ok(video);
        };
        drop(writer);
        let result = if self.audio_samples == 0 {
            Ok(video)
        } else {
            mux_audio(&self.opts.scratch_dir, &cfg, &video, &audio_path)
        };
        let _ = std::fs::remove_file(&audio_path);
        result
    }

    fn abort(&mut self) {
        if self.cfg.is_some() || self.child.is_some() {
            tracing::info!("ffmpeg capture aborted");
        }
        self.kill();
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        self.kill();
    }
}

fn video_codec_args(format: CaptureFormat) -> &'static [&'static str] {
    match format {
        CaptureFormat::WebmVp9Opus => &[
            "-c:v",
            "libvpx-vp9",
            "-deadline",
            "realtime",
            "-cpu-used",
            "8",
            "-pix_fmt",
            "yuv420p",
            "-f",
            "webm",
        ],
        CaptureFormat::Mp4H264Aac => &[
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "frag_keyframe+empty_moov+default_base_moof",
            "-f",
            "mp4",
        ],
        CaptureFormat::RawRgba => &["-c:v", "rawvideo", "-pix_fmt", "rgba", "-f", "rawvideo"],
    }
}

fn audio_codec_args(format: CaptureFormat) -> &'static [&'static str] {
    match format {
        CaptureFormat::WebmVp9Opus => &["-c:a", "libopus", "-f", "webm"],
        CaptureFormat::Mp4H264Aac => &[
            "-c:a",
            "aac",
            "-movflags",
            "frag_keyframe+empty_moov+default_base_moof",
            "-f",
            "mp4",
        ],
        CaptureFormat::RawRgba => &[],
    }
}

fn mux_audio(
    scratch_dir: &Path,
    cfg: &SinkConfig,
    video: &[u8],
    audio_path: &Path,
) -> ComposeResult<Bytes> {
    if cfg.format == CaptureFormat::RawRgba {
        return Ok(Bytes::copy_from_slice(video));
    }
    let video_path = scratch_path(scratch_dir, cfg.format.extension());
    let out_path = scratch_path(scratch_dir, cfg.format.extension());
    std::fs::write(&video_path, video)
        .map_err(|e| ComposeError::capture_io(format!("spool video for mux: {e}")))?;

    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
        .arg(&video_path)
        .args([
            "-f",
            "f32le",
            "-ar",
            &cfg.sample_rate.to_string(),
            "-ac",
            &cfg.channels.to_string(),
            "-i",
        ])
        .arg(audio_path)
        .args(["-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy", "-shortest"])
        .args(audio_codec_args(cfg.format))
        .arg(&out_path)
        .stdin(Stdio::null())
        .output();

    let result = match output {
        Err(e) => Err(ComposeError::capture_io(format!("failed to spawn ffmpeg mux: {e}"))),
        Ok(out) if !out.status.success() => Err(ComposeError::capture_io(format!(
            "ffmpeg mux exited with status {}: {}",
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        ))),
        Ok(_) => std::fs::read(&out_path)
            .map(Bytes::from)
            .map_err(|e| ComposeError::capture_io(format!("read muxed output: {e}"))),
    };
    let _ = std::fs::remove_file(&video_path);
    let _ = std::fs::remove_file(&out_path);
    result
}

fn scratch_path(dir: &Path, ext: &str) -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    dir.join(format!("clipweave-{}-{n}.{ext}", std::process::id()))
}

/// Composite premultiplied RGBA8 over an opaque `bg`, writing straight opaque RGBA8.
pub(crate) fn flatten_premul_over_bg_to_opaque_rgba8(
    dst: &mut [u8],
    src_premul: &[u8],
    bg: Rgba8,
) -> ComposeResult<()> {
    if dst.len() != src_premul.len() || !dst.len().is_multiple_of(4) {
        return Err(ComposeError::capture_io(
            "flatten expects equal-length rgba8 buffers",
        ));
    }

    let bg = [u16::from(bg.r), u16::from(bg.g), u16::from(bg.b)];
    for (d, s) in dst.chunks_exact_mut(4).zip(src_premul.chunks_exact(4)) {
        let a = u16::from(s[3]);
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }
        let inv = 255 - a;
        for c in 0..3 {
            d[c] = (u16::from(s[c]) + mul_div255_u16(bg[c], inv)).min(255) as u8;
        }
        d[3] = 255;
    }
    Ok(())
}

/// Capture formats the local `ffmpeg` can encode. Empty when `ffmpeg` is missing.
pub fn detect_formats() -> Vec<CaptureFormat> {
    let Ok(out) = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
    else {
        return Vec::new();
    };
    if !out.status.success() {
        return Vec::new();
    }
    formats_from_encoder_list(&String::from_utf8_lossy(&out.stdout))
}

pub(crate) fn formats_from_encoder_list(listing: &str) -> Vec<CaptureFormat> {
    let encoders: Vec<&str> = listing
        .lines()
        .filter_map(|l| l.split_whitespace().nth(1))
        .collect();
    let has = |name: &str| encoders.contains(&name);
    let mut formats = Vec::new();
    if has("libvpx-vp9") && has("libopus") {
        formats.push(CaptureFormat::WebmVp9Opus);
    }
    if has("libx264") && has("aac") {
        formats.push(CaptureFormat::Mp4H264Aac);
    }
    if has("rawvideo") {
        formats.push(CaptureFormat::RawRgba);
    }
    formats
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ComposeResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
