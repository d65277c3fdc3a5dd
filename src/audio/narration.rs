use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use regex::{Captures, Regex};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::assets::media::{AudioPcm, decode_wav};
use crate::foundation::error::{ComposeError, ComposeResult};
use crate::foundation::ledger::{HandleId, HandleKind, HandleLedger};
use crate::model::request::{ClipDescriptor, NarrationSettings};

/// Speech synthesis boundary.
///
/// `Ok(None)` means the provider declined to voice the text; the clip stays silent.
#[async_trait::async_trait]
pub trait NarrationProvider: Send + Sync {
    /// Synthesize `text` with `voice_id`.
    async fn synthesize(&self, text: &str, voice_id: &str) -> ComposeResult<Option<AudioPcm>>;
}

struct MarkupPatterns {
    tag: Regex,
    stage: Regex,
    emphasis: Regex,
}

// Literal patterns, checked by the markup tests.
static MARKUP: LazyLock<MarkupPatterns> = LazyLock::new(|| MarkupPatterns {
    tag: Regex::new(r"<[^>]*>").expect("tag pattern"),
    stage: Regex::new(r"\[[^\]]*\]").expect("stage pattern"),
    emphasis: Regex::new(r"[*_~`#]+").expect("emphasis pattern"),
});

/// Remove markup a voice should not read: tags, bracketed stage directions and markdown
/// emphasis. Emphasis runs between two word characters (`snake_case`) are kept. Whitespace is
/// collapsed.
pub fn strip_narration_markup(text: &str) -> String {
    let p = &*MARKUP;
    let s = p.tag.replace_all(text, " ");
    let s = p.stage.replace_all(&s, " ");
    let cleaned = p
        .emphasis
        .replace_all(&s, |caps: &Captures<'_>| inner_run(&s, caps));
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The matched run if it sits inside a word, otherwise nothing.
fn inner_run(text: &str, caps: &Captures<'_>) -> String {
    let Some(m) = caps.get(0) else {
        return String::new();
    };
    let wordy = |c: Option<char>| c.is_some_and(char::is_alphanumeric);
    if wordy(text[..m.start()].chars().next_back()) && wordy(text[m.end()..].chars().next()) {
        m.as_str().to_owned()
    } else {
        String::new()
    }
}

/// Synthesized narration owned by one clip. Registered in the ledger until released.
pub struct NarrationHandle {
    clip_id: String,
    pcm: Arc<AudioPcm>,
    ledger: HandleLedger,
    ledger_id: HandleId,
    released: bool,
}

impl NarrationHandle {
    pub(crate) fn new(clip_id: &str, pcm: AudioPcm, ledger: &HandleLedger) -> Self {
        Self {
            clip_id: clip_id.to_owned(),
            pcm: Arc::new(pcm),
            ledger_id: ledger.acquire(HandleKind::Narration, clip_id),
            ledger: ledger.clone(),
            released: false,
        }
    }

    /// Owning clip.
    pub fn clip_id(&self) -> &str {
        &self.clip_id
    }

    /// Playable audio.
    pub fn pcm(&self) -> Arc<AudioPcm> {
        self.pcm.clone()
    }

    /// Measured length in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.pcm.duration_secs()
    }

    /// Release the ledger entry. Idempotent.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.ledger.release(self.ledger_id);
        }
    }
}

impl Drop for NarrationHandle {
    fn drop(&mut self) {
        if !self.released {
            self.ledger.release_on_drop(self.ledger_id);
        }
    }
}

impl std::fmt::Debug for NarrationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarrationHandle")
            .field("clip_id", &self.clip_id)
            .field("duration_secs", &self.duration_secs())
            .field("released", &self.released)
            .finish()
    }
}

/// Why a clip has no narration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SilentReason {
    /// Narration is off for the job.
    Disabled,
    /// Nothing narratable in the caption.
    NoCaption,
    /// The provider returned no audio.
    Declined,
    /// Synthesis failed; the clip runs captioned but silent.
    Failed(String),
}

/// Narration result for one clip.
#[derive(Debug)]
pub enum NarrationOutcome {
    /// Audio to play while the clip is on screen.
    Voiced(NarrationHandle),
    /// No audio.
    Silent(SilentReason),
}

impl NarrationOutcome {
    /// Narration length when voiced.
    pub fn duration_secs(&self) -> Option<f64> {
        match self {
            Self::Voiced(h) => Some(h.duration_secs()),
            Self::Silent(_) => None,
        }
    }

    /// Release a voiced handle. Idempotent.
    pub fn release(&mut self) {
        if let Self::Voiced(h) = self {
            h.release();
        }
    }
}

/// Runs the provider for every clip of a job and applies the silent-on-failure policy.
#[derive(Clone)]
pub struct NarrationStage {
    provider: Arc<dyn NarrationProvider>,
    ledger: HandleLedger,
    settings: NarrationSettings,
}

impl NarrationStage {
    /// Stage bound to one job's settings.
    pub fn new(
        provider: Arc<dyn NarrationProvider>,
        ledger: HandleLedger,
        settings: NarrationSettings,
    ) -> Self {
        Self {
            provider,
            ledger,
            settings,
        }
    }

    /// Narrate one clip. Never fails: synthesis errors become [`SilentReason::Failed`].
    #[tracing::instrument(skip(self, clip), fields(clip = %clip.id))]
    pub async fn narrate(&self, clip: &ClipDescriptor) -> NarrationOutcome {
        if !self.settings.enabled {
            return NarrationOutcome::Silent(SilentReason::Disabled);
        }
        let Some(caption) = clip.caption_text() else {
            return NarrationOutcome::Silent(SilentReason::NoCaption);
        };
        let script = strip_narration_markup(caption);
        if script.is_empty() {
            return NarrationOutcome::Silent(SilentReason::NoCaption);
        }

        match self
            .provider
            .synthesize(&script, &self.settings.voice_id)
            .await
        {
            Ok(Some(pcm)) if pcm.frames() > 0 && pcm.sample_rate > 0 => {
                let handle = NarrationHandle::new(&clip.id, pcm, &self.ledger);
                tracing::debug!(duration = handle.duration_secs(), "narration ready");
                NarrationOutcome::Voiced(handle)
            }
            Ok(_) => NarrationOutcome::Silent(SilentReason::Declined),
            Err(e) => {
                tracing::warn!(error = %e, "narration synthesis failed, clip stays silent");
                NarrationOutcome::Silent(SilentReason::Failed(e.to_string()))
            }
        }
    }

    /// Narrate every clip concurrently. Results keep descriptor order.
    ///
    /// On cancellation every voiced handle produced so far is released.
    pub async fn narrate_all(
        &self,
        clips: &[ClipDescriptor],
        cancel: &CancellationToken,
    ) -> ComposeResult<Vec<NarrationOutcome>> {
        let mut slots: Vec<Option<NarrationOutcome>> = clips.iter().map(|_| None).collect();
        let mut pending: FuturesUnordered<_> = clips
            .iter()
            .enumerate()
            .map(|(i, clip)| async move { (i, self.narrate(clip).await) })
            .collect();

        let cancelled = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break true,
                next = pending.next() => match next {
                    None => break false,
                    Some((i, outcome)) => slots[i] = Some(outcome),
                },
            }
        };
        drop(pending);

        if cancelled {
            for o in slots.iter_mut().flatten() {
                o.release();
            }
            return Err(ComposeError::Cancelled);
        }
        slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ComposeError::Other(anyhow::anyhow!("narration stream ended early")))
    }
}

/// Provider that voices nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoNarration;

#[async_trait::async_trait]
impl NarrationProvider for NoNarration {
    async fn synthesize(&self, _text: &str, _voice_id: &str) -> ComposeResult<Option<AudioPcm>> {
        Ok(None)
    }
}

/// Runs an external TTS program: script on stdin, WAV on stdout.
///
/// `{voice}` in any argument is replaced by the requested voice id.
#[derive(Clone, Debug)]
pub struct CommandNarrationProvider {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandNarrationProvider {
    /// Provider invoking `program` with `args`.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_secs(60),
        }
    }

    /// Per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, text: &str, voice_id: &str) -> ComposeResult<Vec<u8>> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(self.args.iter().map(|a| a.replace("{voice}", voice_id)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd.spawn().map_err(|e| {
            ComposeError::synthesis(format!("failed to spawn '{}': {e}", self.program))
        })?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ComposeError::synthesis("failed to open tts stdin (unexpected)"))?;
        stdin
            .write_all(text.as_bytes())
            .await
            .map_err(|e| ComposeError::synthesis(format!("write tts stdin: {e}")))?;
        drop(stdin);

        let out = child
            .wait_with_output()
            .await
            .map_err(|e| ComposeError::synthesis(format!("wait for tts: {e}")))?;
        if !out.status.success() {
            return Err(ComposeError::synthesis(format!(
                "'{}' exited with status {}: {}",
                self.program,
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(out.stdout)
    }
}

#[async_trait::async_trait]
impl NarrationProvider for CommandNarrationProvider {
    async fn synthesize(&self, text: &str, voice_id: &str) -> ComposeResult<Option<AudioPcm>> {
        let bytes = tokio::time::timeout(self.timeout, self.run(text, voice_id))
            .await
            .map_err(|_| {
                ComposeError::synthesis(format!(
                    "tts timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })??;
        if bytes.is_empty() {
            return Ok(None);
        }
        decode_wav(&bytes)
            .map(Some)
            .map_err(|e| ComposeError::synthesis(format!("decode tts output: {e}")))
    }
}

#[derive(Clone, Debug)]
enum Script {
    Voice { secs: f64, delay: Duration },
    Fail(String),
}

/// In-memory provider returning a fixed-length tone per script text.
///
/// Unknown scripts are declined.
#[derive(Debug, Default)]
pub struct ScriptedNarration {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedNarration {
    /// Sample rate of produced audio.
    pub const SAMPLE_RATE: u32 = 8_000;

    /// Empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Voice `text` with `secs` of audio.
    pub fn with_voice(mut self, text: &str, secs: f64) -> Self {
        self.scripts.insert(
            text.to_owned(),
            Script::Voice {
                secs,
                delay: Duration::ZERO,
            },
        );
        self
    }

    /// Voice `text` after `delay`.
    pub fn with_slow_voice(mut self, text: &str, secs: f64, delay: Duration) -> Self {
        self.scripts
            .insert(text.to_owned(), Script::Voice { secs, delay });
        self
    }

    /// Synthesis of `text` fails.
    pub fn with_failure(mut self, text: &str, message: &str) -> Self {
        self.scripts
            .insert(text.to_owned(), Script::Fail(message.to_owned()));
        self
    }

    /// `(text, voice)` pairs received so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait::async_trait]
impl NarrationProvider for ScriptedNarration {
    async fn synthesize(&self, text: &str, voice_id: &str) -> ComposeResult<Option<AudioPcm>> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((text.to_owned(), voice_id.to_owned()));
        match self.scripts.get(text).cloned() {
            None => Ok(None),
            Some(Script::Fail(msg)) => Err(ComposeError::synthesis(msg)),
            Some(Script::Voice { secs, delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let frames = (secs.max(0.0) * f64::from(Self::SAMPLE_RATE)).round() as usize;
                Ok(Some(AudioPcm {
                    sample_rate: Self::SAMPLE_RATE,
                    channels: 1,
                    interleaved_f32: vec![0.25; frames],
                }))
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/audio/narration.rs"]
mod tests;
