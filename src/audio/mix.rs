use std::sync::Arc;

use crate::assets::media::AudioPcm;
use crate::foundation::error::{ComposeError, ComposeResult};
use crate::foundation::ledger::{HandleId, HandleKind, HandleLedger};
use crate::model::request::MusicSettings;

/// The two buses of a job's mix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BusKind {
    /// Per-clip narration, fixed unity gain.
    Narration,
    /// Looping background bed.
    Music,
}

/// Named gain stage. Gain stays in `[0,1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MixBus {
    /// Which bus this is.
    pub kind: BusKind,
    gain: f32,
    enabled: bool,
}

impl MixBus {
    fn new(kind: BusKind, gain: f32, enabled: bool) -> Self {
        Self {
            kind,
            gain: gain.clamp(0.0, 1.0),
            enabled,
        }
    }

    /// Configured gain.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Whether the bus contributes to the output.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Gain actually applied: the configured gain, or 0 while disabled.
    pub fn effective_gain(&self) -> f32 {
        if self.enabled { self.gain } else { 0.0 }
    }
}

#[derive(Debug)]
struct Voice {
    pcm: Arc<AudioPcm>,
    cursor_sec: f64,
    looped: bool,
}

/// Two-bus mixer producing one interleaved output track.
///
/// Music is toggled by zeroing its gain, never by disconnecting it; its position keeps advancing
/// either way. Narration sources are attached per clip and detached when the clip's window ends.
#[derive(Debug)]
pub struct AudioMixGraph {
    sample_rate: u32,
    channels: u16,
    narration_bus: MixBus,
    music_bus: MixBus,
    narration: Option<(usize, Voice)>,
    music: Option<Voice>,
    music_started: bool,
    rendered_frames: u64,
    ledger: HandleLedger,
    ledger_id: HandleId,
    closed: bool,
}

impl AudioMixGraph {
    /// Create the graph for one job.
    pub fn create(
        ledger: &HandleLedger,
        sample_rate: u32,
        channels: u16,
        music: &MusicSettings,
    ) -> ComposeResult<Self> {
        if sample_rate == 0 {
            return Err(ComposeError::validation("mix sample_rate must be > 0"));
        }
        if !(1..=2).contains(&channels) {
            return Err(ComposeError::validation("mix channels must be 1 or 2"));
        }
        if !music.volume.is_finite() {
            return Err(ComposeError::validation("music volume must be finite"));
        }
        let ledger_id = ledger.acquire(HandleKind::AudioGraph, "mix-graph");
        Ok(Self {
            sample_rate,
            channels,
            narration_bus: MixBus::new(BusKind::Narration, 1.0, true),
            music_bus: MixBus::new(BusKind::Music, music.volume, music.enabled),
            narration: None,
            music: None,
            music_started: false,
            rendered_frames: 0,
            ledger: ledger.clone(),
            ledger_id,
            closed: false,
        })
    }

    /// Output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Output channel count.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Current state of `kind`.
    pub fn bus(&self, kind: BusKind) -> MixBus {
        match kind {
            BusKind::Narration => self.narration_bus,
            BusKind::Music => self.music_bus,
        }
    }

    /// Set the music gain, clamped to `[0,1]`.
    pub fn set_music_volume(&mut self, volume: f32) -> ComposeResult<()> {
        if !volume.is_finite() {
            return Err(ComposeError::validation("music volume must be finite"));
        }
        self.music_bus.gain = volume.clamp(0.0, 1.0);
        Ok(())
    }

    /// Enable or mute the music bus.
    pub fn set_music_enabled(&mut self, enabled: bool) {
        self.music_bus.enabled = enabled;
    }

    /// Attach the looping music bed.
    pub fn set_music_source(&mut self, pcm: Arc<AudioPcm>) {
        self.music = Some(Voice {
            pcm,
            cursor_sec: 0.0,
            looped: true,
        });
    }

    /// Whether a music bed is attached.
    pub fn has_music(&self) -> bool {
        self.music.is_some()
    }

    /// Begin music playback. Returns `false` if it had already started.
    pub fn start_music(&mut self) -> bool {
        if self.music_started {
            return false;
        }
        self.music_started = true;
        tracing::debug!(
            attached = self.music.is_some(),
            gain = self.music_bus.effective_gain(),
            "music started"
        );
        true
    }

    /// Whether [`Self::start_music`] ran.
    pub fn music_started(&self) -> bool {
        self.music_started
    }

    /// Attach narration for clip `clip_index`, replacing any previous source.
    pub fn connect_narration(&mut self, clip_index: usize, pcm: Arc<AudioPcm>) {
        if let Some((prev, _)) = &self.narration {
            tracing::debug!(prev, clip_index, "replacing connected narration");
        }
        self.narration = Some((
            clip_index,
            Voice {
                pcm,
                cursor_sec: 0.0,
                looped: false,
            },
        ));
    }

    /// Detach narration of `clip_index`. Returns whether it was connected.
    pub fn disconnect_narration(&mut self, clip_index: usize) -> bool {
        if matches!(&self.narration, Some((i, _)) if *i == clip_index) {
            self.narration = None;
            true
        } else {
            false
        }
    }

    /// Clip whose narration is connected.
    pub fn connected_narration(&self) -> Option<usize> {
        self.narration.as_ref().map(|(i, _)| *i)
    }

    /// Frames rendered so far.
    pub fn rendered_frames(&self) -> u64 {
        self.rendered_frames
    }

    /// Mix the next `frames` frames into an interleaved buffer.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        let ch = usize::from(self.channels);
        let mut out = vec![0.0f32; frames * ch];
        if self.closed || frames == 0 {
            return out;
        }
        let sr = self.sample_rate;

        if let Some((_, voice)) = self.narration.as_mut() {
            mix_voice(&mut out, self.channels, sr, voice, self.narration_bus.effective_gain(), frames);
        }
        if self.music_started
            && let Some(voice) = self.music.as_mut()
        {
            mix_voice(&mut out, self.channels, sr, voice, self.music_bus.effective_gain(), frames);
        }

        for s in &mut out {
            *s = s.clamp(-1.0, 1.0);
        }
        self.rendered_frames += frames as u64;
        out
    }

    /// Render up to the job timeline position `elapsed_secs`.
    pub fn render_until(&mut self, elapsed_secs: f64) -> Vec<f32> {
        let target = (elapsed_secs.max(0.0) * f64::from(self.sample_rate)).round() as u64;
        let frames = target.saturating_sub(self.rendered_frames);
        self.render(frames as usize)
    }

    /// Detach every source and release the graph. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.narration = None;
        self.music = None;
        self.ledger.release(self.ledger_id);
    }

    /// Whether [`Self::close`] ran.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for AudioMixGraph {
    fn drop(&mut self) {
        if !self.closed {
            self.ledger.release_on_drop(self.ledger_id);
        }
    }
}

fn mix_voice(
    out: &mut [f32],
    out_channels: u16,
    sample_rate: u32,
    voice: &mut Voice,
    gain: f32,
    frames: usize,
) {
    let src = voice.pcm.interleaved_f32.as_slice();
    let src_channels = usize::from(voice.pcm.channels.max(1));
    let src_frames = voice.pcm.frames();
    let src_rate = f64::from(voice.pcm.sample_rate);
    let start = voice.cursor_sec;
    voice.cursor_sec += frames as f64 / f64::from(sample_rate);
    if src_frames == 0 || src_rate <= 0.0 || gain == 0.0 {
        return;
    }

    let out_ch = usize::from(out_channels);
    for i in 0..frames {
        let t = start + i as f64 / f64::from(sample_rate);
        let mut src_pos = t * src_rate;
        if voice.looped {
            src_pos %= src_frames as f64;
        }
        if !src_pos.is_finite() || src_pos < 0.0 {
            break;
        }
        let src_frame0 = src_pos.floor() as usize;
        if src_frame0 >= src_frames {
            break;
        }
        let src_frame1 = if voice.looped {
            (src_frame0 + 1) % src_frames
        } else {
            (src_frame0 + 1).min(src_frames - 1)
        };
        let frac = (src_pos - src_frame0 as f64) as f32;

        let (l, r) = if src_channels == 1 {
            let v0 = src[src_frame0];
            let v1 = src[src_frame1];
            let v = v0 + ((v1 - v0) * frac);
            (v, v)
        } else {
            let i0 = src_frame0 * src_channels;
            let i1 = src_frame1 * src_channels;
            let (l0, l1) = (src[i0], src[i1]);
            let (r0, r1) = (src[i0 + 1], src[i1 + 1]);
            (l0 + ((l1 - l0) * frac), r0 + ((r1 - r0) * frac))
        };

        let dst = i * out_ch;
        if out_ch == 1 {
            out[dst] += (l + r) * 0.5 * gain;
        } else {
            out[dst] += l * gain;
            out[dst + 1] += r * gain;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/audio/mix.rs"]
mod tests;
