use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::assets::handle::MediaHandle;
use crate::audio::mix::AudioMixGraph;
use crate::audio::narration::NarrationOutcome;
use crate::compositor::slot::FrameSlot;
use crate::compositor::timeline::effective_duration;
use crate::encode::capture::CaptureController;
use crate::foundation::core::Rgba8;
use crate::foundation::error::{ComposeError, ComposeResult};
use crate::model::opts::ComposerOpts;
use crate::model::request::ClipDescriptor;
use crate::render::backend::Surface;
use crate::text::overlay::CaptionOverlayRenderer;

/// A clip with everything resolved for playback.
#[derive(Debug)]
pub struct ClipRuntime {
    clip: ClipDescriptor,
    media: MediaHandle,
    narration: NarrationOutcome,
    effective_secs: f64,
}

impl ClipRuntime {
    /// Pair a clip with its loaded media and narration.
    pub fn new(clip: ClipDescriptor, media: MediaHandle, narration: NarrationOutcome) -> Self {
        let effective_secs = effective_duration(clip.duration_sec, narration.duration_secs());
        Self {
            clip,
            media,
            narration,
            effective_secs,
        }
    }

    /// Clip descriptor.
    pub fn clip(&self) -> &ClipDescriptor {
        &self.clip
    }

    /// Time the clip stays on screen.
    pub fn effective_secs(&self) -> f64 {
        self.effective_secs
    }

    /// Voiced narration length, when any.
    pub fn narration_secs(&self) -> Option<f64> {
        self.narration.duration_secs()
    }

    pub(crate) fn release(&mut self) {
        self.media.pause();
        self.media.release();
        self.narration.release();
    }
}

/// Where the loop stands.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoopState {
    /// Clip `index` activates on the next tick, starting `carry_secs` in.
    AwaitingClip {
        /// Clip to activate.
        index: usize,
        /// Overshoot carried from the previous clip.
        carry_secs: f64,
    },
    /// Clip `index` is on screen.
    Rendering {
        /// Active clip.
        index: usize,
        /// Time since the clip activated.
        elapsed_secs: f64,
    },
    /// Every clip played.
    Drained,
}

/// Result of one [`CompositorLoop::tick`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// A tick ran for clip `index`.
    Frame {
        /// Clip that was active.
        index: usize,
        /// Media was drawn and the frame captured.
        drawn: bool,
        /// The clip's window ended on this tick.
        advanced: bool,
    },
    /// A draw was already in flight; nothing happened.
    Dropped,
    /// No clips remain.
    Drained,
}

/// Media notification observed during playback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaEvent {
    /// Clip media reached its end.
    Ended(usize),
    /// Clip media faulted.
    Error(usize, String),
}

/// Everything a tick draws into, borrowed from the job for the duration of the tick.
pub struct TickContext<'a> {
    /// Drawing target.
    pub surface: &'a mut dyn Surface,
    /// Caption renderer.
    pub overlay: &'a CaptionOverlayRenderer,
    /// Job audio graph.
    pub mix: &'a mut AudioMixGraph,
    /// Job recording.
    pub capture: &'a mut CaptureController,
}

/// Loop tunables.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoopSettings {
    /// Surface clear color.
    pub clear_color: Rgba8,
    /// Clamp on one tick's delta.
    pub max_tick_delta: Duration,
    /// Fail after this long without a drawn frame.
    pub stall_timeout: Duration,
    /// Draw caption overlays.
    pub captions_enabled: bool,
}

impl LoopSettings {
    /// Settings from composer options.
    pub fn from_opts(opts: &ComposerOpts, captions_enabled: bool) -> Self {
        Self {
            clear_color: opts.clear_color,
            max_tick_delta: opts.max_tick_delta(),
            stall_timeout: opts.stall_timeout(),
            captions_enabled,
        }
    }
}

/// Drives clips in order, one tick at a time.
///
/// Each tick draws the active clip's frame cover-fit, then its caption, captures the frame,
/// renders mixed audio up to the job time and advances when the clip's effective duration has
/// elapsed. Overshoot carries into the next clip.
pub struct CompositorLoop {
    clips: Vec<ClipRuntime>,
    settings: LoopSettings,
    state: LoopState,
    slot: FrameSlot,
    last_tick: Option<Instant>,
    last_drawn: Option<Instant>,
    job_elapsed_secs: f64,
    ticks: u64,
    faults: u64,
    events: Arc<Mutex<Vec<MediaEvent>>>,
}

impl CompositorLoop {
    /// Loop over `clips` in order.
    pub fn new(clips: Vec<ClipRuntime>, settings: LoopSettings) -> Self {
        let state = if clips.is_empty() {
            LoopState::Drained
        } else {
            LoopState::AwaitingClip {
                index: 0,
                carry_secs: 0.0,
            }
        };
        Self {
            clips,
            settings,
            state,
            slot: FrameSlot::new(),
            last_tick: None,
            last_drawn: None,
            job_elapsed_secs: 0.0,
            ticks: 0,
            faults: 0,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Current state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Whether every clip played.
    pub fn is_drained(&self) -> bool {
        self.state == LoopState::Drained
    }

    /// Single-draw guard.
    pub fn slot(&self) -> &FrameSlot {
        &self.slot
    }

    /// Index of the active or next clip; the clip count once drained.
    pub fn current_index(&self) -> usize {
        match self.state {
            LoopState::AwaitingClip { index, .. } | LoopState::Rendering { index, .. } => index,
            LoopState::Drained => self.clips.len(),
        }
    }

    /// `current_index / clip count` as a percentage.
    pub fn progress_percent(&self) -> u8 {
        if self.clips.is_empty() {
            return 100;
        }
        ((self.current_index() * 100) / self.clips.len()).min(100) as u8
    }

    /// Job time accumulated so far.
    pub fn elapsed_secs(&self) -> f64 {
        self.job_elapsed_secs
    }

    /// Ticks that ran.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Frames skipped because of a draw fault.
    pub fn faults(&self) -> u64 {
        self.faults
    }

    /// Media notifications seen so far.
    pub fn media_events(&self) -> Vec<MediaEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Sum of effective durations of every clip.
    pub fn total_secs(&self) -> f64 {
        self.clips.iter().map(|c| c.effective_secs).sum()
    }

    /// Run one tick at `now`.
    ///
    /// Errors are fatal for the job: capture write failures and the stall watchdog. A draw fault
    /// only skips the frame.
    pub fn tick(&mut self, now: Instant, ctx: &mut TickContext<'_>) -> ComposeResult<TickOutcome> {
        let Some(_permit) = self.slot.try_acquire() else {
            return Ok(TickOutcome::Dropped);
        };

        let delta = match self.last_tick.replace(now) {
            Some(prev) => now
                .saturating_duration_since(prev)
                .min(self.settings.max_tick_delta)
                .as_secs_f64(),
            None => 0.0,
        };

        let (index, elapsed) = match self.state {
            LoopState::Drained => return Ok(TickOutcome::Drained),
            LoopState::AwaitingClip { index, carry_secs } => {
                self.activate(index, ctx.mix);
                (index, carry_secs)
            }
            LoopState::Rendering {
                index,
                elapsed_secs,
            } => (index, elapsed_secs),
        };

        let drawn = self.draw(index, elapsed, ctx)?;
        let last_drawn = *self.last_drawn.get_or_insert(now);
        if drawn {
            self.last_drawn = Some(now);
        } else if now.saturating_duration_since(last_drawn) >= self.settings.stall_timeout {
            return Err(ComposeError::stalled(format!(
                "no frame drawn for {}ms (clip '{}')",
                self.settings.stall_timeout.as_millis(),
                self.clips[index].clip.id
            )));
        }

        self.job_elapsed_secs += delta;
        let samples = ctx.mix.render_until(self.job_elapsed_secs);
        ctx.capture.record_audio(&samples)?;

        let elapsed = elapsed + delta;
        let effective = self.clips[index].effective_secs;
        let advanced = elapsed >= effective;
        self.state = if advanced {
            self.finish(index, ctx.mix);
            let next = index + 1;
            if next >= self.clips.len() {
                tracing::info!(
                    ticks = self.ticks + 1,
                    elapsed = self.job_elapsed_secs,
                    dropped = self.slot.dropped_ticks(),
                    faults = self.faults,
                    "compositor drained"
                );
                LoopState::Drained
            } else {
                LoopState::AwaitingClip {
                    index: next,
                    carry_secs: elapsed - effective,
                }
            }
        } else {
            LoopState::Rendering {
                index,
                elapsed_secs: elapsed,
            }
        };
        self.ticks += 1;

        Ok(TickOutcome::Frame {
            index,
            drawn,
            advanced,
        })
    }

    fn activate(&mut self, index: usize, mix: &mut AudioMixGraph) {
        let rt = &mut self.clips[index];
        let events = self.events.clone();
        rt.media.on_ended(move || {
            events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(MediaEvent::Ended(index));
        });
        let events = self.events.clone();
        rt.media.on_error(move |msg| {
            events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(MediaEvent::Error(index, msg.to_owned()));
        });
        rt.media.play();
        if let NarrationOutcome::Voiced(h) = &rt.narration {
            mix.connect_narration(index, h.pcm());
        }
        tracing::debug!(
            index,
            clip = %rt.clip.id,
            effective = rt.effective_secs,
            voiced = rt.narration.duration_secs().is_some(),
            "clip active"
        );
    }

    fn finish(&mut self, index: usize, mix: &mut AudioMixGraph) {
        mix.disconnect_narration(index);
        let rt = &mut self.clips[index];
        rt.release();
        tracing::debug!(index, clip = %rt.clip.id, "clip window ended");
    }

    /// Clear, draw media cover-fit, draw the caption, present and capture.
    fn draw(&mut self, index: usize, elapsed: f64, ctx: &mut TickContext<'_>) -> ComposeResult<bool> {
        let ts = Duration::from_secs_f64(self.job_elapsed_secs.max(0.0));
        let tick = self.ticks;
        ctx.surface.clear(self.settings.clear_color);

        let rt = &mut self.clips[index];
        let fault = match rt.media.frame_at(elapsed) {
            None => return Ok(false),
            Some(image) => ctx.surface.draw_image_cover(image).err(),
        };
        if fault.is_none()
            && self.settings.captions_enabled
            && let Some(caption) = rt.clip.caption.as_ref()
        {
            ctx.overlay.draw_caption(ctx.surface, caption, tick);
        }
        let presented = match fault {
            Some(e) => Err(e),
            None => ctx.surface.present(),
        };

        match presented {
            Ok(frame) => {
                ctx.capture.record_frame(ts, &frame)?;
                Ok(true)
            }
            Err(e) => {
                self.faults += 1;
                tracing::warn!(tick, clip = %self.clips[index].clip.id, error = %e, "frame draw failed, skipping frame");
                Ok(false)
            }
        }
    }

    /// Release every clip's media and narration. Idempotent.
    pub fn release_all(&mut self) {
        for rt in &mut self.clips {
            rt.release();
        }
    }
}

impl std::fmt::Debug for CompositorLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositorLoop")
            .field("clips", &self.clips.len())
            .field("state", &self.state)
            .field("ticks", &self.ticks)
            .field("elapsed_secs", &self.job_elapsed_secs)
            .finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compositor/driver.rs"]
mod tests;
