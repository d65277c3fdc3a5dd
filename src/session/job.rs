use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::assets::loader::AssetLoader;
use crate::assets::media::AudioPcm;
use crate::audio::mix::AudioMixGraph;
use crate::audio::narration::{NarrationOutcome, NarrationStage};
use crate::compositor::driver::{ClipRuntime, CompositorLoop, LoopSettings, TickContext, TickOutcome};
use crate::compositor::timeline::Timeline;
use crate::encode::capture::{CaptureController, OutputAsset};
use crate::encode::sink::SinkFactory;
use crate::foundation::error::{ComposeError, ComposeResult};
use crate::foundation::ledger::HandleLedger;
use crate::model::opts::ComposerOpts;
use crate::model::request::{ComposeRequest, MusicSettings};
use crate::render::backend::Surface;
use crate::session::state::CompositionStateMachine;
use crate::text::overlay::CaptionOverlayRenderer;

/// Collaborators a job borrows from its composer.
pub(crate) struct JobEnv<'a> {
    pub opts: &'a ComposerOpts,
    pub loader: &'a AssetLoader,
    pub narration: NarrationStage,
    pub sinks: &'a dyn SinkFactory,
    pub surface: &'a mut dyn Surface,
    pub overlay: &'a CaptionOverlayRenderer,
    pub ledger: &'a HandleLedger,
    pub state: &'a CompositionStateMachine,
}

/// Loaded media and narration for every clip, plus the optional music bed.
struct Prepared {
    clips: Vec<ClipRuntime>,
    music: Option<AudioPcm>,
}

/// Load media, narration and music concurrently. Media failures fail the whole set; narration
/// and music failures degrade.
async fn prepare(
    request: &ComposeRequest,
    loader: &AssetLoader,
    narration: &NarrationStage,
    sample_rate: u32,
    cancel: &CancellationToken,
) -> ComposeResult<Prepared> {
    let (media, voices, music) = tokio::join!(
        loader.load_all(&request.clips, cancel),
        narration.narrate_all(&request.clips, cancel),
        load_music(loader, &request.music, sample_rate, cancel),
    );

    let (mut media, mut voices) = match (media, voices) {
        (Ok(m), Ok(v)) => (m, v),
        (Err(e), Ok(mut v)) => {
            v.iter_mut().for_each(NarrationOutcome::release);
            return Err(e);
        }
        (Ok(mut m), Err(e)) => {
            m.iter_mut().for_each(|h| h.release());
            return Err(e);
        }
        (Err(e), Err(_)) => return Err(e),
    };
    if cancel.is_cancelled() {
        media.iter_mut().for_each(|h| h.release());
        voices.iter_mut().for_each(NarrationOutcome::release);
        return Err(ComposeError::Cancelled);
    }

    let clips = request
        .clips
        .iter()
        .cloned()
        .zip(media)
        .zip(voices)
        .map(|((clip, media), voice)| ClipRuntime::new(clip, media, voice))
        .collect();
    Ok(Prepared { clips, music })
}

async fn load_music(
    loader: &AssetLoader,
    music: &MusicSettings,
    sample_rate: u32,
    cancel: &CancellationToken,
) -> Option<AudioPcm> {
    if !music.enabled {
        return None;
    }
    let track = music.track_id.as_deref()?;
    let loaded = tokio::select! {
        biased;
        _ = cancel.cancelled() => return None,
        loaded = loader.load_audio(track, sample_rate) => loaded,
    };
    match loaded {
        Ok(pcm) if pcm.frames() > 0 => Some(pcm),
        Ok(_) => {
            tracing::warn!(track, "music track is empty, continuing without music");
            None
        }
        Err(e) => {
            tracing::warn!(track, error = %e, "music load failed, continuing without music");
            None
        }
    }
}

/// Load everything a job would and report the effective schedule without capturing.
pub(crate) async fn plan_timeline(
    request: &ComposeRequest,
    loader: &AssetLoader,
    narration: &NarrationStage,
    sample_rate: u32,
    cancel: &CancellationToken,
) -> ComposeResult<Timeline> {
    request.validate()?;
    let mut prepared = prepare(request, loader, narration, sample_rate, cancel).await?;
    let narration_secs: Vec<Option<f64>> =
        prepared.clips.iter().map(ClipRuntime::narration_secs).collect();
    prepared.clips.iter_mut().for_each(ClipRuntime::release);
    Ok(Timeline::new(&request.clips, &narration_secs))
}

/// One composition run. Every handle it acquires is released by [`CompositionJob::run`] on
/// every exit path.
pub(crate) struct CompositionJob<'r> {
    request: &'r ComposeRequest,
    compositor: Option<CompositorLoop>,
    mix: Option<AudioMixGraph>,
    capture: Option<CaptureController>,
}

impl Drop for CompositionJob<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<'r> CompositionJob<'r> {
    pub(crate) fn new(request: &'r ComposeRequest) -> Self {
        Self {
            request,
            compositor: None,
            mix: None,
            capture: None,
        }
    }

    #[tracing::instrument(skip_all, fields(clips = self.request.clips.len()))]
    pub(crate) async fn run(
        mut self,
        mut env: JobEnv<'_>,
        cancel: &CancellationToken,
    ) -> ComposeResult<OutputAsset> {
        let result = self.execute(&mut env, cancel).await;
        self.release();
        let live = env.ledger.live();
        if live > 0 {
            tracing::warn!(live, labels = ?env.ledger.live_labels(), "handles still live after job");
        }
        result
    }

    async fn execute(
        &mut self,
        env: &mut JobEnv<'_>,
        cancel: &CancellationToken,
    ) -> ComposeResult<OutputAsset> {
        let request = self.request;
        let opts = env.opts;
        request.validate()?;

        let prepared = prepare(request, env.loader, &env.narration, opts.sample_rate, cancel).await?;
        let lp = self.compositor.insert(CompositorLoop::new(
            prepared.clips,
            LoopSettings::from_opts(opts, request.captions_enabled),
        ));
        tracing::info!(total_secs = lp.total_secs(), "assets ready");

        let mix = self.mix.insert(AudioMixGraph::create(
            env.ledger,
            opts.sample_rate,
            opts.channels,
            &request.music,
        )?);
        if let Some(pcm) = prepared.music {
            mix.set_music_source(Arc::new(pcm));
        }

        let sink = env.sinks.create().map_err(|e| match e {
            e @ (ComposeError::CaptureUnsupported(_) | ComposeError::CaptureIo(_)) => e,
            e => ComposeError::capture_unsupported(e.to_string()),
        })?;
        let capture = self.capture.insert(CaptureController::start(
            sink,
            &*env.surface,
            &*mix,
            opts,
            env.ledger,
        )?);
        mix.start_music();

        let mut interval = tokio::time::interval(opts.fps.frame_duration());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            let now = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ComposeError::Cancelled),
                now = interval.tick() => now,
            };
            let mut ctx = TickContext {
                surface: &mut *env.surface,
                overlay: env.overlay,
                mix: &mut *mix,
                capture: &mut *capture,
            };
            if lp.tick(now, &mut ctx)? == TickOutcome::Drained {
                break;
            }
            env.state.set_progress(lp.progress_percent());
            if lp.is_drained() {
                break;
            }
        }

        capture.stop(Duration::from_secs_f64(lp.elapsed_secs()))
    }

    fn release(&mut self) {
        if let Some(lp) = self.compositor.as_mut() {
            lp.release_all();
        }
        if let Some(capture) = self.capture.as_mut() {
            capture.abort();
        }
        if let Some(mix) = self.mix.as_mut() {
            mix.close();
        }
    }
}
