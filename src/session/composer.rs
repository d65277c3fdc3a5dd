use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::assets::loader::{AssetLoader, MediaBackend};
use crate::audio::narration::{NarrationProvider, NarrationStage};
use crate::compositor::timeline::Timeline;
use crate::encode::capture::OutputAsset;
use crate::encode::sink::SinkFactory;
use crate::foundation::core::Canvas;
use crate::foundation::error::{ComposeError, ComposeResult, FailureCause};
use crate::foundation::ledger::HandleLedger;
use crate::model::opts::ComposerOpts;
use crate::model::request::ComposeRequest;
use crate::render::backend::Surface;
use crate::session::job::{CompositionJob, JobEnv, plan_timeline};
use crate::session::state::{CompositionState, CompositionStateMachine};
use crate::text::overlay::CaptionOverlayRenderer;
use crate::text::wrap::{CaptionLayoutCache, SharedLayoutCache};

/// Entry point: owns the drawing surface, the layout cache and the external collaborators, and
/// runs one composition job at a time.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use clipweave::*;
/// # async fn demo(backend: Arc<dyn MediaBackend>, req: ComposeRequest) -> ComposeResult<()> {
/// let opts = ComposerOpts::default();
/// let surface = CpuSurface::new(opts.canvas.width, opts.canvas.height)?;
/// let sinks = || -> ComposeResult<Box<dyn EncodeSink>> { Ok(Box::new(InMemorySink::new())) };
/// let mut composer = Composer::new(
///     opts,
///     backend,
///     Arc::new(NoNarration),
///     Arc::new(sinks),
///     Box::new(surface),
/// )?;
/// let asset = composer.compose(&req, tokio_util::sync::CancellationToken::new()).await?;
/// asset.write_to("out.rgba")?;
/// # Ok(())
/// # }
/// ```
pub struct Composer {
    opts: ComposerOpts,
    backend: Arc<dyn MediaBackend>,
    narrator: Arc<dyn NarrationProvider>,
    sinks: Arc<dyn SinkFactory>,
    surface: Box<dyn Surface>,
    layout_cache: SharedLayoutCache,
    overlay: CaptionOverlayRenderer,
    ledger: HandleLedger,
    state: CompositionStateMachine,
}

impl Composer {
    /// Composer drawing into `surface`. The surface is resized to `opts.canvas`.
    pub fn new(
        opts: ComposerOpts,
        backend: Arc<dyn MediaBackend>,
        narrator: Arc<dyn NarrationProvider>,
        sinks: Arc<dyn SinkFactory>,
        mut surface: Box<dyn Surface>,
    ) -> ComposeResult<Self> {
        opts.validate()?;
        if (surface.width(), surface.height()) != (opts.canvas.width, opts.canvas.height) {
            surface.resize(opts.canvas.width, opts.canvas.height)?;
        }
        let layout_cache = CaptionLayoutCache::shared(opts.layout_cache_capacity);
        let overlay = CaptionOverlayRenderer::new(layout_cache.clone(), opts.caption_width_ratio);
        overlay.surface_resized(opts.canvas.width);
        Ok(Self {
            opts,
            backend,
            narrator,
            sinks,
            surface,
            layout_cache,
            overlay,
            ledger: HandleLedger::new(),
            state: CompositionStateMachine::new(),
        })
    }

    /// Share `cache` instead of the composer's own, e.g. across composers in one process.
    pub fn with_layout_cache(mut self, cache: SharedLayoutCache) -> Self {
        self.overlay = CaptionOverlayRenderer::new(cache.clone(), self.opts.caption_width_ratio);
        self.overlay.surface_resized(self.surface.width());
        self.layout_cache = cache;
        self
    }

    /// Register handles in `ledger` instead of a private one.
    pub fn with_ledger(mut self, ledger: HandleLedger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Options in effect.
    pub fn opts(&self) -> &ComposerOpts {
        &self.opts
    }

    /// Handle registry, for leak checks.
    pub fn ledger(&self) -> &HandleLedger {
        &self.ledger
    }

    /// Layout cache used for captions.
    pub fn layout_cache(&self) -> SharedLayoutCache {
        self.layout_cache.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CompositionState {
        self.state.state()
    }

    /// Observe every state change.
    pub fn subscribe(&self) -> watch::Receiver<CompositionState> {
        self.state.subscribe()
    }

    /// Resize the drawing surface. The layout cache moves to the new width band.
    pub fn resize_surface(&mut self, width: u32, height: u32) -> ComposeResult<()> {
        let canvas = Canvas::new(width, height)?;
        self.surface.resize(width, height)?;
        self.opts.canvas = canvas;
        self.overlay.surface_resized(width);
        Ok(())
    }

    fn loader(&self) -> AssetLoader {
        AssetLoader::new(self.backend.clone(), self.ledger.clone(), &self.opts)
    }

    fn narration(&self, request: &ComposeRequest) -> NarrationStage {
        NarrationStage::new(
            self.narrator.clone(),
            self.ledger.clone(),
            request.narration.clone(),
        )
    }

    /// Run one job to completion.
    ///
    /// An empty clip list is refused without leaving the current state. Otherwise the state
    /// moves to `Processing` and ends in `Completed` or `Failed` with the originating cause;
    /// every acquired handle is released on every path.
    pub async fn compose(
        &mut self,
        request: &ComposeRequest,
        cancel: CancellationToken,
    ) -> ComposeResult<OutputAsset> {
        self.state.begin(request.clips.len())?;
        let _settle = SettleOnDrop { state: &self.state };

        let loader = self.loader();
        let env = JobEnv {
            opts: &self.opts,
            loader: &loader,
            narration: self.narration(request),
            sinks: self.sinks.as_ref(),
            surface: self.surface.as_mut(),
            overlay: &self.overlay,
            ledger: &self.ledger,
            state: &self.state,
        };
        let result = CompositionJob::new(request).run(env, &cancel).await;

        let settled = match &result {
            Ok(asset) => self.state.complete(asset.clone()),
            Err(e) => self.state.fail(FailureCause::from(e)),
        };
        if let Err(e) = settled {
            tracing::warn!(error = %e, "state transition after job failed");
        }
        result
    }

    /// Load assets and narration and return the effective schedule without capturing.
    ///
    /// Does not touch the composition state.
    pub async fn plan(
        &self,
        request: &ComposeRequest,
        cancel: CancellationToken,
    ) -> ComposeResult<Timeline> {
        let loader = self.loader();
        plan_timeline(
            request,
            &loader,
            &self.narration(request),
            self.opts.sample_rate,
            &cancel,
        )
        .await
    }
}

/// Fails a job whose `compose` future was dropped before it settled, so the next job can start.
struct SettleOnDrop<'a> {
    state: &'a CompositionStateMachine,
}

impl Drop for SettleOnDrop<'_> {
    fn drop(&mut self) {
        if self.state.is_processing() {
            tracing::warn!("compose future dropped mid-job, marking it cancelled");
            let _ = self
                .state
                .fail(FailureCause::from(&ComposeError::Cancelled));
        }
    }
}

impl std::fmt::Debug for Composer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composer")
            .field("canvas", &self.opts.canvas)
            .field("state", &self.state.state())
            .field("ledger", &self.ledger)
            .finish()
    }
}
