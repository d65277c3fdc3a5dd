use tokio::sync::watch;

use crate::encode::capture::OutputAsset;
use crate::foundation::error::{ComposeError, ComposeResult, FailureCause};

/// Lifecycle of the composer.
#[derive(Clone, Debug, PartialEq)]
pub enum CompositionState {
    /// No job has run yet.
    Idle,
    /// A job is running.
    Processing {
        /// Percentage of clips completed, `0..=100`.
        progress: u8,
    },
    /// The last job finished.
    Completed(OutputAsset),
    /// The last job failed or was cancelled.
    Failed(FailureCause),
}

impl CompositionState {
    /// Whether this is `Completed` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }

    /// Progress while processing, 100 once completed.
    pub fn progress(&self) -> Option<u8> {
        match self {
            Self::Processing { progress } => Some(*progress),
            Self::Completed(_) => Some(100),
            Self::Idle | Self::Failed(_) => None,
        }
    }
}

/// Owns the state and publishes every change to subscribers.
#[derive(Debug)]
pub struct CompositionStateMachine {
    tx: watch::Sender<CompositionState>,
}

impl Default for CompositionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositionStateMachine {
    /// Machine in `Idle`.
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(CompositionState::Idle),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> CompositionState {
        self.tx.borrow().clone()
    }

    /// Receiver observing every published state.
    pub fn subscribe(&self) -> watch::Receiver<CompositionState> {
        self.tx.subscribe()
    }

    /// Whether a job is running.
    pub fn is_processing(&self) -> bool {
        matches!(*self.tx.borrow(), CompositionState::Processing { .. })
    }

    /// Enter `Processing` for a job of `clip_count` clips.
    ///
    /// Refused (state unchanged) while a job runs or when there are no clips. Terminal states
    /// start a fresh job.
    pub fn begin(&self, clip_count: usize) -> ComposeResult<()> {
        if self.is_processing() {
            return Err(ComposeError::validation("a composition job is already running"));
        }
        if clip_count == 0 {
            return Err(ComposeError::validation(
                "composition requires at least one clip",
            ));
        }
        self.tx
            .send_replace(CompositionState::Processing { progress: 0 });
        tracing::info!(clips = clip_count, "composition processing");
        Ok(())
    }

    /// Raise progress. Lower values and calls outside `Processing` are ignored.
    pub fn set_progress(&self, percent: u8) {
        let percent = percent.min(100);
        self.tx.send_if_modified(|s| match s {
            CompositionState::Processing { progress } if percent > *progress => {
                *progress = percent;
                true
            }
            _ => false,
        });
    }

    /// `Processing -> Completed`.
    pub fn complete(&self, asset: OutputAsset) -> ComposeResult<()> {
        if !self.is_processing() {
            return Err(ComposeError::validation("complete() outside of processing"));
        }
        tracing::info!(bytes = asset.data.len(), mime = %asset.mime_type, "composition completed");
        self.tx.send_replace(CompositionState::Completed(asset));
        Ok(())
    }

    /// `Processing -> Failed`.
    pub fn fail(&self, cause: FailureCause) -> ComposeResult<()> {
        if !self.is_processing() {
            return Err(ComposeError::validation("fail() outside of processing"));
        }
        tracing::info!(kind = ?cause.kind, message = %cause.message, "composition failed");
        self.tx.send_replace(CompositionState::Failed(cause));
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/state.rs"]
mod tests;
