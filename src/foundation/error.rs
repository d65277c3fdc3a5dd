use std::time::Duration;

/// Result alias used across the crate.
pub type ComposeResult<T> = Result<T, ComposeError>;

/// Every failure a composition job can report.
#[derive(thiserror::Error, Debug)]
pub enum ComposeError {
    /// Input rejected before any resource was acquired.
    #[error("validation error: {0}")]
    Validation(String),

    /// An asset did not become ready before its deadline.
    #[error("load timeout: clip '{clip}' not ready after {}ms", timeout.as_millis())]
    LoadTimeout {
        /// Id of the clip that timed out.
        clip: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// An asset failed to decode or could not be fetched.
    #[error("load error: clip '{clip}': {message}")]
    Load {
        /// Id of the failing clip.
        clip: String,
        /// Backend-provided detail.
        message: String,
    },

    /// Narration synthesis failed; recoverable.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// No capture format is available on the encode sink.
    #[error("capture unsupported: {0}")]
    CaptureUnsupported(String),

    /// The encode sink failed while writing or finalizing.
    #[error("capture io error: {0}")]
    CaptureIo(String),

    /// No frame was produced within the stall window.
    #[error("compositor stalled: {0}")]
    Stalled(String),

    /// A single frame failed to draw; recoverable.
    #[error("render error: {0}")]
    Render(String),

    /// The job was cancelled by its caller.
    #[error("cancelled")]
    Cancelled,

    /// Wrapped dependency or IO error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ComposeError {
    /// Build a [`ComposeError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`ComposeError::LoadTimeout`].
    pub fn load_timeout(clip: impl Into<String>, timeout: Duration) -> Self {
        Self::LoadTimeout {
            clip: clip.into(),
            timeout,
        }
    }

    /// Build a [`ComposeError::Load`].
    pub fn load(clip: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Load {
            clip: clip.into(),
            message: msg.into(),
        }
    }

    /// Build a [`ComposeError::Synthesis`].
    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::Synthesis(msg.into())
    }

    /// Build a [`ComposeError::CaptureUnsupported`].
    pub fn capture_unsupported(msg: impl Into<String>) -> Self {
        Self::CaptureUnsupported(msg.into())
    }

    /// Build a [`ComposeError::CaptureIo`].
    pub fn capture_io(msg: impl Into<String>) -> Self {
        Self::CaptureIo(msg.into())
    }

    /// Build a [`ComposeError::Stalled`].
    pub fn stalled(msg: impl Into<String>) -> Self {
        Self::Stalled(msg.into())
    }

    /// Build a [`ComposeError::Render`].
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Coarse classification exposed to callers.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) => FailureKind::Validation,
            Self::LoadTimeout { .. } => FailureKind::LoadTimeout,
            Self::Load { .. } => FailureKind::LoadError,
            Self::Synthesis(_) => FailureKind::Synthesis,
            Self::CaptureUnsupported(_) => FailureKind::CaptureUnsupported,
            Self::CaptureIo(_) => FailureKind::CaptureIo,
            Self::Stalled(_) => FailureKind::Stalled,
            Self::Render(_) => FailureKind::Render,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Other(_) => FailureKind::Internal,
        }
    }

    /// Whether this error aborts a job. Synthesis and single-frame render faults degrade instead.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Synthesis(_) | Self::Render(_))
    }
}

/// Caller-visible failure category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Bad input.
    Validation,
    /// Asset deadline elapsed.
    LoadTimeout,
    /// Asset decode or fetch fault.
    LoadError,
    /// Narration synthesis fault.
    Synthesis,
    /// No usable capture format.
    CaptureUnsupported,
    /// Encode sink write fault.
    CaptureIo,
    /// Compositor watchdog fired.
    Stalled,
    /// Frame draw fault.
    Render,
    /// Caller cancelled the job.
    Cancelled,
    /// Anything else.
    Internal,
}

/// Structured cause carried by a failed job.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct FailureCause {
    /// Category of the originating error.
    pub kind: FailureKind,
    /// Human-readable detail.
    pub message: String,
}

impl From<&ComposeError> for FailureCause {
    fn from(err: &ComposeError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
