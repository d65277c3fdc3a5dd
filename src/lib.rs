//! clipweave composes an ordered list of video and image clips, synthesized narration, a looping
//! music bed and caption overlays into one recorded asset, in real time.
//!
//! The public API centers on [`Composer`]:
//!
//! - Describe the job as a [`ComposeRequest`] (clips plus narration, music and caption settings)
//! - Build a [`Composer`] from a [`MediaBackend`], a [`NarrationProvider`], a [`SinkFactory`] and
//!   a [`Surface`]
//! - Call [`Composer::compose`] and observe [`CompositionState`] through
//!   [`Composer::subscribe`]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod assets;
mod audio;
mod compositor;
mod encode;
mod foundation;
mod model;
mod render;
mod session;
mod text;

pub use crate::foundation::core::{Affine, Canvas, Fps, Point, Rect, Rgba8, Vec2};
pub use crate::foundation::error::{ComposeError, ComposeResult, FailureCause, FailureKind};
pub use crate::foundation::ledger::{HandleId, HandleKind, HandleLedger, LedgerStats};

pub use crate::model::opts::ComposerOpts;
pub use crate::model::request::{
    CaptionAnchor, CaptionSpec, CaptionStyle, ClipDescriptor, ComposeRequest, MediaKind,
    MusicSettings, NarrationSettings, TrimWindow,
};

pub use crate::assets::decode::{PreparedImage, decode_image};
pub use crate::assets::ffmpeg::FfmpegMediaBackend;
pub use crate::assets::handle::{FramePoll, MediaHandle, MediaSource, VideoDecoder};
pub use crate::assets::loader::{AssetLoader, DecodeTarget, MediaBackend};
pub use crate::assets::media::{AudioPcm, VideoSourceInfo, decode_wav, probe_video};
pub use crate::assets::memory::InMemoryMediaBackend;

pub use crate::text::overlay::{CaptionOverlayRenderer, anchor_fraction};
pub use crate::text::wrap::{CaptionLayoutCache, LayoutCacheStats, SharedLayoutCache, wrap_words};

pub use crate::render::backend::{FontSpec, FrameRGBA, Shadow, Surface, TextPaint, cover_transform};
pub use crate::render::cpu::CpuSurface;
pub use crate::render::recording::{DrawOp, RecordingSurface, SurfaceProbe};

pub use crate::audio::mix::{AudioMixGraph, BusKind, MixBus};
pub use crate::audio::narration::{
    CommandNarrationProvider, NarrationHandle, NarrationOutcome, NarrationProvider,
    NarrationStage, NoNarration, ScriptedNarration, SilentReason, strip_narration_markup,
};

pub use crate::encode::capture::{CaptureController, OutputAsset};
pub use crate::encode::ffmpeg::{FfmpegSink, FfmpegSinkOpts, detect_formats, is_ffmpeg_on_path};
pub use crate::encode::sink::{
    CaptureFormat, EncodeSink, InMemorySink, SinkConfig, SinkFactory, SinkLog, SinkProbe,
    negotiate_format,
};

pub use crate::compositor::driver::{
    ClipRuntime, CompositorLoop, LoopSettings, LoopState, MediaEvent, TickContext, TickOutcome,
};
pub use crate::compositor::slot::{FramePermit, FrameSlot};
pub use crate::compositor::timeline::{Timeline, TimelineEntry, effective_duration};

pub use crate::session::composer::Composer;
pub use crate::session::state::{CompositionState, CompositionStateMachine};
