use super::*;
use crate::assets::decode::PreparedImage;
use crate::assets::handle::MediaSource;
use crate::assets::media::AudioPcm;
use crate::audio::narration::{NarrationHandle, SilentReason};
use crate::encode::sink::{InMemorySink, SinkProbe};
use crate::foundation::ledger::HandleLedger;
use crate::model::request::{CaptionSpec, MediaKind, MusicSettings};
use crate::render::recording::{DrawOp, RecordingSurface, SurfaceProbe};
use crate::text::wrap::CaptionLayoutCache;

const TICK: Duration = Duration::from_nanos(33_333_333);

struct Rig {
    ledger: HandleLedger,
    surface: RecordingSurface,
    overlay: CaptionOverlayRenderer,
    mix: AudioMixGraph,
    capture: CaptureController,
    ops: SurfaceProbe,
    sink: SinkProbe,
}

impl Rig {
    fn new(surface: RecordingSurface) -> Self {
        let ledger = HandleLedger::new();
        let ops = surface.probe();
        let overlay = CaptionOverlayRenderer::new(CaptionLayoutCache::shared(8), 0.85);
        let mix = AudioMixGraph::create(&ledger, 8_000, 1, &MusicSettings::default()).unwrap();
        let sink = InMemorySink::new();
        let sink_probe = sink.probe();
        let capture = CaptureController::start(
            Box::new(sink),
            &surface,
            &mix,
            &ComposerOpts::default(),
            &ledger,
        )
        .unwrap();
        Self {
            ledger,
            surface,
            overlay,
            mix,
            capture,
            ops,
            sink: sink_probe,
        }
    }

    fn tick(&mut self, lp: &mut CompositorLoop, now: Instant) -> ComposeResult<TickOutcome> {
        let mut ctx = TickContext {
            surface: &mut self.surface,
            overlay: &self.overlay,
            mix: &mut self.mix,
            capture: &mut self.capture,
        };
        lp.tick(now, &mut ctx)
    }

    fn clip(&self, id: &str, secs: f64, caption: Option<&str>, narration: Option<f64>) -> ClipRuntime {
        let clip = ClipDescriptor {
            id: id.to_owned(),
            kind: MediaKind::Image,
            source: format!("{id}.png"),
            duration_sec: secs,
            trim: None,
            caption: caption.map(|t| CaptionSpec {
                text: t.to_owned(),
                anchor: Default::default(),
                style: Default::default(),
            }),
        };
        let media = MediaHandle::new(
            &clip,
            MediaSource::Image(PreparedImage::solid(2, 2, [9, 9, 9, 255])),
            &self.ledger,
        );
        let narration = match narration {
            Some(secs) => NarrationOutcome::Voiced(NarrationHandle::new(
                id,
                AudioPcm {
                    sample_rate: 8_000,
                    channels: 1,
                    interleaved_f32: vec![0.5; (secs * 8_000.0) as usize],
                },
                &self.ledger,
            )),
            None => NarrationOutcome::Silent(SilentReason::Disabled),
        };
        ClipRuntime::new(clip, media, narration)
    }
}

fn settings() -> LoopSettings {
    LoopSettings::from_opts(&ComposerOpts::default(), true)
}

#[test]
fn effective_durations_accumulate_within_one_tick() {
    let mut rig = Rig::new(RecordingSurface::new(40, 80));
    let clips = vec![
        rig.clip("a", 5.0, None, Some(6.0)),
        rig.clip("b", 5.0, None, Some(4.0)),
        rig.clip("c", 5.0, None, Some(5.0)),
    ];
    let durations: Vec<_> = clips.iter().map(ClipRuntime::effective_secs).collect();
    assert_eq!(durations, vec![6.0, 5.0, 5.0]);

    let mut lp = CompositorLoop::new(clips, settings());
    let start = Instant::now();
    let mut now = start;
    let mut progress = Vec::new();
    let mut order = Vec::new();
    while !lp.is_drained() {
        if let TickOutcome::Frame { index, .. } = rig.tick(&mut lp, now).unwrap() {
            if order.last() != Some(&index) {
                order.push(index);
            }
        }
        progress.push(lp.progress_percent());
        now += TICK;
    }

    assert_eq!(order, vec![0, 1, 2]);
    assert!((lp.elapsed_secs() - 16.0).abs() <= TICK.as_secs_f64() + 1e-9);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.last(), Some(&100));
    assert_eq!(rig.tick(&mut lp, now).unwrap(), TickOutcome::Drained);

    let frames = rig.sink.log().frames;
    assert_eq!(frames, lp.ticks());
    assert_eq!(rig.mix.rendered_frames(), (lp.elapsed_secs() * 8_000.0).round() as u64);

    lp.release_all();
    rig.capture.abort();
    rig.mix.close();
    assert_eq!(rig.ledger.live(), 0);
    assert_eq!(rig.ledger.stats().dropped_unreleased, 0);
}

#[test]
fn caption_is_drawn_after_frame_within_a_tick() {
    let mut rig = Rig::new(RecordingSurface::new(400, 800));
    let mut lp = CompositorLoop::new(vec![rig.clip("a", 1.0, Some("hello"), None)], settings());
    rig.tick(&mut lp, Instant::now()).unwrap();

    let ops = rig.ops.take_ops();
    assert!(matches!(ops.first(), Some(DrawOp::Clear(_))));
    assert!(matches!(ops[1], DrawOp::Image { .. }));
    assert!(matches!(ops.last(), Some(DrawOp::Present)));
    let texts: Vec<_> = ops
        .iter()
        .filter_map(|op| match op {
            DrawOp::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["HELLO", "HELLO"]);
    lp.release_all();
}

#[test]
fn captions_disabled_skips_overlay() {
    let mut rig = Rig::new(RecordingSurface::new(400, 800));
    let mut lp = CompositorLoop::new(
        vec![rig.clip("a", 1.0, Some("hello"), None)],
        LoopSettings::from_opts(&ComposerOpts::default(), false),
    );
    rig.tick(&mut lp, Instant::now()).unwrap();
    assert!(
        rig.ops
            .ops()
            .iter()
            .all(|op| !matches!(op, DrawOp::Text { .. }))
    );
    lp.release_all();
}

#[test]
fn draw_fault_skips_frame_but_time_advances() {
    let mut rig = Rig::new(RecordingSurface::new(40, 80).fail_image_draws(1));
    let mut lp = CompositorLoop::new(vec![rig.clip("a", 1.0, Some("x"), None)], settings());
    let t0 = Instant::now();

    let first = rig.tick(&mut lp, t0).unwrap();
    assert_eq!(
        first,
        TickOutcome::Frame {
            index: 0,
            drawn: false,
            advanced: false
        }
    );
    assert_eq!(lp.faults(), 1);
    assert_eq!(rig.sink.log().frames, 0);
    assert_eq!(rig.ops.presented(), 0);

    rig.tick(&mut lp, t0 + TICK).unwrap();
    assert_eq!(rig.sink.log().frames, 1);
    assert!(lp.elapsed_secs() > 0.03);
    lp.release_all();
}

#[test]
fn tick_while_draw_in_flight_is_dropped() {
    let mut rig = Rig::new(RecordingSurface::new(40, 80));
    let mut lp = CompositorLoop::new(vec![rig.clip("a", 1.0, None, None)], settings());
    let permit = lp.slot().try_acquire().unwrap();
    assert_eq!(rig.tick(&mut lp, Instant::now()).unwrap(), TickOutcome::Dropped);
    assert_eq!(lp.ticks(), 0);
    drop(permit);
    assert!(matches!(
        rig.tick(&mut lp, Instant::now()).unwrap(),
        TickOutcome::Frame { drawn: true, .. }
    ));
    assert_eq!(lp.slot().dropped_ticks(), 1);
    lp.release_all();
}

#[test]
fn long_gap_is_clamped_to_max_delta() {
    let mut rig = Rig::new(RecordingSurface::new(40, 80));
    let mut lp = CompositorLoop::new(vec![rig.clip("a", 10.0, None, None)], settings());
    let t0 = Instant::now();
    rig.tick(&mut lp, t0).unwrap();
    rig.tick(&mut lp, t0 + Duration::from_secs(3)).unwrap();
    assert!((lp.elapsed_secs() - 0.033).abs() < 1e-9);
    lp.release_all();
}

#[test]
fn narration_connects_only_during_its_clip_window() {
    let mut rig = Rig::new(RecordingSurface::new(40, 80));
    let clips = vec![
        rig.clip("a", 0.1, None, Some(0.1)),
        rig.clip("b", 0.1, None, None),
        rig.clip("c", 0.1, None, Some(0.1)),
    ];
    let mut lp = CompositorLoop::new(clips, settings());
    let mut now = Instant::now();
    let mut connected = Vec::new();
    while !lp.is_drained() {
        let out = rig.tick(&mut lp, now).unwrap();
        if let TickOutcome::Frame { index, .. } = out {
            connected.push((index, rig.mix.connected_narration()));
        }
        now += TICK;
    }
    for (index, conn) in connected {
        assert!(conn.is_none() || conn == Some(index), "clip {index} saw {conn:?}");
    }
    assert_eq!(rig.mix.connected_narration(), None);
    lp.release_all();
}

#[test]
fn stall_watchdog_fails_after_timeout() {
    let mut rig = Rig::new(RecordingSurface::new(40, 80).fail_image_draws(usize::MAX));
    let opts = ComposerOpts {
        stall_timeout_ms: 500,
        ..ComposerOpts::default()
    };
    let mut lp = CompositorLoop::new(
        vec![rig.clip("a", 60.0, None, None)],
        LoopSettings::from_opts(&opts, true),
    );
    let mut now = Instant::now();
    let err = loop {
        match rig.tick(&mut lp, now) {
            Ok(_) => now += TICK,
            Err(e) => break e,
        }
    };
    assert!(matches!(err, ComposeError::Stalled(_)));
    assert!(lp.ticks() >= 15);
    lp.release_all();
}
