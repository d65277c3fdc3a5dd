use super::*;

fn music(enabled: bool, volume: f32) -> MusicSettings {
    MusicSettings {
        enabled,
        track_id: Some("bed".to_owned()),
        volume,
    }
}

fn mono(sample_rate: u32, samples: Vec<f32>) -> Arc<AudioPcm> {
    Arc::new(AudioPcm {
        sample_rate,
        channels: 1,
        interleaved_f32: samples,
    })
}

fn left(out: &[f32]) -> Vec<f32> {
    out.chunks_exact(2).map(|f| f[0]).collect()
}

#[test]
fn narration_gain_is_unity_and_music_gain_is_clamped() {
    let ledger = HandleLedger::new();
    let mut g = AudioMixGraph::create(&ledger, 4, 2, &music(true, 0.3)).unwrap();
    assert_eq!(g.bus(BusKind::Narration).effective_gain(), 1.0);
    assert!((g.bus(BusKind::Music).gain() - 0.3).abs() < 1e-6);

    g.set_music_volume(1.7).unwrap();
    assert_eq!(g.bus(BusKind::Music).gain(), 1.0);
    g.set_music_volume(-0.2).unwrap();
    assert_eq!(g.bus(BusKind::Music).gain(), 0.0);
    assert!(g.set_music_volume(f32::NAN).is_err());
    assert_eq!(g.bus(BusKind::Narration).gain(), 1.0);
    g.close();
}

#[test]
fn music_loops_and_starts_once() {
    let ledger = HandleLedger::new();
    let mut g = AudioMixGraph::create(&ledger, 4, 2, &music(true, 1.0)).unwrap();
    g.set_music_source(mono(4, vec![0.1, 0.2, 0.3, 0.4]));

    // Nothing plays, and the bed does not advance, before start.
    assert!(g.render(2).iter().all(|s| *s == 0.0));

    assert!(g.start_music());
    assert!(!g.start_music());
    let out = left(&g.render(6));
    let expect = [0.1f32, 0.2, 0.3, 0.4, 0.1, 0.2];
    for (a, b) in out.iter().zip(expect) {
        assert!((a - b).abs() < 1e-6, "{out:?}");
    }
    g.close();
}

#[test]
fn disabled_music_is_silent_but_keeps_position() {
    let ledger = HandleLedger::new();
    let mut g = AudioMixGraph::create(&ledger, 4, 2, &music(false, 0.5)).unwrap();
    g.set_music_source(mono(4, vec![0.1, 0.2, 0.3, 0.4]));
    g.start_music();
    assert_eq!(g.bus(BusKind::Music).effective_gain(), 0.0);
    assert!(g.render(2).iter().all(|s| *s == 0.0));

    g.set_music_enabled(true);
    let out = left(&g.render(1));
    assert!((out[0] - 0.15).abs() < 1e-6);
    g.close();
}

#[test]
fn narration_connects_per_clip_and_runs_out() {
    let ledger = HandleLedger::new();
    let mut g = AudioMixGraph::create(&ledger, 4, 2, &MusicSettings::default()).unwrap();
    g.connect_narration(0, mono(4, vec![0.5, 0.5]));
    assert_eq!(g.connected_narration(), Some(0));
    assert!(!g.disconnect_narration(1));

    let out = left(&g.render(4));
    assert_eq!(out, vec![0.5, 0.5, 0.0, 0.0]);

    assert!(g.disconnect_narration(0));
    assert_eq!(g.connected_narration(), None);
    assert!(g.render(2).iter().all(|s| *s == 0.0));
    g.close();
}

#[test]
fn output_is_clamped() {
    let ledger = HandleLedger::new();
    let mut g = AudioMixGraph::create(&ledger, 4, 2, &music(true, 1.0)).unwrap();
    g.connect_narration(0, mono(4, vec![0.9; 4]));
    g.set_music_source(mono(4, vec![0.9; 4]));
    g.start_music();
    assert!(g.render(4).iter().all(|s| *s <= 1.0));
    g.close();
}

#[test]
fn render_until_tracks_timeline_position() {
    let ledger = HandleLedger::new();
    let mut g = AudioMixGraph::create(&ledger, 48_000, 2, &MusicSettings::default()).unwrap();
    assert_eq!(g.render_until(0.5).len(), 24_000 * 2);
    assert_eq!(g.render_until(0.5).len(), 0);
    assert_eq!(g.render_until(0.25).len(), 0);
    assert_eq!(g.render_until(1.0).len(), 24_000 * 2);
    assert_eq!(g.rendered_frames(), 48_000);
    g.close();
}

#[test]
fn close_releases_graph_handle() {
    let ledger = HandleLedger::new();
    let mut g = AudioMixGraph::create(&ledger, 48_000, 2, &MusicSettings::default()).unwrap();
    assert_eq!(ledger.live_of(HandleKind::AudioGraph), 1);
    g.close();
    g.close();
    assert_eq!(ledger.live(), 0);
    assert!(g.render(4).iter().all(|s| *s == 0.0));
    drop(g);
    assert_eq!(ledger.stats().dropped_unreleased, 0);
}

#[test]
fn rejects_bad_format() {
    let ledger = HandleLedger::new();
    assert!(AudioMixGraph::create(&ledger, 0, 2, &MusicSettings::default()).is_err());
    assert!(AudioMixGraph::create(&ledger, 48_000, 6, &MusicSettings::default()).is_err());
    assert_eq!(ledger.live(), 0);
}
