use super::*;
use crate::assets::memory::InMemoryMediaBackend;
use crate::foundation::ledger::HandleKind;

fn clip(id: &str, kind: MediaKind, source: &str) -> ClipDescriptor {
    ClipDescriptor {
        id: id.to_owned(),
        kind,
        source: source.to_owned(),
        duration_sec: 1.0,
        trim: None,
        caption: None,
    }
}

fn loader(backend: InMemoryMediaBackend, ledger: &HandleLedger) -> AssetLoader {
    AssetLoader::new(Arc::new(backend), ledger.clone(), &ComposerOpts::default())
}

#[tokio::test(start_paused = true)]
async fn load_all_keeps_descriptor_order_despite_completion_order() {
    let ledger = HandleLedger::new();
    let backend = InMemoryMediaBackend::new()
        .with_image("slow.png", 4, 4, [1, 1, 1, 255])
        .with_delay("slow.png", Duration::from_secs(5))
        .with_video("fast.mp4", 30, [2, 2, 2, 255]);
    let loader = loader(backend, &ledger);
    let clips = vec![
        clip("a", MediaKind::Image, "slow.png"),
        clip("b", MediaKind::Video, "fast.mp4"),
    ];

    let mut handles = loader
        .load_all(&clips, &CancellationToken::new())
        .await
        .unwrap();
    let ids: Vec<_> = handles.iter().map(|h| h.clip_id().to_owned()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(ledger.live_of(HandleKind::Media), 2);
    for h in &mut handles {
        h.release();
    }
    assert_eq!(ledger.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn image_past_deadline_is_load_timeout() {
    let ledger = HandleLedger::new();
    let backend = InMemoryMediaBackend::new()
        .with_image("late.png", 4, 4, [0, 0, 0, 255])
        .with_delay("late.png", Duration::from_secs(31));
    let loader = loader(backend, &ledger);

    let err = loader
        .load(&clip("late", MediaKind::Image, "late.png"))
        .await
        .unwrap_err();
    match err {
        ComposeError::LoadTimeout { clip, timeout } => {
            assert_eq!(clip, "late");
            assert_eq!(timeout, Duration::from_secs(30));
        }
        other => panic!("expected LoadTimeout, got {other:?}"),
    }
    assert_eq!(ledger.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn video_gets_the_longer_deadline() {
    let ledger = HandleLedger::new();
    let backend = InMemoryMediaBackend::new()
        .with_video("v.mp4", 10, [0, 0, 0, 255])
        .with_delay("v.mp4", Duration::from_secs(45));
    let loader = loader(backend, &ledger);
    let mut h = loader
        .load(&clip("v", MediaKind::Video, "v.mp4"))
        .await
        .unwrap();
    h.release();
}

#[tokio::test(start_paused = true)]
async fn one_failure_fails_fast_and_releases_loaded_handles() {
    let ledger = HandleLedger::new();
    let backend = InMemoryMediaBackend::new()
        .with_image("ok.png", 2, 2, [0, 0, 0, 255])
        .with_failure("bad.mp4", "corrupt header")
        .with_delay("bad.mp4", Duration::from_millis(10))
        .with_image("never.png", 2, 2, [0, 0, 0, 255])
        .with_delay("never.png", Duration::from_secs(20));
    let loader = loader(backend, &ledger);
    let clips = vec![
        clip("ok", MediaKind::Image, "ok.png"),
        clip("bad", MediaKind::Video, "bad.mp4"),
        clip("never", MediaKind::Image, "never.png"),
    ];

    let started = tokio::time::Instant::now();
    let err = loader
        .load_all(&clips, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ComposeError::Load { ref clip, .. } if clip == "bad"));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(ledger.live(), 0);
    assert_eq!(ledger.stats().dropped_unreleased, 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_releases_partial_results() {
    let ledger = HandleLedger::new();
    let backend = InMemoryMediaBackend::new()
        .with_image("a.png", 2, 2, [0, 0, 0, 255])
        .with_image("b.png", 2, 2, [0, 0, 0, 255])
        .with_delay("b.png", Duration::from_secs(10));
    let loader = loader(backend, &ledger);
    let clips = vec![
        clip("a", MediaKind::Image, "a.png"),
        clip("b", MediaKind::Image, "b.png"),
    ];
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let err = loader.load_all(&clips, &cancel).await.unwrap_err();
    assert!(matches!(err, ComposeError::Cancelled));
    assert_eq!(ledger.live(), 0);
    assert_eq!(ledger.stats().acquired, 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_source_is_load_error() {
    let ledger = HandleLedger::new();
    let loader = loader(InMemoryMediaBackend::new(), &ledger);
    let err = loader
        .load(&clip("x", MediaKind::Image, "missing.png"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), crate::foundation::error::FailureKind::LoadError);
}

#[tokio::test(start_paused = true)]
async fn fan_out_is_bounded() {
    let ledger = HandleLedger::new();
    let mut backend = InMemoryMediaBackend::new();
    let mut clips = Vec::new();
    for i in 0..8 {
        let src = format!("{i}.png");
        backend = backend
            .with_image(&src, 1, 1, [0, 0, 0, 255])
            .with_delay(&src, Duration::from_secs(1));
        clips.push(clip(&format!("c{i}"), MediaKind::Image, &src));
    }
    let loader = loader(backend, &ledger);
    let started = tokio::time::Instant::now();
    let mut handles = loader
        .load_all(&clips, &CancellationToken::new())
        .await
        .unwrap();
    // 8 one-second loads, 4 at a time.
    let took = started.elapsed();
    assert!(took >= Duration::from_secs(2) && took < Duration::from_millis(2500), "{took:?}");
    for h in &mut handles {
        h.release();
    }
}
