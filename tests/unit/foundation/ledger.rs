use super::*;

#[test]
fn release_is_idempotent() {
    let ledger = HandleLedger::new();
    let id = ledger.acquire(HandleKind::Media, "clip-a");
    assert!(ledger.is_live(id));
    assert!(ledger.release(id));
    assert!(!ledger.release(id));
    assert_eq!(ledger.live(), 0);

    let st = ledger.stats();
    assert_eq!(st.acquired, 1);
    assert_eq!(st.released, 1);
    assert_eq!(st.dropped_unreleased, 0);
}

#[test]
fn live_of_counts_by_kind() {
    let ledger = HandleLedger::new();
    let _a = ledger.acquire(HandleKind::Media, "a");
    let _b = ledger.acquire(HandleKind::Media, "b");
    let n = ledger.acquire(HandleKind::Narration, "a");
    assert_eq!(ledger.live_of(HandleKind::Media), 2);
    assert_eq!(ledger.live_of(HandleKind::Narration), 1);
    assert_eq!(ledger.live_of(HandleKind::Capture), 0);
    ledger.release(n);
    assert_eq!(ledger.live_of(HandleKind::Narration), 0);
    assert_eq!(ledger.live_labels(), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn drop_release_is_counted_separately() {
    let ledger = HandleLedger::new();
    let view = ledger.clone();
    let id = ledger.acquire(HandleKind::AudioGraph, "mix");
    assert!(view.release_on_drop(id));
    assert!(!ledger.release(id));
    let st = ledger.stats();
    assert_eq!(st.released, 0);
    assert_eq!(st.dropped_unreleased, 1);
}
