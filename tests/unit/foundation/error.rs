use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        ComposeError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        ComposeError::load("intro", "bad header")
            .to_string()
            .contains("load error: clip 'intro'")
    );
    assert!(
        ComposeError::load_timeout("intro", Duration::from_secs(30))
            .to_string()
            .contains("30000ms")
    );
    assert!(
        ComposeError::capture_io("x")
            .to_string()
            .contains("capture io error:")
    );
}

#[test]
fn only_synthesis_and_render_are_recoverable() {
    assert!(!ComposeError::synthesis("x").is_fatal());
    assert!(!ComposeError::render("x").is_fatal());
    assert!(ComposeError::load("c", "x").is_fatal());
    assert!(ComposeError::capture_unsupported("x").is_fatal());
    assert!(ComposeError::Cancelled.is_fatal());
}

#[test]
fn failure_cause_keeps_kind_and_message() {
    let err = ComposeError::load_timeout("c1", Duration::from_millis(5));
    let cause = FailureCause::from(&err);
    assert_eq!(cause.kind, FailureKind::LoadTimeout);
    assert_eq!(cause.message, err.to_string());
    assert_eq!(
        FailureCause::from(&ComposeError::Cancelled).kind,
        FailureKind::Cancelled
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = ComposeError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
    assert_eq!(err.kind(), FailureKind::Internal);
}
