use super::*;
use serde_json::json;

fn parse(v: serde_json::Value) -> ComposeRequest {
    serde_json::from_value(v).unwrap()
}

#[test]
fn defaults_fill_in_optional_fields() {
    let req = parse(json!({
        "clips": [
            {"id": "a", "kind": "image", "source": "a.png", "duration": 5.0,
             "caption": {"text": "hello"}}
        ]
    }));
    assert!(req.captions_enabled);
    assert!(!req.narration.enabled);
    assert!(!req.music.enabled);
    assert!((req.music.volume - 0.3).abs() < 1e-6);

    let cap = req.clips[0].caption.as_ref().unwrap();
    assert_eq!(cap.anchor, CaptionAnchor::Bottom);
    assert_eq!(cap.style.font_size, 48.0);
    assert_eq!(cap.style.color, Rgba8::WHITE);
    assert!(req.validate().is_ok());
}

#[test]
fn from_reader_reports_parse_errors_as_validation() {
    let err = ComposeRequest::from_reader(&b"{ not json"[..]).unwrap_err();
    assert!(matches!(err, ComposeError::Validation(_)));
}

#[test]
fn validate_rejects_bad_clips() {
    let mut req = parse(json!({
        "clips": [
            {"id": "a", "kind": "video", "source": "a.mp4", "duration": 5.0,
             "trim": {"start_offset": 2.0, "end_offset": 1.0}}
        ]
    }));
    assert!(req.validate().is_err());

    req.clips[0].trim = None;
    req.clips[0].duration_sec = 0.0;
    assert!(req.validate().is_err());

    req.clips[0].duration_sec = 1.0;
    req.clips.push(req.clips[0].clone());
    let err = req.validate().unwrap_err().to_string();
    assert!(err.contains("duplicate clip id"), "{err}");
}

#[test]
fn validate_rejects_out_of_range_music() {
    let mut req = parse(json!({
        "clips": [{"id": "a", "kind": "image", "source": "a.png", "duration": 1.0}],
        "music": {"enabled": true, "track_id": "bed.wav", "volume": 1.5}
    }));
    assert!(req.validate().is_err());
    req.music.volume = 0.5;
    assert!(req.validate().is_ok());
    req.music.track_id = None;
    assert!(req.validate().is_err());
}

#[test]
fn caption_text_ignores_blank() {
    let req = parse(json!({
        "clips": [{"id": "a", "kind": "image", "source": "a.png", "duration": 1.0,
                   "caption": {"text": "   "}}]
    }));
    assert_eq!(req.clips[0].caption_text(), None);
}
