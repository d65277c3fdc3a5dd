use super::*;
use crate::model::request::MediaKind;

fn clip(id: &str, secs: f64) -> ClipDescriptor {
    ClipDescriptor {
        id: id.to_owned(),
        kind: MediaKind::Image,
        source: format!("{id}.png"),
        duration_sec: secs,
        trim: None,
        caption: None,
    }
}

#[test]
fn narration_extends_but_never_shortens() {
    assert_eq!(effective_duration(5.0, Some(6.0)), 6.0);
    assert_eq!(effective_duration(5.0, Some(4.0)), 5.0);
    assert_eq!(effective_duration(5.0, None), 5.0);
    assert_eq!(effective_duration(5.0, Some(f64::NAN)), 5.0);
}

#[test]
fn mixed_narration_lengths_give_expected_schedule() {
    let clips = [clip("a", 5.0), clip("b", 5.0), clip("c", 5.0)];
    let t = Timeline::new(&clips, &[Some(6.0), Some(4.0), Some(5.0)]);
    assert_eq!(t.effective_durations(), vec![6.0, 5.0, 5.0]);
    let starts: Vec<_> = t.entries().iter().map(|e| e.start_sec).collect();
    assert_eq!(starts, vec![0.0, 6.0, 11.0]);
    assert_eq!(t.total_secs(), 16.0);
}

#[test]
fn silent_clip_keeps_nominal_duration() {
    let clips = [clip("a", 3.0), clip("b", 2.0)];
    let t = Timeline::new(&clips, &[None, Some(1.0)]);
    assert_eq!(t.effective_durations(), vec![3.0, 2.0]);
    assert_eq!(t.entries()[1].narration_sec, Some(1.0));
}

#[test]
fn timeline_serializes_for_planning_output() {
    let t = Timeline::new(&[clip("a", 1.5)], &[None]);
    let json = serde_json::to_value(&t).unwrap();
    assert_eq!(json["entries"][0]["clip_id"], "a");
    assert_eq!(json["entries"][0]["effective_sec"], 1.5);
}
