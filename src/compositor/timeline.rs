use crate::model::request::ClipDescriptor;

/// `max(nominal, narration)` when the clip is voiced, else `nominal`.
pub fn effective_duration(nominal_secs: f64, narration_secs: Option<f64>) -> f64 {
    match narration_secs {
        Some(n) if n.is_finite() => nominal_secs.max(n),
        _ => nominal_secs,
    }
}

/// One clip's place on the job timeline.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct TimelineEntry {
    /// Clip id.
    pub clip_id: String,
    /// Job time the clip becomes active.
    pub start_sec: f64,
    /// Descriptor duration.
    pub nominal_sec: f64,
    /// Voiced narration length, when any.
    pub narration_sec: Option<f64>,
    /// Time the clip stays on screen.
    pub effective_sec: f64,
}

/// Ordered clip schedule of a job.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    /// Build from clips and their narration lengths (same order, same length).
    pub fn new(clips: &[ClipDescriptor], narration_secs: &[Option<f64>]) -> Self {
        let mut start = 0.0;
        let entries = clips
            .iter()
            .enumerate()
            .map(|(i, clip)| {
                let narration_sec = narration_secs.get(i).copied().flatten();
                let effective_sec = effective_duration(clip.duration_sec, narration_sec);
                let entry = TimelineEntry {
                    clip_id: clip.id.clone(),
                    start_sec: start,
                    nominal_sec: clip.duration_sec,
                    narration_sec,
                    effective_sec,
                };
                start += effective_sec;
                entry
            })
            .collect();
        Self { entries }
    }

    /// Entries in play order.
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Effective durations in play order.
    pub fn effective_durations(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.effective_sec).collect()
    }

    /// Sum of effective durations.
    pub fn total_secs(&self) -> f64 {
        self.entries.iter().map(|e| e.effective_sec).sum()
    }

    /// Number of clips.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no clips.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compositor/timeline.rs"]
mod tests;
