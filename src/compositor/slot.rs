use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Allows at most one frame draw in flight. A tick that finds the slot taken is dropped.
#[derive(Debug, Default)]
pub struct FrameSlot {
    busy: Arc<AtomicBool>,
    dropped: AtomicU64,
}

/// Proof of holding the [`FrameSlot`]. Frees it on drop.
#[derive(Debug)]
#[must_use = "the slot is freed as soon as the permit is dropped"]
pub struct FramePermit {
    busy: Arc<AtomicBool>,
}

impl FrameSlot {
    /// Free slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the slot, or count a dropped tick when it is held.
    pub fn try_acquire(&self) -> Option<FramePermit> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(FramePermit {
                busy: self.busy.clone(),
            })
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Whether a draw is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Ticks dropped because the slot was held.
    pub fn dropped_ticks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for FramePermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
