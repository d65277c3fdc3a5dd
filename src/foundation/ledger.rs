use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Category of a tracked resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// Decoded video or image.
    Media,
    /// Synthesized narration audio.
    Narration,
    /// A job's audio mix graph.
    AudioGraph,
    /// An active capture session.
    Capture,
}

/// Opaque identity of one tracked resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

/// Running counters of a [`HandleLedger`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LedgerStats {
    /// Handles ever registered.
    pub acquired: u64,
    /// Handles released explicitly.
    pub released: u64,
    /// Handles that were dropped without an explicit release.
    pub dropped_unreleased: u64,
}

#[derive(Default)]
struct LedgerInner {
    next_id: u64,
    live: HashMap<HandleId, (HandleKind, String)>,
    stats: LedgerStats,
}

/// Shared registry of every resource a job acquires.
///
/// Cloning is cheap and yields a view of the same registry. Release is idempotent, so the same
/// handle may be released on several exit paths.
#[derive(Clone, Default)]
pub struct HandleLedger {
    inner: Arc<Mutex<LedgerInner>>,
}

impl HandleLedger {
    /// Fresh, empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        // Counters stay consistent even if a holder panicked mid-update.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a resource and return its id.
    pub fn acquire(&self, kind: HandleKind, label: impl Into<String>) -> HandleId {
        let mut g = self.lock();
        g.next_id = g.next_id.saturating_add(1);
        let id = HandleId(g.next_id);
        g.live.insert(id, (kind, label.into()));
        g.stats.acquired = g.stats.acquired.saturating_add(1);
        id
    }

    /// Release a resource. Returns `false` if it was already released.
    pub fn release(&self, id: HandleId) -> bool {
        let mut g = self.lock();
        if g.live.remove(&id).is_some() {
            g.stats.released = g.stats.released.saturating_add(1);
            true
        } else {
            false
        }
    }

    /// Release from a `Drop` impl that was never explicitly released.
    pub(crate) fn release_on_drop(&self, id: HandleId) -> bool {
        let mut g = self.lock();
        if let Some((kind, label)) = g.live.remove(&id) {
            g.stats.dropped_unreleased = g.stats.dropped_unreleased.saturating_add(1);
            tracing::warn!(?kind, label, "handle dropped without explicit release");
            true
        } else {
            false
        }
    }

    /// Whether `id` is still live.
    pub fn is_live(&self, id: HandleId) -> bool {
        self.lock().live.contains_key(&id)
    }

    /// Number of live handles of any kind.
    pub fn live(&self) -> usize {
        self.lock().live.len()
    }

    /// Number of live handles of `kind`.
    pub fn live_of(&self, kind: HandleKind) -> usize {
        self.lock().live.values().filter(|(k, _)| *k == kind).count()
    }

    /// Labels of live handles, sorted by acquisition order.
    pub fn live_labels(&self) -> Vec<String> {
        let g = self.lock();
        let mut v: Vec<_> = g.live.iter().collect();
        v.sort_by_key(|(id, _)| **id);
        v.into_iter().map(|(_, (_, l))| l.clone()).collect()
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> LedgerStats {
        self.lock().stats
    }
}

impl std::fmt::Debug for HandleLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let g = self.lock();
        f.debug_struct("HandleLedger")
            .field("live", &g.live.len())
            .field("stats", &g.stats)
            .finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/ledger.rs"]
mod tests;
