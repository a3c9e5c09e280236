//! Live connection-pair tracking.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use uuid::Uuid;

/// Registry of open bridge pairs, keyed by connection id.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    open: DashMap<Uuid, Instant>,
}

impl ConnectionTracker {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new pair; it is removed when the guard drops.
    pub fn register(self: &Arc<Self>) -> ConnectionGuard {
        let id = Uuid::now_v7();
        let _ = self.open.insert(id, Instant::now());
        ConnectionGuard {
            id,
            tracker: Arc::clone(self),
        }
    }

    /// Number of open pairs.
    pub fn count(&self) -> usize {
        self.open.len()
    }
}

/// Keeps a pair registered for as long as it lives.
#[derive(Debug)]
pub struct ConnectionGuard {
    id: Uuid,
    tracker: Arc<ConnectionTracker>,
}

impl ConnectionGuard {
    /// Connection id, used as a log field.
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let _ = self.tracker.open.remove(&self.id);
    }
}
