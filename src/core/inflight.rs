//! In-progress frame requests
//!
//! At most one request per frame index. Each entry carries a `CancelHandle`
//! shared with the worker running the fetch; teardown aborts all of them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::debug;

/// Cooperative abort flag shared between owner and worker
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    aborted: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent; every clone observes it.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }
}

/// Why a frame is being loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Frame about to be shown; never throttled
    OnDemand,
    /// Background warm-up; subject to the inflight ceiling
    Prefetch,
}

#[derive(Debug)]
struct InflightEntry {
    handle: CancelHandle,
    kind: RequestKind,
    started: Instant,
}

#[derive(Debug, Default)]
pub struct InflightSet {
    entries: HashMap<usize, InflightEntry>,
}

impl InflightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request for `index`.
    ///
    /// Returns `None` if one is already inflight for that index.
    pub fn register(&mut self, index: usize, kind: RequestKind) -> Option<CancelHandle> {
        if self.entries.contains_key(&index) {
            return None;
        }
        let handle = CancelHandle::new();
        self.entries.insert(
            index,
            InflightEntry {
                handle: handle.clone(),
                kind,
                started: Instant::now(),
            },
        );
        Some(handle)
    }

    /// Remove the entry once its attempt concluded, returning how long it ran.
    pub fn complete(&mut self, index: usize) -> Option<Duration> {
        self.entries.remove(&index).map(|e| e.started.elapsed())
    }

    /// Abort every request and clear the set.
    pub fn abort_all(&mut self) -> usize {
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            entry.handle.abort();
        }
        if count > 0 {
            debug!("Aborted {} inflight requests", count);
        }
        count
    }

    pub fn contains(&self, index: usize) -> bool {
        self.entries.contains_key(&index)
    }

    pub fn handle(&self, index: usize) -> Option<CancelHandle> {
        self.entries.get(&index).map(|e| e.handle.clone())
    }

    pub fn kind(&self, index: usize) -> Option<RequestKind> {
        self.entries.get(&index).map(|e| e.kind)
    }

    pub fn count_kind(&self, kind: RequestKind) -> usize {
        self.entries.values().filter(|e| e.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn indices(&self) -> Vec<usize> {
        let mut v: Vec<usize> = self.entries.keys().copied().collect();
        v.sort_unstable();
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_request_per_index() {
        let mut set = InflightSet::new();
        assert!(set.register(3, RequestKind::Prefetch).is_some());
        assert!(set.register(3, RequestKind::OnDemand).is_none());
        assert_eq!(set.len(), 1);
        assert_eq!(set.kind(3), Some(RequestKind::Prefetch));
    }

    #[test]
    fn test_complete_removes_entry() {
        let mut set = InflightSet::new();
        set.register(1, RequestKind::OnDemand);
        assert!(set.complete(1).is_some());
        assert!(set.complete(1).is_none());
        assert!(set.is_empty());
        assert!(set.register(1, RequestKind::OnDemand).is_some());
    }

    #[test]
    fn test_abort_all_flags_handles() {
        let mut set = InflightSet::new();
        let a = set.register(0, RequestKind::OnDemand).unwrap();
        let b = set.register(5, RequestKind::Prefetch).unwrap();
        let worker_copy = b.clone();
        assert_eq!(set.count_kind(RequestKind::Prefetch), 1);

        assert_eq!(set.abort_all(), 2);
        assert!(set.is_empty());
        assert!(a.is_aborted());
        assert!(worker_copy.is_aborted());
    }
}
