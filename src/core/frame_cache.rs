//! Bounded per-player frame cache with LRU eviction
//!
//! Structure: IndexMap<usize, Arc<R>>
//! - Front = least recently used, back = most recently used
//! - `get` on hit moves the entry to the back (touch = re-insert)
//! - `put` appends, then evicts from the front until `len <= capacity`
//!
//! The cache is the sole owner of decoded resources and releases them on
//! eviction and on `release_all`. After `release_all` the cache is closed:
//! late inserts (completions arriving after teardown) are released on the spot.

use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, trace};

use crate::entities::Releasable;

/// Cache statistics for monitoring hit rate
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

#[derive(Debug)]
pub struct FrameCache<R: Releasable> {
    entries: IndexMap<usize, Arc<R>>,
    capacity: usize,
    closed: bool,
    stats: CacheStats,
}

impl<R: Releasable> FrameCache<R> {
    /// Create cache holding at most `capacity` frames (min 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        debug!("FrameCache created: capacity={}", capacity);
        Self {
            entries: IndexMap::with_capacity(capacity + 1),
            capacity,
            closed: false,
            stats: CacheStats::default(),
        }
    }

    /// Get frame and mark it most recently used.
    pub fn get(&mut self, index: usize) -> Option<Arc<R>> {
        match self.entries.get_index_of(&index) {
            Some(pos) => {
                self.stats.hits += 1;
                let last = self.entries.len() - 1;
                self.entries.move_index(pos, last);
                self.entries.get_index(last).map(|(_, r)| Arc::clone(r))
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Membership check without touching recency
    pub fn contains(&self, index: usize) -> bool {
        self.entries.contains_key(&index)
    }

    /// Insert as most recently used, evicting the oldest entries over budget.
    ///
    /// Returns false (and releases `resource`) when the cache is closed.
    pub fn put(&mut self, index: usize, resource: Arc<R>) -> bool {
        if self.closed {
            trace!("FrameCache closed, releasing late frame {}", index);
            resource.release();
            return false;
        }

        if let Some(old) = self.entries.shift_remove(&index)
            && !Arc::ptr_eq(&old, &resource)
        {
            old.release();
        }
        self.entries.insert(index, resource);

        while self.entries.len() > self.capacity {
            if self.evict_oldest().is_none() {
                break;
            }
        }
        true
    }

    /// Evict the least recently used frame, returning its index.
    fn evict_oldest(&mut self) -> Option<usize> {
        let (index, evicted) = self.entries.shift_remove_index(0)?;
        evicted.release();
        self.stats.evictions += 1;
        trace!("LRU evicted frame {}", index);
        Some(index)
    }

    /// Release every resource, clear the map and refuse further inserts.
    pub fn release_all(&mut self) -> usize {
        self.closed = true;
        let count = self.entries.len();
        for (_, resource) in self.entries.drain(..) {
            resource.release();
        }
        if count > 0 {
            debug!("FrameCache released {} frames", count);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Cached indices from least to most recently used
    pub fn indices(&self) -> Vec<usize> {
        self.entries.keys().copied().collect()
    }
}
