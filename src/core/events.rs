//! Scene notifications
//!
//! `EventBus<E>` is a small pub/sub channel:
//! - `subscribe()` callbacks fire synchronously inside `emit()`
//! - every emitted event is also queued for `poll()` in the host loop
//!
//! Callbacks run in subscription order. The queue is bounded; when full the
//! oldest half is dropped.

use std::sync::{Arc, Mutex, RwLock};

use log::warn;

/// Maximum events in queue before oldest are evicted
const MAX_QUEUE_SIZE: usize = 1000;

/// What the player and the hero scene report to the outside.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    /// A new texture reached the surface
    FrameShown { index: usize },
    /// The current on-demand frame could not be loaded; previous frame stays
    FrameMissed { index: usize },
    /// Stats block crossed its reveal threshold
    StatsVisibility { visible: bool },
    TornDown,
}

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

pub struct EventBus<E> {
    subscribers: Arc<RwLock<Vec<Callback<E>>>>,
    queue: Arc<Mutex<Vec<E>>>,
}

// Manual impls: a derive would demand `E: Clone`/`E: Default`.
impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
            queue: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(callback));
    }

    /// Invoke callbacks, then queue for `poll()`.
    pub fn emit(&self, event: E) {
        // Clone the list so callbacks may subscribe without deadlocking
        let callbacks: Vec<Callback<E>> = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for cb in &callbacks {
            cb(&event);
        }

        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= MAX_QUEUE_SIZE {
            let evict_count = queue.len() / 2;
            warn!("EventBus queue full ({} events), evicting oldest {}", queue.len(), evict_count);
            queue.drain(0..evict_count);
        }
        queue.push(event);
    }

    /// Take all queued events, oldest first.
    pub fn poll(&self) -> Vec<E> {
        std::mem::take(&mut *self.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn clear(&self) {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscribe_and_poll() {
        let bus: EventBus<SceneEvent> = EventBus::new();
        let shown = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&shown);
        bus.subscribe(move |e| {
            if matches!(e, SceneEvent::FrameShown { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        bus.emit(SceneEvent::FrameShown { index: 3 });
        bus.emit(SceneEvent::StatsVisibility { visible: true });
        assert_eq!(shown.load(Ordering::SeqCst), 1);

        assert_eq!(
            bus.poll(),
            vec![
                SceneEvent::FrameShown { index: 3 },
                SceneEvent::StatsVisibility { visible: true }
            ]
        );
        assert_eq!(bus.queue_len(), 0);
    }

    #[test]
    fn test_clones_share_queue() {
        let bus: EventBus<SceneEvent> = EventBus::new();
        let other = bus.clone();
        other.emit(SceneEvent::TornDown);
        assert_eq!(bus.poll(), vec![SceneEvent::TornDown]);
    }

    #[test]
    fn test_queue_eviction() {
        let bus: EventBus<usize> = EventBus::new();
        for i in 0..=MAX_QUEUE_SIZE {
            bus.emit(i);
        }
        let events = bus.poll();
        assert_eq!(events.len(), MAX_QUEUE_SIZE / 2 + 1);
        assert_eq!(events.last(), Some(&MAX_QUEUE_SIZE));
    }
}
