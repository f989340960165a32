//! Host environment probe
//!
//! The player never reads page visibility or connection quality from globals.
//! It asks an injected `Environment`, which also owns idle-time scheduling.
//!
//! `HeadlessEnvironment` is the stock implementation: visibility and quality
//! are plain settable values, idle tasks sit in an `IdleQueue` until the host
//! loop calls `run_idle`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::trace;

use super::net_profile::ConnectionQuality;

pub type IdleTask = Box<dyn FnOnce() + Send + 'static>;

pub trait Environment: Send + Sync {
    fn is_page_visible(&self) -> bool;

    fn connection_quality(&self) -> ConnectionQuality;

    /// Run `task` when the host is idle, `timeout` at the latest.
    ///
    /// Hosts without idle scheduling run it immediately. Callers only post
    /// messages from idle tasks, so the real work still happens on a later
    /// pump of the owner loop.
    fn schedule_idle(&self, task: IdleTask, timeout: Duration) {
        let _ = timeout;
        task();
    }
}

/// Deadline-ordered idle tasks
#[derive(Default)]
pub struct IdleQueue {
    tasks: Mutex<VecDeque<(Instant, IdleTask)>>,
}

impl IdleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: IdleTask, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).push_back((deadline, task));
    }

    /// Run everything when `idle`, otherwise only tasks past their deadline.
    pub fn run(&self, now: Instant, idle: bool) -> usize {
        // Collect under the lock, run outside it: tasks may schedule more tasks.
        let due: Vec<IdleTask> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            if idle {
                tasks.drain(..).map(|(_, t)| t).collect()
            } else {
                let mut keep = VecDeque::with_capacity(tasks.len());
                let mut due = Vec::new();
                for (deadline, task) in tasks.drain(..) {
                    if deadline <= now {
                        due.push(task);
                    } else {
                        keep.push_back((deadline, task));
                    }
                }
                *tasks = keep;
                due
            }
        };
        let count = due.len();
        for task in due {
            task();
        }
        if count > 0 {
            trace!("Ran {} idle tasks (idle={})", count, idle);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Settable environment for CLI runs and tests
pub struct HeadlessEnvironment {
    visible: AtomicBool,
    quality: Mutex<ConnectionQuality>,
    idle: Option<IdleQueue>,
}

impl HeadlessEnvironment {
    /// Visible page with an idle queue the host must drain via `run_idle`.
    pub fn new(quality: ConnectionQuality) -> Self {
        Self {
            visible: AtomicBool::new(true),
            quality: Mutex::new(quality),
            idle: Some(IdleQueue::new()),
        }
    }

    /// Visible page without idle scheduling (tasks run immediately).
    pub fn immediate(quality: ConnectionQuality) -> Self {
        Self {
            idle: None,
            ..Self::new(quality)
        }
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Release);
    }

    pub fn set_quality(&self, quality: ConnectionQuality) {
        *self.quality.lock().unwrap_or_else(|e| e.into_inner()) = quality;
    }

    /// Drain the idle queue (see `IdleQueue::run`). No-op without a queue.
    pub fn run_idle(&self, now: Instant, idle: bool) -> usize {
        self.idle.as_ref().map_or(0, |q| q.run(now, idle))
    }

    pub fn pending_idle(&self) -> usize {
        self.idle.as_ref().map_or(0, IdleQueue::len)
    }
}

impl Environment for HeadlessEnvironment {
    fn is_page_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    fn connection_quality(&self) -> ConnectionQuality {
        *self.quality.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn schedule_idle(&self, task: IdleTask, timeout: Duration) {
        match &self.idle {
            Some(queue) => queue.push(task, timeout),
            None => task(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn counter_task(counter: &Arc<AtomicUsize>) -> IdleTask {
        let c = Arc::clone(counter);
        Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_idle_tasks_wait_for_idle_or_deadline() {
        let env = HeadlessEnvironment::new(ConnectionQuality::FourG);
        let ran = Arc::new(AtomicUsize::new(0));
        env.schedule_idle(counter_task(&ran), Duration::from_millis(100));
        env.schedule_idle(counter_task(&ran), Duration::from_secs(60));

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(env.pending_idle(), 2);

        // busy host: only the expired deadline fires
        let later = Instant::now() + Duration::from_millis(200);
        assert_eq!(env.run_idle(later, false), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        assert_eq!(env.run_idle(Instant::now(), true), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 2);
        assert_eq!(env.pending_idle(), 0);
    }

    #[test]
    fn test_immediate_fallback() {
        let env = HeadlessEnvironment::immediate(ConnectionQuality::Unknown);
        let ran = Arc::new(AtomicUsize::new(0));
        env.schedule_idle(counter_task(&ran), Duration::from_millis(100));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(env.run_idle(Instant::now(), true), 0);
    }

    #[test]
    fn test_visibility_and_quality() {
        let env = HeadlessEnvironment::new(ConnectionQuality::FourG);
        assert!(env.is_page_visible());
        env.set_visible(false);
        assert!(!env.is_page_visible());
        env.set_quality(ConnectionQuality::ThreeG);
        assert_eq!(env.connection_quality(), ConnectionQuality::ThreeG);
    }
}
