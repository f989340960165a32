//! Forward prefetch window
//!
//! `schedule()` never loads anything itself. It hands a tiny task to the
//! environment's idle scheduler; the task posts a `PrefetchRequest` into a
//! channel, and the owner loop runs the request on its next pump. Loads thus
//! start off the scroll/playback path even on hosts that run idle tasks
//! immediately.

use std::ops::RangeInclusive;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::trace;

use super::env::Environment;
use super::inflight::RequestKind;
use super::loader::{FrameLoader, LoadOutcome};
use super::net_profile::NetProfile;

/// Longest an idle-scheduled prefetch may wait
pub const IDLE_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchRequest {
    /// Currently displayed index; the window starts after it
    pub from: usize,
    pub window: usize,
}

/// Result of one prefetch pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchPass {
    pub started: usize,
    /// Already cached or inflight
    pub skipped: usize,
    /// Stopped at the inflight ceiling
    pub rejected: bool,
}

pub struct PrefetchScheduler {
    count: usize,
    window_override: Option<usize>,
    tx: Sender<PrefetchRequest>,
    rx: Receiver<PrefetchRequest>,
}

impl PrefetchScheduler {
    pub fn new(count: usize, window_override: Option<usize>) -> Self {
        let (tx, rx) = unbounded();
        Self { count, window_override, tx, rx }
    }

    /// Explicit override, else the profile window; never more than `count - 1`.
    pub fn window(&self, profile: NetProfile) -> usize {
        self.window_override
            .unwrap_or(profile.window)
            .min(self.count.saturating_sub(1))
    }

    /// Indices a request covers: `from+1 ..= min(from+window, count-1)`
    pub fn targets(&self, req: PrefetchRequest) -> RangeInclusive<usize> {
        let last = self.count.saturating_sub(1).min(req.from.saturating_add(req.window));
        req.from + 1..=last
    }

    /// Queue a prefetch of the window after `from` for the next idle moment.
    /// Returns false when there is nothing to prefetch.
    pub fn schedule(&self, from: usize, profile: NetProfile, env: &dyn Environment) -> bool {
        let window = self.window(profile);
        if window == 0 || from + 1 >= self.count {
            return false;
        }
        let tx = self.tx.clone();
        let req = PrefetchRequest { from, window };
        env.schedule_idle(
            Box::new(move || {
                let _ = tx.send(req);
            }),
            IDLE_TIMEOUT,
        );
        true
    }

    /// Requests whose idle task has fired
    pub fn take_due(&self) -> Vec<PrefetchRequest> {
        self.rx.try_iter().collect()
    }

    /// Posted requests not yet taken
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn run(&self, req: PrefetchRequest, loader: &mut FrameLoader, profile: NetProfile) -> PrefetchPass {
        let mut pass = PrefetchPass::default();
        for index in self.targets(req) {
            if loader.is_cached(index) || loader.is_inflight(index) {
                pass.skipped += 1;
                continue;
            }
            match loader.load(index, RequestKind::Prefetch, profile) {
                LoadOutcome::Pending => pass.started += 1,
                LoadOutcome::Hit(_) => pass.skipped += 1,
                // inflight only shrinks on the owner thread, so the rest would bounce too
                LoadOutcome::Rejected => {
                    pass.rejected = true;
                    break;
                }
                LoadOutcome::OutOfRange | LoadOutcome::Closed => break,
            }
        }
        trace!(
            "prefetch after {}: started {}, skipped {}, ceiling hit {}",
            req.from, pass.started, pass.skipped, pass.rejected
        );
        pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::env::HeadlessEnvironment;
    use crate::core::net_profile::ConnectionQuality;
    use crate::entities::{FrameExt, SequenceConfig};
    use crate::fetch::FrameFetcher;
    use crate::testing::MemoryFetcher;
    use std::sync::Arc;
    use std::time::Instant;

    const PROFILE: NetProfile = NetProfile { max_inflight: 6, window: 4 };

    fn loader(count: usize, fetcher: &Arc<MemoryFetcher>) -> FrameLoader {
        let cfg = SequenceConfig {
            ext: FrameExt::Png,
            max_cache: 8,
            ..SequenceConfig::new(count, "/f", "f")
        };
        FrameLoader::with_threads(&cfg, Arc::clone(fetcher) as Arc<dyn FrameFetcher>, 2).unwrap()
    }

    #[test]
    fn test_window_clamps_to_count() {
        let s = PrefetchScheduler::new(5, None);
        assert_eq!(s.window(PROFILE), 4);
        assert_eq!(s.window(NetProfile { max_inflight: 3, window: 12 }), 4);
        assert_eq!(PrefetchScheduler::new(5, Some(2)).window(PROFILE), 2);
        assert_eq!(PrefetchScheduler::new(1, None).window(PROFILE), 0);
    }

    #[test]
    fn test_targets_stop_at_last_frame() {
        let s = PrefetchScheduler::new(10, None);
        assert_eq!(s.targets(PrefetchRequest { from: 2, window: 3 }), 3..=5);
        assert_eq!(s.targets(PrefetchRequest { from: 8, window: 3 }), 9..=9);
        assert!(s.targets(PrefetchRequest { from: 9, window: 3 }).is_empty());
    }

    #[test]
    fn test_schedule_defers_until_idle() {
        let env = HeadlessEnvironment::new(ConnectionQuality::FourG);
        let s = PrefetchScheduler::new(10, None);

        assert!(s.schedule(0, PROFILE, &env));
        assert!(s.take_due().is_empty());

        env.run_idle(Instant::now(), true);
        assert_eq!(s.take_due(), vec![PrefetchRequest { from: 0, window: 4 }]);
        // nothing ahead of the last frame
        assert!(!s.schedule(9, PROFILE, &env));
    }

    #[test]
    fn test_run_skips_known_and_respects_ceiling() {
        let fetcher = Arc::new(MemoryFetcher::gated());
        let mut loader = loader(20, &fetcher);
        let s = PrefetchScheduler::new(20, Some(8));
        let profile = NetProfile { max_inflight: 3, window: 8 };

        loader.load(2, RequestKind::OnDemand, profile);
        let pass = s.run(PrefetchRequest { from: 0, window: 8 }, &mut loader, profile);
        // 1 started, 2 skipped (inflight), 3 started, then ceiling
        assert_eq!(pass, PrefetchPass { started: 2, skipped: 1, rejected: true });
        assert_eq!(loader.inflight().indices(), vec![1, 2, 3]);
        loader.teardown();
    }

    #[test]
    fn test_run_after_teardown_is_noop() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let mut loader = loader(10, &fetcher);
        loader.teardown();
        let s = PrefetchScheduler::new(10, None);
        let pass = s.run(PrefetchRequest { from: 0, window: 4 }, &mut loader, PROFILE);
        assert_eq!(pass.started, 0);
        assert!(fetcher.tried().is_empty());
    }
}
