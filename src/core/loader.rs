//! Frame loader: cache-first, candidate fallback, background fetch + decode
//!
//! `load()` answers synchronously:
//! - cache hit → texture (recency bumped)
//! - already inflight → `Pending` (one request per index)
//! - prefetch over the inflight ceiling → `Rejected` (backpressure)
//! - otherwise a worker job is queued → `Pending`
//!
//! The worker tries every candidate URL in order (explicit source first, then
//! synthesized names per extension) and reports exactly one `Completion`.
//! `drain()` runs on the owner thread: it clears the inflight entry, inserts
//! into the cache and hands deliveries to the player.
//!
//! Failures never surface as errors to callers, a missed frame is simply a
//! delivery without a texture.

use std::fmt;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, info, trace, warn};

use super::frame_cache::FrameCache;
use super::inflight::{CancelHandle, InflightSet, RequestKind};
use super::net_profile::NetProfile;
use super::workers::Workers;
use crate::entities::{FrameExt, Releasable, SequenceConfig, Texture};
use crate::fetch::{FetchError, FrameFetcher};

/// Builds the ordered URL list for a frame index
#[derive(Debug, Clone)]
pub struct CandidateResolver {
    prefix: String,
    base: String,
    pad: usize,
    start: usize,
    exts: Vec<FrameExt>,
    sources: Option<Arc<[String]>>,
}

impl CandidateResolver {
    pub fn from_config(cfg: &SequenceConfig) -> Self {
        Self {
            prefix: cfg.dir.trim_end_matches('/').to_string(),
            base: cfg.base.clone(),
            pad: cfg.pad,
            start: cfg.start,
            exts: cfg.extensions(),
            sources: cfg.sources.as_ref().map(|s| Arc::from(s.as_slice())),
        }
    }

    /// `{dir}/{base}{start + index, zero-padded}` without extension.
    /// `None` when the frame number does not fit in `usize`.
    pub fn base_name(&self, index: usize) -> Option<String> {
        let number = self.start.checked_add(index)?;
        Some(format!("{}/{}{:0width$}", self.prefix, self.base, number, width = self.pad))
    }

    /// Explicit source (if any) first, then one synthesized URL per extension.
    pub fn candidates(&self, index: usize) -> Vec<String> {
        let name = self.base_name(index);
        let explicit = self
            .sources
            .as_ref()
            .and_then(|s| s.get(index))
            .filter(|url| !url.is_empty());

        let mut urls = Vec::with_capacity(self.exts.len() + 1);
        if let Some(url) = explicit {
            urls.push(url.clone());
        }
        if let Some(name) = name {
            urls.extend(self.exts.iter().map(|ext| format!("{}.{}", name, ext)));
        }
        urls
    }
}

/// Why a load produced no texture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadMiss {
    /// Aborted through its cancel handle
    Cancelled,
    /// Every candidate failed to fetch or decode
    Exhausted { tried: usize },
}

impl fmt::Display for LoadMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadMiss::Cancelled => write!(f, "load cancelled"),
            LoadMiss::Exhausted { tried } => write!(f, "all {} candidates failed", tried),
        }
    }
}

impl std::error::Error for LoadMiss {}

#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Hit(Arc<Texture>),
    Pending,
    Rejected,
    OutOfRange,
    Closed,
}

impl LoadOutcome {
    pub fn texture(&self) -> Option<&Arc<Texture>> {
        match self {
            LoadOutcome::Hit(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, LoadOutcome::Pending)
    }
}

/// Finished load handed to the player
#[derive(Debug, Clone)]
pub struct Delivery {
    pub index: usize,
    pub kind: RequestKind,
    pub result: Result<Arc<Texture>, LoadMiss>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoaderStats {
    pub started: u64,
    pub delivered: u64,
    pub missed: u64,
    pub rejected: u64,
    /// Completions dropped because the loader was torn down
    pub discarded: u64,
}

struct Completion {
    index: usize,
    result: Result<Texture, LoadMiss>,
}

/// Sends exactly one completion per job, even if the job panics.
struct CompletionGuard {
    index: usize,
    tx: Sender<Completion>,
    sent: bool,
}

impl CompletionGuard {
    fn new(index: usize, tx: Sender<Completion>) -> Self {
        Self { index, tx, sent: false }
    }

    fn finish(mut self, result: Result<Texture, LoadMiss>) {
        self.sent = true;
        // receiver gone = loader dropped, nothing left to notify
        let _ = self.tx.send(Completion { index: self.index, result });
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if !self.sent {
            let _ = self.tx.send(Completion {
                index: self.index,
                result: Err(LoadMiss::Cancelled),
            });
        }
    }
}

/// Decode a fetched payload into a frame texture.
pub fn decode_frame(index: usize, url: &str, bytes: &[u8]) -> Result<Texture, image::ImageError> {
    let img = image::load_from_memory(bytes)?.to_rgba8();
    Ok(Texture::new(index, url, img))
}

/// Try each candidate in order; first fetch+decode success wins.
fn resolve(
    index: usize,
    candidates: &[String],
    fetcher: &dyn FrameFetcher,
    cancel: &CancelHandle,
) -> Result<Texture, LoadMiss> {
    for url in candidates {
        if cancel.is_aborted() {
            return Err(LoadMiss::Cancelled);
        }
        let bytes = match fetcher.fetch(url, cancel) {
            Ok(bytes) => bytes,
            Err(FetchError::Cancelled) => return Err(LoadMiss::Cancelled),
            Err(e) => {
                trace!("frame {}: {} failed: {}", index, url, e);
                continue;
            }
        };
        match decode_frame(index, url, &bytes) {
            Ok(tex) if cancel.is_aborted() => {
                tex.release();
                return Err(LoadMiss::Cancelled);
            }
            Ok(tex) => return Ok(tex),
            Err(e) => trace!("frame {}: {} decode failed: {}", index, url, e),
        }
    }
    Err(LoadMiss::Exhausted { tried: candidates.len() })
}

pub struct FrameLoader {
    resolver: CandidateResolver,
    cache: FrameCache<Texture>,
    inflight: InflightSet,
    fetcher: Arc<dyn FrameFetcher>,
    workers: Workers,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    count: usize,
    alive: bool,
    stats: LoaderStats,
}

impl FrameLoader {
    pub fn new(config: &SequenceConfig, fetcher: Arc<dyn FrameFetcher>) -> std::io::Result<Self> {
        Self::with_threads(config, fetcher, Workers::default_threads())
    }

    pub fn with_threads(
        config: &SequenceConfig,
        fetcher: Arc<dyn FrameFetcher>,
        threads: usize,
    ) -> std::io::Result<Self> {
        let workers = Workers::new(threads, "scrollseq-fetch")?;
        let (tx, rx) = unbounded();
        debug!(
            "FrameLoader: {} frames, cache {}, {} workers",
            config.count,
            config.max_cache,
            workers.threads()
        );
        Ok(Self {
            resolver: CandidateResolver::from_config(config),
            cache: FrameCache::new(config.max_cache),
            inflight: InflightSet::new(),
            fetcher,
            workers,
            tx,
            rx,
            count: config.count,
            alive: true,
            stats: LoaderStats::default(),
        })
    }

    /// Request frame `index`. Never blocks on I/O.
    pub fn load(&mut self, index: usize, kind: RequestKind, profile: NetProfile) -> LoadOutcome {
        if !self.alive {
            return LoadOutcome::Closed;
        }
        if index >= self.count {
            warn!("Frame {} out of range (count {})", index, self.count);
            return LoadOutcome::OutOfRange;
        }
        if let Some(tex) = self.cache.get(index) {
            return LoadOutcome::Hit(tex);
        }
        if self.inflight.contains(index) {
            return LoadOutcome::Pending;
        }
        if kind == RequestKind::Prefetch && self.inflight.len() >= profile.max_inflight {
            self.stats.rejected += 1;
            return LoadOutcome::Rejected;
        }
        let Some(cancel) = self.inflight.register(index, kind) else {
            return LoadOutcome::Pending;
        };

        let candidates = self.resolver.candidates(index);
        let fetcher = Arc::clone(&self.fetcher);
        let guard = CompletionGuard::new(index, self.tx.clone());
        self.workers.execute(move || {
            let result = resolve(index, &candidates, fetcher.as_ref(), &cancel);
            guard.finish(result);
        });
        self.stats.started += 1;
        trace!("frame {} requested ({:?}), {} inflight", index, kind, self.inflight.len());
        LoadOutcome::Pending
    }

    /// Apply finished loads: inflight cleanup, cache insert, deliveries out.
    pub fn drain(&mut self) -> Vec<Delivery> {
        self.drain_keeping(None)
    }

    /// Like `drain`, but `keep` goes into the cache last, so a burst of other
    /// completions in the same batch cannot evict it before it is delivered.
    pub fn drain_keeping(&mut self, keep: Option<usize>) -> Vec<Delivery> {
        let mut batch: Vec<Completion> = self.rx.try_iter().collect();
        if keep.is_some() {
            // stable: everything else keeps arrival order
            batch.sort_by_key(|c| Some(c.index) == keep);
        }

        let mut out = Vec::with_capacity(batch.len());
        for done in batch {
            let kind = self.inflight.kind(done.index);
            let tracked = self.inflight.complete(done.index);

            let (Some(kind), Some(elapsed), true) = (kind, tracked, self.alive) else {
                if let Ok(tex) = done.result {
                    tex.release();
                }
                self.stats.discarded += 1;
                continue;
            };

            match done.result {
                Ok(tex) => {
                    let tex = Arc::new(tex);
                    self.cache.put(done.index, Arc::clone(&tex));
                    self.stats.delivered += 1;
                    debug!("frame {} loaded from {} in {:?}", done.index, tex.url(), elapsed);
                    out.push(Delivery { index: done.index, kind, result: Ok(tex) });
                }
                Err(miss) => {
                    self.stats.missed += 1;
                    debug!("frame {} missed: {}", done.index, miss);
                    out.push(Delivery { index: done.index, kind, result: Err(miss) });
                }
            }
        }
        out
    }

    /// Abort all requests and release every cached frame. Idempotent.
    pub fn teardown(&mut self) -> (usize, usize) {
        if !self.alive {
            return (0, 0);
        }
        self.alive = false;
        let aborted = self.inflight.abort_all();
        let released = self.cache.release_all();
        while let Ok(done) = self.rx.try_recv() {
            if let Ok(tex) = done.result {
                tex.release();
            }
            self.stats.discarded += 1;
        }
        info!("Loader torn down: aborted {} requests, released {} frames", aborted, released);
        (aborted, released)
    }

    pub fn is_cached(&self, index: usize) -> bool {
        self.cache.contains(index)
    }

    pub fn is_inflight(&self, index: usize) -> bool {
        self.inflight.contains(index)
    }

    pub fn cache(&self) -> &FrameCache<Texture> {
        &self.cache
    }

    pub fn inflight(&self) -> &InflightSet {
        &self.inflight
    }

    pub fn resolver(&self) -> &CandidateResolver {
        &self.resolver
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn stats(&self) -> LoaderStats {
        self.stats
    }
}

impl Drop for FrameLoader {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryFetcher, png_bytes};
    use std::time::{Duration, Instant};

    const FAST: NetProfile = NetProfile { max_inflight: 6, window: 4 };

    fn config(count: usize) -> SequenceConfig {
        SequenceConfig {
            max_cache: 4,
            ext: FrameExt::Png,
            ..SequenceConfig::new(count, "/f", "f")
        }
    }

    fn loader(cfg: &SequenceConfig, fetcher: &Arc<MemoryFetcher>) -> FrameLoader {
        let fetcher: Arc<dyn FrameFetcher> = Arc::clone(fetcher) as Arc<dyn FrameFetcher>;
        FrameLoader::with_threads(cfg, fetcher, 2).unwrap()
    }

    fn settle(loader: &mut FrameLoader) -> Vec<Delivery> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut all = Vec::new();
        loop {
            all.extend(loader.drain());
            if loader.inflight().is_empty() || Instant::now() > deadline {
                return all;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_candidate_order() {
        let cfg = SequenceConfig {
            sources: Some(vec!["A".into()]),
            ext_candidates: vec![FrameExt::Webp, FrameExt::Png],
            ..SequenceConfig::new(3, "/seq/", "f")
        };
        let r = CandidateResolver::from_config(&cfg);
        assert_eq!(r.candidates(0), vec!["A", "/seq/f001.webp", "/seq/f001.png"]);
        // no explicit source past the end of the list
        assert_eq!(r.candidates(2), vec!["/seq/f003.webp", "/seq/f003.png"]);
    }

    #[test]
    fn test_base_name_padding_and_start() {
        let cfg = SequenceConfig {
            pad: 4,
            start: 0,
            sources: Some(vec![String::new()]),
            ..SequenceConfig::new(20, "https://cdn.x/seq", "HERO_")
        };
        let r = CandidateResolver::from_config(&cfg);
        assert_eq!(r.base_name(12).as_deref(), Some("https://cdn.x/seq/HERO_0012"));
        // empty explicit entries are skipped
        assert_eq!(r.candidates(0), vec!["https://cdn.x/seq/HERO_0000.webp"]);
    }

    #[test]
    fn test_frame_number_overflow_skips_synthesized_names() {
        let cfg = SequenceConfig {
            start: usize::MAX - 1,
            sources: Some(vec!["a".into(), "b".into(), "c".into()]),
            ..SequenceConfig::new(3, "/seq", "f")
        };
        let r = CandidateResolver::from_config(&cfg);
        assert_eq!(r.base_name(1).as_deref(), Some(format!("/seq/f{}", usize::MAX).as_str()));
        assert_eq!(r.base_name(2), None);
        assert_eq!(r.candidates(2), vec!["c"]);
    }

    #[test]
    fn test_kept_index_is_inserted_last() {
        let urls = ["/f/f001.png", "/f/f002.png", "/f/f003.png", "/f/f004.png"];
        let fetcher = Arc::new(MemoryFetcher::new().with_frames(urls));
        let cfg = SequenceConfig { max_cache: 1, ..config(4) };
        let mut l = loader(&cfg, &fetcher);
        for i in 0..4 {
            assert!(l.load(i, RequestKind::OnDemand, FAST).is_pending());
        }
        let deadline = Instant::now() + Duration::from_secs(5);
        while fetcher.tried().len() < 4 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        std::thread::sleep(Duration::from_millis(200));

        let out = l.drain_keeping(Some(0));
        assert_eq!(out.len(), 4);
        let last = out.last().unwrap();
        assert_eq!(last.index, 0);
        assert!(!last.result.as_ref().unwrap().is_released());
        assert_eq!(l.cache().indices(), vec![0]);
        // the others were evicted in arrival order
        assert!(out[..3].iter().all(|d| d.result.as_ref().unwrap().is_released()));
    }

    #[test]
    fn test_second_request_hits_cache() {
        let fetcher = Arc::new(MemoryFetcher::new().with_frames(["/f/f001.png"]));
        let cfg = config(3);
        let mut loader = loader(&cfg, &fetcher);

        assert!(loader.load(0, RequestKind::OnDemand, FAST).is_pending());
        let delivered = settle(&mut loader);
        assert_eq!(delivered.len(), 1);
        let first = delivered[0].result.clone().unwrap();

        let LoadOutcome::Hit(again) = loader.load(0, RequestKind::OnDemand, FAST) else {
            panic!("expected cache hit");
        };
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(fetcher.tried_count("/f/f001.png"), 1);
    }

    #[test]
    fn test_falls_through_failed_candidates() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("/f/f001.webp", b"not an image".to_vec());
        fetcher.insert("/f/f001.png", png_bytes(2, 2, [0, 0, 255, 255]));
        let cfg = SequenceConfig {
            sources: Some(vec!["https://cdn/missing.png".into()]),
            ext_candidates: vec![FrameExt::Webp, FrameExt::Png, FrameExt::Jpg],
            ..config(1)
        };
        let mut loader = loader(&cfg, &fetcher);

        loader.load(0, RequestKind::OnDemand, FAST);
        let d = settle(&mut loader);
        let tex = d[0].result.clone().unwrap();
        assert_eq!(tex.url(), "/f/f001.png");
        assert_eq!(
            fetcher.tried(),
            vec!["https://cdn/missing.png", "/f/f001.webp", "/f/f001.png"]
        );
    }

    #[test]
    fn test_all_candidates_fail_is_a_miss() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let cfg = SequenceConfig {
            ext_candidates: vec![FrameExt::Webp, FrameExt::Png],
            ..config(2)
        };
        let mut loader = loader(&cfg, &fetcher);

        loader.load(1, RequestKind::OnDemand, FAST);
        let d = settle(&mut loader);
        assert_eq!(d[0].result.as_ref().unwrap_err(), &LoadMiss::Exhausted { tried: 2 });
        assert!(loader.cache().is_empty());
        assert!(loader.inflight().is_empty());
        assert_eq!(loader.stats().missed, 1);
    }

    #[test]
    fn test_one_inflight_request_per_index() {
        let fetcher = Arc::new(MemoryFetcher::gated().with_frames(["/f/f003.png"]));
        let cfg = config(5);
        let mut loader = loader(&cfg, &fetcher);

        assert!(loader.load(2, RequestKind::Prefetch, FAST).is_pending());
        assert!(loader.load(2, RequestKind::OnDemand, FAST).is_pending());
        assert!(loader.load(2, RequestKind::OnDemand, FAST).is_pending());
        assert_eq!(loader.inflight().len(), 1);
        assert_eq!(loader.stats().started, 1);

        fetcher.open();
        settle(&mut loader);
        assert_eq!(fetcher.tried_count("/f/f003.png"), 1);
        assert!(loader.is_cached(2));
    }

    #[test]
    fn test_prefetch_backpressure_spares_on_demand() {
        let fetcher = Arc::new(MemoryFetcher::gated());
        let cfg = config(10);
        let mut loader = loader(&cfg, &fetcher);
        let tight = NetProfile { max_inflight: 2, window: 4 };

        assert!(loader.load(0, RequestKind::Prefetch, tight).is_pending());
        assert!(loader.load(1, RequestKind::Prefetch, tight).is_pending());
        assert!(matches!(loader.load(2, RequestKind::Prefetch, tight), LoadOutcome::Rejected));
        assert!(!loader.is_inflight(2));
        assert_eq!(loader.inflight().len(), 2);

        assert!(loader.load(3, RequestKind::OnDemand, tight).is_pending());
        assert_eq!(loader.inflight().len(), 3);
        assert_eq!(loader.stats().rejected, 1);
        loader.teardown();
    }

    #[test]
    fn test_teardown_aborts_and_closes() {
        let fetcher = Arc::new(MemoryFetcher::gated());
        let cfg = config(10);
        let mut loader = loader(&cfg, &fetcher);

        loader.load(0, RequestKind::OnDemand, FAST);
        loader.load(1, RequestKind::Prefetch, FAST);
        let handles: Vec<_> = [0, 1].iter().filter_map(|&i| loader.inflight().handle(i)).collect();
        assert_eq!(handles.len(), 2);

        assert_eq!(loader.teardown(), (2, 0));
        assert!(handles.iter().all(CancelHandle::is_aborted));
        assert!(loader.inflight().is_empty());
        assert!(loader.cache().is_empty());
        assert!(matches!(loader.load(4, RequestKind::OnDemand, FAST), LoadOutcome::Closed));
        assert!(loader.drain().is_empty());
    }

    #[test]
    fn test_teardown_releases_cached_frames() {
        let fetcher = Arc::new(MemoryFetcher::new().with_frames(["/f/f001.png", "/f/f002.png"]));
        let cfg = config(2);
        let mut loader = loader(&cfg, &fetcher);
        loader.load(0, RequestKind::OnDemand, FAST);
        loader.load(1, RequestKind::OnDemand, FAST);
        let textures: Vec<_> = settle(&mut loader).into_iter().filter_map(|d| d.result.ok()).collect();
        assert_eq!(textures.len(), 2);

        assert_eq!(loader.teardown(), (0, 2));
        assert!(textures.iter().all(|t| t.is_released()));
    }

    #[test]
    fn test_eviction_releases_oldest_texture() {
        let urls: Vec<String> = (1..=3).map(|i| format!("/f/f{:03}.png", i)).collect();
        let fetcher = Arc::new(MemoryFetcher::new().with_frames(urls.iter().map(String::as_str)));
        let cfg = SequenceConfig { max_cache: 2, ..config(3) };
        let mut loader = loader(&cfg, &fetcher);

        let mut textures = Vec::new();
        for i in 0..3 {
            loader.load(i, RequestKind::OnDemand, FAST);
            textures.extend(settle(&mut loader).into_iter().filter_map(|d| d.result.ok()));
        }
        assert_eq!(loader.cache().indices(), vec![1, 2]);
        assert!(textures[0].is_released());
        assert!(!textures[2].is_released());
    }

    #[test]
    fn test_out_of_range() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let cfg = config(2);
        let mut loader = loader(&cfg, &fetcher);
        assert!(matches!(loader.load(2, RequestKind::OnDemand, FAST), LoadOutcome::OutOfRange));
        assert!(fetcher.tried().is_empty());
    }
}
