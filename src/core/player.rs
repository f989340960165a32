//! Sequence playback driver
//!
//! Two modes, picked by whether a progress value is present:
//!
//! - **Scrubbed**: `set_progress()` maps scroll progress to a frame index,
//!   requests it on demand and schedules the forward prefetch window. No timer.
//! - **Free-running**: `update()` is called from the host loop; a fixed
//!   interval clock (`max(1000/fps, 16)` ms) advances the index by one,
//!   wrapping at `count`. Ticks are skipped while the page is hidden and
//!   nothing runs while inactive.
//!
//! # Owner loop
//!
//! Loads finish on worker threads. `pump()` applies them: prefetch requests
//! whose idle task fired are started, completions land in the cache, and a
//! completion is shown only if it is the frame last asked for. A late frame
//! that has been superseded just warms the cache.
//!
//! If the target frame is not ready yet, the previous frame stays on screen.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use super::env::Environment;
use super::events::{EventBus, SceneEvent};
use super::inflight::RequestKind;
use super::loader::{FrameLoader, LoadOutcome};
use super::net_profile::NetProfile;
use super::prefetch::PrefetchScheduler;
use crate::entities::{ConfigError, Releasable, SequenceConfig, Texture};
use crate::fetch::FrameFetcher;
use crate::render::{PlaneParams, RenderSurface, UvTransform, Viewport};

/// Free-running tick floor
pub const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Absorbs float error so exact frame boundaries do not round down
const SCRUB_EPSILON: f64 = 1e-5;

#[derive(Debug)]
pub enum PlayerError {
    Config(ConfigError),
    /// Worker pool could not be spawned
    Workers(std::io::Error),
}

impl fmt::Display for PlayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerError::Config(e) => write!(f, "{}", e),
            PlayerError::Workers(e) => write!(f, "Failed to start loader workers: {}", e),
        }
    }
}

impl std::error::Error for PlayerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlayerError::Config(e) => Some(e),
            PlayerError::Workers(e) => Some(e),
        }
    }
}

impl From<ConfigError> for PlayerError {
    fn from(e: ConfigError) -> Self {
        PlayerError::Config(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackMode {
    Scrubbed { progress: f32, loops: u32 },
    FreeRunning { fps: f32 },
}

impl PlaybackMode {
    pub fn from_config(cfg: &SequenceConfig) -> Self {
        match cfg.progress {
            Some(progress) => PlaybackMode::Scrubbed {
                progress,
                loops: cfg.loops.max(1),
            },
            None => PlaybackMode::FreeRunning { fps: cfg.fps },
        }
    }

    pub fn is_scrubbed(&self) -> bool {
        matches!(self, PlaybackMode::Scrubbed { .. })
    }
}

/// Frame index for a scroll progress value.
///
/// Progress is clamped to [0, 1]; with `loops > 1` it is remapped to
/// `(p * loops) mod 1` so the sequence cycles that many times.
pub fn scrub_index(progress: f32, loops: u32, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    let p = if progress.is_nan() { 0.0 } else { f64::from(progress).clamp(0.0, 1.0) };
    let loops = loops.max(1);
    let p_eff = if loops > 1 { (p * f64::from(loops)) % 1.0 } else { p };
    let idx = (p_eff * (count - 1) as f64 + SCRUB_EPSILON).floor();
    (idx.max(0.0) as usize).min(count - 1)
}

/// Fixed-interval tick source for free-running playback
#[derive(Debug, Clone)]
pub struct FrameClock {
    interval: Duration,
    next: Option<Instant>,
}

impl FrameClock {
    pub fn new(fps: f32) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 60.0 };
        let interval = Duration::from_secs_f64(1.0 / f64::from(fps)).max(MIN_FRAME_INTERVAL);
        Self { interval, next: None }
    }

    pub fn start(&mut self, now: Instant) {
        self.next = Some(now + self.interval);
    }

    pub fn stop(&mut self) {
        self.next = None;
    }

    pub fn is_running(&self) -> bool {
        self.next.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// At most one tick per call; a late host does not get a burst.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(next) = self.next else {
            return false;
        };
        if now < next {
            return false;
        }
        let mut following = next + self.interval;
        if following <= now {
            following = now + self.interval;
        }
        self.next = Some(following);
        true
    }
}

pub struct SequencePlayer<S: RenderSurface> {
    config: SequenceConfig,
    mode: PlaybackMode,
    env: Arc<dyn Environment>,
    fetcher: Arc<dyn FrameFetcher>,
    loader: FrameLoader,
    scheduler: PrefetchScheduler,
    surface: S,
    uv: UvTransform,
    clock: FrameClock,
    /// Free-running position
    position: usize,
    /// Last on-demand request; only its completion may be shown
    target: Option<usize>,
    displayed: Option<Arc<Texture>>,
    events: EventBus<SceneEvent>,
    alive: bool,
}

impl<S: RenderSurface> SequencePlayer<S> {
    pub fn new(
        config: SequenceConfig,
        env: Arc<dyn Environment>,
        fetcher: Arc<dyn FrameFetcher>,
        mut surface: S,
    ) -> Result<Self, PlayerError> {
        config.validate()?;
        let loader = FrameLoader::new(&config, Arc::clone(&fetcher)).map_err(PlayerError::Workers)?;
        surface.configure(PlaneParams::from_config(&config));
        surface.set_visible(config.visible);

        let mut player = Self {
            mode: PlaybackMode::from_config(&config),
            scheduler: PrefetchScheduler::new(config.count, config.prefetch_window),
            uv: UvTransform::from_orient(config.orient),
            clock: FrameClock::new(config.fps),
            config,
            env,
            fetcher,
            loader,
            surface,
            position: 0,
            target: None,
            displayed: None,
            events: EventBus::new(),
            alive: true,
        };
        info!(
            "SequencePlayer: {} frames, {:?}, profile {:?}",
            player.config.count,
            player.mode,
            player.profile()
        );
        player.start_mode(Instant::now());
        Ok(player)
    }

    fn start_mode(&mut self, now: Instant) {
        match self.mode {
            PlaybackMode::Scrubbed { progress, .. } => {
                self.clock.stop();
                self.set_progress(progress);
            }
            PlaybackMode::FreeRunning { .. } if self.config.active => self.clock.start(now),
            PlaybackMode::FreeRunning { .. } => self.clock.stop(),
        }
    }

    /// Concurrency ceiling and window for the current connection
    pub fn profile(&self) -> NetProfile {
        NetProfile::select(
            self.env.connection_quality(),
            self.config.net_profile_override.as_ref(),
        )
    }

    /// Scrub to `progress`. Returns the target index.
    ///
    /// The mode is fixed for the player's lifetime: a free-running player
    /// ignores progress. Use `reconfigure` to switch modes.
    pub fn set_progress(&mut self, progress: f32) -> Option<usize> {
        if !self.alive {
            return None;
        }
        if !self.mode.is_scrubbed() {
            debug!("Free-running player, progress {} ignored", progress);
            return None;
        }
        let loops = self.config.loops.max(1);
        self.mode = PlaybackMode::Scrubbed { progress, loops };
        self.config.progress = Some(progress);

        let index = scrub_index(progress, loops, self.config.count);
        self.show_frame(index);
        self.prefetch_from(index);
        Some(index)
    }

    /// Host loop hook for free-running playback.
    pub fn update(&mut self) -> Option<usize> {
        self.update_at(Instant::now())
    }

    pub fn update_at(&mut self, now: Instant) -> Option<usize> {
        if !self.alive || self.mode.is_scrubbed() || !self.config.active {
            return None;
        }
        if !self.clock.poll(now) {
            return None;
        }
        if !self.env.is_page_visible() {
            trace!("Page hidden, tick skipped");
            return None;
        }
        self.position = (self.position + 1) % self.config.count;
        let index = self.position;
        self.show_frame(index);
        self.prefetch_from(index);
        Some(index)
    }

    /// Request `index` for display. Shown now on a cache hit, else on completion.
    pub fn show_frame(&mut self, index: usize) {
        if !self.alive {
            return;
        }
        self.target = Some(index);
        let profile = self.profile();
        match self.loader.load(index, RequestKind::OnDemand, profile) {
            LoadOutcome::Hit(tex) => self.present(tex),
            LoadOutcome::Pending => trace!("frame {} pending", index),
            outcome => debug!("frame {} not requested: {:?}", index, outcome),
        }
    }

    fn prefetch_from(&mut self, index: usize) {
        let profile = self.profile();
        self.scheduler.schedule(index, profile, self.env.as_ref());
    }

    /// Apply due prefetches and finished loads. Returns deliveries applied.
    pub fn pump(&mut self) -> usize {
        if !self.alive {
            return 0;
        }
        let profile = self.profile();
        for req in self.scheduler.take_due() {
            self.scheduler.run(req, &mut self.loader, profile);
        }

        let deliveries = self.loader.drain_keeping(self.target);
        let applied = deliveries.len();
        for delivery in deliveries {
            if self.target != Some(delivery.index) {
                continue;
            }
            match delivery.result {
                Ok(tex) => self.present(tex),
                Err(miss) => {
                    warn!("Frame {} unavailable: {}", delivery.index, miss);
                    self.events.emit(SceneEvent::FrameMissed { index: delivery.index });
                }
            }
        }
        applied
    }

    fn present(&mut self, tex: Arc<Texture>) {
        if self.displayed.as_ref().is_some_and(|d| Arc::ptr_eq(d, &tex)) {
            return;
        }
        let index = tex.index();
        if tex.is_released() {
            warn!("Frame {} released before it could be shown", index);
            self.events.emit(SceneEvent::FrameMissed { index });
            return;
        }
        self.surface.present(&tex, self.uv);
        self.surface.request_redraw();
        self.displayed = Some(tex);
        trace!("frame {} shown", index);
        self.events.emit(SceneEvent::FrameShown { index });
    }

    /// Pump until nothing is inflight or queued, or `timeout` passes.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if !self.alive
                || (self.loader.inflight().is_empty() && self.scheduler.pending() == 0)
            {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn resize(&mut self, viewport: Viewport) {
        self.surface.resize(viewport);
        self.surface.request_redraw();
    }

    pub fn set_active(&mut self, active: bool) {
        self.set_active_at(active, Instant::now());
    }

    /// (Re)start or stop the free-running clock at `now`.
    pub fn set_active_at(&mut self, active: bool, now: Instant) {
        self.config.active = active;
        if !self.alive || self.mode.is_scrubbed() {
            return;
        }
        if active {
            self.clock.start(now);
        } else {
            self.clock.stop();
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.config.visible = visible;
        self.surface.set_visible(visible);
        self.surface.request_redraw();
    }

    /// Abort loads, free every cached frame, stop the clock. Idempotent.
    pub fn teardown(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;
        self.clock.stop();
        self.loader.teardown();
        self.displayed = None;
        self.target = None;
        info!("SequencePlayer torn down");
        self.events.emit(SceneEvent::TornDown);
    }

    /// Replace the sequence: the old loader is torn down, a fresh one starts.
    pub fn reconfigure(&mut self, config: SequenceConfig) -> Result<(), PlayerError> {
        config.validate()?;
        let loader = FrameLoader::new(&config, Arc::clone(&self.fetcher)).map_err(PlayerError::Workers)?;
        self.loader.teardown();
        self.loader = loader;

        self.scheduler = PrefetchScheduler::new(config.count, config.prefetch_window);
        self.uv = UvTransform::from_orient(config.orient);
        self.clock = FrameClock::new(config.fps);
        self.mode = PlaybackMode::from_config(&config);
        self.surface.configure(PlaneParams::from_config(&config));
        self.surface.set_visible(config.visible);
        self.config = config;
        self.position = 0;
        self.target = None;
        self.displayed = None;
        self.alive = true;
        info!("SequencePlayer reconfigured: {} frames, {:?}", self.config.count, self.mode);
        self.start_mode(Instant::now());
        Ok(())
    }

    pub fn config(&self) -> &SequenceConfig {
        &self.config
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn loader(&self) -> &FrameLoader {
        &self.loader
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn events(&self) -> &EventBus<SceneEvent> {
        &self.events
    }

    pub fn displayed_index(&self) -> Option<usize> {
        self.displayed.as_ref().map(|t| t.index())
    }

    pub fn target(&self) -> Option<usize> {
        self.target
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }
}

impl<S: RenderSurface> Drop for SequencePlayer<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}
