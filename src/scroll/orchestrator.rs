//! Scroll-Progress Orchestrator
//!
//! Turns a scroll position into the pinned hero timeline:
//!
//! - primary progress: 0 at pin start, 1 after `range_pct`% of the viewport
//!   height; drives the player, the content fade and the canvas parallax
//! - stats progress: a second window inside the pin (start and span are
//!   fractions of the pin distance); drives the stats reveal
//!
//! Measurements depend on the viewport, so they are redone on every
//! `LayoutEvent`.

use log::{debug, trace};

use super::source::{ScrollSource, ViewportRect};
use crate::entities::HeroConfig;

/// Content stays interactive only while nearly opaque
const POINTER_EVENTS_MIN_ALPHA: f32 = 0.95;
/// Content drifts up by this many percent of its height as it fades
const CONTENT_DRIFT_PCT: f32 = -6.0;
/// Canvas parallax over the whole pin, percent of its height
const CANVAS_PARALLAX_PCT: f32 = 8.0;
/// Stats rise from this offset (percent) as they appear
const STATS_RISE_PCT: f32 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutEvent {
    Load,
    Resize,
    OrientationChange,
}

/// Scroll offsets of the pinned section, in scroll units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinMeasurements {
    pub start: f64,
    pub distance: f64,
    pub stats_start: f64,
    pub stats_span: f64,
}

impl PinMeasurements {
    pub fn measure(hero: &HeroConfig, viewport: ViewportRect) -> Self {
        let distance = (viewport.height * hero.range_pct / 100.0).max(0.0);
        Self {
            start: hero.pin_top,
            distance,
            stats_start: hero.pin_top + distance * hero.stats_start_pct,
            stats_span: distance * hero.stats_fade_pct,
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.distance
    }

    pub fn progress(&self, scroll: f64) -> f32 {
        window_progress(scroll, self.start, self.distance)
    }

    pub fn stats_progress(&self, scroll: f64) -> f32 {
        window_progress(scroll, self.stats_start, self.stats_span)
    }
}

fn window_progress(scroll: f64, start: f64, span: f64) -> f32 {
    if span <= 0.0 {
        return if scroll >= start { 1.0 } else { 0.0 };
    }
    ((scroll - start) / span).clamp(0.0, 1.0) as f32
}

/// Content opacity for primary progress `p`: 1 before `fade_start`, 0 from
/// `fade_start + fade_span` on, linear in between.
pub fn fade_alpha(p: f32, fade_start: f32, fade_span: f32) -> f32 {
    let t = if fade_span > 0.0 {
        ((p - fade_start) / fade_span).clamp(0.0, 1.0)
    } else if p >= fade_start {
        1.0
    } else {
        0.0
    };
    1.0 - t
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContentFade {
    pub alpha: f32,
    pub y_percent: f32,
    pub pointer_events: bool,
    /// Background grid is hidden for the whole pin
    pub grid_alpha: f32,
}

impl ContentFade {
    pub fn at(p: f32, hero: &HeroConfig) -> Self {
        let alpha = fade_alpha(p, hero.fade_start, hero.fade_span);
        let t = 1.0 - alpha;
        Self {
            alpha,
            y_percent: CONTENT_DRIFT_PCT * t,
            pointer_events: alpha >= POINTER_EVENTS_MIN_ALPHA,
            grid_alpha: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsReveal {
    pub progress: f32,
    pub alpha: f32,
    pub y_percent: f32,
}

impl StatsReveal {
    pub fn at(progress: f32) -> Self {
        let alpha = progress.clamp(0.0, 1.0);
        Self {
            progress,
            alpha,
            y_percent: STATS_RISE_PCT * (1.0 - alpha),
        }
    }
}

/// Everything derived from one scroll position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollUpdate {
    pub scroll: f64,
    pub progress: f32,
    pub content: ContentFade,
    pub canvas_y_percent: f32,
    pub stats: StatsReveal,
    /// Set when the stats panel crossed its threshold on this update
    pub stats_toggled: Option<bool>,
}

pub struct ScrollOrchestrator<S: ScrollSource> {
    source: S,
    hero: HeroConfig,
    pin: PinMeasurements,
    stats_visible: bool,
}

impl<S: ScrollSource> ScrollOrchestrator<S> {
    pub fn new(source: S, hero: HeroConfig) -> Self {
        let hero = hero.normalized();
        let pin = PinMeasurements::measure(&hero, source.viewport_rect());
        debug!("ScrollOrchestrator: pin {:?}", pin);
        Self {
            source,
            hero,
            pin,
            stats_visible: false,
        }
    }

    /// Re-measure the pin against the source's current viewport.
    pub fn refresh(&mut self) {
        self.pin = PinMeasurements::measure(&self.hero, self.source.viewport_rect());
        debug!("ScrollOrchestrator refresh: pin {:?}", self.pin);
    }

    pub fn on_layout_event(&mut self, event: LayoutEvent) -> ScrollUpdate {
        trace!("layout event {:?}", event);
        self.refresh();
        self.update()
    }

    /// Read the scroll position and derive the timeline state.
    pub fn update(&mut self) -> ScrollUpdate {
        let scroll = self.source.scroll_position();
        let progress = self.pin.progress(scroll);
        let stats = StatsReveal::at(self.pin.stats_progress(scroll));

        let stats_toggled = if stats.progress > 0.0 && !self.stats_visible {
            self.stats_visible = true;
            Some(true)
        } else if stats.progress <= 0.0 && self.stats_visible {
            self.stats_visible = false;
            Some(false)
        } else {
            None
        };
        if let Some(visible) = stats_toggled {
            debug!("stats panel {}", if visible { "shown" } else { "hidden" });
        }

        ScrollUpdate {
            scroll,
            progress,
            content: ContentFade::at(progress, &self.hero),
            canvas_y_percent: CANVAS_PARALLAX_PCT * progress,
            stats,
            stats_toggled,
        }
    }

    /// Write through the source (the smooth driver, when one is active).
    pub fn scroll_to(&mut self, value: f64) {
        self.source.set_scroll_position(value);
    }

    pub fn pin(&self) -> PinMeasurements {
        self.pin
    }

    pub fn hero(&self) -> &HeroConfig {
        &self.hero
    }

    pub fn stats_visible(&self) -> bool {
        self.stats_visible
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scroll::source::NativeScroller;

    fn orchestrator(height: f64) -> ScrollOrchestrator<NativeScroller> {
        let source = NativeScroller::new(ViewportRect::new(1280.0, height), 10_000.0);
        ScrollOrchestrator::new(source, HeroConfig::default())
    }

    #[test]
    fn test_fade_alpha_window() {
        assert_eq!(fade_alpha(0.0, 0.0, 0.08), 1.0);
        assert!((fade_alpha(0.04, 0.0, 0.08) - 0.5).abs() < 1e-6);
        assert_eq!(fade_alpha(0.08, 0.0, 0.08), 0.0);
        assert_eq!(fade_alpha(0.5, 0.0, 0.08), 0.0);
    }

    #[test]
    fn test_pin_measurements() {
        let o = orchestrator(800.0);
        let pin = o.pin();
        assert_eq!(pin.distance, 1600.0);
        assert_eq!(pin.end(), 1600.0);
        assert_eq!(pin.stats_start, 720.0);
        assert_eq!(pin.stats_span, 400.0);
        assert_eq!(pin.progress(800.0), 0.5);
        assert_eq!(pin.progress(-10.0), 0.0);
        assert_eq!(pin.progress(99_999.0), 1.0);
    }

    #[test]
    fn test_update_derives_fade_and_parallax() {
        let mut o = orchestrator(800.0);
        let u = o.update();
        assert_eq!(u.progress, 0.0);
        assert_eq!(u.content.alpha, 1.0);
        assert!(u.content.pointer_events);
        assert_eq!(u.content.grid_alpha, 0.0);

        o.scroll_to(64.0); // 4% of the pin: halfway through the fade
        let u = o.update();
        assert!((u.content.alpha - 0.5).abs() < 1e-4);
        assert!((u.content.y_percent + 3.0).abs() < 1e-4);
        assert!(!u.content.pointer_events);
        assert!((u.canvas_y_percent - 0.32).abs() < 1e-4);
    }

    #[test]
    fn test_stats_toggle_reported_once_per_crossing() {
        let mut o = orchestrator(800.0);
        o.scroll_to(700.0);
        assert_eq!(o.update().stats_toggled, None);

        o.scroll_to(820.0);
        let u = o.update();
        assert_eq!(u.stats_toggled, Some(true));
        assert!((u.stats.alpha - 0.25).abs() < 1e-4);
        assert!((u.stats.y_percent - 4.5).abs() < 1e-4);

        o.scroll_to(1200.0);
        let u = o.update();
        assert_eq!(u.stats_toggled, None);
        assert_eq!(u.stats.alpha, 1.0);

        o.scroll_to(720.0);
        assert_eq!(o.update().stats_toggled, Some(false));
        assert!(!o.stats_visible());
    }

    #[test]
    fn test_resize_remeasures() {
        let mut o = orchestrator(800.0);
        o.scroll_to(800.0);
        assert_eq!(o.update().progress, 0.5);

        o.source_mut().resize(ViewportRect::new(1280.0, 400.0));
        let u = o.on_layout_event(LayoutEvent::Resize);
        assert_eq!(o.pin().distance, 800.0);
        assert_eq!(u.progress, 1.0);
    }

    #[test]
    fn test_env_overrides_move_stats_window() {
        let hero = HeroConfig::default().with_vars(|key| match key {
            crate::entities::config::ENV_STATS_START_PCT => Some("0.1".into()),
            crate::entities::config::ENV_STATS_FADE_PCT => Some("2".into()),
            _ => None,
        });
        let source = NativeScroller::new(ViewportRect::new(1280.0, 1000.0), 10_000.0);
        let o = ScrollOrchestrator::new(source, hero);
        assert!((o.pin().stats_start - 200.0).abs() < 1e-9);
        // fade span clamps to 0.95
        assert!((o.pin().stats_span - 1900.0).abs() < 1e-9);
    }
}
