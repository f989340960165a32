//! Scroll position sources
//!
//! The orchestrator reads and writes scroll position only through
//! `ScrollSource`, so it does not care whether positions come straight from
//! the page or from a smoothing driver.

use std::time::Duration;

use log::trace;

/// Interpolation factor per 60 Hz frame
pub const DEFAULT_LERP: f64 = 0.06;
pub const WHEEL_MULTIPLIER: f64 = 1.0;
pub const TOUCH_MULTIPLIER: f64 = 1.2;
/// Distance under which the smooth scroller snaps to its target
pub const SETTLE_EPSILON: f64 = 0.5;

const REFERENCE_FPS: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportRect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl ViewportRect {
    pub fn new(width: f64, height: f64) -> Self {
        Self { top: 0.0, left: 0.0, width, height }
    }
}

pub trait ScrollSource {
    fn scroll_position(&self) -> f64;

    fn set_scroll_position(&mut self, value: f64);

    fn viewport_rect(&self) -> ViewportRect;
}

fn clamp_scroll(value: f64, limit: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, limit.max(0.0))
}

/// Position is whatever was last set; no smoothing
#[derive(Debug, Clone)]
pub struct NativeScroller {
    position: f64,
    limit: f64,
    viewport: ViewportRect,
}

impl NativeScroller {
    pub fn new(viewport: ViewportRect, limit: f64) -> Self {
        Self { position: 0.0, limit: limit.max(0.0), viewport }
    }

    pub fn scroll_by(&mut self, delta: f64) {
        self.position = clamp_scroll(self.position + delta, self.limit);
    }

    pub fn set_limit(&mut self, limit: f64) {
        self.limit = limit.max(0.0);
        self.position = clamp_scroll(self.position, self.limit);
    }

    pub fn resize(&mut self, viewport: ViewportRect) {
        self.viewport = viewport;
    }
}

impl ScrollSource for NativeScroller {
    fn scroll_position(&self) -> f64 {
        self.position
    }

    fn set_scroll_position(&mut self, value: f64) {
        self.position = clamp_scroll(value, self.limit);
    }

    fn viewport_rect(&self) -> ViewportRect {
        self.viewport
    }
}

/// Smooth scroll driver: input moves a target, `raf()` eases toward it.
///
/// Easing is exponential and frame-rate independent: over `dt` the remaining
/// distance shrinks by `(1 - lerp)^(dt * 60)`.
#[derive(Debug, Clone)]
pub struct SmoothScroller {
    current: f64,
    target: f64,
    limit: f64,
    viewport: ViewportRect,
    lerp: f64,
    wheel_multiplier: f64,
    touch_multiplier: f64,
}

impl SmoothScroller {
    pub fn new(viewport: ViewportRect, limit: f64) -> Self {
        Self {
            current: 0.0,
            target: 0.0,
            limit: limit.max(0.0),
            viewport,
            lerp: DEFAULT_LERP,
            wheel_multiplier: WHEEL_MULTIPLIER,
            touch_multiplier: TOUCH_MULTIPLIER,
        }
    }

    pub fn with_lerp(mut self, lerp: f64) -> Self {
        self.lerp = if lerp.is_finite() { lerp.clamp(0.001, 1.0) } else { DEFAULT_LERP };
        self
    }

    pub fn wheel(&mut self, delta: f64) {
        self.target = clamp_scroll(self.target + delta * self.wheel_multiplier, self.limit);
    }

    pub fn touch(&mut self, delta: f64) {
        self.target = clamp_scroll(self.target + delta * self.touch_multiplier, self.limit);
    }

    /// Animate to `value`, or jump there when `immediate`.
    pub fn scroll_to(&mut self, value: f64, immediate: bool) {
        self.target = clamp_scroll(value, self.limit);
        if immediate {
            self.current = self.target;
        }
    }

    /// Advance one animation frame. Returns whether the position moved.
    pub fn raf(&mut self, dt: Duration) -> bool {
        if self.is_settled() {
            return false;
        }
        let frames = dt.as_secs_f64() * REFERENCE_FPS;
        let keep = (1.0 - self.lerp).powf(frames);
        let before = self.current;
        self.current = self.target + (self.current - self.target) * keep;
        if (self.target - self.current).abs() < SETTLE_EPSILON {
            self.current = self.target;
        }
        trace!("smooth scroll {:.1} -> {:.1} (target {:.1})", before, self.current, self.target);
        self.current != before
    }

    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }

    pub fn set_limit(&mut self, limit: f64) {
        self.limit = limit.max(0.0);
        self.target = clamp_scroll(self.target, self.limit);
        self.current = clamp_scroll(self.current, self.limit);
    }

    pub fn resize(&mut self, viewport: ViewportRect) {
        self.viewport = viewport;
    }
}

impl ScrollSource for SmoothScroller {
    fn scroll_position(&self) -> f64 {
        self.current
    }

    /// Writes jump immediately, like a proxied `scrollTop` assignment.
    fn set_scroll_position(&mut self, value: f64) {
        self.scroll_to(value, true);
    }

    fn viewport_rect(&self) -> ViewportRect {
        self.viewport
    }
}
