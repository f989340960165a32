//! Scroll layer: position sources and the pinned-timeline orchestrator

pub mod orchestrator;
pub mod source;

pub use orchestrator::{
    ContentFade, LayoutEvent, PinMeasurements, ScrollOrchestrator, ScrollUpdate, StatsReveal,
    fade_alpha,
};
pub use source::{NativeScroller, ScrollSource, SmoothScroller, ViewportRect};
