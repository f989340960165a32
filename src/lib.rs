//! scrollseq - scroll-driven image sequence player library
//!
//! Re-exports all modules for use by the binary target.

// Core engine (cache, inflight, loader, prefetch, player, workers)
pub mod core;

pub mod cli;
pub mod entities;
pub mod fetch;
pub mod hero;
pub mod pipeline;
pub mod render;
pub mod scroll;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use core::{
    ConnectionQuality, Environment, EventBus, FrameCache, FrameLoader, HeadlessEnvironment,
    LoadOutcome, NetProfile, PlaybackMode, PrefetchScheduler, SceneEvent, SequencePlayer,
};
pub use entities::{HeroConfig, Manifest, SequenceConfig, Texture};
pub use hero::HeroScene;
pub use pipeline::ManifestBuilder;
pub use render::{RenderSurface, SoftwareSurface};
pub use scroll::{ScrollOrchestrator, ScrollSource, SmoothScroller};
