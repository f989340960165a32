//! Core engine modules - cache, loader, prefetch, player, workers
//!
//! These modules form the playback engine, independent of any renderer or
//! scroll source.

pub mod env;
pub mod events;
pub mod frame_cache;
pub mod inflight;
pub mod loader;
pub mod net_profile;
pub mod player;
pub mod prefetch;
pub mod workers;

// Re-exports for convenience
pub use env::{Environment, HeadlessEnvironment, IdleQueue};
pub use events::{EventBus, SceneEvent};
pub use frame_cache::{CacheStats, FrameCache};
pub use inflight::{CancelHandle, InflightSet, RequestKind};
pub use loader::{CandidateResolver, Delivery, FrameLoader, LoadMiss, LoadOutcome, LoaderStats};
pub use net_profile::{ConnectionQuality, NetProfile};
pub use player::{FrameClock, PlaybackMode, PlayerError, SequencePlayer, scrub_index};
pub use prefetch::{PrefetchPass, PrefetchRequest, PrefetchScheduler};
pub use workers::Workers;
