//! Entities - data types shared by the engine, scroll layer and CLI
//!
//! - `config`: player and hero timeline options
//! - `manifest`: asset pipeline output consumed by the player
//! - `texture`: decoded frame resource with explicit release

pub mod config;
pub mod manifest;
pub mod texture;

pub use config::{
    ConfigError, Fit, FrameExt, HeroConfig, NetProfileOverride, Orient, SequenceConfig,
};
pub use manifest::{Manifest, ManifestError, ManifestFormat, ManifestSources};
pub use texture::{Releasable, Texture, TextureSettings};
