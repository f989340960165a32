//! Sequence player and hero scroll configuration
//!
//! `SequenceConfig` mirrors the player options (camelCase JSON). Defaults
//! match the stock player: 60 fps, `{dir}/{base}{NNN}.webp`, numbering from
//! 1, three cached frames, cover fit.
//!
//! `HeroConfig` holds the pinned-scroll timeline: pin length, content fade
//! window and the stats reveal window.

use std::fmt;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use super::manifest::{Manifest, ManifestFormat};

/// Env var overriding `HeroConfig::stats_start_pct`
pub const ENV_STATS_START_PCT: &str = "SCROLLSEQ_STATS_START_PCT";
/// Env var overriding `HeroConfig::stats_fade_pct`
pub const ENV_STATS_FADE_PCT: &str = "SCROLLSEQ_STATS_FADE_PCT";

/// Frames of the stock scroll sequence (HERO_QUEDA001..545)
pub const HERO_SCROLL_FRAMES: usize = 545;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, msg: String },
    Parse(String),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, msg } => write!(f, "Config I/O error ({}): {}", path.display(), msg),
            ConfigError::Parse(e) => write!(f, "Config parse error: {}", e),
            ConfigError::Invalid(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameExt {
    #[default]
    Webp,
    Png,
    Jpg,
    Avif,
}

impl FrameExt {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameExt::Webp => "webp",
            FrameExt::Png => "png",
            FrameExt::Jpg => "jpg",
            FrameExt::Avif => "avif",
        }
    }
}

impl fmt::Display for FrameExt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Texture orientation applied at display time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Orient {
    #[default]
    None,
    FlipY,
    FlipX,
    Rotate180,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fit {
    #[default]
    Cover,
    Contain,
}

/// Partial override of the network profile; unset fields keep the measured default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetProfileOverride {
    pub max_inflight: Option<usize>,
    pub window: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SequenceConfig {
    /// Total logical frames
    pub count: usize,
    /// Free-running playback rate
    pub fps: f32,
    pub dir: String,
    pub base: String,
    pub pad: usize,
    pub ext: FrameExt,
    /// Extension preference list; empty means `[ext]`
    pub ext_candidates: Vec<FrameExt>,
    /// Explicit per-frame URLs, tried before synthesized names
    pub sources: Option<Vec<String>>,
    /// Added to the frame index when synthesizing names
    pub start: usize,
    /// Present: scrubbed mode. Absent: free-running mode.
    pub progress: Option<f32>,
    pub loops: u32,
    pub visible: bool,
    pub active: bool,
    /// Plane size in world units
    pub size: [f32; 2],
    pub max_cache: usize,
    pub net_profile_override: Option<NetProfileOverride>,
    pub prefetch_window: Option<usize>,
    pub orient: Orient,
    pub fit: Fit,
    pub y_pct: f32,
    pub zoom: f32,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            count: 0,
            fps: 60.0,
            dir: String::new(),
            base: String::new(),
            pad: 3,
            ext: FrameExt::Webp,
            ext_candidates: Vec::new(),
            sources: None,
            start: 1,
            progress: None,
            loops: 1,
            visible: true,
            active: true,
            size: [16.0, 9.0],
            max_cache: 3,
            net_profile_override: None,
            prefetch_window: None,
            orient: Orient::None,
            fit: Fit::Cover,
            y_pct: 0.0,
            zoom: 1.0,
        }
    }
}

impl SequenceConfig {
    /// Synthesized-name sequence: `{dir}/{base}{start+i:0pad}.{ext}`
    pub fn new(count: usize, dir: impl Into<String>, base: impl Into<String>) -> Self {
        Self {
            count,
            dir: dir.into(),
            base: base.into(),
            ..Default::default()
        }
    }

    /// Scroll-scrubbed hero sequence (545 PNG frames, flipped, cover fit).
    ///
    /// Sources point at `cdn_base` when given, else at the local public dir.
    pub fn hero_scroll(cdn_base: Option<&str>) -> Self {
        let local_dir = "/AnimationHero/seq-scroll";
        let base_dir = cdn_base
            .map(|b| b.trim_end_matches('/'))
            .filter(|b| !b.is_empty())
            .unwrap_or(local_dir);
        let sources = (1..=HERO_SCROLL_FRAMES)
            .map(|i| format!("{}/HERO_QUEDA{:03}.png", base_dir, i))
            .collect();

        Self {
            count: HERO_SCROLL_FRAMES,
            fps: 24.0,
            dir: local_dir.to_string(),
            base: "HERO_QUEDA".to_string(),
            pad: 3,
            ext: FrameExt::Png,
            ext_candidates: vec![FrameExt::Png],
            sources: Some(sources),
            start: 1,
            progress: Some(0.0),
            loops: 1,
            max_cache: 6,
            net_profile_override: Some(NetProfileOverride {
                max_inflight: Some(6),
                window: Some(24),
            }),
            prefetch_window: Some(20),
            orient: Orient::FlipY,
            fit: Fit::Cover,
            y_pct: 15.0,
            zoom: 1.1,
            ..Default::default()
        }
    }

    /// Take frame count and explicit sources from a manifest list.
    pub fn with_manifest(mut self, manifest: &Manifest, format: ManifestFormat) -> Self {
        let list = manifest.sources(format);
        self.count = if list.is_empty() { manifest.total_frames } else { list.len() };
        self.sources = if list.is_empty() { None } else { Some(list.to_vec()) };
        self
    }

    /// Switch to scrubbed mode at `progress`.
    pub fn scrubbed(mut self, progress: f32) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Extension preference actually used for synthesized names
    pub fn extensions(&self) -> Vec<FrameExt> {
        if self.ext_candidates.is_empty() {
            vec![self.ext]
        } else {
            self.ext_candidates.clone()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.count == 0 {
            return Err(ConfigError::Invalid("count must be > 0".into()));
        }
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(ConfigError::Invalid(format!("fps must be > 0, got {}", self.fps)));
        }
        if self.max_cache == 0 {
            return Err(ConfigError::Invalid("maxCache must be >= 1".into()));
        }
        if !(self.zoom.is_finite() && self.zoom > 0.0) {
            return Err(ConfigError::Invalid(format!("zoom must be > 0, got {}", self.zoom)));
        }
        if self.size[0] <= 0.0 || self.size[1] <= 0.0 {
            return Err(ConfigError::Invalid(format!("size must be positive, got {:?}", self.size)));
        }
        if self.start.checked_add(self.count).is_none() {
            return Err(ConfigError::Invalid(format!(
                "start {} + count {} overflows the frame number",
                self.start, self.count
            )));
        }
        if self.pad > 12 {
            return Err(ConfigError::Invalid(format!("pad {} too wide", self.pad)));
        }
        if let Some(p) = self.progress
            && p.is_nan()
        {
            return Err(ConfigError::Invalid("progress is NaN".into()));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            msg: e.to_string(),
        })?;
        Self::from_json(&raw)
    }
}

/// Pinned hero timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HeroConfig {
    /// Pin length as a percentage of viewport height
    pub range_pct: f64,
    /// Document offset of the pinned section's top edge
    pub pin_top: f64,
    pub fade_start: f32,
    pub fade_span: f32,
    /// Stats window start, fraction of the pin distance
    pub stats_start_pct: f64,
    /// Stats window length, fraction of the pin distance
    pub stats_fade_pct: f64,
}

impl Default for HeroConfig {
    fn default() -> Self {
        Self {
            range_pct: 200.0,
            pin_top: 0.0,
            fade_start: 0.0,
            fade_span: 0.08,
            stats_start_pct: 0.45,
            stats_fade_pct: 0.25,
        }
    }
}

impl HeroConfig {
    /// Clamp the stats window into its allowed range.
    pub fn normalized(mut self) -> Self {
        self.stats_start_pct = clamp_or(self.stats_start_pct, 0.0, 0.95, 0.45);
        self.stats_fade_pct = clamp_or(self.stats_fade_pct, 0.05, 0.95, 0.25);
        if !(self.range_pct.is_finite() && self.range_pct > 0.0) {
            warn!("range_pct {} invalid, using 200", self.range_pct);
            self.range_pct = 200.0;
        }
        if !(self.fade_span.is_finite() && self.fade_span > 0.0) {
            self.fade_span = 0.08;
        }
        self
    }

    /// Apply `SCROLLSEQ_STATS_*` overrides from the process environment.
    pub fn with_env(self) -> Self {
        self.with_vars(|key| std::env::var(key).ok())
    }

    /// Apply stats overrides from an arbitrary lookup, then normalize.
    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = parse_var(&lookup, ENV_STATS_START_PCT) {
            self.stats_start_pct = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_STATS_FADE_PCT) {
            self.stats_fade_pct = v;
        }
        self.normalized()
    }
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<f64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a number", key, raw);
            None
        }
    }
}

fn clamp_or(v: f64, lo: f64, hi: f64, fallback: f64) -> f64 {
    if v.is_finite() { v.clamp(lo, hi) } else { fallback }
}
