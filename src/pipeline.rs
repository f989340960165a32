//! Manifest builder for encoded frame directories
//!
//! Lists `*.webp` and `*.avif` frames (sorted by file name) and writes the
//! manifest the player reads. Hybrid manifests serve the first `local_first`
//! frames from the site itself and the rest from the CDN, so the opening
//! frames paint before the CDN connection is warm. Loop manifests are local
//! only and carry no dimensions.
//!
//! Missing hybrid inputs are hard errors: a partial manifest would publish a
//! broken sequence. An empty loop directory yields `totalFrames: 0`.

use std::fmt;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::entities::{Manifest, ManifestError, ManifestSources};

pub const ENV_LOCAL_FIRST: &str = "SEQ_LOCAL_FIRST";
pub const ENV_CDN_URL: &str = "CDN_PUBLIC_URL";
pub const ENV_CDN_PREFIX: &str = "CDN_BASE_PATH";
pub const ENV_CDN_PREFIX_AVIF: &str = "CDN_BASE_PATH_AVIF";

pub const DEFAULT_LOCAL_FIRST: usize = 20;
pub const DEFAULT_CDN_PREFIX: &str = "spot/hero/v1/seq-scroll";
pub const DEFAULT_WIDTH: u32 = 1600;
pub const DEFAULT_HEIGHT: u32 = 900;

#[derive(Debug)]
pub enum PipelineError {
    MissingSourceDir(PathBuf),
    NoFrames { webp: PathBuf, avif: PathBuf },
    Glob(String),
    Manifest(ManifestError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::MissingSourceDir(p) => write!(f, "Source directory does not exist: {}", p.display()),
            PipelineError::NoFrames { webp, avif } => write!(
                f,
                "No .webp or .avif frames found in {} or {}",
                webp.display(),
                avif.display()
            ),
            PipelineError::Glob(e) => write!(f, "Glob error: {}", e),
            PipelineError::Manifest(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<ManifestError> for PipelineError {
    fn from(e: ManifestError) -> Self {
        PipelineError::Manifest(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    /// Local head + CDN tail, with dimensions
    Hybrid,
    /// Local only, no dimensions
    Loop,
}

#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    pub kind: ManifestKind,
    pub webp_dir: PathBuf,
    pub avif_dir: PathBuf,
    /// URL prefixes the site serves the directories under
    pub local_prefix_webp: String,
    pub local_prefix_avif: String,
    pub cdn_url: Option<String>,
    pub cdn_prefix: String,
    /// Falls back to `cdn_prefix`
    pub cdn_prefix_avif: Option<String>,
    pub local_first: usize,
    pub width: u32,
    pub height: u32,
}

impl ManifestBuilder {
    /// Scroll sequence under `{public_root}/AnimationHero/seq-scroll{,-avif}`
    pub fn hybrid(public_root: &Path) -> Self {
        Self {
            kind: ManifestKind::Hybrid,
            webp_dir: public_root.join("AnimationHero/seq-scroll"),
            avif_dir: public_root.join("AnimationHero/seq-scroll-avif"),
            local_prefix_webp: "/AnimationHero/seq-scroll".into(),
            local_prefix_avif: "/AnimationHero/seq-scroll-avif".into(),
            cdn_url: None,
            cdn_prefix: DEFAULT_CDN_PREFIX.into(),
            cdn_prefix_avif: None,
            local_first: DEFAULT_LOCAL_FIRST,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }

    /// Loop sequence under `{public_root}/AnimationHero/seq-loop{,-avif}`
    pub fn looped(public_root: &Path) -> Self {
        Self {
            kind: ManifestKind::Loop,
            webp_dir: public_root.join("AnimationHero/seq-loop"),
            avif_dir: public_root.join("AnimationHero/seq-loop-avif"),
            local_prefix_webp: "/AnimationHero/seq-loop".into(),
            local_prefix_avif: "/AnimationHero/seq-loop-avif".into(),
            ..Self::hybrid(public_root)
        }
    }

    /// File name the site loads the manifest from
    pub fn output_name(&self) -> &'static str {
        match self.kind {
            ManifestKind::Hybrid => "sequence.manifest.json",
            ManifestKind::Loop => "loop.manifest.json",
        }
    }

    pub fn with_env(self) -> Self {
        self.with_vars(|key| std::env::var(key).ok())
    }

    /// CDN settings and the local split from a variable lookup
    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        if let Some(url) = get(ENV_CDN_URL) {
            self.cdn_url = Some(url);
        }
        if let Some(prefix) = get(ENV_CDN_PREFIX) {
            self.cdn_prefix = prefix;
        }
        if let Some(prefix) = get(ENV_CDN_PREFIX_AVIF) {
            self.cdn_prefix_avif = Some(prefix);
        }
        if let Some(raw) = get(ENV_LOCAL_FIRST) {
            match raw.parse() {
                Ok(n) => self.local_first = n,
                Err(_) => warn!("Ignoring {}={:?}: not a count", ENV_LOCAL_FIRST, raw),
            }
        }
        self
    }

    pub fn build(&self) -> Result<Manifest, PipelineError> {
        if self.kind == ManifestKind::Hybrid {
            if self.cdn_url.is_none() {
                warn!("{} not set, every frame uses a local path", ENV_CDN_URL);
            }
            if !self.webp_dir.is_dir() {
                return Err(PipelineError::MissingSourceDir(self.webp_dir.clone()));
            }
        }

        let webp_files = list_frames(&self.webp_dir, "webp")?;
        let avif_files = list_frames(&self.avif_dir, "avif")?;
        if webp_files.is_empty() && avif_files.is_empty() {
            if self.kind == ManifestKind::Loop {
                warn!(
                    "No loop frames in {} or {}, writing an empty manifest",
                    self.webp_dir.display(),
                    self.avif_dir.display()
                );
                return Ok(Manifest::default());
            }
            return Err(PipelineError::NoFrames {
                webp: self.webp_dir.clone(),
                avif: self.avif_dir.clone(),
            });
        }

        let cdn_prefix_avif = self.cdn_prefix_avif.as_deref().unwrap_or(&self.cdn_prefix);
        let webp = self.urls(&webp_files, &self.local_prefix_webp, &self.cdn_prefix);
        let avif = self.urls(&avif_files, &self.local_prefix_avif, cdn_prefix_avif);

        let manifest = match self.kind {
            ManifestKind::Hybrid => {
                if !avif.is_empty() && self.cdn_prefix_avif.is_none() {
                    warn!("AVIF frames found but {} not set, using {}", ENV_CDN_PREFIX_AVIF, self.cdn_prefix);
                }
                Manifest {
                    width: Some(self.width),
                    height: Some(self.height),
                    total_frames: webp.len().max(avif.len()),
                    sources: ManifestSources { avif, webp },
                }
            }
            ManifestKind::Loop => Manifest {
                width: None,
                height: None,
                total_frames: if avif.is_empty() { webp.len() } else { avif.len() },
                sources: ManifestSources { avif, webp },
            },
        };
        info!(
            "Manifest: {} frames (webp={}, avif={})",
            manifest.total_frames,
            manifest.sources.webp.len(),
            manifest.sources.avif.len()
        );
        Ok(manifest)
    }

    fn urls(&self, files: &[String], local_prefix: &str, cdn_prefix: &str) -> Vec<String> {
        let cdn = match self.kind {
            ManifestKind::Hybrid => self.cdn_url.as_deref().map(|u| u.trim_end_matches('/')),
            ManifestKind::Loop => None,
        };
        files
            .iter()
            .enumerate()
            .map(|(i, file)| match cdn {
                Some(cdn) if i >= self.local_first => format!("{}/{}/{}", cdn, cdn_prefix, file),
                _ => format!("{}/{}", local_prefix, file),
            })
            .collect()
    }
}

/// File names in `dir` ending in `.{ext}` (any case), sorted. Missing dir = empty.
pub fn list_frames(dir: &Path, ext: &str) -> Result<Vec<String>, PipelineError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let dir_str = dir.to_string_lossy().replace('\\', "/");
    let pattern = format!("{}/*.{}", glob::Pattern::escape(&dir_str), ext);
    let options = glob::MatchOptions {
        case_sensitive: false,
        ..Default::default()
    };

    let mut names = Vec::new();
    for entry in glob::glob_with(&pattern, options).map_err(|e| PipelineError::Glob(e.to_string()))? {
        let path = entry.map_err(|e| PipelineError::Glob(e.to_string()))?;
        if !path.is_file() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}
