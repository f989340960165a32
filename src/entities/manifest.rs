//! Frame manifest produced by the asset pipeline
//!
//! ```json
//! { "width": 1600, "height": 900, "totalFrames": 545,
//!   "sources": { "avif": ["..."], "webp": ["..."] } }
//! ```
//!
//! Array index = frame index. Loop manifests omit width/height.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum ManifestError {
    Io { path: PathBuf, msg: String },
    Parse(String),
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestError::Io { path, msg } => write!(f, "Manifest I/O error ({}): {}", path.display(), msg),
            ManifestError::Parse(e) => write!(f, "Manifest parse error: {}", e),
        }
    }
}

impl std::error::Error for ManifestError {}

/// Which source list of the manifest to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestFormat {
    Avif,
    Webp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSources {
    #[serde(default)]
    pub avif: Vec<String>,
    #[serde(default)]
    pub webp: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub total_frames: usize,
    #[serde(default)]
    pub sources: ManifestSources,
}

impl Manifest {
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        serde_json::from_str(json).map_err(|e| ManifestError::Parse(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ManifestError> {
        serde_json::to_string(self).map_err(|e| ManifestError::Parse(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ManifestError::Io {
            path: path.to_path_buf(),
            msg: e.to_string(),
        })?;
        Self::from_json(&raw)
    }

    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| ManifestError::Io {
            path: path.to_path_buf(),
            msg: e.to_string(),
        })
    }

    pub fn sources(&self, format: ManifestFormat) -> &[String] {
        match format {
            ManifestFormat::Avif => &self.sources.avif,
            ManifestFormat::Webp => &self.sources.webp,
        }
    }

    /// First non-empty list in `preference` order.
    pub fn preferred(&self, preference: &[ManifestFormat]) -> Option<(ManifestFormat, &[String])> {
        preference
            .iter()
            .map(|&f| (f, self.sources(f)))
            .find(|(_, list)| !list.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hybrid_manifest() {
        let m = Manifest::from_json(
            r#"{"width":1600,"height":900,"totalFrames":2,"chunks":40,
                "sources":{"avif":[],"webp":["/a/001.webp","https://cdn/x/002.webp"]}}"#,
        )
        .unwrap();
        assert_eq!(m.width, Some(1600));
        assert_eq!(m.total_frames, 2);
        assert_eq!(m.sources(ManifestFormat::Webp)[1], "https://cdn/x/002.webp");
        let (fmt, list) = m.preferred(&[ManifestFormat::Avif, ManifestFormat::Webp]).unwrap();
        assert_eq!(fmt, ManifestFormat::Webp);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_loop_manifest_omits_dimensions() {
        let m = Manifest {
            total_frames: 1,
            sources: ManifestSources { avif: vec!["/l/1.avif".into()], webp: vec![] },
            ..Default::default()
        };
        let json = m.to_json().unwrap();
        assert!(!json.contains("width"));
        assert!(json.contains("\"totalFrames\":1"));
        assert_eq!(Manifest::from_json(&json).unwrap(), m);
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(Manifest::from_json("{"), Err(ManifestError::Parse(_))));
    }
}
