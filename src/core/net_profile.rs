//! Network-aware concurrency and prefetch window
//!
//! Slow connections (2g/3g effective type) get a smaller inflight ceiling and
//! a shorter prefetch window. Caller overrides win field by field.

use std::fmt;
use std::str::FromStr;

use crate::entities::NetProfileOverride;

/// Measured connection quality, as reported by the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionQuality {
    Slow2g,
    TwoG,
    ThreeG,
    FourG,
    /// No measurement available; treated as 4g
    #[default]
    Unknown,
}

impl ConnectionQuality {
    /// Parse an effective-type string ("slow-2g", "2g", "3g", "4g").
    pub fn from_effective_type(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "slow-2g" => Self::Slow2g,
            "2g" => Self::TwoG,
            "3g" => Self::ThreeG,
            "4g" => Self::FourG,
            _ => Self::Unknown,
        }
    }

    pub fn is_slow(self) -> bool {
        matches!(self, Self::Slow2g | Self::TwoG | Self::ThreeG)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Slow2g => "slow-2g",
            Self::TwoG => "2g",
            Self::ThreeG => "3g",
            Self::FourG => "4g",
            Self::Unknown => "unknown",
        }
    }
}

impl FromStr for ConnectionQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::from_effective_type(s) {
            Self::Unknown if !s.eq_ignore_ascii_case("unknown") => {
                Err(format!("unknown connection type '{}' (slow-2g, 2g, 3g, 4g)", s))
            }
            q => Ok(q),
        }
    }
}

impl fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetProfile {
    /// Ceiling on concurrent loads before prefetch backs off
    pub max_inflight: usize,
    /// Frames warmed ahead of the current one
    pub window: usize,
}

impl NetProfile {
    pub const SLOW: NetProfile = NetProfile { max_inflight: 3, window: 12 };
    pub const FAST: NetProfile = NetProfile { max_inflight: 6, window: 28 };

    pub fn for_quality(quality: ConnectionQuality) -> Self {
        if quality.is_slow() { Self::SLOW } else { Self::FAST }
    }

    /// Defaults for `quality`, then apply whichever override fields are set.
    pub fn select(quality: ConnectionQuality, overrides: Option<&NetProfileOverride>) -> Self {
        let defaults = Self::for_quality(quality);
        match overrides {
            Some(o) => Self {
                max_inflight: o.max_inflight.unwrap_or(defaults.max_inflight),
                window: o.window.unwrap_or(defaults.window),
            },
            None => defaults,
        }
    }
}
