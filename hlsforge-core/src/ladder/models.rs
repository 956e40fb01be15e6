use std::fmt;

use serde::{Deserialize, Serialize};

/// Display resolution of the source after rotation correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDimensions {
    pub width: u32,
    pub height: u32,
}

impl SourceDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }

    /// Portrait sources are judged by width, landscape ones by height.
    pub fn is_hd(&self) -> bool {
        if self.is_portrait() {
            self.width >= 720
        } else {
            self.height >= 720
        }
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl fmt::Display for SourceDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    SuperLow,
    Lower,
    Low,
}

impl Tier {
    /// Ladder order, smallest rendition first.
    pub const ALL: [Tier; 3] = [Tier::SuperLow, Tier::Lower, Tier::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::SuperLow => "super_low",
            Tier::Lower => "lower",
            Tier::Low => "low",
        }
    }

    pub fn scale(&self, is_hd: bool) -> f64 {
        match (self, is_hd) {
            (Tier::SuperLow, true) => 0.7,
            (Tier::SuperLow, false) => 0.8,
            (Tier::Lower, true) => 0.8,
            (Tier::Lower, false) => 1.0,
            (Tier::Low, _) => 1.0,
        }
    }

    pub fn policy(&self) -> TierPolicy {
        match self {
            Tier::Low => TierPolicy {
                min_kbps: 1000,
                max_kbps: 3000,
                divisor: 1600,
            },
            Tier::Lower => TierPolicy {
                min_kbps: 200,
                max_kbps: 1500,
                divisor: 1800,
            },
            Tier::SuperLow => TierPolicy {
                min_kbps: 100,
                max_kbps: 800,
                divisor: 2400,
            },
        }
    }

    /// Whether the tier is listed in the low-bandwidth master playlist.
    pub fn in_low_master(&self) -> bool {
        matches!(self, Tier::Lower | Tier::SuperLow)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bitrate clamp for one tier: `clamp(pixels / divisor, min_kbps, max_kbps)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicy {
    pub min_kbps: u32,
    pub max_kbps: u32,
    pub divisor: u32,
}

impl TierPolicy {
    pub fn bitrate_for(&self, width: u32, height: u32) -> u32 {
        let pixels = width as f64 * height as f64;
        let raw = pixels / self.divisor as f64;
        raw.clamp(self.min_kbps as f64, self.max_kbps as f64).round() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenditionDescriptor {
    pub name: Tier,
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
}

impl RenditionDescriptor {
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn bandwidth_bps(&self) -> u64 {
        self.bitrate_kbps as u64 * 1000
    }

    pub fn playlist_uri(&self) -> String {
        format!("{}/index.m3u8", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenditionLadder {
    renditions: [RenditionDescriptor; 3],
}

impl RenditionLadder {
    pub(crate) fn new(renditions: [RenditionDescriptor; 3]) -> Self {
        Self { renditions }
    }

    pub fn renditions(&self) -> &[RenditionDescriptor] {
        &self.renditions
    }

    pub fn iter(&self) -> impl Iterator<Item = &RenditionDescriptor> {
        self.renditions.iter()
    }

    pub fn get(&self, tier: Tier) -> &RenditionDescriptor {
        // Slots are filled in `Tier::ALL` order by the planner.
        let index = Tier::ALL
            .iter()
            .position(|candidate| *candidate == tier)
            .unwrap_or_default();
        &self.renditions[index]
    }

    pub fn low_bandwidth(&self) -> impl Iterator<Item = &RenditionDescriptor> {
        self.renditions
            .iter()
            .filter(|rendition| rendition.name.in_low_master())
    }
}

impl<'a> IntoIterator for &'a RenditionLadder {
    type Item = &'a RenditionDescriptor;
    type IntoIter = std::slice::Iter<'a, RenditionDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.renditions.iter()
    }
}
