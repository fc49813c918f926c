//! Release metadata model
//!
//! Quality, source and codec are ordered tiers: the earlier a variant is
//! declared, the better the release. A tag that could not be parsed is
//! represented as `None` and is never compared by distance.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An ordered metadata tier
pub trait Tier: Copy + Eq {
    /// Position in the tier, 0 being the best
    fn rank(self) -> u8;

    /// Ordinal distance between two known tags
    fn distance(self, other: Self) -> u8 {
        self.rank().abs_diff(other.rank())
    }
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quality {
    Uhd2160p,
    Qhd1440p,
    Hd1080p,
    Hd720p,
    Sd576p,
    Sd480p,
}

impl Tier for Quality {
    fn rank(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uhd2160p => "2160p",
            Self::Qhd1440p => "1440p",
            Self::Hd1080p => "1080p",
            Self::Hd720p => "720p",
            Self::Sd576p => "576p",
            Self::Sd480p => "480p",
        };
        f.write_str(name)
    }
}

/// Where the release was ripped from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Source {
    Remux,
    BluRay,
    WebDl,
    WebRip,
    VodRip,
    Hdtv,
    Dvdr,
    DvdRip,
    R5,
    Screener,
    Telecine,
    Workprint,
    Telesync,
    Cam,
}

impl Tier for Source {
    fn rank(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Remux => "Remux",
            Self::BluRay => "BluRay",
            Self::WebDl => "WEB-DL",
            Self::WebRip => "WEBRip",
            Self::VodRip => "VODRip",
            Self::Hdtv => "HDTV",
            Self::Dvdr => "DVDR",
            Self::DvdRip => "DVDRip",
            Self::R5 => "R5",
            Self::Screener => "Screener",
            Self::Telecine => "Telecine",
            Self::Workprint => "Workprint",
            Self::Telesync => "Telesync",
            Self::Cam => "CAM",
        };
        f.write_str(name)
    }
}

/// Video codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Codec {
    Hevc,
    Avc,
    X265,
    X264,
    Xvid,
    Divx,
    Wmv,
}

impl Tier for Codec {
    fn rank(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hevc => "HEVC",
            Self::Avc => "AVC",
            Self::X265 => "x265",
            Self::X264 => "x264",
            Self::Xvid => "XviD",
            Self::Divx => "DivX",
            Self::Wmv => "WMV",
        };
        f.write_str(name)
    }
}

/// Unordered release attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MiscTag {
    Video3D,
    HardcodedSubs,
    HearingImpaired,
    Dts,
    DolbyDigital,
    Ac3,
    Extended,
    Surround5_1,
    Surround7_1,
}

impl fmt::Display for MiscTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Video3D => "3D",
            Self::HardcodedSubs => "HC",
            Self::HearingImpaired => "HI",
            Self::Dts => "DTS",
            Self::DolbyDigital => "DD",
            Self::Ac3 => "AC3",
            Self::Extended => "Extended",
            Self::Surround5_1 => "5.1",
            Self::Surround7_1 => "7.1",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MiscTags(BTreeSet<MiscTag>);

impl MiscTags {
    pub fn contains(&self, tag: MiscTag) -> bool {
        self.0.contains(&tag)
    }

    pub fn insert(&mut self, tag: MiscTag) {
        self.0.insert(tag);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = MiscTag> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<MiscTag> for MiscTags {
    fn from_iter<I: IntoIterator<Item = MiscTag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Release metadata parsed from the tail of a filename
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub group: Option<String>,
    pub quality: Option<Quality>,
    pub source: Option<Source>,
    pub codec: Option<Codec>,
    pub misc: MiscTags,
    /// Raw alphanumeric tokens of the release tail, in order
    pub tags: Vec<String>,
}

impl Metadata {
    pub fn is_3d(&self) -> bool {
        self.misc.contains(MiscTag::Video3D)
    }

    /// Whether any token of the release tail is "sample"
    pub fn is_sample(&self) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case("sample"))
    }

    /// Short human readable summary, e.g. "1080p BluRay x264 [GROUP]"
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(q) = self.quality {
            parts.push(q.to_string());
        }
        if let Some(s) = self.source {
            parts.push(s.to_string());
        }
        if let Some(c) = self.codec {
            parts.push(c.to_string());
        }
        parts.extend(self.misc.iter().map(|m| m.to_string()));
        if let Some(ref g) = self.group {
            parts.push(format!("[{}]", g));
        }
        parts.join(" ")
    }
}
