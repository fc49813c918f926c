//! Typed media identities

use std::fmt;

use serde::{Deserialize, Serialize};

use super::language::LanguageTag;
use super::metadata::Metadata;
use crate::services::text_utils::identity_fragment;

/// Coarse media kind, used for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Episode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub title: String,
    pub year: u32,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub show: String,
    pub season: u32,
    pub episode: u32,
    pub episode_title: Option<String>,
    pub metadata: Metadata,
}

/// What a file is, as derived from its name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MediaIdentity {
    Movie(Movie),
    Episode(Episode),
}

impl MediaIdentity {
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Movie(_) => MediaKind::Movie,
            Self::Episode(_) => MediaKind::Episode,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Self::Movie(m) => &m.metadata,
            Self::Episode(e) => &e.metadata,
        }
    }

    /// Movie title or show name
    pub fn title(&self) -> &str {
        match self {
            Self::Movie(m) => &m.title,
            Self::Episode(e) => &e.show,
        }
    }

    /// Stable key ignoring release metadata, e.g. `inception:2010` or
    /// `theofficeus:2:4`
    pub fn identity_key(&self) -> String {
        match self {
            Self::Movie(m) => format!("{}:{}", identity_fragment(&m.title), m.year),
            Self::Episode(e) => format!(
                "{}:{}:{}",
                identity_fragment(&e.show),
                e.season,
                e.episode
            ),
        }
    }

    /// Sample videos are tagged "sample" or named as one
    pub fn is_sample(&self) -> bool {
        self.metadata().is_sample() || self.title().to_lowercase().starts_with("sample")
    }
}

impl fmt::Display for MediaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movie(m) => write!(f, "{} ({})", m.title, m.year),
            Self::Episode(e) => write!(f, "{} S{:02}E{:02}", e.show, e.season, e.episode),
        }
    }
}

/// A subtitle: the media it was made for plus its language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtitle {
    pub media: MediaIdentity,
    pub language: LanguageTag,
    pub hearing_impaired: bool,
}
