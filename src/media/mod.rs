//! Media model: identities, release metadata, languages and local videos

pub mod identity;
pub mod language;
pub mod metadata;
pub mod video;

pub use identity::{Episode, MediaIdentity, MediaKind, Movie, Subtitle};
pub use language::{InvalidLanguageTag, LanguageTag};
pub use metadata::{Codec, Metadata, MiscTag, MiscTags, Quality, Source, Tier};
pub use video::{LocalSubtitle, LocalVideo, SUBTITLE_EXTENSION};
