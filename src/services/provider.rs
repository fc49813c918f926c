//! Subtitle provider abstraction

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::media::{LocalVideo, Subtitle};

/// A subtitle offered by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineSubtitle {
    pub subtitle: Subtitle,
    /// Provider specific handle used to fetch the content
    pub link: String,
    /// Name of the provider that returned it
    pub provider: String,
}

/// A source of subtitles.
///
/// Implementations must be safe to share across tasks; rate limiting is the
/// implementation's concern.
#[async_trait]
pub trait SubtitleProvider: Send + Sync {
    fn name(&self) -> &str;

    /// All subtitles the provider knows for the video, in any language
    async fn search_subtitles(&self, video: &LocalVideo) -> Result<Vec<OnlineSubtitle>>;

    /// Resolve a link from [`OnlineSubtitle::link`] and fetch the subtitle
    /// content. Failures worth retrying with another candidate are reported
    /// as [`crate::error::SubtitleError::TransientDownload`].
    async fn download_subtitle(&self, link: &str) -> Result<Vec<u8>>;
}
