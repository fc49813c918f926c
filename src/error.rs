//! Error taxonomy for classification, ranking and subtitle downloads

use std::path::PathBuf;

use thiserror::Error;

use crate::media::LanguageTag;

/// Errors produced while identifying media and fetching subtitles
#[derive(Debug, Error)]
pub enum SubtitleError {
    /// The filename did not match any known media shape
    #[error("unrecognized media name: {0}")]
    Unrecognized(String),

    #[error("no subtitles found for language {0}")]
    NoCandidates(LanguageTag),

    #[error("score too low: best candidate scored {best:.2}, minimum is {minimum:.2}")]
    ScoreBelowThreshold { best: f64, minimum: f64 },

    /// A single download attempt failed; the next candidate may succeed
    #[error("download failed: {0}")]
    TransientDownload(String),

    #[error("download failed after {attempts} attempts: {last}")]
    DownloadExhausted { attempts: usize, last: String },

    #[error("{} already exists", .0.display())]
    ExistsConflict(PathBuf),

    #[error("plugin {name} failed: {reason}")]
    Plugin { name: String, reason: String },

    #[error("provider {provider} failed: {reason}")]
    Provider { provider: String, reason: String },

    /// Waiting for a rate limit permit took longer than allowed
    #[error("rate limit wait exceeded for {0}")]
    RateLimited(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SubtitleError {
    /// Whether the failure should abort a strict run.
    ///
    /// Skips (unrecognized names, missing candidates, low scores), overwrite
    /// conflicts and plugin failures are only reported.
    pub fn is_escalated(&self) -> bool {
        matches!(
            self,
            Self::DownloadExhausted { .. } | Self::Provider { .. } | Self::Io(_)
        )
    }

    /// Whether retrying with another candidate can help
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientDownload(_) | Self::RateLimited(_))
    }
}

pub type Result<T, E = SubtitleError> = std::result::Result<T, E>;
