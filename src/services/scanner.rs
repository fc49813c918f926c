//! Media discovery
//!
//! Walks directories to find video files and classify them by name.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Result, bail};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::SubtitleError;
use crate::media::{LocalVideo, MediaKind};

/// Video file extensions we recognize
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "avi", "mkv", "mp4", "m4v", "flv", "mov", "wmv", "webm", "mpg", "mpeg",
];

/// Which discovered videos to keep
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    /// Only videos modified within this window
    pub modified_within: Option<Duration>,
    pub kind: Option<MediaKind>,
}

impl ScanFilter {
    fn accepts(&self, video: &LocalVideo, now: SystemTime) -> bool {
        if let Some(kind) = self.kind
            && video.identity().kind() != kind
        {
            return false;
        }
        if let Some(window) = self.modified_within
            && let Some(cutoff) = now.checked_sub(window)
            && video.modified() < cutoff
        {
            return false;
        }
        true
    }
}

pub fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

/// Find and classify every video under the given roots.
///
/// Hidden entries, samples and names that cannot be classified are skipped.
/// Results are sorted by path.
pub fn find_media(roots: &[PathBuf], filter: &ScanFilter) -> Result<Vec<LocalVideo>> {
    let now = SystemTime::now();
    let mut videos = Vec::new();

    for root in roots {
        if !root.exists() {
            bail!("Path does not exist: {}", root.display());
        }

        let mut found = 0;
        for entry in WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file() || !is_video(path) {
                continue;
            }

            let video = match LocalVideo::from_path(path) {
                Ok(video) => video,
                Err(SubtitleError::Unrecognized(name)) => {
                    debug!(name = %name, "Skipping unrecognized video name");
                    continue;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read video");
                    continue;
                }
            };

            if video.identity().is_sample() {
                debug!(path = %path.display(), "Skipping sample");
                continue;
            }
            if !filter.accepts(&video, now) {
                continue;
            }

            found += 1;
            videos.push(video);
        }

        info!(root = %root.display(), videos = found, "Scanned directory");
    }

    videos.sort_by(|a, b| a.path().cmp(b.path()));
    Ok(videos)
}
