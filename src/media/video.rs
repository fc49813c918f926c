//! Local video files and the subtitles stored beside them

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use super::identity::MediaIdentity;
use super::language::LanguageTag;
use crate::error::{Result, SubtitleError};
use crate::services::filename_parser;

/// Extension used for persisted subtitles
pub const SUBTITLE_EXTENSION: &str = "srt";

/// A video on disk together with the identity parsed from its name
#[derive(Debug, Clone)]
pub struct LocalVideo {
    path: PathBuf,
    modified: SystemTime,
    identity: MediaIdentity,
}

/// A subtitle file found next to a video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSubtitle {
    pub path: PathBuf,
    pub language: LanguageTag,
}

impl LocalVideo {
    /// Classify a video from its filename and read its modification time
    pub fn from_path(path: &Path) -> Result<Self> {
        let stem = file_stem(path)?;
        let identity = filename_parser::classify(stem)?;
        let modified = std::fs::metadata(path)?.modified()?;
        Ok(Self {
            path: path.to_path_buf(),
            modified,
            identity,
        })
    }

    pub fn new(path: PathBuf, identity: MediaIdentity, modified: SystemTime) -> Self {
        Self {
            path,
            modified,
            identity,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn identity(&self) -> &MediaIdentity {
        &self.identity
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Filename without extension
    pub fn base_name(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }

    fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// `<base>.<lang>.srt` in the video's folder
    pub fn subtitle_path(&self, language: &LanguageTag) -> PathBuf {
        self.directory().join(format!(
            "{}.{}.{}",
            self.base_name(),
            language,
            SUBTITLE_EXTENSION
        ))
    }

    /// Subtitles sharing this video's base name, sorted by path
    pub async fn existing_subtitles(&self) -> Result<Vec<LocalSubtitle>> {
        let base = self.base_name();
        let prefix = format!("{}.", base);
        let mut found = Vec::new();

        let mut entries = tokio::fs::read_dir(self.directory()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(&prefix) {
                continue;
            }
            let Some((rest, ext)) = name.rsplit_once('.') else {
                continue;
            };
            if !ext.eq_ignore_ascii_case(SUBTITLE_EXTENSION) || rest.len() <= base.len() {
                continue;
            }
            let tail = &rest[prefix.len().min(rest.len())..];
            let segment = tail.rsplit('.').next().unwrap_or(tail);
            match LanguageTag::parse_lenient(segment) {
                Ok(language) => found.push(LocalSubtitle {
                    path: entry.path(),
                    language,
                }),
                Err(_) => debug!(file = name, "Ignoring subtitle without language tag"),
            }
        }

        found.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(found)
    }

    /// Write subtitle content beside the video.
    ///
    /// Content goes to a hidden temporary sibling first and is renamed into
    /// place, so the destination is either absent or complete. An existing
    /// destination is only replaced when `force` is set.
    pub async fn save_subtitle(
        &self,
        content: &[u8],
        language: &LanguageTag,
        force: bool,
    ) -> Result<PathBuf> {
        let dest = self.subtitle_path(language);
        if !force && tokio::fs::try_exists(&dest).await? {
            return Err(SubtitleError::ExistsConflict(dest));
        }

        let file_name = dest
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(SUBTITLE_EXTENSION);
        let temp = dest.with_file_name(format!(".{}.{}.part", file_name, uuid::Uuid::new_v4()));

        tokio::fs::write(&temp, content).await?;
        if let Err(e) = tokio::fs::rename(&temp, &dest).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        debug!(path = %dest.display(), bytes = content.len(), "Saved subtitle");
        Ok(dest)
    }
}

fn file_stem(path: &Path) -> Result<&str> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| SubtitleError::Unrecognized(path.display().to_string()))
}
