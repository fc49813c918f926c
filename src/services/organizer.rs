//! Library organizer
//!
//! Renders a destination path for a classified video from a collection
//! template and copies, moves or links the file there. Subtitles stored
//! beside the video follow it.
//!
//! Template placeholders:
//! - `{title}`, `{year}` - movie title and year
//! - `{show}`, `{season}`, `{episode}`, `{episode_title}` - episode fields
//! - `{quality}`, `{source}`, `{codec}`, `{group}` - release metadata
//! - `{ext}` - file extension without the dot
//!
//! Numbers accept a width: `{season:02}` gives `01`.
//!
//! Example: `{show}/Season {season:02}/{show} - S{season:02}E{episode:02}.{ext}`

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SubtitleError};
use crate::media::{LocalVideo, MediaIdentity, SUBTITLE_EXTENSION};

pub const DEFAULT_MOVIE_TEMPLATE: &str = "{title} ({year})/{title} ({year}).{ext}";
pub const DEFAULT_EPISODE_TEMPLATE: &str =
    "{show}/Season {season:02}/{show} - S{season:02}E{episode:02}.{ext}";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{(\w+)(?::(\d+))?\}").expect("placeholder regex should compile")
});

static EMPTY_BRACKETS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*\)|\[\s*\]").expect("bracket regex should compile"));

static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").expect("space regex should compile"));

static DANGLING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s-]+\.(\w+)$").expect("extension regex should compile"));

/// How a file reaches its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RenameAction {
    #[default]
    Copy,
    Move,
    Symlink,
    Hardlink,
}

impl RenameAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Move => "move",
            Self::Symlink => "symlink",
            Self::Hardlink => "hardlink",
        }
    }
}

/// Target directory and naming template for one media kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub directory: PathBuf,
    pub template: String,
}

impl Collection {
    pub fn movies(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            template: DEFAULT_MOVIE_TEMPLATE.to_string(),
        }
    }

    pub fn tvshows(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            template: DEFAULT_EPISODE_TEMPLATE.to_string(),
        }
    }
}

fn field(identity: &MediaIdentity, name: &str) -> Option<String> {
    let meta = identity.metadata();
    let common = match name {
        "quality" => Some(meta.quality.map(|q| q.to_string())),
        "source" => Some(meta.source.map(|s| s.to_string())),
        "codec" => Some(meta.codec.map(|c| c.to_string())),
        "group" => Some(meta.group.clone()),
        _ => None,
    };
    if let Some(value) = common {
        return value;
    }

    match identity {
        MediaIdentity::Movie(m) => match name {
            "title" => Some(m.title.clone()),
            "year" => Some(m.year.to_string()),
            _ => None,
        },
        MediaIdentity::Episode(e) => match name {
            "show" | "title" => Some(e.show.clone()),
            "season" => Some(e.season.to_string()),
            "episode" => Some(e.episode.to_string()),
            "episode_title" => e.episode_title.clone(),
            _ => None,
        },
    }
}

/// Tidy one rendered path component: drop brackets left empty by missing
/// fields and collapse whitespace
fn tidy(component: &str) -> String {
    let without = EMPTY_BRACKETS.replace_all(component, "");
    let collapsed = SPACES.replace_all(&without, " ");
    let attached = DANGLING.replace(&collapsed, ".$1");
    attached.trim().trim_end_matches([' ', '-']).trim().to_string()
}

/// Render a template for an identity. Values are sanitized so they cannot
/// add path components; `/` in the template separates directories.
pub fn render_template(template: &str, identity: &MediaIdentity, extension: &str) -> PathBuf {
    let ext = extension.trim_start_matches('.');
    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        if name == "ext" {
            return ext.to_string();
        }
        let Some(value) = field(identity, name) else {
            return match name {
                "title" | "year" | "show" | "season" | "episode" | "episode_title" | "quality"
                | "source" | "codec" | "group" => String::new(),
                _ => caps[0].to_string(),
            };
        };
        match caps.get(2).and_then(|w| w.as_str().parse::<usize>().ok()) {
            Some(width) => format!("{:0>width$}", value, width = width),
            None => sanitize_filename::sanitize(&value),
        }
    });

    rendered
        .split('/')
        .map(tidy)
        .filter(|c| !c.is_empty())
        .collect()
}

pub struct Organizer {
    movies: Collection,
    tvshows: Collection,
    action: RenameAction,
    force: bool,
    dry_run: bool,
}

impl Organizer {
    pub fn new(movies: Collection, tvshows: Collection, action: RenameAction) -> Self {
        Self {
            movies,
            tvshows,
            action,
            force: false,
            dry_run: false,
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn action(&self) -> RenameAction {
        self.action
    }

    fn collection(&self, identity: &MediaIdentity) -> &Collection {
        match identity {
            MediaIdentity::Movie(_) => &self.movies,
            MediaIdentity::Episode(_) => &self.tvshows,
        }
    }

    /// Where a video belongs
    pub fn destination(&self, identity: &MediaIdentity, source: &Path) -> PathBuf {
        let collection = self.collection(identity);
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        collection
            .directory
            .join(render_template(&collection.template, identity, ext))
    }

    /// Place a video in its collection, bringing its subtitles along.
    /// Returns the new video path.
    pub async fn organize(&self, video: &LocalVideo) -> Result<PathBuf> {
        let dest = self.destination(video.identity(), video.path());
        if dest == video.path() {
            debug!(path = %dest.display(), "Already organized");
            return Ok(dest);
        }

        let subtitles = video.existing_subtitles().await?;
        let dest_base = dest
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        if self.dry_run {
            info!(
                action = self.action.as_str(),
                from = %video.path().display(),
                to = %dest.display(),
                subtitles = subtitles.len(),
                "Would organize video"
            );
            return Ok(dest);
        }

        ensure_path(&dest, self.force).await?;
        transfer(self.action, video.path(), &dest).await?;
        info!(
            action = self.action.as_str(),
            from = %video.path().display(),
            to = %dest.display(),
            "Organized video"
        );

        for subtitle in subtitles {
            let target = dest.with_file_name(format!(
                "{}.{}.{}",
                dest_base, subtitle.language, SUBTITLE_EXTENSION
            ));
            let placed = match ensure_path(&target, self.force).await {
                Ok(()) => transfer(self.action, &subtitle.path, &target).await,
                Err(e) => Err(std::io::Error::other(e.to_string())),
            };
            if let Err(e) = placed {
                warn!(subtitle = %subtitle.path.display(), error = %e, "Failed to move subtitle");
            }
        }

        Ok(dest)
    }
}

/// Prepare a destination: refuse an existing file unless forced, otherwise
/// remove it, then create parent directories
pub async fn ensure_path(dest: &Path, force: bool) -> Result<()> {
    if tokio::fs::symlink_metadata(dest).await.is_ok() {
        if !force {
            return Err(SubtitleError::ExistsConflict(dest.to_path_buf()));
        }
        tokio::fs::remove_file(dest).await?;
    }
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

async fn transfer(action: RenameAction, source: &Path, dest: &Path) -> std::io::Result<()> {
    match action {
        RenameAction::Copy => tokio::fs::copy(source, dest).await.map(|_| ()),
        RenameAction::Move => {
            // Try rename first (same filesystem), fall back to copy+delete
            match tokio::fs::rename(source, dest).await {
                Ok(()) => Ok(()),
                Err(_) => {
                    tokio::fs::copy(source, dest).await?;
                    tokio::fs::remove_file(source).await
                }
            }
        }
        RenameAction::Hardlink => match tokio::fs::hard_link(source, dest).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Hardlink failed, falling back to copy");
                tokio::fs::copy(source, dest).await.map(|_| ())
            }
        },
        RenameAction::Symlink => {
            let target = tokio::fs::canonicalize(source).await?;
            #[cfg(unix)]
            {
                tokio::fs::symlink(target, dest).await
            }
            #[cfg(windows)]
            {
                tokio::fs::symlink_file(target, dest).await
            }
        }
    }
}
