//! Archive extraction
//!
//! Unpacks RAR, ZIP and 7z archives with the system tools into a private
//! temporary directory and classifies the videos inside by their in-archive
//! names.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::SystemTime;

use anyhow::{Context, Result, bail};
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::filename_parser;
use super::organizer::Organizer;
use super::scanner::is_video;
use crate::error::SubtitleError;
use crate::media::{LocalVideo, MediaIdentity};

/// Archive file extensions we recognize
const RAR_EXTENSIONS: &[&str] = &["rar"];
const ZIP_EXTENSIONS: &[&str] = &["zip"];
const SEVEN_Z_EXTENSIONS: &[&str] = &["7z"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveType {
    Rar,
    Zip,
    SevenZ,
}

/// A classified video unpacked from an archive
#[derive(Debug, Clone)]
pub struct ExtractedVideo {
    pub identity: MediaIdentity,
    pub path: PathBuf,
}

/// Result of unpacking one archive
#[derive(Debug)]
pub struct Extraction {
    /// Temporary directory holding the unpacked files
    pub dir: PathBuf,
    pub videos: Vec<ExtractedVideo>,
}

pub struct ArchiveExtractor {
    /// Parent of all extraction directories
    temp_dir: PathBuf,
}

impl ArchiveExtractor {
    pub fn new(temp_dir: PathBuf) -> Self {
        Self { temp_dir }
    }

    pub fn is_archive(path: &Path) -> bool {
        Self::archive_type(path).is_some()
    }

    fn archive_type(path: &Path) -> Option<ArchiveType> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some(e) if RAR_EXTENSIONS.contains(&e) => Some(ArchiveType::Rar),
            Some(e) if ZIP_EXTENSIONS.contains(&e) => Some(ArchiveType::Zip),
            Some(e) if SEVEN_Z_EXTENSIONS.contains(&e) => Some(ArchiveType::SevenZ),
            _ => None,
        }
    }

    /// All archives under the given roots, sorted by path.
    ///
    /// Multi-volume RAR sets are unpacked through their first volume only.
    pub fn find_archives(roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut archives = Vec::new();
        for root in roots {
            if !root.exists() {
                bail!("Path does not exist: {}", root.display());
            }
            for entry in WalkDir::new(root)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if entry.file_type().is_file() && Self::is_archive(path) && is_first_volume(path) {
                    archives.push(path.to_path_buf());
                }
            }
        }
        archives.sort();
        Ok(archives)
    }

    /// Unpack an archive and classify the videos it contains.
    ///
    /// The caller owns the returned directory and should pass it to
    /// [`ArchiveExtractor::cleanup`].
    pub async fn extract(&self, archive: &Path) -> Result<Extraction> {
        let archive_type = Self::archive_type(archive).context("Unknown archive type")?;

        let dir = self
            .temp_dir
            .join(format!("extract_{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir)
            .await
            .context("Failed to create extraction directory")?;

        info!(
            archive = %archive.display(),
            archive_type = ?archive_type,
            destination = %dir.display(),
            "Extracting archive"
        );

        let unpacked = match archive_type {
            ArchiveType::Rar => extract_rar(archive, &dir).await,
            ArchiveType::Zip => extract_zip(archive, &dir).await,
            ArchiveType::SevenZ => extract_7z(archive, &dir).await,
        };
        if let Err(e) = unpacked {
            self.cleanup(&dir).await?;
            return Err(e);
        }

        let videos = collect_videos(&dir);
        info!(
            archive = %archive.display(),
            videos = videos.len(),
            "Archive extraction complete"
        );
        Ok(Extraction { dir, videos })
    }

    /// Unpack an archive, hand every video to the organizer, then remove the
    /// temporary files. Returns the organized paths.
    pub async fn extract_into(&self, archive: &Path, organizer: &Organizer) -> Result<Vec<PathBuf>> {
        let extraction = self.extract(archive).await?;
        let mut placed = Vec::new();

        for extracted in &extraction.videos {
            let video = LocalVideo::new(
                extracted.path.clone(),
                extracted.identity.clone(),
                SystemTime::now(),
            );
            match organizer.organize(&video).await {
                Ok(dest) => placed.push(dest),
                Err(e @ SubtitleError::ExistsConflict(_)) => {
                    warn!(video = %extracted.identity, error = %e, "Skipping extracted video");
                }
                Err(e) => {
                    self.cleanup(&extraction.dir).await?;
                    return Err(e).with_context(|| format!("Failed to organize {}", extracted.identity));
                }
            }
        }

        self.cleanup(&extraction.dir).await?;
        Ok(placed)
    }

    /// Remove an extraction directory
    pub async fn cleanup(&self, temp_path: &Path) -> Result<()> {
        // Only delete if it's in our temp directory
        if !temp_path.starts_with(&self.temp_dir) {
            warn!(
                path = %temp_path.display(),
                temp_dir = %self.temp_dir.display(),
                "Refusing to cleanup path outside temp directory"
            );
            return Ok(());
        }

        if temp_path.exists() {
            debug!(path = %temp_path.display(), "Cleaning up extracted files");
            tokio::fs::remove_dir_all(temp_path)
                .await
                .context("Failed to cleanup extraction directory")?;
        }
        Ok(())
    }
}

/// `.part01.rar` style sets start at part 1; old style `.rar` + `.r00` sets
/// only use the `.rar` extension for the first volume
fn is_first_volume(path: &Path) -> bool {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_lowercase();
    match stem.rsplit_once(".part") {
        Some((_, number)) if number.chars().all(|c| c.is_ascii_digit()) && !number.is_empty() => {
            number.parse::<u32>().is_ok_and(|n| n == 1)
        }
        _ => true,
    }
}

/// Classify every video below `dir` by its own file name
fn collect_videos(dir: &Path) -> Vec<ExtractedVideo> {
    let mut videos = Vec::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() || !is_video(path) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match filename_parser::classify(stem) {
            Ok(identity) if identity.is_sample() => {
                debug!(path = %path.display(), "Skipping sample");
            }
            Ok(identity) => videos.push(ExtractedVideo {
                identity,
                path: path.to_path_buf(),
            }),
            Err(e) => debug!(path = %path.display(), error = %e, "Skipping extracted file"),
        }
    }
    videos.sort_by(|a, b| a.path.cmp(&b.path));
    videos
}

async fn run_tool(mut command: Command, tool: &str, hint: &str) -> Result<()> {
    let output = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .with_context(|| format!("Failed to run {}. {}", tool, hint))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{} failed: {}", tool, stderr.trim());
    }
    debug!(tool = tool, "Extraction tool finished");
    Ok(())
}

async fn extract_rar(archive: &Path, dest_dir: &Path) -> Result<()> {
    let mut command = Command::new("unrar");
    command
        .arg("x") // Extract with full paths
        .arg("-o+") // Overwrite existing files
        .arg("-y") // Assume yes on all queries
        .arg(archive)
        .arg(dest_dir);
    run_tool(command, "unrar", "Is unrar installed?").await
}

async fn extract_zip(archive: &Path, dest_dir: &Path) -> Result<()> {
    let mut command = Command::new("unzip");
    command.arg("-o").arg("-q").arg(archive).arg("-d").arg(dest_dir);
    run_tool(command, "unzip", "Is unzip installed?").await
}

async fn extract_7z(archive: &Path, dest_dir: &Path) -> Result<()> {
    let mut command = Command::new("7z");
    command
        .arg("x")
        .arg("-y")
        .arg(format!("-o{}", dest_dir.display()))
        .arg(archive);
    run_tool(command, "7z", "Is p7zip-full installed?").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;

    #[test]
    fn test_is_archive() {
        assert!(ArchiveExtractor::is_archive(Path::new("file.rar")));
        assert!(ArchiveExtractor::is_archive(Path::new("file.RAR")));
        assert!(ArchiveExtractor::is_archive(Path::new("file.zip")));
        assert!(ArchiveExtractor::is_archive(Path::new("file.7z")));
        assert!(!ArchiveExtractor::is_archive(Path::new("file.mkv")));
        assert!(!ArchiveExtractor::is_archive(Path::new("file.r00")));
    }

    #[test]
    fn test_first_volume() {
        assert!(is_first_volume(Path::new("Heat.1995.rar")));
        assert!(is_first_volume(Path::new("Heat.1995.part01.rar")));
        assert!(is_first_volume(Path::new("Heat.1995.part1.rar")));
        assert!(!is_first_volume(Path::new("Heat.1995.part02.rar")));
    }

    #[test]
    fn test_find_archives() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.part01.rar", "b.part02.rar", "a.zip", "c.7z", "movie.mkv"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let found = ArchiveExtractor::find_archives(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.zip", "b.part01.rar", "c.7z"]);
    }

    #[test]
    fn test_collect_videos_classifies_inner_names() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("The.Office.US.S02E04.720p");
        std::fs::create_dir_all(&inner).unwrap();
        std::fs::write(inner.join("The.Office.US.S02E04.720p.mkv"), b"x").unwrap();
        std::fs::write(inner.join("The.Office.US.S02E04.720p.sample.mkv"), b"x").unwrap();
        std::fs::write(inner.join("readme.nfo"), b"x").unwrap();
        std::fs::write(inner.join("x1.mkv"), b"x").unwrap();

        let videos = collect_videos(dir.path());
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].identity.kind(), MediaKind::Episode);
        assert_eq!(videos[0].identity.title(), "The Office US");
    }

    #[tokio::test]
    async fn test_cleanup_refuses_foreign_paths() {
        let temp = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let extractor = ArchiveExtractor::new(temp.path().to_path_buf());

        extractor.cleanup(other.path()).await.unwrap();
        assert!(other.path().exists());

        let owned = temp.path().join("extract_test");
        std::fs::create_dir_all(&owned).unwrap();
        extractor.cleanup(&owned).await.unwrap();
        assert!(!owned.exists());
    }
}
