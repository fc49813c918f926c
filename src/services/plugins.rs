//! Post-download plugins
//!
//! A plugin is a shell command run after a subtitle is saved. The saved path
//! is passed in the `SUBTITLE` environment variable.

use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Result, SubtitleError};

/// Environment variable holding the saved subtitle path
pub const SUBTITLE_ENV: &str = "SUBTITLE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugin {
    pub name: String,
    /// Command line passed to `sh -c`
    pub exec: String,
}

impl Plugin {
    pub fn new(name: impl Into<String>, exec: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exec: exec.into(),
        }
    }

    /// Both fields are required
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("plugin name is required".to_string());
        }
        if self.exec.trim().is_empty() {
            return Err(format!("plugin {} has no exec command", self.name));
        }
        Ok(())
    }

    fn failure(&self, reason: impl Into<String>) -> SubtitleError {
        SubtitleError::Plugin {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Run the plugin for a saved subtitle
    pub async fn run(&self, subtitle: &Path) -> Result<()> {
        debug!(plugin = %self.name, path = %subtitle.display(), "Running plugin");

        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.exec)
            .env(SUBTITLE_ENV, subtitle)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.failure(format!("failed to start: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failure(format!("{}: {}", output.status, stderr.trim())));
        }

        info!(plugin = %self.name, path = %subtitle.display(), "Plugin finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_validate() {
        assert!(Plugin::new("notify", "echo done").validate().is_ok());
        assert!(Plugin::new("", "echo done").validate().is_err());
        assert!(Plugin::new("notify", "  ").validate().is_err());
    }

    #[tokio::test]
    async fn test_plugin_receives_subtitle_path() {
        let dir = tempfile::tempdir().unwrap();
        let subtitle = dir.path().join("Movie.en.srt");
        let marker = dir.path().join("seen.txt");
        let plugin = Plugin::new(
            "record",
            format!("printf '%s' \"$SUBTITLE\" > '{}'", marker.display()),
        );

        plugin.run(&subtitle).await.unwrap();
        let seen = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(seen, subtitle.display().to_string());
    }

    #[tokio::test]
    async fn test_failing_plugin_reports_error() {
        let plugin = Plugin::new("broken", "echo nope >&2; exit 3");
        let err = plugin.run(Path::new("/tmp/x.en.srt")).await.unwrap_err();
        assert_matches!(err, SubtitleError::Plugin { ref name, ref reason } if name == "broken" && reason.contains("nope"));
        assert!(!err.is_escalated());
    }
}
