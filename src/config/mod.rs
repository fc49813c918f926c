//! Application configuration management
//!
//! Settings come from, in increasing priority: built-in defaults, a YAML
//! file, environment variables (a `.env` file is honoured) and command line
//! flags. The first three are handled here.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::media::LanguageTag;
use crate::services::opensubtitles::OpenSubtitlesConfig;
use crate::services::organizer::Collection;
use crate::services::plugins::Plugin;
use crate::services::subtitle_downloader::DownloadOptions;

/// OpenSubtitles account settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenSubtitlesSettings {
    pub api_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Wanted subtitle languages
    pub languages: Vec<LanguageTag>,

    /// Prefer hearing-impaired subtitles
    pub impaired: bool,

    /// Minimum match score, as a percentage
    pub score: u8,

    /// Abort on the first download failure
    pub strict: bool,

    /// Report what would happen without touching files
    pub dry: bool,

    /// Overwrite existing files
    pub force: bool,

    /// Extra download attempts per language
    pub retries: usize,

    /// Pause between subtitle downloads, e.g. "2s"
    pub delay: Option<String>,

    /// Only consider videos modified within this window, e.g. "7days"
    pub modified: Option<String>,

    /// Also write JSON logs to this file
    pub logfile: Option<PathBuf>,

    /// Commands run after each saved subtitle
    pub plugins: Vec<Plugin>,

    pub movies: Option<Collection>,

    pub tvshows: Option<Collection>,

    /// Where archives are unpacked
    pub temp_dir: Option<PathBuf>,

    pub opensubtitles: OpenSubtitlesSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            languages: LanguageTag::parse("en").into_iter().collect(),
            impaired: false,
            score: 50,
            strict: false,
            dry: false,
            force: false,
            retries: 2,
            delay: None,
            modified: None,
            logfile: None,
            plugins: Vec::new(),
            movies: None,
            tvshows: None,
            temp_dir: None,
            opensubtitles: OpenSubtitlesSettings::default(),
        }
    }
}

impl Config {
    /// `<config dir>/subscout/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("subscout").join("config.yaml"))
    }

    /// Load configuration from an explicit file, or from the default location
    /// when it exists, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };

        config.apply_overrides(|name| env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).context("Failed to parse YAML")
    }

    /// Apply environment style overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(languages) = lookup("SUBSCOUT_LANGUAGES") {
            self.languages = parse_languages(&languages).context("Invalid SUBSCOUT_LANGUAGES")?;
        }
        if let Some(score) = lookup("SUBSCOUT_SCORE") {
            self.score = score.trim().parse().context("Invalid SUBSCOUT_SCORE")?;
        }
        if let Some(retries) = lookup("SUBSCOUT_RETRIES") {
            self.retries = retries.trim().parse().context("Invalid SUBSCOUT_RETRIES")?;
        }
        if let Some(logfile) = lookup("SUBSCOUT_LOGFILE") {
            self.logfile = Some(PathBuf::from(logfile));
        }
        if let Some(key) = lookup("OPENSUBTITLES_API_KEY") {
            self.opensubtitles.api_key = Some(key);
        }
        if let Some(username) = lookup("OPENSUBTITLES_USERNAME") {
            self.opensubtitles.username = Some(username);
        }
        if let Some(password) = lookup("OPENSUBTITLES_PASSWORD") {
            self.opensubtitles.password = Some(password);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.languages.is_empty() {
            bail!("At least one language is required");
        }
        if self.score > 100 {
            bail!("score must be a percentage between 0 and 100, got {}", self.score);
        }
        for plugin in &self.plugins {
            plugin.validate().map_err(anyhow::Error::msg)?;
        }
        self.delay()?;
        self.modified_within()?;
        Ok(())
    }

    pub fn min_score(&self) -> f64 {
        f64::from(self.score) / 100.0
    }

    pub fn delay(&self) -> Result<Option<Duration>> {
        parse_duration(self.delay.as_deref()).context("Invalid delay")
    }

    pub fn modified_within(&self) -> Result<Option<Duration>> {
        parse_duration(self.modified.as_deref()).context("Invalid modified window")
    }

    pub fn download_options(&self) -> Result<DownloadOptions> {
        Ok(DownloadOptions {
            languages: self.languages.clone(),
            hearing_impaired: self.impaired,
            min_score: self.min_score(),
            strict: self.strict,
            dry_run: self.dry,
            force: self.force,
            retries: self.retries,
            delay: self.delay()?,
            ..Default::default()
        })
    }

    pub fn opensubtitles_config(&self) -> Result<OpenSubtitlesConfig> {
        let api_key = self
            .opensubtitles
            .api_key
            .clone()
            .context("OPENSUBTITLES_API_KEY is required")?;
        Ok(OpenSubtitlesConfig {
            api_key,
            username: self.opensubtitles.username.clone(),
            password: self.opensubtitles.password.clone(),
            languages: self.languages.clone(),
        })
    }

    pub fn movies_collection(&self) -> Result<Collection> {
        self.movies
            .clone()
            .context("No movies collection configured")
    }

    pub fn tvshows_collection(&self) -> Result<Collection> {
        self.tvshows
            .clone()
            .context("No tvshows collection configured")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| env::temp_dir().join("subscout"))
    }
}

/// Comma separated tags or English names: "en,pt-BR,german"
pub fn parse_languages(s: &str) -> Result<Vec<LanguageTag>> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| LanguageTag::parse_lenient(part).map_err(|e| anyhow::anyhow!(e)))
        .collect()
}

fn parse_duration(value: Option<&str>) -> Result<Option<Duration>> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(humantime::parse_duration)
        .transpose()
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.languages, vec![LanguageTag::parse("en").unwrap()]);
        assert_eq!(config.score, 50);
        assert!((config.min_score() - 0.5).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let config = Config::from_yaml(
            r#"
languages: [en, german, pt-br]
impaired: true
score: 75
retries: 4
delay: 2s
modified: 7days
plugins:
  - name: notify
    exec: echo "$SUBTITLE"
movies:
  directory: /media/Movies
  template: "{title} ({year})/{title}.{ext}"
"#,
        )
        .unwrap();

        let langs: Vec<&str> = config.languages.iter().map(|l| l.as_str()).collect();
        assert_eq!(langs, vec!["en", "de", "pt-BR"]);
        assert!(config.impaired);
        assert_eq!(config.retries, 4);
        assert_eq!(config.delay().unwrap(), Some(Duration::from_secs(2)));
        assert_eq!(
            config.modified_within().unwrap(),
            Some(Duration::from_secs(7 * 86400))
        );
        assert_eq!(config.plugins[0].name, "notify");
        assert_eq!(
            config.movies_collection().unwrap().directory,
            PathBuf::from("/media/Movies")
        );
        assert!(config.tvshows_collection().is_err());

        let options = config.download_options().unwrap();
        assert!((options.min_score - 0.75).abs() < f64::EPSILON);
        assert!(options.hearing_impaired);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SUBSCOUT_LANGUAGES", "fr, es"),
            ("SUBSCOUT_SCORE", "90"),
            ("OPENSUBTITLES_API_KEY", "secret"),
        ]);
        let mut config = Config::default();
        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        let langs: Vec<&str> = config.languages.iter().map(|l| l.as_str()).collect();
        assert_eq!(langs, vec!["fr", "es"]);
        assert_eq!(config.score, 90);
        let os = config.opensubtitles_config().unwrap();
        assert_eq!(os.api_key, "secret");
        assert_eq!(os.username, None);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config {
            score: 120,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.score = 50;
        config.delay = Some("soon".to_string());
        assert!(config.validate().is_err());

        config.delay = None;
        config.plugins = vec![Plugin::new("broken", "")];
        assert!(config.validate().is_err());

        config.plugins.clear();
        config.languages.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_language_rejected() {
        assert!(parse_languages("en,xx-yyyyyyyy").is_err());
        assert!(Config::from_yaml("languages: [klingon]").is_err());
    }
}
