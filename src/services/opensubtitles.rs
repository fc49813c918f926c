//! OpenSubtitles.com REST API provider
//!
//! Uses the v1 REST API for subtitle search and download.
//! API documentation: https://opensubtitles.stoplight.io/docs/opensubtitles-api
//!
//! Searching only needs an API key. Downloads work anonymously with a small
//! daily quota; logging in raises it.

use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::filename_parser;
use super::provider::{OnlineSubtitle, SubtitleProvider};
use super::rate_limiter::{RateLimitedClient, ResponseExt, RetryConfig, retry_async};
use crate::error::{Result, SubtitleError};
use crate::media::{LanguageTag, LocalVideo, MediaIdentity, Movie, Subtitle};

/// OpenSubtitles API base URL
const BASE_URL: &str = "https://api.opensubtitles.com/api/v1";

const PROVIDER_NAME: &str = "opensubtitles";

/// Credentials and request options
#[derive(Debug, Clone, Default)]
pub struct OpenSubtitlesConfig {
    /// Consumer API key from https://www.opensubtitles.com/consumers
    pub api_key: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Languages to ask for; empty asks for all
    pub languages: Vec<LanguageTag>,
}

pub struct OpenSubtitlesClient {
    client: RateLimitedClient,
    config: OpenSubtitlesConfig,
    user_agent: String,
    retry_config: RetryConfig,
    /// JWT token and base URL from login
    auth_state: RwLock<Option<AuthState>>,
}

#[derive(Debug, Clone)]
struct AuthState {
    token: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    base_url: String,
    user: LoginUser,
}

#[derive(Debug, Deserialize)]
struct LoginUser {
    user_id: i64,
    remaining_downloads: i32,
    vip: bool,
}

/// Subtitle search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleSearchResult {
    pub id: String,
    pub attributes: SubtitleAttributes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleAttributes {
    /// Language code, e.g. "en" or "pt-BR"
    pub language: Option<String>,
    pub download_count: Option<i64>,
    pub hearing_impaired: Option<bool>,
    /// Release name the subtitle was timed against
    pub release: Option<String>,
    pub feature_details: Option<FeatureDetails>,
    pub files: Option<Vec<SubtitleFile>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureDetails {
    pub feature_type: Option<String>,
    pub year: Option<u32>,
    pub title: Option<String>,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
    pub parent_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleFile {
    pub file_id: i64,
    pub file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    total_count: i32,
    page: i32,
    data: Vec<SubtitleSearchResult>,
}

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    link: String,
    file_name: String,
    remaining: i32,
}

/// Query parameters for `/subtitles`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtitleSearchQuery {
    pub query: Option<String>,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
    /// Comma separated language codes
    pub languages: Option<String>,
    /// movie, episode or all
    pub media_type: Option<String>,
}

impl SubtitleSearchQuery {
    /// Build the query for a local video's identity
    pub fn for_identity(identity: &MediaIdentity, languages: &[LanguageTag]) -> Self {
        let languages = (!languages.is_empty()).then(|| {
            let mut codes: Vec<String> = languages.iter().map(|l| l.as_str().to_lowercase()).collect();
            // The API rejects unsorted language lists
            codes.sort();
            codes.dedup();
            codes.join(",")
        });

        match identity {
            MediaIdentity::Movie(m) => Self {
                query: Some(format!("{} {}", m.title, m.year)),
                languages,
                media_type: Some("movie".to_string()),
                ..Default::default()
            },
            MediaIdentity::Episode(e) => Self {
                query: Some(e.show.clone()),
                season_number: Some(e.season),
                episode_number: Some(e.episode),
                languages,
                media_type: Some("episode".to_string()),
            },
        }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(ref q) = self.query {
            params.push(("query", q.clone()));
        }
        if let Some(season) = self.season_number {
            params.push(("season_number", season.to_string()));
        }
        if let Some(episode) = self.episode_number {
            params.push(("episode_number", episode.to_string()));
        }
        if let Some(ref languages) = self.languages {
            params.push(("languages", languages.clone()));
        }
        if let Some(ref media_type) = self.media_type {
            params.push(("type", media_type.clone()));
        }
        params
    }
}

impl OpenSubtitlesClient {
    pub fn new(config: OpenSubtitlesConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: RateLimitedClient::for_opensubtitles()?,
            config,
            user_agent: format!("subscout v{}", env!("CARGO_PKG_VERSION")),
            retry_config: RetryConfig {
                max_retries: 3,
                initial_interval: Duration::from_millis(500),
                max_interval: Duration::from_secs(10),
                multiplier: 2.0,
            },
            auth_state: RwLock::new(None),
        })
    }

    fn provider_error(e: anyhow::Error) -> SubtitleError {
        SubtitleError::Provider {
            provider: PROVIDER_NAME.to_string(),
            reason: format!("{:#}", e),
        }
    }

    /// Log in with the configured credentials if there are any and no
    /// session exists yet
    async fn ensure_login(&self) -> anyhow::Result<Option<AuthState>> {
        if let Some(state) = self.auth_state.read().clone() {
            return Ok(Some(state));
        }
        let (Some(username), Some(password)) = (&self.config.username, &self.config.password)
        else {
            return Ok(None);
        };

        info!("Logging into OpenSubtitles API");
        let url = format!("{}/login", BASE_URL);
        let this = self;
        let url = &url;

        let response = retry_async(
            || async move {
                this.client.acquire().await?;
                let response = this
                    .client
                    .inner()
                    .post(url)
                    .header("Api-Key", &this.config.api_key)
                    .header("User-Agent", &this.user_agent)
                    .json(&serde_json::json!({
                        "username": username,
                        "password": password
                    }))
                    .send()
                    .await?;

                if response.status() == 401 {
                    bail!("Invalid credentials");
                }
                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    bail!("Login failed with status {}: {}", status, body);
                }

                let login: LoginResponse = response
                    .json()
                    .await
                    .context("Failed to parse login response")?;
                Ok(login)
            },
            &self.retry_config,
            "opensubtitles_login",
        )
        .await?;

        info!(
            user_id = response.user.user_id,
            remaining_downloads = response.user.remaining_downloads,
            vip = response.user.vip,
            "OpenSubtitles login successful"
        );

        let state = AuthState {
            token: response.token,
            base_url: format!("https://{}/api/v1", response.base_url),
        };
        *self.auth_state.write() = Some(state.clone());
        Ok(Some(state))
    }

    /// Run a search query
    pub async fn search(&self, query: &SubtitleSearchQuery) -> Result<Vec<SubtitleSearchResult>> {
        debug!(?query, "Searching OpenSubtitles");

        let url = format!("{}/subtitles", BASE_URL);
        let params = query.params();
        let this = self;
        let (url, params) = (&url, &params);

        let result = retry_async(
            || async move {
                this.client.acquire().await?;
                let response = this
                    .client
                    .inner()
                    .get(url)
                    .query(params)
                    .header("Api-Key", &this.config.api_key)
                    .header("User-Agent", &this.user_agent)
                    .send()
                    .await?;

                if response.is_rate_limited() {
                    warn!("OpenSubtitles rate limit hit");
                    bail!("Rate limited (429)");
                }
                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    bail!("Search failed with status {}: {}", status, body);
                }

                let search: SearchResponse = response
                    .json()
                    .await
                    .context("Failed to parse search response")?;
                Ok(search)
            },
            &self.retry_config,
            "opensubtitles_search",
        )
        .await
        .map_err(Self::provider_error)?;

        debug!(
            total_count = result.total_count,
            page = result.page,
            "OpenSubtitles search completed"
        );
        Ok(result.data)
    }

    /// Resolve a file id to a download link and fetch the content.
    ///
    /// Rejected credentials and an exhausted quota fail every later download
    /// too, so they are reported as provider failures. Anything else only
    /// concerns this file.
    async fn fetch(&self, file_id: i64) -> Result<Vec<u8>> {
        let auth = self.ensure_login().await.map_err(Self::provider_error)?;
        let base_url = auth.as_ref().map_or(BASE_URL, |a| a.base_url.as_str());
        let url = format!("{}/download", base_url);

        self.client.acquire().await?;
        let mut request = self
            .client
            .inner()
            .post(&url)
            .header("Api-Key", &self.config.api_key)
            .header("User-Agent", &self.user_agent)
            .json(&serde_json::json!({ "file_id": file_id }));
        if let Some(ref auth) = auth {
            request = request.bearer_auth(&auth.token);
        }

        let response = request.send().await.map_err(transient)?;
        if let Some(err) = rejected_download(response.status()) {
            if response.status() == StatusCode::UNAUTHORIZED {
                // Drop the session so the next run logs in again
                self.auth_state.write().take();
            }
            return Err(err);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SubtitleError::TransientDownload(format!(
                "download request failed with status {}: {}",
                status, body
            )));
        }

        let info: DownloadResponse = response.json().await.map_err(transient)?;

        let file = self
            .client
            .inner()
            .get(&info.link)
            .send()
            .await
            .map_err(transient)?;
        if file.is_transient_error() || !file.status().is_success() {
            return Err(SubtitleError::TransientDownload(format!(
                "failed to fetch {} ({})",
                info.file_name,
                file.status()
            )));
        }
        let content = file.bytes().await.map_err(transient)?.to_vec();

        info!(
            file_id = file_id,
            file_name = %info.file_name,
            remaining = info.remaining,
            "Subtitle downloaded"
        );
        Ok(content)
    }
}

/// Download statuses that no other candidate can recover from
fn rejected_download(status: StatusCode) -> Option<SubtitleError> {
    let reason = match status.as_u16() {
        401 => "download rejected: invalid API key or credentials",
        406 => "daily download quota exhausted",
        _ => return None,
    };
    Some(SubtitleError::Provider {
        provider: PROVIDER_NAME.to_string(),
        reason: reason.to_string(),
    })
}

fn transient(e: reqwest::Error) -> SubtitleError {
    SubtitleError::TransientDownload(e.to_string())
}

/// Turn a search result into a candidate.
///
/// The release name is classified like a local filename. When it cannot be
/// classified the video's own identity is used with whatever release tags the
/// name carries.
pub fn to_online(result: &SubtitleSearchResult, video_identity: &MediaIdentity) -> Option<OnlineSubtitle> {
    let attrs = &result.attributes;
    let language = LanguageTag::parse_lenient(attrs.language.as_deref()?).ok()?;
    let file_id = attrs.files.as_ref()?.first()?.file_id;
    let release = attrs.release.as_deref().unwrap_or_default();

    let media = match filename_parser::classify(release) {
        Ok(identity) => identity,
        Err(_) => fallback_identity(video_identity, release, attrs.feature_details.as_ref()),
    };

    Some(OnlineSubtitle {
        subtitle: Subtitle {
            media,
            language,
            hearing_impaired: attrs.hearing_impaired.unwrap_or(false),
        },
        link: file_id.to_string(),
        provider: PROVIDER_NAME.to_string(),
    })
}

fn fallback_identity(
    video_identity: &MediaIdentity,
    release: &str,
    feature: Option<&FeatureDetails>,
) -> MediaIdentity {
    let metadata = filename_parser::parse_metadata(release);
    match video_identity {
        MediaIdentity::Movie(m) => MediaIdentity::Movie(Movie {
            title: m.title.clone(),
            year: feature.and_then(|f| f.year).unwrap_or(m.year),
            metadata,
        }),
        MediaIdentity::Episode(e) => {
            let mut episode = e.clone();
            if let Some(f) = feature {
                episode.season = f.season_number.unwrap_or(e.season);
                episode.episode = f.episode_number.unwrap_or(e.episode);
            }
            episode.metadata = metadata;
            MediaIdentity::Episode(episode)
        }
    }
}

#[async_trait]
impl SubtitleProvider for OpenSubtitlesClient {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn search_subtitles(&self, video: &LocalVideo) -> Result<Vec<OnlineSubtitle>> {
        let query = SubtitleSearchQuery::for_identity(video.identity(), &self.config.languages);
        let results = self.search(&query).await?;
        let total = results.len();

        let candidates: Vec<OnlineSubtitle> = results
            .iter()
            .filter_map(|r| to_online(r, video.identity()))
            .collect();

        debug!(
            video = %video.identity(),
            results = total,
            usable = candidates.len(),
            "Converted OpenSubtitles results"
        );
        Ok(candidates)
    }

    async fn download_subtitle(&self, link: &str) -> Result<Vec<u8>> {
        let file_id: i64 = link
            .parse()
            .map_err(|_| SubtitleError::TransientDownload(format!("invalid file id {}", link)))?;

        self.fetch(file_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{Episode, Metadata, Quality, Source};
    use pretty_assertions::assert_eq;

    fn inception() -> MediaIdentity {
        MediaIdentity::Movie(Movie {
            title: "Inception".to_string(),
            year: 2010,
            metadata: Metadata::default(),
        })
    }

    fn result(json: serde_json::Value) -> SubtitleSearchResult {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_movie_query() {
        let langs = vec![
            LanguageTag::parse("fr").unwrap(),
            LanguageTag::parse("en").unwrap(),
        ];
        let query = SubtitleSearchQuery::for_identity(&inception(), &langs);
        assert_eq!(query.query.as_deref(), Some("Inception 2010"));
        assert_eq!(query.languages.as_deref(), Some("en,fr"));
        assert_eq!(query.media_type.as_deref(), Some("movie"));
        assert_eq!(query.season_number, None);
    }

    #[test]
    fn test_episode_query() {
        let identity = MediaIdentity::Episode(Episode {
            show: "The Office US".to_string(),
            season: 2,
            episode: 4,
            episode_title: None,
            metadata: Metadata::default(),
        });
        let query = SubtitleSearchQuery::for_identity(&identity, &[]);
        assert_eq!(
            query.params(),
            vec![
                ("query", "The Office US".to_string()),
                ("season_number", "2".to_string()),
                ("episode_number", "4".to_string()),
                ("type", "episode".to_string()),
            ]
        );
    }

    #[test]
    fn test_result_with_release_name() {
        let r = result(serde_json::json!({
            "id": "123",
            "attributes": {
                "language": "en",
                "hearing_impaired": true,
                "release": "Inception.2010.720p.BluRay.x264-SPARKS",
                "files": [{"file_id": 4242, "file_name": "Inception.srt"}]
            }
        }));

        let online = to_online(&r, &inception()).unwrap();
        assert_eq!(online.link, "4242");
        assert_eq!(online.provider, "opensubtitles");
        assert!(online.subtitle.hearing_impaired);
        assert_eq!(online.subtitle.language.as_str(), "en");

        let meta = online.subtitle.media.metadata();
        assert_eq!(meta.quality, Some(Quality::Hd720p));
        assert_eq!(meta.source, Some(Source::BluRay));
        assert_eq!(meta.group.as_deref(), Some("SPARKS"));
    }

    #[test]
    fn test_unclassifiable_release_falls_back_to_video() {
        let r = result(serde_json::json!({
            "id": "7",
            "attributes": {
                "language": "pt-BR",
                "release": "BluRay 1080p",
                "feature_details": {"year": 2010, "title": "Inception"},
                "files": [{"file_id": 7}]
            }
        }));

        let online = to_online(&r, &inception()).unwrap();
        assert_eq!(online.subtitle.language.as_str(), "pt-BR");
        assert!(!online.subtitle.hearing_impaired);
        match &online.subtitle.media {
            MediaIdentity::Movie(m) => {
                assert_eq!(m.title, "Inception");
                assert_eq!(m.year, 2010);
                assert_eq!(m.metadata.quality, Some(Quality::Hd1080p));
            }
            other => panic!("expected movie, got {:?}", other),
        }
    }

    #[test]
    fn test_result_without_file_is_skipped() {
        let r = result(serde_json::json!({
            "id": "8",
            "attributes": {"language": "en", "release": "Inception.2010.720p"}
        }));
        assert!(to_online(&r, &inception()).is_none());
    }

    #[test]
    fn test_rejected_downloads_are_provider_failures() {
        let unauthorized = rejected_download(StatusCode::UNAUTHORIZED).unwrap();
        assert!(unauthorized.is_escalated());
        assert!(!unauthorized.is_transient());
        assert!(matches!(
            rejected_download(StatusCode::NOT_ACCEPTABLE),
            Some(SubtitleError::Provider { .. })
        ));
        assert!(rejected_download(StatusCode::NOT_FOUND).is_none());
        assert!(rejected_download(StatusCode::SERVICE_UNAVAILABLE).is_none());
    }
}
