//! Subtitle download orchestration
//!
//! For every video and every wanted language:
//!
//! 1. Gather the languages not yet on disk
//! 2. Search the provider (once per identity per run) and rank the results
//! 3. Skip the language when nothing matches or nothing clears the threshold
//! 4. Download the best candidates in order, up to `retries + 1` attempts
//! 5. Save beside the video and run plugins
//!
//! Videos and languages are processed one at a time, and the configured delay
//! separates every download of a run. Escalated failures abort a strict run;
//! everything else is collected into a [`RunSummary`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::cache::TtlCache;
use super::events::{EventSink, RunEvent};
use super::match_scorer::MetadataEvaluator;
use super::plugins::Plugin;
use super::provider::{OnlineSubtitle, SubtitleProvider};
use super::rated_list::{RatedSubtitle, RatedSubtitles};
use crate::error::{Result, SubtitleError};
use crate::media::{LanguageTag, LocalVideo};

/// Knobs for one download run
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub languages: Vec<LanguageTag>,
    /// Only accept subtitles whose hearing-impaired flag equals this
    pub hearing_impaired: bool,
    /// Minimum score in `0.0..=1.0`
    pub min_score: f64,
    pub strict: bool,
    pub dry_run: bool,
    /// Replace subtitles that already exist
    pub force: bool,
    /// Extra download attempts after the first failure
    pub retries: usize,
    /// Minimum pause between two downloads of a run
    pub delay: Option<Duration>,
    /// Lifetime of cached search results
    pub cache_ttl: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            languages: Vec::new(),
            hearing_impaired: false,
            min_score: 0.5,
            strict: false,
            dry_run: false,
            force: false,
            retries: 2,
            delay: None,
            cache_ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadedItem {
    pub video: PathBuf,
    pub language: LanguageTag,
    pub path: PathBuf,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedItem {
    pub video: PathBuf,
    pub language: Option<LanguageTag>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedItem {
    pub video: PathBuf,
    pub language: Option<LanguageTag>,
    pub error: String,
}

/// Outcome of a non-strict run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub downloaded: Vec<DownloadedItem>,
    pub skipped: Vec<SkippedItem>,
    pub failed: Vec<FailedItem>,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Keeps downloads at least `delay` apart
struct DownloadPacer {
    delay: Option<Duration>,
    next_slot: Mutex<Option<Instant>>,
}

impl DownloadPacer {
    fn new(delay: Option<Duration>) -> Self {
        Self {
            delay,
            next_slot: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        let Some(delay) = self.delay else {
            return;
        };
        let pause = {
            let mut next_slot = self.next_slot.lock();
            let now = Instant::now();
            let start = next_slot.map_or(now, |slot| slot.max(now));
            *next_slot = Some(start + delay);
            start.saturating_duration_since(now)
        };
        if !pause.is_zero() {
            debug!(pause_ms = pause.as_millis() as u64, "Waiting before next download");
            tokio::time::sleep(pause).await;
        }
    }
}

/// State shared by every video of one run
struct RunState {
    cache: TtlCache<Vec<OnlineSubtitle>>,
    pacer: DownloadPacer,
}

pub struct SubtitleDownloader {
    provider: Arc<dyn SubtitleProvider>,
    evaluator: MetadataEvaluator,
    plugins: Vec<Plugin>,
    options: DownloadOptions,
    events: EventSink,
}

impl SubtitleDownloader {
    pub fn new(provider: Arc<dyn SubtitleProvider>, options: DownloadOptions) -> Self {
        Self {
            provider,
            evaluator: MetadataEvaluator,
            plugins: Vec::new(),
            options,
            events: EventSink::disabled(),
        }
    }

    pub fn with_plugins(mut self, plugins: Vec<Plugin>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Process every video in order.
    ///
    /// In strict mode the first escalated failure is returned as is.
    pub async fn run(&self, videos: &[LocalVideo]) -> Result<RunSummary> {
        let state = RunState {
            cache: TtlCache::new(self.options.cache_ttl),
            pacer: DownloadPacer::new(self.options.delay),
        };
        let mut summary = RunSummary::default();

        info!(
            videos = videos.len(),
            languages = self.options.languages.len(),
            provider = %self.provider.name(),
            dry_run = self.options.dry_run,
            "Starting subtitle run"
        );

        for video in videos {
            let expired = state.cache.purge_expired();
            if expired > 0 {
                debug!(expired = expired, "Dropped expired search results");
            }
            self.process_video(video, &state, &mut summary).await?;
        }

        info!(
            downloaded = summary.downloaded.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "Subtitle run finished"
        );
        Ok(summary)
    }

    /// Languages to fetch for a video: configured minus present on disk
    pub async fn missing_languages(&self, video: &LocalVideo) -> Result<Vec<LanguageTag>> {
        if self.options.dry_run {
            return Ok(self.options.languages.clone());
        }
        let existing = video.existing_subtitles().await?;
        Ok(self
            .options
            .languages
            .iter()
            .filter(|lang| !existing.iter().any(|s| &s.language == *lang))
            .cloned()
            .collect())
    }

    async fn search(
        &self,
        video: &LocalVideo,
        cache: &TtlCache<Vec<OnlineSubtitle>>,
    ) -> Result<Vec<OnlineSubtitle>> {
        let key = video.identity().identity_key();
        if let Some(hit) = cache.get(&key) {
            debug!(key = %key, "Using cached search results");
            return Ok(hit);
        }
        let results = self.provider.search_subtitles(video).await?;
        cache.insert(key, results.clone());
        Ok(results)
    }

    async fn process_video(
        &self,
        video: &LocalVideo,
        state: &RunState,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let missing = match self.missing_languages(video).await {
            Ok(missing) => missing,
            Err(e) => return self.handle_error(video, None, e, summary).await,
        };
        if missing.is_empty() {
            debug!(video = %video.path().display(), "All subtitles present");
            return Ok(());
        }

        let candidates = match self.search(video, &state.cache).await {
            Ok(candidates) => candidates,
            Err(e) => return self.handle_error(video, None, e, summary).await,
        };
        let rated = RatedSubtitles::rate(&self.evaluator, video.identity(), candidates)
            .hearing_impaired(self.options.hearing_impaired);

        for language in &missing {
            match self.process_language(video, language, &rated, &state.pacer).await {
                Ok(Some(item)) => {
                    self.events
                        .emit(RunEvent::Downloaded {
                            video: video.identity().to_string(),
                            language: item.language.to_string(),
                            path: item.path.clone(),
                            score: item.score,
                        })
                        .await;
                    summary.downloaded.push(item);
                }
                Ok(None) => {}
                Err(e) => self.handle_error(video, Some(language), e, summary).await?,
            }
        }
        Ok(())
    }

    /// Threshold, download, persist and post-process one language. `None`
    /// means a dry run stopped before downloading.
    async fn process_language(
        &self,
        video: &LocalVideo,
        language: &LanguageTag,
        rated: &RatedSubtitles,
        pacer: &DownloadPacer,
    ) -> Result<Option<DownloadedItem>> {
        let for_language = rated.filter_language(language);
        let Some(best) = for_language.best() else {
            return Err(SubtitleError::NoCandidates(language.clone()));
        };

        let passing = for_language.filter_score(self.options.min_score);
        if passing.is_empty() {
            return Err(SubtitleError::ScoreBelowThreshold {
                best: best.score,
                minimum: self.options.min_score,
            });
        }

        if self.options.dry_run {
            self.events
                .emit(RunEvent::Planned {
                    video: video.identity().to_string(),
                    language: language.to_string(),
                    candidates: passing.len(),
                    best_score: Some(best.score),
                })
                .await;
            return Ok(None);
        }

        let (content, chosen) = self.download_with_retry(&passing, pacer).await?;
        let path = video
            .save_subtitle(&content, language, self.options.force)
            .await?;
        self.run_plugins(&path).await;

        Ok(Some(DownloadedItem {
            video: video.path().to_path_buf(),
            language: language.clone(),
            path,
            score: chosen.score,
        }))
    }

    /// Try candidates best first. Only transient failures move on to the next
    /// candidate; the budget allows `retries + 1` attempts and running out of
    /// budget or candidates is a terminal failure.
    async fn download_with_retry<'a>(
        &self,
        candidates: &'a RatedSubtitles,
        pacer: &DownloadPacer,
    ) -> Result<(Vec<u8>, &'a RatedSubtitle)> {
        let mut budget = self.options.retries + 1;
        let mut attempts = 0;
        let mut last = String::from("no candidates");

        for candidate in candidates {
            if budget == 0 {
                break;
            }
            budget -= 1;
            attempts += 1;
            pacer.wait().await;

            match self
                .provider
                .download_subtitle(&candidate.subtitle.link)
                .await
            {
                Ok(content) => {
                    debug!(
                        link = %candidate.subtitle.link,
                        score = candidate.score,
                        attempt = attempts,
                        "Downloaded candidate"
                    );
                    return Ok((content, candidate));
                }
                Err(e) if !e.is_transient() => {
                    warn!(
                        link = %candidate.subtitle.link,
                        attempt = attempts,
                        error = %e,
                        "Download failed, not retrying"
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        link = %candidate.subtitle.link,
                        attempt = attempts,
                        remaining = budget,
                        error = %e,
                        "Download attempt failed"
                    );
                    last = e.to_string();
                }
            }
        }

        Err(SubtitleError::DownloadExhausted { attempts, last })
    }

    async fn run_plugins(&self, path: &std::path::Path) {
        for plugin in &self.plugins {
            if let Err(e) = plugin.run(path).await {
                warn!(plugin = %plugin.name, error = %e, "Plugin failed");
                self.events
                    .emit(RunEvent::PluginFailed {
                        plugin: plugin.name.clone(),
                        path: path.to_path_buf(),
                        error: e.to_string(),
                    })
                    .await;
            }
        }
    }

    /// Record a failure. Escalated failures abort a strict run.
    async fn handle_error(
        &self,
        video: &LocalVideo,
        language: Option<&LanguageTag>,
        error: SubtitleError,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let video_name = video.identity().to_string();
        let language_name = language.map(|l| l.to_string());

        if error.is_escalated() {
            self.events
                .emit(RunEvent::Failed {
                    video: video_name,
                    language: language_name,
                    error: error.to_string(),
                })
                .await;
            if self.options.strict {
                return Err(error);
            }
            summary.failed.push(FailedItem {
                video: video.path().to_path_buf(),
                language: language.cloned(),
                error: error.to_string(),
            });
        } else {
            self.events
                .emit(RunEvent::Skipped {
                    video: video_name,
                    language: language_name,
                    reason: error.to_string(),
                })
                .await;
            summary.skipped.push(SkippedItem {
                video: video.path().to_path_buf(),
                language: language.cloned(),
                reason: error.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaIdentity, Metadata, Movie, Subtitle};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::SystemTime;

    struct StubProvider {
        candidates: Vec<OnlineSubtitle>,
        succeed_on: Option<String>,
        rejected: Option<String>,
        searches: AtomicUsize,
        downloads: AtomicUsize,
    }

    impl StubProvider {
        fn new(candidates: Vec<OnlineSubtitle>, succeed_on: Option<&str>) -> Self {
            Self {
                candidates,
                succeed_on: succeed_on.map(String::from),
                rejected: None,
                searches: AtomicUsize::new(0),
                downloads: AtomicUsize::new(0),
            }
        }

        /// Answer `link` with an error no other candidate can fix
        fn rejecting(mut self, link: &str) -> Self {
            self.rejected = Some(link.to_string());
            self
        }
    }

    #[async_trait]
    impl SubtitleProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn search_subtitles(&self, _video: &LocalVideo) -> Result<Vec<OnlineSubtitle>> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            Ok(self.candidates.clone())
        }

        async fn download_subtitle(&self, link: &str) -> Result<Vec<u8>> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            if self.rejected.as_deref() == Some(link) {
                return Err(SubtitleError::Provider {
                    provider: "stub".to_string(),
                    reason: "invalid api key".to_string(),
                });
            }
            if self.succeed_on.as_deref() == Some(link) {
                Ok(b"1\n00:00:01,000 --> 00:00:02,000\nHello\n".to_vec())
            } else {
                Err(SubtitleError::TransientDownload(format!("{} unavailable", link)))
            }
        }
    }

    fn identity() -> MediaIdentity {
        MediaIdentity::Movie(Movie {
            title: "Inception".to_string(),
            year: 2010,
            metadata: Metadata::default(),
        })
    }

    fn candidate(link: &str, language: &str) -> OnlineSubtitle {
        OnlineSubtitle {
            subtitle: Subtitle {
                media: identity(),
                language: LanguageTag::parse(language).unwrap(),
                hearing_impaired: false,
            },
            link: link.to_string(),
            provider: "stub".to_string(),
        }
    }

    fn video(dir: &std::path::Path, name: &str) -> LocalVideo {
        LocalVideo::new(dir.join(name), identity(), SystemTime::now())
    }

    fn options(retries: usize) -> DownloadOptions {
        DownloadOptions {
            languages: vec![LanguageTag::parse("en").unwrap()],
            retries,
            ..Default::default()
        }
    }

    fn links(n: usize) -> Vec<OnlineSubtitle> {
        (0..n).map(|i| candidate(&format!("c{}", i), "en")).collect()
    }

    #[tokio::test]
    async fn test_attempts_bounded_by_retries() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(StubProvider::new(links(5), None));
        let downloader = SubtitleDownloader::new(provider.clone(), options(2));

        let summary = downloader.run(&[video(dir.path(), "Inception.2010.mkv")]).await.unwrap();
        assert_eq!(provider.downloads.load(Ordering::SeqCst), 3);
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].error.contains("after 3 attempts"));
    }

    #[tokio::test]
    async fn test_attempts_bounded_by_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(StubProvider::new(links(2), None));
        let downloader = SubtitleDownloader::new(provider.clone(), options(10));

        let summary = downloader.run(&[video(dir.path(), "Inception.2010.mkv")]).await.unwrap();
        assert_eq!(provider.downloads.load(Ordering::SeqCst), 2);
        assert_eq!(summary.failed.len(), 1);
    }

    #[tokio::test]
    async fn test_retry_reaches_later_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(StubProvider::new(links(4), Some("c2")));
        let downloader = SubtitleDownloader::new(provider.clone(), options(2));

        let summary = downloader.run(&[video(dir.path(), "Inception.2010.mkv")]).await.unwrap();
        assert_eq!(provider.downloads.load(Ordering::SeqCst), 3);
        assert_eq!(summary.downloaded.len(), 1);
        assert!(dir.path().join("Inception.2010.en.srt").exists());
    }

    #[tokio::test]
    async fn test_strict_returns_exhausted_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(StubProvider::new(links(3), None));
        let downloader = SubtitleDownloader::new(
            provider,
            DownloadOptions {
                strict: true,
                ..options(0)
            },
        );

        let err = downloader
            .run(&[video(dir.path(), "Inception.2010.mkv")])
            .await
            .unwrap_err();
        assert_matches!(err, SubtitleError::DownloadExhausted { attempts: 1, .. });
    }

    #[tokio::test]
    async fn test_provider_failure_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(StubProvider::new(links(3), Some("c1")).rejecting("c0"));
        let downloader = SubtitleDownloader::new(
            provider.clone(),
            DownloadOptions {
                strict: true,
                ..options(2)
            },
        );

        let err = downloader
            .run(&[video(dir.path(), "Inception.2010.mkv")])
            .await
            .unwrap_err();
        assert_matches!(err, SubtitleError::Provider { ref reason, .. } if reason == "invalid api key");
        assert_eq!(provider.downloads.load(Ordering::SeqCst), 1);
        assert!(!dir.path().join("Inception.2010.en.srt").exists());
    }

    #[tokio::test]
    async fn test_provider_failure_recorded_when_lenient() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(StubProvider::new(links(3), Some("c1")).rejecting("c0"));
        let downloader = SubtitleDownloader::new(provider.clone(), options(2));

        let summary = downloader.run(&[video(dir.path(), "Inception.2010.mkv")]).await.unwrap();
        assert_eq!(provider.downloads.load(Ordering::SeqCst), 1);
        assert!(summary.downloaded.is_empty());
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].error.contains("invalid api key"));
    }

    #[tokio::test]
    async fn test_delay_separates_downloads_across_videos() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(StubProvider::new(links(1), Some("c0")));
        let downloader = SubtitleDownloader::new(
            provider.clone(),
            DownloadOptions {
                delay: Some(Duration::from_millis(100)),
                ..options(0)
            },
        );

        let videos = [
            video(dir.path(), "Inception.2010.480p.mkv"),
            video(dir.path(), "Inception.2010.720p.mkv"),
            video(dir.path(), "Inception.2010.1080p.mkv"),
        ];
        let started = std::time::Instant::now();
        let summary = downloader.run(&videos).await.unwrap();

        assert_eq!(summary.downloaded.len(), 3);
        assert!(
            started.elapsed() >= Duration::from_millis(200),
            "took {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn test_first_download_is_not_delayed() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(StubProvider::new(links(1), Some("c0")));
        let downloader = SubtitleDownloader::new(
            provider,
            DownloadOptions {
                delay: Some(Duration::from_secs(30)),
                ..options(0)
            },
        );

        let started = std::time::Instant::now();
        let summary = downloader.run(&[video(dir.path(), "Inception.2010.mkv")]).await.unwrap();
        assert_eq!(summary.downloaded.len(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_language_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(StubProvider::new(vec![candidate("fr0", "fr")], Some("fr0")));
        let downloader = SubtitleDownloader::new(
            provider.clone(),
            DownloadOptions {
                strict: true,
                ..options(2)
            },
        );

        let summary = downloader.run(&[video(dir.path(), "Inception.2010.mkv")]).await.unwrap();
        assert_eq!(summary.skipped.len(), 1);
        assert!(summary.skipped[0].reason.contains("no subtitles found"));
        assert_eq!(provider.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_score_below_threshold_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(StubProvider::new(links(2), Some("c0")));
        let downloader = SubtitleDownloader::new(
            provider.clone(),
            DownloadOptions {
                min_score: 0.99,
                ..options(2)
            },
        );

        let summary = downloader.run(&[video(dir.path(), "Inception.2010.mkv")]).await.unwrap();
        assert!(summary.downloaded.is_empty());
        assert_eq!(summary.skipped.len(), 1);
        assert!(summary.skipped[0].reason.starts_with("score too low"));
        assert_eq!(provider.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_search_cached_per_identity() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(StubProvider::new(links(1), Some("c0")));
        let downloader = SubtitleDownloader::new(provider.clone(), options(0));

        let videos = [
            video(dir.path(), "Inception.2010.720p.mkv"),
            video(dir.path(), "Inception.2010.1080p.mkv"),
        ];
        let summary = downloader.run(&videos).await.unwrap();
        assert_eq!(provider.searches.load(Ordering::SeqCst), 1);
        assert_eq!(summary.downloaded.len(), 2);
    }

    #[tokio::test]
    async fn test_expired_search_results_are_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(StubProvider::new(links(1), Some("c0")));
        let downloader = SubtitleDownloader::new(
            provider.clone(),
            DownloadOptions {
                cache_ttl: Duration::ZERO,
                ..options(0)
            },
        );

        let videos = [
            video(dir.path(), "Inception.2010.720p.mkv"),
            video(dir.path(), "Inception.2010.1080p.mkv"),
        ];
        downloader.run(&videos).await.unwrap();
        assert_eq!(provider.searches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_present_languages_not_fetched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Inception.2010.en.srt"), "existing").unwrap();
        let provider = Arc::new(StubProvider::new(links(1), Some("c0")));
        let downloader = SubtitleDownloader::new(provider.clone(), options(0));

        let summary = downloader.run(&[video(dir.path(), "Inception.2010.mkv")]).await.unwrap();
        assert!(summary.downloaded.is_empty());
        assert_eq!(provider.searches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dry_run_downloads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Inception.2010.en.srt"), "existing").unwrap();
        let provider = Arc::new(StubProvider::new(links(1), Some("c0")));
        let downloader = SubtitleDownloader::new(
            provider.clone(),
            DownloadOptions {
                dry_run: true,
                ..options(0)
            },
        );

        let summary = downloader.run(&[video(dir.path(), "Inception.2010.mkv")]).await.unwrap();
        // Dry runs consider every language, even ones already on disk
        assert_eq!(provider.searches.load(Ordering::SeqCst), 1);
        assert_eq!(provider.downloads.load(Ordering::SeqCst), 0);
        assert!(summary.downloaded.is_empty());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("Inception.2010.en.srt")).unwrap(),
            "existing"
        );
    }
}
