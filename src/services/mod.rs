//! Classification, ranking, providers and file operations

pub mod cache;
pub mod events;
pub mod extractor;
pub mod filename_parser;
pub mod match_scorer;
pub mod opensubtitles;
pub mod organizer;
pub mod plugins;
pub mod provider;
pub mod rate_limiter;
pub mod rated_list;
pub mod scanner;
pub mod subtitle_downloader;
pub mod text_utils;

pub use cache::TtlCache;
pub use events::{EventSink, RunEvent, spawn_logger};
pub use extractor::{ArchiveExtractor, ExtractedVideo, Extraction};
pub use filename_parser::classify;
pub use match_scorer::{Evaluator, MetadataEvaluator};
pub use opensubtitles::{OpenSubtitlesClient, OpenSubtitlesConfig};
pub use organizer::{Collection, Organizer, RenameAction, render_template};
pub use plugins::Plugin;
pub use provider::{OnlineSubtitle, SubtitleProvider};
pub use rate_limiter::{ProviderRateLimiter, RateLimitConfig, RateLimitedClient};
pub use rated_list::{RatedSubtitle, RatedSubtitles};
pub use scanner::{ScanFilter, find_media};
pub use subtitle_downloader::{DownloadOptions, RunSummary, SubtitleDownloader};
