//! Command line interface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use subscout::config::{Config, parse_languages};
use subscout::media::MediaKind;
use subscout::services::RenameAction;

#[derive(Debug, Parser)]
#[command(name = "subscout", version, about = "Find subtitles for local videos and keep libraries tidy")]
pub struct Cli {
    /// Configuration file (defaults to <config dir>/subscout/config.yaml)
    #[arg(long, global = true, env = "SUBSCOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download missing subtitles for videos
    Subtitles(SubtitlesArgs),
    /// List classified videos and the subtitles they have
    Scan(ScanArgs),
    /// Move videos into the configured collections
    Rename(RenameArgs),
    /// Unpack archives into the configured collections
    Extract(ExtractArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Movies,
    Episodes,
}

impl From<KindArg> for MediaKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Movies => MediaKind::Movie,
            KindArg::Episodes => MediaKind::Episode,
        }
    }
}

/// Options shared by commands that walk directories
#[derive(Debug, Args)]
pub struct DiscoveryArgs {
    /// Files or directories to process
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Only videos modified within this window, e.g. "2weeks"
    #[arg(long)]
    pub modified: Option<String>,

    /// Only movies or only episodes
    #[arg(long, value_enum)]
    pub kind: Option<KindArg>,
}

#[derive(Debug, Args)]
pub struct SubtitlesArgs {
    #[command(flatten)]
    pub discovery: DiscoveryArgs,

    /// Comma separated languages, e.g. "en,pt-BR,german"
    #[arg(short, long)]
    pub lang: Option<String>,

    /// Want hearing-impaired subtitles
    #[arg(long)]
    pub impaired: bool,

    /// Minimum match score in percent
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub score: Option<u8>,

    /// Stop at the first download failure
    #[arg(long)]
    pub strict: bool,

    /// Show what would be downloaded
    #[arg(long)]
    pub dry: bool,

    /// Replace existing subtitles
    #[arg(long)]
    pub force: bool,

    /// Pause between subtitle downloads, e.g. "2s"
    #[arg(long)]
    pub delay: Option<String>,

    /// Extra download attempts per language
    #[arg(long)]
    pub retries: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    #[command(flatten)]
    pub discovery: DiscoveryArgs,
}

#[derive(Debug, Args)]
pub struct RenameArgs {
    #[command(flatten)]
    pub discovery: DiscoveryArgs,

    #[arg(long, value_enum, default_value_t = RenameAction::Move)]
    pub action: RenameAction,

    #[arg(long)]
    pub force: bool,

    #[arg(long)]
    pub dry: bool,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Archives or directories containing archives
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    #[arg(long)]
    pub force: bool,

    #[arg(long)]
    pub dry: bool,
}

impl DiscoveryArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref modified) = self.modified {
            config.modified = Some(modified.clone());
        }
    }
}

impl SubtitlesArgs {
    /// Layer the flags over the loaded configuration
    pub fn apply(&self, config: &mut Config) -> anyhow::Result<()> {
        self.discovery.apply(config);
        if let Some(ref lang) = self.lang {
            config.languages = parse_languages(lang)?;
        }
        if let Some(score) = self.score {
            config.score = score;
        }
        if let Some(retries) = self.retries {
            config.retries = retries;
        }
        if let Some(ref delay) = self.delay {
            config.delay = Some(delay.clone());
        }
        config.impaired |= self.impaired;
        config.strict |= self.strict;
        config.dry |= self.dry;
        config.force |= self.force;
        config.validate()
    }
}
