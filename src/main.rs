//! subscout command line entry point

mod cli;

use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use subscout::config::Config;
use subscout::services::{
    ArchiveExtractor, EventSink, OpenSubtitlesClient, Organizer, RenameAction, ScanFilter,
    SubtitleDownloader, find_media, spawn_logger,
};

use crate::cli::{Cli, Command, DiscoveryArgs};

/// Capacity of the run event queue
const EVENT_QUEUE: usize = 64;

fn init_tracing(cli: &Cli, config: &Config) -> Result<()> {
    let default_filter = match cli.verbose {
        0 => "subscout=info",
        1 => "subscout=debug",
        _ => "subscout=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let file_layer = match &config.logfile {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(cli.json_logs.then(|| fmt::layer().json()))
        .with((!cli.json_logs).then(|| fmt::layer().with_target(false)))
        .with(file_layer)
        .init();
    Ok(())
}

fn scan_filter(args: &DiscoveryArgs, config: &Config) -> Result<ScanFilter> {
    Ok(ScanFilter {
        modified_within: config.modified_within()?,
        kind: args.kind.map(Into::into),
    })
}

fn organizer(config: &Config, action: RenameAction, force: bool, dry: bool) -> Result<Organizer> {
    Ok(Organizer::new(
        config.movies_collection()?,
        config.tvshows_collection()?,
        action,
    )
    .with_force(force || config.force)
    .with_dry_run(dry || config.dry))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    init_tracing(&cli, &config)?;

    match cli.command {
        Command::Subtitles(args) => {
            args.apply(&mut config)?;
            let videos = find_media(&args.discovery.paths, &scan_filter(&args.discovery, &config)?)?;
            let provider = OpenSubtitlesClient::new(config.opensubtitles_config()?)?;

            let (events, rx) = EventSink::channel(EVENT_QUEUE);
            let logger = spawn_logger(rx);
            let downloader = SubtitleDownloader::new(Arc::new(provider), config.download_options()?)
                .with_plugins(config.plugins.clone())
                .with_events(events);

            let result = downloader.run(&videos).await;
            // Closing the last sender lets the logger drain and stop
            drop(downloader);
            if let Err(e) = logger.await {
                tracing::warn!(error = %e, "Event logger stopped unexpectedly");
            }

            let summary = result?;
            for item in &summary.downloaded {
                println!("{}\t{}\t{:.2}", item.path.display(), item.language, item.score);
            }
            println!(
                "downloaded {}, skipped {}, failed {}",
                summary.downloaded.len(),
                summary.skipped.len(),
                summary.failed.len()
            );
        }
        Command::Scan(args) => {
            args.discovery.apply(&mut config);
            let videos = find_media(&args.discovery.paths, &scan_filter(&args.discovery, &config)?)?;
            for video in &videos {
                let languages: Vec<String> = video
                    .existing_subtitles()
                    .await?
                    .into_iter()
                    .map(|s| s.language.to_string())
                    .collect();
                println!(
                    "{}\t{}\t{}\t[{}]",
                    video.path().display(),
                    video.identity(),
                    video.identity().metadata().summary(),
                    languages.join(",")
                );
            }
        }
        Command::Rename(args) => {
            args.discovery.apply(&mut config);
            let videos = find_media(&args.discovery.paths, &scan_filter(&args.discovery, &config)?)?;
            let organizer = organizer(&config, args.action, args.force, args.dry)?;

            let mut failed = 0;
            for video in &videos {
                match organizer.organize(video).await {
                    Ok(dest) => println!("{}\t{}", video.path().display(), dest.display()),
                    Err(e) => {
                        failed += 1;
                        tracing::warn!(video = %video.path().display(), error = %e, "Rename failed");
                    }
                }
            }
            tracing::info!(videos = videos.len(), failed = failed, "Rename finished");
        }
        Command::Extract(args) => {
            let extractor = ArchiveExtractor::new(config.temp_dir());
            let organizer = organizer(&config, RenameAction::Copy, args.force, args.dry)?;

            for archive in ArchiveExtractor::find_archives(&args.paths)? {
                match extractor.extract_into(&archive, &organizer).await {
                    Ok(placed) => {
                        for dest in placed {
                            println!("{}\t{}", archive.display(), dest.display());
                        }
                    }
                    Err(e) => {
                        tracing::warn!(archive = %archive.display(), error = %format!("{:#}", e), "Extraction failed");
                    }
                }
            }
        }
    }

    Ok(())
}
