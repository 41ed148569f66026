mod config;
mod database;
mod entities;
mod fetcher;
mod file_hash;
mod file_index;
mod logging;
mod ports;
mod reconciler;
mod services;
#[cfg(test)]
mod test_utils;
mod track_metadata;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::Context};

use crate::{
    config::Config,
    database::Database,
    fetcher::ItemFetcher,
    logging::setup_logging,
    reconciler::Reconciler,
    services::{id3tag::Id3Tag, youtube_dl::YoutubeDl},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "PLAYLIST_MIRROR_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Console log level
    #[arg(long, default_value = "info", global = true, env = "LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// File log level
    #[arg(long, default_value = "debug", global = true)]
    log_file_level: log::LevelFilter,

    /// Path to log file
    #[arg(long, env = "PLAYLIST_MIRROR_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

fn is_directory(s: &str) -> Result<PathBuf, String> {
    let p: PathBuf = s.into();
    if p.is_dir() {
        p.canonicalize()
            .map_err(|e| format!("`{}` is not readable: {}", s, e))
    } else {
        Err(format!(
            "`{}` does not exist, is not a directory or is not readable",
            s
        ))
    }
}

fn is_url(s: &str) -> Result<String, String> {
    url::Url::parse(s)
        .map(|_| s.to_string())
        .map_err(|e| format!("`{}` is not a valid URL: {}", s, e))
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download a playlist as audio files and number them in playlist order
    Sync {
        /// The directory to write the files to
        #[arg(short, long, value_parser = is_directory, env = "PLAYLIST_MIRROR_DESTINATION")]
        destination: PathBuf,

        /// The playlist URL
        #[arg(short, long, value_parser = is_url, env = "PLAYLIST_MIRROR_LIST")]
        list: String,

        /// youtube-dl compatible downloader executable
        #[arg(long, env = "PLAYLIST_MIRROR_YTDL")]
        ytdl: Option<PathBuf>,

        /// Tagging executable
        #[arg(long)]
        tagger: Option<PathBuf>,
    },
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Could not listen for interrupts: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    setup_logging(args.log_level, args.log_file.clone(), args.log_file_level)?;

    log::debug!("Loading configuration");
    let config = {
        if let Some(config) = &args.config {
            Config::from_file(config)
        } else {
            Config::load()
        }
    }
    .with_context(|| "Failed to load playlist-mirror config")?;

    match args.command {
        Commands::Sync {
            destination,
            list,
            ytdl,
            tagger,
        } => {
            let database = Database::open_or_restore(
                &config.database_path(&destination),
                &config.backup_path(&destination),
            )
            .await?;

            let downloader_config = config.downloader_config(ytdl);
            let tagger_path = config.tagger_path(tagger);
            if which::which(&tagger_path).is_err() {
                log::warn!(
                    "`{}` not found, downloaded files will not be tagged",
                    tagger_path.display()
                );
            }

            let fetcher = ItemFetcher::new(
                Box::new(YoutubeDl::new(&downloader_config)),
                Box::new(YoutubeDl::new(&downloader_config)),
                Box::new(Id3Tag::new(tagger_path)),
            );
            let reconciler = Reconciler::new(
                Arc::new(database),
                destination.clone(),
                config.backup_path(&destination),
                Box::new(YoutubeDl::new(&downloader_config)),
                fetcher,
                downloader_config.file_extension().to_string(),
            );

            let report = reconciler.run(&list, interrupted()).await?;
            if report.interrupted {
                log::warn!("Stopped early after an interrupt");
            }
            log::info!(
                "Done: {} listed, {} downloaded, {} already present, {} failed, {} pruned, {} renamed",
                report.listed,
                report.downloaded,
                report.skipped,
                report.failed,
                report.pruned,
                report.renamed
            );
        }
        Commands::Config(config_commands) => match config_commands {
            ConfigCommands::CreateDefault => {
                log::debug!("Creating default config");
                let path = Config::create_default()?;
                log::info!("Default config at {}", path.display());
            }
            ConfigCommands::Path => match Config::config_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("No default config path found"),
            },
        },
    }

    Ok(())
}
