use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::DownloaderConfig;
use crate::ports::{AudioFetcher, MetadataProvider, PlaylistLister, ToolError};
use crate::services::process;
use crate::track_metadata::{ItemMetadata, METADATA_TEMPLATE, parse_metadata_output};

/// One line of `--flat-playlist -j` output. Only the fields used are kept.
#[derive(Debug, Deserialize)]
struct FlatPlaylistEntry {
    url: String,
    #[serde(default)]
    title: Option<String>,
}

/// Parse line-delimited JSON from a flat playlist listing into item URLs.
/// Lines that are not JSON objects with a `url` are logged and skipped.
pub fn parse_flat_playlist(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(
            |line| match serde_json::from_str::<FlatPlaylistEntry>(line) {
                Ok(entry) => {
                    log::debug!(
                        "Playlist entry: {} ({})",
                        entry.url,
                        entry.title.as_deref().unwrap_or("untitled")
                    );
                    Some(entry.url)
                }
                Err(e) => {
                    log::warn!("Decoding playlist entry failed ({}): {}", e, line);
                    None
                }
            },
        )
        .collect()
}

/// The youtube-dl compatible downloader (`yt-dlp` by default).
pub struct YoutubeDl {
    program: PathBuf,
    format_selector: String,
    rate_limit: String,
    audio_format: String,
    file_extension: String,
    temp_path: PathBuf,
}

impl YoutubeDl {
    pub fn new(config: &DownloaderConfig) -> Self {
        Self {
            program: config.program.clone(),
            format_selector: config.format_selector.clone(),
            rate_limit: config.rate_limit.clone(),
            audio_format: config.audio_format.clone(),
            file_extension: config.file_extension().to_string(),
            temp_path: config.temp_path.clone(),
        }
    }

    /// Where the downloader leaves the transcoded audio.
    fn temp_output(&self) -> PathBuf {
        let mut path = self.temp_path.clone().into_os_string();
        path.push(".");
        path.push(&self.file_extension);
        PathBuf::from(path)
    }

    fn download_args(&self, url: &str) -> Vec<OsString> {
        let mut output_template = self.temp_path.clone().into_os_string();
        output_template.push(".%(ext)s");

        vec![
            "--no-cache-dir".into(),
            "-f".into(),
            self.format_selector.clone().into(),
            "--limit-rate".into(),
            self.rate_limit.clone().into(),
            "--extract-audio".into(),
            "--audio-format".into(),
            self.audio_format.clone().into(),
            "--output".into(),
            output_template,
            url.into(),
        ]
    }
}

#[async_trait::async_trait]
impl PlaylistLister for YoutubeDl {
    async fn list_item_urls(&self, playlist_url: &str) -> Result<Vec<String>, ToolError> {
        log::info!("Listing playlist {}", playlist_url);
        let output = process::run(&self.program, ["--flat-playlist", "-j", playlist_url]).await?;
        let urls = parse_flat_playlist(&String::from_utf8_lossy(&output.stdout));
        if urls.is_empty() && !output.status.success() {
            return Err(process::failure(&self.program, &output));
        }
        log::info!("Playlist has {} entries", urls.len());
        Ok(urls)
    }
}

#[async_trait::async_trait]
impl MetadataProvider for YoutubeDl {
    async fn fetch_metadata(&self, url: &str) -> Result<ItemMetadata, ToolError> {
        let output =
            process::run(&self.program, ["--get-filename", "-o", METADATA_TEMPLATE, url]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        match parse_metadata_output(&stdout) {
            Some(metadata) => Ok(metadata),
            None if !output.status.success() => Err(process::failure(&self.program, &output)),
            None => Err(ToolError::UnexpectedOutput {
                program: self.program.display().to_string(),
                output: stdout.trim().to_string(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl AudioFetcher for YoutubeDl {
    async fn download(&self, url: &str, destination: &Path) -> Result<(), ToolError> {
        let temp_output = self.temp_output();

        // Never hand a previous item's audio to this one
        if temp_output.exists() {
            std::fs::remove_file(&temp_output).map_err(|source| ToolError::Io {
                path: temp_output.display().to_string(),
                source,
            })?;
        }

        let output = process::run(&self.program, self.download_args(url)).await?;
        if !temp_output.is_file() && !output.status.success() {
            return Err(process::failure(&self.program, &output));
        }

        std::fs::copy(&temp_output, destination).map_err(|source| ToolError::Io {
            path: temp_output.display().to_string(),
            source,
        })?;

        log::debug!(
            "Copied {} to {}",
            temp_output.display(),
            destination.display()
        );
        Ok(())
    }
}
