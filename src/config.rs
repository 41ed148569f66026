use std::path::{Path, PathBuf};

use color_eyre::{Result, eyre::Context};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// youtube-dl compatible downloader executable
    downloader: String,
    /// Tagging executable
    tagger: String,
    /// Passed to `--limit-rate`
    rate_limit: String,
    /// Passed to `--audio-format`
    audio_format: String,
    /// Passed to `-f`
    format_selector: String,
    /// Temporary download path, without extension
    temp_path: Option<String>,
    /// Store file name inside the destination directory
    database_file: String,
    /// Backup file name inside the destination directory
    backup_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            downloader: "yt-dlp".to_string(),
            tagger: "id3tag".to_string(),
            rate_limit: "10M".to_string(),
            audio_format: "mp3".to_string(),
            format_selector: "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best"
                .to_string(),
            temp_path: None,
            database_file: "database.db".to_string(),
            backup_file: "database.backup".to_string(),
        }
    }
}

/// Everything the downloader adapter needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloaderConfig {
    pub program: PathBuf,
    pub format_selector: String,
    pub rate_limit: String,
    pub audio_format: String,
    pub temp_path: PathBuf,
}

impl DownloaderConfig {
    /// Extension of the files `--audio-format` produces.
    pub fn file_extension(&self) -> &str {
        match self.audio_format.as_str() {
            "vorbis" => "ogg",
            "alac" => "m4a",
            format => format,
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .context(format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("playlist-mirror").join("config.toml"))
    }

    /// Load the default config file, or built-in defaults when there is none
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Write the default config to the default path unless a file is already there
    pub fn create_default() -> Result<PathBuf> {
        let path = Self::config_path()
            .ok_or_else(|| color_eyre::eyre::eyre!("No config directory on this platform"))?;
        if path.exists() {
            log::info!("Config already exists at {}", path.display());
            return Ok(path);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context(format!(
                "Failed to create config directory: {}",
                parent.display()
            ))?;
        }
        let contents =
            toml::to_string_pretty(&Self::default()).context("Failed to serialize config")?;
        std::fs::write(&path, contents)
            .context(format!("Failed to write config file: {}", path.display()))?;
        Ok(path)
    }

    /// Expand ~ to home directory
    fn expand_path(&self, path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    pub fn downloader_config(&self, program_override: Option<PathBuf>) -> DownloaderConfig {
        DownloaderConfig {
            program: program_override.unwrap_or_else(|| self.expand_path(&self.downloader)),
            format_selector: self.format_selector.clone(),
            rate_limit: self.rate_limit.clone(),
            audio_format: self.audio_format.clone(),
            temp_path: match &self.temp_path {
                Some(path) => self.expand_path(path),
                None => std::env::temp_dir().join("ytdownloader"),
            },
        }
    }

    pub fn tagger_path(&self, program_override: Option<PathBuf>) -> PathBuf {
        program_override.unwrap_or_else(|| self.expand_path(&self.tagger))
    }

    pub fn database_path(&self, destination: &Path) -> PathBuf {
        destination.join(&self.database_file)
    }

    pub fn backup_path(&self, destination: &Path) -> PathBuf {
        destination.join(&self.backup_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "downloader = \"youtube-dl\"\nrate_limit = \"2M\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        let downloader = config.downloader_config(None);

        assert_eq!(downloader.program, PathBuf::from("youtube-dl"));
        assert_eq!(downloader.rate_limit, "2M");
        assert_eq!(downloader.audio_format, "mp3");
        assert_eq!(config.tagger_path(None), PathBuf::from("id3tag"));
    }

    #[test]
    fn test_overrides_win() {
        let config = Config::default();
        assert_eq!(
            config
                .downloader_config(Some(PathBuf::from("/opt/yt-dlp")))
                .program,
            PathBuf::from("/opt/yt-dlp")
        );
        assert_eq!(
            config.tagger_path(Some(PathBuf::from("/opt/id3tag"))),
            PathBuf::from("/opt/id3tag")
        );
    }

    #[test]
    fn test_store_paths_live_in_destination() {
        let config = Config::default();
        let destination = Path::new("/music/playlist");
        assert_eq!(
            config.database_path(destination),
            PathBuf::from("/music/playlist/database.db")
        );
        assert_eq!(
            config.backup_path(destination),
            PathBuf::from("/music/playlist/database.backup")
        );
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "downloader = [").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_default_round_trips_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        assert_eq!(toml::from_str::<Config>(&text).unwrap(), Config::default());
    }

    #[test]
    fn test_file_extension_follows_audio_format() {
        let mut downloader = Config::default().downloader_config(None);
        assert_eq!(downloader.file_extension(), "mp3");

        downloader.audio_format = "opus".to_string();
        assert_eq!(downloader.file_extension(), "opus");

        downloader.audio_format = "vorbis".to_string();
        assert_eq!(downloader.file_extension(), "ogg");
    }
}
