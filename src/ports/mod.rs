//! Narrow adapters over the external executables the reconciler depends on.
//!
//! Process-backed implementations live in `services::youtube_dl` and
//! `services::id3tag`; tests substitute mocks.

use std::path::Path;

use crate::track_metadata::ItemMetadata;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("`{program}` not found. Install it or pass its path explicitly")]
    NotFound { program: String },
    #[error("Failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {status}:\nstderr:\n{stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("Unexpected output from `{program}`: {output}")]
    UnexpectedOutput { program: String, output: String },
    #[error("File system error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Lists the entries of a playlist, in playlist order.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PlaylistLister: Send + Sync {
    async fn list_item_urls(&self, playlist_url: &str) -> Result<Vec<String>, ToolError>;
}

/// Looks up the title, artist, track and live flag of one item.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn fetch_metadata(&self, url: &str) -> Result<ItemMetadata, ToolError>;
}

/// Downloads one item as audio to `destination`.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AudioFetcher: Send + Sync {
    async fn download(&self, url: &str, destination: &Path) -> Result<(), ToolError>;
}

/// Writes the artist and track of `metadata` into an audio file.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Tagger: Send + Sync {
    async fn tag(&self, path: &Path, metadata: &ItemMetadata) -> Result<(), ToolError>;
}
