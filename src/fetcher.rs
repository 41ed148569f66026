use std::path::Path;

use crate::ports::{AudioFetcher, MetadataProvider, Tagger};
use crate::track_metadata::ItemMetadata;

/// Downloads and tags a single playlist item.
pub struct ItemFetcher {
    metadata: Box<dyn MetadataProvider>,
    audio: Box<dyn AudioFetcher>,
    tagger: Box<dyn Tagger>,
}

impl ItemFetcher {
    pub fn new(
        metadata: Box<dyn MetadataProvider>,
        audio: Box<dyn AudioFetcher>,
        tagger: Box<dyn Tagger>,
    ) -> Self {
        Self {
            metadata,
            audio,
            tagger,
        }
    }

    /// Look up metadata, download `url` to `destination` and tag it.
    ///
    /// No step aborts the others: a failed lookup leaves the metadata empty, a
    /// failed download leaves `destination` missing (callers check for it) and
    /// a failed tag leaves the file untagged.
    pub async fn fetch(&self, url: &str, destination: &Path) -> ItemMetadata {
        log::info!("Downloading {} ...", url);

        let metadata = match self.metadata.fetch_metadata(url).await {
            Ok(metadata) => metadata,
            Err(e) => {
                log::warn!("Could not read metadata for {}: {}", url, e);
                ItemMetadata::default()
            }
        };
        log::debug!("Metadata for {}: {:?}", url, metadata);

        if let Err(e) = self.audio.download(url, destination).await {
            log::error!("Download of {} failed: {}", url, e);
            return metadata;
        }

        if let Err(e) = self.tagger.tag(destination, &metadata).await {
            log::warn!("Tagging {} failed: {}", destination.display(), e);
        }

        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{MockAudioFetcher, MockMetadataProvider, MockTagger, ToolError};

    fn unexpected(output: &str) -> ToolError {
        ToolError::UnexpectedOutput {
            program: "yt-dlp".to_string(),
            output: output.to_string(),
        }
    }

    #[tokio::test]
    async fn test_fetch_downloads_and_tags() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("ABC.mp3");

        let mut metadata = MockMetadataProvider::new();
        metadata.expect_fetch_metadata().times(1).returning(|_| {
            Ok(ItemMetadata {
                title: Some("t".to_string()),
                artist: Some("a".to_string()),
                track: Some("s".to_string()),
                is_live: false,
            })
        });
        let mut audio = MockAudioFetcher::new();
        audio
            .expect_download()
            .times(1)
            .returning(|_, destination: &Path| {
                std::fs::write(destination, b"audio").unwrap();
                Ok(())
            });
        let mut tagger = MockTagger::new();
        tagger
            .expect_tag()
            .withf(|_, metadata: &ItemMetadata| metadata.artist.as_deref() == Some("a"))
            .times(1)
            .returning(|_, _| Ok(()));

        let fetcher = ItemFetcher::new(Box::new(metadata), Box::new(audio), Box::new(tagger));
        let result = fetcher.fetch("https://example.com/1", &destination).await;

        assert_eq!(result.track.as_deref(), Some("s"));
        assert!(destination.exists());
    }

    #[tokio::test]
    async fn test_metadata_failure_still_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("ABC.mp3");

        let mut metadata = MockMetadataProvider::new();
        metadata
            .expect_fetch_metadata()
            .returning(|_| Err(unexpected("garbage")));
        let mut audio = MockAudioFetcher::new();
        audio
            .expect_download()
            .times(1)
            .returning(|_, destination: &Path| {
                std::fs::write(destination, b"audio").unwrap();
                Ok(())
            });
        let mut tagger = MockTagger::new();
        tagger.expect_tag().returning(|_, _| Ok(()));

        let fetcher = ItemFetcher::new(Box::new(metadata), Box::new(audio), Box::new(tagger));
        let result = fetcher.fetch("https://example.com/1", &destination).await;

        assert_eq!(result, ItemMetadata::default());
        assert!(destination.exists());
    }

    #[tokio::test]
    async fn test_download_failure_skips_tagging() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("ABC.mp3");

        let mut metadata = MockMetadataProvider::new();
        metadata
            .expect_fetch_metadata()
            .returning(|_| Ok(ItemMetadata::default()));
        let mut audio = MockAudioFetcher::new();
        audio
            .expect_download()
            .returning(|_, _| Err(unexpected("ERROR: Video unavailable")));
        let mut tagger = MockTagger::new();
        tagger.expect_tag().times(0);

        let fetcher = ItemFetcher::new(Box::new(metadata), Box::new(audio), Box::new(tagger));
        fetcher.fetch("https://example.com/1", &destination).await;

        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn test_tag_failure_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("ABC.mp3");

        let mut metadata = MockMetadataProvider::new();
        metadata.expect_fetch_metadata().returning(|_| {
            Ok(ItemMetadata {
                artist: Some("a".to_string()),
                ..ItemMetadata::default()
            })
        });
        let mut audio = MockAudioFetcher::new();
        audio.expect_download().returning(|_, destination: &Path| {
            std::fs::write(destination, b"audio").unwrap();
            Ok(())
        });
        let mut tagger = MockTagger::new();
        tagger.expect_tag().returning(|_, _| {
            Err(ToolError::NotFound {
                program: "id3tag".to_string(),
            })
        });

        let fetcher = ItemFetcher::new(Box::new(metadata), Box::new(audio), Box::new(tagger));
        fetcher.fetch("https://example.com/1", &destination).await;

        assert!(destination.exists());
    }
}
