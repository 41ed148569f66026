use std::collections::HashMap;
use std::path::{Path, PathBuf};

use color_eyre::{Result, eyre::Context};
use walkdir::WalkDir;

use crate::file_hash;

/// File extensions treated as audio when scanning the destination directory.
/// Matching is case sensitive.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "3gp", "aa", "aac", "aax", "act", "aiff", "amr", "ape", "au", "awb", "dct", "dss", "dvf",
    "flac", "gsm", "iklax", "ivs", "m4a", "m4b", "m4p", "mmf", "mp3", "mpc", "msv", "nmf", "nsf",
    "ogg", "oga", "mogg", "opus", "ra", "rm", "raw", "sln", "tta", "vox", "wav", "wma", "wv",
    "webm", "8svx",
];

/// Maps content digests to the audio files in a single directory.
#[derive(Debug, Default)]
pub struct FileIndex {
    by_digest: HashMap<String, PathBuf>,
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext))
}

impl FileIndex {
    /// Scan `directory` (not recursively) and hash every audio file in it.
    ///
    /// Files are visited in file name order. When a file has the same digest
    /// as one seen earlier in the scan it is deleted and the first file is kept.
    /// Files that cannot be hashed or deleted are logged and skipped.
    pub fn scan(directory: &Path) -> Result<Self> {
        log::debug!("Scanning {} for audio files", directory.display());

        let mut by_digest: HashMap<String, PathBuf> = HashMap::new();

        for entry in WalkDir::new(directory)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry =
                entry.context(format!("Failed to read directory: {}", directory.display()))?;
            let path = entry.path();
            if !entry.file_type().is_file() || !is_audio_file(path) {
                continue;
            }

            let digest = match file_hash::compute_sha1(path) {
                Ok(digest) => digest,
                Err(e) => {
                    log::warn!("Skipping {}: {:#}", path.display(), e);
                    continue;
                }
            };

            if let Some(existing) = by_digest.get(&digest) {
                log::info!(
                    "Duplicate of {}, deleting {}",
                    existing.display(),
                    path.display()
                );
                if let Err(e) = std::fs::remove_file(path) {
                    log::error!("Failed to delete duplicate {}: {}", path.display(), e);
                }
                continue;
            }

            by_digest.insert(digest, path.to_path_buf());
        }

        log::debug!(
            "Indexed {} audio files in {}",
            by_digest.len(),
            directory.display()
        );
        Ok(FileIndex { by_digest })
    }

    pub fn path_for_digest(&self, digest: &str) -> Option<&Path> {
        self.by_digest.get(digest).map(PathBuf::as_path)
    }

    /// Record a file added to the directory after the scan.
    pub fn insert(&mut self, digest: String, path: PathBuf) {
        self.by_digest.entry(digest).or_insert(path);
    }

    pub fn remove(&mut self, digest: &str) -> Option<PathBuf> {
        self.by_digest.remove(digest)
    }

    pub fn entries(&self) -> &HashMap<String, PathBuf> {
        &self.by_digest
    }

    pub fn len(&self) -> usize {
        self.by_digest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_digest.is_empty()
    }
}
