use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use color_eyre::Result;
use rand::Rng;

use crate::database::Database;
use crate::fetcher::ItemFetcher;
use crate::file_hash;
use crate::file_index::FileIndex;
use crate::ports::PlaylistLister;
use crate::track_metadata::derive_file_name;

const TEMP_NAME_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const TEMP_NAME_LENGTH: usize = 15;

/// What one run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Untracked audio files deleted before syncing
    pub pruned: usize,
    /// Entries reported by the playlist listing
    pub listed: usize,
    pub downloaded: usize,
    /// Entries already on disk
    pub skipped: usize,
    pub failed: usize,
    pub renamed: usize,
    pub interrupted: bool,
}

/// Keeps a directory of audio files in step with a remote playlist.
pub struct Reconciler {
    db: Arc<Database>,
    output_dir: PathBuf,
    backup_path: PathBuf,
    lister: Box<dyn PlaylistLister>,
    fetcher: ItemFetcher,
    /// Extension of downloaded audio files, without the dot
    file_extension: String,
}

fn random_name() -> String {
    let mut rng = rand::rng();
    (0..TEMP_NAME_LENGTH)
        .map(|_| TEMP_NAME_CHARSET[rng.random_range(0..TEMP_NAME_CHARSET.len())] as char)
        .collect()
}

/// A random name for a download whose final name is not known yet.
fn random_file_name(extension: &str) -> String {
    format!("{}.{}", random_name(), extension)
}

impl Reconciler {
    pub fn new(
        db: Arc<Database>,
        output_dir: PathBuf,
        backup_path: PathBuf,
        lister: Box<dyn PlaylistLister>,
        fetcher: ItemFetcher,
        file_extension: String,
    ) -> Self {
        Self {
            db,
            output_dir,
            backup_path,
            lister,
            fetcher,
            file_extension,
        }
    }

    /// Sync `playlist_url` into the output directory.
    ///
    /// The rename pass and the store backup run after the sync whether it
    /// finished, failed, or was cut short by `interrupt` resolving.
    pub async fn run<F>(&self, playlist_url: &str, interrupt: F) -> Result<SyncReport>
    where
        F: Future<Output = ()>,
    {
        let mut report = SyncReport::default();

        let outcome = {
            let sync = self.sync(playlist_url, &mut report);
            tokio::pin!(sync);
            tokio::select! {
                biased;
                () = interrupt => None,
                result = &mut sync => Some(result),
            }
        };

        if outcome.is_none() {
            log::warn!("Interrupted, renaming files before exiting");
            report.interrupted = true;
        }

        report.renamed = self.finalize().await;

        match outcome {
            Some(Err(e)) => Err(e),
            _ => Ok(report),
        }
    }

    async fn sync(&self, playlist_url: &str, report: &mut SyncReport) -> Result<()> {
        let mut index = FileIndex::scan(&self.output_dir)?;
        log::info!(
            "Found {} audio files in {}",
            index.len(),
            self.output_dir.display()
        );

        report.pruned = self.prune_untracked(&mut index).await;

        let urls = match self.lister.list_item_urls(playlist_url).await {
            Ok(urls) => urls,
            Err(e) => {
                log::error!("Could not list playlist {}: {}", playlist_url, e);
                Vec::new()
            }
        };
        report.listed = urls.len();

        for (position, url) in urls.iter().enumerate() {
            let position = position as i64;
            log::info!("{} {}", position, url);

            if self.skip_if_present(url, position, &index).await {
                report.skipped += 1;
                continue;
            }

            match self.download_item(url, position, &mut index).await {
                Some(file_name) => {
                    log::info!("Saved {} as {}", url, file_name);
                    report.downloaded += 1;
                }
                None => report.failed += 1,
            }
        }

        log::info!(
            "Playlist synced: {} downloaded, {} already present, {} failed",
            report.downloaded,
            report.skipped,
            report.failed
        );
        Ok(())
    }

    /// Delete indexed files no tracked item refers to. Returns how many were deleted.
    async fn prune_untracked(&self, index: &mut FileIndex) -> usize {
        let mut untracked = Vec::new();
        for (digest, path) in index.entries() {
            match self.db.get_by_digest(digest).await {
                Ok(Some(_)) => {}
                Ok(None) => untracked.push((digest.clone(), path.clone())),
                Err(e) => log::error!("Keeping {}: {:#}", path.display(), e),
            }
        }

        let mut pruned = 0;
        for (digest, path) in untracked {
            log::info!("Unknown file, deleting {}", path.display());
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    index.remove(&digest);
                    pruned += 1;
                }
                Err(e) => log::error!("Failed to delete {}: {}", path.display(), e),
            }
        }
        pruned
    }

    /// When `url` is tracked and its file is on disk, record its new position
    /// and return true.
    async fn skip_if_present(&self, url: &str, position: i64, index: &FileIndex) -> bool {
        let item = match self.db.get_by_external_id(url).await {
            Ok(Some(item)) => item,
            Ok(None) => return false,
            Err(e) => {
                log::error!("{:#}", e);
                return false;
            }
        };

        if index.path_for_digest(&item.content_digest).is_none() {
            log::info!("File for {} is missing, downloading again", url);
            return false;
        }

        log::info!("File already downloaded {}", url);
        if let Err(e) = self.db.move_to_position(item.id, position).await {
            log::error!("Could not update position of {}: {:#}", url, e);
        }
        true
    }

    /// Download, hash and record one item. Returns the stored file name.
    async fn download_item(
        &self,
        url: &str,
        position: i64,
        index: &mut FileIndex,
    ) -> Option<String> {
        let path = self.output_dir.join(random_file_name(&self.file_extension));
        let metadata = self.fetcher.fetch(url, &path).await;

        if !path.is_file() {
            log::error!("No file was downloaded for {}", url);
            return None;
        }

        let digest = match file_hash::compute_sha1(&path) {
            Ok(digest) => digest,
            Err(e) => {
                log::error!("{:#}", e);
                return None;
            }
        };
        let file_name = derive_file_name(&metadata, url, &self.file_extension);

        if let Err(e) = self.db.upsert(url, &file_name, &digest, position).await {
            log::error!("Could not record {}: {:#}", url, e);
            return None;
        }

        index.insert(digest, path);
        Some(file_name)
    }

    async fn finalize(&self) -> usize {
        let renamed = self.rename_tracked_files().await;

        if let Err(e) = self.db.backup_to(&self.backup_path).await {
            log::error!("Backup failed: {:#}", e);
        }
        renamed
    }

    /// Rename every tracked file to `NNN-<file name>`, numbered from 1 in
    /// position order. Returns how many files now carry their numbered name.
    pub async fn rename_tracked_files(&self) -> usize {
        let rows = match self.db.list_ordered_by_position().await {
            Ok(rows) => rows,
            Err(e) => {
                log::error!("Could not read positions: {:#}", e);
                return 0;
            }
        };
        let index = match FileIndex::scan(&self.output_dir) {
            Ok(index) => index,
            Err(e) => {
                log::error!("Could not scan {}: {:#}", self.output_dir.display(), e);
                return 0;
            }
        };

        // Move everything aside first so no target name is still taken. Staged
        // names keep an audio extension so a later scan still finds them.
        let mut claimed: HashSet<&str> = HashSet::new();
        let mut pending: Vec<(PathBuf, PathBuf, PathBuf)> = Vec::new();
        let mut renamed = 0;
        for (number, row) in rows.iter().enumerate().map(|(i, row)| (i + 1, row)) {
            let target = self
                .output_dir
                .join(format!("{:03}-{}", number, row.file_name));

            let Some(current) = index.path_for_digest(&row.content_digest) else {
                log::warn!(
                    "Could not find file with digest {} for {}",
                    row.content_digest,
                    row.file_name
                );
                continue;
            };
            if !claimed.insert(row.content_digest.as_str()) {
                log::warn!("{} is tracked twice, skipping", current.display());
                continue;
            }
            if current == target {
                renamed += 1;
                continue;
            }

            let extension = current
                .extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or(self.file_extension.as_str());
            let staging = self.output_dir.join(format!(
                ".{:03}-{}.rename-pending.{}",
                number,
                random_name(),
                extension
            ));
            match std::fs::rename(current, &staging) {
                Ok(()) => pending.push((current.to_path_buf(), staging, target)),
                Err(e) => log::error!("Failed to move {}: {}", current.display(), e),
            }
        }

        for (original, staging, target) in pending {
            match std::fs::rename(&staging, &target) {
                Ok(()) => {
                    log::info!("Renamed to {}", file_display_name(&target));
                    renamed += 1;
                }
                Err(e) => {
                    log::error!(
                        "Failed to rename {} to {}: {}",
                        staging.display(),
                        target.display(),
                        e
                    );
                    restore_staged(&staging, &original);
                }
            }
        }

        renamed
    }
}

/// Put a staged file back where it was found, unless that name is taken by now.
fn restore_staged(staging: &Path, original: &Path) {
    if original.exists() {
        log::warn!(
            "{} is taken, leaving {} in place",
            original.display(),
            staging.display()
        );
        return;
    }

    match std::fs::rename(staging, original) {
        Ok(()) => log::info!("Moved {} back", file_display_name(original)),
        Err(e) => log::error!(
            "Failed to move {} back to {}: {}",
            staging.display(),
            original.display(),
            e
        ),
    }
}

fn file_display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
