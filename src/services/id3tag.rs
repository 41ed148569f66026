use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::ports::{Tagger, ToolError};
use crate::services::process;
use crate::track_metadata::ItemMetadata;

/// Tags files with the `id3tag` command line tool.
pub struct Id3Tag {
    program: PathBuf,
}

impl Id3Tag {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }
}

/// Arguments for tagging `path`, or `None` when there is nothing to write.
fn tag_args(path: &Path, metadata: &ItemMetadata) -> Option<Vec<OsString>> {
    let mut args: Vec<OsString> = Vec::new();
    if let Some(artist) = &metadata.artist {
        args.push(format!("--artist={}", artist).into());
    }
    if let Some(track) = &metadata.track {
        args.push(format!("--song={}", track).into());
    }
    if args.is_empty() {
        return None;
    }

    args.push(path.as_os_str().to_owned());
    Some(args)
}

#[async_trait::async_trait]
impl Tagger for Id3Tag {
    async fn tag(&self, path: &Path, metadata: &ItemMetadata) -> Result<(), ToolError> {
        let Some(args) = tag_args(path, metadata) else {
            log::debug!("No tags to write for {}", path.display());
            return Ok(());
        };

        let output = process::run(&self.program, args).await?;
        if !output.status.success() {
            return Err(process::failure(&self.program, &output));
        }
        log::debug!("Tagged {}", path.display());
        Ok(())
    }
}
