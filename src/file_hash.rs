use color_eyre::{Result, eyre::Context};
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const BLOCK_SIZE: usize = 64 * 1024;

/// Compute the hex encoded SHA-1 digest of a file's contents
pub fn compute_sha1(path: &Path) -> Result<String> {
    log::debug!("Computing SHA-1 digest for: {}", path.display());

    let mut file = File::open(path).context(format!("Failed to open file: {}", path.display()))?;

    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; BLOCK_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .context(format!("Failed to read file: {}", path.display()))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    let digest = format!("{:x}", hasher.finalize());
    log::debug!("Digest computed for {}: {}", path.display(), digest);
    Ok(digest)
}
