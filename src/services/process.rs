use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Output;

use tokio::process::Command;

use crate::ports::ToolError;

/// Resolve `program` on `PATH` (or as given, when it is a path).
pub fn resolve(program: &Path) -> Result<PathBuf, ToolError> {
    which::which(program).map_err(|_| ToolError::NotFound {
        program: program.display().to_string(),
    })
}

/// Run `program` to completion and capture its output.
///
/// A non-zero exit status is logged but still returns the output, since the
/// downloader exits non-zero when only some of its work failed. Callers use
/// [`failure`] when the output holds nothing they can use.
pub async fn run<I, S>(program: &Path, args: I) -> Result<Output, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let resolved = resolve(program)?;
    let args: Vec<S> = args.into_iter().collect();

    log::debug!(
        "Running `{}` with arguments: {:?}",
        resolved.display(),
        args.iter().map(|a| a.as_ref()).collect::<Vec<_>>()
    );

    let output = Command::new(&resolved)
        .args(&args)
        .output()
        .await
        .map_err(|source| ToolError::Spawn {
            program: program.display().to_string(),
            source,
        })?;

    if !output.status.success() {
        log::warn!(
            "`{}` exited with {}: {}",
            program.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(output)
}

/// The error for a run whose output could not be used.
pub fn failure(program: &Path, output: &Output) -> ToolError {
    ToolError::Failed {
        program: program.display().to_string(),
        status: output.status,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

/// Write an executable shell script for tests that need a stand-in tool.
#[cfg(all(test, unix))]
pub fn fake_program(dir: &Path, name: &str, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
