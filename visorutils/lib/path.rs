//! `visorutils::path` is a module containing path utilities for the dhcpvisor project.

use std::path::{Path, PathBuf};

use crate::{VisorutilsError, VisorutilsResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The suffix for log files
pub const LOG_SUFFIX: &str = "log";

/// The suffix for pid files
pub const PID_SUFFIX: &str = "pid";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Resolves the path of a binary, preferring the path named by `env_var` over `default_path`.
///
/// The resolved path must exist, otherwise [`VisorutilsError::BinaryNotFound`] is returned with a
/// note saying where the path came from.
pub fn resolve_env_path(env_var: &str, default_path: impl AsRef<Path>) -> VisorutilsResult<PathBuf> {
    let (path, source) = match std::env::var(env_var) {
        Ok(value) if !value.is_empty() => (PathBuf::from(value), format!("environment variable {}", env_var)),
        _ => (default_path.as_ref().to_path_buf(), "default path".to_string()),
    };

    if !path.exists() {
        return Err(VisorutilsError::BinaryNotFound(
            path.display().to_string(),
            source,
        ));
    }

    Ok(path)
}

/// Reads a pid previously written with [`write_pid_file`].
///
/// Returns `None` if the file is missing or does not contain a pid.
pub async fn read_pid_file(path: impl AsRef<Path>) -> Option<u32> {
    let contents = tokio::fs::read_to_string(path.as_ref()).await.ok()?;
    contents.trim().parse().ok()
}

/// Writes `pid` to `path`, creating the parent directory if needed.
pub async fn write_pid_file(path: impl AsRef<Path>, pid: u32) -> VisorutilsResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    tokio::fs::write(path, pid.to_string()).await?;
    Ok(())
}

/// Removes a pid file, ignoring a file that is already gone.
pub async fn remove_pid_file(path: impl AsRef<Path>) -> VisorutilsResult<()> {
    match tokio::fs::remove_file(path.as_ref()).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
