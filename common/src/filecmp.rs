use anyhow::{Context, Result};
use tracing::instrument;

/// Returns `true` if the files named by `path1` and `path2` hold exactly the same bytes.
///
/// Sizes are compared first, files of different length are never read. Any failure to stat or
/// read either file is returned as an error, it is never taken to mean "different".
#[instrument(level = "debug")]
pub async fn identical(path1: &std::path::Path, path2: &std::path::Path) -> Result<bool> {
    let metadata1 = tokio::fs::metadata(path1)
        .await
        .with_context(|| format!("failed reading metadata from {:?}", &path1))?;
    let metadata2 = tokio::fs::metadata(path2)
        .await
        .with_context(|| format!("failed reading metadata from {:?}", &path2))?;
    if metadata1.len() != metadata2.len() {
        tracing::debug!("sizes differ, skipping content check");
        return Ok(false);
    }
    // TODO: compare in fixed-size chunks instead of reading both files into memory
    let contents1 = tokio::fs::read(path1)
        .await
        .with_context(|| format!("failed reading {:?}", &path1))?;
    let contents2 = tokio::fs::read(path2)
        .await
        .with_context(|| format!("failed reading {:?}", &path2))?;
    Ok(contents1 == contents2)
}

/// What the backup slot of a destination file holds, relative to that destination.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BackupState {
    /// nothing at the backup path
    Missing,
    /// same bytes as the destination
    Matches,
    /// content differs from the destination
    Differs,
    /// something is there but it could not be compared
    Unknown,
}

impl BackupState {
    /// Replacing the backup with the current destination loses nothing.
    pub fn is_replaceable(self) -> bool {
        matches!(self, BackupState::Missing | BackupState::Matches)
    }

    /// The backup holds, or may hold, content the operator has not reviewed yet.
    pub fn needs_review(self) -> bool {
        matches!(self, BackupState::Differs | BackupState::Unknown)
    }
}

/// Best-effort check of `backup` against the current content of `dst`.
///
/// Never fails: an error while comparing yields [`BackupState::Unknown`] and is only logged at
/// debug level.
#[instrument(level = "debug")]
pub async fn backup_state(dst: &std::path::Path, backup: &std::path::Path) -> BackupState {
    match tokio::fs::symlink_metadata(backup).await {
        Ok(_) => {}
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return BackupState::Missing;
        }
        Err(error) => {
            tracing::debug!("cannot read metadata of backup {:?}: {}", backup, &error);
            return BackupState::Unknown;
        }
    }
    match identical(dst, backup).await {
        Ok(true) => BackupState::Matches,
        Ok(false) => BackupState::Differs,
        Err(error) => {
            tracing::debug!("cannot compare {:?} with backup {:?}: {:#}", dst, backup, &error);
            BackupState::Unknown
        }
    }
}
