use std::os::unix::fs::PermissionsExt;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tracing::instrument;

/// Copies the file at `src` into a new file at `dst`.
///
/// `dst` is opened with create-or-fail semantics and the permission bits of `src` (the process
/// umask still applies), so an existing `dst` - including one that shows up while we work - is
/// an error, never overwritten. On error `dst` may be left partially written. Both handles are
/// closed when this returns.
#[instrument(level = "debug")]
pub async fn create_from(src: &std::path::Path, dst: &std::path::Path) -> Result<()> {
    let src_metadata = tokio::fs::metadata(src)
        .await
        .with_context(|| format!("failed reading metadata from {:?}", &src))?;
    let mut reader = tokio::fs::File::open(src)
        .await
        .with_context(|| format!("cannot open {:?} for reading", &src))?;
    let mode = src_metadata.permissions().mode() & 0o7777;
    tracing::debug!("creating {:?} with mode {:o}", dst, mode);
    let mut writer = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .open(dst)
        .await
        .with_context(|| format!("cannot create {:?}", &dst))?;
    tokio::io::copy(&mut reader, &mut writer)
        .await
        .with_context(|| format!("failed copying {:?} to {:?}", &src, &dst))?;
    // tokio finishes pending writes in the background unless flushed
    writer
        .flush()
        .await
        .with_context(|| format!("failed writing {:?}", &dst))?;
    Ok(())
}
