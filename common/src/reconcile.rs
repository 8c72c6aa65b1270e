use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use async_recursion::async_recursion;

use crate::create;
use crate::filecmp;
use crate::observe::{Observation, Observer};

/// Appended to a destination path to form its (single) backup slot.
pub const BACKUP_SUFFIX: &str = ".upmerge~";
/// Source files whose path ends with this byte are editor leftovers and never propagated.
pub const IGNORE_SUFFIX: u8 = b'~';

pub const DEFAULT_SRC: &str = "/usr/local/upmerge/etc";
pub const DEFAULT_DST: &str = "/etc";

/// Raised instead of replacing a backup whose content was never reviewed.
#[derive(Debug, thiserror::Error)]
#[error("refusing operation: backup {backup:?} differs from {dst:?}")]
pub struct Refusal {
    pub backup: PathBuf,
    pub dst: PathBuf,
}

/// Error type for a reconciliation that preserves the summary of the work done before it aborted.
///
/// Display shows the full error chain.
#[derive(Debug, thiserror::Error)]
#[error("{source:#}")]
pub struct Error {
    #[source]
    pub source: anyhow::Error,
    pub summary: Summary,
}

impl Error {
    #[must_use]
    pub fn new(source: anyhow::Error, summary: Summary) -> Self {
        Error { source, summary }
    }

    /// The refusal that stopped the run, if it was stopped by one rather than by a filesystem error.
    pub fn refusal(&self) -> Option<&Refusal> {
        self.source
            .chain()
            .find_map(|cause| cause.downcast_ref::<Refusal>())
    }

    pub fn is_refusal(&self) -> bool {
        self.refusal().is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// root of the override tree, never modified
    pub src: PathBuf,
    /// root of the tree the overrides are applied to
    pub dst: PathBuf,
    /// decide and report everything but touch nothing
    pub dry_run: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            src: PathBuf::from(DEFAULT_SRC),
            dst: PathBuf::from(DEFAULT_DST),
            dry_run: false,
        }
    }
}

/// Counts of what a run did. In a dry run these count what it would have done.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub bytes_copied: u64,
    pub files_copied: usize,
    pub files_unchanged: usize,
    pub files_ignored: usize,
    pub files_backed_up: usize,
    pub backups_to_check: usize,
    pub directories_created: usize,
    pub directories_unchanged: usize,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "bytes copied: {}\n\
            files copied: {}\n\
            files unchanged: {}\n\
            files ignored: {}\n\
            files backed up: {}\n\
            backups to check: {}\n\
            directories created: {}\n\
            directories unchanged: {}",
            bytesize::ByteSize(self.bytes_copied),
            self.files_copied,
            self.files_unchanged,
            self.files_ignored,
            self.files_backed_up,
            self.backups_to_check,
            self.directories_created,
            self.directories_unchanged,
        )
    }
}

/// Backup slot of `dst`: the full path with [`BACKUP_SUFFIX`] appended.
pub fn backup_path(dst: &Path) -> PathBuf {
    let mut path = dst.as_os_str().to_owned();
    path.push(BACKUP_SUFFIX);
    PathBuf::from(path)
}

pub fn is_ignored(src: &Path) -> bool {
    src.as_os_str().as_bytes().last() == Some(&IGNORE_SUFFIX)
}

/// Walks the tree at `settings.src` depth-first and brings `settings.dst` in line with it.
///
/// Directories are mirrored, new files are created, files that differ are moved to their backup
/// slot and replaced. Nothing is ever deleted. The walk stops at the first error; everything done
/// up to that point stays done and is counted in the returned error's summary. A backup whose
/// content differs from the destination it would be regenerated from stops the walk with a
/// [`Refusal`].
///
/// Two runs against the same destination must not overlap.
pub async fn reconcile(settings: &Settings, observer: &dyn Observer) -> Result<Summary, Error> {
    let mut summary = Summary::default();
    match reconcile_entry(settings, observer, &settings.src, &settings.dst, &mut summary).await {
        Ok(()) => Ok(summary),
        Err(error) => Err(Error::new(error, summary)),
    }
}

#[async_recursion]
async fn reconcile_entry(
    settings: &Settings,
    observer: &dyn Observer,
    src: &Path,
    dst: &Path,
    summary: &mut Summary,
) -> anyhow::Result<()> {
    let src_metadata = tokio::fs::symlink_metadata(src)
        .await
        .with_context(|| format!("failed reading metadata from {:?}", &src))?;
    if src_metadata.is_dir() {
        return reconcile_dir(settings, observer, src, &src_metadata, dst, summary).await;
    }
    if is_ignored(src) {
        observer.observe(Observation::Ignored {
            src: src.to_owned(),
        });
        summary.files_ignored += 1;
        return Ok(());
    }
    let src_metadata = if src_metadata.is_symlink() {
        tokio::fs::metadata(src)
            .await
            .with_context(|| format!("failed following symlink {:?}", &src))?
    } else {
        src_metadata
    };
    if !src_metadata.is_file() {
        return Err(anyhow!(
            "unsupported source file type {:?} at {:?}",
            src_metadata.file_type(),
            src
        ));
    }
    reconcile_file(settings, observer, src, &src_metadata, dst, summary).await
}

async fn reconcile_dir(
    settings: &Settings,
    observer: &dyn Observer,
    src: &Path,
    src_metadata: &std::fs::Metadata,
    dst: &Path,
    summary: &mut Summary,
) -> anyhow::Result<()> {
    let created = if settings.dry_run {
        match tokio::fs::metadata(dst).await {
            Ok(dst_metadata) => {
                ensure_dir(dst, &dst_metadata)?;
                false
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => true,
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed reading metadata from {:?}", &dst));
            }
        }
    } else {
        let mode = src_metadata.permissions().mode() & 0o7777;
        match tokio::fs::DirBuilder::new().mode(mode).create(dst).await {
            Ok(()) => true,
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
                let dst_metadata = tokio::fs::metadata(dst)
                    .await
                    .with_context(|| format!("failed reading metadata from {:?}", &dst))?;
                ensure_dir(dst, &dst_metadata)?;
                false
            }
            Err(error) => {
                return Err(error).with_context(|| format!("cannot create directory {:?}", &dst));
            }
        }
    };
    if created {
        observer.observe(Observation::DirectoryCreated {
            dst: dst.to_owned(),
        });
        summary.directories_created += 1;
    } else {
        summary.directories_unchanged += 1;
    }
    let mut entries = tokio::fs::read_dir(src)
        .await
        .with_context(|| format!("cannot open directory {:?} for reading", &src))?;
    let mut names = vec![];
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed traversing directory {:?}", &src))?
    {
        names.push(entry.file_name());
    }
    // ReadDir holds a file descriptor, release it before descending
    drop(entries);
    names.sort();
    for name in names {
        reconcile_entry(
            settings,
            observer,
            &src.join(&name),
            &dst.join(&name),
            summary,
        )
        .await?;
    }
    Ok(())
}

fn ensure_dir(dst: &Path, dst_metadata: &std::fs::Metadata) -> anyhow::Result<()> {
    if !dst_metadata.is_dir() {
        return Err(anyhow!(
            "destination {:?} exists but is not a directory",
            dst
        ));
    }
    Ok(())
}

async fn reconcile_file(
    settings: &Settings,
    observer: &dyn Observer,
    src: &Path,
    src_metadata: &std::fs::Metadata,
    dst: &Path,
    summary: &mut Summary,
) -> anyhow::Result<()> {
    let dst_metadata = match tokio::fs::metadata(dst).await {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            // new override, there is nothing to back up
            if !settings.dry_run {
                create::create_from(src, dst).await?;
            }
            observe_copy(observer, src, src_metadata, dst, summary);
            return Ok(());
        }
        Err(error) => {
            return Err(error).with_context(|| format!("failed reading metadata from {:?}", &dst));
        }
    };
    if !dst_metadata.is_file() {
        return Err(anyhow!(
            "destination {:?} exists but is not a regular file",
            dst
        ));
    }
    let backup = backup_path(dst);
    if filecmp::identical(src, dst).await? {
        observer.observe(Observation::AlreadyOk {
            src: src.to_owned(),
            dst: dst.to_owned(),
        });
        summary.files_unchanged += 1;
        if filecmp::backup_state(dst, &backup).await.needs_review() {
            observer.observe(Observation::NeedsCheck { backup });
            summary.backups_to_check += 1;
        }
        return Ok(());
    }
    if !settings.dry_run {
        if !filecmp::backup_state(dst, &backup).await.is_replaceable() {
            tracing::error!("refusing to overwrite backup: {}", backup.display());
            return Err(Refusal {
                backup,
                dst: dst.to_owned(),
            }
            .into());
        }
        tokio::fs::rename(dst, &backup)
            .await
            .with_context(|| format!("failed moving {:?} to {:?}", &dst, &backup))?;
    }
    observer.observe(Observation::MovedToBackup {
        dst: dst.to_owned(),
        backup,
    });
    summary.files_backed_up += 1;
    if !settings.dry_run {
        create::create_from(src, dst).await?;
    }
    observe_copy(observer, src, src_metadata, dst, summary);
    Ok(())
}

fn observe_copy(
    observer: &dyn Observer,
    src: &Path,
    src_metadata: &std::fs::Metadata,
    dst: &Path,
    summary: &mut Summary,
) {
    observer.observe(Observation::Copied {
        src: src.to_owned(),
        dst: dst.to_owned(),
    });
    summary.files_copied += 1;
    summary.bytes_copied += src_metadata.len();
}
