//! Durable lock-file writes.
//!
//! The lock file is the one durability boundary of the core: a new
//! version is written to a sibling temp path, fsynced, then renamed over
//! the old file, so a failure at any point leaves the previous content in
//! place. On top of that, [`replace_lock_file`] restores the previous
//! bytes if the replacement fails late, and a failing restore is carried
//! alongside the original failure.

use std::path::{Path, PathBuf};

use lode_config::lock_file::{LockFile, LOCK_FILE_NAME};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

pub fn lock_file_path(root: &Path) -> PathBuf {
    root.join(LOCK_FILE_NAME)
}

pub async fn read_lock_file_bytes(root: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(lock_file_path(root)).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io("failed to read lock file", e)),
    }
}

/// Serializes and durably persists `file` at `root`.
pub async fn persist_lock_file(root: &Path, file: &LockFile) -> Result<()> {
    let mut content = Vec::new();
    file.write(&mut content)?;

    let final_path = lock_file_path(root);
    let temp_path = root.join(format!("{LOCK_FILE_NAME}.tmp"));

    let mut temp = fs::File::create(&temp_path)
        .await
        .map_err(|e| Error::io(format!("failed to create {}", temp_path.display()), e))?;
    let write_result = async {
        temp.write_all(&content)
            .await
            .map_err(|e| Error::io("failed to write lock file", e))?;
        temp.sync_all()
            .await
            .map_err(|e| Error::io("failed to sync lock file", e))
    }
    .await;
    drop(temp);
    if let Err(e) = write_result {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }

    fs::rename(&temp_path, &final_path)
        .await
        .map_err(|e| Error::io("failed to move lock file into place", e))
}

/// Replaces the lock file, reverting to the previous content when the
/// replacement fails. The revert failure, if any, joins the original
/// error.
pub async fn replace_lock_file(root: &Path, file: &LockFile) -> Result<()> {
    let previous = read_lock_file_bytes(root).await?;
    match persist_lock_file(root, file).await {
        Ok(()) => Ok(()),
        Err(cause) => match restore_previous(root, previous).await {
            Ok(()) => Err(Error::LockUpdate {
                cause: Box::new(cause),
            }),
            Err(revert) => Err(Error::LockUpdateAndRevert {
                cause: Box::new(cause),
                revert: Box::new(revert),
            }),
        },
    }
}

/// Best-effort direct rewrite of the pre-update content.
async fn restore_previous(root: &Path, previous: Option<Vec<u8>>) -> Result<()> {
    let path = lock_file_path(root);
    match previous {
        Some(bytes) => fs::write(&path, bytes)
            .await
            .map_err(|e| Error::io("failed to restore previous lock file", e)),
        None => match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io("failed to remove partial lock file", e)),
        },
    }
}
