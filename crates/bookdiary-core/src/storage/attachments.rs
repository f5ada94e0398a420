//! Attachment storage
//!
//! Cover images and note photos live outside the database, one file per blob
//! under `<data_dir>/attachments/`. Records only hold the
//! [`AttachmentHandle`]; the bytes are fetched on demand.
//!
//! Every `put` mints a fresh handle, so two writers never target the same
//! file. Blobs are written atomically and are never modified afterwards.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::models::AttachmentHandle;
use crate::storage::error::{StorageError, StorageResult};

/// File-backed blob store
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    dir: PathBuf,
}

impl AttachmentStore {
    /// Open the store rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::CreateDirectory {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Directory holding the blobs
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store a blob and return its handle
    pub fn put(&self, bytes: &[u8]) -> StorageResult<AttachmentHandle> {
        let handle = AttachmentHandle::new();
        let path = self.path_for(handle);
        atomic_write(&path, bytes)?;
        debug!("Stored attachment {} ({} bytes)", handle, bytes.len());
        Ok(handle)
    }

    /// Copy a file into the store and return its handle
    pub fn import(&self, source: &Path) -> StorageResult<AttachmentHandle> {
        let bytes = fs::read(source).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound {
                path: source.to_path_buf(),
            },
            _ => StorageError::ReadError {
                path: source.to_path_buf(),
                source: e,
            },
        })?;
        self.put(&bytes)
    }

    /// Read a blob back
    ///
    /// Returns `StorageError::NotFound` when no blob exists for the handle.
    pub fn get(&self, handle: AttachmentHandle) -> StorageResult<Vec<u8>> {
        let path = self.path_for(handle);
        fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound { path },
            _ => StorageError::ReadError { path, source: e },
        })
    }

    /// Check whether a blob exists for the handle
    pub fn contains(&self, handle: AttachmentHandle) -> bool {
        self.path_for(handle).is_file()
    }

    /// Delete a blob. Returns `false` if it was already gone.
    pub fn remove(&self, handle: AttachmentHandle) -> StorageResult<bool> {
        let path = self.path_for(handle);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed attachment {}", handle);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::from_io(e, path)),
        }
    }

    /// Handles of every stored blob
    pub fn handles(&self) -> StorageResult<Vec<AttachmentHandle>> {
        let entries = fs::read_dir(&self.dir).map_err(|source| StorageError::ReadError {
            path: self.dir.clone(),
            source,
        })?;

        let mut handles = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StorageError::ReadError {
                path: self.dir.clone(),
                source,
            })?;
            // Leftover temp files and foreign files are skipped
            if let Some(handle) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<AttachmentHandle>().ok())
            {
                handles.push(handle);
            }
        }
        Ok(handles)
    }

    /// Total bytes used by stored blobs
    pub fn total_size(&self) -> u64 {
        self.handles()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|handle| fs::metadata(self.path_for(handle)).ok())
            .map(|meta| meta.len())
            .sum()
    }

    fn path_for(&self, handle: AttachmentHandle) -> PathBuf {
        self.dir.join(handle.to_string())
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file =
        File::create(&temp_path).map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    file.write_all(data)
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    file.sync_all()
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|source| StorageError::AtomicWriteFailed {
        from: temp_path.clone(),
        to: path.to_path_buf(),
        source,
    })?;

    Ok(())
}
