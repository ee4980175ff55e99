//! Flat-directory file store (§4.1).
//!
//! A concrete filesystem backend (`tokio::fs`) generalized to a single
//! flat directory with no hierarchy, with durability (`sync_all` after
//! every write) and an optional verify-after-write readback check.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::FileStoreError;
use crate::hash::Checksum;

pub const MAX_NAME_LEN: usize = 255;

/// How a [`FileStore::write`] combines new bytes with any existing content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Append,
    Overwrite,
    CreateNew,
}

/// Point-in-time metadata for one file, computed on demand (never cached
/// on disk, per §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub size: u64,
    pub last_modified_millis: u128,
    pub checksum: Checksum,
}

/// One entry of [`FileStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub size: u64,
}

/// A flat directory of text files with serialized mutation and on-demand
/// checksums.
///
/// Concurrency: a single `tokio::sync::RwLock` guards the whole store — one
/// in-flight mutation at a time, with reads allowed to proceed concurrently
/// with other reads (Invariant 1 in §3, §4.1 "Concurrency").
pub struct FileStore {
    root: PathBuf,
    verify_writes: bool,
    guard: RwLock<()>,
}

impl FileStore {
    /// Opens (creating if necessary) a flat directory as a `FileStore`.
    pub async fn open(root: impl Into<PathBuf>, verify_writes: bool) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root, verify_writes, guard: RwLock::new(()) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validates a file name per §4.1: non-empty, no `..`, no path
    /// separators, at most [`MAX_NAME_LEN`] characters.
    pub fn validate_name(name: &str) -> Result<(), FileStoreError> {
        if name.is_empty()
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
            || name.len() > MAX_NAME_LEN
        {
            return Err(FileStoreError::InvalidArgument(name.to_string()));
        }
        Ok(())
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub async fn write(
        &self,
        name: &str,
        bytes: &[u8],
        mode: WriteMode,
    ) -> Result<(), FileStoreError> {
        Self::validate_name(name)?;
        let _guard = self.guard.write().await;
        let path = self.path_for(name);

        if mode == WriteMode::CreateNew && fs::metadata(&path).await.is_ok() {
            return Err(io_err(&path, io::Error::new(io::ErrorKind::AlreadyExists, "exists")));
        }

        let mut file = match mode {
            WriteMode::Append => fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(|e| io_err(&path, e))?,
            WriteMode::Overwrite | WriteMode::CreateNew => fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)
                .await
                .map_err(|e| io_err(&path, e))?,
        };
        file.write_all(bytes).await.map_err(|e| io_err(&path, e))?;
        file.flush().await.map_err(|e| io_err(&path, e))?;
        file.sync_all().await.map_err(|e| io_err(&path, e))?;
        drop(file);

        if self.verify_writes {
            let stored = fs::read(&path).await.map_err(|e| io_err(&path, e))?;
            let ok = match mode {
                WriteMode::Overwrite | WriteMode::CreateNew => stored == bytes,
                WriteMode::Append => stored.ends_with(bytes),
            };
            if !ok {
                warn!(file = name, "write verification failed");
                return Err(FileStoreError::WriteVerificationFailed(name.to_string()));
            }
        }
        debug!(file = name, bytes = bytes.len(), "write committed");
        Ok(())
    }

    pub async fn read(&self, name: &str) -> Result<Vec<u8>, FileStoreError> {
        Self::validate_name(name)?;
        let _guard = self.guard.read().await;
        let path = self.path_for(name);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FileStoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(io_err(&path, e)),
        }
    }

    pub async fn delete(&self, name: &str) -> Result<(), FileStoreError> {
        Self::validate_name(name)?;
        let _guard = self.guard.write().await;
        let path = self.path_for(name);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(file = name, "delete committed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FileStoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(io_err(&path, e)),
        }
    }

    /// Lists all files, sorted lexicographically by name.
    pub async fn list(&self) -> Result<Vec<ListEntry>, FileStoreError> {
        let _guard = self.guard.read().await;
        let mut entries = self.list_locked().await?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn list_locked(&self) -> Result<Vec<ListEntry>, FileStoreError> {
        let mut out = Vec::new();
        let mut dir = fs::read_dir(&self.root).await.map_err(|e| io_err(&self.root, e))?;
        while let Some(entry) =
            dir.next_entry().await.map_err(|e| io_err(&self.root, e))?
        {
            let meta = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            out.push(ListEntry { name, size: meta.len() });
        }
        Ok(out)
    }

    pub async fn metadata(&self, name: &str) -> Result<Option<FileMetadata>, FileStoreError> {
        Self::validate_name(name)?;
        let _guard = self.guard.read().await;
        self.metadata_locked(name).await
    }

    async fn metadata_locked(&self, name: &str) -> Result<Option<FileMetadata>, FileStoreError> {
        let path = self.path_for(name);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&path, e)),
        };
        let meta = fs::metadata(&path).await.map_err(|e| io_err(&path, e))?;
        let modified = meta.modified().unwrap_or(UNIX_EPOCH);
        let last_modified_millis =
            modified.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Ok(Some(FileMetadata {
            size: meta.len(),
            last_modified_millis,
            checksum: Checksum::of(&bytes),
        }))
    }

    /// All current file metadata, keyed by name.
    pub async fn all_metadata(
        &self,
    ) -> Result<std::collections::HashMap<String, FileMetadata>, FileStoreError> {
        let _guard = self.guard.read().await;
        let entries = self.list_locked().await?;
        let mut out = std::collections::HashMap::with_capacity(entries.len());
        for entry in entries {
            if let Some(meta) = self.metadata_locked(&entry.name).await? {
                out.insert(entry.name, meta);
            }
        }
        Ok(out)
    }
}

fn io_err(path: &Path, e: io::Error) -> FileStoreError {
    FileStoreError::Io { path: path.display().to_string(), message: e.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (TempDir, FileStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = FileStore::open(dir.path(), false).await.expect("open");
        (dir, store)
    }

    #[tokio::test]
    async fn read_after_overwrite_returns_written_bytes() {
        let (_dir, store) = store().await;
        store.write("a.txt", b"HELLO", WriteMode::Overwrite).await.unwrap();
        let back = store.read("a.txt").await.unwrap();
        assert_eq!(back, b"HELLO");
    }

    #[tokio::test]
    async fn append_extends_existing_content() {
        let (_dir, store) = store().await;
        store.write("a.txt", b"AB", WriteMode::Overwrite).await.unwrap();
        store.write("a.txt", b"CD", WriteMode::Append).await.unwrap();
        assert_eq!(store.read("a.txt").await.unwrap(), b"ABCD");
    }

    #[tokio::test]
    async fn create_new_fails_if_exists() {
        let (_dir, store) = store().await;
        store.write("a.txt", b"A", WriteMode::CreateNew).await.unwrap();
        let err = store.write("a.txt", b"B", WriteMode::CreateNew).await.unwrap_err();
        assert!(matches!(err, FileStoreError::Io { .. }));
    }

    #[tokio::test]
    async fn read_missing_file_is_not_found() {
        let (_dir, store) = store().await;
        let err = store.read("missing.txt").await.unwrap_err();
        assert_eq!(err, FileStoreError::NotFound("missing.txt".to_string()));
    }

    #[tokio::test]
    async fn delete_missing_file_is_not_found() {
        let (_dir, store) = store().await;
        let err = store.delete("missing.txt").await.unwrap_err();
        assert_eq!(err, FileStoreError::NotFound("missing.txt".to_string()));
    }

    #[tokio::test]
    async fn list_is_sorted_lexicographically() {
        let (_dir, store) = store().await;
        for name in ["c.txt", "a.txt", "b.txt"] {
            store.write(name, b"x", WriteMode::Overwrite).await.unwrap();
        }
        let names: Vec<_> = store.list().await.unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[tokio::test]
    async fn name_validation_rejects_bad_names() {
        let (_dir, store) = store().await;
        for bad in ["", "..", "a/b", "a\\b", &"x".repeat(256)] {
            let err = store.write(bad, b"x", WriteMode::Overwrite).await.unwrap_err();
            assert!(matches!(err, FileStoreError::InvalidArgument(_)), "name {bad:?}");
        }
    }

    #[tokio::test]
    async fn verify_writes_catches_mismatch_by_checking_readback() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path(), true).await.unwrap();
        // Under normal operation verification always succeeds; this just
        // exercises the success path since we cannot tamper with the
        // underlying disk mid-write from a unit test.
        store.write("a.txt", b"DATA", WriteMode::Overwrite).await.unwrap();
        assert_eq!(store.read("a.txt").await.unwrap(), b"DATA");
    }

    #[tokio::test]
    async fn checksum_reflects_current_bytes() {
        let (_dir, store) = store().await;
        store.write("a.txt", b"ONE", WriteMode::Overwrite).await.unwrap();
        let meta_one = store.metadata("a.txt").await.unwrap().unwrap();
        store.write("a.txt", b"TWO", WriteMode::Overwrite).await.unwrap();
        let meta_two = store.metadata("a.txt").await.unwrap().unwrap();
        assert_ne!(meta_one.checksum, meta_two.checksum);
    }
}
