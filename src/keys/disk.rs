//! On-disk key-set cache.
//!
//! Each key set is stored as `<data_dir>/<namespace>/key_<sha256(key_id)>.json`.
//! Files are written with the write-to-temp-then-rename pattern:
//!
//! 1. Write to `key_<hash>.json.tmp`
//! 2. fsync the temp file
//! 3. Rename to `key_<hash>.json`
//! 4. fsync the directory
//!
//! A concurrent reader therefore sees either the old file, the new file, or no
//! file, never a partial write.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::types::KeyId;

/// A namespace directory holding cached key-set documents.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(data_dir: impl AsRef<Path>, namespace: &str) -> Self {
        DiskCache {
            dir: data_dir.as_ref().join(namespace),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the cache file for a key identifier.
    pub fn path_for(&self, key_id: &KeyId) -> PathBuf {
        self.dir.join(format!("key_{}.json", key_id.digest_hex()))
    }

    /// Reads a cached document, returning `None` if no file exists.
    pub fn load(&self, key_id: &KeyId) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key_id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Durably stores a document, replacing any previous one.
    pub fn store(&self, key_id: &KeyId, document: &[u8]) -> io::Result<()> {
        create_private_dir(&self.dir)?;

        let path = self.path_for(key_id);
        let temp_path = path.with_extension("json.tmp");

        let mut file = create_private_file(&temp_path)?;
        file.write_all(document)?;
        fsync_file(&file)?;
        drop(file);

        fs::rename(&temp_path, &path)?;
        fsync_dir(&self.dir)
    }

    /// Removes a cached document. Missing files are not an error.
    pub fn remove(&self, key_id: &KeyId) -> io::Result<()> {
        match fs::remove_file(self.path_for(key_id)) {
            Ok(()) => fsync_dir(&self.dir),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn create_private_file(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_private_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

/// Syncs a file's contents and metadata to disk.
fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs a directory so that renames and removals inside it survive a crash.
fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}
