//! File-backed key-value store.
//!
//! Each key maps to one JSON file in the store directory. Keys are
//! percent-encoded into file names so that scoped keys such as
//! `terminal-sessions/workspace/abc` stay flat:
//!
//! ```text
//! {store_dir}/
//!   terminal-sessions%2Fworkspace%2Fabc.json
//!   terminal-sessions%2Fglobal.json
//! ```

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use terminal_persist_core::{Error, Result};

use crate::store::KeyValueStore;

const FILE_EXTENSION: &str = ".json";
const TEMP_SUFFIX: &str = ".tmp";

/// File-based implementation of [`KeyValueStore`].
///
/// The directory is created on first write. Writes go to a temp file that is
/// then renamed over the target, so readers never see a partial value.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}", encode_key(key), FILE_EXTENSION))
    }
}

/// Map an I/O failure to the error taxonomy.
fn io_error(path: &Path, err: io::Error) -> Error {
    if is_out_of_space(&err) {
        return Error::StorageFull(format!("{}: {}", path.display(), err));
    }
    Error::StorageAccessFailed(format!("{}: {}", path.display(), err))
}

#[cfg(unix)]
fn is_out_of_space(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENOSPC)
}

#[cfg(not(unix))]
fn is_out_of_space(_err: &io::Error) -> bool {
    false
}

fn encode_key(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}

fn decode_key(name: &str) -> Option<String> {
    urlencoding::decode(name).ok().map(|key| key.into_owned())
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;

        let final_path = self.path_for(key);
        let temp_path = self
            .dir
            .join(format!("{}{}{}", encode_key(key), FILE_EXTENSION, TEMP_SUFFIX));

        if let Err(e) = fs::write(&temp_path, value.as_bytes()).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(io_error(&temp_path, e));
        }

        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(io_error(&final_path, e));
        }

        debug!("Wrote {} bytes to {}", value.len(), final_path.display());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.dir, e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.dir, e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            // Leftover temp files end in ".json.tmp" and are skipped here
            if let Some(stem) = name.strip_suffix(FILE_EXTENSION) {
                if let Some(key) = decode_key(stem) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_key_encoding() {
        assert_eq!(
            encode_key("terminal-sessions/workspace/abc"),
            "terminal-sessions%2Fworkspace%2Fabc"
        );
        assert_eq!(
            decode_key("terminal-sessions%2Fworkspace%2Fabc").as_deref(),
            Some("terminal-sessions/workspace/abc")
        );
        assert_eq!(encode_key("ws 1/ä"), "ws%201%2F%C3%A4");
        assert_eq!(decode_key("ws%201%2F%C3%A4").as_deref(), Some("ws 1/ä"));
        assert_eq!(decode_key("%FF%FE"), None);
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        // A non-empty directory at the target path makes the rename fail
        let target = dir.path().join("k.json");
        std::fs::create_dir_all(target.join("occupied")).unwrap();

        let err = store.write("k", "v").await.unwrap_err();

        assert!(matches!(err, Error::StorageAccessFailed(_)));
        assert!(!dir.path().join("k.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_read_missing_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        assert_eq!(store.read("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_read_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("nested"));

        store.write("terminal-sessions/global", "first").await.unwrap();
        store.write("terminal-sessions/global", "second").await.unwrap();

        assert_eq!(
            store.read("terminal-sessions/global").await.unwrap().as_deref(),
            Some("second")
        );
        assert!(dir
            .path()
            .join("nested/terminal-sessions%2Fglobal.json")
            .exists());
        assert!(!dir
            .path()
            .join("nested/terminal-sessions%2Fglobal.json.tmp")
            .exists());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        store.write("k", "v").await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.read("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_lists_decoded_keys() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.keys().await.unwrap().is_empty());

        store.write("terminal-sessions/workspace/b", "{}").await.unwrap();
        store.write("terminal-sessions/global", "{}").await.unwrap();
        std::fs::write(dir.path().join("stray.json.tmp"), "x").unwrap();

        assert_eq!(
            store.keys().await.unwrap(),
            vec![
                "terminal-sessions/global".to_string(),
                "terminal-sessions/workspace/b".to_string(),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_enospc_maps_to_storage_full() {
        let err = io_error(Path::new("/x"), io::Error::from_raw_os_error(libc::ENOSPC));
        assert!(matches!(err, Error::StorageFull(_)));

        let err = io_error(Path::new("/x"), io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, Error::StorageAccessFailed(_)));
    }
}
