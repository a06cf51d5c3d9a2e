use super::SaveStorage;
use crate::error::SaveError;

use std::fs::{remove_file, rename, File};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

/// One file per key under a root directory.
///
/// Writes go to a temp file that is synced and then renamed over the
/// target, so a reader sees either the old bytes or the new ones.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SaveError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// `save::demo::1` -> `save%3A%3Ademo%3A%3A1.dat`
    ///
    /// Bytes outside `[A-Za-z0-9_-]` are percent-escaped, so distinct keys
    /// never share a file and no key can name a path outside the root.
    fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len() + 4);
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                name.push(char::from(byte));
            } else {
                name.push_str(&format!("%{:02X}", byte));
            }
        }
        name.push_str(".dat");
        self.root.join(name)
    }
}

impl SaveStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SaveError> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SaveError::Io(e)),
        }
    }

    fn set(&self, key: &str, bytes: &[u8]) -> Result<(), SaveError> {
        let path = self.path_for(key);
        let temp_path = path.with_extension("tmp");

        {
            let mut file = File::create(&temp_path)?;
            file.write_all(bytes)?;
            file.flush()?;
            file.sync_all()?;
        }

        rename(&temp_path, &path)?;

        log::debug!("Wrote {} bytes to {:?}", bytes.len(), path);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SaveError> {
        match remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SaveError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).unwrap();

        storage.set("save::demo::1", b"{\"score\":1}").unwrap();
        assert_eq!(storage.get("save::demo::1").unwrap().unwrap(), b"{\"score\":1}".to_vec());

        storage.remove("save::demo::1").unwrap();
        assert!(storage.get("save::demo::1").unwrap().is_none());
        storage.remove("save::demo::1").unwrap();
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).unwrap();

        storage.set("save::demo::2::meta", b"meta").unwrap();

        let path = storage.path_for("save::demo::2::meta");
        assert!(path.exists());
        assert!(path.ends_with("save%3A%3Ademo%3A%3A2%3A%3Ameta.dat"));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_keys_do_not_escape_root() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).unwrap();

        let path = storage.path_for("save::../../etc::1");
        assert_eq!(path.parent().unwrap(), temp_dir.path());
    }

    #[test]
    fn test_similar_keys_use_distinct_files() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).unwrap();

        storage.set("save::my game::1", b"spaced").unwrap();
        storage.set("save::my_game::1", b"underscored").unwrap();
        storage.set("save::my%20game::1", b"escaped").unwrap();

        assert_eq!(storage.get("save::my game::1").unwrap().unwrap(), b"spaced".to_vec());
        assert_eq!(storage.get("save::my_game::1").unwrap().unwrap(), b"underscored".to_vec());
        assert_eq!(storage.get("save::my%20game::1").unwrap().unwrap(), b"escaped".to_vec());
    }
}
