//! Content registry module
//!
//! Maps logical content names to byte sources on disk. The registry is the
//! server's catalog: a connection can only fetch content that was registered
//! first.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use sha1::{Digest, Sha1};
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::TransferError;

/// A named, length-known byte source registered with the file server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    /// Content-addressed identity: hex SHA-1 of the file bytes at
    /// registration time
    pub id: String,
    /// Unique logical name clients request
    pub name: String,
    /// Path of the backing file
    pub source_path: PathBuf,
    /// Byte length of the backing file at registration time
    pub length: u64,
}

/// Registry of content entries, keyed by name
#[derive(Debug, Default)]
pub struct ContentRegistry {
    entries: RwLock<HashMap<String, ContentEntry>>,
}

impl ContentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a file under a logical name.
    ///
    /// Fails with `NotFound` if the path does not exist and `DuplicateName`
    /// if the name is taken; a caller must deregister first, there is no
    /// silent overwrite.
    pub async fn register(&self, path: &Path, name: &str) -> Result<ContentEntry> {
        {
            let entries = self.entries.read().await;
            if entries.contains_key(name) {
                return Err(TransferError::duplicate_name(name).into());
            }
        }

        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            TransferError::not_found_with_name(
                format!("content file does not exist: {}", e),
                path.display().to_string(),
            )
        })?;
        if !metadata.is_file() {
            return Err(TransferError::not_found_with_name(
                "content path is not a file",
                path.display().to_string(),
            )
            .into());
        }

        let length = metadata.len();
        let id = hash_file(path).await?;

        let entry = ContentEntry {
            id,
            name: name.to_string(),
            source_path: path.to_path_buf(),
            length,
        };

        let mut entries = self.entries.write().await;
        if entries.contains_key(name) {
            return Err(TransferError::duplicate_name(name).into());
        }
        entries.insert(name.to_string(), entry.clone());
        info!(
            "Registered content '{}' ({} bytes, id {})",
            name, length, entry.id
        );

        Ok(entry)
    }

    /// Resolve a name to its entry
    pub async fn resolve(&self, name: &str) -> Result<ContentEntry> {
        let entries = self.entries.read().await;
        entries
            .get(name)
            .cloned()
            .ok_or_else(|| TransferError::not_found_with_name("no content registered", name).into())
    }

    /// Remove a name from the registry. Idempotent.
    pub async fn deregister(&self, name: &str) {
        let mut entries = self.entries.write().await;
        if entries.remove(name).is_some() {
            debug!("Deregistered content '{}'", name);
        }
    }

    /// Remove every entry
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        debug!("Cleared registry ({} entries)", count);
    }

    /// Number of registered entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Registered names, unordered
    pub async fn names(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }
}

/// Compute the hex SHA-1 of a file's bytes
async fn hash_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await.map_err(|e| {
        TransferError::io_error_full(
            "failed to open content file for hashing",
            path.display().to_string(),
            e.to_string(),
        )
    })?;

    let mut hasher = Sha1::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer).await.map_err(|e| {
            TransferError::io_error_full(
                "failed to read content file for hashing",
                path.display().to_string(),
                e.to_string(),
            )
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    async fn write_temp_file(name: &str, contents: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join("registry_tests");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join(name);
        tokio::fs::write(&path, contents).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let path = write_temp_file("reg_basic.bin", &[7u8; 1000]).await;
        let registry = ContentRegistry::new();

        let entry = registry.register(&path, "test_file.db").await.unwrap();
        assert_eq!(entry.length, 1000);
        assert_eq!(entry.name, "test_file.db");

        let resolved = registry.resolve("test_file.db").await.unwrap();
        assert_eq!(resolved, entry);
    }

    #[tokio::test]
    async fn test_registered_length_matches_disk() {
        let contents = b"exactly twenty bytes";
        let path = write_temp_file("reg_length.bin", contents).await;
        let registry = ContentRegistry::new();

        let entry = registry.register(&path, "length.bin").await.unwrap();
        assert_eq!(entry.length, contents.len() as u64);
        assert_eq!(entry.length, tokio::fs::metadata(&path).await.unwrap().len());
    }

    #[tokio::test]
    async fn test_register_missing_path() {
        let registry = ContentRegistry::new();
        let missing = std::env::temp_dir().join("registry_tests/does_not_exist.bin");

        let err = registry.register(&missing, "missing").await.unwrap_err();
        let err = err.downcast::<TransferError>().unwrap();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_register_duplicate_name() {
        let path = write_temp_file("reg_dup.bin", b"data").await;
        let registry = ContentRegistry::new();

        registry.register(&path, "dup.bin").await.unwrap();
        let err = registry.register(&path, "dup.bin").await.unwrap_err();
        let err = err.downcast::<TransferError>().unwrap();
        assert_eq!(err.code(), ErrorCode::DuplicateName);
    }

    #[tokio::test]
    async fn test_resolve_unregistered() {
        let registry = ContentRegistry::new();
        let err = registry.resolve("nope").await.unwrap_err();
        let err = err.downcast::<TransferError>().unwrap();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_deregister_is_idempotent() {
        let path = write_temp_file("reg_dereg.bin", b"data").await;
        let registry = ContentRegistry::new();

        registry.register(&path, "dereg.bin").await.unwrap();
        registry.deregister("dereg.bin").await;
        registry.deregister("dereg.bin").await;
        assert!(registry.resolve("dereg.bin").await.is_err());
    }

    #[tokio::test]
    async fn test_deregister_then_reregister() {
        let path = write_temp_file("reg_again.bin", b"data").await;
        let registry = ContentRegistry::new();

        registry.register(&path, "again.bin").await.unwrap();
        registry.deregister("again.bin").await;
        registry.register(&path, "again.bin").await.unwrap();
    }

    #[tokio::test]
    async fn test_clear() {
        let path_a = write_temp_file("reg_clear_a.bin", b"a").await;
        let path_b = write_temp_file("reg_clear_b.bin", b"b").await;
        let registry = ContentRegistry::new();

        registry.register(&path_a, "a.bin").await.unwrap();
        registry.register(&path_b, "b.bin").await.unwrap();
        assert_eq!(registry.len().await, 2);

        registry.clear().await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_names_lists_registrations() {
        let path = write_temp_file("reg_names.bin", b"data").await;
        let registry = ContentRegistry::new();

        registry.register(&path, "first.bin").await.unwrap();
        registry.register(&path, "second.bin").await.unwrap();

        let mut names = registry.names().await;
        names.sort();
        assert_eq!(names, vec!["first.bin", "second.bin"]);
    }

    #[tokio::test]
    async fn test_content_id_is_content_addressed() {
        let path_a = write_temp_file("reg_id_a.bin", b"same bytes").await;
        let path_b = write_temp_file("reg_id_b.bin", b"same bytes").await;
        let path_c = write_temp_file("reg_id_c.bin", b"other bytes").await;
        let registry = ContentRegistry::new();

        let a = registry.register(&path_a, "a").await.unwrap();
        let b = registry.register(&path_b, "b").await.unwrap();
        let c = registry.register(&path_c, "c").await.unwrap();

        // Identity follows the bytes, not the path
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }
}
