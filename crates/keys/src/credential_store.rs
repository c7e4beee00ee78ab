//! The system-wide credential store (spec §4.A).
//!
//! Persisted as a single JSON document. Writes serialize on an async
//! mutex and commit via write-to-temp-then-rename so a crash mid-write
//! never corrupts the file readers see. Reads go through an in-memory
//! cache guarded by a `parking_lot::RwLock` and never touch disk, so they
//! never block on a concurrent writer.

use ovp_core::{GatewayError, Result, SystemCredentials};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct CredentialStore {
    path: PathBuf,
    cache: Arc<RwLock<SystemCredentials>>,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let creds = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| GatewayError::Persistence(format!("credential store parse: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SystemCredentials::default(),
            Err(e) => return Err(GatewayError::Persistence(format!("credential store read: {e}"))),
        };

        Ok(Self {
            path,
            cache: Arc::new(RwLock::new(creds)),
            write_lock: Mutex::new(()),
        })
    }

    pub fn get_raw(&self, provider: &str) -> Option<HashMap<String, String>> {
        self.cache.read().get_raw(provider).cloned()
    }

    pub fn get_masked(&self) -> HashMap<String, HashMap<String, String>> {
        self.cache.read().masked()
    }

    pub async fn set(&self, provider: &str, fields: HashMap<String, String>) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let snapshot = {
            let mut cache = self.cache.write();
            cache.set(provider, fields);
            cache.clone()
        };

        self.persist(&snapshot).await
    }

    async fn persist(&self, creds: &SystemCredentials) -> Result<()> {
        let json = serde_json::to_vec_pretty(creds)
            .map_err(|e| GatewayError::Persistence(format!("credential store serialize: {e}")))?;

        let tmp_path = self.path.with_extension("tmp");
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| GatewayError::Persistence(format!("credential store mkdir: {e}")))?;
        }

        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| GatewayError::Persistence(format!("credential store write: {e}")))?;

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| GatewayError::Persistence(format!("credential store rename: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = CredentialStore::load(&path).await.unwrap();
        let mut fields = Map::new();
        fields.insert("api_key".to_string(), "secret-value".to_string());
        store.set("elevenlabs", fields).await.unwrap();

        let reloaded = CredentialStore::load(&path).await.unwrap();
        let raw = reloaded.get_raw("elevenlabs").unwrap();
        assert_eq!(raw.get("api_key").unwrap(), "secret-value");
    }

    #[tokio::test]
    async fn masked_read_never_exposes_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = CredentialStore::load(&path).await.unwrap();

        let mut fields = Map::new();
        fields.insert("api_key".to_string(), "secret-value".to_string());
        store.set("azure", fields).await.unwrap();

        let masked = store.get_masked();
        let masked_fields = masked.get("azure").unwrap();
        assert_ne!(masked_fields.get("api_key").unwrap(), "secret-value");
    }

    #[tokio::test]
    async fn missing_file_yields_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        let store = CredentialStore::load(&path).await.unwrap();
        assert!(store.get_raw("anything").is_none());
    }
}
