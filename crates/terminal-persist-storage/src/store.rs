//! Session store: a key-value backend bound to a storage scope.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::error::Category;
use tracing::{debug, info, warn};

use terminal_persist_core::{
    Error, PersistenceSettings, Result, SessionEnvelope, StorageScope,
};

use crate::codec::SessionCodec;
use crate::stored::StoredEnvelope;

/// Default size ceiling for one serialized envelope (20 MiB).
pub const DEFAULT_MAX_SIZE_BYTES: usize = 20 * 1024 * 1024;

/// Persisted key-value state.
#[async_trait]
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    /// Read a value. Missing keys yield `None`.
    async fn read(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    async fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List stored keys.
    async fn keys(&self) -> Result<Vec<String>>;
}

/// Envelope persistence for one storage scope.
///
/// Applies the codec on the way in and out, and rejects writes whose
/// serialized size exceeds the ceiling without touching the backend.
#[derive(Debug, Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
    key: String,
    max_size_bytes: usize,
    codec: SessionCodec,
}

impl SessionStore {
    /// Create a store for `scope` with the default size ceiling.
    pub fn new(backend: Arc<dyn KeyValueStore>, scope: &StorageScope, codec: SessionCodec) -> Self {
        Self {
            backend,
            key: scope.key(),
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            codec,
        }
    }

    /// Create a store from configuration.
    pub fn from_settings(backend: Arc<dyn KeyValueStore>, settings: &PersistenceSettings) -> Self {
        Self::new(
            backend,
            &settings.storage.scope,
            SessionCodec::from_settings(&settings.codec),
        )
        .with_max_size(settings.storage.max_size_bytes)
    }

    /// Override the size ceiling.
    pub fn with_max_size(mut self, max_size_bytes: usize) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    /// Storage key of this scope.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Size ceiling in bytes.
    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }

    /// Codec used for scrollback.
    pub fn codec(&self) -> &SessionCodec {
        &self.codec
    }

    /// Load the envelope, if one is stored.
    pub async fn load(&self) -> Result<Option<SessionEnvelope>> {
        let Some(raw) = self.backend.read(&self.key).await? else {
            debug!("No stored session under key '{}'", self.key);
            return Ok(None);
        };

        let stored: StoredEnvelope = serde_json::from_str(&raw).map_err(|e| match e.classify() {
            Category::Data => Error::InvalidDataFormat(format!("stored session: {e}")),
            _ => Error::DeserializationFailed(format!("stored session: {e}")),
        })?;

        let envelope = self.codec.decode_envelope(stored)?;
        debug!(
            "Loaded session: key='{}', terminals={}, bytes={}",
            self.key,
            envelope.terminals.len(),
            raw.len()
        );
        Ok(Some(envelope))
    }

    /// Persist the envelope. Returns the serialized size in bytes.
    pub async fn save(&self, envelope: &SessionEnvelope) -> Result<usize> {
        let stored = self.codec.encode_envelope(envelope)?;
        let json = serde_json::to_string(&stored)
            .map_err(|e| Error::SerializationFailed(format!("session envelope: {e}")))?;

        if json.len() > self.max_size_bytes {
            warn!(
                "Rejecting session write: {} bytes exceeds limit of {} bytes",
                json.len(),
                self.max_size_bytes
            );
            return Err(Error::StorageAccessFailed(format!(
                "serialized session is {} bytes, exceeds limit of {} bytes",
                json.len(),
                self.max_size_bytes
            )));
        }

        self.backend.write(&self.key, &json).await?;
        info!(
            "Saved session: key='{}', terminals={}, bytes={}",
            self.key,
            envelope.terminals.len(),
            json.len()
        );
        Ok(json.len())
    }

    /// Remove the stored envelope. Idempotent.
    pub async fn clear(&self) -> Result<()> {
        self.backend.delete(&self.key).await?;
        debug!("Cleared session under key '{}'", self.key);
        Ok(())
    }

    /// Whether an envelope is stored (without decoding it).
    pub async fn exists(&self) -> Result<bool> {
        Ok(self.backend.read(&self.key).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use chrono::Utc;
    use terminal_persist_core::{EnvelopeConfig, TerminalSessionRecord};

    fn envelope(terminals: usize, lines: usize) -> SessionEnvelope {
        let records = (0..terminals)
            .map(|i| {
                let mut r = TerminalSessionRecord::new(format!("t{i}"), format!("Terminal {i}"), i as u32 + 1);
                r.scrollback = Some((0..lines).map(|l| format!("{i}:{l} some output")).collect());
                r
            })
            .collect();
        SessionEnvelope::new(records, None, EnvelopeConfig::default(), Utc::now())
    }

    fn store(backend: Arc<MemoryStore>) -> SessionStore {
        SessionStore::new(backend, &StorageScope::Workspace { id: "ws".into() }, SessionCodec::gzip())
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let backend = Arc::new(MemoryStore::new());
        let store = store(backend.clone());
        let original = envelope(2, 600);

        let bytes = store.save(&original).await.unwrap();
        assert!(bytes > 0);
        assert!(backend.contains("terminal-sessions/workspace/ws").await);

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let store = store(Arc::new(MemoryStore::new()));
        assert!(store.load().await.unwrap().is_none());
        assert!(!store.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_oversize_write_rejected_wholesale() {
        let backend = Arc::new(MemoryStore::new());
        let store = store(backend.clone()).with_max_size(256);

        let err = store.save(&envelope(3, 20)).await.unwrap_err();
        assert!(matches!(err, Error::StorageAccessFailed(_)));
        // Nothing was written
        assert!(backend.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversize_write_keeps_previous_envelope() {
        let backend = Arc::new(MemoryStore::new());
        let small = envelope(1, 1);
        store(backend.clone()).save(&small).await.unwrap();

        let capped = store(backend.clone()).with_max_size(600);
        assert!(capped.save(&envelope(5, 30)).await.is_err());
        assert_eq!(capped.load().await.unwrap().unwrap(), small);
    }

    #[tokio::test]
    async fn test_corrupt_json_is_deserialization_error() {
        let backend = Arc::new(MemoryStore::new());
        backend
            .write("terminal-sessions/workspace/ws", "{not json")
            .await
            .unwrap();
        let err = store(backend).load().await.unwrap_err();
        assert!(matches!(err, Error::DeserializationFailed(_)));
    }

    #[tokio::test]
    async fn test_wrong_shape_is_invalid_data_format() {
        let backend = Arc::new(MemoryStore::new());
        backend
            .write("terminal-sessions/workspace/ws", r#"{"version": 3}"#)
            .await
            .unwrap();
        let err = store(backend).load().await.unwrap_err();
        assert!(matches!(err, Error::InvalidDataFormat(_)));
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let backend = Arc::new(MemoryStore::new());
        let store = store(backend);
        store.save(&envelope(1, 1)).await.unwrap();

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scopes_are_isolated() {
        let backend = Arc::new(MemoryStore::new());
        let a = SessionStore::new(
            backend.clone(),
            &StorageScope::Workspace { id: "a".into() },
            SessionCodec::gzip(),
        );
        let global = SessionStore::new(backend, &StorageScope::Global, SessionCodec::gzip());

        a.save(&envelope(1, 1)).await.unwrap();
        assert!(global.load().await.unwrap().is_none());
    }
}
