//! Persisted document store.
//!
//! Each configuration/state document is a typed struct serialized as
//! human-readable JSON, one storage blob per document. The store owns
//! an immutable snapshot behind an `Arc`; readers take cheap snapshot
//! handles, writers swap in a whole new snapshot and persist it. There
//! is no partial mutation: a replace either fully succeeds or leaves
//! the active document untouched.
//!
//! Recovery policy: a document that is missing or fails to parse or
//! validate is discarded and replaced by the compiled-in default,
//! which is persisted immediately. Storage write failures are reported
//! and absorbed — the in-memory snapshot always stays usable.

use std::sync::{Arc, Mutex, MutexGuard};

use core::fmt;

use log::{info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::app::ports::{StorageError, StoragePort};

/// A persisted document type.
pub trait Document: Serialize + DeserializeOwned + Default {
    /// Storage blob name.
    const NAME: &'static str;

    /// Structural validation beyond what deserialization enforces.
    fn validate(&self) -> Result<(), &'static str> {
        Ok(())
    }
}

/// Errors from document store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Candidate text is not valid JSON of the document's shape.
    Malformed,
    /// Parsed fine but failed document validation.
    Invalid(&'static str),
    /// Underlying storage failure.
    Io(StorageError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "not a valid document"),
            Self::Invalid(msg) => write!(f, "invalid document: {msg}"),
            Self::Io(e) => write!(f, "storage: {e}"),
        }
    }
}

/// Owned store for one document type.
pub struct DocumentStore<T: Document> {
    current: Mutex<Arc<T>>,
}

impl<T: Document> DocumentStore<T> {
    /// Load the named document from storage, falling back to (and
    /// persisting) the compiled-in default when the blob is absent or
    /// structurally invalid. Never yields an invalid document.
    pub fn load(port: &mut impl StoragePort) -> Self {
        match port.read(T::NAME) {
            Ok(text) => match parse::<T>(&text) {
                Ok(doc) => {
                    info!("{}: loaded from storage", T::NAME);
                    return Self::with(doc);
                }
                Err(e) => {
                    warn!("{}: stored document rejected ({e}), recreating default", T::NAME);
                }
            },
            Err(StorageError::NotFound) => {
                info!("{}: no stored document, creating default", T::NAME);
            }
            Err(e) => {
                warn!("{}: storage read failed ({e}), using default", T::NAME);
            }
        }

        let store = Self::with(T::default());
        if let Err(e) = store.save(port) {
            warn!("{}: could not persist default ({e})", T::NAME);
        }
        store
    }

    /// Wrap an already-built document without touching storage.
    pub fn with(doc: T) -> Self {
        Self {
            current: Mutex::new(Arc::new(doc)),
        }
    }

    /// Cheap handle to the active immutable snapshot.
    pub fn snapshot(&self) -> Arc<T> {
        self.lock().clone()
    }

    /// Serialize the active snapshot as pretty JSON.
    pub fn to_json(&self) -> String {
        // Document types always serialize; a failure here would mean a
        // broken Serialize impl, not runtime input.
        serde_json::to_string_pretty(&*self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }

    /// Persist the active snapshot. I/O failure is returned to the
    /// caller; the in-memory snapshot is unaffected.
    pub fn save(&self, port: &mut impl StoragePort) -> Result<(), StoreError> {
        let snap = self.snapshot();
        let text =
            serde_json::to_string_pretty(&*snap).map_err(|_| StoreError::Malformed)?;
        port.write(T::NAME, &text).map_err(StoreError::Io)
    }

    /// Parse candidate text and, only on success, swap it in as the
    /// active document and persist it. On any parse or validation
    /// failure the previous document is retained untouched.
    pub fn replace(&self, port: &mut impl StoragePort, raw: &str) -> Result<(), StoreError> {
        let doc = parse::<T>(raw)?;
        *self.lock() = Arc::new(doc);
        if let Err(e) = self.save(port) {
            // The swap stands; the next successful save picks it up.
            warn!("{}: persist after replace failed ({e})", T::NAME);
        }
        Ok(())
    }

    /// Swap in the compiled-in default and persist it.
    pub fn reset_to_default(&self, port: &mut impl StoragePort) -> Result<(), StoreError> {
        *self.lock() = Arc::new(T::default());
        self.save(port)
    }

    /// Mutate a copy of the document and swap it in without touching
    /// storage. Used for transient state (sensor readings, per-day
    /// task markers) that rides along with the next persisted save.
    pub fn update_volatile(&self, f: impl FnOnce(&mut T))
    where
        T: Clone,
    {
        let mut guard = self.lock();
        let mut doc = (**guard).clone();
        f(&mut doc);
        *guard = Arc::new(doc);
    }

    // Poison-tolerant lock: a panicked writer cannot have left a torn
    // document behind because snapshots are swapped whole.
    fn lock(&self) -> MutexGuard<'_, Arc<T>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse<T: Document>(text: &str) -> Result<T, StoreError> {
    let doc: T = serde_json::from_str(text).map_err(|_| StoreError::Malformed)?;
    doc.validate().map_err(StoreError::Invalid)?;
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::MemStorage;
    use crate::config::{FeederState, NetworkConfig, ScheduleTask};

    #[test]
    fn missing_document_creates_and_persists_default() {
        let mut storage = MemStorage::new();
        let store = DocumentStore::<NetworkConfig>::load(&mut storage);

        assert_eq!(*store.snapshot(), NetworkConfig::default());
        // The default must have been written back.
        let text = storage.read(NetworkConfig::NAME).unwrap();
        let reparsed: NetworkConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(reparsed, NetworkConfig::default());
    }

    #[test]
    fn corrupt_document_replaced_by_default() {
        let mut storage = MemStorage::new();
        storage
            .write(NetworkConfig::NAME, "not json at all {{{")
            .unwrap();

        let store = DocumentStore::<NetworkConfig>::load(&mut storage);
        assert_eq!(*store.snapshot(), NetworkConfig::default());

        let text = storage.read(NetworkConfig::NAME).unwrap();
        assert!(serde_json::from_str::<NetworkConfig>(&text).is_ok());
    }

    #[test]
    fn wrong_shape_document_replaced_by_default() {
        let mut storage = MemStorage::new();
        storage.write(NetworkConfig::NAME, "42").unwrap();

        let store = DocumentStore::<NetworkConfig>::load(&mut storage);
        assert_eq!(*store.snapshot(), NetworkConfig::default());
    }

    #[test]
    fn valid_document_loads_unchanged() {
        let mut storage = MemStorage::new();
        let mut cfg = NetworkConfig::default();
        cfg.hostname = "tank-7".into();
        storage
            .write(
                NetworkConfig::NAME,
                &serde_json::to_string(&cfg).unwrap(),
            )
            .unwrap();

        let store = DocumentStore::<NetworkConfig>::load(&mut storage);
        assert_eq!(store.snapshot().hostname, "tank-7");
    }

    #[test]
    fn malformed_replace_leaves_document_byte_identical() {
        let mut storage = MemStorage::new();
        let store = DocumentStore::<NetworkConfig>::load(&mut storage);
        let before = store.to_json();

        assert_eq!(
            store.replace(&mut storage, "{\"hostname\": 5}"),
            Err(StoreError::Malformed)
        );
        assert_eq!(store.to_json(), before);

        assert_eq!(
            store.replace(&mut storage, "[1, 2, 3]"),
            Err(StoreError::Malformed)
        );
        assert_eq!(store.to_json(), before);
    }

    #[test]
    fn invalid_replace_leaves_document_untouched() {
        let mut storage = MemStorage::new();
        let store = DocumentStore::<NetworkConfig>::load(&mut storage);
        let before = store.to_json();

        let err = store
            .replace(&mut storage, "{\"hostname\": \"\"}")
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert_eq!(store.to_json(), before);
    }

    #[test]
    fn successful_replace_swaps_and_persists() {
        let mut storage = MemStorage::new();
        let store = DocumentStore::<NetworkConfig>::load(&mut storage);

        let mut cfg = NetworkConfig::default();
        cfg.hostname = "reef-1".into();
        store
            .replace(&mut storage, &serde_json::to_string(&cfg).unwrap())
            .unwrap();

        assert_eq!(store.snapshot().hostname, "reef-1");
        let text = storage.read(NetworkConfig::NAME).unwrap();
        assert!(text.contains("reef-1"));
    }

    #[test]
    fn save_io_error_keeps_memory_state() {
        let mut storage = MemStorage::new();
        let store = DocumentStore::<FeederState>::load(&mut storage);
        store.update_volatile(|s| s.tasks.push(ScheduleTask::at("noon", 720)));

        storage.fail_writes(true);
        assert!(matches!(
            store.save(&mut storage),
            Err(StoreError::Io(StorageError::IoError))
        ));
        assert_eq!(store.snapshot().tasks.len(), 1);
    }

    #[test]
    fn factory_reset_restores_default() {
        let mut storage = MemStorage::new();
        let store = DocumentStore::<NetworkConfig>::load(&mut storage);
        let mut cfg = NetworkConfig::default();
        cfg.hostname = "custom".into();
        store
            .replace(&mut storage, &serde_json::to_string(&cfg).unwrap())
            .unwrap();

        store.reset_to_default(&mut storage).unwrap();
        assert_eq!(*store.snapshot(), NetworkConfig::default());
        let text = storage.read(NetworkConfig::NAME).unwrap();
        assert!(text.contains("aquafeed-0"));
    }
}
