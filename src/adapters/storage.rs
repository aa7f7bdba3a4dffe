//! Document storage adapters.
//!
//! [`FsStorage`] keeps one JSON text file per document in a directory
//! — the SPIFFS mount on the device, any path on the host.
//! [`MemStorage`] is the in-memory backend used by tests, with a
//! write-failure switch for exercising I/O error paths.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use log::info;

use crate::app::ports::{StorageError, StoragePort};

// ───────────────────────────────────────────────────────────────
// Filesystem backend
// ───────────────────────────────────────────────────────────────

pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }
}

impl StoragePort for FsStorage {
    fn read(&self, name: &str) -> Result<String, StorageError> {
        match std::fs::read_to_string(self.path_for(name)) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(_) => Err(StorageError::IoError),
        }
    }

    fn write(&mut self, name: &str, text: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.root).map_err(|_| StorageError::IoError)?;
        // Write-then-rename keeps a power cut from leaving a torn
        // document behind.
        let tmp = self.root.join(format!("{name}.json.tmp"));
        let path = self.path_for(name);
        std::fs::write(&tmp, text).map_err(|e| {
            if e.kind() == ErrorKind::StorageFull {
                StorageError::Full
            } else {
                StorageError::IoError
            }
        })?;
        std::fs::rename(&tmp, &path).map_err(|_| StorageError::IoError)?;
        info!("storage: wrote {} ({} bytes)", path.display(), text.len());
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path_for(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(_) => Err(StorageError::IoError),
        }
    }

    fn exists(&self, name: &str) -> bool {
        self.path_for(name).exists()
    }
}

/// Mount the SPIFFS partition backing [`FsStorage`] on the device.
#[cfg(target_os = "espidf")]
pub fn mount_spiffs(base_path: &str) -> Result<(), crate::Error> {
    use esp_idf_svc::sys::{ESP_OK, esp_vfs_spiffs_conf_t, esp_vfs_spiffs_register};

    let base = std::ffi::CString::new(base_path).map_err(|_| crate::Error::Init("spiffs path"))?;
    let conf = esp_vfs_spiffs_conf_t {
        base_path: base.as_ptr(),
        partition_label: core::ptr::null(),
        max_files: 4,
        format_if_mount_failed: true,
    };
    // SAFETY: called once from the main task before any storage use.
    let ret = unsafe { esp_vfs_spiffs_register(&conf) };
    if ret != ESP_OK {
        return Err(crate::Error::Init("spiffs mount"));
    }
    info!("storage: SPIFFS mounted at {base_path}");
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// In-memory backend (tests, simulation)
// ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemStorage {
    blobs: HashMap<String, String>,
    fail_writes: bool,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, for I/O error-path tests.
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl StoragePort for MemStorage {
    fn read(&self, name: &str) -> Result<String, StorageError> {
        self.blobs
            .get(name)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    fn write(&mut self, name: &str, text: &str) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::IoError);
        }
        self.blobs.insert(name.to_string(), text.to_string());
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        self.blobs.remove(name);
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.blobs.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_storage_round_trip() {
        let mut s = MemStorage::new();
        assert_eq!(s.read("doc"), Err(StorageError::NotFound));

        s.write("doc", "{\"a\": 1}").unwrap();
        assert!(s.exists("doc"));
        assert_eq!(s.read("doc").unwrap(), "{\"a\": 1}");

        s.remove("doc").unwrap();
        assert!(!s.exists("doc"));
    }

    #[test]
    fn mem_storage_write_failure_switch() {
        let mut s = MemStorage::new();
        s.write("doc", "1").unwrap();
        s.fail_writes(true);
        assert_eq!(s.write("doc", "2"), Err(StorageError::IoError));
        // Old contents retained.
        assert_eq!(s.read("doc").unwrap(), "1");
    }

    #[test]
    fn fs_storage_round_trip() {
        let root = std::env::temp_dir().join(format!(
            "aquafeed-storage-test-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&root);
        let mut s = FsStorage::new(&root);

        assert_eq!(s.read("doc"), Err(StorageError::NotFound));
        s.write("doc", "{}").unwrap();
        assert!(s.exists("doc"));
        assert_eq!(s.read("doc").unwrap(), "{}");
        s.remove("doc").unwrap();
        assert!(!s.exists("doc"));

        let _ = std::fs::remove_dir_all(&root);
    }
}
