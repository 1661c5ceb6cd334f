//! Backing tiers for store values.

use crate::error::{ReflowError, Result};
use fs2::FileExt;
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

/// Key-value persistence for serialized store values.
pub trait Backend {
    /// Read the serialized value stored under `name`.
    fn get(&self, name: &str) -> Result<Option<String>>;

    /// Write the serialized value for `name`.
    fn set(&self, name: &str, value: &str) -> Result<()>;
}

/// In-memory backend.
///
/// Clones share the same map, so a handle kept outside the runtime sees
/// every write.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

impl Backend for MemoryBackend {
    fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(name).cloned())
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        self.values.lock().insert(name.to_string(), value.to_string());
        Ok(())
    }
}

/// Magic bytes for the backend manifest.
const MANIFEST_MAGIC: &[u8; 4] = b"RFB\0";

/// Magic bytes for value files.
const VALUE_MAGIC: &[u8; 4] = b"RFV\0";

/// Current on-disk format version.
const FORMAT_VERSION: u8 = 1;

/// Directory-backed durable tier: one checksummed file per store.
pub struct FileBackend {
    /// Base directory.
    path: PathBuf,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// Recently read or written values.
    cache: Mutex<LruCache<String, String>>,
}

impl FileBackend {
    /// Open an existing backend directory or create a new one.
    pub fn open_or_create(
        path: impl AsRef<Path>,
        cache_size: usize,
        create_if_missing: bool,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.join("MANIFEST").exists() {
            Self::verify_manifest(&path)?;
        } else if create_if_missing {
            fs::create_dir_all(&path)?;
            Self::write_manifest(&path)?;
        } else {
            return Err(ReflowError::NotInitialized(path.display().to_string()));
        }

        let lock_file = Self::acquire_lock(&path)?;
        let cache_size = NonZeroUsize::new(cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            path,
            _lock_file: lock_file,
            cache: Mutex::new(LruCache::new(cache_size)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File holding the value of `name`. Names are hashed so any name is a
    /// valid file name.
    fn value_path(&self, name: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        self.path.join(format!("{}.val", hex::encode(hasher.finalize())))
    }

    fn read_value(path: &Path) -> Result<String> {
        let mut file = File::open(path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != VALUE_MAGIC {
            return Err(ReflowError::InvalidFormat("Invalid value magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != FORMAT_VERSION {
            return Err(ReflowError::InvalidFormat(format!(
                "Unsupported value version: {}",
                version[0]
            )));
        }

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes) as usize;

        let mut content = vec![0u8; len];
        file.read_exact(&mut content)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);
        let computed_checksum = crc32fast::hash(&content);
        if stored_checksum != computed_checksum {
            return Err(ReflowError::ChecksumMismatch {
                expected: stored_checksum,
                got: computed_checksum,
            });
        }

        String::from_utf8(content).map_err(|e| ReflowError::Deserialization(e.to_string()))
    }

    fn write_value(path: &Path, value: &str) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        let mut file = File::create(&tmp_path)?;

        let content = value.as_bytes();
        file.write_all(VALUE_MAGIC)?;
        file.write_all(&[FORMAT_VERSION])?;
        file.write_all(&(content.len() as u64).to_le_bytes())?;
        file.write_all(content)?;
        file.write_all(&crc32fast::hash(content).to_le_bytes())?;
        file.sync_all()?;

        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    fn write_manifest(path: &Path) -> Result<()> {
        let mut file = File::create(path.join("MANIFEST"))?;
        file.write_all(MANIFEST_MAGIC)?;
        file.write_all(&[FORMAT_VERSION])?;
        file.sync_all()?;
        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        let mut file = File::open(path.join("MANIFEST"))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != MANIFEST_MAGIC {
            return Err(ReflowError::InvalidFormat("Invalid backend magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != FORMAT_VERSION {
            return Err(ReflowError::InvalidFormat(format!(
                "Unsupported backend version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| ReflowError::Locked)?;
        Ok(lock_file)
    }
}

impl Backend for FileBackend {
    fn get(&self, name: &str) -> Result<Option<String>> {
        if let Some(cached) = self.cache.lock().get(name).cloned() {
            return Ok(Some(cached));
        }

        let path = self.value_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let value = Self::read_value(&path)?;
        self.cache.lock().put(name.to_string(), value.clone());
        Ok(Some(value))
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        Self::write_value(&self.value_path(name), value)?;
        self.cache.lock().put(name.to_string(), value.to_string());
        trace!(name, bytes = value.len(), "persisted durable value");
        Ok(())
    }
}
