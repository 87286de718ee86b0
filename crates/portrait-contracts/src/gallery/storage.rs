use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;

/// Named-slot string storage, the local-storage analogue the gallery persists into.
pub trait KeyValueStorage: Send {
    fn read(&self, slot: &str) -> anyhow::Result<Option<String>>;
    fn write(&self, slot: &str, value: &str) -> anyhow::Result<()>;
}

/// One `<slot>.json` file per slot under a data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn slot_path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{slot}.json"))
    }
}

impl KeyValueStorage for FileStorage {
    fn read(&self, slot: &str) -> anyhow::Result<Option<String>> {
        let path = self.slot_path(slot);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        Ok(Some(raw))
    }

    fn write(&self, slot: &str, value: &str) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed creating {}", self.dir.display()))?;
        let path = self.slot_path(slot);
        std::fs::write(&path, value).with_context(|| format!("failed writing {}", path.display()))?;
        Ok(())
    }
}

/// In-process storage. Clones share the same slots.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slots: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slot(slot: &str, value: &str) -> Self {
        let storage = Self::new();
        if let Ok(mut slots) = storage.slots.lock() {
            slots.insert(slot.to_string(), value.to_string());
        }
        storage
    }
}

impl KeyValueStorage for MemoryStorage {
    fn read(&self, slot: &str) -> anyhow::Result<Option<String>> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;
        Ok(slots.get(slot).cloned())
    }

    fn write(&self, slot: &str, value: &str) -> anyhow::Result<()> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;
        slots.insert(slot.to_string(), value.to_string());
        Ok(())
    }
}
