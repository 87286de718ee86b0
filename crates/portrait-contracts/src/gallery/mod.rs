mod storage;

pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};

use crate::artifact::Artifact;
use crate::error::{StudioError, StudioResult};

pub const GALLERY_SLOT: &str = "portrait-gallery";

/// Outcome of a gallery mutation.
///
/// `persisted` is false when nothing changed or when the write failed; a
/// failed write is logged and the in-memory gallery stays authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GalleryMutation {
    pub changed: bool,
    pub persisted: bool,
}

/// Saved artifacts, most recent first, persisted as a whole on every change.
pub struct GalleryStore {
    storage: Box<dyn KeyValueStorage>,
    slot: String,
    artifacts: Vec<Artifact>,
}

impl GalleryStore {
    /// Loads the gallery from the default slot. Missing or unreadable data
    /// yields an empty gallery.
    pub fn load(storage: impl KeyValueStorage + 'static) -> Self {
        Self::load_slot(storage, GALLERY_SLOT)
    }

    pub fn load_slot(storage: impl KeyValueStorage + 'static, slot: &str) -> Self {
        let artifacts = match read_artifacts(&storage, slot) {
            Ok(artifacts) => artifacts,
            Err(err) => {
                tracing::warn!(slot, error = %err, "falling back to an empty gallery");
                Vec::new()
            }
        };
        tracing::debug!(slot, count = artifacts.len(), "gallery loaded");
        Self {
            storage: Box::new(storage),
            slot: slot.to_string(),
            artifacts,
        }
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn get(&self, index: usize) -> Option<&Artifact> {
        self.artifacts.get(index)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn contains(&self, artifact: &Artifact) -> bool {
        self.artifacts.contains(artifact)
    }

    /// Single mutation entry point: applies `update` in memory, then writes
    /// the whole list back if `update` reported a change.
    pub fn mutate<F>(&mut self, update: F) -> GalleryMutation
    where
        F: FnOnce(&mut Vec<Artifact>) -> bool,
    {
        if !update(&mut self.artifacts) {
            return GalleryMutation {
                changed: false,
                persisted: false,
            };
        }
        dedup_in_place(&mut self.artifacts);

        let persisted = match self.persist() {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(slot = %self.slot, error = %err, "gallery write failed");
                false
            }
        };
        GalleryMutation {
            changed: true,
            persisted,
        }
    }

    /// Prepends `artifact` unless an identical value is already saved.
    pub fn save(&mut self, artifact: &Artifact) -> GalleryMutation {
        self.mutate(|artifacts| {
            if artifacts.contains(artifact) {
                return false;
            }
            artifacts.insert(0, artifact.clone());
            true
        })
    }

    /// Removes the entry at `index`; out-of-range indexes are ignored.
    pub fn delete(&mut self, index: usize) -> GalleryMutation {
        self.mutate(|artifacts| {
            if index >= artifacts.len() {
                return false;
            }
            artifacts.remove(index);
            true
        })
    }

    fn persist(&self) -> StudioResult<()> {
        let serialized = serde_json::to_string(&self.artifacts)
            .map_err(|err| StudioError::StorageWriteError(err.to_string()))?;
        self.storage
            .write(&self.slot, &serialized)
            .map_err(|err| StudioError::StorageWriteError(format!("{err:#}")))
    }
}

fn read_artifacts(storage: &dyn KeyValueStorage, slot: &str) -> StudioResult<Vec<Artifact>> {
    let raw = storage
        .read(slot)
        .map_err(|err| StudioError::StorageReadError(format!("{err:#}")))?;
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let mut artifacts: Vec<Artifact> = serde_json::from_str(&raw)
        .map_err(|err| StudioError::StorageReadError(err.to_string()))?;
    dedup_in_place(&mut artifacts);
    Ok(artifacts)
}

fn dedup_in_place(artifacts: &mut Vec<Artifact>) {
    let mut seen: Vec<Artifact> = Vec::with_capacity(artifacts.len());
    artifacts.retain(|artifact| {
        if seen.contains(artifact) {
            return false;
        }
        seen.push(artifact.clone());
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn art(tag: &str) -> Artifact {
        Artifact::from_data_url(format!("data:image/png;base64,{tag}"))
    }

    struct BrokenStorage;

    impl KeyValueStorage for BrokenStorage {
        fn read(&self, _slot: &str) -> anyhow::Result<Option<String>> {
            anyhow::bail!("storage unavailable")
        }

        fn write(&self, _slot: &str, _value: &str) -> anyhow::Result<()> {
            anyhow::bail!("quota exceeded")
        }
    }

    fn stored(storage: &MemoryStorage) -> Vec<String> {
        let raw = storage.read(GALLERY_SLOT).unwrap().unwrap_or_default();
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn missing_slot_loads_empty() {
        let gallery = GalleryStore::load(MemoryStorage::new());
        assert!(gallery.is_empty());
    }

    #[test]
    fn corrupt_slot_loads_empty() {
        for raw in ["{not json", "{\"a\": 1}", "[1, 2]"] {
            let gallery = GalleryStore::load(MemoryStorage::with_slot(GALLERY_SLOT, raw));
            assert!(gallery.is_empty(), "{raw}");
        }
    }

    #[test]
    fn unreadable_storage_loads_empty() {
        let gallery = GalleryStore::load(BrokenStorage);
        assert!(gallery.is_empty());
    }

    #[test]
    fn load_drops_stored_duplicates() {
        let storage = MemoryStorage::with_slot(
            GALLERY_SLOT,
            r#"["data:image/png;base64,B","data:image/png;base64,A","data:image/png;base64,B"]"#,
        );
        let gallery = GalleryStore::load(storage);
        assert_eq!(gallery.artifacts(), &[art("B"), art("A")]);
    }

    #[test]
    fn save_prepends_and_persists() {
        let storage = MemoryStorage::new();
        let mut gallery = GalleryStore::load(storage.clone());

        let first = gallery.save(&art("A"));
        assert!(first.changed && first.persisted);
        gallery.save(&art("B"));

        assert_eq!(gallery.artifacts(), &[art("B"), art("A")]);
        assert_eq!(
            stored(&storage),
            vec!["data:image/png;base64,B", "data:image/png;base64,A"]
        );
    }

    #[test]
    fn save_is_idempotent() {
        let storage = MemoryStorage::new();
        let mut gallery = GalleryStore::load(storage.clone());
        gallery.save(&art("A"));
        let again = gallery.save(&art("A"));

        assert!(!again.changed);
        assert_eq!(gallery.len(), 1);
        assert_eq!(stored(&storage).len(), 1);
    }

    #[test]
    fn delete_removes_index_and_keeps_order() {
        let storage = MemoryStorage::new();
        let mut gallery = GalleryStore::load(storage.clone());
        for tag in ["A", "B", "C", "D"] {
            gallery.save(&art(tag));
        }
        // D C B A
        gallery.delete(1);
        assert_eq!(gallery.artifacts(), &[art("D"), art("B"), art("A")]);
        assert!(!gallery.contains(&art("C")));

        let reloaded = GalleryStore::load(storage);
        assert_eq!(reloaded.artifacts(), &[art("D"), art("B"), art("A")]);
    }

    #[test]
    fn delete_second_of_two() {
        let mut gallery = GalleryStore::load(MemoryStorage::new());
        gallery.save(&art("A"));
        gallery.save(&art("B"));
        gallery.delete(1);
        assert_eq!(gallery.artifacts(), &[art("B")]);
    }

    #[test]
    fn delete_out_of_range_is_noop() {
        let storage = MemoryStorage::new();
        let mut gallery = GalleryStore::load(storage.clone());
        gallery.save(&art("A"));
        let outcome = gallery.delete(5);
        assert!(!outcome.changed);
        assert_eq!(gallery.artifacts(), &[art("A")]);
    }

    #[test]
    fn failed_write_keeps_memory_state() {
        let mut gallery = GalleryStore::load(BrokenStorage);
        let outcome = gallery.save(&art("A"));
        assert_eq!(
            outcome,
            GalleryMutation {
                changed: true,
                persisted: false
            }
        );
        assert_eq!(gallery.artifacts(), &[art("A")]);
    }

    #[test]
    fn mutate_restores_uniqueness() {
        let mut gallery = GalleryStore::load(MemoryStorage::new());
        gallery.save(&art("A"));
        gallery.mutate(|artifacts| {
            artifacts.push(art("A"));
            artifacts.push(art("B"));
            true
        });
        assert_eq!(gallery.artifacts(), &[art("A"), art("B")]);
    }

    #[test]
    fn file_backed_gallery_survives_reload() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut gallery = GalleryStore::load(FileStorage::new(temp.path()));
        gallery.save(&art("A"));
        gallery.save(&art("B"));

        let reloaded = GalleryStore::load(FileStorage::new(temp.path()));
        assert_eq!(reloaded.artifacts(), &[art("B"), art("A")]);
        Ok(())
    }
}
