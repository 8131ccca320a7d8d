//! In-memory repository.

use crate::repository::{assign_id, check_version, require_id, Repository};
use datasync_core::{TableData, TableError, TableResult, Version};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// A repository that keeps entities in a hash map.
///
/// Suitable for tests and for tables that do not need to survive a restart.
/// Conflicts are detected by comparing version bytes under the write lock.
///
/// # Example
///
/// ```rust
/// use datasync_core::TableData;
/// use datasync_storage::{InMemoryRepository, Repository};
///
/// let repo = InMemoryRepository::new();
/// let stored = repo.create(TableData::new("m1").with_property("title", "Heat")).unwrap();
/// assert!(!stored.version.is_empty());
/// assert_eq!(repo.read("m1").unwrap(), stored);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    entities: RwLock<HashMap<String, TableData>>,
}

impl InMemoryRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository holding `entities` exactly as given.
    ///
    /// Entities without a version are stamped. Useful for seeding fixtures.
    #[must_use]
    pub fn with_entities(entities: impl IntoIterator<Item = TableData>) -> Self {
        let map = entities
            .into_iter()
            .map(|mut entity| {
                if entity.version.is_empty() {
                    entity.stamp(None);
                }
                (entity.id.clone(), entity)
            })
            .collect();
        Self {
            entities: RwLock::new(map),
        }
    }

    /// Removes every entity.
    pub fn clear(&self) {
        self.entities.write().clear();
    }
}

impl Repository for InMemoryRepository {
    fn query(&self) -> TableResult<Vec<TableData>> {
        Ok(self.entities.read().values().cloned().collect())
    }

    fn create(&self, mut entity: TableData) -> TableResult<TableData> {
        assign_id(&mut entity);
        let mut entities = self.entities.write();
        if let Some(existing) = entities.get(&entity.id) {
            debug!(id = %entity.id, "create conflict");
            return Err(TableError::conflict(existing.clone()));
        }
        entity.stamp(None);
        entities.insert(entity.id.clone(), entity.clone());
        Ok(entity)
    }

    fn read(&self, id: &str) -> TableResult<TableData> {
        require_id(id)?;
        self.entities
            .read()
            .get(id)
            .cloned()
            .ok_or(TableError::NotFound)
    }

    fn replace(&self, mut entity: TableData, version: Option<&Version>) -> TableResult<TableData> {
        require_id(&entity.id)?;
        let mut entities = self.entities.write();
        let stored = entities.get(&entity.id).ok_or(TableError::NotFound)?;
        check_version(stored, version)?;
        entity.stamp(Some(&stored.updated_at));
        entities.insert(entity.id.clone(), entity.clone());
        Ok(entity)
    }

    fn delete(&self, id: &str, version: Option<&Version>) -> TableResult<()> {
        require_id(id)?;
        let mut entities = self.entities.write();
        let stored = entities.get(id).ok_or(TableError::NotFound)?;
        check_version(stored, version)?;
        entities.remove(id);
        Ok(())
    }

    fn count(&self) -> TableResult<usize> {
        Ok(self.entities.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn memory_create_assigns_id_and_version() {
        let repo = InMemoryRepository::new();
        let stored = repo.create(TableData::new("")).unwrap();
        assert!(!stored.id.is_empty());
        assert!(!stored.version.is_empty());
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn memory_returns_disconnected_copies() {
        let repo = InMemoryRepository::new();
        repo.create(TableData::new("a").with_property("n", 1)).unwrap();

        let mut copy = repo.read("a").unwrap();
        copy.properties.insert("n".into(), 2.into());
        assert_eq!(repo.read("a").unwrap().property("n"), Some(&1.into()));
    }

    #[test]
    fn memory_seeded_entities_keep_versions() {
        let mut seeded = TableData::new("s");
        seeded.version = Version::new(vec![7]);
        let repo = InMemoryRepository::with_entities([seeded.clone(), TableData::new("t")]);

        assert_eq!(repo.read("s").unwrap(), seeded);
        assert!(!repo.read("t").unwrap().version.is_empty());
    }

    #[test]
    fn memory_clear() {
        let repo = InMemoryRepository::with_entities([TableData::new("a")]);
        repo.clear();
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn memory_concurrent_replace_has_one_winner() {
        let repo = Arc::new(InMemoryRepository::new());
        let original = repo.create(TableData::new("race")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = Arc::clone(&repo);
                let version = original.version.clone();
                thread::spawn(move || {
                    let entity = TableData::new("race").with_property("writer", i);
                    repo.replace(entity, Some(&version)).is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
