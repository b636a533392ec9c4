use std::collections::HashMap;

use parking_lot::RwLock;

use super::{normalize_group, validate_group, validate_key, CacheEntry, KeyValueStore, StorageError};

type EntryKey = (Option<String>, String);

/// In-process store. Nothing survives the process; used for ephemeral
/// sessions and tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<EntryKey, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn entry_key(key: &str, group: Option<&str>) -> Result<EntryKey, StorageError> {
        validate_key(key)?;
        let group = normalize_group(group);
        if let Some(group) = group {
            validate_group(group)?;
        }
        Ok((group.map(str::to_string), key.to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn put(&self, key: &str, group: Option<&str>, payload: &[u8]) -> Result<(), StorageError> {
        let entry_key = Self::entry_key(key, group)?;
        let entry = CacheEntry::new(key, normalize_group(group), payload.to_vec());
        self.entries.write().insert(entry_key, entry);
        Ok(())
    }

    fn get_entry(&self, key: &str, group: Option<&str>) -> Result<CacheEntry, StorageError> {
        let entry_key = Self::entry_key(key, group)?;
        self.entries
            .read()
            .get(&entry_key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn delete_all(&self, group: Option<&str>) -> Result<(), StorageError> {
        let mut entries = self.entries.write();
        match normalize_group(group) {
            Some(group) => entries.retain(|(g, _), _| g.as_deref() != Some(group)),
            None => entries.clear(),
        }
        Ok(())
    }

    fn component_size_bytes(&self, group: Option<&str>) -> Result<u64, StorageError> {
        let group = normalize_group(group);
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|((g, _), _)| g.as_deref() == group)
            .map(|(_, entry)| entry.payload.len() as u64)
            .sum())
    }

    fn groups(&self) -> Result<Vec<String>, StorageError> {
        let mut groups: Vec<String> = self
            .entries
            .read()
            .keys()
            .filter_map(|(g, _)| g.clone())
            .collect();
        groups.sort();
        groups.dedup();
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_and_groups() {
        let store = MemoryStore::new();
        store.put("categories.json", None, b"[]").unwrap();
        store.put("avatar_amy_90.png", Some("avatars"), b"png").unwrap();
        store.put("9@375.0.png", Some("snapshots"), b"png").unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.get("categories.json", None).unwrap(), b"[]");
        assert_eq!(
            store.groups().unwrap(),
            vec!["avatars".to_string(), "snapshots".to_string()]
        );
    }

    #[test]
    fn test_delete_all_scoped_and_full() {
        let store = MemoryStore::new();
        store.put("categories.json", None, b"[]").unwrap();
        store.put("avatar_amy_90.png", Some("avatars"), b"png").unwrap();

        store.delete_all(Some("avatars")).unwrap();
        assert_eq!(store.len(), 1);

        store.delete_all(None).unwrap();
        assert!(store.is_empty());
        assert!(store.get("categories.json", None).unwrap_err().is_not_found());
    }

    #[test]
    fn test_sizes_per_component() {
        let store = MemoryStore::new();
        store.put("categories.json", None, &[1; 10]).unwrap();
        store.put("avatar_amy_90.png", Some("avatars"), &[1; 4]).unwrap();

        assert_eq!(store.component_size_bytes(None).unwrap(), 10);
        assert_eq!(store.component_size_bytes(Some("avatars")).unwrap(), 4);
        assert_eq!(store.total_size_bytes().unwrap(), 14);
    }
}
