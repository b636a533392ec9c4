//! Cache size reporting and the user-facing "free up space" action.

use tracing::{info, warn};

use crate::store::{KeyValueStore, SharedStore, StorageError};

/// Per-component breakdown of the space a store uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreUsage {
    /// Structured documents (category, topic and post lists).
    pub documents_bytes: u64,
    /// Blob groups by name, sorted.
    pub groups: Vec<(String, u64)>,
    pub total_bytes: u64,
}

/// Measure every component of `store`.
///
/// A component that cannot be measured is logged and counted as zero. The
/// call fails only when no component could be measured at all. A group
/// listing that succeeds but is empty counts as measured.
pub fn measure_usage<S: KeyValueStore + ?Sized>(store: &S) -> Result<StoreUsage, StorageError> {
    let mut usage = StoreUsage::default();
    let mut measured = 0usize;
    let mut last_error = None;

    match store.component_size_bytes(None) {
        Ok(bytes) => {
            usage.documents_bytes = bytes;
            measured += 1;
        }
        Err(e) => {
            warn!(error = %e, "Failed to measure cached documents");
            last_error = Some(e);
        }
    }

    match store.groups() {
        Ok(groups) => {
            if groups.is_empty() {
                measured += 1;
            }
            for group in groups {
                match store.component_size_bytes(Some(&group)) {
                    Ok(bytes) => {
                        usage.groups.push((group, bytes));
                        measured += 1;
                    }
                    Err(e) => {
                        warn!(group = %group, error = %e, "Failed to measure cache group");
                        usage.groups.push((group, 0));
                        last_error = Some(e);
                    }
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "Failed to list cache groups");
            last_error = Some(e);
        }
    }

    if measured == 0 {
        if let Some(e) = last_error {
            return Err(e);
        }
    }

    usage.total_bytes = usage.documents_bytes + usage.groups.iter().map(|(_, b)| b).sum::<u64>();
    Ok(usage)
}

pub struct CacheMaintenance {
    store: SharedStore,
}

impl CacheMaintenance {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn cache_size(&self) -> Result<u64, StorageError> {
        self.store.total_size_bytes()
    }

    pub fn usage(&self) -> Result<StoreUsage, StorageError> {
        measure_usage(&*self.store)
    }

    /// Delete everything the store manages. Safe while resources are live;
    /// their later cache reads simply miss.
    pub fn clear_cache(&self) -> Result<(), StorageError> {
        let before = self.cache_size().ok();
        self.store.delete_all(None)?;
        info!(freed_bytes = ?before, "Cache cleared");
        Ok(())
    }
}
