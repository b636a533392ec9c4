//! Binary assets kept in named store groups: user avatars and rendered
//! page snapshots.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::{FetchError, RemoteResourceClient};
use crate::models::post::avatar_url;
use crate::store::{SharedStore, StorageError};

pub const AVATARS_GROUP: &str = "avatars";
pub const SNAPSHOTS_GROUP: &str = "snapshots";

/// Key of a snapshot rendered at `width` points, e.g. `"123@320.0.png"`.
pub fn snapshot_key(id: i64, width: f64) -> String {
    format!("{}@{:?}.png", id, width)
}

pub fn avatar_key(username: &str, size: u32) -> String {
    format!("avatar_{}_{}.png", username, size)
}

pub struct AssetCache {
    store: SharedStore,
    client: Arc<dyn RemoteResourceClient>,
}

impl AssetCache {
    pub fn new(store: SharedStore, client: Arc<dyn RemoteResourceClient>) -> Self {
        Self { store, client }
    }

    /// Avatar image bytes, from the cache if present, otherwise downloaded
    /// and cached.
    pub async fn avatar(&self, username: &str, template: &str, size: u32) -> Result<Vec<u8>, FetchError> {
        let key = avatar_key(username, size);

        match self.read(&key, AVATARS_GROUP).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.is_not_found() => debug!(key = %key, "Avatar not cached"),
            Err(e) => warn!(key = %key, error = %e, "Failed to read cached avatar"),
        }

        let url = avatar_url(self.client.base_url(), template, size);
        let bytes = self.client.fetch_bytes(&url).await?;

        if let Err(e) = self.write(&key, AVATARS_GROUP, bytes.clone()).await {
            warn!(key = %key, error = %e, "Failed to cache avatar");
        }
        Ok(bytes)
    }

    pub async fn save_snapshot(&self, id: i64, width: f64, png: Vec<u8>) -> Result<(), StorageError> {
        self.write(&snapshot_key(id, width), SNAPSHOTS_GROUP, png).await
    }

    /// Cached snapshot, or `None` when there is none or it cannot be read.
    pub async fn snapshot(&self, id: i64, width: f64) -> Option<Vec<u8>> {
        let key = snapshot_key(id, width);
        match self.read(&key, SNAPSHOTS_GROUP).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                if !e.is_not_found() {
                    warn!(key = %key, error = %e, "Failed to read snapshot");
                }
                None
            }
        }
    }

    async fn read(&self, key: &str, group: &'static str) -> Result<Vec<u8>, StorageError> {
        let store = self.store.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.get(&key, Some(group)))
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?
    }

    async fn write(&self, key: &str, group: &'static str, payload: Vec<u8>) -> Result<(), StorageError> {
        let store = self.store.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.put(&key, Some(group), &payload))
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?
    }
}
