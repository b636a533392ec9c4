//! Peynir core - offline-first caching for Discourse forums.
//!
//! Category, topic and post lists are served from a local cache first and
//! then refreshed from the forum. Front ends observe each list as a stream
//! of [`ResourceState`] values.

pub mod api;
pub mod assets;
pub mod auth;
pub mod config;
pub mod hierarchy;
pub mod maintenance;
pub mod models;
pub mod resource;
pub mod store;
pub mod utils;

#[cfg(test)]
mod testing;

pub use api::{FetchError, ForumClient, RemoteResourceClient};
pub use assets::AssetCache;
pub use auth::{AuthError, AuthStatus, Authenticator, SessionAuthenticator};
pub use config::Config;
pub use hierarchy::{NavigationEvent, Opened, ResourceHierarchy};
pub use maintenance::{CacheMaintenance, StoreUsage};
pub use resource::{CacheBackedResource, ResourceState, Subscription};
pub use store::{FileStore, KeyValueStore, MemoryStore, SharedStore, StorageError};
