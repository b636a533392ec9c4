//! Stale-while-revalidate resources.
//!
//! A [`CacheBackedResource`] owns the observable state of one remote
//! document. On creation it shows the cached copy (if any) and then always
//! fetches a fresh one, persisting it on success. All state changes for one
//! resource run on a single task; cache I/O and network fetches run
//! elsewhere and report back to it tagged with a generation number, so a
//! superseded fetch can never overwrite a newer one.

pub mod cache_backed;
pub mod state;
pub mod subscription;

use serde::{de::DeserializeOwned, Serialize};

pub use cache_backed::CacheBackedResource;
pub use state::ResourceState;
pub use subscription::Subscription;

/// Values a resource can hold: cloneable for every observer, comparable for
/// duplicate suppression, and JSON-serializable for the cache.
pub trait ResourceValue:
    Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> ResourceValue for T where
    T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
}
