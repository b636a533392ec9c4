//! HTTP client for the Discourse JSON API.
//!
//! This module provides the `RemoteResourceClient` trait the cache layer
//! fetches through, and `ForumClient`, its reqwest implementation.
//!
//! Each fetch is a single GET followed by a decode of one named top-level
//! key (`category_list`, `topic_list`, `post_stream`). Nothing here retries;
//! retry policy belongs to the caller.

pub mod client;
pub mod error;

pub use client::{ForumClient, RemoteResourceClient};
pub use error::FetchError;
