//! Data models for forum entities.
//!
//! These are the domain records the cache persists and observers render:
//!
//! - `Category` / `CategoryList`: top-level forum sections
//! - `Topic` / `TopicList`: threads within one category
//! - `Post` / `PostList`: the post stream of one topic
//!
//! The cache schema uses camelCase field names. The snake_case wire schema
//! is decoded by private structs in the `api` module and converted into
//! these types.

pub mod category;
pub mod post;
pub mod topic;

pub use category::{Category, CategoryList};
pub use post::{Post, PostList};
pub use topic::{Topic, TopicList};
