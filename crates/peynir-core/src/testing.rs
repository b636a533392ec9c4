//! Fixtures shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;

use crate::api::{FetchError, RemoteResourceClient};
use crate::models::{Category, CategoryList, Post, PostList, Topic, TopicList};
use crate::resource::{ResourceState, Subscription};
use crate::store::{load_json, KeyValueStore};

pub type Reply<T> = oneshot::Sender<Result<T, FetchError>>;

/// A fetch whose results the test supplies, one reply per call, in call
/// order. Replies can be sent before or after the call happens.
pub fn scripted<T: Send + 'static>(
    count: usize,
) -> (
    impl Fn() -> BoxFuture<'static, Result<T, FetchError>> + Send + Sync + 'static,
    Vec<Reply<T>>,
) {
    let mut replies = Vec::with_capacity(count);
    let mut pending = VecDeque::with_capacity(count);
    for _ in 0..count {
        let (tx, rx) = oneshot::channel();
        replies.push(tx);
        pending.push_back(rx);
    }
    let pending = Mutex::new(pending);

    let fetch = move || {
        let reply = pending.lock().pop_front();
        async move {
            match reply {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(FetchError::Transport("reply dropped".to_string()))),
                None => Err(FetchError::Transport("unexpected fetch".to_string())),
            }
        }
        .boxed()
    };
    (fetch, replies)
}

pub async fn next_state<T>(states: &mut Subscription<T>) -> ResourceState<T> {
    tokio::time::timeout(Duration::from_secs(5), states.next_state())
        .await
        .expect("timed out waiting for a state")
        .expect("subscription ended")
}

/// Poll until the background cache write for `key` has landed.
pub async fn wait_for_cached<T>(store: &dyn KeyValueStore, key: &str, expected: &T)
where
    T: DeserializeOwned + PartialEq + std::fmt::Debug,
{
    for _ in 0..200 {
        if let Ok(Some(cached)) = load_json::<T>(store, key) {
            if &cached.data == expected {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("cache entry {} never reached {:?}", key, expected);
}

pub fn category_list(count: i64) -> CategoryList {
    CategoryList {
        can_create_category: false,
        categories: (1..=count)
            .map(|id| Category {
                id,
                name: format!("Category {}", id),
                slug: Some(format!("category-{}", id)),
                color: Some("0088CC".to_string()),
                description: None,
                topic_count: id * 10,
            })
            .collect(),
    }
}

pub fn topic_list(count: i64) -> TopicList {
    TopicList {
        can_create_topic: true,
        topics: (1..=count)
            .map(|id| Topic {
                id,
                title: format!("Topic {}", id),
                last_posted_at: Some("2026-01-02T03:04:05.000Z".to_string()),
                views: 100 + id,
                like_count: id,
                reply_count: id - 1,
                posts_count: id,
                has_accepted_answer: false,
            })
            .collect(),
    }
}

pub fn post_list(count: i64) -> PostList {
    PostList {
        can_create_post: true,
        posts: (1..=count)
            .map(|id| Post {
                id,
                name: None,
                username: format!("user{}", id),
                avatar_template: "/user_avatar/forum.example.com/user/{size}/1_2.png".to_string(),
                created_at: "2026-01-02T03:04:05.000Z".to_string(),
                cooked: format!("<p>Post {}</p>", id),
            })
            .collect(),
    }
}

/// Remote client serving canned lists and counting every call.
pub struct FakeClient {
    pub categories: CategoryList,
    pub topics: TopicList,
    pub posts: PostList,
    pub avatar: Vec<u8>,
    pub fail: bool,
    calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self {
            categories: category_list(3),
            topics: topic_list(5),
            posts: post_list(2),
            avatar: b"\x89PNG avatar".to_vec(),
            fail: false,
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Paths and URLs requested so far, in order.
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().clone()
    }

    fn record<T: Clone>(&self, request: String, value: &T) -> Result<T, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().push(request);
        if self.fail {
            Err(FetchError::Transport("network unreachable".to_string()))
        } else {
            Ok(value.clone())
        }
    }
}

#[async_trait]
impl RemoteResourceClient for FakeClient {
    fn base_url(&self) -> &str {
        "https://forum.example.com"
    }

    async fn fetch_category_list(&self) -> Result<CategoryList, FetchError> {
        self.record("categories.json".to_string(), &self.categories)
    }

    async fn fetch_topic_list(&self, category_id: i64) -> Result<TopicList, FetchError> {
        self.record(format!("c/{}.json", category_id), &self.topics)
    }

    async fn fetch_post_list(&self, topic_id: i64) -> Result<PostList, FetchError> {
        self.record(format!("t/{}.json", topic_id), &self.posts)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.record(url.to_string(), &self.avatar)
    }
}
