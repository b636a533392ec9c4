//! Category → topic → post navigation over cache-backed resources.
//!
//! Every call creates a new, independently owned resource. Two views of the
//! same topic get two resources that each read the cache and fetch; the
//! store's last-write-wins upsert keeps that safe.

use std::sync::Arc;

use crate::api::RemoteResourceClient;
use crate::models::{Category, CategoryList, PostList, Topic, TopicList};
use crate::resource::{CacheBackedResource, Subscription};
use crate::store::SharedStore;

pub const CATEGORY_LIST_KEY: &str = "categories.json";

pub fn topic_list_key(category_id: i64) -> String {
    format!("c/{}.json", category_id)
}

pub fn post_list_key(topic_id: i64) -> String {
    format!("t/{}.json", topic_id)
}

/// A selection made by the user, handed to the navigation flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationEvent {
    CategorySelected { id: i64, name: String },
    TopicSelected { id: i64, title: String },
}

impl From<&Category> for NavigationEvent {
    fn from(category: &Category) -> Self {
        NavigationEvent::CategorySelected {
            id: category.id,
            name: category.name.clone(),
        }
    }
}

impl From<&Topic> for NavigationEvent {
    fn from(topic: &Topic) -> Self {
        NavigationEvent::TopicSelected {
            id: topic.id,
            title: topic.title.clone(),
        }
    }
}

/// The child resource opened by a [`NavigationEvent`].
pub enum Opened {
    Topics(CacheBackedResource<TopicList>, Subscription<TopicList>),
    Posts(CacheBackedResource<PostList>, Subscription<PostList>),
}

pub struct ResourceHierarchy {
    store: SharedStore,
    client: Arc<dyn RemoteResourceClient>,
}

impl ResourceHierarchy {
    pub fn new(store: SharedStore, client: Arc<dyn RemoteResourceClient>) -> Self {
        Self { store, client }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn categories(&self) -> (CacheBackedResource<CategoryList>, Subscription<CategoryList>) {
        let client = self.client.clone();
        CacheBackedResource::new(CATEGORY_LIST_KEY, self.store.clone(), move || {
            let client = client.clone();
            async move { client.fetch_category_list().await }
        })
    }

    pub fn topics(&self, category_id: i64) -> (CacheBackedResource<TopicList>, Subscription<TopicList>) {
        let client = self.client.clone();
        CacheBackedResource::new(topic_list_key(category_id), self.store.clone(), move || {
            let client = client.clone();
            async move { client.fetch_topic_list(category_id).await }
        })
    }

    pub fn posts(&self, topic_id: i64) -> (CacheBackedResource<PostList>, Subscription<PostList>) {
        let client = self.client.clone();
        CacheBackedResource::new(post_list_key(topic_id), self.store.clone(), move || {
            let client = client.clone();
            async move { client.fetch_post_list(topic_id).await }
        })
    }

    pub fn open(&self, event: &NavigationEvent) -> Opened {
        match *event {
            NavigationEvent::CategorySelected { id, .. } => {
                let (resource, states) = self.topics(id);
                Opened::Topics(resource, states)
            }
            NavigationEvent::TopicSelected { id, .. } => {
                let (resource, states) = self.posts(id);
                Opened::Posts(resource, states)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceState;
    use crate::store::{load_json, save_json, MemoryStore};
    use crate::testing::{next_state, topic_list, wait_for_cached, FakeClient};

    fn setup(client: FakeClient) -> (ResourceHierarchy, Arc<FakeClient>) {
        let client = Arc::new(client);
        let store: SharedStore = Arc::new(MemoryStore::new());
        (ResourceHierarchy::new(store, client.clone()), client)
    }

    #[test]
    fn test_keys_are_substituted() {
        assert_eq!(CATEGORY_LIST_KEY, "categories.json");
        assert_eq!(topic_list_key(42), "c/42.json");
        assert_eq!(post_list_key(7), "t/7.json");
    }

    #[tokio::test]
    async fn test_categories_fetch_and_persist() {
        let (hierarchy, client) = setup(FakeClient::new());
        let (resource, _states) = hierarchy.categories();

        assert_eq!(resource.key(), "categories.json");
        assert_eq!(resource.settled().await, ResourceState::Loaded(client.categories.clone()));
        assert_eq!(client.requested(), vec!["categories.json".to_string()]);
        wait_for_cached(&**hierarchy.store(), "categories.json", &client.categories).await;
    }

    #[tokio::test]
    async fn test_topics_bind_category_id() {
        let (hierarchy, client) = setup(FakeClient::new());
        let (resource, _states) = hierarchy.topics(42);

        assert_eq!(resource.key(), "c/42.json");
        assert_eq!(resource.settled().await, ResourceState::Loaded(client.topics.clone()));
        assert_eq!(client.requested(), vec!["c/42.json".to_string()]);
    }

    #[tokio::test]
    async fn test_cached_topics_survive_failed_fetch() {
        let (hierarchy, _client) = setup(FakeClient::failing());
        let cached = topic_list(5);
        save_json(&**hierarchy.store(), "c/42.json", &cached).unwrap();

        let (resource, mut states) = hierarchy.topics(42);
        let settled = resource.settled().await;
        assert!(settled.error().unwrap().is_transport());
        assert_eq!(settled.value(), Some(&cached));

        assert_eq!(next_state(&mut states).await, ResourceState::Unknown);
        assert_eq!(next_state(&mut states).await, ResourceState::Loading(None));
        assert_eq!(next_state(&mut states).await, ResourceState::Loaded(cached.clone()));
    }

    #[tokio::test]
    async fn test_same_topic_twice_is_independent() {
        let (hierarchy, client) = setup(FakeClient::new());
        let (first, _first_states) = hierarchy.posts(7);
        let (second, _second_states) = hierarchy.posts(7);

        assert_eq!(first.settled().await, ResourceState::Loaded(client.posts.clone()));
        assert_eq!(second.settled().await, ResourceState::Loaded(client.posts.clone()));
        assert_eq!(client.calls(), 2);

        drop(first);
        second.refresh();
        assert_eq!(second.settled().await, ResourceState::Loaded(client.posts.clone()));
        assert_eq!(client.calls(), 3);

        wait_for_cached(&**hierarchy.store(), "t/7.json", &client.posts).await;
        assert!(load_json::<PostList>(&**hierarchy.store(), "t/7.json").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_open_routes_navigation_events() {
        let (hierarchy, client) = setup(FakeClient::new());

        let category = &client.categories.categories[1];
        match hierarchy.open(&NavigationEvent::from(category)) {
            Opened::Topics(resource, _) => assert_eq!(resource.key(), format!("c/{}.json", category.id)),
            Opened::Posts(..) => panic!("category selection opened posts"),
        }

        let topic = &client.topics.topics[0];
        let event = NavigationEvent::from(topic);
        assert_eq!(
            event,
            NavigationEvent::TopicSelected {
                id: topic.id,
                title: topic.title.clone()
            }
        );
        match hierarchy.open(&event) {
            Opened::Posts(resource, _) => assert_eq!(resource.key(), format!("t/{}.json", topic.id)),
            Opened::Topics(..) => panic!("topic selection opened topics"),
        }
    }
}
