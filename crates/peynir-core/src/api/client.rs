//! API client for communicating with a Discourse forum.
//!
//! `ForumClient` issues the GET requests behind the three resource levels
//! (categories, topics in a category, posts in a topic), downloads avatar
//! blobs, and performs the cookie-based login.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, redirect, Client};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use tracing::debug;

use crate::auth::{AuthError, SessionData};
use crate::models::{Category, CategoryList, Post, PostList, Topic, TopicList};

use super::FetchError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Login endpoint, relative to the forum base URL.
const LOGIN_PATH: &str = "auth/ldap/callback";

/// Name of the cookie Discourse sets for an authenticated session.
const SESSION_COOKIE: &str = "_t";

/// Marker the forum puts in the redirect target after a rejected login.
const INVALID_CREDENTIALS_MARKER: &str = "invalid_credentials";

/// Fetch operations the cache layer depends on.
#[async_trait]
pub trait RemoteResourceClient: Send + Sync {
    /// Forum root, without a trailing slash.
    fn base_url(&self) -> &str;

    async fn fetch_category_list(&self) -> Result<CategoryList, FetchError>;

    async fn fetch_topic_list(&self, category_id: i64) -> Result<TopicList, FetchError>;

    async fn fetch_post_list(&self, topic_id: i64) -> Result<PostList, FetchError>;

    /// Download an arbitrary binary resource such as an avatar image.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Forum API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ForumClient {
    client: Client,
    login_client: Client,
    base_url: String,
    session_cookie: Option<String>,
}

impl ForumClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        // The session cookie arrives on the redirect response itself, so the
        // login request must not follow redirects.
        let login_client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            login_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_cookie: None,
        })
    }

    /// Attach (or with `None`, drop) the session cookie sent on every request.
    pub fn set_session_cookie(&mut self, token: Option<String>) {
        self.session_cookie = token;
    }

    /// POST the login form and capture the session cookie.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<SessionData, AuthError> {
        let url = format!("{}/{}", self.base_url, LOGIN_PATH);

        let response = self
            .login_client
            .post(&url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        if let Some(token) = Self::session_cookie_from(response.headers()) {
            return Ok(SessionData {
                token,
                username: username.to_string(),
                created_at: Utc::now(),
            });
        }

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if location.contains(INVALID_CREDENTIALS_MARKER)
            || response.url().as_str().contains(INVALID_CREDENTIALS_MARKER)
        {
            Err(AuthError::InvalidCredentials)
        } else {
            Err(AuthError::Unknown(format!(
                "no session cookie in response (status {})",
                response.status()
            )))
        }
    }

    /// Find a non-empty `_t` cookie among the `Set-Cookie` headers.
    fn session_cookie_from(headers: &header::HeaderMap) -> Option<String> {
        headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|cookie| cookie.split(';').next())
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
            .map(|(_, value)| value.to_string())
    }

    fn session_headers(&self) -> Result<header::HeaderMap, FetchError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        if let Some(ref token) = self.session_cookie {
            let cookie = header::HeaderValue::from_str(&format!("{}={}", SESSION_COOKIE, token))
                .map_err(|_| FetchError::Transport("session cookie is not a valid header".to_string()))?;
            headers.insert(header::COOKIE, cookie);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, FetchError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(FetchError::from_status(status, &body))
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value, FetchError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(url = %url, "GET");

        let response = self
            .client
            .get(&url)
            .headers(self.session_headers()?)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let response = Self::check_response(response).await?;
        let body = response.bytes().await?;

        serde_json::from_slice(&body)
            .map_err(|e| FetchError::Decode(format!("{} is not valid JSON: {}", url, e)))
    }
}

#[async_trait]
impl RemoteResourceClient for ForumClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch_category_list(&self) -> Result<CategoryList, FetchError> {
        let body = self.get_json("categories.json").await?;
        decode_category_list(&body)
    }

    async fn fetch_topic_list(&self, category_id: i64) -> Result<TopicList, FetchError> {
        let body = self.get_json(&format!("c/{}.json", category_id)).await?;
        decode_topic_list(&body)
    }

    async fn fetch_post_list(&self, topic_id: i64) -> Result<PostList, FetchError> {
        let body = self.get_json(&format!("t/{}.json", topic_id)).await?;
        decode_post_list(&body)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!(url = %url, "GET (bytes)");
        let response = self
            .client
            .get(url)
            .headers(self.session_headers()?)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let response = Self::check_response(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode the value under one top-level key of a response document.
fn extract<T: DeserializeOwned>(body: &Value, key: &str) -> Result<T, FetchError> {
    let section = body
        .get(key)
        .ok_or_else(|| FetchError::Decode(format!("response has no `{}`", key)))?;
    T::deserialize(section).map_err(|e| FetchError::Decode(format!("malformed `{}`: {}", key, e)))
}

pub(crate) fn decode_category_list(body: &Value) -> Result<CategoryList, FetchError> {
    let wire: CategoryListApi = extract(body, "category_list")?;
    Ok(CategoryList {
        can_create_category: wire.can_create_category,
        categories: wire.categories.into_iter().map(Category::from).collect(),
    })
}

pub(crate) fn decode_topic_list(body: &Value) -> Result<TopicList, FetchError> {
    let wire: TopicListApi = extract(body, "topic_list")?;
    Ok(TopicList {
        can_create_topic: wire.can_create_topic,
        topics: wire.topics.into_iter().map(Topic::from).collect(),
    })
}

pub(crate) fn decode_post_list(body: &Value) -> Result<PostList, FetchError> {
    let wire: PostStreamApi = extract(body, "post_stream")?;
    let can_create_post = body
        .get("details")
        .and_then(|d| d.get("can_create_post"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(PostList {
        can_create_post,
        posts: wire.posts.into_iter().map(Post::from).collect(),
    })
}

// Internal API response types for parsing

#[derive(Debug, Deserialize)]
struct CategoryListApi {
    #[serde(default)]
    can_create_category: bool,
    categories: Vec<CategoryApi>,
}

#[derive(Debug, Deserialize)]
struct CategoryApi {
    id: i64,
    name: String,
    slug: Option<String>,
    color: Option<String>,
    description: Option<String>,
    #[serde(default)]
    topic_count: i64,
}

impl From<CategoryApi> for Category {
    fn from(api: CategoryApi) -> Self {
        Category {
            id: api.id,
            name: api.name,
            slug: api.slug,
            color: api.color,
            description: api.description,
            topic_count: api.topic_count,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TopicListApi {
    #[serde(default)]
    can_create_topic: bool,
    topics: Vec<TopicApi>,
}

#[derive(Debug, Deserialize)]
struct TopicApi {
    id: i64,
    title: String,
    last_posted_at: Option<String>,
    #[serde(default)]
    views: i64,
    #[serde(default)]
    like_count: i64,
    #[serde(default)]
    reply_count: i64,
    #[serde(default)]
    posts_count: i64,
    #[serde(default)]
    has_accepted_answer: bool,
}

impl From<TopicApi> for Topic {
    fn from(api: TopicApi) -> Self {
        Topic {
            id: api.id,
            title: api.title,
            last_posted_at: api.last_posted_at,
            views: api.views,
            like_count: api.like_count,
            reply_count: api.reply_count,
            posts_count: api.posts_count,
            has_accepted_answer: api.has_accepted_answer,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostStreamApi {
    posts: Vec<PostApi>,
}

#[derive(Debug, Deserialize)]
struct PostApi {
    id: i64,
    name: Option<String>,
    username: String,
    avatar_template: String,
    created_at: String,
    cooked: String,
}

impl From<PostApi> for Post {
    fn from(api: PostApi) -> Self {
        Post {
            id: api.id,
            name: api.name,
            username: api.username,
            avatar_template: api.avatar_template,
            created_at: api.created_at,
            cooked: api.cooked,
        }
    }
}
