use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Topic {
    pub id: i64,
    pub title: String,
    /// ISO-8601 timestamp of the most recent post.
    #[serde(default)]
    pub last_posted_at: Option<String>,
    #[serde(default)]
    pub views: i64,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub reply_count: i64,
    #[serde(default)]
    pub posts_count: i64,
    #[serde(default)]
    pub has_accepted_answer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct TopicList {
    pub can_create_topic: bool,
    pub topics: Vec<Topic>,
}
