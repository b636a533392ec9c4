use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Post {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    pub username: String,
    /// Server-relative path with a `{size}` placeholder.
    pub avatar_template: String,
    pub created_at: String,
    /// Rendered HTML body.
    pub cooked: String,
}

impl Post {
    /// Absolute avatar URL for a square image of `size` pixels.
    pub fn avatar_url(&self, base_url: &str, size: u32) -> String {
        avatar_url(base_url, &self.avatar_template, size)
    }

    /// Display name, falling back to the username when no name is set.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.username,
        }
    }
}

pub(crate) fn avatar_url(base_url: &str, template: &str, size: u32) -> String {
    let path = template.replace("{size}", &size.to_string());
    if path.starts_with("http://") || path.starts_with("https://") {
        path
    } else if path.starts_with("//") {
        format!("https:{}", path)
    } else {
        format!("{}{}", base_url.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct PostList {
    #[serde(default)]
    pub can_create_post: bool,
    pub posts: Vec<Post>,
}
