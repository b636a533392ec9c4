use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::file::write_atomic;

const SESSION_FILE: &str = "session.json";

/// Discourse keeps an idle `_t` cookie valid for 60 days.
const TOKEN_EXPIRY_DAYS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    /// Value of the `_t` session cookie.
    pub token: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.created_at + Duration::days(TOKEN_EXPIRY_DAYS)
    }
}

/// The persisted login, stored as `session.json` in the cache directory.
pub struct Session {
    path: PathBuf,
    pub data: Option<SessionData>,
}

impl Session {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            path: cache_dir.join(SESSION_FILE),
            data: None,
        }
    }

    /// Read the session file. Returns whether an unexpired session was found.
    pub fn load(&mut self) -> Result<bool> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e).context("Failed to read session file"),
        };
        let data: SessionData =
            serde_json::from_slice(&contents).context("Failed to parse session file")?;

        if data.is_expired() {
            debug!(username = %data.username, "Stored session has expired");
            return Ok(false);
        }
        self.data = Some(data);
        Ok(true)
    }

    /// Write the session through a temp file and rename, so a crash never
    /// leaves a truncated session behind.
    pub fn save(&self) -> Result<()> {
        let Some(data) = &self.data else {
            return Ok(());
        };
        let contents = serde_json::to_vec_pretty(data)?;
        write_atomic(&self.path, &contents).context("Failed to write session file")
    }

    pub fn clear(&mut self) -> Result<()> {
        self.data = None;
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                Err(e).context("Failed to remove session file")
            }
            _ => Ok(()),
        }
    }

    pub fn update(&mut self, data: SessionData) {
        self.data = Some(data);
    }

    pub fn token(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.token.as_str())
    }

    pub fn is_valid(&self) -> bool {
        self.data.as_ref().is_some_and(|d| !d.is_expired())
    }
}
