//! Authentication collaborator.
//!
//! This module provides:
//! - `AuthStatus`: the observable login state
//! - `Authenticator`: login/logout contract consumed by front ends
//! - `SessionAuthenticator`: cookie-based login against the forum, with the
//!   session persisted in the cache directory
//!
//! Credentials themselves are never stored.

pub mod session;

use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::api::ForumClient;

pub use session::{Session, SessionData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Unknown,
    LoggingIn,
    LoggedIn,
    LoggedOut,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Unable to connect to server: {0}")]
    Transport(String),

    #[error("Login failed: {0}")]
    Unknown(String),
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Current status plus every later change.
    fn status(&self) -> watch::Receiver<AuthStatus>;

    async fn login(&self, username: &str, password: &str) -> Result<(), AuthError>;

    async fn logout(&self);
}

pub struct SessionAuthenticator {
    client: ForumClient,
    session: Mutex<Session>,
    status: watch::Sender<AuthStatus>,
}

impl SessionAuthenticator {
    /// Restore any saved session from `cache_dir`.
    pub fn new(client: ForumClient, cache_dir: PathBuf) -> Self {
        let mut session = Session::new(cache_dir);
        if let Err(e) = session.load() {
            warn!(error = %e, "Failed to load saved session");
        }

        let initial = if session.is_valid() {
            AuthStatus::LoggedIn
        } else {
            AuthStatus::LoggedOut
        };
        let (status, _) = watch::channel(initial);

        Self {
            client,
            session: Mutex::new(session),
            status,
        }
    }

    /// Cookie to attach to API requests, if logged in.
    pub fn session_cookie(&self) -> Option<String> {
        self.session.lock().token().map(str::to_string)
    }

    pub fn username(&self) -> Option<String> {
        self.session.lock().data.as_ref().map(|d| d.username.clone())
    }
}

#[async_trait]
impl Authenticator for SessionAuthenticator {
    fn status(&self) -> watch::Receiver<AuthStatus> {
        self.status.subscribe()
    }

    async fn login(&self, username: &str, password: &str) -> Result<(), AuthError> {
        self.status.send_replace(AuthStatus::LoggingIn);

        match self.client.authenticate(username, password).await {
            Ok(data) => {
                let mut session = self.session.lock();
                session.update(data);
                if let Err(e) = session.save() {
                    warn!(error = %e, "Failed to save session");
                }
                drop(session);

                self.status.send_replace(AuthStatus::LoggedIn);
                info!(username = username, "Login successful");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                self.status.send_replace(AuthStatus::LoggedOut);
                Err(e)
            }
        }
    }

    async fn logout(&self) {
        if *self.status.borrow() == AuthStatus::LoggedIn {
            if let Err(e) = self.session.lock().clear() {
                warn!(error = %e, "Failed to remove saved session");
            }
            info!("Logged out");
        }
        self.status.send_replace(AuthStatus::LoggedOut);
    }
}
