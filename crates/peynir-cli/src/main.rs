//! Peynir - read Discourse forums from the terminal, online or offline.
//!
//! Every listing is printed from the local cache first (when present) and
//! then from the forum. If the forum cannot be reached the cached copy is
//! still shown.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use peynir_core::auth::{AuthStatus, Authenticator, SessionAuthenticator};
use peynir_core::models::{CategoryList, PostList, TopicList};
use peynir_core::resource::ResourceValue;
use peynir_core::utils::{format_file_size, strip_html, time_ago, TimeMode};
use peynir_core::{
    AssetCache, CacheBackedResource, CacheMaintenance, Config, FileStore, ForumClient,
    MemoryStore, NavigationEvent, Opened, RemoteResourceClient, ResourceHierarchy,
    ResourceState, SharedStore, Subscription,
};

/// Avatar edge length in pixels when warming the avatar cache
const AVATAR_SIZE: u32 = 90;

#[derive(Parser)]
#[command(name = "peynir", version, about = "Offline-first Discourse forum reader")]
struct Cli {
    /// Forum root URL, e.g. https://meta.discourse.org
    #[arg(long, env = "PEYNIR_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Keep the cache in memory for this run only
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List categories
    Categories {
        /// Fetch a second time after the first fetch settles
        #[arg(long)]
        refresh: bool,
    },
    /// List topics in a category
    Topics {
        category_id: i64,
        #[arg(long)]
        refresh: bool,
    },
    /// Show the posts of a topic
    Posts {
        topic_id: i64,
        #[arg(long)]
        refresh: bool,
        /// Also download and cache poster avatars
        #[arg(long)]
        avatars: bool,
    },
    /// Show how much disk space the cache uses
    CacheSize,
    /// Delete everything in the cache
    ClearCache,
    /// Log in and save the session
    Login { username: Option<String> },
    /// Forget the saved session
    Logout,
    /// Show the login status
    Status,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> tracing_appender::non_blocking::WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=peynir_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();

    guard
}

/// Everything a command needs, wired once at startup.
struct App {
    config: Config,
    cache_dir: PathBuf,
    store: SharedStore,
    client: ForumClient,
    auth: SessionAuthenticator,
}

impl App {
    fn new(cli: &Cli) -> Result<Self> {
        let mut config = Config::load().context("Failed to load config")?;

        let base_url = match cli.base_url.as_deref().or(config.base_url.as_deref()) {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => bail!("No forum configured. Pass --base-url or set PEYNIR_BASE_URL."),
        };
        if config.base_url.as_deref() != Some(base_url.as_str()) {
            config.base_url = Some(base_url.clone());
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
        }

        let cache_dir = config.cache_dir()?;
        let store: SharedStore = if cli.ephemeral {
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(FileStore::new(cache_dir.join("store")).context("Failed to open cache")?)
        };

        let mut client = ForumClient::new(&base_url)?;
        let auth = SessionAuthenticator::new(client.clone(), cache_dir.clone());
        client.set_session_cookie(auth.session_cookie());

        info!(base_url = %base_url, cache_dir = %cache_dir.display(), "Ready");
        Ok(Self {
            config,
            cache_dir,
            store,
            client,
            auth,
        })
    }

    fn hierarchy(&self) -> ResourceHierarchy {
        ResourceHierarchy::new(self.store.clone(), Arc::new(self.client.clone()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing();

    let mut ctx = App::new(&cli)?;

    match cli.command {
        Command::Categories { refresh } => {
            let (resource, states) = ctx.hierarchy().categories();
            let list = watch(resource, states, refresh).await;
            if let Some(list) = list {
                print_categories(&list);
            }
        }
        Command::Topics { category_id, refresh } => {
            let event = NavigationEvent::CategorySelected {
                id: category_id,
                name: String::new(),
            };
            if let Opened::Topics(resource, states) = ctx.hierarchy().open(&event) {
                if let Some(list) = watch(resource, states, refresh).await {
                    print_topics(&list);
                }
            }
        }
        Command::Posts {
            topic_id,
            refresh,
            avatars,
        } => {
            let (resource, states) = ctx.hierarchy().posts(topic_id);
            if let Some(list) = watch(resource, states, refresh).await {
                print_posts(&list);
                if avatars {
                    warm_avatars(&ctx, &list).await;
                }
            }
        }
        Command::CacheSize => {
            let maintenance = CacheMaintenance::new(ctx.store.clone());
            let usage = maintenance.usage()?;
            println!("Documents  {}", format_file_size(usage.documents_bytes as i64));
            for (group, bytes) in &usage.groups {
                println!("{:<10} {}", group, format_file_size(*bytes as i64));
            }
            println!("Total      {}", format_file_size(usage.total_bytes as i64));
        }
        Command::ClearCache => {
            let maintenance = CacheMaintenance::new(ctx.store.clone());
            let before = maintenance.cache_size().unwrap_or(0);
            maintenance.clear_cache()?;
            println!("Freed {}", format_file_size(before as i64));
        }
        Command::Login { username } => login(&mut ctx, username).await?,
        Command::Logout => {
            ctx.auth.logout().await;
            println!("Logged out");
        }
        Command::Status => {
            let status = *ctx.auth.status().borrow();
            match (status, ctx.auth.username()) {
                (AuthStatus::LoggedIn, Some(username)) => println!("Logged in as {}", username),
                _ => println!("Not logged in"),
            }
            println!("Forum: {}", ctx.client.base_url());
            println!("Cache: {}", ctx.cache_dir.display());
        }
    }

    Ok(())
}

/// Report every state change until the fetch settles, optionally refresh
/// once, and return the value to display.
async fn watch<T: ResourceValue>(
    resource: CacheBackedResource<T>,
    mut states: Subscription<T>,
    refresh: bool,
) -> Option<T> {
    let mut rounds = if refresh { 2 } else { 1 };

    loop {
        let settled = resource.settled();
        tokio::pin!(settled);

        let state = loop {
            tokio::select! {
                biased;
                Some(state) = states.next() => report(&state),
                state = &mut settled => break state,
            }
        };
        while let Some(state) = states.try_next_state() {
            report(&state);
        }

        rounds -= 1;
        if rounds == 0 {
            if let ResourceState::Error(cause, previous) = &state {
                eprintln!("Could not reach the forum: {}", cause);
                if previous.is_some() {
                    eprintln!("Showing cached data.");
                }
            }
            return state.into_value();
        }
        resource.refresh();
    }
}

fn report<T>(state: &ResourceState<T>) {
    let cached = if state.value().is_some() { " (have data)" } else { "" };
    eprintln!("[{}]{}", state.label(), cached);
}

fn print_categories(list: &CategoryList) {
    for category in &list.categories {
        println!(
            "{:>6}  {}  ({} topics)",
            category.id, category.name, category.topic_count
        );
    }
}

fn print_topics(list: &TopicList) {
    for topic in &list.topics {
        let age = topic
            .last_posted_at
            .as_deref()
            .map(|at| time_ago(at, TimeMode::Short))
            .unwrap_or_default();
        let solved = if topic.has_accepted_answer { " ✓" } else { "" };
        println!(
            "{:>8}  {}{}  [{} posts, {}]",
            topic.id, topic.title, solved, topic.posts_count, age
        );
    }
}

fn print_posts(list: &PostList) {
    for post in &list.posts {
        println!(
            "{} (@{}) - {}",
            post.display_name(),
            post.username,
            time_ago(&post.created_at, TimeMode::Long)
        );
        println!("{}\n", strip_html(&post.cooked));
    }
}

async fn warm_avatars(ctx: &App, list: &PostList) {
    let assets = AssetCache::new(ctx.store.clone(), Arc::new(ctx.client.clone()));
    let mut seen = std::collections::HashSet::new();

    for post in &list.posts {
        if !seen.insert(post.username.as_str()) {
            continue;
        }
        if let Err(e) = assets
            .avatar(&post.username, &post.avatar_template, AVATAR_SIZE)
            .await
        {
            warn!(username = %post.username, error = %e, "Failed to fetch avatar");
        }
    }
    eprintln!("Cached {} avatars", seen.len());
}

async fn login(ctx: &mut App, username: Option<String>) -> Result<()> {
    let username = match username.or_else(|| ctx.config.last_username.clone()) {
        Some(username) => username,
        None => bail!("Username required"),
    };
    let password = rpassword::prompt_password("Password: ")?;

    ctx.auth.login(&username, &password).await?;

    ctx.config.last_username = Some(username.clone());
    if let Err(e) = ctx.config.save() {
        warn!(error = %e, "Failed to save config");
    }
    println!("Logged in as {}", username);
    Ok(())
}
