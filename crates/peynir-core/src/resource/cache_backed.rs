use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{ResourceState, ResourceValue, Subscription};
use crate::api::FetchError;
use crate::store::{self, SharedStore};

type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, FetchError>> + Send + Sync>;

enum Command<T> {
    Subscribe(mpsc::UnboundedSender<ResourceState<T>>),
    Refresh,
    Current(oneshot::Sender<ResourceState<T>>),
    Settled(oneshot::Sender<ResourceState<T>>),
}

/// Results of background work, routed back to the owning task.
enum Completion<T> {
    CacheRead { generation: u64, value: Option<T> },
    Fetched { generation: u64, result: Result<T, FetchError> },
}

/// Handle to one cached remote document.
///
/// Dropping the handle stops the resource and ends its subscriptions. A
/// cache write that is already under way still completes.
pub struct CacheBackedResource<T> {
    key: String,
    commands: mpsc::UnboundedSender<Command<T>>,
}

impl<T: ResourceValue> CacheBackedResource<T> {
    /// Start the resource and return it with a subscription that observes
    /// every state from `Unknown` on.
    ///
    /// `key` must already have its identifiers substituted. Must be called
    /// from within a Tokio runtime.
    pub fn new<F, Fut>(key: impl Into<String>, store: SharedStore, fetch: F) -> (Self, Subscription<T>)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let key = key.into();
        debug_assert!(
            store::validate_key(&key).is_ok(),
            "cache key not substituted: {}",
            key
        );

        let fetch: Fetcher<T> = Arc::new(move || fetch().boxed());
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (completions, completion_rx) = mpsc::unbounded_channel();
        let (observer, observer_rx) = mpsc::unbounded_channel();

        let state = ResourceState::Unknown;
        let _ = observer.send(state.clone());

        let task = ResourceTask {
            key: key.clone(),
            store,
            fetch,
            state,
            generation: 0,
            fetch_pending: false,
            observers: vec![observer],
            waiters: Vec::new(),
            completions,
            last_write: None,
        };
        tokio::spawn(task.run(command_rx, completion_rx));

        (Self { key, commands }, Subscription::new(observer_rx))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Subscribe to this resource. The first item is the current state.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.send(Command::Subscribe(tx));
        Subscription::new(rx)
    }

    /// Fetch again, keeping the displayed value while the fetch runs.
    /// Any fetch still in flight is superseded.
    pub fn refresh(&self) {
        self.send(Command::Refresh);
    }

    pub async fn current(&self) -> ResourceState<T> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Current(tx));
        rx.await.unwrap_or_default()
    }

    /// Wait for the latest fetch to finish and return the resulting state.
    pub async fn settled(&self) -> ResourceState<T> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Settled(tx));
        rx.await.unwrap_or_default()
    }

    fn send(&self, command: Command<T>) {
        if self.commands.send(command).is_err() {
            warn!(key = %self.key, "Resource task has stopped");
        }
    }
}

/// Single owner of a resource's state.
struct ResourceTask<T> {
    key: String,
    store: SharedStore,
    fetch: Fetcher<T>,
    state: ResourceState<T>,
    generation: u64,
    fetch_pending: bool,
    observers: Vec<mpsc::UnboundedSender<ResourceState<T>>>,
    waiters: Vec<oneshot::Sender<ResourceState<T>>>,
    completions: mpsc::UnboundedSender<Completion<T>>,
    /// Most recent cache write. Each write waits for this one to finish.
    last_write: Option<JoinHandle<()>>,
}

impl<T: ResourceValue> ResourceTask<T> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command<T>>,
        mut completions: mpsc::UnboundedReceiver<Completion<T>>,
    ) {
        self.load();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(completion) = completions.recv() => self.handle_completion(completion),
            }
        }

        debug!(key = %self.key, "Resource released");
    }

    fn handle_command(&mut self, command: Command<T>) {
        match command {
            Command::Subscribe(observer) => {
                if observer.send(self.state.clone()).is_ok() {
                    self.observers.push(observer);
                }
            }
            Command::Refresh => self.refresh(),
            Command::Current(reply) => {
                let _ = reply.send(self.state.clone());
            }
            Command::Settled(reply) => {
                if self.fetch_pending {
                    self.waiters.push(reply);
                } else {
                    let _ = reply.send(self.state.clone());
                }
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion<T>) {
        match completion {
            Completion::CacheRead { generation, value } => {
                if generation != self.generation {
                    debug!(key = %self.key, generation, "Discarding superseded cache read");
                    return;
                }
                if let Some(value) = value {
                    self.publish(ResourceState::Loaded(value));
                }
                self.start_fetch();
            }
            Completion::Fetched { generation, result } => {
                if generation != self.generation {
                    debug!(
                        key = %self.key,
                        generation,
                        current = self.generation,
                        "Discarding superseded fetch"
                    );
                    return;
                }
                self.fetch_pending = false;

                match result {
                    Ok(value) => {
                        debug!(key = %self.key, "Fetch succeeded");
                        self.publish(ResourceState::Loaded(value.clone()));
                        self.persist(value);
                    }
                    Err(cause) => {
                        warn!(key = %self.key, error = %cause, "Fetch failed");
                        let previous = self.state.value().cloned();
                        self.publish(ResourceState::Error(cause, previous));
                    }
                }

                for waiter in self.waiters.drain(..) {
                    let _ = waiter.send(self.state.clone());
                }
            }
        }
    }

    fn refresh(&mut self) {
        if self.state.value().is_some() {
            self.generation += 1;
            self.fetch_pending = true;
            self.start_fetch();
        } else {
            self.load();
        }
    }

    /// Begin a new generation from the cache read.
    fn load(&mut self) {
        self.generation += 1;
        self.fetch_pending = true;
        self.publish(ResourceState::Loading(None));

        let generation = self.generation;
        let store = self.store.clone();
        let key = self.key.clone();
        let completions = self.completions.clone();

        tokio::task::spawn_blocking(move || {
            let value = match store::load_json::<T>(&*store, &key) {
                Ok(Some(cached)) => {
                    debug!(
                        key = %key,
                        age = %cached.age_display(),
                        stale = cached.is_stale(),
                        "Cache hit"
                    );
                    Some(cached.data)
                }
                Ok(None) => {
                    debug!(key = %key, "Cache miss");
                    None
                }
                Err(e) => {
                    warn!(key = %key, "Ignoring unreadable cache entry: {:#}", e);
                    None
                }
            };
            let _ = completions.send(Completion::CacheRead { generation, value });
        });
    }

    fn start_fetch(&mut self) {
        let previous = self.state.value().cloned();
        self.publish(ResourceState::Loading(previous));

        let generation = self.generation;
        let completions = self.completions.clone();
        let fetch = (self.fetch)();

        tokio::spawn(async move {
            let result = fetch.await;
            let _ = completions.send(Completion::Fetched { generation, result });
        });
    }

    fn persist(&mut self, value: T) {
        let store = self.store.clone();
        let key = self.key.clone();
        let previous = self.last_write.take();

        self.last_write = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            let write_key = key.clone();
            let written =
                tokio::task::spawn_blocking(move || store::save_json(&*store, &write_key, &value))
                    .await;
            match written {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(key = %key, "Failed to write cache entry: {:#}", e),
                Err(e) => warn!(key = %key, "Cache write task failed: {}", e),
            }
        }));
    }

    fn publish(&mut self, state: ResourceState<T>) {
        if state.is_loading() && state == self.state {
            return;
        }
        self.state = state;

        let state = &self.state;
        self.observers
            .retain(|observer| observer.send(state.clone()).is_ok());
    }
}
