use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use super::ResourceState;

/// Receives every state a resource publishes, in order.
///
/// The stream ends once the owning resource has been dropped.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<ResourceState<T>>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ResourceState<T>>) -> Self {
        Self { rx }
    }

    pub async fn next_state(&mut self) -> Option<ResourceState<T>> {
        self.rx.recv().await
    }

    /// Next already-published state, without waiting.
    pub fn try_next_state(&mut self) -> Option<ResourceState<T>> {
        self.rx.try_recv().ok()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = ResourceState<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
