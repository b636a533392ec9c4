use crate::api::FetchError;

/// Observable state of one cached remote document.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceState<T> {
    /// Nothing read or fetched yet.
    Unknown,
    /// A cache read or fetch is in flight. Carries the last known value.
    Loading(Option<T>),
    /// Most recent value, either tentative from the cache or fresh from the
    /// network.
    Loaded(T),
    /// The latest fetch failed. The last known value is kept for display.
    Error(FetchError, Option<T>),
}

impl<T> ResourceState<T> {
    /// The value a view should render, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            ResourceState::Unknown => None,
            ResourceState::Loading(previous) => previous.as_ref(),
            ResourceState::Loaded(value) => Some(value),
            ResourceState::Error(_, previous) => previous.as_ref(),
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            ResourceState::Unknown => None,
            ResourceState::Loading(previous) => previous,
            ResourceState::Loaded(value) => Some(value),
            ResourceState::Error(_, previous) => previous,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ResourceState::Loading(_))
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            ResourceState::Error(cause, _) => Some(cause),
            _ => None,
        }
    }

    /// Short label for logs and status lines.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceState::Unknown => "unknown",
            ResourceState::Loading(_) => "loading",
            ResourceState::Loaded(_) => "loaded",
            ResourceState::Error(..) => "error",
        }
    }
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        ResourceState::Unknown
    }
}
