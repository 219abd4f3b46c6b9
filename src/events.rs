//! Event surface: what subscribers receive from the watcher.
//!
//! The watcher owns a [`NotificationBus`] (composition over inheritance —
//! there is no emitter base class to extend) backed by a single broadcast
//! channel. Subscribers get every event and filter by variant, event name,
//! or feed URL. With no live subscribers, events are dropped silently;
//! that is expected, not a bug.

use crate::feed::{FeedEntry, FetchError};
use std::fmt;
use thiserror::Error;
use tokio::sync::broadcast;

const BROADCAST_CAPACITY: usize = 256;

/// Events broadcast by a [`FeedWatcher`](crate::FeedWatcher).
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// One genuinely-new entry. Within a poll cycle these arrive in
    /// ascending publish order, oldest unseen entry first. `event` is the
    /// feed's configured event name (default `"new-item"`).
    NewItem { event: String, item: FeedEntry },
    /// One-shot, after a feed's first successful poll cycle: the full
    /// seeded history. Emitted whether or not per-item notifications were
    /// suppressed for that first cycle.
    InitialLoad { url: String, items: Vec<FeedEntry> },
    /// A poll cycle failed. The feed stays scheduled and retries on its
    /// next tick.
    Error(FeedError),
}

/// A failed poll cycle, attributed to the feed that caused it.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message} ({url})")]
pub struct FeedError {
    pub kind: FeedErrorKind,
    pub message: String,
    /// The tracked feed URL the failure originated from.
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedErrorKind {
    /// Transport-level failure: non-2xx HTTP status, DNS or connection
    /// errors, timeout, oversized response.
    FetchUrl,
    /// The document was retrieved but is not parseable RSS/Atom.
    InvalidFeed,
}

impl fmt::Display for FeedErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedErrorKind::FetchUrl => write!(f, "fetch_url_error"),
            FeedErrorKind::InvalidFeed => write!(f, "invalid_feed"),
        }
    }
}

impl FeedError {
    pub(crate) fn from_fetch(err: FetchError, url: &str) -> Self {
        let kind = match &err {
            FetchError::Parse(_) => FeedErrorKind::InvalidFeed,
            _ => FeedErrorKind::FetchUrl,
        };
        FeedError {
            kind,
            message: err.to_string(),
            url: url.to_string(),
        }
    }
}

/// Broadcast fan-out for watcher events.
pub struct NotificationBus {
    tx: broadcast::Sender<FeedEvent>,
}

impl NotificationBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    /// A new receiver for all events from this point on. Dropping the
    /// receiver unsubscribes; slow receivers that fall more than the
    /// channel capacity behind miss events (broadcast semantics).
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: FeedEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("no subscribers, event dropped");
        }
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}
