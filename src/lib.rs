//! Polling RSS/Atom feed watcher that emits an event for every new entry.
//!
//! Register feed URLs with a [`FeedWatcher`]; each feed is polled on its
//! own repeating timer (immediately on registration, then every refresh
//! interval), every fetch is reconciled against a bounded in-memory
//! history, and each genuinely-new entry is broadcast to subscribers in
//! ascending publish order.
//!
//! # Architecture
//!
//! - [`watcher`] - The registry (add/remove/list/destroy) and per-feed
//!   polling scheduler
//! - [`reconcile`] - Pure novelty detection: sort, dedup against
//!   history, self-tuning history trim
//! - [`events`] - The broadcast event surface ([`FeedEvent`]) and error
//!   taxonomy
//! - [`feed`] - The entry model and the fetch/parse I/O collaborators
//! - [`config`] - Optional TOML configuration loading
//!
//! All state is in memory and lost on drop; this is a notifier, not a
//! persistence layer.
//!
//! # Example
//!
//! ```no_run
//! use feedwatch::{FeedConfig, FeedEvent, FeedWatcher};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let watcher = FeedWatcher::new();
//!     let mut events = watcher.subscribe();
//!
//!     watcher.add(
//!         FeedConfig::new("https://example.com/feed.xml")
//!             .refresh(Duration::from_secs(120)),
//!     )?;
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             FeedEvent::NewItem { item, .. } => {
//!                 println!("new: {}", item.title.as_deref().unwrap_or("(untitled)"));
//!             }
//!             FeedEvent::Error(err) => eprintln!("poll failed: {err}"),
//!             FeedEvent::InitialLoad { url, items } => {
//!                 println!("seeded {} with {} items", url, items.len());
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod events;
pub mod feed;
pub mod reconcile;
pub mod watcher;

pub use config::{ConfigFileError, WatcherConfig};
pub use events::{FeedError, FeedErrorKind, FeedEvent, NotificationBus};
pub use feed::{FeedEntry, FetchError, ParseError};
pub use reconcile::{reconcile, Reconciliation};
pub use watcher::{
    ConfigError, FeedConfig, FeedSnapshot, FeedWatcher, UrlSpec, WatcherOptions,
    DEFAULT_EVENT_NAME, DEFAULT_REFRESH, DEFAULT_USER_AGENT,
};
