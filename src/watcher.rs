//! The feed registry and per-feed polling scheduler.
//!
//! [`FeedWatcher`] owns canonical per-feed state behind a mutex and hands
//! out by-value [`FeedSnapshot`]s, never live references. Each tracked
//! feed gets its own ticker task: the first tick fires immediately (the
//! first load), then every refresh interval until the feed is removed.
//! Ticks spawn independent cycle tasks, so a slow fetch never delays the
//! schedule and overlapping cycles for one feed are possible; consistency
//! comes from commit-time reconciliation under the registry lock, gated
//! on a per-registration epoch.

use crate::events::{FeedError, FeedEvent, NotificationBus};
use crate::reconcile::reconcile;
use crate::feed::{fetch_entries, FeedEntry};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Poll interval applied when a feed config does not specify one.
pub const DEFAULT_REFRESH: Duration = Duration::from_millis(60_000);

/// Event name carried on [`FeedEvent::NewItem`] unless the feed config
/// overrides it.
pub const DEFAULT_EVENT_NAME: &str = "new-item";

/// `User-Agent` sent with every fetch unless overridden per watcher or
/// per feed.
pub const DEFAULT_USER_AGENT: &str = concat!("feedwatch/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Configuration
// ============================================================================

/// One URL or several; a list expands to one tracked feed per element,
/// all inheriting the rest of the config.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UrlSpec {
    One(String),
    Many(Vec<String>),
}

impl UrlSpec {
    fn into_vec(self) -> Vec<String> {
        match self {
            UrlSpec::One(url) => vec![url],
            UrlSpec::Many(urls) => urls,
        }
    }
}

impl From<&str> for UrlSpec {
    fn from(url: &str) -> Self {
        UrlSpec::One(url.to_string())
    }
}

impl From<String> for UrlSpec {
    fn from(url: String) -> Self {
        UrlSpec::One(url)
    }
}

impl From<Vec<String>> for UrlSpec {
    fn from(urls: Vec<String>) -> Self {
        UrlSpec::Many(urls)
    }
}

impl From<Vec<&str>> for UrlSpec {
    fn from(urls: Vec<&str>) -> Self {
        UrlSpec::Many(urls.into_iter().map(str::to_string).collect())
    }
}

/// Configuration for one [`FeedWatcher::add`] call.
///
/// Deserializable, so configs can come straight from TOML/JSON; a
/// wrong-typed field (say `refresh = "fast"`) is rejected at the serde
/// boundary before it ever reaches the watcher.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub url: UrlSpec,
    /// Poll interval in milliseconds. Defaults to 60 000; zero is
    /// rejected.
    #[serde(default)]
    pub refresh: Option<u64>,
    #[serde(default, alias = "userAgent")]
    pub user_agent: Option<String>,
    /// Name carried on this feed's `NewItem` events, letting a caller
    /// route different feeds to different handlers.
    #[serde(default, alias = "eventName")]
    pub event_name: Option<String>,
}

impl FeedConfig {
    pub fn new(url: impl Into<UrlSpec>) -> Self {
        Self {
            url: url.into(),
            refresh: None,
            user_agent: None,
            event_name: None,
        }
    }

    pub fn refresh(mut self, refresh: Duration) -> Self {
        self.refresh = Some(refresh.as_millis() as u64);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn event_name(mut self, event_name: impl Into<String>) -> Self {
        self.event_name = Some(event_name.into());
        self
    }
}

/// Watcher-wide defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WatcherOptions {
    /// Default `User-Agent` for feeds that do not set their own.
    pub user_agent: Option<String>,
    /// Suppress per-item notifications for each feed's first poll cycle.
    /// The history is still seeded and `InitialLoad` still fires, so
    /// subsequent cycles only notify for genuinely-new entries.
    pub skip_first_load: bool,
}

/// Caller misuse, reported synchronously from [`FeedWatcher::add`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("feed configuration requires at least one url")]
    NoUrl,
    #[error("invalid feed url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("refresh interval must be greater than zero")]
    ZeroRefresh,
}

fn validate_feed_url(url: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{scheme}' (only http/https)"),
        }),
    }
}

// ============================================================================
// Public state view
// ============================================================================

/// By-value view of one tracked feed. Mutating a snapshot has no effect
/// on the registry.
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub url: String,
    pub refresh: Duration,
    pub user_agent: String,
    pub event_name: String,
    /// Retained history, oldest first.
    pub items: Vec<FeedEntry>,
    /// Current retention capacity (three times the last fetch's size).
    pub max_history_len: usize,
}

// ============================================================================
// Watcher
// ============================================================================

struct FeedSlot {
    url: String,
    refresh: Duration,
    user_agent: String,
    event_name: String,
    items: Vec<FeedEntry>,
    max_history_len: usize,
    /// Registration generation. A cycle spawned under an older epoch
    /// finds the slot replaced and abandons its result.
    epoch: u64,
    task: JoinHandle<()>,
}

impl FeedSlot {
    fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            url: self.url.clone(),
            refresh: self.refresh,
            user_agent: self.user_agent.clone(),
            event_name: self.event_name.clone(),
            items: self.items.clone(),
            max_history_len: self.max_history_len,
        }
    }
}

struct Inner {
    feeds: Mutex<Vec<FeedSlot>>,
    bus: NotificationBus,
    client: reqwest::Client,
    user_agent: String,
    skip_first_load: bool,
    next_epoch: AtomicU64,
}

impl Inner {
    fn is_current(&self, ctx: &CycleCtx) -> bool {
        self.feeds
            .lock()
            .unwrap()
            .iter()
            .any(|s| s.url == ctx.url && s.epoch == ctx.epoch)
    }

    /// Reconciles against the history as it is now and commits, or
    /// returns `None` when the feed was removed or re-added mid-flight.
    /// The seeded history copy is only taken on a first load.
    fn commit(
        &self,
        ctx: &CycleCtx,
        fetched: Vec<FeedEntry>,
        first_load: bool,
    ) -> Option<(Vec<FeedEntry>, Option<Vec<FeedEntry>>)> {
        let mut feeds = self.feeds.lock().unwrap();
        let slot = feeds
            .iter_mut()
            .find(|s| s.url == ctx.url && s.epoch == ctx.epoch)?;
        let outcome = reconcile(&slot.items, fetched);
        slot.items = outcome.history;
        slot.max_history_len = outcome.max_history_len;
        let seeded = first_load.then(|| slot.items.clone());
        Some((outcome.new_items, seeded))
    }
}

#[derive(Clone)]
struct CycleCtx {
    inner: Weak<Inner>,
    url: String,
    epoch: u64,
    user_agent: String,
    event_name: String,
}

/// Tracks RSS/Atom feeds and broadcasts an event for every new entry.
///
/// At most one tracked feed per URL: re-adding a URL cancels the old
/// timer and restarts with the new config and an empty history. Dropping
/// the watcher (or calling [`destroy`](FeedWatcher::destroy)) cancels
/// every timer; cycles already in flight complete but their results are
/// discarded.
pub struct FeedWatcher {
    inner: Arc<Inner>,
}

impl FeedWatcher {
    pub fn new() -> Self {
        Self::with_options(WatcherOptions::default())
    }

    pub fn with_options(options: WatcherOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                feeds: Mutex::new(Vec::new()),
                bus: NotificationBus::new(),
                client: reqwest::Client::new(),
                user_agent: options
                    .user_agent
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
                skip_first_load: options.skip_first_load,
                next_epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Builds a watcher from a loaded [`WatcherConfig`](crate::WatcherConfig)
    /// and starts tracking every feed it lists.
    pub fn from_config(config: crate::config::WatcherConfig) -> Result<Self, ConfigError> {
        let watcher = Self::with_options(WatcherOptions {
            user_agent: config.user_agent,
            skip_first_load: config.skip_first_load,
        });
        for feed in config.feeds {
            watcher.add(feed)?;
        }
        Ok(watcher)
    }

    /// Starts tracking the configured feed(s) and returns the full
    /// current collection.
    ///
    /// Validates the whole config before mutating anything: at least one
    /// URL, http/https scheme on every URL, nonzero refresh. The first
    /// poll cycle runs immediately.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime (the poll tasks have
    /// nowhere to run).
    pub fn add(&self, config: FeedConfig) -> Result<Vec<FeedSnapshot>, ConfigError> {
        let FeedConfig {
            url,
            refresh,
            user_agent,
            event_name,
        } = config;

        let urls = url.into_vec();
        if urls.is_empty() {
            return Err(ConfigError::NoUrl);
        }
        let refresh = match refresh {
            Some(0) => return Err(ConfigError::ZeroRefresh),
            Some(ms) => Duration::from_millis(ms),
            None => DEFAULT_REFRESH,
        };
        for url in &urls {
            validate_feed_url(url)?;
        }

        let user_agent = user_agent.unwrap_or_else(|| self.inner.user_agent.clone());
        let event_name = event_name.unwrap_or_else(|| DEFAULT_EVENT_NAME.to_string());

        for url in urls {
            self.track(url, refresh, user_agent.clone(), event_name.clone());
        }
        Ok(self.list())
    }

    /// Adds several feed configurations in one call; equivalent to
    /// calling [`add`](Self::add) for each in turn. Stops at the first
    /// invalid config — feeds added before it stay tracked.
    pub fn add_many(
        &self,
        configs: impl IntoIterator<Item = FeedConfig>,
    ) -> Result<Vec<FeedSnapshot>, ConfigError> {
        for config in configs {
            self.add(config)?;
        }
        Ok(self.list())
    }

    /// Stops tracking `url` and returns its final snapshot, or `None`
    /// (and no error) when the URL was never tracked.
    pub fn remove(&self, url: &str) -> Option<FeedSnapshot> {
        let mut feeds = self.inner.feeds.lock().unwrap();
        let pos = feeds.iter().position(|s| s.url == url)?;
        let slot = feeds.remove(pos);
        slot.task.abort();
        tracing::info!(feed = %url, "stopped tracking feed");
        Some(slot.snapshot())
    }

    /// Snapshots of every tracked feed, in registration order.
    pub fn list(&self) -> Vec<FeedSnapshot> {
        self.inner
            .feeds
            .lock()
            .unwrap()
            .iter()
            .map(FeedSlot::snapshot)
            .collect()
    }

    /// Cancels every feed's timer and empties the registry. Safe to call
    /// repeatedly; also invoked on drop.
    pub fn destroy(&self) {
        let mut feeds = self.inner.feeds.lock().unwrap();
        for slot in feeds.drain(..) {
            slot.task.abort();
        }
    }

    /// Subscribes to all watcher events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.inner.bus.subscribe()
    }

    fn track(&self, url: String, refresh: Duration, user_agent: String, event_name: String) {
        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);

        // The lock is held across the spawn so the new task cannot
        // observe the registry before its own slot is in place.
        let mut feeds = self.inner.feeds.lock().unwrap();
        if let Some(pos) = feeds.iter().position(|s| s.url == url) {
            let old = feeds.remove(pos);
            old.task.abort();
            tracing::info!(feed = %url, "restarting tracked feed with new config");
        } else {
            tracing::info!(feed = %url, refresh_ms = refresh.as_millis() as u64, "tracking feed");
        }

        let ctx = CycleCtx {
            inner: Arc::downgrade(&self.inner),
            url: url.clone(),
            epoch,
            user_agent: user_agent.clone(),
            event_name: event_name.clone(),
        };
        let task = tokio::spawn(poll_loop(ctx, refresh));

        feeds.push(FeedSlot {
            url,
            refresh,
            user_agent,
            event_name,
            items: Vec::new(),
            max_history_len: 0,
            epoch,
            task,
        });
    }
}

impl Default for FeedWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FeedWatcher {
    fn drop(&mut self) {
        self.destroy();
    }
}

// ============================================================================
// Poll loop
// ============================================================================

/// One ticker per tracked feed. The first tick completes immediately
/// (first load); each tick spawns the cycle as its own task so a slow
/// fetch never blocks the schedule.
async fn poll_loop(ctx: CycleCtx, refresh: Duration) {
    let mut ticker = tokio::time::interval(refresh);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut first_load = true;

    loop {
        ticker.tick().await;
        if ctx.inner.strong_count() == 0 {
            return; // watcher dropped
        }
        let is_first = std::mem::replace(&mut first_load, false);
        tokio::spawn(run_cycle(ctx.clone(), is_first));
    }
}

/// One fetch → reconcile → notify pass.
///
/// Fetch and parse run without any lock held; the result is committed
/// against the feed's history as it is at commit time. A feed removed or
/// re-added mid-flight invalidates the cycle: nothing is mutated and
/// nothing is emitted.
async fn run_cycle(ctx: CycleCtx, first_load: bool) {
    let client = match ctx.inner.upgrade() {
        Some(inner) => inner.client.clone(),
        None => return,
    };

    match fetch_entries(&client, &ctx.url, &ctx.user_agent).await {
        Ok(fetched) => {
            let Some(inner) = ctx.inner.upgrade() else { return };
            let Some((new_items, seeded)) = inner.commit(&ctx, fetched, first_load) else {
                tracing::debug!(feed = %ctx.url, "feed no longer tracked, cycle abandoned");
                return;
            };
            if !(first_load && inner.skip_first_load) {
                for item in new_items {
                    inner.bus.emit(FeedEvent::NewItem {
                        event: ctx.event_name.clone(),
                        item,
                    });
                }
            }
            if let Some(items) = seeded {
                inner.bus.emit(FeedEvent::InitialLoad {
                    url: ctx.url.clone(),
                    items,
                });
            }
        }
        Err(err) => {
            let Some(inner) = ctx.inner.upgrade() else { return };
            if !inner.is_current(&ctx) {
                tracing::debug!(feed = %ctx.url, "feed no longer tracked, error discarded");
                return;
            }
            tracing::warn!(feed = %ctx.url, error = %err, "poll cycle failed");
            inner
                .bus
                .emit(FeedEvent::Error(FeedError::from_fetch(err, &ctx.url)));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // None of these await poll results; cycles against these unroutable
    // URLs fail in the background and are irrelevant to registry state.
    const FEED_A: &str = "http://feed-a.invalid/rss";
    const FEED_B: &str = "http://feed-b.invalid/rss";

    #[tokio::test]
    async fn add_returns_the_full_collection() {
        let watcher = FeedWatcher::new();
        let feeds = watcher.add(FeedConfig::new(FEED_A)).unwrap();
        assert_eq!(feeds.len(), 1);
        let feeds = watcher.add(FeedConfig::new(FEED_B)).unwrap();
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].url, FEED_A);
        assert_eq!(feeds[1].url, FEED_B);
    }

    #[tokio::test]
    async fn add_applies_defaults() {
        let watcher = FeedWatcher::new();
        let feeds = watcher.add(FeedConfig::new(FEED_A)).unwrap();
        assert_eq!(feeds[0].refresh, DEFAULT_REFRESH);
        assert_eq!(feeds[0].user_agent, DEFAULT_USER_AGENT);
        assert_eq!(feeds[0].event_name, DEFAULT_EVENT_NAME);
        assert!(feeds[0].items.is_empty());
        assert_eq!(feeds[0].max_history_len, 0);
    }

    #[tokio::test]
    async fn watcher_user_agent_is_inherited_unless_overridden() {
        let watcher = FeedWatcher::with_options(WatcherOptions {
            user_agent: Some("custom-watcher/1".into()),
            skip_first_load: false,
        });
        let feeds = watcher.add(FeedConfig::new(FEED_A)).unwrap();
        assert_eq!(feeds[0].user_agent, "custom-watcher/1");

        let feeds = watcher
            .add(FeedConfig::new(FEED_B).user_agent("per-feed/2"))
            .unwrap();
        assert_eq!(feeds[1].user_agent, "per-feed/2");
    }

    #[tokio::test]
    async fn url_list_expands_to_one_feed_per_element() {
        let watcher = FeedWatcher::new();
        let feeds = watcher
            .add(FeedConfig::new(vec![FEED_A, FEED_B]).event_name("batch"))
            .unwrap();
        assert_eq!(feeds.len(), 2);
        assert!(feeds.iter().all(|f| f.event_name == "batch"));
    }

    #[tokio::test]
    async fn add_many_tracks_every_config() {
        let watcher = FeedWatcher::new();
        let feeds = watcher
            .add_many([
                FeedConfig::new(FEED_A).event_name("a"),
                FeedConfig::new(FEED_B).event_name("b"),
            ])
            .unwrap();
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].event_name, "a");
        assert_eq!(feeds[1].event_name, "b");
    }

    #[tokio::test]
    async fn add_many_stops_at_the_first_invalid_config() {
        let watcher = FeedWatcher::new();
        let err = watcher
            .add_many([
                FeedConfig::new(FEED_A),
                FeedConfig::new("ftp://example.com/feed"),
                FeedConfig::new(FEED_B),
            ])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));
        // The config before the invalid one is already tracked.
        assert_eq!(watcher.list().len(), 1);
    }

    #[tokio::test]
    async fn empty_url_list_is_rejected() {
        let watcher = FeedWatcher::new();
        let err = watcher
            .add(FeedConfig::new(Vec::<String>::new()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::NoUrl));
        assert!(watcher.list().is_empty());
    }

    #[tokio::test]
    async fn unparseable_url_is_rejected() {
        let watcher = FeedWatcher::new();
        let err = watcher.add(FeedConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));
        assert!(watcher.list().is_empty());
    }

    #[tokio::test]
    async fn non_http_scheme_is_rejected() {
        let watcher = FeedWatcher::new();
        let err = watcher
            .add(FeedConfig::new("ftp://example.com/feed"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn bad_url_in_a_list_rejects_the_whole_call() {
        let watcher = FeedWatcher::new();
        let err = watcher
            .add(FeedConfig::new(vec![FEED_A, "file:///etc/passwd"]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));
        // Validation happens before any mutation.
        assert!(watcher.list().is_empty());
    }

    #[tokio::test]
    async fn zero_refresh_is_rejected() {
        let watcher = FeedWatcher::new();
        let err = watcher
            .add(FeedConfig {
                url: UrlSpec::One(FEED_A.into()),
                refresh: Some(0),
                user_agent: None,
                event_name: None,
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroRefresh));
    }

    #[tokio::test]
    async fn adding_the_same_url_twice_keeps_one_feed_with_new_config() {
        let watcher = FeedWatcher::new();
        watcher
            .add(FeedConfig::new(FEED_A).refresh(Duration::from_millis(5000)))
            .unwrap();
        let feeds = watcher
            .add(FeedConfig::new(FEED_A).refresh(Duration::from_millis(9000)))
            .unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].refresh, Duration::from_millis(9000));
    }

    #[tokio::test]
    async fn remove_unknown_url_is_a_noop() {
        let watcher = FeedWatcher::new();
        watcher.add(FeedConfig::new(FEED_A)).unwrap();
        assert!(watcher.remove("http://unknown.invalid/rss").is_none());
        assert_eq!(watcher.list().len(), 1);
    }

    #[tokio::test]
    async fn remove_returns_the_removed_snapshot() {
        let watcher = FeedWatcher::new();
        watcher.add(FeedConfig::new(FEED_A)).unwrap();
        let removed = watcher.remove(FEED_A).unwrap();
        assert_eq!(removed.url, FEED_A);
        assert!(watcher.list().is_empty());
    }

    #[tokio::test]
    async fn destroy_empties_the_registry_and_is_idempotent() {
        let watcher = FeedWatcher::new();
        watcher
            .add(FeedConfig::new(vec![FEED_A, FEED_B]))
            .unwrap();
        watcher.destroy();
        assert!(watcher.list().is_empty());
        watcher.destroy();
        assert!(watcher.list().is_empty());
    }

    // The serde boundary is where the original's runtime type checks
    // live now: a wrong-typed config never deserializes.
    #[test]
    fn wrong_typed_refresh_fails_deserialization() {
        let result: Result<FeedConfig, _> =
            toml::from_str("url = \"http://example.com/rss\"\nrefresh = \"fast\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn missing_url_fails_deserialization() {
        let result: Result<FeedConfig, _> = toml::from_str("refresh = 60000\n");
        assert!(result.is_err());
    }

    #[test]
    fn wrong_typed_url_fails_deserialization() {
        let result: Result<FeedConfig, _> = toml::from_str("url = 42\n");
        assert!(result.is_err());
    }

    #[test]
    fn camel_case_aliases_are_accepted() {
        let config: FeedConfig = toml::from_str(
            "url = \"http://example.com/rss\"\nuserAgent = \"legacy/1\"\neventName = \"legacy\"\n",
        )
        .unwrap();
        assert_eq!(config.user_agent.as_deref(), Some("legacy/1"));
        assert_eq!(config.event_name.as_deref(), Some("legacy"));
    }

    #[test]
    fn url_accepts_string_or_list() {
        let one: FeedConfig = toml::from_str("url = \"http://example.com/rss\"\n").unwrap();
        assert!(matches!(one.url, UrlSpec::One(_)));

        let many: FeedConfig =
            toml::from_str("url = [\"http://a.example/rss\", \"http://b.example/rss\"]\n").unwrap();
        match many.url {
            UrlSpec::Many(urls) => assert_eq!(urls.len(), 2),
            other => panic!("expected Many, got {:?}", other),
        }
    }
}
