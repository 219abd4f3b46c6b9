//! Optional TOML configuration for hosts that configure feeds from a file.
//!
//! The file is optional — a missing file yields `WatcherConfig::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields`
//! off), though we log a warning when the file contains potential typos.
//!
//! ```toml
//! user_agent = "my-bot/1.0"
//! skip_first_load = true
//!
//! [[feeds]]
//! url = "https://example.com/feed.xml"
//! refresh = 120000
//!
//! [[feeds]]
//! url = ["https://a.example/rss", "https://b.example/rss"]
//! event_name = "mirrors"
//! ```

use crate::watcher::FeedConfig;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds the maximum allowed size.
    #[error("config file too large: {0}")]
    TooLarge(String),
}

/// Top-level watcher configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be
/// specified; missing keys fall back to `Default::default()`. Feed
/// entries reuse [`FeedConfig`], so per-feed validation still happens in
/// [`FeedWatcher::add`](crate::FeedWatcher::add).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Default `User-Agent` for every feed without its own.
    pub user_agent: Option<String>,

    /// Seed each feed's history silently on its first cycle.
    pub skip_first_load: bool,

    /// Feeds to track on startup.
    pub feeds: Vec<FeedConfig>,
}

impl WatcherConfig {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(WatcherConfig::default())`
    /// - Empty file → `Ok(WatcherConfig::default())`
    /// - Invalid TOML → `Err(ConfigFileError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged
    ///   as warning
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigFileError::TooLarge(format!(
                    "config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigFileError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigFileError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = ["user_agent", "skip_first_load", "feeds"];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: WatcherConfig = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), feeds = config.feeds.len(), "Loaded configuration");
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
