//! Feed retrieval: the entry data model and the fetch/parse collaborators.
//!
//! Everything in here is a thin I/O shim around the tracking engine:
//!
//! - [`entry`] - The [`FeedEntry`] record and its identity chain
//! - [`fetch`] - HTTP retrieval with timeout and a body size cap
//! - [`parse`] - RSS/Atom XML into structured entries via `feed-rs`
//!
//! The watcher never touches the network or XML directly; it consumes
//! `fetch_entries(client, url, user_agent) -> Vec<FeedEntry>` and treats
//! every failure as one structured error event for that cycle.

mod entry;
mod fetch;
mod parse;

pub use entry::FeedEntry;
pub use fetch::{fetch_entries, FetchError};
pub use parse::{parse_entries, ParseError};
