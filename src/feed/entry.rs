use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One syndication item, as produced by the parse layer.
///
/// Everything except `source_url` is optional: real-world feeds omit
/// almost any field, and the watcher passes entries through largely
/// verbatim rather than repairing them. Fields the model does not cover
/// land in the [`extra`](FeedEntry::extra) bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub author: Option<String>,
    /// Publish date, used for emission ordering. The parser prefers the
    /// explicit publish date and falls back to the entry's updated date.
    pub published: Option<DateTime<Utc>>,
    pub link: Option<String>,
    pub original_link: Option<String>,
    /// RSS 2.x identity field. Normalized to `None` when empty.
    pub guid: Option<String>,
    /// Atom identity field. Normalized to `None` when empty.
    pub id: Option<String>,
    /// The feed URL this entry was fetched from. Force-set by the fetch
    /// layer even when the document's own metadata disagrees.
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    /// Opaque passthrough for feed metadata not otherwise modeled
    /// (feed-level title and link end up here).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl FeedEntry {
    /// Whether `self` and a previously stored entry are the same logical
    /// item.
    ///
    /// Ordered preference chain: if `self` carries a `guid`, guids decide;
    /// else if it carries an `id`, ids decide; else the `(link, title)`
    /// pair decides. Which branch runs is judged by field presence on
    /// `self` (the incoming entry) only — a stored entry with a guid and
    /// an incoming entry without one fall through to link+title.
    pub fn is_same_item(&self, stored: &FeedEntry) -> bool {
        if let Some(guid) = self.guid.as_deref() {
            return stored.guid.as_deref() == Some(guid);
        }
        if let Some(id) = self.id.as_deref() {
            return stored.id.as_deref() == Some(id);
        }
        self.link == stored.link && self.title == stored.title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> FeedEntry {
        FeedEntry {
            source_url: "https://example.com/feed.xml".into(),
            ..FeedEntry::default()
        }
    }

    #[test]
    fn guid_decides_when_present() {
        let mut a = entry();
        a.guid = Some("g1".into());
        a.link = Some("https://example.com/a".into());
        let mut b = entry();
        b.guid = Some("g1".into());
        b.link = Some("https://example.com/other".into());

        assert!(a.is_same_item(&b));

        b.guid = Some("g2".into());
        b.link = a.link.clone();
        assert!(!a.is_same_item(&b));
    }

    #[test]
    fn id_decides_when_no_guid() {
        let mut a = entry();
        a.id = Some("tag:example.com,2024:1".into());
        let mut b = entry();
        b.id = Some("tag:example.com,2024:1".into());
        assert!(a.is_same_item(&b));

        b.id = Some("tag:example.com,2024:2".into());
        assert!(!a.is_same_item(&b));
    }

    #[test]
    fn link_and_title_pair_is_the_fallback() {
        let mut a = entry();
        a.link = Some("https://example.com/a".into());
        a.title = Some("Post".into());
        let mut b = a.clone();
        assert!(a.is_same_item(&b));

        b.title = Some("Different".into());
        assert!(!a.is_same_item(&b));

        b.title = a.title.clone();
        b.link = Some("https://example.com/b".into());
        assert!(!a.is_same_item(&b));
    }

    #[test]
    fn absent_link_and_title_compare_equal() {
        // Option equality: two entries with neither link nor title match.
        let a = entry();
        let b = entry();
        assert!(a.is_same_item(&b));
    }

    #[test]
    fn identity_presence_is_judged_on_incoming_entry() {
        // The stored entry has a guid, the incoming one does not: the
        // chain branches on the incoming entry, so link+title decide and
        // the stored guid is never consulted.
        let mut stored = entry();
        stored.guid = Some("g1".into());
        stored.link = Some("https://example.com/a".into());
        stored.title = Some("Post".into());

        let mut incoming = entry();
        incoming.link = Some("https://example.com/a".into());
        incoming.title = Some("Post".into());
        assert!(incoming.is_same_item(&stored));

        // Flipped direction: the incoming guid finds no stored guid.
        assert!(!stored.is_same_item(&incoming));
    }

    #[test]
    fn guid_presence_shadows_matching_link_title() {
        let mut a = entry();
        a.guid = Some("g1".into());
        a.link = Some("https://example.com/a".into());
        a.title = Some("Post".into());

        let mut b = entry();
        b.guid = Some("g2".into());
        b.link = a.link.clone();
        b.title = a.title.clone();

        assert!(!a.is_same_item(&b));
    }
}
