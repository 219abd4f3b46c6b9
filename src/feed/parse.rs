use crate::feed::entry::FeedEntry;
use feed_rs::model::FeedType;
use feed_rs::parser;
use serde_json::Value;
use thiserror::Error;

/// Document failed to parse as RSS/Atom.
#[derive(Debug, Error)]
#[error("cannot parse feed: {0}")]
pub struct ParseError(#[from] feed_rs::parser::ParseFeedError);

/// Parses raw feed bytes into entries, force-setting every entry's
/// `source_url` to the URL the document was fetched from.
///
/// RSS feeds populate `guid`, Atom (and JSON) feeds populate `id`; both
/// come from the parsed entry id, routed by the document's feed type so
/// the identity chain can tell them apart. Empty ids are dropped.
pub fn parse_entries(bytes: &[u8], source_url: &str) -> Result<Vec<FeedEntry>, ParseError> {
    let feed = parser::parse(bytes)?;

    let atom_like = matches!(feed.feed_type, FeedType::Atom | FeedType::JSON);
    let feed_title = feed.title.map(|t| t.content);
    let feed_link = feed.links.first().map(|l| l.href.clone());

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry.links.first().map(|l| l.href.clone());
            let original_link = entry
                .links
                .iter()
                .find(|l| l.rel.as_deref() == Some("alternate"))
                .map(|l| l.href.clone())
                .filter(|href| Some(href) != link.as_ref());
            let published = entry.published.or(entry.updated);
            let summary = entry.summary.map(|s| s.content);
            let description = entry.content.and_then(|c| c.body);
            let title = entry.title.map(|t| t.content).and_then(non_empty);
            let author = entry
                .authors
                .into_iter()
                .next()
                .map(|p| p.name)
                .and_then(non_empty);
            let categories = entry
                .categories
                .into_iter()
                .filter_map(|c| non_empty(c.term))
                .collect();

            let entry_id = non_empty(entry.id);
            let (guid, id) = if atom_like {
                (None, entry_id)
            } else {
                (entry_id, None)
            };

            let mut extra = std::collections::BTreeMap::new();
            if let Some(t) = &feed_title {
                extra.insert("feed_title".to_string(), Value::String(t.clone()));
            }
            if let Some(l) = &feed_link {
                extra.insert("feed_link".to_string(), Value::String(l.clone()));
            }

            FeedEntry {
                title,
                description,
                summary,
                author,
                published,
                link,
                original_link,
                guid,
                id,
                source_url: source_url.to_string(),
                categories,
                extra,
            }
        })
        .collect();

    Ok(entries)
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == s.len() {
        Some(s)
    } else {
        Some(trimmed.to_string())
    }
}
