use chrono::{DateTime, Utc};
use feed_rs::parser;

use crate::{Error, Result};

/// One entry as it appears in the feed, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub items: Vec<RawItem>,
}

/// Parse RSS/Atom content into raw items, keeping document order.
///
/// An entry's publish date falls back to its updated date. Dates feed-rs
/// cannot read come through as `None`.
pub fn parse_feed(content: &[u8]) -> Result<ParsedFeed> {
    let feed = parser::parse(content).map_err(|e| Error::Parse(e.to_string()))?;

    let title = feed
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty());

    let items = feed
        .entries
        .into_iter()
        .map(|entry| RawItem {
            title: entry.title.map(|t| t.content),
            link: entry.links.first().map(|l| l.href.clone()),
            published: entry.published.or(entry.updated),
        })
        .collect();

    Ok(ParsedFeed { title, items })
}
