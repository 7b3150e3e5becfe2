use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use tracing::debug;

use crate::models::NewsRecord;
use crate::parser::RawItem;

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";

/// Local date-time layouts accepted for manual entries, read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Turns raw feed items into records for a single fixed source.
#[derive(Debug, Clone)]
pub struct Normalizer {
    source: String,
}

impl Normalizer {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns `None` when the title is empty once CDATA markup is removed.
    pub fn normalize(&self, raw: &RawItem, now: DateTime<Utc>) -> Option<NewsRecord> {
        let title = strip_cdata(raw.title.as_deref().unwrap_or_default())
            .trim()
            .to_string();
        if title.is_empty() {
            debug!("Skipping item without title (link: {:?})", raw.link);
            return None;
        }

        let link = raw
            .link
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        let now = now.trunc_subsecs(3);
        let pub_date = raw.published.map(|p| p.trunc_subsecs(3)).unwrap_or(now);

        Some(NewsRecord {
            title,
            author: self.source.clone(),
            link,
            pub_date,
            source: self.source.clone(),
            fetched_at: now,
        })
    }
}

/// Remove every `<![CDATA[...]]>` wrapper, keeping the wrapped text.
/// An unterminated wrapper is left as-is.
pub fn strip_cdata(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(CDATA_OPEN) {
        let inner_start = start + CDATA_OPEN.len();
        let Some(len) = rest[inner_start..].find(CDATA_CLOSE) else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str(&rest[inner_start..inner_start + len]);
        rest = &rest[inner_start + len + CDATA_CLOSE.len()..];
    }

    out.push_str(rest);
    out
}

/// Parse a timestamp given as RFC 3339, RFC 2822, or a zoneless local form.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}
