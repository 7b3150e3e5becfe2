use chrono::{SubsecRound, Utc};
use reqwest::Url;
use tracing::{info, warn};

use crate::dedup::DedupIndex;
use crate::models::{NewNews, NewsRecord};
use crate::normalizer::parse_timestamp;
use crate::store::NewsStore;
use crate::{Error, Result};

/// Listing and manual entry on top of the record store.
#[derive(Clone)]
pub struct NewsService {
    store: NewsStore,
    source: String,
}

impl NewsService {
    pub fn new(store: NewsStore, source: impl Into<String>) -> Self {
        Self {
            store,
            source: source.into(),
        }
    }

    pub fn store(&self) -> &NewsStore {
        &self.store
    }

    /// All records, newest first. Ties keep key order.
    pub async fn list_news(&self) -> Result<Vec<NewsRecord>> {
        let mut records = self.store.load_all().await?;
        records.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));
        Ok(records)
    }

    pub async fn add_news(&self, input: NewNews) -> Result<NewsRecord> {
        let record = self.validate(input)?;

        let existing = self.store.load_all().await?;
        if DedupIndex::from_records(&existing).contains(&record) {
            return Err(Error::Conflict {
                title: record.title,
                link: record.link,
            });
        }

        if !self.store.insert(&record).await? {
            return Err(Error::Conflict {
                title: record.title,
                link: record.link,
            });
        }

        if let Err(e) = self.store.reconcile_count().await {
            warn!("Record counter is still out of date: {}", e);
        }

        info!("Added news manually: {}", record.title);
        Ok(record)
    }

    fn validate(&self, input: NewNews) -> Result<NewsRecord> {
        fn required(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        let title = required(input.title);
        let author = required(input.author);
        let link = required(input.link);

        let missing: Vec<&str> = [("title", &title), ("author", &author), ("link", &link)]
            .into_iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name)
            .collect();
        let (Some(title), Some(author), Some(link)) = (title, author, link) else {
            return Err(Error::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        };

        match Url::parse(&link) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(Error::Validation(format!(
                    "link must be an absolute http(s) URL: {}",
                    link
                )))
            }
        }

        let now = Utc::now().trunc_subsecs(3);
        let pub_date = match required(input.pub_date) {
            Some(value) => parse_timestamp(&value)
                .ok_or_else(|| Error::Validation(format!("unparseable pubDate: {}", value)))?
                .trunc_subsecs(3),
            None => now,
        };

        Ok(NewsRecord {
            title,
            author,
            link,
            pub_date,
            source: required(input.source).unwrap_or_else(|| self.source.clone()),
            fetched_at: now,
        })
    }
}
