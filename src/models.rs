use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored news item. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsRecord {
    pub title: String,
    pub author: String,
    pub link: String,
    #[serde(with = "iso_millis")]
    pub pub_date: DateTime<Utc>,
    pub source: String,
    #[serde(with = "iso_millis")]
    pub fetched_at: DateTime<Utc>,
}

/// Manual add request body. Fields are optional so validation can name
/// every missing one instead of failing on the first.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNews {
    pub title: Option<String>,
    pub author: Option<String>,
    pub link: Option<String>,
    pub pub_date: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub title: String,
    pub error: String,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub added_count: usize,
    pub skipped_count: usize,
    pub total_processed: usize,
    pub feed_title: String,
    pub failures: Vec<ItemFailure>,
}

/// Serializes timestamps as `2024-01-01T00:00:00.000Z`.
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
