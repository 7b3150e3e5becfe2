//! Key-value persistence.
//!
//! [`KvStore`] is the backend seam; [`NewsStore`] lays news records out on
//! top of it: one key per record under `<namespace>:` plus a reserved
//! `<namespace>:count` counter.

mod memory;
mod rest;
mod sqlite;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::{StoreBackend, StoreConfig};
use crate::models::NewsRecord;
use crate::{Error, Result};

pub use memory::MemoryStore;
pub use rest::RestStore;
pub use sqlite::SqliteStore;

const COUNTER_SUFFIX: &str = "count";

/// Minimal key-value interface. Calls may be remote; no transactions.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Last write wins.
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Write only if the key is missing. Returns whether the write happened.
    async fn put_if_absent(&self, key: &str, value: &str) -> Result<bool>;

    /// Keys starting with `prefix`, sorted ascending.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Add one to an integer counter, treating a missing key as 0.
    async fn increment(&self, key: &str) -> Result<i64>;

    /// Backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Build the backend selected in configuration.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn KvStore>> {
    let store: Arc<dyn KvStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Sqlite => {
            let store = SqliteStore::new(&config.database_url).await?;
            store.initialize().await?;
            Arc::new(store)
        }
        StoreBackend::Rest => {
            let url = config
                .rest_url
                .as_deref()
                .ok_or_else(|| Error::Config("store.rest_url is not set".to_string()))?;
            let token = config
                .rest_token
                .as_deref()
                .ok_or_else(|| Error::Config("store.rest_token is not set".to_string()))?;
            Arc::new(RestStore::new(url, token)?)
        }
    };

    info!("Using {} key-value store", store.backend_name());
    Ok(store)
}

/// News records on top of a [`KvStore`].
#[derive(Clone)]
pub struct NewsStore {
    kv: Arc<dyn KvStore>,
    prefix: String,
    counter_key: String,
    counter_stale: Arc<AtomicBool>,
}

impl NewsStore {
    pub fn new(kv: Arc<dyn KvStore>, namespace: &str) -> Self {
        let prefix = format!("{}:", namespace);
        let counter_key = format!("{}{}", prefix, COUNTER_SUFFIX);
        Self {
            kv,
            prefix,
            counter_key,
            counter_stale: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn counter_key(&self) -> &str {
        &self.counter_key
    }

    pub fn backend_name(&self) -> &'static str {
        self.kv.backend_name()
    }

    /// `<prefix><pubDate epoch ms>-<8 hex chars of sha256(title \n link)>`
    pub fn record_key(&self, record: &NewsRecord) -> String {
        let mut hasher = Sha256::new();
        hasher.update(record.title.as_bytes());
        hasher.update(b"\n");
        hasher.update(record.link.as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        format!(
            "{}{}-{}",
            self.prefix,
            record.pub_date.timestamp_millis(),
            &digest[..8]
        )
    }

    pub async fn record_keys(&self) -> Result<Vec<String>> {
        let keys = self.kv.list_keys(&self.prefix).await?;
        Ok(keys
            .into_iter()
            .filter(|key| *key != self.counter_key)
            .collect())
    }

    pub async fn get(&self, key: &str) -> Result<Option<NewsRecord>> {
        match self.kv.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    /// Every readable record in key order. Missing or corrupt values are
    /// skipped.
    pub async fn load_all(&self) -> Result<Vec<NewsRecord>> {
        let keys = self.record_keys().await?;
        let mut records = Vec::with_capacity(keys.len());

        for key in keys {
            match self.get(&key).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => warn!("Key {} vanished while listing", key),
                Err(Error::Serialization(e)) => warn!("Skipping corrupt record {}: {}", key, e),
                Err(e) => return Err(e),
            }
        }

        Ok(records)
    }

    /// Persist a record and bump the counter. Returns `false` without
    /// touching the counter when the key is already taken.
    ///
    /// Once the record is written the insert counts as done: a failed
    /// increment only marks the counter stale for [`NewsStore::reconcile_count`].
    pub async fn insert(&self, record: &NewsRecord) -> Result<bool> {
        let key = self.record_key(record);
        let value = serde_json::to_string(record)?;

        if !self.kv.put_if_absent(&key, &value).await? {
            return Ok(false);
        }

        if let Err(e) = self.kv.increment(&self.counter_key).await {
            warn!("Stored {} but could not update {}: {}", key, self.counter_key, e);
            self.counter_stale.store(true, Ordering::SeqCst);
        }
        Ok(true)
    }

    pub fn counter_is_stale(&self) -> bool {
        self.counter_stale.load(Ordering::SeqCst)
    }

    /// Rewrite the counter from the record keys if an increment failed since
    /// the last reconcile. A no-op otherwise.
    pub async fn reconcile_count(&self) -> Result<()> {
        if !self.counter_stale.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let result = match self.record_keys().await {
            Ok(keys) => self
                .kv
                .put(&self.counter_key, &keys.len().to_string())
                .await
                .map(|()| keys.len()),
            Err(e) => Err(e),
        };

        match result {
            Ok(count) => {
                info!("Reset {} to {}", self.counter_key, count);
                Ok(())
            }
            Err(e) => {
                self.counter_stale.store(true, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    pub async fn count(&self) -> Result<i64> {
        match self.kv.get(&self.counter_key).await? {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| Error::Store(format!("Counter {} is not an integer", self.counter_key))),
            None => Ok(0),
        }
    }
}
