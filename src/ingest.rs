use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::dedup::DedupIndex;
use crate::fetcher::FeedFetcher;
use crate::models::{IngestReport, ItemFailure};
use crate::normalizer::Normalizer;
use crate::parser::parse_feed;
use crate::store::NewsStore;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPhase {
    Fetching,
    Parsing,
    Normalizing,
    Storing,
    Done,
    Failed,
}

impl fmt::Display for IngestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestPhase::Fetching => "FETCHING",
            IngestPhase::Parsing => "PARSING",
            IngestPhase::Normalizing => "NORMALIZING",
            IngestPhase::Storing => "DEDUPING+STORING",
            IngestPhase::Done => "DONE",
            IngestPhase::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

fn enter(phase: IngestPhase) {
    debug!("Ingestion phase: {}", phase);
}

fn fail(from: IngestPhase, e: Error) -> Error {
    error!("Ingestion {} -> {}: {}", from, IngestPhase::Failed, e);
    e
}

/// Clears the running flag when a run ends, including when its future is
/// dropped mid-flight.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs fetch → parse → normalize → dedupe → store against one feed.
pub struct Ingestor {
    fetcher: FeedFetcher,
    normalizer: Normalizer,
    store: NewsStore,
    running: AtomicBool,
}

impl Ingestor {
    pub fn new(fetcher: FeedFetcher, normalizer: Normalizer, store: NewsStore) -> Self {
        Self {
            fetcher,
            normalizer,
            store,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// One ingestion run. Only one run may be active per `Ingestor`.
    pub async fn run(&self) -> Result<IngestReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Ingestion already in progress, rejecting");
            return Err(Error::IngestInProgress);
        }
        let _guard = RunGuard(&self.running);

        self.do_run().await
    }

    async fn do_run(&self) -> Result<IngestReport> {
        let now = Utc::now();

        enter(IngestPhase::Fetching);
        let bytes = self
            .fetcher
            .fetch()
            .await
            .map_err(|e| fail(IngestPhase::Fetching, e))?;

        enter(IngestPhase::Parsing);
        let parsed = parse_feed(&bytes).map_err(|e| fail(IngestPhase::Parsing, e))?;

        let mut report = IngestReport {
            total_processed: parsed.items.len(),
            feed_title: parsed
                .title
                .unwrap_or_else(|| format!("{} 뉴스", self.normalizer.source())),
            ..IngestReport::default()
        };

        if parsed.items.is_empty() {
            info!("Feed '{}' has no items, nothing to do", report.feed_title);
            enter(IngestPhase::Done);
            return Ok(report);
        }

        enter(IngestPhase::Normalizing);
        let records: Vec<_> = parsed
            .items
            .iter()
            .filter_map(|item| self.normalizer.normalize(item, now))
            .collect();
        report.skipped_count = parsed.items.len() - records.len();
        if report.skipped_count > 0 {
            info!("Discarded {} items without a title", report.skipped_count);
        }

        enter(IngestPhase::Storing);
        let existing = self
            .store
            .load_all()
            .await
            .map_err(|e| {
                error!("Could not load stored records for deduplication: {}", e);
                e
            })?;
        let mut index = DedupIndex::from_records(&existing);

        for record in records {
            if index.contains(&record) {
                debug!("Duplicate: {}", record.title);
                report.skipped_count += 1;
                continue;
            }

            match self.store.insert(&record).await {
                Ok(true) => {
                    report.added_count += 1;
                }
                Ok(false) => {
                    debug!("Key already taken: {}", record.title);
                    report.skipped_count += 1;
                }
                Err(e) => {
                    warn!("Failed to store '{}': {}", record.title, e);
                    report.failures.push(ItemFailure {
                        title: record.title.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            }
            index.insert(&record);
        }

        if let Err(e) = self.store.reconcile_count().await {
            warn!("Record counter is still out of date: {}", e);
        }

        enter(IngestPhase::Done);
        info!(
            "Ingested '{}': {} added, {} skipped, {} failed of {}",
            report.feed_title,
            report.added_count,
            report.skipped_count,
            report.failures.len(),
            report.total_processed
        );
        Ok(report)
    }
}

/// Run once now, then every `interval_minutes`.
pub async fn start_background_ingest(ingestor: Arc<Ingestor>, interval_minutes: u64) {
    let interval = Duration::from_secs(interval_minutes * 60);

    info!("Starting initial ingestion");
    if let Err(e) = ingestor.run().await {
        error!("Initial ingestion failed: {}", e);
    }

    loop {
        tokio::time::sleep(interval).await;
        info!("Starting scheduled ingestion");
        if let Err(e) = ingestor.run().await {
            error!("Scheduled ingestion failed: {}", e);
        }
    }
}
