use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::db::{Store, UpsertOutcome};
use crate::models::RawRecord;
use crate::normalize;
use crate::scraping::{ScrapeError, Scrapers};
use crate::sources::{Source, SourceRegistry};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Ok,
    /// Fetched, but nothing on the page looked like a listing.
    Unparsed { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub source: String,
    pub status: SourceStatus,
    pub records_found: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub sources_attempted: usize,
    pub sources_failed: usize,
    pub records_ingested: usize,
    pub records_rejected: usize,
    pub records_created: usize,
    pub records_updated: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub max_concurrent_sources: usize,
    pub source_timeout: Duration,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_concurrent_sources: 4,
            source_timeout: Duration::from_secs(20),
        }
    }
}

/// Runs one ingestion pass: fetch every source, normalize, upsert.
pub struct Ingestor {
    store: Arc<Store>,
    registry: SourceRegistry,
    scrapers: Scrapers,
    options: IngestOptions,
}

impl Ingestor {
    pub fn new(
        store: Arc<Store>,
        registry: SourceRegistry,
        scrapers: Scrapers,
        options: IngestOptions,
    ) -> Self {
        Self {
            store,
            registry,
            scrapers,
            options,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub async fn run(&self) -> RunSummary {
        let started_at = Utc::now();
        let sources = self.registry.snapshot();
        info!(sources = sources.len(), "ingestion run starting");

        let limit = self.options.max_concurrent_sources.max(1);
        // Indexed so every future borrows `sources` for one lifetime and `run` stays `Send`.
        let fetched: Vec<(&Source, Result<Vec<RawRecord>, ScrapeError>)> =
            stream::iter(0..sources.len())
                .map(|i| {
                    let source = &sources[i];
                    async move { (source, self.scrape(source).await) }
                })
                .buffer_unordered(limit)
                .collect()
                .await;

        let mut summary = RunSummary {
            sources_attempted: sources.len(),
            sources_failed: 0,
            records_ingested: 0,
            records_rejected: 0,
            records_created: 0,
            records_updated: 0,
            started_at,
            finished_at: started_at,
            sources: Vec::with_capacity(sources.len()),
        };

        for (source, outcome) in fetched {
            let (status, records) = match outcome {
                Ok(records) => (SourceStatus::Ok, records),
                Err(ScrapeError::Parse(reason)) => {
                    warn!(
                        source = %source.name,
                        reason = %reason,
                        "page not recognised, no records"
                    );
                    (SourceStatus::Unparsed { reason }, Vec::new())
                }
                Err(err) => {
                    warn!(source = %source.name, error = %err, "source failed");
                    summary.sources_failed += 1;
                    (
                        SourceStatus::Failed {
                            error: err.to_string(),
                        },
                        Vec::new(),
                    )
                }
            };

            summary.sources.push(SourceReport {
                source: source.name.clone(),
                status,
                records_found: records.len(),
            });
            self.persist(source, &records, &mut summary);
        }

        summary.finished_at = Utc::now();
        info!(
            attempted = summary.sources_attempted,
            failed = summary.sources_failed,
            ingested = summary.records_ingested,
            rejected = summary.records_rejected,
            "ingestion run finished"
        );
        summary
    }

    async fn scrape(&self, source: &Source) -> Result<Vec<RawRecord>, ScrapeError> {
        let strategy = self.scrapers.strategy_for(source)?;
        let timeout = self.options.source_timeout;
        match tokio::time::timeout(timeout, strategy.fetch_and_extract(&source.url)).await {
            Ok(result) => result,
            Err(_) => Err(ScrapeError::Timeout(timeout)),
        }
    }

    fn persist(&self, source: &Source, records: &[RawRecord], summary: &mut RunSummary) {
        for raw in records {
            let fields = match normalize::normalize(raw, source) {
                Ok(fields) => fields,
                Err(err) => {
                    warn!(source = %source.name, error = %err, "dropping record");
                    summary.records_rejected += 1;
                    continue;
                }
            };
            match self.store.upsert(fields) {
                Ok((_, outcome)) => {
                    summary.records_ingested += 1;
                    match outcome {
                        UpsertOutcome::Created => summary.records_created += 1,
                        UpsertOutcome::Updated => summary.records_updated += 1,
                    }
                }
                Err(err) => {
                    warn!(source = %source.name, error = %err, "failed to store record");
                    summary.records_rejected += 1;
                }
            }
        }
    }
}
