pub mod catalog;
pub mod config;
pub mod db;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod scheduler;
pub mod scraping;
pub mod sources;
mod utils;

use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub use catalog::{Catalog, CatalogError};
pub use config::AppConfig;
pub use db::{Store, StoreError};
pub use ingest::{IngestOptions, Ingestor, RunSummary};
pub use models::{Event, EventPatch, EventQuery, NewEvent};
pub use scheduler::{IngestionError, Scheduler, SchedulerHandle, SchedulerState};
pub use sources::{Source, SourceRegistry, StrategyKind};

use scraping::base::{HttpFetcher, PageFetcher};
use scraping::dynamic::{BrowserlessRenderer, Renderer, RendererPool};
use scraping::fixtures::FixturePages;
use scraping::Scrapers;

/// Wires the store, strategies, orchestrator and scheduler from `config`.
pub fn build(config: &AppConfig, store: Arc<Store>) -> anyhow::Result<(Catalog, Arc<Scheduler>)> {
    let scrapers = if config.use_fixtures {
        info!("serving bundled fixture pages instead of live sources");
        let pages = Arc::new(FixturePages::bundled());
        let renderer: Arc<dyn Renderer> = pages.clone();
        Scrapers::new(
            pages,
            Arc::new(RendererPool::new(renderer, config.max_renderers)),
        )
    } else {
        let fetcher: Arc<dyn PageFetcher> =
            Arc::new(HttpFetcher::new(&config.user_agent, config.source_timeout())?);
        let renderers = match config.renderer_url {
            Some(ref url) => {
                let renderer = BrowserlessRenderer::new(
                    url,
                    config.renderer_token.as_deref(),
                    config.source_timeout(),
                )?;
                RendererPool::new(Arc::new(renderer), config.max_renderers)
            }
            None => {
                warn!("no renderer configured, dynamic sources will fail");
                RendererPool::unconfigured()
            }
        };
        Scrapers::new(fetcher, Arc::new(renderers))
    };

    let registry = SourceRegistry::new(config.sources.clone());
    let ingestor = Ingestor::new(store.clone(), registry, scrapers, config.ingest_options());
    let scheduler = Arc::new(Scheduler::new(Arc::new(ingestor), config.interval()));
    Ok((Catalog::new(store, scheduler.clone()), scheduler))
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let path = config.database_path();
    let store = Arc::new(
        Store::open(&path).with_context(|| format!("opening event store at {}", path.display()))?,
    );
    let (catalog, scheduler) = build(&config, store)?;

    if let Some(summary) = scheduler.cold_start().await? {
        info!(
            ingested = summary.records_ingested,
            failed_sources = summary.sources_failed,
            "initial ingestion complete"
        );
    }
    let events = catalog.list_events(&EventQuery::default())?;
    info!(events = events.len(), "catalog ready");

    let handle = scheduler.start();
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutting down");
    handle.stop().await;
    Ok(())
}

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("event_catalog=info".parse()?),
        )
        .init();

    let config = AppConfig::load().map_err(|err| anyhow!("failed to load config: {err}"))?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    runtime.block_on(serve(config))
}
