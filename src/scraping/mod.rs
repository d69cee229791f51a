pub mod base;
pub mod dynamic;
pub mod extract;
pub mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::models::RawRecord;
use crate::sources::{Source, StrategyKind};
use base::PageFetcher;
use dynamic::RendererPool;
use extract::{CompiledRules, ExtractRules};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScrapeError {
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("unrecognised document: {0}")]
    Parse(String),
    #[error("invalid extraction rules: {0}")]
    Rules(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Fetch and extract, one case per kind of source.
pub enum Strategy {
    Static {
        fetcher: Arc<dyn PageFetcher>,
        rules: CompiledRules,
    },
    Dynamic {
        renderers: Arc<RendererPool>,
        rules: CompiledRules,
    },
}

impl Strategy {
    pub async fn fetch_and_extract(&self, url: &str) -> Result<Vec<RawRecord>, ScrapeError> {
        match self {
            Strategy::Static { fetcher, rules } => {
                let html = fetcher.fetch_html(url).await?;
                extract::extract_records(&html, rules)
            }
            Strategy::Dynamic { renderers, rules } => {
                let html = {
                    let lease = renderers.checkout().await?;
                    lease.render(url).await?
                };
                extract::extract_records(&html, rules)
            }
        }
    }
}

/// Shared transport handles from which a strategy is built for each source.
#[derive(Clone)]
pub struct Scrapers {
    fetcher: Arc<dyn PageFetcher>,
    renderers: Arc<RendererPool>,
}

impl Scrapers {
    pub fn new(fetcher: Arc<dyn PageFetcher>, renderers: Arc<RendererPool>) -> Self {
        Self { fetcher, renderers }
    }

    pub fn renderers(&self) -> &Arc<RendererPool> {
        &self.renderers
    }

    pub fn strategy_for(&self, source: &Source) -> Result<Strategy, ScrapeError> {
        let rules = match source.rules {
            Some(ref rules) => rules.compile()?,
            None => ExtractRules::default().compile()?,
        };
        Ok(match source.strategy_kind {
            StrategyKind::Static => Strategy::Static {
                fetcher: Arc::clone(&self.fetcher),
                rules,
            },
            StrategyKind::Dynamic => Strategy::Dynamic {
                renderers: Arc::clone(&self.renderers),
                rules,
            },
        })
    }
}
