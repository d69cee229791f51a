use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::{Semaphore, SemaphorePermit};

use super::ScrapeError;

/// Produces the DOM of a page after client-side script has run.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, ScrapeError>;
}

/// Renders pages through a Browserless-compatible `/content` endpoint.
pub struct BrowserlessRenderer {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl BrowserlessRenderer {
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ScrapeError::Fetch(format!("unable to build renderer client: {err}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/content", base_url.trim_end_matches('/')),
            token: token.map(String::from),
        })
    }
}

#[async_trait]
impl Renderer for BrowserlessRenderer {
    async fn render(&self, url: &str) -> Result<String, ScrapeError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "url": url }));
        if let Some(ref token) = self.token {
            request = request.query(&[("token", token)]);
        }

        let response = request
            .send()
            .await
            .map_err(|err| ScrapeError::Fetch(format!("render request failed for {url}: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ScrapeError::Fetch(format!(
                "renderer returned status {} for {url}: {message}",
                status.as_u16()
            )));
        }
        response
            .text()
            .await
            .map_err(|err| ScrapeError::Fetch(format!("unable to read rendered page {url}: {err}")))
    }
}

/// Bounds how many pages render at once. A checked-out instance is returned to the pool when
/// its `RendererLease` drops, whichever way the render ends.
pub struct RendererPool {
    renderer: Option<Arc<dyn Renderer>>,
    slots: Semaphore,
    capacity: usize,
}

pub struct RendererLease<'a> {
    renderer: &'a dyn Renderer,
    _permit: SemaphorePermit<'a>,
}

impl RendererPool {
    pub fn new(renderer: Arc<dyn Renderer>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            renderer: Some(renderer),
            slots: Semaphore::new(capacity),
            capacity,
        }
    }

    /// A pool with no renderer behind it; every checkout fails.
    pub fn unconfigured() -> Self {
        Self {
            renderer: None,
            slots: Semaphore::new(1),
            capacity: 1,
        }
    }

    pub async fn checkout(&self) -> Result<RendererLease<'_>, ScrapeError> {
        let renderer = self
            .renderer
            .as_deref()
            .ok_or_else(|| ScrapeError::Fetch("no renderer configured".to_string()))?;
        let permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| ScrapeError::Fetch("renderer pool closed".to_string()))?;
        Ok(RendererLease {
            renderer,
            _permit: permit,
        })
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl RendererLease<'_> {
    pub async fn render(&self, url: &str) -> Result<String, ScrapeError> {
        self.renderer.render(url).await
    }
}
