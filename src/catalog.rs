use std::sync::Arc;

use thiserror::Error;

use crate::db::{Store, StoreError};
use crate::ingest::RunSummary;
use crate::models::{Event, EventPatch, EventQuery, NewEvent};
use crate::normalize::ValidationError;
use crate::scheduler::{IngestionError, Scheduler};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("event {0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("an ingestion run is already in progress")]
    AlreadyRunning,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for CatalogError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(err) => CatalogError::Validation(err),
            other => CatalogError::Store(other),
        }
    }
}

impl From<IngestionError> for CatalogError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::AlreadyRunning => CatalogError::AlreadyRunning,
            IngestionError::Store(err) => err.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Operations offered to the transport layer. Reads go straight to the store and never
/// start ingestion.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<Store>,
    scheduler: Arc<Scheduler>,
}

impl Catalog {
    pub fn new(store: Arc<Store>, scheduler: Arc<Scheduler>) -> Self {
        Self { store, scheduler }
    }

    pub fn list_events(&self, query: &EventQuery) -> Result<Vec<Event>> {
        Ok(self.store.query(query)?)
    }

    pub fn get_event(&self, id: i64) -> Result<Event> {
        self.store.get(id)?.ok_or(CatalogError::NotFound(id))
    }

    pub fn create_event(&self, fields: NewEvent) -> Result<Event> {
        Ok(self.store.create(fields)?)
    }

    pub fn update_event(&self, id: i64, patch: EventPatch) -> Result<Event> {
        self.store.update(id, patch)?.ok_or(CatalogError::NotFound(id))
    }

    pub fn delete_event(&self, id: i64) -> Result<()> {
        if self.store.delete(id)? {
            Ok(())
        } else {
            Err(CatalogError::NotFound(id))
        }
    }

    pub async fn trigger_ingestion(&self) -> Result<RunSummary> {
        Ok(self.scheduler.trigger().await?)
    }
}
