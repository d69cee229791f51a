use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::db::StoreError;
use crate::ingest::{Ingestor, RunSummary};

const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("an ingestion run is already in progress")]
    AlreadyRunning,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Holds the `Running` state; dropping it, on any exit path, returns the scheduler to `Idle`.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Triggers ingestion on a fixed interval and on demand, never more than one run at a time.
/// Triggers that arrive mid-run are dropped, not queued.
pub struct Scheduler {
    ingestor: Arc<Ingestor>,
    interval: Duration,
    running: AtomicBool,
}

impl Scheduler {
    /// `interval` is raised to at least one second.
    pub fn new(ingestor: Arc<Ingestor>, interval: Duration) -> Self {
        Self {
            ingestor,
            interval: interval.max(MIN_INTERVAL),
            running: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    pub async fn trigger(&self) -> Result<RunSummary, IngestionError> {
        let _guard = RunGuard::acquire(&self.running).ok_or(IngestionError::AlreadyRunning)?;
        debug!("scheduler running");
        let summary = self.ingestor.run().await;
        debug!("scheduler idle");
        Ok(summary)
    }

    /// Fills an empty store before queries are served; a populated store is left alone.
    pub async fn cold_start(&self) -> Result<Option<RunSummary>, IngestionError> {
        let existing = self.ingestor.store().count()?;
        if existing > 0 {
            info!(events = existing, "store already populated, skipping cold start");
            return Ok(None);
        }
        info!("store is empty, running initial ingestion");
        self.trigger().await.map(Some)
    }

    /// Spawns the timer. The first fire comes one full interval after start.
    pub fn start(self: &Arc<Self>) -> SchedulerHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let scheduler = Arc::clone(self);
        let period = self.interval;
        info!(interval_secs = period.as_secs(), "starting ingestion timer");

        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => match scheduler.trigger().await {
                        Ok(_) => {}
                        Err(IngestionError::AlreadyRunning) => {
                            info!("timer fired during a run in progress, skipping");
                        }
                        Err(err) => error!(error = %err, "scheduled ingestion failed"),
                    },
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("ingestion timer stopped");
        });

        SchedulerHandle { shutdown, task }
    }
}

pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops the timer, letting a run already in progress finish first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            error!(error = %err, "ingestion timer task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use tokio::sync::Semaphore;

    use super::*;
    use crate::db::Store;
    use crate::ingest::tests::{ingestor, three_pages, three_sources};
    use crate::ingest::IngestOptions;

    fn scheduler_over(
        store: Arc<Store>,
        web: Arc<crate::ingest::tests::FakeWeb>,
        interval: Duration,
    ) -> Arc<Scheduler> {
        let ingestor = ingestor(store, three_sources(), web, IngestOptions::default());
        Arc::new(Scheduler::new(Arc::new(ingestor), interval))
    }

    #[tokio::test]
    async fn overlapping_triggers_collapse_into_one_run() {
        let gate = Arc::new(Semaphore::new(0));
        let web = Arc::new(three_pages().gated(gate.clone()));
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let scheduler = scheduler_over(store.clone(), web.clone(), Duration::from_secs(3600));

        let first = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.trigger().await }
        });
        while scheduler.state() != SchedulerState::Running {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            scheduler.trigger().await,
            Err(IngestionError::AlreadyRunning)
        ));
        assert!(matches!(
            scheduler.trigger().await,
            Err(IngestionError::AlreadyRunning)
        ));

        gate.add_permits(3);
        let summary = first.await.expect("join").expect("first run");
        assert_eq!(summary.records_ingested, 3);
        assert_eq!(web.calls.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(store.count().expect("count"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_each_interval_until_stopped() {
        let web = Arc::new(three_pages());
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let scheduler = scheduler_over(store.clone(), web.clone(), Duration::from_secs(60));

        let handle = scheduler.start();
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(web.calls.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_secs(31)).await;
        assert_eq!(web.calls.load(Ordering::SeqCst), 3);

        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(web.calls.load(Ordering::SeqCst), 6);
        assert_eq!(store.count().expect("count"), 3, "repeat runs upsert in place");

        handle.stop().await;
        time::sleep(Duration::from_secs(600)).await;
        assert_eq!(web.calls.load(Ordering::SeqCst), 6);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn cold_start_only_fills_an_empty_store() {
        let web = Arc::new(three_pages());
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let scheduler = scheduler_over(store.clone(), web.clone(), Duration::from_secs(3600));

        let summary = scheduler
            .cold_start()
            .await
            .expect("cold start")
            .expect("store was empty");
        assert_eq!(summary.records_created, 3);

        assert!(scheduler.cold_start().await.expect("second").is_none());
        assert_eq!(web.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_tick_during_manual_run_is_dropped() {
        let gate = Arc::new(Semaphore::new(0));
        let web = Arc::new(three_pages().gated(gate.clone()));
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let scheduler = scheduler_over(store.clone(), web.clone(), Duration::from_secs(60));

        let handle = scheduler.start();
        let manual = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.trigger().await }
        });
        while scheduler.state() != SchedulerState::Running {
            tokio::task::yield_now().await;
        }

        time::sleep(Duration::from_secs(90)).await;
        assert_eq!(scheduler.state(), SchedulerState::Running);

        gate.add_permits(3);
        let summary = manual.await.expect("join").expect("manual run");
        assert_eq!(summary.records_ingested, 3);
        assert_eq!(web.calls.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        handle.stop().await;
        assert_eq!(web.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_clamped() {
        let web = Arc::new(three_pages());
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let scheduler = scheduler_over(store, web.clone(), Duration::ZERO);

        let handle = scheduler.start();
        time::sleep(Duration::from_millis(1500)).await;
        handle.stop().await;
        assert_eq!(web.calls.load(Ordering::SeqCst), 3);
    }
}
