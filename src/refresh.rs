use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::aggregator::{Aggregator, CycleReport, PendingCycle};
use crate::display::{publish_batch, DisplaySink};

/// Runs cycles one at a time: fetch, merge and publish all happen under one lock.
pub struct Refresher {
    aggregator: Mutex<Aggregator>,
    sink: Arc<dyn DisplaySink>,
    local_offset: FixedOffset,
}

impl Refresher {
    pub fn new(aggregator: Aggregator, sink: Arc<dyn DisplaySink>, local_offset: FixedOffset) -> Self {
        Self {
            aggregator: Mutex::new(aggregator),
            sink,
            local_offset,
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.aggregator.try_lock().is_err()
    }

    /// Run a cycle, waiting for any cycle already in progress to finish first.
    pub async fn refresh(&self) -> CycleReport {
        let mut aggregator = self.aggregator.lock().await;
        self.run_cycle(&mut aggregator).await
    }

    /// Run a cycle unless one is already in progress.
    pub async fn try_refresh(&self) -> Option<CycleReport> {
        let Ok(mut aggregator) = self.aggregator.try_lock() else {
            info!("Refresh already in progress, skipping");
            return None;
        };
        Some(self.run_cycle(&mut aggregator).await)
    }

    async fn run_cycle(&self, aggregator: &mut Aggregator) -> CycleReport {
        let PendingCycle {
            batch,
            report,
            displayed,
        } = aggregator.run_cycle().await;
        publish_batch(batch, self.sink.as_ref(), self.local_offset).await;
        // Dropped before this point, the cycle leaves the displayed set as it was
        aggregator.commit(displayed);

        info!(
            mode = ?aggregator.mode(),
            sources = report.sources,
            failed_sources = report.failed_sources,
            fetched = report.fetched,
            published = report.published,
            "cycle complete"
        );
        report
    }
}

/// Handle to the background refresh loop.
pub struct RefreshHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the loop, abandoning any in-flight cycle, and wait for it to exit.
    ///
    /// An abandoned cycle records nothing as displayed, so its entries come
    /// back on the next cycle.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!("Refresh loop ended abnormally: {}", e);
        }
    }
}

/// Run one cycle now, then another `interval` after each cycle completes.
///
/// The timer is armed only once a cycle has published, so cycles never overlap.
pub fn spawn_refresh_loop(refresher: Arc<Refresher>, interval: Duration) -> RefreshHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let task = tokio::spawn(async move {
        info!("Starting initial feed fetch");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = refresher.refresh() => {}
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            info!("Starting scheduled feed refresh");
        }
        info!("Refresh loop stopped");
    });

    RefreshHandle { cancel, task }
}
