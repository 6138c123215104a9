//! Remote sync: single-flight fetch gate shared by the poller and by
//! command-triggered refreshes.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::TransportError,
    store::{ApplyOutcome, ZoneStore},
    transport::ZoneBackend,
    types::{ClientEvent, Zone},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Applied { seq: u64 },
    Stale,
    Cancelled,
    /// Another fetch held the gate; this tick did nothing.
    Skipped,
}

impl From<ApplyOutcome> for SyncOutcome {
    fn from(value: ApplyOutcome) -> Self {
        match value {
            ApplyOutcome::Applied { seq } => SyncOutcome::Applied { seq },
            ApplyOutcome::Stale { .. } => SyncOutcome::Stale,
            ApplyOutcome::Cancelled => SyncOutcome::Cancelled,
        }
    }
}

pub struct ZoneSync {
    backend: Arc<dyn ZoneBackend>,
    store: Arc<ZoneStore>,
    gate: Mutex<()>,
}

impl ZoneSync {
    pub fn new(backend: Arc<dyn ZoneBackend>, store: Arc<ZoneStore>) -> Self {
        Self {
            backend,
            store,
            gate: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<ZoneStore> {
        &self.store
    }

    /// Out-of-band refresh. Waits for any fetch already in flight, then
    /// fetches again so the result reflects everything issued before the call.
    pub async fn refresh(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, TransportError> {
        let _permit = tokio::select! {
            _ = cancel.cancelled() => return Ok(SyncOutcome::Cancelled),
            permit = self.gate.lock() => permit,
        };
        self.fetch_and_apply(cancel).await
    }

    /// Poll tick. Skipped when a fetch is already in flight.
    pub async fn poll_once(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, TransportError> {
        let Ok(_permit) = self.gate.try_lock() else {
            debug!("sync: fetch already in flight, skipping tick");
            return Ok(SyncOutcome::Skipped);
        };
        self.fetch_and_apply(cancel).await
    }

    async fn fetch_and_apply(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, TransportError> {
        if cancel.is_cancelled() {
            return Ok(SyncOutcome::Cancelled);
        }
        let ticket = self.store.issue_ticket();
        let records = tokio::select! {
            _ = cancel.cancelled() => return Ok(SyncOutcome::Cancelled),
            result = self.backend.fetch_zones() => result?,
        };
        let fetched_at = Instant::now();
        let zones = records.into_iter().map(Zone::from).collect::<Vec<_>>();
        debug!(seq = ticket, zones = zones.len(), "sync: fetched zones");

        let outcome = self
            .store
            .replace_all_unless_cancelled(ticket, zones, fetched_at, Some(cancel))
            .await;
        Ok(outcome.into())
    }
}

/// Handle to a running poll loop. Dropping it cancels the loop.
pub struct SyncPoller {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    store: Arc<ZoneStore>,
}

impl SyncPoller {
    /// Starts polling immediately, then every `interval`. The loop ends when
    /// `parent` or the poller's own token is cancelled.
    pub fn spawn(
        sync: Arc<ZoneSync>,
        interval: Duration,
        parent: &CancellationToken,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        let cancel = parent.child_token();
        let store = Arc::clone(sync.store());
        let task = tokio::spawn(run_poll_loop(sync, interval, cancel.clone(), events));
        Self {
            cancel,
            task: Some(task),
            store,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
            && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancels the loop. Once this returns, no fetch started by the poller can
    /// mutate the store.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        self.store.barrier().await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SyncPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_poll_loop(
    sync: Arc<ZoneSync>,
    interval: Duration,
    cancel: CancellationToken,
    events: broadcast::Sender<ClientEvent>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut consecutive_failures = 0u32;
    info!(?interval, "sync: poller started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match sync.poll_once(&cancel).await {
            Ok(SyncOutcome::Cancelled) => break,
            Ok(SyncOutcome::Applied { .. } | SyncOutcome::Stale) => consecutive_failures = 0,
            Ok(SyncOutcome::Skipped) => {}
            Err(err) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                warn!(consecutive_failures, "sync: zone fetch failed: {err}");
                let _ = events.send(ClientEvent::SyncFailed {
                    error: err.to_string(),
                    consecutive_failures,
                });
            }
        }
    }

    info!("sync: poller stopped");
    let _ = events.send(ClientEvent::PollerStopped);
}

#[cfg(test)]
#[path = "tests/sync_tests.rs"]
mod tests;
