use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::domain::ZoneId;
use tokio::{
    sync::{broadcast, Mutex},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod store;
pub mod sync;
pub mod timer;
pub mod transport;
pub mod types;

pub use config::ClientSettings;
pub use dispatcher::{CommandDispatcher, CommandOutcome, TimerMinutes};
pub use error::{TransportError, ValidationError, ZoneError};
pub use store::{ApplyOutcome, ZoneStore};
pub use sync::{SyncOutcome, SyncPoller, ZoneSync, DEFAULT_POLL_INTERVAL};
pub use timer::{TimerPresenter, ZoneView};
pub use transport::{HttpZoneBackend, ZoneBackend};
pub use types::{
    ClientEvent, Notice, NoticeLevel, Zone, ZonePatch, ZoneSnapshot, ZoneStatus,
    TIMER_PRESET_MINUTES,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What the UI layer sees: a snapshot accessor, the four commands and a
/// change subscription.
#[async_trait]
pub trait ZoneHandle: Send + Sync {
    async fn snapshot(&self) -> ZoneSnapshot;
    async fn toggle_pump(&self, zone_id: ZoneId) -> Result<CommandOutcome, ZoneError>;
    async fn start_timer(&self, zone_id: ZoneId, minutes: i64)
        -> Result<CommandOutcome, ZoneError>;
    async fn stop_timer(&self, zone_id: ZoneId) -> Result<CommandOutcome, ZoneError>;
    async fn rename(&self, zone_id: ZoneId, new_name: &str)
        -> Result<CommandOutcome, ZoneError>;
    fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent>;
}

/// Owns the store, the sync engine, the dispatcher and the poller of one
/// zone view. Dropping or shutting it down discards every in-flight result.
pub struct ZoneController {
    store: Arc<ZoneStore>,
    sync: Arc<ZoneSync>,
    dispatcher: CommandDispatcher,
    poller: Mutex<Option<SyncPoller>>,
    poll_interval: Duration,
    cancel: CancellationToken,
    events: broadcast::Sender<ClientEvent>,
}

impl ZoneController {
    pub fn new(backend: Arc<dyn ZoneBackend>) -> Arc<Self> {
        Self::with_poll_interval(backend, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(backend: Arc<dyn ZoneBackend>, poll_interval: Duration) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let store = Arc::new(ZoneStore::new(events.clone()));
        let sync = Arc::new(ZoneSync::new(Arc::clone(&backend), Arc::clone(&store)));
        let dispatcher = CommandDispatcher::new(
            backend,
            Arc::clone(&sync),
            events.clone(),
            cancel.clone(),
        );
        Arc::new(Self {
            store,
            sync,
            dispatcher,
            poller: Mutex::new(None),
            poll_interval,
            cancel,
            events,
        })
    }

    /// Builds an HTTP-backed controller from resolved settings.
    pub fn from_settings(settings: &ClientSettings) -> Result<Arc<Self>> {
        let backend =
            HttpZoneBackend::with_timeout(&settings.api_base_url, settings.request_timeout())
                .context("failed to build zone api client")?
                .with_bearer_token(settings.auth_token.clone());
        Ok(Self::with_poll_interval(
            Arc::new(backend),
            settings.poll_interval(),
        ))
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub async fn snapshot(&self) -> ZoneSnapshot {
        self.store.snapshot().await
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Starts the poller if it is not already running. Returns false when it
    /// was running or the controller is shut down.
    pub async fn start_polling(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let mut guard = self.poller.lock().await;
        if guard.as_ref().is_some_and(SyncPoller::is_running) {
            return false;
        }
        *guard = Some(SyncPoller::spawn(
            Arc::clone(&self.sync),
            self.poll_interval,
            &self.cancel,
            self.events.clone(),
        ));
        true
    }

    pub async fn stop_polling(&self) {
        let poller = self.poller.lock().await.take();
        if let Some(mut poller) = poller {
            poller.stop().await;
        }
    }

    pub async fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .await
            .as_ref()
            .is_some_and(SyncPoller::is_running)
    }

    /// One authoritative fetch outside the poll schedule.
    pub async fn refresh(&self) -> Result<SyncOutcome, TransportError> {
        self.sync.refresh(&self.cancel).await
    }

    pub async fn toggle_pump(&self, zone_id: ZoneId) -> Result<CommandOutcome, ZoneError> {
        self.dispatcher.toggle_pump(zone_id).await
    }

    pub async fn start_timer(
        &self,
        zone_id: ZoneId,
        minutes: i64,
    ) -> Result<CommandOutcome, ZoneError> {
        self.dispatcher.start_timer(zone_id, minutes).await
    }

    pub async fn start_timer_input(
        &self,
        zone_id: ZoneId,
        input: &str,
    ) -> Result<CommandOutcome, ZoneError> {
        self.dispatcher.start_timer_input(zone_id, input).await
    }

    pub async fn stop_timer(&self, zone_id: ZoneId) -> Result<CommandOutcome, ZoneError> {
        self.dispatcher.stop_timer(zone_id).await
    }

    pub async fn rename(
        &self,
        zone_id: ZoneId,
        new_name: &str,
    ) -> Result<CommandOutcome, ZoneError> {
        self.dispatcher.rename(zone_id, new_name).await
    }

    pub async fn present(&self, now: Instant) -> Vec<ZoneView> {
        TimerPresenter::present(&self.snapshot().await, now)
    }

    /// Leaves the view: stops polling and makes every pending result a no-op.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.stop_polling().await;
        self.store.barrier().await;
        info!("zones: controller shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ZoneController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl ZoneHandle for Arc<ZoneController> {
    async fn snapshot(&self) -> ZoneSnapshot {
        ZoneController::snapshot(self).await
    }

    async fn toggle_pump(&self, zone_id: ZoneId) -> Result<CommandOutcome, ZoneError> {
        ZoneController::toggle_pump(self, zone_id).await
    }

    async fn start_timer(
        &self,
        zone_id: ZoneId,
        minutes: i64,
    ) -> Result<CommandOutcome, ZoneError> {
        ZoneController::start_timer(self, zone_id, minutes).await
    }

    async fn stop_timer(&self, zone_id: ZoneId) -> Result<CommandOutcome, ZoneError> {
        ZoneController::stop_timer(self, zone_id).await
    }

    async fn rename(&self, zone_id: ZoneId, new_name: &str) -> Result<CommandOutcome, ZoneError> {
        ZoneController::rename(self, zone_id, new_name).await
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/fake_backend.rs"]
pub(crate) mod fake_backend;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
