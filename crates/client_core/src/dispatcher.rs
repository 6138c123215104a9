//! User intents to remote calls, with optimistic feedback and a corrective
//! refresh after every call.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use shared::domain::{ZoneId, ZoneMode};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::{TransportError, ValidationError, ZoneError},
    store::ZoneStore,
    sync::ZoneSync,
    transport::ZoneBackend,
    types::{ClientEvent, Notice, Zone, ZonePatch},
};

/// A validated timer length in whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerMinutes(u32);

impl TimerMinutes {
    pub fn new(minutes: i64) -> Result<Self, ValidationError> {
        if minutes <= 0 {
            return Err(ValidationError::InvalidMinutes(minutes.to_string()));
        }
        let minutes_u32 =
            u32::try_from(minutes).map_err(|_| ValidationError::TimerTooLong(minutes))?;
        if minutes_u32.checked_mul(60).is_none() {
            return Err(ValidationError::TimerTooLong(minutes));
        }
        Ok(Self(minutes_u32))
    }

    /// Parses free-text input such as the custom minutes field.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        let minutes = trimmed
            .parse::<i64>()
            .map_err(|_| ValidationError::InvalidMinutes(trimmed.to_string()))?;
        Self::new(minutes)
    }

    pub fn minutes(self) -> u32 {
        self.0
    }

    pub fn seconds(self) -> u32 {
        // Bounded by `new`.
        self.0 * 60
    }
}

/// What a command did locally once it was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The backend accepted the call; `zone` is its echoed record.
    Confirmed { zone: Zone },
    /// Nothing needed to be done (e.g. stopping an idle zone).
    NoChange,
}

pub struct CommandDispatcher {
    backend: Arc<dyn ZoneBackend>,
    sync: Arc<ZoneSync>,
    events: broadcast::Sender<ClientEvent>,
    cancel: CancellationToken,
    pending_timers: Arc<Mutex<HashSet<ZoneId>>>,
}

/// Marks a zone as having an unconfirmed timer start until dropped.
struct PendingTimer {
    zone_id: ZoneId,
    pending: Arc<Mutex<HashSet<ZoneId>>>,
}

impl PendingTimer {
    fn acquire(pending: &Arc<Mutex<HashSet<ZoneId>>>, zone_id: ZoneId) -> Option<Self> {
        if !lock_pending(pending).insert(zone_id) {
            return None;
        }
        Some(Self {
            zone_id,
            pending: Arc::clone(pending),
        })
    }
}

impl Drop for PendingTimer {
    fn drop(&mut self) {
        lock_pending(&self.pending).remove(&self.zone_id);
    }
}

fn lock_pending(pending: &Mutex<HashSet<ZoneId>>) -> MutexGuard<'_, HashSet<ZoneId>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CommandDispatcher {
    pub fn new(
        backend: Arc<dyn ZoneBackend>,
        sync: Arc<ZoneSync>,
        events: broadcast::Sender<ClientEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            backend,
            sync,
            events,
            cancel,
            pending_timers: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn store(&self) -> &ZoneStore {
        self.sync.store()
    }

    pub async fn toggle_pump(&self, zone_id: ZoneId) -> Result<CommandOutcome, ZoneError> {
        self.ensure_no_pending_timer(zone_id)?;

        let proposed = self
            .store()
            .update_optimistic(zone_id, |zone| {
                let turning_on = !zone.is_active;
                ZonePatch {
                    is_active: Some(turning_on),
                    mode: turning_on.then_some(ZoneMode::Manual),
                    ..ZonePatch::default()
                }
            })
            .await;
        let Some(proposed) = proposed else {
            return Err(self.reject(ValidationError::UnknownZone(zone_id)));
        };
        info!(
            zone_id = zone_id.0,
            is_active = proposed.is_active,
            "zones: toggling pump"
        );

        let result = self.backend.toggle(zone_id).await;
        self.refresh_after_command(zone_id).await;

        match result {
            Ok(record) => {
                let zone = Zone::from(record);
                let message = if proposed.is_active {
                    format!("Pump switched on in {}", proposed.name)
                } else {
                    format!("Pump switched off in {}", proposed.name)
                };
                self.notify(if proposed.is_active {
                    Notice::success(message)
                } else {
                    Notice::info(message)
                });
                Ok(CommandOutcome::Confirmed { zone })
            }
            Err(err) => Err(self.transport_failure(zone_id, "Could not change pump state", err)),
        }
    }

    pub async fn start_timer(
        &self,
        zone_id: ZoneId,
        minutes: i64,
    ) -> Result<CommandOutcome, ZoneError> {
        let minutes = TimerMinutes::new(minutes).map_err(|err| self.reject(err))?;
        self.start_validated_timer(zone_id, minutes).await
    }

    pub async fn start_timer_input(
        &self,
        zone_id: ZoneId,
        input: &str,
    ) -> Result<CommandOutcome, ZoneError> {
        let minutes = TimerMinutes::parse(input).map_err(|err| self.reject(err))?;
        self.start_validated_timer(zone_id, minutes).await
    }

    async fn start_validated_timer(
        &self,
        zone_id: ZoneId,
        minutes: TimerMinutes,
    ) -> Result<CommandOutcome, ZoneError> {
        let zone = self.known_zone(zone_id).await?;
        if zone.is_active {
            return Err(self.reject(ValidationError::ZoneActive(zone_id)));
        }
        let Some(pending) = PendingTimer::acquire(&self.pending_timers, zone_id) else {
            return Err(self.reject(ValidationError::TimerPending(zone_id)));
        };
        info!(
            zone_id = zone_id.0,
            seconds = minutes.seconds(),
            "zones: starting timer"
        );

        let result = self.backend.set_timer(zone_id, minutes.seconds()).await;
        self.refresh_after_command(zone_id).await;
        drop(pending);

        match result {
            Ok(record) => {
                self.notify(Notice::success(format!(
                    "Timer started: {} min in {}",
                    minutes.minutes(),
                    zone.name
                )));
                Ok(CommandOutcome::Confirmed {
                    zone: Zone::from(record),
                })
            }
            Err(err) => Err(self.transport_failure(zone_id, "Could not start timer", err)),
        }
    }

    pub async fn stop_timer(&self, zone_id: ZoneId) -> Result<CommandOutcome, ZoneError> {
        self.ensure_no_pending_timer(zone_id)?;
        let zone = self.known_zone(zone_id).await?;
        if !zone.is_active {
            debug!(zone_id = zone_id.0, "zones: stop requested for idle zone");
            return Ok(CommandOutcome::NoChange);
        }
        self.toggle_pump(zone_id).await
    }

    pub async fn rename(
        &self,
        zone_id: ZoneId,
        new_name: &str,
    ) -> Result<CommandOutcome, ZoneError> {
        let name = new_name.trim();
        if name.is_empty() {
            return Err(self.reject(ValidationError::EmptyName));
        }
        self.known_zone(zone_id).await?;
        info!(zone_id = zone_id.0, "zones: renaming zone");

        let result = self.backend.rename(zone_id, name).await;
        self.refresh_after_command(zone_id).await;

        match result {
            Ok(record) => {
                self.notify(Notice::success("Zone name updated"));
                Ok(CommandOutcome::Confirmed {
                    zone: Zone::from(record),
                })
            }
            Err(err) => Err(self.transport_failure(zone_id, "Could not update zone name", err)),
        }
    }

    async fn known_zone(&self, zone_id: ZoneId) -> Result<Zone, ZoneError> {
        self.store()
            .zone(zone_id)
            .await
            .ok_or_else(|| self.reject(ValidationError::UnknownZone(zone_id)))
    }

    fn ensure_no_pending_timer(&self, zone_id: ZoneId) -> Result<(), ZoneError> {
        if lock_pending(&self.pending_timers).contains(&zone_id) {
            return Err(self.reject(ValidationError::TimerPending(zone_id)));
        }
        Ok(())
    }

    async fn refresh_after_command(&self, zone_id: ZoneId) {
        match self.sync.refresh(&self.cancel).await {
            Ok(outcome) => debug!(zone_id = zone_id.0, ?outcome, "zones: post-command refresh"),
            Err(err) => warn!(zone_id = zone_id.0, "zones: post-command refresh failed: {err}"),
        }
    }

    fn reject(&self, err: ValidationError) -> ZoneError {
        debug!("zones: rejected command: {err}");
        self.notify(Notice::error(err.to_string()));
        ZoneError::Validation(err)
    }

    fn transport_failure(&self, zone_id: ZoneId, context: &str, err: TransportError) -> ZoneError {
        warn!(zone_id = zone_id.0, "zones: {context}: {err}");
        self.notify(Notice::error(format!("{context}: {err}")));
        ZoneError::Transport(err)
    }

    fn notify(&self, notice: Notice) {
        let _ = self.events.send(ClientEvent::Notice(notice));
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
