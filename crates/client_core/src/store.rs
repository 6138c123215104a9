//! Sequence-numbered zone store.
//!
//! Every asynchronous operation draws a ticket from [`ZoneStore::issue_ticket`]
//! before it suspends. A fetch result is applied only when its ticket is at
//! least the last applied sequence number; optimistic patches draw their
//! ticket under the write lock so they always win over fetches that began
//! earlier. All mutations go through one `RwLock` write guard.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use shared::domain::ZoneId;
use tokio::{
    sync::{broadcast, RwLock},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::{ClientEvent, Zone, ZonePatch, ZoneSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { seq: u64 },
    /// A more recent mutation was already applied.
    Stale { seq: u64, applied_seq: u64 },
    /// The issuing operation was cancelled before its result landed.
    Cancelled,
}

impl ApplyOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, ApplyOutcome::Applied { .. })
    }
}

#[derive(Default)]
struct StoreState {
    zones: BTreeMap<ZoneId, Zone>,
    applied_seq: u64,
    fetched_at: Option<Instant>,
    loaded: bool,
}

impl StoreState {
    fn snapshot(&self) -> ZoneSnapshot {
        ZoneSnapshot {
            seq: self.applied_seq,
            fetched_at: self.fetched_at,
            loaded: self.loaded,
            zones: Arc::new(self.zones.values().cloned().collect()),
        }
    }
}

pub struct ZoneStore {
    state: RwLock<StoreState>,
    next_seq: AtomicU64,
    events: broadcast::Sender<ClientEvent>,
}

impl ZoneStore {
    pub fn new(events: broadcast::Sender<ClientEvent>) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            next_seq: AtomicU64::new(0),
            events,
        }
    }

    /// Draws the next sequence number. Call it when an operation starts,
    /// before the network call.
    pub fn issue_ticket(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub async fn snapshot(&self) -> ZoneSnapshot {
        self.state.read().await.snapshot()
    }

    pub async fn zone(&self, zone_id: ZoneId) -> Option<Zone> {
        self.state.read().await.zones.get(&zone_id).cloned()
    }

    /// Swaps the whole collection for the result of the fetch holding `ticket`.
    pub async fn replace_all(
        &self,
        ticket: u64,
        zones: Vec<Zone>,
        fetched_at: Instant,
    ) -> ApplyOutcome {
        self.replace_all_unless_cancelled(ticket, zones, fetched_at, None)
            .await
    }

    /// Same as [`ZoneStore::replace_all`], but a no-op once `cancel` fired.
    /// The token is checked under the write lock.
    pub async fn replace_all_unless_cancelled(
        &self,
        ticket: u64,
        zones: Vec<Zone>,
        fetched_at: Instant,
        cancel: Option<&CancellationToken>,
    ) -> ApplyOutcome {
        let mut state = self.state.write().await;
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            debug!(seq = ticket, "zones: discarding fetch result of cancelled operation");
            return ApplyOutcome::Cancelled;
        }
        if ticket < state.applied_seq {
            debug!(
                seq = ticket,
                applied_seq = state.applied_seq,
                "zones: discarding stale fetch result"
            );
            return ApplyOutcome::Stale {
                seq: ticket,
                applied_seq: state.applied_seq,
            };
        }
        state.zones = zones.into_iter().map(|zone| (zone.id, zone)).collect();
        state.applied_seq = ticket;
        state.fetched_at = Some(fetched_at);
        state.loaded = true;

        // Published under the write guard so events arrive in sequence order.
        let _ = self.events.send(ClientEvent::ZonesChanged(state.snapshot()));
        ApplyOutcome::Applied { seq: ticket }
    }

    /// Merges `patch` into one zone. Unknown ids are a silent no-op.
    pub async fn apply_optimistic(&self, zone_id: ZoneId, patch: ZonePatch) -> Option<Zone> {
        self.update_optimistic(zone_id, |_| patch).await
    }

    /// Computes the patch from the zone's current view and applies it
    /// without releasing the lock in between.
    pub async fn update_optimistic<F>(&self, zone_id: ZoneId, make_patch: F) -> Option<Zone>
    where
        F: FnOnce(&Zone) -> ZonePatch,
    {
        let mut state = self.state.write().await;
        let zone = state.zones.get_mut(&zone_id)?;
        let patch = make_patch(zone);
        if patch.is_empty() {
            return Some(zone.clone());
        }
        zone.apply(&patch);
        let updated = zone.clone();
        state.applied_seq = self.issue_ticket();
        debug!(
            zone_id = zone_id.0,
            seq = state.applied_seq,
            "zones: applied optimistic patch"
        );

        let _ = self.events.send(ClientEvent::ZonesChanged(state.snapshot()));
        Some(updated)
    }

    /// Waits until no mutation holds the write lock.
    pub(crate) async fn barrier(&self) {
        drop(self.state.write().await);
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
