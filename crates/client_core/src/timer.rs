//! Read-time countdown projection. Nothing here writes to the store.

use std::time::Duration;

use shared::domain::ZoneId;
use tokio::time::Instant;

use crate::types::{Zone, ZoneSnapshot, ZoneStatus};

/// Scale of the progress bar: a full bar is one hour of watering.
const PROGRESS_FULL_SCALE_SECS: u64 = 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneView {
    pub id: ZoneId,
    pub name: String,
    pub status: ZoneStatus,
    /// Projected seconds left; `Some` only for a running timer.
    pub remaining_seconds: Option<u64>,
}

impl ZoneView {
    pub fn remaining_minutes(&self) -> Option<u64> {
        self.remaining_seconds.map(|secs| secs.div_ceil(60))
    }

    pub fn progress_percent(&self) -> Option<u8> {
        self.remaining_seconds.map(|secs| {
            let percent = secs.saturating_mul(100) / PROGRESS_FULL_SCALE_SECS;
            percent.min(100) as u8
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimerPresenter;

impl TimerPresenter {
    /// `max(0, remaining - whole seconds elapsed since the fetch)`, for a zone
    /// running in timer mode. Stays at 0 until a fetch reports the zone idle.
    pub fn remaining_seconds(zone: &Zone, fetched_at: Instant, now: Instant) -> Option<u64> {
        if !zone.is_timer_running() {
            return None;
        }
        let elapsed = now.saturating_duration_since(fetched_at).as_secs();
        Some(zone.timer_remaining_seconds.saturating_sub(elapsed))
    }

    pub fn remaining(zone: &Zone, fetched_at: Instant, now: Instant) -> Option<Duration> {
        Self::remaining_seconds(zone, fetched_at, now).map(Duration::from_secs)
    }

    pub fn present(snapshot: &ZoneSnapshot, now: Instant) -> Vec<ZoneView> {
        snapshot
            .zones
            .iter()
            .map(|zone| ZoneView {
                id: zone.id,
                name: zone.name.clone(),
                status: zone.status(),
                remaining_seconds: match snapshot.fetched_at {
                    Some(fetched_at) => Self::remaining_seconds(zone, fetched_at, now),
                    None => zone
                        .is_timer_running()
                        .then_some(zone.timer_remaining_seconds),
                },
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/timer_tests.rs"]
mod tests;
