//! Client-side zone entity, partial patches and store snapshots.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::{
    domain::{ZoneId, ZoneMode},
    protocol::ZoneRecord,
};
use tokio::time::Instant;

/// Minute values offered as one-click timer presets.
pub const TIMER_PRESET_MINUTES: [u32; 4] = [20, 30, 45, 60];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    pub mode: ZoneMode,
    pub is_active: bool,
    pub timer_remaining_seconds: u64,
    pub last_watered: Option<DateTime<Utc>>,
}

/// Display classification of a zone's control pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneStatus {
    Inactive,
    Manual,
    Timer,
}

impl ZoneStatus {
    pub fn label(self) -> &'static str {
        match self {
            ZoneStatus::Inactive => "inactive",
            ZoneStatus::Manual => "manual",
            ZoneStatus::Timer => "timer",
        }
    }
}

impl Zone {
    /// `{timer, inactive}` is a transient pair and reads as inactive.
    pub fn status(&self) -> ZoneStatus {
        match (self.is_active, self.mode) {
            (false, _) => ZoneStatus::Inactive,
            (true, ZoneMode::Timer) => ZoneStatus::Timer,
            (true, ZoneMode::Manual) => ZoneStatus::Manual,
        }
    }

    pub fn is_timer_running(&self) -> bool {
        self.status() == ZoneStatus::Timer
    }

    pub(crate) fn apply(&mut self, patch: &ZonePatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(mode) = patch.mode {
            self.mode = mode;
        }
        if let Some(is_active) = patch.is_active {
            self.is_active = is_active;
        }
    }
}

impl From<ZoneRecord> for Zone {
    fn from(record: ZoneRecord) -> Self {
        let last_watered = record.last_watered_at();
        Self {
            id: record.id,
            name: record.name,
            mode: record.mode,
            is_active: record.is_pump_active,
            timer_remaining_seconds: u64::try_from(record.timer_seconds_remaining).unwrap_or(0),
            last_watered,
        }
    }
}

/// Partial update merged into a single zone for immediate feedback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZonePatch {
    pub name: Option<String>,
    pub mode: Option<ZoneMode>,
    pub is_active: Option<bool>,
}

impl ZonePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.mode.is_none() && self.is_active.is_none()
    }
}

/// Immutable view of the store at one sequence number.
#[derive(Debug, Clone)]
pub struct ZoneSnapshot {
    /// Sequence number of the mutation this snapshot reflects.
    pub seq: u64,
    /// Arrival time of the fetch behind the last accepted `replace_all`.
    pub fetched_at: Option<Instant>,
    /// False until the first successful fetch.
    pub loaded: bool,
    pub zones: Arc<Vec<Zone>>,
}

impl ZoneSnapshot {
    pub fn empty() -> Self {
        Self {
            seq: 0,
            fetched_at: None,
            loaded: false,
            zones: Arc::new(Vec::new()),
        }
    }

    pub fn zone(&self, zone_id: ZoneId) -> Option<&Zone> {
        self.zones.iter().find(|zone| zone.id == zone_id)
    }
}

/// User-facing severity of a [`Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    ZonesChanged(ZoneSnapshot),
    Notice(Notice),
    SyncFailed {
        error: String,
        consecutive_failures: u32,
    },
    PollerStopped,
}
