use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ZoneId, ZoneMode};

/// Zone object as returned by every `/zones` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub id: ZoneId,
    pub name: String,
    pub is_pump_active: bool,
    #[serde(default)]
    pub mode: ZoneMode,
    #[serde(default)]
    pub last_watered: Option<String>,
    #[serde(default)]
    pub timer_seconds_remaining: i64,
}

impl ZoneRecord {
    /// Parses `last_watered`. The backend emits either RFC 3339 or a naive
    /// ISO timestamp, the latter being UTC.
    pub fn last_watered_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.last_watered.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Body of `PUT /zones/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateZoneRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Query string of `POST /zones/{id}/timer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerQuery {
    pub seconds: u32,
}
