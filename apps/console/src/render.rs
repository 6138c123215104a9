//! Plain-text rendering of zone views for the terminal.

use chrono::{DateTime, Utc};
use client_core::{ZoneSnapshot, ZoneStatus, ZoneView, TIMER_PRESET_MINUTES};

const BAR_WIDTH: usize = 20;

pub fn progress_bar(percent: u8) -> String {
    let filled = usize::from(percent.min(100)) * BAR_WIDTH / 100;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

fn last_watered_label(last_watered: Option<DateTime<Utc>>) -> String {
    match last_watered {
        Some(at) => format!("last watered {}", at.format("%Y-%m-%d %H:%M")),
        None => "never watered".to_string(),
    }
}

pub fn zone_row(view: &ZoneView, last_watered: Option<DateTime<Utc>>) -> String {
    let detail = match view.status {
        ZoneStatus::Timer => match (view.remaining_minutes(), view.progress_percent()) {
            (Some(minutes), Some(percent)) => {
                format!("{minutes} min left {}", progress_bar(percent))
            }
            _ => "timer running".to_string(),
        },
        ZoneStatus::Manual => "pump on".to_string(),
        ZoneStatus::Inactive => last_watered_label(last_watered),
    };
    format!(
        "{:>4}  {:<24} {:<8} {detail}",
        view.id.0,
        view.name,
        view.status.label()
    )
}

pub fn zone_table(snapshot: &ZoneSnapshot, views: &[ZoneView]) -> Vec<String> {
    if !snapshot.loaded {
        return vec!["zones not loaded yet".to_string()];
    }
    if views.is_empty() {
        return vec!["no zones configured".to_string()];
    }
    views
        .iter()
        .map(|view| {
            let last_watered = snapshot.zone(view.id).and_then(|zone| zone.last_watered);
            zone_row(view, last_watered)
        })
        .collect()
}

pub fn presets_line() -> String {
    let presets = TIMER_PRESET_MINUTES
        .iter()
        .map(|minutes| format!("{minutes} min"))
        .collect::<Vec<_>>();
    format!("timer presets: {}", presets.join(", "))
}
