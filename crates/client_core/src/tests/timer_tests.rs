use super::*;
use shared::domain::ZoneMode;
use std::sync::Arc;

fn zone(id: i64, is_active: bool, mode: ZoneMode, remaining: u64) -> Zone {
    Zone {
        id: ZoneId(id),
        name: format!("zone-{id}"),
        mode,
        is_active,
        timer_remaining_seconds: remaining,
        last_watered: None,
    }
}

#[test]
fn countdown_is_projected_from_fetch_time_and_clamped() {
    let fetched_at = Instant::now();
    let running = zone(1, true, ZoneMode::Timer, 120);

    assert_eq!(
        TimerPresenter::remaining_seconds(&running, fetched_at, fetched_at),
        Some(120)
    );
    assert_eq!(
        TimerPresenter::remaining_seconds(&running, fetched_at, fetched_at + Duration::from_secs(30)),
        Some(90)
    );
    assert_eq!(
        TimerPresenter::remaining_seconds(
            &running,
            fetched_at,
            fetched_at + Duration::from_secs(125)
        ),
        Some(0)
    );
    assert_eq!(
        TimerPresenter::remaining(&running, fetched_at, fetched_at + Duration::from_millis(1_500)),
        Some(Duration::from_secs(119))
    );
}

#[test]
fn only_running_timers_have_a_countdown() {
    let fetched_at = Instant::now();
    let later = fetched_at + Duration::from_secs(10);

    let manual = zone(1, true, ZoneMode::Manual, 300);
    let idle_timer = zone(2, false, ZoneMode::Timer, 300);
    let idle = zone(3, false, ZoneMode::Manual, 0);

    assert_eq!(TimerPresenter::remaining_seconds(&manual, fetched_at, later), None);
    assert_eq!(TimerPresenter::remaining_seconds(&idle_timer, fetched_at, later), None);
    assert_eq!(TimerPresenter::remaining_seconds(&idle, fetched_at, later), None);
}

#[test]
fn now_before_fetch_does_not_underflow() {
    let now = Instant::now();
    let fetched_at = now + Duration::from_secs(5);
    let running = zone(1, true, ZoneMode::Timer, 60);

    assert_eq!(TimerPresenter::remaining_seconds(&running, fetched_at, now), Some(60));
}

#[test]
fn present_maps_every_zone_in_store_order() {
    let fetched_at = Instant::now();
    let snapshot = ZoneSnapshot {
        seq: 3,
        fetched_at: Some(fetched_at),
        loaded: true,
        zones: Arc::new(vec![
            zone(1, false, ZoneMode::Manual, 0),
            zone(2, true, ZoneMode::Timer, 1_800),
            zone(3, true, ZoneMode::Manual, 0),
        ]),
    };

    let views = TimerPresenter::present(&snapshot, fetched_at + Duration::from_secs(61));

    assert_eq!(views.len(), 3);
    assert_eq!(views[0].status, ZoneStatus::Inactive);
    assert_eq!(views[0].remaining_seconds, None);
    assert_eq!(views[1].status, ZoneStatus::Timer);
    assert_eq!(views[1].remaining_seconds, Some(1_739));
    assert_eq!(views[1].remaining_minutes(), Some(29));
    assert_eq!(views[1].progress_percent(), Some(48));
    assert_eq!(views[2].status, ZoneStatus::Manual);
    assert_eq!(views[2].progress_percent(), None);
    assert_eq!(snapshot.zone(ZoneId(2)).expect("zone 2").timer_remaining_seconds, 1_800);
}

#[test]
fn present_without_fetch_time_shows_raw_remaining() {
    let snapshot = ZoneSnapshot {
        zones: Arc::new(vec![zone(4, true, ZoneMode::Timer, 90)]),
        ..ZoneSnapshot::empty()
    };

    let views = TimerPresenter::present(&snapshot, Instant::now());
    assert_eq!(views[0].remaining_seconds, Some(90));
    assert_eq!(views[0].remaining_minutes(), Some(2));
}

#[test]
fn view_rounding_and_progress_bounds() {
    let view = |secs| ZoneView {
        id: ZoneId(1),
        name: "a".into(),
        status: ZoneStatus::Timer,
        remaining_seconds: Some(secs),
    };

    assert_eq!(view(0).remaining_minutes(), Some(0));
    assert_eq!(view(1).remaining_minutes(), Some(1));
    assert_eq!(view(60).remaining_minutes(), Some(1));
    assert_eq!(view(61).remaining_minutes(), Some(2));
    assert_eq!(view(0).progress_percent(), Some(0));
    assert_eq!(view(1_800).progress_percent(), Some(50));
    assert_eq!(view(7_200).progress_percent(), Some(100));
}
