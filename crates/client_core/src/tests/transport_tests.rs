use super::*;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use shared::{domain::ZoneMode, error::ErrorCode};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct ServerState {
    zones: Arc<Mutex<Vec<ZoneRecord>>>,
    auth_headers: Arc<Mutex<Vec<Option<String>>>>,
    timer_seconds: Arc<Mutex<Vec<u32>>>,
    rename_bodies: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl ServerState {
    async fn record_auth(&self, headers: &HeaderMap) {
        let value = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.auth_headers.lock().await.push(value);
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "detail": "Zone not found" })),
    )
        .into_response()
}

async fn list_zones(State(state): State<ServerState>, headers: HeaderMap) -> Json<Vec<ZoneRecord>> {
    state.record_auth(&headers).await;
    Json(state.zones.lock().await.clone())
}

async fn toggle_zone(
    State(state): State<ServerState>,
    Path(zone_id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    state.record_auth(&headers).await;
    let mut zones = state.zones.lock().await;
    let Some(zone) = zones.iter_mut().find(|zone| zone.id.0 == zone_id) else {
        return not_found();
    };
    zone.is_pump_active = !zone.is_pump_active;
    if zone.is_pump_active {
        zone.mode = ZoneMode::Manual;
    }
    Json(zone.clone()).into_response()
}

#[derive(Deserialize)]
struct TimerParams {
    seconds: u32,
}

async fn start_zone_timer(
    State(state): State<ServerState>,
    Path(zone_id): Path<i64>,
    Query(params): Query<TimerParams>,
) -> Response {
    state.timer_seconds.lock().await.push(params.seconds);
    let mut zones = state.zones.lock().await;
    let Some(zone) = zones.iter_mut().find(|zone| zone.id.0 == zone_id) else {
        return not_found();
    };
    zone.is_pump_active = true;
    zone.mode = ZoneMode::Timer;
    zone.timer_seconds_remaining = i64::from(params.seconds);
    Json(zone.clone()).into_response()
}

async fn update_zone(
    State(state): State<ServerState>,
    Path(zone_id): Path<i64>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    state.rename_bodies.lock().await.push(body.clone());
    let mut zones = state.zones.lock().await;
    let Some(zone) = zones.iter_mut().find(|zone| zone.id.0 == zone_id) else {
        return not_found();
    };
    if let Some(name) = body.get("name").and_then(|name| name.as_str()) {
        zone.name = name.to_string();
    }
    Json(zone.clone()).into_response()
}

async fn broken_zones() -> (StatusCode, &'static str) {
    (StatusCode::OK, "not json")
}

async fn spawn_zone_server() -> (String, ServerState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = ServerState::default();
    *state.zones.lock().await = vec![
        ZoneRecord {
            id: ZoneId(1),
            name: "Sector Norte".into(),
            is_pump_active: false,
            mode: ZoneMode::Manual,
            last_watered: Some("2024-05-01T06:30:00".into()),
            timer_seconds_remaining: 0,
        },
        ZoneRecord {
            id: ZoneId(2),
            name: "Sector Sur".into(),
            is_pump_active: true,
            mode: ZoneMode::Timer,
            last_watered: None,
            timer_seconds_remaining: 540,
        },
    ];
    let app = Router::new()
        .route("/irrigation/zones", get(list_zones))
        .route("/irrigation/zones/:id", axum::routing::put(update_zone))
        .route("/irrigation/zones/:id/toggle", post(toggle_zone))
        .route("/irrigation/zones/:id/timer", post(start_zone_timer))
        .route("/broken/zones", get(broken_zones))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

#[tokio::test]
async fn fetch_zones_decodes_wire_shape_and_sends_bearer_token() {
    let (server_url, state) = spawn_zone_server().await;
    let backend = HttpZoneBackend::new(&format!("{server_url}/irrigation/"))
        .expect("backend")
        .with_bearer_token(Some("secret-token".into()));
    assert_eq!(backend.base_url(), format!("{server_url}/irrigation"));

    let zones = backend.fetch_zones().await.expect("zones");

    assert_eq!(zones.len(), 2);
    assert_eq!(zones[0].name, "Sector Norte");
    assert!(zones[0].last_watered_at().is_some());
    assert_eq!(zones[1].mode, ZoneMode::Timer);
    assert_eq!(zones[1].timer_seconds_remaining, 540);
    assert_eq!(
        state.auth_headers.lock().await.clone(),
        vec![Some("Bearer secret-token".to_string())]
    );
}

#[tokio::test]
async fn commands_hit_their_endpoints_and_return_updated_zone() {
    let (server_url, state) = spawn_zone_server().await;
    let backend = HttpZoneBackend::new(&format!("{server_url}/irrigation")).expect("backend");

    let toggled = backend.toggle(ZoneId(1)).await.expect("toggle");
    assert!(toggled.is_pump_active);
    assert_eq!(toggled.mode, ZoneMode::Manual);

    let timed = backend.set_timer(ZoneId(1), 1_200).await.expect("timer");
    assert_eq!(timed.mode, ZoneMode::Timer);
    assert_eq!(timed.timer_seconds_remaining, 1_200);
    assert_eq!(state.timer_seconds.lock().await.clone(), vec![1_200]);

    let renamed = backend.rename(ZoneId(2), "Huerta").await.expect("rename");
    assert_eq!(renamed.name, "Huerta");
    assert_eq!(
        state.rename_bodies.lock().await.clone(),
        vec![serde_json::json!({ "name": "Huerta" })]
    );

    assert_eq!(state.auth_headers.lock().await.clone(), vec![None]);
}

#[tokio::test]
async fn error_status_maps_detail_into_api_error() {
    let (server_url, _state) = spawn_zone_server().await;
    let backend = HttpZoneBackend::new(&format!("{server_url}/irrigation")).expect("backend");

    let err = backend.toggle(ZoneId(404)).await.expect_err("unknown zone");
    assert_eq!(err.status(), Some(404));
    match err {
        TransportError::Http {
            endpoint, error, ..
        } => {
            assert!(endpoint.ends_with("/zones/404/toggle"));
            assert_eq!(error.code, ErrorCode::NotFound);
            assert_eq!(error.message, "Zone not found");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let (server_url, _state) = spawn_zone_server().await;
    let backend = HttpZoneBackend::new(&format!("{server_url}/broken")).expect("backend");

    let err = backend.fetch_zones().await.expect_err("not json");
    assert!(matches!(err, TransportError::Decode { .. }), "{err}");
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let backend = HttpZoneBackend::with_timeout(&format!("http://{addr}"), Duration::from_secs(2))
        .expect("backend");
    let err = backend.fetch_zones().await.expect_err("refused");
    assert!(matches!(err, TransportError::Network { .. }), "{err}");
    assert_eq!(err.status(), None);
}

#[test]
fn base_url_must_be_http() {
    for raw in ["", "localhost:8080", "ftp://example.com/zones", "not a url"] {
        assert!(
            matches!(
                HttpZoneBackend::new(raw),
                Err(TransportError::InvalidBaseUrl(_))
            ),
            "{raw:?}"
        );
    }
    let backend = HttpZoneBackend::new("https://garden.example/irrigation///").expect("valid");
    assert_eq!(backend.base_url(), "https://garden.example/irrigation");
}

#[test]
fn blank_bearer_token_is_ignored() {
    let backend = HttpZoneBackend::new("http://localhost:8080")
        .expect("valid")
        .with_bearer_token(Some("   ".into()));
    assert!(backend.bearer_token.is_none());
}
