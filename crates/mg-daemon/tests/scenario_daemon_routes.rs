//! In-process scenario tests for mg-daemon HTTP endpoints.
//!
//! Each test builds a fresh `DaemonState`, composes the bare router and
//! drives it via `tower::ServiceExt::oneshot`. No network I/O.
//!
//! GREEN when:
//! - Boot state is Disarmed.
//! - Authentication failures map to 401, lock-out to 423, invalid
//!   transitions to 409.
//! - Arm → power disconnect → grace cancel round-trips through HTTP.
//! - A zero grace period triggers on disconnect and records the run.
//! - Protection and auto-arm control endpoints report their state.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use mg_config::GuardConfig;
use mg_daemon::{routes, state::DaemonState};
use mg_execution::DryRunActionRepository;
use serde_json::{json, Value};
use tower::ServiceExt; // oneshot

const PASS: &str = "correct horse";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn make_state(cfg: GuardConfig) -> Arc<DaemonState> {
    Arc::new(
        DaemonState::build(
            cfg.validate().unwrap(),
            Arc::new(DryRunActionRepository::new()),
            Some(PASS.to_string()),
            None,
        )
        .await
        .unwrap(),
    )
}

async fn call(st: &Arc<DaemonState>, req: Request<Body>) -> (StatusCode, Value) {
    let resp = routes::build_router(Arc::clone(st))
        .oneshot(req)
        .await
        .expect("oneshot failed");
    let status = resp.status();
    let body: bytes::Bytes = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).expect("body is not valid JSON")
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_pass() -> Value {
    json!({ "passphrase": PASS })
}

// ---------------------------------------------------------------------------
// Health / status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let st = make_state(GuardConfig::default()).await;
    let (status, json) = call(&st, get("/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "mg-daemon");
}

#[tokio::test]
async fn status_boots_disarmed() {
    let st = make_state(GuardConfig::default()).await;
    let (status, json) = call(&st, get("/v1/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "disarmed");
    assert_eq!(json["transition_epoch"], 0);
    assert_eq!(json["executing"], false);
    assert!(json["last_execution"].is_null());
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn arm_requires_passphrase() {
    let st = make_state(GuardConfig::default()).await;

    let (status, json) = call(&st, post("/v1/arm", json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "auth_cancelled");

    let (status, json) = call(&st, post("/v1/arm", json!({ "passphrase": "nope" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "auth_failed");
    assert_eq!(st.controller.state(), mg_schemas::AppState::Disarmed);

    let (status, json) = call(&st, post("/v1/arm", with_pass())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "armed");
}

#[tokio::test]
async fn repeated_failures_lock_out_with_423() {
    let st = make_state(GuardConfig::default()).await;
    for _ in 0..5 {
        let (status, _) = call(&st, post("/v1/arm", json!({ "passphrase": "nope" }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, json) = call(&st, post("/v1/arm", with_pass())).await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(json["code"], "auth_locked_out");
}

#[tokio::test]
async fn disarm_while_disarmed_is_conflict() {
    let st = make_state(GuardConfig::default()).await;
    let (status, json) = call(&st, post("/v1/disarm", with_pass())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "invalid_transition");
}

// ---------------------------------------------------------------------------
// Power / grace period
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn disconnect_then_cancel_grace_period() {
    let st = make_state(GuardConfig::default()).await;
    call(&st, post("/v1/arm", with_pass())).await;

    let (_, json) = call(&st, post("/v1/power", json!({ "adapter_connected": true }))).await;
    assert!(json["transition"].is_null());
    let (_, json) = call(&st, post("/v1/power", json!({ "adapter_connected": false }))).await;
    assert_eq!(json["transition"], "disconnected");
    assert_eq!(json["state"], "grace_period");

    let (_, json) = call(&st, get("/v1/status")).await;
    let remaining = json["grace_remaining_secs"].as_f64().unwrap();
    assert!(remaining > 9.0 && remaining <= 10.0);

    let (status, json) = call(&st, post("/v1/grace/cancel", with_pass())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "armed");

    let (status, _) = call(&st, post("/v1/grace/cancel", with_pass())).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test(start_paused = true)]
async fn zero_grace_period_triggers_and_records_run() {
    let mut cfg = GuardConfig::default();
    cfg.arming.grace_period_secs = 0.0;
    cfg.actions.enabled = vec!["soundAlarm".into(), "lockScreen".into()];
    let st = make_state(cfg).await;

    call(&st, post("/v1/arm", with_pass())).await;
    call(&st, post("/v1/power", json!({ "adapter_connected": true }))).await;
    let (_, json) = call(&st, post("/v1/power", json!({ "adapter_connected": false }))).await;
    assert_eq!(json["state"], "triggered");

    tokio::time::sleep(Duration::from_secs(5)).await;
    let (_, json) = call(&st, get("/v1/status")).await;
    let results = json["last_execution"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["action_type"], "lockScreen");
    assert_eq!(results[1]["action_type"], "soundAlarm");

    let (status, _) = call(&st, post("/v1/actions/stop", json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = call(&st, post("/v1/disarm", with_pass())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "disarmed");
}

// ---------------------------------------------------------------------------
// Protection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn protection_status_and_reset() {
    let st = make_state(GuardConfig::default()).await;

    let (status, json) = call(&st, get("/v1/protection/lockScreen")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["action"], "lockScreen");
    assert_eq!(json["circuit_state"], "closed");
    assert_eq!(json["enabled"], true);

    let (status, json) = call(&st, post("/v1/protection/shutdown/reset", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["metrics"]["total_attempts"], 0);

    let (status, json) = call(&st, get("/v1/protection/selfDestruct")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "unknown_action");
}

// ---------------------------------------------------------------------------
// Auto-arm
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn autoarm_disable_and_enable() {
    let st = make_state(GuardConfig::default()).await;

    let (status, json) = call(&st, post("/v1/autoarm/disable", json!({ "minutes": 5 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["disabled_for_secs"], 300);

    let (status, json) = call(&st, post("/v1/autoarm/enable", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["disabled_for_secs"].is_null());

    let (status, _) = call(&st, post("/v1/autoarm/disable", json!({ "minutes": 0 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = call(
        &st,
        post("/v1/autoarm/disable", json!({ "minutes": u64::MAX })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "configuration_invalid");

    let (status, json) = call(&st, post("/v1/autoarm/disable", json!({ "minutes": 10_080 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["disabled_for_secs"], 10_080 * 60);
}

#[tokio::test(start_paused = true)]
async fn untrusted_network_auto_arms() {
    let mut cfg = GuardConfig::default();
    cfg.auto_arm.enabled = true;
    cfg.auto_arm.notify_before_arming = false;
    cfg.auto_arm.trusted_networks = vec!["home-wifi".into()];
    let st = make_state(cfg).await;

    let (status, json) = call(&st, post("/v1/autoarm/network", json!({ "ssid": "home-wifi" }))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["accepted"], true);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(st.controller.state(), mg_schemas::AppState::Disarmed);

    call(&st, post("/v1/autoarm/network", json!({ "ssid": "airport" }))).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(st.controller.state(), mg_schemas::AppState::Armed);
}
