//! Axum router and all HTTP handlers for mg-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers.
//!
//! # Status mapping
//!
//! | core error                        | HTTP |
//! |-----------------------------------|------|
//! | authentication failed / cancelled | 401  |
//! | authentication locked out         | 423  |
//! | invalid transition, lost race     | 409  |
//! | invalid configuration             | 400  |
//! | unknown action in path            | 404  |

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use mg_arming::{ArmError, PowerSnapshot};
use mg_autoarm::{LocationFix, NetworkObservation};
use mg_schemas::{AuthPurpose, AuthenticationError, SecurityActionType};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::{
    api_types::{
        AuthRequest, AutoArmDisableRequest, AutoArmStatusResponse, ErrorResponse, HealthResponse,
        LocationRequest, NetworkRequest, ObservationResponse, PowerRequest, PowerResponse,
        ProtectionStatusResponse, StopActionsResponse, TransitionResponse,
    },
    state::{BusMsg, DaemonState},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<DaemonState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/arm", post(arm))
        .route("/v1/disarm", post(disarm))
        .route("/v1/grace/cancel", post(grace_cancel))
        .route("/v1/power", post(power))
        .route("/v1/actions/stop", post(actions_stop))
        .route("/v1/protection/:action", get(protection_status))
        .route("/v1/protection/:action/reset", post(protection_reset))
        .route("/v1/autoarm/disable", post(autoarm_disable))
        .route("/v1/autoarm/enable", post(autoarm_enable))
        .route("/v1/autoarm/location", post(autoarm_location))
        .route("/v1/autoarm/network", post(autoarm_network))
        .with_state(state)
}

fn error_response(status: StatusCode, code: &str, error: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            code: code.to_string(),
            error,
        }),
    )
        .into_response()
}

fn arm_error_response(e: ArmError) -> Response {
    let status = match &e {
        ArmError::Authentication(AuthenticationError::LockedOut) => StatusCode::LOCKED,
        ArmError::Authentication(_) => StatusCode::UNAUTHORIZED,
        ArmError::InvalidTransition { .. }
        | ArmError::CancellationNotAllowed
        | ArmError::GracePeriodElapsed => StatusCode::CONFLICT,
        ArmError::Configuration(_) => StatusCode::BAD_REQUEST,
    };
    error_response(status, e.code(), e.to_string())
}

fn parse_action(raw: &str) -> Result<SecurityActionType, Response> {
    SecurityActionType::parse(raw).ok_or_else(|| {
        error_response(
            StatusCode::NOT_FOUND,
            "unknown_action",
            format!("unknown security action '{raw}'"),
        )
    })
}

fn transition_ok(st: &DaemonState) -> Response {
    (
        StatusCode::OK,
        Json(TransitionResponse {
            state: st.controller.state(),
            transition_epoch: st.controller.transition_epoch(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<DaemonState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<DaemonState>>) -> impl IntoResponse {
    let snap = st.snapshot().await;
    let _ = st.bus.send(BusMsg::Status(Box::new(snap.clone())));
    (StatusCode::OK, Json(snap))
}

// ---------------------------------------------------------------------------
// POST /v1/arm  /v1/disarm  /v1/grace/cancel
// ---------------------------------------------------------------------------

pub(crate) async fn arm(
    State(st): State<Arc<DaemonState>>,
    Json(req): Json<AuthRequest>,
) -> Response {
    let auth = st
        .authenticator
        .authenticate(AuthPurpose::Arm, req.passphrase.as_deref())
        .await;
    match st.controller.arm(auth).await {
        Ok(()) => {
            info!("arm");
            transition_ok(&st)
        }
        Err(e) => arm_error_response(e),
    }
}

pub(crate) async fn disarm(
    State(st): State<Arc<DaemonState>>,
    Json(req): Json<AuthRequest>,
) -> Response {
    let auth = st
        .authenticator
        .authenticate(AuthPurpose::Disarm, req.passphrase.as_deref())
        .await;
    match st.controller.disarm(auth).await {
        Ok(()) => {
            info!("disarm");
            // A manual disarm voids any deferred automatic arm.
            st.autoarm.cancel_pending_arm().await;
            transition_ok(&st)
        }
        Err(e) => arm_error_response(e),
    }
}

pub(crate) async fn grace_cancel(
    State(st): State<Arc<DaemonState>>,
    Json(req): Json<AuthRequest>,
) -> Response {
    let auth = st
        .authenticator
        .authenticate(AuthPurpose::CancelGracePeriod, req.passphrase.as_deref())
        .await;
    match st.controller.cancel_grace_period(auth).await {
        Ok(()) => {
            info!("grace/cancel");
            transition_ok(&st)
        }
        Err(e) => arm_error_response(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/power
// ---------------------------------------------------------------------------

pub(crate) async fn power(
    State(st): State<Arc<DaemonState>>,
    Json(req): Json<PowerRequest>,
) -> impl IntoResponse {
    let mut snapshot = PowerSnapshot::now(req.adapter_connected);
    snapshot.battery_percent = req.battery_percent;
    let transition = st.controller.handle_power_snapshot(&snapshot).await;
    (
        StatusCode::OK,
        Json(PowerResponse {
            transition,
            state: st.controller.state(),
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/actions/stop
// ---------------------------------------------------------------------------

pub(crate) async fn actions_stop(State(st): State<Arc<DaemonState>>) -> impl IntoResponse {
    let engine = st.controller.engine();
    engine.stop_ongoing_actions().await;
    info!("actions/stop");
    (
        StatusCode::OK,
        Json(StopActionsResponse {
            executing: engine.is_executing(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/protection/:action   POST /v1/protection/:action/reset
// ---------------------------------------------------------------------------

async fn protection_view(st: &DaemonState, action: SecurityActionType) -> ProtectionStatusResponse {
    let metrics = st.protector.metrics(action).await;
    ProtectionStatusResponse {
        action,
        enabled: st.protector.is_enabled(),
        circuit_state: st.protector.circuit_state(action).await,
        available_tokens: st.protector.available_tokens(action).await,
        success_rate: metrics.success_rate(),
        metrics,
    }
}

pub(crate) async fn protection_status(
    State(st): State<Arc<DaemonState>>,
    Path(raw): Path<String>,
) -> Response {
    let action = match parse_action(&raw) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    (StatusCode::OK, Json(protection_view(&st, action).await)).into_response()
}

pub(crate) async fn protection_reset(
    State(st): State<Arc<DaemonState>>,
    Path(raw): Path<String>,
) -> Response {
    let action = match parse_action(&raw) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    st.protector.reset(action).await;
    info!(%action, "protection/reset");
    let _ = st.bus.send(BusMsg::LogLine {
        level: "INFO".to_string(),
        msg: format!("protection reset for {action}"),
    });
    (StatusCode::OK, Json(protection_view(&st, action).await)).into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/autoarm/*
// ---------------------------------------------------------------------------

/// One week.
const MAX_DISABLE_MINUTES: u64 = 7 * 24 * 60;

async fn autoarm_view(st: &DaemonState) -> AutoArmStatusResponse {
    AutoArmStatusResponse {
        enabled: st.autoarm.configuration().await.is_enabled,
        disabled_for_secs: st
            .autoarm
            .decision_engine()
            .disabled_for()
            .await
            .map(|d| d.as_secs()),
        pending_arm: st.autoarm.has_pending_arm().await,
    }
}

pub(crate) async fn autoarm_disable(
    State(st): State<Arc<DaemonState>>,
    Json(req): Json<AutoArmDisableRequest>,
) -> Response {
    if !(1..=MAX_DISABLE_MINUTES).contains(&req.minutes) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "configuration_invalid",
            format!("minutes must be within 1..={MAX_DISABLE_MINUTES}"),
        );
    }
    st.autoarm
        .temporarily_disable(Duration::from_secs(req.minutes * 60))
        .await;
    (StatusCode::OK, Json(autoarm_view(&st).await)).into_response()
}

pub(crate) async fn autoarm_enable(State(st): State<Arc<DaemonState>>) -> impl IntoResponse {
    st.autoarm.cancel_temporary_disable().await;
    (StatusCode::OK, Json(autoarm_view(&st).await))
}

pub(crate) async fn autoarm_location(
    State(st): State<Arc<DaemonState>>,
    Json(req): Json<LocationRequest>,
) -> impl IntoResponse {
    let accepted = st
        .location_monitor
        .publish(LocationFix::now(req.latitude, req.longitude));
    (StatusCode::ACCEPTED, Json(ObservationResponse { accepted }))
}

pub(crate) async fn autoarm_network(
    State(st): State<Arc<DaemonState>>,
    Json(req): Json<NetworkRequest>,
) -> impl IntoResponse {
    let accepted = st
        .network_monitor
        .publish(NetworkObservation::now(req.ssid.as_deref()));
    (StatusCode::ACCEPTED, Json(ObservationResponse { accepted }))
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<DaemonState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Status(_) => "status",
                    BusMsg::Notification { .. } => "notification",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
