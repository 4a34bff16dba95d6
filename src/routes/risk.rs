//! # routes::risk
//!
//! Kill switch + สถานะ risk guard
//!
//! | Method | Path                    | Auth | Description               |
//! |--------|-------------------------|------|---------------------------|
//! | POST   | `/api/risk/kill`        | ✔    | เปิด Kill Switch          |
//! | POST   | `/api/risk/rearm`       | ✔    | ปิด Kill Switch           |
//! | GET    | `/api/risk/status`      |      | ดู Risk Status            |

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::events::WsEvent;
use crate::state::{LogTag, SharedState};

#[derive(Deserialize)]
pub struct KillBody {
    pub reason: Option<String>,
}

/// POST /api/risk/kill
///
/// Engine ที่รันอยู่จะชน guard แล้วหยุดใน round ถัดไป
pub async fn kill_switch_on(
    State(state): State<SharedState>,
    body: Option<Json<KillBody>>,
) -> impl IntoResponse {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .unwrap_or_else(|| "manual kill (api)".to_string());

    state.risk.kill(&reason).await;
    state.log(LogTag::Warn, format!("Kill switch: {reason}")).await;
    state.broadcast(&WsEvent::RiskKilled { reason: reason.clone() });

    (StatusCode::OK, Json(json!({
        "ok":      true,
        "killed":  true,
        "reason":  reason,
    })))
}

/// POST /api/risk/rearm
pub async fn kill_switch_off(
    State(state): State<SharedState>,
) -> impl IntoResponse {
    state.risk.rearm().await;
    state.log(LogTag::Info, "Kill switch cleared").await;
    state.broadcast(&WsEvent::RiskRearmed);

    Json(json!({
        "ok":      true,
        "killed":  false,
    }))
}

/// GET /api/risk/status
pub async fn get_risk_status(
    State(state): State<SharedState>,
) -> impl IntoResponse {
    Json(json!({ "ok": true, "risk": state.risk.status().await }))
}
