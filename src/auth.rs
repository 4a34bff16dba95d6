//! # auth — Control API Key Middleware
//!
//! ป้องกัน Endpoint ที่สั่งงาน Engine / Risk ด้วย `X-API-Key` header
//!
//! ## Mode
//! - `CONTROL_PASSWORD` ไม่ได้ตั้ง (หรือ empty) → **403 ทุก request** (ปิด control)
//! - `CONTROL_PASSWORD` ตั้งค่า → ต้องส่ง `X-API-Key: <password>`
//!
//! Endpoint อ่านอย่างเดียว (status, positions, scanner ...) ไม่ผ่าน middleware นี้
//!
//! ## Usage
//! ```bash
//! curl -X POST -H "X-API-Key: $CONTROL_PASSWORD" http://localhost:8000/api/control/start
//! ```

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::AppError;
use crate::state::SharedState;

/// เทียบแบบ constant-time — hash ก่อนเพื่อให้ความยาวไม่รั่ว
pub fn keys_match(provided: &str, expected: &str) -> bool {
    let a = Sha256::digest(provided.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Axum middleware — ตรวจสอบ X-API-Key กับ `CONTROL_PASSWORD`
pub async fn require_control_key(
    State(state): State<SharedState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    // ── Control ปิดอยู่ ───────────────────────────────────────────────────────
    let Some(expected) = state
        .config
        .server
        .control_password
        .as_deref()
        .filter(|p| !p.is_empty())
    else {
        return AppError::Forbidden("Control API disabled: CONTROL_PASSWORD is not set".into())
            .into_response();
    };

    // ── ตรวจสอบ Header ────────────────────────────────────────────────────────
    let provided = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if keys_match(provided, expected) {
        next.run(request).await
    } else {
        let path = request.uri().path().to_string();
        warn!(path = %path, "❌ Unauthorized request — invalid or missing X-API-Key");
        AppError::Unauthorized.into_response()
    }
}
