//! # error
//!
//! `AppError` คือ error ฝั่ง HTTP — handler คืน `Result<_, AppError>` แล้ว
//! response เป็น `{ "ok": false, "error": "..." }` พร้อม status code ที่ตรงกัน

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::exchange::ExchangeError;

#[derive(Debug, Error)]
pub enum AppError {
    /// body/query ผ่าน parse แต่ค่าไม่ถูกต้อง
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing or wrong `X-API-Key`.
    #[error("Unauthorized")]
    Unauthorized,

    /// Control endpoints are disabled (no `CONTROL_PASSWORD`).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Something is already running (engine, scan).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Kalshi API call failed.
    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Exchange(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::BadRequest(msg)
            | AppError::Conflict(msg)
            | AppError::Forbidden(msg) => msg.clone(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "ok":    false,
            "error": message,
        }));

        (status, body).into_response()
    }
}
