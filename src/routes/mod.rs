//! # routes — HTTP surface
//!
//! Endpoint ที่สั่งงานได้ (control / risk / trades) ผ่าน `X-API-Key`,
//! ที่เหลืออ่านอย่างเดียวและเปิดสาธารณะ

pub mod arbitrage;
pub mod control;
pub mod monitor;
pub mod portfolio;
pub mod risk;
pub mod scanner;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::require_control_key;
use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // ── Protected (X-API-Key = CONTROL_PASSWORD) ──────────────────────────────
    let protected = Router::new()
        .route("/api/trades",          get(portfolio::get_trades))
        .route("/api/trades/import",   post(portfolio::import_trades))
        .route("/api/control/start",   post(control::start_engine))
        .route("/api/control/stop",    post(control::stop_engine))
        .route("/api/control/logs",    get(control::get_logs))
        .route("/api/risk/kill",       post(risk::kill_switch_on))
        .route("/api/risk/rearm",      post(risk::kill_switch_off))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_control_key));

    Router::new()
        // ── Monitor ───────────────────────────────────────────────────────────
        .route("/health",                get(monitor::health))
        .route("/ws/monitor",            get(monitor::ws_monitor))
        .route("/api/status",            get(monitor::get_status))
        // ── Portfolio ─────────────────────────────────────────────────────────
        .route("/api/balance",           get(portfolio::get_balance))
        .route("/api/positions",         get(portfolio::get_positions))
        .route("/api/positions/closed",  get(portfolio::get_closed_positions))
        .route("/api/orders",            get(portfolio::get_orders))
        .route("/api/stats",             get(portfolio::get_stats))
        // ── Scanner / Arbitrage ───────────────────────────────────────────────
        .route("/api/scanner",           get(scanner::get_scanner))
        .route("/api/scanner/scan",      post(scanner::start_scan))
        .route("/api/arbitrage",         get(arbitrage::get_arbitrage))
        .route("/api/arbitrage/scan",    post(arbitrage::start_arbitrage))
        .route("/api/arbitrage/stop",    post(arbitrage::stop_arbitrage))
        // ── Risk ──────────────────────────────────────────────────────────────
        .route("/api/risk/status",       get(risk::get_risk_status))
        .merge(protected)
        // ── Middleware ────────────────────────────────────────────────────────
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use chrono::Utc;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::exchange::testing::FakeExchange;
    use crate::models::Market;
    use crate::state::testing::state_with;

    const KEY: &str = "s3cret";

    fn make_app(pairs: &[(&str, &str)]) -> (Router, SharedState) {
        let fake = FakeExchange::with_markets(
            50_000,
            vec![Market {
                ticker:       "KXHIGHNY-26JAN29-B40".into(),
                event_ticker: "KXHIGHNY-26JAN29".into(),
                status:       "active".into(),
                yes_bid:      96,
                yes_ask:      97,
                no_bid:       3,
                no_ask:       4,
                volume_24h:   40_000,
                close_time:   Some(Utc::now() + chrono::Duration::hours(3)),
                ..Default::default()
            }],
        );
        let state = state_with(Arc::new(fake), pairs);
        (build_router(state.clone()), state)
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get_req(uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(k) = key {
            builder = builder.header("X-API-Key", k);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, key: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(k) = key {
            builder = builder.header("X-API-Key", k);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let (app, _) = make_app(&[]);
        let (status, body) = call(&app, get_req("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["engine_running"], false);
    }

    #[tokio::test]
    async fn control_is_forbidden_without_password() {
        let (app, _) = make_app(&[]);
        let (status, body) =
            call(&app, post_json("/api/control/start", Some("anything"), serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["ok"], false);

        let (status, _) = call(&app, get_req("/api/trades", None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn wrong_key_is_unauthorized() {
        let (app, _) = make_app(&[("CONTROL_PASSWORD", KEY)]);
        let (status, _) = call(&app, get_req("/api/trades", Some("nope"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(&app, get_req("/api/trades?limit=5", Some(KEY))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn start_clamps_and_rejects_second_start() {
        let (app, state) = make_app(&[("CONTROL_PASSWORD", KEY), ("ROUND_INTERVAL_SECS", "3600")]);

        let (status, body) = call(
            &app,
            post_json("/api/control/start", Some(KEY), serde_json::json!({ "dry_run": true, "max_positions": 500 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["settings"]["max_positions"], 50);
        assert!(state.engine.is_running());

        let (status, body) =
            call(&app, post_json("/api/control/start", Some(KEY), serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Engine already running");

        let (status, _) = call(&app, post_json("/api/control/stop", Some(KEY), serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, get_req("/api/control/logs", Some(KEY))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["lines"].as_array().unwrap().iter().any(|l| l.as_str().unwrap().contains("Engine started")));
    }

    #[tokio::test]
    async fn live_start_needs_credentials() {
        let (app, state) = make_app(&[("CONTROL_PASSWORD", KEY)]);
        let (status, _) =
            call(&app, post_json("/api/control/start", Some(KEY), serde_json::json!({ "dry_run": false }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!state.engine.is_running());
    }

    #[tokio::test]
    async fn kill_and_rearm_flow_through_risk_status() {
        let (app, _) = make_app(&[("CONTROL_PASSWORD", KEY)]);
        let (status, _) =
            call(&app, post_json("/api/risk/kill", Some(KEY), serde_json::json!({ "reason": "drill" }))).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(&app, get_req("/api/risk/status", None)).await;
        assert_eq!(body["risk"]["is_killed"], true);
        assert_eq!(body["risk"]["kill_reason"], "drill");

        call(&app, post_json("/api/risk/rearm", Some(KEY), serde_json::json!({}))).await;
        let (_, body) = call(&app, get_req("/api/risk/status", None)).await;
        assert_eq!(body["risk"]["is_killed"], false);
    }

    #[tokio::test]
    async fn background_scan_fills_scanner_report() {
        let (app, _) = make_app(&[]);
        let (status, _) = call(&app, post_json("/api/scanner/scan", None, serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::OK);

        let mut report = Value::Null;
        for _ in 0..50 {
            let (_, body) = call(&app, get_req("/api/scanner?sort_by=expiration", None)).await;
            if body["running"] == false && !body["report"].is_null() {
                report = body["report"].clone();
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(report["stats"]["qualified"], 1);
        assert_eq!(report["results"][0]["ticker"], "KXHIGHNY-26JAN29-B40");

        let (status, _) = call(&app, get_req("/api/scanner?sort_by=bogus", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn balance_and_positions_read_paper_state() {
        let (app, _) = make_app(&[]);
        let (status, body) = call(&app, get_req("/api/balance", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["paper"], true);
        assert_eq!(body["balance_cents"], 100_000);

        let (_, body) = call(&app, get_req("/api/positions", None)).await;
        assert_eq!(body["count"], 0);

        let (_, body) = call(&app, get_req("/api/stats", None)).await;
        assert_eq!(body["stats"]["total_orders"], 0);
        assert_eq!(body["balances"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn trade_import_requires_key_and_fills_trade_log() {
        let csv = "type,Market_Ticker,Market_Id,Original_Date,Price_In_Cents,Amount_In_Dollars,Fee_In_Dollars,Traded_Time,Direction,Order_Type\n\
                   Trade,KXHIGHNY-26JAN29-B40,m-1,2026-01-29T22:46:06Z,97,10,0.02,,No,limit\n\
                   Trade,KXBTC-26JAN29-B100000,m-2,2026-01-29T23:00:00Z,95,5,0,,Yes,limit\n";
        let import_req = |key: Option<&str>| {
            let mut builder = Request::builder()
                .method("POST")
                .uri("/api/trades/import")
                .header(header::CONTENT_TYPE, "text/csv");
            if let Some(k) = key {
                builder = builder.header("X-API-Key", k);
            }
            builder.body(Body::from(csv)).unwrap()
        };

        let (app, _) = make_app(&[]);
        let (status, _) = call(&app, import_req(Some(KEY))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (app, state) = make_app(&[("CONTROL_PASSWORD", KEY)]);
        let (status, _) = call(&app, import_req(None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(&app, import_req(Some(KEY))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["imported"], 2);
        assert_eq!(body["skipped"], 0);
        assert_eq!(body["stats"]["total_orders"], 2);

        let (_, body) = call(&app, get_req("/api/trades", Some(KEY))).await;
        assert_eq!(body["count"], 2);

        // นำเข้าซ้ำ = แทนที่ ไม่ใช่ต่อท้าย
        let (_, body) = call(&app, import_req(Some(KEY))).await;
        assert_eq!(body["replaced"], 2);
        assert_eq!(state.ledger.read().await.trades(&Default::default()).len(), 2);
    }
}
