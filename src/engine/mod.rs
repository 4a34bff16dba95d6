//! # engine — Order Execution + Strategy Loop
//!
//! | Module         | หน้าที่                                                      |
//! |----------------|--------------------------------------------------------------|
//! | [`executor`]   | Intent → risk → exchange → ledger                           |
//! | [`runner`]     | หนึ่ง round ของ sniper + `run_loop`                          |
//! | [`supervisor`] | restart loop ที่ crash ด้วย exponential backoff              |

pub mod executor;
pub mod runner;
pub mod supervisor;

use tracing::{info, warn};

use crate::events::WsEvent;
use crate::state::{AppState, EngineSettings, LogTag, SharedState};

/// เริ่ม Engine ใน background — false ถ้ามีตัวที่รันอยู่แล้ว
pub async fn start(state: &SharedState, settings: EngineSettings) -> bool {
    if !state.engine.try_begin(settings).await {
        return false;
    }

    state.broadcast(&WsEvent::EngineStarted {
        dry_run:       settings.dry_run,
        with_ai:       settings.with_ai,
        max_positions: settings.max_positions,
    });
    state
        .log(
            LogTag::Head,
            format!(
                "Engine started [{}] max_positions={} ai={}",
                if settings.dry_run { "paper" } else { "LIVE" },
                settings.max_positions,
                settings.with_ai
            ),
        )
        .await;

    let task_state = state.clone();
    tokio::spawn(async move {
        let reason = supervisor::supervise(task_state.clone(), settings).await;
        task_state.engine.finish().await;
        task_state.log(LogTag::Info, format!("Engine stopped: {reason}")).await;
        task_state.broadcast(&WsEvent::EngineStopped { reason });
    });
    true
}

/// ขอให้ Engine หยุด — round ปัจจุบันจะจบก่อน
pub async fn stop(state: &AppState) -> bool {
    if !state.engine.is_running() {
        return false;
    }
    state.engine.request_stop();
    state.log(LogTag::Info, "Stop requested").await;
    true
}

/// ตอน startup: ดึง position จริงจาก exchange มาเติม ledger
pub async fn bootstrap(state: &AppState) {
    if !state.config.exchange.has_credentials() {
        info!("No Kalshi credentials — skipping position reconcile");
        return;
    }
    match state.exchange.positions().await {
        Ok(positions) => {
            let adjusted = state.ledger.write().await.reconcile_positions(&positions);
            info!(count = positions.len(), adjusted = adjusted.len(), "📒 Ledger reconciled with exchange");
            if !adjusted.is_empty() {
                state.log(LogTag::Info, format!("Reconciled positions: {}", adjusted.join(", "))).await;
            }
        }
        Err(e) => warn!(error = %e, "⚠️ Position reconcile failed — ledger starts empty"),
    }
}
