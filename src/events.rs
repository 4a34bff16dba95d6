//! # events
//!
//! Defines [`WsEvent`] — ทุก Event ที่ระบบ Broadcast ออกไปผ่าน WebSocket
//! (`/ws/monitor`)
//!
//! ใช้ `tokio::sync::broadcast::Sender<String>` โดยแปลง WsEvent เป็น JSON
//! String ก่อนส่ง เพื่อหลีกเลี่ยง Clone constraints ที่ซับซ้อน

use serde::Serialize;

use crate::engine::runner::RoundSummary;
use crate::models::{ClosedPosition, Order, Position, TradeRecord};
use crate::state::LogLine;

/// Event ทุกรูปแบบที่ Dashboard จะได้รับแบบ Real-time
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WsEvent {
    /// Engine เริ่มทำงาน
    EngineStarted {
        dry_run:       bool,
        with_ai:       bool,
        max_positions: usize,
    },

    /// Engine หยุด (stop request / daily loss / kill)
    EngineStopped {
        reason: String,
    },

    /// Order เปลี่ยนสถานะ (pending → open → filled ...)
    OrderUpdated {
        order: Box<Order>,
    },

    /// Position เปลี่ยนหลัง fill
    PositionUpdated {
        position: Box<Position>,
    },

    /// Position ปิด (settlement / ขายออก / reconcile)
    PositionClosed {
        closed: Box<ClosedPosition>,
    },

    /// ส่ง Order ไม่สำเร็จ
    TradeFailed {
        record: Box<TradeRecord>,
    },

    /// จบหนึ่ง round ของ strategy
    RoundCompleted {
        summary: Box<RoundSummary>,
    },

    BalanceUpdated {
        balance_cents:         i64,
        portfolio_value_cents: i64,
    },

    ScanCompleted {
        total:     usize,
        qualified: usize,
    },

    ArbitrageCompleted {
        opportunities: usize,
        stopped:       bool,
    },

    /// Risk Kill Switch ถูกเปิด (ไม่ว่าจาก Auto-Kill หรือ Manual)
    RiskKilled {
        reason: String,
    },

    RiskRearmed,

    /// บรรทัดใหม่ใน engine log
    Log {
        line: LogLine,
    },
}

impl WsEvent {
    /// แปลงเป็น JSON String สำหรับส่งผ่าน WebSocket
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_screaming_snake() {
        let json = WsEvent::EngineStopped { reason: "stop requested".into() }.to_json();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["event"], "ENGINE_STOPPED");
        assert_eq!(v["reason"], "stop requested");

        let rearmed: serde_json::Value = serde_json::from_str(&WsEvent::RiskRearmed.to_json()).unwrap();
        assert_eq!(rearmed["event"], "RISK_REARMED");
    }
}
