//! # models::order
//!
//! Order lifecycle: `Pending → Open → {Filled, Cancelled, Rejected}`
//!
//! สถานะเดินหน้าอย่างเดียว — terminal แล้วไม่มีวันย้อนกลับ

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::market::{Action, Side};

// ─── Order Status ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Open,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    fn rank(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Open    => 1,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }

    /// `Open → Open` ได้ (partial fill) นอกนั้นต้องเดินหน้าเท่านั้น
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if *self == OrderStatus::Open && next == OrderStatus::Open {
            return true;
        }
        next.rank() > self.rank()
    }

    /// map สถานะจาก exchange ("resting", "executed", ...)
    pub fn from_exchange(status: &str) -> Option<OrderStatus> {
        match status {
            "pending"            => Some(OrderStatus::Pending),
            "resting"            => Some(OrderStatus::Open),
            "executed"           => Some(OrderStatus::Filled),
            "canceled" | "cancelled" => Some(OrderStatus::Cancelled),
            _                    => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending   => "pending",
            OrderStatus::Open      => "open",
            OrderStatus::Filled    => "filled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected  => "rejected",
        };
        f.write_str(s)
    }
}

// ─── Intent ───────────────────────────────────────────────────────────────────

/// สิ่งที่ Strategy อยากทำ — ใช้ครั้งเดียวแล้วทิ้ง ไม่ persist
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Intent {
    pub ticker:      String,
    pub side:        Side,
    pub action:      Action,
    pub count:       u32,
    /// Limit price (cents) บนฝั่ง `side`
    pub limit_price: i64,
    pub reason:      String,
}

// ─── Order ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// client_order_id ที่ส่งไป exchange
    pub id:             Uuid,
    pub exchange_id:    Option<String>,
    pub ticker:         String,
    pub side:           Side,
    pub action:         Action,
    pub count:          u32,
    pub limit_price:    i64,
    pub filled_count:   u32,
    /// ราคาเฉลี่ยที่ fill (cents บนฝั่ง `side`)
    pub avg_fill_price: Option<f64>,
    pub fees_cents:     i64,
    pub status:         OrderStatus,
    pub status_message: Option<String>,
    pub created_at:     DateTime<Utc>,
    pub updated_at:     DateTime<Utc>,
}

impl Order {
    pub fn from_intent(intent: &Intent) -> Self {
        let now = Utc::now();
        Self {
            id:             Uuid::new_v4(),
            exchange_id:    None,
            ticker:         intent.ticker.clone(),
            side:           intent.side,
            action:         intent.action,
            count:          intent.count,
            limit_price:    intent.limit_price,
            filled_count:   0,
            avg_fill_price: None,
            fees_cents:     0,
            status:         OrderStatus::Pending,
            status_message: None,
            created_at:     now,
            updated_at:     now,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.count.saturating_sub(self.filled_count)
    }
}

// ─── Exchange Ack ─────────────────────────────────────────────────────────────

/// สรุป Order ที่ exchange ตอบกลับ (create / get / cancel)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderAck {
    pub exchange_id:     String,
    pub status:          String,
    /// จำนวนที่ fill สะสม (ไม่ใช่ delta)
    pub fill_count:      u32,
    pub remaining_count: u32,
    /// ต้นทุน taker fill รวม (cents)
    pub fill_cost_cents: i64,
    pub fees_cents:      i64,
}

impl OrderAck {
    pub fn mapped_status(&self) -> Option<OrderStatus> {
        OrderStatus::from_exchange(&self.status)
    }

    /// ราคาเฉลี่ยต่อสัญญา ถ้า exchange บอกต้นทุนมา
    pub fn avg_price(&self) -> Option<f64> {
        (self.fill_count > 0 && self.fill_cost_cents > 0)
            .then(|| self.fill_cost_cents as f64 / self.fill_count as f64)
    }
}
