//! # models::position
//!
//! Position เก็บแบบ **YES-equivalent**: quantity > 0 = ถือ YES, < 0 = ถือ NO
//!
//! ```text
//! buy  YES @ p  →  +q @ p
//! sell YES @ p  →  −q @ p
//! buy  NO  @ p  →  −q @ (100 − p)
//! sell NO  @ p  →  +q @ (100 − p)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::market::{Action, Side};

/// แปลง fill ฝั่งใดก็ได้ → (signed qty, YES price)
pub fn yes_equivalent(side: Side, action: Action, count: u32, price: f64) -> (i64, f64) {
    let q = count as i64;
    match (side, action) {
        (Side::Yes, Action::Buy)  => (q, price),
        (Side::Yes, Action::Sell) => (-q, price),
        (Side::No, Action::Buy)   => (-q, 100.0 - price),
        (Side::No, Action::Sell)  => (q, 100.0 - price),
    }
}

// ─── Position ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticker:             String,
    pub quantity:           i64,
    /// ราคาเฉลี่ยแบบ YES-equivalent (cents)
    pub avg_entry_price:    f64,
    pub realized_pnl_cents: i64,
    pub opened_at:          DateTime<Utc>,
    pub updated_at:         DateTime<Utc>,
}

impl Position {
    pub fn new(ticker: &str) -> Self {
        let now = Utc::now();
        Self {
            ticker:             ticker.to_string(),
            quantity:           0,
            avg_entry_price:    0.0,
            realized_pnl_cents: 0,
            opened_at:          now,
            updated_at:         now,
        }
    }

    pub fn side(&self) -> Option<Side> {
        match self.quantity {
            q if q > 0 => Some(Side::Yes),
            q if q < 0 => Some(Side::No),
            _          => None,
        }
    }

    pub fn contracts(&self) -> u64 {
        self.quantity.unsigned_abs()
    }

    /// ราคาเข้าเฉลี่ยบนฝั่งที่ถืออยู่จริง
    pub fn entry_price_on_side(&self) -> f64 {
        match self.side() {
            Some(Side::No) => 100.0 - self.avg_entry_price,
            _              => self.avg_entry_price,
        }
    }

    /// ต้นทุนของ position ที่เปิดอยู่ (cents)
    pub fn cost_basis_cents(&self) -> i64 {
        (self.entry_price_on_side() * self.contracts() as f64).round() as i64
    }

    /// กำไร/ขาดทุนที่ยังไม่ realize ถ้า mark ที่ YES price `mark`
    pub fn unrealized_pnl_cents(&self, yes_mark: f64) -> i64 {
        ((yes_mark - self.avg_entry_price) * self.quantity as f64).round() as i64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub ticker:             String,
    pub side:               Side,
    pub contracts:          u64,
    pub entry_price:        f64,
    pub realized_pnl_cents: i64,
    pub opened_at:          DateTime<Utc>,
    pub closed_at:          DateTime<Utc>,
    /// "yes" / "no" ถ้าปิดเพราะ settlement
    pub settled_result:     Option<Side>,
}

// ─── Fill ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillSource {
    /// Fill จริงจาก Order ของเรา
    Order,
    /// ปรับ ledger ให้ตรงกับ exchange ตอน startup
    Reconcile,
    /// Market settle แล้ว — ปิดที่ 100 หรือ 0
    Settlement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id:    Option<Uuid>,
    pub ticker:      String,
    /// signed YES-equivalent quantity
    pub quantity:    i64,
    pub yes_price:   f64,
    pub fee_cents:   i64,
    pub source:      FillSource,
    pub filled_at:   DateTime<Utc>,
}

// ─── Trade Record ─────────────────────────────────────────────────────────────

/// Log ทุก Order ที่ส่งออกไป — สำหรับ Dashboard / trades API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub order_id:        Uuid,
    pub exchange_id:     Option<String>,
    pub ticker:          String,
    pub side:            Side,
    pub action:          Action,
    pub count:           u32,
    pub price:           i64,
    pub status:          String,
    pub fill_count:      u32,
    pub remaining_count: u32,
    pub fees_cents:      i64,
    pub error:           Option<String>,
    pub dry_run:         bool,
    pub created_at:      DateTime<Utc>,
}
