//! # ledger — Position & Risk Ledger
//!
//! Single source of truth ของสิ่งที่เราถือ, Order ที่ยังเปิด และ exposure
//!
//! ## Invariants
//! - ทุก market: ผลรวม signed quantity ของ [`Fill`] == `Position::quantity`
//!   (Reconcile / Settlement ก็บันทึกเป็น Fill เพื่อให้สมการนี้จริงเสมอ)
//! - Order เดินหน้าอย่างเดียว — ดู [`OrderStatus::can_transition_to`]
//!
//! ## History
//! process รันต่อเนื่องหลายวัน — order ที่จบแล้ว, fill และ trade log เก็บแบบมีเพดาน.
//! ผลรวม fill ต่อ ticker เก็บเป็นยอดสะสม และ order ที่ถูกตัดออกยังนับใน [`LedgerStats`]
//!
//! Ledger เป็น plain struct (ไม่มี lock) — `AppState` ห่อด้วย `RwLock`

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::exchange::ExchangePosition;
use crate::feed::MarketBook;
use crate::fees;
use crate::models::position::yes_equivalent;
use crate::models::{
    Action, Balance, ClosedPosition, Fill, FillSource, Order, OrderAck, OrderStatus, Position,
    Side, TradeRecord,
};
use crate::ticker::decode_ticker;

const BALANCE_HISTORY_CAP: usize = 1_000;
/// order ที่ terminal แล้วเก็บไว้กี่ตัว (order ที่ยังเปิดไม่นับ ไม่ถูกตัด)
pub const ORDER_HISTORY_CAP: usize = 1_000;
pub const FILL_HISTORY_CAP:  usize = 5_000;
pub const TRADE_HISTORY_CAP: usize = 5_000;

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("unknown order {0}")]
    UnknownOrder(Uuid),

    #[error("order {id}: illegal transition {from} -> {to}")]
    IllegalTransition {
        id:   Uuid,
        from: OrderStatus,
        to:   OrderStatus,
    },

    #[error("{ticker}: fills sum to {fills} but position is {position}")]
    Inconsistent {
        ticker:   String,
        fills:    i64,
        position: i64,
    },
}

// ─── Views ────────────────────────────────────────────────────────────────────

/// ผลของ Fill หนึ่งครั้งต่อ position
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionChange {
    pub position: Option<Position>,
    pub closed:   Option<ClosedPosition>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionView {
    pub ticker:               String,
    pub title:                String,
    pub side:                 Option<Side>,
    pub contracts:            u64,
    pub entry_price:          f64,
    pub cost_cents:           i64,
    /// ราคา bid ปัจจุบันฝั่งที่ถือ (100/0 ถ้า settle แล้ว)
    pub mark_price:           Option<i64>,
    pub market_value_cents:   Option<i64>,
    pub unrealized_pnl_cents: Option<i64>,
    pub realized_pnl_cents:   i64,
    pub opened_at:            DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BalanceSnapshot {
    pub balance_cents:         i64,
    pub portfolio_value_cents: i64,
    pub at:                    DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerStats {
    pub total_orders:       usize,
    pub filled_orders:      usize,
    pub failed_orders:      usize,
    pub open_positions:     usize,
    pub closed_positions:   usize,
    pub wins:               usize,
    pub losses:             usize,
    pub breakeven:          usize,
    /// % ของ closed positions ที่กำไร
    pub win_rate:           f64,
    pub realized_pnl_cents: i64,
    pub gross_profit_cents: i64,
    pub gross_loss_cents:   i64,
    /// None = ยังไม่มีขาดทุน
    pub profit_factor:      Option<f64>,
    pub total_fees_cents:   i64,
    pub total_invested_cents: i64,
    pub net_pnl_cents:      i64,
    /// net P&L / total invested (%)
    pub roi_pct:            f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPnl {
    pub date:               NaiveDate,
    pub realized_pnl_cents: i64,
    pub closed:             usize,
}

#[derive(Debug, Clone, Default)]
pub struct TradeFilter {
    pub ticker: Option<String>,
    pub limit:  Option<usize>,
}

// ─── Ledger ───────────────────────────────────────────────────────────────────

/// ยอดของ order ที่ถูกตัดออกจาก history แล้ว
#[derive(Debug, Default, Clone, Copy)]
struct ArchivedOrders {
    total:          usize,
    filled:         usize,
    failed:         usize,
    invested_cents: i64,
}

impl ArchivedOrders {
    fn add(&mut self, order: &Order) {
        self.total += 1;
        if order.filled_count > 0 {
            self.filled += 1;
        }
        if order.status == OrderStatus::Rejected {
            self.failed += 1;
        }
        self.invested_cents += invested_cents(order);
    }
}

/// เงินที่จ่ายไปกับ buy fill ของ order (cents)
fn invested_cents(order: &Order) -> i64 {
    if order.action != Action::Buy {
        return 0;
    }
    (order.avg_fill_price.unwrap_or(0.0) * order.filled_count as f64).round() as i64
}

#[derive(Debug, Default)]
pub struct Ledger {
    positions:   HashMap<String, Position>,
    orders:      HashMap<Uuid, Order>,
    order_seq:   VecDeque<Uuid>,
    archived:    ArchivedOrders,
    fills:       VecDeque<Fill>,
    /// ผลรวม signed quantity ของ fill ทั้งหมดต่อ ticker (ตัด entry ที่เป็น 0)
    fill_totals: HashMap<String, i64>,
    fees_cents:  i64,
    closed:      Vec<ClosedPosition>,
    trades:      VecDeque<TradeRecord>,
    balances:    VecDeque<BalanceSnapshot>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Orders ───────────────────────────────────────────────────────────────

    /// ลงทะเบียน Order ใหม่ (Pending)
    pub fn track(&mut self, order: Order) {
        if !self.orders.contains_key(&order.id) {
            self.order_seq.push_back(order.id);
        }
        self.orders.insert(order.id, order);
        self.prune_orders();
    }

    /// ตัด order ที่ terminal แล้วตัวเก่าสุดออกจนเหลือ `ORDER_HISTORY_CAP`
    fn prune_orders(&mut self) {
        let mut excess = self.order_seq.len().saturating_sub(ORDER_HISTORY_CAP);
        if excess == 0 {
            return;
        }
        let orders = &mut self.orders;
        let archived = &mut self.archived;
        self.order_seq.retain(|id| {
            if excess == 0 {
                return true;
            }
            match orders.get(id).map(|o| o.status.is_terminal()) {
                Some(true) => {
                    if let Some(order) = orders.remove(id) {
                        archived.add(&order);
                    }
                    excess -= 1;
                    false
                }
                Some(false) => true,
                None => false,
            }
        });
    }

    pub fn order(&self, id: &Uuid) -> Option<&Order> {
        self.orders.get(id)
    }

    /// เปลี่ยนสถานะ — สถานะเดิมซ้ำถือว่า no-op
    pub fn transition(
        &mut self,
        id: Uuid,
        next: OrderStatus,
        message: Option<String>,
    ) -> Result<&Order, LedgerError> {
        let order = self.orders.get_mut(&id).ok_or(LedgerError::UnknownOrder(id))?;
        if order.status != next {
            if !order.status.can_transition_to(next) {
                return Err(LedgerError::IllegalTransition { id, from: order.status, to: next });
            }
            order.status = next;
        }
        if message.is_some() {
            order.status_message = message;
        }
        order.updated_at = Utc::now();
        Ok(order)
    }

    /// พับ Fill เข้า Order + Position (`price` = ราคาบนฝั่งของ Order)
    ///
    /// จำนวนที่เกิน `remaining` จะถูกตัดทิ้ง
    pub fn apply_fill(
        &mut self,
        id: Uuid,
        quantity: u32,
        price: f64,
        fee_cents: i64,
    ) -> Result<PositionChange, LedgerError> {
        let order = self.orders.get_mut(&id).ok_or(LedgerError::UnknownOrder(id))?;
        if order.status.is_terminal() {
            return Err(LedgerError::IllegalTransition { id, from: order.status, to: order.status });
        }
        let qty = quantity.min(order.remaining());
        if qty == 0 {
            return Ok(PositionChange::default());
        }

        let prev_cost = order.avg_fill_price.unwrap_or(0.0) * order.filled_count as f64;
        order.filled_count += qty;
        order.avg_fill_price = Some((prev_cost + price * qty as f64) / order.filled_count as f64);
        order.fees_cents += fee_cents;
        order.updated_at = Utc::now();
        if order.status == OrderStatus::Pending {
            order.status = OrderStatus::Open;
        }
        if order.remaining() == 0 {
            order.status = OrderStatus::Filled;
        }

        let (delta, yes_price) = yes_equivalent(order.side, order.action, qty, price);
        let ticker = order.ticker.clone();
        Ok(self.apply_position(&ticker, delta, yes_price, fee_cents, FillSource::Order, Some(id), None))
    }

    /// พับ ack จาก exchange (create / get / cancel) — fill_count เป็นยอดสะสม
    pub fn record_ack(&mut self, id: Uuid, ack: &OrderAck) -> Result<PositionChange, LedgerError> {
        let order = self.orders.get_mut(&id).ok_or(LedgerError::UnknownOrder(id))?;
        if !ack.exchange_id.is_empty() {
            order.exchange_id = Some(ack.exchange_id.clone());
        }

        let mut change = PositionChange::default();
        let delta = ack.fill_count.saturating_sub(order.filled_count);
        if delta > 0 && !order.status.is_terminal() {
            let price = if ack.fill_cost_cents > 0 {
                let prev_cost = order.avg_fill_price.unwrap_or(0.0) * order.filled_count as f64;
                (ack.fill_cost_cents as f64 - prev_cost) / delta as f64
            } else {
                order.limit_price as f64
            };
            let fee = if ack.fees_cents > 0 {
                (ack.fees_cents - order.fees_cents).max(0)
            } else {
                fees::taker_fee(price.round() as i64, delta as i64)
            };
            change = self.apply_fill(id, delta, price, fee)?;
        }

        if let Some(next) = ack.mapped_status() {
            let current = self.orders.get(&id).map(|o| o.status).ok_or(LedgerError::UnknownOrder(id))?;
            // ack ที่เก่ากว่าสถานะที่รู้แล้ว (หรือ Filled จาก apply_fill) → ข้าม
            if current.can_transition_to(next) {
                self.transition(id, next, None)?;
            }
        }
        Ok(change)
    }

    pub fn orders(&self) -> Vec<Order> {
        self.order_seq
            .iter()
            .rev()
            .filter_map(|id| self.orders.get(id).cloned())
            .collect()
    }

    pub fn open_orders(&self) -> Vec<Order> {
        self.orders().into_iter().filter(|o| !o.status.is_terminal()).collect()
    }

    // ─── Positions ────────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    fn apply_position(
        &mut self,
        ticker: &str,
        delta: i64,
        yes_price: f64,
        fee_cents: i64,
        source: FillSource,
        order_id: Option<Uuid>,
        settled: Option<Side>,
    ) -> PositionChange {
        let now = Utc::now();
        self.record_fill(Fill {
            order_id,
            ticker: ticker.to_string(),
            quantity: delta,
            yes_price,
            fee_cents,
            source,
            filled_at: now,
        });

        let mut pos = self.positions.remove(ticker).unwrap_or_else(|| Position::new(ticker));
        pos.updated_at = now;
        let mut closed = None;

        if pos.quantity == 0 || pos.quantity.signum() == delta.signum() {
            // เพิ่ม position — เฉลี่ยราคา
            let held = pos.quantity.abs() as f64;
            let add = delta.abs() as f64;
            pos.avg_entry_price = (held * pos.avg_entry_price + add * yes_price) / (held + add);
            if pos.quantity == 0 {
                pos.opened_at = now;
            }
            pos.quantity += delta;
        } else {
            // ลด / ปิด / กลับฝั่ง
            let closing = delta.abs().min(pos.quantity.abs());
            let direction = pos.quantity.signum() as f64;
            let pnl = ((yes_price - pos.avg_entry_price) * closing as f64 * direction).round() as i64;
            pos.realized_pnl_cents += pnl;

            let before = pos.clone();
            pos.quantity += delta;

            if pos.quantity == 0 || pos.quantity.signum() != before.quantity.signum() {
                closed = Some(ClosedPosition {
                    ticker:             ticker.to_string(),
                    side:               before.side().unwrap_or(Side::Yes),
                    contracts:          before.contracts(),
                    entry_price:        before.entry_price_on_side(),
                    realized_pnl_cents: pos.realized_pnl_cents,
                    opened_at:          before.opened_at,
                    closed_at:          now,
                    settled_result:     settled,
                });
                pos.realized_pnl_cents = 0;
                pos.opened_at = now;
                pos.avg_entry_price = if pos.quantity == 0 { 0.0 } else { yes_price };
            }
        }

        if let Some(c) = &closed {
            self.closed.push(c.clone());
        }
        let position = if pos.quantity != 0 {
            self.positions.insert(ticker.to_string(), pos.clone());
            Some(pos)
        } else {
            None
        };

        PositionChange { position, closed }
    }

    fn record_fill(&mut self, fill: Fill) {
        let flat = {
            let total = self.fill_totals.entry(fill.ticker.clone()).or_default();
            *total += fill.quantity;
            *total == 0
        };
        if flat {
            self.fill_totals.remove(&fill.ticker);
        }
        self.fees_cents += fill.fee_cents;
        if self.fills.len() >= FILL_HISTORY_CAP {
            self.fills.pop_front();
        }
        self.fills.push_back(fill);
    }

    /// Fill ล่าสุดก่อน
    pub fn recent_fills(&self, limit: usize) -> Vec<Fill> {
        self.fills.iter().rev().take(limit).cloned().collect()
    }

    /// Market settle แล้ว — ปิดที่ 100 (YES) หรือ 0 (NO)
    pub fn settle(&mut self, ticker: &str, result: Side) -> Option<ClosedPosition> {
        let qty = self.positions.get(ticker)?.quantity;
        let price = match result {
            Side::Yes => 100.0,
            Side::No  => 0.0,
        };
        self.apply_position(ticker, -qty, price, 0, FillSource::Settlement, None, Some(result))
            .closed
    }

    /// ปรับ ledger ให้ตรงกับ position จริงบน exchange (ตอน startup)
    ///
    /// `exchange` ต้องเป็นรายการทั้งหมด — ticker ที่ ledger ถือแต่ไม่อยู่ในรายการจะถูกปิด
    pub fn reconcile_positions(&mut self, exchange: &[ExchangePosition]) -> Vec<String> {
        let mut adjusted = Vec::new();
        let mut seen = HashSet::new();

        for ep in exchange {
            seen.insert(ep.ticker.clone());
            let current = self.positions.get(&ep.ticker).map(|p| p.quantity).unwrap_or(0);
            let diff = ep.position - current;
            if diff == 0 {
                continue;
            }
            let yes_price = if ep.position != 0 && ep.market_exposure > 0 {
                let side_avg = ep.market_exposure as f64 / ep.position.abs() as f64;
                if ep.position > 0 { side_avg } else { 100.0 - side_avg }
            } else {
                self.positions.get(&ep.ticker).map(|p| p.avg_entry_price).unwrap_or(0.0)
            };
            self.apply_position(&ep.ticker, diff, yes_price, 0, FillSource::Reconcile, None, None);
            adjusted.push(ep.ticker.clone());
        }

        let stale: Vec<(String, i64, f64)> = self
            .positions
            .values()
            .filter(|p| !seen.contains(&p.ticker))
            .map(|p| (p.ticker.clone(), p.quantity, p.avg_entry_price))
            .collect();
        for (ticker, qty, avg) in stale {
            self.apply_position(&ticker, -qty, avg, 0, FillSource::Reconcile, None, None);
            adjusted.push(ticker);
        }

        adjusted
    }

    pub fn position(&self, ticker: &str) -> Option<&Position> {
        self.positions.get(ticker)
    }

    pub fn open_positions(&self) -> Vec<Position> {
        let mut out: Vec<Position> = self.positions.values().cloned().collect();
        out.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        out
    }

    pub fn closed_positions(&self) -> Vec<ClosedPosition> {
        self.closed.iter().rev().cloned().collect()
    }

    pub fn held_tickers(&self) -> HashSet<String> {
        self.positions.keys().cloned().collect()
    }

    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    /// ต้นทุนรวมของ position ที่เปิดอยู่ (cents)
    pub fn exposure_cents(&self) -> i64 {
        self.positions.values().map(Position::cost_basis_cents).sum()
    }

    /// ขาดทุนจาก position ที่ปิดวันนี้ (UTC) — ค่าบวก
    pub fn today_realized_loss_cents(&self, now: DateTime<Utc>) -> i64 {
        let today = now.date_naive();
        -self
            .closed
            .iter()
            .filter(|c| c.closed_at.date_naive() == today && c.realized_pnl_cents < 0)
            .map(|c| c.realized_pnl_cents)
            .sum::<i64>()
    }

    /// Position พร้อม mark-to-market จาก MarketBook (bid ฝั่งที่ถือ)
    pub fn position_views(&self, book: &MarketBook) -> Vec<PositionView> {
        self.open_positions()
            .into_iter()
            .map(|p| {
                let side = p.side();
                let mark = side.and_then(|s| {
                    let m = book.get(&p.ticker)?;
                    match m.settled_side() {
                        Some(result) if result == s => Some(100),
                        Some(_) => Some(0),
                        None => {
                            let bid = match s {
                                Side::Yes => m.yes_bid,
                                Side::No  => m.no_bid,
                            };
                            (bid > 0).then_some(bid)
                        }
                    }
                });
                let contracts = p.contracts();
                let entry = p.entry_price_on_side();
                let value = mark.map(|m| m * contracts as i64);
                PositionView {
                    title:                decode_ticker(&p.ticker),
                    ticker:               p.ticker.clone(),
                    side,
                    contracts,
                    entry_price:          entry,
                    cost_cents:           p.cost_basis_cents(),
                    mark_price:           mark,
                    market_value_cents:   value,
                    unrealized_pnl_cents: value.map(|v| v - p.cost_basis_cents()),
                    realized_pnl_cents:   p.realized_pnl_cents,
                    opened_at:            p.opened_at,
                }
            })
            .collect()
    }

    // ─── Trades / Balance ─────────────────────────────────────────────────────

    pub fn push_trade(&mut self, record: TradeRecord) {
        if self.trades.len() >= TRADE_HISTORY_CAP {
            self.trades.pop_front();
        }
        self.trades.push_back(record);
    }

    /// ล้าง trade log (ก่อน import ชุดใหม่)
    pub fn clear_trades(&mut self) -> usize {
        let n = self.trades.len();
        self.trades.clear();
        n
    }

    /// สร้าง ledger จาก trade log ย้อนหลัง (CLI `stats` / `pnl`)
    ///
    /// แต่ละ record กลายเป็น Order ที่ fill ตาม `fill_count` @ `price` แล้วปิดเป็น terminal
    pub fn from_trades(records: &[TradeRecord]) -> Self {
        // order เดียวกันอาจถูก log ซ้ำ — ใช้ record ล่าสุด
        let last: HashMap<Uuid, usize> = records.iter().enumerate().map(|(i, r)| (r.order_id, i)).collect();
        let mut ledger = Self::new();
        for (i, record) in records.iter().enumerate() {
            ledger.push_trade(record.clone());
            if last.get(&record.order_id) != Some(&i) {
                continue;
            }
            let now = record.created_at;
            let order = Order {
                id:             record.order_id,
                exchange_id:    record.exchange_id.clone(),
                ticker:         record.ticker.clone(),
                side:           record.side,
                action:         record.action,
                count:          record.count.max(record.fill_count),
                limit_price:    record.price,
                filled_count:   0,
                avg_fill_price: None,
                fees_cents:     0,
                status:         OrderStatus::Pending,
                status_message: record.error.clone(),
                created_at:     now,
                updated_at:     now,
            };
            let id = order.id;
            ledger.track(order);

            if record.fill_count > 0 {
                // id มาจาก track ด้านบน — ไม่มีทาง UnknownOrder
                let _ = ledger.apply_fill(id, record.fill_count, record.price as f64, record.fees_cents);
            }
            let terminal = match record.status.as_str() {
                "rejected" | "error" | "failed" => OrderStatus::Rejected,
                _ => OrderStatus::Cancelled,
            };
            if let Some(o) = ledger.orders.get(&id) {
                if !o.status.is_terminal() {
                    let next = if o.filled_count > 0 { OrderStatus::Cancelled } else { terminal };
                    let _ = ledger.transition(id, next, None);
                }
            }
        }
        ledger
    }

    /// Trade log ล่าสุดก่อน
    pub fn trades(&self, filter: &TradeFilter) -> Vec<TradeRecord> {
        let iter = self
            .trades
            .iter()
            .rev()
            .filter(|t| filter.ticker.as_deref().map_or(true, |tk| t.ticker == tk))
            .cloned();
        match filter.limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        }
    }

    pub fn record_balance(&mut self, balance: Balance) {
        if self.balances.len() >= BALANCE_HISTORY_CAP {
            self.balances.pop_front();
        }
        self.balances.push_back(BalanceSnapshot {
            balance_cents:         balance.balance,
            portfolio_value_cents: balance.portfolio_value,
            at:                    Utc::now(),
        });
    }

    pub fn last_balance(&self) -> Option<BalanceSnapshot> {
        self.balances.back().copied()
    }

    pub fn balance_history(&self) -> Vec<BalanceSnapshot> {
        self.balances.iter().copied().collect()
    }

    // ─── Stats ────────────────────────────────────────────────────────────────

    pub fn stats(&self) -> LedgerStats {
        let a = self.archived;
        let mut s = LedgerStats {
            total_orders:     a.total + self.orders.len(),
            filled_orders:    a.filled + self.orders.values().filter(|o| o.filled_count > 0).count(),
            failed_orders:    a.failed
                + self.orders.values().filter(|o| o.status == OrderStatus::Rejected).count(),
            open_positions:   self.positions.len(),
            closed_positions: self.closed.len(),
            ..Default::default()
        };

        for c in &self.closed {
            match c.realized_pnl_cents {
                p if p > 0 => {
                    s.wins += 1;
                    s.gross_profit_cents += p;
                }
                p if p < 0 => {
                    s.losses += 1;
                    s.gross_loss_cents += -p;
                }
                _ => s.breakeven += 1,
            }
        }
        if !self.closed.is_empty() {
            s.win_rate = s.wins as f64 / self.closed.len() as f64 * 100.0;
        }
        if s.gross_loss_cents > 0 {
            s.profit_factor = Some(s.gross_profit_cents as f64 / s.gross_loss_cents as f64);
        }

        let open_realized: i64 = self.positions.values().map(|p| p.realized_pnl_cents).sum();
        s.realized_pnl_cents = s.gross_profit_cents - s.gross_loss_cents + open_realized;
        s.total_fees_cents = self.fees_cents;
        s.total_invested_cents = a.invested_cents + self.orders.values().map(invested_cents).sum::<i64>();
        s.net_pnl_cents = s.realized_pnl_cents - s.total_fees_cents;
        if s.total_invested_cents > 0 {
            s.roi_pct = s.net_pnl_cents as f64 / s.total_invested_cents as f64 * 100.0;
        }
        s
    }

    /// Realized P&L ต่อวัน (UTC) จาก position ที่ปิดแล้ว — เก่าก่อน
    pub fn daily_pnl(&self) -> Vec<DailyPnl> {
        let mut by_day: BTreeMap<NaiveDate, (i64, usize)> = BTreeMap::new();
        for c in &self.closed {
            let e = by_day.entry(c.closed_at.date_naive()).or_default();
            e.0 += c.realized_pnl_cents;
            e.1 += 1;
        }
        by_day
            .into_iter()
            .map(|(date, (pnl, n))| DailyPnl { date, realized_pnl_cents: pnl, closed: n })
            .collect()
    }

    // ─── Invariant ────────────────────────────────────────────────────────────

    pub fn check_consistency(&self) -> Result<(), LedgerError> {
        for (ticker, fills) in &self.fill_totals {
            let position = self.positions.get(ticker).map(|p| p.quantity).unwrap_or(0);
            if *fills != position {
                return Err(LedgerError::Inconsistent { ticker: ticker.clone(), fills: *fills, position });
            }
        }
        for p in self.positions.values() {
            if !self.fill_totals.contains_key(&p.ticker) {
                return Err(LedgerError::Inconsistent { ticker: p.ticker.clone(), fills: 0, position: p.quantity });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Intent, Market};

    fn make_order(ledger: &mut Ledger, ticker: &str, side: Side, action: Action, count: u32, price: i64) -> Uuid {
        let order = Order::from_intent(&Intent {
            ticker:      ticker.into(),
            side,
            action,
            count,
            limit_price: price,
            reason:      "test".into(),
        });
        let id = order.id;
        ledger.track(order);
        id
    }

    #[test]
    fn buy_fill_opens_position_and_fills_order() {
        let mut l = Ledger::new();
        let id = make_order(&mut l, "A", Side::Yes, Action::Buy, 10, 98);

        let change = l.apply_fill(id, 4, 97.0, 1).unwrap();
        assert_eq!(change.position.as_ref().unwrap().quantity, 4);
        assert_eq!(l.order(&id).unwrap().status, OrderStatus::Open);

        l.apply_fill(id, 6, 98.0, 1).unwrap();
        let order = l.order(&id).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_count, 10);
        assert!((order.avg_fill_price.unwrap() - 97.6).abs() < 1e-9);

        let pos = l.position("A").unwrap();
        assert_eq!(pos.quantity, 10);
        assert!((pos.avg_entry_price - 97.6).abs() < 1e-9);
        l.check_consistency().unwrap();
    }

    #[test]
    fn overfill_is_clamped() {
        let mut l = Ledger::new();
        let id = make_order(&mut l, "A", Side::Yes, Action::Buy, 5, 50);
        l.apply_fill(id, 50, 50.0, 0).unwrap();
        assert_eq!(l.position("A").unwrap().quantity, 5);
        assert!(l.apply_fill(id, 1, 50.0, 0).is_err());
        l.check_consistency().unwrap();
    }

    #[test]
    fn no_side_is_negative_quantity_and_settles() {
        let mut l = Ledger::new();
        let id = make_order(&mut l, "B", Side::No, Action::Buy, 10, 97);
        l.apply_fill(id, 10, 97.0, 0).unwrap();

        let pos = l.position("B").unwrap();
        assert_eq!(pos.quantity, -10);
        assert_eq!(pos.side(), Some(Side::No));
        assert!((pos.entry_price_on_side() - 97.0).abs() < 1e-9);

        // NO ชนะ → ได้ 100 − 97 = 3c × 10
        let closed = l.settle("B", Side::No).unwrap();
        assert_eq!(closed.realized_pnl_cents, 30);
        assert_eq!(closed.side, Side::No);
        assert_eq!(closed.settled_result, Some(Side::No));
        assert!(l.position("B").is_none());
        l.check_consistency().unwrap();
    }

    #[test]
    fn losing_settlement_counts_toward_daily_loss() {
        let mut l = Ledger::new();
        let id = make_order(&mut l, "C", Side::Yes, Action::Buy, 10, 98);
        l.apply_fill(id, 10, 98.0, 0).unwrap();
        let closed = l.settle("C", Side::No).unwrap();
        assert_eq!(closed.realized_pnl_cents, -980);
        assert_eq!(l.today_realized_loss_cents(Utc::now()), 980);

        let stats = l.stats();
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.profit_factor, Some(0.0));
        assert_eq!(stats.total_invested_cents, 980);
        l.check_consistency().unwrap();
    }

    #[test]
    fn sell_realizes_pnl_and_reversal_opens_new_position() {
        let mut l = Ledger::new();
        let buy = make_order(&mut l, "D", Side::Yes, Action::Buy, 10, 40);
        l.apply_fill(buy, 10, 40.0, 0).unwrap();

        let sell = make_order(&mut l, "D", Side::Yes, Action::Sell, 4, 50);
        let change = l.apply_fill(sell, 4, 50.0, 0).unwrap();
        let pos = change.position.unwrap();
        assert_eq!(pos.quantity, 6);
        assert_eq!(pos.realized_pnl_cents, 40);

        // ขายเกินจนกลับฝั่ง: ปิด 6 ที่ 45 (+30) แล้วเปิด short 2
        let flip = make_order(&mut l, "D", Side::Yes, Action::Sell, 8, 45);
        let change = l.apply_fill(flip, 8, 45.0, 0).unwrap();
        let closed = change.closed.unwrap();
        assert_eq!(closed.realized_pnl_cents, 70);
        assert_eq!(closed.contracts, 6);
        let pos = change.position.unwrap();
        assert_eq!(pos.quantity, -2);
        assert!((pos.avg_entry_price - 45.0).abs() < 1e-9);
        l.check_consistency().unwrap();
    }

    #[test]
    fn ack_applies_cumulative_fills_once() {
        let mut l = Ledger::new();
        let id = make_order(&mut l, "E", Side::Yes, Action::Buy, 10, 98);

        let resting = OrderAck {
            exchange_id:     "ex-1".into(),
            status:          "resting".into(),
            fill_count:      3,
            remaining_count: 7,
            fill_cost_cents: 291,
            fees_cents:      1,
        };
        l.record_ack(id, &resting).unwrap();
        l.record_ack(id, &resting).unwrap();
        assert_eq!(l.position("E").unwrap().quantity, 3);
        assert_eq!(l.order(&id).unwrap().status, OrderStatus::Open);
        assert_eq!(l.order(&id).unwrap().exchange_id.as_deref(), Some("ex-1"));

        let canceled = OrderAck { status: "canceled".into(), fill_count: 5, fill_cost_cents: 487, fees_cents: 2, ..resting };
        l.record_ack(id, &canceled).unwrap();
        let order = l.order(&id).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.filled_count, 5);
        assert_eq!(order.fees_cents, 2);
        assert_eq!(l.position("E").unwrap().quantity, 5);
        l.check_consistency().unwrap();
    }

    #[test]
    fn executed_ack_fills_order() {
        let mut l = Ledger::new();
        let id = make_order(&mut l, "F", Side::No, Action::Buy, 2, 98);
        let ack = OrderAck {
            exchange_id:     "ex-2".into(),
            status:          "executed".into(),
            fill_count:      2,
            remaining_count: 0,
            fill_cost_cents: 0,
            fees_cents:      0,
        };
        l.record_ack(id, &ack).unwrap();
        let order = l.order(&id).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.avg_fill_price, Some(98.0));
        // fee ประมาณจาก taker schedule
        assert_eq!(order.fees_cents, fees::taker_fee(98, 2));
    }

    #[test]
    fn terminal_orders_never_move_back() {
        let mut l = Ledger::new();
        let id = make_order(&mut l, "G", Side::Yes, Action::Buy, 1, 50);
        l.transition(id, OrderStatus::Rejected, Some("boom".into())).unwrap();
        assert!(matches!(
            l.transition(id, OrderStatus::Open, None),
            Err(LedgerError::IllegalTransition { .. })
        ));
        assert_eq!(l.order(&id).unwrap().status_message.as_deref(), Some("boom"));
        assert_eq!(l.stats().failed_orders, 1);
        assert!(l.open_orders().is_empty());
    }

    #[test]
    fn reconcile_matches_exchange_positions() {
        let mut l = Ledger::new();
        let id = make_order(&mut l, "H", Side::Yes, Action::Buy, 5, 90);
        l.apply_fill(id, 5, 90.0, 0).unwrap();

        let exchange = vec![
            ExchangePosition { ticker: "H".into(), position: 8, market_exposure: 720, ..Default::default() },
            ExchangePosition { ticker: "I".into(), position: -4, market_exposure: 388, ..Default::default() },
        ];
        let mut adjusted = l.reconcile_positions(&exchange);
        adjusted.sort();
        assert_eq!(adjusted, vec!["H", "I"]);
        assert_eq!(l.position("H").unwrap().quantity, 8);
        let i = l.position("I").unwrap();
        assert_eq!(i.quantity, -4);
        assert!((i.entry_price_on_side() - 97.0).abs() < 1e-9);
        l.check_consistency().unwrap();

        // exchange ไม่มี H แล้ว → ปิดออก
        l.reconcile_positions(&exchange[1..]);
        assert!(l.position("H").is_none());
        l.check_consistency().unwrap();
    }

    #[test]
    fn position_views_mark_against_book() {
        let mut l = Ledger::new();
        let id = make_order(&mut l, "KXBTCD-26JAN2901-T88249.99", Side::Yes, Action::Buy, 10, 96);
        l.apply_fill(id, 10, 96.0, 0).unwrap();

        let mut book = MarketBook::default();
        book.apply(vec![Market {
            ticker:  "KXBTCD-26JAN2901-T88249.99".into(),
            yes_bid: 97,
            ..Default::default()
        }]);
        let views = l.position_views(&book);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].mark_price, Some(97));
        assert_eq!(views[0].unrealized_pnl_cents, Some(10));
        assert_eq!(views[0].title, "Bitcoin Daily Below $88,249.99 · Jan 29");
    }

    #[test]
    fn stats_and_daily_pnl() {
        let mut l = Ledger::new();
        for (t, result) in [("W1", Side::Yes), ("W2", Side::Yes), ("L1", Side::No)] {
            let id = make_order(&mut l, t, Side::Yes, Action::Buy, 10, 98);
            l.apply_fill(id, 10, 98.0, 1).unwrap();
            l.settle(t, result);
        }
        let s = l.stats();
        assert_eq!((s.wins, s.losses, s.closed_positions), (2, 1, 3));
        assert_eq!(s.gross_profit_cents, 40);
        assert_eq!(s.gross_loss_cents, 980);
        assert_eq!(s.realized_pnl_cents, -940);
        assert_eq!(s.total_fees_cents, 3);
        assert_eq!(s.net_pnl_cents, -943);
        assert!((s.win_rate - 66.666).abs() < 0.01);

        let daily = l.daily_pnl();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].realized_pnl_cents, -940);
    }

    fn make_record(ticker: &str, action: Action, count: u32, fills: u32, price: i64, status: &str) -> TradeRecord {
        TradeRecord {
            order_id:        Uuid::new_v4(),
            exchange_id:     None,
            ticker:          ticker.into(),
            side:            Side::Yes,
            action,
            count,
            price,
            status:          status.into(),
            fill_count:      fills,
            remaining_count: count - fills,
            fees_cents:      1,
            error:           None,
            dry_run:         false,
            created_at:      Utc::now(),
        }
    }

    #[test]
    fn bounded_history_keeps_invariant_and_totals() {
        let mut l = Ledger::new();
        // order ที่ยัง resting ตั้งแต่ต้น — ต้องไม่ถูกตัด
        let resting = make_order(&mut l, "OPEN", Side::Yes, Action::Buy, 5, 10);
        l.transition(resting, OrderStatus::Open, None).unwrap();

        let rounds = ORDER_HISTORY_CAP + 50;
        for i in 0..rounds {
            let ticker = format!("T{}", i % 7);
            let id = make_order(&mut l, &ticker, Side::Yes, Action::Buy, 2, 50);
            l.apply_fill(id, 2, 50.0, 1).unwrap();
            if i % 3 == 0 {
                l.settle(&ticker, Side::Yes);
            }
        }

        assert_eq!(l.orders().len(), ORDER_HISTORY_CAP);
        assert_eq!(l.open_orders().len(), 1);
        assert_eq!(l.open_orders()[0].id, resting);
        assert!(l.recent_fills(usize::MAX).len() <= FILL_HISTORY_CAP);

        let s = l.stats();
        assert_eq!(s.total_orders, rounds + 1);
        assert_eq!(s.filled_orders, rounds);
        assert_eq!(s.total_fees_cents, rounds as i64);
        assert_eq!(s.total_invested_cents, rounds as i64 * 100);
        l.check_consistency().unwrap();
    }

    #[test]
    fn fill_and_trade_logs_are_capped() {
        let mut l = Ledger::new();
        for _ in 0..FILL_HISTORY_CAP + 10 {
            let id = make_order(&mut l, "A", Side::Yes, Action::Buy, 1, 50);
            l.apply_fill(id, 1, 50.0, 0).unwrap();
        }
        assert_eq!(l.recent_fills(usize::MAX).len(), FILL_HISTORY_CAP);
        // fill ที่หลุดจาก history ยังอยู่ในยอดสะสม
        assert_eq!(l.position("A").unwrap().quantity, FILL_HISTORY_CAP as i64 + 10);
        l.check_consistency().unwrap();

        for _ in 0..TRADE_HISTORY_CAP + 3 {
            l.push_trade(make_record("A", Action::Buy, 1, 1, 50, "filled"));
        }
        assert_eq!(l.trades(&TradeFilter::default()).len(), TRADE_HISTORY_CAP);
        assert_eq!(l.clear_trades(), TRADE_HISTORY_CAP);
    }

    #[test]
    fn replays_trade_log_into_stats() {
        // order เดียวกันถูก log ตอน resting แล้วอีกครั้งตอน filled
        let dup = make_record("A", Action::Buy, 10, 0, 40, "open");
        let mut dup_final = dup.clone();
        dup_final.fill_count = 10;
        dup_final.remaining_count = 0;
        dup_final.status = "filled".into();

        let records = vec![
            dup,
            dup_final,
            make_record("A", Action::Sell, 4, 4, 50, "filled"),
            make_record("B", Action::Buy, 5, 2, 90, "cancelled"),
            make_record("C", Action::Buy, 3, 0, 97, "rejected"),
        ];
        let l = Ledger::from_trades(&records);

        assert_eq!(l.position("A").unwrap().quantity, 6);
        assert_eq!(l.position("A").unwrap().realized_pnl_cents, 40);
        assert_eq!(l.position("B").unwrap().quantity, 2);
        assert!(l.open_orders().is_empty());
        assert_eq!(l.trades(&TradeFilter::default()).len(), 5);

        let s = l.stats();
        assert_eq!(s.total_orders, 4);
        assert_eq!(s.filled_orders, 3);
        assert_eq!(s.failed_orders, 1);
        assert_eq!(s.total_invested_cents, 400 + 180);
        assert_eq!(s.total_fees_cents, 3);
        assert_eq!(s.net_pnl_cents, 37);
        assert!((s.roi_pct - 37.0 / 580.0 * 100.0).abs() < 1e-9);
        l.check_consistency().unwrap();
    }

    #[test]
    fn trade_filter_newest_first() {
        let mut l = Ledger::new();
        for (i, t) in ["A", "B", "A"].iter().enumerate() {
            l.push_trade(TradeRecord {
                order_id:        Uuid::new_v4(),
                exchange_id:     None,
                ticker:          t.to_string(),
                side:            Side::Yes,
                action:          Action::Buy,
                count:           i as u32 + 1,
                price:           98,
                status:          "executed".into(),
                fill_count:      1,
                remaining_count: 0,
                fees_cents:      0,
                error:           None,
                dry_run:         true,
                created_at:      Utc::now(),
            });
        }
        let only_a = l.trades(&TradeFilter { ticker: Some("A".into()), limit: None });
        assert_eq!(only_a.len(), 2);
        assert_eq!(only_a[0].count, 3);
        assert_eq!(l.trades(&TradeFilter { ticker: None, limit: Some(1) }).len(), 1);
    }
}
