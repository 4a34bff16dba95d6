//! # engine::executor
//!
//! **Order Execution** — Intent → risk check → ledger → exchange → ledger
//!
//! ```text
//! pre_trade_check ─▶ track (Pending) ─▶ create_order ─┬─▶ record_ack ─▶ [cancel resting] ─▶ record_success
//!                                                     └─▶ Rejected ─▶ record_failure
//! ```
//!
//! ทุก Order ที่ส่งออกไปจะมี TradeRecord หนึ่งรายการ ไม่ว่าผลจะเป็นอะไร

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::events::WsEvent;
use crate::exchange::{CreateOrderRequest, Exchange};
use crate::ledger::PositionChange;
use crate::models::{Intent, Order, OrderAck, OrderStatus, TradeRecord};
use crate::risk::{BlockReason, RiskDecision};
use crate::state::{AppState, LogTag};

#[derive(Debug, Clone, Copy)]
pub struct ExecOptions {
    pub dry_run:       bool,
    /// cancel ส่วนที่ยัง resting ทันทีหลังส่ง
    pub auto_cancel:   bool,
    pub max_positions: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome {
    /// Risk ไม่ให้ยิง — ไม่มี Order เกิดขึ้น
    Blocked(BlockReason),
    /// ส่งไม่ถึง / exchange ปฏิเสธ
    Failed(String),
    /// exchange รับแล้ว — Order หลังพับ fill / cancel เรียบร้อย
    Placed(Order),
}

impl ExecOutcome {
    pub fn filled(&self) -> u32 {
        match self {
            ExecOutcome::Placed(order) => order.filled_count,
            _ => 0,
        }
    }
}

fn trade_record(order: &Order, error: Option<String>, dry_run: bool) -> TradeRecord {
    TradeRecord {
        order_id:        order.id,
        exchange_id:     order.exchange_id.clone(),
        ticker:          order.ticker.clone(),
        side:            order.side,
        action:          order.action,
        count:           order.count,
        price:           order.limit_price,
        status:          order.status.to_string(),
        fill_count:      order.filled_count,
        remaining_count: order.remaining(),
        fees_cents:      order.fees_cents,
        error,
        dry_run,
        created_at:      order.created_at,
    }
}

/// พับ ack เข้า ledger แล้ว broadcast สิ่งที่เปลี่ยน
async fn fold_ack(state: &AppState, id: Uuid, ack: &OrderAck) -> Option<Order> {
    let (change, order) = {
        let mut ledger = state.ledger.write().await;
        let change = match ledger.record_ack(id, ack) {
            Ok(change) => change,
            Err(e) => {
                warn!(order_id = %id, error = %e, "⚠️ Ack not applied");
                PositionChange::default()
            }
        };
        (change, ledger.order(&id).cloned())
    };

    if let Some(position) = change.position {
        #[cfg(feature = "postgres")]
        if let Some(pool) = &state.db {
            if let Err(e) = crate::db::insert_position_snapshot(pool, &position).await {
                warn!(ticker = %position.ticker, error = %e, "⚠️ Failed to persist position snapshot");
            }
        }
        state.broadcast(&WsEvent::PositionUpdated { position: Box::new(position) });
    }
    if let Some(closed) = change.closed {
        state.broadcast(&WsEvent::PositionClosed { closed: Box::new(closed) });
    }
    if let Some(order) = &order {
        state.broadcast(&WsEvent::OrderUpdated { order: Box::new(order.clone()) });
    }
    order
}

// ─── Execute ──────────────────────────────────────────────────────────────────

/// ยิง Intent หนึ่งรายการผ่าน `exchange`
pub async fn execute(
    state: &AppState,
    exchange: &dyn Exchange,
    intent: &Intent,
    opts: &ExecOptions,
) -> ExecOutcome {
    // ── 1. Risk gate ──────────────────────────────────────────────────────────
    let ctx = state.risk_context(opts.max_positions).await;
    if let RiskDecision::Blocked(reason) = state.risk.pre_trade_check(&ctx).await {
        state.log(LogTag::Skip, format!("{} blocked by risk: {reason}", intent.ticker)).await;
        return ExecOutcome::Blocked(reason);
    }

    // ── 2. Track as Pending ───────────────────────────────────────────────────
    let order = Order::from_intent(intent);
    let id = order.id;
    state.ledger.write().await.track(order.clone());
    state.broadcast(&WsEvent::OrderUpdated { order: Box::new(order.clone()) });

    info!(
        ticker   = %intent.ticker,
        side     = %intent.side,
        action   = %intent.action,
        count    = intent.count,
        limit    = intent.limit_price,
        exchange = exchange.name(),
        reason   = %intent.reason,
        "🚀 [EXECUTOR] Sending order"
    );

    // ── 3. Submit ─────────────────────────────────────────────────────────────
    let ack = match exchange.create_order(&CreateOrderRequest::limit(&order)).await {
        Ok(ack) => ack,
        Err(e) => {
            let message = e.to_string();
            error!(ticker = %intent.ticker, error = %message, "❌ [EXECUTOR] Order failed");

            let rejected = {
                let mut ledger = state.ledger.write().await;
                if let Err(err) = ledger.transition(id, OrderStatus::Rejected, Some(message.clone())) {
                    warn!(order_id = %id, error = %err, "⚠️ Could not mark order rejected");
                }
                ledger.order(&id).cloned().unwrap_or(order)
            };
            state.risk.record_failure().await;

            let record = trade_record(&rejected, Some(message.clone()), opts.dry_run);
            state.record_trade(record.clone()).await;
            state.broadcast(&WsEvent::OrderUpdated { order: Box::new(rejected) });
            state.broadcast(&WsEvent::TradeFailed { record: Box::new(record) });
            state.log(LogTag::Fail, format!("{} {}: {message}", intent.ticker, intent.side)).await;
            return ExecOutcome::Failed(message);
        }
    };

    // ── 4. Apply ack ──────────────────────────────────────────────────────────
    let mut current = fold_ack(state, id, &ack).await;

    // ── 5. Auto-cancel resting remainder ──────────────────────────────────────
    let resting = current.as_ref().map_or(false, |o| o.status == OrderStatus::Open && o.remaining() > 0);
    if opts.auto_cancel && resting && !ack.exchange_id.is_empty() {
        match exchange.cancel_order(&ack.exchange_id).await {
            Ok(cancel_ack) => {
                current = fold_ack(state, id, &cancel_ack).await;
            }
            Err(e) => {
                warn!(exchange_id = %ack.exchange_id, error = %e, "⚠️ Auto-cancel failed — order left resting");
                state.log(LogTag::Warn, format!("{} cancel failed: {e}", intent.ticker)).await;
            }
        }
    }

    // ── 6. Success ────────────────────────────────────────────────────────────
    state.risk.record_success().await;
    let order = current.unwrap_or(order);
    state.record_trade(trade_record(&order, None, opts.dry_run)).await;

    if order.filled_count > 0 {
        state
            .log(
                LogTag::Fill,
                format!(
                    "{} {} {}/{} @ {:.1}c (fee {}c) [{}]",
                    order.ticker,
                    order.side.as_str().to_uppercase(),
                    order.filled_count,
                    order.count,
                    order.avg_fill_price.unwrap_or(order.limit_price as f64),
                    order.fees_cents,
                    order.status
                ),
            )
            .await;
    } else {
        state
            .log(LogTag::Info, format!("{} no fill at {}c [{}]", order.ticker, order.limit_price, order.status))
            .await;
    }

    info!(
        order_id = %order.id,
        exchange_id = ?order.exchange_id,
        filled   = order.filled_count,
        status   = %order.status,
        "✅ [EXECUTOR] Order settled in ledger"
    );
    ExecOutcome::Placed(order)
}

// ─── Reconcile ────────────────────────────────────────────────────────────────

/// poll ทุก Order ที่ยังไม่ terminal แล้วพับ fill/status เข้า ledger
///
/// คืนจำนวน Order ที่ poll สำเร็จ
pub async fn reconcile_open_orders(state: &AppState, exchange: &dyn Exchange) -> usize {
    let open = state.ledger.read().await.open_orders();
    let mut polled = 0;

    for order in open {
        let Some(exchange_id) = order.exchange_id.as_deref() else {
            continue;
        };
        match exchange.get_order(exchange_id).await {
            Ok(ack) => {
                fold_ack(state, order.id, &ack).await;
                polled += 1;
            }
            Err(e) if e.is_not_found() => {
                let mut ledger = state.ledger.write().await;
                if let Err(err) =
                    ledger.transition(order.id, OrderStatus::Cancelled, Some("not found on exchange".into()))
                {
                    warn!(order_id = %order.id, error = %err, "⚠️ Could not close missing order");
                }
            }
            Err(e) => warn!(exchange_id, error = %e, "⚠️ Order poll failed"),
        }
    }
    polled
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::exchange::testing::FakeExchange;
    use crate::models::{Action, Side};
    use crate::state::testing::state_with;

    fn make_intent(count: u32) -> Intent {
        Intent {
            ticker:      "KXBTC-26JAN2917-B100000".into(),
            side:        Side::Yes,
            action:      Action::Buy,
            count,
            limit_price: 98,
            reason:      "test".into(),
        }
    }

    fn opts() -> ExecOptions {
        ExecOptions { dry_run: false, auto_cancel: true, max_positions: 10 }
    }

    #[tokio::test]
    async fn fill_updates_ledger_and_trade_log() {
        let fake = Arc::new(FakeExchange::with_markets(100_000, vec![]));
        let state = state_with(fake.clone(), &[]);

        let outcome = execute(&state, fake.as_ref(), &make_intent(10), &opts()).await;
        assert_eq!(outcome.filled(), 10);

        let ledger = state.ledger.read().await;
        let position = ledger.position("KXBTC-26JAN2917-B100000").unwrap();
        assert_eq!(position.quantity, 10);
        assert!(ledger.open_orders().is_empty());

        let trades = ledger.trades(&Default::default());
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].status, "filled");
        assert_eq!(trades[0].fill_count, 10);
        assert!(trades[0].error.is_none());
        drop(ledger);

        let risk = state.risk.status().await;
        assert_eq!(risk.trades_today, 1);
        assert_eq!(risk.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn submission_error_marks_rejected_and_counts_failure() {
        let fake = Arc::new(FakeExchange::with_markets(100_000, vec![]));
        fake.push_create(Err("insufficient_balance".into()));
        let state = state_with(fake.clone(), &[]);

        let outcome = execute(&state, fake.as_ref(), &make_intent(10), &opts()).await;
        assert!(matches!(outcome, ExecOutcome::Failed(ref m) if m.contains("insufficient_balance")));

        let ledger = state.ledger.read().await;
        let orders = ledger.orders();
        assert_eq!(orders[0].status, OrderStatus::Rejected);
        assert!(ledger.position("KXBTC-26JAN2917-B100000").is_none());
        let trades = ledger.trades(&Default::default());
        assert!(trades[0].error.as_deref().unwrap().contains("insufficient_balance"));
        drop(ledger);

        assert_eq!(state.risk.status().await.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn resting_remainder_is_cancelled_and_late_fills_kept() {
        let fake = Arc::new(FakeExchange::with_markets(100_000, vec![]));
        fake.push_create(Ok(OrderAck {
            exchange_id:     "X1".into(),
            status:          "resting".into(),
            fill_count:      0,
            remaining_count: 10,
            ..Default::default()
        }));
        fake.cancel_acks.lock().unwrap().push_back(OrderAck {
            exchange_id:     "X1".into(),
            status:          "canceled".into(),
            fill_count:      3,
            remaining_count: 0,
            fill_cost_cents: 291,
            fees_cents:      1,
        });
        let state = state_with(fake.clone(), &[]);

        let outcome = execute(&state, fake.as_ref(), &make_intent(10), &opts()).await;
        let ExecOutcome::Placed(order) = outcome else { panic!("expected placed") };
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.filled_count, 3);
        assert_eq!(order.avg_fill_price, Some(97.0));
        assert_eq!(fake.cancelled.lock().unwrap().as_slice(), ["X1".to_string()]);

        let ledger = state.ledger.read().await;
        assert_eq!(ledger.position("KXBTC-26JAN2917-B100000").unwrap().quantity, 3);
        assert!(ledger.check_consistency().is_ok());
    }

    #[tokio::test]
    async fn kill_switch_blocks_before_any_order() {
        let fake = Arc::new(FakeExchange::with_markets(100_000, vec![]));
        let state = state_with(fake.clone(), &[]);
        state.risk.kill("test").await;

        let outcome = execute(&state, fake.as_ref(), &make_intent(10), &opts()).await;
        assert!(matches!(outcome, ExecOutcome::Blocked(BlockReason::Killed(_))));
        assert!(fake.created.lock().unwrap().is_empty());
        assert!(state.ledger.read().await.orders().is_empty());
    }

    #[tokio::test]
    async fn reconcile_polls_resting_orders() {
        let fake = Arc::new(FakeExchange::with_markets(100_000, vec![]));
        fake.push_create(Ok(OrderAck {
            exchange_id:     "X9".into(),
            status:          "resting".into(),
            remaining_count: 5,
            ..Default::default()
        }));
        let state = state_with(fake.clone(), &[]);
        let keep_resting = ExecOptions { auto_cancel: false, ..opts() };

        execute(&state, fake.as_ref(), &make_intent(5), &keep_resting).await;
        assert_eq!(state.ledger.read().await.open_orders().len(), 1);

        assert_eq!(reconcile_open_orders(&state, fake.as_ref()).await, 1);
        let open = state.ledger.read().await.open_orders();
        assert_eq!(open[0].status, OrderStatus::Open);
        assert_eq!(open[0].exchange_id.as_deref(), Some("X9"));
    }
}
