//! # exchange::paper — Paper trading (dry-run)
//!
//! Market data มาจาก exchange จริง, Order ถูกจำลอง:
//! - Buy  limit ≥ ask ปัจจุบัน → fill ทั้งหมดที่ ask
//! - Sell limit ≤ bid ปัจจุบัน → fill ทั้งหมดที่ bid
//! - ไม่ cross → resting (ไม่มีวัน fill จนกว่าจะ cancel)
//!
//! เงินสดลด/เพิ่มตาม fill + taker fee เหมือนของจริง

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use super::{CreateOrderRequest, Exchange, ExchangeError, ExchangePosition, MarketPage};
use crate::fees;
use crate::models::position::yes_equivalent;
use crate::models::{Action, Balance, Market, OrderAck, Orderbook, Quote, Side};

/// order ที่จบแล้ว (executed / canceled) เก็บไว้ให้ `get_order` ได้กี่ตัว
const FINISHED_ORDER_CAP: usize = 1_000;

#[derive(Default)]
struct PaperBook {
    cash_cents: i64,
    seq:        u64,
    orders:     HashMap<String, OrderAck>,
    /// id ของ order ที่จบแล้ว เก่า → ใหม่
    finished:   VecDeque<String>,
    /// ticker → (signed YES-equivalent qty, exposure cents)
    positions:  HashMap<String, (i64, i64)>,
}

impl PaperBook {
    fn finish(&mut self, order_id: &str) {
        self.finished.push_back(order_id.to_string());
        while self.finished.len() > FINISHED_ORDER_CAP {
            if let Some(old) = self.finished.pop_front() {
                self.orders.remove(&old);
            }
        }
    }
}

pub struct PaperExchange {
    data:  Arc<dyn Exchange>,
    book:  Mutex<PaperBook>,
}

impl PaperExchange {
    pub fn new(data: Arc<dyn Exchange>, starting_cash_cents: i64) -> Self {
        info!(
            cash   = starting_cash_cents as f64 / 100.0,
            source = data.name(),
            "🎭 Paper exchange — orders are simulated"
        );
        Self {
            data,
            book: Mutex::new(PaperBook { cash_cents: starting_cash_cents, ..Default::default() }),
        }
    }

    /// Market settle แล้ว — จ่าย 100¢ ต่อสัญญาฝั่งที่ชนะ แล้วล้าง position
    ///
    /// คืนเงินที่จ่าย (cents)
    pub async fn settle(&self, ticker: &str, result: Side) -> i64 {
        let mut book = self.book.lock().await;
        let Some((qty, _)) = book.positions.remove(ticker) else {
            return 0;
        };
        let payout = match result {
            Side::Yes if qty > 0 => qty * 100,
            Side::No if qty < 0 => -qty * 100,
            _ => 0,
        };
        book.cash_cents += payout;
        info!(ticker, result = %result, qty, payout, "🎭 Paper settlement");
        payout
    }

    /// ราคา fill ถ้า order cross ตลาด
    fn crossing_price(request: &CreateOrderRequest, quote: &Quote) -> Option<i64> {
        let limit = request.price();
        match request.action {
            Action::Buy => {
                let ask = quote.ask(request.side);
                (ask > 0 && ask < 100 && limit.map_or(true, |l| ask <= l)).then_some(ask)
            }
            Action::Sell => {
                let bid = quote.bid(request.side);
                (bid > 0 && limit.map_or(true, |l| bid >= l)).then_some(bid)
            }
        }
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    fn name(&self) -> &'static str {
        "paper"
    }

    fn is_paper(&self) -> bool {
        true
    }

    async fn balance(&self) -> Result<Balance, ExchangeError> {
        let book = self.book.lock().await;
        Ok(Balance {
            balance:         book.cash_cents,
            portfolio_value: book.positions.values().map(|(_, exposure)| *exposure).sum(),
        })
    }

    async fn markets_page(
        &self,
        status: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<MarketPage, ExchangeError> {
        self.data.markets_page(status, limit, cursor).await
    }

    async fn all_markets(&self, status: &str) -> Result<Vec<Market>, ExchangeError> {
        self.data.all_markets(status).await
    }

    async fn market(&self, ticker: &str) -> Result<Market, ExchangeError> {
        self.data.market(ticker).await
    }

    async fn orderbook(&self, ticker: &str, depth: u32) -> Result<Orderbook, ExchangeError> {
        self.data.orderbook(ticker, depth).await
    }

    async fn positions(&self) -> Result<Vec<ExchangePosition>, ExchangeError> {
        let book = self.book.lock().await;
        Ok(book
            .positions
            .iter()
            .filter(|(_, (qty, _))| *qty != 0)
            .map(|(ticker, (qty, exposure))| ExchangePosition {
                ticker:          ticker.clone(),
                position:        *qty,
                market_exposure: *exposure,
                ..Default::default()
            })
            .collect())
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> Result<OrderAck, ExchangeError> {
        if request.count == 0 {
            return Err(ExchangeError::Rejected("count must be positive".into()));
        }
        let market = self.data.market(&request.ticker).await?;
        let quote = Quote::from_market(&market)
            .ok_or_else(|| ExchangeError::Rejected(format!("{} has no prices", request.ticker)))?;

        let mut book = self.book.lock().await;
        book.seq += 1;
        let order_id = format!("paper-{}", book.seq);
        let count = request.count as i64;

        let ack = match Self::crossing_price(request, &quote) {
            Some(price) => {
                let cost = price * count;
                let fee = fees::taker_fee(price, count);
                let exposure_delta = match request.action {
                    Action::Buy => {
                        if cost + fee > book.cash_cents {
                            return Err(ExchangeError::Rejected(format!(
                                "insufficient balance: need {}c, have {}c",
                                cost + fee,
                                book.cash_cents
                            )));
                        }
                        book.cash_cents -= cost + fee;
                        cost
                    }
                    Action::Sell => {
                        book.cash_cents += cost - fee;
                        -cost
                    }
                };
                let (qty, _) = yes_equivalent(request.side, request.action, request.count, price as f64);
                let entry = book.positions.entry(request.ticker.clone()).or_default();
                entry.0 += qty;
                entry.1 = if entry.0 == 0 { 0 } else { (entry.1 + exposure_delta).max(0) };

                info!(
                    ticker = %request.ticker,
                    side   = %request.side,
                    action = %request.action,
                    count,
                    price,
                    "🎭 Paper fill"
                );
                OrderAck {
                    exchange_id:     order_id.clone(),
                    status:          "executed".into(),
                    fill_count:      request.count,
                    remaining_count: 0,
                    fill_cost_cents: cost,
                    fees_cents:      fee,
                }
            }
            None => OrderAck {
                exchange_id:     order_id.clone(),
                status:          "resting".into(),
                fill_count:      0,
                remaining_count: request.count,
                fill_cost_cents: 0,
                fees_cents:      0,
            },
        };

        if ack.status != "resting" {
            book.finish(&order_id);
        }
        book.orders.insert(order_id, ack.clone());
        Ok(ack)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<OrderAck, ExchangeError> {
        let mut book = self.book.lock().await;
        let ack = book
            .orders
            .get_mut(order_id)
            .ok_or_else(|| ExchangeError::Status { status: 404, body: format!("order {order_id} not found") })?;
        let was_resting = ack.status == "resting";
        if was_resting {
            ack.status = "canceled".into();
            ack.remaining_count = 0;
        }
        let ack = ack.clone();
        if was_resting {
            book.finish(order_id);
        }
        Ok(ack)
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderAck, ExchangeError> {
        let book = self.book.lock().await;
        book.orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| ExchangeError::Status { status: 404, body: format!("order {order_id} not found") })
    }
}
