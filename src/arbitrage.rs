//! # arbitrage — ตรวจจับ arbitrage (รายงานอย่างเดียว ไม่ส่ง order)
//!
//! 1. **Probability arb** — `YES ask + NO ask < 100` → ซื้อทั้ง 2 ฝั่ง,
//!    `YES bid + NO bid > 100` → ขายทั้ง 2 ฝั่ง (ได้ 100¢ แน่นอนตอน settle)
//! 2. **Orderbook arb** — best bid ใน orderbook จริงรวมกันเกิน 100 → ขายทั้งคู่
//!    ขนาดจำกัดด้วย quantity ที่ระดับราคานั้น
//!
//! กำไรทุกตัวหัก taker fee แล้ว ([`crate::fees`])

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::exchange::{Exchange, ExchangeError};
use crate::fees::{net_profit_buy_both, net_profit_sell_both};
use crate::models::{Quote, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbKind {
    BuyBoth,
    SellBoth,
    OrderbookSell,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArbOpportunity {
    pub kind:             ArbKind,
    pub ticker:           String,
    /// ask (buy) หรือ bid (sell) ฝั่ง YES
    pub yes_price:        i64,
    pub no_price:         i64,
    pub quantity:         i64,
    /// edge ต่อสัญญาก่อนหัก fee (cents)
    pub gross_edge:       i64,
    pub net_profit_cents: i64,
    pub description:      String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArbParams {
    pub min_profit_cents:     i64,
    pub quantity:             i64,
    pub check_orderbook:      bool,
    pub max_orderbook_checks: usize,
}

impl Default for ArbParams {
    fn default() -> Self {
        Self {
            min_profit_cents:     1,
            quantity:             10,
            check_orderbook:      true,
            max_orderbook_checks: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArbReport {
    pub opportunities: Vec<ArbOpportunity>,
    pub fetched:       usize,
    pub priced:        usize,
    pub logs:          Vec<String>,
    /// true = ถูกสั่งหยุดก่อน orderbook stage
    pub stopped:       bool,
    pub scanned_at:    DateTime<Utc>,
}

fn sort_by_profit(opps: &mut [ArbOpportunity]) {
    opps.sort_by(|a, b| b.net_profit_cents.cmp(&a.net_profit_cents).then_with(|| a.ticker.cmp(&b.ticker)));
}

// ─── Probability Arb ──────────────────────────────────────────────────────────

pub fn scan_probability_arb(quotes: &[(String, Quote)], min_profit_cents: i64, quantity: i64) -> Vec<ArbOpportunity> {
    let mut opps = Vec::new();
    for (ticker, q) in quotes {
        // ask ที่หายไป = ซื้อไม่ได้ → ถือเป็น 100
        let yes_ask = if q.yes_ask > 0 { q.yes_ask } else { 100 };
        let no_ask = if q.no_ask > 0 { q.no_ask } else { 100 };

        let buy_total = yes_ask + no_ask;
        if buy_total < 100 {
            let profit = net_profit_buy_both(yes_ask, no_ask, quantity);
            if profit >= min_profit_cents {
                opps.push(ArbOpportunity {
                    kind:             ArbKind::BuyBoth,
                    ticker:           ticker.clone(),
                    yes_price:        yes_ask,
                    no_price:         no_ask,
                    quantity,
                    gross_edge:       100 - buy_total,
                    net_profit_cents: profit,
                    description:      format!(
                        "BUY YES@{yes_ask}c + NO@{no_ask}c = {buy_total}c → profit {profit}c on {quantity} contracts"
                    ),
                });
            }
        }

        let sell_total = q.yes_bid + q.no_bid;
        if sell_total > 100 {
            let profit = net_profit_sell_both(q.yes_bid, q.no_bid, quantity);
            if profit >= min_profit_cents {
                opps.push(ArbOpportunity {
                    kind:             ArbKind::SellBoth,
                    ticker:           ticker.clone(),
                    yes_price:        q.yes_bid,
                    no_price:         q.no_bid,
                    quantity,
                    gross_edge:       sell_total - 100,
                    net_profit_cents: profit,
                    description:      format!(
                        "SELL YES@{}c + NO@{}c = {sell_total}c → profit {profit}c on {quantity} contracts",
                        q.yes_bid, q.no_bid
                    ),
                });
            }
        }
    }
    sort_by_profit(&mut opps);
    opps
}

// ─── Orderbook Arb ────────────────────────────────────────────────────────────

pub async fn scan_orderbook_arb(
    exchange: &dyn Exchange,
    tickers: &[String],
    min_profit_cents: i64,
    max_quantity: i64,
) -> Vec<ArbOpportunity> {
    let mut opps = Vec::new();
    for ticker in tickers {
        let book = match exchange.orderbook(ticker, 5).await {
            Ok(b) => b,
            Err(e) => {
                debug!(ticker = %ticker, error = %e, "orderbook fetch failed — skipping");
                continue;
            }
        };
        let (Some((yes_bid, yes_qty)), Some((no_bid, no_qty))) = (book.best_bid(Side::Yes), book.best_bid(Side::No)) else {
            continue;
        };
        if yes_bid + no_bid <= 100 {
            continue;
        }
        let qty = yes_qty.min(no_qty).min(max_quantity);
        if qty <= 0 {
            continue;
        }
        let profit = net_profit_sell_both(yes_bid, no_bid, qty);
        if profit >= min_profit_cents {
            opps.push(ArbOpportunity {
                kind:             ArbKind::OrderbookSell,
                ticker:           ticker.clone(),
                yes_price:        yes_bid,
                no_price:         no_bid,
                quantity:         qty,
                gross_edge:       yes_bid + no_bid - 100,
                net_profit_cents: profit,
                description:      format!(
                    "SELL YES@{yes_bid}c({yes_qty}) + NO@{no_bid}c({no_qty}) → profit {profit}c on {qty} contracts"
                ),
            });
        }
    }
    sort_by_profit(&mut opps);
    opps
}

// ─── Full Scan ────────────────────────────────────────────────────────────────

/// ดึงทุก market → probability arb → orderbook arb บน N ตัวที่ volume สูงสุด
pub async fn run_arbitrage_scan(
    exchange: &dyn Exchange,
    params: &ArbParams,
    stop: &AtomicBool,
) -> Result<ArbReport, ExchangeError> {
    let mut logs = vec!["[HEAD] Arbitrage Scanner".to_string(), "[INFO] Fetching all open markets...".to_string()];

    let markets = exchange.all_markets("open").await?;
    let fetched = markets.len();
    logs.push(format!("[INFO] {fetched} markets fetched"));

    let mut priced: Vec<(String, Quote, i64)> = markets
        .iter()
        .filter_map(|m| Quote::from_market(m).map(|q| (m.ticker.clone(), q, m.volume_24h)))
        .collect();
    logs.push(format!("[INFO] {} markets with price data", priced.len()));

    let quotes: Vec<(String, Quote)> = priced.iter().map(|(t, q, _)| (t.clone(), *q)).collect();
    let mut opportunities = scan_probability_arb(&quotes, params.min_profit_cents, params.quantity);
    if opportunities.is_empty() {
        logs.push("[INFO] No probability arbitrage found".into());
    } else {
        logs.push(format!("[FILL] Found {} probability arbitrage opportunities!", opportunities.len()));
        logs.extend(opportunities.iter().take(10).map(|o| format!("[FILL] {}: {}", o.ticker, o.description)));
    }

    let mut stopped = false;
    if params.check_orderbook {
        if stop.load(Ordering::Relaxed) {
            logs.push("[WARN] Stopped before orderbook scan".into());
            stopped = true;
        } else {
            priced.sort_by(|a, b| b.2.cmp(&a.2));
            let tickers: Vec<String> = priced
                .iter()
                .take(params.max_orderbook_checks)
                .map(|(t, _, _)| t.clone())
                .collect();
            logs.push(format!("[INFO] Scanning {} orderbooks...", tickers.len()));

            let book_opps = scan_orderbook_arb(exchange, &tickers, params.min_profit_cents, params.quantity).await;
            if book_opps.is_empty() {
                logs.push("[INFO] No orderbook spread arbitrage found".into());
            } else {
                logs.push(format!("[FILL] Found {} orderbook spread opportunities!", book_opps.len()));
                logs.extend(book_opps.iter().take(10).map(|o| format!("[FILL] {}: {}", o.ticker, o.description)));
            }
            opportunities.extend(book_opps);
        }
    }

    logs.push(format!("[HEAD] Scan complete — {} total opportunities", opportunities.len()));
    info!(fetched, found = opportunities.len(), "⚖️ Arbitrage scan complete");

    Ok(ArbReport {
        opportunities,
        fetched,
        priced: quotes.len(),
        logs,
        stopped,
        scanned_at: Utc::now(),
    })
}
