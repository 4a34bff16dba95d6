//! # fees — Kalshi fee schedule
//!
//! `fee = ceil(coef × qty × P × (1 − P) × 100)` cents, P = price / 100
//!
//! | Order | coef   |
//! |-------|--------|
//! | taker | 0.07   |
//! | maker | 0.0175 |

const TAKER_COEF: f64 = 0.07;
const MAKER_COEF: f64 = 0.0175;

fn fee(coef: f64, price_cents: i64, quantity: i64) -> i64 {
    if quantity <= 0 || price_cents <= 0 || price_cents >= 100 {
        return 0;
    }
    let p = price_cents as f64 / 100.0;
    let raw = coef * quantity as f64 * p * (1.0 - p) * 100.0;
    // ตัด noise ของ float ก่อน ceil (เช่น 7.000000000001 → 7)
    ((raw * 1e9).round() / 1e9).ceil() as i64
}

pub fn taker_fee(price_cents: i64, quantity: i64) -> i64 {
    fee(TAKER_COEF, price_cents, quantity)
}

pub fn maker_fee(price_cents: i64, quantity: i64) -> i64 {
    fee(MAKER_COEF, price_cents, quantity)
}

/// ซื้อทั้ง YES และ NO แล้วถือจน settle — ได้ 100c แน่นอน
pub fn net_profit_buy_both(yes_ask: i64, no_ask: i64, quantity: i64) -> i64 {
    let gross = (100 - yes_ask - no_ask) * quantity;
    gross - taker_fee(yes_ask, quantity) - taker_fee(no_ask, quantity)
}

/// ขายทั้ง 2 ฝั่งรวมแล้วได้เกิน 100c
pub fn net_profit_sell_both(yes_bid: i64, no_bid: i64, quantity: i64) -> i64 {
    let gross = (yes_bid + no_bid - 100) * quantity;
    gross - taker_fee(yes_bid, quantity) - taker_fee(no_bid, quantity)
}
