//! # sizing — Position sizing

/// จำนวนสัญญาที่ซื้อได้เมื่อเสี่ยง `risk_pct` ของ balance
///
/// `floor(balance × risk_pct / price)` — คืน 0 ถ้าราคาหรือ balance ≤ 0
pub fn contracts_for(balance_cents: i64, price_cents: i64, risk_pct: f64) -> u32 {
    if price_cents <= 0 || balance_cents <= 0 || risk_pct <= 0.0 {
        return 0;
    }
    let budget = balance_cents as f64 * risk_pct;
    let n = (budget / price_cents as f64).floor();
    if n <= 0.0 {
        0
    } else {
        n.min(u32::MAX as f64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_by_risk_budget() {
        // $1,000 × 1% = $10 → 10 สัญญา @ 98c = 1000/98 = 10.2 → 10
        assert_eq!(contracts_for(100_000, 98, 0.01), 10);
        assert_eq!(contracts_for(100_000, 50, 0.05), 100);
    }

    #[test]
    fn zero_when_budget_too_small() {
        assert_eq!(contracts_for(5_000, 98, 0.01), 0);
        assert_eq!(contracts_for(0, 98, 0.01), 0);
        assert_eq!(contracts_for(100_000, 0, 0.01), 0);
        assert_eq!(contracts_for(-10, 50, 0.01), 0);
    }
}
