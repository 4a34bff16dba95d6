//! # strategy::sniper — Last-minute sniper
//!
//! ซื้อฝั่งที่ราคา ≥ 95¢ ใน market ที่ใกล้ปิด ด้วย limit 98¢
//! แล้วถือจน settle — กำไร 1–5¢ ต่อสัญญา
//!
//! ลำดับ: tier ↑ → ชั่วโมงที่เหลือ ↑ → ราคา ↓ → dollar volume ↓

use std::collections::HashSet;

use crate::config::Env;
use crate::models::{Action, Intent};
use crate::scanner::{ScanParams, ScanReport, ScanResult};
use crate::sizing::contracts_for;

#[derive(Debug, Clone, PartialEq)]
pub struct SniperConfig {
    /// limit price ที่ส่งไป exchange (cents)
    pub limit_price:    i64,
    /// สัดส่วน balance ต่อ trade
    pub risk_pct:       f64,
    pub max_positions:  usize,
    /// cancel order ที่ยัง resting ทันทีหลังส่ง
    pub auto_cancel:    bool,
    pub with_ai:        bool,
    pub min_confidence: u8,
}

impl Default for SniperConfig {
    fn default() -> Self {
        Self {
            limit_price:    98,
            risk_pct:       0.01,
            max_positions:  10,
            auto_cancel:    true,
            with_ai:        false,
            min_confidence: 75,
        }
    }
}

impl SniperConfig {
    pub fn from_env(env: &Env) -> Self {
        let d = Self::default();
        Self {
            limit_price:    env.parse_or("SNIPER_LIMIT_PRICE", d.limit_price).clamp(1, 99),
            risk_pct:       env.parse_or("SNIPER_RISK_PCT", d.risk_pct).clamp(0.0, 1.0),
            max_positions:  env.parse_or("SNIPER_MAX_POSITIONS", d.max_positions).clamp(1, 50),
            auto_cancel:    env.bool_or("SNIPER_AUTO_CANCEL", d.auto_cancel),
            with_ai:        env.bool_or("SNIPER_WITH_AI", d.with_ai),
            min_confidence: env.parse_or("SNIPER_MIN_CONFIDENCE", d.min_confidence).min(100),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SniperStrategy {
    pub config: SniperConfig,
}

impl SniperStrategy {
    pub fn new(config: SniperConfig) -> Self {
        Self { config }
    }

    /// Candidate ที่ยิงได้ เรียงตามลำดับความน่าเข้า
    pub fn rank(&self, report: &ScanReport, held: &HashSet<String>, scan: &ScanParams) -> Vec<ScanResult> {
        let mut available: Vec<ScanResult> = report
            .qualified()
            .filter(|c| !held.contains(&c.ticker))
            .filter(|c| c.signal_ask <= self.config.limit_price)
            .filter(|c| match scan.max_hours {
                Some(max) => c.hours_left.map_or(false, |h| h > 0.0 && h <= max),
                None => true,
            })
            .cloned()
            .collect();

        available.sort_by(|a, b| {
            a.tier
                .cmp(&b.tier)
                .then_with(|| {
                    let ha = a.hours_left.unwrap_or(9999.0);
                    let hb = b.hours_left.unwrap_or(9999.0);
                    ha.total_cmp(&hb)
                })
                .then(b.signal_price.cmp(&a.signal_price))
                .then(b.dollar_24h.cmp(&a.dollar_24h))
        });
        available
    }

    /// ขนาดจาก ask (ไม่มี ask → bid); 0 สัญญา → None
    pub fn intent_for(&self, candidate: &ScanResult, balance_cents: i64) -> Option<Intent> {
        let est_price = if candidate.signal_ask > 0 { candidate.signal_ask } else { candidate.signal_price };
        let count = contracts_for(balance_cents, est_price, self.config.risk_pct);
        if count == 0 {
            return None;
        }
        let hours = candidate
            .hours_left
            .map(|h| format!("{h:.1}h"))
            .unwrap_or_else(|| "?h".into());
        Some(Intent {
            ticker:      candidate.ticker.clone(),
            side:        candidate.signal_side,
            action:      Action::Buy,
            count,
            limit_price: self.config.limit_price,
            reason:      format!(
                "sniper T{} {} {}c/{}c, {hours} left",
                candidate.tier,
                candidate.signal_side.as_str().to_uppercase(),
                candidate.signal_price,
                candidate.signal_ask
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;
    use crate::scanner::ScanStats;
    use chrono::Utc;

    fn make_result(ticker: &str, tier: u8, hours: Option<f64>, price: i64, ask: i64, dollar: i64) -> ScanResult {
        ScanResult {
            ticker:        ticker.into(),
            event_ticker:  "EV".into(),
            title:         String::new(),
            signal_side:   Side::Yes,
            signal_price:  price,
            signal_ask:    ask,
            tier,
            volume:        0,
            volume_24h:    0,
            dollar_24h:    dollar,
            dollar_rank:   1,
            open_interest: 0,
            spread_pct:    1.0,
            close_time:    None,
            hours_left:    hours,
            qualified:     true,
        }
    }

    fn make_report(results: Vec<ScanResult>) -> ScanReport {
        ScanReport { results, stats: ScanStats::default(), scanned_at: Utc::now() }
    }

    #[test]
    fn ranks_by_tier_then_expiry_then_price() {
        let mut unqualified = make_result("UNQ", 1, Some(1.0), 97, 98, 1);
        unqualified.qualified = false;
        let report = make_report(vec![
            make_result("T2", 2, Some(0.5), 96, 97, 50_000),
            make_result("T1-LATE", 1, Some(10.0), 97, 98, 50_000),
            make_result("T1-SOON", 1, Some(2.0), 96, 98, 20_000),
            make_result("T1-SOON-RICH", 1, Some(2.0), 97, 98, 20_000),
            make_result("HELD", 1, Some(1.0), 97, 98, 90_000),
            make_result("EXPIRED", 1, Some(-1.0), 97, 98, 90_000),
            unqualified,
        ]);
        let held: HashSet<String> = ["HELD".to_string()].into_iter().collect();
        let strategy = SniperStrategy::new(SniperConfig::default());

        let ranked: Vec<_> = strategy
            .rank(&report, &held, &ScanParams::default())
            .into_iter()
            .map(|c| c.ticker)
            .collect();
        assert_eq!(ranked, vec!["T1-SOON-RICH", "T1-SOON", "T1-LATE", "T2"]);
    }

    #[test]
    fn drops_asks_above_limit() {
        let report = make_report(vec![make_result("A", 1, Some(1.0), 98, 99, 1)]);
        let strategy = SniperStrategy::new(SniperConfig::default());
        assert!(strategy.rank(&report, &HashSet::new(), &ScanParams::default()).is_empty());
    }

    #[test]
    fn intent_sizes_from_ask_and_uses_limit() {
        let strategy = SniperStrategy::new(SniperConfig::default());
        let c = make_result("A", 2, Some(3.0), 96, 97, 1);

        // $1,000 × 1% = 1000c / 97 = 10
        let intent = strategy.intent_for(&c, 100_000).unwrap();
        assert_eq!(intent.count, 10);
        assert_eq!(intent.limit_price, 98);
        assert_eq!(intent.side, Side::Yes);
        assert_eq!(intent.action, Action::Buy);
        assert!(intent.reason.contains("T2 YES 96c/97c"));

        assert!(strategy.intent_for(&c, 5_000).is_none());

        let no_ask = make_result("B", 3, None, 95, 0, 1);
        assert_eq!(strategy.intent_for(&no_ask, 100_000).unwrap().count, 10);
    }

    #[test]
    fn config_from_env_clamps() {
        let env = Env::from_pairs(&[
            ("SNIPER_MAX_POSITIONS", "500"),
            ("SNIPER_WITH_AI", "true"),
            ("SNIPER_RISK_PCT", "0.02"),
        ]);
        let cfg = SniperConfig::from_env(&env);
        assert_eq!(cfg.max_positions, 50);
        assert!(cfg.with_ai);
        assert_eq!(cfg.risk_pct, 0.02);
        assert_eq!(SniperConfig::from_env(&Env::from_pairs(&[])), SniperConfig::default());
    }
}
