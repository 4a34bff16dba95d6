//! # scanner — หา market ที่ราคาฝั่งหนึ่งสูงมาก (≥ 95¢)
//!
//! ```text
//!  fetched ─▶ prefix ─▶ 24h volume ─▶ signal price ─┬─▶ results (เรียง price ↓, volume ↓)
//!                                                   │
//!                            tier ≥ 1 ─▶ top-N $vol ─▶ $vol ≥ min ─▶ spread ≤ max ─▶ expires ─▶ QUALIFIED
//! ```
//!
//! Pure function — ไม่ยิง network; Feed เป็นคนส่ง market เข้ามา

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Env;
use crate::models::{Market, Quote, Side};

// ─── Params ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ScanParams {
    /// bid ขั้นต่ำของฝั่ง signal (cents)
    pub min_price:          i64,
    /// volume 24h ขั้นต่ำ (contracts)
    pub min_volume:         i64,
    /// event ticker prefix — ว่าง = ทุก market
    pub prefixes:           Vec<String>,
    pub top_n:              usize,
    /// dollar volume 24h ขั้นต่ำ (dollars)
    pub min_dollar_volume:  i64,
    pub max_spread_pct:     f64,
    /// None = ไม่กรองวันหมดอายุ
    pub max_hours:          Option<f64>,
    pub cache_secs:         u64,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            min_price:         95,
            min_volume:        10_000,
            prefixes:          Vec::new(),
            top_n:             200,
            min_dollar_volume: 10_000,
            max_spread_pct:    5.0,
            max_hours:         Some(24.0),
            cache_secs:        30,
        }
    }
}

impl ScanParams {
    pub fn from_env(env: &Env) -> Self {
        let d = Self::default();
        // SNIPER_MAX_HOURS=0 หรือ "none" → ไม่จำกัด
        let max_hours = match env.get("SNIPER_MAX_HOURS") {
            None => d.max_hours,
            Some(v) => v.parse::<f64>().ok().filter(|h| *h > 0.0),
        };
        Self {
            min_price:         env.parse_or("SNIPER_MIN_PRICE", d.min_price).clamp(1, 99),
            min_volume:        env.parse_or("SNIPER_MIN_VOLUME", d.min_volume),
            prefixes:          env.list("SNIPER_PREFIXES"),
            top_n:             env.parse_or("SCAN_TOP_N", d.top_n),
            min_dollar_volume: env.parse_or("SCAN_MIN_DOLLAR_VOLUME", d.min_dollar_volume),
            max_spread_pct:    env.parse_or("SCAN_MAX_SPREAD_PCT", d.max_spread_pct),
            max_hours,
            cache_secs:        env.parse_or("SCAN_CACHE_SECS", d.cache_secs),
        }
    }
}

// ─── Results ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    pub ticker:        String,
    pub event_ticker:  String,
    pub title:         String,
    pub signal_side:   Side,
    /// bid ของฝั่ง signal
    pub signal_price:  i64,
    /// ask ของฝั่ง signal (0 = ไม่มี)
    pub signal_ask:    i64,
    pub tier:          u8,
    pub volume:        i64,
    pub volume_24h:    i64,
    /// volume_24h × bid / 100 (dollars)
    pub dollar_24h:    i64,
    pub dollar_rank:   usize,
    pub open_interest: i64,
    pub spread_pct:    f64,
    pub close_time:    Option<DateTime<Utc>>,
    pub hours_left:    Option<f64>,
    pub qualified:     bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub fetched:       usize,
    pub passed_prefix: usize,
    pub passed_volume: usize,
    pub passed_price:  usize,
    pub tier1:         usize,
    pub top_n:         usize,
    pub dollar_vol:    usize,
    pub spread:        usize,
    pub expires:       usize,
    pub qualified:     usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub results:    Vec<ScanResult>,
    pub stats:      ScanStats,
    pub scanned_at: DateTime<Utc>,
}

impl ScanReport {
    pub fn qualified(&self) -> impl Iterator<Item = &ScanResult> {
        self.results.iter().filter(|r| r.qualified)
    }
}

/// Tier จาก ask: 0 = ข้าม (≥ 99), 1 = 98, 2 = 96–97, 3 = ≤ 95
pub fn tier_for(ask: i64) -> u8 {
    match ask {
        a if a >= 99 => 0,
        98 => 1,
        96 | 97 => 2,
        _ => 3,
    }
}

/// Spread เป็น % ของ mid — 0 เมื่อ book ว่างหรือ crossed
pub fn spread_pct(bid: i64, ask: i64) -> f64 {
    if bid <= 0 || ask <= 0 || ask <= bid {
        return 0.0;
    }
    let mid = (bid + ask) as f64 / 2.0;
    (ask - bid) as f64 / mid * 100.0
}

// ─── Scan ─────────────────────────────────────────────────────────────────────

pub fn scan(markets: &[Market], params: &ScanParams, now: DateTime<Utc>) -> ScanReport {
    let mut stats = ScanStats { fetched: markets.len(), ..Default::default() };
    let prefixes: Vec<String> = params.prefixes.iter().map(|p| p.to_ascii_uppercase()).collect();

    let mut results = Vec::new();
    for m in markets {
        if !prefixes.is_empty() {
            let event = m.event_ticker.to_ascii_uppercase();
            if !prefixes.iter().any(|p| event.starts_with(p.as_str())) {
                continue;
            }
        }
        stats.passed_prefix += 1;

        if m.volume_24h < params.min_volume {
            continue;
        }
        stats.passed_volume += 1;

        let Some(quote) = Quote::from_market(m) else { continue };
        let side = if quote.yes_bid >= params.min_price {
            Side::Yes
        } else if quote.no_bid >= params.min_price {
            Side::No
        } else {
            continue;
        };
        stats.passed_price += 1;

        let bid = quote.bid(side);
        let ask = quote.ask(side);
        results.push(ScanResult {
            ticker:        m.ticker.clone(),
            event_ticker:  m.event_ticker.clone(),
            title:         m.title.clone(),
            signal_side:   side,
            signal_price:  bid,
            signal_ask:    ask,
            tier:          tier_for(ask),
            volume:        m.volume,
            volume_24h:    m.volume_24h,
            dollar_24h:    m.volume_24h * bid / 100,
            dollar_rank:   0,
            open_interest: m.open_interest,
            spread_pct:    spread_pct(bid, ask),
            close_time:    m.close_time,
            hours_left:    m.hours_left(now),
            qualified:     false,
        });
    }

    // dollar rank: 1 = dollar volume สูงสุด (เสมอกัน → ticker)
    let mut by_dollar: Vec<usize> = (0..results.len()).collect();
    by_dollar.sort_by(|&a, &b| {
        results[b].dollar_24h
            .cmp(&results[a].dollar_24h)
            .then_with(|| results[a].ticker.cmp(&results[b].ticker))
    });
    for (rank, idx) in by_dollar.into_iter().enumerate() {
        results[idx].dollar_rank = rank + 1;
    }

    for r in results.iter_mut() {
        if r.tier == 0 {
            continue;
        }
        stats.tier1 += 1;
        if r.dollar_rank > params.top_n {
            continue;
        }
        stats.top_n += 1;
        if r.dollar_24h < params.min_dollar_volume {
            continue;
        }
        stats.dollar_vol += 1;
        if r.spread_pct > params.max_spread_pct {
            continue;
        }
        stats.spread += 1;
        if let Some(max) = params.max_hours {
            match r.hours_left {
                Some(h) if h > 0.0 && h <= max => {}
                _ => continue,
            }
        }
        stats.expires += 1;
        r.qualified = true;
        stats.qualified += 1;
    }

    results.sort_by(|a, b| b.signal_price.cmp(&a.signal_price).then(b.volume.cmp(&a.volume)));
    ScanReport { results, stats, scanned_at: now }
}

// ─── Display Sort ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Tier,
    Price,
    Volume,
    Spread,
    Rank,
    Expiration,
    OpenInterest,
}

impl SortKey {
    pub fn label(&self) -> &'static str {
        match self {
            SortKey::Tier         => "Tier (best first)",
            SortKey::Price        => "Price (highest first)",
            SortKey::Volume       => "24h $ Volume (highest first)",
            SortKey::Spread       => "Spread (tightest first)",
            SortKey::Rank         => "Dollar Rank (top first)",
            SortKey::Expiration   => "Expiration (soonest first)",
            SortKey::OpenInterest => "Open Interest (highest first)",
        }
    }

    fn compare(&self, a: &ScanResult, b: &ScanResult) -> Ordering {
        let price_desc = b.signal_price.cmp(&a.signal_price);
        let dollar_desc = b.dollar_24h.cmp(&a.dollar_24h);
        match self {
            SortKey::Tier => a.tier.cmp(&b.tier).then(price_desc).then(dollar_desc),
            SortKey::Price => price_desc
                .then(dollar_desc)
                .then(a.spread_pct.total_cmp(&b.spread_pct)),
            SortKey::Volume => dollar_desc.then(price_desc),
            SortKey::Spread => a.spread_pct.total_cmp(&b.spread_pct).then(price_desc),
            SortKey::Rank => a.dollar_rank.cmp(&b.dollar_rank).then(price_desc),
            // ไม่มี close_time → ท้ายสุด
            SortKey::Expiration => match (a.close_time, b.close_time) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
            .then(price_desc),
            SortKey::OpenInterest => b.open_interest.cmp(&a.open_interest).then(price_desc),
        }
    }
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tier"                   => Ok(SortKey::Tier),
            "price"                  => Ok(SortKey::Price),
            "volume"                 => Ok(SortKey::Volume),
            "spread"                 => Ok(SortKey::Spread),
            "rank"                   => Ok(SortKey::Rank),
            "expiration"             => Ok(SortKey::Expiration),
            "open_int" | "open_interest" => Ok(SortKey::OpenInterest),
            other => Err(format!(
                "unknown sort '{other}' (tier|price|volume|spread|rank|expiration|open_int)"
            )),
        }
    }
}

/// เรียงสำหรับแสดงผล — `reverse` กลับลำดับทั้งหมด
pub fn sort_results(results: &mut [ScanResult], key: SortKey, reverse: bool) {
    results.sort_by(|a, b| {
        let ord = key.compare(a, b);
        if reverse { ord.reverse() } else { ord }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 28, 12, 0, 0).unwrap()
    }

    fn make_market(ticker: &str, yes_bid: i64, yes_ask: i64, vol24: i64, hours: i64) -> Market {
        Market {
            ticker:       ticker.into(),
            event_ticker: format!("EV-{ticker}"),
            status:       "open".into(),
            yes_bid,
            yes_ask,
            volume:       vol24 * 2,
            volume_24h:   vol24,
            close_time:   Some(now() + Duration::hours(hours)),
            ..Default::default()
        }
    }

    #[test]
    fn tiers_and_spread() {
        assert_eq!(tier_for(99), 0);
        assert_eq!(tier_for(100), 0);
        assert_eq!(tier_for(98), 1);
        assert_eq!(tier_for(97), 2);
        assert_eq!(tier_for(96), 2);
        assert_eq!(tier_for(95), 3);
        assert_eq!(spread_pct(96, 98), 2.0 / 97.0 * 100.0);
        assert_eq!(spread_pct(98, 96), 0.0);
        assert_eq!(spread_pct(0, 98), 0.0);
    }

    #[test]
    fn qualifies_liquid_tier_one_market() {
        let markets = vec![make_market("A", 97, 98, 20_000, 3)];
        let report = scan(&markets, &ScanParams::default(), now());
        let r = &report.results[0];
        assert_eq!(r.signal_side, Side::Yes);
        assert_eq!(r.tier, 1);
        assert_eq!(r.dollar_24h, 19_400);
        assert_eq!(r.dollar_rank, 1);
        assert_eq!(r.hours_left, Some(3.0));
        assert!(r.qualified);
        assert_eq!(report.stats.qualified, 1);
    }

    #[test]
    fn no_side_signal_from_inferred_prices() {
        // yes_bid 2 / yes_ask 3 → no_bid 97 / no_ask 98
        let markets = vec![make_market("N", 2, 3, 20_000, 5)];
        let report = scan(&markets, &ScanParams::default(), now());
        let r = &report.results[0];
        assert_eq!(r.signal_side, Side::No);
        assert_eq!(r.signal_price, 97);
        assert_eq!(r.signal_ask, 98);
        assert!(r.qualified);
    }

    #[test]
    fn funnel_counts_each_stage() {
        let mut params = ScanParams { prefixes: vec!["ev-".into()], ..Default::default() };
        params.top_n = 2;
        let mut off_prefix = make_market("X", 97, 98, 50_000, 3);
        off_prefix.event_ticker = "OTHER".into();
        let markets = vec![
            off_prefix,
            make_market("LOWVOL", 97, 98, 10, 3),
            make_market("CHEAP", 50, 52, 50_000, 3),
            make_market("SKIP99", 98, 99, 50_000, 3),
            make_market("BIG", 97, 98, 90_000, 3),
            make_market("LOWBID", 90, 98, 80_000, 3),
            make_market("MID", 96, 98, 40_000, 3),
            make_market("LATE", 97, 98, 30_000, 48),
        ];
        let report = scan(&markets, &params, now());
        let s = &report.stats;
        assert_eq!(s.fetched, 8);
        assert_eq!(s.passed_prefix, 7);
        assert_eq!(s.passed_volume, 6);
        assert_eq!(s.passed_price, 4); // SKIP99, BIG, MID, LATE
        assert_eq!(s.tier1, 3);        // ทิ้ง SKIP99
        assert_eq!(s.top_n, 1);        // rank: BIG 1, SKIP99 2, MID 3, LATE 4
        assert_eq!(s.qualified, 1);
        let qualified: Vec<_> = report.qualified().map(|r| r.ticker.as_str()).collect();
        assert_eq!(qualified, vec!["BIG"]);
    }

    #[test]
    fn expiry_window_and_unset_max_hours() {
        let markets = vec![make_market("LATE", 97, 98, 30_000, 48), make_market("PAST", 97, 98, 30_000, -1)];
        let report = scan(&markets, &ScanParams::default(), now());
        assert_eq!(report.stats.qualified, 0);

        let open = ScanParams { max_hours: None, ..Default::default() };
        assert_eq!(scan(&markets, &open, now()).stats.qualified, 2);
    }

    #[test]
    fn results_ordered_by_price_then_volume() {
        let markets = vec![
            make_market("A", 95, 96, 20_000, 3),
            make_market("B", 97, 98, 20_000, 3),
            make_market("C", 97, 98, 60_000, 3),
        ];
        let report = scan(&markets, &ScanParams::default(), now());
        let order: Vec<_> = report.results.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(order, vec!["C", "B", "A"]);
    }

    #[test]
    fn display_sorts() {
        let markets = vec![
            make_market("SOON", 95, 96, 20_000, 1),
            make_market("TIGHT", 97, 98, 20_000, 10),
            make_market("WIDE", 96, 99, 60_000, 5),
        ];
        let mut results = scan(&markets, &ScanParams::default(), now()).results;

        sort_results(&mut results, SortKey::Tier, false);
        assert_eq!(results[0].ticker, "WIDE");
        assert_eq!(results[1].ticker, "TIGHT");

        sort_results(&mut results, SortKey::Expiration, false);
        assert_eq!(results[0].ticker, "SOON");

        sort_results(&mut results, SortKey::Spread, false);
        assert_eq!(results[0].ticker, "SOON");
        assert_eq!(results[2].ticker, "WIDE");

        sort_results(&mut results, SortKey::Volume, true);
        assert_eq!(results[2].ticker, "WIDE");

        assert_eq!("open_int".parse::<SortKey>().unwrap(), SortKey::OpenInterest);
        assert!("bogus".parse::<SortKey>().is_err());
    }

    #[test]
    fn params_from_env() {
        let env = Env::from_pairs(&[
            ("SNIPER_MIN_PRICE", "150"),
            ("SNIPER_PREFIXES", "KXNBA,KXBTC"),
            ("SNIPER_MAX_HOURS", "none"),
            ("SCAN_TOP_N", "50"),
        ]);
        let p = ScanParams::from_env(&env);
        assert_eq!(p.min_price, 99);
        assert_eq!(p.prefixes, vec!["KXNBA", "KXBTC"]);
        assert_eq!(p.max_hours, None);
        assert_eq!(p.top_n, 50);
        assert_eq!(ScanParams::from_env(&Env::from_pairs(&[])), ScanParams::default());
    }
}
