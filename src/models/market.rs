//! # models::market
//!
//! Market wire shape จาก Kalshi + Quote (normalized tick) ที่ Engine ใช้จริง
//!
//! ราคาทั้งหมดเป็น **cents** (1–99). 0 = ไม่มีราคาฝั่งนั้น

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ─── Side / Action ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "yes",
            Side::No  => "no",
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Yes => Side::No,
            Side::No  => Side::Yes,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(Side::Yes),
            "no"  => Ok(Side::No),
            other => Err(format!("invalid side '{other}' (expected yes|no)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy  => "buy",
            Action::Sell => "sell",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy"  => Ok(Action::Buy),
            "sell" => Ok(Action::Sell),
            other  => Err(format!("invalid action '{other}' (expected buy|sell)")),
        }
    }
}

// ─── Market (wire) ────────────────────────────────────────────────────────────

/// Market ตามที่ `/markets` คืนมา — field ที่ไม่มี (หรือเป็น `null`) จะเป็น default
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Market {
    #[serde(deserialize_with = "null_as_default")]
    pub ticker:          String,
    #[serde(deserialize_with = "null_as_default")]
    pub event_ticker:    String,
    #[serde(deserialize_with = "null_as_default")]
    pub title:           String,
    #[serde(deserialize_with = "null_as_default")]
    pub status:          String,
    #[serde(deserialize_with = "null_as_default")]
    pub yes_bid:         i64,
    #[serde(deserialize_with = "null_as_default")]
    pub yes_ask:         i64,
    #[serde(deserialize_with = "null_as_default")]
    pub no_bid:          i64,
    #[serde(deserialize_with = "null_as_default")]
    pub no_ask:          i64,
    #[serde(deserialize_with = "null_as_default")]
    pub last_price:      i64,
    #[serde(deserialize_with = "null_as_default")]
    pub volume:          i64,
    #[serde(deserialize_with = "null_as_default")]
    pub volume_24h:      i64,
    #[serde(deserialize_with = "null_as_default")]
    pub open_interest:   i64,
    pub close_time:      Option<DateTime<Utc>>,
    /// "yes" | "no" | "" (ยังไม่ settle)
    #[serde(deserialize_with = "null_as_default")]
    pub result:          String,
}

/// `null` → `T::default()` — Kalshi ส่ง `null` แทนการไม่ใส่ key ในบาง market
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Market {
    pub fn has_prices(&self) -> bool {
        self.yes_bid > 0 || self.yes_ask > 0 || self.no_bid > 0 || self.no_ask > 0
    }

    /// ผลที่ settle แล้ว (ถ้ามี)
    pub fn settled_side(&self) -> Option<Side> {
        match self.result.as_str() {
            "yes" => Some(Side::Yes),
            "no"  => Some(Side::No),
            _     => None,
        }
    }

    pub fn hours_left(&self, now: DateTime<Utc>) -> Option<f64> {
        self.close_time
            .map(|t| t.signed_duration_since(now).num_seconds() as f64 / 3600.0)
    }
}

// ─── Quote (normalized tick) ──────────────────────────────────────────────────

/// Best bid/ask ทั้ง 2 ฝั่ง หลังเติมราคาที่หายไปจากฝั่งตรงข้าม
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub yes_bid:    i64,
    pub yes_ask:    i64,
    pub no_bid:     i64,
    pub no_ask:     i64,
    pub last_price: i64,
}

impl Quote {
    /// YES bid @ p ⇔ NO ask @ (100 − p) — เติมราคาที่ exchange ไม่ได้ส่งมา
    ///
    /// คืน `None` ถ้า market ไม่มีราคาเลย
    pub fn from_market(m: &Market) -> Option<Quote> {
        if !m.has_prices() {
            return None;
        }
        let mut q = Quote {
            yes_bid:    m.yes_bid,
            yes_ask:    m.yes_ask,
            no_bid:     m.no_bid,
            no_ask:     m.no_ask,
            last_price: m.last_price,
        };
        if q.no_ask == 0 && q.yes_bid > 0 {
            q.no_ask = 100 - q.yes_bid;
        }
        if q.yes_ask == 0 && q.no_bid > 0 {
            q.yes_ask = 100 - q.no_bid;
        }
        if q.no_bid == 0 && q.yes_ask > 0 && q.yes_ask < 100 {
            q.no_bid = 100 - q.yes_ask;
        }
        if q.yes_bid == 0 && q.no_ask > 0 && q.no_ask < 100 {
            q.yes_bid = 100 - q.no_ask;
        }
        Some(q)
    }

    pub fn bid(&self, side: Side) -> i64 {
        match side {
            Side::Yes => self.yes_bid,
            Side::No  => self.no_bid,
        }
    }

    pub fn ask(&self, side: Side) -> i64 {
        match side {
            Side::Yes => self.yes_ask,
            Side::No  => self.no_ask,
        }
    }
}

// ─── Orderbook ────────────────────────────────────────────────────────────────

/// Resting bids ต่อฝั่ง — `[price, quantity]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Orderbook {
    pub yes: Option<Vec<[i64; 2]>>,
    pub no:  Option<Vec<[i64; 2]>>,
}

impl Orderbook {
    /// ระดับราคาที่ดีที่สุด (ราคาสูงสุด) — exchange ส่งมาเรียงจากต่ำไปสูง
    pub fn best_bid(&self, side: Side) -> Option<(i64, i64)> {
        let levels = match side {
            Side::Yes => self.yes.as_deref(),
            Side::No  => self.no.as_deref(),
        }?;
        levels
            .iter()
            .filter(|l| l[1] > 0)
            .max_by_key(|l| l[0])
            .map(|l| (l[0], l[1]))
    }
}

// ─── Balance ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Balance {
    /// Cash ที่ใช้ได้ (cents)
    pub balance:         i64,
    /// มูลค่า position ทั้งหมด (cents)
    pub portfolio_value: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_market(yes_bid: i64, yes_ask: i64, no_bid: i64, no_ask: i64) -> Market {
        Market {
            ticker: "KXTEST-26JAN29-T1".into(),
            yes_bid,
            yes_ask,
            no_bid,
            no_ask,
            ..Default::default()
        }
    }

    #[test]
    fn quote_infers_missing_sides() {
        let q = Quote::from_market(&make_market(96, 0, 0, 0)).unwrap();
        assert_eq!(q.no_ask, 4);
        assert_eq!(q.yes_ask, 0);

        let q = Quote::from_market(&make_market(0, 0, 3, 0)).unwrap();
        assert_eq!(q.yes_ask, 97);
        assert_eq!(q.no_bid, 3);
        assert_eq!(q.yes_bid, 0);
    }

    #[test]
    fn quote_keeps_reported_prices() {
        let q = Quote::from_market(&make_market(40, 45, 55, 60)).unwrap();
        assert_eq!((q.yes_bid, q.yes_ask, q.no_bid, q.no_ask), (40, 45, 55, 60));
    }

    #[test]
    fn no_quote_without_prices() {
        assert!(Quote::from_market(&make_market(0, 0, 0, 0)).is_none());
    }

    #[test]
    fn market_deserializes_with_missing_fields() {
        let m: Market = serde_json::from_str(
            r#"{"ticker":"ABC","yes_bid":12,"close_time":"2026-01-29T17:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(m.ticker, "ABC");
        assert_eq!(m.yes_bid, 12);
        assert_eq!(m.no_ask, 0);
        assert!(m.close_time.is_some());
        assert_eq!(m.settled_side(), None);
    }

    #[test]
    fn market_treats_explicit_nulls_as_defaults() {
        let m: Market = serde_json::from_str(
            r#"{"ticker":"X","status":"active","result":null,"yes_ask":null,"no_bid":null,
                "volume_24h":null,"title":null,"yes_bid":40}"#,
        )
        .unwrap();
        assert_eq!(m.result, "");
        assert_eq!((m.yes_bid, m.yes_ask, m.no_bid, m.volume_24h), (40, 0, 0, 0));
        assert_eq!(m.settled_side(), None);

        // page เดียวที่มี null ต้องไม่ทำให้ทั้ง page พัง
        let page: Vec<Market> = serde_json::from_str(
            r#"[{"ticker":"A","result":null},{"ticker":"B","status":null,"yes_bid":97}]"#,
        )
        .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[1].yes_bid, 97);
    }

    #[test]
    fn orderbook_best_bid_is_highest_level() {
        let ob = Orderbook {
            yes: Some(vec![[40, 10], [45, 3], [44, 0]]),
            no:  None,
        };
        assert_eq!(ob.best_bid(Side::Yes), Some((45, 3)));
        assert_eq!(ob.best_bid(Side::No), None);
    }

    #[test]
    fn side_parses_case_insensitively() {
        assert_eq!("YES".parse::<Side>().unwrap(), Side::Yes);
        assert!("maybe".parse::<Side>().is_err());
        assert_eq!(Side::No.opposite(), Side::Yes);
    }
}
