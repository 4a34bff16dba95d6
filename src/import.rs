//! # import — Kalshi CSV trade export
//!
//! แปลงไฟล์ trade ที่ export จากหน้าเว็บ Kalshi เป็น [`TradeRecord`]
//!
//! Columns: `type, Market_Ticker, Market_Id, Original_Date, Price_In_Cents,
//! Amount_In_Dollars, Fee_In_Dollars, Traded_Time, Direction, Order_Type`
//!
//! - แถวที่ `type` ว่าง = แถวว่าง → ข้ามเงียบๆ
//! - แถวที่ไม่มี ticker หรือ direction อ่านไม่ออก → นับใน `skipped`
//! - ทุกแถวเป็น buy ที่ fill ครบ (export ไม่มี resting order)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Action, OrderStatus, Side, TradeRecord};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CsvRow {
    #[serde(rename = "type")]
    kind:          String,
    #[serde(rename = "Market_Ticker")]
    ticker:        String,
    #[serde(rename = "Market_Id")]
    market_id:     String,
    #[serde(rename = "Original_Date")]
    original_date: String,
    #[serde(rename = "Price_In_Cents")]
    price_cents:   String,
    /// จำนวนสัญญา (สัญญาละ $1 ตอน payout)
    #[serde(rename = "Amount_In_Dollars")]
    amount:        String,
    #[serde(rename = "Fee_In_Dollars")]
    fee_dollars:   String,
    #[serde(rename = "Direction")]
    direction:     String,
}

impl CsvRow {
    fn into_record(self) -> Option<TradeRecord> {
        if self.ticker.is_empty() {
            return None;
        }
        let side: Side = self.direction.parse().ok()?;
        let price = self.price_cents.parse::<f64>().ok()?.round() as i64;
        let count = self.amount.parse::<f64>().map_or(1, |a| a.max(1.0) as u32);
        let fees_cents = self.fee_dollars.parse::<f64>().map_or(0, |f| (f * 100.0).round() as i64);
        let created_at = DateTime::parse_from_rfc3339(&self.original_date)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Some(TradeRecord {
            order_id:        Uuid::new_v4(),
            exchange_id:     (!self.market_id.is_empty()).then_some(self.market_id),
            ticker:          self.ticker,
            side,
            action:          Action::Buy,
            count,
            price,
            status:          OrderStatus::Filled.to_string(),
            fill_count:      count,
            remaining_count: 0,
            fees_cents,
            error:           None,
            dry_run:         false,
            created_at,
        })
    }
}

#[derive(Debug, Default, Serialize)]
pub struct CsvImport {
    /// เรียงตามไฟล์ (ปกติเก่า → ใหม่)
    pub records: Vec<TradeRecord>,
    pub skipped: usize,
}

pub fn parse_kalshi_csv(content: &str) -> Result<CsvImport, ImportError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut out = CsvImport::default();
    for row in reader.deserialize::<CsvRow>() {
        let row = row?;
        if row.kind.is_empty() {
            continue;
        }
        match row.into_record() {
            Some(record) => out.records.push(record),
            None => out.skipped += 1,
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = "\u{feff}type,Market_Ticker,Market_Id,Original_Date,Price_In_Cents,Amount_In_Dollars,Fee_In_Dollars,Traded_Time,Direction,Order_Type
Trade,KXHIGHNY-26JAN29-B40,m-1,2026-01-29T22:46:06.724Z,97,10,0.02,2026-01-29T22:46:07Z,No,limit
,,,,,,,,,
Trade,,m-2,2026-01-29T22:50:00Z,50,1,0,,yes,limit
Trade,KXBTC-26JAN29-B100000,m-3,garbage,98.4,0.4,0,,YES,market
Trade,KXETH-26JAN29-B3000,m-4,2026-01-30T01:00:00Z,60,2,0,,sideways,limit
";

    #[test]
    fn parses_kalshi_export() {
        let parsed = parse_kalshi_csv(EXPORT).unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.skipped, 2);

        let first = &parsed.records[0];
        assert_eq!(first.ticker, "KXHIGHNY-26JAN29-B40");
        assert_eq!(first.side, Side::No);
        assert_eq!(first.action, Action::Buy);
        assert_eq!((first.count, first.fill_count, first.price), (10, 10, 97));
        assert_eq!(first.fees_cents, 2);
        assert_eq!(first.exchange_id.as_deref(), Some("m-1"));
        assert_eq!(first.created_at.to_rfc3339(), "2026-01-29T22:46:06.724+00:00");
        assert_eq!(first.status, "filled");

        // amount < 1 → อย่างน้อย 1 สัญญา, ราคาปัดเป็น cents
        let second = &parsed.records[1];
        assert_eq!((second.count, second.price, second.side), (1, 98, Side::Yes));
    }

    #[test]
    fn empty_input_is_empty_import() {
        let parsed = parse_kalshi_csv("").unwrap();
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.skipped, 0);
    }
}
