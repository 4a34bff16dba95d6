//! # feed — Market Data Feed
//!
//! ดึง market ที่เปิดอยู่ทั้งหมดจาก exchange แล้วเขียนลง [`MarketBook`]
//!
//! - Feed เป็นผู้เขียน book เพียงคนเดียว — คนอื่นอ่านผ่าน `RwLock::read`
//! - หลัง insert แล้ว field ประจำตัว (ticker, event, title, close_time) ไม่เปลี่ยน
//! - ผล `refresh()` ถูก cache ไว้ `cache_ttl` เพื่อไม่ให้ยิง 500 หน้าทุก round
//! - snapshot เต็มจาก `refresh()` คือรายการ market ที่เปิดอยู่จริง: ticker ที่หายไป
//!   ถูกลบออกจาก book ยกเว้น ticker ที่ `refresh_tickers` ติดตามอยู่ (ถูก mark `closed`)

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::exchange::{Exchange, ExchangeError};
use crate::models::{Market, Quote};

// ─── Market Book ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MarketBook {
    markets: HashMap<String, Market>,
}

impl MarketBook {
    /// รวม snapshot ใหม่เข้า book — แก้เฉพาะราคา/volume/status/result
    pub fn apply(&mut self, markets: Vec<Market>) {
        for incoming in markets {
            match self.markets.get_mut(&incoming.ticker) {
                Some(known) => {
                    known.yes_bid       = incoming.yes_bid;
                    known.yes_ask       = incoming.yes_ask;
                    known.no_bid        = incoming.no_bid;
                    known.no_ask        = incoming.no_ask;
                    known.last_price    = incoming.last_price;
                    known.volume        = incoming.volume;
                    known.volume_24h    = incoming.volume_24h;
                    known.open_interest = incoming.open_interest;
                    known.status        = incoming.status;
                    known.result        = incoming.result;
                }
                None => {
                    self.markets.insert(incoming.ticker.clone(), incoming);
                }
            }
        }
    }

    /// แทนที่ชุด market ที่เปิดด้วย snapshot เต็ม
    ///
    /// ticker ที่ไม่อยู่ใน snapshot → ลบทิ้ง, ถ้าอยู่ใน `tracked` → เก็บไว้แต่ mark `closed`
    /// (ผลจริงจะมาจาก `refresh_tickers` รอบถัดไป). คืนจำนวน market ที่ถูกถอด
    pub fn replace_open(&mut self, markets: Vec<Market>, tracked: &HashSet<String>) -> usize {
        let listed: HashSet<String> = markets.iter().map(|m| m.ticker.clone()).collect();
        let mut delisted = 0;
        self.markets.retain(|ticker, m| {
            if listed.contains(ticker) {
                return true;
            }
            if !tracked.contains(ticker) {
                delisted += 1;
                return false;
            }
            if is_open(m) {
                m.status = "closed".into();
                delisted += 1;
            }
            true
        });
        self.apply(markets);
        delisted
    }

    pub fn get(&self, ticker: &str) -> Option<&Market> {
        self.markets.get(ticker)
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    /// Market ที่ยังเปิดอยู่
    pub fn open_markets(&self) -> Vec<Market> {
        self.markets
            .values()
            .filter(|m| is_open(m))
            .cloned()
            .collect()
    }

    /// Normalized tick ของทุก market ที่มีราคา
    pub fn quotes(&self) -> Vec<(String, Quote)> {
        self.markets
            .values()
            .filter_map(|m| Quote::from_market(m).map(|q| (m.ticker.clone(), q)))
            .collect()
    }
}

/// status ว่าง = ไม่รู้ → นับว่าเปิด
fn is_open(m: &Market) -> bool {
    m.status.is_empty() || m.status == "open" || m.status == "active"
}

// ─── Feed ─────────────────────────────────────────────────────────────────────

pub struct MarketFeed {
    exchange:     Arc<dyn Exchange>,
    book:         Arc<RwLock<MarketBook>>,
    cache_ttl:    Duration,
    last_refresh: Mutex<Option<Instant>>,
    /// ticker ที่ `refresh_tickers` ดูแล (position ที่ถือ) — ไม่ถูกลบตอน delist
    tracked:      Mutex<HashSet<String>>,
}

impl MarketFeed {
    pub fn new(exchange: Arc<dyn Exchange>, book: Arc<RwLock<MarketBook>>, cache_ttl: Duration) -> Self {
        Self {
            exchange,
            book,
            cache_ttl,
            last_refresh: Mutex::new(None),
            tracked:      Mutex::new(HashSet::new()),
        }
    }

    pub fn book(&self) -> Arc<RwLock<MarketBook>> {
        self.book.clone()
    }

    /// ดึง market ที่เปิดทั้งหมด (หรือใช้ cache ถ้ายังไม่หมดอายุและไม่ `force`)
    pub async fn refresh(&self, force: bool) -> Result<Vec<Market>, ExchangeError> {
        let mut last = self.last_refresh.lock().await;
        let fresh = last.map_or(false, |t| t.elapsed() < self.cache_ttl);
        if fresh && !force {
            debug!("📦 Market cache hit");
            return Ok(self.book.read().await.open_markets());
        }

        let started = Instant::now();
        let markets = self.exchange.all_markets("open").await?;
        let fetched = markets.len();

        let tracked = self.tracked.lock().await.clone();
        let mut book = self.book.write().await;
        let delisted = book.replace_open(markets, &tracked);
        *last = Some(Instant::now());

        info!(
            fetched,
            delisted,
            book_size = book.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "📡 Markets refreshed"
        );
        Ok(book.open_markets())
    }

    /// อัปเดต market ทีละตัว (ใช้กับ ticker ที่ถืออยู่ — รวม market ที่ปิด/settle แล้ว)
    pub async fn refresh_tickers(&self, tickers: &[String]) -> Vec<Market> {
        *self.tracked.lock().await = tickers.iter().cloned().collect();
        let mut updated = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            match self.exchange.market(ticker).await {
                Ok(m) => updated.push(m),
                Err(e) => warn!(ticker = %ticker, error = %e, "⚠️ Market refresh failed"),
            }
        }
        self.book.write().await.apply(updated.clone());
        updated
    }
}
