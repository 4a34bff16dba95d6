//! # exchange — Kalshi Trade API
//!
//! [`Exchange`] คือ seam ระหว่าง Engine กับโลกภายนอก
//!
//! | Impl              | ใช้เมื่อ                                              |
//! |-------------------|-------------------------------------------------------|
//! | [`KalshiClient`]  | ยิง REST จริง (`/trade-api/v2`)                       |
//! | [`PaperExchange`] | dry-run — market data จริง, fill จำลองจาก ask/bid    |

pub mod client;
pub mod paper;
pub mod signer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Action, Balance, Market, Order, OrderAck, Orderbook, Side};

pub use client::KalshiClient;
pub use paper::PaperExchange;
pub use signer::RequestSigner;

/// page size สูงสุดที่ `/markets` รับ
pub const MARKETS_PAGE_LIMIT: u32 = 1000;
/// กัน cursor วนซ้ำไม่รู้จบ
pub(crate) const MAX_PAGES: usize = 500;

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("request signing failed: {0}")]
    Signing(String),

    #[error("{0} requires KALSHI_API_KEY_ID and KALSHI_PRIVATE_KEY")]
    NotAuthenticated(&'static str),

    #[error("rejected: {0}")]
    Rejected(String),
}

impl ExchangeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ExchangeError::Status { status: 404, .. })
    }
}

// ─── Wire Types ───────────────────────────────────────────────────────────────

/// `/portfolio/positions` → `market_positions[]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangePosition {
    pub ticker:          String,
    /// > 0 = YES, < 0 = NO
    pub position:        i64,
    /// ต้นทุนของ position ปัจจุบัน (cents)
    pub market_exposure: i64,
    pub realized_pnl:    i64,
    pub fees_paid:       i64,
    pub total_traded:    i64,
}

impl ExchangePosition {
    pub fn side(&self) -> Option<Side> {
        match self.position {
            p if p > 0 => Some(Side::Yes),
            p if p < 0 => Some(Side::No),
            _ => None,
        }
    }

    /// ราคาเฉลี่ยที่จ่ายต่อสัญญา (cents)
    pub fn average_price(&self) -> Option<f64> {
        (self.position != 0).then(|| self.market_exposure as f64 / self.position.abs() as f64)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarketPage {
    pub markets: Vec<Market>,
    pub cursor:  Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

/// Body ของ `POST /portfolio/orders`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateOrderRequest {
    pub ticker:          String,
    pub client_order_id: String,
    pub side:            Side,
    pub action:          Action,
    pub count:           u32,
    #[serde(rename = "type")]
    pub order_type:      OrderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yes_price:       Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_price:        Option<i64>,
}

impl CreateOrderRequest {
    /// Limit order — ราคาใส่ใน `yes_price` หรือ `no_price` ตามฝั่ง
    pub fn limit(order: &Order) -> Self {
        let (yes_price, no_price) = match order.side {
            Side::Yes => (Some(order.limit_price), None),
            Side::No  => (None, Some(order.limit_price)),
        };
        Self {
            ticker:          order.ticker.clone(),
            client_order_id: order.id.to_string(),
            side:            order.side,
            action:          order.action,
            count:           order.count,
            order_type:      OrderType::Limit,
            yes_price,
            no_price,
        }
    }

    pub fn market(order: &Order) -> Self {
        Self {
            order_type: OrderType::Market,
            yes_price:  None,
            no_price:   None,
            ..Self::limit(order)
        }
    }

    /// ราคาที่ใส่มาสำหรับฝั่งของ order
    pub fn price(&self) -> Option<i64> {
        match self.side {
            Side::Yes => self.yes_price,
            Side::No  => self.no_price,
        }
    }
}

// ─── Trait ────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait Exchange: Send + Sync {
    /// "kalshi" | "paper"
    fn name(&self) -> &'static str;

    fn is_paper(&self) -> bool {
        false
    }

    async fn balance(&self) -> Result<Balance, ExchangeError>;

    async fn markets_page(
        &self,
        status: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<MarketPage, ExchangeError>;

    /// ดึงทุก market ด้วย cursor pagination
    async fn all_markets(&self, status: &str) -> Result<Vec<Market>, ExchangeError> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let page = self.markets_page(status, MARKETS_PAGE_LIMIT, cursor.as_deref()).await?;
            let empty = page.markets.is_empty();
            all.extend(page.markets);
            cursor = page.cursor.filter(|c| !c.is_empty());
            if cursor.is_none() || empty {
                break;
            }
        }
        Ok(all)
    }

    async fn market(&self, ticker: &str) -> Result<Market, ExchangeError>;

    async fn orderbook(&self, ticker: &str, depth: u32) -> Result<Orderbook, ExchangeError>;

    async fn positions(&self) -> Result<Vec<ExchangePosition>, ExchangeError>;

    async fn create_order(&self, request: &CreateOrderRequest) -> Result<OrderAck, ExchangeError>;

    async fn cancel_order(&self, order_id: &str) -> Result<OrderAck, ExchangeError>;

    async fn get_order(&self, order_id: &str) -> Result<OrderAck, ExchangeError>;
}

// ─── Test Double ──────────────────────────────────────────────────────────────
