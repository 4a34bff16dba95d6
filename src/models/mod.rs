//! # models
//!
//! Domain types ที่ทุก module ใช้ร่วมกัน

pub mod market;
pub mod order;
pub mod position;

pub use market::{Action, Balance, Market, Orderbook, Quote, Side};
pub use order::{Intent, Order, OrderAck, OrderStatus};
pub use position::{ClosedPosition, Fill, FillSource, Position, TradeRecord};
