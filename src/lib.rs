//! # kalshi_bot
//!
//! Automated trading bot สำหรับ Kalshi prediction markets
//!
//! ```text
//!  ┌────────────┐  refresh   ┌──────────┐  scan   ┌──────────┐  Intent  ┌──────────┐
//!  │ Kalshi API │ ─────────▶ │   feed   │ ──────▶ │ scanner  │ ───────▶ │ executor │
//!  └────────────┘            └──────────┘         │ + sniper │          └────┬─────┘
//!        ▲                                        └──────────┘               │
//!        │            create / cancel / get order (หรือ PaperExchange)        │
//!        └───────────────────────────────────────────────────────────────────┘
//!                                                                            │
//!                                    ledger / risk ◀──────────────────────────┘
//!                                         │
//!                        HTTP status API + /ws/monitor
//! ```

pub mod arbitrage;
pub mod auth;
pub mod cli;
pub mod config;
#[cfg(feature = "postgres")]
pub mod db;
pub mod engine;
pub mod error;
pub mod events;
pub mod exchange;
pub mod feed;
pub mod fees;
pub mod import;
pub mod ledger;
pub mod models;
pub mod risk;
pub mod routes;
pub mod scanner;
pub mod sizing;
pub mod state;
pub mod strategy;
pub mod ticker;
