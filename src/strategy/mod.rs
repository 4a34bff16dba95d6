//! # strategy — Strategy Engine
//!
//! | Module     | หน้าที่                                                   |
//! |------------|-----------------------------------------------------------|
//! | [`sniper`] | จัดอันดับ candidate จาก ScanReport + สร้าง Intent          |
//! | [`ai`]     | AI gate (Claude) — ถามก่อนยิงว่า outcome น่าจะเกิดจริงไหม |
//!
//! Strategy ไม่แตะ exchange เอง — คืน `Intent` ให้ Engine ส่งต่อ

pub mod ai;
pub mod sniper;

pub use ai::{AiConfig, AiGate, Analyst, Verdict};
pub use sniper::{SniperConfig, SniperStrategy};
