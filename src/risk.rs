//! # risk — Risk Management Engine
//!
//! ด่านสุดท้ายก่อน Order ออกจากระบบ เช็คตามลำดับ:
//!
//! | # | Guard            | Round | Trade | Block                                |
//! |---|------------------|:-----:|:-----:|--------------------------------------|
//! | 1 | Kill switch      |   ✔   |   ✔   | manual / auto-kill                   |
//! | 2 | Cooldown         |       |   ✔   | พักหลัง execution failure            |
//! | 3 | Daily trade cap  |       |   ✔   | นับเฉพาะ trade ที่ approve (UTC day) |
//! | 4 | Auto-kill        |       |   ✔   | fail ติดกัน N ครั้ง → kill switch    |
//! | 5 | Daily loss       |   ✔   |   ✔   | realized loss วันนี้ ≥ balance × pct |
//! | 6 | Max positions    |   ✔   |   ✔   | position ที่เปิดพร้อมกัน             |

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::Env;

// ─── Config ───────────────────────────────────────────────────────────────────

/// ค่า 0 ในทุก field = ปิด guard นั้น
#[derive(Debug, Clone, Serialize)]
pub struct RiskConfig {
    pub daily_trade_cap: u32,
    pub auto_kill_after: u32,
    pub cooldown_secs:   u64,
    /// สัดส่วนของ balance ที่ยอมขาดทุนต่อวัน
    pub daily_loss_pct:  f64,
}

impl RiskConfig {
    pub fn from_env(env: &Env) -> Self {
        Self {
            daily_trade_cap: env.parse_or("RISK_MAX_TRADES_PER_DAY", 50),
            auto_kill_after: env.parse_or("RISK_MAX_CONSECUTIVE_FAILS", 3),
            cooldown_secs:   env.parse_or("RISK_COOLDOWN_SECS", 300),
            daily_loss_pct:  env.parse_or("RISK_DAILY_LOSS_PCT", 0.05),
        }
    }

    fn daily_loss_limit(&self, balance_cents: i64) -> Option<i64> {
        (self.daily_loss_pct > 0.0 && balance_cents > 0)
            .then(|| (balance_cents as f64 * self.daily_loss_pct).round() as i64)
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self::from_env(&Env::from_pairs(&[]))
    }
}

/// ภาพของพอร์ตจาก Ledger ณ ตอนเช็ค
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskContext {
    pub balance_cents:    i64,
    pub today_loss_cents: i64,
    pub open_positions:   usize,
    /// 0 = ไม่จำกัด
    pub max_positions:    usize,
}

// ─── Decision ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Approved,
    Blocked(BlockReason),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum BlockReason {
    Killed(String),
    /// วินาทีที่เหลือ
    Cooldown(i64),
    DailyTradeLimit(u32),
    DailyLoss { loss_cents: i64, limit_cents: i64 },
    MaxPositions(usize),
}

impl BlockReason {
    /// true = Engine ต้องจบ loop, false = แค่ข้าม round/candidate นี้
    pub fn stops_engine(&self) -> bool {
        matches!(self, BlockReason::Killed(_) | BlockReason::DailyLoss { .. })
    }

    pub fn code(&self) -> &'static str {
        match self {
            BlockReason::Killed(_)          => "killed",
            BlockReason::Cooldown(_)        => "cooldown",
            BlockReason::DailyTradeLimit(_) => "daily_trade_limit",
            BlockReason::DailyLoss { .. }   => "daily_loss",
            BlockReason::MaxPositions(_)    => "max_positions",
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::Killed(why) => write!(f, "Kill switch active: {why}"),
            BlockReason::Cooldown(secs) => write!(f, "Cooldown: {secs}s remaining after last failure"),
            BlockReason::DailyTradeLimit(cap) => write!(f, "Daily trade limit reached: {cap}/{cap}"),
            BlockReason::DailyLoss { loss_cents, limit_cents } => write!(
                f,
                "Daily loss limit: ${:.2} >= ${:.2}",
                *loss_cents as f64 / 100.0,
                *limit_cents as f64 / 100.0
            ),
            BlockReason::MaxPositions(max) => write!(f, "Max positions reached: {max}"),
        }
    }
}

// ─── Guard State ──────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Guards {
    kill:           Option<String>,
    day:            NaiveDate,
    approved_today: u32,
    fail_streak:    u32,
    last_failure:   Option<DateTime<Utc>>,
    last_approval:  Option<DateTime<Utc>>,
}

impl Guards {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            kill:           None,
            day:            now.date_naive(),
            approved_today: 0,
            fail_streak:    0,
            last_failure:   None,
            last_approval:  None,
        }
    }

    /// ข้ามวัน (UTC) → ล้างตัวนับรายวัน
    fn roll(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today > self.day {
            debug!(from = %self.day, to = %today, "📅 Risk day rolled over");
            self.day = today;
            self.approved_today = 0;
        }
    }

    fn killed(&self) -> Option<BlockReason> {
        self.kill.clone().map(BlockReason::Killed)
    }

    fn cooldown_until(&self, cfg: &RiskConfig) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(cfg.cooldown_secs).unwrap_or(i64::MAX / 1000);
        self.last_failure.map(|t| t + Duration::seconds(secs))
    }
}

fn portfolio_block(cfg: &RiskConfig, ctx: &RiskContext) -> Option<BlockReason> {
    if let Some(limit) = cfg.daily_loss_limit(ctx.balance_cents) {
        if ctx.today_loss_cents >= limit {
            return Some(BlockReason::DailyLoss { loss_cents: ctx.today_loss_cents, limit_cents: limit });
        }
    }
    (ctx.max_positions > 0 && ctx.open_positions >= ctx.max_positions)
        .then_some(BlockReason::MaxPositions(ctx.max_positions))
}

// ─── Status ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct RiskStatus {
    pub is_killed:            bool,
    pub kill_reason:          Option<String>,
    pub trades_today:         u32,
    pub consecutive_failures: u32,
    pub last_trade_at:        Option<DateTime<Utc>>,
    pub in_cooldown:          bool,
    pub cooldown_ends_at:     Option<DateTime<Utc>>,
    pub limits:               RiskConfig,
}

// ─── Risk Manager ─────────────────────────────────────────────────────────────

pub struct RiskManager {
    config: RiskConfig,
    guards: Arc<RwLock<Guards>>,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self { config, guards: Arc::new(RwLock::new(Guards::fresh(Utc::now()))) }
    }

    /// ก่อนเริ่ม scan — guard 1, 5, 6 ไม่นับ trade
    pub async fn pre_round_check(&self, ctx: &RiskContext) -> RiskDecision {
        let mut g = self.guards.write().await;
        g.roll(Utc::now());

        match g.killed().or_else(|| portfolio_block(&self.config, ctx)) {
            Some(reason) => RiskDecision::Blocked(reason),
            None => RiskDecision::Approved,
        }
    }

    /// ก่อนส่ง Order ทุกครั้ง — ครบ 6 guard, approve แล้วนับเป็น trade ของวัน
    pub async fn pre_trade_check(&self, ctx: &RiskContext) -> RiskDecision {
        let now = Utc::now();
        let mut g = self.guards.write().await;
        g.roll(now);

        if let Some(reason) = g.killed() {
            return RiskDecision::Blocked(reason);
        }

        if let Some(until) = g.cooldown_until(&self.config).filter(|until| now < *until) {
            return RiskDecision::Blocked(BlockReason::Cooldown((until - now).num_seconds()));
        }

        let cap = self.config.daily_trade_cap;
        if cap > 0 && g.approved_today >= cap {
            return RiskDecision::Blocked(BlockReason::DailyTradeLimit(cap));
        }

        let streak_limit = self.config.auto_kill_after;
        if streak_limit > 0 && g.fail_streak >= streak_limit {
            let why = format!("Auto-kill: {} consecutive execution failures", g.fail_streak);
            warn!(streak = g.fail_streak, "⛔ Risk auto-kill: {why}");
            g.kill = Some(why.clone());
            return RiskDecision::Blocked(BlockReason::Killed(why));
        }

        if let Some(reason) = portfolio_block(&self.config, ctx) {
            return RiskDecision::Blocked(reason);
        }

        g.approved_today += 1;
        g.last_approval = Some(now);
        info!(
            today = g.approved_today,
            cap,
            open  = ctx.open_positions,
            "✅ Risk approved"
        );
        RiskDecision::Approved
    }

    // ── Execution feedback ────────────────────────────────────────────────────

    pub async fn record_success(&self) {
        let mut g = self.guards.write().await;
        if g.fail_streak > 0 {
            debug!(was = g.fail_streak, "Risk: failure streak cleared");
        }
        g.fail_streak = 0;
    }

    pub async fn record_failure(&self) {
        let mut g = self.guards.write().await;
        g.fail_streak += 1;
        g.last_failure = Some(Utc::now());
        warn!(
            streak = g.fail_streak,
            limit  = self.config.auto_kill_after,
            "⚠️ Risk: execution failure"
        );
    }

    // ── Kill switch ───────────────────────────────────────────────────────────

    pub async fn kill(&self, reason: &str) {
        self.guards.write().await.kill = Some(reason.to_string());
        warn!(reason, "⛔ Kill switch ON");
    }

    /// ปลด kill switch + ล้าง failure streak / cooldown
    pub async fn rearm(&self) {
        let mut g = self.guards.write().await;
        g.kill = None;
        g.fail_streak = 0;
        g.last_failure = None;
        info!("✅ Kill switch OFF — trading re-armed");
    }

    pub async fn is_killed(&self) -> bool {
        self.guards.read().await.kill.is_some()
    }

    pub async fn status(&self) -> RiskStatus {
        let now = Utc::now();
        let g = self.guards.read().await;
        let cooldown_ends_at = g.cooldown_until(&self.config).filter(|until| now < *until);

        RiskStatus {
            is_killed:            g.kill.is_some(),
            kill_reason:          g.kill.clone(),
            trades_today:         g.approved_today,
            consecutive_failures: g.fail_streak,
            last_trade_at:        g.last_approval,
            in_cooldown:          cooldown_ends_at.is_some(),
            cooldown_ends_at,
            limits:               self.config.clone(),
        }
    }
}
