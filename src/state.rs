//! # state
//!
//! AppState — ทุกอย่างที่ Engine, HTTP handlers และ WebSocket ใช้ร่วมกัน
//!
//! - `exchange` = Kalshi จริง (market data + live orders)
//! - `paper`    = PaperExchange ครอบ `exchange` สำหรับ dry-run
//! - Ledger เป็น plain struct ห่อด้วย `RwLock` — Engine เขียน, handlers อ่าน

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Notify, RwLock};
use tracing::{info, warn};

use crate::arbitrage::ArbReport;
use crate::config::AppConfig;
use crate::engine::runner::RoundSummary;
use crate::events::WsEvent;
use crate::exchange::{Exchange, KalshiClient, PaperExchange};
use crate::feed::{MarketBook, MarketFeed};
use crate::ledger::Ledger;
use crate::models::{Balance, TradeRecord};
use crate::risk::{RiskContext, RiskManager};
use crate::scanner::ScanReport;
use crate::strategy::Analyst;

/// จำนวนบรรทัดที่เก็บใน engine log
pub const LOG_CAPACITY: usize = 500;

// ─── Engine Log ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogTag {
    Head,
    Info,
    Warn,
    Fill,
    Skip,
    Fail,
    Ai,
}

impl LogTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogTag::Head => "HEAD",
            LogTag::Info => "INFO",
            LogTag::Warn => "WARN",
            LogTag::Fill => "FILL",
            LogTag::Skip => "SKIP",
            LogTag::Fail => "FAIL",
            LogTag::Ai   => "AI",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogLine {
    pub at:      DateTime<Utc>,
    pub tag:     LogTag,
    pub message: String,
}

impl std::fmt::Display for LogLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}] {}", self.at.format("%H:%M:%S"), self.tag.as_str(), self.message)
    }
}

// ─── Engine Control ───────────────────────────────────────────────────────────

/// ค่าที่ `/api/control/start` ตั้งให้ Engine รอบนี้
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub dry_run:       bool,
    pub with_ai:       bool,
    pub max_positions: usize,
}

#[derive(Default)]
pub struct EngineControl {
    running:    AtomicBool,
    stop:       AtomicBool,
    wakeup:     Notify,
    rounds:     AtomicU64,
    settings:   RwLock<Option<EngineSettings>>,
    started_at: RwLock<Option<DateTime<Utc>>>,
}

impl EngineControl {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// false = มี Engine รันอยู่แล้ว
    pub async fn try_begin(&self, settings: EngineSettings) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.stop.store(false, Ordering::SeqCst);
        *self.settings.write().await = Some(settings);
        *self.started_at.write().await = Some(Utc::now());
        true
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        // notify_one เก็บ permit ไว้ถ้ายังไม่มีใครรอ
        self.wakeup.notify_one();
    }

    pub async fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
        *self.started_at.write().await = None;
    }

    /// รอ `duration` หรือจนกว่าจะมี stop request — คืน true ถ้าต้องหยุด
    pub async fn wait(&self, duration: Duration) -> bool {
        if self.stop_requested() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.wakeup.notified() => {}
        }
        self.stop_requested()
    }

    pub fn next_round(&self) -> u64 {
        self.rounds.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn rounds(&self) -> u64 {
        self.rounds.load(Ordering::Relaxed)
    }

    pub async fn settings(&self) -> Option<EngineSettings> {
        *self.settings.read().await
    }

    pub async fn started_at(&self) -> Option<DateTime<Utc>> {
        *self.started_at.read().await
    }
}

// ─── Background Jobs ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanState {
    pub running: bool,
    pub report:  Option<ScanReport>,
    pub error:   Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArbState {
    pub running: bool,
    pub report:  Option<ArbReport>,
    pub error:   Option<String>,
}

// ─── AppState ─────────────────────────────────────────────────────────────────

/// ทุก handler / engine task ถือ clone ของ struct นี้ผ่าน [`SharedState`]
#[derive(Clone)]
pub struct AppState {
    pub config:       Arc<AppConfig>,

    // ── Exchange ──────────────────────────────────────────────────────────────
    /// Kalshi จริง — market data ทุกโหมด และ order เมื่อ dry_run = false
    pub exchange:     Arc<dyn Exchange>,
    pub paper:        Arc<PaperExchange>,
    pub feed:         Arc<MarketFeed>,

    // ── Trading ───────────────────────────────────────────────────────────────
    pub ledger:       Arc<RwLock<Ledger>>,
    pub risk:         Arc<RiskManager>,
    pub analyst:      Arc<Analyst>,
    pub engine:       Arc<EngineControl>,
    pub last_round:   Arc<RwLock<Option<RoundSummary>>>,

    // ── Background scans ──────────────────────────────────────────────────────
    pub scanner:      Arc<RwLock<ScanState>>,
    pub arbitrage:    Arc<RwLock<ArbState>>,
    pub arb_stop:     Arc<AtomicBool>,

    // ── Monitor / WebSocket ───────────────────────────────────────────────────
    /// JSON ที่ serialize แล้ว ส่งต่อได้ทันที
    pub broadcast_tx: broadcast::Sender<String>,
    pub engine_log:   Arc<RwLock<VecDeque<LogLine>>>,

    // ── Metrics ───────────────────────────────────────────────────────────────
    pub trade_count:  Arc<AtomicU64>,
    pub started_at:   DateTime<Utc>,

    #[cfg(feature = "postgres")]
    pub db:           Option<sqlx::PgPool>,
}

impl AppState {
    pub fn new(config: AppConfig, exchange: Arc<dyn Exchange>) -> Self {
        let (broadcast_tx, _) = broadcast::channel(256);
        let paper = Arc::new(PaperExchange::new(exchange.clone(), config.paper_balance_cents));
        let feed = Arc::new(MarketFeed::new(
            exchange.clone(),
            Arc::new(RwLock::new(MarketBook::default())),
            Duration::from_secs(config.scan.cache_secs),
        ));

        Self {
            risk:         Arc::new(RiskManager::new(config.risk.clone())),
            analyst:      Arc::new(Analyst::new(config.ai.clone())),
            config:       Arc::new(config),
            exchange,
            paper,
            feed,
            ledger:       Arc::new(RwLock::new(Ledger::new())),
            engine:       Arc::new(EngineControl::default()),
            last_round:   Arc::new(RwLock::new(None)),
            scanner:      Arc::new(RwLock::new(ScanState::default())),
            arbitrage:    Arc::new(RwLock::new(ArbState::default())),
            arb_stop:     Arc::new(AtomicBool::new(false)),
            broadcast_tx,
            engine_log:   Arc::new(RwLock::new(VecDeque::with_capacity(LOG_CAPACITY))),
            trade_count:  Arc::new(AtomicU64::new(0)),
            started_at:   Utc::now(),
            #[cfg(feature = "postgres")]
            db:           None,
        }
    }

    #[cfg(feature = "postgres")]
    pub fn with_db(mut self, pool: sqlx::PgPool) -> Self {
        self.db = Some(pool);
        self
    }

    // ── Helper Methods ────────────────────────────────────────────────────────

    /// ส่ง event ให้ทุก `/ws/monitor` client
    pub fn broadcast(&self, event: &WsEvent) {
        // Err = ยังไม่มีใครฟัง
        let _ = self.broadcast_tx.send(event.to_json());
    }

    /// Exchange ที่ใช้ส่ง order + อ่าน balance ตามโหมด
    pub fn trading_exchange(&self, dry_run: bool) -> Arc<dyn Exchange> {
        if dry_run {
            let paper: Arc<dyn Exchange> = self.paper.clone();
            paper
        } else {
            self.exchange.clone()
        }
    }

    /// เขียน engine log (ring buffer 500 บรรทัด) + tracing + broadcast
    pub async fn log(&self, tag: LogTag, message: impl Into<String>) {
        let line = LogLine { at: Utc::now(), tag, message: message.into() };
        match tag {
            LogTag::Warn | LogTag::Fail => warn!(tag = tag.as_str(), "{}", line.message),
            _ => info!(tag = tag.as_str(), "{}", line.message),
        }
        {
            let mut log = self.engine_log.write().await;
            if log.len() >= LOG_CAPACITY {
                log.pop_front();
            }
            log.push_back(line.clone());
        }
        self.broadcast(&WsEvent::Log { line });
    }

    pub async fn log_lines(&self) -> Vec<LogLine> {
        self.engine_log.read().await.iter().cloned().collect()
    }

    /// snapshot สำหรับ RiskManager จาก ledger ปัจจุบัน
    pub async fn risk_context(&self, max_positions: usize) -> RiskContext {
        let ledger = self.ledger.read().await;
        RiskContext {
            balance_cents:    ledger.last_balance().map(|b| b.balance_cents).unwrap_or(0),
            today_loss_cents: ledger.today_realized_loss_cents(Utc::now()),
            open_positions:   ledger.open_position_count(),
            max_positions,
        }
    }

    /// เก็บ TradeRecord ลง ledger (และ PostgreSQL ถ้าเปิด feature)
    pub async fn record_trade(&self, record: TradeRecord) {
        #[cfg(feature = "postgres")]
        if let Some(pool) = &self.db {
            if let Err(e) = crate::db::insert_trade_record(pool, &record).await {
                warn!(error = %e, "⚠️ Failed to persist trade record");
            }
        }
        self.ledger.write().await.push_trade(record);
        self.trade_count.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn record_balance(&self, balance: Balance) {
        #[cfg(feature = "postgres")]
        if let Some(pool) = &self.db {
            if let Err(e) = crate::db::insert_balance_snapshot(pool, &balance).await {
                warn!(error = %e, "⚠️ Failed to persist balance snapshot");
            }
        }
        self.ledger.write().await.record_balance(balance);
        self.broadcast(&WsEvent::BalanceUpdated {
            balance_cents:         balance.balance,
            portfolio_value_cents: balance.portfolio_value,
        });
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

pub type SharedState = Arc<AppState>;

/// State จริง: KalshiClient + (feature `postgres`) pool ที่ seed trade log แล้ว
pub async fn build_state(config: AppConfig) -> anyhow::Result<SharedState> {
    let client = KalshiClient::new(&config.exchange)?;
    #[cfg(feature = "postgres")]
    let database_url = config.database_url.clone();
    #[allow(unused_mut)]
    let mut state = AppState::new(config, Arc::new(client));

    #[cfg(feature = "postgres")]
    if let Some(url) = database_url {
        let pool = crate::db::init_pool(&url).await?;
        let history = crate::db::load_trade_records(&pool, 500).await?;
        info!(trades = history.len(), "📚 Trade history loaded");
        {
            let mut ledger = state.ledger.write().await;
            for record in history {
                ledger.push_trade(record);
            }
        }
        state = state.with_db(pool);
    }

    Ok(Arc::new(state))
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::config::Env;

    /// State บน FakeExchange + config default (ไม่มี env จริง)
    pub fn state_with(exchange: Arc<dyn Exchange>, pairs: &[(&str, &str)]) -> SharedState {
        let config = AppConfig::from_lookup(&Env::from_pairs(pairs)).unwrap();
        Arc::new(AppState::new(config, exchange))
    }
}
