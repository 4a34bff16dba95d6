//! # engine::runner
//!
//! **Strategy Round** — หนึ่ง round ของ sniper:
//!
//! ```text
//! balance ─▶ settlement sweep ─▶ pre_round_check ─▶ feed.refresh ─▶ scan ─▶ rank
//!        └─▶ ต่อ candidate: size ─▶ AI gate ─▶ execute  (หยุดเมื่อ fill แรก)
//! ```
//!
//! `run_loop` วน round จนกว่าจะถูกสั่งหยุดหรือชน daily loss / kill switch

use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::engine::executor::{self, ExecOptions, ExecOutcome};
use crate::events::WsEvent;
use crate::risk::RiskDecision;
use crate::scanner;
use crate::state::{AppState, EngineSettings, LogTag, SharedState};
use crate::strategy::ai::{gate, AiGate};
use crate::strategy::{SniperConfig, SniperStrategy};

// ─── Round Summary ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct RoundSummary {
    pub round:           u64,
    pub dry_run:         bool,
    pub started_at:      DateTime<Utc>,
    pub finished_at:     DateTime<Utc>,
    pub balance_cents:   i64,
    /// ticker ที่ settle ใน sweep รอบนี้
    pub settled:         Vec<String>,
    pub scanned:         usize,
    pub qualified:       usize,
    pub candidates:      usize,
    pub skipped:         usize,
    pub orders:          usize,
    pub traded:          bool,
    pub stop_reason:     Option<String>,
    pub selected_ticker: Option<String>,
    /// true = Engine ต้องหยุด loop (daily loss / kill)
    pub halt:            bool,
}

/// เหตุที่ `run_loop` จบแบบปกติ
#[derive(Debug, Clone, PartialEq)]
pub enum LoopExit {
    StopRequested,
    Halted(String),
}

impl std::fmt::Display for LoopExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopExit::StopRequested => f.write_str("stop requested"),
            LoopExit::Halted(reason) => write!(f, "halted: {reason}"),
        }
    }
}

// ─── Settlement Sweep ─────────────────────────────────────────────────────────

/// ดึง market ของทุก ticker ที่ถือ — ตัวที่มี result แล้วปิดใน ledger (และ paper)
///
/// เรียกทุก round แม้ไม่ถืออะไร เพื่อให้ feed เลิกติดตาม ticker ที่ปิดไปแล้ว
async fn settlement_sweep(state: &AppState, dry_run: bool) -> Vec<String> {
    let held: Vec<String> = state.ledger.read().await.held_tickers().into_iter().collect();

    let mut settled = Vec::new();
    for market in state.feed.refresh_tickers(&held).await {
        let Some(result) = market.settled_side() else {
            continue;
        };
        let closed = state.ledger.write().await.settle(&market.ticker, result);
        if dry_run {
            state.paper.settle(&market.ticker, result).await;
        }
        if let Some(closed) = closed {
            state
                .log(
                    LogTag::Info,
                    format!(
                        "{} settled {} — {} {} contracts, P&L {:+.2}$",
                        closed.ticker,
                        result.as_str().to_uppercase(),
                        closed.side.as_str().to_uppercase(),
                        closed.contracts,
                        closed.realized_pnl_cents as f64 / 100.0
                    ),
                )
                .await;
            state.broadcast(&WsEvent::PositionClosed { closed: Box::new(closed) });
            settled.push(market.ticker);
        }
    }
    settled
}

async fn finish(state: &AppState, mut summary: RoundSummary) -> RoundSummary {
    summary.finished_at = Utc::now();
    state
        .log(
            LogTag::Info,
            format!(
                "Round {} done: {} qualified, {} candidates, {} skipped, {} orders{}",
                summary.round,
                summary.qualified,
                summary.candidates,
                summary.skipped,
                summary.orders,
                summary
                    .stop_reason
                    .as_deref()
                    .map(|r| format!(" ({r})"))
                    .unwrap_or_default()
            ),
        )
        .await;
    *state.last_round.write().await = Some(summary.clone());
    state.broadcast(&WsEvent::RoundCompleted { summary: Box::new(summary.clone()) });
    summary
}

// ─── Round ────────────────────────────────────────────────────────────────────

pub async fn run_round(state: &AppState, settings: &EngineSettings) -> anyhow::Result<RoundSummary> {
    let mut summary = RoundSummary {
        round:      state.engine.next_round(),
        dry_run:    settings.dry_run,
        started_at: Utc::now(),
        ..Default::default()
    };
    let exchange = state.trading_exchange(settings.dry_run);
    state
        .log(
            LogTag::Head,
            format!("Round {} [{}]", summary.round, if settings.dry_run { "paper" } else { "live" }),
        )
        .await;

    // ── 1. Balance snapshot ───────────────────────────────────────────────────
    let balance = exchange.balance().await.context("balance snapshot failed")?;
    state.record_balance(balance).await;
    summary.balance_cents = balance.balance;

    // ── 2. Settlement sweep + open orders ─────────────────────────────────────
    summary.settled = settlement_sweep(state, settings.dry_run).await;
    if !state.ledger.read().await.open_orders().is_empty() {
        executor::reconcile_open_orders(state, exchange.as_ref()).await;
    }

    // ── 3. Pre-round risk gate ────────────────────────────────────────────────
    let ctx = state.risk_context(settings.max_positions).await;
    if let RiskDecision::Blocked(reason) = state.risk.pre_round_check(&ctx).await {
        summary.halt = reason.stops_engine();
        summary.stop_reason = Some(reason.to_string());
        let tag = if summary.halt { LogTag::Warn } else { LogTag::Skip };
        state.log(tag, format!("Round blocked: {reason}")).await;
        return Ok(finish(state, summary).await);
    }

    // ── 4. Feed + scan ────────────────────────────────────────────────────────
    let markets = state.feed.refresh(false).await.context("market refresh failed")?;
    let report = scanner::scan(&markets, &state.config.scan, Utc::now());
    summary.scanned = report.stats.fetched;
    summary.qualified = report.stats.qualified;
    {
        let mut scan_state = state.scanner.write().await;
        scan_state.report = Some(report.clone());
        scan_state.error = None;
    }

    // ── 5. Rank ───────────────────────────────────────────────────────────────
    let sniper = SniperStrategy::new(SniperConfig {
        max_positions: settings.max_positions,
        with_ai:       settings.with_ai,
        ..state.config.sniper.clone()
    });
    let held = state.ledger.read().await.held_tickers();
    let candidates = sniper.rank(&report, &held, &state.config.scan);
    summary.candidates = candidates.len();
    if candidates.is_empty() {
        summary.stop_reason = Some("no candidates".into());
        return Ok(finish(state, summary).await);
    }

    // ── 6. Candidates ─────────────────────────────────────────────────────────
    let opts = ExecOptions {
        dry_run:       settings.dry_run,
        auto_cancel:   sniper.config.auto_cancel,
        max_positions: settings.max_positions,
    };
    let use_ai = settings.with_ai && state.analyst.is_configured();

    for candidate in &candidates {
        if state.engine.stop_requested() {
            summary.stop_reason = Some("stop requested".into());
            break;
        }

        let Some(intent) = sniper.intent_for(candidate, balance.balance) else {
            summary.skipped += 1;
            state
                .log(LogTag::Skip, format!("{} size is 0 at {}c", candidate.ticker, candidate.signal_ask))
                .await;
            continue;
        };

        if use_ai {
            let verdict = state.analyst.analyze(candidate).await;
            match gate(&verdict, candidate.signal_side, sniper.config.min_confidence) {
                AiGate::Skip(why) => {
                    summary.skipped += 1;
                    state.log(LogTag::Ai, format!("{} skipped: {why}", candidate.ticker)).await;
                    continue;
                }
                AiGate::Pass => {
                    state
                        .log(
                            LogTag::Ai,
                            format!("{} pass ({}% confidence)", candidate.ticker, verdict.confidence),
                        )
                        .await;
                }
            }
        }

        match executor::execute(state, exchange.as_ref(), &intent, &opts).await {
            ExecOutcome::Blocked(reason) => {
                summary.halt = reason.stops_engine();
                summary.stop_reason = Some(reason.to_string());
                break;
            }
            ExecOutcome::Failed(_) => {
                summary.orders += 1;
            }
            ExecOutcome::Placed(order) => {
                summary.orders += 1;
                if order.filled_count > 0 {
                    summary.traded = true;
                    summary.selected_ticker = Some(order.ticker);
                    break;
                }
            }
        }
    }

    Ok(finish(state, summary).await)
}

// ─── Loop ─────────────────────────────────────────────────────────────────────

/// วน round — trade แล้วเริ่ม round ถัดไปทันที ไม่งั้นรอ `ROUND_INTERVAL_SECS`
pub async fn run_loop(state: SharedState, settings: EngineSettings) -> anyhow::Result<LoopExit> {
    let interval = Duration::from_secs(state.config.round_interval_secs);
    info!(?settings, interval_secs = interval.as_secs(), "🔁 Engine loop started");

    loop {
        if state.engine.stop_requested() {
            return Ok(LoopExit::StopRequested);
        }

        let summary = run_round(&state, &settings).await?;
        if summary.halt {
            let reason = summary.stop_reason.unwrap_or_else(|| "risk halt".into());
            state.log(LogTag::Warn, format!("Engine halting: {reason}")).await;
            return Ok(LoopExit::Halted(reason));
        }
        if summary.traded {
            continue;
        }
        if state.engine.wait(interval).await {
            return Ok(LoopExit::StopRequested);
        }
    }
}
