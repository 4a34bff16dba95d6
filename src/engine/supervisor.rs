//! # engine::supervisor
//!
//! รัน `run_loop` ใน task แยก แล้ว restart เมื่อ loop คืน error หรือ panic
//! ด้วย exponential backoff (1s → 60s). loop ที่จบปกติ = จบการ supervise

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::engine::runner::{run_loop, LoopExit};
use crate::state::{EngineSettings, LogTag, SharedState};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max:     Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max, current: initial }
    }

    /// delay ถัดไป แล้วเพิ่มเป็นสองเท่า (ไม่เกิน max)
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_BACKOFF, MAX_BACKOFF)
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic".to_string()
    }
}

/// supervise `make()` — คืนเหตุผลที่หยุด
pub async fn supervise_with<F, Fut>(state: SharedState, mut backoff: Backoff, mut make: F) -> String
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<LoopExit>> + Send + 'static,
{
    loop {
        let started = Instant::now();
        let failure = match tokio::spawn(make()).await {
            Ok(Ok(exit)) => {
                info!(%exit, "🛑 Engine loop finished");
                return exit.to_string();
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(join) => panic_message(join),
        };

        if state.engine.stop_requested() {
            return LoopExit::StopRequested.to_string();
        }
        // loop ที่รันได้นานพอถือว่าหายดีแล้ว
        if started.elapsed() >= backoff.max() {
            backoff.reset();
        }
        let delay = backoff.next_delay();
        error!(error = %failure, delay_ms = delay.as_millis() as u64, "💥 Engine loop crashed — restarting");
        state
            .log(LogTag::Fail, format!("Engine loop failed: {failure}; restarting in {}s", delay.as_secs_f64()))
            .await;

        if state.engine.wait(delay).await {
            return LoopExit::StopRequested.to_string();
        }
    }
}

pub async fn supervise(state: SharedState, settings: EngineSettings) -> String {
    let loop_state = state.clone();
    supervise_with(state, Backoff::default(), move || run_loop(loop_state.clone(), settings)).await
}
