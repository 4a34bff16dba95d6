//! # db — PostgreSQL persistence (feature `postgres`)
//!
//! ledger ยังอยู่ในหน่วยความจำ — DB เป็นแค่ history สำหรับ analysis
//! และ seed trade log ตอน restart
//!
//! ## Setup
//! 1. สร้าง database แล้วตั้ง `DATABASE_URL` ใน `.env`
//! 2. `cargo run --features postgres` — migration รันเองตอน startup

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Executor, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Balance, Position, TradeRecord};

// ─── Pool Init ────────────────────────────────────────────────────────────────

pub async fn init_pool(database_url: &str) -> anyhow::Result<PgPool> {
    info!("🐘 Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    run_migrations(&pool).await?;

    info!("✅ PostgreSQL connected and migrations applied");
    Ok(pool)
}

async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    // simple-query protocol: หลาย statement ในไฟล์เดียวได้
    pool.execute(include_str!("../migrations/001_init.sql"))
        .await
        .context("Failed to run migration 001_init.sql")?;
    Ok(())
}

// ─── Trade Records ────────────────────────────────────────────────────────────

/// upsert ตาม order_id — order เดียวกันอาจถูกบันทึกซ้ำหลัง reconcile
pub async fn insert_trade_record(pool: &PgPool, record: &TradeRecord) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO trade_records
          (order_id, exchange_id, ticker, side, action, count, price_cents, status,
           fill_count, remaining_count, fees_cents, error, dry_run, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (order_id) DO UPDATE SET
          exchange_id     = EXCLUDED.exchange_id,
          status          = EXCLUDED.status,
          fill_count      = EXCLUDED.fill_count,
          remaining_count = EXCLUDED.remaining_count,
          fees_cents      = EXCLUDED.fees_cents,
          error           = EXCLUDED.error
        "#,
    )
    .bind(record.order_id)
    .bind(&record.exchange_id)
    .bind(&record.ticker)
    .bind(record.side.as_str())
    .bind(record.action.as_str())
    .bind(i64::from(record.count))
    .bind(record.price)
    .bind(&record.status)
    .bind(i64::from(record.fill_count))
    .bind(i64::from(record.remaining_count))
    .bind(record.fees_cents)
    .bind(&record.error)
    .bind(record.dry_run)
    .bind(record.created_at)
    .execute(pool)
    .await
    .context("insert_trade_record failed")?;

    Ok(())
}

type TradeRow = (
    Uuid,
    Option<String>,
    String,
    String,
    String,
    i64,
    i64,
    String,
    i64,
    i64,
    i64,
    Option<String>,
    bool,
    DateTime<Utc>,
);

/// trade ล่าสุด `limit` รายการ เรียงเก่า → ใหม่ (ลำดับเดียวกับที่ ledger push)
pub async fn load_trade_records(pool: &PgPool, limit: i64) -> anyhow::Result<Vec<TradeRecord>> {
    let rows: Vec<TradeRow> = sqlx::query_as(
        r#"
        SELECT order_id, exchange_id, ticker, side, action, count, price_cents, status,
               fill_count, remaining_count, fees_cents, error, dry_run, created_at
        FROM trade_records
        ORDER BY created_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("load_trade_records failed")?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows.into_iter().rev() {
        let (order_id, exchange_id, ticker, side, action, count, price, status,
             fill_count, remaining_count, fees_cents, error, dry_run, created_at) = row;
        let (Ok(side), Ok(action)) = (side.parse(), action.parse()) else {
            warn!(%order_id, "⚠️ Skipping trade row with unknown side/action");
            continue;
        };
        records.push(TradeRecord {
            order_id,
            exchange_id,
            ticker,
            side,
            action,
            count:           u32::try_from(count).unwrap_or(0),
            price,
            status,
            fill_count:      u32::try_from(fill_count).unwrap_or(0),
            remaining_count: u32::try_from(remaining_count).unwrap_or(0),
            fees_cents,
            error,
            dry_run,
            created_at,
        });
    }
    Ok(records)
}

// ─── Snapshots ────────────────────────────────────────────────────────────────

pub async fn insert_position_snapshot(pool: &PgPool, position: &Position) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO position_snapshots
          (ticker, quantity, avg_entry_price, realized_pnl_cents, opened_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(&position.ticker)
    .bind(position.quantity)
    .bind(position.avg_entry_price)
    .bind(position.realized_pnl_cents)
    .bind(position.opened_at)
    .execute(pool)
    .await
    .context("insert_position_snapshot failed")?;

    Ok(())
}

pub async fn insert_balance_snapshot(pool: &PgPool, balance: &Balance) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO balance_snapshots (balance_cents, portfolio_value_cents) VALUES ($1, $2)",
    )
    .bind(balance.balance)
    .bind(balance.portfolio_value)
    .execute(pool)
    .await
    .context("insert_balance_snapshot failed")?;

    Ok(())
}
