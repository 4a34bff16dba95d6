//! # cli — Command-line entry points
//!
//! `kalshi-bot` ไม่มี subcommand = `serve` (HTTP server + engine)
//! คำสั่งอื่นคุยกับ Kalshi ตรงๆ ผ่าน [`KalshiClient`] แล้วพิมพ์ผลออก stdout
//!
//! `trade-history` / `stats` อ่านประวัติจาก `--csv` (export ของ Kalshi)
//! หรือ PostgreSQL (`DATABASE_URL`, feature `postgres`)

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};

use crate::arbitrage::{run_arbitrage_scan, ArbParams};
use crate::config::AppConfig;
use crate::engine::{self, runner::run_round};
use crate::exchange::{client::KalshiClient, CreateOrderRequest, Exchange};
use crate::feed::MarketBook;
use crate::import::parse_kalshi_csv;
use crate::ledger::{Ledger, TradeFilter};
use crate::models::{Action, Intent, Order, Side, TradeRecord};
use crate::scanner::{scan, sort_results, SortKey};
use crate::sizing::contracts_for;
use crate::state::{build_state, EngineSettings};
use crate::ticker::decode_ticker;

/// จำนวน trade สูงสุดที่ดึงจาก PostgreSQL
const DB_HISTORY_LIMIT: i64 = 10_000;

#[derive(Debug, Parser)]
#[command(name = "kalshi-bot", version, about = "Kalshi prediction-market trading bot")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// HTTP status/control server (+ engine ถ้า AUTO_START=true)
    Serve,
    /// Cash + portfolio value
    Balance,
    /// รายการ market
    Markets {
        #[arg(long, default_value_t = 20)]
        limit:  u32,
        #[arg(long, default_value = "open")]
        status: String,
    },
    /// รายละเอียด market เดียว + orderbook
    Market { ticker: String },
    /// ส่ง limit order (ต้องใส่ --yes เพื่อส่งจริง)
    Order {
        ticker: String,
        #[arg(long)]
        side:   Side,
        #[arg(long, default_value = "buy")]
        action: Action,
        #[arg(long)]
        count:  u32,
        /// limit price (cents, 1–99)
        #[arg(long)]
        price:  i64,
        #[arg(long)]
        yes:    bool,
    },
    /// Sniper scan
    Scan {
        #[arg(long)]
        min_price:      Option<i64>,
        #[arg(long)]
        min_volume:     Option<i64>,
        /// comma-separated event prefixes เช่น KXHIGHNY,KXBTC
        #[arg(long)]
        prefixes:       Option<String>,
        #[arg(long)]
        qualified_only: bool,
        #[arg(long, default_value = "tier")]
        sort_by:        SortKey,
        #[arg(long)]
        reverse:        bool,
        /// คำนวณจำนวนสัญญาจาก balance จริง
        #[arg(long)]
        show_sizing:    bool,
    },
    /// Position ที่ถืออยู่บน exchange
    Positions,
    /// Arbitrage scan
    Arb {
        #[arg(long, default_value_t = 1)]
        min_profit:   i64,
        #[arg(long, default_value_t = 10)]
        quantity:     i64,
        #[arg(long)]
        no_orderbook: bool,
    },
    /// แปล ticker เป็นข้อความที่อ่านได้
    Decode { ticker: String },
    /// Trade log ล่าสุดก่อน
    TradeHistory {
        #[arg(long, default_value_t = 50)]
        limit:  usize,
        #[arg(long)]
        ticker: Option<String>,
        /// Kalshi CSV export (ไม่ใส่ = อ่านจาก DATABASE_URL)
        #[arg(long)]
        csv:    Option<PathBuf>,
    },
    /// Balance + unrealized P&L ของ position ที่ถือ + realized
    Pnl,
    /// Win rate / P&L / profit factor / ROI จากประวัติ trade
    Stats {
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// รัน sniper หนึ่งรอบ (dry run เว้นแต่ใส่ --live --yes)
    WhaleTrade {
        #[arg(long)]
        prefixes:      Option<String>,
        #[arg(long)]
        min_price:     Option<i64>,
        #[arg(long)]
        min_volume:    Option<i64>,
        #[arg(long)]
        max_positions: Option<usize>,
        #[arg(long)]
        max_days:      Option<f64>,
        /// ทับ --max-days
        #[arg(long)]
        max_hours:     Option<f64>,
        #[arg(long)]
        with_ai:       bool,
        #[arg(long)]
        live:          bool,
        #[arg(long)]
        yes:           bool,
    },
}

// ─── Dispatch ─────────────────────────────────────────────────────────────────

/// รันคำสั่งที่ไม่ใช่ `serve`
pub async fn run(command: Command, config: &AppConfig) -> anyhow::Result<()> {
    let database_url = config.database_url.as_deref();
    match command {
        Command::Decode { ticker } => {
            println!("{ticker}\n  → {}", decode_ticker(&ticker));
            return Ok(());
        }
        Command::TradeHistory { limit, ticker, csv } => {
            let records = load_history(csv.as_deref(), database_url).await?;
            return trade_history(&records, TradeFilter { ticker, limit: Some(limit) });
        }
        Command::Stats { csv } => {
            let records = load_history(csv.as_deref(), database_url).await?;
            return stats(&records);
        }
        Command::WhaleTrade {
            prefixes, min_price, min_volume, max_positions, max_days, max_hours, with_ai, live, yes,
        } => {
            anyhow::ensure!(!live || yes, "--live places real orders; add --yes to confirm");
            let mut config = config.clone();
            if let Some(raw) = prefixes {
                config.scan.prefixes = split_prefixes(&raw);
            }
            if let Some(p) = min_price {
                config.scan.min_price = p;
            }
            if let Some(v) = min_volume {
                config.scan.min_volume = v;
            }
            if let Some(hours) = max_hours.or(max_days.map(|d| d * 24.0)) {
                config.scan.max_hours = Some(hours);
            }
            let settings = EngineSettings {
                dry_run:       !live,
                with_ai:       with_ai || config.sniper.with_ai,
                max_positions: max_positions.unwrap_or(config.sniper.max_positions),
            };
            return whale_trade(config, settings).await;
        }
        _ => {}
    }

    let client = KalshiClient::new(&config.exchange).context("Failed to build Kalshi client")?;

    match command {
        Command::Serve
        | Command::Decode { .. }
        | Command::TradeHistory { .. }
        | Command::Stats { .. }
        | Command::WhaleTrade { .. } => Ok(()),
        Command::Pnl => pnl(&client).await,
        Command::Balance => balance(&client).await,
        Command::Markets { limit, status } => markets(&client, limit, &status).await,
        Command::Market { ticker } => market(&client, &ticker).await,
        Command::Order { ticker, side, action, count, price, yes } => {
            let intent = Intent {
                ticker,
                side,
                action,
                count,
                limit_price: price,
                reason: "manual order (cli)".into(),
            };
            order(&client, &intent, yes).await
        }
        Command::Scan { min_price, min_volume, prefixes, qualified_only, sort_by, reverse, show_sizing } => {
            let mut params = config.scan.clone();
            if let Some(p) = min_price {
                params.min_price = p;
            }
            if let Some(v) = min_volume {
                params.min_volume = v;
            }
            if let Some(raw) = prefixes {
                params.prefixes = split_prefixes(&raw);
            }
            let risk_pct = show_sizing.then_some(config.sniper.risk_pct);
            scan_markets(&client, &params, qualified_only, sort_by, reverse, risk_pct).await
        }
        Command::Positions => positions(&client).await,
        Command::Arb { min_profit, quantity, no_orderbook } => {
            let params = ArbParams {
                min_profit_cents: min_profit,
                quantity:         quantity.max(1),
                check_orderbook:  !no_orderbook,
                ..ArbParams::default()
            };
            arbitrage(&client, &params).await
        }
    }
}

// ─── Commands ─────────────────────────────────────────────────────────────────

fn dollars(cents: i64) -> String {
    format!("${:.2}", cents as f64 / 100.0)
}

fn split_prefixes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|p| p.trim().to_ascii_uppercase())
        .filter(|p| !p.is_empty())
        .collect()
}

/// ประวัติ trade เรียงเก่า → ใหม่ จาก CSV หรือ PostgreSQL
async fn load_history(csv: Option<&Path>, database_url: Option<&str>) -> anyhow::Result<Vec<TradeRecord>> {
    if let Some(path) = csv {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let parsed = parse_kalshi_csv(&content)?;
        if parsed.skipped > 0 {
            println!("Skipped {} unreadable rows", parsed.skipped);
        }
        return Ok(parsed.records);
    }

    #[cfg(feature = "postgres")]
    if let Some(url) = database_url {
        let pool = crate::db::init_pool(url).await?;
        return crate::db::load_trade_records(&pool, DB_HISTORY_LIMIT).await;
    }
    #[cfg(not(feature = "postgres"))]
    let _ = (database_url, DB_HISTORY_LIMIT);

    anyhow::bail!("No trade history source: pass --csv <file> or set DATABASE_URL (feature `postgres`)")
}

fn trade_history(records: &[TradeRecord], filter: TradeFilter) -> anyhow::Result<()> {
    let trades = Ledger::from_trades(records).trades(&filter);
    if trades.is_empty() {
        println!("No trades");
        return Ok(());
    }
    println!(
        "{:<20} {:<40} {:>4} {:>4} {:>5} {:>5} {:>7}  {}",
        "TIME", "TICKER", "ACT", "SIDE", "PRICE", "FILL", "FEES", "STATUS"
    );
    for t in &trades {
        println!(
            "{:<20} {:<40} {:>4} {:>4} {:>5} {:>5} {:>7}  {}{}",
            t.created_at.format("%Y-%m-%d %H:%M:%S"),
            t.ticker,
            t.action,
            t.side,
            t.price,
            format!("{}/{}", t.fill_count, t.count),
            dollars(t.fees_cents),
            t.status,
            if t.dry_run { " (dry)" } else { "" },
        );
    }
    println!("{} trades", trades.len());
    Ok(())
}

fn stats(records: &[TradeRecord]) -> anyhow::Result<()> {
    let s = Ledger::from_trades(records).stats();
    let pf = s.profit_factor.map_or_else(|| "∞".to_string(), |pf| format!("{pf:.2}"));
    println!("Orders:        {} (filled {}, failed {})", s.total_orders, s.filled_orders, s.failed_orders);
    println!("Positions:     {} open, {} closed", s.open_positions, s.closed_positions);
    println!("Wins/Losses:   {} / {} (breakeven {})", s.wins, s.losses, s.breakeven);
    println!("Win rate:      {:.1}%", s.win_rate);
    println!("Realized P&L:  {}", dollars(s.realized_pnl_cents));
    println!("Fees:          {}", dollars(s.total_fees_cents));
    println!("Net P&L:       {}", dollars(s.net_pnl_cents));
    println!("Invested:      {}", dollars(s.total_invested_cents));
    println!("ROI:           {:.2}%", s.roi_pct);
    println!("Profit factor: {pf}");
    Ok(())
}

async fn pnl(client: &dyn Exchange) -> anyhow::Result<()> {
    let balance = client.balance().await?;
    let positions = client.positions().await?;

    let mut ledger = Ledger::new();
    ledger.reconcile_positions(&positions);
    let mut book = MarketBook::default();
    for p in ledger.open_positions() {
        book.apply(vec![client.market(&p.ticker).await?]);
    }

    let views = ledger.position_views(&book);
    let unrealized: i64 = views.iter().filter_map(|v| v.unrealized_pnl_cents).sum();
    let realized: i64 = positions.iter().map(|p| p.realized_pnl).sum();

    println!("Cash:      {}", dollars(balance.balance));
    println!("Portfolio: {}", dollars(balance.portfolio_value));
    for v in &views {
        let side = v.side.map_or("-", |s| s.as_str());
        let mark = v.mark_price.map_or_else(|| "-".to_string(), |m| format!("{m}¢"));
        let upnl = v.unrealized_pnl_cents.map_or_else(|| "-".to_string(), dollars);
        println!(
            "  {:<40} {:>3} × {:>5}  entry={:.1}¢ mark={:>4} cost={} unrealized={}",
            v.ticker, side, v.contracts, v.entry_price, mark, dollars(v.cost_cents), upnl,
        );
    }
    println!("Unrealized: {}", dollars(unrealized));
    println!("Realized:   {}", dollars(realized));
    println!("Total P&L:  {}", dollars(unrealized + realized));
    Ok(())
}

async fn whale_trade(config: AppConfig, settings: EngineSettings) -> anyhow::Result<()> {
    anyhow::ensure!(
        settings.dry_run || config.exchange.has_credentials(),
        "Live trading needs KALSHI_API_KEY_ID and a private key"
    );
    println!(
        "{} round: prefixes={:?} min_price={} max_positions={} max_hours={:?} ai={}",
        if settings.dry_run { "Dry-run" } else { "LIVE" },
        config.scan.prefixes,
        config.scan.min_price,
        settings.max_positions,
        config.scan.max_hours,
        settings.with_ai,
    );

    let state = build_state(config).await?;
    engine::bootstrap(&state).await;
    let summary = run_round(&state, &settings).await?;

    for line in state.log_lines().await {
        println!("{line}");
    }
    println!(
        "scanned={} qualified={} candidates={} orders={} traded={} balance={}",
        summary.scanned,
        summary.qualified,
        summary.candidates,
        summary.orders,
        summary.traded,
        dollars(summary.balance_cents),
    );
    if let Some(ticker) = &summary.selected_ticker {
        println!("Selected: {ticker}  ({})", decode_ticker(ticker));
    }
    if let Some(reason) = &summary.stop_reason {
        println!("Stopped: {reason}");
    }
    Ok(())
}

async fn balance(client: &dyn Exchange) -> anyhow::Result<()> {
    let b = client.balance().await?;
    println!("Cash:      {}", dollars(b.balance));
    println!("Portfolio: {}", dollars(b.portfolio_value));
    println!("Total:     {}", dollars(b.balance + b.portfolio_value));
    Ok(())
}

async fn markets(client: &dyn Exchange, limit: u32, status: &str) -> anyhow::Result<()> {
    let page = client.markets_page(status, limit, None).await?;
    println!("{:<40} {:>5} {:>5} {:>10}  {}", "TICKER", "BID", "ASK", "VOL24H", "TITLE");
    for m in &page.markets {
        println!("{:<40} {:>5} {:>5} {:>10}  {}", m.ticker, m.yes_bid, m.yes_ask, m.volume_24h, m.title);
    }
    println!("{} markets", page.markets.len());
    Ok(())
}

async fn market(client: &dyn Exchange, ticker: &str) -> anyhow::Result<()> {
    let m = client.market(ticker).await?;
    println!("{}  ({})", m.ticker, decode_ticker(&m.ticker));
    println!("  title:     {}", m.title);
    println!("  status:    {}", m.status);
    println!("  yes:       {} / {}", m.yes_bid, m.yes_ask);
    println!("  no:        {} / {}", m.no_bid, m.no_ask);
    println!("  volume24h: {}", m.volume_24h);
    if let Some(h) = m.hours_left(Utc::now()) {
        println!("  closes in: {h:.1}h");
    }

    let book = client.orderbook(ticker, 5).await?;
    for side in [Side::Yes, Side::No] {
        match book.best_bid(side) {
            Some((price, qty)) => println!("  best {side} bid: {price}¢ × {qty}"),
            None => println!("  best {side} bid: —"),
        }
    }
    Ok(())
}

async fn order(client: &dyn Exchange, intent: &Intent, confirmed: bool) -> anyhow::Result<()> {
    anyhow::ensure!(intent.count > 0, "count must be > 0");
    anyhow::ensure!((1..=99).contains(&intent.limit_price), "price must be 1–99 cents");

    println!(
        "{} {} × {} {} @ {}¢ (max cost {})",
        intent.action,
        intent.count,
        intent.ticker,
        intent.side,
        intent.limit_price,
        dollars(intent.limit_price * i64::from(intent.count)),
    );
    if !confirmed {
        println!("Dry preview only — re-run with --yes to submit");
        return Ok(());
    }

    let order = Order::from_intent(intent);
    let ack = client.create_order(&CreateOrderRequest::limit(&order)).await?;
    println!(
        "✅ {} status={} filled={} remaining={} fees={}",
        ack.exchange_id, ack.status, ack.fill_count, ack.remaining_count, dollars(ack.fees_cents)
    );
    Ok(())
}

async fn scan_markets(
    client: &dyn Exchange,
    params: &crate::scanner::ScanParams,
    qualified_only: bool,
    sort_by: SortKey,
    reverse: bool,
    sizing_pct: Option<f64>,
) -> anyhow::Result<()> {
    let markets = client.all_markets("open").await?;
    let mut report = scan(&markets, params, Utc::now());
    if qualified_only {
        report.results.retain(|r| r.qualified);
    }
    sort_results(&mut report.results, sort_by, reverse);

    let balance = match sizing_pct {
        Some(_) => Some(client.balance().await?.balance),
        None => None,
    };

    println!(
        "{:<40} {:>4} {:>4} {:>4} {:>4} {:>9} {:>6} {:>6}  {}",
        "TICKER", "SIDE", "BID", "ASK", "TIER", "$VOL24H", "SPRD%", "HOURS", "Q"
    );
    for r in &report.results {
        let hours = r.hours_left.map_or_else(|| "-".to_string(), |h| format!("{h:.1}"));
        print!(
            "{:<40} {:>4} {:>4} {:>4} {:>4} {:>9} {:>6.2} {:>6}  {}",
            r.ticker,
            r.signal_side,
            r.signal_price,
            r.signal_ask,
            r.tier,
            r.dollar_24h,
            r.spread_pct,
            hours,
            if r.qualified { "✔" } else { "" },
        );
        if let (Some(bal), Some(pct)) = (balance, sizing_pct) {
            let price = if r.signal_ask > 0 { r.signal_ask } else { r.signal_price };
            print!("  size={}", contracts_for(bal, price, pct));
        }
        println!();
    }

    let s = &report.stats;
    println!(
        "fetched={} prefix={} volume={} price={} tier={} top_n={} dollar={} spread={} expires={} qualified={}",
        s.fetched, s.passed_prefix, s.passed_volume, s.passed_price,
        s.tier1, s.top_n, s.dollar_vol, s.spread, s.expires, s.qualified,
    );
    Ok(())
}

async fn positions(client: &dyn Exchange) -> anyhow::Result<()> {
    let held: Vec<_> = client.positions().await?.into_iter().filter(|p| p.position != 0).collect();
    if held.is_empty() {
        println!("No open positions");
        return Ok(());
    }
    for p in &held {
        let side = p.side().map_or("-", |s| s.as_str());
        println!(
            "{:<40} {:>3} × {:>5}  exposure={} realized={}  {}",
            p.ticker,
            side,
            p.position.abs(),
            dollars(p.market_exposure),
            dollars(p.realized_pnl),
            decode_ticker(&p.ticker),
        );
    }
    Ok(())
}

async fn arbitrage(client: &dyn Exchange, params: &ArbParams) -> anyhow::Result<()> {
    let stop = AtomicBool::new(false);
    let report = run_arbitrage_scan(client, params, &stop).await?;
    for line in &report.logs {
        println!("{line}");
    }
    if report.opportunities.is_empty() {
        println!("No arbitrage opportunities (fetched={}, priced={})", report.fetched, report.priced);
        return Ok(());
    }
    for o in &report.opportunities {
        println!(
            "{:<40} {:?} yes={} no={} qty={} net={}  {}",
            o.ticker, o.kind, o.yes_price, o.no_price, o.quantity, dollars(o.net_profit_cents), o.description,
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Env;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["kalshi-bot"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn parses_order_with_typed_side_and_action() {
        let cli = Cli::try_parse_from([
            "kalshi-bot", "order", "KXBTC-26JAN29-B100000",
            "--side", "no", "--action", "sell", "--count", "3", "--price", "97", "--yes",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Order { ticker, side, action, count, price, yes }) => {
                assert_eq!(ticker, "KXBTC-26JAN29-B100000");
                assert_eq!(side, Side::No);
                assert_eq!(action, Action::Sell);
                assert_eq!((count, price, yes), (3, 97, true));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_side_and_sort_key() {
        assert!(Cli::try_parse_from(["kalshi-bot", "order", "T", "--side", "maybe", "--count", "1", "--price", "5"]).is_err());
        assert!(Cli::try_parse_from(["kalshi-bot", "scan", "--sort-by", "bogus"]).is_err());
    }

    #[test]
    fn scan_flags_default_to_tier_sort() {
        let cli = Cli::try_parse_from(["kalshi-bot", "scan", "--prefixes", "kxhighny,KXBTC", "--qualified-only"]).unwrap();
        match cli.command {
            Some(Command::Scan { sort_by, prefixes, qualified_only, .. }) => {
                assert_eq!(sort_by, SortKey::Tier);
                assert_eq!(prefixes.as_deref(), Some("kxhighny,KXBTC"));
                assert!(qualified_only);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn history_commands_take_csv_and_filters() {
        let cli = Cli::try_parse_from([
            "kalshi-bot", "trade-history", "--ticker", "KXBTC-26JAN29-B100000", "--csv", "trades.csv",
        ])
        .unwrap();
        match cli.command {
            Some(Command::TradeHistory { limit, ticker, csv }) => {
                assert_eq!(limit, 50);
                assert_eq!(ticker.as_deref(), Some("KXBTC-26JAN29-B100000"));
                assert_eq!(csv, Some(PathBuf::from("trades.csv")));
            }
            other => panic!("unexpected {other:?}"),
        }

        let cli = Cli::try_parse_from(["kalshi-bot", "stats"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Stats { csv: None })));
        let cli = Cli::try_parse_from(["kalshi-bot", "pnl"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Pnl)));
    }

    #[test]
    fn whale_trade_defaults_to_dry_run() {
        let cli = Cli::try_parse_from([
            "kalshi-bot", "whale-trade", "--prefixes", "KXHIGHNY", "--max-days", "2", "--max-hours", "6",
        ])
        .unwrap();
        match cli.command {
            Some(Command::WhaleTrade { live, yes, max_days, max_hours, prefixes, .. }) => {
                assert!(!live && !yes);
                assert_eq!((max_days, max_hours), (Some(2.0), Some(6.0)));
                assert_eq!(split_prefixes(&prefixes.unwrap()), vec!["KXHIGHNY".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn live_whale_trade_needs_confirmation() {
        let config = AppConfig::from_lookup(&Env::from_pairs(&[])).unwrap();
        let cli = Cli::try_parse_from(["kalshi-bot", "whale-trade", "--live"]).unwrap();
        let err = run(cli.command.unwrap(), &config).await.unwrap_err();
        assert!(err.to_string().contains("--yes"));
    }

    #[tokio::test]
    async fn stats_without_history_source_fails() {
        let config = AppConfig::from_lookup(&Env::from_pairs(&[])).unwrap();
        let err = load_history(None, config.database_url.as_deref()).await.unwrap_err();
        assert!(err.to_string().contains("--csv"));
    }

    #[test]
    fn trade_history_reads_csv_export() {
        let csv = "type,Market_Ticker,Market_Id,Original_Date,Price_In_Cents,Amount_In_Dollars,Fee_In_Dollars,Traded_Time,Direction,Order_Type\n\
                   Trade,KXHIGHNY-26JAN29-B40,m-1,2026-01-29T22:46:06Z,97,10,0.02,,No,limit\n";
        let records = parse_kalshi_csv(csv).unwrap().records;
        assert!(trade_history(&records, TradeFilter::default()).is_ok());
        assert!(stats(&records).is_ok());
    }
}
