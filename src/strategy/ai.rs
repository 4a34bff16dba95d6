//! # strategy::ai — AI gate (Claude)
//!
//! ก่อนยิงแต่ละ candidate ถาม Claude ว่า outcome ที่ราคาบอกน่าจะเกิดจริงไหม
//!
//! ```text
//! candidate ─▶ cache (ticker, side) 10 นาที ─▶ prompt (+ ราคา crypto จาก CoinGecko) ─▶ Claude ─▶ Verdict
//! ```
//!
//! ไม่มี key / เรียกไม่สำเร็จ / parse ไม่ได้ → verdict กลาง (ผ่าน gate)

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Env;
use crate::models::Side;
use crate::scanner::ScanResult;
use crate::ticker::decode_ticker;

const VERDICT_TTL: Duration = Duration::from_secs(600);
const CRYPTO_TTL: Duration = Duration::from_secs(120);

// ─── Config ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AiConfig {
    pub api_key:        Option<String>,
    pub model:          String,
    /// `https://api.anthropic.com` — override ได้สำหรับ proxy/test
    pub api_base:       String,
    pub coingecko_base: String,
}

impl std::fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl AiConfig {
    pub fn from_env(env: &Env) -> Self {
        Self {
            api_key:        env.get("ANTHROPIC_API_KEY"),
            model:          env.get("AI_MODEL").unwrap_or_else(|| "claude-sonnet-4-20250514".into()),
            api_base:       env.get("ANTHROPIC_API_BASE").unwrap_or_else(|| "https://api.anthropic.com".into()),
            coingecko_base: env.get("COINGECKO_API_BASE").unwrap_or_else(|| "https://api.coingecko.com".into()),
        }
    }
}

// ─── Verdict ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    /// None = AI ไม่ได้ระบุ / ไม่รู้
    pub expected_outcome: Option<Side>,
    /// 0 = ไม่มีข้อมูล
    pub confidence:       u8,
    pub reasoning:        String,
    pub risk_factors:     Vec<String>,
    pub should_trade:     bool,
}

impl Verdict {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            expected_outcome: None,
            confidence:       0,
            reasoning:        reason.into(),
            risk_factors:     Vec::new(),
            should_trade:     true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiGate {
    Pass,
    Skip(String),
}

/// ตัดสินจาก verdict ว่าจะยิง candidate นี้ไหม
pub fn gate(verdict: &Verdict, our_side: Side, min_confidence: u8) -> AiGate {
    if let Some(ai_side) = verdict.expected_outcome {
        if ai_side != our_side {
            return AiGate::Skip(format!(
                "AI says {}, we want {}",
                ai_side.as_str().to_uppercase(),
                our_side.as_str().to_uppercase()
            ));
        }
    }
    if verdict.confidence > 0 && verdict.confidence < min_confidence {
        return AiGate::Skip(format!("confidence {}% < {}%", verdict.confidence, min_confidence));
    }
    if !verdict.should_trade {
        return AiGate::Skip("AI recommends skip".into());
    }
    AiGate::Pass
}

// ─── Category / Context ───────────────────────────────────────────────────────

const CATEGORY_PREFIXES: &[(&str, &[&str])] = &[
    ("crypto", &[
        "KXBTC", "KXETH", "KXDOGE", "KXSHIBA", "KXSOL", "KXXRP",
        "KXADA", "KXBNB", "KXDOT", "KXLINK", "KXMATIC", "KXAVAX",
    ]),
    ("sports", &[
        "KXNFL", "KXNBA", "KXMLB", "KXNHL", "KXSOCCER", "KXNCAAB",
        "KXNCAAF", "KXMMA", "KXTENNIS", "KXGOLF", "KXF1",
    ]),
    ("politics", &[
        "KXPOTUS", "KXAPRPOTUS", "KXGOVSHUT", "KXGOVTFUND",
        "KXSENATE", "KXHOUSE", "KXELECTION",
    ]),
    ("weather", &["KXHIGH", "KXLOW", "KXRAIN", "KXSNOW", "KXTEMP"]),
    ("finance", &[
        "KXINX", "KXNASDAQ", "KXSP500", "KXNAS", "KXEURUSD",
        "KXUSDJPY", "KXWTI", "KXTNOTE", "KXFED", "KXCPI", "KXGDP",
        "KXPPI", "KXJOBLESS", "KXPAYROLLS",
    ]),
];

/// symbol → CoinGecko id
const COINGECKO_IDS: &[(&str, &str)] = &[
    ("btc", "bitcoin"),
    ("eth", "ethereum"),
    ("doge", "dogecoin"),
    ("shiba", "shiba-inu"),
    ("sol", "solana"),
    ("xrp", "ripple"),
    ("ada", "cardano"),
    ("bnb", "binancecoin"),
    ("dot", "polkadot"),
    ("link", "chainlink"),
    ("matic", "matic-network"),
    ("avax", "avalanche-2"),
];

pub fn detect_category(event_ticker: &str) -> &'static str {
    let upper = event_ticker.to_ascii_uppercase();
    CATEGORY_PREFIXES
        .iter()
        .find(|(_, prefixes)| prefixes.iter().any(|p| upper.starts_with(p)))
        .map(|(category, _)| *category)
        .unwrap_or("other")
}

// ─── Prompt / Parse ───────────────────────────────────────────────────────────

pub fn build_prompt(candidate: &ScanResult, category: &str, crypto: &HashMap<String, f64>) -> String {
    let mut ctx_lines = vec![format!("Category: {category}")];
    if let Some(btc) = crypto.get("btc") {
        ctx_lines.push(format!("Current BTC price: ${btc:.2}"));
    }
    if let Some(eth) = crypto.get("eth") {
        ctx_lines.push(format!("Current ETH price: ${eth:.2}"));
    }
    let ctx_block = ctx_lines.join("\n");
    let hours = candidate
        .hours_left
        .map(|h| format!("{h:.1}"))
        .unwrap_or_else(|| "unknown".into());

    format!(r#"You are analyzing a prediction market on Kalshi.

Market: {name}
Ticker: {ticker}
Our intended trade: BUY {side} at {price}c
Current ask: {ask}c
24h dollar volume: ${dollar}
Spread: {spread:.1}%
Hours until close: {hours}
Tier: {tier}

Context:
{ctx_block}

This is a high-probability strategy targeting markets priced >= 95c (outcomes very likely to happen). We place limit orders at 98c and profit 1-2c per contract when the market resolves YES/NO as expected. The market closes within 24 hours.

Evaluate whether this outcome is truly as likely as the price suggests. Consider any reasons the expected outcome might NOT happen.

Respond in JSON only, no other text:
{{"expected_outcome": "YES" or "NO", "confidence": 0-100, "reasoning": "brief explanation", "risk_factors": ["factor1", "factor2"], "should_trade": true or false}}

Rules:
- confidence 90+: Very confident, strong pattern or data supports outcome
- confidence 70-89: Likely but some uncertainty exists
- confidence 50-69: Uncertain, recommend skip
- confidence <50: Unlikely, do not trade
- should_trade: Only true if confidence >= 75 AND no major risk factors"#,
        name   = decode_ticker(&candidate.ticker),
        ticker = candidate.ticker,
        side   = candidate.signal_side.as_str().to_uppercase(),
        price  = candidate.signal_price,
        ask    = candidate.signal_ask,
        dollar = candidate.dollar_24h,
        spread = candidate.spread_pct,
        tier   = candidate.tier,
    )
}

#[derive(Deserialize)]
struct RawVerdict {
    #[serde(default)]
    expected_outcome: Option<String>,
    #[serde(default)]
    confidence:       Option<f64>,
    #[serde(default)]
    reasoning:        Option<String>,
    #[serde(default)]
    risk_factors:     Vec<String>,
    #[serde(default)]
    should_trade:     Option<bool>,
}

/// Parse JSON ที่ AI ตอบ — ตัด code fence ออกก่อน
pub fn parse_verdict(raw: &str) -> Verdict {
    let text = raw.trim();
    let text = if text.starts_with("```") {
        text.lines()
            .filter(|l| !l.trim_start().starts_with("```"))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        text.to_string()
    };

    match serde_json::from_str::<RawVerdict>(&text) {
        Ok(v) => Verdict {
            expected_outcome: v.expected_outcome.and_then(|s| s.parse().ok()),
            confidence:       v.confidence.unwrap_or(0.0).round().clamp(0.0, 100.0) as u8,
            reasoning:        v.reasoning.unwrap_or_default(),
            risk_factors:     v.risk_factors,
            should_trade:     v.should_trade.unwrap_or(true),
        },
        Err(_) => {
            let snippet: String = raw.chars().take(200).collect();
            Verdict::unavailable(format!("Failed to parse AI response: {snippet}"))
        }
    }
}

// ─── Anthropic Messages API ───────────────────────────────────────────────────

#[derive(Serialize)]
struct ClaudeRequest<'a> {
    model:      &'a str,
    max_tokens: u32,
    messages:   Vec<ClaudeMessage<'a>>,
}

#[derive(Serialize)]
struct ClaudeMessage<'a> {
    role:    &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Deserialize)]
struct ClaudeContent {
    #[serde(default)]
    text: String,
}

// ─── Analyst ──────────────────────────────────────────────────────────────────

pub struct Analyst {
    http:     reqwest::Client,
    config:   AiConfig,
    verdicts: Mutex<HashMap<(String, Side), (Instant, Verdict)>>,
    crypto:   Mutex<Option<(Instant, HashMap<String, f64>)>>,
}

impl Analyst {
    pub fn new(config: AiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            verdicts: Mutex::new(HashMap::new()),
            crypto: Mutex::new(None),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// ไม่เคย error — ปัญหาทุกอย่างกลายเป็น verdict กลาง
    pub async fn analyze(&self, candidate: &ScanResult) -> Verdict {
        let key = (candidate.ticker.clone(), candidate.signal_side);
        if let Some((at, cached)) = self.verdicts.lock().await.get(&key) {
            if at.elapsed() < VERDICT_TTL {
                debug!(ticker = %candidate.ticker, confidence = cached.confidence, "🧠 AI verdict cache hit");
                return cached.clone();
            }
        }

        let Some(api_key) = self.config.api_key.as_deref() else {
            return Verdict::unavailable("No ANTHROPIC_API_KEY set — AI analysis skipped");
        };

        let category = detect_category(&candidate.event_ticker);
        let crypto = if category == "crypto" { self.crypto_prices().await } else { HashMap::new() };
        let prompt = build_prompt(candidate, category, &crypto);

        match self.call_claude(api_key, &prompt).await {
            Ok(text) => {
                let verdict = parse_verdict(&text);
                info!(
                    ticker     = %candidate.ticker,
                    outcome    = ?verdict.expected_outcome,
                    confidence = verdict.confidence,
                    trade      = verdict.should_trade,
                    "🧠 AI verdict"
                );
                self.verdicts.lock().await.insert(key, (Instant::now(), verdict.clone()));
                verdict
            }
            Err(e) => {
                warn!(ticker = %candidate.ticker, error = %e, "⚠️ AI analysis failed");
                Verdict::unavailable(format!("AI analysis failed: {e}"))
            }
        }
    }

    async fn call_claude(&self, api_key: &str, prompt: &str) -> anyhow::Result<String> {
        let body = ClaudeRequest {
            model:      &self.config.model,
            max_tokens: 512,
            messages:   vec![ClaudeMessage { role: "user", content: prompt }],
        };

        let resp = self
            .http
            .post(format!("{}/v1/messages", self.config.api_base.trim_end_matches('/')))
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .context("Claude API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Claude API error {status}: {text}");
        }

        let data: ClaudeResponse = resp.json().await.context("Claude response parse error")?;
        data.content
            .into_iter()
            .next()
            .map(|c| c.text)
            .context("Claude returned empty content")
    }

    /// ราคา USD ต่อ symbol (cache 2 นาที; ดึงไม่ได้ → ค่าเก่า/ว่าง)
    pub async fn crypto_prices(&self) -> HashMap<String, f64> {
        let mut cache = self.crypto.lock().await;
        if let Some((at, prices)) = cache.as_ref() {
            if at.elapsed() < CRYPTO_TTL && !prices.is_empty() {
                return prices.clone();
            }
        }

        match self.fetch_crypto().await {
            Ok(prices) => {
                *cache = Some((Instant::now(), prices.clone()));
                prices
            }
            Err(e) => {
                warn!(error = %e, "⚠️ CoinGecko fetch failed");
                cache.as_ref().map(|(_, p)| p.clone()).unwrap_or_default()
            }
        }
    }

    async fn fetch_crypto(&self) -> anyhow::Result<HashMap<String, f64>> {
        let ids: Vec<&str> = COINGECKO_IDS.iter().map(|(_, id)| *id).collect();
        let url = format!("{}/api/v3/simple/price", self.config.coingecko_base.trim_end_matches('/'));
        let data: HashMap<String, HashMap<String, f64>> = self
            .http
            .get(url)
            .query(&[("ids", ids.join(",").as_str()), ("vs_currencies", "usd")])
            .header("Accept", "application/json")
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .context("CoinGecko request failed")?
            .error_for_status()
            .context("CoinGecko returned error")?
            .json()
            .await
            .context("CoinGecko response parse error")?;

        Ok(COINGECKO_IDS
            .iter()
            .filter_map(|(sym, id)| data.get(*id).and_then(|p| p.get("usd")).map(|usd| (sym.to_string(), *usd)))
            .collect())
    }
}
