//! # exchange::client — Kalshi REST client
//!
//! reqwest wrapper ที่คืน domain types ตรงๆ
//!
//! - Market data (`/markets*`) ใช้ได้โดยไม่ต้องมี credential
//! - `/portfolio/*` ต้อง sign ทุก request (ดู [`RequestSigner`])

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use super::{
    CreateOrderRequest, Exchange, ExchangeError, ExchangePosition, MarketPage, RequestSigner,
    MAX_PAGES,
};
use crate::config::ExchangeConfig;
use crate::models::market::null_as_default;
use crate::models::{Balance, Market, OrderAck, Orderbook};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ─── Wire Responses ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct MarketsResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    markets: Vec<Market>,
    #[serde(default)]
    cursor:  Option<String>,
}

#[derive(Deserialize)]
struct MarketResponse {
    market: Market,
}

#[derive(Deserialize)]
struct OrderbookResponse {
    #[serde(default)]
    orderbook: Orderbook,
}

#[derive(Deserialize)]
struct PositionsResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    market_positions: Vec<ExchangePosition>,
    #[serde(default)]
    cursor:           Option<String>,
}

#[derive(Deserialize)]
struct OrderResponse {
    order: WireOrder,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireOrder {
    order_id:        String,
    status:          String,
    fill_count:      u32,
    remaining_count: u32,
    taker_fill_cost: i64,
    maker_fill_cost: i64,
    taker_fees:      i64,
    maker_fees:      i64,
}

impl From<WireOrder> for OrderAck {
    fn from(o: WireOrder) -> Self {
        OrderAck {
            exchange_id:     o.order_id,
            status:          o.status,
            fill_count:      o.fill_count,
            remaining_count: o.remaining_count,
            fill_cost_cents: o.taker_fill_cost + o.maker_fill_cost,
            fees_cents:      o.taker_fees + o.maker_fees,
        }
    }
}

// ─── Client ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Auth {
    /// แนบ signature ถ้ามี credential
    Optional,
    /// ต้องมี credential — ชื่อ operation ใช้ใน error
    Required(&'static str),
}

#[derive(Clone)]
pub struct KalshiClient {
    http:     reqwest::Client,
    base_url: String,
    signer:   Option<Arc<RequestSigner>>,
}

impl KalshiClient {
    pub fn new(config: &ExchangeConfig) -> Result<Self, ExchangeError> {
        let signer = match (&config.api_key_id, &config.private_key_pem) {
            (Some(id), Some(pem)) => Some(Arc::new(RequestSigner::from_pem(id, pem)?)),
            _ => None,
        };
        info!(
            base_url      = %config.base_url,
            authenticated = signer.is_some(),
            "🔗 Kalshi client ready"
        );
        Ok(Self::with_base_url(&config.base_url, signer))
    }

    pub fn with_base_url(base_url: &str, signer: Option<Arc<RequestSigner>>) -> Self {
        Self {
            http:     reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            signer,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.signer.is_some()
    }

    /// `{base_url}/seg1/seg2/...` — แต่ละ segment ถูก percent-encode (ticker มี `/` หรือช่องว่างได้)
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, ExchangeError> {
        let bad = |e: String| ExchangeError::Decode(format!("bad url {}: {e}", self.base_url));
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| bad(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| bad("cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&CreateOrderRequest>,
        auth: Auth,
    ) -> Result<T, ExchangeError> {
        let url = self.endpoint(segments)?;
        // signature ครอบคลุม path เต็ม (รวม /trade-api/v2) แต่ไม่รวม query
        let sign_path = url.path().to_string();
        let path = sign_path.as_str();

        let mut req = self.http.request(method.clone(), url).timeout(REQUEST_TIMEOUT);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(b) = body {
            req = req.json(b);
        }

        match (&self.signer, auth) {
            (Some(signer), _) => {
                for (name, value) in signer.headers(method.as_str(), &sign_path)? {
                    req = req.header(name, value);
                }
            }
            (None, Auth::Required(op)) => return Err(ExchangeError::NotAuthenticated(op)),
            (None, Auth::Optional) => {}
        }

        debug!(%method, path, "→ Kalshi");

        let response = req.send().await.map_err(|e| {
            error!(error = %e, path, "Kalshi unreachable");
            ExchangeError::Http(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(http_status = %status, path, body = %body, "Kalshi returned HTTP error");
            return Err(ExchangeError::Status { status: status.as_u16(), body });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ExchangeError::Decode(format!("{path}: {e}")))
    }
}

#[async_trait]
impl Exchange for KalshiClient {
    fn name(&self) -> &'static str {
        "kalshi"
    }

    async fn balance(&self) -> Result<Balance, ExchangeError> {
        self.send(Method::GET, &["portfolio", "balance"], &[], None, Auth::Required("balance"))
            .await
    }

    async fn markets_page(
        &self,
        status: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<MarketPage, ExchangeError> {
        let mut query = vec![("limit", limit.to_string()), ("status", status.to_string())];
        if let Some(c) = cursor {
            query.push(("cursor", c.to_string()));
        }
        let resp: MarketsResponse =
            self.send(Method::GET, &["markets"], &query, None, Auth::Optional).await?;
        Ok(MarketPage { markets: resp.markets, cursor: resp.cursor })
    }

    async fn market(&self, ticker: &str) -> Result<Market, ExchangeError> {
        let resp: MarketResponse = self
            .send(Method::GET, &["markets", ticker], &[], None, Auth::Optional)
            .await?;
        Ok(resp.market)
    }

    async fn orderbook(&self, ticker: &str, depth: u32) -> Result<Orderbook, ExchangeError> {
        let resp: OrderbookResponse = self
            .send(
                Method::GET,
                &["markets", ticker, "orderbook"],
                &[("depth", depth.to_string())],
                None,
                Auth::Optional,
            )
            .await?;
        Ok(resp.orderbook)
    }

    async fn positions(&self) -> Result<Vec<ExchangePosition>, ExchangeError> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0;
        while pages < MAX_PAGES {
            pages += 1;
            let mut query = vec![("limit", "1000".to_string())];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }
            let resp: PositionsResponse = self
                .send(Method::GET, &["portfolio", "positions"], &query, None, Auth::Required("positions"))
                .await?;
            let empty = resp.market_positions.is_empty();
            all.extend(resp.market_positions);
            cursor = resp.cursor.filter(|c| !c.is_empty());
            if cursor.is_none() || empty {
                break;
            }
        }
        if pages == MAX_PAGES && cursor.is_some() {
            warn!(pages, "⚠️ Positions pagination hit page cap — list may be truncated");
        }
        // exchange คืน market ที่เคยเทรดแต่ปิดไปแล้วด้วย
        all.retain(|p| p.position != 0);
        Ok(all)
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> Result<OrderAck, ExchangeError> {
        info!(
            ticker = %request.ticker,
            side   = %request.side,
            action = %request.action,
            count  = request.count,
            price  = ?request.price(),
            "🚀 [EXECUTOR] Sending order to Kalshi"
        );
        let resp: OrderResponse = self
            .send(
                Method::POST,
                &["portfolio", "orders"],
                &[],
                Some(request),
                Auth::Required("create_order"),
            )
            .await?;
        Ok(resp.order.into())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<OrderAck, ExchangeError> {
        let resp: OrderResponse = self
            .send(
                Method::DELETE,
                &["portfolio", "orders", order_id],
                &[],
                None,
                Auth::Required("cancel_order"),
            )
            .await?;
        Ok(resp.order.into())
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderAck, ExchangeError> {
        let resp: OrderResponse = self
            .send(
                Method::GET,
                &["portfolio", "orders", order_id],
                &[],
                None,
                Auth::Required("get_order"),
            )
            .await?;
        Ok(resp.order.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::signer::tests::PKCS1_PEM;
    use crate::exchange::signer::{HEADER_KEY, HEADER_SIGNATURE, HEADER_TIMESTAMP};
    use crate::models::{Action, Side};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_signed(server: &MockServer) -> KalshiClient {
        let signer = RequestSigner::from_pem("key-1", PKCS1_PEM).unwrap();
        KalshiClient::with_base_url(&server.uri(), Some(Arc::new(signer)))
    }

    #[tokio::test]
    async fn paginates_markets_until_cursor_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .and(query_param("cursor", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "markets": [{"ticker": "B", "yes_bid": 97}],
                "cursor": ""
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .and(query_param("status", "open"))
            .and(query_param("limit", "1000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "markets": [{"ticker": "A", "yes_bid": 96}],
                "cursor": "page2"
            })))
            .mount(&server)
            .await;

        let client = KalshiClient::with_base_url(&server.uri(), None);
        let markets = client.all_markets("open").await.unwrap();
        let tickers: Vec<&str> = markets.iter().map(|m| m.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn balance_is_signed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/portfolio/balance"))
            .and(header(HEADER_KEY, "key-1"))
            .and(header_exists(HEADER_TIMESTAMP))
            .and(header_exists(HEADER_SIGNATURE))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "balance": 123_456,
                "portfolio_value": 7_890
            })))
            .expect(1)
            .mount(&server)
            .await;

        let bal = make_signed(&server).balance().await.unwrap();
        assert_eq!(bal.balance, 123_456);
        assert_eq!(bal.portfolio_value, 7_890);
    }

    #[tokio::test]
    async fn portfolio_requires_credentials() {
        let server = MockServer::start().await;
        let client = KalshiClient::with_base_url(&server.uri(), None);
        assert!(matches!(client.balance().await, Err(ExchangeError::NotAuthenticated("balance"))));
        assert!(matches!(client.positions().await, Err(ExchangeError::NotAuthenticated(_))));
    }

    #[tokio::test]
    async fn create_order_maps_ack() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/portfolio/orders"))
            .and(body_partial_json(json!({
                "ticker": "KXBTCD-X", "side": "yes", "action": "buy",
                "count": 10, "type": "limit", "yes_price": 98
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "order": {
                    "order_id": "ord-1", "status": "resting",
                    "fill_count": 4, "remaining_count": 6,
                    "taker_fill_cost": 388, "taker_fees": 2
                }
            })))
            .mount(&server)
            .await;

        let req = CreateOrderRequest {
            ticker:          "KXBTCD-X".into(),
            client_order_id: "c-1".into(),
            side:            Side::Yes,
            action:          Action::Buy,
            count:           10,
            order_type:      crate::exchange::OrderType::Limit,
            yes_price:       Some(98),
            no_price:        None,
        };
        let ack = make_signed(&server).create_order(&req).await.unwrap();
        assert_eq!(ack.exchange_id, "ord-1");
        assert_eq!(ack.fill_count, 4);
        assert_eq!(ack.remaining_count, 6);
        assert_eq!(ack.fill_cost_cents, 388);
        assert_eq!(ack.avg_price(), Some(97.0));
    }

    #[tokio::test]
    async fn http_errors_surface_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/portfolio/orders/ord-9"))
            .respond_with(ResponseTemplate::new(404).set_body_string("order not found"))
            .mount(&server)
            .await;

        let err = make_signed(&server).cancel_order("ord-9").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("order not found"));
    }

    #[tokio::test]
    async fn positions_drop_flat_markets_and_orderbook_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/portfolio/positions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "market_positions": [
                    {"ticker": "A", "position": 5, "market_exposure": 490},
                    {"ticker": "B", "position": 0, "market_exposure": 0},
                    {"ticker": "C", "position": -3, "market_exposure": 291}
                ],
                "cursor": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/markets/A/orderbook"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "orderbook": {"yes": [[40, 5], [45, 2]], "no": null}
            })))
            .mount(&server)
            .await;

        let client = make_signed(&server);
        let positions = client.positions().await.unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[1].side(), Some(Side::No));
        assert_eq!(positions[1].average_price(), Some(97.0));

        let ob = client.orderbook("A", 5).await.unwrap();
        assert_eq!(ob.best_bid(Side::Yes), Some((45, 2)));
        assert_eq!(ob.best_bid(Side::No), None);
    }

    #[tokio::test]
    async fn ticker_is_encoded_as_one_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets/KX%2FODD%20T1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "market": {"ticker": "KX/ODD T1", "yes_bid": 50, "result": null}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = KalshiClient::with_base_url(&server.uri(), None);
        let m = client.market("KX/ODD T1").await.unwrap();
        assert_eq!(m.ticker, "KX/ODD T1");
        assert_eq!(m.result, "");
    }

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let client = KalshiClient::with_base_url("https://demo-api.kalshi.co/trade-api/v2/", None);
        let url = client.endpoint(&["markets", "A?B", "orderbook"]).unwrap();
        assert_eq!(url.path(), "/trade-api/v2/markets/A%3FB/orderbook");
        assert!(url.query().is_none());
    }

    #[tokio::test]
    async fn positions_stop_at_page_cap_on_repeating_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/portfolio/positions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "market_positions": [{"ticker": "A", "position": 1, "market_exposure": 50}],
                "cursor": "same"
            })))
            .mount(&server)
            .await;

        let positions = make_signed(&server).positions().await.unwrap();
        assert_eq!(positions.len(), MAX_PAGES);
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), MAX_PAGES);
    }

    #[tokio::test]
    async fn null_market_list_decodes_as_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "markets": null, "cursor": null
            })))
            .mount(&server)
            .await;

        let client = KalshiClient::with_base_url(&server.uri(), None);
        assert!(client.all_markets("open").await.unwrap().is_empty());
    }

    #[test]
    fn wire_order_sums_taker_and_maker() {
        let wire: WireOrder = serde_json::from_value(json!({
            "order_id": "o", "status": "executed", "fill_count": 10, "remaining_count": 0,
            "taker_fill_cost": 490, "maker_fill_cost": 485, "taker_fees": 2, "maker_fees": 1,
            "some_new_field": true
        }))
        .unwrap();
        let ack: OrderAck = wire.into();
        assert_eq!(ack.fill_count, 10);
        assert_eq!(ack.fill_cost_cents, 975);
        assert_eq!(ack.fees_cents, 3);
    }
}
