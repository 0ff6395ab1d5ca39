//! Admin REST API order source
//!
//! Requests `GET {base}/admin/api/{version}/orders.json` with
//! `since_id`, `limit`, `status=any` (so cancelled and closed orders are
//! included) and a `fields` list restricted to what the normalizer reads.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ordersync_common::RawOrder;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{OrderPage, OrderSource};
use crate::config::SourceConfig;
use crate::error::SourceError;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("ordersync/", env!("CARGO_PKG_VERSION"));

/// Header carrying the private app access token
pub const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

/// Upstream fields consumed by the normalizer
pub const ORDER_FIELDS: &str = "id,order_number,created_at,cancelled_at,current_subtotal_price,\
total_price,fulfillment_status,financial_status,order_status_url,discount_codes,customer,phone,\
shipping_address,billing_address,line_items";

/// Longest error body kept in [`SourceError::Status`]
const MAX_ERROR_BODY: usize = 512;

#[derive(Deserialize)]
struct OrdersEnvelope {
    #[serde(default)]
    orders: Vec<serde_json::Value>,
}

/// HTTP order source backed by `reqwest`
pub struct HttpOrderSource {
    client: Client,
    orders_url: String,
    access_token: Option<String>,
}

impl HttpOrderSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client for order source")?;

        Ok(Self {
            client,
            orders_url: format!(
                "{}/admin/api/{}/orders.json",
                config.base_url.trim_end_matches('/'),
                config.api_version
            ),
            access_token: config.access_token.clone(),
        })
    }

    pub fn orders_url(&self) -> &str {
        &self.orders_url
    }
}

#[async_trait]
impl OrderSource for HttpOrderSource {
    async fn fetch_page(&self, since_id: u64, limit: u32) -> Result<OrderPage, SourceError> {
        let url = &self.orders_url;
        debug!(url = %url, since_id, limit, "Requesting order page");

        let mut request = self.client.get(url).query(&[
            ("since_id", since_id.to_string()),
            ("limit", limit.to_string()),
            ("status", "any".to_string()),
            ("fields", ORDER_FIELDS.to_string()),
        ]);
        if let Some(token) = &self.access_token {
            request = request.header(ACCESS_TOKEN_HEADER, token);
        }

        let response = request.send().await.map_err(|source| SourceError::Transport {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
            return Err(SourceError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.clone(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let envelope: OrdersEnvelope = response.json().await.map_err(|e| SourceError::Decode {
            url: url.clone(),
            message: e.to_string(),
        })?;

        let received = envelope.orders.len();
        let mut orders = Vec::with_capacity(received);
        for (position, value) in envelope.orders.into_iter().enumerate() {
            match serde_json::from_value::<RawOrder>(value) {
                Ok(order) => orders.push(order),
                Err(e) => warn!(
                    since_id,
                    position,
                    stage = "fetch",
                    error = %e,
                    "Skipping undecodable order"
                ),
            }
        }

        Ok(OrderPage::new(orders, received, limit))
    }
}
