//! REST vendor adapter
//!
//! Wire contract, relative to the vendor's `base_url`:
//! - `POST {quote_path}` (default `/quotes`) with the quote criteria as JSON,
//!   answered by a [`RawQuote`] body
//! - `POST {order_path}` (default `/orders`) with the [`OrderRequest`],
//!   answered by `{"confirmation_number": "..."}`
//! - `GET {health_path}` (default `/health`), any 2xx is healthy
//!
//! HTTP failures are mapped onto [`AdapterError`]: 429 becomes
//! `RateLimited` carrying the `Retry-After` hint, 408 and 5xx are transient,
//! other 4xx are rejections and an unreadable body is an invalid response.

use std::time::Duration;

use async_trait::async_trait;
use partsource_core::vendor::{AdapterError, OrderConfirmation, OrderRequest, VendorAdapter};
use partsource_domain::{
    ApiType, PartSourceError, QuoteCriteria, RawQuote, Result, VendorAuth, VendorConfig,
};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

const DEFAULT_QUOTE_PATH: &str = "/quotes";
const DEFAULT_ORDER_PATH: &str = "/orders";
const DEFAULT_HEALTH_PATH: &str = "/health";

type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Longest error body echoed into an error message
const MAX_ERROR_BODY: usize = 200;

/// Adapter for vendors exposing a JSON HTTP API
pub struct RestVendorAdapter {
    vendor_id: String,
    client: Client,
    quote_url: String,
    order_url: String,
    health_url: String,
    auth: VendorAuth,
    order_timeout: Duration,
}

impl RestVendorAdapter {
    /// Build the adapter; the vendor must carry a `base_url`
    pub fn new(vendor: &VendorConfig, client: Client) -> Result<Self> {
        let base = vendor.endpoints.base_url.as_deref().ok_or_else(|| {
            PartSourceError::Config(format!("REST vendor '{}' has no base url", vendor.id))
        })?;
        let base = base.trim_end_matches('/');
        let join = |path: Option<&str>, default: &str| {
            let path = path.unwrap_or(default);
            if path.starts_with('/') {
                format!("{base}{path}")
            } else {
                format!("{base}/{path}")
            }
        };

        Ok(Self {
            vendor_id: vendor.id.clone(),
            client,
            quote_url: join(vendor.endpoints.quote_path.as_deref(), DEFAULT_QUOTE_PATH),
            order_url: join(vendor.endpoints.order_path.as_deref(), DEFAULT_ORDER_PATH),
            health_url: join(vendor.endpoints.health_path.as_deref(), DEFAULT_HEALTH_PATH),
            auth: vendor.auth.clone(),
            order_timeout: Duration::from_millis(vendor.call_policy.timeout_ms),
        })
    }

    fn authorize(&self, builder: RequestBuilder) -> AdapterResult<RequestBuilder> {
        Ok(match &self.auth {
            VendorAuth::None => builder,
            VendorAuth::ApiKey { header, key_env } => {
                builder.header(header.as_str(), secret(key_env)?)
            }
            VendorAuth::Bearer { token_env } => builder.bearer_auth(secret(token_env)?),
            VendorAuth::Basic { username, password_env } => {
                builder.basic_auth(username, Some(secret(password_env)?))
            }
        })
    }

    async fn send(&self, builder: RequestBuilder, timeout: Duration) -> AdapterResult<Response> {
        let builder = self.authorize(builder)?.timeout(timeout);
        let response = builder.send().await.map_err(|err| transport_error(&err, timeout))?;
        let status = response.status();
        debug!(vendor_id = %self.vendor_id, %status, url = %response.url(), "vendor responded");
        if status.is_success() {
            return Ok(response);
        }
        Err(status_error(response).await)
    }
}

#[async_trait]
impl VendorAdapter for RestVendorAdapter {
    fn api_type(&self) -> ApiType {
        ApiType::Rest
    }

    async fn quote(&self, criteria: &QuoteCriteria, timeout: Duration) -> AdapterResult<RawQuote> {
        let request = self.client.post(&self.quote_url).json(criteria);
        let response = self.send(request, timeout).await?;
        decode(response).await
    }

    async fn place_order(&self, order: &OrderRequest) -> AdapterResult<OrderConfirmation> {
        let response =
            self.send(self.client.post(&self.order_url).json(order), self.order_timeout).await?;
        let confirmation: OrderConfirmation = decode(response).await?;
        if confirmation.confirmation_number.trim().is_empty() {
            return Err(AdapterError::InvalidResponse("empty confirmation number".into()));
        }
        Ok(confirmation)
    }

    async fn health_check(&self) -> AdapterResult<()> {
        self.send(self.client.get(&self.health_url), self.order_timeout).await.map(|_| ())
    }
}

fn secret(env_key: &str) -> AdapterResult<String> {
    std::env::var(env_key)
        .map_err(|_| AdapterError::Rejected(format!("credential variable {env_key} is not set")))
}

async fn decode<T: DeserializeOwned>(response: Response) -> AdapterResult<T> {
    let body = response
        .bytes()
        .await
        .map_err(|err| AdapterError::Connection(format!("reading response body: {err}")))?;
    serde_json::from_slice(&body).map_err(|err| AdapterError::InvalidResponse(err.to_string()))
}

fn transport_error(err: &reqwest::Error, timeout: Duration) -> AdapterError {
    if err.is_timeout() {
        AdapterError::Timeout(timeout)
    } else if err.is_decode() {
        AdapterError::InvalidResponse(err.to_string())
    } else {
        AdapterError::Connection(err.to_string())
    }
}

async fn status_error(response: Response) -> AdapterError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
        body.truncate(cut);
    }
    let message = format!("HTTP {}: {}", status.as_u16(), body.trim());

    match status {
        StatusCode::TOO_MANY_REQUESTS => AdapterError::RateLimited { retry_after },
        StatusCode::REQUEST_TIMEOUT => AdapterError::Connection(message),
        s if s.is_server_error() => AdapterError::Connection(message),
        _ => AdapterError::Rejected(message),
    }
}
