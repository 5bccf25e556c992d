//! EnrichmentClient: best-effort USD price lookups.
//!
//! A lookup never fails from the caller's point of view. Every problem
//! (disabled oracle, network error, bad status, unparsable body, timeout)
//! degrades to [`PriceQuote::Unavailable`] with a warning, and the event
//! keeps moving with an unknown value.

use crate::config::EnrichmentConfig;
use crate::events::PriceQuote;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use std::convert::Infallible;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/// Placeholder replaced by the asset id in the oracle URL template.
const ASSET_PLACEHOLDER: &str = "{asset}";

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("price oracle is not configured")]
    Disabled,

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("price oracle answered with status {0}")]
    Status(reqwest::StatusCode),

    #[error("no price at {pointer} in oracle response")]
    MissingPrice { pointer: String },

    #[error("invalid price {0:?}")]
    InvalidPrice(String),

    #[error("price lookup timed out")]
    Timeout,
}

/// Request for the USD price of one whole unit of a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPrice {
    pub token_address: String,
}

pub struct EnrichmentClient {
    http_client: reqwest::Client,
    config: EnrichmentConfig,
}

impl EnrichmentClient {
    pub fn new(http_client: reqwest::Client, config: EnrichmentConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    /// Convenience wrapper around the [`Processor`] impl.
    pub async fn fetch_price(&self, token_address: &str) -> PriceQuote {
        match self
            .process(FetchPrice {
                token_address: token_address.to_string(),
            })
            .await
        {
            Ok(quote) => quote,
            Err(never) => match never {},
        }
    }

    fn price_url(&self, token_address: &str) -> Result<String, EnrichmentError> {
        let template = self
            .config
            .url_template
            .as_deref()
            .ok_or(EnrichmentError::Disabled)?;
        let asset = self.config.asset_id(token_address).to_ascii_lowercase();
        Ok(template.replace(ASSET_PLACEHOLDER, &urlencoding::encode(&asset)))
    }

    async fn try_fetch(&self, token_address: &str) -> Result<Decimal, EnrichmentError> {
        let url = self.price_url(token_address)?;
        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentError::Status(status));
        }
        let body: serde_json::Value = response.json().await?;
        extract_price(&body, &self.config.price_pointer)
    }
}

impl Processor<FetchPrice> for EnrichmentClient {
    type Output = PriceQuote;
    type Error = Infallible;

    #[tracing::instrument(skip_all, name = "HTTP:FetchPrice", fields(token = %request.token_address))]
    async fn process(&self, request: FetchPrice) -> Result<PriceQuote, Infallible> {
        let lookup = self.try_fetch(&request.token_address);
        let result = match tokio::time::timeout(self.config.timeout, lookup).await {
            Ok(result) => result,
            Err(_) => Err(EnrichmentError::Timeout),
        };
        match result {
            Ok(price) => {
                debug!(%price, "Price fetched");
                Ok(PriceQuote::Available(price))
            }
            Err(EnrichmentError::Disabled) => Ok(PriceQuote::Unavailable),
            Err(e) => {
                warn!(error = %e, "Price unavailable, continuing without valuation");
                Ok(PriceQuote::Unavailable)
            }
        }
    }
}

/// Read a non-negative decimal price at `pointer`, given as a JSON number or
/// a numeric string.
fn extract_price(body: &serde_json::Value, pointer: &str) -> Result<Decimal, EnrichmentError> {
    let value = body
        .pointer(pointer)
        .ok_or_else(|| EnrichmentError::MissingPrice {
            pointer: pointer.to_string(),
        })?;
    let text = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().to_string(),
        other => return Err(EnrichmentError::InvalidPrice(other.to_string())),
    };
    let price = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| EnrichmentError::InvalidPrice(text.clone()))?;
    if price.is_sign_negative() {
        return Err(EnrichmentError::InvalidPrice(text));
    }
    Ok(price)
}
