//! Configuration of the external HTTP collaborators.

use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Price oracle used for best-effort enrichment.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// GET URL with an `{asset}` placeholder. `None` disables enrichment and
    /// every quote is unavailable.
    pub url_template: Option<String>,
    /// JSON pointer to the price inside the response body.
    pub price_pointer: String,
    /// Upper bound on one price lookup, connection included.
    pub timeout: Duration,
    /// Maps a lowercased token address to the oracle's asset id. Unmapped
    /// tokens are looked up by address.
    pub asset_ids: HashMap<String, String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            url_template: None,
            price_pointer: "/price".to_string(),
            timeout: Duration::from_secs(3),
            asset_ids: HashMap::new(),
        }
    }
}

impl EnrichmentConfig {
    /// Resolve the oracle asset id for a token address.
    pub fn asset_id<'a>(&'a self, token_address: &'a str) -> &'a str {
        self.asset_ids
            .get(&token_address.to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or(token_address)
    }
}

/// Monitoring endpoint that receives processed-event reports.
#[derive(Debug, Clone)]
pub struct ReportingConfig {
    /// POST target. `None` means reports are only logged.
    pub url: Option<Url>,
    pub timeout: Duration,
    /// Capacity of the report queue; reports beyond it are dropped.
    pub queue_size: usize,
    /// Optional HMAC secret for the `Xrelay-Signature` header.
    pub secret: Option<Box<[u8]>>,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_secs(5),
            queue_size: 256,
            secret: None,
        }
    }
}

/// Outbound channel to the validator signing network.
#[derive(Debug, Clone)]
pub struct SigningConfig {
    /// POST target for signing requests. `None` selects the logging channel.
    pub endpoint: Option<Url>,
    pub timeout: Duration,
    pub queue_size: usize,
    /// How long a lane may wait for room in the signing queue before the
    /// event is marked failed-at-dispatch.
    pub enqueue_timeout: Duration,
    /// Delivery attempts per request, including the first.
    pub max_attempts: u32,
    /// Base delay of the exponential delivery backoff.
    pub retry_base: Duration,
    pub secret: Option<Box<[u8]>>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout: Duration::from_secs(10),
            queue_size: 256,
            enqueue_timeout: Duration::from_secs(2),
            max_attempts: 5,
            retry_base: Duration::from_millis(500),
            secret: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_id_lookup_is_case_insensitive() {
        let mut config = EnrichmentConfig::default();
        config.asset_ids.insert(
            "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".to_string(),
            "usd-coin".to_string(),
        );
        assert_eq!(
            config.asset_id("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            "usd-coin"
        );
        assert_eq!(config.asset_id("0xdead"), "0xdead");
    }
}
