//! TOML file configuration structures.
//!
//! These structs directly map to the `xrelay-config.toml` file format.
//! Durations are written as integer milliseconds (`*_ms`) or seconds
//! (`*_secs`).

use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use url::Url;
use xrelay_sdk::objects::AddressFormat;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub lane: LaneConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
    #[serde(default)]
    pub signing: SigningConfig,
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

/// Server configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// The address and port of the health/stats surface.
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
    /// How long shutdown waits for lanes and senders to drain.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_drain_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub poll_interval_ms: u64,
    pub error_backoff_ms: u64,
    pub max_error_backoff_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            error_backoff_ms: 15_000,
            max_error_backoff_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    pub max_pending: usize,
    pub reorder_window_ms: u64,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            max_pending: 64,
            reorder_window_ms: 10_000,
        }
    }
}

/// Price oracle section. Enrichment is disabled without `url_template`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// e.g. `https://prices.example.com/v1/{asset}`
    pub url_template: Option<String>,
    pub price_pointer: String,
    pub timeout_ms: u64,
    /// Token address to oracle asset id.
    pub asset_ids: HashMap<String, String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            url_template: None,
            price_pointer: "/price".to_string(),
            timeout_ms: 3_000,
            asset_ids: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub url: Option<Url>,
    pub timeout_ms: u64,
    pub queue_size: usize,
    /// HMAC secret for the `Xrelay-Signature` header.
    pub secret: Option<String>,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 5_000,
            queue_size: 256,
            secret: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Without an endpoint, signing requests are only logged.
    pub endpoint: Option<Url>,
    pub timeout_ms: u64,
    pub queue_size: usize,
    pub enqueue_timeout_ms: u64,
    pub max_attempts: u32,
    pub retry_base_ms: u64,
    pub secret: Option<String>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 10_000,
            queue_size: 256,
            enqueue_timeout_ms: 2_000,
            max_attempts: 5,
            retry_base_ms: 500,
            secret: None,
        }
    }
}

/// One `[[chains]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    #[serde(default)]
    pub address_format: AddressFormat,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u32,
    /// Destination-only chains set this to `false`.
    #[serde(default = "default_listen")]
    pub listen: bool,
    pub source: Option<SourceConfig>,
}

fn default_token_decimals() -> u32 {
    6
}

fn default_listen() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    Rpc {
        rpc_url: Url,
        contract_address: String,
        #[serde(default = "default_confirmations")]
        confirmations: u64,
        #[serde(default = "default_max_block_range")]
        max_block_range: u64,
        start_block: Option<u64>,
    },
    Simulated {
        destination_chain_id: u64,
        token_address: String,
        #[serde(default = "default_event_probability")]
        event_probability: f64,
        #[serde(default)]
        failure_probability: f64,
    },
}

fn default_confirmations() -> u64 {
    12
}

fn default_max_block_range() -> u64 {
    500
}

fn default_event_probability() -> f64 {
    0.3
}
