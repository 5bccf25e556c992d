//! Configuration types for the relay.
//!
//! A [`RelayConfig`] is built once at startup (loading and parsing live in
//! the server crate) and shared read-only as `Arc<RelayConfig>` by every
//! component for the lifetime of the process.

mod chain;
mod endpoints;

pub use chain::{ChainConfig, ChainSourceConfig, RpcSourceConfig, SimulatedSourceConfig};
pub use endpoints::{EnrichmentConfig, ReportingConfig, SigningConfig};

use std::time::Duration;
use xrelay_sdk::objects::AddressFormat;

/// Complete, immutable relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Every chain the relay knows about, listened to or not.
    pub chains: Vec<ChainConfig>,
    pub listener: ListenerConfig,
    pub lane: LaneConfig,
    pub enrichment: EnrichmentConfig,
    pub reporting: ReportingConfig,
    pub signing: SigningConfig,
    /// How long shutdown waits for in-flight work before aborting it.
    pub drain_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chains: Vec::new(),
            listener: ListenerConfig::default(),
            lane: LaneConfig::default(),
            enrichment: EnrichmentConfig::default(),
            reporting: ReportingConfig::default(),
            signing: SigningConfig::default(),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl RelayConfig {
    /// Look up a chain by id.
    pub fn chain(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    /// Address grammar of a chain; unknown chains use the EVM grammar.
    pub fn address_format(&self, chain_id: u64) -> AddressFormat {
        self.chain(chain_id)
            .map(|c| c.address_format)
            .unwrap_or_default()
    }

    /// Chains that get a listener and a lane.
    pub fn listened_chains(&self) -> impl Iterator<Item = &ChainConfig> {
        self.chains.iter().filter(|c| c.listen)
    }
}

/// Polling cadence of chain listeners.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Steady-state wait between polls.
    pub poll_interval: Duration,
    /// Wait after the first failed poll; doubles per consecutive failure.
    pub error_backoff: Duration,
    /// Upper bound on the failure backoff.
    pub max_error_backoff: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            error_backoff: Duration::from_secs(15),
            max_error_backoff: Duration::from_secs(120),
        }
    }
}

/// Per-chain processing lane limits.
#[derive(Debug, Clone)]
pub struct LaneConfig {
    /// Events a lane may hold (queued plus reorder buffer) before the
    /// listener is made to wait.
    pub max_pending: usize,
    /// How long a lane waits for a missing nonce before skipping past it.
    pub reorder_window: Duration,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            max_pending: 64,
            reorder_window: Duration::from_secs(10),
        }
    }
}
