//! Configuration module for xrelay-server.
//!
//! Reads the TOML file, applies CLI overrides, validates the result and
//! converts it into the immutable [`RelayConfig`] the core crate runs on.

pub mod file;

use crate::config::file::{FileConfig, SourceConfig};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use xrelay_core::config::{
    ChainConfig, ChainSourceConfig, EnrichmentConfig, LaneConfig, ListenerConfig, RelayConfig,
    ReportingConfig, RpcSourceConfig, SigningConfig, SimulatedSourceConfig,
};

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Everything `main` needs to start.
#[derive(Debug)]
pub struct LoadedConfig {
    pub relay: RelayConfig,
    pub listen: SocketAddr,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read, override, validate and convert the configuration file.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let content = std::fs::read_to_string(&self.config_path)?;
        self.load_str(&content)
    }

    fn load_str(&self, content: &str) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(content)?;
        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }
        validate(&file_config)?;
        Ok(build_loaded_config(file_config))
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

    if config.chains.is_empty() {
        return invalid("no chains configured".to_string());
    }

    let mut seen = HashSet::new();
    for chain in &config.chains {
        if !seen.insert(chain.chain_id) {
            return invalid(format!("chain id {} is configured twice", chain.chain_id));
        }
    }

    let listener = &config.listener;
    if listener.poll_interval_ms == 0 {
        return invalid("listener.poll_interval_ms must be greater than zero".to_string());
    }
    if listener.error_backoff_ms <= listener.poll_interval_ms {
        return invalid(format!(
            "listener.error_backoff_ms ({}) must be greater than poll_interval_ms ({})",
            listener.error_backoff_ms, listener.poll_interval_ms
        ));
    }
    if listener.max_error_backoff_ms < listener.error_backoff_ms {
        return invalid("listener.max_error_backoff_ms is below error_backoff_ms".to_string());
    }
    if config.lane.max_pending == 0 || config.lane.reorder_window_ms == 0 {
        return invalid("lane.max_pending and lane.reorder_window_ms must be non-zero".to_string());
    }
    if config.enrichment.timeout_ms == 0 {
        return invalid("enrichment.timeout_ms must be greater than zero".to_string());
    }
    if config.signing.enqueue_timeout_ms == 0 || config.signing.max_attempts == 0 {
        return invalid(
            "signing.enqueue_timeout_ms and signing.max_attempts must be non-zero".to_string(),
        );
    }
    let template = config.enrichment.url_template.as_deref();
    if template.is_some_and(|t| !t.contains("{asset}")) {
        return invalid("enrichment.url_template has no {asset} placeholder".to_string());
    }

    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    let FileConfig {
        server,
        listener,
        lane,
        enrichment,
        reporting,
        signing,
        chains,
    } = file_config;

    let relay = RelayConfig {
        chains: chains.into_iter().map(convert_chain).collect(),
        listener: ListenerConfig {
            poll_interval: Duration::from_millis(listener.poll_interval_ms),
            error_backoff: Duration::from_millis(listener.error_backoff_ms),
            max_error_backoff: Duration::from_millis(listener.max_error_backoff_ms),
        },
        lane: LaneConfig {
            max_pending: lane.max_pending,
            reorder_window: Duration::from_millis(lane.reorder_window_ms),
        },
        enrichment: EnrichmentConfig {
            url_template: enrichment.url_template,
            price_pointer: enrichment.price_pointer,
            timeout: Duration::from_millis(enrichment.timeout_ms),
            asset_ids: enrichment
                .asset_ids
                .into_iter()
                .map(|(token, asset)| (token.to_ascii_lowercase(), asset))
                .collect(),
        },
        reporting: ReportingConfig {
            url: reporting.url,
            timeout: Duration::from_millis(reporting.timeout_ms),
            queue_size: reporting.queue_size,
            secret: reporting.secret.map(secret_bytes),
        },
        signing: SigningConfig {
            endpoint: signing.endpoint,
            timeout: Duration::from_millis(signing.timeout_ms),
            queue_size: signing.queue_size,
            enqueue_timeout: Duration::from_millis(signing.enqueue_timeout_ms),
            max_attempts: signing.max_attempts,
            retry_base: Duration::from_millis(signing.retry_base_ms),
            secret: signing.secret.map(secret_bytes),
        },
        drain_timeout: Duration::from_secs(server.drain_timeout_secs),
    };

    LoadedConfig {
        relay,
        listen: server.listen,
    }
}

fn secret_bytes(secret: String) -> Box<[u8]> {
    secret.into_bytes().into_boxed_slice()
}

fn convert_chain(c: file::ChainConfig) -> ChainConfig {
    let source = match c.source {
        Some(SourceConfig::Rpc {
            rpc_url,
            contract_address,
            confirmations,
            max_block_range,
            start_block,
        }) => ChainSourceConfig::Rpc(RpcSourceConfig {
            rpc_url,
            contract_address,
            confirmations,
            max_block_range,
            start_block,
        }),
        Some(SourceConfig::Simulated {
            destination_chain_id,
            token_address,
            event_probability,
            failure_probability,
        }) => ChainSourceConfig::Simulated(SimulatedSourceConfig {
            destination_chain_id,
            token_address,
            event_probability,
            failure_probability,
        }),
        None => ChainSourceConfig::None,
    };
    ChainConfig {
        chain_id: c.chain_id,
        name: c.name,
        address_format: c.address_format,
        token_decimals: c.token_decimals,
        listen: c.listen,
        source,
    }
}
