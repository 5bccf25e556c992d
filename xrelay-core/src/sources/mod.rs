//! Chain sources: where deposit logs come from.
//!
//! A [`ChainSource`] answers one question, "which deposits appeared since
//! the last time I was asked", and owns whatever cursor it needs for that.
//! Listeners drive sources; sources never assign nonces.

pub mod rpc;
pub mod simulated;

pub use rpc::RpcChainSource;
pub use simulated::SimulatedChainSource;

use crate::config::{ChainConfig, ChainSourceConfig};
use async_trait::async_trait;
use thiserror::Error;
use xrelay_sdk::objects::RawDeposit;

/// Errors that can occur while fetching deposits.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport-level failure talking to the node
    #[error("RPC request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The node answered with a JSON-RPC error object
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The node's answer could not be decoded
    #[error("RPC response decoding error: {0}")]
    Decode(String),

    /// The source is temporarily unavailable
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The chain's configuration cannot produce a source
    #[error("invalid chain configuration: {0}")]
    Config(String),
}

/// Trait for deposit sources.
///
/// Each call returns the deposits observed since the previous successful
/// call, in chain order. A failed call must leave the cursor untouched so
/// the same range is retried.
#[async_trait]
pub trait ChainSource: Send {
    async fn fetch_new_deposits(&mut self) -> Result<Vec<RawDeposit>, SourceError>;
}

/// Builds the source for a configured chain.
pub trait SourceFactory: Send + Sync {
    fn build(&self, chain: &ChainConfig) -> Result<Box<dyn ChainSource>, SourceError>;
}

impl<F> SourceFactory for F
where
    F: Fn(&ChainConfig) -> Result<Box<dyn ChainSource>, SourceError> + Send + Sync,
{
    fn build(&self, chain: &ChainConfig) -> Result<Box<dyn ChainSource>, SourceError> {
        self(chain)
    }
}

/// Builds sources from [`ChainSourceConfig`].
pub struct DefaultSourceFactory {
    http_client: reqwest::Client,
}

impl DefaultSourceFactory {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

impl Default for DefaultSourceFactory {
    fn default() -> Self {
        Self::new(
            reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        )
    }
}

impl SourceFactory for DefaultSourceFactory {
    fn build(&self, chain: &ChainConfig) -> Result<Box<dyn ChainSource>, SourceError> {
        match &chain.source {
            ChainSourceConfig::Rpc(rpc) => Ok(Box::new(RpcChainSource::new(
                chain.chain_id,
                rpc,
                self.http_client.clone(),
            )?)),
            ChainSourceConfig::Simulated(sim) => {
                Ok(Box::new(SimulatedChainSource::new(chain.chain_id, sim)?))
            }
            ChainSourceConfig::None => Err(SourceError::Config(format!(
                "chain {} has no source configured",
                chain.chain_id
            ))),
        }
    }
}
