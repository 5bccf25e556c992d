//! Per-chain configuration.

use url::Url;
use xrelay_sdk::objects::AddressFormat;

/// Configuration for one chain known to the relay.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Numeric chain id (e.g. 1 for Ethereum, 137 for Polygon).
    pub chain_id: u64,
    /// Human-readable name used in logs.
    pub name: String,
    /// Address grammar for accounts on this chain.
    pub address_format: AddressFormat,
    /// Decimals of the bridged token on this chain, used for USD valuation.
    pub token_decimals: u32,
    /// Whether a listener is started for this chain. Chains that only appear
    /// as destinations set this to `false`.
    pub listen: bool,
    /// Where deposit logs come from.
    pub source: ChainSourceConfig,
}

/// How deposit logs are obtained for a chain.
#[derive(Debug, Clone)]
pub enum ChainSourceConfig {
    /// EVM JSON-RPC node, scanning the bridge contract's `Deposit` logs.
    Rpc(RpcSourceConfig),
    /// Synthesized deposits, for demos and local runs.
    Simulated(SimulatedSourceConfig),
    /// No source configured. Listening on such a chain is a configuration
    /// error and the chain is skipped.
    None,
}

#[derive(Debug, Clone)]
pub struct RpcSourceConfig {
    pub rpc_url: Url,
    pub contract_address: String,
    /// Blocks to stay behind the head.
    pub confirmations: u64,
    /// Maximum number of blocks covered by one `eth_getLogs` call.
    pub max_block_range: u64,
    /// First block to scan. Defaults to the confirmed head at startup.
    pub start_block: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SimulatedSourceConfig {
    pub destination_chain_id: u64,
    pub token_address: String,
    /// Chance that a poll discovers a deposit.
    pub event_probability: f64,
    /// Chance that a poll fails, to exercise the backoff path.
    pub failure_probability: f64,
}

impl ChainConfig {
    /// A registry-only entry: known address format, no listener.
    pub fn destination(chain_id: u64, name: impl Into<String>, address_format: AddressFormat) -> Self {
        Self {
            chain_id,
            name: name.into(),
            address_format,
            token_decimals: 6,
            listen: false,
            source: ChainSourceConfig::None,
        }
    }
}
