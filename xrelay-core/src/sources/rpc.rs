//! EVM JSON-RPC deposit source.
//!
//! Scans the bridge contract's `Deposit` logs with `eth_getLogs`, staying
//! `confirmations` blocks behind the head and covering at most
//! `max_block_range` blocks per call.
//!
//! Log layout:
//!
//! ```text
//! event Deposit(
//!     address indexed depositor,      // topics[1]
//!     bytes32 indexed recipient,      // topics[2]
//!     address token,                  // data word 0
//!     uint256 amount,                 // data word 1
//!     uint256 destinationChainId      // data word 2
//! )
//! ```

use super::{ChainSource, SourceError};
use crate::config::RpcSourceConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;
use xrelay_sdk::objects::RawDeposit;
use xrelay_sdk::objects::address::{AddressFormat, keccak256, to_checksum_address};

/// Canonical signature of the bridge `Deposit` event.
pub const DEPOSIT_EVENT_SIGNATURE: &str = "Deposit(address,bytes32,address,uint256,uint256)";

pub struct RpcChainSource {
    chain_id: u64,
    rpc_url: Url,
    contract_address: String,
    topic0: String,
    confirmations: u64,
    max_block_range: u64,
    /// Next block to scan. `None` until the first successful poll.
    next_block: Option<u64>,
    request_id: u64,
    http_client: reqwest::Client,
}

impl RpcChainSource {
    pub fn new(
        chain_id: u64,
        config: &RpcSourceConfig,
        http_client: reqwest::Client,
    ) -> Result<Self, SourceError> {
        if !AddressFormat::Evm.is_valid(&config.contract_address) {
            return Err(SourceError::Config(format!(
                "invalid bridge contract address {:?}",
                config.contract_address
            )));
        }
        if config.max_block_range == 0 {
            return Err(SourceError::Config("max_block_range must be positive".into()));
        }
        Ok(Self {
            chain_id,
            rpc_url: config.rpc_url.clone(),
            contract_address: config.contract_address.to_ascii_lowercase(),
            topic0: format!("0x{}", hex::encode(keccak256(DEPOSIT_EVENT_SIGNATURE.as_bytes()))),
            confirmations: config.confirmations,
            max_block_range: config.max_block_range,
            next_block: config.start_block,
            request_id: 0,
            http_client,
        })
    }

    async fn call<P: Serialize, T: for<'de> Deserialize<'de>>(
        &mut self,
        method: &'static str,
        params: P,
    ) -> Result<T, SourceError> {
        #[derive(Serialize)]
        struct Request<'a, P> {
            jsonrpc: &'static str,
            id: u64,
            method: &'a str,
            params: P,
        }

        #[derive(Deserialize)]
        struct Response<T> {
            result: Option<T>,
            error: Option<RpcErrorObject>,
        }

        #[derive(Deserialize)]
        struct RpcErrorObject {
            code: i64,
            message: String,
        }

        self.request_id += 1;
        let response: Response<T> = self
            .http_client
            .post(self.rpc_url.clone())
            .json(&Request {
                jsonrpc: "2.0",
                id: self.request_id,
                method,
                params,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match (response.result, response.error) {
            (_, Some(err)) => Err(SourceError::Rpc {
                code: err.code,
                message: err.message,
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(SourceError::Decode(format!("{method}: empty result"))),
        }
    }
}

#[async_trait]
impl ChainSource for RpcChainSource {
    async fn fetch_new_deposits(&mut self) -> Result<Vec<RawDeposit>, SourceError> {
        let head: String = self.call("eth_blockNumber", serde_json::json!([])).await?;
        let safe_head = parse_quantity(&head)?.saturating_sub(self.confirmations);
        let from = self.next_block.unwrap_or(safe_head);
        if from > safe_head {
            return Ok(Vec::new());
        }
        let to = safe_head.min(from.saturating_add(self.max_block_range - 1));

        let filter = serde_json::json!([{
            "address": self.contract_address,
            "topics": [self.topic0],
            "fromBlock": format!("0x{from:x}"),
            "toBlock": format!("0x{to:x}"),
        }]);
        let mut logs: Vec<RpcLog> = self.call("eth_getLogs", filter).await?;
        logs.retain(|log| !log.removed);
        logs.sort_by_key(|log| {
            (
                log.block_number.as_deref().and_then(|n| parse_quantity(n).ok()),
                log.log_index.as_deref().and_then(|n| parse_quantity(n).ok()),
            )
        });

        // One undecodable log fails the whole range so the cursor stays put
        // and no deposit is skipped.
        let mut deposits = Vec::with_capacity(logs.len());
        for log in logs {
            match decode_deposit_log(&log) {
                Ok(deposit) => deposits.push(deposit),
                Err(e) => {
                    warn!(
                        chain_id = self.chain_id,
                        tx_hash = ?log.transaction_hash,
                        from_block = from,
                        to_block = to,
                        error = %e,
                        "Undecodable Deposit log, range will be retried"
                    );
                    return Err(e);
                }
            }
        }

        debug!(
            chain_id = self.chain_id,
            from_block = from,
            to_block = to,
            deposits = deposits.len(),
            "Scanned Deposit logs"
        );
        self.next_block = Some(to + 1);
        Ok(deposits)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
    transaction_hash: Option<String>,
    log_index: Option<String>,
    #[serde(default)]
    removed: bool,
}

/// Parse a JSON-RPC hex quantity such as `"0x1b4"`.
fn parse_quantity(s: &str) -> Result<u64, SourceError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| SourceError::Decode(format!("quantity without 0x prefix: {s}")))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| SourceError::Decode(format!("invalid quantity {s}: {e}")))
}

fn decode_word(s: &str) -> Result<[u8; 32], SourceError> {
    let mut word = [0u8; 32];
    hex::decode_to_slice(s.strip_prefix("0x").unwrap_or(s), &mut word)
        .map_err(|e| SourceError::Decode(format!("invalid 32-byte word: {e}")))?;
    Ok(word)
}

fn word_to_address(word: &[u8]) -> Result<String, SourceError> {
    if word[..12].iter().any(|b| *b != 0) {
        return Err(SourceError::Decode("address word has dirty high bytes".into()));
    }
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&word[12..32]);
    Ok(to_checksum_address(&bytes))
}

/// Recipients are `bytes32`: a zero-padded 20-byte value is rendered as an
/// EVM address, anything wider as a full 32-byte account address.
fn word_to_recipient(word: &[u8]) -> String {
    match word_to_address(word) {
        Ok(address) => address,
        Err(_) => format!("0x{}", hex::encode(word)),
    }
}

fn word_to_u128(word: &[u8]) -> Result<u128, SourceError> {
    if word[..16].iter().any(|b| *b != 0) {
        return Err(SourceError::Decode("amount exceeds 128 bits".into()));
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&word[16..32]);
    Ok(u128::from_be_bytes(bytes))
}

fn word_to_u64(word: &[u8]) -> Result<u64, SourceError> {
    if word[..24].iter().any(|b| *b != 0) {
        return Err(SourceError::Decode("chain id exceeds 64 bits".into()));
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&word[24..32]);
    Ok(u64::from_be_bytes(bytes))
}

fn decode_deposit_log(log: &RpcLog) -> Result<RawDeposit, SourceError> {
    let [_, depositor, recipient, ..] = log.topics.as_slice() else {
        return Err(SourceError::Decode(format!(
            "expected 3 topics, got {}",
            log.topics.len()
        )));
    };
    let data = hex::decode(log.data.strip_prefix("0x").unwrap_or(&log.data))
        .map_err(|e| SourceError::Decode(format!("invalid log data: {e}")))?;
    if data.len() < 96 {
        return Err(SourceError::Decode(format!(
            "expected 96 bytes of log data, got {}",
            data.len()
        )));
    }
    let transaction_hash = log
        .transaction_hash
        .clone()
        .ok_or_else(|| SourceError::Decode("log without transaction hash".into()))?;

    Ok(RawDeposit {
        transaction_hash,
        depositor: word_to_address(&decode_word(depositor)?)?,
        recipient: word_to_recipient(&decode_word(recipient)?),
        token_address: word_to_address(&data[0..32])?,
        amount: word_to_u128(&data[32..64])?,
        destination_chain_id: word_to_u64(&data[64..96])?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::post};
    use serde_json::{Value, json};

    const DEPOSITOR: &str = "5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
    const RECIPIENT: &str = "fb6916095ca1df60bb79ce92ce3ea74c37c5d359";
    const TOKEN: &str = "a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

    fn padded(hex_body: &str) -> String {
        format!("0x{hex_body:0>64}")
    }

    fn sample_log(block: u64, index: u64, amount: u128) -> Value {
        let data = format!("0x{TOKEN:0>64}{amount:0>64x}{:0>64x}", 137u64);
        json!({
            "address": "0x1111111111111111111111111111111111111111",
            "topics": [
                "0x00",
                padded(DEPOSITOR),
                padded(RECIPIENT),
            ],
            "data": data,
            "blockNumber": format!("0x{block:x}"),
            "transactionHash": format!("0x{:064x}", block * 100 + index),
            "logIndex": format!("0x{index:x}"),
        })
    }

    #[test]
    fn test_decode_deposit_log() {
        let log: RpcLog = serde_json::from_value(sample_log(10, 0, 2_500_000)).unwrap();
        let deposit = decode_deposit_log(&log).unwrap();
        assert_eq!(deposit.depositor, "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
        assert_eq!(deposit.recipient, "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359");
        assert!(AddressFormat::Evm.is_valid(&deposit.token_address));
        assert_eq!(deposit.amount, 2_500_000);
        assert_eq!(deposit.destination_chain_id, 137);
    }

    #[test]
    fn test_wide_recipient_is_kept_whole() {
        let word = [0xabu8; 32];
        let recipient = word_to_recipient(&word);
        assert_eq!(recipient.len(), 66);
        assert!(AddressFormat::Move.is_valid(&recipient));
    }

    #[test]
    fn test_decode_rejects_short_data() {
        let mut log: RpcLog = serde_json::from_value(sample_log(10, 0, 1)).unwrap();
        log.data = "0x00".to_string();
        assert!(matches!(decode_deposit_log(&log), Err(SourceError::Decode(_))));
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x1b4").unwrap(), 436);
        assert!(parse_quantity("1b4").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_invalid_contract_address_is_config_error() {
        let config = RpcSourceConfig {
            rpc_url: "http://127.0.0.1:8545".parse().unwrap(),
            contract_address: "0xSourceBridgeContractAddress...".to_string(),
            confirmations: 0,
            max_block_range: 100,
            start_block: None,
        };
        assert!(matches!(
            RpcChainSource::new(1, &config, reqwest::Client::new()),
            Err(SourceError::Config(_))
        ));
    }

    /// Serves a fixed head and the given logs, and records every
    /// `eth_getLogs` filter it receives.
    async fn spawn_node(
        head: u64,
        logs: Value,
        filters: std::sync::Arc<std::sync::Mutex<Vec<Value>>>,
    ) -> Url {
        let app = Router::new().route(
            "/",
            post(move |Json(req): Json<Value>| {
                let filters = filters.clone();
                let logs = logs.clone();
                async move {
                    let result = match req["method"].as_str() {
                        Some("eth_blockNumber") => json!(format!("0x{head:x}")),
                        Some("eth_getLogs") => {
                            filters.lock().unwrap().push(req["params"][0].clone());
                            logs
                        }
                        _ => Value::Null,
                    };
                    Json(json!({"jsonrpc": "2.0", "id": req["id"], "result": result}))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/").parse().unwrap()
    }

    #[tokio::test]
    async fn test_fetch_orders_logs_and_advances_cursor() {
        let filters = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let logs = json!([sample_log(12, 1, 20), sample_log(11, 0, 10)]);
        let url = spawn_node(20, logs, filters.clone()).await;
        let config = RpcSourceConfig {
            rpc_url: url,
            contract_address: "0x1111111111111111111111111111111111111111".to_string(),
            confirmations: 5,
            max_block_range: 4,
            start_block: Some(10),
        };
        let mut source = RpcChainSource::new(1, &config, reqwest::Client::new()).unwrap();

        let deposits = source.fetch_new_deposits().await.unwrap();
        assert_eq!(
            deposits.iter().map(|d| d.amount).collect::<Vec<_>>(),
            vec![10, 20]
        );

        source.fetch_new_deposits().await.unwrap();
        let filters = filters.lock().unwrap();
        assert_eq!(filters[0]["fromBlock"], "0xa");
        assert_eq!(filters[0]["toBlock"], "0xd");
        assert_eq!(filters[1]["fromBlock"], "0xe");
        // head 20 minus 5 confirmations
        assert_eq!(filters[1]["toBlock"], "0xf");
    }

    #[tokio::test]
    async fn test_undecodable_log_keeps_cursor() {
        let filters = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut broken = sample_log(12, 1, 20);
        broken["data"] = json!("0x00");
        let url = spawn_node(20, json!([sample_log(11, 0, 10), broken]), filters.clone()).await;
        let config = RpcSourceConfig {
            rpc_url: url,
            contract_address: "0x1111111111111111111111111111111111111111".to_string(),
            confirmations: 5,
            max_block_range: 4,
            start_block: Some(10),
        };
        let mut source = RpcChainSource::new(1, &config, reqwest::Client::new()).unwrap();

        assert!(matches!(
            source.fetch_new_deposits().await,
            Err(SourceError::Decode(_))
        ));
        assert!(source.fetch_new_deposits().await.is_err());
        let filters = filters.lock().unwrap();
        assert_eq!(filters[0]["fromBlock"], "0xa");
        assert_eq!(filters[1]["fromBlock"], "0xa");
    }
}
