use serde::{Deserialize, Serialize};

/// A token deposit observed on a source chain.
///
/// Constructed once by a chain listener and never mutated afterwards;
/// anything learned later (prices, outcomes) travels next to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepositEvent {
    pub transaction_hash: String,
    pub source_chain_id: u64,
    pub destination_chain_id: u64,
    pub depositor: String,
    pub recipient: String,
    pub token_address: String,
    /// Smallest-unit amount, no decimal scaling applied.
    #[serde(with = "amount_string")]
    pub amount: u128,
    /// Per-chain sequence number assigned by the listener.
    pub nonce: u64,
}

/// A deposit as reported by a chain source, before the listener assigns it a
/// nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDeposit {
    pub transaction_hash: String,
    pub destination_chain_id: u64,
    pub depositor: String,
    pub recipient: String,
    pub token_address: String,
    pub amount: u128,
}

impl RawDeposit {
    pub fn into_event(self, source_chain_id: u64, nonce: u64) -> DepositEvent {
        DepositEvent {
            transaction_hash: self.transaction_hash,
            source_chain_id,
            destination_chain_id: self.destination_chain_id,
            depositor: self.depositor,
            recipient: self.recipient,
            token_address: self.token_address,
            amount: self.amount,
            nonce,
        }
    }
}

impl DepositEvent {
    /// The `(source_chain_id, nonce)` pair that identifies this event.
    pub fn key(&self) -> (u64, u64) {
        (self.source_chain_id, self.nonce)
    }
}

/// `u128` amounts travel as decimal strings so JSON consumers never round them.
pub mod amount_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_serializes_as_string() {
        let event = RawDeposit {
            transaction_hash: "0xabc".to_string(),
            destination_chain_id: 137,
            depositor: "0x01".to_string(),
            recipient: "0x02".to_string(),
            token_address: "0x03".to_string(),
            amount: u128::MAX,
        }
        .into_event(1, 9);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["amount"], u128::MAX.to_string());
        assert_eq!(json["nonce"], 9);

        let back: DepositEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.key(), (1, 9));
    }
}
