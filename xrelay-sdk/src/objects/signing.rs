//! Signing requests handed to the validator network.
//!
//! The payload hash is the identifier validators sign and de-duplicate on.
//! It is Keccak-256 over the canonical encoding
//!
//! ```text
//! {recipient}-{token_address}-{amount}-{nonce}-{destination_chain_id}
//! ```
//!
//! with both addresses lowercased and all numbers in base 10, so a retried
//! dispatch of the same deposit always produces the same request.

use super::address::keccak256;
use super::deposit::{DepositEvent, amount_string};
use serde::{Deserialize, Serialize};

/// A 32-byte Keccak-256 payload identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadHash(pub [u8; 32]);

impl std::fmt::Display for PayloadHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for PayloadHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PayloadHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let body = s.strip_prefix("0x").unwrap_or(&s);
        let mut out = [0u8; 32];
        hex::decode_to_slice(body, &mut out).map_err(serde::de::Error::custom)?;
        Ok(PayloadHash(out))
    }
}

/// The one-way message sent to the validator network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningRequest {
    pub recipient: String,
    pub token_address: String,
    #[serde(with = "amount_string")]
    pub amount: u128,
    pub nonce: u64,
    pub dest_chain_id: u64,
    pub payload_hash: PayloadHash,
}

impl SigningRequest {
    /// Derive the request for `event`.
    pub fn from_event(event: &DepositEvent) -> Self {
        Self {
            recipient: event.recipient.clone(),
            token_address: event.token_address.clone(),
            amount: event.amount,
            nonce: event.nonce,
            dest_chain_id: event.destination_chain_id,
            payload_hash: payload_hash(
                &event.recipient,
                &event.token_address,
                event.amount,
                event.nonce,
                event.destination_chain_id,
            ),
        }
    }
}

/// Canonical payload identifier for the signing tuple.
pub fn payload_hash(
    recipient: &str,
    token_address: &str,
    amount: u128,
    nonce: u64,
    destination_chain_id: u64,
) -> PayloadHash {
    let message = format!(
        "{}-{}-{}-{}-{}",
        recipient.to_ascii_lowercase(),
        token_address.to_ascii_lowercase(),
        amount,
        nonce,
        destination_chain_id
    );
    PayloadHash(keccak256(message.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::deposit::RawDeposit;

    fn sample(nonce: u64) -> DepositEvent {
        RawDeposit {
            transaction_hash: "0x01".to_string(),
            destination_chain_id: 137,
            depositor: "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".to_string(),
            recipient: "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359".to_string(),
            token_address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".to_string(),
            amount: 2_500_000,
        }
        .into_event(1, nonce)
    }

    #[test]
    fn test_payload_hash_is_deterministic() {
        let a = SigningRequest::from_event(&sample(4));
        let b = SigningRequest::from_event(&sample(4));
        assert_eq!(a, b);
        assert_eq!(a.payload_hash.to_string().len(), 66);
    }

    #[test]
    fn test_payload_hash_ignores_address_case_and_tx_hash() {
        let mut event = sample(4);
        let original = SigningRequest::from_event(&event).payload_hash;
        event.recipient = event.recipient.to_ascii_lowercase();
        event.transaction_hash = "0xffff".to_string();
        assert_eq!(SigningRequest::from_event(&event).payload_hash, original);
    }

    #[test]
    fn test_payload_hash_covers_every_tuple_field() {
        let base = payload_hash("0xaa", "0xbb", 10, 1, 137);
        assert_ne!(base, payload_hash("0xab", "0xbb", 10, 1, 137));
        assert_ne!(base, payload_hash("0xaa", "0xbc", 10, 1, 137));
        assert_ne!(base, payload_hash("0xaa", "0xbb", 11, 1, 137));
        assert_ne!(base, payload_hash("0xaa", "0xbb", 10, 2, 137));
        assert_ne!(base, payload_hash("0xaa", "0xbb", 10, 1, 1));
    }

    #[test]
    fn test_wire_shape() {
        let request = SigningRequest::from_event(&sample(4));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["amount"], "2500000");
        assert_eq!(json["destChainId"], 137);
        assert_eq!(json["payloadHash"], request.payload_hash.to_string());

        let back: SigningRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, request);
    }
}
