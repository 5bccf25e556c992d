//! Per-chain address grammars.

use serde::{Deserialize, Serialize};
use tiny_keccak::{Hasher, Keccak};

/// The address grammar a chain uses for accounts and contracts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFormat {
    /// `0x` followed by 40 hex characters, EIP-55 checksummed when mixed-case.
    #[default]
    Evm,
    /// `0x` followed by 1 to 64 hex characters (Move-family account addresses).
    Move,
}

impl AddressFormat {
    /// Returns `true` if `address` is well-formed for this format.
    pub fn is_valid(self, address: &str) -> bool {
        let Some(body) = address.strip_prefix("0x") else {
            return false;
        };
        match self {
            AddressFormat::Evm => {
                body.len() == 40
                    && body.bytes().all(|b| b.is_ascii_hexdigit())
                    && evm_checksum_ok(body)
            }
            AddressFormat::Move => {
                (1..=64).contains(&body.len()) && body.bytes().all(|b| b.is_ascii_hexdigit())
            }
        }
    }
}

impl std::fmt::Display for AddressFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFormat::Evm => write!(f, "evm"),
            AddressFormat::Move => write!(f, "move"),
        }
    }
}

/// Keccak-256 of `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// EIP-55: single-case bodies carry no checksum; mixed-case bodies must
/// uppercase exactly the letters whose hash nibble is >= 8.
fn evm_checksum_ok(body: &str) -> bool {
    let has_lower = body.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = body.bytes().any(|b| b.is_ascii_uppercase());
    if !(has_lower && has_upper) {
        return true;
    }
    to_checksum_body(body) == body
}

fn to_checksum_body(body: &str) -> String {
    let lower = body.to_ascii_lowercase();
    let hash = keccak256(lower.as_bytes());
    lower
        .char_indices()
        .map(|(i, c)| {
            let nibble = (hash[i / 2] >> if i % 2 == 0 { 4 } else { 0 }) & 0x0f;
            if c.is_ascii_alphabetic() && nibble >= 8 {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect()
}

/// Render a 20-byte EVM address in EIP-55 checksummed form.
pub fn to_checksum_address(bytes: &[u8; 20]) -> String {
    format!("0x{}", to_checksum_body(&hex::encode(bytes)))
}
