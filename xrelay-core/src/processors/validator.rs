//! EventValidator: the pure accept/reject gate in front of every lane.

use crate::config::RelayConfig;
use std::collections::HashMap;
use thiserror::Error;
use xrelay_sdk::objects::{AddressFormat, DepositEvent};

/// Why an event was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("deposit amount is zero")]
    ZeroAmount,

    #[error("source and destination are both chain {chain_id}")]
    SameChain { chain_id: u64 },

    #[error("depositor {address:?} is not a valid {format} address")]
    MalformedDepositor {
        address: String,
        format: AddressFormat,
    },

    #[error("recipient {address:?} is not a valid {format} address")]
    MalformedRecipient {
        address: String,
        format: AddressFormat,
    },
}

/// Checks structural validity of deposits against the chain registry.
///
/// Holds no mutable state; the same event always gets the same answer.
#[derive(Debug, Clone, Default)]
pub struct EventValidator {
    formats: HashMap<u64, AddressFormat>,
}

impl EventValidator {
    pub fn new(config: &RelayConfig) -> Self {
        Self::with_formats(
            config
                .chains
                .iter()
                .map(|chain| (chain.chain_id, chain.address_format)),
        )
    }

    pub fn with_formats(formats: impl IntoIterator<Item = (u64, AddressFormat)>) -> Self {
        Self {
            formats: formats.into_iter().collect(),
        }
    }

    fn format_of(&self, chain_id: u64) -> AddressFormat {
        self.formats.get(&chain_id).copied().unwrap_or_default()
    }

    pub fn validate(&self, event: &DepositEvent) -> Result<(), Rejection> {
        if event.amount == 0 {
            return Err(Rejection::ZeroAmount);
        }
        if event.source_chain_id == event.destination_chain_id {
            return Err(Rejection::SameChain {
                chain_id: event.source_chain_id,
            });
        }

        let source_format = self.format_of(event.source_chain_id);
        if !source_format.is_valid(&event.depositor) {
            return Err(Rejection::MalformedDepositor {
                address: event.depositor.clone(),
                format: source_format,
            });
        }

        let destination_format = self.format_of(event.destination_chain_id);
        if !destination_format.is_valid(&event.recipient) {
            return Err(Rejection::MalformedRecipient {
                address: event.recipient.clone(),
                format: destination_format,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPOSITOR: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
    const APTOS_RECIPIENT: &str =
        "0x1d8727df513fa2a8785d0834e40b34223daff1affc079574082baadb74b66ee4";

    fn validator() -> EventValidator {
        EventValidator::with_formats([(1, AddressFormat::Evm), (22, AddressFormat::Move)])
    }

    fn event() -> DepositEvent {
        DepositEvent {
            transaction_hash: "0xabc".to_string(),
            source_chain_id: 1,
            destination_chain_id: 137,
            depositor: DEPOSITOR.to_string(),
            recipient: "0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359".to_string(),
            token_address: "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".to_string(),
            amount: 1_000_000,
            nonce: 1,
        }
    }

    #[test]
    fn test_accepts_well_formed_event() {
        assert_eq!(validator().validate(&event()), Ok(()));
    }

    #[test]
    fn test_rejects_zero_amount() {
        let mut e = event();
        e.amount = 0;
        assert_eq!(validator().validate(&e), Err(Rejection::ZeroAmount));
    }

    #[test]
    fn test_rejects_same_chain() {
        let mut e = event();
        e.destination_chain_id = 1;
        assert_eq!(
            validator().validate(&e),
            Err(Rejection::SameChain { chain_id: 1 })
        );
    }

    #[test]
    fn test_rejects_bad_checksum_depositor() {
        let mut e = event();
        e.depositor = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAeD".to_string();
        assert!(matches!(
            validator().validate(&e),
            Err(Rejection::MalformedDepositor { .. })
        ));
    }

    #[test]
    fn test_recipient_checked_against_destination_format() {
        let mut e = event();
        e.destination_chain_id = 22;
        e.recipient = APTOS_RECIPIENT.to_string();
        assert_eq!(validator().validate(&e), Ok(()));

        // A Move address is not an EVM address.
        e.destination_chain_id = 137;
        assert!(matches!(
            validator().validate(&e),
            Err(Rejection::MalformedRecipient { .. })
        ));
    }

    #[test]
    fn test_validation_is_repeatable() {
        let v = validator();
        let mut e = event();
        e.amount = 0;
        assert_eq!(v.validate(&e), v.validate(&e));
    }
}
