//! Event type definitions for the processing pipeline.

use crate::processors::dispatcher::DispatchError;
use crate::processors::validator::Rejection;
use rust_decimal::Decimal;
use std::sync::Arc;
use xrelay_sdk::objects::{DepositEvent, PayloadHash};

/// Where an event is in its trip through a lane.
///
/// ```text
/// Received -> Validated -> Enriched -> Dispatched -> Reported -> Done
///     |                        |
///     v                        v
///  Rejected                  Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventState {
    Received,
    Validated,
    Enriched,
    Dispatched,
    Reported,
    Done,
    Rejected,
    Failed,
}

impl EventState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EventState::Done | EventState::Rejected | EventState::Failed
        )
    }
}

impl std::fmt::Display for EventState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventState::Received => "received",
            EventState::Validated => "validated",
            EventState::Enriched => "enriched",
            EventState::Dispatched => "dispatched",
            EventState::Reported => "reported",
            EventState::Done => "done",
            EventState::Rejected => "rejected",
            EventState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result of a price lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceQuote {
    /// USD price of one whole token.
    Available(Decimal),
    Unavailable,
}

impl PriceQuote {
    /// USD value of `amount` smallest units with `decimals` decimals.
    ///
    /// `None` when no price is known or the value does not fit a `Decimal`.
    pub fn value_of(self, amount: u128, decimals: u32) -> Option<Decimal> {
        let PriceQuote::Available(price) = self else {
            return None;
        };
        let amount = i128::try_from(amount).ok()?;
        let units = Decimal::try_from_i128_with_scale(amount, decimals).ok()?;
        units.checked_mul(price).map(|v| v.normalize())
    }
}

/// A validated deposit plus what enrichment learned about it.
///
/// The event itself is shared, never copied into or modified.
#[derive(Debug, Clone)]
pub struct EnrichedDeposit {
    pub event: Arc<DepositEvent>,
    pub price: PriceQuote,
    pub value_usd: Option<Decimal>,
}

/// Terminal result of processing one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done {
        payload_hash: PayloadHash,
        value_usd: Option<Decimal>,
    },
    Rejected(Rejection),
    Failed(DispatchError),
    /// The lane already moved past this nonce; the event was not processed.
    Duplicate,
}

impl Outcome {
    /// Terminal state this outcome corresponds to, `None` for duplicates,
    /// which never entered the state machine.
    pub fn state(&self) -> Option<EventState> {
        match self {
            Outcome::Done { .. } => Some(EventState::Done),
            Outcome::Rejected(_) => Some(EventState::Rejected),
            Outcome::Failed(_) => Some(EventState::Failed),
            Outcome::Duplicate => None,
        }
    }
}

/// Broadcast after every event reaches a terminal state.
#[derive(Debug, Clone)]
pub struct ProcessedEvent {
    pub chain_id: u64,
    pub nonce: u64,
    pub transaction_hash: String,
    pub outcome: Outcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_of_scales_by_decimals() {
        let quote = PriceQuote::Available(Decimal::new(2, 0));
        // 1.5 USDC at $2
        assert_eq!(quote.value_of(1_500_000, 6), Some(Decimal::new(3, 0)));
    }

    #[test]
    fn test_value_of_unavailable_is_unknown() {
        assert_eq!(PriceQuote::Unavailable.value_of(1_500_000, 6), None);
    }

    #[test]
    fn test_value_of_overflow_is_unknown() {
        let quote = PriceQuote::Available(Decimal::MAX);
        assert_eq!(quote.value_of(u128::MAX, 0), None);
        assert_eq!(quote.value_of(10, 40), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(EventState::Done.is_terminal());
        assert!(EventState::Rejected.is_terminal());
        assert!(EventState::Failed.is_terminal());
        assert!(!EventState::Dispatched.is_terminal());
        assert!(!EventState::Reported.is_terminal());
    }

    #[test]
    fn test_duplicate_has_no_state() {
        assert_eq!(Outcome::Duplicate.state(), None);
        assert_eq!(
            Outcome::Rejected(Rejection::ZeroAmount).state(),
            Some(EventState::Rejected)
        );
        assert_eq!(
            Outcome::Failed(DispatchError::QueueFull).state(),
            Some(EventState::Failed)
        );
    }
}
