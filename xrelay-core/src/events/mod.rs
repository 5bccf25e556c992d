//! Event types and channel infrastructure for the processing pipeline.
//!
//! # Event Flow
//!
//! 1. `ChainListener` polls its source and sends `DepositEvent`s into the
//!    chain's lane channel
//! 2. `Lane` validates, enriches and dispatches each event in nonce order,
//!    sending a `SigningRequest` to the signing queue
//! 3. `Lane` queues a `ReportPayload` for the monitoring endpoint
//! 4. `Lane` broadcasts a `ProcessedEvent` with the terminal `Outcome`

pub mod channels;
pub mod types;

pub use channels::{
    DEFAULT_CHANNEL_BUFFER, DepositReceiver, DepositSender, ReportPayloadReceiver,
    ReportPayloadSender, SigningRequestReceiver, SigningRequestSender, deposit_channel,
    processed_event_channel, report_channel, signing_request_channel,
};

pub use types::{EnrichedDeposit, EventState, Outcome, PriceQuote, ProcessedEvent};
