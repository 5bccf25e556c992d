//! Event channel factories and handles.
//!
//! Every queue between tasks is bounded so that a slow consumer pushes back
//! on its producer instead of growing memory.

use super::types::ProcessedEvent;
use tokio::sync::{broadcast, mpsc};
use xrelay_sdk::objects::{DepositEvent, ReportPayload, SigningRequest};

/// Default buffer size for the processed-event broadcast.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle feeding one chain's lane.
pub type DepositSender = mpsc::Sender<DepositEvent>;
/// Receiver handle owned by one chain's lane.
pub type DepositReceiver = mpsc::Receiver<DepositEvent>;

/// Sender handle for signing requests.
pub type SigningRequestSender = mpsc::Sender<SigningRequest>;
/// Receiver handle for signing requests.
pub type SigningRequestReceiver = mpsc::Receiver<SigningRequest>;

/// Sender handle for monitoring reports.
pub type ReportPayloadSender = mpsc::Sender<ReportPayload>;
/// Receiver handle for monitoring reports.
pub type ReportPayloadReceiver = mpsc::Receiver<ReportPayload>;

/// Create a lane channel holding at most `max_pending` queued events.
///
/// A full channel makes the listener's send wait, which delays its next poll.
pub fn deposit_channel(max_pending: usize) -> (DepositSender, DepositReceiver) {
    mpsc::channel(max_pending.max(1))
}

/// Create the signing request queue.
pub fn signing_request_channel(size: usize) -> (SigningRequestSender, SigningRequestReceiver) {
    mpsc::channel(size.max(1))
}

/// Create the report queue.
pub fn report_channel(size: usize) -> (ReportPayloadSender, ReportPayloadReceiver) {
    mpsc::channel(size.max(1))
}

/// Create the processed-event broadcast.
///
/// Slow subscribers lag and lose the oldest notifications; lanes never wait
/// on them.
pub fn processed_event_channel() -> broadcast::Sender<ProcessedEvent> {
    let (tx, _) = broadcast::channel(DEFAULT_CHANNEL_BUFFER);
    tx
}
