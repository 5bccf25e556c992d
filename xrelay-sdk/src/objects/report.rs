use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::deposit::DepositEvent;

/// Status carried by a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    /// Validated, dispatched for signing and handed to reporting.
    Processed,
    /// Validated but the signing request could not be queued.
    DispatchFailed,
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportStatus::Processed => write!(f, "PROCESSED"),
            ReportStatus::DispatchFailed => write!(f, "DISPATCH_FAILED"),
        }
    }
}

/// Body POSTed to the monitoring endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    pub tx_hash: String,
    pub source_chain: u64,
    pub dest_chain: u64,
    pub amount: String,
    /// `null` when no price was available.
    #[serde(with = "rust_decimal::serde::float_option")]
    pub value_usd: Option<Decimal>,
    pub status: ReportStatus,
}

impl ReportPayload {
    pub fn new(event: &DepositEvent, value_usd: Option<Decimal>, status: ReportStatus) -> Self {
        Self {
            tx_hash: event.transaction_hash.clone(),
            source_chain: event.source_chain_id,
            dest_chain: event.destination_chain_id,
            amount: event.amount.to_string(),
            value_usd,
            status,
        }
    }
}
