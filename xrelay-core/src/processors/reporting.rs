//! ReportingSink and the ReportSender task behind it.
//!
//! Reporting is best effort from end to end: lanes `try_send` into a
//! bounded queue and drop the report when it is full; the sender task logs
//! delivery failures and never retries.

use crate::config::ReportingConfig;
use crate::events::{ReportPayloadReceiver, ReportPayloadSender};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use url::Url;
use xrelay_sdk::objects::{DepositEvent, ReportPayload, ReportStatus};
use xrelay_sdk::signature::{SIGNATURE_HEADER, SignedBody};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("monitoring endpoint answered with status {0}")]
    Status(reqwest::StatusCode),

    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Non-blocking handle lanes use to queue reports.
#[derive(Debug, Clone)]
pub struct ReportingSink {
    tx: ReportPayloadSender,
}

impl ReportingSink {
    pub fn new(tx: ReportPayloadSender) -> Self {
        Self { tx }
    }

    /// Queue a report for `event`. Returns `false` if it was dropped.
    pub fn report(
        &self,
        event: &DepositEvent,
        status: ReportStatus,
        value_usd: Option<Decimal>,
    ) -> bool {
        let payload = ReportPayload::new(event, value_usd, status);
        match self.tx.try_send(payload) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    chain_id = event.source_chain_id,
                    nonce = event.nonce,
                    %status,
                    "Report queue full, dropping report"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(
                    chain_id = event.source_chain_id,
                    nonce = event.nonce,
                    %status,
                    "Report queue closed, dropping report"
                );
                false
            }
        }
    }
}

/// Delivers queued reports to the monitoring endpoint.
pub struct ReportSender {
    rx: ReportPayloadReceiver,
    http_client: reqwest::Client,
    url: Option<Url>,
    secret: Option<Box<[u8]>>,
}

impl ReportSender {
    pub fn new(
        rx: ReportPayloadReceiver,
        http_client: reqwest::Client,
        config: &ReportingConfig,
    ) -> Self {
        Self {
            rx,
            http_client,
            url: config.url.clone(),
            secret: config.secret.clone(),
        }
    }

    /// Run until every sink is dropped and the queue is empty.
    pub async fn run(mut self) {
        info!("ReportSender started");
        while let Some(payload) = self.rx.recv().await {
            let Some(url) = &self.url else {
                debug!(
                    tx_hash = %payload.tx_hash,
                    status = %payload.status,
                    "Report (no monitoring endpoint configured)"
                );
                continue;
            };
            match self.send_report(url, &payload).await {
                Ok(()) => debug!(tx_hash = %payload.tx_hash, status = %payload.status, "Report delivered"),
                Err(e) => warn!(
                    tx_hash = %payload.tx_hash,
                    status = %payload.status,
                    error = %e,
                    "Report delivery failed"
                ),
            }
        }
        info!("ReportSender shutdown complete");
    }

    async fn send_report(&self, url: &Url, payload: &ReportPayload) -> Result<(), ReportError> {
        let mut request = self
            .http_client
            .post(url.clone())
            .header("Content-Type", "application/json");

        let body = match &self.secret {
            Some(secret) => {
                let signed = SignedBody::new(payload, secret)?;
                request = request.header(SIGNATURE_HEADER, signed.to_header());
                signed.json
            }
            None => serde_json::to_string(payload)?,
        };

        let response = request.body(body).send().await?;
        // Only an exact 200 counts as delivered.
        match response.status() {
            reqwest::StatusCode::OK => Ok(()),
            status => Err(ReportError::Status(status)),
        }
    }
}
