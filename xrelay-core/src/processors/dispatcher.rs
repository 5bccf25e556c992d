//! SigningRequestDispatcher and the SigningSender task behind it.
//!
//! Lanes never talk to the validator network directly. They enqueue a
//! [`SigningRequest`] on a bounded queue (waiting at most
//! `enqueue_timeout`) and move on; the [`SigningSender`] drains the queue
//! into a [`SigningChannel`], retrying failed deliveries with exponential
//! backoff. The payload hash identifies a request, so a retried delivery is
//! idempotent downstream.

use crate::config::SigningConfig;
use crate::events::{SigningRequestReceiver, SigningRequestSender};
use crate::utils::backoff::retry_delay;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, error, info, warn};
use url::Url;
use xrelay_sdk::objects::{DepositEvent, SigningRequest};
use xrelay_sdk::signature::{SIGNATURE_HEADER, SignedBody};

/// The signing request could not be handed to the sender task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("signing queue stayed full past the enqueue timeout")]
    QueueFull,

    #[error("signing queue is closed")]
    ChannelClosed,
}

/// Errors from a single delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("signing endpoint answered with status {0}")]
    Status(reqwest::StatusCode),

    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Derives signing requests and queues them for delivery.
#[derive(Debug, Clone)]
pub struct SigningRequestDispatcher {
    tx: SigningRequestSender,
    enqueue_timeout: Duration,
}

impl SigningRequestDispatcher {
    pub fn new(tx: SigningRequestSender, enqueue_timeout: Duration) -> Self {
        Self {
            tx,
            enqueue_timeout,
        }
    }

    /// Queue the signing request for `event` and return it.
    ///
    /// Returns once the request is queued; delivery happens later on the
    /// sender task.
    pub async fn dispatch(&self, event: &DepositEvent) -> Result<SigningRequest, DispatchError> {
        let request = SigningRequest::from_event(event);
        match self
            .tx
            .send_timeout(request.clone(), self.enqueue_timeout)
            .await
        {
            Ok(()) => {
                debug!(
                    chain_id = event.source_chain_id,
                    nonce = event.nonce,
                    payload_hash = %request.payload_hash,
                    "Signing request queued"
                );
                Ok(request)
            }
            Err(SendTimeoutError::Timeout(_)) => Err(DispatchError::QueueFull),
            Err(SendTimeoutError::Closed(_)) => Err(DispatchError::ChannelClosed),
        }
    }
}

/// Outbound transport to the validator network.
#[async_trait]
pub trait SigningChannel: Send + Sync {
    async fn deliver(&self, request: &SigningRequest) -> Result<(), DeliveryError>;
}

/// POSTs each request as JSON, HMAC-signed when a secret is configured.
pub struct HttpSigningChannel {
    http_client: reqwest::Client,
    endpoint: Url,
    secret: Option<Box<[u8]>>,
}

impl HttpSigningChannel {
    pub fn new(http_client: reqwest::Client, endpoint: Url, secret: Option<Box<[u8]>>) -> Self {
        Self {
            http_client,
            endpoint,
            secret,
        }
    }
}

#[async_trait]
impl SigningChannel for HttpSigningChannel {
    async fn deliver(&self, request: &SigningRequest) -> Result<(), DeliveryError> {
        let mut builder = self
            .http_client
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json");

        let body = match &self.secret {
            Some(secret) => {
                let signed = SignedBody::new(request, secret)?;
                builder = builder.header(SIGNATURE_HEADER, signed.to_header());
                signed.json
            }
            None => serde_json::to_string(request)?,
        };

        let response = builder.body(body).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status(status))
        }
    }
}

/// Logs requests instead of sending them. Used when no endpoint is set.
#[derive(Debug, Default)]
pub struct LoggingSigningChannel;

#[async_trait]
impl SigningChannel for LoggingSigningChannel {
    async fn deliver(&self, request: &SigningRequest) -> Result<(), DeliveryError> {
        info!(
            recipient = %request.recipient,
            token = %request.token_address,
            amount = %request.amount,
            nonce = request.nonce,
            dest_chain_id = request.dest_chain_id,
            payload_hash = %request.payload_hash,
            "Signing request (no endpoint configured)"
        );
        Ok(())
    }
}

/// Pick the channel for `config`: HTTP when an endpoint is set, logging
/// otherwise.
pub fn signing_channel(
    config: &SigningConfig,
    http_client: reqwest::Client,
) -> Box<dyn SigningChannel> {
    match &config.endpoint {
        Some(endpoint) => Box::new(HttpSigningChannel::new(
            http_client,
            endpoint.clone(),
            config.secret.clone(),
        )),
        None => Box::new(LoggingSigningChannel),
    }
}

/// Drains the signing queue into a [`SigningChannel`].
///
/// Runs until every dispatcher is dropped and the queue is empty.
pub struct SigningSender {
    rx: SigningRequestReceiver,
    channel: Box<dyn SigningChannel>,
    max_attempts: u32,
    retry_base: Duration,
}

impl SigningSender {
    pub fn new(
        rx: SigningRequestReceiver,
        channel: Box<dyn SigningChannel>,
        config: &SigningConfig,
    ) -> Self {
        Self {
            rx,
            channel,
            max_attempts: config.max_attempts.max(1),
            retry_base: config.retry_base,
        }
    }

    pub async fn run(mut self) {
        info!("SigningSender started");
        while let Some(request) = self.rx.recv().await {
            self.deliver_with_retry(&request).await;
        }
        info!("SigningSender shutdown complete");
    }

    async fn deliver_with_retry(&self, request: &SigningRequest) {
        for attempt in 0..self.max_attempts {
            match self.channel.deliver(request).await {
                Ok(()) => {
                    debug!(
                        payload_hash = %request.payload_hash,
                        attempt = attempt + 1,
                        "Signing request delivered"
                    );
                    return;
                }
                Err(e) if attempt + 1 < self.max_attempts => {
                    let delay = retry_delay(self.retry_base, attempt);
                    warn!(
                        payload_hash = %request.payload_hash,
                        error = %e,
                        attempt = attempt + 1,
                        retry_in = ?delay,
                        "Signing request delivery failed"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        payload_hash = %request.payload_hash,
                        nonce = request.nonce,
                        error = %e,
                        attempts = self.max_attempts,
                        "Giving up on signing request"
                    );
                }
            }
        }
    }
}
