//! ChainListener: turns one chain's source into a nonce-ordered event feed.
//!
//! The listener is the nonce authority for its chain. Every deposit the
//! source reports gets `previous + 1` (starting at 1), in the order the
//! source returned them. A failed poll never ends the feed; the listener
//! backs off and asks again.

use crate::config::ListenerConfig;
use crate::events::DepositSender;
use crate::sources::{ChainSource, SourceError};
use crate::utils::backoff::listener_backoff;
use crate::utils::shutdown_requested;
use futures_util::{Stream, StreamExt};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use xrelay_sdk::objects::DepositEvent;

/// Result of one poll.
#[derive(Debug)]
pub enum ListenerOutcome {
    /// Deposits discovered by this poll, possibly none, with nonces assigned.
    Events(Vec<DepositEvent>),
    /// The poll failed; the next one happens after `retry_in`.
    RecoverableFailure {
        error: SourceError,
        retry_in: Duration,
    },
}

pub struct ChainListener {
    chain_id: u64,
    source: Box<dyn ChainSource>,
    config: ListenerConfig,
    next_nonce: u64,
    consecutive_failures: u32,
}

impl ChainListener {
    pub fn new(chain_id: u64, source: Box<dyn ChainSource>, config: ListenerConfig) -> Self {
        Self {
            chain_id,
            source,
            config,
            next_nonce: 1,
            consecutive_failures: 0,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Poll the source once.
    pub async fn poll_once(&mut self) -> ListenerOutcome {
        match self.source.fetch_new_deposits().await {
            Ok(deposits) => {
                if self.consecutive_failures > 0 {
                    info!(
                        chain_id = self.chain_id,
                        failures = self.consecutive_failures,
                        "Chain source recovered"
                    );
                }
                self.consecutive_failures = 0;
                let events: Vec<DepositEvent> = deposits
                    .into_iter()
                    .map(|deposit| {
                        let nonce = self.next_nonce;
                        self.next_nonce += 1;
                        deposit.into_event(self.chain_id, nonce)
                    })
                    .collect();
                if !events.is_empty() {
                    debug!(
                        chain_id = self.chain_id,
                        count = events.len(),
                        next_nonce = self.next_nonce,
                        "Discovered deposits"
                    );
                }
                ListenerOutcome::Events(events)
            }
            Err(error) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                let retry_in = listener_backoff(
                    self.config.error_backoff,
                    self.config.max_error_backoff,
                    self.consecutive_failures,
                );
                warn!(
                    chain_id = self.chain_id,
                    error = %error,
                    failures = self.consecutive_failures,
                    retry_in = ?retry_in,
                    "Chain source poll failed"
                );
                ListenerOutcome::RecoverableFailure { error, retry_in }
            }
        }
    }

    /// Infinite feed of poll outcomes.
    ///
    /// The first poll happens immediately; later ones wait `poll_interval`
    /// after a success or `retry_in` after a failure. Nothing happens until
    /// the stream is polled.
    pub fn listen(self) -> impl Stream<Item = ListenerOutcome> + Send {
        futures_util::stream::unfold(
            (self, Duration::ZERO),
            |(mut listener, wait)| async move {
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
                let outcome = listener.poll_once().await;
                let next_wait = match &outcome {
                    ListenerOutcome::Events(_) => listener.config.poll_interval,
                    ListenerOutcome::RecoverableFailure { retry_in, .. } => *retry_in,
                };
                Some((outcome, (listener, next_wait)))
            },
        )
    }

    /// Feed the chain's lane until shutdown or until the lane goes away.
    ///
    /// A full lane channel holds the send, and with it the next poll.
    pub async fn run(self, lane_tx: DepositSender, mut shutdown_rx: watch::Receiver<bool>) {
        let chain_id = self.chain_id;
        info!(chain_id, "ChainListener started");

        let feed = self.listen();
        tokio::pin!(feed);

        'poll: loop {
            let outcome = tokio::select! {
                biased;

                _ = shutdown_requested(&mut shutdown_rx) => {
                    info!(chain_id, "ChainListener received shutdown signal");
                    break;
                }

                outcome = feed.next() => outcome,
            };

            let events = match outcome {
                Some(ListenerOutcome::Events(events)) => events,
                Some(ListenerOutcome::RecoverableFailure { .. }) => continue,
                None => break,
            };

            let mut pending = events.into_iter();
            while let Some(event) = pending.next() {
                tokio::select! {
                    biased;

                    _ = shutdown_requested(&mut shutdown_rx) => {
                        warn!(
                            chain_id,
                            undelivered = pending.len() + 1,
                            "Shutdown while lane was full, events not handed over"
                        );
                        break 'poll;
                    }

                    sent = lane_tx.send(event) => {
                        if sent.is_err() {
                            warn!(chain_id, "Lane channel closed, stopping listener");
                            break 'poll;
                        }
                    }
                }
            }
        }

        info!(chain_id, "ChainListener shutdown complete");
    }
}
