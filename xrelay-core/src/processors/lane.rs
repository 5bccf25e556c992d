//! Lane: one chain's ordered path through validation, enrichment, dispatch
//! and reporting.
//!
//! Events arrive from the chain's listener (or `PipelineHandle::submit`)
//! and are processed strictly in nonce order, one at a time. Out-of-order
//! arrivals wait in a reorder buffer; a gap is tolerated for
//! `reorder_window`, after which the lane skips ahead to the smallest
//! buffered nonce. An event whose nonce the lane has already passed is
//! reported as a duplicate and never processed again.

use crate::config::LaneConfig;
use crate::events::{DepositReceiver, EnrichedDeposit, EventState, Outcome, ProcessedEvent};
use crate::processors::dispatcher::SigningRequestDispatcher;
use crate::processors::enrichment::EnrichmentClient;
use crate::processors::reporting::ReportingSink;
use crate::processors::validator::EventValidator;
use crate::stats::ChainStats;
use crate::utils::shutdown_requested;
use kanau::processor::Processor;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use xrelay_sdk::objects::{DepositEvent, ReportStatus};

/// The shared components a lane drives each event through.
#[derive(Clone)]
pub struct LaneStages {
    pub validator: Arc<EventValidator>,
    pub enrichment: Arc<EnrichmentClient>,
    pub dispatcher: SigningRequestDispatcher,
    pub reporting: ReportingSink,
}

pub struct Lane {
    chain_id: u64,
    token_decimals: u32,
    stages: LaneStages,
    config: LaneConfig,
    next_nonce: u64,
    pending: BTreeMap<u64, DepositEvent>,
    gap_since: Option<Instant>,
    stats: Arc<ChainStats>,
    processed_tx: broadcast::Sender<ProcessedEvent>,
}

impl Lane {
    pub fn new(
        chain_id: u64,
        token_decimals: u32,
        stages: LaneStages,
        config: LaneConfig,
        stats: Arc<ChainStats>,
        processed_tx: broadcast::Sender<ProcessedEvent>,
    ) -> Self {
        Self {
            chain_id,
            token_decimals,
            stages,
            config,
            next_nonce: 1,
            pending: BTreeMap::new(),
            gap_since: None,
            stats,
            processed_tx,
        }
    }

    /// Start expecting `nonce` instead of 1.
    pub fn starting_at(mut self, nonce: u64) -> Self {
        self.next_nonce = nonce;
        self
    }

    pub async fn run(mut self, mut rx: DepositReceiver, mut shutdown_rx: watch::Receiver<bool>) {
        let chain_id = self.chain_id;
        info!(chain_id, next_nonce = self.next_nonce, "Lane started");

        loop {
            self.process_ready().await;

            let gap_deadline = self.gap_since.map(|since| since + self.config.reorder_window);

            tokio::select! {
                biased;

                _ = shutdown_requested(&mut shutdown_rx) => {
                    info!(chain_id, "Lane received shutdown signal");
                    break;
                }

                received = rx.recv() => match received {
                    Some(event) => self.accept(event),
                    None => {
                        info!(chain_id, "Lane channel closed");
                        break;
                    }
                },

                _ = tokio::time::sleep_until(gap_deadline.unwrap_or_else(Instant::now)), if gap_deadline.is_some() => {
                    self.skip_gap();
                }
            }
        }

        // Whatever was already handed to the lane still gets processed. The
        // missing nonces can no longer arrive, so gaps are skipped at once.
        while let Ok(event) = rx.try_recv() {
            self.accept(event);
        }
        self.process_ready().await;
        while !self.pending.is_empty() {
            self.skip_gap();
            self.process_ready().await;
        }

        info!(chain_id, "Lane shutdown complete");
    }

    /// Take an event into the reorder buffer.
    fn accept(&mut self, event: DepositEvent) {
        self.stats.record_received();

        if event.nonce < self.next_nonce || self.pending.contains_key(&event.nonce) {
            debug!(
                chain_id = self.chain_id,
                nonce = event.nonce,
                tx_hash = %event.transaction_hash,
                "Duplicate deposit ignored"
            );
            self.finish(&event, Outcome::Duplicate);
            return;
        }

        if event.nonce != self.next_nonce {
            debug!(
                chain_id = self.chain_id,
                nonce = event.nonce,
                expected = self.next_nonce,
                "Deposit arrived ahead of its turn, buffering"
            );
        }
        self.pending.insert(event.nonce, event);

        if self.pending.len() > self.config.max_pending {
            warn!(
                chain_id = self.chain_id,
                buffered = self.pending.len(),
                "Reorder buffer full"
            );
            self.skip_gap();
        }
    }

    /// Process every buffered event whose turn has come.
    async fn process_ready(&mut self) {
        let mut progressed = false;
        while let Some(event) = self.pending.remove(&self.next_nonce) {
            self.next_nonce += 1;
            progressed = true;

            let event = Arc::new(event);
            let outcome = match self.process(event.clone()).await {
                Ok(outcome) => outcome,
                Err(never) => match never {},
            };
            self.finish(&event, outcome);
        }

        self.gap_since = match (self.pending.is_empty(), self.gap_since) {
            (true, _) => None,
            (false, Some(since)) if !progressed => Some(since),
            (false, _) => Some(Instant::now()),
        };
    }

    /// Give up on the missing nonce(s) and resume at the smallest buffered
    /// one.
    fn skip_gap(&mut self) {
        if let Some(&resume_at) = self.pending.keys().next() {
            warn!(
                chain_id = self.chain_id,
                expected = self.next_nonce,
                resume_at,
                skipped = resume_at - self.next_nonce,
                "Nonce gap not filled, skipping ahead"
            );
            self.next_nonce = resume_at;
        }
        self.gap_since = None;
    }

    fn finish(&self, event: &DepositEvent, outcome: Outcome) {
        self.stats.record_outcome(&outcome);
        // No subscribers is fine.
        let _ = self.processed_tx.send(ProcessedEvent {
            chain_id: self.chain_id,
            nonce: event.nonce,
            transaction_hash: event.transaction_hash.clone(),
            outcome,
        });
    }

    fn enter(&self, event: &DepositEvent, state: EventState) {
        debug!(
            chain_id = self.chain_id,
            nonce = event.nonce,
            state = %state,
            "Deposit state changed"
        );
    }
}

impl Processor<Arc<DepositEvent>> for Lane {
    type Output = Outcome;
    type Error = Infallible;

    /// Drive one event from `Received` to a terminal state.
    async fn process(&self, event: Arc<DepositEvent>) -> Result<Outcome, Infallible> {
        self.enter(&event, EventState::Received);

        if let Err(rejection) = self.stages.validator.validate(&event) {
            info!(
                chain_id = self.chain_id,
                nonce = event.nonce,
                tx_hash = %event.transaction_hash,
                reason = %rejection,
                "Deposit rejected"
            );
            self.enter(&event, EventState::Rejected);
            return Ok(Outcome::Rejected(rejection));
        }
        self.enter(&event, EventState::Validated);

        let price = self
            .stages
            .enrichment
            .fetch_price(&event.token_address)
            .await;
        let enriched = EnrichedDeposit {
            value_usd: price.value_of(event.amount, self.token_decimals),
            price,
            event,
        };
        self.enter(&enriched.event, EventState::Enriched);

        let request = match self.stages.dispatcher.dispatch(&enriched.event).await {
            Ok(request) => request,
            Err(e) => {
                error!(
                    chain_id = self.chain_id,
                    nonce = enriched.event.nonce,
                    tx_hash = %enriched.event.transaction_hash,
                    error = %e,
                    "Failed to dispatch signing request"
                );
                self.stages.reporting.report(
                    &enriched.event,
                    ReportStatus::DispatchFailed,
                    enriched.value_usd,
                );
                self.enter(&enriched.event, EventState::Failed);
                return Ok(Outcome::Failed(e));
            }
        };
        self.enter(&enriched.event, EventState::Dispatched);

        self.stages.reporting.report(
            &enriched.event,
            ReportStatus::Processed,
            enriched.value_usd,
        );
        self.enter(&enriched.event, EventState::Reported);

        info!(
            chain_id = self.chain_id,
            nonce = enriched.event.nonce,
            tx_hash = %enriched.event.transaction_hash,
            payload_hash = %request.payload_hash,
            value_usd = ?enriched.value_usd,
            "Deposit relayed"
        );
        self.enter(&enriched.event, EventState::Done);
        Ok(Outcome::Done {
            payload_hash: request.payload_hash,
            value_usd: enriched.value_usd,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnrichmentConfig;
    use crate::events::{
        ReportPayloadReceiver, SigningRequestReceiver, deposit_channel, processed_event_channel,
        report_channel, signing_request_channel,
    };
    use crate::processors::dispatcher::DispatchError;
    use crate::processors::validator::Rejection;
    use std::time::Duration;
    use xrelay_sdk::objects::AddressFormat;

    struct Harness {
        lane: Lane,
        signing_rx: SigningRequestReceiver,
        report_rx: ReportPayloadReceiver,
        processed_rx: broadcast::Receiver<ProcessedEvent>,
        stats: Arc<ChainStats>,
    }

    fn harness(enrichment: EnrichmentConfig, signing_queue: usize) -> Harness {
        let (signing_tx, signing_rx) = signing_request_channel(signing_queue);
        let (report_tx, report_rx) = report_channel(16);
        let processed_tx = processed_event_channel();
        let processed_rx = processed_tx.subscribe();
        let stats = Arc::new(ChainStats::default());
        let stages = LaneStages {
            validator: Arc::new(EventValidator::with_formats([
                (1, AddressFormat::Evm),
                (137, AddressFormat::Evm),
            ])),
            enrichment: Arc::new(EnrichmentClient::new(reqwest::Client::new(), enrichment)),
            dispatcher: SigningRequestDispatcher::new(signing_tx, Duration::from_millis(50)),
            reporting: ReportingSink::new(report_tx),
        };
        let config = LaneConfig {
            max_pending: 8,
            reorder_window: Duration::from_secs(10),
        };
        Harness {
            lane: Lane::new(1, 6, stages, config, stats.clone(), processed_tx),
            signing_rx,
            report_rx,
            processed_rx,
            stats,
        }
    }

    fn event(nonce: u64) -> DepositEvent {
        DepositEvent {
            transaction_hash: format!("0x{nonce:064x}"),
            source_chain_id: 1,
            destination_chain_id: 137,
            depositor: "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".to_string(),
            recipient: "0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359".to_string(),
            token_address: "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".to_string(),
            amount: 3_000_000,
            nonce,
        }
    }

    #[tokio::test]
    async fn test_zero_amount_is_rejected_without_side_effects() {
        let mut h = harness(EnrichmentConfig::default(), 4);
        let mut e = event(1);
        e.amount = 0;
        let outcome = h.lane.process(Arc::new(e)).await.unwrap();
        assert_eq!(outcome, Outcome::Rejected(Rejection::ZeroAmount));
        assert!(h.signing_rx.try_recv().is_err());
        assert!(h.report_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_same_chain_is_rejected() {
        let h = harness(EnrichmentConfig::default(), 4);
        let mut e = event(1);
        e.destination_chain_id = 1;
        let outcome = h.lane.process(Arc::new(e)).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Rejected(Rejection::SameChain { chain_id: 1 })
        );
    }

    #[tokio::test]
    async fn test_out_of_order_arrivals_processed_in_nonce_order() {
        let mut h = harness(EnrichmentConfig::default(), 4);
        let (tx, rx) = deposit_channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(h.lane.starting_at(2).run(rx, shutdown_rx));

        tx.send(event(3)).await.unwrap();
        tx.send(event(2)).await.unwrap();

        assert_eq!(h.processed_rx.recv().await.unwrap().nonce, 2);
        assert_eq!(h.processed_rx.recv().await.unwrap().nonce, 3);
        assert_eq!(h.signing_rx.recv().await.unwrap().nonce, 2);
        assert_eq!(h.signing_rx.recv().await.unwrap().nonce, 3);

        shutdown_tx.send_replace(true);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_enrichment_timeout_still_relays_with_unknown_value() {
        let router = axum::Router::new().route(
            "/price/{asset}",
            axum::routing::get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                axum::Json(serde_json::json!({ "price": 1 }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let enrichment = EnrichmentConfig {
            url_template: Some(format!("http://{addr}/price/{{asset}}")),
            timeout: Duration::from_millis(100),
            ..EnrichmentConfig::default()
        };
        let mut h = harness(enrichment, 4);
        let outcome = h.lane.process(Arc::new(event(1))).await.unwrap();

        assert!(matches!(outcome, Outcome::Done { value_usd: None, .. }));
        assert_eq!(h.signing_rx.try_recv().unwrap().nonce, 1);
        let report = h.report_rx.try_recv().unwrap();
        assert_eq!(report.status, ReportStatus::Processed);
        assert_eq!(report.value_usd, None);
    }

    #[tokio::test]
    async fn test_priced_deposit_reports_value() {
        let router = axum::Router::new().route(
            "/price/{asset}",
            axum::routing::get(|| async { axum::Json(serde_json::json!({ "price": "1.5" })) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let enrichment = EnrichmentConfig {
            url_template: Some(format!("http://{addr}/price/{{asset}}")),
            ..EnrichmentConfig::default()
        };
        let mut h = harness(enrichment, 4);
        h.lane.process(Arc::new(event(1))).await.unwrap();
        let report = h.report_rx.try_recv().unwrap();
        // 3 tokens at $1.50
        assert_eq!(report.value_usd, Some(rust_decimal::Decimal::new(45, 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_signing_queue_fails_at_dispatch() {
        let mut h = harness(EnrichmentConfig::default(), 1);
        assert!(matches!(
            h.lane.process(Arc::new(event(1))).await.unwrap(),
            Outcome::Done { .. }
        ));
        let outcome = h.lane.process(Arc::new(event(2))).await.unwrap();
        assert_eq!(outcome, Outcome::Failed(DispatchError::QueueFull));

        assert_eq!(h.report_rx.try_recv().unwrap().status, ReportStatus::Processed);
        assert_eq!(
            h.report_rx.try_recv().unwrap().status,
            ReportStatus::DispatchFailed
        );
    }

    #[tokio::test]
    async fn test_resubmitted_event_is_duplicate() {
        let mut h = harness(EnrichmentConfig::default(), 4);
        let (tx, rx) = deposit_channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(h.lane.run(rx, shutdown_rx));

        tx.send(event(1)).await.unwrap();
        tx.send(event(1)).await.unwrap();

        let first = h.processed_rx.recv().await.unwrap();
        assert!(matches!(first.outcome, Outcome::Done { .. }));
        let second = h.processed_rx.recv().await.unwrap();
        assert_eq!(second.outcome, Outcome::Duplicate);

        shutdown_tx.send_replace(true);
        task.await.unwrap();
        assert_eq!(h.stats.snapshot().done, 1);
        assert_eq!(h.stats.snapshot().duplicate, 1);
        assert_eq!(h.signing_rx.try_recv().unwrap().nonce, 1);
        assert!(h.signing_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gap_is_skipped_after_reorder_window() {
        let mut h = harness(EnrichmentConfig::default(), 4);
        let (tx, rx) = deposit_channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(h.lane.run(rx, shutdown_rx));

        let started = Instant::now();
        tx.send(event(2)).await.unwrap();
        let processed = h.processed_rx.recv().await.unwrap();
        assert_eq!(processed.nonce, 2);
        assert!(started.elapsed() >= Duration::from_secs(10));

        // The skipped nonce is now behind the lane.
        tx.send(event(1)).await.unwrap();
        assert_eq!(
            h.processed_rx.recv().await.unwrap().outcome,
            Outcome::Duplicate
        );

        shutdown_tx.send_replace(true);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_processes_queued_events() {
        let h = harness(EnrichmentConfig::default(), 8);
        let (tx, rx) = deposit_channel(8);
        for nonce in 1..=3 {
            tx.send(event(nonce)).await.unwrap();
        }
        // Shutdown is already requested when the lane starts.
        let (_shutdown_tx, shutdown_rx) = watch::channel(true);
        h.lane.run(rx, shutdown_rx).await;
        assert_eq!(h.stats.snapshot().done, 3);
    }

    #[tokio::test]
    async fn test_shutdown_finishes_events_behind_a_gap() {
        let mut h = harness(EnrichmentConfig::default(), 8);
        let (tx, rx) = deposit_channel(8);
        tx.send(event(2)).await.unwrap();
        tx.send(event(3)).await.unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(true);
        h.lane.run(rx, shutdown_rx).await;

        let snapshot = h.stats.snapshot();
        assert_eq!(snapshot.received, 2);
        assert_eq!(snapshot.done, 2);
        for expected in [2, 3] {
            let processed = h.processed_rx.try_recv().unwrap();
            assert_eq!(processed.nonce, expected);
            assert!(matches!(processed.outcome, Outcome::Done { .. }));
        }
        assert_eq!(h.signing_rx.try_recv().unwrap().nonce, 2);
        assert_eq!(h.signing_rx.try_recv().unwrap().nonce, 3);
    }
}
