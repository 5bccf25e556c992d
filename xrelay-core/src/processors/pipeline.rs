//! EventPipeline: wires listeners, lanes and sender tasks together and owns
//! their shutdown.
//!
//! ```text
//! ChainListener(1) --> Lane(1) --+--> signing queue --> SigningSender
//! ChainListener(2) --> Lane(2) --+--> report queue  --> ReportSender
//!        ...              ...    +--> ProcessedEvent broadcast
//! ```

use crate::config::RelayConfig;
use crate::events::{
    DepositSender, ProcessedEvent, deposit_channel, processed_event_channel, report_channel,
    signing_request_channel,
};
use crate::framework::{HttpClients, HttpResources};
use crate::processors::chain_listener::ChainListener;
use crate::processors::dispatcher::{
    SigningChannel, SigningRequestDispatcher, SigningSender, signing_channel,
};
use crate::processors::enrichment::EnrichmentClient;
use crate::processors::lane::{Lane, LaneStages};
use crate::processors::reporting::{ReportSender, ReportingSink};
use crate::processors::validator::EventValidator;
use crate::sources::SourceFactory;
use crate::stats::PipelineStats;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OnceCell, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};
use xrelay_sdk::objects::DepositEvent;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no chain could be started")]
    NoValidChains,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("no lane for chain {0}")]
    UnknownChain(u64),

    #[error("pipeline is shutting down")]
    ShuttingDown,

    #[error("lane for chain {0} has stopped")]
    LaneClosed(u64),
}

/// What shutdown achieved. Every caller of
/// [`PipelineHandle::shutdown`] receives the same report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every task finished within the drain timeout.
    pub drained: bool,
    pub aborted_tasks: usize,
    pub resources_released: bool,
}

pub struct EventPipeline {
    config: Arc<RelayConfig>,
    factory: Box<dyn SourceFactory>,
    processed_tx: broadcast::Sender<ProcessedEvent>,
    signing_channel: Option<Box<dyn SigningChannel>>,
}

impl EventPipeline {
    pub fn new(config: Arc<RelayConfig>, factory: impl SourceFactory + 'static) -> Self {
        Self {
            config,
            factory: Box::new(factory),
            processed_tx: processed_event_channel(),
            signing_channel: None,
        }
    }

    /// Replace the signing transport chosen from configuration.
    pub fn with_signing_channel(mut self, channel: Box<dyn SigningChannel>) -> Self {
        self.signing_channel = Some(channel);
        self
    }

    /// Receive a [`ProcessedEvent`] for every event that reaches a terminal
    /// state. Subscribe before [`start`](Self::start) to see everything.
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessedEvent> {
        self.processed_tx.subscribe()
    }

    /// Build and spawn every task. Must be called inside a tokio runtime.
    ///
    /// Chains whose source cannot be built are logged and skipped; if none
    /// remain the pipeline refuses to start.
    pub fn start(self) -> Result<PipelineHandle, PipelineError> {
        let config = self.config;

        let mut sources = Vec::new();
        for chain in config.listened_chains() {
            match self.factory.build(chain) {
                Ok(source) => sources.push((chain, source)),
                Err(e) => error!(
                    chain_id = chain.chain_id,
                    chain = %chain.name,
                    error = %e,
                    "Skipping chain, source could not be built"
                ),
            }
        }
        if sources.is_empty() {
            return Err(PipelineError::NoValidChains);
        }

        let clients = HttpClients::new(&config)?;

        let (signing_tx, signing_rx) = signing_request_channel(config.signing.queue_size);
        let (report_tx, report_rx) = report_channel(config.reporting.queue_size);

        let channel = self
            .signing_channel
            .unwrap_or_else(|| signing_channel(&config.signing, clients.signing.clone()));
        let senders = vec![
            tokio::spawn(SigningSender::new(signing_rx, channel, &config.signing).run()),
            tokio::spawn(
                ReportSender::new(report_rx, clients.reporting.clone(), &config.reporting).run(),
            ),
        ];

        let stages = LaneStages {
            validator: Arc::new(EventValidator::new(&config)),
            enrichment: Arc::new(EnrichmentClient::new(
                clients.enrichment.clone(),
                config.enrichment.clone(),
            )),
            dispatcher: SigningRequestDispatcher::new(signing_tx, config.signing.enqueue_timeout),
            reporting: ReportingSink::new(report_tx),
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut stats = PipelineStats::default();
        let mut lanes = HashMap::new();
        let mut lane_tasks = Vec::new();
        let mut listener_tasks = Vec::new();

        for (chain, source) in sources {
            let (lane_tx, lane_rx) = deposit_channel(config.lane.max_pending);
            let lane = Lane::new(
                chain.chain_id,
                chain.token_decimals,
                stages.clone(),
                config.lane.clone(),
                stats.register(chain.chain_id),
                self.processed_tx.clone(),
            );
            lane_tasks.push(tokio::spawn(lane.run(lane_rx, shutdown_rx.clone())));

            let listener = ChainListener::new(chain.chain_id, source, config.listener.clone());
            listener_tasks.push(tokio::spawn(
                listener.run(lane_tx.clone(), shutdown_rx.clone()),
            ));

            info!(chain_id = chain.chain_id, chain = %chain.name, "Chain started");
            lanes.insert(chain.chain_id, lane_tx);
        }
        // Lanes hold the only remaining dispatcher and sink clones, so the
        // sender tasks finish once every lane has stopped.
        drop(stages);
        let resources = Arc::new(HttpResources::new(clients));

        info!(chains = lanes.len(), "Pipeline started");

        Ok(PipelineHandle {
            inner: Arc::new(PipelineInner {
                lanes,
                stats,
                resources,
                processed_tx: self.processed_tx,
                shutdown_tx,
                drain_timeout: config.drain_timeout,
                tasks: Mutex::new(Some(PipelineTasks {
                    listeners: listener_tasks,
                    lanes: lane_tasks,
                    senders,
                })),
                report: OnceCell::new(),
            }),
        })
    }
}

#[derive(Default)]
struct PipelineTasks {
    listeners: Vec<JoinHandle<()>>,
    lanes: Vec<JoinHandle<()>>,
    senders: Vec<JoinHandle<()>>,
}

struct PipelineInner {
    lanes: HashMap<u64, DepositSender>,
    stats: PipelineStats,
    resources: Arc<HttpResources>,
    processed_tx: broadcast::Sender<ProcessedEvent>,
    shutdown_tx: watch::Sender<bool>,
    drain_timeout: Duration,
    tasks: Mutex<Option<PipelineTasks>>,
    report: OnceCell<ShutdownReport>,
}

/// Cloneable handle to a running pipeline.
#[derive(Clone)]
pub struct PipelineHandle {
    inner: Arc<PipelineInner>,
}

impl PipelineHandle {
    /// Hand an event to its source chain's lane, waiting for room if the
    /// lane is full. The lane treats an already-passed nonce as a duplicate.
    pub async fn submit(&self, event: DepositEvent) -> Result<(), SubmitError> {
        if *self.inner.shutdown_tx.borrow() {
            return Err(SubmitError::ShuttingDown);
        }
        let chain_id = event.source_chain_id;
        let lane = self
            .inner
            .lanes
            .get(&chain_id)
            .ok_or(SubmitError::UnknownChain(chain_id))?;
        lane.send(event)
            .await
            .map_err(|_| SubmitError::LaneClosed(chain_id))
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.inner.stats
    }

    pub fn resources(&self) -> Arc<HttpResources> {
        self.inner.resources.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessedEvent> {
        self.inner.processed_tx.subscribe()
    }

    pub fn chains(&self) -> impl Iterator<Item = u64> + '_ {
        self.inner.lanes.keys().copied()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown_tx.borrow()
    }

    /// Stop the pipeline and wait for it to drain.
    ///
    /// Safe to call any number of times from any number of tasks: the first
    /// call performs the shutdown and every call returns its report.
    pub async fn shutdown(&self) -> ShutdownReport {
        *self.inner.report.get_or_init(|| self.inner.drain()).await
    }
}

impl PipelineInner {
    async fn drain(&self) -> ShutdownReport {
        info!("Pipeline shutting down");
        self.shutdown_tx.send_replace(true);

        let tasks = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_default();
        let deadline = Instant::now() + self.drain_timeout;

        // Listeners first so nothing new reaches the lanes, then lanes, whose
        // exit releases the queues the sender tasks are draining.
        let mut aborted = join_until(tasks.listeners, deadline, "listener").await;
        aborted += join_until(tasks.lanes, deadline, "lane").await;
        aborted += join_until(tasks.senders, deadline, "sender").await;

        let resources_released = self.resources.close();
        let report = ShutdownReport {
            drained: aborted == 0,
            aborted_tasks: aborted,
            resources_released,
        };
        if report.drained {
            info!("Pipeline shutdown complete");
        } else {
            warn!(
                aborted_tasks = aborted,
                "Pipeline shutdown complete, some tasks missed the drain timeout"
            );
        }
        report
    }
}

/// Await every handle until `deadline`, aborting the ones still running.
/// Returns how many were aborted.
async fn join_until(handles: Vec<JoinHandle<()>>, deadline: Instant, kind: &str) -> usize {
    let mut aborted = 0;
    for mut handle in handles {
        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(task = kind, error = %e, "Pipeline task ended abnormally"),
            Err(_) => {
                handle.abort();
                let _ = handle.await;
                warn!(task = kind, "Pipeline task aborted after drain timeout");
                aborted += 1;
            }
        }
    }
    aborted
}
