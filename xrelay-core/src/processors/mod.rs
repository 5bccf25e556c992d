//! The components every deposit passes through.
//!
//! - `ChainListener`: polls one chain's source, assigns nonces, feeds the lane
//! - `Lane`: orders a chain's events by nonce and drives each one through
//!   `EventValidator`, `EnrichmentClient`, `SigningRequestDispatcher` and
//!   `ReportingSink`
//! - `SigningSender` / `ReportSender`: drain the outbound queues
//! - `EventPipeline`: builds all of the above and owns shutdown

pub mod chain_listener;
pub mod dispatcher;
pub mod enrichment;
pub mod lane;
pub mod pipeline;
pub mod reporting;
pub mod validator;

pub use chain_listener::{ChainListener, ListenerOutcome};
pub use dispatcher::{
    DeliveryError, DispatchError, HttpSigningChannel, LoggingSigningChannel, SigningChannel,
    SigningRequestDispatcher, SigningSender,
};
pub use enrichment::{EnrichmentClient, EnrichmentError, FetchPrice};
pub use lane::{Lane, LaneStages};
pub use pipeline::{EventPipeline, PipelineError, PipelineHandle, ShutdownReport, SubmitError};
pub use reporting::{ReportError, ReportSender, ReportingSink};
pub use validator::{EventValidator, Rejection};
