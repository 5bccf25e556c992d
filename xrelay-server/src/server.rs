//! Axum server setup and router configuration.

use crate::shutdown::shutdown_signal;
use crate::state::AppState;
use axum::extract::State;
use axum::{Json, Router, response::IntoResponse, routing::get};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use xrelay_core::stats::ChainStatsSnapshot;

/// Build the main application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let status = if state.pipeline.is_shutting_down() {
        "shutting_down"
    } else {
        "healthy"
    };
    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    chains: BTreeMap<u64, ChainStatsSnapshot>,
}

async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        chains: state.pipeline.stats().snapshot(),
    })
}

/// Serve until a shutdown signal arrives.
pub async fn run_server(router: Router, addr: SocketAddr) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use xrelay_core::config::{ChainConfig, ChainSourceConfig, RelayConfig, SimulatedSourceConfig};
    use xrelay_core::processors::EventPipeline;
    use xrelay_core::sources::DefaultSourceFactory;
    use xrelay_sdk::objects::AddressFormat;

    fn quiet_pipeline() -> AppState {
        let chain = ChainConfig {
            listen: true,
            source: ChainSourceConfig::Simulated(SimulatedSourceConfig {
                destination_chain_id: 137,
                token_address: "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".to_string(),
                event_probability: 0.0,
                failure_probability: 0.0,
            }),
            ..ChainConfig::destination(1, "ethereum", AddressFormat::Evm)
        };
        let config = RelayConfig {
            chains: vec![chain],
            ..RelayConfig::default()
        };
        let handle = EventPipeline::new(Arc::new(config), DefaultSourceFactory::default())
            .start()
            .unwrap();
        AppState::new(handle)
    }

    #[tokio::test]
    async fn test_stats_lists_running_chains() {
        let state = quiet_pipeline();
        let Json(response) = stats(State(state.clone())).await;
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["chains"]["1"]["done"], 0);
        assert!(json["chains"].get("137").is_none());
        state.pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_health_reports_shutdown() {
        let state = quiet_pipeline();
        state.pipeline.shutdown().await;
        let response = health_check(State(state)).await.into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "shutting_down");
    }
}
