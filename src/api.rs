//! HTTP server for health and metrics endpoints

use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use eyre::eyre;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tracing::info;

use crate::state::AppState;

/// Per-chain health
#[derive(Debug, Serialize)]
pub struct ChainHealth {
    pub chain_id: u64,
    pub synced: bool,
    pub last_synced_block: Option<u64>,
    pub available_credit: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub dry_mode: bool,
    pub rank: u32,
    pub chains: BTreeMap<String, ChainHealth>,
}

fn readiness_label(all_synced: bool) -> &'static str {
    if all_synced {
        "OK"
    } else {
        "NOT_READY"
    }
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut chains = BTreeMap::new();
    for chain in state.chains.iter() {
        let last_synced_block = state.sync_status.last_synced_block(chain.chain_id).await;
        let synced = state.sync_status.is_synced(chain.chain_id).await;
        let credit = state.liquidity.available_credit(chain.chain_id).await;
        chains.insert(
            chain.slug.to_string(),
            ChainHealth {
                chain_id: chain.chain_id,
                synced,
                last_synced_block,
                available_credit: credit.to_string(),
            },
        );
    }

    let status = if state.sync_status.all_synced().await {
        "healthy"
    } else {
        "syncing"
    };
    Json(HealthResponse {
        status,
        dry_mode: state.is_dry(),
        rank: state.policy.rank,
        chains,
    })
}

/// Liveness check (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Readiness check: every chain finished its first sync pass
async fn readiness(State(state): State<AppState>) -> &'static str {
    readiness_label(state.sync_status.all_synced().await)
}

/// Prometheus metrics endpoint
async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry.gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response();
    }

    match Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state)
}

/// Start the HTTP server for health and metrics
pub async fn start_server(bind_address: &str, port: u16, state: AppState) -> eyre::Result<()> {
    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}:{}: {}", bind_address, port, e))?;
    info!("Health server listening on {}", addr);
    info!("  /health  - Full health status (JSON)");
    info!("  /metrics - Prometheus metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_label() {
        assert_eq!(readiness_label(true), "OK");
        assert_eq!(readiness_label(false), "NOT_READY");
    }

    #[test]
    fn test_health_response_serializes_chains_by_slug() {
        let mut chains = BTreeMap::new();
        chains.insert(
            "optimism".to_string(),
            ChainHealth {
                chain_id: 10,
                synced: true,
                last_synced_block: Some(123),
                available_credit: "5000".to_string(),
            },
        );
        let body = serde_json::to_value(HealthResponse {
            status: "healthy",
            dry_mode: false,
            rank: 1,
            chains,
        })
        .unwrap();
        assert_eq!(body["chains"]["optimism"]["last_synced_block"], 123);
        assert_eq!(body["chains"]["optimism"]["available_credit"], "5000");
        assert_eq!(body["rank"], 1);
    }
}
