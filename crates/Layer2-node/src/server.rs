//! RPC server - JSON over HTTP
//!
//! Routes:
//! - `POST /rpc/{procedure}`: body is the procedure's JSON args, reply its JSON result
//! - `GET /health`: `{"status":"ok"}`

use crate::procedure::ProcedureSet;
use crate::stats::NodeStats;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use distrual_foundation::Result;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Unknown procedure: {0}")]
    UnknownProcedure(String),

    #[error("{0}")]
    Procedure(String),
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = match &self {
            RpcError::UnknownProcedure(_) => StatusCode::NOT_FOUND,
            RpcError::Procedure(_) => StatusCode::BAD_REQUEST,
        };

        let body = json!({
            "error": self.to_string()
        });

        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

#[derive(Clone)]
struct ServerState {
    procedures: Arc<ProcedureSet>,
    stats: NodeStats,
}

pub fn router(procedures: ProcedureSet, stats: NodeStats) -> Router {
    let state = ServerState {
        procedures: Arc::new(procedures),
        stats,
    };

    Router::new()
        .route("/rpc/{procedure}", post(call_procedure))
        .route("/health", get(health))
        .with_state(state)
}

async fn call_procedure(
    State(state): State<ServerState>,
    Path(name): Path<String>,
    Json(args): Json<Value>,
) -> std::result::Result<Json<Value>, RpcError> {
    let procedure = state
        .procedures
        .get(&name)
        .ok_or_else(|| RpcError::UnknownProcedure(name.clone()))?;

    debug!(procedure = %name, %args, "Serving call");
    state.stats.record_call();

    match procedure.call(args).await {
        Ok(reply) => Ok(Json(reply)),
        Err(e) => {
            warn!(procedure = %name, "Call failed: {}", e);
            Err(RpcError::Procedure(e.to_string()))
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ============================================================================
// Server
// ============================================================================

/// A bound, not yet serving, RPC server
pub struct RpcServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    router: Router,
}

impl RpcServer {
    /// Bind `addr`; port 0 picks an ephemeral port
    pub async fn bind(addr: SocketAddr, procedures: ProcedureSet, stats: NodeStats) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "RPC server bound");

        Ok(Self {
            listener,
            local_addr,
            router: router(procedures, stats),
        })
    }

    /// The address actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until the task is dropped or the listener fails
    pub async fn serve(self) -> Result<()> {
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }
}
