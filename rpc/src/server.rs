//! Axum-based RPC server.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, Instrument};

use gsp_game::{HistoryQuery, StateView};
use gsp_types::Chain;

use crate::error::RpcError;
use crate::handlers::{dispatch, RpcRequest, RpcResponse};

/// Everything the handlers can reach.
pub struct RpcContext {
    pub game_id: String,
    pub chain: Chain,
    pub view: Arc<StateView>,
    /// Channel to the task owning the block processor.
    pub history: mpsc::Sender<HistoryQuery>,
    pub registry: Registry,
    /// Invoked by the `stop` method.
    pub stop: Arc<dyn Fn() + Send + Sync>,
    pub wait_timeout: Duration,
}

/// Build the router: JSON-RPC on `POST /`, metrics on `GET /metrics`.
pub fn router(ctx: Arc<RpcContext>) -> Router {
    Router::new()
        .route("/", post(json_rpc_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(ctx)
}

/// The RPC server, configured with a port and shared context.
pub struct RpcServer {
    pub port: u16,
    pub ctx: Arc<RpcContext>,
}

impl RpcServer {
    pub fn new(port: u16, ctx: Arc<RpcContext>) -> Self {
        Self { port, ctx }
    }

    /// Bind the listening socket on localhost.
    pub async fn bind(&self) -> Result<tokio::net::TcpListener, RpcError> {
        let addr = format!("127.0.0.1:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("game RPC server listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn serve(
        &self,
        listener: tokio::net::TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), RpcError> {
        let app = router(Arc::clone(&self.ctx));
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;
        info!("game RPC server stopped");
        Ok(())
    }
}

async fn json_rpc_handler(State(ctx): State<Arc<RpcContext>>, body: Bytes) -> Json<RpcResponse> {
    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let err = if serde_json::from_slice::<Value>(&body).is_ok() {
                RpcError::InvalidRequest(e.to_string())
            } else {
                RpcError::Parse(e.to_string())
            };
            return Json(RpcResponse::failure(Value::Null, &err));
        }
    };

    let span = tracing::info_span!("rpc", action = %request.method);
    let result = dispatch(&ctx, &request).instrument(span).await;
    Json(match result {
        Ok(value) => RpcResponse::success(request.id, value),
        Err(err) => {
            tracing::debug!(method = %request.method, "RPC call failed: {err}");
            RpcResponse::failure(request.id, &err)
        }
    })
}

async fn metrics_handler(State(ctx): State<Arc<RpcContext>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&ctx.registry.gather(), &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
