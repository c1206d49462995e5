//! RPC request handlers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use gsp_game::{HistoryQuery, Snapshot};
use gsp_types::BlockHash;

use crate::error::RpcError;
use crate::server::RpcContext;

// ── Envelope ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    /// Positional (array) or named (object) parameters.
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, err: &RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcErrorBody {
                code: err.code(),
                message: err.to_string(),
            }),
        }
    }
}

// ── State ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CurrentStateResponse {
    pub gameid: String,
    pub chain: String,
    /// Sync status: `catching-up` or `up-to-date`.
    pub state: String,
    pub blockhash: String,
    pub height: u64,
    pub gamestate: Value,
}

#[derive(Debug, Serialize)]
pub struct StateAtResponse {
    pub blockhash: String,
    pub height: u64,
    pub gamestate: Value,
}

impl From<&Snapshot> for StateAtResponse {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            blockhash: snapshot.tip.hash.to_string(),
            height: snapshot.tip.height,
            gamestate: snapshot.state.to_json(),
        }
    }
}

// ── Dispatch ─────────────────────────────────────────────────────────────

/// Run one JSON-RPC method against the shared context.
pub async fn dispatch(ctx: &Arc<RpcContext>, request: &RpcRequest) -> Result<Value, RpcError> {
    match request.method.as_str() {
        "getcurrentstate" => to_value(get_current_state(ctx)),
        "getstateat" => {
            let hash = hash_param(&request.params, 0, "blockhash")?
                .ok_or_else(|| RpcError::InvalidParams("missing blockhash".into()))?;
            to_value(get_state_at(ctx, hash).await?)
        }
        "waitforchange" => {
            let known = hash_param(&request.params, 0, "knownblockhash")?;
            Ok(Value::String(wait_for_change(ctx, known).await.to_string()))
        }
        "stop" => {
            tracing::info!("stop requested over RPC");
            (ctx.stop)();
            Ok(Value::Null)
        }
        other => Err(RpcError::MethodNotFound(other.to_string())),
    }
}

pub fn get_current_state(ctx: &RpcContext) -> CurrentStateResponse {
    let (snapshot, status) = ctx.view.get_state_with_status();
    CurrentStateResponse {
        gameid: ctx.game_id.clone(),
        chain: ctx.chain.as_str().to_string(),
        state: status.as_str().to_string(),
        blockhash: snapshot.tip.hash.to_string(),
        height: snapshot.tip.height,
        gamestate: snapshot.state.to_json(),
    }
}

pub async fn get_state_at(ctx: &RpcContext, hash: BlockHash) -> Result<StateAtResponse, RpcError> {
    let current = ctx.view.get_state();
    if current.tip.hash == hash {
        return Ok(StateAtResponse::from(current.as_ref()));
    }

    let (query, reply) = HistoryQuery::new(hash);
    ctx.history
        .send(query)
        .await
        .map_err(|_| RpcError::Internal("block processor is not running".into()))?;
    match reply.await {
        Ok(Some(snapshot)) => Ok(StateAtResponse::from(&snapshot)),
        Ok(None) => Err(RpcError::UnknownBlock(hash.to_string())),
        Err(_) => Err(RpcError::Internal("block processor dropped the query".into())),
    }
}

/// Current tip hash once it differs from `known`, or after the wait timeout.
pub async fn wait_for_change(ctx: &RpcContext, known: Option<BlockHash>) -> BlockHash {
    let mut rx = ctx.view.subscribe();
    let current = *rx.borrow_and_update();
    let Some(known) = known else {
        return current;
    };
    if known != current {
        return current;
    }

    let deadline = tokio::time::Instant::now() + ctx.wait_timeout;
    loop {
        match tokio::time::timeout_at(deadline, rx.changed()).await {
            Ok(Ok(())) => {
                let tip = *rx.borrow_and_update();
                if tip != known {
                    return tip;
                }
            }
            // Timed out, or the processor is gone.
            Ok(Err(_)) | Err(_) => return *rx.borrow(),
        }
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::Internal(e.to_string()))
}

/// Optional block hash parameter, by position or by name.
fn hash_param(params: &Value, index: usize, name: &str) -> Result<Option<BlockHash>, RpcError> {
    let raw = match params {
        Value::Array(items) => items.get(index),
        Value::Object(map) => map.get(name),
        Value::Null => None,
        _ => return Err(RpcError::InvalidParams("params must be an array or object".into())),
    };
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(hex)) => hex
            .parse()
            .map(Some)
            .map_err(|e| RpcError::InvalidParams(format!("{name}: {e}"))),
        Some(other) => Err(RpcError::InvalidParams(format!(
            "{name} must be a hex string, got {other}"
        ))),
    }
}
