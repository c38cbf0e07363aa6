//! HTTP routes exposing the node to peers and wallets.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use ledger_core::{now_secs, Block, ChainResponse, Node, SyncReport, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::client::HttpPeerClient;

#[derive(Clone)]
pub struct AppState {
    pub node: Node,
    pub client: HttpPeerClient,
    /// Held while a sync pass runs so rejected blocks don't stack passes.
    pub sync_guard: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(node: Node, client: HttpPeerClient) -> Self {
        Self {
            node,
            client,
            sync_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Run a sync pass unless one is already in flight.
    pub async fn sync(&self) -> Option<SyncReport> {
        let _guard = self.sync_guard.try_lock().ok()?;
        Some(self.node.sync_with_peers(&self.client).await)
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Serialize, Deserialize)]
pub struct PeersBody {
    pub peers: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub struct NewPeer {
    #[serde(default)]
    pub peer: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxIn {
    pub from: String,
    pub to: String,
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewTransaction {
    #[serde(default)]
    pub tx_id: String,
    pub transaction: TxIn,
}

#[derive(Serialize)]
struct Balance {
    address: String,
    balance: i128,
}

type Reply = (StatusCode, Json<serde_json::Value>);

fn reply(status: StatusCode, body: serde_json::Value) -> Reply {
    (status, Json(body))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/", get(index))
        .route("/chain", get(chain))
        .route("/peers", get(peers))
        .route("/peers/add", post(add_peer))
        .route("/transactions/new", post(new_transaction))
        .route("/blocks/receive", post(receive_block))
        .route("/balance/{address}", get(balance))
        .route("/sync", post(sync))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn index(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "message": "ledger node running",
        "peers": state.node.list_peers(),
        "chain_length": state.node.chain().len(),
    }))
}

async fn chain(State(state): State<AppState>) -> Json<ChainResponse> {
    Json(state.node.export_chain())
}

async fn peers(State(state): State<AppState>) -> Json<PeersBody> {
    Json(PeersBody {
        peers: state.node.list_peers(),
    })
}

async fn add_peer(State(state): State<AppState>, Json(body): Json<NewPeer>) -> Reply {
    if body.peer.trim().is_empty() {
        return reply(StatusCode::BAD_REQUEST, json!({ "error": "missing peer" }));
    }
    if state.node.register_peer(&body.peer) {
        info!(peer = %body.peer, "peer joined");
    }
    reply(
        StatusCode::CREATED,
        json!({ "message": "peer added", "peers": state.node.list_peers() }),
    )
}

async fn new_transaction(
    State(state): State<AppState>,
    Json(mut body): Json<NewTransaction>,
) -> Reply {
    if body.tx_id.trim().is_empty() {
        return reply(StatusCode::BAD_REQUEST, json!({ "message": "missing tx_id" }));
    }
    // Stamp once here so every node relays the identical transaction.
    let timestamp = *body.transaction.timestamp.get_or_insert_with(now_secs);
    let tx = Transaction {
        from: body.transaction.from.clone(),
        to: body.transaction.to.clone(),
        amount: body.transaction.amount,
        timestamp,
    };
    if !state.node.submit_transaction(tx, &body.tx_id) {
        return reply(StatusCode::OK, json!({ "message": "tx already seen" }));
    }
    info!(tx_id = %body.tx_id, "transaction queued");

    tokio::spawn(relay_transaction(state, body));
    reply(
        StatusCode::CREATED,
        json!({ "message": "transaction added to pending" }),
    )
}

async fn relay_transaction(state: AppState, body: NewTransaction) {
    for peer in state.node.list_peers() {
        if let Err(e) = state.client.push_transaction(&peer, &body).await {
            warn!("could not relay transaction: {e}");
        }
    }
}

async fn receive_block(
    State(state): State<AppState>,
    Json(raw): Json<serde_json::Value>,
) -> Reply {
    let block: Block = match serde_json::from_value(raw) {
        Ok(block) => block,
        Err(e) => {
            warn!("malformed block from peer: {e}");
            return reply(
                StatusCode::BAD_REQUEST,
                json!({ "error": format!("invalid block data: {e}") }),
            );
        }
    };
    let index = block.index;
    match state.node.submit_peer_block(block) {
        Ok(()) => reply(
            StatusCode::CREATED,
            json!({ "message": "block accepted", "index": index }),
        ),
        Err(e) => {
            // Most likely we are on a different fork; see who is longer.
            let sync_state = state.clone();
            tokio::spawn(async move {
                sync_state.sync().await;
            });
            reply(
                StatusCode::BAD_REQUEST,
                json!({ "message": "block rejected", "reason": e.to_string() }),
            )
        }
    }
}

async fn balance(State(state): State<AppState>, Path(address): Path<String>) -> Json<Balance> {
    let balance = state.node.balance(&address);
    Json(Balance { address, balance })
}

async fn sync(State(state): State<AppState>) -> Reply {
    match state.sync().await {
        Some(report) => reply(StatusCode::OK, json!(report)),
        None => reply(
            StatusCode::CONFLICT,
            json!({ "message": "sync already in progress" }),
        ),
    }
}
