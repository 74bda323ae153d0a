//! The HTTP surface (§6): peer-to-peer routes under `/p2p/*` plus the
//! wallet-facing routes (`/status`, `/mining/status`, `/fund`,
//! `/transaction`, `/balance`, `/chain`, `/network`) a wallet or block
//! explorer talks to. One axum `Router` serves both.

use crate::gossip::{
    AnnouncedBlock, AnnouncedTx, ChainResponse, GossipNode, HandshakePayload, HandshakeResponse,
    PeersResponse,
};
use crate::miner::MinerHandle;
use crate::wallet::Wallet;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bond_core::transaction::Transaction;
use bond_core::ChainState;
use serde::{Deserialize, Serialize};
use shared::{Amount, PublicKey};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub state: Arc<Mutex<ChainState>>,
    pub gossip: Arc<GossipNode>,
    pub wallet: Arc<Wallet>,
    pub miner: Arc<MinerHandle>,
}

pub fn router(app: AppState) -> Router {
    Router::new()
        .route("/p2p/handshake", post(handshake))
        .route("/p2p/block", post(receive_block))
        .route("/p2p/tx", post(receive_tx))
        .route("/p2p/chain", get(get_chain))
        .route("/p2p/peers", get(get_peers))
        .route("/status", get(status))
        .route("/mining/status", get(mining_status))
        .route("/chain", get(get_chain))
        .route("/network", get(network_map))
        .route("/balance", post(balance))
        .route("/fund", post(fund))
        .route("/transaction", post(submit_transaction))
        .with_state(app)
}

struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorBody { error: self.1 })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn core_err(err: bond_core::CoreError) -> ApiError {
    ApiError(StatusCode::BAD_REQUEST, err.to_string())
}

async fn handshake(
    State(app): State<AppState>,
    Json(payload): Json<HandshakePayload>,
) -> Response {
    let url = payload.url.clone();
    let version = payload.version.clone();
    let accepted = app.gossip.handle_handshake(payload).await;
    if !accepted {
        return StatusCode::FORBIDDEN.into_response();
    }
    let chain_length = app.state.lock().await.height() + 1;
    Json(HandshakeResponse { url, version, chain_length }).into_response()
}

async fn receive_block(
    State(app): State<AppState>,
    Json(announced): Json<AnnouncedBlock>,
) -> impl IntoResponse {
    app.gossip.handle_new_block(announced).await;
    StatusCode::OK
}

async fn receive_tx(
    State(app): State<AppState>,
    Json(announced): Json<AnnouncedTx>,
) -> impl IntoResponse {
    app.gossip.handle_new_tx(announced).await;
    StatusCode::OK
}

async fn get_chain(State(app): State<AppState>) -> Json<ChainResponse> {
    let chain = app.state.lock().await.chain().to_vec();
    Json(ChainResponse { chain })
}

async fn get_peers(State(app): State<AppState>) -> Json<PeersResponse> {
    let peers = app.gossip.peers.lock().await.list();
    Json(PeersResponse { peers })
}

#[derive(Serialize)]
struct StatusBody {
    height: u64,
    tip_hash: String,
    difficulty: u8,
    mempool_size: usize,
    peer_count: usize,
    circulating_supply: Amount,
    address: PublicKey,
}

async fn status(State(app): State<AppState>) -> Json<StatusBody> {
    let state = app.state.lock().await;
    let peer_count = app.gossip.peers.lock().await.len();
    Json(StatusBody {
        height: state.height(),
        tip_hash: state.tip().hash.to_hex(),
        difficulty: state.difficulty(),
        mempool_size: state.mempool().len(),
        peer_count,
        circulating_supply: state.circulating_supply(),
        address: app.wallet.address(),
    })
}

async fn mining_status(State(app): State<AppState>) -> Json<bond_core::MiningStatus> {
    let state = app.state.lock().await;
    Json(crate::miner::status(&state, &app.miner))
}

#[derive(Serialize)]
struct NetworkMap {
    public_url: String,
    peers: Vec<String>,
}

async fn network_map(State(app): State<AppState>) -> Json<NetworkMap> {
    Json(NetworkMap {
        public_url: app.gossip.public_url.clone(),
        peers: app.gossip.peers.lock().await.list(),
    })
}

#[derive(Deserialize)]
struct BalanceRequest {
    #[serde(default)]
    public_key: Option<PublicKey>,
}

#[derive(Serialize)]
struct BalanceResponse {
    public_key: PublicKey,
    balance: Amount,
}

async fn balance(
    State(app): State<AppState>,
    Json(req): Json<BalanceRequest>,
) -> Json<BalanceResponse> {
    let public_key = req.public_key.unwrap_or_else(|| app.wallet.address());
    let state = app.state.lock().await;
    let balance = state.utxo_set().balance_of(&public_key);
    Json(BalanceResponse { public_key, balance })
}

#[derive(Deserialize)]
struct FundRequest {
    recipient_public_key: PublicKey,
    amount: Amount,
}

#[derive(Serialize)]
struct TransactionResponse {
    tx_id: String,
}

/// Testing-only faucet: credits `amount` directly to `recipient_public_key`
/// without going through the mempool or the miner. Never gossiped to peers.
async fn fund(
    State(app): State<AppState>,
    Json(req): Json<FundRequest>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let timestamp = now_unix();
    let tx_id = {
        let mut state = app.state.lock().await;
        state
            .fund_address(req.recipient_public_key, req.amount, timestamp)
            .map_err(core_err)?
    };
    app.gossip.persist_utxo_set().await;
    Ok(Json(TransactionResponse { tx_id: tx_id.to_hex() }))
}

async fn submit_transaction(
    State(app): State<AppState>,
    Json(tx): Json<Transaction>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let tx_id = tx.id.to_hex();
    app.gossip.announce_transaction(tx).await.map_err(core_err)?;
    Ok(Json(TransactionResponse { tx_id }))
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_secs() as i64
}
