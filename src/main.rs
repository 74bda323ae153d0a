mod cli;
mod gossip;
mod http;
mod miner;
mod peer;
mod wallet;

use bond_core::{ChainState, Storage};
use clap::Parser;
use cli::Cli;
use gossip::GossipNode;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use wallet::Wallet;

#[derive(Debug, thiserror::Error)]
enum NodeError {
    #[error(transparent)]
    Core(#[from] bond_core::CoreError),
    #[error(transparent)]
    Storage(#[from] bond_core::storage::StorageError),
    #[error(transparent)]
    Wallet(#[from] wallet::WalletError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), NodeError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let data_dir = cli.resolved_data_dir();
    let public_url = cli.resolved_public_url();

    let storage = Arc::new(Storage::new(data_dir.clone()));
    let wallet_path = data_dir.join("wallet.pem");
    let wallet = Arc::new(Wallet::load_or_generate(&wallet_path)?);

    let state = if storage.has_saved_data() {
        info!(dir = %data_dir.display(), "loading persisted chain state");
        let chain = storage.load_chain()?;
        let mempool = storage.load_mempool()?;
        ChainState::from_parts(chain, mempool)?
    } else {
        info!("no persisted state found, starting a fresh chain");
        ChainState::genesis(wallet.address())
    };
    let state = Arc::new(Mutex::new(state));

    let known_peers = storage.load_peers().unwrap_or_default();
    let gossip = Arc::new(GossipNode::new(
        public_url.clone(),
        cli.port,
        Arc::clone(&state),
        Arc::clone(&storage),
        known_peers,
    ));

    if let Some(peer_url) = cli.peer.clone() {
        let gossip = Arc::clone(&gossip);
        tokio::spawn(async move { gossip.connect_to_peer(peer_url).await });
    }

    let miner_handle = Arc::new(miner::MinerHandle::new());
    if cli.mine {
        let handle = Arc::clone(&miner_handle);
        let state = Arc::clone(&state);
        let gossip = Arc::clone(&gossip);
        let recipient = wallet.address();
        tokio::spawn(async move { miner::run(handle, state, gossip, recipient).await });
    } else {
        miner_handle.pause();
    }

    let app_state = http::AppState {
        state: Arc::clone(&state),
        gossip: Arc::clone(&gossip),
        wallet: Arc::clone(&wallet),
        miner: Arc::clone(&miner_handle),
    };
    let router = http::router(app_state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cli.port)).await?;
    info!(%public_url, address = %wallet.address().as_pem().trim(), "bond-node listening");

    // Chain, UTXO, and mempool persistence happens synchronously at each
    // mutation site (GossipNode::persist_state/persist_mempool, miner::run)
    // rather than on a timer, so a crash never loses an already-acknowledged
    // transaction or block.
    axum::serve(listener, router).await?;
    Ok(())
}
