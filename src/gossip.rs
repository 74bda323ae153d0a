//! HTTP-based P2P overlay (§4.8 `GossipNode`). Peers talk to each other
//! over plain JSON-over-HTTP requests, grounded in the reference node's
//! handshake/block/tx/chain/peers exchange. No libp2p, no gossipsub — a
//! flat set of known peer URLs and direct POST/GET calls.

use crate::peer::PeerSet;
use bond_core::block::Block;
use bond_core::consensus;
use bond_core::transaction::Transaction;
use bond_core::{ChainState, Storage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize)]
pub struct HandshakePayload {
    pub url: String,
    #[serde(default)]
    pub port: u16,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct HandshakeResponse {
    pub url: String,
    pub version: String,
    pub chain_length: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnnouncedBlock {
    #[serde(flatten)]
    pub block: Block,
    #[serde(rename = "_sender_url", default)]
    pub sender_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnnouncedTx {
    #[serde(flatten)]
    pub tx: Transaction,
    #[serde(rename = "_sender_url", default)]
    pub sender_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChainResponse {
    pub chain: Vec<Block>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PeersResponse {
    pub peers: Vec<String>,
}

/// The node's view of the network: its own state, its known peers, and
/// the HTTP client used to talk to them.
pub struct GossipNode {
    pub public_url: String,
    pub port: u16,
    pub state: Arc<Mutex<ChainState>>,
    pub peers: Arc<Mutex<PeerSet>>,
    pub storage: Arc<Storage>,
    client: reqwest::Client,
}

impl GossipNode {
    #[must_use]
    pub fn new(
        public_url: String,
        port: u16,
        state: Arc<Mutex<ChainState>>,
        storage: Arc<Storage>,
        known_peers: Vec<String>,
    ) -> Self {
        Self {
            public_url,
            port,
            state,
            peers: Arc::new(Mutex::new(PeerSet::from_saved(known_peers))),
            storage,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("reqwest client builds with a plain timeout"),
        }
    }

    async fn persist_peers(&self) {
        let peers = self.peers.lock().await.list();
        if let Err(err) = self.storage.save_peers(&peers) {
            warn!(%err, "failed to persist peer list");
        }
    }

    /// Persists mempool only, for a transaction admission.
    async fn persist_mempool(&self) {
        let mempool = self.state.lock().await.mempool().to_vec();
        if let Err(err) = self.storage.save_mempool(&mempool) {
            warn!(%err, "failed to persist mempool");
        }
    }

    /// Persists chain, UTXO set, and mempool together, for a block
    /// acceptance or reorg (§4.4 `append_block`/reorg persist).
    async fn persist_state(&self) {
        let snapshot = self.state.lock().await.clone();
        if let Err(err) = self.storage.save_state(&snapshot) {
            warn!(%err, "failed to persist chain state");
        }
    }

    /// Persists the UTXO set after a direct mutation that doesn't go
    /// through the mempool or chain, such as `/fund`.
    pub async fn persist_utxo_set(&self) {
        let utxo_set = self.state.lock().await.utxo_set().clone();
        if let Err(err) = self.storage.save_utxo_set(&utxo_set) {
            warn!(%err, "failed to persist utxo set");
        }
    }

    /// Initiates a handshake with `peer_url`: announces ourselves, then (on
    /// success) syncs the chain and discovers its peers.
    pub async fn connect_to_peer(self: &Arc<Self>, peer_url: String) {
        if peer_url == self.public_url {
            return;
        }
        {
            let peers = self.peers.lock().await;
            if peers.contains(&peer_url) {
                return;
            }
        }

        let body = HandshakePayload {
            url: self.public_url.clone(),
            port: self.port,
            version: crate::peer::PROTOCOL_VERSION.to_string(),
        };

        let ok = self
            .client
            .post(format!("{peer_url}/p2p/handshake"))
            .json(&body)
            .send()
            .await
            .is_ok();

        if !ok {
            warn!(%peer_url, "handshake failed");
            return;
        }

        self.peers.lock().await.insert(peer_url.clone());
        self.persist_peers().await;
        info!(%peer_url, "connected to peer");

        self.sync_chain_from(&peer_url).await;
        self.discover_peers_from(&peer_url).await;
    }

    /// Handles an inbound handshake: registers the peer and, if it's new,
    /// propagates its arrival to every peer we already know.
    pub async fn handle_handshake(self: &Arc<Self>, payload: HandshakePayload) -> bool {
        if payload.url.is_empty() || payload.url == self.public_url {
            return false;
        }
        if !PeerSet::is_version_acceptable(&payload.version) {
            warn!(peer = %payload.url, version = %payload.version, "rejecting peer: protocol too old");
            return false;
        }

        let is_new = self.peers.lock().await.insert(payload.url.clone());
        if is_new {
            info!(peer = %payload.url, "new peer");
            self.persist_peers().await;
            let this = Arc::clone(self);
            let new_peer = payload.url;
            tokio::spawn(async move { this.propagate_new_peer(new_peer).await });
        }
        true
    }

    async fn propagate_new_peer(self: Arc<Self>, new_peer_url: String) {
        // Give the new peer's HTTP listener a moment to come up before we
        // (and everyone we introduce it to) start dialing it.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let body = HandshakePayload {
            url: self.public_url.clone(),
            port: self.port,
            version: crate::peer::PROTOCOL_VERSION.to_string(),
        };
        let _ = self
            .client
            .post(format!("{new_peer_url}/p2p/handshake"))
            .json(&body)
            .send()
            .await;

        let existing: Vec<String> = {
            let peers = self.peers.lock().await;
            peers.list().into_iter().filter(|p| p != &new_peer_url).collect()
        };

        for peer_url in &existing {
            let body = HandshakePayload {
                url: new_peer_url.clone(),
                port: 0,
                version: crate::peer::PROTOCOL_VERSION.to_string(),
            };
            let _ = self
                .client
                .post(format!("{peer_url}/p2p/handshake"))
                .json(&body)
                .send()
                .await;
        }
        for peer_url in &existing {
            let body = HandshakePayload {
                url: peer_url.clone(),
                port: 0,
                version: crate::peer::PROTOCOL_VERSION.to_string(),
            };
            let _ = self
                .client
                .post(format!("{new_peer_url}/p2p/handshake"))
                .json(&body)
                .send()
                .await;
        }
    }

    /// Handles an inbound block announcement: accepts it if it extends our
    /// tip, requests a sync if we're behind, or ignores it if it's stale.
    pub async fn handle_new_block(self: &Arc<Self>, announced: AnnouncedBlock) {
        let AnnouncedBlock { block, sender_url } = announced;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is after the unix epoch")
            .as_secs() as i64;
        if block.difficulty < consensus::GENESIS_DIFFICULTY
            || block.timestamp > now + consensus::MAX_TIMESTAMP_DRIFT
        {
            warn!(index = block.index, "dropping block that fails basic sanity checks");
            return;
        }

        let (previous_matches, behind) = {
            let state = self.state.lock().await;
            let tip = state.tip();
            (block.previous_hash == tip.hash, block.index > tip.index)
        };

        if previous_matches {
            let applied = {
                let mut state = self.state.lock().await;
                state.append_block(block.clone())
            };
            match applied {
                Ok(()) => {
                    info!(index = block.index, "block accepted");
                    self.persist_state().await;
                    if let Some(url) = &sender_url {
                        self.peers.lock().await.reset_strikes(url);
                    }
                    self.broadcast_block(&block, sender_url.as_deref()).await;
                }
                Err(err) => {
                    warn!(index = block.index, %err, "block rejected");
                    if let Some(url) = &sender_url {
                        self.strike_and_maybe_ban(url).await;
                    }
                }
            }
        } else if behind {
            info!(their_index = block.index, "behind peer, syncing");
            if let Some(url) = sender_url {
                self.sync_chain_from(&url).await;
            } else {
                self.sync_from_all().await;
            }
        }
    }

    async fn strike_and_maybe_ban(self: &Arc<Self>, peer_url: &str) {
        let banned = self.peers.lock().await.strike(peer_url);
        if banned {
            warn!(%peer_url, "peer banned after repeated invalid blocks");
            self.persist_peers().await;
        }
    }

    /// Handles an inbound transaction announcement: admits it to the
    /// mempool and relays it onward if it was new.
    pub async fn handle_new_tx(self: &Arc<Self>, announced: AnnouncedTx) {
        let AnnouncedTx { tx, sender_url } = announced;
        let admitted = self.state.lock().await.admit_tx(tx.clone());
        if admitted.is_ok() {
            self.persist_mempool().await;
            self.broadcast_tx(&tx, sender_url.as_deref()).await;
        }
    }

    async fn sync_chain_from(self: &Arc<Self>, peer_url: &str) {
        let Ok(response) = self.client.get(format!("{peer_url}/p2p/chain")).send().await else {
            return;
        };
        let Ok(body) = response.json::<ChainResponse>().await else {
            return;
        };

        let Some(their_genesis) = body.chain.first() else {
            return;
        };

        let (current_len, our_genesis_difficulty) = {
            let state = self.state.lock().await;
            (state.chain().len(), state.chain()[0].difficulty)
        };
        if body.chain.len() <= current_len {
            return;
        }
        if their_genesis.difficulty != our_genesis_difficulty {
            warn!(%peer_url, "peer's chain has a different genesis, ignoring");
            return;
        }
        if body.chain[1..].iter().any(|b| b.difficulty < consensus::GENESIS_DIFFICULTY) {
            warn!(%peer_url, "peer's chain dips below the minimum difficulty, ignoring");
            return;
        }

        let adopted = self.state.lock().await.maybe_adopt_chain(body.chain);
        match adopted {
            Ok(true) => {
                info!(%peer_url, "adopted longer chain");
                self.persist_state().await;
            }
            Ok(false) => {}
            Err(err) => warn!(%peer_url, %err, "rejected candidate chain"),
        }
    }

    async fn sync_from_all(self: &Arc<Self>) {
        let peers = self.peers.lock().await.list();
        for peer_url in peers {
            self.sync_chain_from(&peer_url).await;
        }
    }

    async fn discover_peers_from(self: &Arc<Self>, peer_url: &str) {
        let Ok(response) = self.client.get(format!("{peer_url}/p2p/peers")).send().await else {
            return;
        };
        let Ok(body) = response.json::<PeersResponse>().await else {
            return;
        };

        for url in body.peers {
            if url == self.public_url {
                continue;
            }
            let known = self.peers.lock().await.contains(&url);
            if !known {
                let this = Arc::clone(self);
                tokio::spawn(async move { this.connect_to_peer(url).await });
            }
        }
    }

    pub async fn broadcast_block(self: &Arc<Self>, block: &Block, exclude: Option<&str>) {
        let peers = self.peers.lock().await.list();
        for peer_url in peers {
            if Some(peer_url.as_str()) == exclude {
                continue;
            }
            let client = self.client.clone();
            let body = AnnouncedBlock {
                block: block.clone(),
                sender_url: Some(self.public_url.clone()),
            };
            tokio::spawn(async move {
                let _ = client.post(format!("{peer_url}/p2p/block")).json(&body).send().await;
            });
        }
    }

    pub async fn broadcast_tx(self: &Arc<Self>, tx: &Transaction, exclude: Option<&str>) {
        let peers = self.peers.lock().await.list();
        for peer_url in peers {
            if Some(peer_url.as_str()) == exclude {
                continue;
            }
            let client = self.client.clone();
            let body = AnnouncedTx {
                tx: tx.clone(),
                sender_url: Some(self.public_url.clone()),
            };
            tokio::spawn(async move {
                let _ = client.post(format!("{peer_url}/p2p/tx")).json(&body).send().await;
            });
        }
    }

    /// Admits a locally-submitted transaction and broadcasts it if accepted.
    pub async fn announce_transaction(self: &Arc<Self>, tx: Transaction) -> bond_core::CoreResult<()> {
        self.state.lock().await.admit_tx(tx.clone())?;
        self.persist_mempool().await;
        self.broadcast_tx(&tx, None).await;
        Ok(())
    }

    /// Broadcasts a block this node just mined.
    pub async fn announce_block(self: &Arc<Self>, block: Block) {
        self.broadcast_block(&block, None).await;
        info!(index = block.index, "block announced");
    }
}
