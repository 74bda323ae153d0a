//! Background proof-of-work loop (§4.11 `MinerTask`). `bond_core::mining`
//! supplies the pure block-template-and-search functions; this module owns
//! the only things that don't belong in that pure core: the run/pause
//! switch, the blocking-task spawn for the CPU-bound search, mempool
//! eviction/persistence, and announcing a freshly mined block to the rest
//! of the network.

use crate::gossip::GossipNode;
use bond_core::mining;
use bond_core::{ChainState, MiningStatus, Storage};
use shared::PublicKey;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

/// Shared run/pause flag, mined-block counter, and last-block telemetry,
/// readable from the status endpoint without taking the chain-state lock.
#[derive(Default)]
pub struct MinerHandle {
    running: AtomicBool,
    blocks_mined: AtomicU64,
    last_nonce: AtomicU64,
    last_elapsed_millis: AtomicU64,
}

impl MinerHandle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            blocks_mined: AtomicU64::new(0),
            last_nonce: AtomicU64::new(0),
            last_elapsed_millis: AtomicU64::new(0),
        }
    }

    pub fn pause(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn blocks_mined(&self) -> u64 {
        self.blocks_mined.load(Ordering::SeqCst)
    }

    fn record_mined_block(&self, nonce: u64, elapsed: Duration) {
        self.blocks_mined.fetch_add(1, Ordering::SeqCst);
        self.last_nonce.store(nonce, Ordering::SeqCst);
        self.last_elapsed_millis
            .store(elapsed.as_millis() as u64, Ordering::SeqCst);
    }

    #[must_use]
    fn last_block(&self) -> Option<(u64, f64)> {
        let millis = self.last_elapsed_millis.load(Ordering::SeqCst);
        if millis == 0 && self.blocks_mined() == 0 {
            return None;
        }
        Some((
            self.last_nonce.load(Ordering::SeqCst),
            millis as f64 / 1000.0,
        ))
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_secs() as i64
}

/// Runs the mining loop forever: while running, evicts stale mempool
/// entries, builds a block template against the current tip, searches for
/// a valid nonce on a blocking thread, appends it under the chain-state
/// lock, and broadcasts it. While paused, idles and re-checks periodically.
pub async fn run(
    handle: Arc<MinerHandle>,
    state: Arc<Mutex<ChainState>>,
    gossip: Arc<GossipNode>,
    reward_recipient: PublicKey,
) {
    let poll_interval = Duration::from_millis(500);

    loop {
        if !handle.is_running() {
            sleep(poll_interval).await;
            continue;
        }

        let evicted = state.lock().await.evict_expired(now_unix());
        if evicted > 0 {
            info!(evicted, "dropped expired mempool transactions");
            persist_mempool(&state, &gossip.storage).await;
        }

        let snapshot = state.lock().await.clone();
        let recipient = reward_recipient.clone();
        let timestamp = now_unix();
        let started = Instant::now();

        let mined = tokio::task::spawn_blocking(move || {
            mining::mine_next_block(&snapshot, recipient, timestamp)
        })
        .await;
        let elapsed = started.elapsed();

        let Ok(block) = mined else {
            warn!("mining task panicked, restarting loop");
            continue;
        };

        if !handle.is_running() {
            // Paused mid-search; discard the block rather than append one
            // the operator asked us to stop producing.
            continue;
        }

        let appended = {
            let mut state = state.lock().await;
            if state.tip().hash != block.previous_hash {
                // Tip moved under us (reorg or a peer's block landed first).
                Err(bond_core::CoreError::BadPreviousHash)
            } else {
                state.append_block(block.clone())
            }
        };

        match appended {
            Ok(()) => {
                handle.record_mined_block(block.nonce, elapsed);
                let secs = elapsed.as_secs_f64().max(f64::EPSILON);
                let hashrate = block.nonce as f64 / secs;
                info!(
                    height = block.index,
                    nonce = block.nonce,
                    elapsed_secs = secs,
                    hashrate,
                    "mined block"
                );
                persist_state(&state, &gossip.storage).await;
                gossip.announce_block(block).await;
            }
            Err(err) => {
                sleep(poll_interval).await;
                warn!(%err, "discarding stale mined block, retrying");
            }
        }
    }
}

async fn persist_mempool(state: &Arc<Mutex<ChainState>>, storage: &Storage) {
    let mempool = state.lock().await.mempool().to_vec();
    if let Err(err) = storage.save_mempool(&mempool) {
        warn!(%err, "failed to persist mempool");
    }
}

/// Persists chain, UTXO set, and mempool right after a mined block lands,
/// so a crash never loses a block this node itself just produced.
async fn persist_state(state: &Arc<Mutex<ChainState>>, storage: &Storage) {
    let snapshot = state.lock().await.clone();
    if let Err(err) = storage.save_state(&snapshot) {
        warn!(%err, "failed to persist chain state");
    }
}

#[must_use]
pub fn status(state: &ChainState, handle: &MinerHandle) -> MiningStatus {
    mining::status(state, handle.is_running(), handle.blocks_mined(), handle.last_block())
}
