//! Block template construction and mining (§4.6 `Miner`). Pure and
//! synchronous: no threads, no locks. The background loop that repeatedly
//! calls these functions against a shared, lock-guarded `ChainState` and
//! announces newly-mined blocks to peers lives in the node binary, which
//! runs the CPU-bound proof-of-work search on a blocking task rather than
//! the async runtime (§5).

use crate::blockchain::ChainState;
use crate::block::Block;
use crate::consensus;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use shared::{Amount, PublicKey};

/// Selects pending transactions for the next block: highest fee first, up
/// to `consensus::MAX_TX_PER_BLOCK`, skipping any that no longer verify
/// against a private snapshot of the UTXO set (another transaction in the
/// selection may have already spent the same input). Returns the selected
/// transactions in the order they should appear after the coinbase, and
/// their total fee.
#[must_use]
pub fn select_for_block(state: &ChainState) -> (Vec<Transaction>, Amount) {
    let mut candidates: Vec<&Transaction> = state.mempool().iter().collect();
    let mut snapshot = state.utxo_set().clone();

    let fee_of = |tx: &Transaction| tx.verify(state.utxo_set()).unwrap_or(0);
    candidates.sort_by_key(|tx| std::cmp::Reverse(fee_of(tx)));

    let mut selected = Vec::new();
    let mut fees_total: Amount = 0;

    for tx in candidates {
        if selected.len() == consensus::MAX_TX_PER_BLOCK {
            break;
        }
        let Ok(fee) = tx.verify(&snapshot) else {
            continue;
        };
        consensus::apply_tx(tx, &mut snapshot);
        fees_total += fee;
        selected.push(tx.clone());
    }

    (selected, fees_total)
}

/// Builds and mines the next block on top of `state`'s current tip,
/// paying the reward plus collected fees to `reward_recipient`
/// (§4.6 `mine_next_block`). The caller is responsible for appending the
/// result to `state` — this function does not mutate anything.
#[must_use]
pub fn mine_next_block(state: &ChainState, reward_recipient: PublicKey, timestamp: i64) -> Block {
    let (selected, fees_total) = select_for_block(state);
    let next_index = state.height() + 1;
    let reward = consensus::reward(next_index);

    let coinbase = Transaction::coinbase(reward + fees_total, reward_recipient, timestamp);
    let mut transactions = Vec::with_capacity(selected.len() + 1);
    transactions.push(coinbase);
    transactions.extend(selected);

    Block::mine(
        next_index,
        timestamp,
        transactions,
        state.tip().hash,
        state.difficulty(),
    )
}

/// A point-in-time snapshot of mining activity, mirroring the `/mining/status`
/// route's payload (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningStatus {
    pub running: bool,
    pub blocks_mined: u64,
    pub chain_length: u64,
    pub pending_txs: usize,
    pub last_block_nonce: Option<u64>,
    pub last_block_elapsed_secs: Option<f64>,
}

#[must_use]
pub fn status(
    state: &ChainState,
    running: bool,
    blocks_mined: u64,
    last_block: Option<(u64, f64)>,
) -> MiningStatus {
    MiningStatus {
        running,
        blocks_mined,
        chain_length: state.height() + 1,
        pending_txs: state.mempool().len(),
        last_block_nonce: last_block.map(|(nonce, _)| nonce),
        last_block_elapsed_secs: last_block.map(|(_, secs)| secs),
    }
}
