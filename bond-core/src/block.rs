use crate::error::{CoreError, CoreResult};
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use shared::{BlockHash, BlockHeight, Hash256};

/// The fields that feed the block's hash; everything except `hash` itself
/// (invariant B1). The nonce lives in the header view — mining only ever
/// touches this value, never re-deriving the transaction list.
#[derive(Serialize)]
struct HeaderView<'a> {
    index: BlockHeight,
    timestamp: i64,
    transactions: &'a [Transaction],
    previous_hash: BlockHash,
    difficulty: u8,
    nonce: u64,
}

/// A block of transactions committed to the chain under proof of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub index: BlockHeight,
    pub timestamp: i64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: BlockHash,
    pub difficulty: u8,
    pub nonce: u64,
    pub hash: BlockHash,
}

impl Block {
    fn header_view(&self) -> HeaderView<'_> {
        HeaderView {
            index: self.index,
            timestamp: self.timestamp,
            transactions: &self.transactions,
            previous_hash: self.previous_hash,
            difficulty: self.difficulty,
            nonce: self.nonce,
        }
    }

    /// Recomputes the block's hash over the header view (invariant B1).
    #[must_use]
    pub fn recompute_hash(&self) -> Hash256 {
        Hash256::double_sha256(&shared::serialize(&self.header_view()))
    }

    /// Builds and mines a new block: searches `nonce` starting from zero
    /// until `recompute_hash()` meets `difficulty` (§4.3 `mine`). Unbounded;
    /// the only cancellation point is between nonce attempts, supervised by
    /// the caller (see the `Miner` component).
    #[must_use]
    pub fn mine(
        index: BlockHeight,
        timestamp: i64,
        transactions: Vec<Transaction>,
        previous_hash: BlockHash,
        difficulty: u8,
    ) -> Self {
        let mut block = Self {
            index,
            timestamp,
            transactions,
            previous_hash,
            difficulty,
            nonce: 0,
            hash: Hash256::zero(),
        };
        loop {
            let candidate = block.recompute_hash();
            if candidate.meets_difficulty(difficulty) {
                block.hash = candidate;
                return block;
            }
            block.nonce += 1;
        }
    }

    /// Reconstructs a block whose hash was already computed elsewhere (the
    /// deserialization path — §4.3), verifying the claimed hash matches.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::BadHash` if the stored hash does not match the
    /// recomputed digest.
    pub fn from_parts(
        index: BlockHeight,
        timestamp: i64,
        transactions: Vec<Transaction>,
        previous_hash: BlockHash,
        difficulty: u8,
        nonce: u64,
        hash: BlockHash,
    ) -> CoreResult<Self> {
        let block = Self {
            index,
            timestamp,
            transactions,
            previous_hash,
            difficulty,
            nonce,
            hash,
        };
        if block.recompute_hash() != block.hash {
            return Err(CoreError::BadHash);
        }
        Ok(block)
    }

    #[must_use]
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::KeyPair;

    #[test]
    fn mined_block_meets_its_own_difficulty() {
        let miner = KeyPair::generate().unwrap();
        let coinbase = Transaction::coinbase(50, miner.public_key, 1_700_000_000);
        let block = Block::mine(1, 1_700_000_000, vec![coinbase], Hash256::zero(), 1);
        assert!(block.hash.meets_difficulty(1));
        assert_eq!(block.recompute_hash(), block.hash);
    }

    #[test]
    fn from_parts_rejects_tampered_hash() {
        let miner = KeyPair::generate().unwrap();
        let coinbase = Transaction::coinbase(50, miner.public_key, 1_700_000_000);
        let mut block = Block::mine(1, 1_700_000_000, vec![coinbase], Hash256::zero(), 1);
        block.nonce += 1; // invalidate without recomputing hash
        let result = Block::from_parts(
            block.index,
            block.timestamp,
            block.transactions,
            block.previous_hash,
            block.difficulty,
            block.nonce,
            block.hash,
        );
        assert!(matches!(result, Err(CoreError::BadHash)));
    }
}
