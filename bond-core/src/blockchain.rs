use crate::block::Block;
use crate::consensus;
use crate::error::{CoreError, CoreResult};
use crate::transaction::{Transaction, TxInput};
use crate::utxo::UtxoSet;
use serde::{Deserialize, Serialize};
use shared::{Amount, BlockHeight, PublicKey, TxId};
use std::collections::{HashMap, HashSet};

/// The full mutable state of one node's view of the chain: the committed
/// blocks, the UTXO set they produce, the mempool of pending transactions,
/// and the difficulty currently in force (§4.4 `ChainState`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainState {
    chain: Vec<Block>,
    utxo_set: UtxoSet,
    mempool: Vec<Transaction>,
    tx_index: HashMap<TxId, BlockHeight>,
    difficulty: u8,
}

impl ChainState {
    /// Builds a fresh chain containing only the genesis block, which funds
    /// `genesis_recipient` with the initial coin supply. Every node that
    /// starts from scratch (rather than loading persisted state) must use
    /// the same `genesis_recipient` to end up with compatible chains.
    #[must_use]
    pub fn genesis(genesis_recipient: PublicKey) -> Self {
        let genesis_tx = Transaction::coinbase(
            consensus::GENESIS_SUPPLY,
            genesis_recipient,
            consensus::GENESIS_TIMESTAMP,
        );
        let genesis_block = Block::mine(
            0,
            consensus::GENESIS_TIMESTAMP,
            vec![genesis_tx.clone()],
            shared::Hash256::zero(),
            consensus::GENESIS_DIFFICULTY,
        );

        let mut utxo_set = UtxoSet::new();
        consensus::apply_tx(&genesis_tx, &mut utxo_set);

        let mut tx_index = HashMap::new();
        tx_index.insert(genesis_tx.id, 0);

        Self {
            chain: vec![genesis_block],
            utxo_set,
            mempool: Vec::new(),
            tx_index,
            difficulty: consensus::GENESIS_DIFFICULTY,
        }
    }

    /// Reconstructs a chain state from previously-persisted parts, verifying
    /// the chain itself and rebuilding the UTXO set from it rather than
    /// trusting the persisted UTXO snapshot blindly.
    ///
    /// # Errors
    ///
    /// Returns a `CoreError` if `chain` fails full validation.
    pub fn from_parts(chain: Vec<Block>, mempool: Vec<Transaction>) -> CoreResult<Self> {
        let (utxo_set, difficulty) = consensus::validate_chain(&chain)?;
        let mut tx_index = HashMap::new();
        for block in &chain {
            for tx in &block.transactions {
                tx_index.insert(tx.id, block.index);
            }
        }
        Ok(Self {
            chain,
            utxo_set,
            mempool,
            tx_index,
            difficulty,
        })
    }

    #[must_use]
    pub fn tip(&self) -> &Block {
        self.chain.last().expect("genesis block always present")
    }

    #[must_use]
    pub fn height(&self) -> BlockHeight {
        self.chain.len() as BlockHeight - 1
    }

    #[must_use]
    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    #[must_use]
    pub fn utxo_set(&self) -> &UtxoSet {
        &self.utxo_set
    }

    #[must_use]
    pub fn mempool(&self) -> &[Transaction] {
        &self.mempool
    }

    #[must_use]
    pub const fn difficulty(&self) -> u8 {
        self.difficulty
    }

    /// The outpoints currently reserved by a pending mempool transaction.
    #[must_use]
    pub fn locked_utxos(&self) -> HashSet<shared::OutPoint> {
        self.mempool
            .iter()
            .flat_map(|tx| tx.inputs.iter().map(TxInput::outpoint))
            .collect()
    }

    /// Admits `tx` into the mempool after verifying it against the current
    /// UTXO set and checking none of its inputs are already locked by
    /// another pending transaction (§4.4 `admit_tx`).
    ///
    /// # Errors
    ///
    /// Returns `CoreError::LockedUtxo` if an input is already reserved,
    /// `CoreError::MempoolFull` if the mempool is at capacity, or whatever
    /// `Transaction::verify` returns for an invalid transaction.
    pub fn admit_tx(&mut self, tx: Transaction) -> CoreResult<()> {
        let locked = self.locked_utxos();
        for input in &tx.inputs {
            if locked.contains(&input.outpoint()) {
                return Err(CoreError::LockedUtxo {
                    tx_id: input.tx_id.to_hex(),
                    output_index: input.output_index,
                });
            }
        }

        tx.verify(&self.utxo_set)?;

        if self.mempool.len() >= consensus::MAX_MEMPOOL_SIZE {
            return Err(CoreError::MempoolFull);
        }

        self.mempool.push(tx);
        Ok(())
    }

    /// Removes mempool transactions older than `consensus::TX_EXPIRY_SECONDS`
    /// relative to `now`, returning how many were dropped.
    pub fn evict_expired(&mut self, now: i64) -> usize {
        let before = self.mempool.len();
        self.mempool
            .retain(|tx| now - tx.timestamp <= consensus::TX_EXPIRY_SECONDS);
        before - self.mempool.len()
    }

    /// Appends a mined block: validates it against the tip and the current
    /// UTXO set, applies its transactions, advances the difficulty, and
    /// drops any mempool transactions it included (§4.4 `append_block`).
    ///
    /// # Errors
    ///
    /// Returns the `CoreError` from `consensus::validate_block` on failure;
    /// `self` is left unchanged.
    pub fn append_block(&mut self, block: Block) -> CoreResult<()> {
        consensus::validate_block(&block, self.tip(), &self.utxo_set, self.difficulty)?;

        for tx in &block.transactions {
            consensus::apply_tx(tx, &mut self.utxo_set);
            self.tx_index.insert(tx.id, block.index);
        }

        let included: HashSet<TxId> = block.transactions.iter().map(|tx| tx.id).collect();
        self.mempool.retain(|tx| !included.contains(&tx.id));

        self.chain.push(block);
        self.difficulty = consensus::next_difficulty(&self.chain, self.difficulty);

        Ok(())
    }

    /// Rebuilds the UTXO set from scratch by replaying the entire chain,
    /// without mutating `self` (§4.4 `rebuild_utxo_set`). Used after
    /// adopting a competing chain during a reorg.
    ///
    /// # Errors
    ///
    /// Returns a `CoreError` if the chain fails validation during replay.
    pub fn rebuild_utxo_set(&self) -> CoreResult<UtxoSet> {
        Ok(consensus::validate_chain(&self.chain)?.0)
    }

    /// Looks up a transaction by id in O(1) via the block index.
    #[must_use]
    pub fn get_transaction(&self, tx_id: &TxId) -> Option<(&Transaction, BlockHeight)> {
        let block_index = *self.tx_index.get(tx_id)?;
        let block = &self.chain[block_index as usize];
        let tx = block.transactions.iter().find(|tx| &tx.id == tx_id)?;
        Some((tx, block_index))
    }

    /// Total coins in circulation, computed by summing every coinbase
    /// output across the chain plus any funding outputs from `fund_address`.
    #[must_use]
    pub fn circulating_supply(&self) -> Amount {
        self.chain
            .iter()
            .flat_map(|block| &block.transactions)
            .filter(|tx| tx.is_coinbase())
            .flat_map(|tx| &tx.outputs)
            .map(|output| output.amount)
            .sum::<Amount>()
            + self
                .utxo_set
                .iter()
                .filter(|(outpoint, _)| !self.tx_index.contains_key(&outpoint.tx_id))
                .map(|(_, output)| output.amount)
                .sum::<Amount>()
    }

    /// Testing-only faucet: mints `amount` directly to `recipient` as a
    /// spendable UTXO, bypassing the mempool and the single-coinbase-per-block
    /// rule entirely (§4.12 `/fund`). Never broadcast to peers.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NegativeOutput` for a negative amount, or
    /// `CoreError::FundExceedsSupply` if minting would push circulating
    /// supply past `consensus::MAX_SUPPLY`.
    pub fn fund_address(
        &mut self,
        recipient: PublicKey,
        amount: Amount,
        timestamp: i64,
    ) -> CoreResult<TxId> {
        if amount < 0 {
            return Err(CoreError::NegativeOutput);
        }
        let projected = self.circulating_supply() + amount;
        if projected > consensus::MAX_SUPPLY {
            return Err(CoreError::FundExceedsSupply {
                projected,
                max: consensus::MAX_SUPPLY,
            });
        }

        let funding_tx = Transaction::coinbase(amount, recipient, timestamp);
        consensus::apply_tx(&funding_tx, &mut self.utxo_set);
        Ok(funding_tx.id)
    }

    /// Replaces the current chain with `candidate` if it is strictly longer
    /// (§9 fork-choice: strictly-longer-chain-wins, ties favor the
    /// incumbent). Rebuilds the UTXO set and mempool locks from the new
    /// chain on adoption.
    ///
    /// # Errors
    ///
    /// Returns a `CoreError` if `candidate` does not validate; `self` is
    /// left unchanged either way unless the replacement is adopted.
    pub fn maybe_adopt_chain(&mut self, candidate: Vec<Block>) -> CoreResult<bool> {
        if candidate.len() <= self.chain.len() {
            return Ok(false);
        }
        let (utxo_set, difficulty) = consensus::validate_chain(&candidate)?;

        let mut tx_index = HashMap::new();
        for block in &candidate {
            for tx in &block.transactions {
                tx_index.insert(tx.id, block.index);
            }
        }

        // Find the first index where the two chains diverge, so we know
        // which of our own blocks are being discarded.
        let fork_index = self
            .chain
            .iter()
            .zip(candidate.iter())
            .position(|(local, remote)| local.hash != remote.hash)
            .unwrap_or_else(|| self.chain.len().min(candidate.len()));

        let surviving_ids: HashSet<TxId> = candidate[fork_index..]
            .iter()
            .flat_map(|b| &b.transactions)
            .map(|tx| tx.id)
            .collect();

        // Transactions committed only in our discarded blocks go back to
        // the mempool, provided they still verify against the new tip.
        let mut replayed: Vec<Transaction> = self.chain[fork_index..]
            .iter()
            .flat_map(|b| &b.transactions)
            .filter(|tx| !tx.is_coinbase() && !surviving_ids.contains(&tx.id))
            .cloned()
            .collect();
        replayed.retain(|tx| tx.verify(&utxo_set).is_ok());

        self.mempool.retain(|tx| !surviving_ids.contains(&tx.id));
        self.mempool.extend(replayed);

        self.difficulty = difficulty;
        self.chain = candidate;
        self.utxo_set = utxo_set;
        self.tx_index = tx_index;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::KeyPair;

    fn genesis_state() -> (ChainState, KeyPair) {
        let miner = KeyPair::generate().unwrap();
        (ChainState::genesis(miner.public_key.clone()), miner)
    }

    #[test]
    fn genesis_funds_recipient() {
        let (state, miner) = genesis_state();
        assert_eq!(state.height(), 0);
        assert_eq!(
            state.utxo_set().balance_of(&miner.public_key),
            consensus::GENESIS_SUPPLY
        );
    }

    #[test]
    fn admit_tx_locks_its_inputs() {
        let (mut state, miner) = genesis_state();
        let bob = KeyPair::generate().unwrap();
        let genesis_tx_id = state.tip().transactions[0].id;

        let input = crate::transaction::TxInput::unsigned(genesis_tx_id, 0);
        let output = crate::transaction::TxOutput::new(100, bob.public_key.clone()).unwrap();
        let mut tx = Transaction::new(vec![input], vec![output], consensus::GENESIS_TIMESTAMP + 1);
        tx.sign(&miner.private_key).unwrap();

        state.admit_tx(tx.clone()).unwrap();

        let input2 = crate::transaction::TxInput::unsigned(genesis_tx_id, 0);
        let output2 = crate::transaction::TxOutput::new(50, bob.public_key).unwrap();
        let mut tx2 = Transaction::new(
            vec![input2],
            vec![output2],
            consensus::GENESIS_TIMESTAMP + 2,
        );
        tx2.sign(&miner.private_key).unwrap();

        assert!(matches!(
            state.admit_tx(tx2),
            Err(CoreError::LockedUtxo { .. })
        ));
    }

    #[test]
    fn append_block_advances_tip_and_clears_mempool() {
        let (mut state, miner) = genesis_state();
        let bob = KeyPair::generate().unwrap();
        let genesis_tx_id = state.tip().transactions[0].id;

        let input = crate::transaction::TxInput::unsigned(genesis_tx_id, 0);
        let output = crate::transaction::TxOutput::new(100, bob.public_key).unwrap();
        let mut tx = Transaction::new(vec![input], vec![output], consensus::GENESIS_TIMESTAMP + 1);
        tx.sign(&miner.private_key).unwrap();
        let fee = tx.verify(state.utxo_set()).unwrap();
        state.admit_tx(tx.clone()).unwrap();

        let reward = consensus::reward(1);
        let coinbase = Transaction::coinbase(
            reward + fee,
            miner.public_key,
            consensus::GENESIS_TIMESTAMP + 2,
        );
        let block = Block::mine(
            1,
            consensus::GENESIS_TIMESTAMP + 2,
            vec![coinbase, tx.clone()],
            state.tip().hash,
            state.difficulty(),
        );

        state.append_block(block).unwrap();
        assert_eq!(state.height(), 1);
        assert!(state.mempool().is_empty());
        assert!(state.get_transaction(&tx.id).is_some());
    }

    #[test]
    fn fund_address_credits_a_spendable_utxo() {
        let (mut state, _miner) = genesis_state();
        let bob = KeyPair::generate().unwrap();

        let tx_id = state
            .fund_address(bob.public_key.clone(), 500, consensus::GENESIS_TIMESTAMP + 1)
            .unwrap();

        assert_eq!(state.utxo_set().balance_of(&bob.public_key), 500);
        assert_eq!(
            state.circulating_supply(),
            consensus::GENESIS_SUPPLY + 500
        );
        assert!(state.utxo_set().contains(&shared::OutPoint::new(tx_id, 0)));
    }

    #[test]
    fn fund_address_rejects_amounts_past_max_supply() {
        let (mut state, _miner) = genesis_state();
        let bob = KeyPair::generate().unwrap();

        let result = state.fund_address(
            bob.public_key,
            consensus::MAX_SUPPLY,
            consensus::GENESIS_TIMESTAMP + 1,
        );

        assert!(matches!(
            result,
            Err(CoreError::FundExceedsSupply { .. })
        ));
    }

    #[test]
    fn reorg_replays_orphaned_transaction_into_mempool() {
        let (mut local, miner) = genesis_state();
        let bob = KeyPair::generate().unwrap();
        let genesis_tx_id = local.tip().transactions[0].id;

        let input = TxInput::unsigned(genesis_tx_id, 0);
        let output = crate::transaction::TxOutput::new(100, bob.public_key.clone()).unwrap();
        let mut paying_tx = Transaction::new(vec![input], vec![output], consensus::GENESIS_TIMESTAMP + 1);
        paying_tx.sign(&miner.private_key).unwrap();

        let local_block = Block::mine(
            1,
            consensus::GENESIS_TIMESTAMP + 1,
            vec![
                Transaction::coinbase(consensus::reward(1), miner.public_key.clone(), consensus::GENESIS_TIMESTAMP + 1),
                paying_tx.clone(),
            ],
            local.tip().hash,
            local.difficulty(),
        );
        local.append_block(local_block).unwrap();
        assert_eq!(local.height(), 1);

        // A competing, longer chain that never includes `paying_tx`.
        let rival = KeyPair::generate().unwrap();
        let genesis = local.chain()[0].clone();
        let rival_b1 = Block::mine(
            1,
            consensus::GENESIS_TIMESTAMP + 1,
            vec![Transaction::coinbase(
                consensus::reward(1),
                rival.public_key.clone(),
                consensus::GENESIS_TIMESTAMP + 1,
            )],
            genesis.hash,
            consensus::GENESIS_DIFFICULTY,
        );
        let rival_b2 = Block::mine(
            2,
            consensus::GENESIS_TIMESTAMP + 2,
            vec![Transaction::coinbase(
                consensus::reward(2),
                rival.public_key,
                consensus::GENESIS_TIMESTAMP + 2,
            )],
            rival_b1.hash,
            consensus::GENESIS_DIFFICULTY,
        );
        let candidate = vec![genesis, rival_b1, rival_b2];

        let adopted = local.maybe_adopt_chain(candidate).unwrap();
        assert!(adopted);
        assert_eq!(local.height(), 2);
        assert!(local.mempool().iter().any(|tx| tx.id == paying_tx.id));
    }
}
