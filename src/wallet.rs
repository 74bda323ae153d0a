//! A thin signing wallet over a node's own chain state: key management plus
//! UTXO selection and transaction construction (§4.12, grounded in the
//! reference wallet's `select_utxos`/`create_transaction`).

use bond_core::transaction::{Transaction, TxInput, TxOutput};
use bond_core::ChainState;
use shared::{Amount, KeyPair, OutPoint, PublicKey};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("I/O error reading/writing key file: {0}")]
    Io(#[from] std::io::Error),
    #[error("key file is not a valid PEM private key: {0}")]
    InvalidKey(#[from] shared::CryptoError),
    #[error("insufficient funds: available {available}, needed {needed}")]
    InsufficientFunds { available: Amount, needed: Amount },
    #[error(transparent)]
    Core(#[from] bond_core::CoreError),
}

pub type WalletResult<T> = std::result::Result<T, WalletError>;

/// A node's own keypair, used both to receive mining rewards and to sign
/// outgoing transactions.
pub struct Wallet {
    keypair: KeyPair,
}

impl Wallet {
    /// Loads a wallet from `path` if it exists, otherwise generates a new
    /// one and persists it there (the load-or-generate pattern every node
    /// uses for its miner address).
    pub fn load_or_generate(path: &Path) -> WalletResult<Self> {
        if path.exists() {
            let pem = fs::read_to_string(path)?;
            let keypair = KeyPair::from_pem(&pem)?;
            Ok(Self { keypair })
        } else {
            let keypair = KeyPair::generate()?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, keypair.to_pem())?;
            Ok(Self { keypair })
        }
    }

    #[must_use]
    pub fn address(&self) -> PublicKey {
        self.keypair.public_key.clone()
    }

    #[must_use]
    pub fn balance(&self, state: &ChainState) -> Amount {
        state.utxo_set().balance_of(&self.keypair.public_key)
    }

    /// Greedily selects this wallet's unspent, unlocked outputs until their
    /// sum reaches `amount_needed`.
    #[must_use]
    pub fn select_utxos(
        &self,
        state: &ChainState,
        amount_needed: Amount,
    ) -> (Vec<OutPoint>, Amount) {
        let locked: HashSet<OutPoint> = state.locked_utxos();
        let mut selected = Vec::new();
        let mut total: Amount = 0;

        for (outpoint, output) in state.utxo_set().iter() {
            if output.recipient_public_key != self.keypair.public_key {
                continue;
            }
            if locked.contains(outpoint) {
                continue;
            }
            selected.push(*outpoint);
            total += output.amount;
            if total >= amount_needed {
                break;
            }
        }

        (selected, total)
    }

    /// Builds and signs a transaction paying `amount` to `recipient`,
    /// sending any change back to this wallet, then returns it without
    /// admitting it to any mempool.
    ///
    /// # Errors
    ///
    /// Returns `WalletError::InsufficientFunds` if this wallet doesn't own
    /// enough unlocked UTXOs to cover `amount + fee`.
    pub fn create_transaction(
        &self,
        state: &ChainState,
        recipient: PublicKey,
        amount: Amount,
        fee: Amount,
        timestamp: i64,
    ) -> WalletResult<Transaction> {
        let total_needed = amount + fee;
        let (selected, total_available) = self.select_utxos(state, total_needed);

        if total_available < total_needed {
            return Err(WalletError::InsufficientFunds {
                available: total_available,
                needed: total_needed,
            });
        }

        let inputs = selected
            .into_iter()
            .map(|outpoint| TxInput::unsigned(outpoint.tx_id, outpoint.output_index))
            .collect();

        let mut outputs = vec![TxOutput::new(amount, recipient)?];
        let change = total_available - total_needed;
        if change > 0 {
            outputs.push(TxOutput::new(change, self.keypair.public_key.clone())?);
        }

        let mut tx = Transaction::new(inputs, outputs, timestamp);
        tx.sign(&self.keypair.private_key)?;
        Ok(tx)
    }
}
