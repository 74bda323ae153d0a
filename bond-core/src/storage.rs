//! On-disk persistence for one node's chain state (§4.9 `Storage`). Three
//! JSON files live under a per-node data directory: `chain.json`,
//! `utxo_set.json`, and `mempool.json` — mirroring the three pieces of
//! state a node actually needs to resume without replaying the network
//! from scratch.

use crate::blockchain::ChainState;
use crate::block::Block;
use crate::transaction::{Transaction, TxOutput};
use crate::utxo::UtxoSet;
use shared::OutPoint;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt JSON in {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// A node's persistence directory. Created lazily on first write.
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    fn ensure_dir(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.dir).map_err(|source| StorageError::Io {
            path: self.dir.clone(),
            source,
        })
    }

    fn write_json<T: serde::Serialize>(&self, filename: &str, value: &T) -> StorageResult<()> {
        self.ensure_dir()?;
        let path = self.path(filename);
        let bytes =
            serde_json::to_vec_pretty(value).expect("in-memory chain state always serializes");
        fs::write(&path, bytes).map_err(|source| StorageError::Io { path, source })
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, filename: &str) -> StorageResult<Option<T>> {
        let path = self.path(filename);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StorageError::Corrupt { path, source })
    }

    /// Like `read_json`, but a corrupt file yields `None` instead of an
    /// error. Every blob except `chain.json` uses this: losing a node's
    /// mempool, UTXO cache, or peer list to a truncated write is recoverable
    /// (rebuilt from the chain or the network), so it must never crash
    /// startup. `chain.json` corruption stays fatal via `read_json` directly.
    fn read_json_lenient<T: serde::de::DeserializeOwned>(
        &self,
        filename: &str,
    ) -> StorageResult<Option<T>> {
        match self.read_json(filename) {
            Ok(value) => Ok(value),
            Err(StorageError::Corrupt { path, source }) => {
                warn!(path = %path.display(), %source, "ignoring corrupt file, starting from empty state");
                Ok(None)
            }
            Err(err @ StorageError::Io { .. }) => Err(err),
        }
    }

    /// Whether a previously-saved chain exists on disk.
    #[must_use]
    pub fn has_saved_data(&self) -> bool {
        self.path("chain.json").exists()
    }

    pub fn save_chain(&self, chain: &[Block]) -> StorageResult<()> {
        self.write_json("chain.json", chain)
    }

    /// Loads the persisted chain. A missing file is fatal here (unlike
    /// the mempool/UTXO files) — `has_saved_data` should be checked first
    /// by the caller to decide between loading and creating genesis.
    pub fn load_chain(&self) -> StorageResult<Vec<Block>> {
        Ok(self.read_json("chain.json")?.unwrap_or_default())
    }

    /// Persists the UTXO set keyed as `"<tx_id>:<output_index>"`.
    pub fn save_utxo_set(&self, utxo_set: &UtxoSet) -> StorageResult<()> {
        let flat: HashMap<String, TxOutput> = utxo_set
            .iter()
            .map(|(outpoint, output)| {
                (
                    format!("{}:{}", outpoint.tx_id.to_hex(), outpoint.output_index),
                    output.clone(),
                )
            })
            .collect();
        self.write_json("utxo_set.json", &flat)
    }

    /// Loads the UTXO set. A missing file yields an empty set — the
    /// normal state right after loading `chain.json` for the first time in
    /// a version that didn't used to persist it, or before genesis exists.
    pub fn load_utxo_set(&self) -> StorageResult<UtxoSet> {
        let flat: HashMap<String, TxOutput> =
            self.read_json_lenient("utxo_set.json")?.unwrap_or_default();
        let mut utxo_set = UtxoSet::new();
        for (key, output) in flat {
            let Some((tx_id_hex, index_str)) = key.rsplit_once(':') else {
                continue;
            };
            let (Ok(tx_id), Ok(output_index)) = (
                shared::Hash256::from_hex(tx_id_hex),
                index_str.parse::<u32>(),
            ) else {
                continue;
            };
            utxo_set.insert(OutPoint::new(tx_id, output_index), output);
        }
        Ok(utxo_set)
    }

    pub fn save_mempool(&self, mempool: &[Transaction]) -> StorageResult<()> {
        self.write_json("mempool.json", mempool)
    }

    pub fn load_mempool(&self) -> StorageResult<Vec<Transaction>> {
        Ok(self.read_json_lenient("mempool.json")?.unwrap_or_default())
    }

    /// Persists every part of `state` that survives a restart.
    pub fn save_state(&self, state: &ChainState) -> StorageResult<()> {
        self.save_chain(state.chain())?;
        self.save_utxo_set(state.utxo_set())?;
        self.save_mempool(state.mempool())
    }

    /// Persists the set of known peer base URLs, so a restarted node can
    /// reconnect without needing a bootstrap address again.
    pub fn save_peers(&self, peers: &[String]) -> StorageResult<()> {
        self.write_json("peers.json", &peers)
    }

    pub fn load_peers(&self) -> StorageResult<Vec<String>> {
        Ok(self.read_json_lenient("peers.json")?.unwrap_or_default())
    }
}

#[must_use]
pub fn default_data_dir(port: u16) -> PathBuf {
    Path::new(&format!("node_data_{port}")).to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TxOutput;
    use shared::{Hash256, KeyPair};

    #[test]
    fn utxo_set_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("bond-storage-test-{}", std::process::id()));
        let storage = Storage::new(&dir);
        let alice = KeyPair::generate().unwrap();

        let mut utxo_set = UtxoSet::new();
        let outpoint = OutPoint::new(Hash256::double_sha256(b"tx"), 3);
        utxo_set.insert(outpoint, TxOutput::new(42, alice.public_key.clone()).unwrap());

        storage.save_utxo_set(&utxo_set).unwrap();
        let reloaded = storage.load_utxo_set().unwrap();
        assert_eq!(reloaded.get(&outpoint), utxo_set.get(&outpoint));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_mempool_file_yields_empty_vec() {
        let dir = std::env::temp_dir().join(format!("bond-storage-test-empty-{}", std::process::id()));
        let storage = Storage::new(&dir);
        assert!(storage.load_mempool().unwrap().is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_mempool_and_peers_files_yield_empty_state_instead_of_erroring() {
        let dir = std::env::temp_dir().join(format!("bond-storage-test-corrupt-{}", std::process::id()));
        let storage = Storage::new(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("mempool.json"), b"not json").unwrap();
        fs::write(dir.join("utxo_set.json"), b"not json").unwrap();
        fs::write(dir.join("peers.json"), b"not json").unwrap();

        assert!(storage.load_mempool().unwrap().is_empty());
        assert!(storage.load_utxo_set().unwrap().iter().next().is_none());
        assert!(storage.load_peers().unwrap().is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_chain_file_is_fatal() {
        let dir = std::env::temp_dir().join(format!("bond-storage-test-chain-corrupt-{}", std::process::id()));
        let storage = Storage::new(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("chain.json"), b"not json").unwrap();

        assert!(matches!(storage.load_chain(), Err(StorageError::Corrupt { .. })));

        let _ = fs::remove_dir_all(&dir);
    }
}
