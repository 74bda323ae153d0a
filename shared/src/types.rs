//! Small shared aliases used throughout the chain core.

use serde::{Deserialize, Serialize};

/// Alias for a transaction id.
pub type TxId = crate::Hash256;

/// Alias for a block hash.
pub type BlockHash = crate::Hash256;

/// Monetary amount. Non-negative by construction at every call site that
/// builds a `TxOutput`; negative amounts are rejected, not merely clamped.
pub type Amount = i64;

/// Unix timestamp in seconds.
pub type Timestamp = i64;

/// Block height / chain index.
pub type BlockHeight = u64;

/// Index of an output within its owning transaction.
pub type OutputIndex = u32;

/// A reference to a spendable transaction output: `(tx_id, output_index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    /// Id of the transaction that created the output.
    pub tx_id: TxId,
    /// Index of the output within that transaction.
    pub output_index: OutputIndex,
}

impl OutPoint {
    /// Creates a new UTXO reference.
    #[must_use]
    pub const fn new(tx_id: TxId, output_index: OutputIndex) -> Self {
        Self {
            tx_id,
            output_index,
        }
    }
}
