use shared::CryptoError;
use thiserror::Error;

/// Errors raised while building, verifying, or applying transactions and
/// blocks, grouped the same way peer-strike policy groups them: Structural,
/// Cryptographic, Economic, State, Consensus. Transport and storage-level
/// failures are not modeled here; they belong to the node's own error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    // -- Structural --
    #[error("malformed payload: {0}")]
    Malformed(String),

    // -- Cryptographic --
    #[error("signature does not verify")]
    BadSignature,
    #[error("hash does not match recomputed digest")]
    BadHash,

    // -- Economic --
    #[error("output amount is negative")]
    NegativeOutput,
    #[error("resolved input amount is negative")]
    NegativeAmount,
    #[error("transaction would create value: inputs {inputs} < outputs {outputs}")]
    ValueCreation { inputs: i64, outputs: i64 },

    // -- State --
    #[error("referenced utxo ({tx_id}:{output_index}) does not exist")]
    UtxoMissing { tx_id: String, output_index: u32 },
    #[error("utxo ({tx_id}:{output_index}) is already spent by another mempool transaction")]
    LockedUtxo { tx_id: String, output_index: u32 },
    #[error("mempool is at capacity")]
    MempoolFull,

    // -- Consensus --
    #[error("proof of work is insufficient for difficulty {required}")]
    InsufficientDifficulty { required: u8 },
    #[error("block timestamp {got} is outside the accepted window")]
    BadTimestamp { got: i64 },
    #[error("previous_hash does not match the current tip")]
    BadPreviousHash,
    #[error("block index {got} does not follow the current tip ({expected})")]
    BadIndex { expected: u64, got: u64 },
    #[error("first transaction of a non-genesis block must be a coinbase")]
    MissingCoinbase,
    #[error("coinbase amount {got} does not equal reward+fees {expected}")]
    WrongCoinbaseAmount { expected: i64, got: i64 },
    #[error("block contains more than one coinbase transaction")]
    MultipleCoinbase,
    #[error("funding {projected} would exceed max supply {max}")]
    FundExceedsSupply { projected: i64, max: i64 },
}

impl From<CryptoError> for CoreError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::BadSignature => Self::BadSignature,
            CryptoError::InvalidSignature | CryptoError::InvalidKey(_) => {
                Self::Malformed(err.to_string())
            }
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
