pub mod codec;
pub mod crypto;
pub mod error;
pub mod hash;
pub mod types;

pub use codec::serialize;
pub use crypto::{ecdsa_verify, KeyPair, PrivateKey, PublicKey, Signature};
pub use error::CryptoError;
pub use hash::Hash256;
pub use types::{Amount, BlockHash, BlockHeight, OutPoint, OutputIndex, Timestamp, TxId};
