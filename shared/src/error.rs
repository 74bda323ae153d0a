use thiserror::Error;

/// Low-level cryptographic/encoding errors surfaced by the `crypto` and
/// `hash` modules. Higher layers (transaction/block validation) wrap these
/// into the broader Cryptographic category of their own error taxonomy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid signature encoding")]
    InvalidSignature,

    #[error("signature does not verify against the provided key and digest")]
    BadSignature,
}
