//! secp256k1 ECDSA primitives for transaction signing.
//!
//! Keys are exchanged on the wire and persisted to disk exclusively as
//! PEM-encoded SubjectPublicKeyInfo strings (§3 `PublicKey`, §4.1 `Codec`).
//! Signing/verification use the `secp256k1` crate directly against a
//! prehashed digest; `k256` supplies the PKCS8/PEM encode-decode machinery
//! that `secp256k1` does not.

use crate::error::CryptoError;
use crate::Hash256;
use k256::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use secp256k1::rand::rngs::OsRng;
use secp256k1::{ecdsa, Message, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// A secp256k1 public key, identified solely by its PEM SubjectPublicKeyInfo
/// encoding. Equality is byte equality on that encoding (§3 `PublicKey`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(String);

impl PublicKey {
    /// Builds a `PublicKey` from raw SEC1 bytes (compressed or uncompressed),
    /// re-encoding them as PEM SubjectPublicKeyInfo.
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let point = k256::PublicKey::from_sec1_bytes(bytes)
            .map_err(|_| CryptoError::InvalidKey("malformed secp256k1 point".into()))?;
        let pem = point
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self(pem))
    }

    /// Parses a `PublicKey` from its PEM SubjectPublicKeyInfo wire form.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        // Validate it actually decodes to a secp256k1 point before accepting it.
        k256::PublicKey::from_public_key_pem(pem)
            .map_err(|_| CryptoError::InvalidKey("not a valid SubjectPublicKeyInfo PEM".into()))?;
        Ok(Self(pem.trim_end().to_string() + "\n"))
    }

    /// Returns the PEM SubjectPublicKeyInfo string, the canonical wire form.
    #[must_use]
    pub fn as_pem(&self) -> &str {
        &self.0
    }

    fn to_secp256k1(&self) -> Result<secp256k1::PublicKey, CryptoError> {
        let point = k256::PublicKey::from_public_key_pem(&self.0)
            .map_err(|_| CryptoError::InvalidKey("not a valid SubjectPublicKeyInfo PEM".into()))?;
        let sec1 = point.to_sec1_bytes();
        secp256k1::PublicKey::from_slice(&sec1)
            .map_err(|_| CryptoError::InvalidKey("secp256k1 rejected SEC1 point".into()))
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A secp256k1 private scalar. Never serialized; only ever persisted via
/// `KeyPair::save_pem` / loaded via `KeyPair::load_pem`.
#[derive(Clone)]
pub struct PrivateKey(SecretKey);

impl Drop for PrivateKey {
    fn drop(&mut self) {
        let mut bytes = self.0.secret_bytes();
        bytes.zeroize();
    }
}

impl PrivateKey {
    fn public(&self) -> Result<PublicKey, CryptoError> {
        let secp = Secp256k1::new();
        let pk = secp256k1::PublicKey::from_secret_key(&secp, &self.0);
        PublicKey::from_sec1_bytes(&pk.serialize())
    }

    /// Signs a prehashed 32-byte digest with ECDSA over secp256k1.
    pub fn sign_prehashed(&self, digest: &Hash256) -> Result<Signature, CryptoError> {
        let secp = Secp256k1::new();
        let msg = Message::from_digest(*digest.as_bytes());
        let sig = secp.sign_ecdsa(&msg, &self.0);
        Ok(Signature(sig))
    }
}

/// A secp256k1 keypair: the node's identity for signing transactions and
/// receiving mining payouts.
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

impl KeyPair {
    /// Generates a fresh secp256k1 keypair.
    pub fn generate() -> Result<Self, CryptoError> {
        let secp = Secp256k1::new();
        let (secret_key, _pk) = secp.generate_keypair(&mut OsRng);
        let private_key = PrivateKey(secret_key);
        let public_key = private_key.public()?;
        Ok(Self {
            public_key,
            private_key,
        })
    }

    /// Serializes the private key as unencrypted PEM PKCS8. This matches the
    /// permissive, no-keystore-password key handling the rest of the node
    /// assumes (no HSM, no passphrase prompt).
    #[must_use]
    pub fn to_pem(&self) -> String {
        // secp256k1::SecretKey has no pkcs8 impl of its own; re-derive one
        // via k256's scalar so we get a real PKCS8 PEM, not an ad-hoc format.
        let scalar = k256::SecretKey::from_slice(&self.private_key.0.secret_bytes())
            .expect("secp256k1 and k256 share the curve order");
        use k256::pkcs8::EncodePrivateKey;
        scalar
            .to_pkcs8_pem(LineEnding::LF)
            .expect("valid scalar always encodes")
            .to_string()
    }

    /// Loads a keypair from a PEM PKCS8 private key, recomputing the public
    /// key from it.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        use k256::pkcs8::DecodePrivateKey;
        let scalar = k256::SecretKey::from_pkcs8_pem(pem)
            .map_err(|_| CryptoError::InvalidKey("not a valid PKCS8 private key PEM".into()))?;
        let secret_key = SecretKey::from_slice(&scalar.to_bytes())
            .map_err(|_| CryptoError::InvalidKey("key is not a valid secp256k1 scalar".into()))?;
        let private_key = PrivateKey(secret_key);
        let public_key = private_key.public()?;
        Ok(Self {
            public_key,
            private_key,
        })
    }

    /// Signs a prehashed 32-byte digest with ECDSA over secp256k1. The
    /// digest MUST already be hashed (see `Hash256::double_sha256`); no
    /// hashing happens inside this call.
    pub fn sign_prehashed(&self, digest: &Hash256) -> Result<Signature, CryptoError> {
        self.private_key.sign_prehashed(digest)
    }
}

/// An ECDSA signature over a prehashed digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(ecdsa::Signature);

impl Signature {
    /// Returns the DER encoding of the signature.
    #[must_use]
    pub fn to_der_bytes(&self) -> Vec<u8> {
        self.0.serialize_der().to_vec()
    }

    /// Parses a signature from its DER encoding.
    pub fn from_der_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        ecdsa::Signature::from_der(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidSignature)
    }

    /// Hex-encodes the DER signature, the wire form used by `TxInput`.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_der_bytes())
    }

    /// Parses a signature from its hex-encoded DER form.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidSignature)?;
        Self::from_der_bytes(&bytes)
    }
}

/// Verifies an ECDSA signature over a prehashed digest against a public key.
///
/// Returns `false` (never an error) on a cryptographically invalid
/// signature; callers are expected to map that to `CryptoError::BadSignature`.
pub fn ecdsa_verify(
    public_key: &PublicKey,
    digest: &Hash256,
    signature: &Signature,
) -> Result<bool, CryptoError> {
    let secp = Secp256k1::new();
    let pk = public_key.to_secp256k1()?;
    let msg = Message::from_digest(*digest.as_bytes());
    Ok(secp.verify_ecdsa(&msg, &signature.0, &pk).is_ok())
}
