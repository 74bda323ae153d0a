use crate::error::{CoreError, CoreResult};
use crate::utxo::UtxoSet;
use serde::{Deserialize, Serialize};
use shared::{Amount, Hash256, OutPoint, OutputIndex, PrivateKey, PublicKey, Signature, TxId};

/// One spend reference inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub tx_id: TxId,
    pub output_index: OutputIndex,
    #[serde(
        serialize_with = "serialize_signature",
        deserialize_with = "deserialize_signature"
    )]
    pub signature: Option<Signature>,
}

fn serialize_signature<S: serde::Serializer>(
    sig: &Option<Signature>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match sig {
        Some(sig) => s.serialize_str(&sig.to_hex()),
        None => s.serialize_none(),
    }
}

fn deserialize_signature<'de, D: serde::Deserializer<'de>>(
    d: D,
) -> Result<Option<Signature>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    match raw {
        None => Ok(None),
        Some(hex) => Signature::from_hex(&hex)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl TxInput {
    #[must_use]
    pub const fn unsigned(tx_id: TxId, output_index: OutputIndex) -> Self {
        Self {
            tx_id,
            output_index,
            signature: None,
        }
    }

    #[must_use]
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.tx_id, self.output_index)
    }
}

/// One spendable coin created by a transaction, locked to a single
/// recipient public key (there is no script language — see Non-goals).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub amount: Amount,
    pub recipient_public_key: PublicKey,
}

impl TxOutput {
    /// Creates a transaction output.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NegativeOutput` if `amount` is negative.
    pub fn new(amount: Amount, recipient_public_key: PublicKey) -> CoreResult<Self> {
        if amount < 0 {
            return Err(CoreError::NegativeOutput);
        }
        Ok(Self {
            amount,
            recipient_public_key,
        })
    }
}

/// A private, minimal view of a transaction's fields that excludes
/// signatures. Both the signing digest and the transaction id are computed
/// over this view (invariant T1) so that mutating a signature never changes
/// the id — the malleability guard.
#[derive(Serialize)]
struct SignableInput {
    tx_id: TxId,
    output_index: OutputIndex,
}

#[derive(Serialize)]
struct SignableOutput {
    amount: Amount,
    recipient: String,
}

#[derive(Serialize)]
struct SignableView {
    inputs: Vec<SignableInput>,
    outputs: Vec<SignableOutput>,
    timestamp: i64,
}

/// An input/output-set transfer of value, optionally a coinbase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub timestamp: i64,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Builds a new transaction, computing its id over the signable view
    /// (§4.2). `timestamp` defaults to the current time if not provided.
    #[must_use]
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>, timestamp: i64) -> Self {
        let mut tx = Self {
            id: Hash256::zero(),
            timestamp,
            inputs,
            outputs,
        };
        tx.id = tx.compute_id();
        tx
    }

    fn signable_view(&self) -> SignableView {
        SignableView {
            inputs: self
                .inputs
                .iter()
                .map(|i| SignableInput {
                    tx_id: i.tx_id,
                    output_index: i.output_index,
                })
                .collect(),
            outputs: self
                .outputs
                .iter()
                .map(|o| SignableOutput {
                    amount: o.amount,
                    recipient: o.recipient_public_key.as_pem().to_string(),
                })
                .collect(),
            timestamp: self.timestamp,
        }
    }

    fn compute_id(&self) -> TxId {
        Hash256::double_sha256(&shared::serialize(&self.signable_view()))
    }

    /// The digest every input is signed over. Equal to `id` but returned as
    /// a `Hash256` rather than re-derived at each call site.
    #[must_use]
    pub fn signing_digest(&self) -> Hash256 {
        self.compute_id()
    }

    /// Signs every input with `private_key`, assuming all of them are
    /// owned by the same key (the caller is responsible for only including
    /// inputs it can actually sign for).
    ///
    /// # Errors
    ///
    /// Propagates any underlying signing failure.
    pub fn sign(&mut self, private_key: &PrivateKey) -> CoreResult<()> {
        let digest = self.signing_digest();
        let signature = private_key.sign_prehashed(&digest).map_err(CoreError::from)?;
        for input in &mut self.inputs {
            input.signature = Some(signature.clone());
        }
        Ok(())
    }

    #[must_use]
    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Constructs a coinbase transaction paying `amount` to `recipient`.
    #[must_use]
    pub fn coinbase(amount: Amount, recipient: PublicKey, timestamp: i64) -> Self {
        Self::new(
            vec![],
            vec![TxOutput {
                amount,
                recipient_public_key: recipient,
            }],
            timestamp,
        )
    }

    /// Verifies the transaction against `utxo_view` (§4.2 `verify` contract).
    /// Returns the fee on success.
    ///
    /// # Errors
    ///
    /// Returns the specific `CoreError` variant describing why verification
    /// failed.
    pub fn verify(&self, utxo_view: &UtxoSet) -> CoreResult<Amount> {
        if self.is_coinbase() {
            return Ok(0);
        }

        let digest = self.signing_digest();
        let mut input_sum: Amount = 0;

        for input in &self.inputs {
            let outpoint = input.outpoint();
            let resolved = utxo_view.get(&outpoint).ok_or(CoreError::UtxoMissing {
                tx_id: input.tx_id.to_hex(),
                output_index: input.output_index,
            })?;

            if resolved.amount < 0 {
                return Err(CoreError::NegativeAmount);
            }
            input_sum = input_sum
                .checked_add(resolved.amount)
                .ok_or(CoreError::Malformed("input sum overflow".into()))?;

            let signature = input.signature.as_ref().ok_or(CoreError::BadSignature)?;
            let ok = shared::ecdsa_verify(&resolved.recipient_public_key, &digest, signature)
                .map_err(CoreError::from)?;
            if !ok {
                return Err(CoreError::BadSignature);
            }
        }

        let output_sum = self.output_sum()?;
        if input_sum < output_sum {
            return Err(CoreError::ValueCreation {
                inputs: input_sum,
                outputs: output_sum,
            });
        }

        Ok(input_sum - output_sum)
    }

    fn output_sum(&self) -> CoreResult<Amount> {
        let mut sum: Amount = 0;
        for output in &self.outputs {
            if output.amount < 0 {
                return Err(CoreError::NegativeOutput);
            }
            sum = sum
                .checked_add(output.amount)
                .ok_or(CoreError::Malformed("output sum overflow".into()))?;
        }
        Ok(sum)
    }
}
