use crate::transaction::TxOutput;
use serde::{Deserialize, Serialize};
use shared::OutPoint;
use std::collections::HashMap;

/// The set of all currently-unspent outputs: `OutPoint -> TxOutput`. Each
/// key has an at-most-one-write-then-delete lifecycle (§3 `UtxoSet`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UtxoSet {
    outputs: HashMap<OutPoint, TxOutput>,
}

impl UtxoSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, outpoint: OutPoint, output: TxOutput) {
        self.outputs.insert(outpoint, output);
    }

    pub fn remove(&mut self, outpoint: &OutPoint) -> Option<TxOutput> {
        self.outputs.remove(outpoint)
    }

    #[must_use]
    pub fn get(&self, outpoint: &OutPoint) -> Option<&TxOutput> {
        self.outputs.get(outpoint)
    }

    #[must_use]
    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.outputs.contains_key(outpoint)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Sum of every output amount locked to `recipient`.
    #[must_use]
    pub fn balance_of(&self, recipient: &shared::PublicKey) -> shared::Amount {
        self.outputs
            .values()
            .filter(|o| &o.recipient_public_key == recipient)
            .map(|o| o.amount)
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OutPoint, &TxOutput)> {
        self.outputs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Hash256, KeyPair};

    #[test]
    fn insert_get_remove_round_trip() {
        let alice = KeyPair::generate().unwrap();
        let outpoint = OutPoint::new(Hash256::zero(), 0);
        let output = TxOutput::new(1000, alice.public_key.clone()).unwrap();

        let mut set = UtxoSet::new();
        set.insert(outpoint, output.clone());
        assert!(set.contains(&outpoint));
        assert_eq!(set.get(&outpoint), Some(&output));

        let removed = set.remove(&outpoint);
        assert_eq!(removed, Some(output));
        assert!(!set.contains(&outpoint));
    }

    #[test]
    fn balance_of_sums_matching_outputs() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let mut set = UtxoSet::new();
        set.insert(
            OutPoint::new(Hash256::zero(), 0),
            TxOutput::new(10, alice.public_key.clone()).unwrap(),
        );
        set.insert(
            OutPoint::new(Hash256::zero(), 1),
            TxOutput::new(20, alice.public_key.clone()).unwrap(),
        );
        set.insert(
            OutPoint::new(Hash256::zero(), 2),
            TxOutput::new(5, bob.public_key).unwrap(),
        );

        assert_eq!(set.balance_of(&alice.public_key), 30);
    }
}
