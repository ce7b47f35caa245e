//! Private execution capability

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use zelana_privacy::{
    Address, Field, compute_inner_nullifier, compute_note_hash, compute_unique_note_hash,
    silo_note_hash,
};

use crate::types::{
    FunctionArtifact, FunctionCall, Note, PrivateExecutionResult, TxExecutionRequest,
};

/// Hashes of one note under one nonce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteHashes {
    pub note_hash: Field,
    pub unique_note_hash: Field,
    pub siloed_note_hash: Field,
    /// Zero when not requested
    pub inner_nullifier: Field,
}

impl NoteHashes {
    /// Standard derivation for contracts that use the default note layout
    pub fn derive(
        contract: Address,
        nonce: Field,
        storage_slot: Field,
        note_type_id: Field,
        note: &Note,
        nullifier_secret: Option<Field>,
    ) -> Self {
        let note_hash = compute_note_hash(storage_slot, note_type_id, &note.items);
        let unique_note_hash = compute_unique_note_hash(nonce, note_hash);
        let siloed_note_hash = silo_note_hash(contract.to_field(), unique_note_hash);
        let inner_nullifier = nullifier_secret
            .map(|nsk| compute_inner_nullifier(unique_note_hash, nsk))
            .unwrap_or(Field::ZERO);
        Self {
            note_hash,
            unique_note_hash,
            siloed_note_hash,
            inner_nullifier,
        }
    }
}

/// Executes contract functions client side
///
/// Execution failures should be returned as a
/// [`SimulationError`](crate::error::SimulationError) inside the
/// `anyhow::Error` so that the PXE can enrich them.
#[async_trait]
pub trait Simulator: Send + Sync {
    async fn run(
        &self,
        request: &TxExecutionRequest,
        entry_point: &FunctionArtifact,
        contract_address: Address,
        msg_sender: Option<Address>,
        scopes: Option<&[Address]>,
        /// Stored capsules, most recent first
        capsules: &[Vec<Field>],
    ) -> Result<PrivateExecutionResult>;

    async fn run_unconstrained(
        &self,
        call: &FunctionCall,
        entry_point: &FunctionArtifact,
        contract_address: Address,
        scopes: Option<&[Address]>,
    ) -> Result<Vec<Field>>;

    /// Runs the contract's note hashing logic for one candidate nonce
    async fn compute_note_hash_and_optionally_a_nullifier(
        &self,
        contract: Address,
        nonce: Field,
        storage_slot: Field,
        note_type_id: Field,
        compute_nullifier: bool,
        note: &Note,
    ) -> Result<NoteHashes>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use zelana_privacy::compute_note_hash_nonce;

    #[test]
    fn test_derive_chain() {
        let contract = Address(Field::from_u64(3));
        let nonce = compute_note_hash_nonce(Field::from_u64(9), 0);
        let note = Note::new(vec![Field::from_u64(100)]);

        let without = NoteHashes::derive(
            contract,
            nonce,
            Field::from_u64(1),
            Field::from_u64(2),
            &note,
            None,
        );
        assert!(without.inner_nullifier.is_zero());

        let with = NoteHashes::derive(
            contract,
            nonce,
            Field::from_u64(1),
            Field::from_u64(2),
            &note,
            Some(Field::from_u64(77)),
        );
        assert_eq!(with.siloed_note_hash, without.siloed_note_hash);
        assert!(!with.inner_nullifier.is_zero());
        assert_eq!(
            with.siloed_note_hash,
            silo_note_hash(contract.to_field(), with.unique_note_hash)
        );
    }
}
