//! Note Reconciler
//!
//! Ties a note handed in by the user to the transaction that created it,
//! then re-checks everything the node claims before storing anything.
//!
//! ```text
//!   tx effect: [h0, h1, h2, 0, 0, ...]   first nullifier N
//!                │   │   │
//!   nonce_i = H(N, i) ──▶ silo(contract, unique(nonce_i, note_hash)) == h_i ?
//!                                 │ match
//!                                 ▼
//!   note hash tree has it? ── no ──▶ NotFound
//!   nullifier tree has it? ── yes ─▶ Destroyed     (active notes only)
//!                                 │
//!                                 ▼
//!                        one record per nonce
//! ```

use std::sync::Arc;

use tracing::{debug, info};
use zelana_privacy::{Address, Field, compute_note_hash_nonce, silo_nullifier};

use crate::database::{IncomingNoteRecord, PxeDatabase};
use crate::error::{PxeError, Result};
use crate::node::{BlockView, LedgerNode, MerkleTreeId};
use crate::simulator::{NoteHashes, Simulator};
use crate::types::{ExtendedNote, InBlock, TxEffect};

#[derive(Clone)]
pub struct NoteReconciler {
    node: Arc<dyn LedgerNode>,
    simulator: Arc<dyn Simulator>,
    db: Arc<dyn PxeDatabase>,
}

impl NoteReconciler {
    pub fn new(
        node: Arc<dyn LedgerNode>,
        simulator: Arc<dyn Simulator>,
        db: Arc<dyn PxeDatabase>,
    ) -> Self {
        Self {
            node,
            simulator,
            db,
        }
    }

    /// Nonces under which `note` hashes to one of its transaction's note hashes
    pub async fn get_note_nonces(&self, note: &ExtendedNote) -> Result<Vec<Field>> {
        let (_, nonces) = self.match_nonces(note).await?;
        Ok(nonces)
    }

    /// Store a spendable note, once per matching nonce
    pub async fn add_note(&self, note: &ExtendedNote, scope: Option<Address>) -> Result<()> {
        let owner = self
            .db
            .get_complete_address(note.owner)?
            .ok_or_else(|| PxeError::not_found(format!("unknown account: {}", note.owner)))?;

        let (effect, nonces) = self.matching_nonces_or_fail(note).await?;

        let mut records = Vec::with_capacity(nonces.len());
        for nonce in nonces {
            let hashes = self.compute_hashes(note, nonce, true).await?;
            let index = self.note_hash_index(&hashes).await?;

            let siloed_nullifier =
                silo_nullifier(note.contract_address.to_field(), hashes.inner_nullifier);
            let spent = self
                .node
                .find_leaves_indexes(
                    BlockView::Latest,
                    MerkleTreeId::NullifierTree,
                    &[siloed_nullifier],
                )
                .await?
                .first()
                .is_some_and(Option::is_some);
            if spent {
                return Err(PxeError::Destroyed {
                    nullifier: siloed_nullifier,
                });
            }

            records.push(record(
                note,
                &effect,
                nonce,
                &hashes,
                siloed_nullifier,
                index,
                owner.address.to_address_point(),
            ));
        }

        self.db.add_notes(&records, &[], scope.unwrap_or(note.owner))?;
        info!(
            tx_hash = %note.tx_hash,
            contract = %note.contract_address,
            count = records.len(),
            "Added note"
        );
        Ok(())
    }

    /// Store a note that was spent before this PXE learned about it
    pub async fn add_nullified_note(&self, note: &ExtendedNote) -> Result<()> {
        let (effect, nonces) = self.matching_nonces_or_fail(note).await?;

        let mut records = Vec::with_capacity(nonces.len());
        for nonce in nonces {
            let hashes = self.compute_hashes(note, nonce, false).await?;
            if !hashes.inner_nullifier.is_zero() {
                return Err(PxeError::invalid_state(format!(
                    "unexpectedly received non-zero nullifier {}",
                    hashes.inner_nullifier
                )));
            }
            let index = self.note_hash_index(&hashes).await?;

            records.push(record(
                note,
                &effect,
                nonce,
                &hashes,
                Field::ZERO,
                index,
                note.owner.to_address_point(),
            ));
        }

        for nullified in &records {
            self.db.add_nullified_note(nullified)?;
        }

        info!(tx_hash = %note.tx_hash, contract = %note.contract_address, "Added nullified note");
        Ok(())
    }

    async fn matching_nonces_or_fail(
        &self,
        note: &ExtendedNote,
    ) -> Result<(InBlock<TxEffect>, Vec<Field>)> {
        let (effect, nonces) = self.match_nonces(note).await?;
        if nonces.is_empty() {
            return Err(PxeError::not_found(format!(
                "cannot find the note in tx {}",
                note.tx_hash
            )));
        }
        Ok((effect, nonces))
    }

    async fn match_nonces(&self, note: &ExtendedNote) -> Result<(InBlock<TxEffect>, Vec<Field>)> {
        let effect = self
            .node
            .get_tx_effect(note.tx_hash)
            .await?
            .ok_or_else(|| PxeError::not_found(format!("unknown tx: {}", note.tx_hash)))?;

        let first_nullifier = effect.data.first_nullifier().ok_or_else(|| {
            PxeError::invalid_state(format!("tx effect {} has no nullifiers", note.tx_hash))
        })?;

        let mut nonces = Vec::new();
        for (i, recorded) in effect.data.note_hashes.iter().enumerate() {
            if recorded.is_zero() {
                break;
            }
            let nonce = compute_note_hash_nonce(first_nullifier, i);
            let hashes = self.compute_hashes(note, nonce, false).await?;
            if hashes.siloed_note_hash == *recorded {
                debug!(tx_hash = %note.tx_hash, index = i, "Note hash matched");
                nonces.push(nonce);
            }
        }

        Ok((effect, nonces))
    }

    async fn compute_hashes(
        &self,
        note: &ExtendedNote,
        nonce: Field,
        compute_nullifier: bool,
    ) -> Result<NoteHashes> {
        Ok(self
            .simulator
            .compute_note_hash_and_optionally_a_nullifier(
                note.contract_address,
                nonce,
                note.storage_slot,
                note.note_type_id,
                compute_nullifier,
                &note.note,
            )
            .await?)
    }

    async fn note_hash_index(&self, hashes: &NoteHashes) -> Result<u64> {
        self.node
            .find_leaves_indexes(
                BlockView::Latest,
                MerkleTreeId::NoteHashTree,
                &[hashes.siloed_note_hash],
            )
            .await?
            .first()
            .copied()
            .flatten()
            .ok_or_else(|| {
                PxeError::not_found(format!(
                    "note does not exist (note hash {})",
                    hashes.siloed_note_hash
                ))
            })
    }
}

fn record(
    note: &ExtendedNote,
    effect: &InBlock<TxEffect>,
    nonce: Field,
    hashes: &NoteHashes,
    siloed_nullifier: Field,
    index: u64,
    address_point: Field,
) -> IncomingNoteRecord {
    IncomingNoteRecord {
        note: note.note.clone(),
        contract_address: note.contract_address,
        storage_slot: note.storage_slot,
        note_type_id: note.note_type_id,
        tx_hash: note.tx_hash,
        l2_block_number: effect.l2_block_number,
        l2_block_hash: effect.l2_block_hash,
        nonce,
        note_hash: hashes.note_hash,
        siloed_nullifier,
        index,
        address_point,
    }
}
