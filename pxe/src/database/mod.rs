//! PXE persistence
//!
//! Note records are plain values: the reconciler builds them, the database
//! stores them, nothing else mutates them apart from nullification and
//! sync resets.

mod store;

pub use store::RocksDbStore;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use zelana_privacy::{Address, CompleteAddress, Field, Point};

use crate::types::{ContractArtifact, ContractInstance, Note, NoteStatus, TxHash};

/// A note this PXE can spend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingNoteRecord {
    pub note: Note,
    pub contract_address: Address,
    pub storage_slot: Field,
    pub note_type_id: Field,
    pub tx_hash: TxHash,
    pub l2_block_number: u64,
    pub l2_block_hash: Field,
    pub nonce: Field,
    /// Inner note hash
    pub note_hash: Field,
    /// Zero when the nullifier cannot be derived
    pub siloed_nullifier: Field,
    /// Leaf index in the note hash tree
    pub index: u64,
    pub address_point: Field,
}

impl IncomingNoteRecord {
    pub fn key(&self) -> [u8; 96] {
        note_record_key(self.contract_address, self.nonce, self.note_hash)
    }
}

/// A note this PXE sent to someone else
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingNoteRecord {
    pub note: Note,
    pub contract_address: Address,
    pub storage_slot: Field,
    pub note_type_id: Field,
    pub tx_hash: TxHash,
    pub l2_block_number: u64,
    pub l2_block_hash: Field,
    pub nonce: Field,
    pub note_hash: Field,
    pub index: u64,
    /// Outgoing viewing key of the sender
    pub ovpk: Point,
}

impl OutgoingNoteRecord {
    pub fn key(&self) -> [u8; 96] {
        note_record_key(self.contract_address, self.nonce, self.note_hash)
    }
}

/// `contract ‖ nonce ‖ note_hash`
pub fn note_record_key(contract: Address, nonce: Field, note_hash: Field) -> [u8; 96] {
    let mut key = [0u8; 96];
    key[..32].copy_from_slice(contract.0.as_bytes());
    key[32..64].copy_from_slice(nonce.as_bytes());
    key[64..].copy_from_slice(note_hash.as_bytes());
    key
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingNoteQuery {
    pub contract_address: Option<Address>,
    pub storage_slot: Option<Field>,
    pub tx_hash: Option<TxHash>,
    pub address_point: Option<Field>,
    pub status: NoteStatus,
    /// Empty means every scope
    pub scopes: Vec<Address>,
}

impl IncomingNoteQuery {
    pub fn matches(&self, record: &IncomingNoteRecord) -> bool {
        self.contract_address.is_none_or(|c| c == record.contract_address)
            && self.storage_slot.is_none_or(|s| s == record.storage_slot)
            && self.tx_hash.is_none_or(|t| t == record.tx_hash)
            && self.address_point.is_none_or(|p| p == record.address_point)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingNoteQuery {
    pub contract_address: Option<Address>,
    pub storage_slot: Option<Field>,
    pub tx_hash: Option<TxHash>,
    pub ovpk: Option<Point>,
}

impl OutgoingNoteQuery {
    pub fn matches(&self, record: &OutgoingNoteRecord) -> bool {
        self.contract_address.is_none_or(|c| c == record.contract_address)
            && self.storage_slot.is_none_or(|s| s == record.storage_slot)
            && self.tx_hash.is_none_or(|t| t == record.tx_hash)
            && self.ovpk.is_none_or(|k| k == record.ovpk)
    }
}

pub trait PxeDatabase: Send + Sync {
    // ---- notes ----

    /// Store notes for `scope`; each record is one atomic write
    fn add_notes(
        &self,
        incoming: &[IncomingNoteRecord],
        outgoing: &[OutgoingNoteRecord],
        scope: Address,
    ) -> Result<()>;

    /// Store a note that is already spent
    fn add_nullified_note(&self, note: &IncomingNoteRecord) -> Result<()>;

    fn get_incoming_notes(&self, query: &IncomingNoteQuery) -> Result<Vec<IncomingNoteRecord>>;

    fn get_outgoing_notes(&self, query: &OutgoingNoteQuery) -> Result<Vec<OutgoingNoteRecord>>;

    /// Move the notes of `address_point` carrying these nullifiers to the
    /// nullified set, returning the moved records
    fn remove_nullified_notes(
        &self,
        nullifiers: &[Field],
        address_point: Field,
    ) -> Result<Vec<IncomingNoteRecord>>;

    // ---- sync bookkeeping ----

    fn get_synced_block_number(&self) -> Result<Option<u64>>;

    fn set_synced_block_number(&self, block_number: u64) -> Result<()>;

    fn reset_note_sync_data(&self) -> Result<()>;

    // ---- accounts and contacts ----

    /// Returns false when the address was already stored
    fn add_complete_address(&self, address: &CompleteAddress) -> Result<bool>;

    fn get_complete_address(&self, address: Address) -> Result<Option<CompleteAddress>>;

    fn get_complete_addresses(&self) -> Result<Vec<CompleteAddress>>;

    fn add_contact(&self, address: Address) -> Result<bool>;

    fn get_contacts(&self) -> Result<Vec<Address>>;

    fn remove_contact(&self, address: Address) -> Result<bool>;

    // ---- contracts ----

    fn add_contract_artifact(&self, class_id: Field, artifact: &ContractArtifact) -> Result<()>;

    fn get_contract_artifact(&self, class_id: Field) -> Result<Option<ContractArtifact>>;

    fn add_contract_instance(&self, instance: &ContractInstance) -> Result<()>;

    fn get_contract_instance(&self, address: Address) -> Result<Option<ContractInstance>>;

    fn get_contracts_addresses(&self) -> Result<Vec<Address>>;

    // ---- witnesses and capsules ----

    fn add_auth_witness(&self, request_hash: Field, witness: &[Field]) -> Result<()>;

    fn get_auth_witness(&self, request_hash: Field) -> Result<Option<Vec<Field>>>;

    /// Push onto the capsule stack
    fn add_capsule(&self, capsule: &[Field]) -> Result<()>;

    /// Pop the most recently added capsule
    fn pop_capsule(&self) -> Result<Option<Vec<Field>>>;

    /// Approximate bytes held
    fn estimate_size(&self) -> Result<u64>;
}
