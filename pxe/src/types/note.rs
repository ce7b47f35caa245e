//! Notes as seen by callers

use serde::{Deserialize, Serialize};
use zelana_privacy::{Address, Field};

use crate::types::tx::TxHash;

/// Note content, as emitted by the contract
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Note {
    pub items: Vec<Field>,
}

impl Note {
    pub fn new(items: Vec<Field>) -> Self {
        Self { items }
    }
}

/// A note plus where it lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedNote {
    pub note: Note,
    pub owner: Address,
    pub contract_address: Address,
    pub storage_slot: Field,
    pub note_type_id: Field,
    pub tx_hash: TxHash,
}

/// An extended note disambiguated by its nonce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueNote {
    pub note: Note,
    pub owner: Address,
    pub contract_address: Address,
    pub storage_slot: Field,
    pub note_type_id: Field,
    pub tx_hash: TxHash,
    pub nonce: Field,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    #[default]
    Active,
    ActiveOrNullified,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingNotesFilter {
    pub tx_hash: Option<TxHash>,
    pub contract_address: Option<Address>,
    pub storage_slot: Option<Field>,
    pub owner: Option<Address>,
    pub status: NoteStatus,
    /// Accounts whose notes are visible; empty means all
    pub scopes: Vec<Address>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingNotesFilter {
    pub tx_hash: Option<TxHash>,
    pub contract_address: Option<Address>,
    pub storage_slot: Option<Field>,
    pub owner: Option<Address>,
}
