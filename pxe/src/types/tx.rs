//! Transactions, effects, blocks and logs

use std::fmt;

use serde::{Deserialize, Serialize};
use zelana_privacy::hash::domain;
use zelana_privacy::{
    Address, EncryptedEventLog, Field, FunctionSelector, poseidon_hash,
};

use crate::error::{PxeError, Result};
use crate::types::execution::{ClientIvcProof, KernelPublicInputs};

/// Note hash slots per transaction (unused slots hold zero)
pub const MAX_NOTE_HASHES_PER_TX: usize = 64;

/// Transaction hash (hash of the first nullifier)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TxHash(pub Field);

impl TxHash {
    pub fn from_first_nullifier(first_nullifier: Field) -> Self {
        Self(poseidon_hash(domain::TX_HASH, &[first_nullifier]))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxContext {
    pub chain_id: u64,
    pub version: u64,
}

/// Authorization witness for an action on behalf of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthWitness {
    pub request_hash: Field,
    pub witness: Vec<Field>,
}

/// Entry point call of a private transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxExecutionRequest {
    /// Contract whose function is the entry point
    pub origin: Address,
    pub function_selector: FunctionSelector,
    pub args: Vec<Field>,
    pub tx_context: TxContext,
    #[serde(default)]
    pub auth_witnesses: Vec<AuthWitness>,
}

impl TxExecutionRequest {
    pub fn args_hash(&self) -> Field {
        poseidon_hash(domain::TX_REQUEST, &self.args)
    }

    /// Commitment to the request, bound into the kernel's first nullifier
    pub fn hash(&self) -> Field {
        poseidon_hash(
            domain::TX_REQUEST,
            &[
                self.origin.to_field(),
                self.function_selector.to_field(),
                self.args_hash(),
                Field::from_u64(self.tx_context.chain_id),
                Field::from_u64(self.tx_context.version),
            ],
        )
    }
}

/// A call to a single function (public calls, unconstrained calls)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub to: Address,
    pub selector: FunctionSelector,
    pub args: Vec<Field>,
    pub is_static: bool,
}

/// Raw public log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnencryptedL2Log {
    pub contract_address: Address,
    #[serde(with = "hex::serde")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogId {
    pub block_number: u64,
    pub tx_index: u32,
    pub log_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedUnencryptedL2Log {
    pub id: LogId,
    pub log: UnencryptedL2Log,
}

/// Block range is `[from_block, to_block)`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    pub tx_hash: Option<TxHash>,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub contract_address: Option<Address>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetUnencryptedLogsResponse {
    pub logs: Vec<ExtendedUnencryptedL2Log>,
    pub max_logs_hit: bool,
}

/// A transaction ready to be sent (or simulated)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub data: KernelPublicInputs,
    pub client_ivc_proof: ClientIvcProof,
    pub enqueued_public_calls: Vec<FunctionCall>,
    pub unencrypted_logs: Vec<UnencryptedL2Log>,
}

impl Tx {
    /// Fails when the kernel output carries no nullifier
    pub fn tx_hash(&self) -> Result<TxHash> {
        let first = self
            .data
            .nullifiers
            .first()
            .filter(|n| !n.is_zero())
            .ok_or_else(|| PxeError::invalid_state("transaction has no first nullifier"))?;
        Ok(TxHash::from_first_nullifier(*first))
    }
}

/// What a settled transaction left on chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEffect {
    pub tx_hash: TxHash,
    /// Siloed, nonce-uniqued note hashes, zero padded
    pub note_hashes: Vec<Field>,
    /// Siloed nullifiers; the first one is the protocol nullifier
    pub nullifiers: Vec<Field>,
    pub encrypted_logs: Vec<EncryptedEventLog>,
    pub unencrypted_logs: Vec<UnencryptedL2Log>,
}

impl TxEffect {
    pub fn first_nullifier(&self) -> Option<Field> {
        self.nullifiers.first().copied()
    }
}

/// A value plus the block it was included in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InBlock<T> {
    pub l2_block_number: u64,
    pub l2_block_hash: Field,
    pub data: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockHeader {
    pub block_number: u64,
    pub note_hash_tree_root: Field,
    pub nullifier_tree_root: Field,
    pub public_data_tree_root: Field,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L2Block {
    pub number: u64,
    pub hash: Field,
    pub header: BlockHeader,
    pub tx_effects: Vec<TxEffect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Success,
    AppLogicReverted,
    TeardownReverted,
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub status: TxStatus,
    pub error: Option<String>,
    pub block_number: Option<u64>,
    pub block_hash: Option<Field>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GasFees {
    pub fee_per_da_gas: u64,
    pub fee_per_l2_gas: u64,
}
