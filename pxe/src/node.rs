//! Ledger node capability
//!
//! The node is authoritative for chain data but untrusted: membership
//! claims it makes about notes are re-checked before anything is stored.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use zelana_privacy::{Address, Field};

use crate::types::{
    BlockHeader, ContractArtifact, ContractClass, ContractInstance, GasFees,
    GetUnencryptedLogsResponse, InBlock, L2Block, LogFilter, ProtocolContractAddresses,
    PublicSimulationOutput, Tx, TxEffect, TxHash, TxReceipt,
};

/// Append-only trees maintained by the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MerkleTreeId {
    NoteHashTree,
    NullifierTree,
    PublicDataTree,
}

/// Which state to query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockView {
    Latest,
    Number(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullifierMembershipWitness {
    pub index: u64,
    pub nullifier: Field,
    pub sibling_path: Vec<Field>,
}

#[async_trait]
pub trait LedgerNode: Send + Sync {
    async fn get_tx_effect(&self, tx_hash: TxHash) -> Result<Option<InBlock<TxEffect>>>;

    /// Leaf index of each value, `None` where absent
    async fn find_leaves_indexes(
        &self,
        view: BlockView,
        tree: MerkleTreeId,
        leaves: &[Field],
    ) -> Result<Vec<Option<u64>>>;

    async fn get_nullifier_membership_witness(
        &self,
        view: BlockView,
        nullifier: Field,
    ) -> Result<Option<NullifierMembershipWitness>>;

    async fn is_valid_tx(&self, tx: &Tx, is_simulation: bool) -> Result<bool>;

    async fn simulate_public_calls(&self, tx: &Tx) -> Result<PublicSimulationOutput>;

    async fn send_tx(&self, tx: &Tx) -> Result<()>;

    async fn get_block(&self, number: u64) -> Result<Option<L2Block>>;

    async fn get_blocks(&self, from: u64, limit: u64) -> Result<Vec<L2Block>>;

    async fn get_block_header(&self, view: BlockView) -> Result<Option<BlockHeader>>;

    async fn get_block_number(&self) -> Result<u64>;

    async fn get_proven_block_number(&self) -> Result<u64>;

    async fn get_tx_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt>;

    async fn get_unencrypted_logs(&self, filter: &LogFilter) -> Result<GetUnencryptedLogsResponse>;

    /// Logs emitted when contract classes are registered
    async fn get_contract_class_logs(&self, filter: &LogFilter)
    -> Result<GetUnencryptedLogsResponse>;

    async fn get_public_storage_at(
        &self,
        contract: Address,
        slot: Field,
        view: BlockView,
    ) -> Result<Field>;

    async fn get_contract_class(&self, id: Field) -> Result<Option<ContractClass>>;

    async fn get_contract(&self, address: Address) -> Result<Option<ContractInstance>>;

    async fn add_contract_artifact(&self, address: Address, artifact: &ContractArtifact)
    -> Result<()>;

    async fn get_current_base_fees(&self) -> Result<GasFees>;

    async fn get_node_version(&self) -> Result<String>;

    async fn get_chain_id(&self) -> Result<u64>;

    async fn get_version(&self) -> Result<u64>;

    async fn get_protocol_contract_addresses(&self) -> Result<ProtocolContractAddresses>;
}
