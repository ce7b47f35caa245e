//! PXE Service
//!
//! Entry point for wallets. Owns the capabilities and funnels every
//! simulation, proof and note mutation through one serial job queue.
//!
//! ```text
//!   wallet ──▶ PxeService ──▶ SerialQueue ──▶ pipeline / note reconciler
//!                  │                               │
//!                  │ reads, event queries          ▼
//!                  └──────────────▶ node, key store, simulator, prover, db
//! ```

mod pipeline;
mod registry;

pub use pipeline::{SimulateTxOptions, TxStage};

use std::sync::Arc;

use tracing::{debug, info, warn};
use zelana_config::PxeConfig;
use zelana_privacy::{Address, Field, KeyPrefix, Point, compute_address_secret};

use crate::contract_data::ContractDataOracle;
use crate::database::{IncomingNoteQuery, OutgoingNoteQuery, PxeDatabase, RocksDbStore};
use crate::error::{PxeError, Result};
use crate::events::{
    DecodedEvent, DecryptionKey, EventMetadata, KeyKind, decode_encrypted_events,
    decode_unencrypted_events,
};
use crate::kernel::{PrivateKernelProver, create_proof_creator};
use crate::key_store::KeyStore;
use crate::node::LedgerNode;
use crate::notes::NoteReconciler;
use crate::queue::SerialQueue;
use crate::simulator::Simulator;
use crate::synchronizer::{SyncStatus, Synchronizer};
use crate::types::{
    ContractArtifact, ContractInstance, ExtendedNote, GasFees, GetUnencryptedLogsResponse, InBlock,
    IncomingNotesFilter, L2Block, LogFilter, NodeInfo, OutgoingNotesFilter, PxeInfo, TxEffect,
    TxHash, TxReceipt, UniqueNote,
};

/// A contract every PXE knows about from the start
#[derive(Debug, Clone)]
pub struct ProtocolContract {
    pub instance: ContractInstance,
    pub artifact: ContractArtifact,
}

/// External collaborators of the PXE
#[derive(Clone)]
pub struct PxeCapabilities {
    pub node: Arc<dyn LedgerNode>,
    pub key_store: Arc<dyn KeyStore>,
    pub simulator: Arc<dyn Simulator>,
    pub db: Arc<dyn PxeDatabase>,
    /// Prover used by `prove_tx` and profiling
    pub proof_creator: Arc<dyn PrivateKernelProver>,
    pub protocol_contracts: Vec<ProtocolContract>,
}

pub(crate) struct PxeInner {
    pub(crate) node: Arc<dyn LedgerNode>,
    pub(crate) key_store: Arc<dyn KeyStore>,
    pub(crate) simulator: Arc<dyn Simulator>,
    pub(crate) db: Arc<dyn PxeDatabase>,
    pub(crate) proof_creator: Arc<dyn PrivateKernelProver>,
    pub(crate) contract_data: ContractDataOracle,
    pub(crate) reconciler: NoteReconciler,
    protocol_contracts: Vec<ProtocolContract>,
    config: PxeConfig,
    job_queue: Arc<SerialQueue>,
    synchronizer: Synchronizer,
}

#[derive(Clone)]
pub struct PxeService {
    inner: Arc<PxeInner>,
}

impl PxeService {
    /// Build the service and start its job queue
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(capabilities: PxeCapabilities, config: PxeConfig) -> Self {
        let PxeCapabilities {
            node,
            key_store,
            simulator,
            db,
            proof_creator,
            protocol_contracts,
        } = capabilities;

        let contract_data = ContractDataOracle::new(db.clone());
        let reconciler = NoteReconciler::new(node.clone(), simulator.clone(), db.clone());
        let job_queue = Arc::new(SerialQueue::new());
        job_queue.start();
        let synchronizer =
            Synchronizer::new(node.clone(), db.clone(), job_queue.clone(), &config.sync);

        info!(prover = proof_creator.name(), "PXE service created");

        Self {
            inner: Arc::new(PxeInner {
                node,
                key_store,
                simulator,
                db,
                proof_creator,
                contract_data,
                reconciler,
                protocol_contracts,
                config,
                job_queue,
                synchronizer,
            }),
        }
    }

    /// Open the configured RocksDB database and pick the configured prover
    pub fn from_config(
        config: PxeConfig,
        node: Arc<dyn LedgerNode>,
        key_store: Arc<dyn KeyStore>,
        simulator: Arc<dyn Simulator>,
        protocol_contracts: Vec<ProtocolContract>,
    ) -> Result<Self> {
        info!("Opening PXE database at {}", config.database.path);
        let db = RocksDbStore::open(&config.database.path)?;
        let proof_creator = create_proof_creator(&config.prover);

        Ok(Self::new(
            PxeCapabilities {
                node,
                key_store,
                simulator,
                db: Arc::new(db),
                proof_creator,
                protocol_contracts,
            },
            config,
        ))
    }

    /// Register protocol contracts, seed the sync position and start the
    /// synchronizer
    pub async fn start(&self) -> Result<()> {
        let protocol_contracts = self.inner.protocol_contracts.clone();
        for contract in protocol_contracts {
            let address = contract.instance.address;
            self.register_contract(contract.instance, Some(contract.artifact))
                .await?;
            debug!(contract = %address, "Registered protocol contract");
        }

        if self.inner.db.get_synced_block_number()?.is_none() {
            let start = self.inner.config.sync.l2_starting_block.saturating_sub(1);
            self.inner.db.set_synced_block_number(start)?;
        }
        self.inner.synchronizer.start().await;

        let prover = self.inner.proof_creator.name();
        match self.inner.proof_creator.health_check().await {
            Ok(true) => debug!(prover, "Kernel prover is reachable"),
            Ok(false) => warn!(prover, "Kernel prover is not reachable, proving will fail"),
            Err(e) => warn!(prover, error = %e, "Kernel prover health check failed"),
        }

        let info = self.get_node_info().await?;
        info!(
            chain_id = info.chain_id,
            protocol_version = info.protocol_version,
            node_version = %info.node_version,
            "Started PXE connected to chain"
        );
        Ok(())
    }

    /// Reject queued jobs, wait for the running one, then stop syncing
    pub async fn stop(&self) {
        self.inner.job_queue.cancel().await;
        info!("Cancelled job queue");
        self.inner.synchronizer.stop().await;
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.inner.synchronizer
    }

    pub fn get_sync_status(&self) -> Result<SyncStatus> {
        self.inner.synchronizer.get_sync_status()
    }

    pub async fn is_global_state_synchronized(&self) -> Result<bool> {
        self.inner.synchronizer.is_global_state_synchronized().await
    }

    /// Queue shared with the synchronizer
    pub fn job_queue(&self) -> &SerialQueue {
        &self.inner.job_queue
    }

    pub fn config(&self) -> &PxeConfig {
        &self.inner.config
    }

    // =========================================================================
    // Notes
    // =========================================================================

    pub async fn add_note(&self, note: ExtendedNote, scope: Option<Address>) -> Result<()> {
        let reconciler = self.inner.reconciler.clone();
        self.inner
            .job_queue
            .put(async move { reconciler.add_note(&note, scope).await })
            .await
    }

    pub async fn add_nullified_note(&self, note: ExtendedNote) -> Result<()> {
        let reconciler = self.inner.reconciler.clone();
        self.inner
            .job_queue
            .put(async move { reconciler.add_nullified_note(&note).await })
            .await
    }

    pub async fn get_incoming_notes(&self, filter: IncomingNotesFilter) -> Result<Vec<UniqueNote>> {
        let query = IncomingNoteQuery {
            contract_address: filter.contract_address,
            storage_slot: filter.storage_slot,
            tx_hash: filter.tx_hash,
            address_point: filter.owner.map(|owner| owner.to_address_point()),
            status: filter.status,
            scopes: filter.scopes,
        };
        let records = self.inner.db.get_incoming_notes(&query)?;
        let accounts = self.inner.db.get_complete_addresses()?;

        records
            .into_iter()
            .map(|record| {
                let owner = match filter.owner {
                    Some(owner) => owner,
                    None => accounts
                        .iter()
                        .find(|c| c.address.to_address_point() == record.address_point)
                        .map(|c| c.address)
                        .ok_or_else(|| {
                            PxeError::not_found(format!(
                                "cannot find complete address for address point {}",
                                record.address_point
                            ))
                        })?,
                };
                Ok(UniqueNote {
                    note: record.note,
                    owner,
                    contract_address: record.contract_address,
                    storage_slot: record.storage_slot,
                    note_type_id: record.note_type_id,
                    tx_hash: record.tx_hash,
                    nonce: record.nonce,
                })
            })
            .collect()
    }

    pub async fn get_outgoing_notes(&self, filter: OutgoingNotesFilter) -> Result<Vec<UniqueNote>> {
        let accounts = self.inner.db.get_complete_addresses()?;
        let ovpk = match filter.owner {
            Some(owner) => Some(
                accounts
                    .iter()
                    .find(|c| c.address == owner)
                    .map(|c| c.public_keys.ovpk_m)
                    .ok_or_else(|| PxeError::not_found(format!("unknown account: {}", owner)))?,
            ),
            None => None,
        };

        let query = OutgoingNoteQuery {
            contract_address: filter.contract_address,
            storage_slot: filter.storage_slot,
            tx_hash: filter.tx_hash,
            ovpk,
        };
        let records = self.inner.db.get_outgoing_notes(&query)?;

        records
            .into_iter()
            .map(|record| {
                let owner = accounts
                    .iter()
                    .find(|c| c.public_keys.ovpk_m == record.ovpk)
                    .map(|c| c.address)
                    .ok_or_else(|| {
                        PxeError::not_found(format!(
                            "cannot find complete address for ovpk {}",
                            record.ovpk
                        ))
                    })?;
                Ok(UniqueNote {
                    note: record.note,
                    owner,
                    contract_address: record.contract_address,
                    storage_slot: record.storage_slot,
                    note_type_id: record.note_type_id,
                    tx_hash: record.tx_hash,
                    nonce: record.nonce,
                })
            })
            .collect()
    }

    pub async fn reset_note_sync_data(&self) -> Result<()> {
        self.inner.db.reset_note_sync_data()?;
        info!("Reset note sync data");
        Ok(())
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Decrypt and decode events in blocks `[from, from + limit)`
    pub async fn get_encrypted_events(
        &self,
        from: u64,
        limit: u64,
        event: &EventMetadata,
        vpks: &[Point],
    ) -> Result<Vec<DecodedEvent>> {
        if vpks.is_empty() {
            return Err(PxeError::InvalidRequest(
                "tried to get encrypted events without supplying any viewing public keys".into(),
            ));
        }

        let blocks = self.inner.node.get_blocks(from, limit).await?;

        let mut keys = Vec::with_capacity(vpks.len());
        for vpk in vpks {
            keys.push(self.decryption_key(vpk).await?);
        }

        decode_encrypted_events(
            blocks.iter().flat_map(|b| b.tx_effects.iter()),
            &keys,
            event,
        )
    }

    /// Decode public events in blocks `[from, from + limit)`
    pub async fn get_unencrypted_events(
        &self,
        from: u64,
        limit: u64,
        event: &EventMetadata,
    ) -> Result<Vec<DecodedEvent>> {
        let filter = LogFilter {
            from_block: Some(from),
            to_block: Some(from.saturating_add(limit)),
            ..Default::default()
        };
        let response = self.inner.node.get_unencrypted_logs(&filter).await?;
        decode_unencrypted_events(&response.logs, event)
    }

    async fn decryption_key(&self, vpk: &Point) -> Result<DecryptionKey> {
        let key_store = &self.inner.key_store;
        let (prefix, account) = key_store.get_key_prefix_and_account(vpk).await?;
        let secret = key_store.get_master_secret_key(vpk).await?;

        if prefix != KeyPrefix::IncomingViewing {
            return Ok(DecryptionKey {
                secret,
                kind: KeyKind::Master,
            });
        }

        let complete = self.inner.db.get_complete_address(account)?.ok_or_else(|| {
            PxeError::not_found(format!("no registered account for {}", account))
        })?;
        Ok(DecryptionKey {
            secret: compute_address_secret(complete.preaddress(), secret),
            kind: KeyKind::AddressDerived,
        })
    }

    // =========================================================================
    // Witnesses and capsules
    // =========================================================================

    pub async fn add_auth_witness(&self, request_hash: Field, witness: Vec<Field>) -> Result<()> {
        self.inner.db.add_auth_witness(request_hash, &witness)?;
        Ok(())
    }

    pub async fn get_auth_witness(&self, request_hash: Field) -> Result<Option<Vec<Field>>> {
        Ok(self.inner.db.get_auth_witness(request_hash)?)
    }

    pub async fn add_capsule(&self, capsule: Vec<Field>) -> Result<()> {
        self.inner.db.add_capsule(&capsule)?;
        Ok(())
    }

    pub async fn estimate_db_size(&self) -> Result<u64> {
        Ok(self.inner.db.estimate_size()?)
    }

    // =========================================================================
    // Chain queries
    // =========================================================================

    /// Negative numbers mean the current head
    pub async fn get_block(&self, number: i64) -> Result<Option<L2Block>> {
        let number = match u64::try_from(number) {
            Ok(number) => number,
            Err(_) => self.inner.node.get_block_number().await?,
        };
        Ok(self.inner.node.get_block(number).await?)
    }

    pub async fn get_block_number(&self) -> Result<u64> {
        Ok(self.inner.node.get_block_number().await?)
    }

    pub async fn get_proven_block_number(&self) -> Result<u64> {
        Ok(self.inner.node.get_proven_block_number().await?)
    }

    pub async fn get_tx_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt> {
        Ok(self.inner.node.get_tx_receipt(tx_hash).await?)
    }

    pub async fn get_tx_effect(&self, tx_hash: TxHash) -> Result<Option<InBlock<TxEffect>>> {
        Ok(self.inner.node.get_tx_effect(tx_hash).await?)
    }

    pub async fn get_unencrypted_logs(
        &self,
        filter: LogFilter,
    ) -> Result<GetUnencryptedLogsResponse> {
        Ok(self.inner.node.get_unencrypted_logs(&filter).await?)
    }

    pub async fn get_contract_class_logs(
        &self,
        filter: LogFilter,
    ) -> Result<GetUnencryptedLogsResponse> {
        Ok(self.inner.node.get_contract_class_logs(&filter).await?)
    }

    pub async fn get_current_base_fees(&self) -> Result<GasFees> {
        Ok(self.inner.node.get_current_base_fees().await?)
    }

    pub async fn get_node_info(&self) -> Result<NodeInfo> {
        let node = &self.inner.node;
        let (node_version, chain_id, protocol_version, protocol_contract_addresses) =
            tokio::try_join!(
                node.get_node_version(),
                node.get_chain_id(),
                node.get_version(),
                node.get_protocol_contract_addresses(),
            )?;

        Ok(NodeInfo {
            node_version,
            chain_id,
            protocol_version,
            protocol_contract_addresses,
        })
    }

    pub async fn get_pxe_info(&self) -> Result<PxeInfo> {
        Ok(PxeInfo {
            pxe_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_contract_addresses: self.inner.node.get_protocol_contract_addresses().await?,
        })
    }
}
