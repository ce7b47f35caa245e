//! Zelana PXE
//!
//! Client side Private eXecution Environment: holds the user's private
//! state, simulates and proves private transactions, reconciles notes
//! against an untrusted node and decodes events.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           PxeService                             │
//! │                                                                  │
//! │   simulate_tx / prove_tx / add_note ──▶ SerialQueue (one job)    │
//! │   Synchronizer (block polling) ───────▶    │                     │
//! │                                            │                     │
//! │          ┌─────────────────┬───────────────┼──────────────┐      │
//! │          ▼                 ▼               ▼              ▼      │
//! │      Simulator     PrivateKernelProver   NoteReconciler  events  │
//! └──────────┬─────────────────┬───────────────┬──────────────┬──────┘
//!            ▼                 ▼               ▼              ▼
//!       LedgerNode         KeyStore        PxeDatabase (RocksDB)
//! ```

pub mod contract_data;
pub mod database;
pub mod error;
pub mod error_enriching;
pub mod events;
pub mod kernel;
pub mod key_store;
pub mod node;
pub mod notes;
pub mod queue;
pub mod service;
pub mod simulator;
pub mod synchronizer;
pub mod types;

pub use contract_data::ContractDataOracle;
pub use database::{PxeDatabase, RocksDbStore};
pub use error::{FailingFunction, PxeError, Result, SimulationError};
pub use events::{DecodedEvent, EventMetadata, FromDecodedEvent};
pub use kernel::{
    KernelOracle, PrivateKernelProver, RemoteKernelProver, TestKernelProver, create_proof_creator,
};
pub use key_store::{KeyStore, MemoryKeyStore};
pub use node::{BlockView, LedgerNode, MerkleTreeId};
pub use notes::NoteReconciler;
pub use queue::{JobHandle, SerialQueue};
pub use service::{ProtocolContract, PxeCapabilities, PxeService, SimulateTxOptions, TxStage};
pub use simulator::{NoteHashes, Simulator};
pub use synchronizer::{SyncStatus, Synchronizer};

#[cfg(test)]
mod tests;
