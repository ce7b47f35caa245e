//! Kernel Proving
//!
//! Turns a private execution trace into canonical public inputs plus a
//! proof. Two interchangeable provers implement [`PrivateKernelProver`]:
//!
//! - [`TestKernelProver`]: no proof, used for simulation and estimation
//! - [`RemoteKernelProver`]: HTTP proving coordinator
//!
//! Both prove against the block the execution read from, pinned by the
//! [`KernelOracle`], never against the current head.

pub mod remote;
pub mod test_prover;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::{info, warn};
use zelana_config::{ProverConfig, ProverMode};

use crate::node::{BlockView, LedgerNode};
use crate::types::{
    BlockHeader, PrivateExecutionResult, ProfileOutput, ProvingOutput, TxExecutionRequest,
};

pub use remote::{RemoteKernelProver, RemoteProverConfig};
pub use test_prover::TestKernelProver;

#[async_trait]
pub trait PrivateKernelProver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn prove(
        &self,
        request: &TxExecutionRequest,
        execution: &PrivateExecutionResult,
        oracle: &KernelOracle,
    ) -> Result<ProvingOutput>;

    /// Dry run collecting per-circuit gate counts
    async fn profile(
        &self,
        request: &TxExecutionRequest,
        execution: &PrivateExecutionResult,
        oracle: &KernelOracle,
    ) -> Result<ProfileOutput>;

    /// Whether the prover can take jobs; local provers always can
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Chain access for the kernel, pinned to one block
#[derive(Clone)]
pub struct KernelOracle {
    node: Arc<dyn LedgerNode>,
    block_number: u64,
}

impl KernelOracle {
    pub fn new(node: Arc<dyn LedgerNode>, block_number: u64) -> Self {
        Self { node, block_number }
    }

    /// Block the proof is produced against
    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    pub async fn get_block_header(&self) -> Result<BlockHeader> {
        self.node
            .get_block_header(BlockView::Number(self.block_number))
            .await?
            .ok_or_else(|| anyhow!("node has no header for block {}", self.block_number))
    }
}

/// Pick the prover used for real proofs
///
/// Falls back to the test prover when remote proving is requested but not
/// usable.
pub fn create_proof_creator(config: &ProverConfig) -> Arc<dyn PrivateKernelProver> {
    match config.mode {
        ProverMode::Test => {
            info!("Using TestKernelProver for kernel proving");
            Arc::new(TestKernelProver::new())
        }
        ProverMode::Remote => match &config.url {
            Some(url) => {
                info!("Using remote kernel prover");
                info!("  Coordinator URL: {}", url);
                let remote_config = RemoteProverConfig {
                    coordinator_url: url.clone(),
                    proof_timeout: Duration::from_secs(config.proof_timeout_secs),
                    poll_interval: Duration::from_millis(config.poll_interval_ms),
                };
                info!(
                    "  Proof timeout:   {} seconds",
                    remote_config.proof_timeout.as_secs()
                );
                match RemoteKernelProver::new(remote_config) {
                    Ok(prover) => Arc::new(prover),
                    Err(e) => {
                        warn!(
                            "Failed to create remote kernel prover: {}. Falling back to TestKernelProver",
                            e
                        );
                        Arc::new(TestKernelProver::new())
                    }
                }
            }
            None => {
                warn!(
                    "Remote kernel prover requested but coordinator URL not configured. \
                    Set ZL_PXE_PROVER_URL environment variable. \
                    Using TestKernelProver instead."
                );
                Arc::new(TestKernelProver::new())
            }
        },
    }
}
