//! Test Kernel Prover
//!
//! Computes the kernel tail's public inputs without proving anything:
//!
//! ```text
//! first_nullifier = H(FIRST_NULLIFIER, tx_request_hash)
//! nullifiers      = [first_nullifier, silo(contract, n) for each execution]
//! note_hashes[i]  = silo(contract, unique(nonce(first_nullifier, i), inner_i))
//! ```

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;
use zelana_privacy::hash::domain;
use zelana_privacy::{
    Field, compute_note_hash_nonce, compute_unique_note_hash, poseidon_hash, silo_note_hash,
    silo_nullifier,
};

use super::{KernelOracle, PrivateKernelProver};
use crate::types::{
    BlockHeader, CircuitGateCount, ClientIvcProof, KernelPublicInputs, PrivateExecutionResult,
    ProfileOutput, ProfileResult, ProvingOutput, TxExecutionRequest,
};

#[derive(Debug, Clone, Default)]
pub struct TestKernelProver;

impl TestKernelProver {
    pub fn new() -> Self {
        Self
    }
}

/// Protocol nullifier that makes every transaction hash unique
pub fn compute_first_nullifier(request: &TxExecutionRequest) -> Field {
    poseidon_hash(domain::FIRST_NULLIFIER, &[request.hash()])
}

/// Tail public inputs for an execution trace
pub fn compute_public_inputs(
    request: &TxExecutionRequest,
    execution: &PrivateExecutionResult,
    historical_header: BlockHeader,
) -> KernelPublicInputs {
    let executions = execution.executions();
    let first_nullifier = compute_first_nullifier(request);

    let mut nullifiers = vec![first_nullifier];
    nullifiers.extend(executions.iter().flat_map(|e| {
        let contract = e.contract_address.to_field();
        e.nullifiers.iter().map(move |n| silo_nullifier(contract, *n))
    }));

    let note_hashes = executions
        .iter()
        .flat_map(|e| {
            let contract = e.contract_address.to_field();
            e.note_hashes.iter().map(move |h| (contract, *h))
        })
        .enumerate()
        .map(|(i, (contract, inner))| {
            let nonce = compute_note_hash_nonce(first_nullifier, i);
            silo_note_hash(contract, compute_unique_note_hash(nonce, inner))
        })
        .collect();

    let encrypted_logs = executions
        .iter()
        .flat_map(|e| e.encrypted_logs.iter().cloned())
        .collect();

    KernelPublicInputs {
        historical_header,
        tx_context: request.tx_context,
        note_hashes,
        nullifiers,
        encrypted_logs,
    }
}

#[async_trait]
impl PrivateKernelProver for TestKernelProver {
    fn name(&self) -> &'static str {
        "test"
    }

    async fn prove(
        &self,
        request: &TxExecutionRequest,
        execution: &PrivateExecutionResult,
        oracle: &KernelOracle,
    ) -> Result<ProvingOutput> {
        let header = oracle.get_block_header().await?;
        debug!(
            block_number = oracle.block_number(),
            executions = execution.executions().len(),
            "Simulating kernel circuits"
        );
        Ok(ProvingOutput {
            public_inputs: compute_public_inputs(request, execution, header),
            client_ivc_proof: ClientIvcProof::empty(),
        })
    }

    async fn profile(
        &self,
        request: &TxExecutionRequest,
        execution: &PrivateExecutionResult,
        oracle: &KernelOracle,
    ) -> Result<ProfileOutput> {
        let output = self.prove(request, execution, oracle).await?;

        let inner_count = execution.executions().len().saturating_sub(1);
        let mut gate_counts = vec![CircuitGateCount {
            circuit_name: "private_kernel_init".into(),
            gate_count: 1,
        }];
        gate_counts.extend((0..inner_count).map(|_| CircuitGateCount {
            circuit_name: "private_kernel_inner".into(),
            gate_count: 1,
        }));
        gate_counts.push(CircuitGateCount {
            circuit_name: "private_kernel_tail".into(),
            gate_count: 1,
        });

        Ok(ProfileOutput {
            public_inputs: output.public_inputs,
            profile_result: ProfileResult { gate_counts },
        })
    }
}
