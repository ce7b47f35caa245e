//! Execution, proving and simulation results

use serde::{Deserialize, Serialize};
use zelana_privacy::{Address, EncryptedEventLog, Field, FunctionSelector};

use crate::error::SimulationError;
use crate::types::tx::{BlockHeader, FunctionCall, Tx, TxContext, UnencryptedL2Log};

/// Trace of one private function execution and its nested calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateExecutionResult {
    pub contract_address: Address,
    pub function_selector: FunctionSelector,
    /// Header the execution read its tree roots from
    pub historical_header: BlockHeader,
    /// Inner note hashes, in emission order
    pub note_hashes: Vec<Field>,
    /// Inner nullifiers, in emission order
    pub nullifiers: Vec<Field>,
    pub encrypted_logs: Vec<EncryptedEventLog>,
    pub unencrypted_logs: Vec<UnencryptedL2Log>,
    pub enqueued_public_calls: Vec<FunctionCall>,
    pub return_values: Vec<Field>,
    pub nested: Vec<PrivateExecutionResult>,
}

impl PrivateExecutionResult {
    /// Block number used as the proving context
    pub fn historical_block_number(&self) -> u64 {
        self.historical_header.block_number
    }

    /// This execution and all nested ones, depth first
    pub fn executions(&self) -> Vec<&PrivateExecutionResult> {
        let mut out = vec![self];
        for nested in &self.nested {
            out.extend(nested.executions());
        }
        out
    }

    pub fn enqueued_public_calls(&self) -> Vec<FunctionCall> {
        self.executions()
            .into_iter()
            .flat_map(|e| e.enqueued_public_calls.iter().cloned())
            .collect()
    }

    pub fn unencrypted_logs(&self) -> Vec<UnencryptedL2Log> {
        self.executions()
            .into_iter()
            .flat_map(|e| e.unencrypted_logs.iter().cloned())
            .collect()
    }
}

/// Canonical public inputs of the private kernel tail
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KernelPublicInputs {
    pub historical_header: BlockHeader,
    pub tx_context: TxContext,
    /// Siloed, nonce-uniqued note hashes
    pub note_hashes: Vec<Field>,
    /// Siloed nullifiers, protocol nullifier first
    pub nullifiers: Vec<Field>,
    pub encrypted_logs: Vec<EncryptedEventLog>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientIvcProof(#[serde(with = "hex::serde")] pub Vec<u8>);

impl ClientIvcProof {
    /// Placeholder proof of simulated transactions
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvingOutput {
    pub public_inputs: KernelPublicInputs,
    pub client_ivc_proof: ClientIvcProof,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitGateCount {
    pub circuit_name: String,
    pub gate_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfileResult {
    pub gate_counts: Vec<CircuitGateCount>,
}

/// Output of a profiling dry run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileOutput {
    pub public_inputs: KernelPublicInputs,
    pub profile_result: ProfileResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxPhase {
    /// Reverts here invalidate the whole transaction
    Setup,
    AppLogic,
    Teardown,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PublicSimulationOutput {
    pub revert_reason: Option<SimulationError>,
    pub reverted_phase: Option<TxPhase>,
    pub public_return_values: Vec<Vec<Field>>,
    pub gas_used: u64,
}

impl PublicSimulationOutput {
    /// Reverts in setup, or reverts with no phase reported, are fatal
    pub fn is_fatal_revert(&self) -> bool {
        self.revert_reason.is_some()
            && matches!(self.reverted_phase, None | Some(TxPhase::Setup))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateSimulationResult {
    pub private_execution_result: PrivateExecutionResult,
    pub public_inputs: KernelPublicInputs,
}

impl PrivateSimulationResult {
    /// Transaction carrying the simulated kernel output and no proof
    pub fn to_simulated_tx(&self) -> Tx {
        Tx {
            data: self.public_inputs.clone(),
            client_ivc_proof: ClientIvcProof::empty(),
            enqueued_public_calls: self.private_execution_result.enqueued_public_calls(),
            unencrypted_logs: self.private_execution_result.unencrypted_logs(),
        }
    }
}

/// Terminal artifact of a simulate call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSimulationResult {
    pub private_execution_result: PrivateExecutionResult,
    pub public_inputs: KernelPublicInputs,
    pub public_output: Option<PublicSimulationOutput>,
    pub profile_result: Option<ProfileResult>,
}

impl TxSimulationResult {
    pub fn new(
        private: PrivateSimulationResult,
        public_output: Option<PublicSimulationOutput>,
        profile_result: Option<ProfileResult>,
    ) -> Self {
        Self {
            private_execution_result: private.private_execution_result,
            public_inputs: private.public_inputs,
            public_output,
            profile_result,
        }
    }

    pub fn tx(&self) -> Tx {
        PrivateSimulationResult {
            private_execution_result: self.private_execution_result.clone(),
            public_inputs: self.public_inputs.clone(),
        }
        .to_simulated_tx()
    }

    pub fn private_return_values(&self) -> &[Field] {
        &self.private_execution_result.return_values
    }

    pub fn public_return_values(&self) -> &[Vec<Field>] {
        self.public_output
            .as_ref()
            .map(|o| o.public_return_values.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxProvingResult {
    pub private_execution_result: PrivateExecutionResult,
    pub public_inputs: KernelPublicInputs,
    pub client_ivc_proof: ClientIvcProof,
}

impl TxProvingResult {
    pub fn to_tx(&self) -> Tx {
        Tx {
            data: self.public_inputs.clone(),
            client_ivc_proof: self.client_ivc_proof.clone(),
            enqueued_public_calls: self.private_execution_result.enqueued_public_calls(),
            unencrypted_logs: self.private_execution_result.unencrypted_logs(),
        }
    }
}
