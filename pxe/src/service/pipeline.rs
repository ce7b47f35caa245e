//! Execution & Proving Pipeline
//!
//! ```text
//!  Requested ─▶ PrivateExecuted ─▶ KernelProven ─▶ [PublicSimulated] ─▶ Validated ─▶ Done
//!      │               │                 │                 │                 │
//!      └───────────────┴─────────────────┴─────────────────┴─────────────────┴──▶ Failed
//! ```
//!
//! Simulation and proving each run as one job on the serial queue. Kernel
//! proving always uses the block the private execution read from.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use zelana_privacy::{Address, Field};

use super::{PxeInner, PxeService};
use crate::error::{PxeError, Result, SimulationError};
use crate::error_enriching::{enrich_public_simulation_error, surface_execution_error};
use crate::kernel::{KernelOracle, PrivateKernelProver, TestKernelProver};
use crate::types::{
    FunctionCall, PrivateExecutionResult, PrivateSimulationResult, PublicSimulationOutput, Tx,
    TxExecutionRequest, TxHash, TxProvingResult, TxSimulationResult,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulateTxOptions {
    /// Also run enqueued public calls on the node
    pub simulate_public: bool,
    pub msg_sender: Option<Address>,
    pub skip_tx_validation: bool,
    /// Collect gate counts with the real prover
    pub profile: bool,
    /// Accounts whose notes the execution may read
    pub scopes: Option<Vec<Address>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStage {
    Requested,
    PrivateExecuted,
    KernelProven,
    PublicSimulated,
    Validated,
    Done,
    Failed,
}

impl fmt::Display for TxStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxStage::Requested => "requested",
            TxStage::PrivateExecuted => "private_executed",
            TxStage::KernelProven => "kernel_proven",
            TxStage::PublicSimulated => "public_simulated",
            TxStage::Validated => "validated",
            TxStage::Done => "done",
            TxStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Stage of one request, logged on every transition
struct StageTracker {
    request_hash: Field,
    stage: TxStage,
}

impl StageTracker {
    fn new(request: &TxExecutionRequest) -> Self {
        let tracker = Self {
            request_hash: request.hash(),
            stage: TxStage::Requested,
        };
        debug!(request = %tracker.request_hash, stage = %tracker.stage, "Tx stage");
        tracker
    }

    fn advance(&mut self, next: TxStage) {
        debug!(request = %self.request_hash, from = %self.stage, to = %next, "Tx stage");
        self.stage = next;
    }

    fn fail(&mut self, err: &PxeError) {
        error!(request = %self.request_hash, stage = %self.stage, error = %err, "Tx failed");
        self.stage = TxStage::Failed;
    }
}

impl PxeService {
    /// Simulate a transaction end to end without producing a real proof
    pub async fn simulate_tx(
        &self,
        request: TxExecutionRequest,
        options: SimulateTxOptions,
    ) -> Result<TxSimulationResult> {
        let inner = self.inner.clone();
        self.inner
            .job_queue
            .put(async move { inner.simulate_tx_job(request, options).await })
            .await
            .inspect_err(|e| error!(error = %e, "Error simulating tx"))
    }

    /// Prove a previously executed request with the configured prover
    pub async fn prove_tx(
        &self,
        request: TxExecutionRequest,
        execution: PrivateExecutionResult,
    ) -> Result<TxProvingResult> {
        let inner = self.inner.clone();
        self.inner
            .job_queue
            .put(async move { inner.prove_tx_job(request, execution).await })
            .await
            .inspect_err(|e| error!(error = %e, "Error proving tx"))
    }

    /// Forward a transaction unless an identical one already settled
    pub async fn send_tx(&self, tx: &Tx) -> Result<TxHash> {
        let tx_hash = tx.tx_hash()?;
        if self.inner.node.get_tx_effect(tx_hash).await?.is_some() {
            return Err(PxeError::AlreadySettled(tx_hash));
        }

        info!(tx_hash = %tx_hash, "Sending transaction");
        self.inner
            .node
            .send_tx(tx)
            .await
            .inspect_err(|e| error!(tx_hash = %tx_hash, error = %e, "Error sending tx"))?;
        info!(tx_hash = %tx_hash, "Sent transaction");
        Ok(tx_hash)
    }

    /// Run an unconstrained (view) function by name
    pub async fn simulate_unconstrained(
        &self,
        function_name: &str,
        args: Vec<Field>,
        to: Address,
        scopes: Option<Vec<Address>>,
    ) -> Result<Vec<Field>> {
        let inner = self.inner.clone();
        let function_name = function_name.to_string();
        self.inner
            .job_queue
            .put(async move {
                inner
                    .simulate_unconstrained_job(&function_name, args, to, scopes)
                    .await
            })
            .await
    }
}

impl PxeInner {
    async fn simulate_tx_job(
        self: Arc<Self>,
        request: TxExecutionRequest,
        options: SimulateTxOptions,
    ) -> Result<TxSimulationResult> {
        let mut tracker = StageTracker::new(&request);
        let result = self.run_simulation(&request, &options, &mut tracker).await;
        match &result {
            Ok(_) => tracker.advance(TxStage::Done),
            Err(e) => tracker.fail(e),
        }
        result
    }

    async fn run_simulation(
        &self,
        request: &TxExecutionRequest,
        options: &SimulateTxOptions,
        tracker: &mut StageTracker,
    ) -> Result<TxSimulationResult> {
        let execution = self
            .execute_private(request, options.msg_sender, options.scopes.as_deref())
            .await?;
        tracker.advance(TxStage::PrivateExecuted);

        let oracle = KernelOracle::new(self.node.clone(), execution.historical_block_number());
        let (public_inputs, profile_result) = if options.profile {
            let output = self
                .proof_creator
                .profile(request, &execution, &oracle)
                .await?;
            (output.public_inputs, Some(output.profile_result))
        } else {
            let output = TestKernelProver::new()
                .prove(request, &execution, &oracle)
                .await?;
            (output.public_inputs, None)
        };
        tracker.advance(TxStage::KernelProven);

        let private = PrivateSimulationResult {
            private_execution_result: execution,
            public_inputs,
        };
        let tx = private.to_simulated_tx();

        let public_output = if options.simulate_public {
            let output = self.simulate_public_calls(&tx).await?;
            tracker.advance(TxStage::PublicSimulated);
            Some(output)
        } else {
            None
        };

        if !options.skip_tx_validation {
            if !self.node.is_valid_tx(&tx, true).await? {
                return Err(PxeError::invalid_state(
                    "the simulated transaction is unable to be added to state and is invalid",
                ));
            }
            tracker.advance(TxStage::Validated);
        }

        if options.msg_sender.is_none() {
            let tx_hash = tx.tx_hash()?;
            info!(tx_hash = %tx_hash, "Simulated tx");
        }

        Ok(TxSimulationResult::new(private, public_output, profile_result))
    }

    async fn prove_tx_job(
        self: Arc<Self>,
        request: TxExecutionRequest,
        execution: PrivateExecutionResult,
    ) -> Result<TxProvingResult> {
        let oracle = KernelOracle::new(self.node.clone(), execution.historical_block_number());
        info!(
            prover = self.proof_creator.name(),
            block_number = oracle.block_number(),
            "Proving tx"
        );
        let output = self.proof_creator.prove(&request, &execution, &oracle).await?;

        Ok(TxProvingResult {
            private_execution_result: execution,
            public_inputs: output.public_inputs,
            client_ivc_proof: output.client_ivc_proof,
        })
    }

    async fn simulate_unconstrained_job(
        self: Arc<Self>,
        function_name: &str,
        args: Vec<Field>,
        to: Address,
        scopes: Option<Vec<Address>>,
    ) -> Result<Vec<Field>> {
        let function = self
            .contract_data
            .get_function_artifact_by_name(to, function_name)?;
        if args.len() != function.parameters.len() {
            return Err(PxeError::InvalidRequest(format!(
                "{} expects {} arguments, got {}",
                function_name,
                function.parameters.len(),
                args.len()
            )));
        }

        let call = FunctionCall {
            name: function.name.clone(),
            to,
            selector: function.selector(),
            args,
            is_static: true,
        };
        debug!(contract = %to, function = function_name, "Executing unconstrained simulator");

        self.simulator
            .run_unconstrained(&call, &function, to, scopes.as_deref())
            .await
            .map_err(|e| surface_execution_error(e, &self.contract_data))
    }

    async fn execute_private(
        &self,
        request: &TxExecutionRequest,
        msg_sender: Option<Address>,
        scopes: Option<&[Address]>,
    ) -> Result<PrivateExecutionResult> {
        let entry_point = self
            .contract_data
            .get_function_artifact(request.origin, request.function_selector)?;
        debug!(
            contract = %request.origin,
            function = %entry_point.name,
            "Executing private simulator"
        );

        // capsules are one-shot inputs to the next private execution
        let mut capsules = Vec::new();
        while let Some(capsule) = self.db.pop_capsule()? {
            capsules.push(capsule);
        }

        self.simulator
            .run(
                request,
                &entry_point,
                request.origin,
                msg_sender,
                scopes,
                &capsules,
            )
            .await
            .map_err(|e| surface_execution_error(e, &self.contract_data))
    }

    async fn simulate_public_calls(&self, tx: &Tx) -> Result<PublicSimulationOutput> {
        let mut output = match self.node.simulate_public_calls(tx).await {
            Ok(output) => output,
            Err(e) => {
                return Err(match e.downcast::<SimulationError>() {
                    Ok(failure) => self.public_failure(failure),
                    Err(other) => PxeError::Upstream(other),
                });
            }
        };

        if output.is_fatal_revert() {
            if let Some(reason) = output.revert_reason.take() {
                return Err(self.public_failure(reason));
            }
        }

        if let Some(reason) = output.revert_reason.as_mut() {
            if let Err(e) = enrich_public_simulation_error(reason, &self.contract_data) {
                debug!(error = %e, "Failed to enrich public revert");
            }
        }
        Ok(output)
    }

    fn public_failure(&self, mut failure: SimulationError) -> PxeError {
        if let Err(e) = enrich_public_simulation_error(&mut failure, &self.contract_data) {
            error!(error = %e, "Failed to enrich public simulation error");
        }
        PxeError::Simulation(failure)
    }
}
