//! Remote Kernel Prover
//!
//! HTTP client for a kernel proving coordinator.
//!
//! ```text
//!   PXE ── POST /v1/kernel/prove ──────────▶ coordinator → job_id
//!       ── GET  /v1/kernel/{job_id}/proof ─▶ NOT_READY | PROOF_FAILED | result
//! ```
//!
//! Profiling uses the same job flow with `profile: true`.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{KernelOracle, PrivateKernelProver};
use crate::types::{
    BlockHeader, ClientIvcProof, KernelPublicInputs, PrivateExecutionResult, ProfileOutput,
    ProfileResult, ProvingOutput, TxExecutionRequest,
};

#[derive(Debug, Clone)]
pub struct RemoteProverConfig {
    /// Base URL of the coordinator (e.g., "http://localhost:8090")
    pub coordinator_url: String,
    /// Upper bound for one proving job
    pub proof_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for RemoteProverConfig {
    fn default() -> Self {
        Self {
            coordinator_url: "http://localhost:8090".to_string(),
            proof_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
        }
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelProveRequest {
    pub tx_request: TxExecutionRequest,
    pub execution: PrivateExecutionResult,
    pub block_number: u64,
    pub historical_header: BlockHeader,
    #[serde(default)]
    pub profile: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelProveResponse {
    pub job_id: String,
    pub estimated_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelProofResult {
    pub job_id: String,
    pub public_inputs: KernelPublicInputs,
    /// Hex-encoded ClientIVC proof, empty for profiling jobs
    #[serde(default)]
    pub proof_bytes: String,
    #[serde(default)]
    pub profile: Option<ProfileResult>,
    pub proving_time_ms: u64,
}

/// API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ApiResponse<T> {
    Success {
        data: T,
    },
    Error {
        message: String,
        code: Option<String>,
    },
}

#[derive(Debug)]
enum JobPoll {
    Ready(KernelProofResult),
    Pending,
    Failed(String),
}

// ============================================================================
// Remote Kernel Prover
// ============================================================================

pub struct RemoteKernelProver {
    config: RemoteProverConfig,
    client: reqwest::Client,
}

impl RemoteKernelProver {
    pub fn new(config: RemoteProverConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.proof_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    async fn run_job(
        &self,
        request: &TxExecutionRequest,
        execution: &PrivateExecutionResult,
        oracle: &KernelOracle,
        profile: bool,
    ) -> Result<KernelProofResult> {
        let start = Instant::now();
        let historical_header = oracle.get_block_header().await?;

        let body = KernelProveRequest {
            tx_request: request.clone(),
            execution: execution.clone(),
            block_number: oracle.block_number(),
            historical_header,
            profile,
        };

        info!(
            "Submitting kernel job (block={}, executions={}, profile={})",
            body.block_number,
            execution.executions().len(),
            profile
        );

        let job = self.submit(&body).await?;
        info!(
            "Kernel job created: {} (estimated {}ms)",
            job.job_id, job.estimated_time_ms
        );

        let result = self.poll_for_completion(&job.job_id).await?;
        info!(
            "Kernel job {} completed in {:?} (proving time: {}ms)",
            job.job_id,
            start.elapsed(),
            result.proving_time_ms
        );
        Ok(result)
    }

    async fn submit(&self, request: &KernelProveRequest) -> Result<KernelProveResponse> {
        let path = if request.profile { "profile" } else { "prove" };
        let url = format!("{}/v1/kernel/{}", self.config.coordinator_url, path);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .context("Failed to connect to kernel prover")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Kernel prover returned {}: {}", status, body));
        }

        let api_response: ApiResponse<KernelProveResponse> = response
            .json()
            .await
            .context("Failed to parse kernel prover response")?;

        match api_response {
            ApiResponse::Success { data } => Ok(data),
            ApiResponse::Error { message, code } => Err(anyhow!(
                "Kernel prover error ({}): {}",
                code.unwrap_or_else(|| "unknown".to_string()),
                message
            )),
        }
    }

    async fn poll_for_completion(&self, job_id: &str) -> Result<KernelProofResult> {
        let poll_timeout = self.config.proof_timeout;
        let poll_interval = self.config.poll_interval;

        timeout(poll_timeout, async {
            loop {
                match self.poll_job(job_id).await {
                    Ok(JobPoll::Ready(result)) => return Ok(result),
                    Ok(JobPoll::Failed(reason)) => {
                        return Err(anyhow!("Kernel proof failed: {}", reason));
                    }
                    Ok(JobPoll::Pending) => debug!("Kernel job {} still proving", job_id),
                    Err(e) => warn!("Failed to poll kernel job {}: {}", job_id, e),
                }

                tokio::time::sleep(poll_interval).await;
            }
        })
        .await
        .map_err(|_| anyhow!("Kernel proof timed out after {:?}", poll_timeout))?
    }

    async fn poll_job(&self, job_id: &str) -> Result<JobPoll> {
        let url = format!("{}/v1/kernel/{}/proof", self.config.coordinator_url, job_id);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Ok(JobPoll::Pending);
        }

        let api_response: ApiResponse<KernelProofResult> = response.json().await?;
        Ok(classify(api_response))
    }
}

fn classify(response: ApiResponse<KernelProofResult>) -> JobPoll {
    match response {
        ApiResponse::Success { data } => JobPoll::Ready(data),
        ApiResponse::Error { message, code } => match code.as_deref() {
            Some("PROOF_FAILED") => JobPoll::Failed(message),
            _ => JobPoll::Pending,
        },
    }
}

#[async_trait]
impl PrivateKernelProver for RemoteKernelProver {
    fn name(&self) -> &'static str {
        "remote"
    }

    /// Check if the coordinator is reachable
    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/v1/health", self.config.coordinator_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                warn!("Kernel prover health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn prove(
        &self,
        request: &TxExecutionRequest,
        execution: &PrivateExecutionResult,
        oracle: &KernelOracle,
    ) -> Result<ProvingOutput> {
        let result = self.run_job(request, execution, oracle, false).await?;
        let proof = hex::decode(&result.proof_bytes).context("Invalid proof hex")?;
        if proof.is_empty() {
            return Err(anyhow!("Kernel prover returned an empty proof"));
        }

        Ok(ProvingOutput {
            public_inputs: result.public_inputs,
            client_ivc_proof: ClientIvcProof(proof),
        })
    }

    async fn profile(
        &self,
        request: &TxExecutionRequest,
        execution: &PrivateExecutionResult,
        oracle: &KernelOracle,
    ) -> Result<ProfileOutput> {
        let result = self.run_job(request, execution, oracle, true).await?;
        let profile_result = result
            .profile
            .ok_or_else(|| anyhow!("Kernel prover returned no profile"))?;

        Ok(ProfileOutput {
            public_inputs: result.public_inputs,
            profile_result,
        })
    }
}
