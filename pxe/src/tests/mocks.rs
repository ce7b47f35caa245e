use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tempfile::TempDir;
use zelana_config::PxeConfig;
use zelana_privacy::{Address, Field, PublicKeys};

use crate::database::RocksDbStore;
use crate::error::SimulationError;
use crate::kernel::{KernelOracle, PrivateKernelProver, TestKernelProver};
use crate::key_store::MemoryKeyStore;
use crate::node::{BlockView, LedgerNode, MerkleTreeId, NullifierMembershipWitness};
use crate::service::{PxeCapabilities, PxeService};
use crate::simulator::{NoteHashes, Simulator};
use crate::types::{
    AbiParameter, BlockHeader, ClientIvcProof, ContractArtifact, ContractClass, ContractInstance,
    ExtendedUnencryptedL2Log, FunctionArtifact, FunctionCall, FunctionDebugMetadata, FunctionType,
    GasFees, GetUnencryptedLogsResponse, InBlock, L2Block, LogFilter, Note,
    PrivateExecutionResult, ProfileOutput, ProtocolContractAddresses, ProvingOutput,
    PublicSimulationOutput, SourceCodeLocation, Tx, TxContext, TxEffect, TxExecutionRequest,
    TxHash, TxReceipt, TxStatus,
};

// ============================================================================
// Node
// ============================================================================

#[derive(Default)]
pub struct NodeState {
    pub tx_effects: HashMap<TxHash, InBlock<TxEffect>>,
    pub note_hash_tree: Vec<Field>,
    pub nullifier_tree: Vec<Field>,
    pub headers: HashMap<u64, BlockHeader>,
    pub block_number: u64,
    pub blocks: Vec<L2Block>,
    pub unencrypted_logs: Vec<ExtendedUnencryptedL2Log>,
    pub contract_class_logs: Vec<ExtendedUnencryptedL2Log>,
    pub invalid_tx: bool,
    pub public_output: Option<PublicSimulationOutput>,
    pub public_error: Option<SimulationError>,
    pub sent: Vec<Tx>,
    /// Reject every submitted tx with this message
    pub send_error: Option<String>,
    pub header_requests: Vec<BlockView>,
    pub contract_classes: HashMap<Field, ContractClass>,
    pub contracts: HashMap<Address, ContractInstance>,
    pub pushed_artifacts: Vec<Address>,
    pub public_storage: HashMap<(Address, Field), Field>,
}

#[derive(Default)]
pub struct MockNode {
    state: Mutex<NodeState>,
}

impl MockNode {
    pub fn state(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap()
    }

    pub fn set_header(&self, block_number: u64) {
        let mut state = self.state();
        state.headers.insert(
            block_number,
            BlockHeader {
                block_number,
                note_hash_tree_root: Field::from_u64(block_number * 10),
                ..Default::default()
            },
        );
        state.block_number = state.block_number.max(block_number);
    }

    pub fn add_tx_effect(&self, effect: TxEffect, block_number: u64) {
        self.state().tx_effects.insert(
            effect.tx_hash,
            InBlock {
                l2_block_number: block_number,
                l2_block_hash: Field::from_u64(block_number + 1000),
                data: effect,
            },
        );
    }
}

fn tree_index(tree: &[Field], leaf: &Field) -> Option<u64> {
    tree.iter().position(|l| l == leaf).map(|i| i as u64)
}

#[async_trait]
impl LedgerNode for MockNode {
    async fn get_tx_effect(&self, tx_hash: TxHash) -> Result<Option<InBlock<TxEffect>>> {
        Ok(self.state().tx_effects.get(&tx_hash).cloned())
    }

    async fn find_leaves_indexes(
        &self,
        _view: BlockView,
        tree: MerkleTreeId,
        leaves: &[Field],
    ) -> Result<Vec<Option<u64>>> {
        let state = self.state();
        let tree = match tree {
            MerkleTreeId::NoteHashTree => &state.note_hash_tree,
            MerkleTreeId::NullifierTree => &state.nullifier_tree,
            MerkleTreeId::PublicDataTree => return Err(anyhow!("public data tree not mocked")),
        };
        Ok(leaves.iter().map(|leaf| tree_index(tree, leaf)).collect())
    }

    async fn get_nullifier_membership_witness(
        &self,
        _view: BlockView,
        nullifier: Field,
    ) -> Result<Option<NullifierMembershipWitness>> {
        let state = self.state();
        Ok(tree_index(&state.nullifier_tree, &nullifier).map(|index| {
            NullifierMembershipWitness {
                index,
                nullifier,
                sibling_path: vec![],
            }
        }))
    }

    async fn is_valid_tx(&self, _tx: &Tx, _is_simulation: bool) -> Result<bool> {
        Ok(!self.state().invalid_tx)
    }

    async fn simulate_public_calls(&self, _tx: &Tx) -> Result<PublicSimulationOutput> {
        let state = self.state();
        if let Some(err) = &state.public_error {
            return Err(anyhow::Error::new(err.clone()));
        }
        Ok(state.public_output.clone().unwrap_or_default())
    }

    async fn send_tx(&self, tx: &Tx) -> Result<()> {
        let mut state = self.state();
        if let Some(message) = &state.send_error {
            return Err(anyhow!("{message}"));
        }
        state.sent.push(tx.clone());
        Ok(())
    }

    async fn get_block(&self, number: u64) -> Result<Option<L2Block>> {
        Ok(self
            .state()
            .blocks
            .iter()
            .find(|b| b.number == number)
            .cloned())
    }

    async fn get_blocks(&self, from: u64, limit: u64) -> Result<Vec<L2Block>> {
        Ok(self
            .state()
            .blocks
            .iter()
            .filter(|b| b.number >= from && b.number < from + limit)
            .cloned()
            .collect())
    }

    async fn get_block_header(&self, view: BlockView) -> Result<Option<BlockHeader>> {
        let mut state = self.state();
        state.header_requests.push(view);
        let number = match view {
            BlockView::Latest => state.block_number,
            BlockView::Number(n) => n,
        };
        Ok(state.headers.get(&number).cloned())
    }

    async fn get_block_number(&self) -> Result<u64> {
        Ok(self.state().block_number)
    }

    async fn get_proven_block_number(&self) -> Result<u64> {
        Ok(self.state().block_number.saturating_sub(1))
    }

    async fn get_tx_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt> {
        let state = self.state();
        Ok(match state.tx_effects.get(&tx_hash) {
            Some(effect) => TxReceipt {
                tx_hash,
                status: TxStatus::Success,
                error: None,
                block_number: Some(effect.l2_block_number),
                block_hash: Some(effect.l2_block_hash),
            },
            None => TxReceipt {
                tx_hash,
                status: TxStatus::Pending,
                error: None,
                block_number: None,
                block_hash: None,
            },
        })
    }

    async fn get_unencrypted_logs(&self, filter: &LogFilter) -> Result<GetUnencryptedLogsResponse> {
        let from = filter.from_block.unwrap_or(0);
        let to = filter.to_block.unwrap_or(u64::MAX);
        let logs = self
            .state()
            .unencrypted_logs
            .iter()
            .filter(|l| l.id.block_number >= from && l.id.block_number < to)
            .cloned()
            .collect();
        Ok(GetUnencryptedLogsResponse {
            logs,
            max_logs_hit: false,
        })
    }

    async fn get_contract_class_logs(
        &self,
        filter: &LogFilter,
    ) -> Result<GetUnencryptedLogsResponse> {
        let from = filter.from_block.unwrap_or(0);
        let to = filter.to_block.unwrap_or(u64::MAX);
        let logs = self
            .state()
            .contract_class_logs
            .iter()
            .filter(|l| l.id.block_number >= from && l.id.block_number < to)
            .cloned()
            .collect();
        Ok(GetUnencryptedLogsResponse {
            logs,
            max_logs_hit: false,
        })
    }

    async fn get_public_storage_at(
        &self,
        contract: Address,
        slot: Field,
        _view: BlockView,
    ) -> Result<Field> {
        Ok(self
            .state()
            .public_storage
            .get(&(contract, slot))
            .copied()
            .unwrap_or(Field::ZERO))
    }

    async fn get_contract_class(&self, id: Field) -> Result<Option<ContractClass>> {
        Ok(self.state().contract_classes.get(&id).cloned())
    }

    async fn get_contract(&self, address: Address) -> Result<Option<ContractInstance>> {
        Ok(self.state().contracts.get(&address).cloned())
    }

    async fn add_contract_artifact(
        &self,
        address: Address,
        _artifact: &ContractArtifact,
    ) -> Result<()> {
        self.state().pushed_artifacts.push(address);
        Ok(())
    }

    async fn get_current_base_fees(&self) -> Result<GasFees> {
        Ok(GasFees {
            fee_per_da_gas: 1,
            fee_per_l2_gas: 2,
        })
    }

    async fn get_node_version(&self) -> Result<String> {
        Ok("zelana-node-test".into())
    }

    async fn get_chain_id(&self) -> Result<u64> {
        Ok(1)
    }

    async fn get_version(&self) -> Result<u64> {
        Ok(1)
    }

    async fn get_protocol_contract_addresses(&self) -> Result<ProtocolContractAddresses> {
        Ok(ProtocolContractAddresses::default())
    }
}

// ============================================================================
// Simulator
// ============================================================================

pub const NULLIFIER_SECRET: u64 = 77;

#[derive(Default)]
pub struct SimState {
    pub execution: Option<PrivateExecutionResult>,
    pub failure: Option<SimulationError>,
    pub unconstrained_result: Vec<Field>,
    /// Return a nullifier even when none was requested
    pub always_nullify: bool,
    pub runs: usize,
    pub capsules: Vec<Vec<Field>>,
}

#[derive(Default)]
pub struct MockSimulator {
    state: Mutex<SimState>,
    pub delay: Duration,
    running: AtomicUsize,
    pub max_running: AtomicUsize,
}

impl MockSimulator {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl Simulator for MockSimulator {
    async fn run(
        &self,
        _request: &TxExecutionRequest,
        _entry_point: &FunctionArtifact,
        _contract_address: Address,
        _msg_sender: Option<Address>,
        _scopes: Option<&[Address]>,
        capsules: &[Vec<Field>],
    ) -> Result<PrivateExecutionResult> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.state();
        state.runs += 1;
        state.capsules = capsules.to_vec();
        if let Some(failure) = &state.failure {
            return Err(anyhow::Error::new(failure.clone()));
        }
        state
            .execution
            .clone()
            .ok_or_else(|| anyhow!("no execution configured"))
    }

    async fn run_unconstrained(
        &self,
        _call: &FunctionCall,
        _entry_point: &FunctionArtifact,
        _contract_address: Address,
        _scopes: Option<&[Address]>,
    ) -> Result<Vec<Field>> {
        let state = self.state();
        if let Some(failure) = &state.failure {
            return Err(anyhow::Error::new(failure.clone()));
        }
        Ok(state.unconstrained_result.clone())
    }

    async fn compute_note_hash_and_optionally_a_nullifier(
        &self,
        contract: Address,
        nonce: Field,
        storage_slot: Field,
        note_type_id: Field,
        compute_nullifier: bool,
        note: &Note,
    ) -> Result<NoteHashes> {
        let nullify = compute_nullifier || self.state().always_nullify;
        Ok(NoteHashes::derive(
            contract,
            nonce,
            storage_slot,
            note_type_id,
            note,
            nullify.then(|| Field::from_u64(NULLIFIER_SECRET)),
        ))
    }
}

// ============================================================================
// Prover
// ============================================================================

/// Test prover that records which block each call was pinned to
#[derive(Default)]
pub struct RecordingProver {
    pub calls: Mutex<Vec<(&'static str, u64)>>,
}

#[async_trait]
impl PrivateKernelProver for RecordingProver {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn prove(
        &self,
        request: &TxExecutionRequest,
        execution: &PrivateExecutionResult,
        oracle: &KernelOracle,
    ) -> Result<ProvingOutput> {
        self.calls.lock().unwrap().push(("prove", oracle.block_number()));
        let output = TestKernelProver::new()
            .prove(request, execution, oracle)
            .await?;
        Ok(ProvingOutput {
            public_inputs: output.public_inputs,
            client_ivc_proof: ClientIvcProof(vec![0xde, 0xad]),
        })
    }

    async fn profile(
        &self,
        request: &TxExecutionRequest,
        execution: &PrivateExecutionResult,
        oracle: &KernelOracle,
    ) -> Result<ProfileOutput> {
        self.calls.lock().unwrap().push(("profile", oracle.block_number()));
        TestKernelProver::new()
            .profile(request, execution, oracle)
            .await
    }

    async fn health_check(&self) -> Result<bool> {
        self.calls.lock().unwrap().push(("health_check", 0));
        Ok(true)
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub _dir: TempDir,
    pub node: Arc<MockNode>,
    pub simulator: Arc<MockSimulator>,
    pub prover: Arc<RecordingProver>,
    pub key_store: Arc<MemoryKeyStore>,
    pub db: Arc<RocksDbStore>,
    pub pxe: PxeService,
}

pub fn harness() -> Harness {
    harness_with(MockSimulator::default())
}

pub fn harness_with(simulator: MockSimulator) -> Harness {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(RocksDbStore::open(dir.path()).unwrap());
    let node = Arc::new(MockNode::default());
    let simulator = Arc::new(simulator);
    let prover = Arc::new(RecordingProver::default());
    let key_store = Arc::new(MemoryKeyStore::new());

    let pxe = PxeService::new(
        PxeCapabilities {
            node: node.clone(),
            key_store: key_store.clone(),
            simulator: simulator.clone(),
            db: db.clone(),
            proof_creator: prover.clone(),
            protocol_contracts: vec![],
        },
        PxeConfig::default(),
    );

    Harness {
        _dir: dir,
        node,
        simulator,
        prover,
        key_store,
        db,
        pxe,
    }
}

pub fn token_artifact() -> ContractArtifact {
    let debug = FunctionDebugMetadata {
        locations: BTreeMap::from([(
            "0:3".to_string(),
            SourceCodeLocation {
                file_path: "token/src/main.nr".into(),
                line: 40,
                column: 9,
                location_text: "assert(balance >= amount)".into(),
            },
        )]),
    };
    let param = |name: &str| AbiParameter {
        name: name.into(),
        type_name: "Field".into(),
    };

    ContractArtifact {
        name: "Token".into(),
        functions: vec![
            FunctionArtifact {
                name: "entrypoint".into(),
                function_type: FunctionType::Private,
                is_initializer: false,
                is_static: false,
                parameters: vec![param("to"), param("amount")],
                bytecode: vec![1],
                debug: None,
            },
            FunctionArtifact {
                name: "balance_of".into(),
                function_type: FunctionType::Unconstrained,
                is_initializer: false,
                is_static: true,
                parameters: vec![param("owner")],
                bytecode: vec![2],
                debug: None,
            },
            FunctionArtifact {
                name: "transfer_public".into(),
                function_type: FunctionType::Public,
                is_initializer: false,
                is_static: false,
                parameters: vec![param("to"), param("amount")],
                bytecode: vec![3],
                debug: Some(debug),
            },
        ],
    }
}

pub fn token_instance(artifact: &ContractArtifact) -> ContractInstance {
    ContractInstance::new(
        ContractClass::from_artifact(artifact).id,
        Field::from_u64(42),
        Address::ZERO,
        Field::ZERO,
        PublicKeys::default(),
    )
}

/// Register the token contract, returning its address
pub async fn register_token(pxe: &PxeService) -> Address {
    let artifact = token_artifact();
    let instance = token_instance(&artifact);
    let address = instance.address;
    pxe.register_contract(instance, Some(artifact)).await.unwrap();
    address
}

pub fn function_selector(name: &str) -> zelana_privacy::FunctionSelector {
    token_artifact().function_by_name(name).unwrap().selector()
}

pub fn request(origin: Address) -> TxExecutionRequest {
    TxExecutionRequest {
        origin,
        function_selector: function_selector("entrypoint"),
        args: vec![Field::from_u64(9), Field::from_u64(100)],
        tx_context: TxContext {
            chain_id: 1,
            version: 1,
        },
        auth_witnesses: vec![],
    }
}

pub fn execution(contract: Address, block_number: u64) -> PrivateExecutionResult {
    PrivateExecutionResult {
        contract_address: contract,
        function_selector: function_selector("entrypoint"),
        historical_header: BlockHeader {
            block_number,
            ..Default::default()
        },
        note_hashes: vec![Field::from_u64(501)],
        nullifiers: vec![Field::from_u64(601)],
        encrypted_logs: vec![],
        unencrypted_logs: vec![],
        enqueued_public_calls: vec![FunctionCall {
            name: "transfer_public".into(),
            to: contract,
            selector: function_selector("transfer_public"),
            args: vec![],
            is_static: false,
        }],
        return_values: vec![Field::from_u64(1)],
        nested: vec![],
    }
}
