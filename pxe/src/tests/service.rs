use std::sync::atomic::Ordering;
use std::time::Duration;

use zelana_privacy::{Address, Field, PublicKeys, silo_nullifier};

use super::mocks::*;
use crate::database::PxeDatabase;
use crate::error::{FailingFunction, PxeError, SimulationError};
use crate::node::BlockView;
use crate::service::{ProtocolContract, PxeCapabilities, PxeService, SimulateTxOptions};
use crate::types::{
    ContractClass, ContractInstance, L2Block, PublicSimulationOutput, TxEffect, TxPhase,
};

/// Helpers

/// Token registered, execution reads block 5 while the head is at 9
async fn ready() -> (Harness, Address) {
    let h = harness();
    let token = register_token(&h.pxe).await;
    h.node.set_header(5);
    h.node.set_header(9);
    h.simulator.state().execution = Some(execution(token, 5));
    (h, token)
}

fn public_revert(token: Address, phase: Option<TxPhase>) -> PublicSimulationOutput {
    let reason = SimulationError::new(
        "attempt to subtract with underflow",
        FailingFunction::new(token, function_selector("transfer_public")),
    )
    .with_opcode_locations(vec!["0:3".into()]);
    PublicSimulationOutput {
        revert_reason: Some(reason),
        reverted_phase: phase,
        ..Default::default()
    }
}

// ============================================================================
// Simulation
// ============================================================================

#[tokio::test]
async fn simulate_tx_uses_execution_block() {
    let (h, token) = ready().await;

    let result = h
        .pxe
        .simulate_tx(request(token), SimulateTxOptions::default())
        .await
        .unwrap();

    assert_eq!(result.public_inputs.historical_header.block_number, 5);
    // protocol nullifier plus the one emitted by the execution
    assert_eq!(result.public_inputs.nullifiers.len(), 2);
    assert_eq!(result.public_inputs.note_hashes.len(), 1);
    assert_eq!(result.private_return_values(), &[Field::from_u64(1)]);
    assert!(result.profile_result.is_none());
    assert!(result.public_output.is_none());

    let requests = h.node.state().header_requests.clone();
    assert!(requests.contains(&BlockView::Number(5)));
    assert!(!requests.contains(&BlockView::Latest));
    assert!(h.prover.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn simulate_tx_rejects_invalid_tx() {
    let (h, token) = ready().await;
    h.node.state().invalid_tx = true;

    let err = h
        .pxe
        .simulate_tx(request(token), SimulateTxOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PxeError::InvalidState(_)));

    let skipped = SimulateTxOptions {
        skip_tx_validation: true,
        ..Default::default()
    };
    assert!(h.pxe.simulate_tx(request(token), skipped).await.is_ok());
}

#[tokio::test]
async fn simulate_tx_profiles_with_proof_creator() {
    let (h, token) = ready().await;

    let options = SimulateTxOptions {
        profile: true,
        ..Default::default()
    };
    let result = h.pxe.simulate_tx(request(token), options).await.unwrap();

    let profile = result.profile_result.unwrap();
    let names: Vec<&str> = profile
        .gate_counts
        .iter()
        .map(|g| g.circuit_name.as_str())
        .collect();
    assert_eq!(names, vec!["private_kernel_init", "private_kernel_tail"]);
    assert_eq!(*h.prover.calls.lock().unwrap(), vec![("profile", 5)]);
}

#[tokio::test]
async fn private_failure_is_enriched() {
    let (h, token) = ready().await;
    h.simulator.state().failure = Some(SimulationError::new(
        "assertion failed",
        FailingFunction::new(token, function_selector("entrypoint")),
    ));

    let err = h
        .pxe
        .simulate_tx(request(token), SimulateTxOptions::default())
        .await
        .unwrap_err();

    let PxeError::Simulation(failure) = err else {
        panic!("expected simulation error");
    };
    let frame = failure.original_failing_function().unwrap();
    assert_eq!(frame.contract_name.as_deref(), Some("Token"));
    assert_eq!(frame.function_name.as_deref(), Some("entrypoint"));
    assert!(failure.to_string().contains("at Token.entrypoint"));
}

#[tokio::test]
async fn setup_revert_fails_simulation() {
    let (h, token) = ready().await;
    h.node.state().public_output = Some(public_revert(token, Some(TxPhase::Setup)));

    let options = SimulateTxOptions {
        simulate_public: true,
        ..Default::default()
    };
    let err = h.pxe.simulate_tx(request(token), options).await.unwrap_err();

    let PxeError::Simulation(failure) = err else {
        panic!("expected simulation error");
    };
    assert_eq!(
        failure.failing_functions[0].function_name.as_deref(),
        Some("transfer_public")
    );
    assert_eq!(failure.source_locations.len(), 1);
    assert_eq!(failure.source_locations[0].line, 40);
}

#[tokio::test]
async fn app_logic_revert_is_reported_in_output() {
    let (h, token) = ready().await;
    h.node.state().public_output = Some(public_revert(token, Some(TxPhase::AppLogic)));

    let options = SimulateTxOptions {
        simulate_public: true,
        ..Default::default()
    };
    let result = h.pxe.simulate_tx(request(token), options).await.unwrap();

    let output = result.public_output.unwrap();
    let reason = output.revert_reason.unwrap();
    assert_eq!(
        reason.failing_functions[0].contract_name.as_deref(),
        Some("Token")
    );
    assert_eq!(output.reverted_phase, Some(TxPhase::AppLogic));
}

#[tokio::test]
async fn node_public_failure_is_enriched() {
    let (h, token) = ready().await;
    let failure = public_revert(token, None).revert_reason.unwrap();
    h.node.state().public_error = Some(failure);

    let options = SimulateTxOptions {
        simulate_public: true,
        ..Default::default()
    };
    let err = h.pxe.simulate_tx(request(token), options).await.unwrap_err();

    let PxeError::Simulation(failure) = err else {
        panic!("expected simulation error");
    };
    assert_eq!(
        failure.failing_functions[0].function_name.as_deref(),
        Some("transfer_public")
    );
}

#[tokio::test]
async fn unknown_entry_point_is_not_found() {
    let (h, _) = ready().await;
    let stranger = Address(Field::from_u64(404));

    let err = h
        .pxe
        .simulate_tx(request(stranger), SimulateTxOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PxeError::NotFound(_)));
    assert_eq!(h.simulator.state().runs, 0);
}

#[tokio::test]
async fn concurrent_simulations_run_one_at_a_time() {
    let h = harness_with(MockSimulator::with_delay(Duration::from_millis(30)));
    let token = register_token(&h.pxe).await;
    h.node.set_header(5);
    h.simulator.state().execution = Some(execution(token, 5));

    let (a, b, c) = tokio::join!(
        h.pxe.simulate_tx(request(token), SimulateTxOptions::default()),
        h.pxe.simulate_tx(request(token), SimulateTxOptions::default()),
        h.pxe.simulate_tx(request(token), SimulateTxOptions::default()),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(h.simulator.max_running.load(Ordering::SeqCst), 1);
    assert_eq!(h.simulator.state().runs, 3);
}

// ============================================================================
// Proving and sending
// ============================================================================

#[tokio::test]
async fn prove_tx_pins_execution_block() {
    let (h, token) = ready().await;

    let proven = h
        .pxe
        .prove_tx(request(token), execution(token, 5))
        .await
        .unwrap();

    assert!(!proven.client_ivc_proof.is_empty());
    assert_eq!(proven.public_inputs.historical_header.block_number, 5);
    assert_eq!(*h.prover.calls.lock().unwrap(), vec![("prove", 5)]);
}

#[tokio::test]
async fn send_tx_rejects_settled_duplicate() {
    let (h, token) = ready().await;
    let tx = h
        .pxe
        .prove_tx(request(token), execution(token, 5))
        .await
        .unwrap()
        .to_tx();

    let tx_hash = h.pxe.send_tx(&tx).await.unwrap();
    assert_eq!(tx_hash, tx.tx_hash().unwrap());
    assert_eq!(h.node.state().sent.len(), 1);

    h.node.add_tx_effect(
        TxEffect {
            tx_hash,
            note_hashes: tx.data.note_hashes.clone(),
            nullifiers: tx.data.nullifiers.clone(),
            encrypted_logs: vec![],
            unencrypted_logs: vec![],
        },
        10,
    );

    let err = h.pxe.send_tx(&tx).await.unwrap_err();
    assert!(matches!(err, PxeError::AlreadySettled(hash) if hash == tx_hash));
    assert_eq!(h.node.state().sent.len(), 1);
}

#[tokio::test]
async fn send_tx_surfaces_node_rejection() {
    let (h, token) = ready().await;
    let tx = h
        .pxe
        .prove_tx(request(token), execution(token, 5))
        .await
        .unwrap()
        .to_tx();
    h.node.state().send_error = Some("mempool full".into());

    let err = h.pxe.send_tx(&tx).await.unwrap_err();
    assert!(matches!(err, PxeError::Upstream(ref e) if e.to_string() == "mempool full"));
    assert!(h.node.state().sent.is_empty());
}

#[tokio::test]
async fn stopped_service_rejects_jobs() {
    let (h, token) = ready().await;
    h.pxe.stop().await;

    let err = h
        .pxe
        .simulate_tx(request(token), SimulateTxOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PxeError::QueueClosed));
    assert!(!h.pxe.job_queue().is_accepting());
}

// ============================================================================
// Unconstrained calls
// ============================================================================

#[tokio::test]
async fn simulate_unconstrained_returns_values() {
    let (h, token) = ready().await;
    h.simulator.state().unconstrained_result = vec![Field::from_u64(500)];

    let values = h
        .pxe
        .simulate_unconstrained("balance_of", vec![Field::from_u64(1)], token, None)
        .await
        .unwrap();
    assert_eq!(values, vec![Field::from_u64(500)]);
}

#[tokio::test]
async fn simulate_unconstrained_validates_call() {
    let (h, token) = ready().await;

    let err = h
        .pxe
        .simulate_unconstrained("balance_of", vec![], token, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PxeError::InvalidRequest(_)));

    let err = h
        .pxe
        .simulate_unconstrained("mint", vec![], token, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PxeError::NotFound(_)));
}

#[tokio::test]
async fn simulate_unconstrained_surfaces_failure() {
    let (h, token) = ready().await;
    h.simulator.state().failure = Some(SimulationError::new(
        "not authorized",
        FailingFunction::new(token, function_selector("balance_of")),
    ));

    let err = h
        .pxe
        .simulate_unconstrained("balance_of", vec![Field::from_u64(1)], token, None)
        .await
        .unwrap_err();
    let PxeError::Simulation(failure) = err else {
        panic!("expected simulation error");
    };
    assert_eq!(
        failure.failing_functions[0].function_name.as_deref(),
        Some("balance_of")
    );
}

// ============================================================================
// Registry
// ============================================================================

#[tokio::test]
async fn register_contract_checks_instance() {
    let h = harness();
    let artifact = token_artifact();

    let mut wrong_class = token_instance(&artifact);
    wrong_class.contract_class_id = Field::from_u64(1);
    let err = h
        .pxe
        .register_contract(wrong_class, Some(artifact.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, PxeError::InvalidState(_)));

    let mut wrong_address = token_instance(&artifact);
    wrong_address.address = Address(Field::from_u64(2));
    let err = h
        .pxe
        .register_contract(wrong_address, Some(artifact.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, PxeError::InvalidState(_)));

    assert!(h.pxe.get_contracts().await.unwrap().is_empty());
    assert!(h.node.state().pushed_artifacts.is_empty());
}

#[tokio::test]
async fn register_contract_reuses_stored_artifact() {
    let h = harness();
    let artifact = token_artifact();

    let orphan = token_instance(&artifact);
    let err = h.pxe.register_contract(orphan, None).await.unwrap_err();
    assert!(matches!(err, PxeError::NotFound(_)));

    let class_id = h.pxe.register_contract_class(&artifact).await.unwrap();
    let second = ContractInstance::new(
        class_id,
        Field::from_u64(7),
        Address::ZERO,
        Field::ZERO,
        PublicKeys::default(),
    );
    h.pxe.register_contract(second.clone(), None).await.unwrap();

    assert_eq!(h.pxe.get_contracts().await.unwrap(), vec![second.address]);
    assert_eq!(
        h.pxe.get_contract_instance(second.address).await.unwrap(),
        Some(second)
    );
    assert_eq!(
        h.pxe.get_contract_class(class_id).await.unwrap(),
        Some(ContractClass::from_artifact(&artifact))
    );
}

#[tokio::test]
async fn accounts_and_contacts() {
    let h = harness();
    let alice = h
        .pxe
        .register_account(Field::from_u64(11), Field::from_u64(12))
        .await
        .unwrap();
    let again = h
        .pxe
        .register_account(Field::from_u64(11), Field::from_u64(12))
        .await
        .unwrap();
    assert_eq!(alice, again);
    assert_eq!(h.pxe.get_registered_accounts().await.unwrap(), vec![alice]);
    assert_eq!(
        h.pxe.get_registered_account(alice.address).await.unwrap(),
        Some(alice)
    );

    // own accounts are not contacts
    h.pxe.register_contact(alice.address).await.unwrap();
    assert!(h.pxe.get_contacts().await.unwrap().is_empty());

    let bob = Address(Field::from_u64(99));
    h.pxe.register_contact(bob).await.unwrap();
    h.pxe.register_contact(bob).await.unwrap();
    assert_eq!(h.pxe.get_contacts().await.unwrap(), vec![bob]);

    h.pxe.remove_contact(bob).await.unwrap();
    assert!(h.pxe.get_contacts().await.unwrap().is_empty());
}

#[tokio::test]
async fn public_storage_requires_registration() {
    let (h, token) = ready().await;
    let slot = Field::from_u64(3);
    h.node
        .state()
        .public_storage
        .insert((token, slot), Field::from_u64(1000));

    assert_eq!(
        h.pxe.get_public_storage_at(token, slot).await.unwrap(),
        Field::from_u64(1000)
    );

    let err = h
        .pxe
        .get_public_storage_at(Address(Field::from_u64(404)), slot)
        .await
        .unwrap_err();
    assert!(matches!(err, PxeError::NotFound(_)));
}

#[tokio::test]
async fn contract_initialization_follows_nullifier() {
    let (h, token) = ready().await;
    assert!(!h.pxe.is_contract_initialized(token).await.unwrap());

    let init_nullifier = silo_nullifier(token.to_field(), token.to_field());
    h.node.state().nullifier_tree.push(init_nullifier);
    assert!(h.pxe.is_contract_initialized(token).await.unwrap());

    assert!(!h.pxe.is_contract_publicly_deployed(token).await.unwrap());
    let instance = h.pxe.get_contract_instance(token).await.unwrap().unwrap();
    h.node.state().contracts.insert(token, instance);
    assert!(h.pxe.is_contract_publicly_deployed(token).await.unwrap());
}

// ============================================================================
// Lifecycle and chain queries
// ============================================================================

#[tokio::test]
async fn start_registers_protocol_contracts_and_seeds_sync() {
    let h = harness();
    let artifact = token_artifact();
    let instance = token_instance(&artifact);
    let address = instance.address;

    let mut config = h.pxe.config().clone();
    config.sync.l2_starting_block = 12;
    let pxe = PxeService::new(
        PxeCapabilities {
            node: h.node.clone(),
            key_store: h.key_store.clone(),
            simulator: h.simulator.clone(),
            db: h.db.clone(),
            proof_creator: h.prover.clone(),
            protocol_contracts: vec![ProtocolContract { instance, artifact }],
        },
        config,
    );

    pxe.start().await.unwrap();
    assert_eq!(pxe.get_contracts().await.unwrap(), vec![address]);
    assert_eq!(h.db.get_synced_block_number().unwrap(), Some(11));
    assert!(h.prover.calls.lock().unwrap().contains(&("health_check", 0)));

    // an existing sync position survives restarts
    h.db.set_synced_block_number(40).unwrap();
    pxe.start().await.unwrap();
    assert_eq!(h.db.get_synced_block_number().unwrap(), Some(40));
}

#[tokio::test]
async fn get_block_negative_means_head() {
    let (h, _) = ready().await;
    for number in [5, 9] {
        h.node.state().blocks.push(L2Block {
            number,
            hash: Field::from_u64(number),
            header: Default::default(),
            tx_effects: vec![],
        });
    }

    assert_eq!(h.pxe.get_block(-1).await.unwrap().unwrap().number, 9);
    assert_eq!(h.pxe.get_block(5).await.unwrap().unwrap().number, 5);
    assert!(h.pxe.get_block(6).await.unwrap().is_none());
}

#[tokio::test]
async fn node_and_pxe_info() {
    let (h, _) = ready().await;
    let info = h.pxe.get_node_info().await.unwrap();
    assert_eq!(info.node_version, "zelana-node-test");
    assert_eq!(info.chain_id, 1);

    let pxe_info = h.pxe.get_pxe_info().await.unwrap();
    assert_eq!(pxe_info.pxe_version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn capsules_feed_the_next_simulation() {
    let (h, token) = ready().await;
    h.pxe.add_capsule(vec![Field::from_u64(1)]).await.unwrap();
    h.pxe.add_capsule(vec![Field::from_u64(2), Field::from_u64(3)]).await.unwrap();

    h.pxe
        .simulate_tx(request(token), SimulateTxOptions::default())
        .await
        .unwrap();
    assert_eq!(
        h.simulator.state().capsules,
        vec![
            vec![Field::from_u64(2), Field::from_u64(3)],
            vec![Field::from_u64(1)],
        ]
    );

    // consumed by the first run
    h.pxe
        .simulate_tx(request(token), SimulateTxOptions::default())
        .await
        .unwrap();
    assert!(h.simulator.state().capsules.is_empty());
}

#[tokio::test]
async fn witnesses_and_capsules() {
    let h = harness();
    let request_hash = Field::from_u64(8);
    let witness = vec![Field::from_u64(1), Field::from_u64(2)];

    h.pxe
        .add_auth_witness(request_hash, witness.clone())
        .await
        .unwrap();
    assert_eq!(
        h.pxe.get_auth_witness(request_hash).await.unwrap(),
        Some(witness)
    );
    assert!(h.pxe.get_auth_witness(Field::ZERO).await.unwrap().is_none());

    let before = h.pxe.estimate_db_size().await.unwrap();
    h.pxe.add_capsule(vec![Field::from_u64(3)]).await.unwrap();
    assert!(h.pxe.estimate_db_size().await.unwrap() > before);
}
