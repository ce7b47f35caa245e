//! Best-effort decoration of execution failures
//!
//! Enrichment never replaces the failure it decorates: lookups that miss are
//! logged and skipped.

use anyhow::anyhow;
use tracing::{debug, warn};

use crate::contract_data::ContractDataOracle;
use crate::error::{PxeError, SimulationError};

/// Fill in contract and function names, and source positions when the
/// failing function carries debug metadata
pub fn enrich_simulation_error(err: &mut SimulationError, contract_data: &ContractDataOracle) {
    add_names(err, contract_data);

    if !err.opcode_locations.is_empty() && err.source_locations.is_empty() {
        if let Err(e) = resolve_source_locations(err, contract_data) {
            debug!(error = %e, "No source positions for simulation error");
        }
    }
}

/// Public failures carry raw opcode locations only, so missing debug
/// metadata is reported to the caller (who logs it)
pub fn enrich_public_simulation_error(
    err: &mut SimulationError,
    contract_data: &ContractDataOracle,
) -> anyhow::Result<()> {
    add_names(err, contract_data);
    resolve_source_locations(err, contract_data)
}

/// Turn a capability failure into a PXE error, enriching simulation failures
pub fn surface_execution_error(err: anyhow::Error, contract_data: &ContractDataOracle) -> PxeError {
    match err.downcast::<SimulationError>() {
        Ok(mut sim) => {
            enrich_simulation_error(&mut sim, contract_data);
            PxeError::Simulation(sim)
        }
        Err(other) => PxeError::Upstream(other),
    }
}

fn add_names(err: &mut SimulationError, contract_data: &ContractDataOracle) {
    for frame in &mut err.failing_functions {
        if frame.contract_name.is_none() {
            match contract_data.get_contract_name(frame.contract_address) {
                Ok(name) => frame.contract_name = Some(name),
                Err(e) => warn!(
                    contract = %frame.contract_address,
                    error = %e,
                    "Could not resolve contract name"
                ),
            }
        }
        if frame.function_name.is_none() {
            match contract_data.get_function_name(frame.contract_address, frame.function_selector) {
                Ok(name) => frame.function_name = Some(name),
                Err(e) => warn!(
                    contract = %frame.contract_address,
                    selector = %frame.function_selector,
                    error = %e,
                    "Could not resolve function name"
                ),
            }
        }
    }
}

fn resolve_source_locations(
    err: &mut SimulationError,
    contract_data: &ContractDataOracle,
) -> anyhow::Result<()> {
    let frame = err
        .original_failing_function()
        .cloned()
        .ok_or_else(|| anyhow!("simulation error has no failing function"))?;

    let metadata = contract_data
        .get_function_debug_metadata(frame.contract_address, frame.function_selector)?
        .ok_or_else(|| {
            anyhow!(
                "no debug metadata for {}:{}",
                frame.contract_address,
                frame.function_selector
            )
        })?;

    err.source_locations = err
        .opcode_locations
        .iter()
        .filter_map(|location| metadata.resolve(location).cloned())
        .collect();
    Ok(())
}
