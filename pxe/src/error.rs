use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zelana_privacy::{Address, EventSelector, Field, FunctionSelector};

use crate::types::contract::SourceCodeLocation;
use crate::types::tx::TxHash;

pub type Result<T> = std::result::Result<T, PxeError>;

#[derive(Debug, Error)]
pub enum PxeError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("the note has been destroyed (nullifier {nullifier})")]
    Destroyed { nullifier: Field },

    #[error("event selector {selector} matched but payload shape mismatched: {detail}")]
    ShapeMismatch {
        selector: EventSelector,
        detail: String,
    },

    #[error(transparent)]
    Upstream(#[from] anyhow::Error),

    #[error(transparent)]
    Simulation(SimulationError),

    #[error("job queue is closed")]
    QueueClosed,

    #[error("job cancelled before it started")]
    Cancelled,

    #[error("a settled tx with equal hash {0} exists")]
    AlreadySettled(TxHash),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl PxeError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_state(what: impl Into<String>) -> Self {
        Self::InvalidState(what.into())
    }
}

/// One frame of the failing call stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailingFunction {
    pub contract_address: Address,
    pub contract_name: Option<String>,
    pub function_selector: FunctionSelector,
    pub function_name: Option<String>,
}

impl FailingFunction {
    pub fn new(contract_address: Address, function_selector: FunctionSelector) -> Self {
        Self {
            contract_address,
            contract_name: None,
            function_selector,
            function_name: None,
        }
    }
}

/// A failed private, unconstrained or public execution
///
/// Raised by the simulator and by public simulation on the node; the PXE
/// fills in contract/function names and source positions when it can.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationError {
    pub message: String,
    /// Innermost frame last
    pub failing_functions: Vec<FailingFunction>,
    /// Raw opcode locations of the failing circuit
    #[serde(default)]
    pub opcode_locations: Vec<String>,
    /// Opcode locations resolved against debug metadata
    #[serde(default)]
    pub source_locations: Vec<SourceCodeLocation>,
    #[serde(default)]
    pub revert_data: Vec<Field>,
}

impl SimulationError {
    pub fn new(message: impl Into<String>, failing_function: FailingFunction) -> Self {
        Self {
            message: message.into(),
            failing_functions: vec![failing_function],
            opcode_locations: Vec::new(),
            source_locations: Vec::new(),
            revert_data: Vec::new(),
        }
    }

    pub fn with_opcode_locations(mut self, locations: Vec<String>) -> Self {
        self.opcode_locations = locations;
        self
    }

    /// The frame where execution actually failed
    pub fn original_failing_function(&self) -> Option<&FailingFunction> {
        self.failing_functions.last()
    }
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for frame in self.failing_functions.iter().rev() {
            let contract = match &frame.contract_name {
                Some(name) => name.clone(),
                None => frame.contract_address.to_string(),
            };
            let function = match &frame.function_name {
                Some(name) => name.clone(),
                None => frame.function_selector.to_string(),
            };
            write!(f, "\n    at {}.{}", contract, function)?;
        }
        for location in &self.source_locations {
            write!(
                f,
                "\n    at {}:{}:{} {}",
                location.file_path, location.line, location.column, location.location_text
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for SimulationError {}
