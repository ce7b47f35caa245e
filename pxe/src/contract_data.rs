//! Resolves registered contracts to artifacts, functions and names

use std::sync::Arc;

use zelana_privacy::{Address, FunctionSelector};

use crate::database::PxeDatabase;
use crate::error::{PxeError, Result};
use crate::types::{ContractArtifact, ContractInstance, FunctionArtifact, FunctionDebugMetadata};

#[derive(Clone)]
pub struct ContractDataOracle {
    db: Arc<dyn PxeDatabase>,
}

impl ContractDataOracle {
    pub fn new(db: Arc<dyn PxeDatabase>) -> Self {
        Self { db }
    }

    pub fn get_contract_instance(&self, address: Address) -> Result<ContractInstance> {
        self.db
            .get_contract_instance(address)?
            .ok_or_else(|| PxeError::not_found(format!("no contract instance for {}", address)))
    }

    pub fn get_contract_artifact(&self, address: Address) -> Result<ContractArtifact> {
        let instance = self.get_contract_instance(address)?;
        self.db
            .get_contract_artifact(instance.contract_class_id)?
            .ok_or_else(|| {
                PxeError::not_found(format!(
                    "no artifact for contract class {} (contract {})",
                    instance.contract_class_id, address
                ))
            })
    }

    pub fn get_function_artifact(
        &self,
        address: Address,
        selector: FunctionSelector,
    ) -> Result<FunctionArtifact> {
        let artifact = self.get_contract_artifact(address)?;
        artifact
            .function_by_selector(selector)
            .cloned()
            .ok_or_else(|| {
                PxeError::not_found(format!(
                    "unknown function {} in contract {} ({})",
                    selector, artifact.name, address
                ))
            })
    }

    pub fn get_function_artifact_by_name(
        &self,
        address: Address,
        name: &str,
    ) -> Result<FunctionArtifact> {
        let artifact = self.get_contract_artifact(address)?;
        artifact.function_by_name(name).cloned().ok_or_else(|| {
            PxeError::not_found(format!(
                "unknown function {} in contract {} ({})",
                name, artifact.name, address
            ))
        })
    }

    pub fn get_function_debug_metadata(
        &self,
        address: Address,
        selector: FunctionSelector,
    ) -> Result<Option<FunctionDebugMetadata>> {
        Ok(self.get_function_artifact(address, selector)?.debug)
    }

    pub fn get_contract_name(&self, address: Address) -> Result<String> {
        Ok(self.get_contract_artifact(address)?.name)
    }

    pub fn get_function_name(
        &self,
        address: Address,
        selector: FunctionSelector,
    ) -> Result<String> {
        Ok(self.get_function_artifact(address, selector)?.name)
    }
}
