//! Contract artifacts, classes and instances
//!
//! ```text
//! artifact_hash = H(CLASS, hash(name), selector_0, hash(bytecode_0), ...)
//! class_id      = H(CLASS, artifact_hash, private_functions_root)
//! address       = H(CADDR, class_id, salt, deployer, init_hash, public_keys_hash)
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zelana_privacy::hash::domain;
use zelana_privacy::{Address, Field, FunctionSelector, PublicKeys, hash_to_field, poseidon_hash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionType {
    Private,
    Public,
    Unconstrained,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiParameter {
    pub name: String,
    pub type_name: String,
}

/// Position in contract source a circuit opcode came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCodeLocation {
    pub file_path: String,
    pub line: u32,
    pub column: u32,
    pub location_text: String,
}

/// Opcode location -> source position
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FunctionDebugMetadata {
    pub locations: BTreeMap<String, SourceCodeLocation>,
}

impl FunctionDebugMetadata {
    pub fn resolve(&self, opcode_location: &str) -> Option<&SourceCodeLocation> {
        self.locations.get(opcode_location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionArtifact {
    pub name: String,
    pub function_type: FunctionType,
    #[serde(default)]
    pub is_initializer: bool,
    #[serde(default)]
    pub is_static: bool,
    pub parameters: Vec<AbiParameter>,
    #[serde(with = "hex::serde")]
    pub bytecode: Vec<u8>,
    #[serde(default)]
    pub debug: Option<FunctionDebugMetadata>,
}

impl FunctionArtifact {
    pub fn selector(&self) -> FunctionSelector {
        let types: Vec<&str> = self.parameters.iter().map(|p| p.type_name.as_str()).collect();
        FunctionSelector::from_name_and_parameters(&self.name, &types)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractArtifact {
    pub name: String,
    pub functions: Vec<FunctionArtifact>,
}

impl ContractArtifact {
    pub fn function_by_selector(&self, selector: FunctionSelector) -> Option<&FunctionArtifact> {
        self.functions.iter().find(|f| f.selector() == selector)
    }

    pub fn function_by_name(&self, name: &str) -> Option<&FunctionArtifact> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn artifact_hash(&self) -> Field {
        let mut inputs = vec![hash_to_field(self.name.as_bytes())];
        for function in &self.functions {
            inputs.push(function.selector().to_field());
            inputs.push(hash_to_field(&function.bytecode));
        }
        poseidon_hash(domain::CONTRACT_CLASS, &inputs)
    }
}

/// Public view of a contract class, derived from its artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractClass {
    pub id: Field,
    pub artifact_hash: Field,
    pub private_functions_root: Field,
    pub public_function_selectors: Vec<FunctionSelector>,
}

impl ContractClass {
    pub fn from_artifact(artifact: &ContractArtifact) -> Self {
        let artifact_hash = artifact.artifact_hash();

        let mut private_selectors: Vec<Field> = artifact
            .functions
            .iter()
            .filter(|f| f.function_type == FunctionType::Private)
            .map(|f| f.selector().to_field())
            .collect();
        private_selectors.sort();
        let private_functions_root = poseidon_hash(domain::CONTRACT_CLASS, &private_selectors);

        let public_function_selectors = artifact
            .functions
            .iter()
            .filter(|f| f.function_type == FunctionType::Public)
            .map(|f| f.selector())
            .collect();

        let id = poseidon_hash(
            domain::CONTRACT_CLASS,
            &[artifact_hash, private_functions_root],
        );

        Self {
            id,
            artifact_hash,
            private_functions_root,
            public_function_selectors,
        }
    }
}

/// A deployed (or to-be-deployed) contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInstance {
    pub address: Address,
    pub contract_class_id: Field,
    pub salt: Field,
    pub deployer: Address,
    pub initialization_hash: Field,
    pub public_keys: PublicKeys,
}

impl ContractInstance {
    /// Build an instance whose address is derived from its fields
    pub fn new(
        contract_class_id: Field,
        salt: Field,
        deployer: Address,
        initialization_hash: Field,
        public_keys: PublicKeys,
    ) -> Self {
        let mut instance = Self {
            address: Address::ZERO,
            contract_class_id,
            salt,
            deployer,
            initialization_hash,
            public_keys,
        };
        instance.address = instance.compute_address();
        instance
    }

    pub fn compute_address(&self) -> Address {
        Address(poseidon_hash(
            domain::CONTRACT_ADDRESS,
            &[
                self.contract_class_id,
                self.salt,
                self.deployer.to_field(),
                self.initialization_hash,
                self.public_keys.hash(),
            ],
        ))
    }
}

/// Well-known contracts every PXE registers at start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProtocolContractAddresses {
    pub class_registerer: Address,
    pub instance_deployer: Address,
    pub fee_juice: Address,
    pub multi_call_entrypoint: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_version: String,
    pub chain_id: u64,
    pub protocol_version: u64,
    pub protocol_contract_addresses: ProtocolContractAddresses,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PxeInfo {
    pub pxe_version: String,
    pub protocol_contract_addresses: ProtocolContractAddresses,
}
