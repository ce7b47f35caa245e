//! Accounts, contacts and contracts known to this PXE

use tracing::info;
use zelana_privacy::{Address, CompleteAddress, Field, silo_nullifier};

use super::PxeService;
use crate::error::{PxeError, Result};
use crate::node::BlockView;
use crate::types::{ContractArtifact, ContractClass, ContractInstance};

impl PxeService {
    // =========================================================================
    // Accounts and contacts
    // =========================================================================

    pub async fn register_account(
        &self,
        secret_key: Field,
        partial_address: Field,
    ) -> Result<CompleteAddress> {
        let key_store = &self.inner.key_store;
        let accounts = key_store.get_accounts().await?;
        let complete = key_store.add_account(secret_key, partial_address).await?;

        if accounts.contains(&complete.address) {
            info!(account = %complete.address, "Account already registered");
            return Ok(complete);
        }

        self.inner.db.add_complete_address(&complete)?;
        info!(account = %complete.address, "Registered account");
        Ok(complete)
    }

    pub async fn get_registered_accounts(&self) -> Result<Vec<CompleteAddress>> {
        let accounts = self.inner.key_store.get_accounts().await?;
        Ok(self
            .inner
            .db
            .get_complete_addresses()?
            .into_iter()
            .filter(|c| accounts.contains(&c.address))
            .collect())
    }

    pub async fn get_registered_account(
        &self,
        address: Address,
    ) -> Result<Option<CompleteAddress>> {
        Ok(self
            .get_registered_accounts()
            .await?
            .into_iter()
            .find(|c| c.address == address))
    }

    pub async fn register_contact(&self, address: Address) -> Result<()> {
        let accounts = self.inner.key_store.get_accounts().await?;
        if accounts.contains(&address) {
            info!(%address, "Address already registered as an account");
            return Ok(());
        }

        if self.inner.db.add_contact(address)? {
            info!(%address, "Added contact");
        } else {
            info!(%address, "Contact already registered");
        }
        Ok(())
    }

    pub async fn get_contacts(&self) -> Result<Vec<Address>> {
        Ok(self.inner.db.get_contacts()?)
    }

    pub async fn remove_contact(&self, address: Address) -> Result<()> {
        if self.inner.db.remove_contact(address)? {
            info!(%address, "Removed contact");
        } else {
            info!(%address, "Contact not registered");
        }
        Ok(())
    }

    // =========================================================================
    // Contracts
    // =========================================================================

    pub async fn register_contract_class(&self, artifact: &ContractArtifact) -> Result<Field> {
        let class = ContractClass::from_artifact(artifact);
        self.inner.db.add_contract_artifact(class.id, artifact)?;
        info!(class_id = %class.id, name = %artifact.name, "Registered contract class");
        Ok(class.id)
    }

    /// Register an instance, optionally together with its artifact
    pub async fn register_contract(
        &self,
        instance: ContractInstance,
        artifact: Option<ContractArtifact>,
    ) -> Result<()> {
        match artifact {
            Some(artifact) => {
                let class = ContractClass::from_artifact(&artifact);
                if class.id != instance.contract_class_id {
                    return Err(PxeError::invalid_state(format!(
                        "artifact has class id {} but instance refers to {}",
                        class.id, instance.contract_class_id
                    )));
                }

                let computed = instance.compute_address();
                if computed != instance.address {
                    return Err(PxeError::invalid_state(format!(
                        "instance address {} does not match computed address {}",
                        instance.address, computed
                    )));
                }

                self.inner.db.add_contract_artifact(class.id, &artifact)?;
                self.inner
                    .node
                    .add_contract_artifact(instance.address, &artifact)
                    .await?;
                info!(
                    contract = %instance.address,
                    name = %artifact.name,
                    "Added contract"
                );
            }
            None => {
                if self
                    .inner
                    .db
                    .get_contract_artifact(instance.contract_class_id)?
                    .is_none()
                {
                    return Err(PxeError::not_found(format!(
                        "missing contract artifact for class id {}",
                        instance.contract_class_id
                    )));
                }
                info!(contract = %instance.address, "Added contract instance");
            }
        }

        self.inner.db.add_contract_instance(&instance)?;
        Ok(())
    }

    pub async fn get_contracts(&self) -> Result<Vec<Address>> {
        Ok(self.inner.db.get_contracts_addresses()?)
    }

    pub async fn get_contract_instance(
        &self,
        address: Address,
    ) -> Result<Option<ContractInstance>> {
        Ok(self.inner.db.get_contract_instance(address)?)
    }

    pub async fn get_contract_artifact(&self, class_id: Field) -> Result<Option<ContractArtifact>> {
        Ok(self.inner.db.get_contract_artifact(class_id)?)
    }

    pub async fn get_contract_class(&self, class_id: Field) -> Result<Option<ContractClass>> {
        Ok(self
            .inner
            .db
            .get_contract_artifact(class_id)?
            .map(|artifact| ContractClass::from_artifact(&artifact)))
    }

    pub async fn get_public_storage_at(&self, contract: Address, slot: Field) -> Result<Field> {
        if self.inner.db.get_contract_instance(contract)?.is_none() {
            return Err(PxeError::not_found(format!(
                "contract {} is not registered",
                contract
            )));
        }
        Ok(self
            .inner
            .node
            .get_public_storage_at(contract, slot, BlockView::Latest)
            .await?)
    }

    pub async fn is_contract_class_publicly_registered(&self, class_id: Field) -> Result<bool> {
        Ok(self.inner.node.get_contract_class(class_id).await?.is_some())
    }

    pub async fn is_contract_publicly_deployed(&self, address: Address) -> Result<bool> {
        Ok(self.inner.node.get_contract(address).await?.is_some())
    }

    /// An initialized contract has emitted its initialization nullifier
    pub async fn is_contract_initialized(&self, address: Address) -> Result<bool> {
        let init_nullifier = silo_nullifier(address.to_field(), address.to_field());
        Ok(self
            .inner
            .node
            .get_nullifier_membership_witness(BlockView::Latest, init_nullifier)
            .await?
            .is_some())
    }
}
