//! Key store capability

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::RwLock;
use zelana_privacy::{
    Address, CompleteAddress, Field, KeyPrefix, MasterSecretKeys, Point, derive_master_keys,
};

#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn get_accounts(&self) -> Result<Vec<Address>>;

    /// Derive (and remember) the account for a secret key
    async fn add_account(&self, secret_key: Field, partial_address: Field)
    -> Result<CompleteAddress>;

    /// Secret half of a master public key
    async fn get_master_secret_key(&self, public_key: &Point) -> Result<Field>;

    /// Key class and owning account of a master public key
    async fn get_key_prefix_and_account(&self, public_key: &Point)
    -> Result<(KeyPrefix, Address)>;
}

/// In-memory key store
#[derive(Default)]
pub struct MemoryKeyStore {
    accounts: RwLock<HashMap<Address, MasterSecretKeys>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn find(&self, public_key: &Point) -> Option<(KeyPrefix, Address, Field)> {
        let accounts = self.accounts.read().await;
        accounts.iter().find_map(|(address, keys)| {
            let pks = keys.public_keys();
            [
                KeyPrefix::Nullifier,
                KeyPrefix::IncomingViewing,
                KeyPrefix::OutgoingViewing,
                KeyPrefix::Tagging,
            ]
            .into_iter()
            .find(|prefix| pks.get(*prefix) == *public_key)
            .map(|prefix| (prefix, *address, keys.get(prefix)))
        })
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get_accounts(&self) -> Result<Vec<Address>> {
        Ok(self.accounts.read().await.keys().copied().collect())
    }

    async fn add_account(
        &self,
        secret_key: Field,
        partial_address: Field,
    ) -> Result<CompleteAddress> {
        let keys = derive_master_keys(&secret_key);
        let complete = CompleteAddress::new(keys.public_keys(), partial_address);
        self.accounts.write().await.insert(complete.address, keys);
        Ok(complete)
    }

    async fn get_master_secret_key(&self, public_key: &Point) -> Result<Field> {
        self.find(public_key)
            .await
            .map(|(_, _, secret)| secret)
            .ok_or_else(|| anyhow!("no secret key for public key {}", public_key))
    }

    async fn get_key_prefix_and_account(
        &self,
        public_key: &Point,
    ) -> Result<(KeyPrefix, Address)> {
        self.find(public_key)
            .await
            .map(|(prefix, address, _)| (prefix, address))
            .ok_or_else(|| anyhow!("unknown public key {}", public_key))
    }
}
