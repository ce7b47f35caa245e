use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use zelana_privacy::{Address, CompleteAddress, Field};

use super::{
    IncomingNoteQuery, IncomingNoteRecord, OutgoingNoteQuery, OutgoingNoteRecord, PxeDatabase,
};
use crate::types::{ContractArtifact, ContractInstance, NoteStatus};

const CF_INCOMING_NOTES: &str = "incoming_notes";
const CF_NULLIFIED_NOTES: &str = "nullified_notes";
const CF_OUTGOING_NOTES: &str = "outgoing_notes";
const CF_COMPLETE_ADDRESSES: &str = "complete_addresses";
const CF_CONTACTS: &str = "contacts";
const CF_CONTRACT_ARTIFACTS: &str = "contract_artifacts";
const CF_CONTRACT_INSTANCES: &str = "contract_instances";
const CF_AUTH_WITNESSES: &str = "auth_witnesses";
const CF_CAPSULES: &str = "capsules";
const CF_SYNC_META: &str = "sync_meta";

const ALL_CFS: [&str; 10] = [
    CF_INCOMING_NOTES,
    CF_NULLIFIED_NOTES,
    CF_OUTGOING_NOTES,
    CF_COMPLETE_ADDRESSES,
    CF_CONTACTS,
    CF_CONTRACT_ARTIFACTS,
    CF_CONTRACT_INSTANCES,
    CF_AUTH_WITNESSES,
    CF_CAPSULES,
    CF_SYNC_META,
];

const KEY_SYNCED_BLOCK: &[u8] = b"synced_block";

/// Incoming note plus the accounts allowed to see it
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScopedNote {
    record: IncomingNoteRecord,
    scopes: Vec<Address>,
}

impl ScopedNote {
    fn visible_to(&self, scopes: &[Address]) -> bool {
        scopes.is_empty() || self.scopes.iter().any(|s| scopes.contains(s))
    }
}

/// A thread-safe wrapper around RocksDB.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
}

impl RocksDbStore {
    /// Opens the database at the specified path, creating it if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, families)
            .map_err(|e| anyhow::anyhow!("Failed to open RocksDB: {}", e))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .with_context(|| format!("{} CF missing", name))
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db.put_cf(cf, key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn scan_json<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    fn scan_keys(&self, cf_name: &str) -> Result<Vec<Box<[u8]>>> {
        let cf = self.cf(cf_name)?;
        let mut keys = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            keys.push(key);
        }
        Ok(keys)
    }

    fn clear_cf(&self, cf_name: &str) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let mut batch = WriteBatch::default();
        for key in self.scan_keys(cf_name)? {
            batch.delete_cf(cf, key);
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn scoped_notes(&self, cf_name: &str) -> Result<Vec<ScopedNote>> {
        self.scan_json(cf_name)
    }
}

fn address_from_key(key: &[u8]) -> Result<Address> {
    Ok(Address(Field::from_slice(key).context("invalid address key")?))
}

impl PxeDatabase for RocksDbStore {
    fn add_notes(
        &self,
        incoming: &[IncomingNoteRecord],
        outgoing: &[OutgoingNoteRecord],
        scope: Address,
    ) -> Result<()> {
        for record in incoming {
            let key = record.key();
            let scoped = match self.get_json::<ScopedNote>(CF_INCOMING_NOTES, &key)? {
                Some(mut existing) => {
                    if !existing.scopes.contains(&scope) {
                        existing.scopes.push(scope);
                    }
                    existing.record = record.clone();
                    existing
                }
                None => ScopedNote {
                    record: record.clone(),
                    scopes: vec![scope],
                },
            };
            self.put_json(CF_INCOMING_NOTES, &key, &scoped)?;
        }

        for record in outgoing {
            self.put_json(CF_OUTGOING_NOTES, &record.key(), record)?;
        }
        Ok(())
    }

    fn add_nullified_note(&self, note: &IncomingNoteRecord) -> Result<()> {
        let scoped = ScopedNote {
            record: note.clone(),
            scopes: Vec::new(),
        };
        self.put_json(CF_NULLIFIED_NOTES, &note.key(), &scoped)
    }

    fn get_incoming_notes(&self, query: &IncomingNoteQuery) -> Result<Vec<IncomingNoteRecord>> {
        let mut notes = self.scoped_notes(CF_INCOMING_NOTES)?;
        if query.status == NoteStatus::ActiveOrNullified {
            notes.extend(self.scoped_notes(CF_NULLIFIED_NOTES)?);
        }

        Ok(notes
            .into_iter()
            .filter(|n| n.visible_to(&query.scopes) && query.matches(&n.record))
            .map(|n| n.record)
            .collect())
    }

    fn get_outgoing_notes(&self, query: &OutgoingNoteQuery) -> Result<Vec<OutgoingNoteRecord>> {
        Ok(self
            .scan_json::<OutgoingNoteRecord>(CF_OUTGOING_NOTES)?
            .into_iter()
            .filter(|n| query.matches(n))
            .collect())
    }

    fn remove_nullified_notes(
        &self,
        nullifiers: &[Field],
        address_point: Field,
    ) -> Result<Vec<IncomingNoteRecord>> {
        let targets: HashSet<Field> = nullifiers.iter().copied().collect();
        let incoming = self.cf(CF_INCOMING_NOTES)?;
        let nullified = self.cf(CF_NULLIFIED_NOTES)?;

        let mut batch = WriteBatch::default();
        let mut removed = Vec::new();
        for note in self.scoped_notes(CF_INCOMING_NOTES)? {
            if note.record.address_point != address_point
                || !targets.contains(&note.record.siloed_nullifier)
            {
                continue;
            }
            let key = note.record.key();
            batch.delete_cf(incoming, key);
            batch.put_cf(nullified, key, serde_json::to_vec(&note)?);
            removed.push(note.record);
        }

        self.db.write(batch)?;
        Ok(removed)
    }

    fn get_synced_block_number(&self) -> Result<Option<u64>> {
        self.get_json(CF_SYNC_META, KEY_SYNCED_BLOCK)
    }

    fn set_synced_block_number(&self, block_number: u64) -> Result<()> {
        self.put_json(CF_SYNC_META, KEY_SYNCED_BLOCK, &block_number)
    }

    fn reset_note_sync_data(&self) -> Result<()> {
        self.clear_cf(CF_SYNC_META)
    }

    fn add_complete_address(&self, address: &CompleteAddress) -> Result<bool> {
        let key = address.address.0.as_bytes();
        if self
            .get_json::<CompleteAddress>(CF_COMPLETE_ADDRESSES, key)?
            .is_some()
        {
            return Ok(false);
        }
        self.put_json(CF_COMPLETE_ADDRESSES, key, address)?;
        Ok(true)
    }

    fn get_complete_address(&self, address: Address) -> Result<Option<CompleteAddress>> {
        self.get_json(CF_COMPLETE_ADDRESSES, address.0.as_bytes())
    }

    fn get_complete_addresses(&self) -> Result<Vec<CompleteAddress>> {
        self.scan_json(CF_COMPLETE_ADDRESSES)
    }

    fn add_contact(&self, address: Address) -> Result<bool> {
        let cf = self.cf(CF_CONTACTS)?;
        if self.db.get_cf(cf, address.0.as_bytes())?.is_some() {
            return Ok(false);
        }
        self.db.put_cf(cf, address.0.as_bytes(), [])?;
        Ok(true)
    }

    fn get_contacts(&self) -> Result<Vec<Address>> {
        self.scan_keys(CF_CONTACTS)?
            .iter()
            .map(|key| address_from_key(key))
            .collect()
    }

    fn remove_contact(&self, address: Address) -> Result<bool> {
        let cf = self.cf(CF_CONTACTS)?;
        if self.db.get_cf(cf, address.0.as_bytes())?.is_none() {
            return Ok(false);
        }
        self.db.delete_cf(cf, address.0.as_bytes())?;
        Ok(true)
    }

    fn add_contract_artifact(&self, class_id: Field, artifact: &ContractArtifact) -> Result<()> {
        self.put_json(CF_CONTRACT_ARTIFACTS, class_id.as_bytes(), artifact)
    }

    fn get_contract_artifact(&self, class_id: Field) -> Result<Option<ContractArtifact>> {
        self.get_json(CF_CONTRACT_ARTIFACTS, class_id.as_bytes())
    }

    fn add_contract_instance(&self, instance: &ContractInstance) -> Result<()> {
        self.put_json(CF_CONTRACT_INSTANCES, instance.address.0.as_bytes(), instance)
    }

    fn get_contract_instance(&self, address: Address) -> Result<Option<ContractInstance>> {
        self.get_json(CF_CONTRACT_INSTANCES, address.0.as_bytes())
    }

    fn get_contracts_addresses(&self) -> Result<Vec<Address>> {
        self.scan_keys(CF_CONTRACT_INSTANCES)?
            .iter()
            .map(|key| address_from_key(key))
            .collect()
    }

    fn add_auth_witness(&self, request_hash: Field, witness: &[Field]) -> Result<()> {
        self.put_json(CF_AUTH_WITNESSES, request_hash.as_bytes(), &witness)
    }

    fn get_auth_witness(&self, request_hash: Field) -> Result<Option<Vec<Field>>> {
        self.get_json(CF_AUTH_WITNESSES, request_hash.as_bytes())
    }

    fn add_capsule(&self, capsule: &[Field]) -> Result<()> {
        let cf = self.cf(CF_CAPSULES)?;
        let next = match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item?;
                let last = u64::from_be_bytes(
                    key.as_ref()
                        .try_into()
                        .context("invalid capsule key length")?,
                );
                last + 1
            }
            None => 0,
        };
        self.db
            .put_cf(cf, next.to_be_bytes(), serde_json::to_vec(&capsule)?)?;
        Ok(())
    }

    fn pop_capsule(&self) -> Result<Option<Vec<Field>>> {
        let cf = self.cf(CF_CAPSULES)?;
        let Some(item) = self.db.iterator_cf(cf, IteratorMode::End).next() else {
            return Ok(None);
        };
        let (key, value) = item?;
        let capsule = serde_json::from_slice(&value)?;
        self.db.delete_cf(cf, key)?;
        Ok(Some(capsule))
    }

    fn estimate_size(&self) -> Result<u64> {
        let mut total = 0u64;
        for name in ALL_CFS {
            let cf = self.cf(name)?;
            for item in self.db.iterator_cf(cf, IteratorMode::Start) {
                let (key, value) = item?;
                total += (key.len() + value.len()) as u64;
            }
        }
        Ok(total)
    }
}
