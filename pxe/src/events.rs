//! Event Decoder
//!
//! Stateless decoding of event logs against a caller supplied schema.
//!
//! Encrypted logs are trial-decrypted: every candidate secret is tried as
//! an incoming key, then as an outgoing key, and the first success wins.
//! Logs nobody can open, and logs of another event type, are noise and are
//! dropped. A log of the right type with the wrong shape is an error.
//!
//! Unencrypted log layout:
//!
//! ```text
//! ┌──────────┬──────────┬─────┬──────────┬──────────────────────────┐
//! │ field 0  │ field 1  │ ... │ field n-1│ 28 bytes pad │ selector  │
//! │ 32 bytes │ 32 bytes │     │ 32 bytes │              │ 4 bytes BE│
//! └──────────┴──────────┴─────┴──────────┴──────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;
use zelana_privacy::{
    Address, EncryptedEventLog, EventPayload, EventSelector, Field, decrypt_as_incoming,
    decrypt_as_outgoing,
};

use crate::error::{PxeError, Result};
use crate::types::{ExtendedUnencryptedL2Log, TxEffect};

/// Which event to look for and how to name its fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_selector: EventSelector,
    /// In payload order
    pub field_names: Vec<String>,
}

impl EventMetadata {
    pub fn new(event_selector: EventSelector, field_names: Vec<String>) -> Self {
        Self {
            event_selector,
            field_names,
        }
    }

    pub fn field_count(&self) -> usize {
        self.field_names.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    /// Master secret used as is
    Master,
    /// Master incoming viewing secret bound to an account address
    AddressDerived,
}

/// Candidate secret for trial decryption
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DecryptionKey {
    pub secret: Field,
    pub kind: KeyKind,
}

impl std::fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEvent {
    pub event_selector: EventSelector,
    pub contract_address: Option<Address>,
    /// `(name, value)` in schema order
    pub fields: Vec<(String, Field)>,
}

impl DecodedEvent {
    fn new(
        metadata: &EventMetadata,
        contract_address: Option<Address>,
        values: Vec<Field>,
    ) -> Self {
        Self {
            event_selector: metadata.event_selector,
            contract_address,
            fields: metadata.field_names.iter().cloned().zip(values).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Field> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| *value)
    }

    pub fn values(&self) -> Vec<Field> {
        self.fields.iter().map(|(_, value)| *value).collect()
    }

    /// Convert into a typed event
    pub fn decode<T: FromDecodedEvent>(&self) -> Result<T> {
        T::from_decoded(self)
    }
}

/// Typed events built from a decoded record
pub trait FromDecodedEvent: Sized {
    fn from_decoded(event: &DecodedEvent) -> Result<Self>;
}

/// First (secret, variant) pair that opens the log
pub fn trial_decrypt(log: &EncryptedEventLog, keys: &[DecryptionKey]) -> Option<EventPayload> {
    keys.iter().find_map(|key| {
        decrypt_as_incoming(log, &key.secret).or_else(|| decrypt_as_outgoing(log, &key.secret))
    })
}

pub fn decode_encrypted_events<'a>(
    effects: impl IntoIterator<Item = &'a TxEffect>,
    keys: &[DecryptionKey],
    metadata: &EventMetadata,
) -> Result<Vec<DecodedEvent>> {
    let mut events = Vec::new();
    let mut dropped = 0usize;

    for log in effects.into_iter().flat_map(|e| e.encrypted_logs.iter()) {
        let Some(payload) = trial_decrypt(log, keys) else {
            dropped += 1;
            continue;
        };
        if payload.event_type_id != metadata.event_selector {
            dropped += 1;
            continue;
        }
        if payload.items.len() != metadata.field_count() {
            return Err(PxeError::ShapeMismatch {
                selector: metadata.event_selector,
                detail: format!(
                    "expected {} fields, got {}",
                    metadata.field_count(),
                    payload.items.len()
                ),
            });
        }
        events.push(DecodedEvent::new(
            metadata,
            Some(payload.contract_address),
            payload.items,
        ));
    }

    debug!(
        selector = %metadata.event_selector,
        decoded = events.len(),
        dropped,
        "Decoded encrypted events"
    );
    Ok(events)
}

pub fn decode_unencrypted_events(
    logs: &[ExtendedUnencryptedL2Log],
    metadata: &EventMetadata,
) -> Result<Vec<DecodedEvent>> {
    let expected_len = metadata.field_count() * Field::SIZE + Field::SIZE;
    let mut events = Vec::new();

    for extended in logs {
        let data = &extended.log.data;
        if data.len() < EventSelector::SIZE {
            continue;
        }
        let selector = EventSelector::from_bytes(&data[data.len() - EventSelector::SIZE..])
            .map_err(anyhow::Error::from)?;
        if selector != metadata.event_selector {
            continue;
        }
        if data.len() != expected_len {
            return Err(PxeError::ShapeMismatch {
                selector,
                detail: format!("expected {} bytes, got {}", expected_len, data.len()),
            });
        }

        let values = data[..metadata.field_count() * Field::SIZE]
            .chunks_exact(Field::SIZE)
            .map(Field::from_slice)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(anyhow::Error::from)?;
        events.push(DecodedEvent::new(
            metadata,
            Some(extended.log.contract_address),
            values,
        ));
    }

    Ok(events)
}
