//! Zelana Privacy SDK
//!
//! Primitives shared by the private execution environment and its
//! collaborators: field elements, domain-separated Poseidon derivations,
//! account keys and addresses, selectors and event-log encryption.
//!
//! # Note hash chain
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  inner hash  │──▶│ unique hash  │──▶│ siloed hash  │──▶ note hash tree
//! │ slot,type,.. │   │ nonce, inner │   │ contract, .. │
//! └──────────────┘   └──────────────┘   └──────────────┘
//!                           │
//!                           ▼
//!                    inner nullifier ──▶ siloed nullifier ──▶ nullifier tree
//! ```

pub mod address;
pub mod encryption;
pub mod error;
pub mod field;
pub mod hash;
pub mod keys;
pub mod selector;

pub use address::{Address, CompleteAddress, address_encryption_key};
pub use encryption::{
    EncryptedEventLog, EventPayload, SealedBox, decrypt_as_incoming, decrypt_as_outgoing,
    encrypt_event,
};
pub use error::PrivacyError;
pub use field::Field;
pub use hash::{
    compute_address_secret, compute_inner_nullifier, compute_note_hash, compute_note_hash_nonce,
    compute_unique_note_hash, hash_to_field, poseidon_hash, silo_note_hash, silo_nullifier,
};
pub use keys::{KeyPrefix, MasterSecretKeys, Point, PublicKeys, derive_master_keys, public_key_for};
pub use selector::{EventSelector, FunctionSelector};
