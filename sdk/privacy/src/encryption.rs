//! Event Log Encryption
//!
//! Encrypts event payloads using ECDH + ChaCha20-Poly1305, readable both by
//! the recipient and by the sender.
//!
//! ```text
//! Flow:
//! 1. Sender generates ephemeral keypair (epk, esk)
//! 2. Shared secret = ECDH(esk, recipient_pk)
//! 3. Body key = KDF("zelana-event-in-v1", shared_secret || epk)
//! 4. Header key = KDF("zelana-event-out-v1", ovsk || epk)
//! 5. Body = ChaCha20-Poly1305(body key, payload)
//! 6. Header = ChaCha20-Poly1305(header key, esk || recipient_pk)
//! 7. Output = (epk, header, body)
//! ```
//!
//! The recipient opens the body directly ("incoming"). The sender opens the
//! header with its outgoing viewing secret, recovers the ephemeral secret and
//! recomputes the shared secret ("outgoing").

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::PrivacyError;
use crate::address::Address;
use crate::field::Field;
use crate::keys::Point;
use crate::selector::EventSelector;

const INCOMING_CONTEXT: &str = "zelana-event-in-v1";
const OUTGOING_CONTEXT: &str = "zelana-event-out-v1";

/// A nonce plus authenticated ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBox {
    pub nonce: [u8; 12],
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
}

/// An encrypted event log (published in a transaction effect)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEventLog {
    /// Ephemeral public key for ECDH
    pub ephemeral_pk: [u8; 32],
    /// Ephemeral secret and recipient, sealed for the sender
    pub outgoing_header: SealedBox,
    /// The event payload, sealed for the recipient
    pub body: SealedBox,
}

impl EncryptedEventLog {
    /// Fixed overhead: epk + 2 * (nonce + tag) + header plaintext
    pub const OVERHEAD: usize = 32 + 2 * (12 + 16) + 64;
}

/// Decrypted event log contents
///
/// ```text
/// contract_address (32) | event_type_id (4, BE) | items (32 each)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    pub contract_address: Address,
    pub event_type_id: EventSelector,
    pub items: Vec<Field>,
}

impl EventPayload {
    const HEADER_LEN: usize = Field::SIZE + EventSelector::SIZE;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::HEADER_LEN + self.items.len() * Field::SIZE);
        bytes.extend_from_slice(self.contract_address.0.as_bytes());
        bytes.extend_from_slice(&self.event_type_id.to_bytes());
        for item in &self.items {
            bytes.extend_from_slice(item.as_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PrivacyError> {
        if bytes.len() < Self::HEADER_LEN {
            return Err(PrivacyError::MalformedPayload(format!(
                "payload too short: {} bytes",
                bytes.len()
            )));
        }
        let body = &bytes[Self::HEADER_LEN..];
        if body.len() % Field::SIZE != 0 {
            return Err(PrivacyError::MalformedPayload(format!(
                "payload body of {} bytes is not a whole number of fields",
                body.len()
            )));
        }

        let contract_address = Address(Field::from_slice(&bytes[..Field::SIZE])?);
        let event_type_id = EventSelector::from_bytes(&bytes[Field::SIZE..Self::HEADER_LEN])?;
        let items = body
            .chunks_exact(Field::SIZE)
            .map(Field::from_slice)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            contract_address,
            event_type_id,
            items,
        })
    }
}

/// Encrypt an event for a recipient, readable later by the sender's `ovsk`
///
/// # Arguments
/// * `payload` - The event to encrypt
/// * `recipient_pk` - Recipient's X25519 public key
/// * `ovsk` - Sender's outgoing viewing secret
pub fn encrypt_event(
    payload: &EventPayload,
    recipient_pk: &Point,
    ovsk: &Field,
) -> Result<EncryptedEventLog, PrivacyError> {
    let mut rng = rand::thread_rng();
    let ephemeral_secret = StaticSecret::random_from_rng(&mut rng);
    let ephemeral_pk = PublicKey::from(&ephemeral_secret);

    let recipient_key = PublicKey::from(recipient_pk.0);
    let shared_secret = ephemeral_secret.diffie_hellman(&recipient_key);

    let body_key = derive_key(INCOMING_CONTEXT, shared_secret.as_bytes(), ephemeral_pk.as_bytes());
    let body = seal(&body_key, &payload.to_bytes(), &mut rng)?;

    let mut header_plaintext = Vec::with_capacity(64);
    header_plaintext.extend_from_slice(&ephemeral_secret.to_bytes());
    header_plaintext.extend_from_slice(&recipient_pk.0);
    let header_key = derive_key(OUTGOING_CONTEXT, ovsk.as_bytes(), ephemeral_pk.as_bytes());
    let outgoing_header = seal(&header_key, &header_plaintext, &mut rng)?;

    Ok(EncryptedEventLog {
        ephemeral_pk: *ephemeral_pk.as_bytes(),
        outgoing_header,
        body,
    })
}

/// Decrypt as the recipient
///
/// Returns None if the log was not addressed to `secret`.
pub fn decrypt_as_incoming(log: &EncryptedEventLog, secret: &Field) -> Option<EventPayload> {
    let secret = StaticSecret::from(secret.0);
    let shared_secret = secret.diffie_hellman(&PublicKey::from(log.ephemeral_pk));
    let body_key = derive_key(INCOMING_CONTEXT, shared_secret.as_bytes(), &log.ephemeral_pk);
    let plaintext = open(&body_key, &log.body)?;
    EventPayload::from_bytes(&plaintext).ok()
}

/// Decrypt as the sender
///
/// Returns None if the log was not sent under `ovsk`.
pub fn decrypt_as_outgoing(log: &EncryptedEventLog, ovsk: &Field) -> Option<EventPayload> {
    let header_key = derive_key(OUTGOING_CONTEXT, ovsk.as_bytes(), &log.ephemeral_pk);
    let header = open(&header_key, &log.outgoing_header)?;
    if header.len() != 64 {
        return None;
    }

    let esk: [u8; 32] = header[..32].try_into().ok()?;
    let recipient_pk: [u8; 32] = header[32..].try_into().ok()?;
    let shared_secret =
        StaticSecret::from(esk).diffie_hellman(&PublicKey::from(recipient_pk));

    let body_key = derive_key(INCOMING_CONTEXT, shared_secret.as_bytes(), &log.ephemeral_pk);
    let plaintext = open(&body_key, &log.body)?;
    EventPayload::from_bytes(&plaintext).ok()
}

fn derive_key(context: &str, secret: &[u8], ephemeral_pk: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(secret);
    hasher.update(ephemeral_pk);
    *hasher.finalize().as_bytes()
}

fn seal<R: RngCore>(
    key: &[u8; 32],
    plaintext: &[u8],
    rng: &mut R,
) -> Result<SealedBox, PrivacyError> {
    let mut nonce_bytes = [0u8; 12];
    rng.fill_bytes(&mut nonce_bytes);

    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| PrivacyError::Encryption)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| PrivacyError::Encryption)?;

    Ok(SealedBox {
        nonce: nonce_bytes,
        ciphertext,
    })
}

fn open(key: &[u8; 32], sealed: &SealedBox) -> Option<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new_from_slice(key).ok()?;
    cipher
        .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_slice())
        .ok()
}
