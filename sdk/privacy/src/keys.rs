//! Account Keys
//!
//! Every account derives four master secrets from one secret key. The
//! public half of each is an X25519 point so that viewing secrets can be
//! used directly for event-log ECDH.
//!
//! ```text
//! sk_m(prefix) = H(MASTER_KEY, secret_key, prefix_tag)
//! pk_m(prefix) = X25519(sk_m(prefix))
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::field::Field;
use crate::hash::{domain, poseidon_hash};

/// Key class, identified by the prefix of its name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyPrefix {
    /// "n"
    Nullifier,
    /// "iv" (address-derived when used for decryption)
    IncomingViewing,
    /// "ov"
    OutgoingViewing,
    /// "t"
    Tagging,
}

impl KeyPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyPrefix::Nullifier => "n",
            KeyPrefix::IncomingViewing => "iv",
            KeyPrefix::OutgoingViewing => "ov",
            KeyPrefix::Tagging => "t",
        }
    }

    fn tag(&self) -> Field {
        match self {
            KeyPrefix::Nullifier => Field::from_u64(1),
            KeyPrefix::IncomingViewing => Field::from_u64(2),
            KeyPrefix::OutgoingViewing => Field::from_u64(3),
            KeyPrefix::Tagging => Field::from_u64(4),
        }
    }
}

impl fmt::Display for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An X25519 public key (Montgomery u-coordinate)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Point(#[serde(with = "hex::serde")] pub [u8; 32]);

impl Point {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The point as a field element (for hashing)
    pub fn to_field(&self) -> Field {
        Field::from_be_bytes_mod_order(&self.0)
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point(0x{})", hex::encode(self.0))
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Public key for a secret field element
pub fn public_key_for(secret: &Field) -> Point {
    let secret = StaticSecret::from(secret.0);
    Point(PublicKey::from(&secret).to_bytes())
}

/// Master secret keys of one account
#[derive(Clone)]
pub struct MasterSecretKeys {
    pub nullifier: Field,
    pub incoming_viewing: Field,
    pub outgoing_viewing: Field,
    pub tagging: Field,
}

impl MasterSecretKeys {
    pub fn get(&self, prefix: KeyPrefix) -> Field {
        match prefix {
            KeyPrefix::Nullifier => self.nullifier,
            KeyPrefix::IncomingViewing => self.incoming_viewing,
            KeyPrefix::OutgoingViewing => self.outgoing_viewing,
            KeyPrefix::Tagging => self.tagging,
        }
    }

    pub fn public_keys(&self) -> PublicKeys {
        PublicKeys {
            npk_m: public_key_for(&self.nullifier),
            ivpk_m: public_key_for(&self.incoming_viewing),
            ovpk_m: public_key_for(&self.outgoing_viewing),
            tpk_m: public_key_for(&self.tagging),
        }
    }
}

impl fmt::Debug for MasterSecretKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecretKeys([REDACTED])")
    }
}

/// Derive all master secret keys from an account secret key
pub fn derive_master_keys(secret_key: &Field) -> MasterSecretKeys {
    let derive = |prefix: KeyPrefix| {
        poseidon_hash(domain::MASTER_KEY, &[*secret_key, prefix.tag()])
    };
    MasterSecretKeys {
        nullifier: derive(KeyPrefix::Nullifier),
        incoming_viewing: derive(KeyPrefix::IncomingViewing),
        outgoing_viewing: derive(KeyPrefix::OutgoingViewing),
        tagging: derive(KeyPrefix::Tagging),
    }
}

/// Master public keys of one account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PublicKeys {
    pub npk_m: Point,
    pub ivpk_m: Point,
    pub ovpk_m: Point,
    pub tpk_m: Point,
}

impl PublicKeys {
    pub fn hash(&self) -> Field {
        poseidon_hash(
            domain::PUBLIC_KEYS,
            &[
                self.npk_m.to_field(),
                self.ivpk_m.to_field(),
                self.ovpk_m.to_field(),
                self.tpk_m.to_field(),
            ],
        )
    }

    pub fn get(&self, prefix: KeyPrefix) -> Point {
        match prefix {
            KeyPrefix::Nullifier => self.npk_m,
            KeyPrefix::IncomingViewing => self.ivpk_m,
            KeyPrefix::OutgoingViewing => self.ovpk_m,
            KeyPrefix::Tagging => self.tpk_m,
        }
    }
}
