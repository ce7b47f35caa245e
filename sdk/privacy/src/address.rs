//! Addresses
//!
//! ```text
//! preaddress    = H(PREADDRESS, public_keys_hash, partial_address)
//! address       = H(ADDRESS, preaddress, ivpk_m)
//! address_point = H(ADDRESS_POINT, address)
//! ```
//!
//! Notes record their owner by address point; event logs addressed to an
//! account are encrypted to the public key of its address secret.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::field::Field;
use crate::hash::{compute_address_secret, domain, poseidon_hash};
use crate::keys::{Point, PublicKeys, public_key_for};

/// An account or contract address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address(pub Field);

impl Address {
    pub const ZERO: Self = Self(Field::ZERO);

    pub fn to_field(&self) -> Field {
        self.0
    }

    /// Owner tag stored in note records
    pub fn to_address_point(&self) -> Field {
        poseidon_hash(domain::ADDRESS_POINT, &[self.0])
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<Field> for Address {
    fn from(field: Field) -> Self {
        Self(field)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

/// Address together with the material it was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteAddress {
    pub address: Address,
    pub public_keys: PublicKeys,
    pub partial_address: Field,
}

impl CompleteAddress {
    pub fn new(public_keys: PublicKeys, partial_address: Field) -> Self {
        let preaddress = compute_preaddress(&public_keys, partial_address);
        let address = poseidon_hash(
            domain::ADDRESS,
            &[preaddress, public_keys.ivpk_m.to_field()],
        );
        Self {
            address: Address(address),
            public_keys,
            partial_address,
        }
    }

    pub fn preaddress(&self) -> Field {
        compute_preaddress(&self.public_keys, self.partial_address)
    }

    /// Consistency check of the stored address against its inputs
    pub fn is_valid(&self) -> bool {
        Self::new(self.public_keys, self.partial_address).address == self.address
    }
}

fn compute_preaddress(public_keys: &PublicKeys, partial_address: Field) -> Field {
    poseidon_hash(domain::PREADDRESS, &[public_keys.hash(), partial_address])
}

/// Public key event senders encrypt to for this account
pub fn address_encryption_key(preaddress: Field, ivsk_m: Field) -> Point {
    public_key_for(&compute_address_secret(preaddress, ivsk_m))
}
