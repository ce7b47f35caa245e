//! Field Elements
//!
//! Every hash, key, address and note item handled by the PXE is an element of
//! the BLS12-381 scalar field, carried around as 32 big-endian bytes.

use std::fmt;

use ark_bls12_381::Fr;
use ark_ff::{BigInteger, PrimeField};
use serde::{Deserialize, Serialize};

use crate::PrivacyError;

/// A field element (32 bytes, big-endian)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Field(#[serde(with = "hex::serde")] pub [u8; 32]);

impl Field {
    /// The zero sentinel (padding slots, "no nullifier")
    pub const ZERO: Self = Self([0u8; 32]);

    pub const SIZE: usize = 32;

    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    /// Create from an arkworks field element
    pub fn from_fr(f: Fr) -> Self {
        let bytes = f.into_bigint().to_bytes_be();
        let mut arr = [0u8; 32];
        arr[32 - bytes.len()..].copy_from_slice(&bytes);
        Self(arr)
    }

    /// Convert to an arkworks field element (reduces non-canonical encodings)
    pub fn to_fr(&self) -> Fr {
        Fr::from_be_bytes_mod_order(&self.0)
    }

    /// Reduce arbitrary bytes into the field
    pub fn from_be_bytes_mod_order(bytes: &[u8]) -> Self {
        Self::from_fr(Fr::from_be_bytes_mod_order(bytes))
    }

    /// Parse exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, PrivacyError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| PrivacyError::InvalidFieldLength(bytes.len()))?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Low 64 bits, for fields known to hold small integers
    pub fn to_u64(&self) -> u64 {
        let mut low = [0u8; 8];
        low.copy_from_slice(&self.0[24..]);
        u64::from_be_bytes(low)
    }
}

impl From<u64> for Field {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl AsRef<[u8]> for Field {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field(0x{})", hex::encode(self.0))
    }
}
