//! Function and event selectors
//!
//! A selector is the first 4 bytes of `blake3(signature)`, read big-endian.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::PrivacyError;
use crate::field::Field;

fn selector_from_signature(signature: &str) -> u32 {
    let digest = blake3::hash(signature.as_bytes());
    let bytes = digest.as_bytes();
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct FunctionSelector(pub u32);

impl FunctionSelector {
    pub fn from_signature(signature: &str) -> Self {
        Self(selector_from_signature(signature))
    }

    /// `name(T1,T2,...)`
    pub fn from_name_and_parameters<S: AsRef<str>>(name: &str, parameter_types: &[S]) -> Self {
        let params: Vec<&str> = parameter_types.iter().map(|p| p.as_ref()).collect();
        Self::from_signature(&format!("{}({})", name, params.join(",")))
    }

    pub fn to_field(&self) -> Field {
        Field::from_u64(self.0 as u64)
    }
}

impl fmt::Display for FunctionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl fmt::Debug for FunctionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionSelector(0x{:08x})", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct EventSelector(pub u32);

impl EventSelector {
    pub const SIZE: usize = 4;

    pub fn from_signature(signature: &str) -> Self {
        Self(selector_from_signature(signature))
    }

    /// Parse 4 big-endian bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PrivacyError> {
        let arr: [u8; 4] = bytes
            .try_into()
            .map_err(|_| PrivacyError::InvalidSelectorLength(bytes.len()))?;
        Ok(Self(u32::from_be_bytes(arr)))
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn to_field(&self) -> Field {
        Field::from_u64(self.0 as u64)
    }
}

impl fmt::Display for EventSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl fmt::Debug for EventSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventSelector(0x{:08x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_and_parameters_matches_signature() {
        assert_eq!(
            FunctionSelector::from_name_and_parameters("transfer", &["Field", "u64"]),
            FunctionSelector::from_signature("transfer(Field,u64)")
        );
    }

    #[test]
    fn test_event_selector_bytes() {
        let selector = EventSelector::from_signature("Transfer(Field,Field,u64)");
        let parsed = EventSelector::from_bytes(&selector.to_bytes()).unwrap();
        assert_eq!(parsed, selector);
        assert!(EventSelector::from_bytes(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_display_is_padded_hex() {
        assert_eq!(EventSelector(0x0a).to_string(), "0x0000000a");
    }
}
