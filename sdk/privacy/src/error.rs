use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrivacyError {
    #[error("invalid field element length: expected 32 bytes, got {0}")]
    InvalidFieldLength(usize),

    #[error("invalid selector length: expected 4 bytes, got {0}")]
    InvalidSelectorLength(usize),

    #[error("malformed event payload: {0}")]
    MalformedPayload(String),

    #[error("encryption failed")]
    Encryption,
}
