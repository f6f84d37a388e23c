use thiserror::Error;

use crate::capability::PqOperation;

pub type Result<T, E = CryptoError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed")]
    EncryptionFailed,

    /// Single outcome for every rejected envelope: malformed header, unknown
    /// version, either layer's tag, or bad padding.
    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Signature verification failed")]
    SignatureVerification,

    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(PqOperation),

    #[error("Post-quantum engine error: {0}")]
    Engine(String),

    #[error("Session message counter exhausted")]
    CounterExhausted,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification callers can branch on without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad caller input, rejected before any cryptographic work. Safe to retry
    /// once the input is corrected.
    Validation,
    /// Authentication failure. Never retried, never partially satisfied.
    Authentication,
    /// A post-quantum operation was requested without a loaded engine.
    CapabilityUnavailable,
    /// Failure inside a primitive or the engine.
    Internal,
}

impl CryptoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_)
            | Self::InvalidKey(_)
            | Self::Config(_)
            | Self::Serialisation(_)
            | Self::Io(_) => ErrorKind::Validation,
            Self::DecryptionFailed | Self::SignatureVerification => ErrorKind::Authentication,
            Self::CapabilityUnavailable(_) => ErrorKind::CapabilityUnavailable,
            Self::KeyDerivation(_)
            | Self::EncryptionFailed
            | Self::Engine(_)
            | Self::CounterExhausted => ErrorKind::Internal,
        }
    }

    pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
