//! strata_crypto: defense-in-depth symmetric encryption
//!
//! # Design principles
//! - NO custom primitives; everything comes from audited RustCrypto / dalek crates.
//! - Every key is derived, never used raw: layer keys, ratchet steps and
//!   exchange output all pass through HKDF with their own label.
//! - Zeroize all secret material on drop.
//! - Post-quantum operations go through the capability gate and fail loudly
//!   when no engine is loaded.
//!
//! # Module layout
//! - `cipher`      : two-layer cascade (AES-256-GCM, then ChaCha20-Poly1305)
//! - `envelope`    : versioned ciphertext wire format and its text form
//! - `padding`     : length-hiding block padding inside the encrypted body
//! - `kex`         : ephemeral X25519 key exchange
//! - `kdf`         : Argon2id / scrypt password KDF, HKDF-SHA256 for secrets
//! - `ratchet`     : per-message forward-secret session
//! - `capability`  : write-once gate for the optional post-quantum engine
//! - `pq`          : engine trait, classical / hybrid KEM, dual signatures
//! - `config`      : serde configuration
//! - `error`       : unified error type

pub mod capability;
pub mod cipher;
pub mod config;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod kex;
pub mod padding;
pub mod pq;
pub mod ratchet;

pub use capability::{
    capabilities, info, initialize, Capabilities, CapabilityFlags, CapabilityGate, CryptoInfo,
    PqCapability, PqOperation, UnavailableReason,
};
pub use cipher::CascadeCipher;
pub use config::{CipherConfig, PasswordKdfMode, PasswordKdfParams, StrataConfig};
pub use envelope::{Envelope, EnvelopeError};
pub use error::{CryptoError, ErrorKind, Result};
pub use kdf::{derive_from_password, derive_from_secret, generate_salt, DerivedKey, KdfAlgorithm, PasswordKdf, SecretKey};
pub use kex::{KeyExchange, KeyPair, RawSharedSecret};
pub use padding::PaddingMode;
pub use pq::{ClassicalKem, DualSigner, HybridKem, KeyEncapsulation, PostQuantumEngine};
pub use ratchet::{RatchetSession, SessionRole};
