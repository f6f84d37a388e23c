//! Key derivation functions
//!
//! `derive_from_password`: Argon2id (memory-hard), falling back to scrypt
//!   when the `argon2` feature is disabled. Salt is generated when omitted and
//!   always returned so it can be stored next to the ciphertext.
//!
//! `derive_from_secret`: HKDF-SHA256 extract-and-expand for already-random
//!   input (key exchange output). `info` gives domain separation.
//!
//! Every argument is validated before any derivation work begins.

use std::fmt;

use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{
    config::{Argon2Cost, PasswordKdfMode, PasswordKdfParams, ScryptCost},
    error::{CryptoError, Result},
};

pub const KEY_LEN: usize = 32;
pub const SALT_MIN_LEN: usize = 16;
pub const SALT_MAX_LEN: usize = 64;
/// RFC 5869 limit for SHA-256: 255 * HashLen.
pub const HKDF_MAX_OUTPUT_LEN: usize = 255 * 32;
pub const PASSWORD_MAX_OUTPUT_LEN: usize = 1024;
/// Argon2 refuses outputs shorter than this.
const ARGON2_MIN_OUTPUT_LEN: usize = 4;

// ── Key material ──────────────────────────────────────────────────────────────

/// 32-byte symmetric key. Zeroized on drop, redacted in `Debug`.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("expected {KEY_LEN}-byte key, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    /// Fresh random key from the OS RNG.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

// ── Algorithms ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordKdf {
    Argon2id,
    Scrypt,
}

impl PasswordKdf {
    /// Argon2id if compiled in, scrypt otherwise.
    pub fn preferred() -> Self {
        if cfg!(feature = "argon2") {
            Self::Argon2id
        } else {
            Self::Scrypt
        }
    }

    pub fn is_available(self) -> bool {
        match self {
            Self::Argon2id => cfg!(feature = "argon2"),
            Self::Scrypt => true,
        }
    }

    pub fn is_memory_hard(self) -> bool {
        matches!(self, Self::Argon2id)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Argon2id => "Argon2id",
            Self::Scrypt => "scrypt",
        }
    }

    fn resolve(mode: PasswordKdfMode) -> Result<Self> {
        let kdf = match mode {
            PasswordKdfMode::Auto => Self::preferred(),
            PasswordKdfMode::Argon2id => Self::Argon2id,
            PasswordKdfMode::Scrypt => Self::Scrypt,
        };
        if !kdf.is_available() {
            return Err(CryptoError::invalid_input(format!(
                "{} is not compiled into this build",
                kdf.name()
            )));
        }
        Ok(kdf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KdfAlgorithm {
    Password(PasswordKdf),
    HkdfSha256,
}

impl KdfAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            Self::Password(kdf) => kdf.name(),
            Self::HkdfSha256 => "HKDF-SHA256",
        }
    }
}

// ── Derived output ───────────────────────────────────────────────────────────

/// Result of a derivation: the key, the salt actually used, and which
/// algorithm produced it.
pub struct DerivedKey {
    key: Zeroizing<Vec<u8>>,
    salt: Vec<u8>,
    algorithm: KdfAlgorithm,
}

impl DerivedKey {
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn algorithm(&self) -> KdfAlgorithm {
        self.algorithm
    }

    /// Convert a 32-byte derivation into cipher key material.
    pub fn to_secret_key(&self) -> Result<SecretKey> {
        SecretKey::from_slice(&self.key)
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &format_args!("<{} bytes redacted>", self.key.len()))
            .field("salt", &hex::encode(&self.salt))
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

// ── Password-based ───────────────────────────────────────────────────────────

/// Derive `len` bytes from a password.
///
/// `salt` of `None` draws `params.salt_len` random bytes. Supplied salts must
/// be `SALT_MIN_LEN..=SALT_MAX_LEN` bytes.
pub fn derive_from_password(
    password: &str,
    salt: Option<&[u8]>,
    len: usize,
    params: &PasswordKdfParams,
) -> Result<DerivedKey> {
    if password.is_empty() {
        return Err(CryptoError::invalid_input("password must not be empty"));
    }
    if len == 0 || len > PASSWORD_MAX_OUTPUT_LEN {
        return Err(CryptoError::invalid_input(format!(
            "output length must be 1..={PASSWORD_MAX_OUTPUT_LEN}, got {len}"
        )));
    }
    if let Some(salt) = salt {
        if !(SALT_MIN_LEN..=SALT_MAX_LEN).contains(&salt.len()) {
            return Err(CryptoError::invalid_input(format!(
                "salt must be {SALT_MIN_LEN}..={SALT_MAX_LEN} bytes, got {}",
                salt.len()
            )));
        }
    }
    params.validate()?;
    let kdf = PasswordKdf::resolve(params.mode)?;
    if kdf == PasswordKdf::Argon2id && len < ARGON2_MIN_OUTPUT_LEN {
        return Err(CryptoError::invalid_input(format!(
            "Argon2id output must be at least {ARGON2_MIN_OUTPUT_LEN} bytes"
        )));
    }

    let salt = match salt {
        Some(s) => s.to_vec(),
        None => generate_salt(params.salt_len),
    };
    let mut key = Zeroizing::new(vec![0u8; len]);
    match kdf {
        PasswordKdf::Argon2id => argon2_into(password.as_bytes(), &salt, &params.argon2, &mut key)?,
        PasswordKdf::Scrypt => scrypt_into(password.as_bytes(), &salt, &params.scrypt, &mut key)?,
    }
    tracing::debug!(kdf = kdf.name(), len, "derived key from password");

    Ok(DerivedKey {
        key,
        salt,
        algorithm: KdfAlgorithm::Password(kdf),
    })
}

#[cfg(feature = "argon2")]
fn argon2_into(password: &[u8], salt: &[u8], cost: &Argon2Cost, output: &mut [u8]) -> Result<()> {
    use argon2::{Algorithm, Argon2, Params, Version};

    let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, Some(output.len()))
        .map_err(|e| CryptoError::invalid_input(format!("argon2 params: {e}")))?;
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(password, salt, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

#[cfg(not(feature = "argon2"))]
fn argon2_into(_password: &[u8], _salt: &[u8], _cost: &Argon2Cost, _output: &mut [u8]) -> Result<()> {
    Err(CryptoError::invalid_input("Argon2id is not compiled into this build"))
}

fn scrypt_into(password: &[u8], salt: &[u8], cost: &ScryptCost, output: &mut [u8]) -> Result<()> {
    // The params length only matters for PHC hash strings; the raw output
    // length comes from `output`.
    let params = scrypt::Params::new(cost.log_n, cost.r, cost.p, KEY_LEN)
        .map_err(|e| CryptoError::invalid_input(format!("scrypt params: {e}")))?;
    scrypt::scrypt(password, salt, &params, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// Fresh random salt from the OS RNG.
pub fn generate_salt(len: usize) -> Vec<u8> {
    let mut salt = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

// ── Raw-secret (HKDF-SHA256) ─────────────────────────────────────────────────

/// Derive `len` bytes from an already-random secret.
///
/// `salt` of `None` uses the RFC 5869 zero salt and the returned salt is
/// empty. An explicitly empty salt is rejected as malformed.
pub fn derive_from_secret(
    secret: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    len: usize,
) -> Result<DerivedKey> {
    if secret.is_empty() {
        return Err(CryptoError::invalid_input("secret must not be empty"));
    }
    if len == 0 || len > HKDF_MAX_OUTPUT_LEN {
        return Err(CryptoError::invalid_input(format!(
            "output length must be 1..={HKDF_MAX_OUTPUT_LEN}, got {len}"
        )));
    }
    if matches!(salt, Some(s) if s.is_empty()) {
        return Err(CryptoError::invalid_input("salt, when given, must not be empty"));
    }

    let mut key = Zeroizing::new(vec![0u8; len]);
    hkdf_expand(secret, salt, info, &mut key)?;
    Ok(DerivedKey {
        key,
        salt: salt.map(<[u8]>::to_vec).unwrap_or_default(),
        algorithm: KdfAlgorithm::HkdfSha256,
    })
}

/// Expand `ikm` + `info` into `output.len()` bytes of key material.
pub fn hkdf_expand(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output: &mut [u8],
) -> Result<()> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// Fixed-size, domain-separated derivation used for internal keys
/// (cascade layers, ratchet steps, exchange output).
pub(crate) fn expand_key(ikm: &[u8], salt: &[u8], label: &[u8]) -> Result<SecretKey> {
    let mut key = [0u8; KEY_LEN];
    hkdf_expand(ikm, Some(salt), label, &mut key)?;
    let out = SecretKey::from_bytes(key);
    key.zeroize();
    Ok(out)
}
