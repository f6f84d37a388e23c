//! Tunable parameters. Every struct has a `Default` suitable for interactive
//! desktop use and can be loaded from JSON; missing fields take defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    error::{CryptoError, Result},
    kdf::{SALT_MAX_LEN, SALT_MIN_LEN},
    padding::PaddingMode,
};

/// Ceiling on the memory a password KDF may be asked to use. Costs travel
/// with sealed data, so they are checked before any allocation.
pub const MAX_KDF_MEMORY_BYTES: u64 = 4 * 1024 * 1024 * 1024;
pub const MAX_ARGON2_MEMORY_KIB: u32 = 4 * 1024 * 1024;
pub const MAX_ARGON2_ITERATIONS: u32 = 64;
pub const MAX_ARGON2_PARALLELISM: u32 = 16;
pub const MAX_SCRYPT_LOG_N: u8 = 22;
pub const MAX_SCRYPT_R: u32 = 32;
pub const MAX_SCRYPT_P: u32 = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherConfig {
    #[serde(default)]
    pub padding: PaddingMode,
}

impl CipherConfig {
    /// Configuration with length hiding switched off.
    pub fn unpadded() -> Self {
        Self {
            padding: PaddingMode::None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.padding
            .validate()
            .map_err(|e| CryptoError::Config(e.to_string()))
    }
}

/// Which password KDF to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordKdfMode {
    /// Argon2id when compiled in, scrypt otherwise.
    #[default]
    Auto,
    Argon2id,
    Scrypt,
}

/// Argon2id cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argon2Cost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for Argon2Cost {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024, // 64 MiB
            iterations: 3,
            parallelism: 1,
        }
    }
}

/// scrypt cost: `N = 2^log_n` (CPU/memory), `r` (block size), `p` (parallelism).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScryptCost {
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl Default for ScryptCost {
    fn default() -> Self {
        Self {
            log_n: 15,
            r: 8,
            p: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordKdfParams {
    #[serde(default)]
    pub mode: PasswordKdfMode,
    #[serde(default)]
    pub argon2: Argon2Cost,
    #[serde(default)]
    pub scrypt: ScryptCost,
    #[serde(default = "default_salt_len")]
    pub salt_len: usize,
}

fn default_salt_len() -> usize {
    16
}

impl Default for PasswordKdfParams {
    fn default() -> Self {
        Self {
            mode: PasswordKdfMode::default(),
            argon2: Argon2Cost::default(),
            scrypt: ScryptCost::default(),
            salt_len: default_salt_len(),
        }
    }
}

impl PasswordKdfParams {
    /// Cheap parameters for tests and tooling. Not for real passwords.
    pub fn insecure_fast() -> Self {
        Self {
            mode: PasswordKdfMode::Auto,
            argon2: Argon2Cost {
                memory_kib: 64,
                iterations: 1,
                parallelism: 1,
            },
            scrypt: ScryptCost {
                log_n: 4,
                r: 8,
                p: 1,
            },
            salt_len: default_salt_len(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(SALT_MIN_LEN..=SALT_MAX_LEN).contains(&self.salt_len) {
            return Err(CryptoError::Config(format!(
                "salt_len must be {SALT_MIN_LEN}..={SALT_MAX_LEN}, got {}",
                self.salt_len
            )));
        }
        let a = &self.argon2;
        if a.iterations == 0
            || a.parallelism == 0
            || a.iterations > MAX_ARGON2_ITERATIONS
            || a.parallelism > MAX_ARGON2_PARALLELISM
            || a.memory_kib > MAX_ARGON2_MEMORY_KIB
            || a.memory_kib < 8 * a.parallelism
        {
            return Err(CryptoError::Config(format!(
                "argon2 cost out of range (m={} KiB, t={}, p={})",
                a.memory_kib, a.iterations, a.parallelism
            )));
        }
        let s = &self.scrypt;
        let scrypt_memory = (128 * u64::from(s.r)) << u32::from(s.log_n.min(MAX_SCRYPT_LOG_N));
        if s.log_n == 0
            || s.r == 0
            || s.p == 0
            || s.log_n > MAX_SCRYPT_LOG_N
            || s.r > MAX_SCRYPT_R
            || s.p > MAX_SCRYPT_P
            || scrypt_memory > MAX_KDF_MEMORY_BYTES
        {
            return Err(CryptoError::Config(format!(
                "scrypt cost out of range (log_n={}, r={}, p={})",
                s.log_n, s.r, s.p
            )));
        }
        Ok(())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrataConfig {
    #[serde(default)]
    pub cipher: CipherConfig,
    #[serde(default)]
    pub password_kdf: PasswordKdfParams,
}

impl StrataConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.cipher.validate()?;
        self.password_kdf.validate()
    }
}
