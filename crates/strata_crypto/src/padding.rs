//! Length-hiding padding, applied INSIDE the plaintext before the first
//! encryption layer so an observer only sees block-sized payloads.
//!
//! Format (block mode):
//!   [ pad_len: u32 LE | plaintext | pad_len random bytes ]
//!
//! The total is the smallest multiple of `block_size` that fits
//! `4 + plaintext + min_padding`. The pad length lives only in the encrypted
//! body, never in the envelope header.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Largest accepted block size and padding floor.
pub const MAX_BLOCK_SIZE: usize = 64 * 1024;

const LEN_PREFIX: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum PaddingMode {
    /// No padding: the plaintext goes to the first layer unchanged.
    None,
    /// Pad to the next multiple of `block_size`, adding at least
    /// `min_padding` random bytes.
    Block { block_size: usize, min_padding: usize },
}

impl Default for PaddingMode {
    fn default() -> Self {
        Self::Block {
            block_size: 64,
            min_padding: 8,
        }
    }
}

impl PaddingMode {
    pub fn validate(&self) -> Result<(), PaddingError> {
        match *self {
            Self::None => Ok(()),
            Self::Block {
                block_size,
                min_padding,
            } => {
                if block_size == 0 || block_size > MAX_BLOCK_SIZE {
                    return Err(PaddingError::InvalidConfig(format!(
                        "block size must be 1..={MAX_BLOCK_SIZE}, got {block_size}"
                    )));
                }
                if min_padding > MAX_BLOCK_SIZE {
                    return Err(PaddingError::InvalidConfig(format!(
                        "minimum padding must be at most {MAX_BLOCK_SIZE}, got {min_padding}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Size of the padded body for a plaintext of `len` bytes.
    pub fn padded_len(&self, len: usize) -> Result<usize, PaddingError> {
        match *self {
            Self::None => Ok(len),
            Self::Block {
                block_size,
                min_padding,
            } => {
                let needed = LEN_PREFIX
                    .checked_add(len)
                    .and_then(|n| n.checked_add(min_padding))
                    .ok_or(PaddingError::TooLarge)?;
                let padded = needed
                    .div_ceil(block_size)
                    .checked_mul(block_size)
                    .ok_or(PaddingError::TooLarge)?;
                if padded - LEN_PREFIX - len > u32::MAX as usize {
                    return Err(PaddingError::TooLarge);
                }
                Ok(padded)
            }
        }
    }
}

/// Pad `plaintext` according to `mode`.
pub fn pad(plaintext: &[u8], mode: &PaddingMode) -> Result<Zeroizing<Vec<u8>>, PaddingError> {
    mode.validate()?;
    let target = mode.padded_len(plaintext.len())?;
    if matches!(mode, PaddingMode::None) {
        return Ok(Zeroizing::new(plaintext.to_vec()));
    }

    let pad_len = target - LEN_PREFIX - plaintext.len();
    let mut out = Zeroizing::new(Vec::with_capacity(target));
    out.extend_from_slice(&(pad_len as u32).to_le_bytes());
    out.extend_from_slice(plaintext);
    // Random fill rather than zeros so the padding is not compressible.
    let start = out.len();
    out.resize(target, 0);
    rand::rngs::OsRng.fill_bytes(&mut out[start..]);
    Ok(out)
}

/// Validate and strip padding after decryption.
pub fn unpad(padded: &[u8], mode: &PaddingMode) -> Result<Zeroizing<Vec<u8>>, PaddingError> {
    let (block_size, min_padding) = match *mode {
        PaddingMode::None => return Ok(Zeroizing::new(padded.to_vec())),
        PaddingMode::Block {
            block_size,
            min_padding,
        } => (block_size, min_padding),
    };
    mode.validate()?;

    if padded.len() < LEN_PREFIX || padded.len() % block_size != 0 {
        return Err(PaddingError::Malformed);
    }
    let pad_len = u32::from_le_bytes([padded[0], padded[1], padded[2], padded[3]]) as usize;
    if pad_len < min_padding || pad_len > padded.len() - LEN_PREFIX {
        return Err(PaddingError::Malformed);
    }
    let end = padded.len() - pad_len;
    Ok(Zeroizing::new(padded[LEN_PREFIX..end].to_vec()))
}

#[derive(Debug, thiserror::Error)]
pub enum PaddingError {
    #[error("Invalid padding configuration: {0}")]
    InvalidConfig(String),
    #[error("Plaintext too large to pad")]
    TooLarge,
    #[error("Malformed padding")]
    Malformed,
}
