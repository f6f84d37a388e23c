//! Cascading AEAD.
//!
//! Two independent layers under keys derived from one `SecretKey`:
//!   layer 1: AES-256-GCM over the (padded) plaintext, nonce_outer
//!   layer 2: ChaCha20-Poly1305 over layer 1's ciphertext + tag, nonce_inner
//!
//! Both layers authenticate `version || padding tag || aad`, so the envelope
//! header, the padding mode and the caller's context are bound to the
//! ciphertext. Breaking one primitive leaves the other intact.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm,
};
use chacha20poly1305::ChaCha20Poly1305;
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, Zeroizing};

use crate::{
    config::CipherConfig,
    envelope::{Envelope, ENVELOPE_VERSION, NONCE_LEN},
    error::{CryptoError, Result},
    kdf::{self, SecretKey},
    padding::{self, PaddingMode},
};

const CASCADE_SALT: &[u8] = b"strata/cascade/v1";
const LAYER_1_INFO: &[u8] = b"layer-1";
const LAYER_2_INFO: &[u8] = b"layer-2";

pub struct CascadeCipher {
    layer1: SecretKey,
    layer2: SecretKey,
    config: CipherConfig,
}

impl CascadeCipher {
    /// Cipher with the default configuration (64-byte block padding).
    pub fn new(key: &SecretKey) -> Result<Self> {
        Self::with_config(key, CipherConfig::default())
    }

    pub fn with_config(key: &SecretKey, config: CipherConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            layer1: kdf::expand_key(key.as_bytes(), CASCADE_SALT, LAYER_1_INFO)?,
            layer2: kdf::expand_key(key.as_bytes(), CASCADE_SALT, LAYER_2_INFO)?,
            config,
        })
    }

    pub fn config(&self) -> &CipherConfig {
        &self.config
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Envelope> {
        self.encrypt_with_aad(plaintext, &[])
    }

    pub fn encrypt_with_aad(&self, plaintext: &[u8], aad: &[u8]) -> Result<Envelope> {
        let body = padding::pad(plaintext, &self.config.padding)
            .map_err(|e| CryptoError::invalid_input(e.to_string()))?;

        let mut nonce_outer = [0u8; NONCE_LEN];
        let mut nonce_inner = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_outer);
        OsRng.fill_bytes(&mut nonce_inner);

        let ad = bound_aad(ENVELOPE_VERSION, &self.config.padding, aad);

        let outer = Aes256Gcm::new_from_slice(self.layer1.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;
        let layer1 = outer
            .encrypt(
                aes_gcm::Nonce::from_slice(&nonce_outer),
                Payload { msg: &body, aad: &ad },
            )
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let inner = ChaCha20Poly1305::new_from_slice(self.layer2.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;
        let layer2 = inner
            .encrypt(
                chacha20poly1305::Nonce::from_slice(&nonce_inner),
                Payload { msg: &layer1, aad: &ad },
            )
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(Envelope::new(nonce_outer, nonce_inner, layer2))
    }

    /// Parse and open wire bytes.
    pub fn decrypt(&self, envelope: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.decrypt_with_aad(envelope, &[])
    }

    pub fn decrypt_with_aad(&self, envelope: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let envelope = Envelope::from_bytes(envelope).map_err(|_| {
            tracing::debug!("rejected envelope");
            CryptoError::DecryptionFailed
        })?;
        self.open(&envelope, aad)
    }

    /// Open an already-parsed envelope.
    pub fn open(&self, envelope: &Envelope, aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let ad = bound_aad(envelope.version, &self.config.padding, aad);

        let inner = ChaCha20Poly1305::new_from_slice(self.layer2.as_bytes())
            .map_err(|_| CryptoError::DecryptionFailed)?;
        let layer1 = Zeroizing::new(
            inner
                .decrypt(
                    chacha20poly1305::Nonce::from_slice(&envelope.nonce_inner),
                    Payload {
                        msg: &envelope.payload,
                        aad: &ad,
                    },
                )
                .map_err(|_| CryptoError::DecryptionFailed)?,
        );

        let outer = Aes256Gcm::new_from_slice(self.layer1.as_bytes())
            .map_err(|_| CryptoError::DecryptionFailed)?;
        let body = Zeroizing::new(
            outer
                .decrypt(
                    aes_gcm::Nonce::from_slice(&envelope.nonce_outer),
                    Payload { msg: &layer1, aad: &ad },
                )
                .map_err(|_| CryptoError::DecryptionFailed)?,
        );

        padding::unpad(&body, &self.config.padding).map_err(|_| CryptoError::DecryptionFailed)
    }

    /// UTF-8 in, envelope text out.
    pub fn encrypt_string(&self, plaintext: &str) -> Result<String> {
        Ok(self.encrypt(plaintext.as_bytes())?.to_text())
    }

    /// Envelope text in, UTF-8 out. Bad encoding and non-UTF-8 plaintext are
    /// both reported as `DecryptionFailed`.
    pub fn decrypt_string(&self, text: &str) -> Result<Zeroizing<String>> {
        let envelope = Envelope::from_text(text).map_err(|_| {
            tracing::debug!("rejected envelope");
            CryptoError::DecryptionFailed
        })?;
        let mut bytes = self.open(&envelope, &[])?;
        match String::from_utf8(std::mem::take(&mut *bytes)) {
            Ok(s) => Ok(Zeroizing::new(s)),
            Err(e) => {
                e.into_bytes().zeroize();
                Err(CryptoError::DecryptionFailed)
            }
        }
    }
}

/// `version || padding tag || aad`. The tag is `0x00` for no padding and
/// `0x01 || block_size (u64 BE) || min_padding (u64 BE)` for block padding.
fn bound_aad(version: u8, padding: &PaddingMode, aad: &[u8]) -> Vec<u8> {
    let mut ad = Vec::with_capacity(18 + aad.len());
    ad.push(version);
    match *padding {
        PaddingMode::None => ad.push(0x00),
        PaddingMode::Block {
            block_size,
            min_padding,
        } => {
            ad.push(0x01);
            ad.extend_from_slice(&(block_size as u64).to_be_bytes());
            ad.extend_from_slice(&(min_padding as u64).to_be_bytes());
        }
    }
    ad.extend_from_slice(aad);
    ad
}

impl fmt::Debug for CascadeCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CascadeCipher")
            .field("keys", &"<redacted>")
            .field("config", &self.config)
            .finish()
    }
}
