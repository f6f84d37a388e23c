//! Password-sealed blob printed by `strata encrypt` and read by `strata decrypt`.
//!
//! Everything needed to re-derive the key travels with the ciphertext: the KDF
//! that ran, its cost, the salt and the padding mode. Only the password is
//! secret.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use strata_crypto::{
    derive_from_password, CascadeCipher, CipherConfig, CryptoError, Envelope, KdfAlgorithm,
    PaddingMode, PasswordKdf, PasswordKdfMode, PasswordKdfParams, StrataConfig,
};
use zeroize::Zeroizing;

pub const SEALED_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordSealed {
    pub version: u32,
    pub kdf: PasswordKdf,
    pub params: PasswordKdfParams,
    pub padding: PaddingMode,
    /// URL-safe base64, no padding.
    pub salt: String,
    /// Envelope text form.
    pub envelope: String,
}

pub fn seal(password: &str, plaintext: &[u8], config: &StrataConfig) -> Result<PasswordSealed> {
    let derived = derive_from_password(password, None, 32, &config.password_kdf)?;
    let kdf = match derived.algorithm() {
        KdfAlgorithm::Password(kdf) => kdf,
        other => return Err(anyhow!("unexpected KDF {}", other.name())),
    };
    let cipher = CascadeCipher::with_config(&derived.to_secret_key()?, config.cipher.clone())?;
    let envelope = cipher.encrypt(plaintext)?;
    tracing::debug!(kdf = kdf.name(), "sealed payload");

    let mut params = config.password_kdf.clone();
    params.mode = match kdf {
        PasswordKdf::Argon2id => PasswordKdfMode::Argon2id,
        PasswordKdf::Scrypt => PasswordKdfMode::Scrypt,
    };
    Ok(PasswordSealed {
        version: SEALED_VERSION,
        kdf,
        params,
        padding: config.cipher.padding,
        salt: URL_SAFE_NO_PAD.encode(derived.salt()),
        envelope: envelope.to_text(),
    })
}

pub fn open(password: &str, sealed: &PasswordSealed) -> Result<Zeroizing<Vec<u8>>> {
    if sealed.version != SEALED_VERSION {
        return Err(anyhow!("unsupported sealed version {}", sealed.version));
    }
    let salt = URL_SAFE_NO_PAD
        .decode(sealed.salt.trim())
        .context("salt is not valid base64")?;
    let derived = derive_from_password(password, Some(salt.as_slice()), 32, &sealed.params)?;
    if derived.algorithm() != KdfAlgorithm::Password(sealed.kdf) {
        return Err(anyhow!("sealed KDF {} does not match parameters", sealed.kdf.name()));
    }
    let cipher = CascadeCipher::with_config(
        &derived.to_secret_key()?,
        CipherConfig {
            padding: sealed.padding,
        },
    )?;
    let envelope =
        Envelope::from_text(&sealed.envelope).map_err(|_| CryptoError::DecryptionFailed)?;
    Ok(cipher.open(&envelope, &[])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StrataConfig {
        StrataConfig {
            password_kdf: PasswordKdfParams::insecure_fast(),
            ..StrataConfig::default()
        }
    }

    #[test]
    fn seal_open_roundtrip() {
        let sealed = seal("hunter2hunter2", b"launch codes", &config()).unwrap();
        assert_eq!(sealed.kdf, PasswordKdf::preferred());
        assert_eq!(&open("hunter2hunter2", &sealed).unwrap()[..], b"launch codes");
    }

    #[test]
    fn survives_json() {
        let sealed = seal("hunter2hunter2", b"x", &config()).unwrap();
        let json = serde_json::to_string(&sealed).unwrap();
        let parsed: PasswordSealed = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, sealed);
        assert_eq!(&open("hunter2hunter2", &parsed).unwrap()[..], b"x");
    }

    #[test]
    fn wrong_password_fails() {
        let sealed = seal("hunter2hunter2", b"x", &config()).unwrap();
        let err = open("not the password", &sealed).unwrap_err();
        assert!(err.to_string().contains("Decryption failed"));
    }

    #[test]
    fn scrypt_config_is_recorded() {
        let mut cfg = config();
        cfg.password_kdf.mode = PasswordKdfMode::Scrypt;
        cfg.cipher = CipherConfig::unpadded();
        let sealed = seal("pw", b"data", &cfg).unwrap();
        assert_eq!(sealed.kdf, PasswordKdf::Scrypt);
        assert_eq!(sealed.params.mode, PasswordKdfMode::Scrypt);
        assert_eq!(sealed.padding, PaddingMode::None);
        assert_eq!(&open("pw", &sealed).unwrap()[..], b"data");
    }

    #[test]
    fn oversized_kdf_cost_is_refused_before_derivation() {
        let mut cfg = config();
        cfg.password_kdf.mode = PasswordKdfMode::Scrypt;
        let mut sealed = seal("pw", b"data", &cfg).unwrap();
        sealed.params.scrypt.log_n = 40;
        let err = open("pw", &sealed).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CryptoError>(),
            Some(CryptoError::Config(_))
        ));

        let mut sealed = seal("pw", b"data", &config()).unwrap();
        sealed.params.argon2.memory_kib = u32::MAX;
        assert!(open("pw", &sealed).is_err());
    }

    #[test]
    fn rejects_unknown_version() {
        let mut sealed = seal("pw", b"data", &config()).unwrap();
        sealed.version = 9;
        assert!(open("pw", &sealed).is_err());
    }
}
