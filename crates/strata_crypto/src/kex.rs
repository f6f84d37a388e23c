//! X25519 Diffie-Hellman key exchange.
//!
//! References:
//!   - RFC 7748 (X25519): <https://datatracker.ietf.org/doc/html/rfc7748>
//!   - RFC 5869 (HKDF):  <https://datatracker.ietf.org/doc/html/rfc5869>
//!
//! Non-negotiable:
//!   - The raw DH output is never a cipher key. `RawSharedSecret` has no
//!     conversion to `SecretKey` other than HKDF under `KEX_LABEL`.
//!   - Peer keys of the wrong length or of small order are rejected.
//!   - Keypairs are ephemeral: one per exchange, private half never exported.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroizing;

use crate::{
    error::{CryptoError, Result},
    kdf::{self, SecretKey},
};

pub const PUBLIC_KEY_LEN: usize = 32;

/// Fixed domain-separation label for exchange output.
const KEX_LABEL: &[u8] = b"strata/kex/v1";

/// Canonical encodings of the small-order points on Curve25519, plus the
/// non-canonical encodings of 0 and 1. Compared with the top bit masked.
const LOW_ORDER_POINTS: [[u8; 32]; 7] = [
    [0x00; 32],
    [
        0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ],
    [
        0xe0, 0xeb, 0x7a, 0x7c, 0x3b, 0x41, 0xb8, 0xae, 0x16, 0x56, 0xe3, 0xfa, 0xf1, 0x9f, 0xc4, 0x6a,
        0xda, 0x09, 0x8d, 0xeb, 0x9c, 0x32, 0xb1, 0xfd, 0x86, 0x62, 0x05, 0x16, 0x5f, 0x49, 0xb8, 0x00,
    ],
    [
        0x5f, 0x9c, 0x95, 0xbc, 0xa3, 0x50, 0x8c, 0x24, 0xb1, 0xd0, 0xb1, 0x55, 0x9c, 0x83, 0xef, 0x5b,
        0x04, 0x44, 0x5c, 0xc4, 0x58, 0x1c, 0x8e, 0x86, 0xd8, 0x22, 0x4e, 0xdd, 0xd0, 0x9f, 0x11, 0x57,
    ],
    [
        0xec, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f,
    ],
    [
        0xed, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f,
    ],
    [
        0xee, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f,
    ],
];

fn is_low_order(point: &[u8; 32]) -> bool {
    let mut masked = *point;
    masked[31] &= 0x7f;
    LOW_ORDER_POINTS.iter().any(|p| *p == masked)
}

/// Parse a 32-byte public key, rejecting wrong lengths and small-order points.
pub fn validate_public_key(bytes: &[u8]) -> Result<[u8; PUBLIC_KEY_LEN]> {
    let key: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!(
            "X25519 public key must be {PUBLIC_KEY_LEN} bytes, got {}",
            bytes.len()
        ))
    })?;
    if is_low_order(&key) {
        return Err(CryptoError::InvalidKey("X25519 public key has small order".into()));
    }
    Ok(key)
}

/// Decode the text form produced by [`KeyExchange::public_key_b64`].
pub fn decode_public_key(text: &str) -> Result<[u8; PUBLIC_KEY_LEN]> {
    let bytes = URL_SAFE_NO_PAD
        .decode(text.trim())
        .map_err(|e| CryptoError::InvalidKey(format!("public key decode: {e}")))?;
    validate_public_key(&bytes)
}

/// Human-readable fingerprint: BLAKE3 of the public key, truncated to 20
/// bytes, hex in groups of 4.
pub fn fingerprint(public_key: &[u8; PUBLIC_KEY_LEN]) -> String {
    let hash = blake3::hash(public_key);
    let hex = hex::encode(&hash.as_bytes()[..20]);
    hex.as_bytes()
        .chunks(4)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Keypair ──────────────────────────────────────────────────────────────────

/// X25519 keypair. The secret half is zeroized on drop.
pub struct KeyPair {
    secret: StaticSecret,
    public: X25519Public,
}

impl KeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.public.to_bytes()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &URL_SAFE_NO_PAD.encode(self.public.as_bytes()))
            .field("secret", &"<redacted>")
            .finish()
    }
}

// ── Exchange ─────────────────────────────────────────────────────────────────

/// One side of an ephemeral X25519 exchange.
#[derive(Debug)]
pub struct KeyExchange {
    keypair: KeyPair,
}

impl Default for KeyExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyExchange {
    /// Generate a fresh keypair from the OS RNG.
    pub fn new() -> Self {
        Self {
            keypair: KeyPair::generate(),
        }
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.keypair.public_key()
    }

    pub fn public_key_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.keypair.public.as_bytes())
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.public_key())
    }

    /// Raw X25519 output with `peer_public_key`.
    ///
    /// Must go through [`RawSharedSecret::to_secret_key`] before use as a key.
    pub fn derive_shared_secret(&self, peer_public_key: &[u8]) -> Result<RawSharedSecret> {
        let peer = validate_public_key(peer_public_key)?;
        let shared = self
            .keypair
            .secret
            .diffie_hellman(&X25519Public::from(peer));
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidKey(
                "X25519 exchange produced a non-contributory secret".into(),
            ));
        }
        Ok(RawSharedSecret {
            secret: Zeroizing::new(shared.to_bytes()),
            transcript: transcript(&self.public_key(), &peer),
        })
    }

    /// Shared secret passed through HKDF under the exchange label.
    pub fn derive_session_key(&self, peer_public_key: &[u8]) -> Result<SecretKey> {
        self.derive_shared_secret(peer_public_key)?.to_secret_key()
    }
}

/// Both public keys in canonical order, so both sides build the same salt.
fn transcript(a: &[u8; PUBLIC_KEY_LEN], b: &[u8; PUBLIC_KEY_LEN]) -> [u8; 2 * PUBLIC_KEY_LEN] {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut out = [0u8; 2 * PUBLIC_KEY_LEN];
    out[..PUBLIC_KEY_LEN].copy_from_slice(lo);
    out[PUBLIC_KEY_LEN..].copy_from_slice(hi);
    out
}

/// Raw DH output. Zeroized on drop; only usable through the KDF.
///
/// The bytes are not reachable from outside the crate:
///
/// ```compile_fail
/// use strata_crypto::KeyExchange;
/// let raw = KeyExchange::new()
///     .derive_shared_secret(&KeyExchange::new().public_key())
///     .unwrap();
/// let _ = raw.as_bytes();
/// ```
pub struct RawSharedSecret {
    secret: Zeroizing<[u8; 32]>,
    transcript: [u8; 2 * PUBLIC_KEY_LEN],
}

impl RawSharedSecret {
    /// The raw point. Crate-internal KEMs feed it to their own KDF label.
    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    /// Derive cipher key material: HKDF(salt = both public keys, info = label).
    pub fn to_secret_key(&self) -> Result<SecretKey> {
        kdf::expand_key(&self.secret[..], &self.transcript, KEX_LABEL)
    }
}

impl fmt::Debug for RawSharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawSharedSecret(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn both_sides_agree() {
        let alice = KeyExchange::new();
        let bob = KeyExchange::new();

        let a = alice.derive_shared_secret(&bob.public_key()).unwrap();
        let b = bob.derive_shared_secret(&alice.public_key()).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());

        let ka = alice.derive_session_key(&bob.public_key()).unwrap();
        let kb = bob.derive_session_key(&alice.public_key()).unwrap();
        assert_eq!(ka.as_bytes(), kb.as_bytes());
    }

    #[test]
    fn session_key_is_not_raw_secret() {
        let alice = KeyExchange::new();
        let bob = KeyExchange::new();
        let raw = alice.derive_shared_secret(&bob.public_key()).unwrap();
        let key = raw.to_secret_key().unwrap();
        assert_ne!(raw.as_bytes(), key.as_bytes());
    }

    #[test]
    fn different_peers_give_different_secrets() {
        let alice = KeyExchange::new();
        let bob = KeyExchange::new();
        let carol = KeyExchange::new();
        let ab = alice.derive_session_key(&bob.public_key()).unwrap();
        let ac = alice.derive_session_key(&carol.public_key()).unwrap();
        assert_ne!(ab.as_bytes(), ac.as_bytes());
    }

    #[test]
    fn rejects_wrong_length() {
        let alice = KeyExchange::new();
        for len in [0usize, 31, 33, 64] {
            let err = alice.derive_shared_secret(&vec![9u8; len]).unwrap_err();
            assert!(matches!(err, CryptoError::InvalidKey(_)));
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[test]
    fn rejects_low_order_points() {
        let alice = KeyExchange::new();
        for point in LOW_ORDER_POINTS {
            assert!(alice.derive_shared_secret(&point).is_err());
            let mut high = point;
            high[31] |= 0x80;
            assert!(alice.derive_shared_secret(&high).is_err());
        }
    }

    #[test]
    fn text_encoding_roundtrip() {
        let alice = KeyExchange::new();
        let decoded = decode_public_key(&alice.public_key_b64()).unwrap();
        assert_eq!(decoded, alice.public_key());
        assert!(decode_public_key("@@@").is_err());
        assert!(decode_public_key(&URL_SAFE_NO_PAD.encode([7u8; 16])).is_err());
    }

    #[test]
    fn fingerprint_format() {
        let fp = KeyExchange::new().fingerprint();
        let groups: Vec<&str> = fp.split(' ').collect();
        assert_eq!(groups.len(), 10);
        assert!(groups.iter().all(|g| g.len() == 4));
    }

    #[test]
    fn debug_hides_secrets() {
        let kex = KeyExchange::new();
        assert!(format!("{kex:?}").contains("<redacted>"));
        let raw = kex.derive_shared_secret(&KeyExchange::new().public_key()).unwrap();
        assert_eq!(format!("{raw:?}"), "RawSharedSecret(<redacted>)");
    }
}
