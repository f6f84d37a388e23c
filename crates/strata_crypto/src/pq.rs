//! Post-quantum engine seam and the key-establishment strategies built on it.
//!
//! The engine itself (lattice KEM, hash-based or lattice signatures) is
//! supplied by the host through [`PostQuantumEngine`]. This crate only
//! combines its output with classical primitives:
//!
//!   ClassicalKem  X25519 ephemeral-static, no engine needed
//!   HybridKem     X25519 + engine KEM; both secrets feed one HKDF
//!   DualSigner    Ed25519 + engine signature; both must verify
//!
//! `HybridKem` and `DualSigner` are built from [`Capabilities`], so a
//! missing engine is reported as `CapabilityUnavailable` at construction.

use std::{fmt, sync::Arc};

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::{
    capability::{Capabilities, PqOperation},
    error::{CryptoError, Result},
    kdf::{self, SecretKey},
    kex::{KeyExchange, PUBLIC_KEY_LEN},
};

const CLASSICAL_KEM_LABEL: &[u8] = b"strata/kem/x25519/v1";
const HYBRID_KEM_LABEL: &[u8] = b"strata/kem/hybrid/v1";
const ED25519_SIGNATURE_LEN: usize = 64;

// ── Engine seam ──────────────────────────────────────────────────────────────

/// Keypair produced by the engine. The secret half is zeroized on drop.
pub struct EngineKeyPair {
    pub public_key: Vec<u8>,
    pub secret_key: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for EngineKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineKeyPair")
            .field("public_key", &hex::encode(&self.public_key))
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Raw engine KEM output. `shared_secret` is never used as a key directly.
pub struct EngineEncapsulation {
    pub ciphertext: Vec<u8>,
    pub shared_secret: Zeroizing<Vec<u8>>,
}

/// An externally supplied post-quantum implementation.
pub trait PostQuantumEngine: Send + Sync {
    fn name(&self) -> &str;
    fn kem_algorithm(&self) -> &str;
    fn signature_algorithm(&self) -> &str;

    /// Whether this engine can perform `op`.
    fn supports(&self, op: PqOperation) -> bool {
        let _ = op;
        true
    }

    fn kem_keypair(&self) -> Result<EngineKeyPair>;
    fn encapsulate(&self, public_key: &[u8]) -> Result<EngineEncapsulation>;
    fn decapsulate(&self, secret_key: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>>;

    fn signing_keypair(&self) -> Result<EngineKeyPair>;
    fn sign(&self, secret_key: &[u8], message: &[u8]) -> Result<Vec<u8>>;
    /// `Ok(false)` for a well-formed signature that does not verify.
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool>;
}

// ── Key encapsulation strategy ───────────────────────────────────────────────

/// Output of [`KeyEncapsulation::encapsulate`]: send `ciphertext`, keep `key`.
#[derive(Debug)]
pub struct Encapsulated {
    pub ciphertext: Vec<u8>,
    pub key: SecretKey,
}

/// Recipient-keyed key establishment. Every implementation yields a
/// `SecretKey` that went through HKDF under its own label.
pub trait KeyEncapsulation {
    fn algorithm(&self) -> String;
    /// Public key peers encapsulate to.
    fn public_key(&self) -> Vec<u8>;
    fn encapsulate(&self, peer_public_key: &[u8]) -> Result<Encapsulated>;
    fn decapsulate(&self, ciphertext: &[u8]) -> Result<SecretKey>;
}

/// X25519 ephemeral-static KEM. The ciphertext is the ephemeral public key.
#[derive(Debug)]
pub struct ClassicalKem {
    exchange: KeyExchange,
}

impl Default for ClassicalKem {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassicalKem {
    pub fn new() -> Self {
        Self {
            exchange: KeyExchange::new(),
        }
    }

    fn derive(
        raw: &[u8; 32],
        ephemeral: &[u8; PUBLIC_KEY_LEN],
        recipient: &[u8; PUBLIC_KEY_LEN],
    ) -> Result<SecretKey> {
        let mut salt = [0u8; 2 * PUBLIC_KEY_LEN];
        salt[..PUBLIC_KEY_LEN].copy_from_slice(ephemeral);
        salt[PUBLIC_KEY_LEN..].copy_from_slice(recipient);
        kdf::expand_key(raw, &salt, CLASSICAL_KEM_LABEL)
    }
}

impl KeyEncapsulation for ClassicalKem {
    fn algorithm(&self) -> String {
        "X25519".into()
    }

    fn public_key(&self) -> Vec<u8> {
        self.exchange.public_key().to_vec()
    }

    fn encapsulate(&self, peer_public_key: &[u8]) -> Result<Encapsulated> {
        let recipient = crate::kex::validate_public_key(peer_public_key)?;
        let ephemeral = KeyExchange::new();
        let raw = ephemeral.derive_shared_secret(&recipient)?;
        let key = Self::derive(raw.as_bytes(), &ephemeral.public_key(), &recipient)?;
        Ok(Encapsulated {
            ciphertext: ephemeral.public_key().to_vec(),
            key,
        })
    }

    fn decapsulate(&self, ciphertext: &[u8]) -> Result<SecretKey> {
        let ephemeral = crate::kex::validate_public_key(ciphertext)?;
        let raw = self.exchange.derive_shared_secret(&ephemeral)?;
        Self::derive(raw.as_bytes(), &ephemeral, &self.exchange.public_key())
    }
}

/// X25519 combined with the engine's KEM.
///
/// Public key and ciphertext are `x25519 (32) || engine bytes`. The session
/// key is HKDF over both shared secrets, so it stays safe while either
/// component does.
pub struct HybridKem {
    engine: Arc<dyn PostQuantumEngine>,
    classical: ClassicalKem,
    keypair: EngineKeyPair,
}

impl HybridKem {
    /// Fails with `CapabilityUnavailable(HybridKem)` when no engine is loaded.
    pub fn from_capabilities(caps: &Capabilities) -> Result<Self> {
        let engine = caps.require(PqOperation::HybridKem)?;
        let keypair = engine.kem_keypair()?;
        Ok(Self {
            engine,
            classical: ClassicalKem::new(),
            keypair,
        })
    }

    fn split(bytes: &[u8]) -> Result<(&[u8], &[u8])> {
        if bytes.len() <= PUBLIC_KEY_LEN {
            return Err(CryptoError::invalid_input(format!(
                "hybrid value must be longer than {PUBLIC_KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(bytes.split_at(PUBLIC_KEY_LEN))
    }

    fn combine(classical: &SecretKey, pq_secret: &[u8], ciphertext: &[u8]) -> Result<SecretKey> {
        let mut ikm = Zeroizing::new(Vec::with_capacity(32 + pq_secret.len()));
        ikm.extend_from_slice(classical.as_bytes());
        ikm.extend_from_slice(pq_secret);
        kdf::expand_key(&ikm, ciphertext, HYBRID_KEM_LABEL)
    }
}

impl KeyEncapsulation for HybridKem {
    fn algorithm(&self) -> String {
        format!("X25519+{}", self.engine.kem_algorithm())
    }

    fn public_key(&self) -> Vec<u8> {
        let mut out = self.classical.public_key();
        out.extend_from_slice(&self.keypair.public_key);
        out
    }

    fn encapsulate(&self, peer_public_key: &[u8]) -> Result<Encapsulated> {
        let (classical_pk, pq_pk) = Self::split(peer_public_key)?;
        let classical = self.classical.encapsulate(classical_pk)?;
        let pq = self.engine.encapsulate(pq_pk)?;

        let mut ciphertext = classical.ciphertext;
        ciphertext.extend_from_slice(&pq.ciphertext);
        let key = Self::combine(&classical.key, &pq.shared_secret, &ciphertext)?;
        Ok(Encapsulated { ciphertext, key })
    }

    fn decapsulate(&self, ciphertext: &[u8]) -> Result<SecretKey> {
        let (classical_ct, pq_ct) = Self::split(ciphertext)?;
        let classical = self.classical.decapsulate(classical_ct)?;
        let pq_secret = self.engine.decapsulate(&self.keypair.secret_key, pq_ct)?;
        Self::combine(&classical, &pq_secret, ciphertext)
    }
}

impl fmt::Debug for HybridKem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridKem")
            .field("engine", &self.engine.name())
            .field("classical", &self.classical)
            .field("keypair", &self.keypair)
            .finish()
    }
}

// ── Dual signatures ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DualPublicKey {
    pub classical: [u8; 32],
    pub post_quantum: Vec<u8>,
}

impl DualPublicKey {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.classical.to_vec();
        out.extend_from_slice(&self.post_quantum);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() <= 32 {
            return Err(CryptoError::InvalidKey("dual public key too short".into()));
        }
        let mut classical = [0u8; 32];
        classical.copy_from_slice(&bytes[..32]);
        Ok(Self {
            classical,
            post_quantum: bytes[32..].to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DualSignature {
    pub classical: [u8; ED25519_SIGNATURE_LEN],
    pub post_quantum: Vec<u8>,
}

impl DualSignature {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.classical.to_vec();
        out.extend_from_slice(&self.post_quantum);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() <= ED25519_SIGNATURE_LEN {
            return Err(CryptoError::SignatureVerification);
        }
        let mut classical = [0u8; ED25519_SIGNATURE_LEN];
        classical.copy_from_slice(&bytes[..ED25519_SIGNATURE_LEN]);
        Ok(Self {
            classical,
            post_quantum: bytes[ED25519_SIGNATURE_LEN..].to_vec(),
        })
    }
}

/// Ed25519 + engine signature over the same message.
pub struct DualSigner {
    engine: Arc<dyn PostQuantumEngine>,
    classical: SigningKey,
    post_quantum: EngineKeyPair,
}

impl DualSigner {
    /// Fails with `CapabilityUnavailable(DualSignature)` when no engine is loaded.
    pub fn generate(caps: &Capabilities) -> Result<Self> {
        let engine = caps.require(PqOperation::DualSignature)?;
        let post_quantum = engine.signing_keypair()?;
        Ok(Self {
            engine,
            classical: SigningKey::generate(&mut OsRng),
            post_quantum,
        })
    }

    pub fn public_key(&self) -> DualPublicKey {
        DualPublicKey {
            classical: self.classical.verifying_key().to_bytes(),
            post_quantum: self.post_quantum.public_key.clone(),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Result<DualSignature> {
        Ok(DualSignature {
            classical: self.classical.sign(message).to_bytes(),
            post_quantum: self.engine.sign(&self.post_quantum.secret_key, message)?,
        })
    }

    /// Both halves must verify. Any failure is `SignatureVerification`.
    pub fn verify(
        caps: &Capabilities,
        public_key: &DualPublicKey,
        message: &[u8],
        signature: &DualSignature,
    ) -> Result<()> {
        let engine = caps.require(PqOperation::DualSignature)?;

        let vk = VerifyingKey::from_bytes(&public_key.classical)
            .map_err(|_| CryptoError::SignatureVerification)?;
        vk.verify(message, &Signature::from_bytes(&signature.classical))
            .map_err(|_| CryptoError::SignatureVerification)?;

        match engine.verify(&public_key.post_quantum, message, &signature.post_quantum) {
            Ok(true) => Ok(()),
            Ok(false) => Err(CryptoError::SignatureVerification),
            Err(e) => {
                tracing::debug!(error = %e, "engine signature check errored");
                Err(CryptoError::SignatureVerification)
            }
        }
    }
}

impl fmt::Debug for DualSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DualSigner")
            .field("engine", &self.engine.name())
            .field("public_key", &self.public_key())
            .finish()
    }
}
