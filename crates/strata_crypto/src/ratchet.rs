//! Symmetric ratcheting session over the cascade cipher.
//!
//! State:
//!   RK_0  root key, used only to seed the two chains
//!   CK    one chain key per direction, replaced after every message on it
//!   n     per-chain message counter, bound into every envelope as associated data
//!
//! Chains:
//!   RK_0            = HKDF(shared, "ratchet-init")
//!   CK^r_0          = HKDF(RK_0,    "ratchet-step/<r>")
//!   CK^r_{n+1}      = HKDF(CK^r_n,  "ratchet-step/<r>")
//!
//! `r` is the role of the sending side. A session sends on its own role's
//! chain and receives on its peer's, so two peers sending at the same step
//! never share a key. Within one direction messages must arrive in order and
//! a lost message stalls that direction. Compromise of CK^r_n does not expose
//! messages 0..n on that chain.

use std::fmt;

use zeroize::Zeroizing;

use crate::{
    cipher::CascadeCipher,
    config::CipherConfig,
    envelope::Envelope,
    error::{CryptoError, Result},
    kdf::{self, SecretKey},
    kex::{self, KeyExchange},
};

const RATCHET_SALT: &[u8] = b"strata/ratchet/v1";
const RATCHET_INIT: &[u8] = b"ratchet-init";
const STEP_INITIATOR: &[u8] = b"ratchet-step/initiator";
const STEP_RESPONDER: &[u8] = b"ratchet-step/responder";
const FINGERPRINT_CONTEXT: &str = "strata 2024 ratchet base-secret fingerprint";

/// Which side of the session this is. Peers must hold opposite roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRole {
    Initiator,
    Responder,
}

impl SessionRole {
    pub fn peer(self) -> Self {
        match self {
            Self::Initiator => Self::Responder,
            Self::Responder => Self::Initiator,
        }
    }

    fn step_label(self) -> &'static [u8] {
        match self {
            Self::Initiator => STEP_INITIATOR,
            Self::Responder => STEP_RESPONDER,
        }
    }
}

/// One direction of the session.
struct Chain {
    key: SecretKey,
    cipher: CascadeCipher,
    count: u64,
    label: &'static [u8],
}

impl Chain {
    fn start(root: &SecretKey, owner: SessionRole, config: &CipherConfig) -> Result<Self> {
        let label = owner.step_label();
        Self::at(kdf::expand_key(root.as_bytes(), RATCHET_SALT, label)?, 0, label, config)
    }

    fn at(key: SecretKey, count: u64, label: &'static [u8], config: &CipherConfig) -> Result<Self> {
        Ok(Self {
            cipher: CascadeCipher::with_config(&key, config.clone())?,
            key,
            count,
            label,
        })
    }

    fn ensure_counter(&self) -> Result<()> {
        if self.count == u64::MAX {
            return Err(CryptoError::CounterExhausted);
        }
        Ok(())
    }

    fn message_aad(&self, aad: &[u8]) -> Vec<u8> {
        let mut ad = Vec::with_capacity(8 + aad.len());
        ad.extend_from_slice(&self.count.to_be_bytes());
        ad.extend_from_slice(aad);
        ad
    }

    fn advance(&mut self, config: &CipherConfig) -> Result<()> {
        let next = kdf::expand_key(self.key.as_bytes(), RATCHET_SALT, self.label)?;
        self.cipher = CascadeCipher::with_config(&next, config.clone())?;
        // The previous key is zeroized as it is dropped here.
        self.key = next;
        self.count += 1;
        Ok(())
    }
}

pub struct RatchetSession {
    role: SessionRole,
    send: Chain,
    recv: Chain,
    base_fingerprint: [u8; 16],
    config: CipherConfig,
}

impl RatchetSession {
    /// Start a session from an already-derived shared key. The peer must
    /// start with the opposite `role`.
    pub fn new(shared: &SecretKey, role: SessionRole) -> Result<Self> {
        Self::with_config(shared, role, CipherConfig::default())
    }

    pub fn with_config(shared: &SecretKey, role: SessionRole, config: CipherConfig) -> Result<Self> {
        let root = kdf::expand_key(shared.as_bytes(), RATCHET_SALT, RATCHET_INIT)?;
        let send = Chain::start(&root, role, &config)?;
        let recv = Chain::start(&root, role.peer(), &config)?;

        let digest = blake3::derive_key(FINGERPRINT_CONTEXT, shared.as_bytes());
        let mut base_fingerprint = [0u8; 16];
        base_fingerprint.copy_from_slice(&digest[..16]);

        Ok(Self {
            role,
            send,
            recv,
            base_fingerprint,
            config,
        })
    }

    /// Run the exchange against `peer_public_key` and start a session from
    /// the derived key. The side with the lower public key is the initiator.
    pub fn from_exchange(exchange: &KeyExchange, peer_public_key: &[u8]) -> Result<Self> {
        let peer = kex::validate_public_key(peer_public_key)?;
        let own = exchange.public_key();
        let role = match own.cmp(&peer) {
            std::cmp::Ordering::Less => SessionRole::Initiator,
            std::cmp::Ordering::Greater => SessionRole::Responder,
            std::cmp::Ordering::Equal => {
                return Err(CryptoError::InvalidKey(
                    "peer public key equals our own".into(),
                ))
            }
        };
        let shared = exchange.derive_session_key(&peer)?;
        Self::new(&shared, role)
    }

    /// Encrypt the next message on the sending chain.
    pub fn encrypt(&mut self, plaintext: &[u8], aad: &[u8]) -> Result<Envelope> {
        self.send.ensure_counter()?;
        let envelope = self
            .send
            .cipher
            .encrypt_with_aad(plaintext, &self.send.message_aad(aad))?;
        self.send.advance(&self.config)?;
        tracing::debug!(sent = self.send.count, "ratchet advanced");
        Ok(envelope)
    }

    /// Decrypt the next message on the receiving chain. On failure nothing
    /// advances.
    pub fn decrypt(&mut self, envelope: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.recv.ensure_counter()?;
        let plaintext = self
            .recv
            .cipher
            .decrypt_with_aad(envelope, &self.recv.message_aad(aad))?;
        self.recv.advance(&self.config)?;
        tracing::debug!(received = self.recv.count, "ratchet advanced");
        Ok(plaintext)
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// Messages sent plus messages received.
    pub fn message_count(&self) -> u64 {
        self.send.count.saturating_add(self.recv.count)
    }

    pub fn sent_count(&self) -> u64 {
        self.send.count
    }

    pub fn received_count(&self) -> u64 {
        self.recv.count
    }

    /// Hex digest identifying the base secret. Both peers of a session see
    /// the same value; it reveals nothing about the secret.
    pub fn base_secret_fingerprint(&self) -> String {
        hex::encode(self.base_fingerprint)
    }

    /// Receive-only session positioned on `owner`'s chain at `count`.
    #[cfg(test)]
    fn resume(chain_key: SecretKey, owner: SessionRole, count: u64) -> Result<Self> {
        let config = CipherConfig::default();
        let recv = Chain::at(chain_key, count, owner.step_label(), &config)?;
        let send = Chain::at(SecretKey::generate(), 0, owner.peer().step_label(), &config)?;
        Ok(Self {
            role: owner.peer(),
            send,
            recv,
            base_fingerprint: [0u8; 16],
            config,
        })
    }
}

impl fmt::Debug for RatchetSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RatchetSession")
            .field("role", &self.role)
            .field("chain_keys", &"<redacted>")
            .field("sent", &self.send.count)
            .field("received", &self.recv.count)
            .field("base_fingerprint", &self.base_secret_fingerprint())
            .finish()
    }
}
