//! Capability gate in front of the optional post-quantum engine.
//!
//! The engine is supplied by the host at runtime (or not at all). The gate
//! records what was loaded exactly once; afterwards it is read-only. Any
//! post-quantum operation asks the gate first and fails with
//! `CapabilityUnavailable` when the engine is missing. There is no silent
//! fallback to a classical algorithm under a post-quantum name.

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use serde::Serialize;

use crate::{
    envelope::ENVELOPE_VERSION,
    error::{CryptoError, Result},
    kdf::PasswordKdf,
    pq::PostQuantumEngine,
};

/// Operations that need the post-quantum engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PqOperation {
    HybridKem,
    DualSignature,
}

impl PqOperation {
    pub const ALL: [PqOperation; 2] = [PqOperation::HybridKem, PqOperation::DualSignature];
}

impl fmt::Display for PqOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::HybridKem => "hybrid key encapsulation",
            Self::DualSignature => "dual signature",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    /// The gate was never initialized.
    NotInitialized,
    /// Initialization ran and the host supplied no engine.
    NotProvided,
    /// The host tried to load an engine and failed.
    LoadFailed(String),
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => f.write_str("not initialized"),
            Self::NotProvided => f.write_str("no engine provided"),
            Self::LoadFailed(msg) => write!(f, "engine failed to load: {msg}"),
        }
    }
}

/// Either a live engine handle or the reason there is none.
#[derive(Clone)]
pub enum PqCapability {
    Available(Arc<dyn PostQuantumEngine>),
    Unavailable(UnavailableReason),
}

impl PqCapability {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn supports(&self, op: PqOperation) -> bool {
        match self {
            Self::Available(engine) => engine.supports(op),
            Self::Unavailable(_) => false,
        }
    }
}

impl fmt::Debug for PqCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available(engine) => f.debug_tuple("Available").field(&engine.name()).finish(),
            Self::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}

/// Snapshot of what this process can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapabilityFlags {
    pub hybrid_kem: bool,
    pub dual_signature: bool,
    /// Password KDF that `PasswordKdfMode::Auto` resolves to.
    pub password_kdf: PasswordKdf,
}

#[derive(Debug, Clone)]
pub struct Capabilities {
    post_quantum: PqCapability,
}

impl Capabilities {
    pub fn unavailable(reason: UnavailableReason) -> Self {
        Self {
            post_quantum: PqCapability::Unavailable(reason),
        }
    }

    pub fn with_engine(engine: Arc<dyn PostQuantumEngine>) -> Self {
        Self {
            post_quantum: PqCapability::Available(engine),
        }
    }

    pub fn post_quantum(&self) -> &PqCapability {
        &self.post_quantum
    }

    pub fn flags(&self) -> CapabilityFlags {
        CapabilityFlags {
            hybrid_kem: self.post_quantum.supports(PqOperation::HybridKem),
            dual_signature: self.post_quantum.supports(PqOperation::DualSignature),
            password_kdf: PasswordKdf::preferred(),
        }
    }

    /// Engine handle for `op`, or `CapabilityUnavailable(op)`.
    pub fn require(&self, op: PqOperation) -> Result<Arc<dyn PostQuantumEngine>> {
        match &self.post_quantum {
            PqCapability::Available(engine) if engine.supports(op) => Ok(Arc::clone(engine)),
            _ => Err(CryptoError::CapabilityUnavailable(op)),
        }
    }

    pub fn info(&self) -> CryptoInfo {
        let post_quantum = match &self.post_quantum {
            PqCapability::Available(engine) => PostQuantumInfo {
                state: "available",
                reason: None,
                engine: Some(engine.name().to_string()),
                kem: Some(engine.kem_algorithm().to_string()),
                signature: Some(engine.signature_algorithm().to_string()),
            },
            PqCapability::Unavailable(reason) => PostQuantumInfo {
                state: match reason {
                    UnavailableReason::NotInitialized => "not_initialized",
                    UnavailableReason::NotProvided => "not_provided",
                    UnavailableReason::LoadFailed(_) => "load_failed",
                },
                reason: Some(reason.to_string()),
                engine: None,
                kem: None,
                signature: None,
            },
        };
        let password = PasswordKdf::preferred();
        CryptoInfo {
            envelope_version: ENVELOPE_VERSION,
            symmetric_layers: vec!["AES-256-GCM", "ChaCha20-Poly1305"],
            kdf: KdfInfo {
                password: password.name(),
                password_memory_hard: password.is_memory_hard(),
                password_available: [PasswordKdf::Argon2id, PasswordKdf::Scrypt]
                    .into_iter()
                    .filter(|k| k.is_available())
                    .map(PasswordKdf::name)
                    .collect(),
                raw_secret: "HKDF-SHA256",
            },
            key_exchange: "X25519",
            post_quantum,
            capabilities: self.flags(),
        }
    }
}

// ── Introspection ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct CryptoInfo {
    pub envelope_version: u8,
    pub symmetric_layers: Vec<&'static str>,
    pub kdf: KdfInfo,
    pub key_exchange: &'static str,
    pub post_quantum: PostQuantumInfo,
    pub capabilities: CapabilityFlags,
}

#[derive(Debug, Clone, Serialize)]
pub struct KdfInfo {
    pub password: &'static str,
    pub password_memory_hard: bool,
    pub password_available: Vec<&'static str>,
    pub raw_secret: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostQuantumInfo {
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

// ── Gate ──────────────────────────────────────────────────────────────────────

/// Write-once holder for [`Capabilities`].
pub struct CapabilityGate {
    state: OnceLock<Capabilities>,
}

impl Default for CapabilityGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityGate {
    pub const fn new() -> Self {
        Self {
            state: OnceLock::new(),
        }
    }

    /// Run `loader` once and record the outcome.
    ///
    /// Later calls (including concurrent ones) do not run their loader and
    /// return the first result. A loader error is logged and recorded as
    /// `LoadFailed`, never returned.
    pub fn initialize<F, E>(&self, loader: F) -> &Capabilities
    where
        F: FnOnce() -> std::result::Result<Option<Arc<dyn PostQuantumEngine>>, E>,
        E: fmt::Display,
    {
        self.state.get_or_init(|| match loader() {
            Ok(Some(engine)) => {
                tracing::info!(
                    engine = engine.name(),
                    kem = engine.kem_algorithm(),
                    signature = engine.signature_algorithm(),
                    "post-quantum engine loaded"
                );
                Capabilities::with_engine(engine)
            }
            Ok(None) => {
                tracing::info!("no post-quantum engine provided; classical operations only");
                Capabilities::unavailable(UnavailableReason::NotProvided)
            }
            Err(e) => {
                tracing::warn!(error = %e, "post-quantum engine failed to load");
                Capabilities::unavailable(UnavailableReason::LoadFailed(e.to_string()))
            }
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }

    /// Current capabilities. Before initialization every post-quantum
    /// operation reads as unavailable.
    pub fn capabilities(&self) -> Capabilities {
        self.state
            .get()
            .cloned()
            .unwrap_or_else(|| Capabilities::unavailable(UnavailableReason::NotInitialized))
    }

    pub fn require(&self, op: PqOperation) -> Result<Arc<dyn PostQuantumEngine>> {
        match self.state.get() {
            Some(caps) => caps.require(op),
            None => Err(CryptoError::CapabilityUnavailable(op)),
        }
    }

    pub fn info(&self) -> CryptoInfo {
        self.capabilities().info()
    }
}

impl fmt::Debug for CapabilityGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityGate")
            .field("state", &self.state.get())
            .finish()
    }
}

static GLOBAL_GATE: CapabilityGate = CapabilityGate::new();

/// The process-wide gate.
pub fn global() -> &'static CapabilityGate {
    &GLOBAL_GATE
}

/// Initialize the process-wide gate. See [`CapabilityGate::initialize`].
pub fn initialize<F, E>(loader: F) -> &'static Capabilities
where
    F: FnOnce() -> std::result::Result<Option<Arc<dyn PostQuantumEngine>>, E>,
    E: fmt::Display,
{
    GLOBAL_GATE.initialize(loader)
}

pub fn capabilities() -> Capabilities {
    GLOBAL_GATE.capabilities()
}

/// Describe the algorithms and capabilities of this process.
pub fn info() -> CryptoInfo {
    GLOBAL_GATE.info()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{error::ErrorKind, pq::testing::MockEngine};

    fn engine() -> Arc<dyn PostQuantumEngine> {
        Arc::new(MockEngine::default())
    }

    #[test]
    fn uninitialized_gate_reports_unavailable() {
        let gate = CapabilityGate::new();
        assert!(!gate.is_initialized());
        let flags = gate.capabilities().flags();
        assert!(!flags.hybrid_kem);
        assert!(!flags.dual_signature);
        let err = gate.require(PqOperation::HybridKem).err().unwrap();
        assert!(matches!(err, CryptoError::CapabilityUnavailable(PqOperation::HybridKem)));
        assert_eq!(err.kind(), ErrorKind::CapabilityUnavailable);
        assert_eq!(gate.info().post_quantum.state, "not_initialized");
    }

    #[test]
    fn initialize_with_engine() {
        let gate = CapabilityGate::new();
        let caps = gate.initialize(|| Ok::<_, String>(Some(engine())));
        assert!(caps.post_quantum().is_available());
        assert!(caps.flags().hybrid_kem);
        assert!(caps.flags().dual_signature);
        assert!(gate.require(PqOperation::DualSignature).is_ok());
    }

    #[test]
    fn initialize_without_engine() {
        let gate = CapabilityGate::new();
        gate.initialize(|| Ok::<_, String>(None));
        assert!(matches!(
            gate.capabilities().post_quantum(),
            PqCapability::Unavailable(UnavailableReason::NotProvided)
        ));
        assert!(gate.require(PqOperation::HybridKem).is_err());
    }

    #[test]
    fn load_failure_is_recorded_not_returned() {
        let gate = CapabilityGate::new();
        let caps = gate.initialize(|| Err("library not found"));
        match caps.post_quantum() {
            PqCapability::Unavailable(UnavailableReason::LoadFailed(msg)) => {
                assert!(msg.contains("library not found"))
            }
            other => panic!("unexpected {other:?}"),
        }
        let info = gate.info();
        assert_eq!(info.post_quantum.state, "load_failed");
        assert!(gate.require(PqOperation::DualSignature).is_err());
    }

    #[test]
    fn second_initialize_does_not_run_loader() {
        let gate = CapabilityGate::new();
        let calls = AtomicUsize::new(0);
        gate.initialize(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(None)
        });
        let caps = gate.initialize(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(Some(engine()))
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!caps.post_quantum().is_available());
    }

    #[test]
    fn concurrent_initializers_observe_one_result() {
        let gate = CapabilityGate::new();
        let calls = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for i in 0..8 {
                let gate = &gate;
                let calls = &calls;
                s.spawn(move || {
                    gate.initialize(|| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        if i % 2 == 0 {
                            Ok::<_, String>(Some(engine()))
                        } else {
                            Ok(None)
                        }
                    });
                });
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(gate.is_initialized());
    }

    #[test]
    fn partial_engine_only_unlocks_supported_ops() {
        let gate = CapabilityGate::new();
        let kem_only: Arc<dyn PostQuantumEngine> = Arc::new(MockEngine::kem_only());
        let caps = gate.initialize(|| Ok::<_, String>(Some(kem_only)));
        assert!(caps.require(PqOperation::HybridKem).is_ok());
        assert!(matches!(
            caps.require(PqOperation::DualSignature),
            Err(CryptoError::CapabilityUnavailable(PqOperation::DualSignature))
        ));
    }

    #[test]
    fn info_serializes() {
        let gate = CapabilityGate::new();
        gate.initialize(|| Ok::<_, String>(Some(engine())));
        let json = serde_json::to_value(gate.info()).unwrap();
        assert_eq!(json["envelope_version"], 1);
        assert_eq!(json["symmetric_layers"][0], "AES-256-GCM");
        assert_eq!(json["key_exchange"], "X25519");
        assert_eq!(json["post_quantum"]["state"], "available");
        assert_eq!(json["post_quantum"]["kem"], "MOCK-KEM");
        assert_eq!(json["capabilities"]["hybrid_kem"], true);
        assert_eq!(json["kdf"]["raw_secret"], "HKDF-SHA256");
    }

    #[test]
    fn operation_display() {
        assert_eq!(PqOperation::HybridKem.to_string(), "hybrid key encapsulation");
        assert_eq!(
            CryptoError::CapabilityUnavailable(PqOperation::DualSignature).to_string(),
            "Capability unavailable: dual signature"
        );
    }
}
