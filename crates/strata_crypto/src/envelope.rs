//! Ciphertext envelope, the only byte-exact contract of the crate.
//!
//! Wire format:
//!   [ version (1) | nonce_outer (12) | nonce_inner (12) | cascaded ciphertext ]
//!
//! The cascaded ciphertext carries both 16-byte authentication tags, so a
//! valid envelope is never shorter than `MIN_ENVELOPE_LEN`.
//!
//! Text form: URL-safe base64 without padding (no control characters, no
//! `+`, `/` or `=` to collide with delimiters).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

pub const ENVELOPE_VERSION: u8 = 0x01;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const HEADER_LEN: usize = 1 + NONCE_LEN + NONCE_LEN;
pub const MIN_ENVELOPE_LEN: usize = HEADER_LEN + 2 * TAG_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub version: u8,
    /// Nonce of the first layer applied to the plaintext.
    pub nonce_outer: [u8; NONCE_LEN],
    /// Nonce of the second layer, applied over the first layer's output.
    pub nonce_inner: [u8; NONCE_LEN],
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(nonce_outer: [u8; NONCE_LEN], nonce_inner: [u8; NONCE_LEN], payload: Vec<u8>) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            nonce_outer,
            nonce_inner,
            payload,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.push(self.version);
        out.extend_from_slice(&self.nonce_outer);
        out.extend_from_slice(&self.nonce_inner);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse wire bytes. Fails closed on short input or an unknown version
    /// instead of guessing a layout.
    pub fn from_bytes(data: &[u8]) -> Result<Self, EnvelopeError> {
        if data.len() < MIN_ENVELOPE_LEN {
            return Err(EnvelopeError::TooShort { len: data.len() });
        }
        let version = data[0];
        if version != ENVELOPE_VERSION {
            return Err(EnvelopeError::UnsupportedVersion(version));
        }
        let mut nonce_outer = [0u8; NONCE_LEN];
        let mut nonce_inner = [0u8; NONCE_LEN];
        nonce_outer.copy_from_slice(&data[1..1 + NONCE_LEN]);
        nonce_inner.copy_from_slice(&data[1 + NONCE_LEN..HEADER_LEN]);
        Ok(Self {
            version,
            nonce_outer,
            nonce_inner,
            payload: data[HEADER_LEN..].to_vec(),
        })
    }

    pub fn to_text(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.to_bytes())
    }

    pub fn from_text(text: &str) -> Result<Self, EnvelopeError> {
        let bytes = URL_SAFE_NO_PAD.decode(text.trim())?;
        Self::from_bytes(&bytes)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Envelope too short: {len} bytes")]
    TooShort { len: usize },
    #[error("Unsupported envelope version {0:#04x}")]
    UnsupportedVersion(u8),
    #[error("Envelope text decode error: {0}")]
    Encoding(#[from] base64::DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope::new([0x11; NONCE_LEN], [0x22; NONCE_LEN], vec![0x33; 2 * TAG_LEN + 5])
    }

    #[test]
    fn layout_is_byte_exact() {
        let bytes = sample().to_bytes();
        assert_eq!(bytes[0], ENVELOPE_VERSION);
        assert_eq!(&bytes[1..13], &[0x11; 12]);
        assert_eq!(&bytes[13..25], &[0x22; 12]);
        assert_eq!(&bytes[25..], &[0x33; 37][..]);
    }

    #[test]
    fn parses_its_own_output() {
        let env = sample();
        assert_eq!(Envelope::from_bytes(&env.to_bytes()).unwrap(), env);
        assert_eq!(Envelope::from_text(&env.to_text()).unwrap(), env);
    }

    #[test]
    fn rejects_short_input() {
        let bytes = sample().to_bytes();
        let err = Envelope::from_bytes(&bytes[..MIN_ENVELOPE_LEN - 1]).unwrap_err();
        assert!(matches!(err, EnvelopeError::TooShort { len } if len == MIN_ENVELOPE_LEN - 1));
        assert!(Envelope::from_bytes(&[]).is_err());
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = sample().to_bytes();
        bytes[0] = 0x02;
        assert!(matches!(
            Envelope::from_bytes(&bytes),
            Err(EnvelopeError::UnsupportedVersion(0x02))
        ));
    }

    #[test]
    fn text_form_is_transport_safe() {
        let text = sample().to_text();
        assert!(text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn rejects_bad_text() {
        assert!(matches!(
            Envelope::from_text("not base64!!"),
            Err(EnvelopeError::Encoding(_))
        ));
    }
}
