//! Property-based tests for the cascade cipher and ratchet
//!
//! 1. **Round-trip**: decrypt(encrypt(m, aad), aad) == m for all m, aad
//! 2. **Tamper detection**: flipping any bit of the envelope fails decryption
//! 3. **Isolation**: a different key never opens the envelope
//! 4. **Length hiding**: payload size depends only on the padded bucket
//! 5. **Ratchet directions**: peers stay in sync under arbitrary turn orders,
//!    including both sides sending before either receives

use proptest::prelude::*;
use strata_crypto::{
    kex::KeyExchange, padding::PaddingMode, CascadeCipher, CipherConfig, CryptoError,
    RatchetSession, SecretKey,
};

fn key_from(seed: [u8; 32]) -> SecretKey {
    SecretKey::from_bytes(seed)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_roundtrip(
        seed in any::<[u8; 32]>(),
        plaintext in prop::collection::vec(any::<u8>(), 0..2048),
        aad in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let cipher = CascadeCipher::new(&key_from(seed)).unwrap();
        let wire = cipher.encrypt_with_aad(&plaintext, &aad).unwrap().to_bytes();
        let opened = cipher.decrypt_with_aad(&wire, &aad).unwrap();
        prop_assert_eq!(&opened[..], &plaintext[..]);
    }

    #[test]
    fn prop_any_bit_flip_is_detected(
        seed in any::<[u8; 32]>(),
        plaintext in prop::collection::vec(any::<u8>(), 0..256),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let cipher = CascadeCipher::new(&key_from(seed)).unwrap();
        let mut wire = cipher.encrypt(&plaintext).unwrap().to_bytes();
        let i = position.index(wire.len());
        wire[i] ^= 1 << bit;
        prop_assert!(matches!(cipher.decrypt(&wire), Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn prop_other_key_never_decrypts(
        a in any::<[u8; 32]>(),
        b in any::<[u8; 32]>(),
        plaintext in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        prop_assume!(a != b);
        let wire = CascadeCipher::new(&key_from(a)).unwrap().encrypt(&plaintext).unwrap().to_bytes();
        let other = CascadeCipher::new(&key_from(b)).unwrap();
        prop_assert!(other.decrypt(&wire).is_err());
    }

    #[test]
    fn prop_padding_buckets(
        len_a in 0usize..500,
        len_b in 0usize..500,
        block in prop::sample::select(vec![16usize, 64, 256]),
    ) {
        let config = CipherConfig {
            padding: PaddingMode::Block { block_size: block, min_padding: 8 },
        };
        let cipher = CascadeCipher::with_config(&SecretKey::generate(), config).unwrap();
        let a = cipher.encrypt(&vec![0u8; len_a]).unwrap();
        let b = cipher.encrypt(&vec![0u8; len_b]).unwrap();

        let bucket = |len: usize| (4 + len + 8).div_ceil(block);
        prop_assert_eq!(a.payload.len() == b.payload.len(), bucket(len_a) == bucket(len_b));
        prop_assert_eq!((a.payload.len() - 32) % block, 0);
    }

    #[test]
    fn prop_text_form_roundtrip(text in "\\PC{0,200}") {
        let cipher = CascadeCipher::new(&SecretKey::generate()).unwrap();
        let sealed = cipher.encrypt_string(&text).unwrap();
        let opened = cipher.decrypt_string(&sealed).unwrap();
        prop_assert_eq!(opened.as_str(), text.as_str());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_ratchet_lockstep(turns in prop::collection::vec(any::<bool>(), 1..40)) {
        let a = KeyExchange::new();
        let b = KeyExchange::new();
        let mut alice = RatchetSession::from_exchange(&a, &b.public_key()).unwrap();
        let mut bob = RatchetSession::from_exchange(&b, &a.public_key()).unwrap();

        for (i, alice_sends) in turns.iter().copied().enumerate() {
            let (tx, rx) = if alice_sends { (&mut alice, &mut bob) } else { (&mut bob, &mut alice) };
            let msg = format!("message {i}");
            let wire = tx.encrypt(msg.as_bytes(), b"").unwrap().to_bytes();
            let opened = rx.decrypt(&wire, b"").unwrap();
            prop_assert_eq!(&opened[..], msg.as_bytes());
        }
        prop_assert_eq!(alice.message_count(), turns.len() as u64);
        prop_assert_eq!(bob.message_count(), turns.len() as u64);
    }

    #[test]
    fn prop_ratchet_crossed_sends(rounds in prop::collection::vec((0usize..4, 0usize..4), 1..12)) {
        let a = KeyExchange::new();
        let b = KeyExchange::new();
        let mut alice = RatchetSession::from_exchange(&a, &b.public_key()).unwrap();
        let mut bob = RatchetSession::from_exchange(&b, &a.public_key()).unwrap();

        for (round, (from_alice, from_bob)) in rounds.iter().copied().enumerate() {
            let to_bob: Vec<_> = (0..from_alice)
                .map(|i| alice.encrypt(format!("a{round}.{i}").as_bytes(), b"").unwrap().to_bytes())
                .collect();
            let to_alice: Vec<_> = (0..from_bob)
                .map(|i| bob.encrypt(format!("b{round}.{i}").as_bytes(), b"").unwrap().to_bytes())
                .collect();
            for (i, wire) in to_bob.iter().enumerate() {
                let expected = format!("a{round}.{i}");
                let opened = bob.decrypt(wire, b"").unwrap();
                prop_assert_eq!(&opened[..], expected.as_bytes());
            }
            for (i, wire) in to_alice.iter().enumerate() {
                let expected = format!("b{round}.{i}");
                let opened = alice.decrypt(wire, b"").unwrap();
                prop_assert_eq!(&opened[..], expected.as_bytes());
            }
        }
        prop_assert_eq!(alice.sent_count(), bob.received_count());
        prop_assert_eq!(bob.sent_count(), alice.received_count());
    }
}
