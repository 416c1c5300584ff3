//! Test helpers.

use crate::keys::{KeyManager, KeyPair, KeyType};
use rand::{CryptoRng, RngCore};

use alloc::vec::Vec;

/// A test setup.
#[derive(Debug)]
pub struct TestSetup {
    /// The key manager that created all keys.
    pub manager: KeyManager,

    /// Key pairs used as recipients, one per key-exchange capable family.
    ///
    /// In order: Ed25519, Curve25519, secp256r1, Curve25519 + ML-KEM-768, secp256r1 + ML-KEM-768
    /// and Curve25519 + ML-KEM-768 + Ed25519.
    pub recipients: Vec<KeyPair>,

    /// Key pairs used as signers.
    ///
    /// In order: Ed25519, secp256r1 and Curve25519 + Ed25519.
    pub signers: Vec<KeyPair>,
}

impl TestSetup {
    /// Create a new test setup.
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let manager = KeyManager::default();

        let recipients = [
            KeyType::Ed25519,
            KeyType::Curve25519,
            KeyType::Secp256r1,
            KeyType::CURVE25519_MLKEM768,
            KeyType::SECP256R1_MLKEM768,
            KeyType::CURVE25519_MLKEM768_ED25519,
        ]
        .into_iter()
        .map(|kt| manager.generate_key_pair(kt, rng))
        .collect::<Result<Vec<_>, _>>()
        .expect("key generation");

        let signers = [
            KeyType::Ed25519,
            KeyType::Secp256r1,
            KeyType::CURVE25519_ED25519,
        ]
        .into_iter()
        .map(|kt| manager.generate_key_pair(kt, rng))
        .collect::<Result<Vec<_>, _>>()
        .expect("key generation");

        TestSetup {
            manager,
            recipients,
            signers,
        }
    }
}
