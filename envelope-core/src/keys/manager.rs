//! Key generation, import, export and identifiers.

use super::encoding::{
    decode_public, decode_secret, decrypt_secret, encode_public, encode_secret, encrypt_secret,
};
use super::material::{PublicMaterial, SecretMaterial};
use super::{KeyPair, KeyType, PrivateKey, PublicKey};
use crate::artifacts::KeyId;
use crate::consts::{SEED_INFO, SEED_MAX_SIZE, SEED_MIN_SIZE, SHORT_KEY_ID_SIZE};
use crate::error::Error;

use hkdf::Hkdf;
use log::debug;
use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::sync::Arc;
use zeroize::Zeroizing;

/// The fingerprint function used to compute key identifiers.
///
/// Envelopes address recipients by identifier, so parties must agree on this choice to
/// interoperate.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyIdAlgorithm {
    /// The first 8 bytes of SHA-512.
    #[default]
    Sha512Prefix,
    /// The full SHA-256 digest.
    Sha256,
}

/// Creates, imports and exports keys.
///
/// The identifier algorithm is fixed for the lifetime of the manager.
#[derive(Debug, Default, Clone)]
pub struct KeyManager {
    id_algorithm: KeyIdAlgorithm,
}

impl KeyManager {
    /// Creates a manager computing identifiers with `id_algorithm`.
    pub fn new(id_algorithm: KeyIdAlgorithm) -> Self {
        Self { id_algorithm }
    }

    /// The identifier algorithm of this manager.
    pub fn id_algorithm(&self) -> KeyIdAlgorithm {
        self.id_algorithm
    }

    /// Computes the identifier of a canonically encoded public key.
    pub fn compute_key_identifier(&self, public_key_bytes: &[u8]) -> KeyId {
        match self.id_algorithm {
            KeyIdAlgorithm::Sha512Prefix => {
                KeyId::from_bytes(&Sha512::digest(public_key_bytes)[..SHORT_KEY_ID_SIZE])
            }
            KeyIdAlgorithm::Sha256 => KeyId::from_bytes(Sha256::digest(public_key_bytes).to_vec()),
        }
    }

    /// Generates a new key pair.
    pub fn generate_key_pair<R: RngCore + CryptoRng>(
        &self,
        key_type: KeyType,
        rng: &mut R,
    ) -> Result<KeyPair, Error> {
        let secret = SecretMaterial::generate(key_type, rng)?;
        let pair = self.key_pair(secret)?;

        debug!("generated {} key pair {}", key_type, pair.public_key.id);

        Ok(pair)
    }

    /// Deterministically derives a key pair from a seed.
    ///
    /// The seed must be between 32 and 512 bytes. The same key type and seed always yield the
    /// same keys and identifier.
    pub fn generate_key_pair_from_seed(
        &self,
        key_type: KeyType,
        seed: &[u8],
    ) -> Result<KeyPair, Error> {
        if !(SEED_MIN_SIZE..=SEED_MAX_SIZE).contains(&seed.len()) {
            return Err(Error::InvalidSeedSize(seed.len()));
        }

        let mut rng_seed = Zeroizing::new([0u8; 32]);
        Hkdf::<Sha512>::new(None, seed)
            .expand(SEED_INFO, &mut rng_seed[..])
            .map_err(|_| Error::ConstraintViolation)?;

        let mut rng = ChaCha20Rng::from_seed(*rng_seed);

        self.generate_key_pair(key_type, &mut rng)
    }

    /// Imports a private key, canonical or PKCS#8 DER.
    pub fn import_private_key(&self, bytes: &[u8]) -> Result<KeyPair, Error> {
        self.key_pair(decode_secret(bytes)?)
    }

    /// Imports a password-protected private key.
    ///
    /// Accepts the output of [`KeyManager::export_private_key_with_password`] as well as
    /// encrypted PKCS#8 documents holding a supported single-algorithm key.
    pub fn import_private_key_with_password(
        &self,
        bytes: &[u8],
        password: &[u8],
    ) -> Result<KeyPair, Error> {
        self.key_pair(decrypt_secret(bytes, password)?)
    }

    /// Imports a public key, canonical or SubjectPublicKeyInfo DER.
    pub fn import_public_key(&self, bytes: &[u8]) -> Result<PublicKey, Error> {
        self.public_key(decode_public(bytes)?)
    }

    /// Exports a private key in the canonical encoding.
    pub fn export_private_key(&self, key: &PrivateKey) -> Result<Zeroizing<Vec<u8>>, Error> {
        encode_secret(&key.material)
    }

    /// Exports a private key encrypted under `password`, as a DER-encoded PKCS#8
    /// `EncryptedPrivateKeyInfo` (PBES2 with scrypt and AES-256-CBC).
    pub fn export_private_key_with_password<R: RngCore + CryptoRng>(
        &self,
        key: &PrivateKey,
        password: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>, Error> {
        encrypt_secret(&key.material, password, rng)
    }

    /// Exports a public key in the canonical encoding.
    pub fn export_public_key(&self, key: &PublicKey) -> Result<Vec<u8>, Error> {
        encode_public(&key.material)
    }

    /// Derives the public key belonging to a private key.
    pub fn extract_public_key(&self, key: &PrivateKey) -> PublicKey {
        PublicKey {
            id: key.id.clone(),
            key_type: key.key_type,
            material: Arc::new(key.material.public()),
        }
    }

    fn public_key(&self, material: PublicMaterial) -> Result<PublicKey, Error> {
        let key_type = material.key_type()?;
        let id = self.compute_key_identifier(&encode_public(&material)?);

        Ok(PublicKey {
            id,
            key_type,
            material: Arc::new(material),
        })
    }

    fn key_pair(&self, secret: SecretMaterial) -> Result<KeyPair, Error> {
        let public_key = self.public_key(secret.public())?;
        let private_key = PrivateKey {
            id: public_key.id.clone(),
            key_type: public_key.key_type,
            material: Arc::new(secret),
        };

        Ok(KeyPair {
            private_key,
            public_key,
        })
    }
}
