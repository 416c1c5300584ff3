//! A facade over keys, envelopes and detached signatures.
//!
//! [`EnvelopeCrypto`] bundles a [`KeyManager`] and an [`EnvelopeConfig`] and offers one call per
//! common task. Everything it does can also be done with the [`client`](crate::client) types
//! directly, which offer more control (custom parameters, incremental sessions, inspecting the
//! header before unsealing).

use crate::artifacts::KeyId;
use crate::client::rust::stream::{read_chunk, SealerStreamConfig, UnsealerStreamConfig};
use crate::client::rust::{SealerMemoryConfig, UnsealerMemoryConfig};
use crate::client::{
    RecipientSet, Sealer, SigningOptions, Unsealer, VerifyingMode, VerifyingOptions,
};
use crate::config::EnvelopeConfig;
use crate::error::Error;
use crate::keys::{KeyIdAlgorithm, KeyManager, KeyPair, KeyType, PrivateKey, PublicKey};

use alloc::vec::Vec;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::io::{Read, Write};
use zeroize::Zeroizing;

/// Hash algorithms offered by [`EnvelopeCrypto::compute_hash`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    /// SHA-224.
    Sha224,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    #[default]
    Sha512,
}

/// Key management, envelope encryption and detached signatures.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeCrypto {
    manager: KeyManager,
    config: EnvelopeConfig,
    default_key_type: KeyType,
}

fn recipient_set(recipients: &[PublicKey]) -> RecipientSet {
    RecipientSet::from(recipients)
}

impl EnvelopeCrypto {
    /// Creates a facade with the given configuration and identifier algorithm.
    pub fn new(config: EnvelopeConfig, id_algorithm: KeyIdAlgorithm) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            manager: KeyManager::new(id_algorithm),
            config,
            default_key_type: KeyType::default(),
        })
    }

    /// Sets the key type of [`EnvelopeCrypto::generate_key_pair`].
    pub fn with_default_key_type(mut self, key_type: KeyType) -> Self {
        self.default_key_type = key_type;
        self
    }

    /// The envelope configuration.
    pub fn config(&self) -> &EnvelopeConfig {
        &self.config
    }

    /// The key manager.
    pub fn key_manager(&self) -> &KeyManager {
        &self.manager
    }

    /// Generates a key pair of the default key type.
    pub fn generate_key_pair<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> Result<KeyPair, Error> {
        self.manager.generate_key_pair(self.default_key_type, rng)
    }

    /// Generates a key pair of the given type.
    pub fn generate_key_pair_of_type<R: RngCore + CryptoRng>(
        &self,
        key_type: KeyType,
        rng: &mut R,
    ) -> Result<KeyPair, Error> {
        self.manager.generate_key_pair(key_type, rng)
    }

    /// Generates `n` key pairs of the default key type.
    pub fn generate_key_pairs<R: RngCore + CryptoRng>(
        &self,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<KeyPair>, Error> {
        (0..n).map(|_| self.generate_key_pair(rng)).collect()
    }

    /// Deterministically derives a key pair from a seed of 32 to 512 bytes.
    pub fn generate_key_pair_from_seed(
        &self,
        key_type: KeyType,
        seed: &[u8],
    ) -> Result<KeyPair, Error> {
        self.manager.generate_key_pair_from_seed(key_type, seed)
    }

    /// Imports a private key.
    pub fn import_private_key(&self, bytes: &[u8]) -> Result<KeyPair, Error> {
        self.manager.import_private_key(bytes)
    }

    /// Imports a private key protected with `password`.
    pub fn import_private_key_with_password(
        &self,
        bytes: &[u8],
        password: &[u8],
    ) -> Result<KeyPair, Error> {
        self.manager.import_private_key_with_password(bytes, password)
    }

    /// Imports a public key.
    pub fn import_public_key(&self, bytes: &[u8]) -> Result<PublicKey, Error> {
        self.manager.import_public_key(bytes)
    }

    /// Exports a private key.
    pub fn export_private_key(&self, key: &PrivateKey) -> Result<Zeroizing<Vec<u8>>, Error> {
        self.manager.export_private_key(key)
    }

    /// Exports a private key encrypted under `password`.
    pub fn export_private_key_with_password<R: RngCore + CryptoRng>(
        &self,
        key: &PrivateKey,
        password: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>, Error> {
        self.manager.export_private_key_with_password(key, password, rng)
    }

    /// Exports a public key.
    pub fn export_public_key(&self, key: &PublicKey) -> Result<Vec<u8>, Error> {
        self.manager.export_public_key(key)
    }

    /// Derives the public key of a private key.
    pub fn extract_public_key(&self, key: &PrivateKey) -> PublicKey {
        self.manager.extract_public_key(key)
    }

    fn seal<R: RngCore + CryptoRng>(
        &self,
        data: &[u8],
        recipients: &[PublicKey],
        signing: SigningOptions,
        padding: bool,
        rng: &mut R,
    ) -> Result<Vec<u8>, Error> {
        Sealer::<_, SealerMemoryConfig>::new(&self.config, &recipient_set(recipients), rng)?
            .with_signing(signing)
            .with_padding(padding)
            .seal(data)
    }

    fn unseal(
        &self,
        data: &[u8],
        key: &PrivateKey,
        verifying: Option<VerifyingOptions>,
    ) -> Result<(Vec<u8>, Option<KeyId>), Error> {
        let unsealer = Unsealer::<_, UnsealerMemoryConfig>::new(data, &self.config)?;
        let unsealer = match verifying {
            Some(v) => unsealer.with_verifying(v),
            None => unsealer,
        };

        unsealer.unseal(key.id(), key)
    }

    /// Encrypts `data` for all `recipients`.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        data: &[u8],
        recipients: &[PublicKey],
        padding: bool,
        rng: &mut R,
    ) -> Result<Vec<u8>, Error> {
        self.seal(data, recipients, SigningOptions::none(), padding, rng)
    }

    /// Decrypts an envelope with the recipient key `key`.
    ///
    /// Signatures, if any, are not verified.
    pub fn decrypt(&self, data: &[u8], key: &PrivateKey) -> Result<Vec<u8>, Error> {
        Ok(self.unseal(data, key, None)?.0)
    }

    /// Signs `data` and encrypts it, with the signature in the header parameters.
    pub fn sign_and_encrypt<R: RngCore + CryptoRng>(
        &self,
        data: &[u8],
        signer: &PrivateKey,
        recipients: &[PublicKey],
        padding: bool,
        rng: &mut R,
    ) -> Result<Vec<u8>, Error> {
        let signing = SigningOptions::sign_and_encrypt(signer);
        self.seal(data, recipients, signing, padding, rng)
    }

    /// Signs `data` and encrypts it, with the signature in the encrypted footer.
    pub fn sign_then_encrypt<R: RngCore + CryptoRng>(
        &self,
        data: &[u8],
        signer: &PrivateKey,
        recipients: &[PublicKey],
        padding: bool,
        rng: &mut R,
    ) -> Result<Vec<u8>, Error> {
        let signing = SigningOptions::sign_then_encrypt(signer);
        self.seal(data, recipients, signing, padding, rng)
    }

    /// Decrypts and verifies the signature in the header parameters.
    ///
    /// With a single candidate, that key is used whatever signer the envelope names.
    pub fn decrypt_and_verify(
        &self,
        data: &[u8],
        key: &PrivateKey,
        signers: &[PublicKey],
    ) -> Result<Vec<u8>, Error> {
        let verifying = VerifyingOptions::new(VerifyingMode::DecryptAndVerify, signers);
        Ok(self.unseal(data, key, Some(verifying))?.0)
    }

    /// Decrypts and verifies the signature in the encrypted footer.
    pub fn decrypt_then_verify(
        &self,
        data: &[u8],
        key: &PrivateKey,
        signers: &[PublicKey],
    ) -> Result<Vec<u8>, Error> {
        let verifying = VerifyingOptions::new(VerifyingMode::DecryptThenVerify, signers);
        Ok(self.unseal(data, key, Some(verifying))?.0)
    }

    /// Decrypts and verifies whichever signature the envelope carries.
    ///
    /// Without `allow_not_encrypted_signature`, only a signature in the encrypted footer is
    /// accepted.
    pub fn auth_decrypt(
        &self,
        data: &[u8],
        key: &PrivateKey,
        signers: &[PublicKey],
        allow_not_encrypted_signature: bool,
    ) -> Result<Vec<u8>, Error> {
        let mode = if allow_not_encrypted_signature {
            VerifyingMode::Any
        } else {
            VerifyingMode::DecryptThenVerify
        };

        Ok(self
            .unseal(data, key, Some(VerifyingOptions::new(mode, signers)))?
            .0)
    }

    /// Encrypts a stream for all `recipients`.
    pub fn encrypt_stream<R, W, Rng>(
        &self,
        r: R,
        w: W,
        recipients: &[PublicKey],
        padding: bool,
        rng: &mut Rng,
    ) -> Result<(), Error>
    where
        R: Read,
        W: Write,
        Rng: RngCore + CryptoRng,
    {
        Sealer::<_, SealerStreamConfig>::new(&self.config, &recipient_set(recipients), rng)?
            .with_padding(padding)
            .seal(r, w)
    }

    /// Decrypts a stream with the recipient key `key`.
    pub fn decrypt_stream<R: Read, W: Write>(
        &self,
        r: R,
        w: W,
        key: &PrivateKey,
    ) -> Result<(), Error> {
        Unsealer::<_, UnsealerStreamConfig>::new(r, &self.config)?.unseal(key.id(), key, w)?;
        Ok(())
    }

    /// Signs and encrypts a stream of exactly `data_size` bytes.
    #[allow(clippy::too_many_arguments)]
    pub fn sign_then_encrypt_stream<R, W, Rng>(
        &self,
        r: R,
        data_size: u64,
        w: W,
        signer: &PrivateKey,
        recipients: &[PublicKey],
        padding: bool,
        rng: &mut Rng,
    ) -> Result<(), Error>
    where
        R: Read,
        W: Write,
        Rng: RngCore + CryptoRng,
    {
        Sealer::<_, SealerStreamConfig>::new(&self.config, &recipient_set(recipients), rng)?
            .with_signing(SigningOptions::sign_then_encrypt(signer))
            .with_padding(padding)
            .with_data_size(data_size)
            .seal(r, w)
    }

    /// Decrypts a stream and verifies the signature in its footer.
    ///
    /// Returns the identifier of the verified signer. Plaintext is written before the signature
    /// is checked, discard it on error.
    pub fn decrypt_then_verify_stream<R: Read, W: Write>(
        &self,
        r: R,
        w: W,
        key: &PrivateKey,
        signers: &[PublicKey],
    ) -> Result<KeyId, Error> {
        Unsealer::<_, UnsealerStreamConfig>::new(r, &self.config)?
            .with_verifying(VerifyingOptions::new(
                VerifyingMode::DecryptThenVerify,
                signers,
            ))
            .unseal(key.id(), key, w)?
            .ok_or(Error::DataIsNotSigned)
    }

    /// Computes a detached signature over the SHA-512 digest of `data`.
    pub fn generate_signature(&self, data: &[u8], key: &PrivateKey) -> Result<Vec<u8>, Error> {
        sign_digest(&Sha512::digest(data), key)
    }

    /// Computes a detached signature over the SHA-512 digest of a stream.
    pub fn generate_stream_signature<R: Read>(
        &self,
        r: R,
        key: &PrivateKey,
    ) -> Result<Vec<u8>, Error> {
        sign_digest(&self.stream_digest(r)?, key)
    }

    /// Verifies a detached signature over `data`.
    ///
    /// Malformed signatures and keys that can not verify yield `false`.
    pub fn verify_signature(&self, signature: &[u8], data: &[u8], key: &PublicKey) -> bool {
        verify_digest(&Sha512::digest(data), signature, key)
    }

    /// Verifies a detached signature over a stream.
    pub fn verify_stream_signature<R: Read>(
        &self,
        signature: &[u8],
        r: R,
        key: &PublicKey,
    ) -> Result<bool, Error> {
        Ok(verify_digest(&self.stream_digest(r)?, signature, key))
    }

    fn stream_digest<R: Read>(&self, mut r: R) -> Result<Vec<u8>, Error> {
        let mut hasher = Sha512::new();
        let mut buf = vec![0u8; self.config.read_chunk_size];

        loop {
            let read = read_chunk(&mut r, &mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }

        Ok(hasher.finalize().to_vec())
    }

    /// Hashes `data`.
    pub fn compute_hash(&self, data: &[u8], algorithm: HashAlgorithm) -> Vec<u8> {
        match algorithm {
            HashAlgorithm::Sha224 => Sha224::digest(data).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

fn sign_digest(digest: &[u8], key: &PrivateKey) -> Result<Vec<u8>, Error> {
    if !key.key_type().can_sign() {
        return Err(Error::KeyDoesntSupportSigning);
    }

    key.material.sign(digest)
}

fn verify_digest(digest: &[u8], signature: &[u8], key: &PublicKey) -> bool {
    key.material.verify(digest, signature).unwrap_or(false)
}
