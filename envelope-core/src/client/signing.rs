//! Signer binding.
//!
//! A signature over the plaintext is bound to an envelope in one of two ways:
//!
//! * [`SigningMode::SignAndEncrypt`]: the signature and signer identifier are stored as custom
//!   parameters in the header. They are authenticated, but readable by anyone holding the
//!   envelope. Signing requires the complete plaintext before the header is written.
//!
//! * [`SigningMode::SignThenEncrypt`]: the signer records are stored in a [`Footer`] after the
//!   body, encrypted under the content-encryption key. The plaintext length has to be declared
//!   up front, so the decryptor knows where the body ends.
//!
//! Signatures are always computed over the SHA-512 digest of the plaintext.

use crate::artifacts::{deserialize_bytes_or_b64, serialize_bytes_or_b64, KeyId};
use crate::config::EnvelopeConfig;
use crate::consts::MAX_FOOTER_SIZE;
use crate::error::Error;
use crate::keys::{PrivateKey, PublicKey};

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use bincode::Options;
use log::warn;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

/// SHA-512 digest of the plaintext, the message of every envelope signature.
pub(crate) type DataDigest = [u8; 64];

pub(crate) fn finalize_digest(h: Sha512) -> DataDigest {
    let mut out = [0u8; 64];
    out.copy_from_slice(&h.finalize());
    out
}

pub(crate) fn data_digest(data: &[u8]) -> DataDigest {
    finalize_digest(Sha512::new_with_prefix(data))
}

/// How a signature is bound to the envelope.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SigningMode {
    /// No signature.
    #[default]
    None,
    /// Signature and signer identifier as header parameters.
    SignAndEncrypt,
    /// Signer records in an encrypted footer.
    SignThenEncrypt,
}

/// The binding mode and the signing key.
#[derive(Debug, Clone, Default)]
pub struct SigningOptions {
    /// The binding mode.
    pub mode: SigningMode,
    /// The signing key, required unless the mode is [`SigningMode::None`].
    pub key: Option<PrivateKey>,
}

impl SigningOptions {
    /// No signature.
    pub fn none() -> Self {
        Self::default()
    }

    /// Sign before encrypting, with the signature in the header.
    pub fn sign_and_encrypt(key: &PrivateKey) -> Self {
        Self {
            mode: SigningMode::SignAndEncrypt,
            key: Some(key.clone()),
        }
    }

    /// Sign the plaintext and encrypt the signature into the footer.
    pub fn sign_then_encrypt(key: &PrivateKey) -> Self {
        Self {
            mode: SigningMode::SignThenEncrypt,
            key: Some(key.clone()),
        }
    }

    pub(crate) fn signing_key(&self) -> Result<Option<&PrivateKey>, Error> {
        match (self.mode, &self.key) {
            (SigningMode::None, _) => Ok(None),
            (_, Some(key)) if key.key_type().can_sign() => Ok(Some(key)),
            _ => Err(Error::KeyDoesntSupportSigning),
        }
    }
}

/// How the signature of an envelope is verified.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerifyingMode {
    /// Verify the header parameters of a sign-and-encrypt envelope.
    DecryptAndVerify,
    /// Verify the single signer record in the footer.
    DecryptThenVerify,
    /// Verify the footer when the envelope has one, the header parameters otherwise.
    #[default]
    Any,
}

impl VerifyingMode {
    /// Resolves [`VerifyingMode::Any`] given whether the envelope has a footer.
    pub fn resolve(self, signed: bool) -> Self {
        match self {
            Self::Any if signed => Self::DecryptThenVerify,
            Self::Any => Self::DecryptAndVerify,
            other => other,
        }
    }
}

/// The verification mode and the candidate signer keys.
#[derive(Debug, Clone, Default)]
pub struct VerifyingOptions {
    /// The verification mode.
    pub mode: VerifyingMode,
    /// Public keys accepted as signer.
    pub keys: Vec<PublicKey>,
}

impl VerifyingOptions {
    /// Creates verifying options.
    pub fn new(mode: VerifyingMode, keys: &[PublicKey]) -> Self {
        Self {
            mode,
            keys: keys.to_vec(),
        }
    }
}

/// A signature and the identifier of the key that made it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerRecord {
    /// The signer identifier.
    pub id: KeyId,

    /// The signature over the plaintext digest.
    #[serde(
        serialize_with = "serialize_bytes_or_b64",
        deserialize_with = "deserialize_bytes_or_b64"
    )]
    pub signature: Vec<u8>,
}

/// The plaintext of the encrypted footer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footer {
    /// All signer records.
    pub signers: Vec<SignerRecord>,
}

fn footer_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_FOOTER_SIZE as u64)
        .reject_trailing_bytes()
}

impl Footer {
    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let bytes = footer_options().serialize(self)?;
        if bytes.len() > MAX_FOOTER_SIZE {
            return Err(Error::ConstraintViolation);
        }

        Ok(bytes)
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Ok(footer_options().deserialize(bytes)?)
    }
}

pub(crate) fn sign(key: &PrivateKey, digest: &DataDigest) -> Result<SignerRecord, Error> {
    Ok(SignerRecord {
        id: key.id().clone(),
        signature: key.material.sign(digest)?,
    })
}

/// Adds the sign-and-encrypt parameters to the header parameters.
pub(crate) fn embed_params(
    config: &EnvelopeConfig,
    params: &mut BTreeMap<String, Vec<u8>>,
    record: SignerRecord,
) {
    params.insert(config.signature_param_key.clone(), record.signature);
    params.insert(
        config.signer_id_param_key.clone(),
        record.id.as_bytes().to_vec(),
    );
}

fn verified(key: &PublicKey, digest: &DataDigest, signature: &[u8]) -> Result<KeyId, Error> {
    if key.material.verify(digest, signature)? {
        Ok(key.id().clone())
    } else {
        warn!("signature by {} did not verify", key.id());
        Err(Error::SignatureNotVerified)
    }
}

/// Verifies the signature in the header parameters.
///
/// A single candidate is used regardless of the embedded signer identifier. With more
/// candidates, the identifier selects one.
pub(crate) fn verify_params(
    config: &EnvelopeConfig,
    params: &BTreeMap<String, Vec<u8>>,
    candidates: &[PublicKey],
    digest: &DataDigest,
) -> Result<KeyId, Error> {
    let key = match candidates {
        [single] => single,
        _ => {
            let id = params
                .get(&config.signer_id_param_key)
                .map(|id| KeyId::from_bytes(id.as_slice()))
                .ok_or(Error::SignerNotFound)?;

            candidates
                .iter()
                .find(|pk| pk.id() == &id)
                .ok_or(Error::SignerNotFound)?
        }
    };

    let signature = params
        .get(&config.signature_param_key)
        .ok_or(Error::SignatureNotFound)?;

    verified(key, digest, signature)
}

/// Verifies the single signer record of a footer.
pub(crate) fn verify_footer(
    footer: &Footer,
    candidates: &[PublicKey],
    digest: &DataDigest,
) -> Result<KeyId, Error> {
    let [record] = &footer.signers[..] else {
        return Err(Error::DataIsNotSigned);
    };

    let key = candidates
        .iter()
        .find(|pk| pk.id() == &record.id)
        .ok_or(Error::SignerNotFound)?;

    verified(key, digest, &record.signature)
}
