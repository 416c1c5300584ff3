//! Envelope header definitions.

use crate::artifacts::{deserialize_bin_or_b64, serialize_bin_or_b64};
use crate::artifacts::{deserialize_bytes_or_b64, serialize_bytes_or_b64, KeyId};
use crate::client::padding::{body_len, padded_len};
use crate::config::ContentAlgorithm;
use crate::consts::*;
use crate::error::Error;
use crate::keys::{PrivateKey, PublicKey};

use aead::generic_array::GenericArray;
use aead::{Aead, KeyInit, Payload};
use aes_gcm::Aes256Gcm;
use alloc::collections::BTreeMap;
use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::fmt::Debug;
use std::io::{Read, Write};
use zeroize::Zeroizing;

/// An initialization vector (IV).
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct Iv<const N: usize>(pub [u8; N]);

impl<const N: usize> Iv<N> {
    pub(crate) fn random<R: RngCore + CryptoRng>(r: &mut R) -> Self {
        let mut buf = [0u8; N];
        r.fill_bytes(&mut buf);
        Self(buf)
    }
}

// The IV is not secret but we do want to have the possibility to encode it as human-readable.
impl<const N: usize> Serialize for Iv<N> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_bin_or_b64(&self.0, serializer)
    }
}

impl<'de, const N: usize> Deserialize<'de> for Iv<N> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let mut buf = [0u8; N];
        deserialize_bin_or_b64(&mut buf, deserializer)?;

        Ok(Self(buf))
    }
}

/// Supported symmetric-key encryption algorithms for the payload and the footer.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Clone, Copy)]
pub enum Algorithm {
    /// AES-256-GCM.
    // Good performance with hardware acceleration.
    Aes256Gcm(Iv<IV_SIZE>),

    /// ChaCha20-Poly1305.
    ChaCha20Poly1305(Iv<IV_SIZE>),
}

impl Algorithm {
    pub(crate) fn new<R: RngCore + CryptoRng>(alg: ContentAlgorithm, r: &mut R) -> Self {
        match alg {
            ContentAlgorithm::Aes256Gcm => Self::Aes256Gcm(Iv::random(r)),
            ContentAlgorithm::ChaCha20Poly1305 => Self::ChaCha20Poly1305(Iv::random(r)),
        }
    }

    /// The IV, of which the first 7 bytes prefix every STREAM nonce.
    pub fn iv(&self) -> &Iv<IV_SIZE> {
        match self {
            Self::Aes256Gcm(iv) | Self::ChaCha20Poly1305(iv) => iv,
        }
    }
}

/// Present when the body is followed by an encrypted footer of signer records.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Clone, Copy)]
pub struct SignedInfo {
    /// The declared plaintext length, which fixes the length of the body.
    pub data_size: u64,

    /// The IV of the footer AEAD.
    pub footer_iv: Iv<IV_SIZE>,
}

/// A header contains header data for _all_ recipients.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Header {
    /// The wrapped content-encryption keys, in the order recipients were added.
    #[serde(rename = "rs")]
    pub recipients: Vec<RecipientHeader>,

    /// The symmetric-key encryption algorithm used.
    pub algo: Algorithm,

    /// Plaintext bytes per segment.
    pub segment_size: u32,

    /// The padding frame, if the plaintext is padded.
    #[serde(default)]
    pub padding: Option<u32>,

    /// Signer footer information.
    #[serde(default)]
    pub signed: Option<SignedInfo>,

    /// Custom parameters.
    ///
    /// These are authenticated as part of the header, but not encrypted.
    #[serde(default)]
    pub params: BTreeMap<String, Vec<u8>>,
}

/// Contains header data specific to _one_ recipient.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RecipientHeader {
    /// The recipient identifier.
    pub id: KeyId,

    /// The key encapsulation, from which the recipient derives the key-encryption key.
    #[serde(
        serialize_with = "serialize_bytes_or_b64",
        deserialize_with = "deserialize_bytes_or_b64"
    )]
    pub encapsulation: Vec<u8>,

    /// The IV of the key wrap.
    pub iv: Iv<IV_SIZE>,

    /// The wrapped content-encryption key.
    #[serde(
        serialize_with = "serialize_bytes_or_b64",
        deserialize_with = "deserialize_bytes_or_b64"
    )]
    pub wrapped_key: Vec<u8>,
}

fn derive_kek(encapsulation: &[u8], secret: &[u8], id: &KeyId) -> Result<Zeroizing<[u8; KEY_SIZE]>, Error> {
    let mut kek = Zeroizing::new([0u8; KEY_SIZE]);
    Hkdf::<Sha512>::new(Some(encapsulation), secret)
        .expand_multi_info(&[KEK_INFO, id.as_bytes()], &mut kek[..])
        .map_err(|_| Error::Kem)?;

    Ok(kek)
}

impl RecipientHeader {
    /// Wraps the content-encryption key for one recipient.
    pub(crate) fn seal<R: RngCore + CryptoRng>(
        id: &KeyId,
        pk: &PublicKey,
        cek: &[u8; KEY_SIZE],
        rng: &mut R,
    ) -> Result<Self, Error> {
        let (encapsulation, secret) = pk.material.encapsulate(rng)?;
        let kek = derive_kek(&encapsulation, &secret, id)?;
        let iv = Iv::<IV_SIZE>::random(rng);

        let wrapped_key = Aes256Gcm::new_from_slice(&kek[..])?.encrypt(
            GenericArray::from_slice(&iv.0),
            Payload {
                msg: cek,
                aad: id.as_bytes(),
            },
        )?;

        Ok(Self {
            id: id.clone(),
            encapsulation,
            iv,
            wrapped_key,
        })
    }

    /// Unwraps the content-encryption key using the recipient's private key.
    ///
    /// A failing key exchange results in [`Error::Kem`], a failing unwrap (for instance a wrong
    /// key under a matching identifier) in [`Error::Symmetric`].
    pub fn unseal(&self, sk: &PrivateKey) -> Result<Zeroizing<[u8; KEY_SIZE]>, Error> {
        let secret = sk.material.decapsulate(&self.encapsulation)?;
        let kek = derive_kek(&self.encapsulation, &secret, &self.id)?;

        let cek = Zeroizing::new(Aes256Gcm::new_from_slice(&kek[..])?.decrypt(
            GenericArray::from_slice(&self.iv.0),
            Payload {
                msg: &self.wrapped_key,
                aad: self.id.as_bytes(),
            },
        )?);

        if cek.len() != KEY_SIZE {
            return Err(Error::Symmetric);
        }

        let mut out = Zeroizing::new([0u8; KEY_SIZE]);
        out.copy_from_slice(&cek);

        Ok(out)
    }
}

impl Header {
    /// Serializes the [`Header`] as compact binary format into a [`Write`].
    pub fn into_bytes<W: Write>(&self, w: &mut W) -> Result<(), Error> {
        bincode::serialize_into(w, self).map_err(Error::Bincode)
    }

    /// Deserialize the header from binary format from a [`Read`].
    pub fn from_bytes<R: Read>(r: R) -> Result<Self, Error> {
        bincode::deserialize_from(r).map_err(Error::Bincode)
    }

    /// Serializes the header to a JSON string.
    ///
    /// Should only be used for small header or development purposes,
    /// or when compactness is not required.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(Error::Json)
    }

    /// Deserialize the header from a JSON string.
    pub fn from_json(s: &str) -> Result<Self, Error> {
        serde_json::from_str(s).map_err(Error::Json)
    }

    /// Checks the segmentation parameters.
    pub fn validate(&self) -> Result<(), Error> {
        if self.segment_size == 0 || self.segment_size > MAX_SYMMETRIC_CHUNK_SIZE {
            return Err(Error::ConstraintViolation);
        }

        if let Some(frame) = self.padding {
            if frame == 0 || frame > self.segment_size {
                return Err(Error::ConstraintViolation);
            }
        }

        Ok(())
    }

    /// The first recipient entry addressed to `id`.
    pub fn find_recipient(&self, id: &KeyId) -> Option<&RecipientHeader> {
        self.recipients.iter().find(|r| &r.id == id)
    }

    /// The length of the body of a signed envelope, which precedes the footer.
    ///
    /// Returns `None` for unsigned envelopes, in which the body runs until the end.
    pub fn signed_body_len(&self) -> Result<Option<u64>, Error> {
        let Some(info) = self.signed else {
            return Ok(None);
        };

        let plain_len = match self.padding {
            Some(frame) => padded_len(info.data_size, self.segment_size, frame)?,
            None => info.data_size,
        };

        body_len(plain_len, self.segment_size).map(Some)
    }
}
