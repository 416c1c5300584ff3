//! The envelope encryptor.
//!
//! An [`EnvelopeEncryptor`] collects recipients, signing options, padding and custom
//! parameters. [`EnvelopeEncryptor::start`] wraps a fresh content-encryption key for every
//! recipient and returns the preamble and header together with an [`EncryptionSession`], which
//! encrypts the payload incrementally.

use crate::client::header::{Algorithm, Header, Iv, RecipientHeader, SignedInfo};
use crate::client::padding::padding;
use crate::client::recipients::RecipientSet;
use crate::client::signing::{
    data_digest, embed_params, finalize_digest, sign, DataDigest, Footer, SignerRecord,
    SigningMode, SigningOptions,
};
use crate::client::symmetric::{self, StreamEncryptor};
use crate::artifacts::KeyId;
use crate::config::EnvelopeConfig;
use crate::consts::*;
use crate::error::Error;
use crate::keys::{PrivateKey, PublicKey};
use crate::util::{header_digest, preamble, HeaderDigest};

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::fmt;
use log::{debug, trace};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha512};
use zeroize::Zeroizing;

/// Configures a single envelope.
#[derive(Debug)]
pub struct EnvelopeEncryptor<'r, R> {
    config: EnvelopeConfig,
    rng: &'r mut R,
    recipients: RecipientSet,
    signing: SigningOptions,
    padding: bool,
    params: BTreeMap<String, Vec<u8>>,
    presigned: Option<(u64, DataDigest, SignerRecord)>,
}

impl<'r, R: RngCore + CryptoRng> EnvelopeEncryptor<'r, R> {
    /// Creates an encryptor without recipients.
    pub fn new(config: &EnvelopeConfig, rng: &'r mut R) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            config: config.clone(),
            rng,
            recipients: RecipientSet::new(),
            signing: SigningOptions::none(),
            padding: false,
            params: BTreeMap::new(),
            presigned: None,
        })
    }

    /// Adds a recipient.
    pub fn add_key_recipient(&mut self, id: KeyId, public_key: PublicKey) {
        self.recipients.add_key_recipient(id, public_key);
    }

    /// Adds all recipients of a set.
    pub fn with_recipients(mut self, recipients: &RecipientSet) -> Self {
        self.recipients
            .extend(recipients.iter().map(|(id, pk)| (id.clone(), pk.clone())));
        self
    }

    /// Sets the signature binding.
    pub fn with_signing(mut self, signing: SigningOptions) -> Self {
        self.signing = signing;
        self.presigned = None;
        self
    }

    /// The configured binding mode.
    pub fn signing_mode(&self) -> SigningMode {
        self.signing.mode
    }

    /// Enables or disables padding to the configured frame.
    pub fn with_padding(mut self, padding: bool) -> Self {
        self.padding = padding;
        self
    }

    /// Adds a custom header parameter.
    ///
    /// Parameters are authenticated but not encrypted. The signature parameter keys of the
    /// configuration are reserved.
    pub fn with_custom_param(mut self, key: &str, value: &[u8]) -> Result<Self, Error> {
        if self.config.is_reserved_param(key) {
            return Err(Error::ConstraintViolation);
        }

        self.params.insert(key.to_string(), value.to_vec());
        Ok(self)
    }

    /// Signs the complete plaintext for [`SigningMode::SignAndEncrypt`].
    ///
    /// The plaintext passed through the session afterwards must be exactly this plaintext.
    pub fn presign(&mut self, plaintext: &[u8]) -> Result<(), Error> {
        if self.signing.mode != SigningMode::SignAndEncrypt {
            return Err(Error::UnsupportedOperation(
                "presigning outside sign-and-encrypt",
            ));
        }

        let key = self
            .signing
            .signing_key()?
            .ok_or(Error::KeyDoesntSupportSigning)?;
        let digest = data_digest(plaintext);
        let record = sign(key, &digest)?;

        self.presigned = Some((plaintext.len().try_into()?, digest, record));

        Ok(())
    }

    /// Wraps a fresh content-encryption key for all recipients.
    ///
    /// Returns the session and the preamble and header, which start the envelope. Sign-then-
    /// encrypt needs the plaintext length in `data_size`.
    pub fn start(self, data_size: Option<u64>) -> Result<(EncryptionSession, Vec<u8>), Error> {
        if self.recipients.is_empty() {
            return Err(Error::NoRecipients);
        }

        let signing_key = self.signing.signing_key()?.cloned();
        let mut params = self.params;
        let mut expected = None;
        let mut signed = None;
        let mut presigned_digest = None;
        let mut footer_key = None;

        match self.signing.mode {
            SigningMode::None => {}
            SigningMode::SignAndEncrypt => {
                let (len, digest, record) = self.presigned.ok_or(Error::UnsupportedOperation(
                    "sign-and-encrypt without the complete plaintext",
                ))?;

                if let Some(size) = data_size {
                    if size != len {
                        return Err(Error::DataSizeMismatch {
                            expected: len,
                            actual: size,
                        });
                    }
                }

                embed_params(&self.config, &mut params, record);
                expected = Some(len);
                presigned_digest = Some(digest);
            }
            SigningMode::SignThenEncrypt => {
                let size = data_size.ok_or(Error::UnsupportedOperation(
                    "sign-then-encrypt without a declared data size",
                ))?;

                expected = Some(size);
                footer_key = signing_key;
            }
        }

        let rng = self.rng;

        let mut cek = Zeroizing::new([0u8; KEY_SIZE]);
        rng.fill_bytes(&mut cek[..]);

        let recipients = self
            .recipients
            .iter()
            .map(|(id, pk)| RecipientHeader::seal(id, pk, &cek, rng))
            .collect::<Result<Vec<_>, _>>()?;

        let algo = Algorithm::new(self.config.content_algorithm, rng);

        if let (Some(size), true) = (expected, footer_key.is_some()) {
            signed = Some(SignedInfo {
                data_size: size,
                footer_iv: Iv::random(rng),
            });
        }

        let header = Header {
            recipients,
            algo,
            segment_size: self.config.segment_size,
            padding: self.padding.then_some(self.config.padding_frame),
            signed,
            params,
        };

        let header_bytes = bincode::serialize(&header)?;
        let preamble = preamble(header_bytes.len())?;
        let aad = header_digest(&preamble, &header_bytes);

        let mut out = Vec::with_capacity(PREAMBLE_SIZE + header_bytes.len());
        out.extend_from_slice(&preamble);
        out.extend_from_slice(&header_bytes);

        debug!(
            "sealing for {} recipient(s), {:?}, segment size {}, padded: {}",
            header.recipients.len(),
            self.signing.mode,
            header.segment_size,
            header.padding.is_some()
        );

        let segment_size = header.segment_size as usize;
        let hasher = (footer_key.is_some() || presigned_digest.is_some()).then(Sha512::new);

        let session = EncryptionSession {
            enc: StreamEncryptor::new(&algo, &cek[..])?,
            aad,
            algo,
            cek,
            segment_size,
            padding: header.padding,
            buf: Vec::with_capacity(segment_size + TAG_SIZE),
            processed: 0,
            expected,
            hasher,
            presigned: presigned_digest,
            footer: footer_key.zip(header.signed.map(|s| s.footer_iv)),
        };

        Ok((session, out))
    }
}

/// Encrypts the payload of one envelope.
///
/// Obtained from [`EnvelopeEncryptor::start`]. Dropping the session abandons the envelope.
pub struct EncryptionSession {
    enc: StreamEncryptor,
    aad: HeaderDigest,
    algo: Algorithm,
    cek: Zeroizing<[u8; KEY_SIZE]>,
    segment_size: usize,
    padding: Option<u32>,
    buf: Vec<u8>,
    processed: u64,
    expected: Option<u64>,
    hasher: Option<Sha512>,
    presigned: Option<DataDigest>,
    footer: Option<(PrivateKey, Iv<IV_SIZE>)>,
}

impl fmt::Debug for EncryptionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionSession")
            .field("algo", &self.algo)
            .field("segment_size", &self.segment_size)
            .field("padding", &self.padding)
            .field("processed", &self.processed)
            .field("expected", &self.expected)
            .finish_non_exhaustive()
    }
}

impl EncryptionSession {
    /// Encrypts the next plaintext chunk, appending ciphertext to `out`.
    ///
    /// Chunk boundaries do not show in the ciphertext.
    pub fn update(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Result<(), Error> {
        self.processed += chunk.len() as u64;

        if let Some(expected) = self.expected {
            if self.processed > expected {
                return Err(Error::DataSizeMismatch {
                    expected,
                    actual: self.processed,
                });
            }
        }

        if let Some(h) = self.hasher.as_mut() {
            h.update(chunk);
        }

        self.feed(chunk, out)
    }

    /// The number of plaintext bytes processed so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    // A full segment is only encrypted once more data arrives, so the last segment is never
    // emitted as a non-final one.
    fn feed(&mut self, mut data: &[u8], out: &mut Vec<u8>) -> Result<(), Error> {
        while !data.is_empty() {
            if self.buf.len() == self.segment_size {
                self.enc.encrypt_next(&self.aad, &mut self.buf)?;
                trace!("segment of {} bytes", self.buf.len());
                out.extend_from_slice(&self.buf);
                self.buf.clear();
            }

            let take = core::cmp::min(self.segment_size - self.buf.len(), data.len());
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];
        }

        Ok(())
    }

    /// Emits the last segment and, for sign-then-encrypt, the encrypted footer.
    pub fn finish(mut self, out: &mut Vec<u8>) -> Result<(), Error> {
        if let Some(expected) = self.expected {
            if self.processed != expected {
                return Err(Error::DataSizeMismatch {
                    expected,
                    actual: self.processed,
                });
            }
        }

        let digest = self.hasher.take().map(finalize_digest);

        if let (Some(presigned), Some(digest)) = (self.presigned, digest) {
            if presigned != digest {
                return Err(Error::ConstraintViolation);
            }
        }

        if let Some(frame) = self.padding {
            let pad = padding(self.processed, self.segment_size as u32, frame)?;
            self.feed(&pad, out)?;
        }

        let mut last = core::mem::take(&mut self.buf);
        self.enc.encrypt_last(&self.aad, &mut last)?;
        out.extend_from_slice(&last);

        if let (Some((key, iv)), Some(digest)) = (self.footer, digest) {
            let footer = Footer {
                signers: vec![sign(&key, &digest)?],
            };

            let ct = symmetric::seal(&self.algo, &self.cek[..], &iv, &self.aad, &footer.to_bytes()?)?;
            out.extend_from_slice(&ct);

            debug!("appended footer signed by {}", key.id());
        }

        Ok(())
    }
}
