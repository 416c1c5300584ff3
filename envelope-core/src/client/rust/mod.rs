//! Drivers that run the envelope state machines over byte buffers and byte streams.
//!
//! The in-memory drivers in this module seal or unseal a complete message at once. The blocking
//! drivers in [`stream`] read from a [`std::io::Read`] and write to a [`std::io::Write`]. With
//! the feature `stream`, [`async_stream`] offers the same over asynchronous byte streams, from an
//! [AsyncRead][`futures::io::AsyncRead`] into an [AsyncWrite][`futures::io::AsyncWrite`].
//!
//! All drivers produce the same bytes for the same input and random number generator.

use alloc::string::ToString;
use alloc::vec::Vec;

use crate::artifacts::KeyId;
use crate::client::*;
use crate::config::EnvelopeConfig;
use crate::error::Error;
use crate::keys::PrivateKey;

use rand::{CryptoRng, RngCore};

pub mod stream;

#[cfg(feature = "stream")]
pub mod async_stream;

/// In-memory configuration for a [`Sealer`].
#[derive(Debug)]
pub struct SealerMemoryConfig;

/// In-memory configuration for an [`Unsealer`].
#[derive(Debug)]
pub struct UnsealerMemoryConfig {
    message_len: usize,
}

impl SealerConfig for SealerMemoryConfig {}
impl super::sealed::SealerConfig for SealerMemoryConfig {}

impl UnsealerConfig for UnsealerMemoryConfig {}
impl super::sealed::UnsealerConfig for UnsealerMemoryConfig {}

impl<'r, R: RngCore + CryptoRng> Sealer<'r, R, SealerMemoryConfig> {
    /// Create a new [`Sealer`].
    pub fn new(
        config: &EnvelopeConfig,
        recipients: &RecipientSet,
        rng: &'r mut R,
    ) -> Result<Self, Error> {
        Ok(Self {
            encryptor: EnvelopeEncryptor::new(config, rng)?.with_recipients(recipients),
            config: SealerMemoryConfig,
        })
    }

    /// Seals the entire payload.
    pub fn seal(mut self, message: impl AsRef<[u8]>) -> Result<Vec<u8>, Error> {
        let message = message.as_ref();

        if self.encryptor.signing_mode() == SigningMode::SignAndEncrypt {
            self.encryptor.presign(message)?;
        }

        let (mut session, mut out) = self.encryptor.start(Some(message.len().try_into()?))?;

        out.reserve(message.len() + 1024);
        session.update(message, &mut out)?;
        session.finish(&mut out)?;

        Ok(out)
    }
}

impl Unsealer<Vec<u8>, UnsealerMemoryConfig> {
    /// Create a new [`Unsealer`].
    ///
    /// Reads the preamble and header. The recipients can be inspected before unsealing.
    pub fn new(input: impl AsRef<[u8]>, config: &EnvelopeConfig) -> Result<Self, Error> {
        config.validate()?;

        let b = input.as_ref();
        let mut reader = HeaderReader::new();
        let (consumed, parsed) = reader.push(b)?;

        let Some(ParsedHeader {
            version,
            header,
            digest,
        }) = parsed
        else {
            return Err(if reader.in_preamble() {
                Error::NotEnvelope
            } else {
                Error::FormatViolation("header".to_string())
            });
        };

        let body = &b[consumed..];

        Ok(Self {
            version,
            header,
            digest,
            r: body.to_vec(),
            config: UnsealerMemoryConfig {
                message_len: body.len(),
            },
            envelope: config.clone(),
            verifying: None,
        })
    }

    /// Unseals the payload with the private key of recipient `id`.
    ///
    /// Returns the plaintext and, when verifying, the identifier of the verified signer.
    pub fn unseal(
        mut self,
        id: &KeyId,
        key: &PrivateKey,
    ) -> Result<(Vec<u8>, Option<KeyId>), Error> {
        let mut session = self.start_session(id, key)?;
        let mut out = Vec::with_capacity(self.config.message_len);

        session.update(&self.r, &mut out)?;
        let signer = session.finish(&mut out)?;

        Ok((out, signer))
    }
}
