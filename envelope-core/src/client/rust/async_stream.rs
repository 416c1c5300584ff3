//! Streaming mode over asynchronous byte streams.
//!
//! Behaves exactly like [`super::stream`], only the reads and writes are awaited.

use alloc::string::ToString;
use alloc::vec::Vec;
use std::io;

use crate::artifacts::KeyId;
use crate::client::rust::stream::stream_mode_checked;
use crate::client::*;
use crate::config::EnvelopeConfig;
use crate::error::Error;
use crate::keys::PrivateKey;

use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use log::debug;
use rand::{CryptoRng, RngCore};

/// Configures a [`Sealer`] to process an asynchronous payload stream.
#[derive(Debug)]
pub struct SealerAsyncStreamConfig {
    data_size: Option<u64>,
    read_chunk_size: usize,
}

/// Configures an [`Unsealer`] to process an asynchronous payload stream.
#[derive(Debug)]
pub struct UnsealerAsyncStreamConfig {
    read_chunk_size: usize,
}

impl SealerConfig for SealerAsyncStreamConfig {}
impl UnsealerConfig for UnsealerAsyncStreamConfig {}
impl crate::client::sealed::SealerConfig for SealerAsyncStreamConfig {}
impl crate::client::sealed::UnsealerConfig for UnsealerAsyncStreamConfig {}

async fn read_chunk<R: AsyncRead + Unpin>(r: &mut R, buf: &mut [u8]) -> Result<usize, Error> {
    loop {
        match r.read(buf).await {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::InputStreamError(e)),
        }
    }
}

async fn write_out<W: AsyncWrite + Unpin>(w: &mut W, data: &[u8]) -> Result<(), Error> {
    w.write_all(data).await.map_err(Error::OutputStreamError)
}

impl<'r, Rng: RngCore + CryptoRng> Sealer<'r, Rng, SealerAsyncStreamConfig> {
    /// Construct a new [`Sealer`] that can process asynchronous payload streams.
    pub fn new(
        config: &EnvelopeConfig,
        recipients: &RecipientSet,
        rng: &'r mut Rng,
    ) -> Result<Self, Error> {
        Ok(Sealer {
            encryptor: EnvelopeEncryptor::new(config, rng)?.with_recipients(recipients),
            config: SealerAsyncStreamConfig {
                data_size: None,
                read_chunk_size: config.read_chunk_size,
            },
        })
    }

    /// Declares the exact plaintext size, required for sign-then-encrypt.
    pub fn with_data_size(mut self, size: u64) -> Self {
        self.config.data_size = Some(size);
        self
    }

    /// Seals payload data from an [`AsyncRead`] into an [`AsyncWrite`].
    ///
    /// The writer is closed afterwards.
    pub async fn seal<R, W>(self, mut r: R, mut w: W) -> Result<(), Error>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        if self.encryptor.signing_mode() == SigningMode::SignAndEncrypt {
            return Err(Error::UnsupportedOperation("sign-and-encrypt over a stream"));
        }

        let (mut session, mut out) = self.encryptor.start(self.config.data_size)?;
        write_out(&mut w, &out).await?;

        let mut buf = vec![0u8; self.config.read_chunk_size];

        loop {
            let read = read_chunk(&mut r, &mut buf).await?;
            if read == 0 {
                break;
            }

            out.clear();
            session.update(&buf[..read], &mut out)?;
            write_out(&mut w, &out).await?;
        }

        out.clear();
        session.finish(&mut out)?;
        write_out(&mut w, &out).await?;

        w.flush().await.map_err(Error::OutputStreamError)?;
        w.close().await.map_err(Error::OutputStreamError)
    }
}

impl<R> Unsealer<R, UnsealerAsyncStreamConfig>
where
    R: AsyncRead + Unpin,
{
    /// Create a new [`Unsealer`] that starts reading from an [`AsyncRead`].
    ///
    /// Errors if the bytestream is not an envelope.
    pub async fn new(mut r: R, config: &EnvelopeConfig) -> Result<Self, Error> {
        config.validate()?;

        let mut reader = HeaderReader::new();
        let mut buf = Vec::new();

        let parsed = loop {
            buf.resize(reader.remaining().min(config.read_chunk_size), 0);

            let read = read_chunk(&mut r, &mut buf).await?;
            if read == 0 {
                return Err(if reader.in_preamble() {
                    Error::NotEnvelope
                } else {
                    Error::FormatViolation("header".to_string())
                });
            }

            if let (_, Some(parsed)) = reader.push(&buf[..read])? {
                break parsed;
            }
        };

        Ok(Unsealer {
            version: parsed.version,
            header: parsed.header,
            digest: parsed.digest,
            r, // This reader is now at the first body byte.
            config: UnsealerAsyncStreamConfig {
                read_chunk_size: config.read_chunk_size,
            },
            envelope: config.clone(),
            verifying: None,
        })
    }

    /// Unseal the remaining data (which is now only payload) into an [`AsyncWrite`].
    ///
    /// The writer is closed afterwards. On error, discard everything written.
    pub async fn unseal<W: AsyncWrite + Unpin>(
        mut self,
        id: &KeyId,
        key: &PrivateKey,
        mut w: W,
    ) -> Result<Option<KeyId>, Error> {
        let signed = self.header.signed.is_some();
        stream_mode_checked(self.verifying.as_ref().map(|v| v.mode.resolve(signed)))?;

        let mut session = self.start_session(id, key)?;

        let mut buf = vec![0u8; self.config.read_chunk_size];
        let mut out = Vec::new();

        loop {
            let read = read_chunk(&mut self.r, &mut buf).await?;
            if read == 0 {
                break;
            }

            out.clear();
            session.update(&buf[..read], &mut out)?;
            write_out(&mut w, &out).await?;
        }

        out.clear();
        let signer = session.finish(&mut out)?;
        write_out(&mut w, &out).await?;

        w.flush().await.map_err(Error::OutputStreamError)?;
        w.close().await.map_err(Error::OutputStreamError)?;

        debug!("unsealed async stream");

        Ok(signer)
    }
}
