//! The envelope decryptor.
//!
//! Decryption happens in two phases. A [`HeaderReader`] consumes the preamble and the header,
//! after which the caller can inspect the recipients. A [`DecryptionSession`] then unwraps the
//! content-encryption key and decrypts the body. The [`EnvelopeDecryptor`] combines both for
//! callers that simply feed the envelope from its first byte.

use crate::artifacts::KeyId;
use crate::client::header::{Algorithm, Header};
use crate::client::padding::Unpadder;
use crate::client::signing::{
    finalize_digest, verify_footer, verify_params, Footer, VerifyingMode, VerifyingOptions,
};
use crate::client::symmetric::{self, StreamDecryptor};
use crate::config::EnvelopeConfig;
use crate::consts::*;
use crate::error::Error;
use crate::keys::{PrivateKey, PublicKey};
use crate::util::{header_digest, preamble_checked, HeaderDigest};

use alloc::string::ToString;
use alloc::vec::Vec;
use core::fmt;
use log::{debug, trace};
use sha2::{Digest, Sha512};
use zeroize::Zeroizing;

/// A parsed and validated header.
#[derive(Debug, Clone)]
pub struct ParsedHeader {
    /// The version found in the preamble.
    pub version: u16,

    /// The header.
    pub header: Header,

    pub(crate) digest: HeaderDigest,
}

/// Reads the preamble and header of an envelope.
#[derive(Debug, Default)]
pub struct HeaderReader {
    buf: Vec<u8>,
    header_len: Option<usize>,
}

impl HeaderReader {
    /// Creates a reader expecting the first byte of an envelope.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of bytes needed to complete the current part (preamble or header).
    ///
    /// Stream readers request exactly this many bytes so they never read into the body.
    pub fn remaining(&self) -> usize {
        match self.header_len {
            None => PREAMBLE_SIZE - self.buf.len(),
            Some(len) => PREAMBLE_SIZE + len - self.buf.len(),
        }
    }

    pub(crate) fn in_preamble(&self) -> bool {
        self.header_len.is_none()
    }

    /// Consumes bytes from `data`.
    ///
    /// Returns the number of bytes consumed and, once complete, the parsed header. Bytes after
    /// the header are not consumed.
    pub fn push(&mut self, mut data: &[u8]) -> Result<(usize, Option<ParsedHeader>), Error> {
        let mut consumed = 0;

        loop {
            let take = core::cmp::min(self.remaining(), data.len());
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];
            consumed += take;

            if self.remaining() > 0 {
                return Ok((consumed, None));
            }

            match self.header_len {
                None => {
                    let (_, header_len) = preamble_checked(&self.buf)?;
                    self.header_len = Some(header_len);
                    self.buf.reserve(header_len);
                }
                Some(_) => return Ok((consumed, Some(self.parse()?))),
            }
        }
    }

    fn parse(&self) -> Result<ParsedHeader, Error> {
        let (preamble, header_bytes) = self.buf.split_at(PREAMBLE_SIZE);
        let (version, _) = preamble_checked(preamble)?;

        let mut rest = header_bytes;
        let header = Header::from_bytes(&mut rest)?;
        if !rest.is_empty() {
            return Err(Error::FormatViolation("header".to_string()));
        }

        header.validate()?;

        Ok(ParsedHeader {
            version,
            header,
            digest: header_digest(preamble, header_bytes),
        })
    }
}

// Releases authenticated plaintext, stripping padding and hashing for verification.
#[derive(Debug)]
struct PlaintextSink {
    hasher: Option<Sha512>,
    unpadder: Option<Unpadder>,
    released: u64,
}

impl PlaintextSink {
    fn push(&mut self, plain: &[u8], out: &mut Vec<u8>) {
        let hasher = &mut self.hasher;
        let released = &mut self.released;

        let mut release = |r: &[u8]| {
            if let Some(h) = hasher.as_mut() {
                h.update(r);
            }
            *released += r.len() as u64;
            out.extend_from_slice(r);
        };

        match self.unpadder.as_mut() {
            Some(unpadder) => unpadder.push(plain, release),
            None => release(plain),
        }
    }

    fn finish(mut self, out: &mut Vec<u8>) -> Result<(u64, Option<[u8; 64]>), Error> {
        if let Some(unpadder) = self.unpadder.take() {
            let hasher = &mut self.hasher;
            let released = &mut self.released;

            unpadder.finish(|r| {
                if let Some(h) = hasher.as_mut() {
                    h.update(r);
                }
                *released += r.len() as u64;
                out.extend_from_slice(r);
            })?;
        }

        Ok((self.released, self.hasher.map(finalize_digest)))
    }
}

/// Decrypts the body of one envelope.
pub struct DecryptionSession {
    config: EnvelopeConfig,
    header: Header,
    aad: HeaderDigest,
    cek: Zeroizing<[u8; KEY_SIZE]>,
    dec: StreamDecryptor,
    segment_size: usize,
    buf: Vec<u8>,
    body_remaining: Option<u64>,
    footer: Vec<u8>,
    sink: PlaintextSink,
    verifying: Option<(VerifyingMode, Vec<PublicKey>)>,
}

impl fmt::Debug for DecryptionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionSession")
            .field("header", &self.header)
            .field("body_remaining", &self.body_remaining)
            .field("verifying", &self.verifying.as_ref().map(|(m, _)| m))
            .finish_non_exhaustive()
    }
}

impl DecryptionSession {
    /// Unwraps the content-encryption key from the first header entry addressed to `id`.
    ///
    /// With verifying options, the mode is resolved against the header: [`VerifyingMode::Any`]
    /// becomes [`VerifyingMode::DecryptThenVerify`] if the envelope has a footer. Verification
    /// after decryption of an envelope without footer fails here with
    /// [`Error::DataIsNotSigned`].
    pub fn start(
        config: &EnvelopeConfig,
        parsed: ParsedHeader,
        id: &KeyId,
        key: &PrivateKey,
        verifying: Option<VerifyingOptions>,
    ) -> Result<Self, Error> {
        let ParsedHeader { header, digest, .. } = parsed;

        let cek = header
            .find_recipient(id)
            .ok_or_else(|| Error::RecipientNotFound(id.to_hex()))?
            .unseal(key)?;

        let signed = header.signed.is_some();
        let verifying = verifying.map(|v| (v.mode.resolve(signed), v.keys));

        if let Some((VerifyingMode::DecryptThenVerify, _)) = verifying {
            if !signed {
                return Err(Error::DataIsNotSigned);
            }
        }

        debug!(
            "unsealing as {}, segment size {}, padded: {}, signed: {}",
            id,
            header.segment_size,
            header.padding.is_some(),
            signed
        );

        let segment_size = header.segment_size as usize + TAG_SIZE;
        let sink = PlaintextSink {
            hasher: verifying.as_ref().map(|_| Sha512::new()),
            unpadder: header.padding.map(Unpadder::new),
            released: 0,
        };

        Ok(Self {
            config: config.clone(),
            dec: StreamDecryptor::new(&header.algo, &cek[..])?,
            body_remaining: header.signed_body_len()?,
            aad: digest,
            cek,
            segment_size,
            buf: Vec::with_capacity(segment_size),
            footer: Vec::new(),
            sink,
            verifying,
            header,
        })
    }

    /// The header of the envelope.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The verification mode after resolving [`VerifyingMode::Any`], if verifying.
    pub fn resolved_mode(&self) -> Option<VerifyingMode> {
        self.verifying.as_ref().map(|(mode, _)| *mode)
    }

    /// Decrypts the next ciphertext chunk, appending plaintext to `out`.
    ///
    /// Only plaintext of authenticated segments is appended. Whether the envelope as a whole is
    /// authentic is only known once [`DecryptionSession::finish`] succeeds.
    pub fn update(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Result<(), Error> {
        let (mut body, footer) = match self.body_remaining {
            Some(remaining) => {
                let n = core::cmp::min(remaining, chunk.len() as u64) as usize;
                self.body_remaining = Some(remaining - n as u64);
                chunk.split_at(n)
            }
            None => (chunk, &[][..]),
        };

        if self.footer.len() + footer.len() > MAX_FOOTER_SIZE + TAG_SIZE {
            return Err(Error::FormatViolation("footer".to_string()));
        }
        self.footer.extend_from_slice(footer);

        while !body.is_empty() {
            if self.buf.len() == self.segment_size {
                self.dec.decrypt_next(&self.aad, &mut self.buf)?;
                trace!("segment of {} bytes", self.buf.len());
                self.sink.push(&self.buf, out);
                self.buf.clear();
            }

            let take = core::cmp::min(self.segment_size - self.buf.len(), body.len());
            self.buf.extend_from_slice(&body[..take]);
            body = &body[take..];
        }

        Ok(())
    }

    /// Decrypts the last segment and the footer, then verifies.
    ///
    /// Returns the identifier of the verified signer, or `None` without verifying options.
    pub fn finish(mut self, out: &mut Vec<u8>) -> Result<Option<KeyId>, Error> {
        if let Some(remaining) = self.body_remaining {
            if remaining != 0 {
                return Err(Error::FormatViolation("body".to_string()));
            }
        }

        let mut last = core::mem::take(&mut self.buf);
        self.dec.decrypt_last(&self.aad, &mut last)?;
        self.sink.push(&last, out);

        let (released, digest) = self.sink.finish(out)?;

        let footer = match self.header.signed {
            Some(info) => {
                if released != info.data_size {
                    return Err(Error::DataSizeMismatch {
                        expected: info.data_size,
                        actual: released,
                    });
                }

                let plain = symmetric::open(
                    &self.header.algo,
                    &self.cek[..],
                    &info.footer_iv,
                    &self.aad,
                    &self.footer,
                )?;

                Some(Footer::from_bytes(&plain)?)
            }
            None => None,
        };

        let (Some((mode, keys)), Some(digest)) = (self.verifying, digest) else {
            return Ok(None);
        };

        let signer = match (mode, footer) {
            (VerifyingMode::DecryptThenVerify, Some(footer)) => {
                verify_footer(&footer, &keys, &digest)?
            }
            (VerifyingMode::DecryptThenVerify, None) => return Err(Error::DataIsNotSigned),
            _ => verify_params(&self.config, &self.header.params, &keys, &digest)?,
        };

        debug!("verified signer {}", signer);

        Ok(Some(signer))
    }

    /// The content algorithm of the envelope.
    pub fn algorithm(&self) -> &Algorithm {
        &self.header.algo
    }
}

enum DecryptorState {
    Header(HeaderReader),
    Body(DecryptionSession),
}

/// Decrypts an envelope fed incrementally from its first byte.
pub struct EnvelopeDecryptor {
    config: EnvelopeConfig,
    id: KeyId,
    key: PrivateKey,
    verifying: Option<VerifyingOptions>,
    state: DecryptorState,
}

impl fmt::Debug for EnvelopeDecryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeDecryptor")
            .field("id", &self.id)
            .field("header_complete", &matches!(self.state, DecryptorState::Body(_)))
            .finish_non_exhaustive()
    }
}

impl EnvelopeDecryptor {
    /// Creates a decryptor for the recipient `id` holding `key`.
    pub fn new(
        config: &EnvelopeConfig,
        id: &KeyId,
        key: &PrivateKey,
        verifying: Option<VerifyingOptions>,
    ) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            config: config.clone(),
            id: id.clone(),
            key: key.clone(),
            verifying,
            state: DecryptorState::Header(HeaderReader::new()),
        })
    }

    /// The header, once it has been read.
    pub fn header(&self) -> Option<&Header> {
        match &self.state {
            DecryptorState::Header(_) => None,
            DecryptorState::Body(session) => Some(session.header()),
        }
    }

    /// Feeds the next chunk of the envelope, appending plaintext to `out`.
    pub fn update(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Result<(), Error> {
        match &mut self.state {
            DecryptorState::Body(session) => session.update(chunk, out),
            DecryptorState::Header(reader) => {
                let (consumed, parsed) = reader.push(chunk)?;

                if let Some(parsed) = parsed {
                    let mut session = DecryptionSession::start(
                        &self.config,
                        parsed,
                        &self.id,
                        &self.key,
                        self.verifying.take(),
                    )?;
                    session.update(&chunk[consumed..], out)?;
                    self.state = DecryptorState::Body(session);
                }

                Ok(())
            }
        }
    }

    /// Completes decryption and verification.
    pub fn finish(self, out: &mut Vec<u8>) -> Result<Option<KeyId>, Error> {
        match self.state {
            DecryptorState::Header(_) => Err(Error::FormatViolation("header".to_string())),
            DecryptorState::Body(session) => session.finish(out),
        }
    }
}
