//! Streaming mode over blocking readers and writers.
//!
//! Sign-and-encrypt needs the complete plaintext before the header is written, and
//! decrypt-and-verify releases plaintext that cannot be taken back when the signature fails, so
//! both are refused for streams. Sign-then-encrypt needs the plaintext size up front, see
//! [`Sealer::with_data_size`].

use alloc::string::ToString;
use alloc::vec::Vec;
use std::io::{self, Read, Write};

use crate::artifacts::KeyId;
use crate::client::*;
use crate::config::EnvelopeConfig;
use crate::error::Error;
use crate::keys::PrivateKey;

use log::debug;
use rand::{CryptoRng, RngCore};

/// Configures a [`Sealer`] to process a payload stream.
#[derive(Debug)]
pub struct SealerStreamConfig {
    /// Declared plaintext size, required for sign-then-encrypt.
    data_size: Option<u64>,
    /// Bytes requested per read.
    read_chunk_size: usize,
}

/// Configures an [`Unsealer`] to process a payload stream.
#[derive(Debug)]
pub struct UnsealerStreamConfig {
    read_chunk_size: usize,
}

impl SealerConfig for SealerStreamConfig {}
impl UnsealerConfig for UnsealerStreamConfig {}
impl crate::client::sealed::SealerConfig for SealerStreamConfig {}
impl crate::client::sealed::UnsealerConfig for UnsealerStreamConfig {}

// Reads into `buf`, retrying interrupted reads. Returns 0 at the end of the stream.
pub(crate) fn read_chunk<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<usize, Error> {
    loop {
        match r.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::InputStreamError(e)),
        }
    }
}

fn write_out<W: Write>(w: &mut W, data: &[u8]) -> Result<(), Error> {
    w.write_all(data).map_err(Error::OutputStreamError)
}

pub(crate) fn stream_mode_checked(mode: Option<VerifyingMode>) -> Result<(), Error> {
    match mode {
        Some(VerifyingMode::DecryptAndVerify) => Err(Error::UnsupportedOperation(
            "decrypt-and-verify over a stream",
        )),
        _ => Ok(()),
    }
}

impl<'r, Rng: RngCore + CryptoRng> Sealer<'r, Rng, SealerStreamConfig> {
    /// Construct a new [`Sealer`] that can process streaming payloads.
    pub fn new(
        config: &EnvelopeConfig,
        recipients: &RecipientSet,
        rng: &'r mut Rng,
    ) -> Result<Self, Error> {
        Ok(Sealer {
            encryptor: EnvelopeEncryptor::new(config, rng)?.with_recipients(recipients),
            config: SealerStreamConfig {
                data_size: None,
                read_chunk_size: config.read_chunk_size,
            },
        })
    }

    /// Declares the exact plaintext size.
    ///
    /// Required for sign-then-encrypt, where the size is recorded in the header. Sealing fails
    /// with [`Error::DataSizeMismatch`] if the stream turns out shorter or longer.
    pub fn with_data_size(mut self, size: u64) -> Self {
        self.config.data_size = Some(size);
        self
    }

    /// Seals payload data from a [`Read`] into a [`Write`].
    pub fn seal<R, W>(self, mut r: R, mut w: W) -> Result<(), Error>
    where
        R: Read,
        W: Write,
    {
        if self.encryptor.signing_mode() == SigningMode::SignAndEncrypt {
            return Err(Error::UnsupportedOperation("sign-and-encrypt over a stream"));
        }

        let (mut session, mut out) = self.encryptor.start(self.config.data_size)?;
        write_out(&mut w, &out)?;

        let mut buf = vec![0u8; self.config.read_chunk_size];

        loop {
            let read = read_chunk(&mut r, &mut buf)?;
            if read == 0 {
                break;
            }

            out.clear();
            session.update(&buf[..read], &mut out)?;
            write_out(&mut w, &out)?;
        }

        out.clear();
        session.finish(&mut out)?;
        write_out(&mut w, &out)?;

        w.flush().map_err(Error::OutputStreamError)
    }
}

impl<R: Read> Unsealer<R, UnsealerStreamConfig> {
    /// Create a new [`Unsealer`] that starts reading from a [`Read`].
    ///
    /// Reads exactly the preamble and the header, the reader is left at the first body byte.
    /// Errors if the bytestream is not an envelope.
    pub fn new(mut r: R, config: &EnvelopeConfig) -> Result<Self, Error> {
        config.validate()?;

        let mut reader = HeaderReader::new();
        let mut buf = Vec::new();

        let parsed = loop {
            buf.resize(reader.remaining().min(config.read_chunk_size), 0);

            let read = read_chunk(&mut r, &mut buf)?;
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
            r,
            config: UnsealerStreamConfig {
                read_chunk_size: config.read_chunk_size,
            },
            envelope: config.clone(),
            verifying: None,
        })
    }

    /// Unseal the remaining data (which is now only payload) into a [`Write`].
    ///
    /// Each segment is written once it is authenticated, but the envelope as a whole is only
    /// authentic when this returns `Ok`. On error, discard everything written.
    pub fn unseal<W: Write>(
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
            let read = read_chunk(&mut self.r, &mut buf)?;
            if read == 0 {
                break;
            }

            out.clear();
            session.update(&buf[..read], &mut out)?;
            write_out(&mut w, &out)?;
        }

        out.clear();
        let signer = session.finish(&mut out)?;
        write_out(&mut w, &out)?;
        w.flush().map_err(Error::OutputStreamError)?;

        debug!("unsealed stream");

        Ok(signer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::rust::{SealerMemoryConfig, UnsealerMemoryConfig};
    use crate::consts::*;
    use crate::test::TestSetup;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Cursor;

    const LENGTHS: &[u32] = &[
        0,
        1,
        512,
        SYMMETRIC_CRYPTO_DEFAULT_CHUNK - 3,
        SYMMETRIC_CRYPTO_DEFAULT_CHUNK,
        SYMMETRIC_CRYPTO_DEFAULT_CHUNK + 3,
        3 * SYMMETRIC_CRYPTO_DEFAULT_CHUNK + 16,
    ];

    fn rand_vec(length: usize) -> Vec<u8> {
        let mut vec = vec![0u8; length];
        rand::thread_rng().fill_bytes(&mut vec);
        vec
    }

    fn config(read_chunk_size: usize) -> EnvelopeConfig {
        EnvelopeConfig {
            read_chunk_size,
            ..Default::default()
        }
    }

    fn seal_helper(setup: &TestSetup, seed: u64, plain: &[u8], chunk: usize) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(seed);
        let set = RecipientSet::from(&[setup.recipients[3].public_key.clone()][..]);
        let mut output = Vec::new();

        Sealer::<_, SealerStreamConfig>::new(&config(chunk), &set, &mut rng)
            .unwrap()
            .with_padding(true)
            .seal(Cursor::new(plain), &mut output)
            .unwrap();

        output
    }

    fn unseal_helper(setup: &TestSetup, ct: &[u8], chunk: usize) -> Vec<u8> {
        let kp = &setup.recipients[3];
        let mut output = Vec::new();

        Unsealer::<_, UnsealerStreamConfig>::new(Cursor::new(ct), &config(chunk))
            .unwrap()
            .unseal(kp.private_key.id(), &kp.private_key, &mut output)
            .unwrap();

        output
    }

    // Yields at most `max` bytes per read and an interruption before every read.
    struct Trickle<R> {
        inner: R,
        max: usize,
        interrupt: bool,
    }

    impl<R: Read> Read for Trickle<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::ErrorKind::Interrupted.into());
            }

            let n = buf.len().min(self.max);
            self.inner.read(&mut buf[..n])
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
    }

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_reflection_seal_unsealer() {
        let mut rng = StdRng::seed_from_u64(70);
        let setup = TestSetup::new(&mut rng);

        for l in LENGTHS {
            let plain = rand_vec(*l as usize);
            let ct = seal_helper(&setup, 1, &plain, DEFAULT_READ_CHUNK_SIZE);
            assert_eq!(unseal_helper(&setup, &ct, DEFAULT_READ_CHUNK_SIZE), plain);
        }
    }

    #[test]
    fn test_equivalence_with_memory() {
        let mut rng = StdRng::seed_from_u64(71);
        let setup = TestSetup::new(&mut rng);
        let set = RecipientSet::from(&[setup.recipients[3].public_key.clone()][..]);

        let plain = rand_vec(3 * SYMMETRIC_CRYPTO_DEFAULT_CHUNK as usize + 100);

        let mut rng = StdRng::seed_from_u64(5);
        let in_memory = Sealer::<_, SealerMemoryConfig>::new(&config(1024), &set, &mut rng)
            .unwrap()
            .with_padding(true)
            .seal(&plain)
            .unwrap();

        for chunk in [1, 7, 1000, 1024, 65536, 1 << 20] {
            let streamed = seal_helper(&setup, 5, &plain[..], chunk);
            assert_eq!(streamed, in_memory, "chunk {chunk}");

            assert_eq!(unseal_helper(&setup, &streamed, chunk), plain);
        }
    }

    #[test]
    fn test_sign_then_encrypt_stream() {
        let mut rng = StdRng::seed_from_u64(72);
        let setup = TestSetup::new(&mut rng);
        let signer = &setup.signers[0];
        let recipient = &setup.recipients[1];
        let set = RecipientSet::from(&[recipient.public_key.clone()][..]);

        let plain = rand_vec(100_000);
        let signing = SigningOptions::sign_then_encrypt(&signer.private_key);

        let mut rng = StdRng::seed_from_u64(9);
        let in_memory = Sealer::<_, SealerMemoryConfig>::new(&config(1024), &set, &mut rng)
            .unwrap()
            .with_signing(signing.clone())
            .seal(&plain)
            .unwrap();

        let mut rng = StdRng::seed_from_u64(9);
        let mut streamed = Vec::new();
        Sealer::<_, SealerStreamConfig>::new(&config(333), &set, &mut rng)
            .unwrap()
            .with_signing(signing.clone())
            .with_data_size(plain.len() as u64)
            .seal(
                Trickle {
                    inner: Cursor::new(&plain),
                    max: 4000,
                    interrupt: false,
                },
                &mut streamed,
            )
            .unwrap();

        assert_eq!(streamed, in_memory);

        let mut output = Vec::new();
        let id = Unsealer::<_, UnsealerStreamConfig>::new(
            Trickle {
                inner: Cursor::new(&streamed),
                max: 3,
                interrupt: false,
            },
            &config(1024),
        )
        .unwrap()
        .with_verifying(VerifyingOptions::new(
            VerifyingMode::Any,
            &[signer.public_key.clone()],
        ))
        .unseal(recipient.private_key.id(), &recipient.private_key, &mut output)
        .unwrap();

        assert_eq!(output, plain);
        assert_eq!(id.as_ref(), Some(signer.public_key.id()));

        // Without a declared size the footer can not be announced.
        let mut rng = StdRng::seed_from_u64(9);
        let res = Sealer::<_, SealerStreamConfig>::new(&config(1024), &set, &mut rng)
            .unwrap()
            .with_signing(signing.clone())
            .seal(Cursor::new(&plain), Vec::new());
        assert!(matches!(res, Err(Error::UnsupportedOperation(_))));

        let res = Sealer::<_, SealerStreamConfig>::new(&config(1024), &set, &mut rng)
            .unwrap()
            .with_signing(signing)
            .with_data_size(plain.len() as u64 + 1)
            .seal(Cursor::new(&plain), Vec::new());
        assert!(matches!(res, Err(Error::DataSizeMismatch { .. })));
    }

    #[test]
    fn test_unsupported_modes() {
        let mut rng = StdRng::seed_from_u64(73);
        let setup = TestSetup::new(&mut rng);
        let signer = &setup.signers[1];
        let recipient = &setup.recipients[0];
        let set = RecipientSet::from(&[recipient.public_key.clone()][..]);

        let res = Sealer::<_, SealerStreamConfig>::new(&config(1024), &set, &mut rng)
            .unwrap()
            .with_signing(SigningOptions::sign_and_encrypt(&signer.private_key))
            .seal(Cursor::new(b"data"), Vec::new());
        assert!(matches!(res, Err(Error::UnsupportedOperation(_))));

        let sealed = Sealer::<_, SealerMemoryConfig>::new(&config(1024), &set, &mut rng)
            .unwrap()
            .with_signing(SigningOptions::sign_and_encrypt(&signer.private_key))
            .seal(b"data")
            .unwrap();

        // Rejected once the header is known, before any plaintext is written.
        for mode in [VerifyingMode::DecryptAndVerify, VerifyingMode::Any] {
            let mut output = Vec::new();
            let res = Unsealer::<_, UnsealerStreamConfig>::new(Cursor::new(&sealed), &config(1))
                .unwrap()
                .with_verifying(VerifyingOptions::new(mode, &[signer.public_key.clone()]))
                .unseal(recipient.private_key.id(), &recipient.private_key, &mut output);

            assert!(matches!(res, Err(Error::UnsupportedOperation(_))));
            assert!(output.is_empty());
        }

        // The in-memory path does support it.
        let (plain, _) = Unsealer::<_, UnsealerMemoryConfig>::new(&sealed, &config(1024))
            .unwrap()
            .with_verifying(VerifyingOptions::new(
                VerifyingMode::DecryptAndVerify,
                &[signer.public_key.clone()],
            ))
            .unseal(recipient.private_key.id(), &recipient.private_key)
            .unwrap();
        assert_eq!(plain, b"data");
    }

    #[test]
    fn test_stream_errors() {
        let mut rng = StdRng::seed_from_u64(74);
        let setup = TestSetup::new(&mut rng);
        let recipient = &setup.recipients[0];
        let set = RecipientSet::from(&[recipient.public_key.clone()][..]);

        let res = Sealer::<_, SealerStreamConfig>::new(&config(1024), &set, &mut rng)
            .unwrap()
            .seal(Broken, Vec::new());
        assert!(matches!(res, Err(Error::InputStreamError(_))));

        let res = Sealer::<_, SealerStreamConfig>::new(&config(1024), &set, &mut rng)
            .unwrap()
            .seal(Cursor::new(b"data"), Broken);
        assert!(matches!(res, Err(Error::OutputStreamError(_))));

        let res = Unsealer::<_, UnsealerStreamConfig>::new(Broken, &config(1024));
        assert!(matches!(res, Err(Error::InputStreamError(_))));

        let res = Unsealer::<_, UnsealerStreamConfig>::new(Cursor::new(b""), &config(1024));
        assert!(matches!(res, Err(Error::NotEnvelope)));

        let ct = seal_helper(&setup, 3, b"data", 1024);
        let res = Unsealer::<_, UnsealerStreamConfig>::new(Cursor::new(&ct[..30]), &config(1024));
        assert!(matches!(res, Err(Error::FormatViolation(_))));
    }

    #[test]
    fn test_reader_stops_at_body() {
        let mut rng = StdRng::seed_from_u64(75);
        let setup = TestSetup::new(&mut rng);
        let ct = seal_helper(&setup, 4, &rand_vec(5000), 1024);

        let mut cursor = Cursor::new(&ct);
        let unsealer =
            Unsealer::<_, UnsealerStreamConfig>::new(&mut cursor, &config(1024)).unwrap();
        let header_len = bincode::serialize(&unsealer.header).unwrap().len();

        assert_eq!(cursor.position() as usize, PREAMBLE_SIZE + header_len);
    }

    #[test]
    #[should_panic]
    fn test_corrupt_header() {
        let mut rng = StdRng::seed_from_u64(76);
        let setup = TestSetup::new(&mut rng);

        let plain = rand_vec(100);
        let mut ct = seal_helper(&setup, 1, &plain, 1024);

        // Flip a byte that is guaranteed to be in the header.
        ct[PREAMBLE_SIZE + 2] = !ct[PREAMBLE_SIZE + 2];

        let _plain2 = unseal_helper(&setup, &ct, 1024);
    }

    #[test]
    #[should_panic]
    fn test_corrupt_payload() {
        let mut rng = StdRng::seed_from_u64(77);
        let setup = TestSetup::new(&mut rng);

        let plain = rand_vec(100);
        let mut ct = seal_helper(&setup, 1, &plain, 1024);

        // Flip a byte that is guaranteed to be in the encrypted payload.
        let ct_len = ct.len();
        ct[ct_len - TAG_SIZE - 5] = !ct[ct_len - TAG_SIZE - 5];

        let _plain2 = unseal_helper(&setup, &ct, 1024);
    }

    #[test]
    #[should_panic]
    fn test_corrupt_tag() {
        let mut rng = StdRng::seed_from_u64(78);
        let setup = TestSetup::new(&mut rng);

        let plain = rand_vec(100);
        let mut ct = seal_helper(&setup, 1, &plain, 1024);

        let len = ct.len();
        ct[len - 5] = !ct[len - 5];

        let _plain2 = unseal_helper(&setup, &ct, 1024);
    }
}
