//! Envelope client API.
//!
//! Used for:
//! - Wrapping keys, signing, encrypting (*sealing*),
//! - Unwrapping keys, decrypting, verifying (*unsealing*).
//!
//! The state machines [`EnvelopeEncryptor`] and [`EnvelopeDecryptor`] are driven by the
//! [`Sealer`] and [`Unsealer`], either in memory or over byte streams.

mod decryptor;
mod encryptor;
mod header;
pub(crate) mod padding;
mod recipients;
mod signing;
pub(crate) mod symmetric;

pub mod rust;

pub use decryptor::{DecryptionSession, EnvelopeDecryptor, HeaderReader, ParsedHeader};
pub use encryptor::{EncryptionSession, EnvelopeEncryptor};
pub use header::{Algorithm, Header, Iv, RecipientHeader, SignedInfo};
pub use recipients::RecipientSet;
pub use signing::{
    Footer, SignerRecord, SigningMode, SigningOptions, VerifyingMode, VerifyingOptions,
};

/// A Sealer is used to encrypt and sign data into an envelope.
#[derive(Debug)]
pub struct Sealer<'r, R, C> {
    // The configured encryptor.
    encryptor: EnvelopeEncryptor<'r, R>,

    // The flavor-specific configuration.
    config: C,
}

impl<'r, R, C> Sealer<'r, R, C>
where
    R: rand::RngCore + rand::CryptoRng,
{
    /// Sets the signature binding.
    pub fn with_signing(mut self, signing: SigningOptions) -> Self {
        self.encryptor = self.encryptor.with_signing(signing);
        self
    }

    /// Enables or disables padding.
    pub fn with_padding(mut self, padding: bool) -> Self {
        self.encryptor = self.encryptor.with_padding(padding);
        self
    }

    /// Adds a custom header parameter.
    pub fn with_custom_param(
        mut self,
        key: &str,
        value: &[u8],
    ) -> Result<Self, crate::error::Error> {
        self.encryptor = self.encryptor.with_custom_param(key, value)?;
        Ok(self)
    }
}

/// An Unsealer is used to decrypt and verify envelopes.
///
/// Unsealing is a two-step process:
///
/// 1. First the header is read. This yields the identifiers of all recipients, so the user can
///    pick the matching private key.
///
/// 2. Then the body is decrypted using the private key of one of the recipients.
#[derive(Debug)]
pub struct Unsealer<R, C: UnsealerConfig> {
    /// The version found before the raw header.
    pub version: u16,

    /// The parsed header.
    pub header: Header,

    // Digest of the preamble and header.
    digest: crate::util::HeaderDigest,

    // The type of the input.
    r: R,

    // The implementation-specific configuration.
    config: C,

    // Shared envelope configuration.
    envelope: crate::config::EnvelopeConfig,

    // Optional verification of the signer.
    verifying: Option<VerifyingOptions>,
}

impl<R, C: UnsealerConfig> Unsealer<R, C> {
    /// Verifies the signer after decryption.
    pub fn with_verifying(mut self, verifying: VerifyingOptions) -> Self {
        self.verifying = Some(verifying);
        self
    }

    fn start_session(
        &mut self,
        id: &crate::artifacts::KeyId,
        key: &crate::keys::PrivateKey,
    ) -> Result<DecryptionSession, crate::error::Error> {
        DecryptionSession::start(
            &self.envelope,
            ParsedHeader {
                version: self.version,
                header: self.header.clone(),
                digest: self.digest,
            },
            id,
            key,
            self.verifying.take(),
        )
    }
}

/// Sealer configuration.
///
/// This trait is sealed, you cannot implement it yourself.
pub trait SealerConfig: sealed::SealerConfig {}

/// Unsealer configuration.
///
/// This trait is sealed, you cannot implement it yourself.
pub trait UnsealerConfig: sealed::UnsealerConfig {}

pub(crate) mod sealed {
    pub trait UnsealerConfig {}
    pub trait SealerConfig {}
}
