//! Envelope errors.

use core::{array::TryFromSliceError, num::TryFromIntError};

/// An envelope error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The packet/bytestream does not start with the expected prelude.
    #[error("the bytestream does not start with the expected prelude")]
    NotEnvelope,
    /// The wrong version specifier was found in the header.
    #[error("wrong version, expected: {expected}, found: {found}")]
    IncorrectVersion {
        /// The expected version specifier.
        expected: u16,
        /// The found version specifier,
        found: u16,
    },
    /// Serde JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Bincode serialization/deserialization error.
    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    /// Constraint violation.
    #[error("constraint violation")]
    ConstraintViolation,
    /// Format violation.
    #[error("{0} not (correctly) found in format")]
    FormatViolation(String),
    /// The configuration is not usable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Opaque symmetric encryption error.
    #[error("symmetric encryption operation error")]
    Symmetric,
    /// Opaque key encapsulation error.
    #[error("KEM error")]
    Kem,
    /// An encoded key carries an algorithm identifier that is not known.
    #[error("unknown algorithm identifier")]
    UnknownAlgId,
    /// The key type, or combination of algorithms, is not supported.
    #[error("unknown key type")]
    UnknownKeyType,
    /// RSA keys are only supported with a 2048, 4096 or 8192 bit modulus.
    #[error("unsupported RSA modulus length: {0} bits")]
    UnsupportedRsaLength(usize),
    /// Malformed key material.
    #[error("malformed key: {0}")]
    KeyFormat(String),
    /// A password-protected private key could not be decrypted.
    #[error("private key decryption failed")]
    KeyDecryption,
    /// The seed for deterministic key generation has an unsupported length.
    #[error("invalid seed size: {0} bytes")]
    InvalidSeedSize(usize),
    /// Encryption was requested without any recipient.
    #[error("no recipients")]
    NoRecipients,
    /// No header entry matches the decrypting key.
    #[error("recipient not found: {0}")]
    RecipientNotFound(String),
    /// No candidate public key matches the embedded signer.
    #[error("signer not found")]
    SignerNotFound,
    /// The expected signature is absent.
    #[error("signature not found")]
    SignatureNotFound,
    /// The signature did not verify.
    #[error("signature not verified")]
    SignatureNotVerified,
    /// Verification after decryption was requested, but the data carries no (single) signer.
    #[error("data is not signed")]
    DataIsNotSigned,
    /// The key can not produce signatures.
    #[error("key does not support signing")]
    KeyDoesntSupportSigning,
    /// The operation is not supported in this mode.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
    /// The amount of processed plaintext differs from the declared size.
    #[error("declared data size {expected}, processed {actual}")]
    DataSizeMismatch {
        /// The declared size.
        expected: u64,
        /// The processed size.
        actual: u64,
    },
    /// Reading from the input stream failed.
    #[error("input stream error: {0}")]
    InputStreamError(std::io::Error),
    /// Writing to the output stream failed.
    #[error("output stream error: {0}")]
    OutputStreamError(std::io::Error),
}

/// The kind of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or unsupported encoded key, unknown algorithm.
    KeyFormat,
    /// Seed byte-length out of accepted range.
    Seed,
    /// No header entry matches the decrypting key.
    RecipientNotFound,
    /// No candidate public key matches the embedded signer identifier.
    SignerNotFound,
    /// An expected signature is absent.
    SignatureMissing,
    /// Cryptographic verification failed.
    SignatureInvalid,
    /// Verification after decryption requested, but no (single) signer record is present.
    NotSigned,
    /// Short write, failed read or other I/O inconsistency.
    StreamIo,
    /// The operation is not available for this mode or key.
    UnsupportedOperation,
    /// The bytestream is not a well-formed envelope.
    Format,
    /// A primitive (AEAD or KEM) failed.
    Crypto,
    /// Invalid parameters or configuration.
    Config,
}

impl Error {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownAlgId
            | Self::UnknownKeyType
            | Self::UnsupportedRsaLength(_)
            | Self::KeyFormat(_)
            | Self::KeyDecryption => ErrorKind::KeyFormat,
            Self::InvalidSeedSize(_) => ErrorKind::Seed,
            Self::RecipientNotFound(_) => ErrorKind::RecipientNotFound,
            Self::SignerNotFound => ErrorKind::SignerNotFound,
            Self::SignatureNotFound => ErrorKind::SignatureMissing,
            Self::SignatureNotVerified => ErrorKind::SignatureInvalid,
            Self::DataIsNotSigned => ErrorKind::NotSigned,
            Self::InputStreamError(_) | Self::OutputStreamError(_) => ErrorKind::StreamIo,
            Self::UnsupportedOperation(_) | Self::KeyDoesntSupportSigning => {
                ErrorKind::UnsupportedOperation
            }
            Self::NotEnvelope
            | Self::IncorrectVersion { .. }
            | Self::FormatViolation(_)
            | Self::Bincode(_)
            | Self::Json(_)
            | Self::DataSizeMismatch { .. } => ErrorKind::Format,
            Self::Symmetric | Self::Kem => ErrorKind::Crypto,
            Self::ConstraintViolation
            | Self::NoRecipients
            | Self::InvalidConfig(_) => ErrorKind::Config,
        }
    }
}

impl From<TryFromIntError> for Error {
    fn from(_: TryFromIntError) -> Self {
        Self::ConstraintViolation
    }
}

impl From<TryFromSliceError> for Error {
    fn from(_: TryFromSliceError) -> Self {
        Self::ConstraintViolation
    }
}

impl From<aead::Error> for Error {
    fn from(_: aead::Error) -> Self {
        Self::Symmetric
    }
}

impl From<aes_gcm::aes::cipher::InvalidLength> for Error {
    fn from(_: aes_gcm::aes::cipher::InvalidLength) -> Self {
        Self::Symmetric
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(Error::UnknownAlgId.kind(), ErrorKind::KeyFormat);
        assert_eq!(Error::KeyDecryption.kind(), ErrorKind::KeyFormat);
        assert_eq!(Error::InvalidSeedSize(3).kind(), ErrorKind::Seed);
        assert_eq!(
            Error::RecipientNotFound("00".to_string()).kind(),
            ErrorKind::RecipientNotFound
        );
        assert_eq!(Error::SignatureNotFound.kind(), ErrorKind::SignatureMissing);
        assert_eq!(Error::SignatureNotVerified.kind(), ErrorKind::SignatureInvalid);
        assert_eq!(Error::DataIsNotSigned.kind(), ErrorKind::NotSigned);
        assert_eq!(
            Error::UnsupportedOperation("x").kind(),
            ErrorKind::UnsupportedOperation
        );
        assert_eq!(
            Error::KeyDoesntSupportSigning.kind(),
            ErrorKind::UnsupportedOperation
        );
    }

    #[test]
    fn test_display() {
        let e = Error::IncorrectVersion {
            expected: 0,
            found: 3,
        };
        assert_eq!(e.to_string(), "wrong version, expected: 0, found: 3");
        assert_eq!(
            Error::UnsupportedRsaLength(1024).to_string(),
            "unsupported RSA modulus length: 1024 bits"
        );
    }
}
