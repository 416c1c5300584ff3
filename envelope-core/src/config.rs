//! Envelope configuration.
//!
//! Values that used to be process-wide constants are fields here, so differently configured
//! encryptors and decryptors can coexist in one process.

use crate::consts::*;
use crate::error::Error;

use serde::{Deserialize, Serialize};

/// The AEAD used for the payload and the footer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentAlgorithm {
    /// AES-256-GCM.
    #[default]
    Aes256Gcm,
    /// ChaCha20-Poly1305.
    ChaCha20Poly1305,
}

/// Configuration shared by the encryptor, the decryptor and the stream adapters.
///
/// Only `segment_size`, `padding_frame` and `content_algorithm` influence the produced bytes.
/// The segment size and padding frame are recorded in the header, so a decryptor does not need
/// to agree with the encryptor on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Plaintext bytes per STREAM segment.
    pub segment_size: u32,

    /// Bytes requested from a source per read in the stream adapters.
    pub read_chunk_size: usize,

    /// With padding enabled, the body length is a multiple of this frame.
    pub padding_frame: u32,

    /// The content AEAD for new envelopes.
    pub content_algorithm: ContentAlgorithm,

    /// Custom parameter key of a sign-and-encrypt signature.
    pub signature_param_key: String,

    /// Custom parameter key of the sign-and-encrypt signer identifier.
    pub signer_id_param_key: String,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            segment_size: SYMMETRIC_CRYPTO_DEFAULT_CHUNK,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            padding_frame: DEFAULT_PADDING_FRAME,
            content_algorithm: ContentAlgorithm::default(),
            signature_param_key: DEFAULT_SIGNATURE_PARAM_KEY.to_string(),
            signer_id_param_key: DEFAULT_SIGNER_ID_PARAM_KEY.to_string(),
        }
    }
}

impl EnvelopeConfig {
    /// Checks that the configuration is usable.
    pub fn validate(&self) -> Result<(), Error> {
        if self.segment_size == 0 || self.segment_size > MAX_SYMMETRIC_CHUNK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "segment size must be in 1..={MAX_SYMMETRIC_CHUNK_SIZE}"
            )));
        }

        if self.padding_frame == 0 || self.padding_frame > self.segment_size {
            return Err(Error::InvalidConfig(
                "padding frame must be positive and at most the segment size".to_string(),
            ));
        }

        if self.read_chunk_size == 0 {
            return Err(Error::InvalidConfig("read chunk size is zero".to_string()));
        }

        if self.signature_param_key.is_empty()
            || self.signer_id_param_key.is_empty()
            || self.signature_param_key == self.signer_id_param_key
        {
            return Err(Error::InvalidConfig(
                "parameter keys must be distinct and non-empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether `key` is one of the reserved custom parameter keys.
    pub fn is_reserved_param(&self, key: &str) -> bool {
        key == self.signature_param_key || key == self.signer_id_param_key
    }

    /// Parses and validates a configuration from JSON.
    ///
    /// Missing fields take their default value.
    pub fn from_json(s: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;

        Ok(config)
    }

    /// Serializes the configuration to JSON.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(Error::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        EnvelopeConfig::default().validate().unwrap();
    }

    #[test]
    fn test_json() {
        let config = EnvelopeConfig::from_json(
            r#"{ "segment_size": 1024, "content_algorithm": "cha-cha20-poly1305" }"#,
        )
        .unwrap();

        assert_eq!(config.segment_size, 1024);
        assert_eq!(config.content_algorithm, ContentAlgorithm::ChaCha20Poly1305);
        assert_eq!(config.padding_frame, DEFAULT_PADDING_FRAME);

        let s = config.to_json().unwrap();
        assert_eq!(EnvelopeConfig::from_json(&s).unwrap(), config);
    }

    #[test]
    fn test_invalid() {
        let invalid = [
            EnvelopeConfig {
                segment_size: 0,
                ..Default::default()
            },
            EnvelopeConfig {
                segment_size: MAX_SYMMETRIC_CHUNK_SIZE + 1,
                ..Default::default()
            },
            EnvelopeConfig {
                segment_size: 100,
                padding_frame: 160,
                ..Default::default()
            },
            EnvelopeConfig {
                read_chunk_size: 0,
                ..Default::default()
            },
            EnvelopeConfig {
                signer_id_param_key: DEFAULT_SIGNATURE_PARAM_KEY.to_string(),
                ..Default::default()
            },
        ];

        for config in invalid {
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        }
    }
}
