//! Constants used in the envelope protocol.
//!
//! Values that callers may want to vary per process (segment size, padding frame, custom
//! parameter keys) only act as defaults for [`EnvelopeConfig`][`crate::config::EnvelopeConfig`].

/// Version 1.
///
/// Recipients are addressed by key identifier, the content-encryption key is wrapped per
/// recipient and the payload is a STREAM of AEAD segments, optionally followed by an encrypted
/// signer footer.
pub const VERSION_V1: u16 = 0;

/// The size of the tag with which all envelopes begin.
pub const PRELUDE_SIZE: usize = 4;

/// The tag bytes with which all envelopes begin.
pub const PRELUDE: [u8; PRELUDE_SIZE] = [0x45, 0x4E, 0x56, 0xA7];

/// The size of the version identifier.
pub const VERSION_SIZE: usize = core::mem::size_of::<u16>();

/// The size of the header size.
pub const HEADER_SIZE_SIZE: usize = core::mem::size_of::<u32>();

/// The maximum size of the header (4 MiB).
pub const MAX_HEADER_SIZE: usize = 1024 * 1024 * 4;

/// The maximum size of the encrypted footer (64 KiB).
pub const MAX_FOOTER_SIZE: usize = 1024 * 64;

/// The maximum size of symmetric segments (4 MiB).
pub const MAX_SYMMETRIC_CHUNK_SIZE: u32 = 1024 * 1024 * 4;

/// The preamble contains the following bytes:
/// * Prelude: 4 bytes,
/// * Version identifier: 2 bytes,
/// * Size of header: 4 bytes,
/// * Totalling: 4 + 2 + 4 = 10 bytes.
pub const PREAMBLE_SIZE: usize = PRELUDE_SIZE + VERSION_SIZE + HEADER_SIZE_SIZE;

/// Default size of symmetric encryption segments.
///
/// A reasonable default is 64 KiB.
pub const SYMMETRIC_CRYPTO_DEFAULT_CHUNK: u32 = 64 * 1024;

/// Default number of bytes the stream adapters read from a source at once (1 KiB).
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;

/// Default padding frame size.
pub const DEFAULT_PADDING_FRAME: u32 = 160;

/// Default custom parameter key holding a legacy (sign-and-encrypt) signature.
pub const DEFAULT_SIGNATURE_PARAM_KEY: &str = "ENVELOPE-DATA-SIGNATURE";

/// Default custom parameter key holding the legacy signer identifier.
pub const DEFAULT_SIGNER_ID_PARAM_KEY: &str = "ENVELOPE-DATA-SIGNER-ID";

// Symmetric crypto constants.

/// Size of the content-encryption key.
pub const KEY_SIZE: usize = 32;

/// Size of the initialization vector.
pub const IV_SIZE: usize = 12;

// The STREAM construction needs only 12 bytes:
// A 7-byte nonce, a 4-byte counter (u32) and an all-zero or all-one byte,
// depending on if the segment is the final segment.

/// Size of the nonce in the "STREAM" encryption construction.
pub const STREAM_NONCE_SIZE: usize = 7;

/// Size of the authentication tag.
/// The authentication tag is appended to each segment.
pub const TAG_SIZE: usize = 16;

/// Size of the padding trailer, which records the number of padding bytes.
pub const PADDING_TRAILER_SIZE: usize = core::mem::size_of::<u32>();

// Key identity constants.

/// Length of a key identifier derived from the SHA-512 fingerprint.
pub const SHORT_KEY_ID_SIZE: usize = 8;

/// Minimum length of a seed for deterministic key generation.
pub const SEED_MIN_SIZE: usize = 32;

/// Maximum length of a seed for deterministic key generation.
pub const SEED_MAX_SIZE: usize = 512;

/// The tag bytes with which all canonically encoded keys begin.
pub const KEY_PRELUDE: [u8; 4] = [0x45, 0x4B, 0x45, 0x59];

/// Domain separation for the key-encryption key derivation.
pub const KEK_INFO: &[u8] = b"envelope-core kek v1";

/// Domain separation for expanding generation seeds.
pub const SEED_INFO: &[u8] = b"envelope-core seed v1";
