//! # Envelope core library
#![deny(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links
)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! Envelope is a hybrid encryption format for one or more recipients, with an optional
//! signature over the plaintext.
//!
//! * Keys: every key has a [`KeyType`][`keys::KeyType`] and an identifier, a fingerprint of its
//! canonical public encoding. Classical (Ed25519, X25519, P-256, RSA), hybrid post-quantum
//! (X25519/P-256 + ML-KEM-768) and compound (signing + key exchange) keys are supported.
//!
//! * KEM: a fresh content-encryption key is wrapped for every recipient under a key derived from
//! a key encapsulation against that recipient's public key. The [header][`client::Header`]
//! lists the recipients by identifier and is authenticated, but not encrypted.
//!
//! * DEM: the arbitrary-sized payload is encrypted in segments as described in the paper [Online
//! Authenticated-Encryption and its Nonce-Reuse Misuse-Resistance][1], with AES-256-GCM or
//! ChaCha20-Poly1305. Optionally, the payload is padded to a multiple of a frame size.
//!
//! * Signing: a signature over the SHA-512 digest of the plaintext is either placed in the
//! header parameters (sign-and-encrypt) or in an encrypted footer after the payload
//! (sign-then-encrypt). See [`client::SigningMode`].
//!
//! [1]: https://eprint.iacr.org/2015/189.pdf
//!
//! ## Streaming vs In-memory
//!
//! The same envelope can be produced from a slice or from a stream, byte for byte. Blocking
//! streams use [`std::io`]; enable the `stream` feature for asynchronous byte streams. During
//! decryption each segment is authenticated separately, so plaintext is released before the
//! whole envelope has been read. Only a successful end of unsealing means the envelope as a
//! whole is authentic.
//!
//! ## Examples
//!
//! ### Seal a slice
//!
//! ```
//! use envelope_core::client::rust::{SealerMemoryConfig, UnsealerMemoryConfig};
//! use envelope_core::client::{RecipientSet, Sealer, SigningOptions, Unsealer};
//! use envelope_core::client::{VerifyingMode, VerifyingOptions};
//! use envelope_core::config::EnvelopeConfig;
//! use envelope_core::keys::{KeyManager, KeyType};
//! # use envelope_core::error::Error;
//!
//! # fn main() -> Result<(), Error> {
//! let mut rng = rand::thread_rng();
//! let config = EnvelopeConfig::default();
//! let km = KeyManager::default();
//!
//! let alice = km.generate_key_pair(KeyType::Ed25519, &mut rng)?;
//! let bob = km.generate_key_pair(KeyType::CURVE25519_MLKEM768, &mut rng)?;
//!
//! let mut recipients = RecipientSet::new();
//! recipients.add_public_key(&bob.public_key);
//!
//! let input = b"SECRET DATA";
//! let sealed = Sealer::<_, SealerMemoryConfig>::new(&config, &recipients, &mut rng)?
//!     .with_signing(SigningOptions::sign_then_encrypt(&alice.private_key))
//!     .seal(input)?;
//!
//! let unsealer = Unsealer::<_, UnsealerMemoryConfig>::new(&sealed, &config)?;
//! assert_eq!(&unsealer.header.recipients[0].id, bob.public_key.id());
//!
//! let (original, signer) = unsealer
//!     .with_verifying(VerifyingOptions::new(
//!         VerifyingMode::DecryptThenVerify,
//!         &[alice.public_key.clone()],
//!     ))
//!     .unseal(bob.private_key.id(), &bob.private_key)?;
//!
//! assert_eq!(&input.to_vec(), &original);
//! assert_eq!(signer.as_ref(), Some(alice.public_key.id()));
//! # Ok(())
//! # }
//! ```
#![cfg_attr(
    feature = "stream",
    doc = r##"
 ### Seal an asynchronous bytestream

 ```
 use envelope_core::client::rust::async_stream::{SealerAsyncStreamConfig, UnsealerAsyncStreamConfig};
 use envelope_core::client::{RecipientSet, Sealer, Unsealer};
 use envelope_core::config::EnvelopeConfig;
 use envelope_core::test::TestSetup;
 use futures::io::Cursor;
 # use envelope_core::error::Error;

 # #[tokio::main]
 # async fn main() -> Result<(), Error> {
 let mut rng = rand::thread_rng();
 let setup = TestSetup::new(&mut rng);
 let config = EnvelopeConfig::default();
 let bob = &setup.recipients[1];

 let mut recipients = RecipientSet::new();
 recipients.add_public_key(&bob.public_key);

 let mut input = Cursor::new(b"SECRET DATA");
 let mut sealed = Vec::new();

 Sealer::<_, SealerAsyncStreamConfig>::new(&config, &recipients, &mut rng)?
     .seal(&mut input, &mut sealed)
     .await?;

 let mut original = Vec::new();
 Unsealer::<_, UnsealerAsyncStreamConfig>::new(&mut Cursor::new(sealed), &config)
     .await?
     .unseal(bob.private_key.id(), &bob.private_key, &mut original)
     .await?;

 assert_eq!(input.into_inner().to_vec(), original);
 # Ok(())
 # }
 ```
"##
)]
//!
//! ### Wire format
//!
//! The wire format consists of the following segments, followed by their length in bytes:
//!
//! ```text
//!                  PREAMBLE (10)
//! = PRELUDE (4) || VERSION (2) || HEADER LEN (4)
//!
//!                  HEADER (*)
//! = bincode(Header)
//!
//!                  BODY (*)
//! = STREAM(CEK, AAD = SHA-512(PREAMBLE || HEADER), PADDED(M))
//!
//!                  FOOTER (*), only for sign-then-encrypt
//! = AEAD(CEK, FOOTER IV, AAD, bincode(Footer))
//! ```

extern crate alloc;

pub mod api;
pub mod artifacts;
pub mod client;
pub mod config;
pub mod consts;
pub mod error;
pub mod keys;

#[doc(hidden)]
pub use consts::*;

#[doc(hidden)]
pub mod test;

mod util;
