//! Symmetric primitives, dispatched over the content algorithm of the header.
//!
//! The payload uses the STREAM construction of [`aead::stream`] with a 7-byte nonce prefix
//! taken from the header IV. The footer and the wrapped keys are single AEAD messages.

use crate::client::header::{Algorithm, Iv};
use crate::consts::*;
use crate::error::Error;

use aead::generic_array::GenericArray;
use aead::stream::{DecryptorBE32, EncryptorBE32};
use aead::{Aead, KeyInit, Payload};
use aes_gcm::Aes256Gcm;
use chacha20poly1305::ChaCha20Poly1305;

fn stream_nonce(iv: &Iv<IV_SIZE>) -> &GenericArray<u8, aead::consts::U7> {
    GenericArray::from_slice(&iv.0[..STREAM_NONCE_SIZE])
}

/// Encrypts payload segments.
pub(crate) enum StreamEncryptor {
    Aes256Gcm(EncryptorBE32<Aes256Gcm>),
    ChaCha20Poly1305(EncryptorBE32<ChaCha20Poly1305>),
}

impl StreamEncryptor {
    pub(crate) fn new(algo: &Algorithm, key: &[u8]) -> Result<Self, Error> {
        Ok(match algo {
            Algorithm::Aes256Gcm(iv) => Self::Aes256Gcm(EncryptorBE32::from_aead(
                Aes256Gcm::new_from_slice(key)?,
                stream_nonce(iv),
            )),
            Algorithm::ChaCha20Poly1305(iv) => Self::ChaCha20Poly1305(EncryptorBE32::from_aead(
                ChaCha20Poly1305::new_from_slice(key)?,
                stream_nonce(iv),
            )),
        })
    }

    pub(crate) fn encrypt_next(&mut self, aad: &[u8], buf: &mut Vec<u8>) -> Result<(), Error> {
        match self {
            Self::Aes256Gcm(enc) => enc.encrypt_next_in_place(aad, buf)?,
            Self::ChaCha20Poly1305(enc) => enc.encrypt_next_in_place(aad, buf)?,
        }

        Ok(())
    }

    pub(crate) fn encrypt_last(self, aad: &[u8], buf: &mut Vec<u8>) -> Result<(), Error> {
        match self {
            Self::Aes256Gcm(enc) => enc.encrypt_last_in_place(aad, buf)?,
            Self::ChaCha20Poly1305(enc) => enc.encrypt_last_in_place(aad, buf)?,
        }

        Ok(())
    }
}

/// Decrypts payload segments.
pub(crate) enum StreamDecryptor {
    Aes256Gcm(DecryptorBE32<Aes256Gcm>),
    ChaCha20Poly1305(DecryptorBE32<ChaCha20Poly1305>),
}

impl StreamDecryptor {
    pub(crate) fn new(algo: &Algorithm, key: &[u8]) -> Result<Self, Error> {
        Ok(match algo {
            Algorithm::Aes256Gcm(iv) => Self::Aes256Gcm(DecryptorBE32::from_aead(
                Aes256Gcm::new_from_slice(key)?,
                stream_nonce(iv),
            )),
            Algorithm::ChaCha20Poly1305(iv) => Self::ChaCha20Poly1305(DecryptorBE32::from_aead(
                ChaCha20Poly1305::new_from_slice(key)?,
                stream_nonce(iv),
            )),
        })
    }

    pub(crate) fn decrypt_next(&mut self, aad: &[u8], buf: &mut Vec<u8>) -> Result<(), Error> {
        match self {
            Self::Aes256Gcm(dec) => dec.decrypt_next_in_place(aad, buf)?,
            Self::ChaCha20Poly1305(dec) => dec.decrypt_next_in_place(aad, buf)?,
        }

        Ok(())
    }

    pub(crate) fn decrypt_last(self, aad: &[u8], buf: &mut Vec<u8>) -> Result<(), Error> {
        match self {
            Self::Aes256Gcm(dec) => dec.decrypt_last_in_place(aad, buf)?,
            Self::ChaCha20Poly1305(dec) => dec.decrypt_last_in_place(aad, buf)?,
        }

        Ok(())
    }
}

/// Encrypts a single message with the content algorithm.
pub(crate) fn seal(
    algo: &Algorithm,
    key: &[u8],
    iv: &Iv<IV_SIZE>,
    aad: &[u8],
    msg: &[u8],
) -> Result<Vec<u8>, Error> {
    let payload = Payload { msg, aad };
    let nonce = GenericArray::from_slice(&iv.0);

    Ok(match algo {
        Algorithm::Aes256Gcm(_) => Aes256Gcm::new_from_slice(key)?.encrypt(nonce, payload)?,
        Algorithm::ChaCha20Poly1305(_) => {
            ChaCha20Poly1305::new_from_slice(key)?.encrypt(nonce, payload)?
        }
    })
}

/// Decrypts a single message with the content algorithm.
pub(crate) fn open(
    algo: &Algorithm,
    key: &[u8],
    iv: &Iv<IV_SIZE>,
    aad: &[u8],
    ct: &[u8],
) -> Result<Vec<u8>, Error> {
    let payload = Payload { msg: ct, aad };
    let nonce = GenericArray::from_slice(&iv.0);

    Ok(match algo {
        Algorithm::Aes256Gcm(_) => Aes256Gcm::new_from_slice(key)?.decrypt(nonce, payload)?,
        Algorithm::ChaCha20Poly1305(_) => {
            ChaCha20Poly1305::new_from_slice(key)?.decrypt(nonce, payload)?
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn algos() -> [Algorithm; 2] {
        [
            Algorithm::Aes256Gcm(Iv([1u8; IV_SIZE])),
            Algorithm::ChaCha20Poly1305(Iv([2u8; IV_SIZE])),
        ]
    }

    #[test]
    fn test_stream() {
        let key = [9u8; KEY_SIZE];

        for algo in algos() {
            let mut enc = StreamEncryptor::new(&algo, &key).unwrap();
            let mut a = b"first".to_vec();
            let mut b = b"last".to_vec();
            enc.encrypt_next(b"aad", &mut a).unwrap();
            enc.encrypt_last(b"aad", &mut b).unwrap();
            assert_eq!(a.len(), 5 + TAG_SIZE);

            let mut dec = StreamDecryptor::new(&algo, &key).unwrap();
            dec.decrypt_next(b"aad", &mut a).unwrap();
            assert_eq!(a, b"first");

            // The last segment does not decrypt as a non-final one.
            let mut b2 = b.clone();
            assert!(matches!(
                dec.decrypt_next(b"aad", &mut b2),
                Err(Error::Symmetric)
            ));

            let mut dec = StreamDecryptor::new(&algo, &key).unwrap();
            let mut a = {
                let mut enc = StreamEncryptor::new(&algo, &key).unwrap();
                let mut a = b"first".to_vec();
                enc.encrypt_next(b"aad", &mut a).unwrap();
                a
            };
            dec.decrypt_next(b"aad", &mut a).unwrap();
            dec.decrypt_last(b"aad", &mut b).unwrap();
            assert_eq!(b, b"last");
        }
    }

    #[test]
    fn test_single_message() {
        let key = [3u8; KEY_SIZE];
        let iv = Iv([4u8; IV_SIZE]);

        for algo in algos() {
            let ct = seal(&algo, &key, &iv, b"aad", b"message").unwrap();
            assert_eq!(open(&algo, &key, &iv, b"aad", &ct).unwrap(), b"message");
            assert!(matches!(
                open(&algo, &key, &iv, b"other", &ct),
                Err(Error::Symmetric)
            ));
        }
    }
}
