//! Native key material and the primitive operations performed with it.
//!
//! Two capabilities are offered to the envelope layer:
//!
//! * Key establishment: [`PublicMaterial::encapsulate`] produces an encapsulation and a shared
//!   secret, [`SecretMaterial::decapsulate`] recovers the secret. Diffie-Hellman keys use an
//!   ephemeral key pair, RSA transports a fresh secret using OAEP and ML-KEM is a KEM by itself.
//! * Signatures over a SHA-512 digest of the message.
//!
//! Hybrid keys combine both halves: encapsulations are concatenated and so are the secrets, so
//! both algorithms need to be broken to learn the secret.

use super::{AlgId, KeyType};
use crate::consts::KEY_SIZE;
use crate::error::Error;

use ed25519_dalek::{Signer, Verifier};
use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{EncodedSizeUser, KemCore, MlKem768};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::{CryptoRng, RngCore};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Sha256, Sha512};
use zeroize::Zeroizing;

type MlKemDk = <MlKem768 as KemCore>::DecapsulationKey;
type MlKemEk = <MlKem768 as KemCore>::EncapsulationKey;

/// Encoded length of an ML-KEM-768 decapsulation key.
const MLKEM768_DK_SIZE: usize = 2400;

/// Secret key material.
pub(crate) enum SecretMaterial {
    Ed25519(ed25519_dalek::SigningKey),
    Curve25519(x25519_dalek::StaticSecret),
    Secp256r1(p256::SecretKey),
    Rsa(Box<RsaPrivateKey>),
    MlKem768 { dk: Box<MlKemDk>, ek: Box<MlKemEk> },
    Hybrid(Box<SecretMaterial>, Box<SecretMaterial>),
    Compound {
        signer: Box<SecretMaterial>,
        cipher: Box<SecretMaterial>,
    },
}

/// Public key material.
pub(crate) enum PublicMaterial {
    Ed25519(ed25519_dalek::VerifyingKey),
    Curve25519(x25519_dalek::PublicKey),
    Secp256r1(p256::PublicKey),
    Rsa(Box<RsaPublicKey>),
    MlKem768(Box<MlKemEk>),
    Hybrid(Box<PublicMaterial>, Box<PublicMaterial>),
    Compound {
        signer: Box<PublicMaterial>,
        cipher: Box<PublicMaterial>,
    },
}

fn key_format(e: impl core::fmt::Display) -> Error {
    Error::KeyFormat(e.to_string())
}

fn array32(bytes: &[u8]) -> Result<[u8; 32], Error> {
    bytes
        .try_into()
        .map_err(|_| Error::KeyFormat(format!("expected 32 bytes, found {}", bytes.len())))
}

impl SecretMaterial {
    /// Generates fresh key material for a (validated) key type.
    pub(crate) fn generate<R: RngCore + CryptoRng>(
        key_type: KeyType,
        rng: &mut R,
    ) -> Result<Self, Error> {
        key_type.validate()?;

        match key_type {
            KeyType::Ed25519 => Self::generate_alg(AlgId::Ed25519, rng),
            KeyType::Curve25519 => Self::generate_alg(AlgId::Curve25519, rng),
            KeyType::Secp256r1 => Self::generate_alg(AlgId::Secp256r1, rng),
            KeyType::Rsa2048 | KeyType::Rsa4096 | KeyType::Rsa8192 => {
                let bits = key_type.rsa_bit_len().ok_or(Error::UnknownKeyType)?;
                let sk = RsaPrivateKey::new(rng, bits).map_err(key_format)?;
                Ok(Self::Rsa(Box::new(sk)))
            }
            KeyType::Hybrid {
                classical,
                post_quantum,
            } => Ok(Self::Hybrid(
                Box::new(Self::generate_alg(classical, rng)?),
                Box::new(Self::generate_alg(post_quantum, rng)?),
            )),
            KeyType::Compound {
                signer,
                cipher,
                cipher_pq,
            } => {
                let signer = Self::generate_alg(signer, rng)?;
                let cipher = match cipher_pq {
                    None => Self::generate_alg(cipher, rng)?,
                    Some(pq) => Self::Hybrid(
                        Box::new(Self::generate_alg(cipher, rng)?),
                        Box::new(Self::generate_alg(pq, rng)?),
                    ),
                };

                Ok(Self::Compound {
                    signer: Box::new(signer),
                    cipher: Box::new(cipher),
                })
            }
        }
    }

    fn generate_alg<R: RngCore + CryptoRng>(alg: AlgId, rng: &mut R) -> Result<Self, Error> {
        match alg {
            AlgId::Ed25519 => Ok(Self::Ed25519(ed25519_dalek::SigningKey::generate(rng))),
            AlgId::Curve25519 => Ok(Self::Curve25519(
                x25519_dalek::StaticSecret::random_from_rng(&mut *rng),
            )),
            AlgId::Secp256r1 => Ok(Self::Secp256r1(p256::SecretKey::random(rng))),
            AlgId::MlKem768 => {
                let (dk, ek) = MlKem768::generate(rng);
                Ok(Self::MlKem768 {
                    dk: Box::new(dk),
                    ek: Box::new(ek),
                })
            }
            // The modulus length is part of the key type, not of the algorithm.
            AlgId::Rsa => Err(Error::UnknownKeyType),
        }
    }

    /// Derives the public key material.
    pub(crate) fn public(&self) -> PublicMaterial {
        match self {
            Self::Ed25519(sk) => PublicMaterial::Ed25519(sk.verifying_key()),
            Self::Curve25519(sk) => PublicMaterial::Curve25519(x25519_dalek::PublicKey::from(sk)),
            Self::Secp256r1(sk) => PublicMaterial::Secp256r1(sk.public_key()),
            Self::Rsa(sk) => PublicMaterial::Rsa(Box::new(sk.to_public_key())),
            Self::MlKem768 { ek, .. } => PublicMaterial::MlKem768(ek.clone()),
            Self::Hybrid(a, b) => PublicMaterial::Hybrid(Box::new(a.public()), Box::new(b.public())),
            Self::Compound { signer, cipher } => PublicMaterial::Compound {
                signer: Box::new(signer.public()),
                cipher: Box::new(cipher.public()),
            },
        }
    }

    /// Encodes a single-algorithm secret.
    pub(crate) fn encode_single(&self) -> Result<Zeroizing<Vec<u8>>, Error> {
        let bytes = match self {
            Self::Ed25519(sk) => sk.to_bytes().to_vec(),
            Self::Curve25519(sk) => sk.to_bytes().to_vec(),
            Self::Secp256r1(sk) => sk.to_bytes().to_vec(),
            Self::Rsa(sk) => sk.to_pkcs1_der().map_err(key_format)?.as_bytes().to_vec(),
            Self::MlKem768 { dk, ek } => {
                let mut v = dk.as_bytes().to_vec();
                v.extend_from_slice(&ek.as_bytes());
                v
            }
            Self::Hybrid(..) | Self::Compound { .. } => return Err(Error::UnknownKeyType),
        };

        Ok(Zeroizing::new(bytes))
    }

    /// Decodes a single-algorithm secret.
    pub(crate) fn decode_single(alg: AlgId, bytes: &[u8]) -> Result<Self, Error> {
        match alg {
            AlgId::Ed25519 => Ok(Self::Ed25519(ed25519_dalek::SigningKey::from_bytes(
                &array32(bytes)?,
            ))),
            AlgId::Curve25519 => Ok(Self::Curve25519(x25519_dalek::StaticSecret::from(
                array32(bytes)?,
            ))),
            AlgId::Secp256r1 => p256::SecretKey::from_slice(bytes)
                .map(Self::Secp256r1)
                .map_err(key_format),
            AlgId::Rsa => RsaPrivateKey::from_pkcs1_der(bytes)
                .map(|sk| Self::Rsa(Box::new(sk)))
                .map_err(key_format),
            AlgId::MlKem768 => {
                if bytes.len() < MLKEM768_DK_SIZE {
                    return Err(Error::KeyFormat("ML-KEM key too short".to_string()));
                }
                let (dk_bytes, ek_bytes) = bytes.split_at(MLKEM768_DK_SIZE);
                let dk = ml_kem::Encoded::<MlKemDk>::try_from(dk_bytes).map_err(key_format)?;
                let ek = ml_kem::Encoded::<MlKemEk>::try_from(ek_bytes).map_err(key_format)?;

                Ok(Self::MlKem768 {
                    dk: Box::new(MlKemDk::from_bytes(&dk)),
                    ek: Box::new(MlKemEk::from_bytes(&ek)),
                })
            }
        }
    }

    /// Recovers the secret encapsulated by [`PublicMaterial::encapsulate`].
    pub(crate) fn decapsulate(&self, encapsulation: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
        match self {
            Self::Ed25519(sk) => x25519_decaps(
                &x25519_dalek::StaticSecret::from(sk.to_scalar_bytes()),
                encapsulation,
            ),
            Self::Curve25519(sk) => x25519_decaps(sk, encapsulation),
            Self::Secp256r1(sk) => {
                let epk = p256::PublicKey::from_sec1_bytes(encapsulation).map_err(|_| Error::Kem)?;
                let ss = p256::ecdh::diffie_hellman(sk.to_nonzero_scalar(), epk.as_affine());
                Ok(Zeroizing::new(ss.raw_secret_bytes().to_vec()))
            }
            Self::Rsa(sk) => sk
                .decrypt(Oaep::new::<Sha256>(), encapsulation)
                .map(Zeroizing::new)
                .map_err(|_| Error::Kem),
            Self::MlKem768 { dk, .. } => {
                let ct = ml_kem::Ciphertext::<MlKem768>::try_from(encapsulation)
                    .map_err(|_| Error::Kem)?;
                let ss = dk.decapsulate(&ct).map_err(|_| Error::Kem)?;
                Ok(Zeroizing::new(ss.to_vec()))
            }
            Self::Hybrid(a, b) => {
                let (ea, eb): (Vec<u8>, Vec<u8>) =
                    bincode::deserialize(encapsulation).map_err(|_| Error::Kem)?;
                let sa = a.decapsulate(&ea)?;
                let sb = b.decapsulate(&eb)?;
                Ok(concat_secrets(&sa, &sb))
            }
            Self::Compound { cipher, .. } => cipher.decapsulate(encapsulation),
        }
    }

    /// Signs a message digest.
    pub(crate) fn sign(&self, digest: &[u8]) -> Result<Vec<u8>, Error> {
        match self {
            Self::Ed25519(sk) => Ok(sk.sign(digest).to_bytes().to_vec()),
            Self::Secp256r1(sk) => {
                let signer = p256::ecdsa::SigningKey::from(sk);
                let sig: p256::ecdsa::Signature = signer.sign(digest);
                Ok(sig.to_bytes().to_vec())
            }
            Self::Rsa(sk) => sk
                .sign(Pkcs1v15Sign::new::<Sha512>(), digest)
                .map_err(|_| Error::KeyDoesntSupportSigning),
            Self::Compound { signer, .. } => signer.sign(digest),
            Self::Curve25519(_) | Self::MlKem768 { .. } | Self::Hybrid(..) => {
                Err(Error::KeyDoesntSupportSigning)
            }
        }
    }
}

impl PublicMaterial {
    /// The single algorithm of this material.
    pub(crate) fn alg(&self) -> Result<AlgId, Error> {
        match self {
            Self::Ed25519(_) => Ok(AlgId::Ed25519),
            Self::Curve25519(_) => Ok(AlgId::Curve25519),
            Self::Secp256r1(_) => Ok(AlgId::Secp256r1),
            Self::Rsa(_) => Ok(AlgId::Rsa),
            Self::MlKem768(_) => Ok(AlgId::MlKem768),
            Self::Hybrid(..) | Self::Compound { .. } => Err(Error::UnknownKeyType),
        }
    }

    /// Re-derives the key type from the material.
    pub(crate) fn key_type(&self) -> Result<KeyType, Error> {
        let key_type = match self {
            Self::Ed25519(_) => KeyType::Ed25519,
            Self::Curve25519(_) => KeyType::Curve25519,
            Self::Secp256r1(_) => KeyType::Secp256r1,
            Self::Rsa(pk) => KeyType::from_rsa_bit_len(pk.size() * 8)?,
            // ML-KEM is only supported as part of a hybrid.
            Self::MlKem768(_) => return Err(Error::UnknownKeyType),
            Self::Hybrid(a, b) => KeyType::Hybrid {
                classical: a.alg()?,
                post_quantum: b.alg()?,
            },
            Self::Compound { signer, cipher } => {
                let (cipher, cipher_pq) = match cipher.as_ref() {
                    Self::Hybrid(a, b) => (a.alg()?, Some(b.alg()?)),
                    other => (other.alg()?, None),
                };

                KeyType::Compound {
                    signer: signer.alg()?,
                    cipher,
                    cipher_pq,
                }
            }
        };

        key_type.validate()?;
        Ok(key_type)
    }

    /// Encodes single-algorithm public material.
    pub(crate) fn encode_single(&self) -> Result<Vec<u8>, Error> {
        Ok(match self {
            Self::Ed25519(pk) => pk.to_bytes().to_vec(),
            Self::Curve25519(pk) => pk.as_bytes().to_vec(),
            Self::Secp256r1(pk) => pk.to_encoded_point(true).as_bytes().to_vec(),
            Self::Rsa(pk) => pk.to_pkcs1_der().map_err(key_format)?.as_bytes().to_vec(),
            Self::MlKem768(ek) => ek.as_bytes().to_vec(),
            Self::Hybrid(..) | Self::Compound { .. } => return Err(Error::UnknownKeyType),
        })
    }

    /// Decodes single-algorithm public material.
    pub(crate) fn decode_single(alg: AlgId, bytes: &[u8]) -> Result<Self, Error> {
        match alg {
            AlgId::Ed25519 => ed25519_dalek::VerifyingKey::from_bytes(&array32(bytes)?)
                .map(Self::Ed25519)
                .map_err(key_format),
            AlgId::Curve25519 => Ok(Self::Curve25519(x25519_dalek::PublicKey::from(
                array32(bytes)?,
            ))),
            AlgId::Secp256r1 => p256::PublicKey::from_sec1_bytes(bytes)
                .map(Self::Secp256r1)
                .map_err(key_format),
            AlgId::Rsa => RsaPublicKey::from_pkcs1_der(bytes)
                .map(|pk| Self::Rsa(Box::new(pk)))
                .map_err(key_format),
            AlgId::MlKem768 => {
                let ek = ml_kem::Encoded::<MlKemEk>::try_from(bytes).map_err(key_format)?;
                Ok(Self::MlKem768(Box::new(MlKemEk::from_bytes(&ek))))
            }
        }
    }

    /// Establishes a fresh secret for the owner of this public key.
    ///
    /// Returns the encapsulation, which is stored in the header, and the secret.
    pub(crate) fn encapsulate<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>), Error> {
        match self {
            Self::Ed25519(pk) => x25519_encaps(
                &x25519_dalek::PublicKey::from(pk.to_montgomery().to_bytes()),
                rng,
            ),
            Self::Curve25519(pk) => x25519_encaps(pk, rng),
            Self::Secp256r1(pk) => {
                let esk = p256::ecdh::EphemeralSecret::random(rng);
                let epk = esk.public_key().to_encoded_point(true);
                let ss = esk.diffie_hellman(pk);
                Ok((
                    epk.as_bytes().to_vec(),
                    Zeroizing::new(ss.raw_secret_bytes().to_vec()),
                ))
            }
            Self::Rsa(pk) => {
                let mut secret = Zeroizing::new(vec![0u8; KEY_SIZE]);
                rng.fill_bytes(&mut secret);
                let ct = pk
                    .encrypt(rng, Oaep::new::<Sha256>(), &secret)
                    .map_err(|_| Error::Kem)?;
                Ok((ct, secret))
            }
            Self::MlKem768(ek) => {
                let (ct, ss) = ek.encapsulate(rng).map_err(|_| Error::Kem)?;
                Ok((ct.to_vec(), Zeroizing::new(ss.to_vec())))
            }
            Self::Hybrid(a, b) => {
                let (ea, sa) = a.encapsulate(rng)?;
                let (eb, sb) = b.encapsulate(rng)?;
                let encapsulation = bincode::serialize(&(ea, eb))?;
                Ok((encapsulation, concat_secrets(&sa, &sb)))
            }
            Self::Compound { cipher, .. } => cipher.encapsulate(rng),
        }
    }

    /// Verifies a signature over a message digest.
    ///
    /// Malformed signatures do not verify. Errors only if the key can not verify at all.
    pub(crate) fn verify(&self, digest: &[u8], signature: &[u8]) -> Result<bool, Error> {
        match self {
            Self::Ed25519(pk) => Ok(ed25519_dalek::Signature::from_slice(signature)
                .map(|sig| pk.verify(digest, &sig).is_ok())
                .unwrap_or(false)),
            Self::Secp256r1(pk) => {
                let verifier = p256::ecdsa::VerifyingKey::from(pk);
                Ok(p256::ecdsa::Signature::from_slice(signature)
                    .map(|sig| verifier.verify(digest, &sig).is_ok())
                    .unwrap_or(false))
            }
            Self::Rsa(pk) => Ok(pk
                .verify(Pkcs1v15Sign::new::<Sha512>(), digest, signature)
                .is_ok()),
            Self::Compound { signer, .. } => signer.verify(digest, signature),
            Self::Curve25519(_) | Self::MlKem768(_) | Self::Hybrid(..) => {
                Err(Error::KeyDoesntSupportSigning)
            }
        }
    }
}

fn concat_secrets(a: &[u8], b: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut secret = Zeroizing::new(Vec::with_capacity(a.len() + b.len()));
    secret.extend_from_slice(a);
    secret.extend_from_slice(b);
    secret
}

fn x25519_encaps<R: RngCore + CryptoRng>(
    pk: &x25519_dalek::PublicKey,
    rng: &mut R,
) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>), Error> {
    let esk = x25519_dalek::EphemeralSecret::random_from_rng(&mut *rng);
    let epk = x25519_dalek::PublicKey::from(&esk);
    let ss = esk.diffie_hellman(pk);

    if !ss.was_contributory() {
        return Err(Error::Kem);
    }

    Ok((epk.as_bytes().to_vec(), Zeroizing::new(ss.as_bytes().to_vec())))
}

fn x25519_decaps(
    sk: &x25519_dalek::StaticSecret,
    encapsulation: &[u8],
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let epk: [u8; 32] = encapsulation.try_into().map_err(|_| Error::Kem)?;
    let ss = sk.diffie_hellman(&x25519_dalek::PublicKey::from(epk));

    if !ss.was_contributory() {
        return Err(Error::Kem);
    }

    Ok(Zeroizing::new(ss.as_bytes().to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use sha2::Digest;

    const FAST_TYPES: &[KeyType] = &[
        KeyType::Ed25519,
        KeyType::Curve25519,
        KeyType::Secp256r1,
        KeyType::CURVE25519_MLKEM768,
        KeyType::SECP256R1_MLKEM768,
        KeyType::CURVE25519_ED25519,
        KeyType::CURVE25519_MLKEM768_ED25519,
    ];

    #[test]
    fn test_encapsulation() {
        let mut rng = StdRng::seed_from_u64(1);

        for kt in FAST_TYPES {
            let sk = SecretMaterial::generate(*kt, &mut rng).unwrap();
            let pk = sk.public();
            assert_eq!(pk.key_type().unwrap(), *kt);

            let (enc, ss1) = pk.encapsulate(&mut rng).unwrap();
            let ss2 = sk.decapsulate(&enc).unwrap();
            assert_eq!(ss1, ss2, "{kt}");

            let other = SecretMaterial::generate(*kt, &mut rng).unwrap();
            match other.decapsulate(&enc) {
                Ok(ss3) => assert_ne!(ss1, ss3),
                Err(e) => assert!(matches!(e, Error::Kem)),
            }
        }
    }

    #[test]
    fn test_signatures() {
        let mut rng = StdRng::seed_from_u64(2);
        let digest = Sha512::digest(b"some message");
        let other = Sha512::digest(b"another message");

        for kt in FAST_TYPES {
            let sk = SecretMaterial::generate(*kt, &mut rng).unwrap();
            let pk = sk.public();

            if !kt.can_sign() {
                assert!(matches!(sk.sign(&digest), Err(Error::KeyDoesntSupportSigning)));
                assert!(matches!(
                    pk.verify(&digest, &[0u8; 64]),
                    Err(Error::KeyDoesntSupportSigning)
                ));
                continue;
            }

            let sig = sk.sign(&digest).unwrap();
            assert!(pk.verify(&digest, &sig).unwrap(), "{kt}");
            assert!(!pk.verify(&other, &sig).unwrap());
            assert!(!pk.verify(&digest, &sig[1..]).unwrap());
        }
    }

    #[test]
    fn test_rsa() {
        let mut rng = StdRng::seed_from_u64(3);
        let sk = SecretMaterial::generate(KeyType::Rsa2048, &mut rng).unwrap();
        let pk = sk.public();
        assert_eq!(pk.key_type().unwrap(), KeyType::Rsa2048);

        let (enc, ss1) = pk.encapsulate(&mut rng).unwrap();
        assert_eq!(enc.len(), 256);
        assert_eq!(sk.decapsulate(&enc).unwrap(), ss1);

        let digest = Sha512::digest(b"m");
        let sig = sk.sign(&digest).unwrap();
        assert!(pk.verify(&digest, &sig).unwrap());
    }

    #[test]
    fn test_single_encoding() {
        let mut rng = StdRng::seed_from_u64(4);

        for alg in [
            AlgId::Ed25519,
            AlgId::Curve25519,
            AlgId::Secp256r1,
            AlgId::MlKem768,
        ] {
            let sk = SecretMaterial::generate_alg(alg, &mut rng).unwrap();
            let bytes = sk.encode_single().unwrap();
            let decoded = SecretMaterial::decode_single(alg, &bytes).unwrap();
            assert_eq!(*decoded.encode_single().unwrap(), *bytes);

            let pk = sk.public().encode_single().unwrap();
            let pk2 = PublicMaterial::decode_single(alg, &pk).unwrap();
            assert_eq!(pk2.encode_single().unwrap(), pk);
            assert_eq!(decoded.public().encode_single().unwrap(), pk);
        }

        assert!(matches!(
            SecretMaterial::decode_single(AlgId::Ed25519, &[0u8; 31]),
            Err(Error::KeyFormat(_))
        ));
    }
}
