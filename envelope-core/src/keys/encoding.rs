//! Key serialization.
//!
//! The canonical encoding of a key is the [`KEY_PRELUDE`] followed by a bincode-serialized
//! [`EncodedKey`]: a top-level algorithm code and a flat list of components. Single-algorithm keys
//! have one component, hybrid keys two (classical, post-quantum) and compound keys two or three
//! (signer, cipher, optional post-quantum cipher).
//!
//! The public encoding is the input of the key identifier, so it must be deterministic.
//!
//! Keys not starting with the prelude are parsed as DER-encoded PKCS#8 (private) or
//! SubjectPublicKeyInfo (public) documents.
//!
//! Password-protected private keys are PKCS#8 `EncryptedPrivateKeyInfo` documents. The encrypted
//! payload is the canonical encoding, or a plain PKCS#8 document when imported from elsewhere.

use super::material::{PublicMaterial, SecretMaterial};
use super::AlgId;
use crate::consts::KEY_PRELUDE;
use crate::error::Error;

use pkcs8::der::Encode;
use pkcs8::pkcs5::pbes2;
use pkcs8::spki::SubjectPublicKeyInfoRef;
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncryptedPrivateKeyInfo, PrivateKeyInfo};
use pkcs8::ObjectIdentifier;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

const HYBRID_CODE: u16 = 0x100;
const COMPOUND_CODE: u16 = 0x200;

const ED25519_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");
const X25519_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.110");
const EC_PUBLIC_KEY_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const SECP256R1_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const RSA_ENCRYPTION_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

#[derive(Debug, Serialize, Deserialize)]
struct Component {
    alg: u16,
    material: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EncodedKey {
    alg: u16,
    components: Vec<Component>,
}

fn alg_from_code(code: u16) -> Result<AlgId, Error> {
    AlgId::from_code(code).ok_or(Error::UnknownAlgId)
}

fn key_format(e: impl core::fmt::Display) -> Error {
    Error::KeyFormat(e.to_string())
}

fn serialize(key: &EncodedKey) -> Result<Vec<u8>, Error> {
    let mut out = KEY_PRELUDE.to_vec();
    bincode::serialize_into(&mut out, key)?;

    Ok(out)
}

fn deserialize(bytes: &[u8]) -> Result<EncodedKey, Error> {
    let body = bytes
        .strip_prefix(&KEY_PRELUDE[..])
        .ok_or_else(|| Error::KeyFormat("missing key prelude".to_string()))?;

    bincode::deserialize(body).map_err(key_format)
}

/// Encodes public key material canonically.
pub(crate) fn encode_public(material: &PublicMaterial) -> Result<Vec<u8>, Error> {
    let single = |m: &PublicMaterial| -> Result<Component, Error> {
        Ok(Component {
            alg: m.alg()?.code(),
            material: m.encode_single()?,
        })
    };

    let key = match material {
        PublicMaterial::Hybrid(a, b) => EncodedKey {
            alg: HYBRID_CODE,
            components: vec![single(a)?, single(b)?],
        },
        PublicMaterial::Compound { signer, cipher } => {
            let mut components = vec![single(signer)?];
            match cipher.as_ref() {
                PublicMaterial::Hybrid(a, b) => {
                    components.push(single(a)?);
                    components.push(single(b)?);
                }
                other => components.push(single(other)?),
            }

            EncodedKey {
                alg: COMPOUND_CODE,
                components,
            }
        }
        other => EncodedKey {
            alg: other.alg()?.code(),
            components: vec![single(other)?],
        },
    };

    serialize(&key)
}

/// Encodes secret key material canonically.
pub(crate) fn encode_secret(material: &SecretMaterial) -> Result<Zeroizing<Vec<u8>>, Error> {
    let single = |m: &SecretMaterial| -> Result<Component, Error> {
        Ok(Component {
            alg: m.public().alg()?.code(),
            material: m.encode_single()?.to_vec(),
        })
    };

    let mut key = match material {
        SecretMaterial::Hybrid(a, b) => EncodedKey {
            alg: HYBRID_CODE,
            components: vec![single(a)?, single(b)?],
        },
        SecretMaterial::Compound { signer, cipher } => {
            let mut components = vec![single(signer)?];
            match cipher.as_ref() {
                SecretMaterial::Hybrid(a, b) => {
                    components.push(single(a)?);
                    components.push(single(b)?);
                }
                other => components.push(single(other)?),
            }

            EncodedKey {
                alg: COMPOUND_CODE,
                components,
            }
        }
        other => EncodedKey {
            alg: other.public().alg()?.code(),
            components: vec![single(other)?],
        },
    };

    let out = serialize(&key).map(Zeroizing::new);
    for c in key.components.iter_mut() {
        zeroize::Zeroize::zeroize(&mut c.material);
    }

    out
}

/// Rebuilds a (possibly hybrid or compound) key from decoded single-algorithm parts.
fn assemble<M>(
    key: &EncodedKey,
    decode: impl Fn(AlgId, &[u8]) -> Result<M, Error>,
    hybrid: impl Fn(M, M) -> M,
    compound: impl Fn(M, M) -> M,
) -> Result<M, Error> {
    let parts = key
        .components
        .iter()
        .map(|c| decode(alg_from_code(c.alg)?, &c.material))
        .collect::<Result<Vec<M>, Error>>()?;
    let mut parts = parts.into_iter();

    match (key.alg, parts.len()) {
        (HYBRID_CODE, 2) | (COMPOUND_CODE, 2 | 3) => {
            let mut next = || {
                parts
                    .next()
                    .ok_or_else(|| Error::KeyFormat("missing component".to_string()))
            };

            if key.alg == HYBRID_CODE {
                let a = next()?;
                let b = next()?;
                Ok(hybrid(a, b))
            } else {
                let signer = next()?;
                let cipher = next()?;
                let cipher = match next() {
                    Ok(pq) => hybrid(cipher, pq),
                    Err(_) => cipher,
                };
                Ok(compound(signer, cipher))
            }
        }
        (HYBRID_CODE | COMPOUND_CODE, n) => Err(Error::KeyFormat(format!(
            "unexpected number of components: {n}"
        ))),
        (code, 1) => {
            let part = parts
                .next()
                .ok_or_else(|| Error::KeyFormat("missing component".to_string()))?;
            if key.components[0].alg != code {
                return Err(Error::KeyFormat("algorithm mismatch".to_string()));
            }
            Ok(part)
        }
        (code, _) => {
            alg_from_code(code)?;
            Err(Error::KeyFormat("unexpected number of components".to_string()))
        }
    }
}

/// Decodes public key material, canonical or SubjectPublicKeyInfo.
pub(crate) fn decode_public(bytes: &[u8]) -> Result<PublicMaterial, Error> {
    if !bytes.starts_with(&KEY_PRELUDE) {
        return decode_spki(bytes);
    }

    let key = deserialize(bytes)?;
    assemble(
        &key,
        PublicMaterial::decode_single,
        |a, b| PublicMaterial::Hybrid(Box::new(a), Box::new(b)),
        |signer, cipher| PublicMaterial::Compound {
            signer: Box::new(signer),
            cipher: Box::new(cipher),
        },
    )
}

/// Decodes secret key material, canonical or PKCS#8.
pub(crate) fn decode_secret(bytes: &[u8]) -> Result<SecretMaterial, Error> {
    if !bytes.starts_with(&KEY_PRELUDE) {
        return decode_pkcs8(bytes);
    }

    let mut key = deserialize(bytes)?;
    let res = assemble(
        &key,
        SecretMaterial::decode_single,
        |a, b| SecretMaterial::Hybrid(Box::new(a), Box::new(b)),
        |signer, cipher| SecretMaterial::Compound {
            signer: Box::new(signer),
            cipher: Box::new(cipher),
        },
    );

    for c in key.components.iter_mut() {
        zeroize::Zeroize::zeroize(&mut c.material);
    }

    res
}

/// Encrypts secret key material under a password (PBES2 with scrypt and AES-256-CBC).
pub(crate) fn encrypt_secret<R: RngCore + CryptoRng>(
    material: &SecretMaterial,
    password: &[u8],
    rng: &mut R,
) -> Result<Vec<u8>, Error> {
    let plain = encode_secret(material)?;

    let mut salt = [0u8; 16];
    rng.fill_bytes(&mut salt);

    let mut iv = [0u8; 16];
    rng.fill_bytes(&mut iv);

    let params =
        pbes2::Parameters::scrypt_aes256cbc(Default::default(), &salt, &iv).map_err(key_format)?;
    let encrypted_data = params.encrypt(password, &plain).map_err(key_format)?;

    EncryptedPrivateKeyInfo {
        encryption_algorithm: params.into(),
        encrypted_data: &encrypted_data,
    }
    .to_der()
    .map_err(key_format)
}

/// Decrypts a password-protected private key.
pub(crate) fn decrypt_secret(bytes: &[u8], password: &[u8]) -> Result<SecretMaterial, Error> {
    let info = EncryptedPrivateKeyInfo::try_from(bytes).map_err(key_format)?;
    let plain = info
        .encryption_algorithm
        .decrypt(password, info.encrypted_data)
        .map(Zeroizing::new)
        .map_err(|_| Error::KeyDecryption)?;

    // A wrong password may still unpad correctly, leaving garbage.
    decode_secret(&plain).map_err(|_| Error::KeyDecryption)
}

fn decode_pkcs8(der: &[u8]) -> Result<SecretMaterial, Error> {
    let info = PrivateKeyInfo::try_from(der).map_err(key_format)?;
    let oid = info.algorithm.oid;

    if oid == ED25519_OID {
        ed25519_dalek::SigningKey::from_pkcs8_der(der)
            .map(SecretMaterial::Ed25519)
            .map_err(key_format)
    } else if oid == X25519_OID {
        // The private key is an OCTET STRING wrapping the 32-byte scalar.
        match info.private_key {
            [0x04, 0x20, rest @ ..] if rest.len() == 32 => {
                let mut scalar = Zeroizing::new([0u8; 32]);
                scalar.copy_from_slice(rest);
                Ok(SecretMaterial::Curve25519(x25519_dalek::StaticSecret::from(
                    *scalar,
                )))
            }
            _ => Err(Error::KeyFormat("malformed X25519 private key".to_string())),
        }
    } else if oid == EC_PUBLIC_KEY_OID {
        if info.algorithm.parameters_oid().map_err(key_format)? != SECP256R1_OID {
            return Err(Error::UnknownAlgId);
        }
        p256::SecretKey::from_pkcs8_der(der)
            .map(SecretMaterial::Secp256r1)
            .map_err(key_format)
    } else if oid == RSA_ENCRYPTION_OID {
        let sk = rsa::RsaPrivateKey::from_pkcs8_der(der).map_err(key_format)?;
        Ok(SecretMaterial::Rsa(Box::new(sk)))
    } else {
        Err(Error::UnknownAlgId)
    }
}

fn decode_spki(der: &[u8]) -> Result<PublicMaterial, Error> {
    let info = SubjectPublicKeyInfoRef::try_from(der).map_err(key_format)?;
    let oid = info.algorithm.oid;

    if oid == ED25519_OID {
        ed25519_dalek::VerifyingKey::from_public_key_der(der)
            .map(PublicMaterial::Ed25519)
            .map_err(key_format)
    } else if oid == X25519_OID {
        let raw: [u8; 32] = info
            .subject_public_key
            .raw_bytes()
            .try_into()
            .map_err(|_| Error::KeyFormat("malformed X25519 public key".to_string()))?;
        Ok(PublicMaterial::Curve25519(x25519_dalek::PublicKey::from(raw)))
    } else if oid == EC_PUBLIC_KEY_OID {
        if info.algorithm.parameters_oid().map_err(key_format)? != SECP256R1_OID {
            return Err(Error::UnknownAlgId);
        }
        p256::PublicKey::from_public_key_der(der)
            .map(PublicMaterial::Secp256r1)
            .map_err(key_format)
    } else if oid == RSA_ENCRYPTION_OID {
        let pk = rsa::RsaPublicKey::from_public_key_der(der).map_err(key_format)?;
        Ok(PublicMaterial::Rsa(Box::new(pk)))
    } else {
        Err(Error::UnknownAlgId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyType;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_canonical() {
        let mut rng = StdRng::seed_from_u64(7);

        for kt in [
            KeyType::Ed25519,
            KeyType::Secp256r1,
            KeyType::SECP256R1_MLKEM768,
            KeyType::CURVE25519_ED25519,
            KeyType::CURVE25519_MLKEM768_ED25519,
        ] {
            let sk = SecretMaterial::generate(kt, &mut rng).unwrap();
            let pk_bytes = encode_public(&sk.public()).unwrap();
            assert!(pk_bytes.starts_with(&KEY_PRELUDE));

            let pk = decode_public(&pk_bytes).unwrap();
            assert_eq!(pk.key_type().unwrap(), kt);
            assert_eq!(encode_public(&pk).unwrap(), pk_bytes);

            let sk_bytes = encode_secret(&sk).unwrap();
            let sk2 = decode_secret(&sk_bytes).unwrap();
            assert_eq!(encode_public(&sk2.public()).unwrap(), pk_bytes);
            assert_eq!(*encode_secret(&sk2).unwrap(), *sk_bytes);
        }
    }

    #[test]
    fn test_unknown_alg() {
        let key = EncodedKey {
            alg: 99,
            components: vec![Component {
                alg: 99,
                material: vec![0u8; 32],
            }],
        };
        let bytes = serialize(&key).unwrap();
        assert!(matches!(decode_public(&bytes), Err(Error::UnknownAlgId)));
        assert!(matches!(decode_secret(&bytes), Err(Error::UnknownAlgId)));
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(
            decode_public(&[0x45, 0x4B, 0x45, 0x59, 1, 2]),
            Err(Error::KeyFormat(_))
        ));
        assert!(matches!(decode_secret(b"garbage"), Err(Error::KeyFormat(_))));

        let key = EncodedKey {
            alg: HYBRID_CODE,
            components: vec![],
        };
        assert!(matches!(
            decode_public(&serialize(&key).unwrap()),
            Err(Error::KeyFormat(_))
        ));
    }

    #[test]
    fn test_password_protected() {
        let mut rng = StdRng::seed_from_u64(9);

        let sk = SecretMaterial::generate(KeyType::CURVE25519_MLKEM768_ED25519, &mut rng).unwrap();
        let canonical = encode_secret(&sk).unwrap();

        let encrypted = encrypt_secret(&sk, b"hunter2", &mut rng).unwrap();
        assert!(!encrypted.starts_with(&KEY_PRELUDE));
        assert!(EncryptedPrivateKeyInfo::try_from(&encrypted[..]).is_ok());

        let decrypted = decrypt_secret(&encrypted, b"hunter2").unwrap();
        assert_eq!(*encode_secret(&decrypted).unwrap(), *canonical);

        assert!(matches!(
            decrypt_secret(&encrypted, b"hunter3"),
            Err(Error::KeyDecryption)
        ));
        assert!(matches!(
            decrypt_secret(&canonical, b"hunter2"),
            Err(Error::KeyFormat(_))
        ));
    }

    #[test]
    fn test_encrypted_pkcs8() {
        use pkcs8::EncodePrivateKey;

        let mut rng = StdRng::seed_from_u64(10);

        let ed = ed25519_dalek::SigningKey::generate(&mut rng);
        let der = ed.to_pkcs8_encrypted_der(&mut rng, b"password").unwrap();

        let sk = decrypt_secret(der.as_bytes(), b"password").unwrap();
        let plain = decode_secret(ed.to_pkcs8_der().unwrap().as_bytes()).unwrap();
        assert_eq!(
            encode_public(&sk.public()).unwrap(),
            encode_public(&plain.public()).unwrap()
        );
    }

    #[test]
    fn test_pkcs8() {
        use pkcs8::{EncodePrivateKey, EncodePublicKey};

        let mut rng = StdRng::seed_from_u64(8);

        let ed = ed25519_dalek::SigningKey::generate(&mut rng);
        let der = ed.to_pkcs8_der().unwrap();
        let sk = decode_secret(der.as_bytes()).unwrap();
        assert!(matches!(sk, SecretMaterial::Ed25519(_)));

        let spki = ed.verifying_key().to_public_key_der().unwrap();
        let pk = decode_public(spki.as_bytes()).unwrap();
        assert_eq!(
            encode_public(&pk).unwrap(),
            encode_public(&sk.public()).unwrap()
        );

        let ec = p256::SecretKey::random(&mut rng);
        let der = ec.to_pkcs8_der().unwrap();
        let sk = decode_secret(der.as_bytes()).unwrap();
        assert_eq!(sk.public().key_type().unwrap(), KeyType::Secp256r1);

        let spki = ec.public_key().to_public_key_der().unwrap();
        let pk = decode_public(spki.as_bytes()).unwrap();
        assert_eq!(pk.key_type().unwrap(), KeyType::Secp256r1);
    }
}
