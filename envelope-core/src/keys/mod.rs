//! Asymmetric keys and their identities.
//!
//! Every key carries a [`KeyType`], a closed set of supported algorithms and combinations, and a
//! [`KeyId`], a deterministic fingerprint of its canonical public encoding. Keys are created
//! through the [`KeyManager`].

mod encoding;
mod manager;
pub(crate) mod material;

pub use manager::{KeyIdAlgorithm, KeyManager};

use crate::artifacts::KeyId;
use crate::error::Error;
use material::{PublicMaterial, SecretMaterial};

use core::fmt;
use core::str::FromStr;
use std::sync::Arc;
use serde::{Deserialize, Serialize};

/// A single asymmetric algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgId {
    /// Ed25519 signatures. Also usable for key exchange through its Montgomery form.
    Ed25519,
    /// X25519 key exchange.
    Curve25519,
    /// NIST P-256, both ECDSA and ECDH.
    Secp256r1,
    /// RSA, OAEP key transport and PKCS#1 v1.5 signatures.
    Rsa,
    /// ML-KEM-768 (FIPS 203) key encapsulation.
    MlKem768,
}

impl AlgId {
    /// Whether this algorithm can produce signatures.
    pub fn can_sign(self) -> bool {
        matches!(self, Self::Ed25519 | Self::Secp256r1 | Self::Rsa)
    }

    /// Whether this algorithm is believed to resist quantum attacks.
    pub fn is_post_quantum(self) -> bool {
        matches!(self, Self::MlKem768)
    }

    pub(crate) fn code(self) -> u16 {
        match self {
            Self::Ed25519 => 1,
            Self::Curve25519 => 2,
            Self::Secp256r1 => 3,
            Self::Rsa => 4,
            Self::MlKem768 => 5,
        }
    }

    pub(crate) fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            1 => Self::Ed25519,
            2 => Self::Curve25519,
            3 => Self::Secp256r1,
            4 => Self::Rsa,
            5 => Self::MlKem768,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Self::Ed25519 => "ed25519",
            Self::Curve25519 => "curve25519",
            Self::Secp256r1 => "secp256r1",
            Self::Rsa => "rsa",
            Self::MlKem768 => "mlkem768",
        }
    }
}

/// The type of an asymmetric key.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// Ed25519.
    #[default]
    Ed25519,
    /// Curve25519 (X25519).
    Curve25519,
    /// NIST P-256.
    Secp256r1,
    /// RSA with a 2048-bit modulus.
    Rsa2048,
    /// RSA with a 4096-bit modulus.
    Rsa4096,
    /// RSA with a 8192-bit modulus.
    Rsa8192,
    /// A classical key exchange combined with a post-quantum KEM. Both must be broken to recover
    /// a wrapped key.
    Hybrid {
        /// The classical key-exchange algorithm.
        classical: AlgId,
        /// The post-quantum KEM.
        post_quantum: AlgId,
    },
    /// A signing key and a (possibly hybrid) key-exchange key under one identifier.
    Compound {
        /// The signature algorithm.
        signer: AlgId,
        /// The classical key-exchange algorithm.
        cipher: AlgId,
        /// An optional post-quantum KEM, combined with `cipher`.
        cipher_pq: Option<AlgId>,
    },
}

impl KeyType {
    /// Curve25519 combined with ML-KEM-768.
    pub const CURVE25519_MLKEM768: Self = Self::Hybrid {
        classical: AlgId::Curve25519,
        post_quantum: AlgId::MlKem768,
    };

    /// P-256 combined with ML-KEM-768.
    pub const SECP256R1_MLKEM768: Self = Self::Hybrid {
        classical: AlgId::Secp256r1,
        post_quantum: AlgId::MlKem768,
    };

    /// Curve25519 for key exchange and Ed25519 for signatures.
    pub const CURVE25519_ED25519: Self = Self::Compound {
        signer: AlgId::Ed25519,
        cipher: AlgId::Curve25519,
        cipher_pq: None,
    };

    /// Curve25519 with ML-KEM-768 for key exchange, Ed25519 for signatures.
    pub const CURVE25519_MLKEM768_ED25519: Self = Self::Compound {
        signer: AlgId::Ed25519,
        cipher: AlgId::Curve25519,
        cipher_pq: Some(AlgId::MlKem768),
    };

    /// All supported key types.
    pub const ALL: [Self; 10] = [
        Self::Ed25519,
        Self::Curve25519,
        Self::Secp256r1,
        Self::Rsa2048,
        Self::Rsa4096,
        Self::Rsa8192,
        Self::CURVE25519_MLKEM768,
        Self::SECP256R1_MLKEM768,
        Self::CURVE25519_ED25519,
        Self::CURVE25519_MLKEM768_ED25519,
    ];

    /// Checks that the combination of algorithms is supported.
    pub fn validate(&self) -> Result<(), Error> {
        let ok = match *self {
            Self::Hybrid {
                classical,
                post_quantum,
            } => is_classical_kex(classical) && post_quantum.is_post_quantum(),
            Self::Compound {
                signer,
                cipher,
                cipher_pq,
            } => {
                signer == AlgId::Ed25519
                    && cipher == AlgId::Curve25519
                    && cipher_pq.map_or(true, AlgId::is_post_quantum)
            }
            _ => true,
        };

        if ok {
            Ok(())
        } else {
            Err(Error::UnknownKeyType)
        }
    }

    /// The single algorithm of a plain key type, `None` for hybrid and compound types.
    pub fn alg_id(&self) -> Option<AlgId> {
        match self {
            Self::Ed25519 => Some(AlgId::Ed25519),
            Self::Curve25519 => Some(AlgId::Curve25519),
            Self::Secp256r1 => Some(AlgId::Secp256r1),
            Self::Rsa2048 | Self::Rsa4096 | Self::Rsa8192 => Some(AlgId::Rsa),
            Self::Hybrid { .. } | Self::Compound { .. } => None,
        }
    }

    /// The RSA modulus length in bits, `None` for non-RSA types.
    pub fn rsa_bit_len(&self) -> Option<usize> {
        match self {
            Self::Rsa2048 => Some(2048),
            Self::Rsa4096 => Some(4096),
            Self::Rsa8192 => Some(8192),
            _ => None,
        }
    }

    /// The RSA key type for a modulus length in bits.
    pub fn from_rsa_bit_len(bits: usize) -> Result<Self, Error> {
        match bits {
            2048 => Ok(Self::Rsa2048),
            4096 => Ok(Self::Rsa4096),
            8192 => Ok(Self::Rsa8192),
            other => Err(Error::UnsupportedRsaLength(other)),
        }
    }

    /// Whether this is a hybrid key type.
    pub fn is_hybrid(&self) -> bool {
        matches!(self, Self::Hybrid { .. })
    }

    /// Whether this is a compound key type.
    pub fn is_compound(&self) -> bool {
        matches!(self, Self::Compound { .. })
    }

    /// Whether keys of this type can sign.
    ///
    /// Every key type can be used as a recipient, Ed25519 keys through their Montgomery form.
    pub fn can_sign(&self) -> bool {
        !matches!(self, Self::Curve25519 | Self::Hybrid { .. })
    }
}

fn is_classical_kex(alg: AlgId) -> bool {
    matches!(alg, AlgId::Curve25519 | AlgId::Secp256r1)
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ed25519 => f.write_str("ed25519"),
            Self::Curve25519 => f.write_str("curve25519"),
            Self::Secp256r1 => f.write_str("secp256r1"),
            Self::Rsa2048 => f.write_str("rsa2048"),
            Self::Rsa4096 => f.write_str("rsa4096"),
            Self::Rsa8192 => f.write_str("rsa8192"),
            Self::Hybrid {
                classical,
                post_quantum,
            } => write!(f, "{}-{}", classical.name(), post_quantum.name()),
            Self::Compound {
                signer,
                cipher,
                cipher_pq: None,
            } => write!(f, "{}-{}", cipher.name(), signer.name()),
            Self::Compound {
                signer,
                cipher,
                cipher_pq: Some(pq),
            } => write!(f, "{}-{}-{}", cipher.name(), pq.name(), signer.name()),
        }
    }
}

impl FromStr for KeyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.to_string() == s)
            .ok_or(Error::UnknownKeyType)
    }
}

/// A public key.
#[derive(Clone)]
pub struct PublicKey {
    pub(crate) id: KeyId,
    pub(crate) key_type: KeyType,
    pub(crate) material: Arc<PublicMaterial>,
}

impl PublicKey {
    /// The key identifier.
    pub fn id(&self) -> &KeyId {
        &self.id
    }

    /// The key type.
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("id", &self.id)
            .field("key_type", &self.key_type)
            .finish_non_exhaustive()
    }
}

/// A private key.
///
/// The secret material is zeroized when the last clone is dropped.
#[derive(Clone)]
pub struct PrivateKey {
    pub(crate) id: KeyId,
    pub(crate) key_type: KeyType,
    pub(crate) material: Arc<SecretMaterial>,
}

impl PrivateKey {
    /// The key identifier, equal to the identifier of the matching [`PublicKey`].
    pub fn id(&self) -> &KeyId {
        &self.id
    }

    /// The key type.
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("id", &self.id)
            .field("key_type", &self.key_type)
            .finish_non_exhaustive()
    }
}

/// A private key and its public key, sharing one identifier.
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// The private key.
    pub private_key: PrivateKey,
    /// The public key.
    pub public_key: PublicKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for t in KeyType::ALL {
            let s = t.to_string();
            assert_eq!(s.parse::<KeyType>().unwrap(), t);
            t.validate().unwrap();
        }

        assert_eq!(KeyType::CURVE25519_MLKEM768.to_string(), "curve25519-mlkem768");
        assert_eq!(KeyType::CURVE25519_ED25519.to_string(), "curve25519-ed25519");
        assert!(matches!(
            "rsa1024".parse::<KeyType>(),
            Err(Error::UnknownKeyType)
        ));
    }

    #[test]
    fn test_properties() {
        assert_eq!(KeyType::Rsa4096.rsa_bit_len(), Some(4096));
        assert_eq!(KeyType::Ed25519.rsa_bit_len(), None);
        assert!(KeyType::CURVE25519_MLKEM768.is_hybrid());
        assert!(KeyType::CURVE25519_ED25519.is_compound());
        assert_eq!(KeyType::CURVE25519_ED25519.alg_id(), None);
        assert_eq!(KeyType::Rsa8192.alg_id(), Some(AlgId::Rsa));
        assert!(!KeyType::Curve25519.can_sign());
        assert!(KeyType::CURVE25519_MLKEM768_ED25519.can_sign());
        assert!(matches!(
            KeyType::from_rsa_bit_len(1024),
            Err(Error::UnsupportedRsaLength(1024))
        ));
    }

    #[test]
    fn test_invalid_combinations() {
        let bad = [
            KeyType::Hybrid {
                classical: AlgId::Ed25519,
                post_quantum: AlgId::MlKem768,
            },
            KeyType::Hybrid {
                classical: AlgId::Curve25519,
                post_quantum: AlgId::Secp256r1,
            },
            KeyType::Compound {
                signer: AlgId::Curve25519,
                cipher: AlgId::Curve25519,
                cipher_pq: None,
            },
            KeyType::Compound {
                signer: AlgId::Ed25519,
                cipher: AlgId::Rsa,
                cipher_pq: None,
            },
            KeyType::Compound {
                signer: AlgId::Secp256r1,
                cipher: AlgId::Secp256r1,
                cipher_pq: None,
            },
            KeyType::Compound {
                signer: AlgId::Ed25519,
                cipher: AlgId::Curve25519,
                cipher_pq: Some(AlgId::Curve25519),
            },
        ];

        for t in bad {
            assert!(matches!(t.validate(), Err(Error::UnknownKeyType)));
        }
    }

    #[test]
    fn test_valid_combinations_have_names() {
        let algs = [
            AlgId::Ed25519,
            AlgId::Curve25519,
            AlgId::Secp256r1,
            AlgId::Rsa,
            AlgId::MlKem768,
        ];

        let mut types = Vec::new();
        for &a in &algs {
            for &b in &algs {
                types.push(KeyType::Hybrid {
                    classical: a,
                    post_quantum: b,
                });
                for pq in [None, Some(AlgId::MlKem768), Some(AlgId::Curve25519)] {
                    types.push(KeyType::Compound {
                        signer: a,
                        cipher: b,
                        cipher_pq: pq,
                    });
                }
            }
        }

        let valid: Vec<_> = types.into_iter().filter(|t| t.validate().is_ok()).collect();
        assert_eq!(valid.len(), 4);

        for t in valid {
            assert!(KeyType::ALL.contains(&t), "{t:?}");
            assert_eq!(t.to_string().parse::<KeyType>().unwrap(), t);
        }

        assert!(AlgId::MlKem768.is_post_quantum());
        assert!(!AlgId::Curve25519.is_post_quantum());
    }
}
