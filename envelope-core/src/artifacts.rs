//! Artifacts of the envelope protocol.
//!
//! This module implements serde serialization and deserialization for small artifacts that
//! appear in headers and footers. Binary formats receive raw bytes, human-readable formats
//! (JSON) receive base64.

use base64ct::{Base64, Encoding};
use core::fmt;
use serde::de::{Error, SeqAccess, Visitor};
use serde::{ser::SerializeTuple, Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;

// Computes the byte length of raw bytes encoded in (padded) b64.
// We use this to preallocate a buffer to encode into.
const fn b64len(raw_len: usize) -> usize {
    (((raw_len - 1) / 3) + 1) * 4
}

pub(crate) fn serialize_bin_or_b64<S, T>(val: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: AsRef<[u8]>,
{
    if serializer.is_human_readable() {
        let mut enc_buf = vec![0u8; b64len(val.as_ref().len())];
        let encoded = Base64::encode(val.as_ref(), &mut enc_buf)
            .map_err(|e| serde::ser::Error::custom(format!("base64ct serialization error: {e}")))?;
        serializer.serialize_str(encoded)
    } else {
        let mut seq = serializer.serialize_tuple(val.as_ref().len())?;
        for b in val.as_ref() {
            seq.serialize_element(b)?;
        }
        seq.end()
    }
}

pub(crate) fn deserialize_bin_or_b64<'de, D: Deserializer<'de>>(
    buf: &mut [u8],
    deserializer: D,
) -> Result<(), D::Error> {
    if deserializer.is_human_readable() {
        struct StrVisitor<'b>(&'b mut [u8]);

        impl<'de> Visitor<'de> for StrVisitor<'_> {
            type Value = ();

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "a string of length {}", b64len(self.0.len()))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: Error,
            {
                if v.len() != b64len(self.0.len()) {
                    return Err(Error::invalid_length(v.len(), &self));
                }

                Base64::decode(v, self.0).map_err(|e| {
                    serde::de::Error::custom(format!("base64ct decoding error: {e}"))
                })?;

                Ok(())
            }
        }

        deserializer.deserialize_str(StrVisitor(buf))
    } else {
        struct ArrayVisitor<'b>(&'b mut [u8]);

        impl<'de> Visitor<'de> for ArrayVisitor<'_> {
            type Value = ();

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "an array of length {}", self.0.len())
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                for (index, byte) in self.0.iter_mut().enumerate() {
                    *byte = match seq.next_element()? {
                        Some(byte) => byte,
                        None => return Err(Error::invalid_length(index, &self)),
                    };
                }

                Ok(())
            }
        }

        deserializer.deserialize_tuple(buf.len(), ArrayVisitor(buf))
    }
}

// Variable-length counterpart of the functions above, for byte strings whose length is only known
// from the encoding itself.
pub(crate) fn serialize_bytes_or_b64<S, T>(val: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: AsRef<[u8]>,
{
    if serializer.is_human_readable() {
        serializer.serialize_str(&Base64::encode_string(val.as_ref()))
    } else {
        serializer.serialize_bytes(val.as_ref())
    }
}

pub(crate) fn deserialize_bytes_or_b64<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<u8>, D::Error> {
    if deserializer.is_human_readable() {
        let s = String::deserialize(deserializer)?;
        Base64::decode_vec(&s)
            .map_err(|e| serde::de::Error::custom(format!("base64ct decoding error: {e}")))
    } else {
        Vec::<u8>::deserialize(deserializer)
    }
}

/// A key identifier.
///
/// A short fingerprint of a public key, see [`KeyManager`][`crate::keys::KeyManager`]. Used to
/// address recipients in the header and signers in the footer.
#[derive(Clone, Hash)]
pub struct KeyId(Vec<u8>);

impl KeyId {
    /// Wraps raw identifier bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the identifier in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the identifier is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hexadecimal representation.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl PartialEq for KeyId {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for KeyId {}

impl AsRef<[u8]> for KeyId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeyId").field(&self.to_hex()).finish()
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for KeyId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialize_bytes_or_b64(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for KeyId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize_bytes_or_b64(deserializer).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_id_json() {
        let id = KeyId::from_bytes(vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let s = serde_json::to_string(&id).unwrap();
        assert_eq!(s, "\"AQIDBAUGBwg=\"");

        let decoded: KeyId = serde_json::from_str(&s).unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn test_key_id_bincode() {
        let id = KeyId::from_bytes(vec![0xAB; 32]);
        let bytes = bincode::serialize(&id).unwrap();

        // Length prefix followed by the raw bytes.
        assert_eq!(bytes.len(), 8 + 32);

        let decoded: KeyId = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn test_key_id_display() {
        let id = KeyId::from_bytes(vec![0x00, 0xff, 0x10]);
        assert_eq!(id.to_string(), "00ff10");
        assert_ne!(id, KeyId::from_bytes(vec![0x00, 0xff]));
    }
}
