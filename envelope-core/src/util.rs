use crate::consts::*;
use crate::error::Error;

use sha2::{Digest, Sha512};

/// SHA-512 digest of the preamble and header, the associated data of all payload AEAD calls.
pub(crate) type HeaderDigest = [u8; 64];

/// Builds the preamble for a serialized header of `header_len` bytes.
pub(crate) fn preamble(header_len: usize) -> Result<[u8; PREAMBLE_SIZE], Error> {
    if header_len > MAX_HEADER_SIZE {
        return Err(Error::ConstraintViolation);
    }

    let mut out = [0u8; PREAMBLE_SIZE];
    out[..PRELUDE_SIZE].copy_from_slice(&PRELUDE);
    out[PRELUDE_SIZE..PRELUDE_SIZE + VERSION_SIZE].copy_from_slice(&VERSION_V1.to_be_bytes());
    out[PRELUDE_SIZE + VERSION_SIZE..].copy_from_slice(&u32::try_from(header_len)?.to_be_bytes());

    Ok(out)
}

/// Checks the preamble and returns the version and the header length.
pub(crate) fn preamble_checked(preamble: &[u8]) -> Result<(u16, usize), Error> {
    if preamble.len() != PREAMBLE_SIZE || preamble[..PRELUDE_SIZE] != PRELUDE {
        return Err(Error::NotEnvelope);
    }

    let version = u16::from_be_bytes(
        preamble[PRELUDE_SIZE..PRELUDE_SIZE + VERSION_SIZE].try_into()?,
    );

    if version != VERSION_V1 {
        return Err(Error::IncorrectVersion {
            expected: VERSION_V1,
            found: version,
        });
    }

    let header_len = u32::from_be_bytes(
        preamble[PRELUDE_SIZE + VERSION_SIZE..PREAMBLE_SIZE].try_into()?,
    ) as usize;

    if header_len > MAX_HEADER_SIZE {
        return Err(Error::ConstraintViolation);
    }

    Ok((version, header_len))
}

pub(crate) fn header_digest(preamble: &[u8], header: &[u8]) -> HeaderDigest {
    let mut h = Sha512::new();
    h.update(preamble);
    h.update(header);

    let mut out = [0u8; 64];
    out.copy_from_slice(&h.finalize());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preamble() {
        let p = preamble(1234).unwrap();
        assert_eq!(preamble_checked(&p).unwrap(), (VERSION_V1, 1234));

        let mut wrong = p;
        wrong[0] = 0;
        assert!(matches!(preamble_checked(&wrong), Err(Error::NotEnvelope)));

        let mut wrong = p;
        wrong[PRELUDE_SIZE + 1] = 7;
        assert!(matches!(
            preamble_checked(&wrong),
            Err(Error::IncorrectVersion { found: 7, .. })
        ));

        assert!(matches!(
            preamble(MAX_HEADER_SIZE + 1),
            Err(Error::ConstraintViolation)
        ));
    }
}
