//! Length-hiding padding.
//!
//! Padding is appended to the plaintext before segmentation: zero bytes followed by a trailer
//! that holds the total number of padding bytes (trailer included) as a big-endian `u32`.
//!
//! The padded length `P` is the smallest value of at least `n + 4` for which the body length
//! `P + 16 * max(1, ceil(P / segment))` is a multiple of the frame. The body length grows by
//! one per step, except at segment boundaries where it also gains a tag. Since boundaries are
//! at least a frame apart, every window of `2 * frame` candidates contains a run of `frame`
//! consecutive body lengths, so `P - n < 4 + 2 * frame`.

use crate::consts::{PADDING_TRAILER_SIZE, TAG_SIZE};
use crate::error::Error;

/// Length of a body that carries `plain_len` (possibly padded) plaintext bytes.
pub(crate) fn body_len(plain_len: u64, segment_size: u32) -> Result<u64, Error> {
    if segment_size == 0 {
        return Err(Error::ConstraintViolation);
    }

    let segments = core::cmp::max(1, plain_len.div_ceil(u64::from(segment_size)));

    segments
        .checked_mul(TAG_SIZE as u64)
        .and_then(|tags| tags.checked_add(plain_len))
        .ok_or(Error::ConstraintViolation)
}

/// The padded plaintext length for `n` bytes of plaintext.
pub(crate) fn padded_len(n: u64, segment_size: u32, frame: u32) -> Result<u64, Error> {
    if frame == 0 || frame > segment_size {
        return Err(Error::ConstraintViolation);
    }

    let frame = u64::from(frame);
    let mut p = n
        .checked_add(PADDING_TRAILER_SIZE as u64)
        .ok_or(Error::ConstraintViolation)?;

    for _ in 0..2 * frame {
        if body_len(p, segment_size)? % frame == 0 {
            return Ok(p);
        }

        p = p.checked_add(1).ok_or(Error::ConstraintViolation)?;
    }

    Err(Error::ConstraintViolation)
}

/// The padding bytes for `n` bytes of plaintext.
pub(crate) fn padding(n: u64, segment_size: u32, frame: u32) -> Result<Vec<u8>, Error> {
    let pad_total = usize::try_from(padded_len(n, segment_size, frame)? - n)?;

    let mut pad = vec![0u8; pad_total];
    pad[pad_total - PADDING_TRAILER_SIZE..].copy_from_slice(&u32::try_from(pad_total)?.to_be_bytes());

    Ok(pad)
}

/// Strips padding from a stream of plaintext.
///
/// Holds back the bytes that may still turn out to be padding.
#[derive(Debug)]
pub(crate) struct Unpadder {
    hold: usize,
    buf: Vec<u8>,
}

impl Unpadder {
    pub(crate) fn new(frame: u32) -> Self {
        let hold = PADDING_TRAILER_SIZE + 2 * frame as usize;

        Self {
            hold,
            buf: Vec::with_capacity(hold),
        }
    }

    /// Adds plaintext, releasing what can no longer be padding.
    pub(crate) fn push(&mut self, data: &[u8], mut release: impl FnMut(&[u8])) {
        self.buf.extend_from_slice(data);

        if self.buf.len() > self.hold {
            let n = self.buf.len() - self.hold;
            release(&self.buf[..n]);
            self.buf.drain(..n);
        }
    }

    /// Checks and strips the padding, releasing the remaining plaintext.
    pub(crate) fn finish(self, mut release: impl FnMut(&[u8])) -> Result<(), Error> {
        let len = self.buf.len();
        if len < PADDING_TRAILER_SIZE {
            return Err(Error::FormatViolation("padding trailer".to_string()));
        }

        let trailer: [u8; PADDING_TRAILER_SIZE] = self.buf[len - PADDING_TRAILER_SIZE..].try_into()?;
        let pad_total = u32::from_be_bytes(trailer) as usize;

        if pad_total < PADDING_TRAILER_SIZE || pad_total > len {
            return Err(Error::FormatViolation("padding length".to_string()));
        }

        let data_len = len - pad_total;
        if self.buf[data_len..len - PADDING_TRAILER_SIZE]
            .iter()
            .any(|b| *b != 0)
        {
            return Err(Error::FormatViolation("padding".to_string()));
        }

        release(&self.buf[..data_len]);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_body_len() {
        assert_eq!(body_len(0, 1024).unwrap(), 16);
        assert_eq!(body_len(1, 1024).unwrap(), 17);
        assert_eq!(body_len(1024, 1024).unwrap(), 1040);
        assert_eq!(body_len(1025, 1024).unwrap(), 1025 + 32);
    }

    #[test]
    fn test_padded_len() {
        // 5 + 4 bytes, plus a tag: 25 -> 160.
        assert_eq!(padded_len(5, 65536, 160).unwrap(), 144);
        assert_eq!(padded_len(140, 65536, 160).unwrap(), 144);
        assert_eq!(padded_len(141, 65536, 160).unwrap(), 304);

        assert!(padded_len(1, 100, 160).is_err());
        assert!(padded_len(1, 100, 0).is_err());
    }

    #[test]
    fn test_unpadder() {
        let data = b"hello world".to_vec();
        let pad = padding(data.len() as u64, 64, 32).unwrap();

        let mut out = Vec::new();
        let mut unpadder = Unpadder::new(32);
        for b in data.iter().chain(pad.iter()) {
            unpadder.push(&[*b], |r| out.extend_from_slice(r));
        }
        unpadder.finish(|r| out.extend_from_slice(r)).unwrap();

        assert_eq!(out, data);
    }

    #[test]
    fn test_unpadder_rejects_garbage() {
        let mut unpadder = Unpadder::new(16);
        unpadder.push(&[1, 2, 3, 0, 0, 0, 5], |_| ());
        assert!(matches!(
            unpadder.finish(|_| ()),
            Err(Error::FormatViolation(_))
        ));

        let mut unpadder = Unpadder::new(16);
        unpadder.push(&[0, 0, 0, 100], |_| ());
        assert!(unpadder.finish(|_| ()).is_err());

        let unpadder = Unpadder::new(16);
        assert!(unpadder.finish(|_| ()).is_err());
    }

    proptest! {
        #[test]
        fn prop_body_is_frame_multiple(
            n in 0u64..200_000,
            frame in 1u32..512,
            extra in 0u32..4096,
        ) {
            let segment_size = frame + extra;
            let p = padded_len(n, segment_size, frame).unwrap();

            prop_assert!(p >= n + PADDING_TRAILER_SIZE as u64);
            prop_assert!(p - n < (PADDING_TRAILER_SIZE as u64) + 2 * u64::from(frame));
            prop_assert_eq!(body_len(p, segment_size).unwrap() % u64::from(frame), 0);
        }
    }
}
