// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Binary encoding primitives shared by every on-disk format (C1, §4.1).
//!
//! `vbyte` is the default posting codec: delta + variable-byte, 7 data bits
//! per byte with a continuation bit, classic and fast to decode. `gamma` is
//! the bit-packed Elias γ code, smaller for very skewed delta distributions
//! at the cost of bit-level (rather than byte-level) decoding. `null` mode
//! stores the postings themselves as raw little-endian `u64`s, no deltas and
//! no compression, useful only for debugging a corrupt stream without a
//! codec bug in the mix.
//!
//! Every compressed posting stream begins with a one-byte mode tag so a
//! reader never has to guess (or worse, inherit a caller's assumption about)
//! which codec produced it.

pub mod gamma;
pub mod plsh;
pub mod vbyte;

use crate::error::{Result, WumpusError};
use crate::types::{CompressionMode, Posting};

/// Compress a strictly increasing slice of postings into a mode-tagged
/// byte stream (§4.1 `compress`).
pub fn compress(postings: &[Posting], mode: CompressionMode, out: &mut Vec<u8>) {
    out.push(mode as u8);
    match mode {
        CompressionMode::VByte => vbyte::compress_deltas(postings, out),
        CompressionMode::Gamma => gamma::compress_deltas(postings, out),
        CompressionMode::Null => {
            for &p in postings {
                out.extend_from_slice(&p.to_le_bytes());
            }
        }
    }
}

/// Decompress a mode-tagged byte stream produced by `compress`.
///
/// Rejects streams whose mode byte doesn't match `expected` when one is
/// given — callers that know which codec they asked for should pass it so a
/// corrupted mode byte doesn't silently decode garbage as the wrong format.
pub fn decompress(
    bytes: &[u8],
    expected: Option<CompressionMode>,
    count: usize,
) -> Result<Vec<Posting>> {
    if bytes.is_empty() {
        return Err(WumpusError::Codec("empty compressed stream".into()));
    }
    let mode = CompressionMode::from_byte(bytes[0])
        .ok_or_else(|| WumpusError::Codec(format!("unknown compression mode byte {}", bytes[0])))?;
    if let Some(want) = expected {
        if want != mode {
            return Err(WumpusError::Codec(format!(
                "compression mode mismatch: expected {:?}, found {:?}",
                want, mode
            )));
        }
    }
    let body = &bytes[1..];
    match mode {
        CompressionMode::VByte => vbyte::decompress_deltas(body, count),
        CompressionMode::Gamma => gamma::decompress_deltas(body, count),
        CompressionMode::Null => {
            if body.len() != count * 8 {
                return Err(WumpusError::Codec("null-mode stream length mismatch".into()));
            }
            let mut out = Vec::with_capacity(count);
            for chunk in body.chunks_exact(8) {
                out.push(Posting::from_le_bytes(chunk.try_into().unwrap()));
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strictly_increasing(xs: &[u64]) -> Vec<Posting> {
        let mut out = Vec::with_capacity(xs.len());
        let mut acc: u64 = 0;
        for &d in xs {
            acc += d + 1; // +1 guarantees strict monotonicity from arbitrary deltas
            out.push(acc);
        }
        out
    }

    proptest! {
        #[test]
        fn roundtrip_vbyte(deltas in prop::collection::vec(0u64..10_000, 0..200)) {
            let xs = strictly_increasing(&deltas);
            let mut buf = Vec::new();
            compress(&xs, CompressionMode::VByte, &mut buf);
            let back = decompress(&buf, Some(CompressionMode::VByte), xs.len()).unwrap();
            prop_assert_eq!(back, xs);
        }

        #[test]
        fn roundtrip_gamma(deltas in prop::collection::vec(0u64..10_000, 0..200)) {
            let xs = strictly_increasing(&deltas);
            let mut buf = Vec::new();
            compress(&xs, CompressionMode::Gamma, &mut buf);
            let back = decompress(&buf, Some(CompressionMode::Gamma), xs.len()).unwrap();
            prop_assert_eq!(back, xs);
        }

        #[test]
        fn roundtrip_null(deltas in prop::collection::vec(0u64..10_000, 0..200)) {
            let xs = strictly_increasing(&deltas);
            let mut buf = Vec::new();
            compress(&xs, CompressionMode::Null, &mut buf);
            let back = decompress(&buf, Some(CompressionMode::Null), xs.len()).unwrap();
            prop_assert_eq!(back, xs);
        }
    }

    #[test]
    fn mode_mismatch_is_rejected() {
        let xs = strictly_increasing(&[1, 2, 3]);
        let mut buf = Vec::new();
        compress(&xs, CompressionMode::VByte, &mut buf);
        let err = decompress(&buf, Some(CompressionMode::Gamma), xs.len()).unwrap_err();
        assert!(matches!(err, WumpusError::Codec(_)));
    }
}
