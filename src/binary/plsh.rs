// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! PLSH: posting-list-segment-header compression (§4.1).
//!
//! A segment header is `{postingCount, byteLength, firstElement, lastElement}`.
//! Stored relative to a caller-supplied reference posting (the previous
//! segment's `lastElement`, or 0 for the first segment of a term) so
//! `firstElement` usually encodes as a small delta: `(postingCount,
//! byteLength, firstElement - reference, lastElement - firstElement)`, all
//! as varints.

use crate::binary::vbyte::{decode_varint, encode_varint};
use crate::error::{Result, WumpusError};
use crate::types::SegmentHeader;

pub fn encode(header: &SegmentHeader, reference: u64, out: &mut Vec<u8>) {
    encode_varint(header.posting_count as u64, out);
    encode_varint(header.byte_length as u64, out);
    encode_varint(header.first_element - reference, out);
    encode_varint(header.last_element - header.first_element, out);
}

pub fn decode(bytes: &[u8], reference: u64) -> Result<(SegmentHeader, usize)> {
    let mut pos = 0usize;
    let (posting_count, n) = decode_varint(&bytes[pos..])?;
    pos += n;
    let (byte_length, n) = decode_varint(&bytes[pos..])?;
    pos += n;
    let (first_delta, n) = decode_varint(&bytes[pos..])?;
    pos += n;
    let (last_delta, n) = decode_varint(&bytes[pos..])?;
    pos += n;

    let first_element = reference + first_delta;
    let last_element = first_element + last_delta;
    if posting_count == 0 || posting_count > u32::MAX as u64 {
        return Err(WumpusError::Codec("PLSH posting_count out of range".into()));
    }
    if first_element > last_element {
        return Err(WumpusError::Codec(
            "PLSH first_element exceeds last_element".into(),
        ));
    }

    Ok((
        SegmentHeader {
            posting_count: posting_count as u32,
            byte_length: byte_length as u32,
            first_element,
            last_element,
        },
        pos,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn roundtrip(
            reference in 0u64..1_000_000,
            first_delta in 0u64..1_000,
            last_delta in 0u64..1_000,
            posting_count in 1u32..10_000,
            byte_length in 0u32..100_000,
        ) {
            let first_element = reference + first_delta;
            let header = SegmentHeader {
                posting_count,
                byte_length,
                first_element,
                last_element: first_element + last_delta,
            };
            let mut buf = Vec::new();
            encode(&header, reference, &mut buf);
            let (back, consumed) = decode(&buf, reference).unwrap();
            prop_assert_eq!(consumed, buf.len());
            prop_assert_eq!(back.posting_count, header.posting_count);
            prop_assert_eq!(back.byte_length, header.byte_length);
            prop_assert_eq!(back.first_element, header.first_element);
            prop_assert_eq!(back.last_element, header.last_element);
        }
    }
}
