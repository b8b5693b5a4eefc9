//! Licensed under the Apache License, Version 2.0.
//! See LICENSE for details.
//!
//! Translates a [`Histogram`] to/from the self-describing binary payload
//! described in `spec.md` §4.6: a fixed 40-byte header followed by a
//! zig-zag varint stream of counter deltas, where negative values encode
//! runs of zeros.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::counter::{Counter, CounterStore};
use crate::histogram::Histogram;
use crate::layout::Layout;
use crate::Error;

const HEADER_LEN: usize = 40;
const COOKIE_BASE: u32 = 0x4844_5200;

fn cookie_for<C: Counter>() -> u32 {
    COOKIE_BASE | C::WIDTH_TAG
}

fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            out.push(byte | 0x80);
        } else {
            out.push(byte);
            break;
        }
    }
}

fn read_varint(bytes: &[u8], pos: &mut usize) -> Result<u64, Error> {
    let mut result = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = *bytes
            .get(*pos)
            .ok_or_else(|| Error::MalformedPayload("varint stream truncated".into()))?;
        *pos += 1;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 64 {
            return Err(Error::MalformedPayload("varint exceeds 64 bits".into()));
        }
    }
    Ok(result)
}

/// Encodes `histogram` into a self-describing byte vector.
pub fn encode<C: Counter>(histogram: &Histogram<C>) -> Vec<u8> {
    let layout = histogram.layout();
    let mut payload = Vec::new();

    let last_nonzero = (0..layout.counts_array_length())
        .rev()
        .find(|&i| histogram.counts().get(i) > 0);

    if let Some(last) = last_nonzero {
        let mut zero_run: i64 = 0;
        for i in 0..=last {
            let count = histogram.counts().get(i);
            if count == 0 {
                zero_run += 1;
            } else {
                if zero_run > 0 {
                    write_varint(&mut payload, zigzag_encode(-zero_run));
                    zero_run = 0;
                }
                write_varint(&mut payload, zigzag_encode(count as i64));
            }
        }
    }

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.write_u32::<BigEndian>(cookie_for::<C>()).unwrap();
    out.write_u32::<BigEndian>(payload.len() as u32).unwrap();
    out.write_u32::<BigEndian>(0).unwrap(); // normalizing_index_offset
    out.write_u32::<BigEndian>(layout.significant_figures() as u32).unwrap();
    out.write_u64::<BigEndian>(layout.lowest_discernible_value()).unwrap();
    out.write_u64::<BigEndian>(layout.highest_trackable_value()).unwrap();
    out.write_u64::<BigEndian>(1.0f64.to_bits()).unwrap(); // integerToDoubleValueConversionRatio
    out.extend_from_slice(&payload);
    out
}

/// Decodes a payload produced by [`encode`]. The counter width `C` used to
/// decode must match the width the payload was encoded with, or
/// [`Error::UnknownCookie`] is returned.
pub fn decode<C: Counter>(bytes: &[u8]) -> Result<Histogram<C>, Error> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::MalformedPayload(format!(
            "payload shorter than {HEADER_LEN}-byte header"
        )));
    }

    let mut header = &bytes[0..HEADER_LEN];
    let cookie = header.read_u32::<BigEndian>().unwrap();
    if cookie != cookie_for::<C>() {
        return Err(Error::UnknownCookie(cookie));
    }
    let payload_length_bytes = header.read_u32::<BigEndian>().unwrap() as usize;
    let _normalizing_index_offset = header.read_u32::<BigEndian>().unwrap();
    let significant_figures = header.read_u32::<BigEndian>().unwrap() as u8;
    let lowest_discernible_value = header.read_u64::<BigEndian>().unwrap();
    let highest_trackable_value = header.read_u64::<BigEndian>().unwrap();
    let _ratio = f64::from_bits(header.read_u64::<BigEndian>().unwrap());

    let available = bytes.len() - HEADER_LEN;
    if available < payload_length_bytes {
        return Err(Error::LengthMismatch {
            expected: payload_length_bytes,
            actual: available,
        });
    }

    let layout = Layout::new(lowest_discernible_value, highest_trackable_value, significant_figures)?;
    let mut histogram = Histogram::<C>::new(
        lowest_discernible_value,
        highest_trackable_value,
        significant_figures,
        false,
    )?;

    let mut pos = HEADER_LEN;
    let end = HEADER_LEN + payload_length_bytes;
    let mut index = 0usize;
    while pos < end {
        let raw = read_varint(bytes, &mut pos)?;
        let delta = zigzag_decode(raw);
        if delta < 0 {
            index += (-delta) as usize;
        } else {
            if index >= layout.counts_array_length() {
                return Err(Error::MalformedPayload(
                    "counter index exceeds array length".into(),
                ));
            }
            histogram.decode_add_at(index, delta as u64)?;
            index += 1;
        }
    }
    histogram.recompute_min_max_after_decode();

    Ok(histogram)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::Histogram;

    #[test]
    fn round_trip_preserves_percentiles() {
        let mut h: Histogram<u64> = Histogram::new(1, 1_000_000, 3, false).unwrap();
        for v in 1..=5000u64 {
            h.record_value(v).unwrap();
        }
        let bytes = encode(&h);
        let decoded: Histogram<u64> = decode(&bytes).unwrap();
        for p in [1.0, 25.0, 50.0, 75.0, 99.0, 100.0] {
            assert_eq!(h.value_at_percentile(p), decoded.value_at_percentile(p), "p={p}");
        }
        assert_eq!(h.total_count(), decoded.total_count());
    }

    #[test]
    fn round_trip_is_byte_identical_on_re_encode() {
        let mut h: Histogram<u32> = Histogram::new(1, 100_000, 2, false).unwrap();
        h.record_value(10).unwrap();
        h.record_value(10_000).unwrap();
        let bytes = encode(&h);
        let decoded: Histogram<u32> = decode(&bytes).unwrap();
        assert_eq!(bytes, encode(&decoded));
    }

    #[test]
    fn decode_rejects_mismatched_width_cookie() {
        let mut h: Histogram<u64> = Histogram::new(1, 1_000, 3, false).unwrap();
        h.record_value(5).unwrap();
        let bytes = encode(&h);
        assert!(matches!(
            decode::<u32>(&bytes),
            Err(Error::UnknownCookie(_))
        ));
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let mut h: Histogram<u64> = Histogram::new(1, 1_000, 3, false).unwrap();
        h.record_value(5).unwrap();
        let mut bytes = encode(&h);
        bytes.truncate(bytes.len() - 1);
        assert!(decode::<u64>(&bytes).is_err());
    }

    #[test]
    fn empty_histogram_round_trips() {
        let h: Histogram<u64> = Histogram::new(1, 1_000, 3, false).unwrap();
        let bytes = encode(&h);
        let decoded: Histogram<u64> = decode(&bytes).unwrap();
        assert_eq!(decoded.total_count(), 0);
    }
}
