//! Delta codec for sample waveforms.
//!
//! XM stores sample data as successive differences; the loader integrates
//! while converting to the internal `i16` representation. The fxm
//! serializer can re-apply the same coding to its waveform blob, which
//! compresses much better downstream. All arithmetic wraps, so
//! encode-then-decode is the identity on any buffer.

use alloc::vec::Vec;

/// Integrate an 8-bit delta stream into `i16` sample points (scaled to
/// the full 16-bit range).
pub fn decode8_to_points(data: &[u8], out: &mut Vec<i16>) {
    let mut acc: i8 = 0;
    for &d in data {
        acc = acc.wrapping_add(d as i8);
        out.push((acc as i16) << 8);
    }
}

/// Integrate a 16-bit little-endian delta stream into `i16` sample
/// points. Truncates a trailing odd byte.
pub fn decode16_to_points(data: &[u8], out: &mut Vec<i16>) {
    let mut acc: i16 = 0;
    for pair in data.chunks_exact(2) {
        acc = acc.wrapping_add(i16::from_le_bytes([pair[0], pair[1]]));
        out.push(acc);
    }
}

/// Replace each point with its difference from the previous one.
pub fn encode_in_place(points: &mut [i16]) {
    let mut prev: i16 = 0;
    for p in points {
        let v = *p;
        *p = v.wrapping_sub(prev);
        prev = v;
    }
}

/// Inverse of [`encode_in_place`].
pub fn decode_in_place(points: &mut [i16]) {
    let mut acc: i16 = 0;
    for p in points {
        acc = acc.wrapping_add(*p);
        *p = acc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn encode_decode_is_identity() {
        let original = vec![0i16, 100, -200, 32767, -32768, 5, 5, 5, -1];
        let mut buf = original.clone();
        encode_in_place(&mut buf);
        decode_in_place(&mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn encode_produces_differences() {
        let mut buf = vec![10i16, 15, 5];
        encode_in_place(&mut buf);
        assert_eq!(buf, vec![10, 5, -10]);
    }

    #[test]
    fn decode8_integrates_and_scales() {
        let mut out = Vec::new();
        decode8_to_points(&[1, 1, 0xFF], &mut out);
        assert_eq!(out, vec![1 << 8, 2 << 8, 1 << 8]);
    }

    #[test]
    fn decode8_wraps() {
        let mut out = Vec::new();
        decode8_to_points(&[127, 1], &mut out);
        assert_eq!(out, vec![127 << 8, (-128i16) << 8]);
    }

    #[test]
    fn decode16_integrates() {
        let mut out = Vec::new();
        // deltas 256, -56 → values 256, 200
        decode16_to_points(&[0x00, 0x01, 0xC8, 0xFF], &mut out);
        assert_eq!(out, vec![256, 200]);
    }

    #[test]
    fn decode16_ignores_trailing_byte() {
        let mut out = Vec::new();
        decode16_to_points(&[0x01, 0x00, 0x7F], &mut out);
        assert_eq!(out, vec![1]);
    }
}
