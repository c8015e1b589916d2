//! Half-float decoding for FP16 scRGB surfaces.
//!
//! SDR conversion of an FP16 surface is a pure function of each 16-bit
//! channel, so a 64 KiB table indexed by the raw bit pattern replaces the
//! decode + gamma-encode math in the hot loop. The table covers every bit
//! pattern including zeros, subnormals, infinities and NaN.

use std::sync::OnceLock;

use half::f16;

use super::tone::linear_to_srgb_u8;

const LUT_SIZE: usize = 1 << 16;

static F16_TO_SRGB: OnceLock<Vec<u8>> = OnceLock::new();

fn sdr_lut() -> &'static [u8] {
    F16_TO_SRGB.get_or_init(|| {
        (0..LUT_SIZE)
            .map(|bits| linear_to_srgb_u8(f16::from_bits(bits as u16).to_f32()))
            .collect()
    })
}

/// Decode a raw half-float bit pattern to f32.
#[inline]
pub(crate) fn f16_bits_to_f32(bits: u16) -> f32 {
    f16::from_bits(bits).to_f32()
}

/// SDR fast path: clamp to [0, 1] and sRGB-encode a half-float channel.
///
/// Exactly equivalent to `linear_to_srgb_u8(f16_bits_to_f32(bits))`.
#[inline]
pub(crate) fn srgb_from_f16_bits(bits: u16) -> u8 {
    sdr_lut()[bits as usize]
}

/// Populate the lookup table ahead of the first frame.
pub(crate) fn warmup() {
    let _ = sdr_lut();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_anchors() {
        assert_eq!(f16_bits_to_f32(0x0000), 0.0);
        assert_eq!(f16_bits_to_f32(0x3C00), 1.0);
        assert_eq!(f16_bits_to_f32(0x3800), 0.5);
        assert_eq!(f16_bits_to_f32(0xBC00), -1.0);
        assert!(f16_bits_to_f32(0x7C00).is_infinite());
        assert!(f16_bits_to_f32(0x7E00).is_nan());
    }

    #[test]
    fn lut_matches_direct_math_for_every_bit_pattern() {
        for bits in 0..=u16::MAX {
            let direct = linear_to_srgb_u8(f16_bits_to_f32(bits));
            assert_eq!(srgb_from_f16_bits(bits), direct, "bit pattern {bits:#06x}");
        }
    }

    #[test]
    fn lut_special_values() {
        // Negative values and NaN clamp to 0, +inf to 255.
        assert_eq!(srgb_from_f16_bits(0xBC00), 0);
        assert_eq!(srgb_from_f16_bits(0x7E00), 0);
        assert_eq!(srgb_from_f16_bits(0x7C00), 255);
        assert_eq!(srgb_from_f16_bits(0x3C00), 255);
        assert_eq!(srgb_from_f16_bits(0x0000), 0);
        // Smallest subnormal is far below the sRGB linear-segment knee.
        assert_eq!(srgb_from_f16_bits(0x0001), 0);
    }
}
