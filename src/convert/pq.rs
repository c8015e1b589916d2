//! SMPTE ST 2084 (PQ) transfer function and Rec. 2020 primaries.
//!
//! HDR10 surfaces carry 10-bit PQ-encoded values in Rec. 2020 primaries.
//! Decoding yields absolute luminance in cd/m2 (nits) over a 0..10000
//! range, which the pipeline then exposes and converts to sRGB primaries.

/// ST 2084 curve constants.
pub(crate) const PQ_M1: f32 = 0.159_301_758;
pub(crate) const PQ_M2: f32 = 78.843_75;
pub(crate) const PQ_C1: f32 = 0.835_937_5;
pub(crate) const PQ_C2: f32 = 18.851_562_5;
pub(crate) const PQ_C3: f32 = 18.687_5;

/// Peak luminance the PQ signal range encodes, in nits.
pub(crate) const PQ_PEAK_NITS: f32 = 10_000.0;

/// Decode a normalized PQ signal in [0, 1] to absolute luminance in nits.
///
/// Inverse EOTF per ST 2084:
///
///   p = signal^(1/m2)
///   L = (max(p - c1, 0) / (c2 - c3 * p))^(1/m1) * 10000
///
/// Signals above 1.0 can drive the denominator non-positive; such inputs
/// are outside the encodable range and decode to 0.
#[inline]
pub(crate) fn pq_signal_to_nits(signal: f32) -> f32 {
    let p = signal.max(0.0).powf(1.0 / PQ_M2);
    let numerator = (p - PQ_C1).max(0.0);
    let denominator = PQ_C2 - PQ_C3 * p;
    if denominator <= 0.0 {
        return 0.0;
    }
    (numerator / denominator).powf(1.0 / PQ_M1) * PQ_PEAK_NITS
}

/// Rec. 2020 to sRGB/Rec. 709 linear primaries, row-major.
const REC2020_TO_SRGB: [[f32; 3]; 3] = [
    [1.6605, -0.5877, -0.0728],
    [-0.1246, 1.1330, -0.0084],
    [-0.0182, -0.1006, 1.1187],
];

/// Convert linear Rec. 2020 primaries to linear sRGB primaries.
///
/// Wide-gamut colors land outside the sRGB cube after the matrix; each
/// channel is clamped to [0, 1], which desaturates rather than wraps.
#[inline]
pub(crate) fn rec2020_to_srgb(rgb: [f32; 3]) -> [f32; 3] {
    let mut out = [0.0f32; 3];
    for (channel, row) in out.iter_mut().zip(REC2020_TO_SRGB.iter()) {
        *channel = (row[0] * rgb[0] + row[1] * rgb[1] + row[2] * rgb[2]).clamp(0.0, 1.0);
    }
    out
}

/// Unpack a little-endian R10G10B10A2 pixel into 10-bit channels plus
/// the 2-bit alpha. Red occupies the least significant bits.
#[inline]
pub(crate) fn unpack_rgb10a2(packed: u32) -> (u32, u32, u32, u32) {
    let r = packed & 0x3FF;
    let g = (packed >> 10) & 0x3FF;
    let b = (packed >> 20) & 0x3FF;
    let a = packed >> 30;
    (r, g, b, a)
}

/// Rescale a 10-bit channel to 8 bits with round-to-nearest.
#[inline]
pub(crate) fn rescale_10_to_8(channel: u32) -> u8 {
    ((channel * 255 + 511) / 1023) as u8
}
