//! Tone curves and sRGB gamma encoding.

/// Selectable tone reproduction curve for HDR content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ToneOperator {
    /// `x / (1 + x)`. Never clips, compresses highlights smoothly.
    #[default]
    Reinhard,
    /// Narkowicz's rational fit of the ACES filmic curve. More contrast
    /// in the shoulder than Reinhard; clamps to [0, 1].
    AcesFilmic,
}

impl ToneOperator {
    #[inline]
    pub(crate) fn apply(self, x: f32) -> f32 {
        match self {
            Self::Reinhard => x / (1.0 + x),
            Self::AcesFilmic => {
                ((x * (2.51 * x + 0.03)) / (x * (2.43 * x + 0.59) + 0.14)).clamp(0.0, 1.0)
            }
        }
    }
}

/// Convert a linear-light value in [0, 1] to an sRGB-encoded byte.
///
/// Implements the sRGB transfer function from IEC 61966-2-1:1999:
///
///   - Linear segment:  C_srgb = 12.92 * C_linear            when C_linear <= 0.0031308
///   - Gamma segment:   C_srgb = 1.055 * C_linear^(1/2.4) - 0.055   otherwise
///
/// Quantization is round-to-nearest with clamping, so the full output
/// range [0, 255] is reachable.
#[inline]
pub(crate) fn linear_to_srgb_u8(v: f32) -> u8 {
    let c = v.clamp(0.0, 1.0);
    let srgb = if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    (srgb * 255.0 + 0.5).floor().clamp(0.0, 255.0) as u8
}
