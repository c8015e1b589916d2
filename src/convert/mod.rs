//! Pixel pipeline: raw captured surfaces to tight top-down RGB8.
//!
//! Conversion is a pure function of the surface bytes and the tone-map
//! parameters. Rows are independent, so large surfaces convert in
//! parallel with byte-identical output to the serial path.

mod f16;
mod pq;
mod tone;

pub use tone::ToneOperator;

use rayon::prelude::*;

use crate::backend::CaptureBackendKind;
use crate::config::{CaptureConfig, DEFAULT_SDR_BRIGHTNESS_NITS};
use crate::error::{CaptureError, CaptureResult};
use crate::frame::{OutputImage, OutputMetadata, RawPixelFormat, RawSurface};
use crate::monitor::HdrMetadata;

/// Surfaces below ~256K pixels convert serially; rayon overhead
/// dominates under that.
const PARALLEL_MIN_PIXELS: usize = 262_144;

/// Guards the exposure divisions against zero or denormal luminance.
const LUMINANCE_EPSILON: f32 = 1e-4;

/// Pre-initialize one-time resources (the f16 lookup table) so the
/// first capture doesn't pay the cost. Safe to call multiple times.
pub fn warmup() {
    f16::warmup();
}

/// Parameters for the HDR stage of the pixel pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToneMapParams {
    /// Whether the source monitor is in HDR mode. When false, HDR-capable
    /// formats take a plain clamp or rescale path with no tone curve.
    pub hdr_enabled: bool,
    /// SDR output white level in nits.
    pub target_nits: f32,
    /// Panel peak luminance in nits. Sets the exposure for FP16 scRGB
    /// surfaces, where 1.0 is SDR reference white.
    pub max_luminance_nits: f32,
    /// Content peak light level in nits. Sets the exposure for HDR10
    /// surfaces, which decode to absolute luminance.
    pub max_content_light_nits: f32,
    /// Tone curve applied after exposure.
    pub operator: ToneOperator,
}

impl ToneMapParams {
    pub fn new(hdr: &HdrMetadata, config: &CaptureConfig) -> Self {
        Self {
            hdr_enabled: hdr.hdr_enabled,
            target_nits: config.sdr_brightness,
            max_luminance_nits: hdr.max_luminance_nits,
            max_content_light_nits: hdr.max_content_light_nits,
            operator: config.tone_operator(),
        }
    }

    pub(crate) fn sanitized(self) -> Self {
        let target_nits = if self.target_nits.is_finite() && self.target_nits > 0.0 {
            self.target_nits
        } else {
            DEFAULT_SDR_BRIGHTNESS_NITS
        };
        let max_luminance_nits = if self.max_luminance_nits.is_finite() {
            self.max_luminance_nits.max(1.0)
        } else {
            1000.0
        };
        let max_content_light_nits = if self.max_content_light_nits.is_finite() {
            self.max_content_light_nits.max(1.0)
        } else {
            1000.0
        };
        Self {
            hdr_enabled: self.hdr_enabled,
            target_nits,
            max_luminance_nits,
            max_content_light_nits,
            operator: self.operator,
        }
    }

    fn fp16_exposure(self) -> f32 {
        self.target_nits / self.max_luminance_nits.max(LUMINANCE_EPSILON)
    }

    /// Combined per-channel factor for decoded HDR10 luminance. Exposure
    /// (`target / maxCLL`) brings the content peak to the SDR white
    /// level; dividing by the target then yields normalized linear in
    /// [0, 1] for the gamut matrix and tone curve.
    fn hdr10_nits_scale(self) -> f32 {
        let exposure = self.target_nits / self.max_content_light_nits.max(LUMINANCE_EPSILON);
        exposure / self.target_nits.max(LUMINANCE_EPSILON)
    }
}

impl Default for ToneMapParams {
    fn default() -> Self {
        Self {
            hdr_enabled: false,
            target_nits: DEFAULT_SDR_BRIGHTNESS_NITS,
            max_luminance_nits: 1000.0,
            max_content_light_nits: 1000.0,
            operator: ToneOperator::Reinhard,
        }
    }
}

/// Convert a raw surface to a finished image.
///
/// Stride padding in the source is skipped row by row; the output is
/// always tight `width * 3` rows. The result depends only on the
/// surface contents and `params`, never on the parallel split.
pub fn convert_raw_to_image(
    raw: &RawSurface,
    params: &ToneMapParams,
    backend: CaptureBackendKind,
) -> CaptureResult<OutputImage> {
    let params = params.sanitized();
    let width = raw.width();
    let height = raw.height();
    let out_stride = (width as usize)
        .checked_mul(3)
        .ok_or(CaptureError::BufferOverflow)?;
    let total = out_stride
        .checked_mul(height as usize)
        .ok_or(CaptureError::BufferOverflow)?;
    let mut data = vec![0u8; total];

    let pixel_count = (width as usize) * (height as usize);
    convert_rows(
        raw,
        &params,
        &mut data,
        out_stride,
        pixel_count >= PARALLEL_MIN_PIXELS,
    )?;

    let hdr_capable = matches!(
        raw.format(),
        RawPixelFormat::Rgba16Float | RawPixelFormat::Rgb10a2
    );
    let metadata = OutputMetadata {
        backend,
        source_format: raw.format(),
        hdr_tone_mapped: params.hdr_enabled && hdr_capable,
        hdr_fidelity_lost: false,
    };
    OutputImage::from_rgb8(width, height, data, metadata)
}

fn convert_rows(
    raw: &RawSurface,
    params: &ToneMapParams,
    out: &mut [u8],
    out_stride: usize,
    parallel: bool,
) -> CaptureResult<()> {
    if out_stride == 0 || out.is_empty() {
        return Ok(());
    }
    if parallel {
        out.par_chunks_mut(out_stride)
            .enumerate()
            .try_for_each(|(y, out_row)| convert_row(raw, y as u32, out_row, params))
    } else {
        out.chunks_mut(out_stride)
            .enumerate()
            .try_for_each(|(y, out_row)| convert_row(raw, y as u32, out_row, params))
    }
}

fn convert_row(
    raw: &RawSurface,
    y: u32,
    out_row: &mut [u8],
    params: &ToneMapParams,
) -> CaptureResult<()> {
    let src_row = raw.row(y)?;
    match raw.format() {
        RawPixelFormat::Bgra8 => convert_row_bgra8(src_row, out_row),
        RawPixelFormat::Rgba16Float => convert_row_f16(src_row, out_row, params),
        RawPixelFormat::Rgb10a2 => convert_row_rgb10a2(src_row, out_row, params),
    }
    Ok(())
}

fn convert_row_bgra8(src_row: &[u8], out_row: &mut [u8]) {
    for (src, out) in src_row.chunks_exact(4).zip(out_row.chunks_exact_mut(3)) {
        out[0] = src[2];
        out[1] = src[1];
        out[2] = src[0];
    }
}

fn convert_row_f16(src_row: &[u8], out_row: &mut [u8], params: &ToneMapParams) {
    if params.hdr_enabled {
        let exposure = params.fp16_exposure();
        for (src, out) in src_row.chunks_exact(8).zip(out_row.chunks_exact_mut(3)) {
            for channel in 0..3 {
                let bits = u16::from_le_bytes([src[channel * 2], src[channel * 2 + 1]]);
                // scRGB goes negative outside the sRGB gamut.
                let linear = f16::f16_bits_to_f32(bits).max(0.0) * exposure;
                out[channel] = tone::linear_to_srgb_u8(params.operator.apply(linear));
            }
        }
    } else {
        for (src, out) in src_row.chunks_exact(8).zip(out_row.chunks_exact_mut(3)) {
            for channel in 0..3 {
                let bits = u16::from_le_bytes([src[channel * 2], src[channel * 2 + 1]]);
                out[channel] = f16::srgb_from_f16_bits(bits);
            }
        }
    }
}

fn convert_row_rgb10a2(src_row: &[u8], out_row: &mut [u8], params: &ToneMapParams) {
    if params.hdr_enabled {
        let scale = params.hdr10_nits_scale();
        for (src, out) in src_row.chunks_exact(4).zip(out_row.chunks_exact_mut(3)) {
            let packed = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
            let (r, g, b, _alpha) = pq::unpack_rgb10a2(packed);
            let srgb = pq::rec2020_to_srgb([
                pq::pq_signal_to_nits(r as f32 / 1023.0) * scale,
                pq::pq_signal_to_nits(g as f32 / 1023.0) * scale,
                pq::pq_signal_to_nits(b as f32 / 1023.0) * scale,
            ]);
            for channel in 0..3 {
                out[channel] = tone::linear_to_srgb_u8(params.operator.apply(srgb[channel]));
            }
        }
    } else {
        for (src, out) in src_row.chunks_exact(4).zip(out_row.chunks_exact_mut(3)) {
            let packed = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
            let (r, g, b, _alpha) = pq::unpack_rgb10a2(packed);
            out[0] = pq::rescale_10_to_8(r);
            out[1] = pq::rescale_10_to_8(g);
            out[2] = pq::rescale_10_to_8(b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16 as hf16;

    fn f16_pixel(r: f32, g: f32, b: f32) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        for (slot, value) in [r, g, b, 1.0].iter().enumerate() {
            let bits = hf16::from_f32(*value).to_bits().to_le_bytes();
            bytes[slot * 2] = bits[0];
            bytes[slot * 2 + 1] = bits[1];
        }
        bytes
    }

    fn pack_rgb10(r: u32, g: u32, b: u32) -> [u8; 4] {
        (r | (g << 10) | (b << 20) | (3 << 30)).to_le_bytes()
    }

    fn sdr_params() -> ToneMapParams {
        ToneMapParams::default()
    }

    fn hdr_params(target_nits: f32, max_luminance: f32, max_content_light: f32) -> ToneMapParams {
        ToneMapParams {
            hdr_enabled: true,
            target_nits,
            max_luminance_nits: max_luminance,
            max_content_light_nits: max_content_light,
            operator: ToneOperator::Reinhard,
        }
    }

    #[test]
    fn bgra8_swizzles_and_drops_alpha() -> CaptureResult<()> {
        let bytes = vec![
            10, 20, 30, 255, //
            40, 50, 60, 0, //
        ];
        let raw = RawSurface::new(2, 1, 8, RawPixelFormat::Bgra8, bytes)?;
        let image = convert_raw_to_image(&raw, &sdr_params(), CaptureBackendKind::Gdi)?;
        assert_eq!(image.as_rgb_bytes(), &[30, 20, 10, 60, 50, 40]);
        assert_eq!(image.metadata.backend, CaptureBackendKind::Gdi);
        assert_eq!(image.metadata.source_format, RawPixelFormat::Bgra8);
        assert!(!image.metadata.hdr_tone_mapped);
        Ok(())
    }

    #[test]
    fn bgra8_skips_stride_padding() -> CaptureResult<()> {
        // Two 4-byte pixels per row, stride 12: padding holds garbage.
        let bytes = vec![
            1, 2, 3, 255, 4, 5, 6, 255, 0xAB, 0xAB, 0xAB, 0xAB, //
            7, 8, 9, 255, 10, 11, 12, 255, 0xCD, 0xCD, 0xCD, 0xCD,
        ];
        let raw = RawSurface::new(2, 2, 12, RawPixelFormat::Bgra8, bytes)?;
        let image = convert_raw_to_image(&raw, &sdr_params(), CaptureBackendKind::DxgiDuplication)?;
        assert_eq!(
            image.as_rgb_bytes(),
            &[3, 2, 1, 6, 5, 4, 9, 8, 7, 12, 11, 10]
        );
        Ok(())
    }

    #[test]
    fn f16_sdr_clamps_then_encodes() -> CaptureResult<()> {
        let mut bytes = Vec::new();
        for value in [0.0f32, 0.5, 1.0, 2.0, -0.5] {
            bytes.extend_from_slice(&f16_pixel(value, value, value));
        }
        let raw = RawSurface::new(5, 1, 40, RawPixelFormat::Rgba16Float, bytes)?;
        let image = convert_raw_to_image(&raw, &sdr_params(), CaptureBackendKind::DxgiDuplication)?;
        // 0.5 encodes to 188; out-of-range values clamp before encoding.
        assert_eq!(
            image.as_rgb_bytes(),
            &[0, 0, 0, 188, 188, 188, 255, 255, 255, 255, 255, 255, 0, 0, 0]
        );
        assert!(!image.metadata.hdr_tone_mapped);
        Ok(())
    }

    #[test]
    fn f16_hdr_applies_exposure_and_tone_curve() -> CaptureResult<()> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&f16_pixel(1.0, 3.0, -2.0));
        let raw = RawSurface::new(1, 1, 8, RawPixelFormat::Rgba16Float, bytes)?;

        // target == max luminance, so exposure is 1.0.
        let image = convert_raw_to_image(
            &raw,
            &hdr_params(200.0, 200.0, 1000.0),
            CaptureBackendKind::DxgiDuplication,
        )?;
        // Reinhard: 1.0 -> 0.5 -> 188, 3.0 -> 0.75 -> 225, negative -> 0.
        assert_eq!(image.as_rgb_bytes(), &[188, 225, 0]);
        assert!(image.metadata.hdr_tone_mapped);

        // Doubling the panel peak halves the exposure.
        let raw2 = RawSurface::new(
            1,
            1,
            8,
            RawPixelFormat::Rgba16Float,
            f16_pixel(2.0, 2.0, 2.0).to_vec(),
        )?;
        let image2 = convert_raw_to_image(
            &raw2,
            &hdr_params(200.0, 400.0, 1000.0),
            CaptureBackendKind::DxgiDuplication,
        )?;
        assert_eq!(image2.as_rgb_bytes(), &[188, 188, 188]);
        Ok(())
    }

    #[test]
    fn hdr10_sdr_rescales_10_bit_channels() -> CaptureResult<()> {
        let bytes = pack_rgb10(1023, 512, 0).to_vec();
        let raw = RawSurface::new(1, 1, 4, RawPixelFormat::Rgb10a2, bytes)?;
        let image = convert_raw_to_image(&raw, &sdr_params(), CaptureBackendKind::DxgiDuplication)?;
        assert_eq!(image.as_rgb_bytes(), &[255, 128, 0]);
        assert!(!image.metadata.hdr_tone_mapped);
        Ok(())
    }

    #[test]
    fn hdr10_hdr_maps_content_peak_through_the_tone_curve() -> CaptureResult<()> {
        // Full-scale PQ white decodes to 10000 nits. With maxCLL 10000
        // the normalized linear is 1.0, and Reinhard lands on 188.
        let bytes = pack_rgb10(1023, 1023, 1023).to_vec();
        let raw = RawSurface::new(1, 1, 4, RawPixelFormat::Rgb10a2, bytes)?;
        let image = convert_raw_to_image(
            &raw,
            &hdr_params(200.0, 1000.0, 10_000.0),
            CaptureBackendKind::DxgiDuplication,
        )?;
        assert_eq!(image.as_rgb_bytes(), &[188, 188, 188]);
        assert!(image.metadata.hdr_tone_mapped);

        // A black pixel stays black regardless of exposure.
        let raw2 = RawSurface::new(1, 1, 4, RawPixelFormat::Rgb10a2, pack_rgb10(0, 0, 0).to_vec())?;
        let image2 = convert_raw_to_image(
            &raw2,
            &hdr_params(200.0, 1000.0, 10_000.0),
            CaptureBackendKind::DxgiDuplication,
        )?;
        assert_eq!(image2.as_rgb_bytes(), &[0, 0, 0]);
        Ok(())
    }

    #[test]
    fn parallel_and_serial_rows_produce_identical_bytes() -> CaptureResult<()> {
        let width = 64u32;
        let height = 48u32;
        let mut bytes = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let value = ((x + y * width) % 512) as f32 / 100.0;
                bytes.extend_from_slice(&f16_pixel(value, value * 0.5, 2.0 - value));
            }
        }
        let raw = RawSurface::new(width, height, width as usize * 8, RawPixelFormat::Rgba16Float, bytes)?;
        let params = hdr_params(200.0, 600.0, 1000.0).sanitized();
        let out_stride = width as usize * 3;
        let mut serial = vec![0u8; out_stride * height as usize];
        let mut parallel = vec![0u8; out_stride * height as usize];
        convert_rows(&raw, &params, &mut serial, out_stride, false)?;
        convert_rows(&raw, &params, &mut parallel, out_stride, true)?;
        assert_eq!(serial, parallel);
        Ok(())
    }

    #[test]
    fn conversion_is_pure() -> CaptureResult<()> {
        let bytes = pack_rgb10(700, 300, 100).to_vec();
        let raw = RawSurface::new(1, 1, 4, RawPixelFormat::Rgb10a2, bytes)?;
        let params = hdr_params(200.0, 1000.0, 4000.0);
        let first = convert_raw_to_image(&raw, &params, CaptureBackendKind::DxgiDuplication)?;
        let second = convert_raw_to_image(&raw, &params, CaptureBackendKind::DxgiDuplication)?;
        assert_eq!(first.as_rgb_bytes(), second.as_rgb_bytes());
        Ok(())
    }

    #[test]
    fn params_sanitize_rejects_non_finite_values() {
        let params = ToneMapParams {
            hdr_enabled: true,
            target_nits: f32::NAN,
            max_luminance_nits: f32::INFINITY,
            max_content_light_nits: -50.0,
            operator: ToneOperator::AcesFilmic,
        }
        .sanitized();
        assert_eq!(params.target_nits, DEFAULT_SDR_BRIGHTNESS_NITS);
        assert_eq!(params.max_luminance_nits, 1000.0);
        assert_eq!(params.max_content_light_nits, 1.0);
        assert!(params.hdr_enabled);
        assert_eq!(params.operator, ToneOperator::AcesFilmic);
    }

    #[test]
    fn params_from_metadata_and_config() {
        let hdr = HdrMetadata {
            hdr_enabled: true,
            max_luminance_nits: 650.0,
            min_luminance_nits: 0.1,
            max_content_light_nits: 900.0,
        };
        let mut config = CaptureConfig::default();
        config.use_aces_film_tone_mapping = true;
        let params = ToneMapParams::new(&hdr, &config);
        assert!(params.hdr_enabled);
        assert_eq!(params.target_nits, config.sdr_brightness);
        assert_eq!(params.max_luminance_nits, 650.0);
        assert_eq!(params.max_content_light_nits, 900.0);
        assert_eq!(params.operator, ToneOperator::AcesFilmic);
    }
}
