use crate::backend::CaptureBackendKind;
use crate::error::{CaptureError, CaptureResult};

/// Pixel layout of a captured desktop surface, before any color math.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawPixelFormat {
    /// 8-bit BGRA, the classic SDR desktop format.
    Bgra8,
    /// 16-bit float RGBA, scRGB linear. Produced for HDR desktops when
    /// duplication honors the HDR-precision format request.
    Rgba16Float,
    /// 10:10:10:2 RGBA with PQ-encoded channels (HDR10).
    Rgb10a2,
}

impl RawPixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bgra8 => 4,
            Self::Rgba16Float => 8,
            Self::Rgb10a2 => 4,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bgra8 => "bgra8",
            Self::Rgba16Float => "rgba16f",
            Self::Rgb10a2 => "rgb10a2",
        }
    }
}

/// One captured surface in its source pixel format. Rows may carry
/// driver padding; `stride` is authoritative, never `width x bpp`.
pub struct RawSurface {
    width: u32,
    height: u32,
    stride: usize,
    format: RawPixelFormat,
    bytes: Vec<u8>,
}

impl RawSurface {
    pub fn new(
        width: u32,
        height: u32,
        stride: usize,
        format: RawPixelFormat,
        bytes: Vec<u8>,
    ) -> CaptureResult<Self> {
        let row_bytes = row_len(width, format)?;
        if stride < row_bytes {
            return Err(CaptureError::BufferOverflow);
        }
        let required = stride
            .checked_mul(height as usize)
            .ok_or(CaptureError::BufferOverflow)?;
        if bytes.len() < required {
            return Err(CaptureError::BufferOverflow);
        }
        Ok(Self {
            width,
            height,
            stride,
            format,
            bytes,
        })
    }

    /// Zero-filled tight surface, used as the compositing destination.
    pub fn new_tight(width: u32, height: u32, format: RawPixelFormat) -> CaptureResult<Self> {
        let stride = row_len(width, format)?;
        let len = stride
            .checked_mul(height as usize)
            .ok_or(CaptureError::BufferOverflow)?;
        Ok(Self {
            width,
            height,
            stride,
            format,
            bytes: vec![0; len],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> RawPixelFormat {
        self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The used portion of row `y`, without trailing stride padding.
    pub fn row(&self, y: u32) -> CaptureResult<&[u8]> {
        let start = (y as usize)
            .checked_mul(self.stride)
            .ok_or(CaptureError::BufferOverflow)?;
        let end = start
            .checked_add(row_len(self.width, self.format)?)
            .ok_or(CaptureError::BufferOverflow)?;
        self.bytes.get(start..end).ok_or(CaptureError::BufferOverflow)
    }

    pub fn row_mut(&mut self, y: u32) -> CaptureResult<&mut [u8]> {
        let start = (y as usize)
            .checked_mul(self.stride)
            .ok_or(CaptureError::BufferOverflow)?;
        let end = start
            .checked_add(row_len(self.width, self.format)?)
            .ok_or(CaptureError::BufferOverflow)?;
        self.bytes
            .get_mut(start..end)
            .ok_or(CaptureError::BufferOverflow)
    }

    /// Byte offset of pixel (`x`, `y`), checked.
    pub fn pixel_offset(&self, x: u32, y: u32) -> CaptureResult<usize> {
        if x >= self.width || y >= self.height {
            return Err(CaptureError::BufferOverflow);
        }
        (y as usize)
            .checked_mul(self.stride)
            .and_then(|row| {
                (x as usize)
                    .checked_mul(self.format.bytes_per_pixel())
                    .and_then(|col| row.checked_add(col))
            })
            .ok_or(CaptureError::BufferOverflow)
    }

    /// Whether every used byte is zero. Stride padding is ignored so a
    /// driver that fills padding with garbage can't mask a blank frame.
    pub fn is_all_zero(&self) -> bool {
        let Ok(row_bytes) = row_len(self.width, self.format) else {
            return false;
        };
        (0..self.height).all(|y| {
            let start = y as usize * self.stride;
            self.bytes[start..start + row_bytes]
                .iter()
                .all(|byte| *byte == 0)
        })
    }
}

fn row_len(width: u32, format: RawPixelFormat) -> CaptureResult<usize> {
    (width as usize)
        .checked_mul(format.bytes_per_pixel())
        .ok_or(CaptureError::BufferOverflow)
}

impl std::fmt::Debug for RawSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawSurface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .field("bytes_len", &self.bytes.len())
            .finish()
    }
}

/// How the final image was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputMetadata {
    pub backend: CaptureBackendKind,
    pub source_format: RawPixelFormat,
    /// An HDR tone curve ran during conversion.
    pub hdr_tone_mapped: bool,
    /// HDR content was captured through an SDR-only fallback path, so
    /// highlights were clipped by the OS rather than tone mapped.
    pub hdr_fidelity_lost: bool,
}

/// The finished capture: tight top-down RGB8 rows.
#[derive(Clone)]
pub struct OutputImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
    pub metadata: OutputMetadata,
}

impl OutputImage {
    pub fn from_rgb8(
        width: u32,
        height: u32,
        data: Vec<u8>,
        metadata: OutputMetadata,
    ) -> CaptureResult<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(CaptureError::InvalidConfig(format!(
                "RGB frame data length mismatch: got {}, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            metadata,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_rgb_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Clipboard DIB byte order: bottom-up rows, BGR channels. The
    /// flip and swizzle happen only at this boundary; the pipeline
    /// itself always works top-down RGB.
    pub fn bottom_up_bgr(&self) -> Vec<u8> {
        let row_bytes = self.width as usize * 3;
        let mut out = Vec::with_capacity(self.data.len());
        for row in self.data.chunks_exact(row_bytes).rev() {
            for pixel in row.chunks_exact(3) {
                out.extend_from_slice(&[pixel[2], pixel[1], pixel[0]]);
            }
        }
        out
    }
}

fn rgb_len(width: u32, height: u32) -> CaptureResult<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|px| px.checked_mul(3))
        .ok_or(CaptureError::BufferOverflow)
}

impl std::fmt::Debug for OutputImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("data_len", &self.data.len())
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> OutputMetadata {
        OutputMetadata {
            backend: CaptureBackendKind::DxgiDuplication,
            source_format: RawPixelFormat::Bgra8,
            hdr_tone_mapped: false,
            hdr_fidelity_lost: false,
        }
    }

    #[test]
    fn surface_rejects_stride_smaller_than_a_row() {
        let result = RawSurface::new(4, 2, 8, RawPixelFormat::Bgra8, vec![0; 64]);
        assert!(matches!(result, Err(CaptureError::BufferOverflow)));
    }

    #[test]
    fn surface_rejects_short_byte_buffers() {
        let result = RawSurface::new(4, 2, 16, RawPixelFormat::Bgra8, vec![0; 31]);
        assert!(matches!(result, Err(CaptureError::BufferOverflow)));
    }

    #[test]
    fn row_access_honors_stride_padding() -> CaptureResult<()> {
        // 2x2 BGRA with 4 bytes of padding per row.
        let mut bytes = vec![0u8; 24];
        bytes[12] = 0xAA; // padding of row 0
        bytes[16] = 0x11; // first byte of row 1
        let surface = RawSurface::new(2, 2, 12, RawPixelFormat::Bgra8, bytes)?;

        assert_eq!(surface.row(0)?.len(), 8);
        assert_eq!(surface.row(1)?[0], 0x11);
        assert_eq!(surface.pixel_offset(1, 1)?, 16);
        assert!(surface.row(2).is_err());
        assert!(surface.pixel_offset(2, 0).is_err());
        Ok(())
    }

    #[test]
    fn blank_detection_ignores_padding_bytes() -> CaptureResult<()> {
        let mut bytes = vec![0u8; 24];
        bytes[8] = 0xFF; // padding only
        bytes[20] = 0xFF;
        let surface = RawSurface::new(2, 2, 12, RawPixelFormat::Bgra8, bytes)?;
        assert!(surface.is_all_zero());

        let mut bytes = vec![0u8; 24];
        bytes[4] = 1; // a used pixel byte
        let surface = RawSurface::new(2, 2, 12, RawPixelFormat::Bgra8, bytes)?;
        assert!(!surface.is_all_zero());
        Ok(())
    }

    #[test]
    fn output_image_validates_data_length() {
        let result = OutputImage::from_rgb8(2, 2, vec![0; 11], metadata());
        assert!(matches!(result, Err(CaptureError::InvalidConfig(_))));
    }

    #[test]
    fn bottom_up_bgr_flips_rows_and_swaps_channels() -> CaptureResult<()> {
        // 2x2: row 0 = red, green; row 1 = blue, white.
        let data = vec![
            255, 0, 0, 0, 255, 0, //
            0, 0, 255, 255, 255, 255,
        ];
        let image = OutputImage::from_rgb8(2, 2, data, metadata())?;
        let dib = image.bottom_up_bgr();
        assert_eq!(
            dib,
            vec![
                255, 0, 0, 255, 255, 255, // bottom row first, BGR
                0, 0, 255, 0, 255, 0,
            ]
        );
        Ok(())
    }
}
