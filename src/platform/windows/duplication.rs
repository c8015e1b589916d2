//! DXGI Output Duplication frame source.
//!
//! One session per monitor, opened with `DuplicateOutput1` so HDR
//! desktops can hand back FP16 or 10-bit surfaces. Each capture
//! acquires a frame, copies it through a cached staging texture, and
//! returns the raw bytes in the panel-native orientation.

use anyhow::Context;
use windows::Win32::Graphics::Direct3D11::{
    D3D11_CPU_ACCESS_READ, D3D11_MAP_READ, D3D11_MAPPED_SUBRESOURCE, D3D11_TEXTURE2D_DESC,
    D3D11_USAGE_STAGING, ID3D11Device, ID3D11DeviceContext, ID3D11Resource, ID3D11Texture2D,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT, DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_FORMAT_B8G8R8A8_UNORM_SRGB,
    DXGI_FORMAT_R10G10B10A2_UNORM, DXGI_FORMAT_R16G16B16A16_FLOAT, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    DXGI_ERROR_ACCESS_LOST, DXGI_ERROR_DEVICE_REMOVED, DXGI_ERROR_DEVICE_RESET,
    DXGI_ERROR_SESSION_DISCONNECTED, DXGI_ERROR_WAIT_TIMEOUT, DXGI_OUTDUPL_FRAME_INFO, IDXGIOutput,
    IDXGIOutput1, IDXGIOutput5, IDXGIOutputDuplication, IDXGIResource,
};
use windows::core::Interface;

use crate::backend::FrameSource;
use crate::error::{CaptureError, CaptureResult};
use crate::frame::{RawPixelFormat, RawSurface};
use crate::monitor::MonitorDescriptor;

use super::d3d11;

/// Frame acquisition is bounded: at most `ACQUIRE_ATTEMPTS` waits of
/// `ACQUIRE_TIMEOUT_MS` each before the call reports `Timeout`.
const ACQUIRE_ATTEMPTS: usize = 10;
const ACQUIRE_TIMEOUT_MS: u32 = 100;

/// Formats requested from `DuplicateOutput1`, most capable first. The
/// OS picks whichever the desktop can currently supply.
const DUPLICATION_FORMATS: [DXGI_FORMAT; 3] = [
    DXGI_FORMAT_R16G16B16A16_FLOAT,
    DXGI_FORMAT_R10G10B10A2_UNORM,
    DXGI_FORMAT_B8G8R8A8_UNORM,
];

pub(crate) struct DuplicationFrameSource {
    descriptor: MonitorDescriptor,
    device: ID3D11Device,
    context: ID3D11DeviceContext,
    duplication: IDXGIOutputDuplication,
    /// Reused across captures while the source size and format hold.
    staging: Option<ID3D11Texture2D>,
    _com: super::CoInitGuard,
}

impl DuplicationFrameSource {
    /// Open a duplication session for `descriptor`'s output.
    ///
    /// The second return value is false when the OS refused the
    /// HDR-precision format request and the session fell back to plain
    /// `DuplicateOutput` (BGRA8 only).
    pub(crate) fn new(descriptor: MonitorDescriptor) -> CaptureResult<(Self, bool)> {
        let com = super::CoInitGuard::init_multithreaded().map_err(CaptureError::Platform)?;
        let resolved = super::monitor::resolve_output(descriptor.key)?;
        let (device, context) =
            d3d11::create_device_for_adapter(&resolved.adapter).map_err(CaptureError::Platform)?;
        let (duplication, hdr_formats) = create_duplication(&resolved.output, &device)?;
        Ok((
            Self {
                descriptor,
                device,
                context,
                duplication,
                staging: None,
                _com: com,
            },
            hdr_formats,
        ))
    }

    fn read_texture(
        &mut self,
        texture: ID3D11Texture2D,
        frame_guard: FrameGuard,
    ) -> CaptureResult<RawSurface> {
        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { texture.GetDesc(&mut desc) };
        let format = surface_format(desc.Format)
            .ok_or_else(|| CaptureError::UnsupportedFormat(format!("{:?}", desc.Format)))?;

        let staging = self.ensure_staging(&desc)?;
        let staging_resource: ID3D11Resource = staging
            .cast()
            .context("failed to cast staging texture to ID3D11Resource")
            .map_err(CaptureError::Platform)?;
        let source_resource: ID3D11Resource = texture
            .cast()
            .context("failed to cast desktop texture to ID3D11Resource")
            .map_err(CaptureError::Platform)?;
        unsafe {
            self.context.CopyResource(&staging_resource, &source_resource);
        }
        // The desktop image now lives in the staging copy; hand the
        // surface back to the OS before the slow CPU read.
        drop(frame_guard);

        self.read_staging(&staging_resource, &desc, format)
    }

    fn ensure_staging(&mut self, src: &D3D11_TEXTURE2D_DESC) -> CaptureResult<ID3D11Texture2D> {
        if let Some(existing) = &self.staging {
            let mut desc = D3D11_TEXTURE2D_DESC::default();
            unsafe { existing.GetDesc(&mut desc) };
            if desc.Width == src.Width && desc.Height == src.Height && desc.Format == src.Format {
                return Ok(existing.clone());
            }
        }

        let desc = D3D11_TEXTURE2D_DESC {
            Width: src.Width,
            Height: src.Height,
            MipLevels: 1,
            ArraySize: 1,
            Format: src.Format,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: Default::default(),
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: Default::default(),
        };
        let mut texture: Option<ID3D11Texture2D> = None;
        unsafe { self.device.CreateTexture2D(&desc, None, Some(&mut texture)) }
            .context("CreateTexture2D failed for duplication staging")
            .map_err(CaptureError::Platform)?;
        let texture = texture.ok_or_else(|| {
            CaptureError::Platform(anyhow::anyhow!("CreateTexture2D did not return a texture"))
        })?;
        self.staging = Some(texture.clone());
        Ok(texture)
    }

    fn read_staging(
        &mut self,
        staging: &ID3D11Resource,
        desc: &D3D11_TEXTURE2D_DESC,
        format: RawPixelFormat,
    ) -> CaptureResult<RawSurface> {
        let width = desc.Width;
        let height = desc.Height;
        let row_bytes = (width as usize)
            .checked_mul(format.bytes_per_pixel())
            .ok_or(CaptureError::BufferOverflow)?;
        let total = row_bytes
            .checked_mul(height as usize)
            .ok_or(CaptureError::BufferOverflow)?;

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe { self.context.Map(staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped)) }
            .context("failed to map duplication staging texture")
            .map_err(CaptureError::Platform)?;

        let copied = copy_mapped_rows(&mapped, height, row_bytes, total);
        unsafe { self.context.Unmap(staging, 0) };
        let bytes = copied?;

        RawSurface::new(width, height, row_bytes, format, bytes)
    }
}

impl FrameSource for DuplicationFrameSource {
    fn descriptor(&self) -> &MonitorDescriptor {
        &self.descriptor
    }

    fn capture_frame(&mut self) -> CaptureResult<RawSurface> {
        for _ in 0..ACQUIRE_ATTEMPTS {
            let mut info = DXGI_OUTDUPL_FRAME_INFO::default();
            let mut resource: Option<IDXGIResource> = None;
            let acquired = unsafe {
                self.duplication
                    .AcquireNextFrame(ACQUIRE_TIMEOUT_MS, &mut info, &mut resource)
            };
            if let Err(error) = acquired {
                if error.code() == DXGI_ERROR_WAIT_TIMEOUT {
                    continue;
                }
                if error.code() == DXGI_ERROR_ACCESS_LOST {
                    return Err(CaptureError::AccessLost);
                }
                if error.code() == DXGI_ERROR_DEVICE_REMOVED
                    || error.code() == DXGI_ERROR_DEVICE_RESET
                {
                    return Err(CaptureError::DeviceRemoved);
                }
                if error.code() == DXGI_ERROR_SESSION_DISCONNECTED {
                    return Err(CaptureError::SessionDisconnected);
                }
                return Err(CaptureError::Platform(
                    anyhow::Error::from(error).context("AcquireNextFrame failed"),
                ));
            }

            let guard = FrameGuard {
                duplication: self.duplication.clone(),
            };
            let Some(resource) = resource else {
                // Acquired without a surface; treat like a timeout tick.
                drop(guard);
                continue;
            };
            let texture: ID3D11Texture2D = resource
                .cast()
                .context("failed to cast acquired IDXGIResource to ID3D11Texture2D")
                .map_err(CaptureError::Platform)?;
            return self.read_texture(texture, guard);
        }
        Err(CaptureError::Timeout)
    }
}

/// Releases the acquired duplication frame when dropped, including on
/// every error path between acquire and readback.
struct FrameGuard {
    duplication: IDXGIOutputDuplication,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        unsafe { self.duplication.ReleaseFrame() }.ok();
    }
}

fn create_duplication(
    output: &IDXGIOutput,
    device: &ID3D11Device,
) -> CaptureResult<(IDXGIOutputDuplication, bool)> {
    if let Ok(output5) = output.cast::<IDXGIOutput5>() {
        if let Ok(duplication) =
            unsafe { output5.DuplicateOutput1(device, 0, &DUPLICATION_FORMATS) }
        {
            return Ok((duplication, true));
        }
    }

    let output1: IDXGIOutput1 = output
        .cast()
        .context("failed to query IDXGIOutput1")
        .map_err(CaptureError::Platform)?;
    let duplication = unsafe { output1.DuplicateOutput(device) }
        .context("DuplicateOutput failed")
        .map_err(CaptureError::Platform)?;
    Ok((duplication, false))
}

fn surface_format(format: DXGI_FORMAT) -> Option<RawPixelFormat> {
    match format {
        DXGI_FORMAT_B8G8R8A8_UNORM | DXGI_FORMAT_B8G8R8A8_UNORM_SRGB => {
            Some(RawPixelFormat::Bgra8)
        }
        DXGI_FORMAT_R16G16B16A16_FLOAT => Some(RawPixelFormat::Rgba16Float),
        DXGI_FORMAT_R10G10B10A2_UNORM => Some(RawPixelFormat::Rgb10a2),
        _ => None,
    }
}

fn copy_mapped_rows(
    mapped: &D3D11_MAPPED_SUBRESOURCE,
    height: u32,
    row_bytes: usize,
    total: usize,
) -> CaptureResult<Vec<u8>> {
    if mapped.pData.is_null() {
        return Err(CaptureError::Platform(anyhow::anyhow!(
            "mapped staging texture has no data pointer"
        )));
    }
    let pitch = mapped.RowPitch as usize;
    if pitch < row_bytes {
        return Err(CaptureError::Platform(anyhow::anyhow!(
            "mapped surface pitch {pitch} is smaller than a row ({row_bytes} bytes)"
        )));
    }
    pitch
        .checked_mul((height.saturating_sub(1)) as usize)
        .and_then(|last_row| last_row.checked_add(row_bytes))
        .ok_or(CaptureError::BufferOverflow)?;

    let base = mapped.pData as *const u8;
    let mut bytes = Vec::with_capacity(total);
    for y in 0..height as usize {
        // Rows are tightly packed in the output; driver pitch padding
        // stays behind.
        let row = unsafe { std::slice::from_raw_parts(base.add(y * pitch), row_bytes) };
        bytes.extend_from_slice(row);
    }
    Ok(bytes)
}
