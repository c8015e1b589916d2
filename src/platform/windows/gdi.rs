//! GDI BitBlt capture.
//!
//! The always-available fallback. GDI reads the composited desktop in
//! 8-bit BGRA, so frames come back desktop-oriented and SDR even when
//! the monitor is in HDR mode.

use std::ffi::c_void;
use std::mem::size_of;
use std::ptr::null_mut;

use anyhow::Context;
use windows::Win32::Foundation::{HANDLE, HWND};
use windows::Win32::Graphics::Gdi::{
    BI_RGB, BITMAPINFO, BITMAPINFOHEADER, BitBlt, CreateCompatibleDC, CreateDIBSection,
    DIB_RGB_COLORS, DeleteDC, DeleteObject, GetDC, HBITMAP, HDC, HGDIOBJ, ReleaseDC, SRCCOPY,
    SelectObject,
};

use crate::backend::FrameSource;
use crate::error::{CaptureError, CaptureResult};
use crate::frame::{RawPixelFormat, RawSurface};
use crate::monitor::MonitorDescriptor;
use crate::region::CaptureRegion;

struct GdiResources {
    screen_dc: HDC,
    mem_dc: HDC,
    bitmap: Option<HBITMAP>,
    old_bitmap: Option<HGDIOBJ>,
    bits: *mut u8,
    width: i32,
    height: i32,
    stride: usize,
}

impl GdiResources {
    fn new() -> CaptureResult<Self> {
        let screen_dc = unsafe { GetDC(HWND(null_mut())) };
        if screen_dc.0.is_null() {
            return Err(CaptureError::Platform(anyhow::anyhow!(
                "GetDC(NULL) returned null"
            )));
        }

        let mem_dc = unsafe { CreateCompatibleDC(screen_dc) };
        if mem_dc.0.is_null() {
            unsafe {
                let _ = ReleaseDC(HWND(null_mut()), screen_dc);
            }
            return Err(CaptureError::Platform(anyhow::anyhow!(
                "CreateCompatibleDC failed"
            )));
        }

        Ok(Self {
            screen_dc,
            mem_dc,
            bitmap: None,
            old_bitmap: None,
            bits: null_mut(),
            width: 0,
            height: 0,
            stride: 0,
        })
    }

    fn ensure_surface(&mut self, width: i32, height: i32) -> CaptureResult<()> {
        if width <= 0 || height <= 0 {
            return Err(CaptureError::Platform(anyhow::anyhow!(
                "invalid gdi surface size {width}x{height}"
            )));
        }

        if self.bitmap.is_some() && self.width == width && self.height == height {
            return Ok(());
        }

        self.release_bitmap();

        let mut info = BITMAPINFO::default();
        info.bmiHeader.biSize = size_of::<BITMAPINFOHEADER>() as u32;
        info.bmiHeader.biWidth = width;
        // Negative height selects a top-down DIB, matching frame layout.
        info.bmiHeader.biHeight = -height;
        info.bmiHeader.biPlanes = 1;
        info.bmiHeader.biBitCount = 32;
        info.bmiHeader.biCompression = BI_RGB.0;

        let mut bits: *mut c_void = null_mut();
        let bitmap = unsafe {
            CreateDIBSection(
                self.mem_dc,
                &info,
                DIB_RGB_COLORS,
                &mut bits,
                HANDLE::default(),
                0,
            )
        }
        .context("CreateDIBSection failed")
        .map_err(CaptureError::Platform)?;

        let selected = unsafe { SelectObject(self.mem_dc, bitmap) };
        if selected.0.is_null() {
            unsafe {
                let _ = DeleteObject(bitmap);
            }
            return Err(CaptureError::Platform(anyhow::anyhow!(
                "SelectObject failed for gdi capture bitmap"
            )));
        }

        self.bitmap = Some(bitmap);
        self.old_bitmap = Some(selected);
        self.bits = bits.cast();
        self.width = width;
        self.height = height;
        self.stride = usize::try_from(width)
            .ok()
            .and_then(|w| w.checked_mul(4))
            .ok_or(CaptureError::BufferOverflow)?;
        Ok(())
    }

    /// BitBlt the given virtual-desktop rectangle into the DIB section
    /// and copy it out as a BGRA8 surface.
    fn blit(&mut self, left: i32, top: i32, width: i32, height: i32) -> CaptureResult<RawSurface> {
        self.ensure_surface(width, height)?;

        unsafe {
            BitBlt(
                self.mem_dc,
                0,
                0,
                width,
                height,
                self.screen_dc,
                left,
                top,
                SRCCOPY,
            )
        }
        .context("BitBlt failed during GDI capture")
        .map_err(CaptureError::Platform)?;

        let total = self
            .stride
            .checked_mul(height as usize)
            .ok_or(CaptureError::BufferOverflow)?;
        // Top-down DIB at 32bpp: rows are already in image order with
        // no pitch padding.
        let bytes = unsafe { std::slice::from_raw_parts(self.bits, total) }.to_vec();
        RawSurface::new(
            width as u32,
            height as u32,
            self.stride,
            RawPixelFormat::Bgra8,
            bytes,
        )
    }

    fn release_bitmap(&mut self) {
        if let Some(old_bitmap) = self.old_bitmap.take() {
            unsafe {
                let _ = SelectObject(self.mem_dc, old_bitmap);
            }
        }
        if let Some(bitmap) = self.bitmap.take() {
            unsafe {
                let _ = DeleteObject(bitmap);
            }
        }
        self.bits = null_mut();
        self.width = 0;
        self.height = 0;
        self.stride = 0;
    }
}

impl Drop for GdiResources {
    fn drop(&mut self) {
        self.release_bitmap();

        if !self.mem_dc.0.is_null() {
            unsafe {
                let _ = DeleteDC(self.mem_dc);
            }
        }
        if !self.screen_dc.0.is_null() {
            unsafe {
                let _ = ReleaseDC(HWND(null_mut()), self.screen_dc);
            }
        }
    }
}

pub(crate) struct GdiFrameSource {
    descriptor: MonitorDescriptor,
    resources: GdiResources,
}

// SAFETY: GdiResources contains raw HDC/HBITMAP handles which are not
// Send, but they are only touched from the thread driving the
// capturer, which serializes every call.
unsafe impl Send for GdiFrameSource {}

impl GdiFrameSource {
    pub(crate) fn new(descriptor: MonitorDescriptor) -> CaptureResult<Self> {
        Ok(Self {
            descriptor,
            resources: GdiResources::new()?,
        })
    }
}

impl FrameSource for GdiFrameSource {
    fn descriptor(&self) -> &MonitorDescriptor {
        &self.descriptor
    }

    fn capture_frame(&mut self) -> CaptureResult<RawSurface> {
        let width =
            i32::try_from(self.descriptor.width).map_err(|_| CaptureError::BufferOverflow)?;
        let height =
            i32::try_from(self.descriptor.height).map_err(|_| CaptureError::BufferOverflow)?;
        self.resources
            .blit(self.descriptor.x, self.descriptor.y, width, height)
    }
}

/// One-shot whole-region blit for the fallback path; resources are
/// created and torn down within the call.
pub(crate) fn capture_region_bitblt(region: CaptureRegion) -> CaptureResult<RawSurface> {
    let width = i32::try_from(region.width).map_err(|_| CaptureError::BufferOverflow)?;
    let height = i32::try_from(region.height).map_err(|_| CaptureError::BufferOverflow)?;
    let mut resources = GdiResources::new()?;
    resources.blit(region.x, region.y, width, height)
}
