//! Multi-monitor composition over per-monitor frame sources.
//!
//! The coordinator owns one `FrameSource` per monitor plus the geometry
//! and HDR snapshot taken at (re)initialization. A capture request is
//! intersected against every monitor; each contributing monitor's full
//! native frame is stitched into one destination surface, undoing that
//! monitor's rotation during the copy.

use std::sync::Arc;

use log::debug;

use crate::backend::{CaptureBackend, FrameSource};
use crate::error::{CaptureError, CaptureResult};
use crate::frame::RawSurface;
use crate::monitor::{DisplayRotation, HdrMetadata, MonitorDescriptor};
use crate::region::{virtual_desktop_bounds, CaptureRegion};

pub struct CaptureCoordinator {
    backend: Arc<dyn CaptureBackend>,
    sources: Vec<Box<dyn FrameSource>>,
    descriptors: Vec<MonitorDescriptor>,
    bounds: CaptureRegion,
    hdr: HdrMetadata,
}

impl CaptureCoordinator {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> CaptureResult<Self> {
        let state = build_state(backend.as_ref())?;
        Ok(Self {
            backend,
            sources: state.sources,
            descriptors: state.descriptors,
            bounds: state.bounds,
            hdr: state.hdr,
        })
    }

    /// Monitors as of the last successful (re)initialization.
    pub fn descriptors(&self) -> &[MonitorDescriptor] {
        &self.descriptors
    }

    /// Bounding rectangle of all desktop rects.
    pub fn bounds(&self) -> CaptureRegion {
        self.bounds
    }

    pub fn hdr_metadata(&self) -> HdrMetadata {
        self.hdr
    }

    /// Tear down every session and rebuild from a fresh enumeration.
    ///
    /// On failure the source list stays empty (later captures report
    /// `MonitorLost`), but the last descriptor snapshot is kept: the
    /// fallback path still needs the bounds and the HDR flag.
    pub fn reinitialize(&mut self) -> CaptureResult<()> {
        // Duplication handles are exclusive per output; release them
        // before opening replacements.
        self.sources.clear();
        let state = build_state(self.backend.as_ref())?;
        self.sources = state.sources;
        self.descriptors = state.descriptors;
        self.bounds = state.bounds;
        self.hdr = state.hdr;
        Ok(())
    }

    /// Capture `region` by stitching every intersecting monitor.
    ///
    /// The destination format is locked to the first contributing
    /// monitor; a later monitor reporting a different raw format aborts
    /// with `UnsupportedFormat`. Any source failure aborts the whole
    /// call, leaving no partial result.
    pub fn capture_region(&mut self, region: CaptureRegion) -> CaptureResult<RawSurface> {
        if region.intersect(&self.bounds).is_none() {
            return Err(CaptureError::InvalidRegion(format!(
                "capture region {}x{} at ({}, {}) is outside the virtual desktop",
                region.width, region.height, region.x, region.y
            )));
        }
        if self.sources.is_empty() {
            return Err(CaptureError::MonitorLost);
        }

        let mut destination: Option<RawSurface> = None;
        for source in &mut self.sources {
            let descriptor = source.descriptor().clone();
            let monitor_rect = CaptureRegion::of_monitor(&descriptor);
            let Some(overlap) = region.intersect(&monitor_rect) else {
                continue;
            };

            let frame = source.capture_frame()?;
            if frame.width() != descriptor.native_width
                || frame.height() != descriptor.native_height
            {
                return Err(CaptureError::Platform(anyhow::anyhow!(
                    "monitor {} returned a {}x{} frame, expected {}x{}",
                    descriptor,
                    frame.width(),
                    frame.height(),
                    descriptor.native_width,
                    descriptor.native_height
                )));
            }

            let dest = match destination.as_mut() {
                None => {
                    let fresh =
                        RawSurface::new_tight(region.width, region.height, frame.format())?;
                    debug!(
                        "capture format locked to {} by {}",
                        frame.format().as_str(),
                        descriptor
                    );
                    destination.insert(fresh)
                }
                Some(dest) => {
                    if dest.format() != frame.format() {
                        return Err(CaptureError::UnsupportedFormat(format!(
                            "mixed raw formats in one region: {} from {}, {} from an earlier monitor",
                            frame.format().as_str(),
                            descriptor,
                            dest.format().as_str()
                        )));
                    }
                    dest
                }
            };
            stitch_into(dest, &region, &frame, &descriptor, &overlap)?;
        }

        let Some(destination) = destination else {
            return Err(CaptureError::InvalidRegion(format!(
                "capture region {}x{} at ({}, {}) does not intersect any monitor",
                region.width, region.height, region.x, region.y
            )));
        };
        if destination.is_all_zero() {
            return Err(CaptureError::BlankFrame);
        }
        Ok(destination)
    }
}

struct CoordinatorState {
    sources: Vec<Box<dyn FrameSource>>,
    descriptors: Vec<MonitorDescriptor>,
    bounds: CaptureRegion,
    hdr: HdrMetadata,
}

fn build_state(backend: &dyn CaptureBackend) -> CaptureResult<CoordinatorState> {
    let descriptors = backend.enumerate_monitors()?;
    let Some(bounds) = virtual_desktop_bounds(&descriptors) else {
        return Err(CaptureError::NoMonitors);
    };
    let mut sources = Vec::with_capacity(descriptors.len());
    for descriptor in &descriptors {
        sources.push(backend.create_frame_source(descriptor)?);
    }
    let hdr = HdrMetadata::from_descriptors(&descriptors);
    debug!(
        "initialized {} monitor source(s), virtual bounds {}x{} at ({}, {}), hdr={}",
        sources.len(),
        bounds.width,
        bounds.height,
        bounds.x,
        bounds.y,
        hdr.hdr_enabled
    );
    Ok(CoordinatorState {
        sources,
        descriptors,
        bounds,
        hdr,
    })
}

/// Offset of `a` from `origin`, known non-negative because `a` comes
/// from an intersection that contains `origin`.
fn local_offset(a: i32, origin: i32) -> u32 {
    (a as i64 - origin as i64) as u32
}

/// Copy `overlap` (desktop coordinates) from a monitor's full frame into
/// the destination, remapping through the monitor's rotation.
fn stitch_into(
    dest: &mut RawSurface,
    region: &CaptureRegion,
    frame: &RawSurface,
    descriptor: &MonitorDescriptor,
    overlap: &CaptureRegion,
) -> CaptureResult<()> {
    let bpp = frame.format().bytes_per_pixel();
    let dest_x0 = local_offset(overlap.x, region.x);
    let dest_y0 = local_offset(overlap.y, region.y);
    let mon_x0 = local_offset(overlap.x, descriptor.x);
    let mon_y0 = local_offset(overlap.y, descriptor.y);

    if descriptor.rotation == DisplayRotation::Identity {
        // Unrotated rows are contiguous in both surfaces.
        let row_bytes = (overlap.width as usize)
            .checked_mul(bpp)
            .ok_or(CaptureError::BufferOverflow)?;
        let src_col = (mon_x0 as usize)
            .checked_mul(bpp)
            .ok_or(CaptureError::BufferOverflow)?;
        let dest_col = (dest_x0 as usize)
            .checked_mul(bpp)
            .ok_or(CaptureError::BufferOverflow)?;
        for row in 0..overlap.height {
            let src_row = frame.row(mon_y0 + row)?;
            let src = src_row
                .get(src_col..src_col + row_bytes)
                .ok_or(CaptureError::BufferOverflow)?;
            let dest_row = dest.row_mut(dest_y0 + row)?;
            let dst = dest_row
                .get_mut(dest_col..dest_col + row_bytes)
                .ok_or(CaptureError::BufferOverflow)?;
            dst.copy_from_slice(src);
        }
        return Ok(());
    }

    // Rotated monitors remap per pixel: desktop (x, y) to native (u, v).
    for row in 0..overlap.height {
        let dest_row = dest.row_mut(dest_y0 + row)?;
        for col in 0..overlap.width {
            let (u, v) = descriptor.rotation.desktop_to_native(
                mon_x0 + col,
                mon_y0 + row,
                descriptor.width,
                descriptor.height,
            );
            let src_row = frame.row(v)?;
            let src_off = (u as usize) * bpp;
            let src = src_row
                .get(src_off..src_off + bpp)
                .ok_or(CaptureError::BufferOverflow)?;
            let dst_off = ((dest_x0 + col) as usize) * bpp;
            let dst = dest_row
                .get_mut(dst_off..dst_off + bpp)
                .ok_or(CaptureError::BufferOverflow)?;
            dst.copy_from_slice(src);
        }
    }
    Ok(())
}
