//! Virtual-desktop geometry.
//!
//! [`CaptureRegion`] describes an arbitrary rectangle in virtual desktop
//! coordinates that may span multiple monitors. Intersection and bounds
//! math lives here so the compositor stays free of Win32 types.

use crate::error::{CaptureError, CaptureResult};
use crate::monitor::MonitorDescriptor;

/// A rectangle in virtual desktop coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> CaptureResult<Self> {
        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidRegion(
                "region width and height must be > 0".into(),
            ));
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Right edge (exclusive) in virtual desktop coordinates.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width as i32)
    }

    /// Bottom edge (exclusive) in virtual desktop coordinates.
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height as i32)
    }

    /// Intersection with another region, `None` when they don't overlap.
    pub fn intersect(&self, other: &CaptureRegion) -> Option<CaptureRegion> {
        let ix = self.x.max(other.x);
        let iy = self.y.max(other.y);
        let ix2 = self.right().min(other.right());
        let iy2 = self.bottom().min(other.bottom());

        if ix < ix2 && iy < iy2 {
            Some(CaptureRegion {
                x: ix,
                y: iy,
                width: (ix2 - ix) as u32,
                height: (iy2 - iy) as u32,
            })
        } else {
            None
        }
    }

    /// The monitor's desktop rect as a region.
    pub fn of_monitor(descriptor: &MonitorDescriptor) -> CaptureRegion {
        CaptureRegion {
            x: descriptor.x,
            y: descriptor.y,
            width: descriptor.width,
            height: descriptor.height,
        }
    }
}

/// Bounding box of all monitor desktop rects. `None` with no monitors.
pub fn virtual_desktop_bounds(descriptors: &[MonitorDescriptor]) -> Option<CaptureRegion> {
    let first = descriptors.first()?;
    let mut left = first.x;
    let mut top = first.y;
    let mut right = first.right();
    let mut bottom = first.bottom();
    for descriptor in &descriptors[1..] {
        left = left.min(descriptor.x);
        top = top.min(descriptor.y);
        right = right.max(descriptor.right());
        bottom = bottom.max(descriptor.bottom());
    }
    Some(CaptureRegion {
        x: left,
        y: top,
        width: (right - left) as u32,
        height: (bottom - top) as u32,
    })
}
