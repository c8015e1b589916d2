use std::fmt;

/// Reported max luminance above which a monitor is assumed to be in HDR
/// mode even when it does not report a PQ color space. Monitors that
/// report no luminance at all never trigger this.
pub const HDR_LUMINANCE_THRESHOLD_NITS: f32 = 400.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MonitorKey {
    pub adapter_luid: u64,
    pub output_id: u64,
}

impl MonitorKey {
    pub fn from_device_name(adapter_luid: u64, device_name: &str) -> Self {
        Self {
            adapter_luid,
            output_id: fnv1a_64(device_name.as_bytes()),
        }
    }

    pub fn stable_id(&self) -> String {
        format!("{:016x}-{:016x}", self.adapter_luid, self.output_id)
    }
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0001_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Display rotation as configured in the OS. Duplication always hands
/// back the panel-native (unrotated) surface; the stitcher undoes the
/// rotation per pixel via [`desktop_to_native`](Self::desktop_to_native).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DisplayRotation {
    #[default]
    Identity,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl DisplayRotation {
    /// Whether the desktop rect swaps width/height relative to the
    /// native duplication surface.
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Self::Rotate90 | Self::Rotate270)
    }

    /// Map a pixel position in the monitor's desktop-oriented rect
    /// (post-rotation, `desktop_width` x `desktop_height`) to its
    /// position in the native duplication surface.
    pub fn desktop_to_native(
        self,
        x: u32,
        y: u32,
        desktop_width: u32,
        desktop_height: u32,
    ) -> (u32, u32) {
        match self {
            Self::Identity => (x, y),
            Self::Rotate90 => (y, desktop_width - 1 - x),
            Self::Rotate180 => (desktop_width - 1 - x, desktop_height - 1 - y),
            Self::Rotate270 => (desktop_height - 1 - y, x),
        }
    }

    /// Native surface dimensions for a monitor whose desktop rect is
    /// `desktop_width` x `desktop_height`.
    pub fn native_size(self, desktop_width: u32, desktop_height: u32) -> (u32, u32) {
        if self.swaps_dimensions() {
            (desktop_height, desktop_width)
        } else {
            (desktop_width, desktop_height)
        }
    }
}

/// Transfer-function classification reported by the monitor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorSpace {
    /// Standard sRGB (BT.709 primaries, sRGB transfer function).
    #[default]
    Srgb,
    /// HDR10 / PQ (BT.2020 primaries, SMPTE ST 2084 transfer function).
    Hdr10Pq,
}

/// Everything the capture pipeline needs to know about one monitor.
/// Built from OS state at (re)initialization and immutable afterwards;
/// display topology changes require a new snapshot.
#[derive(Clone, Debug)]
pub struct MonitorDescriptor {
    pub key: MonitorKey,
    pub name: String,
    /// Desktop rect origin in virtual-desktop coordinates.
    pub x: i32,
    pub y: i32,
    /// Desktop rect size, post-rotation.
    pub width: u32,
    pub height: u32,
    /// Duplication surface size, pre-rotation.
    pub native_width: u32,
    pub native_height: u32,
    pub rotation: DisplayRotation,
    pub is_primary: bool,
    pub color_space: ColorSpace,
    /// Raw luminance readings as reported. `None` when the driver does
    /// not report them; the HDR heuristic treats absence as SDR.
    pub max_luminance_nits: Option<f32>,
    pub min_luminance_nits: Option<f32>,
    pub max_frame_luminance_nits: Option<f32>,
}

impl MonitorDescriptor {
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width as i32)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height as i32)
    }

    fn reports_hdr(&self) -> bool {
        if self.color_space == ColorSpace::Hdr10Pq {
            return true;
        }
        match self.max_luminance_nits {
            Some(nits) => nits.is_finite() && nits > HDR_LUMINANCE_THRESHOLD_NITS,
            None => false,
        }
    }

    /// Whether HDR was assumed from luminance alone, without a PQ color
    /// space. Used for the one-time heuristic diagnostic.
    pub(crate) fn hdr_by_luminance_only(&self) -> bool {
        self.color_space != ColorSpace::Hdr10Pq && self.reports_hdr()
    }
}

impl fmt::Display for MonitorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}x{}@({},{})",
            self.name, self.width, self.height, self.x, self.y
        )
    }
}

/// Sanitized HDR parameters for the pixel pipeline, decided once per
/// (re)initialization from the primary monitor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HdrMetadata {
    pub hdr_enabled: bool,
    pub max_luminance_nits: f32,
    pub min_luminance_nits: f32,
    pub max_content_light_nits: f32,
}

impl Default for HdrMetadata {
    fn default() -> Self {
        Self {
            hdr_enabled: false,
            max_luminance_nits: 1000.0,
            min_luminance_nits: 0.0,
            max_content_light_nits: 1000.0,
        }
    }
}

impl HdrMetadata {
    /// Decide the HDR state from the primary monitor's reported values.
    /// Falls back to the first monitor when none is flagged primary.
    /// Luminance defaults kick in only for the scaling parameters, never
    /// for the enablement decision itself.
    pub fn from_descriptors(descriptors: &[MonitorDescriptor]) -> Self {
        let primary = descriptors
            .iter()
            .find(|descriptor| descriptor.is_primary)
            .or_else(|| descriptors.first());

        let Some(primary) = primary else {
            return Self::default();
        };

        let defaults = Self::default();
        let max_luminance_nits =
            sanitize_nits(primary.max_luminance_nits, defaults.max_luminance_nits);
        Self {
            hdr_enabled: primary.reports_hdr(),
            max_luminance_nits,
            min_luminance_nits: sanitize_nits(primary.min_luminance_nits, 0.0).max(0.0),
            // Per-frame content light is rarely reported; the panel max
            // is the closest stand-in.
            max_content_light_nits: sanitize_nits(
                primary.max_frame_luminance_nits,
                max_luminance_nits,
            ),
        }
    }
}

fn sanitize_nits(reported: Option<f32>, default: f32) -> f32 {
    match reported {
        Some(nits) if nits.is_finite() && nits > 0.0 => nits,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> MonitorDescriptor {
        MonitorDescriptor {
            key: MonitorKey::from_device_name(1, name),
            name: name.to_string(),
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
            native_width: 1920,
            native_height: 1080,
            rotation: DisplayRotation::Identity,
            is_primary: true,
            color_space: ColorSpace::Srgb,
            max_luminance_nits: None,
            min_luminance_nits: None,
            max_frame_luminance_nits: None,
        }
    }

    #[test]
    fn key_is_stable_for_the_same_device_name() {
        let a = MonitorKey::from_device_name(7, r"\\.\DISPLAY1");
        let b = MonitorKey::from_device_name(7, r"\\.\DISPLAY1");
        let c = MonitorKey::from_device_name(7, r"\\.\DISPLAY2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.stable_id(), b.stable_id());
    }

    #[test]
    fn identity_rotation_maps_corners_to_themselves() {
        let rotation = DisplayRotation::Identity;
        assert_eq!(rotation.desktop_to_native(0, 0, 1920, 1080), (0, 0));
        assert_eq!(
            rotation.desktop_to_native(1919, 1079, 1920, 1080),
            (1919, 1079)
        );
        assert_eq!(rotation.native_size(1920, 1080), (1920, 1080));
    }

    #[test]
    fn rotate90_maps_into_transposed_surface() {
        let rotation = DisplayRotation::Rotate90;
        // Desktop 1920x1080 on a panel scanning out 1080x1920.
        assert_eq!(rotation.native_size(1920, 1080), (1080, 1920));
        assert_eq!(rotation.desktop_to_native(0, 0, 1920, 1080), (0, 1919));
        assert_eq!(rotation.desktop_to_native(1919, 0, 1920, 1080), (0, 0));
        assert_eq!(rotation.desktop_to_native(0, 1079, 1920, 1080), (1079, 1919));
        assert_eq!(rotation.desktop_to_native(1919, 1079, 1920, 1080), (1079, 0));
    }

    #[test]
    fn rotate180_maps_corners_to_opposite_corners() {
        let rotation = DisplayRotation::Rotate180;
        assert_eq!(rotation.native_size(1920, 1080), (1920, 1080));
        assert_eq!(
            rotation.desktop_to_native(0, 0, 1920, 1080),
            (1919, 1079)
        );
        assert_eq!(rotation.desktop_to_native(1919, 1079, 1920, 1080), (0, 0));
    }

    #[test]
    fn rotate270_maps_into_transposed_surface() {
        let rotation = DisplayRotation::Rotate270;
        assert_eq!(rotation.native_size(1920, 1080), (1080, 1920));
        assert_eq!(rotation.desktop_to_native(0, 0, 1920, 1080), (1079, 0));
        assert_eq!(rotation.desktop_to_native(1919, 0, 1920, 1080), (1079, 1919));
        assert_eq!(rotation.desktop_to_native(0, 1079, 1920, 1080), (0, 0));
        assert_eq!(rotation.desktop_to_native(1919, 1079, 1920, 1080), (0, 1919));
    }

    #[test]
    fn every_rotation_round_trips_through_its_inverse() {
        let (dw, dh) = (13, 7);
        for rotation in [
            DisplayRotation::Identity,
            DisplayRotation::Rotate90,
            DisplayRotation::Rotate180,
            DisplayRotation::Rotate270,
        ] {
            let (nw, nh) = rotation.native_size(dw, dh);
            let mut seen = vec![false; (nw * nh) as usize];
            for y in 0..dh {
                for x in 0..dw {
                    let (u, v) = rotation.desktop_to_native(x, y, dw, dh);
                    assert!(u < nw && v < nh, "{rotation:?} mapped ({x},{y}) out of bounds");
                    let index = (v * nw + u) as usize;
                    assert!(!seen[index], "{rotation:?} mapped two pixels to ({u},{v})");
                    seen[index] = true;
                }
            }
            assert!(seen.iter().all(|covered| *covered));
        }
    }

    #[test]
    fn pq_color_space_enables_hdr() {
        let mut primary = descriptor("pq");
        primary.color_space = ColorSpace::Hdr10Pq;
        let metadata = HdrMetadata::from_descriptors(&[primary]);
        assert!(metadata.hdr_enabled);
    }

    #[test]
    fn reported_luminance_above_threshold_enables_hdr() {
        let mut primary = descriptor("bright");
        primary.max_luminance_nits = Some(603.0);
        let metadata = HdrMetadata::from_descriptors(&[primary.clone()]);
        assert!(metadata.hdr_enabled);
        assert!(primary.hdr_by_luminance_only());
        assert_eq!(metadata.max_luminance_nits, 603.0);
    }

    #[test]
    fn unreported_luminance_never_enables_hdr() {
        let metadata = HdrMetadata::from_descriptors(&[descriptor("plain")]);
        assert!(!metadata.hdr_enabled);
        // Scaling defaults still present for downstream sanity.
        assert_eq!(metadata.max_luminance_nits, 1000.0);
    }

    #[test]
    fn luminance_at_or_below_threshold_stays_sdr() {
        let mut primary = descriptor("sdr");
        primary.max_luminance_nits = Some(HDR_LUMINANCE_THRESHOLD_NITS);
        let metadata = HdrMetadata::from_descriptors(&[primary]);
        assert!(!metadata.hdr_enabled);
    }

    #[test]
    fn only_the_primary_monitor_drives_the_hdr_decision() {
        let primary = descriptor("primary");
        let mut secondary = descriptor("secondary");
        secondary.is_primary = false;
        secondary.color_space = ColorSpace::Hdr10Pq;
        let metadata = HdrMetadata::from_descriptors(&[primary, secondary]);
        assert!(!metadata.hdr_enabled);
    }

    #[test]
    fn first_monitor_substitutes_for_a_missing_primary_flag() {
        let mut first = descriptor("first");
        first.is_primary = false;
        first.color_space = ColorSpace::Hdr10Pq;
        let mut second = descriptor("second");
        second.is_primary = false;
        let metadata = HdrMetadata::from_descriptors(&[first, second]);
        assert!(metadata.hdr_enabled);
    }

    #[test]
    fn content_light_falls_back_to_panel_max() {
        let mut primary = descriptor("hdr");
        primary.color_space = ColorSpace::Hdr10Pq;
        primary.max_luminance_nits = Some(1015.0);
        primary.max_frame_luminance_nits = None;
        let metadata = HdrMetadata::from_descriptors(&[primary]);
        assert_eq!(metadata.max_content_light_nits, 1015.0);
    }
}
