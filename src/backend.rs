use std::sync::Arc;

use crate::error::CaptureResult;
use crate::frame::RawSurface;
use crate::monitor::MonitorDescriptor;
use crate::region::CaptureRegion;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureBackendKind {
    Auto,

    DxgiDuplication,

    Gdi,
}

impl CaptureBackendKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::DxgiDuplication => "dxgi",
            Self::Gdi => "gdi",
        }
    }
}

#[derive(Clone, Debug)]
pub struct AutoBackendPolicy {
    pub priority: Vec<CaptureBackendKind>,
}

impl AutoBackendPolicy {
    pub fn normalized_priority(&self) -> Vec<CaptureBackendKind> {
        let mut normalized = Vec::new();
        for kind in &self.priority {
            if *kind == CaptureBackendKind::Auto {
                continue;
            }
            if !normalized.contains(kind) {
                normalized.push(*kind);
            }
        }
        if normalized.is_empty() {
            normalized.extend(DEFAULT_AUTO_BACKEND_PRIORITY);
        }
        normalized
    }
}

impl Default for AutoBackendPolicy {
    fn default() -> Self {
        Self {
            priority: DEFAULT_AUTO_BACKEND_PRIORITY.to_vec(),
        }
    }
}

pub const DEFAULT_AUTO_BACKEND_PRIORITY: [CaptureBackendKind; 2] = [
    CaptureBackendKind::DxgiDuplication,
    CaptureBackendKind::Gdi,
];

/// Per-monitor frame producer.
///
/// A source returns full frames in the orientation its descriptor
/// reports: duplication sources hand back the panel-native surface and
/// carry the real rotation, GDI sources hand back desktop-oriented
/// pixels and report `Identity`.
pub trait FrameSource: Send {
    /// The monitor this source captures, as seen at (re)initialization.
    fn descriptor(&self) -> &MonitorDescriptor;

    /// Capture one full frame. Bounded: implementations either return a
    /// frame or a classified error within their internal timeout.
    fn capture_frame(&mut self) -> CaptureResult<RawSurface>;
}

/// Platform factory seam. Mock implementations drive the coordinator
/// and retry-strategy tests without any display hardware.
pub trait CaptureBackend: Send + Sync {
    fn kind(&self) -> CaptureBackendKind;

    /// Fresh descriptors for every usable monitor. Never cached; layout
    /// changes invalidate earlier results.
    fn enumerate_monitors(&self) -> CaptureResult<Vec<MonitorDescriptor>>;

    fn create_frame_source(
        &self,
        descriptor: &MonitorDescriptor,
    ) -> CaptureResult<Box<dyn FrameSource>>;

    /// Last-resort whole-region capture (BGRA8, desktop-oriented),
    /// independent of any per-monitor session state.
    fn capture_region_fallback(&self, region: CaptureRegion) -> CaptureResult<RawSurface>;
}

pub fn default_backend() -> CaptureResult<Arc<dyn CaptureBackend>> {
    backend_for_kind_with_auto_policy(CaptureBackendKind::Auto, AutoBackendPolicy::default())
}

pub fn backend_for_kind(kind: CaptureBackendKind) -> CaptureResult<Arc<dyn CaptureBackend>> {
    backend_for_kind_with_auto_policy(kind, AutoBackendPolicy::default())
}

pub fn backend_for_kind_with_auto_policy(
    kind: CaptureBackendKind,
    auto_policy: AutoBackendPolicy,
) -> CaptureResult<Arc<dyn CaptureBackend>> {
    crate::platform::build_backend(kind, auto_policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_priority_drops_auto_and_duplicates() {
        let policy = AutoBackendPolicy {
            priority: vec![
                CaptureBackendKind::Auto,
                CaptureBackendKind::Gdi,
                CaptureBackendKind::Gdi,
                CaptureBackendKind::DxgiDuplication,
            ],
        };
        assert_eq!(
            policy.normalized_priority(),
            vec![CaptureBackendKind::Gdi, CaptureBackendKind::DxgiDuplication]
        );
    }

    #[test]
    fn empty_priority_falls_back_to_the_default_order() {
        let policy = AutoBackendPolicy { priority: vec![] };
        assert_eq!(
            policy.normalized_priority(),
            DEFAULT_AUTO_BACKEND_PRIORITY.to_vec()
        );
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(CaptureBackendKind::Auto.as_str(), "auto");
        assert_eq!(CaptureBackendKind::DxgiDuplication.as_str(), "dxgi");
        assert_eq!(CaptureBackendKind::Gdi.as_str(), "gdi");
    }
}
