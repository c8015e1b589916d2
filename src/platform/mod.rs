use std::sync::Arc;

#[cfg(not(target_os = "windows"))]
use crate::backend::FrameSource;
use crate::backend::{AutoBackendPolicy, CaptureBackend, CaptureBackendKind};
#[cfg(not(target_os = "windows"))]
use crate::error::CaptureError;
#[cfg(not(target_os = "windows"))]
use crate::error::CaptureResult;
#[cfg(not(target_os = "windows"))]
use crate::frame::RawSurface;
#[cfg(not(target_os = "windows"))]
use crate::monitor::MonitorDescriptor;
#[cfg(not(target_os = "windows"))]
use crate::region::CaptureRegion;

#[cfg(target_os = "windows")]
pub(crate) mod windows;

#[cfg(not(target_os = "windows"))]
fn unsupported_error() -> CaptureError {
    CaptureError::BackendUnavailable("screen capture is only supported on Windows".to_string())
}

#[cfg(not(target_os = "windows"))]
struct UnsupportedBackend {
    kind: CaptureBackendKind,
}

#[cfg(not(target_os = "windows"))]
impl CaptureBackend for UnsupportedBackend {
    fn kind(&self) -> CaptureBackendKind {
        self.kind
    }

    fn enumerate_monitors(&self) -> CaptureResult<Vec<MonitorDescriptor>> {
        Err(unsupported_error())
    }

    fn create_frame_source(
        &self,
        _descriptor: &MonitorDescriptor,
    ) -> CaptureResult<Box<dyn FrameSource>> {
        Err(unsupported_error())
    }

    fn capture_region_fallback(&self, _region: CaptureRegion) -> CaptureResult<RawSurface> {
        Err(unsupported_error())
    }
}

#[cfg(target_os = "windows")]
pub(crate) fn build_backend(
    kind: CaptureBackendKind,
    auto_policy: AutoBackendPolicy,
) -> crate::error::CaptureResult<Arc<dyn CaptureBackend>> {
    windows::build_backend(kind, auto_policy)
}

#[cfg(not(target_os = "windows"))]
pub(crate) fn build_backend(
    kind: CaptureBackendKind,
    _auto_policy: AutoBackendPolicy,
) -> crate::error::CaptureResult<Arc<dyn CaptureBackend>> {
    Ok(Arc::new(UnsupportedBackend { kind }))
}
