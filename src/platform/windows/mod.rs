//! Windows capture backends: DXGI Output Duplication and GDI BitBlt.

pub(crate) mod d3d11;
pub(crate) mod duplication;
pub(crate) mod gdi;
pub(crate) mod monitor;

use std::sync::{Arc, Mutex};

use anyhow::Context;
use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::System::Com::{COINIT_MULTITHREADED, CoInitializeEx, CoUninitialize};

use crate::backend::{AutoBackendPolicy, CaptureBackend, CaptureBackendKind, FrameSource};
use crate::diag::{DiagCategory, DiagLog};
use crate::error::{CaptureError, CaptureResult};
use crate::frame::RawSurface;
use crate::monitor::{DisplayRotation, MonitorDescriptor};
use crate::region::CaptureRegion;

/// Per-thread COM lifetime guard. Capturer-owned objects hold one so
/// COM stays initialized for as long as their interfaces are alive.
pub(crate) struct CoInitGuard {
    should_uninit: bool,
}

impl CoInitGuard {
    pub fn init_multithreaded() -> anyhow::Result<Self> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        if hr == RPC_E_CHANGED_MODE {
            return Ok(Self {
                should_uninit: false,
            });
        }

        hr.ok()
            .context("failed to initialize COM with CoInitializeEx(COINIT_MULTITHREADED)")?;
        Ok(Self {
            should_uninit: true,
        })
    }
}

impl Drop for CoInitGuard {
    fn drop(&mut self) {
        if self.should_uninit {
            unsafe {
                CoUninitialize();
            }
        }
    }
}

pub(crate) fn build_backend(
    kind: CaptureBackendKind,
    policy: AutoBackendPolicy,
) -> CaptureResult<Arc<dyn CaptureBackend>> {
    let resolved = match kind {
        CaptureBackendKind::Auto => resolve_auto_backend(&policy)?,
        concrete => concrete,
    };
    Ok(Arc::new(WindowsBackend::new(resolved)))
}

/// Walk the priority list and settle on the first backend whose probe
/// succeeds. Resolution happens once, at construction, so every image
/// afterwards reports a concrete backend kind.
fn resolve_auto_backend(policy: &AutoBackendPolicy) -> CaptureResult<CaptureBackendKind> {
    let mut errors: Vec<(CaptureBackendKind, CaptureError)> = Vec::new();

    for kind in policy.normalized_priority() {
        match probe_backend(kind) {
            Ok(()) => return Ok(kind),
            Err(err) => errors.push((kind, err)),
        }
    }

    Err(CaptureError::BackendUnavailable(format!(
        "no capture backend is available: {}",
        format_backend_errors(&errors)
    )))
}

fn probe_backend(kind: CaptureBackendKind) -> CaptureResult<()> {
    match kind {
        CaptureBackendKind::Auto => Err(CaptureError::InvalidConfig(
            "auto backend selection is resolved before probing".to_string(),
        )),
        CaptureBackendKind::DxgiDuplication => d3d11::create_device_default()
            .map(|_| ())
            .map_err(CaptureError::Platform),
        CaptureBackendKind::Gdi => Ok(()),
    }
}

fn format_backend_errors(errors: &[(CaptureBackendKind, CaptureError)]) -> String {
    let mut combined = String::new();
    for (index, (kind, error)) in errors.iter().enumerate() {
        if index != 0 {
            combined.push_str("; ");
        }
        combined.push_str(kind.as_str());
        combined.push_str(": ");
        combined.push_str(&error.to_string());
    }
    combined
}

pub(crate) struct WindowsBackend {
    kind: CaptureBackendKind,
    diag: Mutex<DiagLog>,
}

impl WindowsBackend {
    fn new(kind: CaptureBackendKind) -> Self {
        Self {
            kind,
            diag: Mutex::new(DiagLog::new(false)),
        }
    }
}

impl CaptureBackend for WindowsBackend {
    fn kind(&self) -> CaptureBackendKind {
        self.kind
    }

    fn enumerate_monitors(&self) -> CaptureResult<Vec<MonitorDescriptor>> {
        let mut descriptors = monitor::enumerate_descriptors()?;
        if self.kind == CaptureBackendKind::Gdi {
            // GDI reads the composited desktop, so frames arrive already
            // rotated into desktop orientation.
            for descriptor in &mut descriptors {
                descriptor.rotation = DisplayRotation::Identity;
                descriptor.native_width = descriptor.width;
                descriptor.native_height = descriptor.height;
            }
        }
        Ok(descriptors)
    }

    fn create_frame_source(
        &self,
        descriptor: &MonitorDescriptor,
    ) -> CaptureResult<Box<dyn FrameSource>> {
        match self.kind {
            CaptureBackendKind::Auto => Err(CaptureError::InvalidConfig(
                "auto backend selection is resolved at construction".to_string(),
            )),
            CaptureBackendKind::DxgiDuplication => {
                let (source, hdr_formats) =
                    duplication::DuplicationFrameSource::new(descriptor.clone())?;
                if !hdr_formats {
                    if let Ok(mut diag) = self.diag.lock() {
                        diag.warn_once(DiagCategory::DuplicationFormatFallback, || {
                            format!(
                                "duplication for {descriptor} granted BGRA8 only; HDR surfaces will not be delivered"
                            )
                        });
                    }
                }
                Ok(Box::new(source))
            }
            CaptureBackendKind::Gdi => Ok(Box::new(gdi::GdiFrameSource::new(descriptor.clone())?)),
        }
    }

    fn capture_region_fallback(&self, region: CaptureRegion) -> CaptureResult<RawSurface> {
        gdi::capture_region_bitblt(region)
    }
}
