//! The public capture entry point and its recovery strategy.
//!
//! `ScreenCapturer` drives a `CaptureCoordinator` and turns its raw
//! surfaces into finished images. Transient failures are retried after
//! a short pause; device loss triggers a full session reinitialization
//! followed by a settle delay; anything unsupported, a failed
//! reinitialization, or an exhausted retry budget drops the call to a
//! whole-desktop GDI blit. Every call returns an image or a definitive
//! error.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::backend::{
    backend_for_kind_with_auto_policy, AutoBackendPolicy, CaptureBackend, CaptureBackendKind,
};
use crate::config::CaptureConfig;
use crate::convert::{self, ToneMapParams};
use crate::coordinator::CaptureCoordinator;
use crate::diag::{DiagCategory, DiagLog};
use crate::env_config;
use crate::error::{CaptureError, CaptureErrorClass, CaptureResult};
use crate::frame::OutputImage;
use crate::monitor::{MonitorDescriptor, MonitorKey};
use crate::region::CaptureRegion;

/// Pause between attempts after a transient failure.
pub(crate) const TRANSIENT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Pause after a successful reinitialization before the next attempt.
/// A display that just woke from standby can need this long before
/// duplication hands back real frames.
pub(crate) const REINIT_SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Where the capturer is in its lifecycle. `FallbackGdi` and `Failed`
/// are sticky: once the duplication stack has been abandoned, later
/// calls go straight to GDI. A fresh capturer starts over.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaptureState {
    #[default]
    Idle,
    Capturing,
    Reinitializing,
    FallbackGdi,
    Failed,
}

type DelayFn = Box<dyn FnMut(Duration) + Send>;

pub struct ScreenCapturerBuilder {
    backend_kind: CaptureBackendKind,
    backend_override: Option<Arc<dyn CaptureBackend>>,
    auto_policy: AutoBackendPolicy,
    config: CaptureConfig,
    env_overrides: bool,
    delay: Option<DelayFn>,
}

impl Default for ScreenCapturerBuilder {
    fn default() -> Self {
        Self {
            backend_kind: CaptureBackendKind::Auto,
            backend_override: None,
            auto_policy: AutoBackendPolicy::default(),
            config: CaptureConfig::default(),
            env_overrides: true,
            delay: None,
        }
    }
}

impl ScreenCapturerBuilder {
    /// Use a specific backend instance instead of resolving one from
    /// the backend kind.
    pub fn with_backend(mut self, backend: Arc<dyn CaptureBackend>) -> Self {
        self.backend_kind = backend.kind();
        self.backend_override = Some(backend);
        self
    }

    /// Resolve the backend from `kind` at build time. Clears any
    /// previously set backend instance.
    pub fn with_backend_kind(mut self, kind: CaptureBackendKind) -> Self {
        self.backend_kind = kind;
        self.backend_override = None;
        self
    }

    /// Probe order used when the backend kind is `Auto`.
    pub fn with_auto_backend_policy(mut self, policy: AutoBackendPolicy) -> Self {
        self.auto_policy = policy;
        self
    }

    pub fn with_config(mut self, config: CaptureConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether `LUMICAP_*` environment variables may override the
    /// configuration and backend choice. On by default.
    pub fn apply_env_overrides(mut self, apply: bool) -> Self {
        self.env_overrides = apply;
        self
    }

    /// Replace the retry pauses with `hook`. Used by tests to observe
    /// delays instead of sleeping through them.
    pub fn with_delay_hook(mut self, hook: impl FnMut(Duration) + Send + 'static) -> Self {
        self.delay = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> CaptureResult<ScreenCapturer> {
        let mut config = self.config;
        if self.env_overrides {
            config = config.with_env_overrides();
        }
        let config = config.sanitized();

        let backend = match self.backend_override {
            Some(backend) => backend,
            None => {
                let mut kind = self.backend_kind;
                if self.env_overrides && env_config::env_var_truthy("LUMICAP_FORCE_GDI") {
                    kind = CaptureBackendKind::Gdi;
                }
                backend_for_kind_with_auto_policy(kind, self.auto_policy)?
            }
        };

        convert::warmup();

        Ok(ScreenCapturer {
            backend,
            coordinator: None,
            diag: DiagLog::new(config.debug_mode),
            config,
            state: CaptureState::Idle,
            delay: self.delay.unwrap_or_else(|| Box::new(thread::sleep)),
        })
    }
}

/// Synchronous screen capturer. One call runs at a time per instance;
/// callers that capture from several threads serialize access
/// themselves.
pub struct ScreenCapturer {
    backend: Arc<dyn CaptureBackend>,
    coordinator: Option<CaptureCoordinator>,
    diag: DiagLog,
    config: CaptureConfig,
    state: CaptureState,
    delay: DelayFn,
}

impl ScreenCapturer {
    pub fn builder() -> ScreenCapturerBuilder {
        ScreenCapturerBuilder::default()
    }

    /// Default capturer: auto backend selection, default configuration,
    /// environment overrides honored.
    pub fn new() -> CaptureResult<Self> {
        Self::builder().build()
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn backend_kind(&self) -> CaptureBackendKind {
        self.backend.kind()
    }

    /// Monitors as of the last (re)initialization, enumerating first if
    /// no snapshot exists yet.
    pub fn monitors(&mut self) -> CaptureResult<Vec<MonitorDescriptor>> {
        self.ensure_initialized()?;
        Ok(self
            .coordinator
            .as_ref()
            .map(|coordinator| coordinator.descriptors().to_vec())
            .unwrap_or_default())
    }

    /// Bounding rectangle of the whole virtual desktop.
    pub fn virtual_desktop_bounds(&mut self) -> CaptureResult<CaptureRegion> {
        self.ensure_initialized()?;
        self.coordinator
            .as_ref()
            .map(|coordinator| coordinator.bounds())
            .ok_or(CaptureError::MonitorLost)
    }

    pub fn capture_virtual_desktop(&mut self) -> CaptureResult<OutputImage> {
        let bounds = self.virtual_desktop_bounds()?;
        self.capture_region(bounds)
    }

    /// Capture one monitor's full desktop rect.
    pub fn capture_monitor(&mut self, key: MonitorKey) -> CaptureResult<OutputImage> {
        self.ensure_initialized()?;
        let region = self
            .coordinator
            .as_ref()
            .and_then(|coordinator| {
                coordinator
                    .descriptors()
                    .iter()
                    .find(|descriptor| descriptor.key == key)
                    .map(CaptureRegion::of_monitor)
            })
            .ok_or(CaptureError::MonitorLost)?;
        self.capture_region(region)
    }

    /// Capture an arbitrary virtual-desktop rectangle.
    pub fn capture_region(&mut self, region: CaptureRegion) -> CaptureResult<OutputImage> {
        if matches!(self.state, CaptureState::FallbackGdi | CaptureState::Failed) {
            return self.capture_with_gdi(region);
        }
        self.run_capture(region)
    }

    fn run_capture(&mut self, region: CaptureRegion) -> CaptureResult<OutputImage> {
        self.state = CaptureState::Capturing;
        let mut retries_left = self.config.capture_retry_count;
        loop {
            let error = match self.try_capture_once(region) {
                Ok(image) => {
                    self.state = CaptureState::Idle;
                    return Ok(image);
                }
                Err(error) => error,
            };
            match error.class() {
                CaptureErrorClass::InvalidInput => {
                    self.state = CaptureState::Idle;
                    return Err(error);
                }
                CaptureErrorClass::Unsupported => {
                    return self.enter_gdi_fallback(region, error);
                }
                CaptureErrorClass::Transient => {
                    if retries_left == 0 {
                        return self.enter_gdi_fallback(region, error);
                    }
                    retries_left -= 1;
                    debug!("transient capture failure ({error}); retrying in {TRANSIENT_RETRY_DELAY:?}");
                    (self.delay)(TRANSIENT_RETRY_DELAY);
                }
                CaptureErrorClass::DeviceFatal => {
                    if retries_left == 0 {
                        return self.enter_gdi_fallback(region, error);
                    }
                    retries_left -= 1;
                    self.state = CaptureState::Reinitializing;
                    debug!("capture device lost ({error}); reinitializing sessions");
                    let reinit = match self.coordinator.as_mut() {
                        Some(coordinator) => coordinator.reinitialize(),
                        // Initialization itself failed; the next attempt
                        // re-runs it from scratch.
                        None => Ok(()),
                    };
                    match reinit {
                        Ok(()) => {
                            if let Some(coordinator) = self.coordinator.as_ref() {
                                report_hdr_heuristic(&mut self.diag, coordinator.descriptors());
                            }
                            (self.delay)(REINIT_SETTLE_DELAY);
                            self.state = CaptureState::Capturing;
                        }
                        Err(reinit_error) => {
                            debug!("reinitialization failed: {reinit_error}");
                            return self.enter_gdi_fallback(region, reinit_error);
                        }
                    }
                }
            }
        }
    }

    fn try_capture_once(&mut self, region: CaptureRegion) -> CaptureResult<OutputImage> {
        self.ensure_initialized()?;
        let Some(coordinator) = self.coordinator.as_mut() else {
            return Err(CaptureError::MonitorLost);
        };
        let raw = coordinator.capture_region(region)?;
        let hdr = coordinator.hdr_metadata();

        let params = ToneMapParams::new(&hdr, &self.config);
        self.diag.capture_detail(|| {
            format!(
                "captured {}x{} {} frame (hdr={}, tone={:?})",
                raw.width(),
                raw.height(),
                raw.format().as_str(),
                params.hdr_enabled,
                params.operator
            )
        });

        let mut image = convert::convert_raw_to_image(&raw, &params, self.backend.kind())?;
        // A GDI-produced image never saw the HDR pipeline; flag the loss
        // whenever the monitor was actually in HDR mode.
        image.metadata.hdr_fidelity_lost =
            image.metadata.backend == CaptureBackendKind::Gdi && hdr.hdr_enabled;
        Ok(image)
    }

    fn ensure_initialized(&mut self) -> CaptureResult<()> {
        if self.coordinator.is_some() {
            return Ok(());
        }
        let coordinator = CaptureCoordinator::new(Arc::clone(&self.backend))?;
        report_hdr_heuristic(&mut self.diag, coordinator.descriptors());
        self.coordinator = Some(coordinator);
        Ok(())
    }

    fn enter_gdi_fallback(
        &mut self,
        region: CaptureRegion,
        cause: CaptureError,
    ) -> CaptureResult<OutputImage> {
        self.diag.warn_once(DiagCategory::GdiFallbackEngaged, || {
            format!("abandoning duplication capture ({cause}); falling back to GDI BitBlt")
        });
        self.state = CaptureState::FallbackGdi;
        self.capture_with_gdi(region)
    }

    fn capture_with_gdi(&mut self, region: CaptureRegion) -> CaptureResult<OutputImage> {
        let hdr_detected = self
            .coordinator
            .as_ref()
            .map(|coordinator| coordinator.hdr_metadata().hdr_enabled)
            .unwrap_or(false);
        let raw = match self.backend.capture_region_fallback(region) {
            Ok(raw) => raw,
            Err(error) => {
                self.state = CaptureState::Failed;
                warn!("GDI fallback capture failed: {error}");
                return Err(error);
            }
        };
        self.state = CaptureState::FallbackGdi;

        let mut image =
            convert::convert_raw_to_image(&raw, &ToneMapParams::default(), CaptureBackendKind::Gdi)?;
        image.metadata.hdr_fidelity_lost = hdr_detected;
        self.diag.capture_detail(|| {
            format!(
                "GDI fallback produced {}x{} rgb8 (hdr fidelity lost: {hdr_detected})",
                image.width(),
                image.height()
            )
        });
        Ok(image)
    }
}

fn report_hdr_heuristic(diag: &mut DiagLog, descriptors: &[MonitorDescriptor]) {
    for descriptor in descriptors {
        if descriptor.hdr_by_luminance_only() {
            let nits = descriptor.max_luminance_nits;
            diag.warn_once(DiagCategory::HdrLuminanceHeuristic, || {
                format!(
                    "monitor {descriptor} treated as HDR from reported luminance {nits:?} without a PQ color space"
                )
            });
        }
    }
}
