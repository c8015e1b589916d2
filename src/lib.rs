pub mod backend;
pub mod capturer;
pub mod config;
pub mod convert;
pub mod coordinator;
pub(crate) mod diag;
pub(crate) mod env_config;
pub mod error;
pub mod frame;
pub mod monitor;
mod platform;
pub mod region;

pub use backend::{AutoBackendPolicy, CaptureBackend, CaptureBackendKind, FrameSource};
pub use capturer::{CaptureState, ScreenCapturer, ScreenCapturerBuilder};
pub use config::CaptureConfig;
pub use convert::{ToneMapParams, ToneOperator};
pub use coordinator::CaptureCoordinator;
pub use error::{CaptureError, CaptureErrorClass, CaptureResult};
pub use frame::{OutputImage, OutputMetadata, RawPixelFormat, RawSurface};
pub use monitor::{ColorSpace, DisplayRotation, HdrMetadata, MonitorDescriptor, MonitorKey};
pub use region::CaptureRegion;

/// One-shot capture of the whole virtual desktop with default settings.
///
/// Programs that capture repeatedly should construct a
/// [`ScreenCapturer`] and reuse it; this helper pays the full device
/// initialization cost on every call.
pub fn capture_virtual_desktop() -> CaptureResult<OutputImage> {
    let mut capturer = ScreenCapturer::new()?;
    capturer.capture_virtual_desktop()
}

/// One-shot capture of `region` with default settings.
pub fn capture_region(region: CaptureRegion) -> CaptureResult<OutputImage> {
    let mut capturer = ScreenCapturer::new()?;
    capturer.capture_region(region)
}
