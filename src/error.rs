use std::fmt;

#[derive(Debug)]
pub enum CaptureError {
    InvalidRegion(String),

    InvalidConfig(String),

    NoMonitors,

    MonitorLost,

    AccessLost,

    DeviceRemoved,

    SessionDisconnected,

    Timeout,

    /// The capture succeeded but every destination byte was zero.
    /// Duplication sometimes hands back an all-black surface right after
    /// a mode switch; treated as retryable rather than returned to the
    /// caller as a valid image.
    BlankFrame,

    UnsupportedFormat(String),

    BackendUnavailable(String),

    BufferOverflow,

    Platform(anyhow::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureErrorClass {
    /// Caller mistake. Retrying the identical request cannot succeed.
    InvalidInput,
    /// The request cannot be served by any amount of retrying on this
    /// backend; a different backend may still work.
    Unsupported,
    /// Expected to clear on its own within a frame or two.
    Transient,
    /// The device or desktop session underneath the capture objects is
    /// gone; only a full reinitialization can recover.
    DeviceFatal,
}

impl CaptureError {
    pub fn class(&self) -> CaptureErrorClass {
        match self {
            Self::InvalidRegion(_) | Self::InvalidConfig(_) => CaptureErrorClass::InvalidInput,
            Self::NoMonitors | Self::UnsupportedFormat(_) | Self::BackendUnavailable(_) => {
                CaptureErrorClass::Unsupported
            }
            Self::Timeout | Self::BlankFrame => CaptureErrorClass::Transient,
            Self::MonitorLost
            | Self::AccessLost
            | Self::DeviceRemoved
            | Self::SessionDisconnected
            | Self::BufferOverflow
            | Self::Platform(_) => CaptureErrorClass::DeviceFatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), CaptureErrorClass::Transient)
    }

    pub fn requires_reinit(&self) -> bool {
        matches!(self.class(), CaptureErrorClass::DeviceFatal)
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRegion(message) => {
                write!(f, "invalid capture region: {message}")
            }
            Self::InvalidConfig(message) => write!(f, "invalid capture configuration: {message}"),
            Self::NoMonitors => write!(f, "no usable monitors found"),
            Self::MonitorLost => write!(f, "requested monitor is no longer available"),
            Self::AccessLost => write!(f, "desktop duplication access lost"),
            Self::DeviceRemoved => write!(f, "graphics device was removed or reset"),
            Self::SessionDisconnected => write!(f, "desktop session disconnected"),
            Self::Timeout => write!(f, "failed to acquire desktop frame within timeout"),
            Self::BlankFrame => write!(f, "captured frame contained no pixel data"),
            Self::UnsupportedFormat(fmt_name) => {
                write!(f, "unsupported desktop texture format: {fmt_name}")
            }
            Self::BackendUnavailable(message) => {
                write!(f, "no available backend implementation: {message}")
            }
            Self::BufferOverflow => write!(f, "frame buffer size overflow"),
            Self::Platform(inner) => write!(f, "{inner}"),
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Platform(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

pub type CaptureResult<T> = Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable_without_reinit() {
        for error in [CaptureError::Timeout, CaptureError::BlankFrame] {
            assert_eq!(error.class(), CaptureErrorClass::Transient);
            assert!(error.is_retryable());
            assert!(!error.requires_reinit());
        }
    }

    #[test]
    fn device_loss_requires_reinit() {
        for error in [
            CaptureError::AccessLost,
            CaptureError::DeviceRemoved,
            CaptureError::SessionDisconnected,
            CaptureError::MonitorLost,
            CaptureError::BufferOverflow,
            CaptureError::Platform(anyhow::anyhow!("device hung")),
        ] {
            assert_eq!(error.class(), CaptureErrorClass::DeviceFatal);
            assert!(error.requires_reinit());
            assert!(!error.is_retryable());
        }
    }

    #[test]
    fn caller_mistakes_are_terminal() {
        for error in [
            CaptureError::InvalidRegion("empty".into()),
            CaptureError::InvalidConfig("bad retry count".into()),
        ] {
            assert_eq!(error.class(), CaptureErrorClass::InvalidInput);
            assert!(!error.is_retryable());
            assert!(!error.requires_reinit());
        }
    }

    #[test]
    fn unsupported_conditions_do_not_retry() {
        for error in [
            CaptureError::NoMonitors,
            CaptureError::UnsupportedFormat("DXGI_FORMAT_NV12".into()),
            CaptureError::BackendUnavailable("not windows".into()),
        ] {
            assert_eq!(error.class(), CaptureErrorClass::Unsupported);
            assert!(!error.is_retryable());
            assert!(!error.requires_reinit());
        }
    }
}
