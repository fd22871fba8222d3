use thiserror::Error;

/// Errors that can occur while capturing or distributing loopback audio.
///
/// Device and format errors end the current capture run. Subscription
/// misuse errors are recoverable and leave all state unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("device not available")]
    DeviceNotAvailable,

    #[error("unsupported stream format: {0}")]
    UnsupportedFormat(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("device error: {0}")]
    DeviceError(String),

    #[error("failed to grow sample buffer to {requested} samples")]
    AllocationFailed { requested: usize },

    #[error("consumer is already associated with a sample source")]
    AlreadySubscribed,

    #[error("consumer is not associated with this sample source")]
    NotSubscribed,

    #[error("capture is already running")]
    AlreadyRunning,

    #[error("capture is not running")]
    NotRunning,

    #[error("unknown error: {0}")]
    Unknown(String),
}
