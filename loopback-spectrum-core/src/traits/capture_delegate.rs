use crate::models::error::CaptureError;
use crate::models::state::CaptureState;

/// Event delegate for capture service notifications.
///
/// Methods are called from the capture thread or from whichever thread
/// called `start`/`stop`. Implementations should marshal to their own
/// thread if needed.
pub trait CaptureDelegate: Send + Sync {
    /// Called when the service state changes.
    fn on_state_changed(&self, state: &CaptureState);

    /// Called when a capture run ends with an error.
    fn on_error(&self, error: &CaptureError);
}
