use super::error::CaptureError;

/// Capture service state machine.
///
/// State transitions:
/// ```text
/// idle → capturing → idle
///            ↓
///         failed → capturing (on the next start)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    Idle,
    Capturing,
    Failed(CaptureError),
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The error that ended the last run, if it failed.
    pub fn error(&self) -> Option<&CaptureError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}
