use thiserror::Error;

/// Errors surfaced by the capture engine and its device collaborators.
///
/// Only session-level failures are fatal; everything else either degrades
/// the flow or sends the user back to scanning the same step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("Camera session failed: {0}")]
    SessionFailed(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Photo unavailable: {0}")]
    PhotoUnavailable(String),
    #[error("Torch unavailable: {0}")]
    TorchUnavailable(String),
    #[error("Motion sensor unavailable: {0}")]
    MotionUnavailable(String),
    #[error("Text recognition error: {0}")]
    Recognition(String),
    #[error("Verification error: {0}")]
    Verification(String),
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Capture flow is closed")]
    FlowClosed,
}

impl CaptureError {
    /// Whether this error must terminate the flow instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CaptureError::SessionFailed(_) | CaptureError::PermissionDenied(_)
        )
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Io(err.to_string())
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::Encoding(err.to_string())
    }
}
