use std::time::Duration;

/// Errors surfaced by the capture and spectrum paths.
///
/// All of these are reported as values; none of them poisons the session,
/// so the next poll can retry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CaptureError {
    #[error("Input device {device} unavailable: {reason}")]
    DeviceUnavailable { device: usize, reason: String },

    #[error("Invalid band count {bins} for {half} usable FFT bins")]
    InvalidBandCount { bins: i64, half: usize },

    #[error("Timed out opening input device {device} after {after:?}")]
    Timeout { device: usize, after: Duration },
}

impl CaptureError {
    /// True for failures that came from the device rather than the request.
    pub fn is_device_failure(&self) -> bool {
        matches!(
            self,
            CaptureError::DeviceUnavailable { .. } | CaptureError::Timeout { .. }
        )
    }
}
