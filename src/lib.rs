//! Live microphone spectrum: a capture thread keeps the latest audio frame in a
//! shared buffer and a host polls for band magnitudes whenever it wants them.

pub mod audio;
pub mod controller;
pub mod error;
pub mod spectrum;

pub use audio::buffer::{AudioFrame, SampleBuffer};
pub use audio::capture::{CaptureSource, InputBackend};
pub use audio::device::DeviceInfo;
pub use controller::{
    Diagnostic, DiagnosticLevel, PollOutcome, PollReport, PollRequest, SessionController,
    SessionState,
};
pub use error::CaptureError;
pub use spectrum::SpectrumResult;
