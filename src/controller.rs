//! Session Controller: the host-facing poll entry point.
//!
//! The host calls [`SessionController::poll`] whenever it re-evaluates. The
//! controller starts, switches or stops capture to match the request, then
//! turns the latest captured frame into a band spectrum. It never waits for
//! audio; an empty buffer is reported as [`PollOutcome::Pending`] and the host
//! decides when to poll again.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

use crate::audio::buffer::SampleBuffer;
use crate::audio::capture::{CaptureSource, InputBackend, StartOutcome};
use crate::audio::device::{describe_devices, DeviceInfo};
use crate::error::CaptureError;
use crate::spectrum::{self, SpectrumResult};

pub const DEFAULT_BINS: i64 = 64;
pub const DEFAULT_DEVICE: i64 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollRequest {
    pub enabled: bool,
    pub bins: i64,
    pub device: i64,
}

impl Default for PollRequest {
    fn default() -> Self {
        Self {
            enabled: false,
            bins: DEFAULT_BINS,
            device: DEFAULT_DEVICE,
        }
    }
}

impl PollRequest {
    pub fn enabled(bins: i64, device: i64) -> Self {
        Self {
            enabled: true,
            bins,
            device,
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    Disabled,
    /// Capture is running but no frame has arrived yet
    Pending,
    Ready(SpectrumResult),
    Error(CaptureError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Remark,
    Warning,
    Error,
}

/// Advisory message for whoever displays the outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
}

impl Diagnostic {
    pub fn remark(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Remark,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PollReport {
    pub outcome: PollOutcome,
    pub diagnostics: Vec<Diagnostic>,
}

impl PollReport {
    fn new(outcome: PollOutcome, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            outcome,
            diagnostics,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running(usize),
}

/// Owns one capture source and its sample buffer.
///
/// Start and stop are serialised by `capture`'s lock, which is separate from
/// the sample buffer lock the capture thread writes through. Dropping the
/// controller releases the device.
pub struct SessionController<B: InputBackend> {
    capture: Mutex<CaptureSource<B>>,
    buffer: Arc<SampleBuffer>,
}

impl<B: InputBackend> SessionController<B> {
    pub fn new(backend: B) -> Self {
        let buffer = Arc::new(SampleBuffer::new());
        Self {
            capture: Mutex::new(CaptureSource::new(backend, Arc::clone(&buffer))),
            buffer,
        }
    }

    pub fn poll(&self, request: PollRequest) -> PollReport {
        if !request.enabled {
            self.capture.lock().stop();
            return PollReport::new(PollOutcome::Disabled, Vec::new());
        }

        if request.bins <= 0 {
            let err = CaptureError::InvalidBandCount {
                bins: request.bins,
                half: 0,
            };
            return PollReport::new(
                PollOutcome::Error(err.clone()),
                vec![Diagnostic::error(err.to_string())],
            );
        }

        let mut diagnostics = Vec::new();

        let started = self.capture.lock().start(request.device);
        match started {
            Ok(StartOutcome::Started { device, devices }) => {
                if device.index as i64 != request.device {
                    diagnostics.push(Diagnostic::warning(format!(
                        "Device {} not found, using {}: {}",
                        request.device, device.index, device.name
                    )));
                }
                diagnostics.push(Diagnostic::remark(describe_devices(&devices)));
            }
            Ok(StartOutcome::AlreadyRunning(_)) => {}
            Err(err) => {
                diagnostics.push(Diagnostic::error(format!("Error starting microphone: {}", err)));
                return PollReport::new(PollOutcome::Error(err), diagnostics);
            }
        }

        let frame = self.buffer.snapshot();
        if frame.is_empty() {
            log::debug!("No audio captured yet");
            diagnostics.push(Diagnostic::remark("Waiting for microphone audio..."));
            return PollReport::new(PollOutcome::Pending, diagnostics);
        }

        match spectrum::compute(&frame.to_f64(), frame.sample_rate as f64, request.bins as usize) {
            Ok(result) => PollReport::new(PollOutcome::Ready(result), diagnostics),
            Err(err) => {
                diagnostics.push(Diagnostic::error(err.to_string()));
                PollReport::new(PollOutcome::Error(err), diagnostics)
            }
        }
    }

    /// Stop capture and release the device. Safe to call repeatedly.
    pub fn dispose(&self) {
        self.capture.lock().stop();
    }

    pub fn state(&self) -> SessionState {
        match self.capture.lock().running_device() {
            Some(device) => SessionState::Running(device),
            None => SessionState::Idle,
        }
    }

    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        self.capture.lock().list_devices()
    }

    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }
}
