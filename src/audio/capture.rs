//! Capture Source: at most one running input stream feeding a [`SampleBuffer`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;

use super::buffer::SampleBuffer;
use super::device::{clamp_device_index, DeviceCatalog, DeviceInfo};
use crate::error::CaptureError;

/// Platform seam that knows how to open an input device.
pub trait InputBackend: DeviceCatalog + Send {
    /// Start delivering frames from `device` into `sink`.
    fn open(&self, device: usize, sink: Arc<SampleBuffer>)
        -> Result<Box<dyn ActiveStream>, CaptureError>;
}

/// A running stream. Dropping it without `close` leaks nothing but gives no
/// ordering guarantee; always close.
pub trait ActiveStream: Send {
    /// Stop the stream. Once this returns the sink receives no more writes.
    fn close(self: Box<Self>);
}

pub enum CaptureCommand {
    Stop,
}

/// Stream driven by a dedicated worker thread.
///
/// Workers must check `cancelled` before each write and exit once they
/// receive [`CaptureCommand::Stop`] or the sender disconnects.
pub struct CaptureThread {
    pub label: String,
    pub cancelled: Arc<AtomicBool>,
    pub command_tx: Sender<CaptureCommand>,
    pub thread: JoinHandle<()>,
}

impl ActiveStream for CaptureThread {
    fn close(self: Box<Self>) {
        let CaptureThread {
            label,
            cancelled,
            command_tx,
            thread,
        } = *self;
        cancelled.store(true, Ordering::Release);
        // The worker may already be gone
        let _ = command_tx.send(CaptureCommand::Stop);
        if thread.join().is_err() {
            log::error!("Capture thread for {} panicked", label);
        }
    }
}

pub enum StartOutcome {
    /// The requested device was already running; nothing changed.
    AlreadyRunning(usize),
    Started {
        device: DeviceInfo,
        devices: Vec<DeviceInfo>,
    },
}

struct Running {
    device: usize,
    stream: Box<dyn ActiveStream>,
}

pub struct CaptureSource<B: InputBackend> {
    backend: B,
    buffer: Arc<SampleBuffer>,
    running: Option<Running>,
}

impl<B: InputBackend> CaptureSource<B> {
    pub fn new(backend: B, buffer: Arc<SampleBuffer>) -> Self {
        Self {
            backend,
            buffer,
            running: None,
        }
    }

    /// Ensure `requested` (clamped to an existing device) is the one capturing.
    ///
    /// A different running device is fully closed before the new one opens.
    /// On failure the source is left stopped with an empty buffer.
    pub fn start(&mut self, requested: i64) -> Result<StartOutcome, CaptureError> {
        let devices = self.backend.list_devices();
        let device = match clamp_device_index(requested, devices.len()) {
            Some(device) => device,
            None => {
                self.stop();
                return Err(CaptureError::DeviceUnavailable {
                    device: requested.max(0) as usize,
                    reason: "no input devices found".to_string(),
                });
            }
        };

        if self.running_device() == Some(device) {
            return Ok(StartOutcome::AlreadyRunning(device));
        }

        self.stop();

        let info = devices
            .iter()
            .find(|d| d.index == device)
            .cloned()
            .unwrap_or_else(|| DeviceInfo {
                index: device,
                name: format!("device {}", device),
                is_default: false,
            });

        log::info!("Starting capture on device {}: {}", device, info.name);
        match self.backend.open(device, Arc::clone(&self.buffer)) {
            Ok(stream) => {
                self.running = Some(Running { device, stream });
                Ok(StartOutcome::Started {
                    device: info,
                    devices,
                })
            }
            Err(err) => {
                log::warn!("Failed to start capture: {}", err);
                self.buffer.clear();
                Err(err)
            }
        }
    }

    /// Close the running stream, if any, and empty the buffer.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.stream.close();
            log::info!("Capture stopped on device {}", running.device);
        }
        self.buffer.clear();
    }

    pub fn running_device(&self) -> Option<usize> {
        self.running.as_ref().map(|r| r.device)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }

    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        self.backend.list_devices()
    }
}

impl<B: InputBackend> Drop for CaptureSource<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Recording backend for tests. Panics if two streams are ever open at once.
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Event {
        Open(usize),
        Close(usize),
    }

    #[derive(Clone, Default)]
    pub struct MockBackend {
        pub device_count: usize,
        /// Written into the sink as soon as a stream opens
        pub frame: Option<Vec<f32>>,
        pub failing: Vec<usize>,
        pub events: Arc<Mutex<Vec<Event>>>,
        pub open_streams: Arc<AtomicUsize>,
    }

    impl MockBackend {
        pub fn with_devices(device_count: usize) -> Self {
            Self {
                device_count,
                ..Default::default()
            }
        }

        pub fn with_frame(mut self, frame: Vec<f32>) -> Self {
            self.frame = Some(frame);
            self
        }

        pub fn events(&self) -> Vec<Event> {
            self.events.lock().clone()
        }
    }

    impl DeviceCatalog for MockBackend {
        fn list_devices(&self) -> Vec<DeviceInfo> {
            (0..self.device_count)
                .map(|index| DeviceInfo {
                    index,
                    name: format!("Mock Mic {}", index),
                    is_default: index == 0,
                })
                .collect()
        }
    }

    impl InputBackend for MockBackend {
        fn open(
            &self,
            device: usize,
            sink: Arc<SampleBuffer>,
        ) -> Result<Box<dyn ActiveStream>, CaptureError> {
            if self.failing.contains(&device) {
                return Err(CaptureError::DeviceUnavailable {
                    device,
                    reason: "device busy".to_string(),
                });
            }
            let previously_open = self.open_streams.fetch_add(1, Ordering::SeqCst);
            assert_eq!(
                previously_open, 0,
                "opened device {} while another stream was live",
                device
            );
            self.events.lock().push(Event::Open(device));

            if let Some(ref frame) = self.frame {
                sink.write(frame.clone(), 44100);
            }

            Ok(Box::new(MockStream {
                device,
                events: Arc::clone(&self.events),
                open_streams: Arc::clone(&self.open_streams),
            }))
        }
    }

    struct MockStream {
        device: usize,
        events: Arc<Mutex<Vec<Event>>>,
        open_streams: Arc<AtomicUsize>,
    }

    impl ActiveStream for MockStream {
        fn close(self: Box<Self>) {
            self.events.lock().push(Event::Close(self.device));
            self.open_streams.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{Event, MockBackend};
    use super::*;

    fn source(backend: MockBackend) -> CaptureSource<MockBackend> {
        CaptureSource::new(backend, Arc::new(SampleBuffer::new()))
    }

    #[test]
    fn same_device_start_is_a_no_op() {
        let backend = MockBackend::with_devices(2);
        let mut capture = source(backend.clone());

        assert!(matches!(capture.start(1), Ok(StartOutcome::Started { .. })));
        assert!(matches!(capture.start(1), Ok(StartOutcome::AlreadyRunning(1))));
        assert_eq!(backend.events(), vec![Event::Open(1)]);
    }

    #[test]
    fn switching_devices_closes_first() {
        let backend = MockBackend::with_devices(3);
        let mut capture = source(backend.clone());

        capture.start(0).unwrap();
        capture.start(2).unwrap();
        assert_eq!(capture.running_device(), Some(2));
        assert_eq!(
            backend.events(),
            vec![Event::Open(0), Event::Close(0), Event::Open(2)]
        );
    }

    #[test]
    fn out_of_range_device_uses_device_zero() {
        let backend = MockBackend::with_devices(2);
        let mut capture = source(backend.clone());

        capture.start(7).unwrap();
        assert_eq!(capture.running_device(), Some(0));
        // Already on the clamped device
        assert!(matches!(capture.start(-3), Ok(StartOutcome::AlreadyRunning(0))));
    }

    #[test]
    fn no_devices_is_unavailable() {
        let mut capture = source(MockBackend::with_devices(0));
        assert!(matches!(
            capture.start(0),
            Err(CaptureError::DeviceUnavailable { device: 0, .. })
        ));
        assert!(!capture.is_running());
    }

    #[test]
    fn failed_open_leaves_source_stopped_and_empty() {
        let mut backend = MockBackend::with_devices(2).with_frame(vec![0.5; 16]);
        backend.failing = vec![1];
        let mut capture = source(backend.clone());

        capture.start(0).unwrap();
        assert!(!capture.buffer().is_empty());

        assert!(capture.start(1).is_err());
        assert!(!capture.is_running());
        assert!(capture.buffer().is_empty());
        assert_eq!(backend.events(), vec![Event::Open(0), Event::Close(0)]);
    }

    #[test]
    fn stop_is_idempotent_and_clears() {
        let backend = MockBackend::with_devices(1).with_frame(vec![0.5; 16]);
        let mut capture = source(backend.clone());

        capture.start(0).unwrap();
        capture.stop();
        capture.stop();
        assert!(capture.buffer().is_empty());
        assert_eq!(backend.events(), vec![Event::Open(0), Event::Close(0)]);
    }

    #[test]
    fn drop_releases_the_stream() {
        let backend = MockBackend::with_devices(1);
        {
            let mut capture = source(backend.clone());
            capture.start(0).unwrap();
        }
        assert_eq!(backend.events(), vec![Event::Open(0), Event::Close(0)]);
    }
}
