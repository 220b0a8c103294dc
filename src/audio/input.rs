//! Live microphone capture using cpal
//!
//! cpal streams are not `Send`, so each stream is built, played and dropped
//! on its own capture thread. The poll side only ever touches the
//! [`SampleBuffer`] and the thread's command channel.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{
    BufferSize, FromSample, Sample, SampleFormat, SizedSample, StreamConfig, SupportedBufferSize,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::buffer::SampleBuffer;
use super::capture::{ActiveStream, CaptureCommand, CaptureThread, InputBackend};
use super::decode::downmix_to_mono;
use super::device::{get_input_device, list_input_devices, DeviceCatalog, DeviceInfo};
use crate::error::CaptureError;

#[derive(Clone, Copy, Debug)]
pub struct InputSettings {
    pub sample_rate: u32,
    /// Target length of each delivered chunk
    pub buffer_ms: u32,
    pub open_timeout: Duration,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            buffer_ms: 50,
            open_timeout: Duration::from_millis(2000),
        }
    }
}

impl InputSettings {
    pub fn frames_per_buffer(&self) -> u32 {
        (self.sample_rate as u64 * self.buffer_ms as u64 / 1000) as u32
    }
}

/// Opens input devices of the default cpal host.
#[derive(Debug, Default)]
pub struct CpalBackend {
    settings: InputSettings,
    gate: OpenGate,
}

impl CpalBackend {
    pub fn new(settings: InputSettings) -> Self {
        Self {
            settings,
            gate: OpenGate::default(),
        }
    }
}

impl DeviceCatalog for CpalBackend {
    fn list_devices(&self) -> Vec<DeviceInfo> {
        list_input_devices().unwrap_or_else(|err| {
            log::warn!("{}", err);
            Vec::new()
        })
    }
}

impl InputBackend for CpalBackend {
    fn open(
        &self,
        device: usize,
        sink: Arc<SampleBuffer>,
    ) -> Result<Box<dyn ActiveStream>, CaptureError> {
        let settings = self.settings;
        self.gate.open(device, settings.open_timeout, sink, move |sink, cancelled| {
            open_stream(device, &settings, sink, cancelled)
        })
    }
}

/// Worker that timed out during open and may still be inside the driver.
#[derive(Debug)]
struct StalledOpen {
    device: usize,
    thread: JoinHandle<()>,
    /// Disconnects when the worker exits, whether it returned or panicked
    exited: Receiver<()>,
}

/// Runs device opens on worker threads, one at a time.
///
/// A worker that misses the open deadline is remembered. No new worker is
/// spawned until that one has exited, so a retry cannot register on the
/// hardware while the previous open is still in flight.
#[derive(Debug, Default)]
pub(crate) struct OpenGate {
    stalled: Mutex<Option<StalledOpen>>,
}

impl OpenGate {
    /// Open a stream with `opener` on a new worker thread.
    ///
    /// `opener` gets the sink and the cancel flag; whatever it returns is
    /// kept alive on the worker and dropped there once the stream is closed.
    pub(crate) fn open<G, F>(
        &self,
        device: usize,
        timeout: Duration,
        sink: Arc<SampleBuffer>,
        opener: F,
    ) -> Result<Box<dyn ActiveStream>, CaptureError>
    where
        G: 'static,
        F: FnOnce(Arc<SampleBuffer>, Arc<AtomicBool>) -> Result<G, CaptureError>
            + Send
            + 'static,
    {
        let mut stalled = self.stalled.lock();
        if let Some(previous) = stalled.take() {
            match previous.exited.recv_timeout(timeout) {
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!(
                        "Open of device {} still in progress, not opening device {}",
                        previous.device,
                        device
                    );
                    *stalled = Some(previous);
                    return Err(CaptureError::Timeout {
                        device,
                        after: timeout,
                    });
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    let _ = previous.thread.join();
                }
            }
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (command_tx, command_rx) = mpsc::channel();
        let (exited_tx, exited_rx) = mpsc::channel();

        let thread_cancelled = Arc::clone(&cancelled);
        let thread = thread::Builder::new()
            .name(format!("capture-{}", device))
            .spawn(move || {
                run_capture_thread(
                    opener,
                    sink,
                    thread_cancelled,
                    ready_tx,
                    command_rx,
                    exited_tx,
                )
            })
            .map_err(|e| CaptureError::DeviceUnavailable {
                device,
                reason: format!("Failed to spawn capture thread: {}", e),
            })?;

        match ready_rx.recv_timeout(timeout) {
            Ok(Ok(())) => Ok(Box::new(CaptureThread {
                label: format!("input device {}", device),
                cancelled,
                command_tx,
                thread,
            })),
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(RecvTimeoutError::Timeout) => {
                // Stop is queued for when the open returns; until then it must not write
                cancelled.store(true, Ordering::Release);
                let _ = command_tx.send(CaptureCommand::Stop);
                log::warn!("Open of device {} timed out after {:?}", device, timeout);
                *stalled = Some(StalledOpen {
                    device,
                    thread,
                    exited: exited_rx,
                });
                Err(CaptureError::Timeout {
                    device,
                    after: timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = thread.join();
                Err(CaptureError::DeviceUnavailable {
                    device,
                    reason: "capture thread exited during open".to_string(),
                })
            }
        }
    }
}

fn run_capture_thread<G, F>(
    opener: F,
    sink: Arc<SampleBuffer>,
    cancelled: Arc<AtomicBool>,
    ready_tx: SyncSender<Result<(), CaptureError>>,
    command_rx: Receiver<CaptureCommand>,
    _exited: Sender<()>,
) where
    F: FnOnce(Arc<SampleBuffer>, Arc<AtomicBool>) -> Result<G, CaptureError>,
{
    let stream = match opener(sink, cancelled) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready_tx.send(Err(err));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    // Block until told to stop or the owner disappears
    let _ = command_rx.recv();

    // Stream is dropped here, on the thread that built it
    drop(stream);
}

fn open_stream(
    device: usize,
    settings: &InputSettings,
    sink: Arc<SampleBuffer>,
    cancelled: Arc<AtomicBool>,
) -> Result<cpal::Stream, CaptureError> {
    let unavailable = |reason: String| CaptureError::DeviceUnavailable { device, reason };

    let input = get_input_device(device).map_err(unavailable)?;
    let (config, format) = choose_input_config(&input, settings).map_err(unavailable)?;

    log::info!(
        "Input stream config: {} Hz, {} channels, {:?}, buffer {:?}",
        config.sample_rate.0,
        config.channels,
        format,
        config.buffer_size
    );

    let stream = match format {
        SampleFormat::I16 => build_stream::<i16>(&input, &config, sink, cancelled),
        SampleFormat::U16 => build_stream::<u16>(&input, &config, sink, cancelled),
        SampleFormat::I32 => build_stream::<i32>(&input, &config, sink, cancelled),
        SampleFormat::F32 => build_stream::<f32>(&input, &config, sink, cancelled),
        other => return Err(unavailable(format!("Unsupported sample format: {:?}", other))),
    }
    .map_err(|e| unavailable(format!("Failed to build input stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| unavailable(format!("Failed to start input stream: {}", e)))?;

    Ok(stream)
}

/// Rank formats so 16-bit integer input wins, then float.
fn format_rank(format: SampleFormat) -> u8 {
    match format {
        SampleFormat::I16 => 0,
        SampleFormat::F32 => 1,
        SampleFormat::I32 => 2,
        SampleFormat::U16 => 3,
        _ => 4,
    }
}

/// Fewest channels at the target rate, falling back to the device default.
fn choose_input_config(
    device: &cpal::Device,
    settings: &InputSettings,
) -> Result<(StreamConfig, SampleFormat), String> {
    let target = cpal::SampleRate(settings.sample_rate);
    let frames = settings.frames_per_buffer();

    let best = device
        .supported_input_configs()
        .map_err(|e| format!("Failed to get supported input configs: {}", e))?
        .filter(|range| range.min_sample_rate() <= target && target <= range.max_sample_rate())
        .filter(|range| format_rank(range.sample_format()) < 4)
        .min_by_key(|range| (range.channels(), format_rank(range.sample_format())));

    if let Some(range) = best {
        let buffer_size = match range.buffer_size() {
            SupportedBufferSize::Range { min, max } if frames >= *min && frames <= *max => {
                BufferSize::Fixed(frames)
            }
            _ => BufferSize::Default,
        };
        let supported = range.with_sample_rate(target);
        return Ok((
            StreamConfig {
                channels: supported.channels(),
                sample_rate: target,
                buffer_size,
            },
            supported.sample_format(),
        ));
    }

    let default_config = device
        .default_input_config()
        .map_err(|e| format!("Failed to get default input config: {}", e))?;
    log::warn!(
        "Device does not support {} Hz, using {} Hz",
        settings.sample_rate,
        default_config.sample_rate().0
    );

    Ok((
        StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: BufferSize::Default,
        },
        default_config.sample_format(),
    ))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    sink: Arc<SampleBuffer>,
    cancelled: Arc<AtomicBool>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    let sample_rate = config.sample_rate.0;

    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            if cancelled.load(Ordering::Acquire) {
                return;
            }
            let samples: Vec<f32> = data.iter().map(|&s| f32::from_sample(s)).collect();
            let mono = if channels > 1 {
                downmix_to_mono(&samples, channels)
            } else {
                samples
            };
            sink.write(mono, sample_rate);
        },
        |err| log::error!("Input stream error: {}", err),
        None,
    )
}
