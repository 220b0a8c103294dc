//! File replay as a stand-in input device.
//!
//! Delivers a decoded file in fixed-length chunks at real-time pace,
//! looping at the end, so the whole pipeline runs without a microphone.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::buffer::SampleBuffer;
use super::capture::{ActiveStream, CaptureCommand, CaptureThread, InputBackend};
use super::decode::{decode_file, DecodedAudio};
use super::device::{DeviceCatalog, DeviceInfo};
use crate::error::CaptureError;

pub struct FileBackend {
    name: String,
    samples: Arc<[f32]>,
    sample_rate: u32,
    chunk_ms: u32,
}

impl FileBackend {
    pub fn open_file(path: &Path, chunk_ms: u32) -> Result<Self> {
        let audio = decode_file(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .context("Input path has no file name")?
            .to_string();
        Ok(Self::from_audio(name, audio, chunk_ms))
    }

    pub fn from_audio(name: String, audio: DecodedAudio, chunk_ms: u32) -> Self {
        Self {
            name,
            samples: audio.samples.into(),
            sample_rate: audio.sample_rate,
            chunk_ms: chunk_ms.max(1),
        }
    }

    fn chunk_len(&self) -> usize {
        ((self.sample_rate as u64 * self.chunk_ms as u64 / 1000) as usize).max(1)
    }
}

impl DeviceCatalog for FileBackend {
    fn list_devices(&self) -> Vec<DeviceInfo> {
        vec![DeviceInfo {
            index: 0,
            name: format!("file: {}", self.name),
            is_default: true,
        }]
    }
}

impl InputBackend for FileBackend {
    fn open(
        &self,
        device: usize,
        sink: Arc<SampleBuffer>,
    ) -> Result<Box<dyn ActiveStream>, CaptureError> {
        if self.samples.is_empty() {
            return Err(CaptureError::DeviceUnavailable {
                device,
                reason: format!("{} contains no audio", self.name),
            });
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let (command_tx, command_rx) = mpsc::channel();
        let replay = Replay {
            samples: Arc::clone(&self.samples),
            sample_rate: self.sample_rate,
            chunk_len: self.chunk_len(),
            interval: Duration::from_millis(self.chunk_ms as u64),
        };

        let thread_cancelled = Arc::clone(&cancelled);
        let thread = thread::Builder::new()
            .name("replay".to_string())
            .spawn(move || replay.run(sink, thread_cancelled, command_rx))
            .map_err(|e| CaptureError::DeviceUnavailable {
                device,
                reason: format!("Failed to spawn replay thread: {}", e),
            })?;

        log::info!("Replaying {} at {} Hz", self.name, self.sample_rate);
        Ok(Box::new(CaptureThread {
            label: self.name.clone(),
            cancelled,
            command_tx,
            thread,
        }))
    }
}

struct Replay {
    samples: Arc<[f32]>,
    sample_rate: u32,
    chunk_len: usize,
    interval: Duration,
}

impl Replay {
    /// Chunk starting at `pos`, wrapping around the end of the file.
    fn chunk_at(&self, pos: usize) -> Vec<f32> {
        self.samples
            .iter()
            .cycle()
            .skip(pos % self.samples.len())
            .take(self.chunk_len)
            .copied()
            .collect()
    }

    fn run(
        self,
        sink: Arc<SampleBuffer>,
        cancelled: Arc<AtomicBool>,
        command_rx: Receiver<CaptureCommand>,
    ) {
        let mut pos = 0;
        loop {
            if cancelled.load(Ordering::Acquire) {
                break;
            }
            sink.write(self.chunk_at(pos), self.sample_rate);
            pos = (pos + self.chunk_len) % self.samples.len();

            match command_rx.recv_timeout(self.interval) {
                Ok(CaptureCommand::Stop) => break,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}
