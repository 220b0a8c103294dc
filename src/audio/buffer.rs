//! Latest captured frame, shared between the capture thread and the poller.

use parking_lot::Mutex;
use std::sync::Arc;

/// One captured chunk of mono samples in [-1.0, 1.0].
///
/// Frames are never mutated after they are built; a write installs a new one.
#[derive(Clone, Debug, Default)]
pub struct AudioFrame {
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    /// Increments on every write, 0 for the empty frame
    pub sequence: u64,
}

impl AudioFrame {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn to_f64(&self) -> Vec<f64> {
        self.samples.iter().map(|&s| s as f64).collect()
    }
}

/// Holds the most recent frame.
///
/// The lock only guards an `Arc` swap or clone, so neither side can hold it
/// for longer than a pointer copy and a reader never sees half a frame.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    current: Mutex<AudioFrame>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame with `samples`.
    pub fn write(&self, samples: Vec<f32>, sample_rate: u32) {
        let samples: Arc<[f32]> = samples.into();
        let mut current = self.current.lock();
        let sequence = current.sequence + 1;
        *current = AudioFrame {
            samples,
            sample_rate,
            sequence,
        };
    }

    /// Independent handle to the current frame (empty if nothing captured).
    pub fn snapshot(&self) -> AudioFrame {
        self.current.lock().clone()
    }

    pub fn clear(&self) {
        let mut current = self.current.lock();
        *current = AudioFrame {
            samples: Arc::from(Vec::new()),
            sample_rate: current.sample_rate,
            sequence: current.sequence,
        };
    }

    pub fn is_empty(&self) -> bool {
        self.current.lock().is_empty()
    }
}
