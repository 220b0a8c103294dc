//! Band spectrum of a single audio frame.
//!
//! The frame is zero-padded to a power of two and transformed with an
//! iterative radix-2 FFT. No window is applied, so a tone that does not land
//! exactly on a bin leaks into its neighbours. Only the non-negative
//! frequency half is kept and it is split into `bins` equal-width bands.

use rustfft::num_complex::Complex;
use serde::Serialize;
use std::f64::consts::PI;

use crate::error::CaptureError;

/// Per-band magnitudes and their centre frequencies, in matching order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SpectrumResult {
    pub magnitudes: Vec<f64>,
    /// Centre of each band in Hz, non-decreasing
    pub frequencies: Vec<f64>,
}

impl SpectrumResult {
    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    /// `(frequency, magnitude)` of the loudest band.
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.magnitudes
            .iter()
            .zip(self.frequencies.iter())
            .fold(None, |best: Option<(f64, f64)>, (&mag, &freq)| match best {
                Some((_, best_mag)) if best_mag >= mag => best,
                _ => Some((freq, mag)),
            })
    }
}

/// Smallest power of two that holds `len` samples, never less than 1.
pub fn next_power_of_two(len: usize) -> usize {
    let mut n = 1;
    while n < len {
        n <<= 1;
    }
    n
}

/// In-place forward FFT. `buf.len()` must be a power of two.
pub fn fft_in_place(buf: &mut [Complex<f64>]) {
    let n = buf.len();
    debug_assert!(n.is_power_of_two(), "FFT length {} is not a power of two", n);

    // Bit-reversal permutation
    let mut j = 0;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;
        if i < j {
            buf.swap(i, j);
        }
    }

    // Butterfly stages
    let mut len = 2;
    while len <= n {
        let half = len / 2;
        let angle = -2.0 * PI / len as f64;
        for start in (0..n).step_by(len) {
            for k in 0..half {
                let w = Complex::from_polar(1.0, angle * k as f64);
                let u = buf[start + k];
                let v = buf[start + k + half] * w;
                buf[start + k] = u + v;
                buf[start + k + half] = u - v;
            }
        }
        len <<= 1;
    }
}

/// Compute `bins` band magnitudes of `samples` captured at `sample_rate` Hz.
///
/// The positive half of the spectrum is cut into bands of
/// `half / bins` FFT bins each; any remainder past `bins * step` is dropped.
/// Each band reports the mean bin magnitude and the midpoint of its
/// frequency range. Frames of zero or one sample have no positive half;
/// every band then carries the DC magnitude at 0 Hz.
pub fn compute(
    samples: &[f64],
    sample_rate: f64,
    bins: usize,
) -> Result<SpectrumResult, CaptureError> {
    let n = next_power_of_two(samples.len());
    let half = n / 2;
    if bins == 0 || (half > 0 && bins > half) {
        return Err(CaptureError::InvalidBandCount {
            bins: bins as i64,
            half,
        });
    }

    if half == 0 {
        // Zero or one sample: the lone DC bin, repeated across every band
        let dc = samples.first().map_or(0.0, |s| s.abs());
        return Ok(SpectrumResult {
            magnitudes: vec![dc; bins],
            frequencies: vec![0.0; bins],
        });
    }

    let mut buf: Vec<Complex<f64>> = samples.iter().map(|&s| Complex::new(s, 0.0)).collect();
    buf.resize(n, Complex::new(0.0, 0.0));
    fft_in_place(&mut buf);

    let step = half / bins;
    let bin_hz = sample_rate / n as f64;
    let mut magnitudes = Vec::with_capacity(bins);
    let mut frequencies = Vec::with_capacity(bins);

    for band in 0..bins {
        let start = band * step;
        let end = ((band + 1) * step).min(half);

        let sum: f64 = buf[start..end].iter().map(|c| c.norm()).sum();
        magnitudes.push(sum / (end - start) as f64);
        frequencies.push((start as f64 * bin_hz + end as f64 * bin_hz) * 0.5);
    }

    Ok(SpectrumResult {
        magnitudes,
        frequencies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::FftPlanner;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn power_of_two_rounding() {
        assert_eq!(next_power_of_two(0), 1);
        assert_eq!(next_power_of_two(1), 1);
        assert_eq!(next_power_of_two(5), 8);
        assert_eq!(next_power_of_two(8), 8);
        assert_eq!(next_power_of_two(2205), 4096);
    }

    #[test]
    fn fft_matches_rustfft() {
        let input: Vec<Complex<f64>> = (0..64)
            .map(|i| {
                let t = i as f64;
                Complex::new((t * 0.3).sin() + 0.5 * (t * 1.7).cos(), 0.0)
            })
            .collect();

        let mut ours = input.clone();
        fft_in_place(&mut ours);

        let mut reference = input;
        FftPlanner::<f64>::new()
            .plan_fft_forward(reference.len())
            .process(&mut reference);

        for (a, b) in ours.iter().zip(reference.iter()) {
            assert!((a - b).norm() < 1e-9, "{} != {}", a, b);
        }
    }

    #[test]
    fn alternating_signal_lands_in_upper_band() {
        let samples = [1.0, 0.0, -1.0, 0.0, 1.0, 0.0, -1.0, 0.0];
        let result = compute(&samples, 8.0, 2).unwrap();

        assert_eq!(result.len(), 2);
        assert!(close(result.frequencies[0], 1.0));
        assert!(close(result.frequencies[1], 3.0));
        // Bin 2 carries magnitude 4, so band [2, 4) averages to 2
        assert!(close(result.magnitudes[0], 0.0));
        assert!(close(result.magnitudes[1], 2.0));
        assert!(result.magnitudes[1] > result.magnitudes[0]);
    }

    #[test]
    fn silence_gives_zero_bands() {
        for len in [2usize, 7, 64, 300, 2205] {
            let samples = vec![0.0; len];
            let bins = (next_power_of_two(len) / 2).min(16);
            let result = compute(&samples, 44100.0, bins).unwrap();
            assert_eq!(result.len(), bins);
            assert!(result.magnitudes.iter().all(|&m| m == 0.0));
        }
    }

    #[test]
    fn band_shape_holds_for_uneven_split() {
        // 300 samples pad to 512, half = 256, 24 bands of 10 bins, 16 dropped
        let samples: Vec<f64> = (0..300).map(|i| ((i * 37) % 11) as f64 / 11.0 - 0.5).collect();
        let result = compute(&samples, 44100.0, 24).unwrap();

        assert_eq!(result.magnitudes.len(), 24);
        assert_eq!(result.frequencies.len(), 24);
        assert!(result.magnitudes.iter().all(|&m| m >= 0.0));
        assert!(result.frequencies.windows(2).all(|w| w[0] <= w[1]));
        assert!(result.frequencies.iter().all(|&f| f >= 0.0));

        let last_end_hz = 240.0 * 44100.0 / 512.0;
        let last_start_hz = 230.0 * 44100.0 / 512.0;
        assert!(close(result.frequencies[23], (last_start_hz + last_end_hz) / 2.0));
    }

    #[test]
    fn too_many_bands_is_rejected() {
        let samples = [0.5; 8];
        assert_eq!(
            compute(&samples, 8.0, 5),
            Err(CaptureError::InvalidBandCount { bins: 5, half: 4 })
        );
        assert_eq!(
            compute(&samples, 8.0, 0),
            Err(CaptureError::InvalidBandCount { bins: 0, half: 4 })
        );
    }

    #[test]
    fn empty_frame_is_a_zero_spectrum() {
        let result = compute(&[], 44100.0, 4).unwrap();
        assert_eq!(result.magnitudes, vec![0.0; 4]);
        assert_eq!(result.frequencies, vec![0.0; 4]);
        assert_eq!(
            compute(&[], 44100.0, 0),
            Err(CaptureError::InvalidBandCount { bins: 0, half: 0 })
        );
    }

    #[test]
    fn single_sample_is_its_dc_magnitude() {
        let result = compute(&[0.5], 44100.0, 1).unwrap();
        assert_eq!(result.magnitudes, vec![0.5]);
        assert_eq!(result.frequencies, vec![0.0]);

        // Same shape as the empty frame, whatever the band count
        let result = compute(&[-0.25], 44100.0, 3).unwrap();
        assert_eq!(result.magnitudes, vec![0.25; 3]);
        assert_eq!(result.frequencies, vec![0.0; 3]);
        assert_eq!(
            compute(&[0.5], 44100.0, 0),
            Err(CaptureError::InvalidBandCount { bins: 0, half: 0 })
        );
    }

    #[test]
    fn tone_peaks_near_its_frequency() {
        let sr = 44100.0;
        let samples: Vec<f64> = (0..2048)
            .map(|i| (2.0 * PI * 1000.0 * i as f64 / sr).sin())
            .collect();
        let result = compute(&samples, sr, 64).unwrap();
        let (freq, _) = result.peak().unwrap();
        // 64 bands of 16 bins, about 172 Hz wide
        assert!((freq - 1000.0).abs() < 172.0, "peak at {} Hz", freq);
    }
}
