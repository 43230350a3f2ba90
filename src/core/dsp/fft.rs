//! FFT processing with windowing

use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::windows::{apply_window, create_window, WindowType};
use crate::error::{DetectionError, Result};

/// Start offsets of every full frame of `frame_len` samples advancing by `hop`
pub fn frame_starts(len: usize, frame_len: usize, hop: usize) -> impl Iterator<Item = usize> {
    let count = if frame_len == 0 || hop == 0 || len < frame_len {
        0
    } else {
        (len - frame_len) / hop + 1
    };
    (0..count).map(move |i| i * hop)
}

/// Windowed complex FFT of fixed size
pub struct FftProcessor {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    fft_size: usize,
}

impl FftProcessor {
    pub fn new(fft_size: usize, window_type: WindowType) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(fft_size),
            window: create_window(fft_size, window_type),
            fft_size,
        }
    }

    /// Complex spectrum, bins 0..N/2 (zero-pads short input)
    pub fn complex_spectrum(&self, samples: &[f32]) -> Vec<Complex<f32>> {
        let mut buffer: Vec<Complex<f32>> = apply_window(samples, &self.window)
            .into_iter()
            .map(|s| Complex::new(s, 0.0))
            .collect();

        self.fft.process(&mut buffer);
        buffer.truncate(self.fft_size / 2);
        buffer
    }

    /// Compute magnitude spectrum
    pub fn magnitude_spectrum(&self, samples: &[f32]) -> Vec<f32> {
        self.complex_spectrum(samples).iter().map(|c| c.norm()).collect()
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }
}

/// Generalized autocorrelation: inverse FFT of the magnitude-compressed
/// power spectrum. Compression (< 1) whitens the spectrum so discrete
/// echoes show up as sharp lags instead of being buried by the signal's
/// own spectral envelope.
pub struct Autocorrelator {
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    window: Vec<f32>,
    len: usize,
    exponent: f32,
}

impl Autocorrelator {
    /// `len` input samples, zero-padded to `2 * len` to avoid circular wrap
    pub fn new(len: usize, compression: f64, window_type: WindowType) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let padded = len * 2;
        Self {
            forward: planner.plan_fft_forward(padded),
            inverse: planner.plan_fft_inverse(padded),
            window: create_window(len, window_type),
            len,
            exponent: compression as f32,
        }
    }

    /// Lags 0..len, normalized so lag 0 equals 1. Silent input yields zeros.
    pub fn compute(&self, samples: &[f32]) -> Result<Vec<f32>> {
        let mut input = self.forward.make_input_vec();
        for (slot, value) in input.iter_mut().zip(apply_window(samples, &self.window)) {
            *slot = value;
        }
        let mut spectrum = self.forward.make_output_vec();
        self.forward
            .process(&mut input, &mut spectrum)
            .map_err(|e| DetectionError::CorruptMedia(format!("forward FFT failed: {}", e)))?;

        for bin in spectrum.iter_mut() {
            *bin = Complex::new(bin.norm_sqr().powf(self.exponent), 0.0);
        }

        let mut output = self.inverse.make_output_vec();
        self.inverse
            .process(&mut spectrum, &mut output)
            .map_err(|e| DetectionError::CorruptMedia(format!("inverse FFT failed: {}", e)))?;

        output.truncate(self.len);
        let zero_lag = output.first().copied().unwrap_or(0.0);
        if zero_lag <= f32::EPSILON {
            return Ok(vec![0.0; self.len]);
        }
        for value in output.iter_mut() {
            *value /= zero_lag;
        }
        Ok(output)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_frame_starts() {
        let starts: Vec<usize> = frame_starts(10, 4, 2).collect();
        assert_eq!(starts, vec![0, 2, 4, 6]);
        assert_eq!(frame_starts(3, 4, 2).count(), 0);
    }

    #[test]
    fn test_spectrum_peak_bin() {
        let n = 256;
        let samples: Vec<f32> = (0..n).map(|i| (2.0 * PI * 8.0 * i as f32 / n as f32).sin()).collect();
        let processor = FftProcessor::new(n, WindowType::Rectangular);
        let mags = processor.magnitude_spectrum(&samples);
        let peak = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(8));
    }

    #[test]
    fn test_autocorrelation_finds_echo_lag() {
        let mut state = 0x1234_5678u32;
        let mut noise: Vec<f32> = (0..1024)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) - 0.5
            })
            .collect();
        for i in (40..noise.len()).rev() {
            noise[i] += 0.6 * noise[i - 40];
        }

        let ac = Autocorrelator::new(1024, 0.3, WindowType::Hann).compute(&noise).unwrap();
        assert!((ac[0] - 1.0).abs() < 1e-4);
        let peak = (10..200).max_by(|&a, &b| ac[a].total_cmp(&ac[b]));
        assert_eq!(peak, Some(40));
    }

    #[test]
    fn test_autocorrelation_of_silence() {
        let ac = Autocorrelator::new(64, 0.3, WindowType::Hann).compute(&[0.0; 64]).unwrap();
        assert!(ac.iter().all(|&v| v == 0.0));
    }
}
