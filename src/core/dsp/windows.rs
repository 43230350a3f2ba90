//! Window function implementations

use std::f32::consts::PI;

/// Window function types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    /// No tapering; keeps absolute phase of every bin interpretable
    Rectangular,
    Hann,
    Hamming,
    Blackman,
}

/// Create a periodic window of `size` coefficients
pub fn create_window(size: usize, window_type: WindowType) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| {
            let x = i as f32;
            match window_type {
                WindowType::Rectangular => 1.0,
                WindowType::Hann => 0.5 * (1.0 - (2.0 * PI * x / n).cos()),
                WindowType::Hamming => 0.54 - 0.46 * (2.0 * PI * x / n).cos(),
                WindowType::Blackman => {
                    0.42 - 0.5 * (2.0 * PI * x / n).cos() + 0.08 * (4.0 * PI * x / n).cos()
                }
            }
        })
        .collect()
}

/// Multiply `samples` by `window`, zero-filling past the shorter of the two
pub fn apply_window(samples: &[f32], window: &[f32]) -> Vec<f32> {
    window
        .iter()
        .enumerate()
        .map(|(i, &w)| samples.get(i).map_or(0.0, |&s| s * w))
        .collect()
}
