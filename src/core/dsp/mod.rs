//! Digital Signal Processing utilities shared by the analyzers

pub mod fft;
pub mod special;
pub mod stats;
pub mod windows;

pub use fft::{frame_starts, Autocorrelator, FftProcessor};
pub use special::{chi_square_cdf, chi_square_sf, gamma_p, gamma_q, ln_gamma, normal_isf, normal_sf};
pub use stats::{linear_fit, mad, mean, median, std_dev, unwrap_phase, wrap_phase, LinearFit, SplitMix64};
pub use windows::{apply_window, create_window, WindowType};
