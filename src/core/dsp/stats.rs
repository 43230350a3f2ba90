//! Descriptive statistics, robust estimators and phase helpers

use std::f64::consts::PI;

pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population standard deviation
pub fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    (data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / data.len() as f64).sqrt()
}

/// Compute median of a slice (sorts in place)
pub fn median(data: &mut [f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    data.sort_by(|a, b| a.total_cmp(b));

    let mid = data.len() / 2;
    if data.len() % 2 == 0 {
        (data[mid - 1] + data[mid]) / 2.0
    } else {
        data[mid]
    }
}

/// Median absolute deviation (unscaled)
pub fn mad(data: &[f64]) -> f64 {
    let mut values = data.to_vec();
    let center = median(&mut values);
    let mut deviations: Vec<f64> = data.iter().map(|x| (x - center).abs()).collect();
    median(&mut deviations)
}

/// Least-squares line through (x, y) points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Standard deviation of the residuals
    pub residual_std: f64,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// None for fewer than three points or a degenerate x range
pub fn linear_fit(xs: &[f64], ys: &[f64]) -> Option<LinearFit> {
    let n = xs.len().min(ys.len());
    if n < 3 {
        return None;
    }
    let mx = mean(&xs[..n]);
    let my = mean(&ys[..n]);
    let sxx: f64 = xs[..n].iter().map(|x| (x - mx).powi(2)).sum();
    if sxx <= f64::EPSILON {
        return None;
    }
    let sxy: f64 = xs[..n].iter().zip(&ys[..n]).map(|(x, y)| (x - mx) * (y - my)).sum();
    let slope = sxy / sxx;
    let intercept = my - slope * mx;
    let sse: f64 = xs[..n]
        .iter()
        .zip(&ys[..n])
        .map(|(x, y)| (y - intercept - slope * x).powi(2))
        .sum();
    Some(LinearFit {
        slope,
        intercept,
        residual_std: (sse / (n - 2) as f64).sqrt(),
    })
}

/// Wrap an angle into (-π, π]
pub fn wrap_phase(phase: f64) -> f64 {
    let wrapped = (phase + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

/// Remove 2π jumps between consecutive samples
pub fn unwrap_phase(phases: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(phases.len());
    let mut offset = 0.0;
    let mut prev: Option<f64> = None;
    for &p in phases {
        if let Some(q) = prev {
            offset += wrap_phase(p - q) - (p - q);
        }
        out.push(p + offset);
        prev = Some(p);
    }
    out
}

/// Small deterministic generator for seeded sampling
#[derive(Debug, Clone)]
pub struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform index in 0..bound (bound > 0)
    pub fn next_below(&mut self, bound: usize) -> usize {
        ((self.next_u64() >> 11) as f64 / (1u64 << 53) as f64 * bound as f64) as usize % bound.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median() {
        let mut data = vec![5.0, 1.0, 3.0, 2.0, 4.0];
        assert_eq!(median(&mut data), 3.0);
        let mut even = vec![4.0, 1.0, 3.0, 2.0];
        assert_eq!(median(&mut even), 2.5);
    }

    #[test]
    fn test_mad() {
        assert_eq!(mad(&[1.0, 1.0, 2.0, 2.0, 4.0, 6.0, 9.0]), 1.0);
    }

    #[test]
    fn test_linear_fit_exact_line() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 3.0, 5.0, 7.0];
        let fit = linear_fit(&xs, &ys).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);
        assert!(fit.residual_std < 1e-9);
        assert!(linear_fit(&[1.0, 1.0, 1.0], &ys[..3]).is_none());
    }

    #[test]
    fn test_unwrap_phase() {
        let wrapped: Vec<f64> = (0..20).map(|i| wrap_phase(i as f64 * 1.0)).collect();
        let unwrapped = unwrap_phase(&wrapped);
        for (i, p) in unwrapped.iter().enumerate() {
            assert!((p - i as f64).abs() < 1e-9);
        }
    }

    #[test]
    fn test_splitmix_is_deterministic() {
        let mut a = SplitMix64::new(7);
        let mut b = SplitMix64::new(7);
        for _ in 0..10 {
            let x = a.next_below(100);
            assert_eq!(x, b.next_below(100));
            assert!(x < 100);
        }
    }
}
