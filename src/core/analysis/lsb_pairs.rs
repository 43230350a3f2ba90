// src/core/analysis/lsb_pairs.rs
//
// LSB pairs analysis. Adjacent pairs one apart come in two kinds: {2k, 2k+1}
// inside one upper-seven-bit bucket and {2k+1, 2k+2} straddling two buckets.
// Image content produces both kinds equally often. LSB replacement turns
// equal pairs into the first kind and pushes the imbalance towards the value
// a random LSB plane would give, 0.5·C0 − 0.25·C1, where C0 and C1 count the
// pairs whose buckets are equal or one apart. Embedding cannot move C0 or C1,
// so the reference holds for any content. A sliding window localizes the
// embedded region.

use log::debug;

use crate::config::{DetectionMethod, LsbPairsConfig};
use crate::core::buffer::{ChannelPlane, PixelPlanes};
use crate::core::cancel::CancelToken;
use crate::core::dsp::normal_isf;
use crate::detection::Finding;
use crate::error::Result;

const METHOD: DetectionMethod = DetectionMethod::LSB_PAIRS;
/// Windows are scored at this many standard errors below their imbalance
const WINDOW_MARGIN: f64 = 2.0;

/// Tallies of non-overlapping adjacent pairs over a stretch of samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairCounts {
    /// {2k, 2k+1}
    pub inner: u64,
    /// {2k+1, 2k+2}
    pub straddling: u64,
    /// Upper seven bits equal
    pub same_bucket: u64,
    /// Upper seven bits one apart
    pub next_bucket: u64,
}

impl PairCounts {
    pub fn tally(data: &[u8]) -> Self {
        let mut counts = Self::default();
        for pair in data.chunks_exact(2) {
            let (a, b) = (pair[0], pair[1]);
            match (a >> 1).abs_diff(b >> 1) {
                0 => {
                    counts.same_bucket += 1;
                    if a != b {
                        counts.inner += 1;
                    }
                }
                1 => {
                    counts.next_bucket += 1;
                    if a.abs_diff(b) == 1 {
                        counts.straddling += 1;
                    }
                }
                _ => {}
            }
        }
        counts
    }

    /// Pairs the test can say anything about
    pub fn close_pairs(&self) -> u64 {
        self.same_bucket + self.next_bucket
    }

    pub fn imbalance(&self) -> f64 {
        self.inner as f64 - self.straddling as f64
    }

    /// Imbalance in standard errors under the balanced null
    pub fn z(&self) -> f64 {
        let n = self.inner + self.straddling;
        if n == 0 {
            0.0
        } else {
            self.imbalance() / (n as f64).sqrt()
        }
    }

    pub fn standard_error(&self) -> f64 {
        ((self.inner + self.straddling) as f64).sqrt()
    }

    /// Expected imbalance once every LSB is random
    pub fn full_imbalance(&self) -> f64 {
        0.5 * self.same_bucket as f64 - 0.25 * self.next_bucket as f64
    }

    /// Replaced fraction for an observed imbalance; None without a usable reference.
    ///
    /// The imbalance grows as p(2 - p) of its full value, hence the inversion.
    pub fn rate(&self, imbalance: f64) -> Option<f64> {
        let full = self.full_imbalance();
        if full <= 0.0 {
            return None;
        }
        let r = (imbalance / full).clamp(0.0, 1.0);
        Some(1.0 - (1.0 - r).sqrt())
    }
}

/// Result for one channel plane
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneLsbPairs {
    pub plane: String,
    pub windows: usize,
    /// Imbalance z over the whole plane
    pub plane_z: f64,
    /// Whole-plane rate estimate, 0 unless `plane_z` clears `z_min`
    pub plane_rate: f64,
    /// Lower-bound rate of the strongest significant window
    pub window_rate: f64,
    /// Sample offset and z of that window
    pub peak: Option<(usize, f64)>,
}

impl PlaneLsbPairs {
    pub fn score(&self) -> f64 {
        self.plane_rate.max(self.window_rate)
    }
}

fn window_starts(len: usize, window: usize) -> impl Iterator<Item = usize> {
    let step = (window / 2).max(2);
    (0..).map(move |i| i * step).take_while(move |&start| start + window <= len)
}

fn analyze_plane(plane: &ChannelPlane, config: &LsbPairsConfig) -> Option<PlaneLsbPairs> {
    let data = plane.data();
    let min_pairs = config.min_close_pairs.max(1) as u64;
    let whole = PairCounts::tally(data);
    if whole.close_pairs() < min_pairs {
        return None;
    }

    let plane_z = whole.z();
    let plane_rate = if plane_z >= config.z_min {
        whole.rate(whole.imbalance()).unwrap_or(0.0)
    } else {
        0.0
    };

    let mut window = ((data.len() as f64 * config.window_fraction) as usize).max(config.min_window);
    window -= window % 2;
    let starts: Vec<usize> = if window >= 2 {
        window_starts(data.len(), window).collect()
    } else {
        Vec::new()
    };
    // Bonferroni over the windows, never looser than z_min
    let threshold = config.z_min.max(normal_isf(config.window_alpha / starts.len().max(1) as f64));

    let mut result = PlaneLsbPairs {
        plane: plane.name.clone(),
        windows: starts.len(),
        plane_z,
        plane_rate,
        window_rate: 0.0,
        peak: None,
    };
    for start in starts {
        let counts = PairCounts::tally(&data[start..start + window]);
        if counts.close_pairs() < min_pairs {
            continue;
        }
        let z = counts.z();
        if z < threshold {
            continue;
        }
        let bound = counts.imbalance() - WINDOW_MARGIN * counts.standard_error();
        if let Some(rate) = counts.rate(bound) {
            if rate > result.window_rate {
                result.window_rate = rate;
                result.peak = Some((start, z));
            }
        }
    }
    Some(result)
}

pub fn analyze(planes: &PixelPlanes, config: &LsbPairsConfig, cancel: &CancelToken) -> Result<Finding> {
    let mut results = Vec::with_capacity(planes.planes().len());
    for plane in planes.planes() {
        cancel.checkpoint()?;
        if let Some(result) = analyze_plane(plane, config) {
            debug!(
                "lsb pairs {}: z {:.2}, plane rate {:.3}, window rate {:.3} over {} windows",
                result.plane, result.plane_z, result.plane_rate, result.window_rate, result.windows
            );
            results.push(result);
        }
    }

    let Some(best) = results.iter().max_by(|a, b| a.score().total_cmp(&b.score())) else {
        return Ok(Finding::insufficient(METHOD, "no channel plane holds enough close pairs"));
    };
    let rationale = match best.peak {
        _ if best.score() <= 0.0 => "inner and straddling pairs are balanced in every plane".to_string(),
        Some((offset, z)) if best.window_rate > best.plane_rate => format!(
            "plane {} has a window at sample {} with an estimated {:.0}% of LSBs replaced (z {:.1})",
            best.plane,
            offset,
            best.window_rate * 100.0,
            z
        ),
        _ => format!(
            "plane {} pair imbalance suggests {:.0}% of LSBs replaced (z {:.1})",
            best.plane,
            best.plane_rate * 100.0,
            best.plane_z
        ),
    };

    let mut finding = Finding::new(METHOD, best.score() as f32, rationale);
    for r in &results {
        finding = finding.with_evidence(format!(
            "{}: z {:.1}, plane rate {:.3}, best window {:.3}{}, {} windows",
            r.plane,
            r.plane_z,
            r.plane_rate,
            r.window_rate,
            r.peak.map_or_else(String::new, |(offset, _)| format!(" at {}", offset)),
            r.windows
        ));
    }
    Ok(finding)
}
