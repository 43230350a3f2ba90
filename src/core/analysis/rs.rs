// src/core/analysis/rs.rs
//
// Regular-Singular steganalysis. Groups of adjacent pixels are classified
// by how a smoothness function reacts to flipping LSBs under a mask M and
// its negation -M. Counts on the plane and on its LSB-inverted copy give a
// quadratic; the smallest admissible rate among its roots is the estimate.

use log::debug;

use crate::config::{DetectionMethod, RsConfig};
use crate::core::buffer::{ChannelPlane, PixelPlanes};
use crate::core::cancel::CancelToken;
use crate::core::dsp::SplitMix64;
use crate::detection::Finding;
use crate::error::Result;

const METHOD: DetectionMethod = DetectionMethod::RS;
const MASK: [bool; 4] = [false, true, true, false];
/// Slightly negative estimates are sampling noise around zero
const NEGATIVE_TOLERANCE: f64 = 0.05;
/// Estimates slightly above one are sampling noise around full embedding
const OVERSHOOT_TOLERANCE: f64 = 0.05;

/// Regular/singular fractions under M and -M
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RsCounts {
    pub r_m: f64,
    pub s_m: f64,
    pub r_neg: f64,
    pub s_neg: f64,
}

impl RsCounts {
    fn d_m(&self) -> f64 {
        self.r_m - self.s_m
    }

    fn d_neg(&self) -> f64 {
        self.r_neg - self.s_neg
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaneRs {
    pub plane: String,
    pub groups: usize,
    pub counts: RsCounts,
    pub flipped: RsCounts,
    /// None when the quadratic has no usable root
    pub rate: Option<f64>,
    pub payload_bytes: u64,
}

/// Sum of absolute differences between neighbours
fn smoothness(group: &[i32]) -> i32 {
    group.windows(2).map(|w| (w[1] - w[0]).abs()).sum()
}

fn flip_pos(v: i32) -> i32 {
    v ^ 1
}

/// Shifted flip (-1<->0, 1<->2, ...); falls back to F1 at the value range edges
fn flip_neg(v: i32) -> i32 {
    let flipped = if v & 1 == 0 { v - 1 } else { v + 1 };
    if (0..=255).contains(&flipped) {
        flipped
    } else {
        flip_pos(v)
    }
}

/// Group start offsets, optionally subsampled with the configured seed
fn group_starts(plane: &ChannelPlane, group_size: usize, max_groups: Option<usize>, seed: u64) -> Vec<usize> {
    let per_row = plane.width() / group_size;
    let mut starts: Vec<usize> = (0..plane.height())
        .flat_map(|y| (0..per_row).map(move |g| y * plane.width() + g * group_size))
        .collect();

    if let Some(limit) = max_groups {
        if starts.len() > limit {
            let mut rng = SplitMix64::new(seed);
            for i in 0..limit {
                let j = i + rng.next_below(starts.len() - i);
                starts.swap(i, j);
            }
            starts.truncate(limit);
            starts.sort_unstable();
        }
    }
    starts
}

fn count(
    data: &[u8],
    starts: &[usize],
    group_size: usize,
    row_len: usize,
    invert: bool,
    cancel: &CancelToken,
) -> Result<RsCounts> {
    let mut group = vec![0i32; group_size];
    let mut flipped = vec![0i32; group_size];
    let (mut r_m, mut s_m, mut r_neg, mut s_neg) = (0usize, 0usize, 0usize, 0usize);
    let mut row = usize::MAX;

    for &start in starts {
        if start / row_len != row {
            row = start / row_len;
            cancel.checkpoint()?;
        }
        for (slot, &v) in group.iter_mut().zip(&data[start..start + group_size]) {
            *slot = if invert { (v ^ 1) as i32 } else { v as i32 };
        }
        let base = smoothness(&group);

        for (i, slot) in flipped.iter_mut().enumerate() {
            *slot = if MASK[i % MASK.len()] { flip_pos(group[i]) } else { group[i] };
        }
        let f = smoothness(&flipped);
        if f > base {
            r_m += 1;
        } else if f < base {
            s_m += 1;
        }

        for (i, slot) in flipped.iter_mut().enumerate() {
            *slot = if MASK[i % MASK.len()] { flip_neg(group[i]) } else { group[i] };
        }
        let f = smoothness(&flipped);
        if f > base {
            r_neg += 1;
        } else if f < base {
            s_neg += 1;
        }
    }

    let n = starts.len().max(1) as f64;
    Ok(RsCounts {
        r_m: r_m as f64 / n,
        s_m: s_m as f64 / n,
        r_neg: r_neg as f64 / n,
        s_neg: s_neg as f64 / n,
    })
}

/// Rate for a root z of the RS quadratic, if it lies in the admissible band
fn admissible_rate(z: f64, saturated: bool) -> Option<f64> {
    if (z - 0.5).abs() < 1e-12 {
        return None;
    }
    let p = z / (z - 0.5);
    if (-NEGATIVE_TOLERANCE..0.0).contains(&p) {
        Some(0.0)
    } else if (0.0..=1.0).contains(&p) {
        Some(p)
    } else if saturated && p > 1.0 && p <= 1.0 + OVERSHOOT_TOLERANCE {
        Some(1.0)
    } else {
        None
    }
}

/// Embedding rate from the counts at p/2 and 1 - p/2.
///
/// Both roots are mapped to a rate and the smallest admissible one wins.
/// A plane whose M-mask counts have collapsed to the noise floor on both
/// the plane and its flipped copy is saturated: overshoots clamp to one and
/// a missing root reads as full embedding. Otherwise, when sampling noise
/// pushes the discriminant below zero, the real part of the complex pair
/// stands in for the root.
pub fn estimate_rate(counts: &RsCounts, flipped: &RsCounts, groups: usize) -> Option<f64> {
    let d0 = counts.d_m();
    let d1 = flipped.d_m();
    let dn0 = counts.d_neg();
    let dn1 = flipped.d_neg();

    // without a -M asymmetry the plane has no structure for RS to measure
    let floor = (4.0 / (groups.max(1) as f64).sqrt()).max(0.01);
    if dn0.abs().max(dn1.abs()) < floor {
        return None;
    }
    let saturated = d0.abs() < floor && d1.abs() < floor;

    let a = 2.0 * (d1 + d0);
    let b = dn0 - dn1 - d1 - 3.0 * d0;
    let c = d0 - dn0;

    let (roots, vertex) = if a.abs() < 1e-12 {
        if b.abs() < 1e-12 {
            (Vec::new(), None)
        } else {
            (vec![-c / b], None)
        }
    } else {
        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 {
            (Vec::new(), Some(-b / (2.0 * a)))
        } else {
            let sq = disc.sqrt();
            (vec![(-b + sq) / (2.0 * a), (-b - sq) / (2.0 * a)], None)
        }
    };

    let smallest = roots
        .into_iter()
        .filter_map(|z| admissible_rate(z, saturated))
        .min_by(|a, b| a.total_cmp(b));
    if smallest.is_some() {
        return smallest;
    }
    if saturated {
        return Some(1.0);
    }
    vertex.and_then(|z| admissible_rate(z, false))
}

fn analyze_plane(plane: &ChannelPlane, config: &RsConfig, seed: u64, cancel: &CancelToken) -> Result<Option<PlaneRs>> {
    let starts = group_starts(plane, config.group_size, config.max_groups, seed);
    if starts.len() < config.min_groups.max(1) {
        return Ok(None);
    }
    let counts = count(plane.data(), &starts, config.group_size, plane.width(), false, cancel)?;
    let flipped = count(plane.data(), &starts, config.group_size, plane.width(), true, cancel)?;
    let rate = estimate_rate(&counts, &flipped, starts.len());
    let payload_bytes = rate.map_or(0, |p| (p * plane.len() as f64 / 8.0).round() as u64);
    Ok(Some(PlaneRs {
        plane: plane.name.clone(),
        groups: starts.len(),
        counts,
        flipped,
        rate,
        payload_bytes,
    }))
}

pub fn analyze(planes: &PixelPlanes, config: &RsConfig, seed: u64, cancel: &CancelToken) -> Result<Finding> {
    let mut results = Vec::new();
    for plane in planes.planes() {
        if let Some(result) = analyze_plane(plane, config, seed, cancel)? {
            debug!(
                "rs {}: R_M {:.3} S_M {:.3} R_-M {:.3} S_-M {:.3} -> {:?}",
                result.plane, result.counts.r_m, result.counts.s_m, result.counts.r_neg, result.counts.s_neg, result.rate
            );
            results.push(result);
        }
    }

    if results.is_empty() {
        return Ok(Finding::insufficient(
            METHOD,
            format!("fewer than {} pixel groups per plane", config.min_groups),
        ));
    }

    let solved: Vec<&PlaneRs> = results.iter().filter(|r| r.rate.is_some()).collect();
    let mut finding = match solved
        .iter()
        .max_by(|a, b| a.rate.unwrap_or(0.0).total_cmp(&b.rate.unwrap_or(0.0)))
    {
        None => Finding::new(METHOD, 0.0, "no stable RS solution"),
        Some(best) => {
            let rate = best.rate.unwrap_or(0.0);
            let payload: u64 = solved.iter().map(|r| r.payload_bytes).sum();
            Finding::new(
                METHOD,
                rate as f32,
                format!("estimated LSB embedding rate {:.1}% (plane {})", rate * 100.0, best.plane),
            )
            .with_payload(payload)
        }
    };
    for r in &results {
        finding = finding.with_evidence(format!(
            "{}: {} groups, R_M {:.3}, S_M {:.3}, R_-M {:.3}, S_-M {:.3}, rate {}",
            r.plane,
            r.groups,
            r.counts.r_m,
            r.counts.s_m,
            r.counts.r_neg,
            r.counts.s_neg,
            r.rate.map_or_else(|| "unstable".to_string(), |p| format!("{:.3}", p))
        ));
    }
    Ok(finding)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(x: f64, y: f64) -> f64 {
        128.0 + 40.0 * (x / 37.0).sin() + 35.0 * (y / 29.0).cos()
    }

    fn natural(seed: u64) -> Vec<u8> {
        let mut rng = SplitMix64::new(seed);
        (0..256 * 256)
            .map(|i| {
                let noise = rng.next_below(2) as f64 + rng.next_below(2) as f64 - 1.0;
                (field((i % 256) as f64, (i / 256) as f64) + noise).round() as u8
            })
            .collect()
    }

    /// Uniform integer noise in [-amplitude, amplitude]
    fn textured(seed: u64, amplitude: usize) -> Vec<u8> {
        let mut rng = SplitMix64::new(seed);
        (0..256 * 256)
            .map(|i| {
                let noise = rng.next_below(2 * amplitude + 1) as f64 - amplitude as f64;
                (field((i % 256) as f64, (i / 256) as f64) + noise).round() as u8
            })
            .collect()
    }

    fn counts(r_m: f64, s_m: f64, r_neg: f64, s_neg: f64) -> RsCounts {
        RsCounts { r_m, s_m, r_neg, s_neg }
    }

    fn embed(data: &mut [u8], rate: f64, seed: u64) {
        let mut rng = SplitMix64::new(seed);
        for v in data.iter_mut() {
            if (rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64 <= rate {
                *v = (*v & !1) | (rng.next_u64() & 1) as u8;
            }
        }
    }

    fn plane(data: Vec<u8>) -> PixelPlanes {
        PixelPlanes::new(256, 256, vec![ChannelPlane::new("L", 256, 256, data).unwrap()]).unwrap()
    }

    #[test]
    fn test_flip_neg_edges() {
        assert_eq!(flip_neg(0), 1);
        assert_eq!(flip_neg(1), 2);
        assert_eq!(flip_neg(2), 1);
        assert_eq!(flip_neg(255), 254);
    }

    #[test]
    fn test_clean_image_estimates_near_zero() {
        let finding = analyze(&plane(natural(3)), &RsConfig::default(), 0, &CancelToken::new()).unwrap();
        assert!(finding.score < 0.15, "score {}", finding.score);
    }

    #[test]
    fn test_estimates_known_rate() {
        let mut data = natural(3);
        embed(&mut data, 0.5, 11);
        let finding = analyze(&plane(data), &RsConfig::default(), 0, &CancelToken::new()).unwrap();
        assert!((finding.score - 0.5).abs() < 0.15, "score {}", finding.score);
        assert!(finding.estimated_payload_bytes.unwrap_or(0) > 0);
    }

    #[test]
    fn test_estimates_high_rates() {
        for (name, base) in [("natural", natural(3)), ("textured", textured(3, 2)), ("coarse", textured(3, 4))] {
            for rate in [0.7, 0.8, 0.9, 1.0] {
                let mut data = base.clone();
                embed(&mut data, rate, 11);
                let finding = analyze(&plane(data), &RsConfig::default(), 0, &CancelToken::new()).unwrap();
                assert!(
                    (finding.score as f64 - rate).abs() <= 0.15,
                    "{} at {}: score {} ({})",
                    name,
                    rate,
                    finding.score,
                    finding.rationale
                );
            }
        }
    }

    #[test]
    fn test_clean_textured_planes_estimate_near_zero() {
        for amplitude in [2, 4] {
            let finding = analyze(&plane(textured(3, amplitude)), &RsConfig::default(), 0, &CancelToken::new()).unwrap();
            assert!(finding.score < 0.15, "amplitude {}: score {}", amplitude, finding.score);
        }
    }

    #[test]
    fn test_overshoot_needs_saturation() {
        // only admissible-looking root is just above one while d_M is far from zero
        let image = counts(0.4622, 0.3, 0.4315, 0.3);
        let flipped = counts(0.3, 0.4589, 0.6294, 0.2);
        assert_eq!(estimate_rate(&image, &flipped, 16_384), None);
    }

    #[test]
    fn test_smallest_admissible_root_wins() {
        // roots map to 0.92 and 1.03
        let image = counts(0.305, 0.3, 0.5, 0.3);
        let flipped = counts(0.3, 0.304, 0.51, 0.3);
        let rate = estimate_rate(&image, &flipped, 16_384).unwrap();
        assert!((rate - 0.922).abs() < 0.01, "rate {}", rate);
    }

    #[test]
    fn test_saturated_plane_without_root_is_full() {
        let image = counts(0.301, 0.3, 0.3, 0.5);
        let flipped = counts(0.301, 0.3, 0.3, 0.5);
        assert_eq!(estimate_rate(&image, &flipped, 16_384), Some(1.0));
    }

    #[test]
    fn test_sampling_is_seeded() {
        let config = RsConfig {
            max_groups: Some(2000),
            ..RsConfig::default()
        };
        let planes = plane(natural(5));
        let a = analyze(&planes, &config, 42, &CancelToken::new()).unwrap();
        let b = analyze(&planes, &config, 42, &CancelToken::new()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_noise_has_no_stable_solution() {
        let mut rng = SplitMix64::new(8);
        let data: Vec<u8> = (0..256 * 256).map(|_| rng.next_u64() as u8).collect();
        let finding = analyze(&plane(data), &RsConfig::default(), 0, &CancelToken::new()).unwrap();
        assert_eq!(finding.score, 0.0);
        assert_eq!(finding.rationale, "no stable RS solution");
    }

    #[test]
    fn test_small_plane_is_insufficient() {
        let tiny = PixelPlanes::new(8, 8, vec![ChannelPlane::new("L", 8, 8, vec![9; 64]).unwrap()]).unwrap();
        let finding = analyze(&tiny, &RsConfig::default(), 0, &CancelToken::new()).unwrap();
        assert!(finding.rationale.starts_with("insufficient data"));
    }
}
