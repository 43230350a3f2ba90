// src/core/analysis/chi_square.rs
//
// Pairs-of-values chi-square test. LSB replacement equalizes the counts of
// 2k and 2k+1; a small statistic against the equiprobable model is
// evidence of embedding.

use log::debug;

use crate::config::{ChiSquareConfig, DetectionMethod};
use crate::core::buffer::{ChannelPlane, PixelPlanes};
use crate::core::cancel::CancelToken;
use crate::core::dsp::{chi_square_cdf, chi_square_sf};
use crate::detection::Finding;
use crate::error::Result;

const METHOD: DetectionMethod = DetectionMethod::CHI_SQUARE;

#[derive(Debug, Clone, PartialEq)]
pub enum PlaneChiSquare {
    /// Fewer distinct values than the test needs
    InsufficientVariance { plane: String, distinct: usize },
    /// Pair totals are themselves flat, so equal pair members say nothing
    Uniform { plane: String, p_uniform: f64 },
    Tested {
        plane: String,
        statistic: f64,
        df: usize,
        /// Lower tail of the statistic
        p_value: f64,
    },
}

impl PlaneChiSquare {
    pub fn score(&self) -> f64 {
        match self {
            PlaneChiSquare::Tested { p_value, .. } => (1.0 - p_value).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }

    fn describe(&self) -> String {
        match self {
            PlaneChiSquare::InsufficientVariance { plane, distinct } => {
                format!("{}: insufficient variance ({} distinct values)", plane, distinct)
            }
            PlaneChiSquare::Uniform { plane, p_uniform } => {
                format!("{}: value histogram is uniform (p = {:.3}), uninformative", plane, p_uniform)
            }
            PlaneChiSquare::Tested {
                plane,
                statistic,
                df,
                p_value,
            } => format!("{}: chi2 = {:.2}, df = {}, p = {:.4}", plane, statistic, df, p_value),
        }
    }
}

/// Chi-square of the pair totals against a flat histogram
fn pair_uniformity(hist: &[u64; 256]) -> f64 {
    let totals: Vec<f64> = hist.chunks_exact(2).map(|p| (p[0] + p[1]) as f64).collect();
    let n: f64 = totals.iter().sum();
    let expected = n / totals.len() as f64;
    if expected <= 0.0 {
        return 0.0;
    }
    let statistic: f64 = totals.iter().map(|&t| (t - expected).powi(2) / expected).sum();
    chi_square_sf(statistic, (totals.len() - 1) as f64)
}

fn analyze_plane(plane: &ChannelPlane, config: &ChiSquareConfig) -> PlaneChiSquare {
    let hist = plane.histogram();
    let distinct = hist.iter().filter(|&&c| c > 0).count();
    if distinct < config.min_distinct {
        return PlaneChiSquare::InsufficientVariance {
            plane: plane.name.clone(),
            distinct,
        };
    }

    let p_uniform = pair_uniformity(&hist);
    if p_uniform > config.uniformity_alpha {
        return PlaneChiSquare::Uniform {
            plane: plane.name.clone(),
            p_uniform,
        };
    }

    let mut statistic = 0.0;
    let mut groups = 0usize;
    for pair in hist.chunks_exact(2) {
        let expected = (pair[0] + pair[1]) as f64 / 2.0;
        if expected < config.min_expected {
            continue;
        }
        let observed = pair[0] as f64;
        statistic += (observed - expected).powi(2) / expected;
        groups += 1;
    }

    if groups < 2 {
        return PlaneChiSquare::InsufficientVariance {
            plane: plane.name.clone(),
            distinct,
        };
    }
    let df = groups - 1;
    PlaneChiSquare::Tested {
        plane: plane.name.clone(),
        statistic,
        df,
        p_value: chi_square_cdf(statistic, df as f64),
    }
}

pub fn analyze(planes: &PixelPlanes, config: &ChiSquareConfig, cancel: &CancelToken) -> Result<Finding> {
    let mut results = Vec::with_capacity(planes.planes().len());
    for plane in planes.planes() {
        cancel.checkpoint()?;
        let result = analyze_plane(plane, config);
        debug!("chi-square {}", result.describe());
        results.push(result);
    }

    let tested: Vec<&PlaneChiSquare> = results
        .iter()
        .filter(|r| matches!(r, PlaneChiSquare::Tested { .. }))
        .collect();

    let mut finding = match tested.iter().max_by(|a, b| a.score().total_cmp(&b.score())) {
        None if results.iter().all(|r| matches!(r, PlaneChiSquare::InsufficientVariance { .. })) => {
            Finding::insufficient(METHOD, "insufficient variance in every channel plane")
        }
        None => Finding::new(METHOD, 0.0, "value histograms are uniform; pairs-of-values test is uninformative"),
        Some(best) => {
            let p_value = match best {
                PlaneChiSquare::Tested { p_value, .. } => *p_value,
                _ => 1.0,
            };
            let rationale = if p_value < config.alpha {
                format!(
                    "pairs of values are near equiprobable (p = {:.4} < {}), consistent with LSB replacement",
                    p_value, config.alpha
                )
            } else {
                format!("pairs of values keep their natural imbalance (p = {:.4})", p_value)
            };
            Finding::new(METHOD, best.score() as f32, rationale)
        }
    };
    for r in &results {
        finding = finding.with_evidence(r.describe());
    }
    Ok(finding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dsp::SplitMix64;

    /// Smooth field stored with even values only, as after a 7-bit source
    fn even_plane(rng: &mut SplitMix64) -> Vec<u8> {
        (0..128 * 128)
            .map(|i| {
                let (x, y) = ((i % 128) as f64, (i / 128) as f64);
                let v = 120.0 + 60.0 * (x / 20.0).sin() * (y / 30.0).cos() + (rng.next_below(5) as f64 - 2.0);
                (v as u8) & !1
            })
            .collect()
    }

    fn single(data: Vec<u8>) -> PixelPlanes {
        PixelPlanes::new(128, 128, vec![ChannelPlane::new("L", 128, 128, data).unwrap()]).unwrap()
    }

    #[test]
    fn test_clean_plane_scores_zero() {
        let mut rng = SplitMix64::new(1);
        let finding = analyze(&single(even_plane(&mut rng)), &ChiSquareConfig::default(), &CancelToken::new()).unwrap();
        assert!(finding.score < 0.01, "score {}", finding.score);
    }

    #[test]
    fn test_full_embedding_scores_higher() {
        let mut rng = SplitMix64::new(1);
        let data: Vec<u8> = even_plane(&mut rng)
            .into_iter()
            .map(|v| v | (rng.next_u64() & 1) as u8)
            .collect();
        let clean = {
            let mut rng = SplitMix64::new(1);
            analyze(&single(even_plane(&mut rng)), &ChiSquareConfig::default(), &CancelToken::new()).unwrap()
        };
        let embedded = analyze(&single(data), &ChiSquareConfig::default(), &CancelToken::new()).unwrap();
        assert!(embedded.score > clean.score);
    }

    #[test]
    fn test_constant_plane_is_insufficient() {
        let finding = analyze(&single(vec![77; 128 * 128]), &ChiSquareConfig::default(), &CancelToken::new()).unwrap();
        assert_eq!(finding.score, 0.0);
        assert!(finding.rationale.starts_with("insufficient data"));
        assert!(finding.evidence[0].contains("insufficient variance"));
    }

    #[test]
    fn test_uniform_noise_is_uninformative() {
        let mut rng = SplitMix64::new(5);
        let data: Vec<u8> = (0..128 * 128).map(|_| rng.next_u64() as u8).collect();
        let finding = analyze(&single(data), &ChiSquareConfig::default(), &CancelToken::new()).unwrap();
        assert_eq!(finding.score, 0.0);
        assert!(finding.rationale.contains("uninformative"));
    }
}
