// src/core/analysis/phase_coding.rs
//
// Phase-coding detection. The encoder overwrites the phases of the first
// frame (typically with +-pi/2 symbols) and carries the phase differences
// forward. Two traces are measured:
//
// - discontinuity: frame-0 phases of stable (tonal) bins against a linear
//   drift model fit on later frames that do not overlap frame 0;
// - concentration: clustering of frame-0 phases at +-pi/2, compared with
//   the same statistic on later frames.

use log::debug;

use crate::config::{DetectionMethod, PhaseCodingConfig};
use crate::core::buffer::PcmBuffer;
use crate::core::cancel::CancelToken;
use crate::core::dsp::{frame_starts, linear_fit, mean, median, std_dev, unwrap_phase, wrap_phase, FftProcessor, WindowType};
use crate::detection::Finding;
use crate::error::Result;

const METHOD: DetectionMethod = DetectionMethod::PHASE_CODING;

/// Drift fits noisier than this (radians) are not tonal
const STABLE_RESIDUAL: f64 = 0.3;
const RESIDUAL_FLOOR: f64 = 1e-3;
const MIN_STABLE_BINS: usize = 3;
const DISCONTINUITY_Z_MIN: f64 = 3.0;
const DISCONTINUITY_Z_REF: f64 = 10.0;
const CONCENTRATION_Z_MIN: f64 = 4.0;
const MIN_ACTIVE_BINS: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPhase {
    pub channel: usize,
    pub stable_bins: usize,
    /// Median frame-0 residual in units of the drift model's residual std
    pub median_z: f64,
    pub discontinuity: f64,
    /// Frame-0 clustering at +-pi/2 (1 = every bin on the axis)
    pub frame0_concentration: f64,
    pub later_concentration: f64,
    pub concentration_z: f64,
    pub concentration: f64,
}

impl ChannelPhase {
    pub fn score(&self) -> f64 {
        self.discontinuity.max(self.concentration)
    }
}

struct Frame {
    phases: Vec<f64>,
    magnitudes: Vec<f64>,
}

impl Frame {
    fn active(&self, floor_db: f32) -> Vec<bool> {
        let peak = self.magnitudes.iter().cloned().fold(0.0f64, f64::max);
        if peak <= 0.0 {
            return vec![false; self.magnitudes.len()];
        }
        let floor = peak * 10f64.powf(floor_db as f64 / 20.0);
        self.magnitudes.iter().map(|&m| m > 0.0 && m >= floor).collect()
    }
}

/// -mean(cos 2phi): +1 when every phase sits at +-pi/2, ~0 for uniform phases
fn axis_concentration(frame: &Frame, active: &[bool]) -> Option<(f64, usize)> {
    let values: Vec<f64> = frame
        .phases
        .iter()
        .zip(active)
        .filter(|(_, &a)| a)
        .map(|(&p, _)| -(2.0 * p).cos())
        .collect();
    if values.len() < MIN_ACTIVE_BINS {
        return None;
    }
    Some((mean(&values), values.len()))
}

fn analyze_channel(
    samples: &[f32],
    channel: usize,
    config: &PhaseCodingConfig,
    cancel: &CancelToken,
) -> Result<Option<ChannelPhase>> {
    let frame_len = config.frame_len;
    let hop = (((1.0 - config.overlap) * frame_len as f64).round() as usize).max(1);
    // first frame that shares no samples with frame 0
    let independent = frame_len.div_ceil(hop);
    let wanted = independent + config.drift_frames;
    let bins = config.band_bins.min(frame_len / 2 - 1);

    let fft = FftProcessor::new(frame_len, WindowType::Rectangular);
    let mut frames = Vec::with_capacity(wanted);
    for start in frame_starts(samples.len(), frame_len, hop).take(wanted) {
        cancel.checkpoint()?;
        let spectrum = fft.complex_spectrum(&samples[start..start + frame_len]);
        let band = &spectrum[1..=bins];
        frames.push(Frame {
            phases: band.iter().map(|c| c.arg() as f64).collect(),
            magnitudes: band.iter().map(|c| c.norm() as f64).collect(),
        });
    }

    if frames.len() < independent + 3 {
        return Ok(None);
    }
    let first = &frames[0];
    let later = &frames[independent..];
    let active0 = first.active(config.magnitude_floor_db);
    if !active0.iter().any(|&a| a) {
        return Ok(None);
    }

    // discontinuity against the drift model
    let ts: Vec<f64> = (independent..frames.len()).map(|t| t as f64).collect();
    let mut zs = Vec::new();
    for bin in (0..bins).filter(|&b| active0[b]) {
        let track: Vec<f64> = later.iter().map(|f| f.phases[bin]).collect();
        let unwrapped = unwrap_phase(&track);
        let Some(fit) = linear_fit(&ts, &unwrapped) else {
            continue;
        };
        if fit.residual_std > STABLE_RESIDUAL {
            continue;
        }
        let residual = wrap_phase(first.phases[bin] - fit.predict(0.0));
        zs.push(residual.abs() / fit.residual_std.max(RESIDUAL_FLOOR));
    }
    let stable_bins = zs.len();
    let median_z = if stable_bins >= MIN_STABLE_BINS { median(&mut zs) } else { 0.0 };
    let discontinuity = if stable_bins >= MIN_STABLE_BINS {
        ((median_z - DISCONTINUITY_Z_MIN) / (DISCONTINUITY_Z_REF - DISCONTINUITY_Z_MIN)).clamp(0.0, 1.0)
    } else {
        0.0
    };

    // concentration at +-pi/2
    let (frame0_concentration, later_concentration, concentration_z, concentration) =
        match axis_concentration(first, &active0) {
            None => (0.0, 0.0, 0.0, 0.0),
            Some((k0, n0)) => {
                let later_k: Vec<f64> = later
                    .iter()
                    .filter_map(|f| axis_concentration(f, &f.active(config.magnitude_floor_db)).map(|(k, _)| k))
                    .collect();
                if later_k.len() < 2 {
                    (k0, 0.0, 0.0, 0.0)
                } else {
                    let base = mean(&later_k);
                    let spread = std_dev(&later_k).max(1.0 / (2.0 * n0 as f64).sqrt());
                    let z = (k0 - base) / spread;
                    let floor = base.max(0.0);
                    let term = if z >= CONCENTRATION_Z_MIN {
                        ((k0 - floor) / (1.0 - floor)).clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                    (k0, base, z, term)
                }
            }
        };

    Ok(Some(ChannelPhase {
        channel,
        stable_bins,
        median_z,
        discontinuity,
        frame0_concentration,
        later_concentration,
        concentration_z,
        concentration,
    }))
}

pub fn analyze(pcm: &PcmBuffer, config: &PhaseCodingConfig, cancel: &CancelToken) -> Result<Finding> {
    let mut results = Vec::new();
    for channel in 0..pcm.channels() {
        let samples = pcm.channel_f32(channel);
        if let Some(result) = analyze_channel(&samples, channel, config, cancel)? {
            debug!(
                "phase coding ch{}: discontinuity {:.3} (median z {:.2}, {} stable bins), concentration {:.3} (z {:.1})",
                channel, result.discontinuity, result.median_z, result.stable_bins, result.concentration, result.concentration_z
            );
            results.push(result);
        }
    }

    let Some(best) = results.iter().max_by(|a, b| a.score().total_cmp(&b.score())) else {
        return Ok(Finding::insufficient(
            METHOD,
            "stream too short or silent for frame-0 phase analysis",
        ));
    };

    let rationale = if best.score() <= 0.0 {
        "first-frame phases follow the drift of later frames".to_string()
    } else if best.concentration >= best.discontinuity {
        format!(
            "channel {} first-frame phases cluster at +-pi/2 ({:.2} vs {:.2} in later frames)",
            best.channel, best.frame0_concentration, best.later_concentration
        )
    } else {
        format!(
            "channel {} first-frame phases break the linear drift of {} tonal bins (median {:.1} sigma)",
            best.channel, best.stable_bins, best.median_z
        )
    };

    let mut finding = Finding::new(METHOD, best.score() as f32, rationale);
    for r in &results {
        finding = finding.with_evidence(format!(
            "ch{}: discontinuity {:.3} over {} stable bins, concentration {:.3} (z {:.1})",
            r.channel, r.discontinuity, r.stable_bins, r.concentration, r.concentration_z
        ));
    }
    Ok(finding)
}
