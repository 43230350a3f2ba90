// src/core/analysis/echo_hiding.rs
//
// Echo-hiding detection. A discrete echo kernel puts a sharp spike into
// the autocorrelation at its delay; room reverberation spreads energy over
// many lags and decays smoothly. Each window is whitened (generalized
// autocorrelation) and its strongest lag in the delay band is measured in
// robust sigmas over the neighbouring lags. Hidden data shows up as the
// same one or two lags winning in most windows.

use std::collections::BTreeMap;

use log::debug;

use crate::config::{DetectionMethod, EchoHidingConfig};
use crate::core::buffer::PcmBuffer;
use crate::core::cancel::CancelToken;
use crate::core::dsp::{frame_starts, mad, median, Autocorrelator, WindowType};
use crate::detection::Finding;
use crate::error::Result;

const METHOD: DetectionMethod = DetectionMethod::ECHO_HIDING;
/// Lags on each side used for the local noise floor
const NEIGHBOURHOOD: usize = 8;
/// MAD to standard deviation for normal data
const MAD_SCALE: f64 = 1.4826;
/// Encoders switch between two delays (0-bit / 1-bit)
const DELAY_CANDIDATES: usize = 2;

/// Strongest lag of one window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowPeak {
    pub start: usize,
    pub lag: usize,
    pub prominence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EchoSummary {
    pub windows: usize,
    pub passing: usize,
    /// Dominant lags with the number of windows they won
    pub dominant: Vec<(usize, usize)>,
    pub consistency: f64,
    pub prominence: f64,
    pub score: f64,
}

/// Prominence of `lag` over its neighbourhood, in robust sigmas
fn prominence(r: &[f32], lag: usize) -> f64 {
    let lo = lag.saturating_sub(NEIGHBOURHOOD).max(1);
    let hi = (lag + NEIGHBOURHOOD).min(r.len() - 1);
    let mut neighbours: Vec<f64> = (lo..=hi).filter(|&k| k != lag).map(|k| r[k] as f64).collect();
    if neighbours.len() < 4 {
        return 0.0;
    }
    let spread = MAD_SCALE * mad(&neighbours);
    let floor = median(&mut neighbours);
    (r[lag] as f64 - floor) / spread.max(1e-6)
}

fn strongest_lag(r: &[f32], lags: std::ops::RangeInclusive<usize>) -> Option<(usize, f64)> {
    lags.map(|lag| (lag, prominence(r, lag)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

pub fn summarize(peaks: &[WindowPeak], windows: usize, config: &EchoHidingConfig) -> EchoSummary {
    let passing: Vec<&WindowPeak> = peaks.iter().filter(|p| p.prominence >= config.z_min).collect();
    let mut by_lag: BTreeMap<usize, usize> = BTreeMap::new();
    for peak in &passing {
        *by_lag.entry(peak.lag).or_default() += 1;
    }
    let mut dominant: Vec<(usize, usize)> = by_lag.into_iter().collect();
    dominant.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    dominant.truncate(DELAY_CANDIDATES);

    let winners: usize = dominant.iter().map(|d| d.1).sum();
    let consistency = if windows == 0 { 0.0 } else { winners as f64 / windows as f64 };
    let mut zs: Vec<f64> = passing
        .iter()
        .filter(|p| dominant.iter().any(|d| d.0 == p.lag))
        .map(|p| p.prominence)
        .collect();
    let prominence = if zs.is_empty() { 0.0 } else { median(&mut zs) };
    let score = (consistency * (prominence / config.z_ref).min(1.0)).clamp(0.0, 1.0);

    EchoSummary {
        windows,
        passing: passing.len(),
        dominant,
        consistency,
        prominence,
        score,
    }
}

pub fn analyze(pcm: &PcmBuffer, config: &EchoHidingConfig, cancel: &CancelToken) -> Result<Finding> {
    let rate = pcm.sample_rate() as f64;
    let window = config.window_len;
    let min_lag = ((config.min_delay_ms * rate / 1000.0).ceil() as usize).max(2);
    let max_lag = ((config.max_delay_ms * rate / 1000.0).floor() as usize).min(window.saturating_sub(NEIGHBOURHOOD + 1));
    if min_lag > max_lag {
        return Ok(Finding::insufficient(
            METHOD,
            format!("delay band {}..{} ms holds no lags at {} Hz", config.min_delay_ms, config.max_delay_ms, pcm.sample_rate()),
        ));
    }

    let mono = pcm.mono_f32();
    let correlator = Autocorrelator::new(window, config.compression, WindowType::Hann);
    let mut peaks = Vec::new();
    let mut windows = 0usize;

    for start in frame_starts(mono.len(), window, window / 2) {
        cancel.checkpoint()?;
        let chunk = &mono[start..start + window];
        if chunk.iter().all(|&s| s == 0.0) {
            continue;
        }
        let r = correlator.compute(chunk)?;
        if r[0] == 0.0 {
            continue;
        }
        windows += 1;
        if let Some((lag, prominence)) = strongest_lag(&r, min_lag..=max_lag) {
            peaks.push(WindowPeak { start, lag, prominence });
        }
    }

    if windows == 0 {
        return Ok(Finding::insufficient(METHOD, "no non-silent analysis window"));
    }

    let summary = summarize(&peaks, windows, config);
    debug!(
        "echo hiding: {} windows, {} passing, dominant {:?}, score {:.3}",
        summary.windows, summary.passing, summary.dominant, summary.score
    );

    let to_ms = |lag: usize| lag as f64 * 1000.0 / rate;
    let rationale = if summary.dominant.is_empty() {
        "no discrete echo peak in the delay band".to_string()
    } else {
        let lags: Vec<String> = summary.dominant.iter().map(|(lag, _)| format!("{:.2} ms", to_ms(*lag))).collect();
        format!(
            "discrete echo at {} in {:.0}% of windows ({:.1} sigma)",
            lags.join(" / "),
            summary.consistency * 100.0,
            summary.prominence
        )
    };

    let mut finding = Finding::new(METHOD, summary.score as f32, rationale)
        .with_evidence(format!("{} windows, {} above {} sigma", summary.windows, summary.passing, config.z_min))
        .with_evidence(format!("lag band {}..={} samples", min_lag, max_lag));
    for (lag, count) in &summary.dominant {
        finding = finding.with_evidence(format!("lag {} ({:.2} ms): {} windows", lag, to_ms(*lag), count));
    }
    Ok(finding)
}
