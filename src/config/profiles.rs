// src/config/profiles.rs
//
// Detection configuration: per-analyzer thresholds, verdict boundaries,
// scheduling limits and sensitivity presets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::methods::DetectionMethod;
use crate::error::{DetectionError, Result};

/// Metadata analyzer limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Maximum length of a text-typed tag in bytes
    pub text_limit: usize,
    /// Maximum length of a binary or comment tag in bytes
    pub binary_limit: usize,
    /// Maximum length of an embedded picture (cover art, thumbnails)
    pub picture_limit: usize,
    /// Non-printable byte run length that marks a text tag as carrying binary data
    pub nonprintable_run: usize,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            text_limit: 2048,
            binary_limit: 8192,
            picture_limit: 16 * 1024 * 1024,
            nonprintable_run: 4,
        }
    }
}

/// LSB pairs analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LsbPairsConfig {
    /// Window length as a fraction of the plane size
    pub window_fraction: f64,
    /// Minimum window length in samples
    pub min_window: usize,
    /// Windows with fewer close pairs (buckets equal or one apart) are skipped
    pub min_close_pairs: usize,
    /// Minimum imbalance z-score for the plane or a window to count
    pub z_min: f64,
    /// Family-wise false-alarm rate shared by all windows of a plane
    pub window_alpha: f64,
}

impl Default for LsbPairsConfig {
    fn default() -> Self {
        Self {
            window_fraction: 0.01,
            min_window: 256,
            min_close_pairs: 32,
            z_min: 3.0,
            window_alpha: 0.01,
        }
    }
}

/// Chi-square (pairs of values) analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChiSquareConfig {
    /// Significance level below which the p-value is reported as evidence
    pub alpha: f64,
    /// Planes with fewer distinct values report insufficient variance
    pub min_distinct: usize,
    /// PoV groups with a smaller expected count are excluded
    pub min_expected: f64,
    /// Upper-tail level above which the coarse histogram counts as uniform
    pub uniformity_alpha: f64,
}

impl Default for ChiSquareConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            min_distinct: 16,
            min_expected: 4.0,
            uniformity_alpha: 1e-3,
        }
    }
}

/// Regular-Singular analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RsConfig {
    /// Pixels per group
    pub group_size: usize,
    /// Planes with fewer groups report insufficient data
    pub min_groups: usize,
    /// Optional cap on groups per plane; groups are then sampled with the config seed
    pub max_groups: Option<usize>,
}

impl Default for RsConfig {
    fn default() -> Self {
        Self {
            group_size: 4,
            min_groups: 64,
            max_groups: None,
        }
    }
}

/// Phase-coding analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseCodingConfig {
    pub frame_len: usize,
    /// Fractional overlap between consecutive frames
    pub overlap: f64,
    /// Number of low-frequency bins inspected (bin 0 excluded)
    pub band_bins: usize,
    /// Frames used to fit the linear phase drift model
    pub drift_frames: usize,
    /// Bins quieter than this (relative to the frame peak) are ignored
    pub magnitude_floor_db: f32,
}

impl Default for PhaseCodingConfig {
    fn default() -> Self {
        Self {
            frame_len: 2048,
            overlap: 0.5,
            band_bins: 256,
            drift_frames: 16,
            magnitude_floor_db: -60.0,
        }
    }
}

/// Echo-hiding analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoHidingConfig {
    pub window_len: usize,
    pub min_delay_ms: f64,
    pub max_delay_ms: f64,
    /// Minimum prominence (robust sigmas) for a window peak to count
    pub z_min: f64,
    /// Prominence that maps to full suspicion
    pub z_ref: f64,
    /// Magnitude compression exponent of the generalized autocorrelation
    pub compression: f64,
}

impl Default for EchoHidingConfig {
    fn default() -> Self {
        Self {
            window_len: 4096,
            min_delay_ms: 0.5,
            max_delay_ms: 5.0,
            z_min: 6.0,
            z_ref: 12.0,
            compression: 0.3,
        }
    }
}

/// File carving settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarvingConfig {
    /// Stop after this many candidate signatures past end-of-data
    pub max_candidates: usize,
}

impl Default for CarvingConfig {
    fn default() -> Self {
        Self { max_candidates: 64 }
    }
}

/// Score boundaries used to derive the overall verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictThresholds {
    pub suspicious: f32,
    pub detected: f32,
    /// Per-method replacement for the `detected` boundary
    pub overrides: BTreeMap<DetectionMethod, f32>,
    /// Per-method replacement for the `suspicious` boundary
    pub suspicious_overrides: BTreeMap<DetectionMethod, f32>,
}

impl Default for VerdictThresholds {
    fn default() -> Self {
        let mut thresholds = Self {
            suspicious: 0.3,
            detected: 0.7,
            overrides: BTreeMap::new(),
            suspicious_overrides: BTreeMap::new(),
        };
        // smooth or finely textured clean planes land anywhere in [0, 1) under
        // the equiprobable-pairs test, so only extreme scores count
        thresholds.gate(DetectionMethod::CHI_SQUARE, 0.9, 0.99);
        thresholds
    }
}

impl VerdictThresholds {
    /// (suspicious, detected) boundaries for one method
    pub fn for_method(&self, method: DetectionMethod) -> (f32, f32) {
        let detected = self.overrides.get(&method).copied().unwrap_or(self.detected);
        let suspicious = self.suspicious_overrides.get(&method).copied().unwrap_or(self.suspicious);
        (suspicious.min(detected), detected)
    }

    /// Boundaries that apply to a method unless the caller overrides them
    pub fn gate(&mut self, method: DetectionMethod, suspicious: f32, detected: f32) {
        self.suspicious_overrides.insert(method, suspicious);
        self.overrides.insert(method, detected);
    }
}

/// Sensitivity presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensitivityPreset {
    /// Balanced defaults
    Standard,
    /// Lower verdict boundaries, tighter metadata limits
    Strict,
    /// Higher verdict boundaries for noisy or heavily edited corpora
    Lenient,
    /// User-defined settings
    Custom,
}

impl SensitivityPreset {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "standard" | "default" => Some(Self::Standard),
            "strict" | "paranoid" => Some(Self::Strict),
            "lenient" | "relaxed" => Some(Self::Lenient),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Strict => "strict",
            Self::Lenient => "lenient",
            Self::Custom => "custom",
        }
    }
}

/// Complete, immutable configuration handed to the orchestrator and every analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub preset: SensitivityPreset,
    pub metadata: MetadataConfig,
    pub lsb_pairs: LsbPairsConfig,
    pub chi_square: ChiSquareConfig,
    pub rs: RsConfig,
    pub phase: PhaseCodingConfig,
    pub echo: EchoHidingConfig,
    pub carving: CarvingConfig,
    pub verdict: VerdictThresholds,
    pub disabled_methods: Vec<DetectionMethod>,
    /// Per-file deadline in milliseconds
    pub timeout_ms: Option<u64>,
    /// Worker pool size (None = available cores)
    pub workers: Option<usize>,
    /// Concurrent analyses over large inputs
    pub max_large_inflight: usize,
    /// Inputs at least this large count against `max_large_inflight`
    pub large_input_bytes: u64,
    /// Seed for every sampling step; recorded in each report
    pub seed: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self::from_preset(SensitivityPreset::Standard)
    }
}

impl DetectionConfig {
    pub fn from_preset(preset: SensitivityPreset) -> Self {
        match preset {
            SensitivityPreset::Standard | SensitivityPreset::Custom => Self::standard(),
            SensitivityPreset::Strict => Self::strict(),
            SensitivityPreset::Lenient => Self::lenient(),
        }
    }

    fn standard() -> Self {
        Self {
            preset: SensitivityPreset::Standard,
            metadata: MetadataConfig::default(),
            lsb_pairs: LsbPairsConfig::default(),
            chi_square: ChiSquareConfig::default(),
            rs: RsConfig::default(),
            phase: PhaseCodingConfig::default(),
            echo: EchoHidingConfig::default(),
            carving: CarvingConfig::default(),
            verdict: VerdictThresholds::default(),
            disabled_methods: Vec::new(),
            timeout_ms: None,
            workers: None,
            max_large_inflight: 2,
            large_input_bytes: 64 * 1024 * 1024,
            seed: 0x5EED_CAFE,
        }
    }

    fn strict() -> Self {
        let mut config = Self::standard();
        config.preset = SensitivityPreset::Strict;
        config.verdict.suspicious = 0.2;
        config.verdict.detected = 0.6;
        config.verdict.gate(DetectionMethod::CHI_SQUARE, 0.8, 0.95);
        config.metadata.text_limit = 1024;
        config.metadata.binary_limit = 4096;
        config.lsb_pairs.z_min = 2.5;
        config.echo.z_min = 5.0;
        config
    }

    fn lenient() -> Self {
        let mut config = Self::standard();
        config.preset = SensitivityPreset::Lenient;
        config.verdict.suspicious = 0.4;
        config.verdict.detected = 0.8;
        config.verdict.gate(DetectionMethod::CHI_SQUARE, 0.95, 0.999);
        config.metadata.text_limit = 4096;
        config.metadata.binary_limit = 16384;
        config.lsb_pairs.z_min = 4.0;
        config.echo.z_min = 8.0;
        config
    }

    pub fn is_enabled(&self, method: DetectionMethod) -> bool {
        !self.disabled_methods.contains(&method)
    }

    /// Read a JSON configuration file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| DetectionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make an analyzer meaningless
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(DetectionError::Config(format!("{} must be within [0, 1], got {}", name, v)))
            }
        };
        unit("verdict.suspicious", self.verdict.suspicious)?;
        unit("verdict.detected", self.verdict.detected)?;
        for (method, &value) in &self.verdict.overrides {
            unit(&format!("threshold override for {}", method), value)?;
        }
        for (method, &value) in &self.verdict.suspicious_overrides {
            unit(&format!("suspicious threshold override for {}", method), value)?;
        }
        if !(self.lsb_pairs.window_alpha > 0.0 && self.lsb_pairs.window_alpha < 1.0) {
            return Err(DetectionError::Config("lsb_pairs.window_alpha must be within (0, 1)".to_string()));
        }
        if self.verdict.suspicious > self.verdict.detected {
            return Err(DetectionError::Config(
                "verdict.suspicious must not exceed verdict.detected".to_string(),
            ));
        }
        if self.rs.group_size < 2 {
            return Err(DetectionError::Config("rs.group_size must be at least 2".to_string()));
        }
        if !self.phase.frame_len.is_power_of_two() || self.phase.frame_len < 64 {
            return Err(DetectionError::Config(
                "phase.frame_len must be a power of two >= 64".to_string(),
            ));
        }
        if !(0.0..0.95).contains(&self.phase.overlap) {
            return Err(DetectionError::Config("phase.overlap must be within [0, 0.95)".to_string()));
        }
        if self.echo.window_len < 256 {
            return Err(DetectionError::Config("echo.window_len must be at least 256".to_string()));
        }
        if self.echo.min_delay_ms <= 0.0 || self.echo.max_delay_ms <= self.echo.min_delay_ms {
            return Err(DetectionError::Config(
                "echo delay range must satisfy 0 < min_delay_ms < max_delay_ms".to_string(),
            ));
        }
        if self.metadata.text_limit == 0 || self.metadata.binary_limit == 0 || self.metadata.nonprintable_run == 0 {
            return Err(DetectionError::Config("metadata limits must be non-zero".to_string()));
        }
        if self.workers == Some(0) {
            return Err(DetectionError::Config("workers must be at least 1".to_string()));
        }
        if self.max_large_inflight == 0 {
            return Err(DetectionError::Config("max_large_inflight must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// `<config_dir>/stegcheckr/config.json`, when a config directory exists
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("stegcheckr").join("config.json"))
}

/// Builder for custom configurations
pub struct ConfigBuilder {
    config: DetectionConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: DetectionConfig::default(),
        }
    }

    pub fn from_preset(preset: SensitivityPreset) -> Self {
        Self {
            config: DetectionConfig::from_preset(preset),
        }
    }

    pub fn from_config(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// Replace a method's detected boundary; its suspicious boundary falls
    /// back to the global one
    pub fn threshold_override(mut self, method: DetectionMethod, detected: f32) -> Self {
        self.config.verdict.overrides.insert(method, detected.clamp(0.0, 1.0));
        self.config.verdict.suspicious_overrides.remove(&method);
        self
    }

    pub fn disable(mut self, method: DetectionMethod) -> Self {
        if !self.config.disabled_methods.contains(&method) {
            self.config.disabled_methods.push(method);
        }
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = Some(workers.max(1));
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn metadata(mut self, metadata: MetadataConfig) -> Self {
        self.config.metadata = metadata;
        self
    }

    pub fn rs(mut self, rs: RsConfig) -> Self {
        self.config.rs = rs;
        self
    }

    pub fn build(mut self) -> DetectionConfig {
        if self.config != DetectionConfig::from_preset(self.config.preset) {
            self.config.preset = SensitivityPreset::Custom;
        }
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
