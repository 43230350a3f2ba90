//! CLI argument model

use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::config::{default_config_path, ConfigBuilder, DetectionConfig, DetectionMethod, SensitivityPreset};
use crate::error::{DetectionError, Result};

/// Detect hidden data, anomalous metadata and appended files in images and audio
#[derive(Parser, Debug, Clone)]
#[command(name = "stegcheckr", version)]
pub struct Args {
    /// Files or directories to analyze
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Descend into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Per-method detected threshold, e.g. rs=0.5 (repeatable)
    #[arg(long = "threshold", value_name = "METHOD=VALUE", value_parser = parse_threshold)]
    pub thresholds: Vec<(DetectionMethod, f32)>,

    /// Per-file deadline in milliseconds
    #[arg(long, env = "STEGCHECKR_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Worker threads (default: available cores)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Sensitivity preset: standard, strict, lenient
    #[arg(long, value_parser = parse_preset)]
    pub preset: Option<SensitivityPreset>,

    /// JSON configuration file (default: the user config file, when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Skip a detection method (repeatable)
    #[arg(long = "disable", value_name = "METHOD", value_parser = parse_method)]
    pub disabled: Vec<DetectionMethod>,

    /// Seed for sampled analyses
    #[arg(long)]
    pub seed: Option<u64>,

    /// Emit a JSON document instead of text
    #[arg(long)]
    pub json: bool,

    /// Show evidence lines; repeat for trace logging
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

fn parse_method(s: &str) -> std::result::Result<DetectionMethod, String> {
    DetectionMethod::from_name(s).ok_or_else(|| {
        let known: Vec<&str> = DetectionMethod::all().iter().map(|m| m.name()).collect();
        format!("unknown method '{}' (expected one of: {})", s, known.join(", "))
    })
}

fn parse_threshold(s: &str) -> std::result::Result<(DetectionMethod, f32), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid threshold '{}', use METHOD=VALUE", s))?;
    let method = parse_method(name)?;
    let value: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid threshold value '{}'", value))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("threshold {} is outside [0, 1]", value));
    }
    Ok((method, value))
}

fn parse_preset(s: &str) -> std::result::Result<SensitivityPreset, String> {
    SensitivityPreset::from_name(s).ok_or_else(|| format!("unknown preset '{}'", s))
}

impl Args {
    /// Build the detection configuration: config file (explicit or default
    /// location) or preset, then command-line overrides on top.
    pub fn to_config(&self) -> Result<DetectionConfig> {
        let base = match (&self.config, self.preset) {
            (Some(path), _) => DetectionConfig::load(path)?,
            (None, Some(preset)) => DetectionConfig::from_preset(preset),
            (None, None) => match default_config_path().filter(|p| p.is_file()) {
                Some(path) => DetectionConfig::load(&path)?,
                None => DetectionConfig::default(),
            },
        };

        let mut builder = ConfigBuilder::from_config(base);
        for &(method, value) in &self.thresholds {
            builder = builder.threshold_override(method, value);
        }
        for &method in &self.disabled {
            builder = builder.disable(method);
        }
        if let Some(ms) = self.timeout_ms {
            builder = builder.timeout_ms(ms);
        }
        if let Some(workers) = self.workers {
            builder = builder.workers(workers);
        }
        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }

        let config = builder.build();
        config.validate()?;
        if config.disabled_methods.len() == DetectionMethod::all().len() {
            return Err(DetectionError::Config("every detection method is disabled".to_string()));
        }
        Ok(config)
    }
}
