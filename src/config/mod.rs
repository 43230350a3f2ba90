//! Configuration module for StegCheckr

mod methods;
mod profiles;

pub use methods::{AudioMethod, DetectionMethod, ImageMethod};
pub use profiles::{
    default_config_path, CarvingConfig, ChiSquareConfig, ConfigBuilder, DetectionConfig,
    EchoHidingConfig, LsbPairsConfig, MetadataConfig, PhaseCodingConfig, RsConfig,
    SensitivityPreset, VerdictThresholds,
};
