// src/config/methods.rs
//
// Closed set of detection methods, grouped by the buffer they consume.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::media::MediaKind;

/// Statistical analyzers over decoded pixel planes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImageMethod {
    LsbPairs,
    ChiSquare,
    Rs,
}

/// Spectral / time-domain analyzers over PCM streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AudioMethod {
    PhaseCoding,
    EchoHiding,
}

/// Every method the orchestrator can dispatch.
///
/// Serialized as a flat snake_case string so it can key JSON maps
/// (threshold overrides) and appear verbatim in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum DetectionMethod {
    Metadata,
    Image(ImageMethod),
    Audio(AudioMethod),
    Carving,
}

impl DetectionMethod {
    pub const LSB_PAIRS: Self = Self::Image(ImageMethod::LsbPairs);
    pub const CHI_SQUARE: Self = Self::Image(ImageMethod::ChiSquare);
    pub const RS: Self = Self::Image(ImageMethod::Rs);
    pub const PHASE_CODING: Self = Self::Audio(AudioMethod::PhaseCoding);
    pub const ECHO_HIDING: Self = Self::Audio(AudioMethod::EchoHiding);

    pub fn all() -> Vec<Self> {
        vec![
            Self::Metadata,
            Self::LSB_PAIRS,
            Self::CHI_SQUARE,
            Self::RS,
            Self::PHASE_CODING,
            Self::ECHO_HIDING,
            Self::Carving,
        ]
    }

    /// Methods applicable to a media kind, in report order
    pub fn for_kind(kind: MediaKind) -> Vec<Self> {
        match kind {
            MediaKind::Image => vec![
                Self::Metadata,
                Self::LSB_PAIRS,
                Self::CHI_SQUARE,
                Self::RS,
                Self::Carving,
            ],
            MediaKind::Audio => vec![
                Self::Metadata,
                Self::PHASE_CODING,
                Self::ECHO_HIDING,
                Self::Carving,
            ],
        }
    }

    /// True when the method consumes the decoded sample buffer rather than raw bytes
    pub fn needs_samples(&self) -> bool {
        matches!(self, Self::Image(_) | Self::Audio(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Image(ImageMethod::LsbPairs) => "lsb_pairs",
            Self::Image(ImageMethod::ChiSquare) => "chi_square",
            Self::Image(ImageMethod::Rs) => "rs",
            Self::Audio(AudioMethod::PhaseCoding) => "phase_coding",
            Self::Audio(AudioMethod::EchoHiding) => "echo_hiding",
            Self::Carving => "carving",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase().replace('-', "_");
        match normalized.as_str() {
            "metadata" | "meta" => Some(Self::Metadata),
            "lsb_pairs" | "lsb" | "pairs" => Some(Self::LSB_PAIRS),
            "chi_square" | "chi2" | "chisquare" => Some(Self::CHI_SQUARE),
            "rs" | "regular_singular" => Some(Self::RS),
            "phase_coding" | "phase" => Some(Self::PHASE_CODING),
            "echo_hiding" | "echo" => Some(Self::ECHO_HIDING),
            "carving" | "carve" => Some(Self::Carving),
            _ => None,
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<DetectionMethod> for String {
    fn from(method: DetectionMethod) -> Self {
        method.name().to_string()
    }
}

impl TryFrom<String> for DetectionMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_name(&value).ok_or_else(|| format!("unknown detection method: {}", value))
    }
}
