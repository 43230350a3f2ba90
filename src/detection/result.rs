//! Detection result types and verdict aggregation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

use crate::config::{DetectionMethod, VerdictThresholds};
use crate::core::media::{ContainerFormat, MediaKind};
use crate::error::DetectionError;

/// Display severity for a finding score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn from_score(score: f32) -> Self {
        match score {
            s if s >= 0.85 => Severity::High,
            s if s >= 0.65 => Severity::Medium,
            s if s >= 0.30 => Severity::Low,
            _ => Severity::Info,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Severity::Info => "ℹ",
            Severity::Low => "⚠",
            Severity::Medium => "⚠",
            Severity::High => "✗",
        }
    }
}

/// One analyzer's judgement about a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub method: DetectionMethod,
    /// Suspicion in [0, 1]
    pub score: f32,
    pub rationale: String,
    /// Present only for methods that estimate capacity (RS)
    pub estimated_payload_bytes: Option<u64>,
    /// Supporting measurements, one line each
    pub evidence: Vec<String>,
    /// Set when the analyzer recovered from a malformed input segment
    pub partial: bool,
}

impl Finding {
    pub fn new(method: DetectionMethod, score: f32, rationale: impl Into<String>) -> Self {
        let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            method,
            score,
            rationale: rationale.into(),
            estimated_payload_bytes: None,
            evidence: Vec::new(),
            partial: false,
        }
    }

    /// Null finding for inputs the method cannot judge
    pub fn insufficient(method: DetectionMethod, reason: impl fmt::Display) -> Self {
        Self::new(method, 0.0, format!("insufficient data: {}", reason))
    }

    /// Zero-score finding for a segment the analyzer could not parse
    pub fn unparseable(method: DetectionMethod, offset: u64, reason: impl fmt::Display) -> Self {
        let mut finding = Self::new(method, 0.0, format!("unparseable segment at offset {}", offset));
        finding.evidence.push(reason.to_string());
        finding.partial = true;
        finding
    }

    pub fn with_payload(mut self, bytes: u64) -> Self {
        self.estimated_payload_bytes = Some(bytes);
        self
    }

    pub fn with_evidence(mut self, line: impl Into<String>) -> Self {
        self.evidence.push(line.into());
        self
    }

    pub fn severity(&self) -> Severity {
        Severity::from_score(self.score)
    }
}

/// Structural corroboration of a carved candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddedStatus {
    /// Terminator or internal length consistent
    Validated,
    /// Signature found, structure incomplete
    Truncated,
    /// Magic bytes only; likely a false positive
    SignatureOnly,
}

impl EmbeddedStatus {
    pub fn confidence(&self) -> f32 {
        match self {
            EmbeddedStatus::Validated => 0.95,
            EmbeddedStatus::Truncated => 0.6,
            EmbeddedStatus::SignatureOnly => 0.2,
        }
    }
}

/// A container found inside the host file's byte stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedFile {
    /// Byte range within the host file (end exclusive)
    pub offset: Range<u64>,
    pub format: String,
    pub status: EmbeddedStatus,
    pub confidence: f32,
}

impl EmbeddedFile {
    pub fn new(offset: Range<u64>, format: impl Into<String>, status: EmbeddedStatus) -> Self {
        Self {
            offset,
            format: format.into(),
            status,
            confidence: status.confidence(),
        }
    }

    pub fn len(&self) -> u64 {
        self.offset.end.saturating_sub(self.offset.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Why a method produced no result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    UnsupportedFormat,
    CorruptMedia,
    Cancelled,
    Timeout,
}

impl FailureReason {
    pub fn from_error(error: &DetectionError) -> Self {
        match error {
            DetectionError::Cancelled => FailureReason::Cancelled,
            DetectionError::Timeout { .. } => FailureReason::Timeout,
            DetectionError::UnsupportedFormat(_) => FailureReason::UnsupportedFormat,
            _ => FailureReason::CorruptMedia,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FailureReason::UnsupportedFormat => "unsupported_format",
            FailureReason::CorruptMedia => "corrupt_media",
            FailureReason::Cancelled => "cancelled",
            FailureReason::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodFailure {
    pub method: DetectionMethod,
    pub reason: FailureReason,
    pub message: String,
}

impl MethodFailure {
    pub fn from_error(method: DetectionMethod, error: &DetectionError) -> Self {
        Self {
            method,
            reason: FailureReason::from_error(error),
            message: error.to_string(),
        }
    }
}

/// Overall verdict for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Clean,
    Suspicious,
    Detected,
}

impl Verdict {
    pub fn symbol(&self) -> &'static str {
        match self {
            Verdict::Clean => "✓",
            Verdict::Suspicious => "?",
            Verdict::Detected => "✗",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Verdict::Clean => "No hidden content detected",
            Verdict::Suspicious => "Suspicious",
            Verdict::Detected => "Hidden content likely",
        }
    }

    /// Combine findings and carved files under the configured boundaries
    pub fn derive(findings: &[Finding], embedded: &[EmbeddedFile], thresholds: &VerdictThresholds) -> Self {
        let mut verdict = Verdict::Clean;

        for finding in findings {
            let (suspicious, detected) = thresholds.for_method(finding.method);
            let level = if finding.score >= detected {
                Verdict::Detected
            } else if finding.score >= suspicious {
                Verdict::Suspicious
            } else {
                Verdict::Clean
            };
            verdict = verdict.max(level);
        }

        for file in embedded {
            let level = match file.status {
                EmbeddedStatus::Validated => Verdict::Detected,
                EmbeddedStatus::Truncated | EmbeddedStatus::SignatureOnly => Verdict::Suspicious,
            };
            verdict = verdict.max(level);
        }

        verdict
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verdict::Clean => "clean",
            Verdict::Suspicious => "suspicious",
            Verdict::Detected => "detected",
        };
        f.write_str(name)
    }
}

/// Aggregate result of one analysis run; immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub file: String,
    pub content_hash: String,
    pub media_kind: MediaKind,
    pub format: ContainerFormat,
    pub byte_len: u64,
    pub verdict: Verdict,
    pub findings: Vec<Finding>,
    pub embedded_files: Vec<EmbeddedFile>,
    /// Bytes after the host container's end-of-data, when it could be determined
    pub trailing_bytes: Option<u64>,
    pub methods_run: Vec<DetectionMethod>,
    pub failures: Vec<MethodFailure>,
    pub seed: u64,
}

impl DetectionReport {
    /// Highest score per method, in report order
    pub fn max_score(&self, method: DetectionMethod) -> Option<f32> {
        self.findings
            .iter()
            .filter(|f| f.method == method)
            .map(|f| f.score)
            .fold(None, |acc, s| Some(acc.map_or(s, |a: f32| a.max(s))))
    }

    pub fn failure(&self, method: DetectionMethod) -> Option<&MethodFailure> {
        self.failures.iter().find(|f| f.method == method)
    }

    pub fn findings_for(&self, method: DetectionMethod) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.method == method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_from_score() {
        assert_eq!(Severity::from_score(0.9), Severity::High);
        assert_eq!(Severity::from_score(0.7), Severity::Medium);
        assert_eq!(Severity::from_score(0.4), Severity::Low);
        assert_eq!(Severity::from_score(0.1), Severity::Info);
    }

    #[test]
    fn test_finding_score_is_clamped() {
        assert_eq!(Finding::new(DetectionMethod::RS, 1.7, "x").score, 1.0);
        assert_eq!(Finding::new(DetectionMethod::RS, -0.2, "x").score, 0.0);
        assert_eq!(Finding::new(DetectionMethod::RS, f32::NAN, "x").score, 0.0);
    }

    #[test]
    fn test_verdict_boundaries() {
        let thresholds = VerdictThresholds::default();
        let low = vec![Finding::new(DetectionMethod::LSB_PAIRS, 0.29, "low")];
        assert_eq!(Verdict::derive(&low, &[], &thresholds), Verdict::Clean);

        let mid = vec![Finding::new(DetectionMethod::LSB_PAIRS, 0.3, "mid")];
        assert_eq!(Verdict::derive(&mid, &[], &thresholds), Verdict::Suspicious);

        let high = vec![
            Finding::new(DetectionMethod::CHI_SQUARE, 0.1, "low"),
            Finding::new(DetectionMethod::RS, 0.7, "high"),
        ];
        assert_eq!(Verdict::derive(&high, &[], &thresholds), Verdict::Detected);
    }

    #[test]
    fn test_verdict_from_embedded_files() {
        let thresholds = VerdictThresholds::default();
        let truncated = vec![EmbeddedFile::new(10..20, "zip", EmbeddedStatus::Truncated)];
        assert_eq!(Verdict::derive(&[], &truncated, &thresholds), Verdict::Suspicious);

        let validated = vec![EmbeddedFile::new(10..20, "zip", EmbeddedStatus::Validated)];
        assert_eq!(Verdict::derive(&[], &validated, &thresholds), Verdict::Detected);
    }

    #[test]
    fn test_chi_square_needs_extreme_scores() {
        let thresholds = VerdictThresholds::default();
        let textured = vec![Finding::new(DetectionMethod::CHI_SQUARE, 0.86, "pairs")];
        assert_eq!(Verdict::derive(&textured, &[], &thresholds), Verdict::Clean);
        let flattened = vec![Finding::new(DetectionMethod::CHI_SQUARE, 0.985, "pairs")];
        assert_eq!(Verdict::derive(&flattened, &[], &thresholds), Verdict::Suspicious);
        let equalized = vec![Finding::new(DetectionMethod::CHI_SQUARE, 0.995, "pairs")];
        assert_eq!(Verdict::derive(&equalized, &[], &thresholds), Verdict::Detected);
    }

    #[test]
    fn test_verdict_respects_override() {
        let mut thresholds = VerdictThresholds::default();
        thresholds.overrides.insert(DetectionMethod::ECHO_HIDING, 0.95);
        let findings = vec![Finding::new(DetectionMethod::ECHO_HIDING, 0.8, "echo")];
        assert_eq!(Verdict::derive(&findings, &[], &thresholds), Verdict::Suspicious);
    }

    #[test]
    fn test_failure_reason_mapping() {
        assert_eq!(
            FailureReason::from_error(&DetectionError::Timeout { budget_ms: 1 }),
            FailureReason::Timeout
        );
        assert_eq!(FailureReason::from_error(&DetectionError::Cancelled), FailureReason::Cancelled);
        assert_eq!(
            FailureReason::from_error(&DetectionError::CorruptMedia("x".into())),
            FailureReason::CorruptMedia
        );
    }
}
