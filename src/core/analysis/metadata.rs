// src/core/analysis/metadata.rs
//
// Metadata analysis: oversized tags, binary data hidden in text tags,
// inconsistent segment length/checksum fields and conflicting duplicates.

use std::collections::BTreeMap;

use log::debug;

use crate::config::{DetectionMethod, MetadataConfig};
use crate::core::container::{self, AnomalyKind, MetaTag, StructuralAnomaly, TagKind};
use crate::core::media::MediaFile;
use crate::detection::Finding;
use crate::error::DetectionError;

const METHOD: DetectionMethod = DetectionMethod::Metadata;

/// Score for a stored checksum that disagrees with the segment
const CHECKSUM_SCORE: f32 = 0.5;
/// Score added per additional distinct value of a non-repeatable tag
const DUPLICATE_STEP: f32 = 0.4;
/// Non-zero padding bytes at which hidden padding scores 1.0
const PADDING_SATURATION: f32 = 64.0;

/// Scan every tag segment of the container. Never fails: unparseable
/// segments come back as partial findings with score 0.
pub fn analyze(media: &MediaFile, config: &MetadataConfig) -> Vec<Finding> {
    let scan = container::scan_tags(media.format(), media.bytes());
    debug!(
        "{}: {} tags, {} anomalies, {} malformed segments",
        media.name(),
        scan.tags.len(),
        scan.anomalies.len(),
        scan.malformed.len()
    );

    let mut findings = Vec::new();
    for tag in &scan.tags {
        if let Some(finding) = check_length(tag, config) {
            findings.push(finding);
        }
        if tag.kind == TagKind::Text {
            if let Some(finding) = check_printable(tag, config) {
                findings.push(finding);
            }
        }
    }
    findings.extend(scan.anomalies.iter().map(score_anomaly));
    findings.extend(check_duplicates(&scan.tags));
    findings.extend(scan.malformed.iter().map(|err| match err {
        DetectionError::MalformedMetadataSegment { offset, reason } => Finding::unparseable(METHOD, *offset, reason),
        other => Finding::unparseable(METHOD, 0, other),
    }));
    findings
}

fn limit_for(kind: TagKind, config: &MetadataConfig) -> usize {
    match kind {
        TagKind::Text => config.text_limit,
        TagKind::Comment | TagKind::Binary => config.binary_limit,
        TagKind::Picture => config.picture_limit,
    }
}

/// `min(1, observed / limit - 1)`
fn overflow_score(observed: f64, limit: f64) -> f32 {
    if limit <= 0.0 {
        return 1.0;
    }
    (observed / limit - 1.0).clamp(0.0, 1.0) as f32
}

fn check_length(tag: &MetaTag, config: &MetadataConfig) -> Option<Finding> {
    let limit = limit_for(tag.kind, config);
    let len = tag.value.len();
    if len <= limit {
        return None;
    }
    let finding = Finding::new(
        METHOD,
        overflow_score(len as f64, limit as f64),
        format!(
            "{} tag {} is {} bytes, exceeding the {}-byte limit",
            tag.kind.name(),
            tag.label(),
            len,
            limit
        ),
    )
    .with_evidence(format!("value at offset {}", tag.offset))
    .with_evidence(format!("overflow {} bytes", len - limit));
    Some(finding)
}

/// Runs of control characters (or undecodable sequences) in decoded tag text
fn nonprintable_runs(text: &str, min_run: usize) -> (usize, usize) {
    let mut total = 0usize;
    let mut runs = 0usize;
    let mut current = 0usize;

    let mut close = |current: &mut usize| {
        if *current >= min_run {
            total += *current;
            runs += 1;
        }
        *current = 0;
    };

    for c in text.chars() {
        let printable = !(c.is_control() && !matches!(c, '\t' | '\n' | '\r')) && c != char::REPLACEMENT_CHARACTER;
        if printable {
            close(&mut current);
        } else {
            current += 1;
        }
    }
    close(&mut current);
    (total, runs)
}

fn check_printable(tag: &MetaTag, config: &MetadataConfig) -> Option<Finding> {
    let (chars, runs) = nonprintable_runs(&tag.text(), config.nonprintable_run);
    if runs == 0 {
        return None;
    }
    let finding = Finding::new(
        METHOD,
        overflow_score(chars as f64, config.nonprintable_run as f64),
        format!(
            "text tag {} holds {} non-printable characters in {} run(s)",
            tag.label(),
            chars,
            runs
        ),
    )
    .with_evidence(format!("value at offset {}", tag.offset));
    Some(finding)
}

fn score_anomaly(anomaly: &StructuralAnomaly) -> Finding {
    let score = match anomaly.kind {
        AnomalyKind::SizeOverrun { declared, available } => {
            if available == 0 {
                1.0
            } else {
                overflow_score(declared as f64, available as f64)
            }
        }
        AnomalyKind::ChecksumMismatch { .. } => CHECKSUM_SCORE,
        AnomalyKind::HiddenPadding { nonzero, .. } => 0.5 + 0.5 * (nonzero as f32 / PADDING_SATURATION).min(1.0),
    };
    Finding::new(METHOD, score, anomaly.to_string())
}

/// Non-repeatable tags that appear more than once with different values
fn check_duplicates(tags: &[MetaTag]) -> Vec<Finding> {
    let mut groups: BTreeMap<String, Vec<&MetaTag>> = BTreeMap::new();
    for tag in tags.iter().filter(|t| !t.repeatable) {
        groups.entry(tag.label()).or_default().push(tag);
    }

    groups
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .filter_map(|(label, group)| {
            let mut values: Vec<&[u8]> = group.iter().map(|t| t.value.as_slice()).collect();
            values.sort_unstable();
            values.dedup();
            let distinct = values.len();
            if distinct < 2 {
                return None;
            }
            let score = (DUPLICATE_STEP * (distinct - 1) as f32).min(1.0);
            let mut finding = Finding::new(
                METHOD,
                score,
                format!("tag {} appears {} times with {} different values", label, group.len(), distinct),
            );
            for tag in group {
                finding = finding.with_evidence(format!("offset {}: {} bytes", tag.offset, tag.value.len()));
            }
            Some(finding)
        })
        .collect()
}
