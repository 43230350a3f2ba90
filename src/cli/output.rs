//! Output formatting for CLI results

use colorful::Colorful;
use serde::Serialize;
use std::path::Path;

use crate::detection::{DetectionReport, EmbeddedStatus, Finding, Severity, Verdict};

fn colored_verdict(verdict: Verdict) -> String {
    let label = format!("{} {}", verdict.symbol(), verdict.to_string().to_uppercase());
    match verdict {
        Verdict::Clean => label.green().bold().to_string(),
        Verdict::Suspicious => label.yellow().bold().to_string(),
        Verdict::Detected => label.red().bold().to_string(),
    }
}

fn colored_severity(finding: &Finding) -> String {
    let symbol = finding.severity().symbol();
    match finding.severity() {
        Severity::Info => symbol.dim().to_string(),
        Severity::Low => symbol.yellow().to_string(),
        Severity::Medium => symbol.light_red().to_string(),
        Severity::High => symbol.red().to_string(),
    }
}

/// Format one report for terminal output
pub fn format_report(report: &DetectionReport, verbose: bool) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "{} {} {}\n",
        colored_verdict(report.verdict),
        report.file.as_str().bold(),
        format!("[{} {}, {} bytes]", report.media_kind, report.format, report.byte_len).dim()
    ));
    output.push_str(&format!("  {}\n", report.verdict.description()));

    if !report.findings.is_empty() {
        output.push_str("\n  Findings:\n");
        for finding in &report.findings {
            output.push_str(&format_finding(finding, verbose));
        }
    }

    if !report.embedded_files.is_empty() {
        output.push_str("\n  Embedded files:\n");
        for embedded in &report.embedded_files {
            let status = match embedded.status {
                EmbeddedStatus::Validated => "validated".red().to_string(),
                EmbeddedStatus::Truncated => "truncated".yellow().to_string(),
                EmbeddedStatus::SignatureOnly => "signature only".dim().to_string(),
            };
            output.push_str(&format!(
                "    {} at {}..{} ({} bytes, {}, confidence {:.0}%)\n",
                embedded.format,
                embedded.offset.start,
                embedded.offset.end,
                embedded.len(),
                status,
                embedded.confidence * 100.0
            ));
        }
    }

    if verbose {
        if let Some(trailing) = report.trailing_bytes {
            output.push_str(&format!("  {}\n", format!("{} bytes after end of data", trailing).dim()));
        }
        let ran: Vec<&str> = report.methods_run.iter().map(|m| m.name()).collect();
        output.push_str(&format!("  {}\n", format!("methods: {}", ran.join(", ")).dim()));
        output.push_str(&format!("  {}\n", format!("md5 {}  seed {}", report.content_hash, report.seed).dim()));
    }

    for failure in &report.failures {
        output.push_str(&format!(
            "  {} {} {}: {}\n",
            "!".yellow(),
            failure.method,
            format!("({})", failure.reason.name()).dim(),
            failure.message
        ));
    }

    output
}

fn format_finding(finding: &Finding, verbose: bool) -> String {
    let mut output = format!(
        "    {} {:<13} {:>4.0}%  {}",
        colored_severity(finding),
        finding.method.name(),
        finding.score * 100.0,
        finding.rationale
    );
    if let Some(bytes) = finding.estimated_payload_bytes {
        output.push_str(&format!(" (~{} bytes)", bytes));
    }
    if finding.partial {
        output.push_str(&format!(" {}", "[partial]".dim()));
    }
    output.push('\n');

    if verbose {
        for line in &finding.evidence {
            output.push_str(&format!("      {}\n", line.as_str().dim()));
        }
    }
    output
}

/// Error line for a file that could not be analyzed
pub fn format_error(path: &Path, error: &str) -> String {
    format!("{} {}\n  {}\n", "✗ ERROR".red().bold(), path.display().to_string().bold(), error)
}

/// Format a summary for multiple files
pub fn format_summary(reports: &[DetectionReport], errors: usize) -> String {
    let count = |v: Verdict| reports.iter().filter(|r| r.verdict == v).count();
    let (clean, suspicious, detected) = (count(Verdict::Clean), count(Verdict::Suspicious), count(Verdict::Detected));

    let mut output = format!("\n{}\n", "Summary:".bold());
    output.push_str(&format!("  {} files analyzed\n", reports.len() + errors));
    if clean > 0 {
        output.push_str(&format!("  {}\n", format!("✓ {} clean", clean).green()));
    }
    if suspicious > 0 {
        output.push_str(&format!("  {}\n", format!("? {} suspicious", suspicious).yellow()));
    }
    if detected > 0 {
        output.push_str(&format!("  {}\n", format!("✗ {} detected", detected).red()));
    }
    if errors > 0 {
        output.push_str(&format!("  {}\n", format!("! {} failed to load", errors).dark_gray()));
    }
    output
}

#[derive(Debug, Serialize)]
struct JsonError<'a> {
    path: String,
    error: &'a str,
}

#[derive(Debug, Serialize)]
struct JsonEnvelope<'a> {
    tool: &'static str,
    version: &'static str,
    generated_at: String,
    reports: &'a [DetectionReport],
    errors: Vec<JsonError<'a>>,
}

/// Serialize reports and load errors as one JSON document
pub fn format_json(reports: &[DetectionReport], errors: &[(std::path::PathBuf, String)]) -> serde_json::Result<String> {
    let envelope = JsonEnvelope {
        tool: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        generated_at: chrono::Utc::now().to_rfc3339(),
        reports,
        errors: errors
            .iter()
            .map(|(path, error)| JsonError {
                path: path.display().to_string(),
                error: error.as_str(),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&envelope)
}
