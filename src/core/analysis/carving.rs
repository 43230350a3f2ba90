// src/core/analysis/carving.rs
//
// File carving past the host's end-of-data. The raw bytes after the host
// container terminates are searched for known container signatures; each
// candidate is validated by walking its own structure.

use aho_corasick::{AhoCorasick, Input, MatchKind};
use log::debug;

use crate::config::CarvingConfig;
use crate::core::cancel::CancelToken;
use crate::core::container::{self, archive, bmp, gif, jpeg, png, riff, Extent};
use crate::core::media::MediaFile;
use crate::detection::{EmbeddedFile, EmbeddedStatus};
use crate::error::{DetectionError, Result};

struct Signature {
    magic: &'static [u8],
    format: &'static str,
    extent: fn(&[u8]) -> Extent,
    /// Too short to report unless the structure validates
    weak: bool,
}

const SIGNATURES: &[Signature] = &[
    Signature { magic: &[0xFF, 0xD8, 0xFF], format: "jpeg", extent: jpeg::extent, weak: false },
    Signature { magic: &png::SIGNATURE, format: "png", extent: png::extent, weak: false },
    Signature { magic: b"GIF87a", format: "gif", extent: gif::extent, weak: false },
    Signature { magic: b"GIF89a", format: "gif", extent: gif::extent, weak: false },
    Signature { magic: b"PK\x03\x04", format: "zip", extent: archive::zip_extent, weak: false },
    Signature { magic: b"%PDF-", format: "pdf", extent: archive::pdf_extent, weak: false },
    Signature { magic: b"7z\xBC\xAF\x27\x1C", format: "7z", extent: archive::seven_zip_extent, weak: false },
    Signature { magic: b"RIFF", format: "riff", extent: riff::extent, weak: false },
    Signature { magic: b"\x7FELF", format: "elf", extent: archive::elf_extent, weak: false },
    Signature { magic: b"BM", format: "bmp", extent: bmp::extent, weak: true },
];

/// Result of carving one host file
#[derive(Debug, Clone, PartialEq)]
pub struct CarvingScan {
    /// Offset where the host container's own data ends
    pub end_of_data: u64,
    pub trailing_bytes: u64,
    pub embedded: Vec<EmbeddedFile>,
}

fn format_name(signature: &Signature, candidate: &[u8]) -> &'static str {
    if signature.magic != b"RIFF" {
        return signature.format;
    }
    match riff::form_type(candidate) {
        Some(b"WAVE") => "wav",
        Some(b"AVI ") => "avi",
        Some(b"WEBP") => "webp",
        _ => signature.format,
    }
}

fn matcher() -> Result<AhoCorasick> {
    AhoCorasick::builder()
        .match_kind(MatchKind::LeftmostFirst)
        .build(SIGNATURES.iter().map(|s| s.magic))
        .map_err(|e| DetectionError::Config(format!("carving signature table: {}", e)))
}

/// Scan the bytes after the host's end-of-data for embedded containers.
///
/// Fails with `UnsupportedFormat` for hosts whose end-of-data cannot be
/// determined and `CorruptMedia` when the host does not parse at all.
pub fn scan(media: &MediaFile, config: &CarvingConfig, cancel: &CancelToken) -> Result<CarvingScan> {
    let bytes = media.bytes();
    let end_of_data = container::end_of_data(media.format(), bytes)?.min(bytes.len() as u64);
    let tail = &bytes[end_of_data as usize..];
    let mut result = CarvingScan {
        end_of_data,
        trailing_bytes: tail.len() as u64,
        embedded: Vec::new(),
    };
    if tail.is_empty() {
        return Ok(result);
    }

    let matcher = matcher()?;
    let mut pos = 0usize;
    let mut examined = 0usize;
    while pos < tail.len() && examined < config.max_candidates {
        cancel.checkpoint()?;
        let Some(found) = matcher.find(Input::new(tail).range(pos..)) else {
            break;
        };
        examined += 1;
        let signature = &SIGNATURES[found.pattern().as_usize()];
        let start = found.start();
        let candidate = &tail[start..];
        let format = format_name(signature, candidate);
        let absolute = end_of_data + start as u64;
        pos = start + 1;

        let embedded = match (signature.extent)(candidate) {
            Extent::Complete(len) => {
                // candidates nested inside a validated container belong to it
                pos = start + (len as usize).max(1);
                EmbeddedFile::new(absolute..absolute + len, format, EmbeddedStatus::Validated)
            }
            Extent::Truncated => EmbeddedFile::new(absolute..bytes.len() as u64, format, EmbeddedStatus::Truncated),
            Extent::Invalid if signature.weak => continue,
            Extent::Invalid => EmbeddedFile::new(
                absolute..absolute + signature.magic.len() as u64,
                format,
                EmbeddedStatus::SignatureOnly,
            ),
        };
        debug!(
            "{}: {} candidate at {}..{} ({:?})",
            media.name(),
            embedded.format,
            embedded.offset.start,
            embedded.offset.end,
            embedded.status
        );
        result.embedded.push(embedded);
    }

    if examined >= config.max_candidates {
        debug!("{}: carving stopped after {} candidates", media.name(), examined);
    }
    Ok(result)
}
