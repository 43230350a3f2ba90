//! Structural walkers for the supported containers.
//!
//! Two questions are answered here, both from raw bytes only:
//!
//! - where does a container's own data end (`extent`), which the carving
//!   scanner uses for the host file and to validate embedded candidates;
//! - which tag segments does it carry (`scan_tags`), consumed by the
//!   metadata analyzer.
//!
//! Walkers never panic on adversarial input. Every length field is checked
//! against the bytes actually present before it is followed.

pub mod archive;
pub mod bmp;
pub mod flac;
pub mod gif;
pub mod jpeg;
pub mod mpeg;
pub mod ogg;
pub mod png;
pub mod riff;
pub mod tiff;
pub mod vorbis;

use std::fmt;

use super::media::ContainerFormat;
use crate::error::{DetectionError, Result};

/// Outcome of walking a container from its first byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    /// Structure terminated cleanly; the container spans `0..end`
    Complete(u64),
    /// Structure started correctly but ran out of bytes or broke mid-way
    Truncated,
    /// The leading bytes do not form this container
    Invalid,
}

impl Extent {
    pub fn end(&self) -> Option<u64> {
        match self {
            Extent::Complete(end) => Some(*end),
            _ => None,
        }
    }
}

/// Byte position where the host container's own data ends.
///
/// A host whose structure breaks before its terminator has no trailing data.
pub fn end_of_data(format: ContainerFormat, bytes: &[u8]) -> Result<u64> {
    let extent = match format {
        ContainerFormat::Jpeg => jpeg::extent(bytes),
        ContainerFormat::Png => png::extent(bytes),
        ContainerFormat::Gif => gif::extent(bytes),
        ContainerFormat::Bmp => bmp::extent(bytes),
        ContainerFormat::Wav | ContainerFormat::WebP => riff::extent(bytes),
        ContainerFormat::Mp3 => mpeg::extent(bytes),
        ContainerFormat::Ogg => ogg::extent(bytes),
        ContainerFormat::Tiff | ContainerFormat::Flac | ContainerFormat::Unknown => {
            return Err(DetectionError::UnsupportedFormat(format!(
                "end of data cannot be determined for {} containers",
                format
            )))
        }
    };
    match extent {
        Extent::Complete(end) => Ok(end),
        Extent::Truncated => Ok(bytes.len() as u64),
        Extent::Invalid => Err(DetectionError::CorruptMedia(format!(
            "host does not parse as {}",
            format
        ))),
    }
}

/// Collect tag segments and structural anomalies of one container
pub fn scan_tags(format: ContainerFormat, bytes: &[u8]) -> TagScan {
    let mut scan = TagScan::default();
    match format {
        ContainerFormat::Jpeg => jpeg::scan_tags(bytes, &mut scan),
        ContainerFormat::Png => png::scan_tags(bytes, &mut scan),
        ContainerFormat::Gif => gif::scan_tags(bytes, &mut scan),
        ContainerFormat::Tiff => tiff::scan_tags(bytes, &mut scan),
        ContainerFormat::Wav | ContainerFormat::WebP => riff::scan_tags(bytes, &mut scan),
        ContainerFormat::Mp3 => mpeg::scan_tags(bytes, &mut scan),
        ContainerFormat::Flac => flac::scan_tags(bytes, &mut scan),
        ContainerFormat::Ogg => ogg::scan_tags(bytes, &mut scan),
        ContainerFormat::Bmp | ContainerFormat::Unknown => {}
    }
    scan
}

/// How a tag's value is meant to be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    /// Human-readable text
    Text,
    /// Free-form comment or XML packet
    Comment,
    /// Opaque binary payload
    Binary,
    /// Embedded picture (cover art, thumbnail)
    Picture,
}

impl TagKind {
    pub fn name(&self) -> &'static str {
        match self {
            TagKind::Text => "text",
            TagKind::Comment => "comment",
            TagKind::Binary => "binary",
            TagKind::Picture => "picture",
        }
    }
}

/// Character set a text value is stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextCharset {
    #[default]
    Utf8,
    /// ISO 8859-1: every byte is one code point
    Latin1,
}

impl TextCharset {
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            TextCharset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextCharset::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }
}

/// One tag segment found in a container
#[derive(Debug, Clone, PartialEq)]
pub struct MetaTag {
    /// Tag family, e.g. `exif`, `id3v2`, `png`
    pub family: &'static str,
    pub id: String,
    pub kind: TagKind,
    pub charset: TextCharset,
    /// Absolute offset of the value within the file
    pub offset: u64,
    pub value: Vec<u8>,
    /// The container legitimately allows several values under one id
    pub repeatable: bool,
}

impl MetaTag {
    pub fn new(family: &'static str, id: impl Into<String>, kind: TagKind, offset: u64, value: &[u8]) -> Self {
        Self {
            family,
            id: id.into(),
            kind,
            charset: TextCharset::Utf8,
            offset,
            value: value.to_vec(),
            repeatable: false,
        }
    }

    pub fn with_charset(mut self, charset: TextCharset) -> Self {
        self.charset = charset;
        self
    }

    pub fn latin1(self) -> Self {
        self.with_charset(TextCharset::Latin1)
    }

    /// Value as text in the tag's declared charset
    pub fn text(&self) -> String {
        self.charset.decode(&self.value)
    }

    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    pub fn label(&self) -> String {
        format!("{}:{}", self.family, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnomalyKind {
    /// A length field claims more bytes than the segment holds
    SizeOverrun { declared: u64, available: u64 },
    /// Stored checksum disagrees with the segment contents
    ChecksumMismatch { stored: u32, computed: u32 },
    /// Padding that should be zero carries data
    HiddenPadding { nonzero: u64, len: u64 },
}

/// Structural inconsistency in a tag segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralAnomaly {
    pub offset: u64,
    pub segment: String,
    pub kind: AnomalyKind,
}

impl fmt::Display for StructuralAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AnomalyKind::SizeOverrun { declared, available } => write!(
                f,
                "{} at offset {} declares {} bytes but only {} are present",
                self.segment, self.offset, declared, available
            ),
            AnomalyKind::ChecksumMismatch { stored, computed } => write!(
                f,
                "{} at offset {} has checksum {:08x}, contents hash to {:08x}",
                self.segment, self.offset, stored, computed
            ),
            AnomalyKind::HiddenPadding { nonzero, len } => write!(
                f,
                "{} at offset {} carries {} non-zero bytes in {} bytes of padding",
                self.segment, self.offset, nonzero, len
            ),
        }
    }
}

/// Everything the metadata analyzer needs from one container
#[derive(Debug, Default)]
pub struct TagScan {
    pub tags: Vec<MetaTag>,
    pub anomalies: Vec<StructuralAnomaly>,
    /// Segments that could not be parsed (`MalformedMetadataSegment`)
    pub malformed: Vec<DetectionError>,
}

impl TagScan {
    pub(crate) fn push(&mut self, tag: MetaTag) {
        self.tags.push(tag);
    }

    pub(crate) fn malformed(&mut self, offset: u64, reason: impl Into<String>) {
        self.malformed.push(DetectionError::MalformedMetadataSegment {
            offset,
            reason: reason.into(),
        });
    }

    pub(crate) fn overrun(&mut self, offset: u64, segment: impl Into<String>, declared: u64, available: u64) {
        self.anomalies.push(StructuralAnomaly {
            offset,
            segment: segment.into(),
            kind: AnomalyKind::SizeOverrun { declared, available },
        });
    }

    pub(crate) fn anomaly(&mut self, offset: u64, segment: impl Into<String>, kind: AnomalyKind) {
        self.anomalies.push(StructuralAnomaly {
            offset,
            segment: segment.into(),
            kind,
        });
    }
}

pub(crate) fn be_u16(bytes: &[u8], at: usize) -> Option<u16> {
    bytes.get(at..at + 2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

pub(crate) fn be_u32(bytes: &[u8], at: usize) -> Option<u32> {
    bytes.get(at..at + 4).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

pub(crate) fn le_u16(bytes: &[u8], at: usize) -> Option<u16> {
    bytes.get(at..at + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

pub(crate) fn le_u32(bytes: &[u8], at: usize) -> Option<u32> {
    bytes.get(at..at + 4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub(crate) fn le_u64(bytes: &[u8], at: usize) -> Option<u64> {
    bytes.get(at..at + 8).map(|b| {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        u64::from_le_bytes(buf)
    })
}

/// Position of `needle` in `haystack` at or after `from`
pub(crate) fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readers_bounds() {
        let bytes = [1, 2, 3];
        assert_eq!(be_u16(&bytes, 1), Some(0x0203));
        assert_eq!(le_u16(&bytes, 0), Some(0x0201));
        assert_eq!(be_u32(&bytes, 0), None);
        assert_eq!(le_u64(&bytes, 0), None);
    }

    #[test]
    fn test_find() {
        assert_eq!(find(b"abcabc", b"ca", 0), Some(2));
        assert_eq!(find(b"abcabc", b"ab", 1), Some(3));
        assert_eq!(find(b"abc", b"zz", 0), None);
    }

    #[test]
    fn test_undeterminable_end_of_data() {
        let err = end_of_data(ContainerFormat::Flac, b"fLaC").unwrap_err();
        assert!(matches!(err, DetectionError::UnsupportedFormat(_)));
    }
}
