// src/core/media.rs
//
// Media file identity: raw bytes, content hash and declared container format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{DetectionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
        })
    }
}

/// Container family, sniffed from magic bytes with the extension as fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Tiff,
    WebP,
    Wav,
    Flac,
    Mp3,
    Ogg,
    Unknown,
}

impl ContainerFormat {
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Self::Jpeg
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Self::Png
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Self::Gif
        } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
            Self::Tiff
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Self::WebP
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
            Self::Wav
        } else if bytes.starts_with(b"fLaC") {
            Self::Flac
        } else if bytes.starts_with(b"OggS") {
            Self::Ogg
        } else if bytes.starts_with(b"ID3") || is_mpeg_frame_sync(bytes) {
            Self::Mp3
        } else if bytes.len() >= 26 && bytes.starts_with(b"BM") {
            Self::Bmp
        } else {
            Self::Unknown
        }
    }

    pub fn from_extension(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_lowercase())
            .as_deref()
        {
            Some("jpg") | Some("jpeg") | Some("jpe") => Self::Jpeg,
            Some("png") => Self::Png,
            Some("gif") => Self::Gif,
            Some("bmp") => Self::Bmp,
            Some("tif") | Some("tiff") => Self::Tiff,
            Some("webp") => Self::WebP,
            Some("wav") | Some("wave") => Self::Wav,
            Some("flac") => Self::Flac,
            Some("mp3") => Self::Mp3,
            Some("ogg") | Some("oga") | Some("opus") => Self::Ogg,
            _ => Self::Unknown,
        }
    }

    pub fn kind(&self) -> Option<MediaKind> {
        match self {
            Self::Jpeg | Self::Png | Self::Gif | Self::Bmp | Self::Tiff | Self::WebP => {
                Some(MediaKind::Image)
            }
            Self::Wav | Self::Flac | Self::Mp3 | Self::Ogg => Some(MediaKind::Audio),
            Self::Unknown => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::WebP => "webp",
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
            Self::Unknown => "unknown",
        }
    }

    /// Extensions the CLI collects when traversing directories
    pub fn known_extensions() -> &'static [&'static str] {
        &[
            "jpg", "jpeg", "jpe", "png", "gif", "bmp", "tif", "tiff", "webp", "wav", "wave", "flac",
            "mp3", "ogg", "oga", "opus",
        ]
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn is_mpeg_frame_sync(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[0] == 0xFF && (bytes[1] & 0xE0) == 0xE0 && (bytes[1] & 0x06) != 0
}

/// A loaded media file. Bytes are shared read-only with every analyzer.
#[derive(Debug, Clone)]
pub struct MediaFile {
    path: Option<PathBuf>,
    name: String,
    content_hash: String,
    format: ContainerFormat,
    bytes: Arc<[u8]>,
}

impl MediaFile {
    /// Read a file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|source| DetectionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut media = Self::from_bytes(path.display().to_string(), bytes);
        if media.format == ContainerFormat::Unknown {
            media.format = ContainerFormat::from_extension(path);
        }
        media.path = Some(path.to_path_buf());
        Ok(media)
    }

    /// Wrap in-memory bytes; `name` identifies the file in reports
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let content_hash = format!("{:x}", md5::compute(&bytes));
        let format = ContainerFormat::sniff(&bytes);
        Self {
            path: None,
            name: name.into(),
            content_hash,
            format,
            bytes: Arc::from(bytes),
        }
    }

    /// Override the sniffed container format
    pub fn with_format(mut self, format: ContainerFormat) -> Self {
        self.format = format;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    pub fn kind(&self) -> Option<MediaKind> {
        self.format.kind()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
