// src/core/container/png.rs
//
// PNG chunk walk with CRC verification (crc32fast) and text chunk parsing.

use super::{be_u32, tiff, AnomalyKind, Extent, MetaTag, TagKind, TagScan};

pub const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const STANDARD_CHUNKS: &[&[u8; 4]] = &[
    b"IHDR", b"PLTE", b"IDAT", b"IEND", b"tRNS", b"cHRM", b"gAMA", b"iCCP", b"sBIT", b"sRGB",
    b"bKGD", b"hIST", b"pHYs", b"sPLT", b"tIME", b"acTL", b"fcTL", b"fdAT", b"cICP", b"mDCv",
    b"cLLi",
];

/// One chunk: type, offset of its length field, data range, stored CRC
#[derive(Debug, Clone, Copy)]
struct Chunk {
    kind: [u8; 4],
    offset: usize,
    data: (usize, usize),
    crc: u32,
}

impl Chunk {
    fn computed_crc(&self, bytes: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&bytes[self.offset + 4..self.data.1]);
        hasher.finalize()
    }

    fn name(&self) -> String {
        String::from_utf8_lossy(&self.kind).into_owned()
    }
}

struct Walk {
    chunks: Vec<Chunk>,
    extent: Extent,
    overrun: Option<(usize, u64, u64)>,
}

fn walk(bytes: &[u8]) -> Walk {
    let mut out = Walk {
        chunks: Vec::new(),
        extent: Extent::Truncated,
        overrun: None,
    };
    if !bytes.starts_with(&SIGNATURE) {
        out.extent = Extent::Invalid;
        return out;
    }

    let mut pos = SIGNATURE.len();
    while pos + 8 <= bytes.len() {
        let Some(len) = be_u32(bytes, pos) else { break };
        let mut kind = [0u8; 4];
        kind.copy_from_slice(&bytes[pos + 4..pos + 8]);

        if !kind.iter().all(|b| b.is_ascii_alphabetic()) || (out.chunks.is_empty() && &kind != b"IHDR") {
            if out.chunks.is_empty() {
                out.extent = Extent::Invalid;
            }
            return out;
        }

        let data_start = pos + 8;
        let end = data_start as u64 + len as u64 + 4;
        if end > bytes.len() as u64 {
            let available = bytes.len().saturating_sub(data_start) as u64;
            out.overrun = Some((pos, len as u64, available));
            return out;
        }
        let data_end = data_start + len as usize;
        let crc = be_u32(bytes, data_end).unwrap_or(0);
        out.chunks.push(Chunk {
            kind,
            offset: pos,
            data: (data_start, data_end),
            crc,
        });

        if &kind == b"IEND" {
            out.extent = Extent::Complete(end);
            return out;
        }
        pos = end as usize;
    }
    out
}

pub fn extent(bytes: &[u8]) -> Extent {
    walk(bytes).extent
}

pub fn scan_tags(bytes: &[u8], scan: &mut TagScan) {
    let walked = walk(bytes);
    if let Some((offset, declared, available)) = walked.overrun {
        scan.overrun(offset as u64, "png chunk", declared, available);
    }

    for chunk in &walked.chunks {
        let computed = chunk.computed_crc(bytes);
        if computed != chunk.crc {
            scan.anomaly(
                chunk.offset as u64,
                format!("png {} chunk", chunk.name()),
                AnomalyKind::ChecksumMismatch {
                    stored: chunk.crc,
                    computed,
                },
            );
        }

        let (start, end) = chunk.data;
        let data = &bytes[start..end];
        let abs = start as u64;

        match &chunk.kind {
            b"tEXt" => match split_keyword(data) {
                Some((keyword, text)) => scan.push(
                    MetaTag::new("png", keyword, TagKind::Text, abs + (data.len() - text.len()) as u64, text)
                        .latin1()
                        .repeatable(),
                ),
                None => scan.malformed(abs, "tEXt chunk without keyword terminator"),
            },
            b"zTXt" => match split_keyword(data) {
                Some((keyword, rest)) if !rest.is_empty() => {
                    let compressed = &rest[1..];
                    let at = abs + (data.len() - compressed.len()) as u64;
                    scan.push(MetaTag::new("png", keyword, TagKind::Binary, at, compressed).repeatable());
                }
                _ => scan.malformed(abs, "zTXt chunk without keyword or compression method"),
            },
            b"iTXt" => parse_itxt(data, abs, scan),
            b"eXIf" => tiff::parse(data, abs, "exif", scan),
            kind if STANDARD_CHUNKS.contains(&kind) => {}
            _ => scan.push(MetaTag::new("png", chunk.name(), TagKind::Binary, abs, data).repeatable()),
        }
    }
}

/// Latin-1 keyword (1-79 bytes) terminated by NUL
fn split_keyword(data: &[u8]) -> Option<(String, &[u8])> {
    let nul = data.iter().position(|&b| b == 0)?;
    if nul == 0 || nul > 79 {
        return None;
    }
    let keyword = data[..nul].iter().map(|&b| b as char).collect();
    Some((keyword, &data[nul + 1..]))
}

fn parse_itxt(data: &[u8], abs: u64, scan: &mut TagScan) {
    let Some((keyword, rest)) = split_keyword(data) else {
        scan.malformed(abs, "iTXt chunk without keyword terminator");
        return;
    };
    if rest.len() < 2 {
        scan.malformed(abs, "iTXt chunk cut short");
        return;
    }
    let compressed = rest[0] != 0;
    let rest = &rest[2..];
    // language tag, then translated keyword, both NUL terminated
    let Some(lang_end) = rest.iter().position(|&b| b == 0) else {
        scan.malformed(abs, "iTXt language tag unterminated");
        return;
    };
    let rest = &rest[lang_end + 1..];
    let Some(trans_end) = rest.iter().position(|&b| b == 0) else {
        scan.malformed(abs, "iTXt translated keyword unterminated");
        return;
    };
    let text = &rest[trans_end + 1..];
    let at = abs + (data.len() - text.len()) as u64;

    let kind = if compressed {
        TagKind::Binary
    } else if keyword == "XML:com.adobe.xmp" {
        TagKind::Comment
    } else {
        TagKind::Text
    };
    let family = if keyword == "XML:com.adobe.xmp" { "xmp" } else { "png" };
    scan.push(MetaTag::new(family, keyword, kind, at, text).repeatable());
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = (data.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(kind);
        hasher.update(data);
        out.extend_from_slice(&hasher.finalize().to_be_bytes());
        out
    }

    pub(crate) fn png_with(chunks: &[Vec<u8>]) -> Vec<u8> {
        let mut out = SIGNATURE.to_vec();
        out.extend(chunk(b"IHDR", &[0, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0, 0]));
        for c in chunks {
            out.extend_from_slice(c);
        }
        out.extend(chunk(b"IDAT", &[0x78, 0x9C, 0x63, 0, 0, 0, 1, 0, 1]));
        out.extend(chunk(b"IEND", &[]));
        out
    }

    #[test]
    fn test_extent_stops_at_iend() {
        let png = png_with(&[]);
        let mut host = png.clone();
        host.extend_from_slice(b"appended");
        assert_eq!(extent(&host), Extent::Complete(png.len() as u64));
        assert_eq!(extent(&png[..png.len() - 3]), Extent::Truncated);
        assert_eq!(extent(b"\x89PNG\r\n\x1a\n\0\0\0\0JUNK"), Extent::Invalid);
    }

    #[test]
    fn test_text_chunks() {
        let png = png_with(&[
            chunk(b"tEXt", b"Author\0Jane"),
            chunk(b"iTXt", b"Title\0\0\0en\0\0Sunset"),
        ]);
        let mut scan = TagScan::default();
        scan_tags(&png, &mut scan);
        assert_eq!(scan.tags.len(), 2);
        assert_eq!(scan.tags[0].id, "Author");
        assert_eq!(scan.tags[0].value, b"Jane");
        assert_eq!(scan.tags[1].value, b"Sunset");
        assert!(scan.anomalies.is_empty());
    }

    #[test]
    fn test_crc_mismatch_and_unknown_chunk() {
        let mut bad = chunk(b"tEXt", b"Key\0Value");
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        let png = png_with(&[bad, chunk(b"stEg", b"\x01\x02\x03")]);
        let mut scan = TagScan::default();
        scan_tags(&png, &mut scan);
        assert_eq!(scan.anomalies.len(), 1);
        assert!(matches!(scan.anomalies[0].kind, AnomalyKind::ChecksumMismatch { .. }));
        assert!(scan.tags.iter().any(|t| t.id == "stEg" && t.kind == TagKind::Binary));
    }

    #[test]
    fn test_missing_keyword_is_malformed() {
        let png = png_with(&[chunk(b"tEXt", b"no terminator")]);
        let mut scan = TagScan::default();
        scan_tags(&png, &mut scan);
        assert_eq!(scan.malformed.len(), 1);
        assert!(scan.tags.is_empty());
    }
}
