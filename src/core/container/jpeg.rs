// src/core/container/jpeg.rs
//
// JPEG marker walk. Entropy-coded data after each SOS is skipped byte-wise
// (stuffed 0xFF00 and RSTn markers stay inside the scan) so progressive
// files with several scans reach their real EOI.

use super::{be_u16, be_u32, tiff, Extent, MetaTag, TagKind, TagScan};

pub const SOI: [u8; 2] = [0xFF, 0xD8];

const EXIF_ID: &[u8] = b"Exif\0\0";
const XMP_ID: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const XMP_EXT_ID: &[u8] = b"http://ns.adobe.com/xmp/extension/\0";
const ICC_ID: &[u8] = b"ICC_PROFILE\0";
const PHOTOSHOP_ID: &[u8] = b"Photoshop 3.0\0";

/// A marker segment with a length field
#[derive(Debug, Clone, Copy)]
struct Segment {
    marker: u8,
    /// Offset of the 0xFF of the marker
    offset: usize,
    /// Payload after the length field
    payload: (usize, usize),
}

struct Walk {
    segments: Vec<Segment>,
    extent: Extent,
    /// Length field that ran past the end of the buffer
    overrun: Option<(usize, u64, u64)>,
}

/// Index of the next marker after entropy-coded data starting at `from`
fn skip_entropy(bytes: &[u8], from: usize) -> usize {
    let mut i = from;
    while i + 1 < bytes.len() {
        match bytes[i..].iter().position(|&b| b == 0xFF) {
            None => return bytes.len(),
            Some(p) => i += p,
        }
        if i + 1 >= bytes.len() {
            break;
        }
        match bytes[i + 1] {
            0x00 | 0xD0..=0xD7 => i += 2,
            0xFF => i += 1,
            _ => return i,
        }
    }
    bytes.len()
}

fn walk(bytes: &[u8]) -> Walk {
    let mut out = Walk {
        segments: Vec::new(),
        extent: Extent::Truncated,
        overrun: None,
    };
    if !bytes.starts_with(&SOI) {
        out.extent = Extent::Invalid;
        return out;
    }

    let mut pos = 2;
    loop {
        if pos >= bytes.len() {
            return out;
        }
        if bytes[pos] != 0xFF {
            if pos == 2 {
                out.extent = Extent::Invalid;
            }
            return out;
        }
        while pos + 1 < bytes.len() && bytes[pos + 1] == 0xFF {
            pos += 1;
        }
        if pos + 1 >= bytes.len() {
            return out;
        }

        let marker = bytes[pos + 1];
        match marker {
            0xD9 => {
                out.extent = Extent::Complete(pos as u64 + 2);
                return out;
            }
            0x01 | 0xD0..=0xD8 => pos += 2,
            0x00 => {
                if pos == 2 {
                    out.extent = Extent::Invalid;
                }
                return out;
            }
            _ => {
                let Some(len) = be_u16(bytes, pos + 2) else {
                    return out;
                };
                if len < 2 {
                    if pos == 2 {
                        out.extent = Extent::Invalid;
                    }
                    return out;
                }
                let end = pos + 2 + len as usize;
                if end > bytes.len() {
                    let available = (bytes.len() - (pos + 4).min(bytes.len())) as u64;
                    out.overrun = Some((pos, len as u64 - 2, available));
                    return out;
                }
                out.segments.push(Segment {
                    marker,
                    offset: pos,
                    payload: (pos + 4, end),
                });
                pos = if marker == 0xDA { skip_entropy(bytes, end) } else { end };
            }
        }
    }
}

pub fn extent(bytes: &[u8]) -> Extent {
    walk(bytes).extent
}

pub fn scan_tags(bytes: &[u8], scan: &mut TagScan) {
    let walked = walk(bytes);
    if let Some((offset, declared, available)) = walked.overrun {
        scan.overrun(offset as u64, format!("jpeg segment 0x{:02x}", bytes[offset + 1]), declared, available);
    }

    for segment in &walked.segments {
        let (start, end) = segment.payload;
        let payload = &bytes[start..end];
        let abs = start as u64;

        match segment.marker {
            0xFE => scan.push(MetaTag::new("jpeg", "comment", TagKind::Comment, abs, payload).latin1().repeatable()),
            0xE1 if payload.starts_with(EXIF_ID) => {
                tiff::parse(&payload[EXIF_ID.len()..], abs + EXIF_ID.len() as u64, "exif", scan)
            }
            0xE1 if payload.starts_with(XMP_ID) => {
                let body = &payload[XMP_ID.len()..];
                scan.push(MetaTag::new("xmp", "packet", TagKind::Comment, abs + XMP_ID.len() as u64, body));
            }
            0xE1 if payload.starts_with(XMP_EXT_ID) => {
                let body = &payload[XMP_EXT_ID.len()..];
                scan.push(
                    MetaTag::new("xmp", "extension", TagKind::Comment, abs + XMP_EXT_ID.len() as u64, body)
                        .repeatable(),
                );
            }
            0xE2 if payload.starts_with(ICC_ID) => {
                scan.push(MetaTag::new("jpeg", "icc", TagKind::Binary, abs, payload).repeatable())
            }
            0xED if payload.starts_with(PHOTOSHOP_ID) => {
                parse_photoshop(&payload[PHOTOSHOP_ID.len()..], abs + PHOTOSHOP_ID.len() as u64, scan)
            }
            0xE0 if payload.starts_with(b"JFIF\0") => {}
            0xE0 if payload.starts_with(b"JFXX\0") => {
                scan.push(MetaTag::new("jpeg", "jfxx", TagKind::Picture, abs, payload))
            }
            0xEE if payload.starts_with(b"Adobe") => {}
            m @ 0xE0..=0xEF => scan.push(
                MetaTag::new("jpeg", format!("app{}", m - 0xE0), TagKind::Binary, abs, payload).repeatable(),
            ),
            _ => {}
        }
    }
}

/// Photoshop image resource blocks ("8BIM") of an APP13 segment
fn parse_photoshop(data: &[u8], base: u64, scan: &mut TagScan) {
    let mut pos = 0usize;
    while pos + 12 <= data.len() {
        if &data[pos..pos + 4] != b"8BIM" {
            scan.malformed(base + pos as u64, "expected 8BIM resource signature");
            return;
        }
        let Some(id) = be_u16(data, pos + 4) else { return };
        let name_len = data[pos + 6] as usize;
        // Pascal string padded to an even length including its length byte
        let name_total = (name_len + 1 + 1) & !1;
        let size_at = pos + 6 + name_total;
        let Some(size) = be_u32(data, size_at) else {
            scan.malformed(base + pos as u64, "resource header cut short");
            return;
        };
        let body = size_at + 4;
        let available = data.len().saturating_sub(body) as u64;
        if size as u64 > available {
            scan.overrun(base + pos as u64, format!("photoshop resource 0x{:04x}", id), size as u64, available);
            return;
        }
        let value = &data[body..body + size as usize];
        match id {
            0x0404 => parse_iptc(value, base + body as u64, scan),
            0x0409 | 0x040C => scan.push(MetaTag::new("photoshop", "thumbnail", TagKind::Picture, base + body as u64, value)),
            _ => {}
        }
        pos = body + ((size as usize + 1) & !1);
    }
}

/// IPTC-IIM datasets: 0x1C, record, dataset, u16 length, value
fn parse_iptc(data: &[u8], base: u64, scan: &mut TagScan) {
    let mut pos = 0usize;
    while pos + 5 <= data.len() {
        if data[pos] != 0x1C {
            // Trailing pad bytes are common
            if data[pos..].iter().all(|&b| b == 0) {
                return;
            }
            scan.malformed(base + pos as u64, "expected IPTC tag marker 0x1c");
            return;
        }
        let record = data[pos + 1];
        let dataset = data[pos + 2];
        let Some(len) = be_u16(data, pos + 3) else { return };
        if len & 0x8000 != 0 {
            scan.malformed(base + pos as u64, "extended IPTC dataset length");
            return;
        }
        let start = pos + 5;
        let available = data.len().saturating_sub(start) as u64;
        if len as u64 > available {
            scan.overrun(base + pos as u64, format!("iptc {}:{}", record, dataset), len as u64, available);
            return;
        }
        let value = &data[start..start + len as usize];
        let id = format!("{}:{}", record, dataset);
        let tag = MetaTag::new("iptc", id, TagKind::Text, base + start as u64, value);
        // Object name, headline and caption are single-valued
        let tag = if record == 2 && matches!(dataset, 5 | 105 | 120) { tag } else { tag.repeatable() };
        scan.push(tag);
        pos = start + len as usize;
    }
}
