// src/core/container/riff.rs
//
// RIFF (WAVE, WEBP, AVI) walker: outer size field plus LIST/INFO and
// embedded ID3 chunks.

use super::{le_u32, mpeg, Extent, MetaTag, TagKind, TagScan};

/// RIFF form type at offset 8, when present
pub fn form_type(bytes: &[u8]) -> Option<&[u8]> {
    if bytes.starts_with(b"RIFF") {
        bytes.get(8..12)
    } else {
        None
    }
}

pub fn extent(bytes: &[u8]) -> Extent {
    let (Some(form), Some(size)) = (form_type(bytes), le_u32(bytes, 4)) else {
        return Extent::Invalid;
    };
    if !form.iter().all(|b| b.is_ascii_graphic() || *b == b' ') || size < 4 {
        return Extent::Invalid;
    }
    let end = 8 + size as u64 + (size as u64 & 1);
    if end > bytes.len() as u64 {
        // odd-sized files often omit the final pad byte
        if end - 1 == bytes.len() as u64 && size & 1 == 1 {
            return Extent::Complete(end - 1);
        }
        Extent::Truncated
    } else {
        Extent::Complete(end)
    }
}

pub fn scan_tags(bytes: &[u8], scan: &mut TagScan) {
    if form_type(bytes).is_none() {
        scan.malformed(0, "missing RIFF header");
        return;
    }
    let end = match extent(bytes) {
        Extent::Complete(end) => end as usize,
        _ => {
            let declared = le_u32(bytes, 4).unwrap_or(0) as u64 + 8;
            scan.overrun(0, "riff header", declared, bytes.len() as u64);
            bytes.len()
        }
    };
    walk_chunks(bytes, 12, end, false, scan);
}

fn walk_chunks(bytes: &[u8], mut pos: usize, end: usize, in_info: bool, scan: &mut TagScan) {
    while pos + 8 <= end {
        let id = &bytes[pos..pos + 4];
        let Some(size) = le_u32(bytes, pos + 4) else { return };
        let data_start = pos + 8;
        let available = end.saturating_sub(data_start) as u64;
        let name = String::from_utf8_lossy(id).into_owned();
        if size as u64 > available {
            scan.overrun(pos as u64, format!("riff {} chunk", name.trim_end()), size as u64, available);
            return;
        }
        let data = &bytes[data_start..data_start + size as usize];

        if in_info {
            // INFO values are NUL-terminated strings
            let value = data.strip_suffix(&[0]).unwrap_or(data);
            let kind = if id == b"ICMT" { TagKind::Comment } else { TagKind::Text };
            scan.push(MetaTag::new("riff", name, kind, data_start as u64, value).latin1());
        } else if id == b"LIST" && data.starts_with(b"INFO") {
            walk_chunks(bytes, data_start + 4, data_start + size as usize, true, scan);
        } else if id.eq_ignore_ascii_case(b"id3 ") {
            mpeg::parse_id3v2(data, data_start as u64, scan);
        } else if id == b"XMP " {
            scan.push(MetaTag::new("xmp", "packet", TagKind::Comment, data_start as u64, data));
        } else if id == b"EXIF" {
            super::tiff::parse(data, data_start as u64, "exif", scan);
        }

        pos = data_start + size as usize + (size as usize & 1);
    }
}
