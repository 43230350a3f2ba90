//! Vorbis comment blocks (FLAC `VORBIS_COMMENT`, Ogg Vorbis/Opus headers)

use super::{le_u32, MetaTag, TagKind, TagScan};

pub fn parse_comments(data: &[u8], base: u64, scan: &mut TagScan) {
    let Some(vendor_len) = le_u32(data, 0) else {
        scan.malformed(base, "vorbis comment header cut short");
        return;
    };
    let mut pos = 4 + vendor_len as usize;
    let Some(count) = le_u32(data, pos) else {
        scan.overrun(base, "vorbis vendor string", vendor_len as u64, data.len().saturating_sub(4) as u64);
        return;
    };
    pos += 4;

    for _ in 0..count {
        let Some(len) = le_u32(data, pos) else {
            scan.malformed(base + pos as u64, "vorbis comment list cut short");
            return;
        };
        let start = pos + 4;
        let available = data.len().saturating_sub(start) as u64;
        if len as u64 > available {
            scan.overrun(base + pos as u64, "vorbis comment", len as u64, available);
            return;
        }
        let entry = &data[start..start + len as usize];
        match entry.iter().position(|&b| b == b'=') {
            Some(eq) => {
                let key = String::from_utf8_lossy(&entry[..eq]).to_ascii_uppercase();
                let value = &entry[eq + 1..];
                let kind = match key.as_str() {
                    "METADATA_BLOCK_PICTURE" | "COVERART" => TagKind::Picture,
                    "COMMENT" | "DESCRIPTION" | "LYRICS" => TagKind::Comment,
                    _ => TagKind::Text,
                };
                let at = base + (start + eq + 1) as u64;
                scan.push(MetaTag::new("vorbis", key, kind, at, value).repeatable());
            }
            None => scan.malformed(base + start as u64, "vorbis comment without '='"),
        }
        pos = start + len as usize;
    }
}
