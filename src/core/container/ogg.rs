// src/core/container/ogg.rs
//
// Ogg page walk. Pages are self-delimiting, so the last well-formed page
// bounds the stream. Comment headers are reassembled from the first
// logical stream's packets.

use std::collections::HashSet;

use super::{le_u32, vorbis, Extent, TagScan};

const CAPTURE: &[u8; 4] = b"OggS";
const HEADER_LEN: usize = 27;
const FLAG_BOS: u8 = 0x02;
const FLAG_EOS: u8 = 0x04;

#[derive(Debug, Clone, Copy)]
struct Page {
    flags: u8,
    serial: u32,
    /// Segment table offset and count
    segments: (usize, usize),
    body: usize,
    end: usize,
}

/// Parse the page at `at`; `Err(())` when it is cut short
fn page_at(bytes: &[u8], at: usize) -> Option<Result<Page, ()>> {
    if bytes.get(at..at + 4) != Some(CAPTURE.as_slice()) {
        return None;
    }
    let Some(header) = bytes.get(at..at + HEADER_LEN) else {
        return Some(Err(()));
    };
    if header[4] != 0 {
        return None;
    }
    let nsegs = header[26] as usize;
    let table = at + HEADER_LEN;
    let Some(lacing) = bytes.get(table..table + nsegs) else {
        return Some(Err(()));
    };
    let body = table + nsegs;
    let end = body + lacing.iter().map(|&l| l as usize).sum::<usize>();
    if end > bytes.len() {
        return Some(Err(()));
    }
    Some(Ok(Page {
        flags: header[5],
        serial: le_u32(header, 14).unwrap_or(0),
        segments: (table, nsegs),
        body,
        end,
    }))
}

struct Walk {
    pages: Vec<Page>,
    extent: Extent,
    /// Streams that began but never saw their EOS page
    unterminated: usize,
}

fn pages(bytes: &[u8]) -> Walk {
    let mut pages = Vec::new();
    let mut open = HashSet::new();
    let mut pos = 0usize;
    loop {
        match page_at(bytes, pos) {
            Some(Ok(page)) => {
                if page.flags & FLAG_BOS != 0 {
                    open.insert(page.serial);
                }
                if page.flags & FLAG_EOS != 0 {
                    open.remove(&page.serial);
                }
                pos = page.end;
                pages.push(page);
            }
            Some(Err(())) => {
                let extent = if pages.is_empty() { Extent::Invalid } else { Extent::Truncated };
                return Walk { pages, extent, unterminated: open.len() };
            }
            None => {
                let extent = if pages.is_empty() { Extent::Invalid } else { Extent::Complete(pos as u64) };
                return Walk { pages, extent, unterminated: open.len() };
            }
        }
    }
}

pub fn extent(bytes: &[u8]) -> Extent {
    pages(bytes).extent
}

/// First `limit` packets of the first logical stream with their start offsets
fn packets(bytes: &[u8], pages: &[Page], limit: usize) -> Vec<(u64, Vec<u8>)> {
    let Some(serial) = pages.first().map(|p| p.serial) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut current: Option<(u64, Vec<u8>)> = None;

    for page in pages.iter().filter(|p| p.serial == serial) {
        let (table, nsegs) = page.segments;
        let mut cursor = page.body;
        for &lace in &bytes[table..table + nsegs] {
            let segment = &bytes[cursor..cursor + lace as usize];
            let packet = current.get_or_insert_with(|| (cursor as u64, Vec::new()));
            packet.1.extend_from_slice(segment);
            cursor += lace as usize;
            if lace < 255 {
                if let Some(done) = current.take() {
                    out.push(done);
                }
                if out.len() >= limit {
                    return out;
                }
            }
        }
    }
    out
}

pub fn scan_tags(bytes: &[u8], scan: &mut TagScan) {
    let Walk { pages, extent, unterminated } = pages(bytes);
    let last_end = pages.last().map_or(0, |p| p.end) as u64;
    match extent {
        Extent::Invalid => {
            scan.malformed(0, "no Ogg page at start of file");
            return;
        }
        Extent::Truncated => scan.malformed(last_end, "Ogg page cut short"),
        Extent::Complete(_) if unterminated > 0 => {
            scan.malformed(last_end, format!("{} logical stream(s) end without an EOS page", unterminated))
        }
        Extent::Complete(_) => {}
    }

    for (offset, packet) in packets(bytes, &pages, 3) {
        if let Some(body) = packet.strip_prefix(b"\x03vorbis") {
            vorbis::parse_comments(body, offset + 7, scan);
        } else if let Some(body) = packet.strip_prefix(b"OpusTags") {
            vorbis::parse_comments(body, offset + 8, scan);
        }
    }
}
