// src/core/container/tiff.rs
//
// TIFF IFD tree walker. Shared by TIFF files, JPEG APP1 Exif segments and
// PNG eXIf chunks. Follows the IFD chain plus Exif / GPS / Interop / SubIFD
// pointers with a visited set against pointer cycles.

use std::collections::HashSet;

use super::{be_u16, be_u32, le_u16, le_u32, MetaTag, TagKind, TagScan};

const MAX_IFDS: usize = 32;

const TAG_SUB_IFDS: u16 = 0x014A;
const TAG_XMP: u16 = 0x02BC;
const TAG_THUMB_OFFSET: u16 = 0x0201;
const TAG_THUMB_LENGTH: u16 = 0x0202;
const TAG_IPTC: u16 = 0x83BB;
const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_ICC: u16 = 0x8773;
const TAG_GPS_IFD: u16 = 0x8825;
const TAG_USER_COMMENT: u16 = 0x9286;
const TAG_MAKER_NOTE: u16 = 0x927C;
const TAG_INTEROP_IFD: u16 = 0xA005;

#[derive(Debug, Clone, Copy)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn u16(self, bytes: &[u8], at: usize) -> Option<u16> {
        match self {
            Endian::Little => le_u16(bytes, at),
            Endian::Big => be_u16(bytes, at),
        }
    }

    fn u32(self, bytes: &[u8], at: usize) -> Option<u32> {
        match self {
            Endian::Little => le_u32(bytes, at),
            Endian::Big => be_u32(bytes, at),
        }
    }
}

fn type_size(field_type: u16) -> Option<u64> {
    match field_type {
        1 | 2 | 6 | 7 => Some(1),
        3 | 8 => Some(2),
        4 | 9 | 11 | 13 => Some(4),
        5 | 10 | 12 => Some(8),
        _ => None,
    }
}

/// Whole-file TIFF
pub fn scan_tags(bytes: &[u8], scan: &mut TagScan) {
    parse(bytes, 0, "tiff", scan);
}

/// Walk a TIFF structure located at absolute offset `base`
pub fn parse(data: &[u8], base: u64, family: &'static str, scan: &mut TagScan) {
    let endian = match data.get(0..2) {
        Some(b"II") => Endian::Little,
        Some(b"MM") => Endian::Big,
        _ => {
            scan.malformed(base, "missing TIFF byte-order mark");
            return;
        }
    };
    if endian.u16(data, 2) != Some(42) {
        scan.malformed(base + 2, "bad TIFF magic");
        return;
    }
    let Some(first) = endian.u32(data, 4) else {
        scan.malformed(base + 4, "missing first IFD offset");
        return;
    };

    let mut queue: Vec<(u32, String)> = vec![(first, "ifd0".to_string())];
    let mut visited = HashSet::new();
    let mut chain_index = 0usize;

    while let Some((offset, name)) = queue.pop() {
        if offset == 0 || !visited.insert(offset) {
            continue;
        }
        if visited.len() > MAX_IFDS {
            scan.malformed(base + offset as u64, "too many IFDs");
            break;
        }
        let next = walk_ifd(data, base, family, endian, offset as usize, &name, &mut queue, scan);
        if name.starts_with("ifd") {
            if let Some(next) = next {
                chain_index += 1;
                queue.push((next, format!("ifd{}", chain_index)));
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn walk_ifd(
    data: &[u8],
    base: u64,
    family: &'static str,
    endian: Endian,
    offset: usize,
    name: &str,
    queue: &mut Vec<(u32, String)>,
    scan: &mut TagScan,
) -> Option<u32> {
    let abs = base + offset as u64;
    let Some(count) = endian.u16(data, offset) else {
        scan.malformed(abs, format!("{} offset lies outside the segment", name));
        return None;
    };
    let entries_start = offset + 2;
    let declared = count as u64 * 12;
    let available = data.len().saturating_sub(entries_start) as u64;
    let usable = if declared > available {
        scan.overrun(abs, format!("{} {} entries", family, name), declared, available);
        (available / 12) as usize
    } else {
        count as usize
    };

    let mut thumb_offset = None;
    let mut thumb_length = None;

    for i in 0..usable {
        let entry = entries_start + i * 12;
        let (Some(tag), Some(field_type), Some(n), Some(value_field)) = (
            endian.u16(data, entry),
            endian.u16(data, entry + 2),
            endian.u32(data, entry + 4),
            endian.u32(data, entry + 8),
        ) else {
            break;
        };
        let entry_abs = base + entry as u64;

        let Some(size) = type_size(field_type) else {
            scan.malformed(entry_abs, format!("{} tag 0x{:04x} has unknown field type {}", name, tag, field_type));
            continue;
        };
        let total = size * n as u64;
        let value_at = if total <= 4 { entry + 8 } else { value_field as usize };
        let segment = format!("{} {} tag 0x{:04x}", family, name, tag);

        if value_at as u64 + total > data.len() as u64 {
            scan.overrun(entry_abs, segment, total, data.len().saturating_sub(value_at) as u64);
            continue;
        }
        let value = &data[value_at..value_at + total as usize];

        match tag {
            TAG_EXIF_IFD => queue.push((value_field, "exif".to_string())),
            TAG_GPS_IFD => queue.push((value_field, "gps".to_string())),
            TAG_INTEROP_IFD => queue.push((value_field, "interop".to_string())),
            TAG_SUB_IFDS => {
                for k in 0..n as usize {
                    if let Some(sub) = endian.u32(value, k * 4) {
                        queue.push((sub, format!("subifd{}", k)));
                    }
                }
            }
            TAG_THUMB_OFFSET => thumb_offset = Some(value_field),
            TAG_THUMB_LENGTH => thumb_length = Some(value_field),
            _ => {}
        }

        let id = format!("{}.0x{:04x}", name, tag);
        let kind = match (tag, field_type) {
            (TAG_USER_COMMENT, _) | (TAG_XMP, _) => Some(TagKind::Comment),
            (TAG_MAKER_NOTE, _) | (TAG_IPTC, _) | (TAG_ICC, _) => Some(TagKind::Binary),
            (_, 2) => Some(TagKind::Text),
            (_, 1) | (_, 7) if total > 4 => Some(TagKind::Binary),
            _ => None,
        };
        if let Some(kind) = kind {
            let value = if kind == TagKind::Text {
                // NUL terminator is part of the ASCII encoding
                value.strip_suffix(&[0]).unwrap_or(value)
            } else {
                value
            };
            scan.push(MetaTag::new(family, id, kind, base + value_at as u64, value));
        }
    }

    if let (Some(start), Some(len)) = (thumb_offset, thumb_length) {
        let (start, len) = (start as u64, len as u64);
        if start + len > data.len() as u64 {
            scan.overrun(abs, format!("{} {} thumbnail", family, name), len, (data.len() as u64).saturating_sub(start));
        } else {
            let bytes = &data[start as usize..(start + len) as usize];
            scan.push(MetaTag::new(family, format!("{}.thumbnail", name), TagKind::Picture, base + start, bytes));
        }
    }

    let next_at = entries_start + usable * 12;
    if usable == count as usize {
        endian.u32(data, next_at)
    } else {
        None
    }
}
