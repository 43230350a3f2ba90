// src/core/container/archive.rs
//
// Extents of non-media containers that are commonly smuggled inside media
// files: ZIP, PDF, 7z and ELF. Only structure is checked, never contents.

use super::{find, le_u16, le_u32, le_u64, Extent};

const ZIP_LOCAL: &[u8] = b"PK\x03\x04";
const ZIP_EOCD: &[u8] = b"PK\x05\x06";
const ZIP_EOCD_LEN: usize = 22;
const PDF_EOF: &[u8] = b"%%EOF";
const SEVEN_ZIP: &[u8] = b"7z\xBC\xAF\x27\x1C";

/// ZIP: local header up to the end-of-central-directory record whose
/// directory offset and size agree with its own position
pub fn zip_extent(bytes: &[u8]) -> Extent {
    if !bytes.starts_with(ZIP_LOCAL) || bytes.len() < 30 {
        return Extent::Invalid;
    }
    let mut from = 4;
    while let Some(eocd) = find(bytes, ZIP_EOCD, from) {
        let (Some(cd_size), Some(cd_offset), Some(comment_len)) =
            (le_u32(bytes, eocd + 12), le_u32(bytes, eocd + 16), le_u16(bytes, eocd + 20))
        else {
            return Extent::Truncated;
        };
        if cd_offset as u64 + cd_size as u64 == eocd as u64 {
            let end = eocd + ZIP_EOCD_LEN + comment_len as usize;
            return if end <= bytes.len() {
                Extent::Complete(end as u64)
            } else {
                Extent::Truncated
            };
        }
        from = eocd + 4;
    }
    Extent::Truncated
}

/// PDF: header up to the last `%%EOF` marker (incremental updates append more)
pub fn pdf_extent(bytes: &[u8]) -> Extent {
    if !bytes.starts_with(b"%PDF-") || !bytes.get(5).is_some_and(|b| b.is_ascii_digit()) {
        return Extent::Invalid;
    }
    let mut last = None;
    let mut from = 5;
    while let Some(at) = find(bytes, PDF_EOF, from) {
        last = Some(at);
        from = at + PDF_EOF.len();
    }
    let Some(at) = last else {
        return Extent::Truncated;
    };
    let mut end = at + PDF_EOF.len();
    // trailing end-of-line belongs to the marker
    if bytes.get(end) == Some(&b'\r') {
        end += 1;
    }
    if bytes.get(end) == Some(&b'\n') {
        end += 1;
    }
    Extent::Complete(end as u64)
}

/// 7z: the start header is CRC protected and locates the trailing header
pub fn seven_zip_extent(bytes: &[u8]) -> Extent {
    if !bytes.starts_with(SEVEN_ZIP) {
        return Extent::Invalid;
    }
    let (Some(stored), Some(next_offset), Some(next_size), Some(header)) =
        (le_u32(bytes, 8), le_u64(bytes, 12), le_u64(bytes, 20), bytes.get(12..32))
    else {
        return Extent::Invalid;
    };
    if crc32fast::hash(header) != stored {
        return Extent::Invalid;
    }
    let end = 32u64
        .checked_add(next_offset)
        .and_then(|v| v.checked_add(next_size));
    match end {
        Some(end) if end <= bytes.len() as u64 => Extent::Complete(end),
        Some(_) => Extent::Truncated,
        None => Extent::Invalid,
    }
}

/// ELF: furthest of the section and program header tables
pub fn elf_extent(bytes: &[u8]) -> Extent {
    if !bytes.starts_with(b"\x7FELF") || bytes.len() < 52 {
        return Extent::Invalid;
    }
    let class = bytes[4];
    let little = match bytes[5] {
        1 => true,
        2 => false,
        _ => return Extent::Invalid,
    };
    if bytes[6] != 1 || !(class == 1 || class == 2) {
        return Extent::Invalid;
    }

    let u16_at = |at: usize| {
        bytes
            .get(at..at + 2)
            .map(|b| if little { u16::from_le_bytes([b[0], b[1]]) } else { u16::from_be_bytes([b[0], b[1]]) } as u64)
    };
    let u32_at = |at: usize| {
        bytes.get(at..at + 4).map(|b| {
            let arr = [b[0], b[1], b[2], b[3]];
            (if little { u32::from_le_bytes(arr) } else { u32::from_be_bytes(arr) }) as u64
        })
    };
    let u64_at = |at: usize| {
        bytes.get(at..at + 8).map(|b| {
            let mut arr = [0u8; 8];
            arr.copy_from_slice(b);
            if little {
                u64::from_le_bytes(arr)
            } else {
                u64::from_be_bytes(arr)
            }
        })
    };

    let fields = if class == 1 {
        (u32_at(28), u32_at(32), u16_at(42), u16_at(44), u16_at(46), u16_at(48))
    } else {
        (u64_at(32), u64_at(40), u16_at(54), u16_at(56), u16_at(58), u16_at(60))
    };
    let (Some(phoff), Some(shoff), Some(phentsize), Some(phnum), Some(shentsize), Some(shnum)) = fields else {
        return Extent::Invalid;
    };

    let ph_end = phoff.saturating_add(phentsize.saturating_mul(phnum));
    let sh_end = shoff.saturating_add(shentsize.saturating_mul(shnum));
    let header_len = if class == 1 { 52 } else { 64 };
    let end = ph_end.max(sh_end).max(header_len);
    if phnum == 0 && shnum == 0 {
        return Extent::Invalid;
    }
    if end <= bytes.len() as u64 {
        Extent::Complete(end)
    } else {
        Extent::Truncated
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Stored (uncompressed) single-entry ZIP archive
    pub(crate) fn tiny_zip(name: &str, body: &[u8]) -> Vec<u8> {
        let crc = crc32fast::hash(body);
        let mut out = Vec::new();
        out.extend_from_slice(ZIP_LOCAL);
        out.extend_from_slice(&[20, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(body);

        let cd_offset = out.len();
        out.extend_from_slice(b"PK\x01\x02");
        out.extend_from_slice(&[20, 0, 20, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&[0; 12]);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        let cd_size = out.len() - cd_offset;

        out.extend_from_slice(ZIP_EOCD);
        out.extend_from_slice(&[0, 0, 0, 0, 1, 0, 1, 0]);
        out.extend_from_slice(&(cd_size as u32).to_le_bytes());
        out.extend_from_slice(&(cd_offset as u32).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    #[test]
    fn test_zip_extent() {
        let zip = tiny_zip("secret.txt", b"attack at dawn");
        let mut padded = zip.clone();
        padded.extend_from_slice(&[0; 10]);
        assert_eq!(zip_extent(&padded), Extent::Complete(zip.len() as u64));
        assert_eq!(zip_extent(&zip[..zip.len() - 22]), Extent::Truncated);
        assert_eq!(zip_extent(b"PK\x03\x04"), Extent::Invalid);
    }

    #[test]
    fn test_pdf_extent() {
        let pdf = b"%PDF-1.4\n1 0 obj<<>>endobj\ntrailer<<>>\n%%EOF\n".to_vec();
        let mut host = pdf.clone();
        host.extend_from_slice(b"junk");
        assert_eq!(pdf_extent(&host), Extent::Complete(pdf.len() as u64));
        assert_eq!(pdf_extent(b"%PDF-1.7 no end"), Extent::Truncated);
    }

    #[test]
    fn test_seven_zip_crc() {
        let mut header = [0u8; 20];
        header[0] = 4; // next header offset
        header[8] = 2; // next header size
        let mut file = SEVEN_ZIP.to_vec();
        file.extend_from_slice(&[0, 4]);
        file.extend_from_slice(&crc32fast::hash(&header).to_le_bytes());
        file.extend_from_slice(&header);
        file.extend_from_slice(&[0xAA; 6]);
        assert_eq!(seven_zip_extent(&file), Extent::Complete(38));

        file[12] = 5;
        assert_eq!(seven_zip_extent(&file), Extent::Invalid);
    }

    #[test]
    fn test_elf_extent() {
        let mut elf = vec![0u8; 64];
        elf[..4].copy_from_slice(b"\x7FELF");
        elf[4] = 2;
        elf[5] = 1;
        elf[6] = 1;
        elf[40..48].copy_from_slice(&64u64.to_le_bytes()); // shoff
        elf[58..60].copy_from_slice(&64u16.to_le_bytes()); // shentsize
        elf[60..62].copy_from_slice(&2u16.to_le_bytes()); // shnum
        elf.extend_from_slice(&[0; 128]);
        assert_eq!(elf_extent(&elf), Extent::Complete(192));
        assert_eq!(elf_extent(&elf[..100]), Extent::Truncated);
    }
}
