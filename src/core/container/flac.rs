// src/core/container/flac.rs
//
// FLAC metadata block walk. Audio frames carry no length field, so the
// stream end is not derivable without decoding; only tags are read here.

use super::{be_u32, vorbis, AnomalyKind, MetaTag, TagKind, TagScan};

const STREAMINFO: u8 = 0;
const PADDING: u8 = 1;
const APPLICATION: u8 = 2;
const SEEKTABLE: u8 = 3;
const VORBIS_COMMENT: u8 = 4;
const CUESHEET: u8 = 5;
const PICTURE: u8 = 6;

pub fn scan_tags(bytes: &[u8], scan: &mut TagScan) {
    if !bytes.starts_with(b"fLaC") {
        scan.malformed(0, "missing fLaC marker");
        return;
    }

    let mut pos = 4usize;
    loop {
        let Some(&header) = bytes.get(pos) else {
            scan.malformed(pos as u64, "metadata ended without a last-block flag");
            return;
        };
        let Some(len_bytes) = bytes.get(pos + 1..pos + 4) else {
            scan.malformed(pos as u64, "metadata block header cut short");
            return;
        };
        let last = header & 0x80 != 0;
        let block_type = header & 0x7F;
        let len = ((len_bytes[0] as usize) << 16) | ((len_bytes[1] as usize) << 8) | len_bytes[2] as usize;
        let start = pos + 4;
        let available = bytes.len().saturating_sub(start);

        if block_type == 127 {
            scan.malformed(pos as u64, "invalid metadata block type 127");
            return;
        }
        if len > available {
            scan.overrun(pos as u64, format!("flac block type {}", block_type), len as u64, available as u64);
            return;
        }
        let data = &bytes[start..start + len];
        let at = start as u64;

        match block_type {
            STREAMINFO | SEEKTABLE | CUESHEET => {}
            PADDING => {
                let nonzero = data.iter().filter(|&&b| b != 0).count() as u64;
                if nonzero > 0 {
                    scan.anomaly(
                        at,
                        "flac padding block",
                        AnomalyKind::HiddenPadding {
                            nonzero,
                            len: len as u64,
                        },
                    );
                }
            }
            APPLICATION => {
                let app = data.get(..4).map(|id| String::from_utf8_lossy(id).into_owned()).unwrap_or_default();
                let payload = data.get(4..).unwrap_or_default();
                scan.push(
                    MetaTag::new("flac", format!("application:{}", app), TagKind::Binary, at + 4, payload).repeatable(),
                );
            }
            VORBIS_COMMENT => vorbis::parse_comments(data, at, scan),
            PICTURE => parse_picture(data, at, scan),
            other => scan.push(MetaTag::new("flac", format!("block{}", other), TagKind::Binary, at, data).repeatable()),
        }

        if last {
            return;
        }
        pos = start + len;
    }
}

/// PICTURE block: picture type, MIME, description, geometry, then the data
fn parse_picture(data: &[u8], base: u64, scan: &mut TagScan) {
    let field = |at: usize| be_u32(data, at).map(|v| v as usize);
    let parsed = (|| {
        let mime_len = field(4)?;
        let desc_at = 8 + mime_len;
        let desc_len = field(desc_at)?;
        let data_len_at = desc_at + 4 + desc_len + 16;
        let data_len = field(data_len_at)?;
        Some((desc_at + 4, desc_len, data_len_at + 4, data_len))
    })();

    let Some((desc_start, desc_len, pic_start, pic_len)) = parsed else {
        scan.malformed(base, "picture block header cut short");
        return;
    };
    let available = data.len().saturating_sub(pic_start);
    if pic_len > available || desc_start + desc_len > data.len() {
        scan.overrun(base, "flac picture", pic_len as u64, available as u64);
        return;
    }
    if desc_len > 0 {
        let desc = &data[desc_start..desc_start + desc_len];
        scan.push(MetaTag::new("flac", "picture_description", TagKind::Text, base + desc_start as u64, desc).repeatable());
    }
    let picture = &data[pic_start..pic_start + pic_len];
    scan.push(MetaTag::new("flac", "picture", TagKind::Picture, base + pic_start as u64, picture).repeatable());
    if pic_start + pic_len < data.len() {
        let extra = (data.len() - pic_start - pic_len) as u64;
        scan.anomaly(
            base + (pic_start + pic_len) as u64,
            "flac picture block",
            AnomalyKind::HiddenPadding { nonzero: extra, len: extra },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::container::vorbis::tests::comment_block;

    fn block(block_type: u8, last: bool, data: &[u8]) -> Vec<u8> {
        let mut out = vec![block_type | if last { 0x80 } else { 0 }];
        let len = data.len() as u32;
        out.extend_from_slice(&len.to_be_bytes()[1..]);
        out.extend_from_slice(data);
        out
    }

    fn flac(blocks: &[Vec<u8>]) -> Vec<u8> {
        let mut out = b"fLaC".to_vec();
        for b in blocks {
            out.extend_from_slice(b);
        }
        out.extend_from_slice(&[0xFF, 0xF8, 0x69, 0x08]);
        out
    }

    #[test]
    fn test_comments_and_clean_padding() {
        let file = flac(&[
            block(STREAMINFO, false, &[0; 34]),
            block(VORBIS_COMMENT, false, &comment_block(&[b"TITLE=x"])),
            block(PADDING, true, &[0; 64]),
        ]);
        let mut scan = TagScan::default();
        scan_tags(&file, &mut scan);
        assert_eq!(scan.tags.len(), 1);
        assert!(scan.anomalies.is_empty());
        assert!(scan.malformed.is_empty());
    }

    #[test]
    fn test_dirty_padding() {
        let mut padding = vec![0u8; 64];
        padding[10..14].copy_from_slice(b"data");
        let file = flac(&[block(STREAMINFO, false, &[0; 34]), block(PADDING, true, &padding)]);
        let mut scan = TagScan::default();
        scan_tags(&file, &mut scan);
        assert_eq!(
            scan.anomalies[0].kind,
            AnomalyKind::HiddenPadding { nonzero: 4, len: 64 }
        );
    }

    #[test]
    fn test_block_overrun() {
        let mut file = flac(&[block(STREAMINFO, true, &[0; 34])]);
        file[5..8].copy_from_slice(&[0x10, 0, 0]);
        let mut scan = TagScan::default();
        scan_tags(&file, &mut scan);
        assert_eq!(scan.anomalies.len(), 1);
    }
}
