// src/core/container/gif.rs
//
// GIF block walk: header, color tables, extension and image blocks up to
// the 0x3B trailer.

use super::{Extent, MetaTag, TagKind, TagScan};

const TRAILER: u8 = 0x3B;
const EXTENSION: u8 = 0x21;
const IMAGE: u8 = 0x2C;

#[derive(Debug)]
enum Block {
    Extension { label: u8, offset: usize, data: Vec<u8> },
    Image,
}

struct Walk {
    blocks: Vec<Block>,
    extent: Extent,
    /// Offset of a sub-block chain that ran off the end
    cut_at: Option<usize>,
}

fn color_table_len(packed: u8) -> usize {
    if packed & 0x80 != 0 {
        3 * (1usize << ((packed & 0x07) + 1))
    } else {
        0
    }
}

/// Concatenated sub-block data and the position after the terminator
fn sub_blocks(bytes: &[u8], mut pos: usize) -> Option<(Vec<u8>, usize)> {
    let mut data = Vec::new();
    loop {
        let size = *bytes.get(pos)? as usize;
        pos += 1;
        if size == 0 {
            return Some((data, pos));
        }
        data.extend_from_slice(bytes.get(pos..pos + size)?);
        pos += size;
    }
}

fn walk(bytes: &[u8]) -> Walk {
    let mut out = Walk {
        blocks: Vec::new(),
        extent: Extent::Truncated,
        cut_at: None,
    };
    if !(bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a")) || bytes.len() < 13 {
        out.extent = Extent::Invalid;
        return out;
    }

    let mut pos = 13 + color_table_len(bytes[10]);
    loop {
        let Some(&introducer) = bytes.get(pos) else {
            return out;
        };
        match introducer {
            TRAILER => {
                out.extent = Extent::Complete(pos as u64 + 1);
                return out;
            }
            EXTENSION => {
                let Some(&label) = bytes.get(pos + 1) else {
                    return out;
                };
                match sub_blocks(bytes, pos + 2) {
                    Some((data, next)) => {
                        out.blocks.push(Block::Extension { label, offset: pos, data });
                        pos = next;
                    }
                    None => {
                        out.cut_at = Some(pos);
                        return out;
                    }
                }
            }
            IMAGE => {
                let Some(&packed) = bytes.get(pos + 9) else {
                    return out;
                };
                // descriptor, local color table, LZW minimum code size
                let data_at = pos + 10 + color_table_len(packed) + 1;
                match sub_blocks(bytes, data_at) {
                    Some((_, next)) => {
                        out.blocks.push(Block::Image);
                        pos = next;
                    }
                    None => {
                        out.cut_at = Some(pos);
                        return out;
                    }
                }
            }
            _ => {
                if out.blocks.is_empty() {
                    out.extent = Extent::Invalid;
                }
                return out;
            }
        }
    }
}

pub fn extent(bytes: &[u8]) -> Extent {
    walk(bytes).extent
}

pub fn scan_tags(bytes: &[u8], scan: &mut TagScan) {
    let walked = walk(bytes);
    if let Some(at) = walked.cut_at {
        scan.malformed(at as u64, "gif block chain cut short");
    }

    for block in &walked.blocks {
        let Block::Extension { label, offset, data } = block else {
            continue;
        };
        let abs = *offset as u64 + 2;
        match label {
            0xFE => scan.push(MetaTag::new("gif", "comment", TagKind::Comment, abs, data).latin1().repeatable()),
            0xFF if data.len() >= 11 => {
                let app = String::from_utf8_lossy(&data[..11]).into_owned();
                let payload = &data[11..];
                match app.as_str() {
                    "NETSCAPE2.0" | "ANIMEXTS1.0" => {}
                    "XMP DataXMP" => scan.push(MetaTag::new("xmp", "packet", TagKind::Comment, abs, payload)),
                    _ => scan.push(MetaTag::new("gif", app, TagKind::Binary, abs, payload).repeatable()),
                }
            }
            0xFF => scan.malformed(abs, "application extension without identifier"),
            0x01 => {
                // 12 bytes of grid geometry precede the text
                let text = data.get(12..).unwrap_or_default();
                scan.push(MetaTag::new("gif", "plain_text", TagKind::Text, abs, text).latin1().repeatable());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gif_with(extensions: &[Vec<u8>]) -> Vec<u8> {
        let mut out = b"GIF89a".to_vec();
        out.extend_from_slice(&[1, 0, 1, 0, 0x80, 0, 0]); // 1x1, 2-entry global table
        out.extend_from_slice(&[0, 0, 0, 255, 255, 255]);
        for ext in extensions {
            out.extend_from_slice(ext);
        }
        out.extend_from_slice(&[IMAGE, 0, 0, 0, 0, 1, 0, 1, 0, 0]);
        out.extend_from_slice(&[2, 2, 0x4C, 0x01, 0]);
        out.push(TRAILER);
        out
    }

    fn extension(label: u8, data: &[u8]) -> Vec<u8> {
        let mut out = vec![EXTENSION, label];
        for chunk in data.chunks(255) {
            out.push(chunk.len() as u8);
            out.extend_from_slice(chunk);
        }
        out.push(0);
        out
    }

    #[test]
    fn test_extent_to_trailer() {
        let gif = gif_with(&[]);
        let mut host = gif.clone();
        host.extend_from_slice(b"Rar!");
        assert_eq!(extent(&host), Extent::Complete(gif.len() as u64));
        assert_eq!(extent(&gif[..gif.len() - 1]), Extent::Truncated);
    }

    #[test]
    fn test_long_comment_is_reassembled() {
        let comment = vec![b'x'; 600];
        let gif = gif_with(&[extension(0xFE, &comment)]);
        let mut scan = TagScan::default();
        scan_tags(&gif, &mut scan);
        assert_eq!(scan.tags.len(), 1);
        assert_eq!(scan.tags[0].value.len(), 600);
        assert_eq!(extent(&gif), Extent::Complete(gif.len() as u64));
    }

    #[test]
    fn test_netscape_loop_is_ignored() {
        let gif = gif_with(&[extension(0xFF, b"NETSCAPE2.0\x01\x00\x00")]);
        let mut scan = TagScan::default();
        scan_tags(&gif, &mut scan);
        assert!(scan.tags.is_empty());
    }
}
