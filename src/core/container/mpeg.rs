// src/core/container/mpeg.rs
//
// MP3 streams: leading ID3v2 tag, MPEG audio frame walk, then optional APE
// and ID3v1 trailers. The frame walk is what bounds the audio; anything
// after the trailers is foreign data.

use super::{be_u32, le_u32, AnomalyKind, Extent, MetaTag, TagKind, TagScan, TextCharset};

const SEARCH_WINDOW: usize = 4096;
const ID3V1_LEN: usize = 128;
const APE_FOOTER_LEN: usize = 32;

const SAMPLE_RATES: [[u32; 3]; 3] = [
    [44100, 48000, 32000], // MPEG-1
    [22050, 24000, 16000], // MPEG-2
    [11025, 12000, 8000],  // MPEG-2.5
];

const BITRATES_V1: [[u32; 14]; 3] = [
    [32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
    [32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
    [32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
];

const BITRATES_V2: [[u32; 14]; 2] = [
    [32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
    [8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
];

/// Length in bytes of the MPEG audio frame starting at `at`
pub fn frame_len(bytes: &[u8], at: usize) -> Option<usize> {
    let h = bytes.get(at..at + 4)?;
    if h[0] != 0xFF || h[1] & 0xE0 != 0xE0 {
        return None;
    }
    let version = match (h[1] >> 3) & 0x03 {
        3 => 0,
        2 => 1,
        0 => 2,
        _ => return None,
    };
    // 1 = Layer I, 2 = Layer II, 3 = Layer III
    let layer = match (h[1] >> 1) & 0x03 {
        3 => 1,
        2 => 2,
        1 => 3,
        _ => return None,
    };
    let bitrate_idx = (h[2] >> 4) as usize;
    let rate_idx = ((h[2] >> 2) & 0x03) as usize;
    if bitrate_idx == 0 || bitrate_idx == 15 || rate_idx == 3 {
        return None;
    }
    let padding = ((h[2] >> 1) & 0x01) as u32;

    let kbps = if version == 0 {
        BITRATES_V1[layer - 1][bitrate_idx - 1]
    } else {
        BITRATES_V2[usize::from(layer != 1)][bitrate_idx - 1]
    };
    let bitrate = kbps * 1000;
    let rate = SAMPLE_RATES[version][rate_idx];

    let len = match layer {
        1 => (12 * bitrate / rate + padding) * 4,
        3 if version != 0 => 72 * bitrate / rate + padding,
        _ => 144 * bitrate / rate + padding,
    };
    Some(len as usize)
}

fn syncsafe(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 4)?;
    if b.iter().any(|&x| x & 0x80 != 0) {
        return None;
    }
    Some(((b[0] as u32) << 21) | ((b[1] as u32) << 14) | ((b[2] as u32) << 7) | b[3] as u32)
}

/// Total length of an ID3v2 tag starting at `at`, including any footer
pub fn id3v2_len(bytes: &[u8], at: usize) -> Option<usize> {
    if bytes.get(at..at + 3)? != b"ID3" {
        return None;
    }
    let flags = *bytes.get(at + 5)?;
    let size = syncsafe(bytes, at + 6)? as usize;
    let footer = if flags & 0x10 != 0 { 10 } else { 0 };
    Some(10 + size + footer)
}

struct Walk {
    extent: Extent,
    frames: usize,
    ape: Option<(usize, usize)>,
    id3v1: Option<usize>,
}

fn walk(bytes: &[u8]) -> Walk {
    let mut out = Walk {
        extent: Extent::Invalid,
        frames: 0,
        ape: None,
        id3v1: None,
    };

    let mut pos = 0usize;
    if bytes.starts_with(b"ID3") {
        match id3v2_len(bytes, 0) {
            Some(len) if len <= bytes.len() => pos = len,
            Some(_) => {
                out.extent = Extent::Truncated;
                return out;
            }
            None => return out,
        }
    }

    // First frame must be followed by another sync (or the end of data)
    let limit = (pos + SEARCH_WINDOW).min(bytes.len());
    let start = (pos..limit).find(|&p| match frame_len(bytes, p) {
        Some(len) => p + len == bytes.len() || frame_len(bytes, p + len).is_some(),
        None => false,
    });
    let Some(mut pos) = start else {
        if pos > 0 {
            // ID3 tag followed by nothing decodable
            out.extent = Extent::Truncated;
        }
        return out;
    };

    while let Some(len) = frame_len(bytes, pos) {
        if pos + len > bytes.len() {
            out.extent = Extent::Truncated;
            return out;
        }
        pos += len;
        out.frames += 1;
    }

    if bytes.get(pos..pos + 8) == Some(b"APETAGEX".as_slice()) {
        // header variant; footer follows the items
        if let Some(size) = le_u32(bytes, pos + 12) {
            let end = pos + APE_FOOTER_LEN + size as usize;
            if end <= bytes.len() {
                out.ape = Some((pos, end));
                pos = end;
            }
        }
    }
    if bytes.get(pos..pos + 3) == Some(b"TAG".as_slice()) && pos + ID3V1_LEN <= bytes.len() {
        out.id3v1 = Some(pos);
        pos += ID3V1_LEN;
    }

    out.extent = Extent::Complete(pos as u64);
    out
}

pub fn extent(bytes: &[u8]) -> Extent {
    walk(bytes).extent
}

pub fn scan_tags(bytes: &[u8], scan: &mut TagScan) {
    if bytes.starts_with(b"ID3") {
        parse_id3v2(bytes, 0, scan);
    }
    let walked = walk(bytes);
    if let Some((start, end)) = walked.ape {
        parse_ape(&bytes[start..end], start as u64, scan);
    }
    if let Some(at) = walked.id3v1 {
        parse_id3v1(&bytes[at..at + ID3V1_LEN], at as u64, scan);
    }
}

/// Decode an ID3v2 text payload (encoding byte first). ISO-8859-1 bytes are
/// kept as they are and tagged Latin-1; UTF-16 is re-encoded as UTF-8.
/// Control characters survive decoding so binary stuffing stays visible.
fn decode_text(data: &[u8]) -> (Vec<u8>, TextCharset) {
    let Some((&encoding, body)) = data.split_first() else {
        return (Vec::new(), TextCharset::Utf8);
    };
    let charset = if encoding == 0 { TextCharset::Latin1 } else { TextCharset::Utf8 };
    let text = match encoding {
        1 | 2 => {
            let (big_endian, body) = match body {
                [0xFE, 0xFF, rest @ ..] => (true, rest),
                [0xFF, 0xFE, rest @ ..] => (false, rest),
                _ => (encoding == 2, body),
            };
            let units: Vec<u16> = body
                .chunks_exact(2)
                .map(|c| if big_endian { u16::from_be_bytes([c[0], c[1]]) } else { u16::from_le_bytes([c[0], c[1]]) })
                .collect();
            String::from_utf16_lossy(&units).into_bytes()
        }
        _ => body.to_vec(),
    };
    let trimmed = text.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    (text[..trimmed].to_vec(), charset)
}

/// Parse an ID3v2.2/2.3/2.4 tag located at absolute offset `base`
pub fn parse_id3v2(data: &[u8], base: u64, scan: &mut TagScan) {
    if !data.starts_with(b"ID3") || data.len() < 10 {
        scan.malformed(base, "missing ID3v2 header");
        return;
    }
    let major = data[3];
    let flags = data[5];
    let Some(size) = syncsafe(data, 6) else {
        scan.malformed(base + 6, "ID3v2 size is not syncsafe");
        return;
    };
    if !(2..=4).contains(&major) {
        scan.malformed(base + 3, format!("unsupported ID3v2 version 2.{}", major));
        return;
    }

    let declared_end = 10 + size as usize;
    let tag_end = if declared_end > data.len() {
        scan.overrun(base, "id3v2 tag", size as u64, (data.len() - 10) as u64);
        data.len()
    } else {
        declared_end
    };

    let mut pos = 10usize;
    if flags & 0x40 != 0 && major >= 3 {
        let ext = if major == 4 {
            syncsafe(data, pos).map(|s| s as usize)
        } else {
            be_u32(data, pos).map(|s| s as usize + 4)
        };
        match ext {
            Some(len) if pos + len <= tag_end => pos += len,
            _ => {
                scan.malformed(base + pos as u64, "bad ID3v2 extended header");
                return;
            }
        }
    }

    let (id_len, header_len) = if major == 2 { (3, 6) } else { (4, 10) };
    while pos + header_len <= tag_end {
        if data[pos] == 0 {
            let padding = &data[pos..tag_end];
            let nonzero = padding.iter().filter(|&&b| b != 0).count() as u64;
            if nonzero > 0 {
                scan.anomaly(
                    base + pos as u64,
                    "id3v2 padding",
                    AnomalyKind::HiddenPadding {
                        nonzero,
                        len: padding.len() as u64,
                    },
                );
            }
            return;
        }

        let id_bytes = &data[pos..pos + id_len];
        if !id_bytes.iter().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()) {
            scan.malformed(base + pos as u64, "invalid ID3v2 frame identifier");
            return;
        }
        let id = String::from_utf8_lossy(id_bytes).into_owned();
        let frame_size = match major {
            2 => Some(((data[pos + 3] as u32) << 16) | ((data[pos + 4] as u32) << 8) | data[pos + 5] as u32),
            3 => be_u32(data, pos + 4),
            _ => syncsafe(data, pos + 4).or_else(|| be_u32(data, pos + 4)),
        };
        let Some(frame_size) = frame_size else {
            scan.malformed(base + pos as u64, "unreadable ID3v2 frame size");
            return;
        };

        let body = pos + header_len;
        let available = (tag_end - body) as u64;
        if frame_size as u64 > available {
            scan.overrun(base + pos as u64, format!("id3v2 {} frame", id), frame_size as u64, available);
            return;
        }
        let value = &data[body..body + frame_size as usize];
        let at = base + body as u64;

        let tag = match id.as_str() {
            "TXXX" | "TXX" => {
                let (text, charset) = decode_text(value);
                let (desc, rest) = match text.iter().position(|&b| b == 0) {
                    Some(p) => (charset.decode(&text[..p]), text[p + 1..].to_vec()),
                    None => (String::new(), text),
                };
                MetaTag::new("id3v2", format!("{}:{}", id, desc), TagKind::Text, at, &rest).with_charset(charset)
            }
            t if t.starts_with('T') => {
                let (text, charset) = decode_text(value);
                MetaTag::new("id3v2", id.clone(), TagKind::Text, at, &text).with_charset(charset)
            }
            "COMM" | "COM" | "USLT" | "ULT" => {
                MetaTag::new("id3v2", id.clone(), TagKind::Comment, at, value).repeatable()
            }
            "APIC" | "PIC" => MetaTag::new("id3v2", id.clone(), TagKind::Picture, at, value).repeatable(),
            _ => MetaTag::new("id3v2", id.clone(), TagKind::Binary, at, value).repeatable(),
        };
        scan.push(tag);
        pos = body + frame_size as usize;
    }
}

fn parse_id3v1(tag: &[u8], base: u64, scan: &mut TagScan) {
    let fields: [(&str, usize, usize); 5] = [
        ("title", 3, 33),
        ("artist", 33, 63),
        ("album", 63, 93),
        ("year", 93, 97),
        ("comment", 97, 127),
    ];
    for (name, start, end) in fields {
        let raw = &tag[start..end];
        let len = raw.iter().rposition(|&b| b != 0 && b != b' ').map_or(0, |p| p + 1);
        let mut value = &raw[..len];
        if name == "comment" && tag[125] == 0 && tag[126] != 0 {
            // ID3v1.1 track number occupies the last two comment bytes
            value = &value[..value.len().min(28)];
        }
        if !value.is_empty() {
            let kind = if name == "comment" { TagKind::Comment } else { TagKind::Text };
            scan.push(MetaTag::new("id3v1", name, kind, base + start as u64, value).latin1());
        }
    }
}

/// APEv2 tag block: header, items, footer
fn parse_ape(data: &[u8], base: u64, scan: &mut TagScan) {
    let Some(count) = le_u32(data, 16) else { return };
    let items_end = data.len().saturating_sub(APE_FOOTER_LEN);
    let mut pos = APE_FOOTER_LEN;
    for _ in 0..count {
        let (Some(size), Some(flags)) = (le_u32(data, pos), le_u32(data, pos + 4)) else {
            scan.malformed(base + pos as u64, "APE item header cut short");
            return;
        };
        let key_start = pos + 8;
        let Some(key_len) = data.get(key_start..items_end).and_then(|d| d.iter().position(|&b| b == 0)) else {
            scan.malformed(base + pos as u64, "APE item key unterminated");
            return;
        };
        let key = String::from_utf8_lossy(&data[key_start..key_start + key_len]).into_owned();
        let value_start = key_start + key_len + 1;
        let available = items_end.saturating_sub(value_start) as u64;
        if size as u64 > available {
            scan.overrun(base + pos as u64, format!("ape {} item", key), size as u64, available);
            return;
        }
        let value = &data[value_start..value_start + size as usize];
        let kind = match (flags >> 1) & 0x03 {
            0 => TagKind::Text,
            _ if key.to_ascii_lowercase().starts_with("cover art") => TagKind::Picture,
            _ => TagKind::Binary,
        };
        scan.push(MetaTag::new("ape", key, kind, base + value_start as u64, value));
        pos = value_start + size as usize;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 128 kbps, 44.1 kHz MPEG-1 Layer III frame header (417 bytes, no padding)
    pub(crate) fn mp3_frames(count: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for _ in 0..count {
            let mut frame = vec![0xFF, 0xFB, 0x90, 0x00];
            frame.resize(417, 0x55);
            out.extend(frame);
        }
        out
    }

    pub(crate) fn id3v2_tag(frames: &[(&[u8; 4], Vec<u8>)], padding: usize) -> Vec<u8> {
        let mut body = Vec::new();
        for (id, value) in frames {
            body.extend_from_slice(*id);
            body.extend_from_slice(&(value.len() as u32).to_be_bytes());
            body.extend_from_slice(&[0, 0]);
            body.extend_from_slice(value);
        }
        body.resize(body.len() + padding, 0);
        let size = body.len() as u32;
        let mut out = b"ID3\x03\x00\x00".to_vec();
        out.extend_from_slice(&[
            ((size >> 21) & 0x7F) as u8,
            ((size >> 14) & 0x7F) as u8,
            ((size >> 7) & 0x7F) as u8,
            (size & 0x7F) as u8,
        ]);
        out.extend(body);
        out
    }

    #[test]
    fn test_frame_len() {
        let frames = mp3_frames(1);
        assert_eq!(frame_len(&frames, 0), Some(417));
        assert_eq!(frame_len(&[0xFF, 0xFB, 0xF0, 0x00], 0), None);
    }

    #[test]
    fn test_extent_after_frames_and_id3v1() {
        let mut mp3 = id3v2_tag(&[(b"TIT2", b"\x00Title".to_vec())], 16);
        mp3.extend(mp3_frames(3));
        let mut v1 = b"TAG".to_vec();
        v1.resize(128, 0);
        mp3.extend(v1);
        let audio_len = mp3.len();
        mp3.extend_from_slice(b"PK\x03\x04hidden");
        assert_eq!(extent(&mp3), Extent::Complete(audio_len as u64));
    }

    #[test]
    fn test_id3v2_frames() {
        let mut comment = b"\x00eng\x00".to_vec();
        comment.extend_from_slice(b"hello");
        let mut mp3 = id3v2_tag(
            &[
                (b"TIT2", b"\x00Song".to_vec()),
                (b"TPE1", b"\x01\xFF\xFEA\x00B\x00".to_vec()),
                (b"COMM", comment),
            ],
            8,
        );
        mp3.extend(mp3_frames(2));
        let mut scan = TagScan::default();
        scan_tags(&mp3, &mut scan);
        assert_eq!(scan.tags.len(), 3);
        assert_eq!(scan.tags[0].value, b"Song");
        assert_eq!(scan.tags[1].value, b"AB");
        assert_eq!(scan.tags[2].kind, TagKind::Comment);
        assert!(scan.anomalies.is_empty());
    }

    #[test]
    fn test_nonzero_padding_is_flagged() {
        let mut tag = id3v2_tag(&[(b"TIT2", b"\x00Song".to_vec())], 32);
        let len = tag.len();
        tag[len - 20] = 0xAB;
        tag.extend(mp3_frames(2));
        let mut scan = TagScan::default();
        scan_tags(&tag, &mut scan);
        assert!(matches!(scan.anomalies[0].kind, AnomalyKind::HiddenPadding { nonzero: 1, .. }));
    }
}
