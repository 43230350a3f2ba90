// src/core/container/bmp.rs
//
// BMP has no terminator; the file-size field in the header is the only
// length. The DIB header size must be one of the published variants,
// which keeps random "BM" byte pairs from validating.

use super::{le_u16, le_u32, Extent};

const DIB_SIZES: [u32; 7] = [12, 40, 52, 56, 64, 108, 124];

pub fn extent(bytes: &[u8]) -> Extent {
    if !bytes.starts_with(b"BM") {
        return Extent::Invalid;
    }
    let (Some(size), Some(pixel_offset), Some(dib)) = (le_u32(bytes, 2), le_u32(bytes, 10), le_u32(bytes, 14)) else {
        return Extent::Invalid;
    };
    let reserved_zero = le_u32(bytes, 6) == Some(0);
    let planes_ok = match dib {
        12 => le_u16(bytes, 22) == Some(1),
        _ => le_u16(bytes, 26) == Some(1),
    };
    if !DIB_SIZES.contains(&dib) || !reserved_zero || !planes_ok || pixel_offset < 14 + dib || pixel_offset > size {
        return Extent::Invalid;
    }
    if size as u64 > bytes.len() as u64 {
        Extent::Truncated
    } else {
        Extent::Complete(size as u64)
    }
}
