// tests/test_utils/mod.rs
//
// Deterministic synthetic fixtures shared by the integration tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

pub fn get_binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_stegcheckr"))
}

pub fn run_stegcheckr<P: AsRef<std::ffi::OsStr>>(path: P) -> Command {
    let mut cmd = Command::new(get_binary_path());
    cmd.arg(path);
    cmd.env_remove("STEGCHECKR_TIMEOUT_MS");
    cmd
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("failed to write fixture");
    path
}

/// xorshift64* generator
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 ^= self.0 >> 12;
        self.0 ^= self.0 << 25;
        self.0 ^= self.0 >> 27;
        self.0.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform in [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    pub fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// Smooth luminance field with a little sensor-like noise
pub fn natural_plane(width: usize, height: usize, seed: u64) -> Vec<u8> {
    let mut rng = XorShift::new(seed);
    (0..width * height)
        .map(|i| {
            let (x, y) = ((i % width) as f64, (i / width) as f64);
            let noise = rng.below(2) as f64 + rng.below(2) as f64 - 1.0;
            (128.0 + 40.0 * (x / 37.0).sin() + 35.0 * (y / 29.0).cos() + noise).round() as u8
        })
        .collect()
}

/// Same field as `natural_plane` with uniform noise in [-amplitude, amplitude]
pub fn textured_plane(width: usize, height: usize, seed: u64, amplitude: u64) -> Vec<u8> {
    let mut rng = XorShift::new(seed);
    (0..width * height)
        .map(|i| {
            let (x, y) = ((i % width) as f64, (i / width) as f64);
            let noise = rng.below(2 * amplitude + 1) as f64 - amplitude as f64;
            (128.0 + 40.0 * (x / 37.0).sin() + 35.0 * (y / 29.0).cos() + noise).round() as u8
        })
        .collect()
}

/// Smooth field stored with even values only, as after scaling a 7-bit source
pub fn even_plane(width: usize, height: usize, seed: u64) -> Vec<u8> {
    let mut rng = XorShift::new(seed);
    (0..width * height)
        .map(|i| {
            let (x, y) = ((i % width) as f64, (i / width) as f64);
            let v = 120.0 + 60.0 * (x / 20.0).sin() * (y / 30.0).cos() + (rng.below(5) as f64 - 2.0);
            (v as u8) & !1
        })
        .collect()
}

pub fn noise_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = XorShift::new(seed);
    (0..len).map(|_| rng.next_u64() as u8).collect()
}

/// Overwrite the LSB of each sample with a random bit with probability `rate`.
/// For one seed, the overwritten set at a higher rate contains the set at a lower rate.
pub fn embed_lsb(data: &mut [u8], rate: f64, seed: u64) {
    let mut rng = XorShift::new(seed);
    for v in data.iter_mut() {
        let pick = rng.next_f64();
        let bit = (rng.next_u64() >> 63) as u8;
        if pick < rate {
            *v = (*v & !1) | bit;
        }
    }
}

pub fn encode_gray_png(width: usize, height: usize, data: Vec<u8>) -> Vec<u8> {
    let img = image::GrayImage::from_raw(width as u32, height as u32, data).expect("plane size");
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).expect("png encoding");
    out.into_inner()
}

pub fn encode_rgb_png(width: usize, height: usize, data: Vec<u8>) -> Vec<u8> {
    let img = image::RgbImage::from_raw(width as u32, height as u32, data).expect("image size");
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).expect("png encoding");
    out.into_inner()
}

pub fn png_chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = (data.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(kind);
    hasher.update(data);
    out.extend_from_slice(&hasher.finalize().to_be_bytes());
    out
}

/// Insert an ancillary chunk right after IHDR
pub fn with_png_chunk(png: &[u8], chunk: &[u8]) -> Vec<u8> {
    // signature (8) + IHDR (4 + 4 + 13 + 4)
    let at = 33;
    let mut out = png[..at].to_vec();
    out.extend_from_slice(chunk);
    out.extend_from_slice(&png[at..]);
    out
}

/// Stored single-entry ZIP archive
pub fn tiny_zip(name: &str, body: &[u8]) -> Vec<u8> {
    let crc = crc32fast::hash(body);
    let mut out = b"PK\x03\x04".to_vec();
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

    out.extend_from_slice(b"PK\x05\x06");
    out.extend_from_slice(&[0, 0, 0, 0, 1, 0, 1, 0]);
    out.extend_from_slice(&(cd_size as u32).to_le_bytes());
    out.extend_from_slice(&(cd_offset as u32).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

pub fn riff_chunk(id: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = id.to_vec();
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    if data.len() % 2 == 1 {
        out.push(0);
    }
    out
}

/// LIST/INFO chunk from (id, value) pairs
pub fn info_list(entries: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
    let mut body = b"INFO".to_vec();
    for (id, value) in entries {
        let mut v = value.to_vec();
        v.push(0);
        body.extend(riff_chunk(id, &v));
    }
    riff_chunk(b"LIST", &body)
}

/// 16-bit PCM WAV; `extra` chunks go between `fmt ` and `data`
pub fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16], extra: &[Vec<u8>]) -> Vec<u8> {
    let block_align = channels * 2;
    let mut fmt = Vec::new();
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&channels.to_le_bytes());
    fmt.extend_from_slice(&sample_rate.to_le_bytes());
    fmt.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    fmt.extend_from_slice(&block_align.to_le_bytes());
    fmt.extend_from_slice(&16u16.to_le_bytes());

    let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    let mut body = b"WAVE".to_vec();
    body.extend(riff_chunk(b"fmt ", &fmt));
    for chunk in extra {
        body.extend_from_slice(chunk);
    }
    body.extend(riff_chunk(b"data", &data));

    let mut out = b"RIFF".to_vec();
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend(body);
    out
}

/// Uniform noise in [-amplitude, amplitude)
pub fn noise_signal(len: usize, amplitude: f64, seed: u64) -> Vec<f64> {
    let mut rng = XorShift::new(seed);
    (0..len).map(|_| (rng.next_f64() * 2.0 - 1.0) * amplitude).collect()
}

/// Noise carrying a two-delay echo kernel, switching delay every `segment` samples
pub fn echo_hidden(dry: &[f64], delays: (usize, usize), alpha: f64, segment: usize) -> Vec<f64> {
    (0..dry.len())
        .map(|n| {
            let delay = if (n / segment) % 2 == 0 { delays.0 } else { delays.1 };
            dry[n] + if n >= delay { alpha * dry[n - delay] } else { 0.0 }
        })
        .collect()
}

pub fn to_pcm16(signal: &[f64]) -> Vec<i16> {
    signal
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0).round() as i16)
        .collect()
}

/// Three partials plus low-level noise
pub fn tonal_signal(len: usize, sample_rate: u32, seed: u64) -> Vec<f64> {
    use std::f64::consts::PI;
    let mut rng = XorShift::new(seed);
    (0..len)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            0.2 * (2.0 * PI * 440.0 * t).sin()
                + 0.2 * (2.0 * PI * 1234.5 * t + 1.0).sin()
                + 0.2 * (2.0 * PI * 3001.0 * t + 2.0).sin()
                + (rng.next_f64() - 0.5) * 0.1
        })
        .collect()
}

/// Phase coding: set the phase of bins 1..=bits.len() in the first segment to
/// ±π/2 and carry the same shift into every later segment
pub fn phase_code(signal: &mut [f64], segment: usize, bits: &[bool]) {
    use rustfft::{num_complex::Complex, FftPlanner};
    use std::f64::consts::FRAC_PI_2;

    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(segment);
    let inverse = planner.plan_fft_inverse(segment);
    let mut shift = vec![0.0; bits.len() + 1];

    for (seg, chunk) in signal.chunks_exact_mut(segment).enumerate() {
        let mut spectrum: Vec<Complex<f64>> = chunk.iter().map(|&s| Complex::new(s, 0.0)).collect();
        forward.process(&mut spectrum);
        for bin in 1..=bits.len() {
            if seg == 0 {
                let target = if bits[bin - 1] { FRAC_PI_2 } else { -FRAC_PI_2 };
                shift[bin] = target - spectrum[bin].arg();
            }
            let rotated = spectrum[bin] * Complex::from_polar(1.0, shift[bin]);
            spectrum[bin] = rotated;
            spectrum[segment - bin] = rotated.conj();
        }
        inverse.process(&mut spectrum);
        for (s, c) in chunk.iter_mut().zip(&spectrum) {
            *s = c.re / segment as f64;
        }
    }
}
