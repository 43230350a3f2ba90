// src/core/decoder.rs
//
// Codec boundary. The detection engine only consumes `SampleBuffer`s; the
// default implementation delegates to `image` for pictures, `hound` for WAV
// and Symphonia for the remaining audio containers.

use log::{debug, warn};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer as SymphoniaBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::buffer::{PcmBuffer, PixelPlanes, SampleBuffer};
use super::media::{ContainerFormat, MediaFile};
use crate::error::{DetectionError, Result};

/// Turns raw container bytes into a canonical sample buffer.
///
/// Implementations fail with `UnsupportedFormat` when they cannot interpret
/// the container at all and `CorruptMedia` when it is structurally invalid.
pub trait MediaDecoder: Send + Sync {
    fn decode(&self, media: &MediaFile) -> Result<SampleBuffer>;
}

/// Default decoder backed by `image`, `hound` and Symphonia
#[derive(Debug, Default, Clone, Copy)]
pub struct CodecDecoder;

impl CodecDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl MediaDecoder for CodecDecoder {
    fn decode(&self, media: &MediaFile) -> Result<SampleBuffer> {
        match media.format() {
            ContainerFormat::Jpeg
            | ContainerFormat::Png
            | ContainerFormat::Gif
            | ContainerFormat::Bmp
            | ContainerFormat::Tiff
            | ContainerFormat::WebP => decode_image(media).map(SampleBuffer::Image),
            ContainerFormat::Wav => decode_wav(media.bytes()).map(SampleBuffer::Audio),
            ContainerFormat::Flac | ContainerFormat::Mp3 | ContainerFormat::Ogg => {
                decode_symphonia(media).map(SampleBuffer::Audio)
            }
            ContainerFormat::Unknown => Err(DetectionError::UnsupportedFormat(format!(
                "no decoder for {}",
                media.name()
            ))),
        }
    }
}

fn image_format(format: ContainerFormat) -> Option<image::ImageFormat> {
    match format {
        ContainerFormat::Jpeg => Some(image::ImageFormat::Jpeg),
        ContainerFormat::Png => Some(image::ImageFormat::Png),
        ContainerFormat::Gif => Some(image::ImageFormat::Gif),
        ContainerFormat::Bmp => Some(image::ImageFormat::Bmp),
        ContainerFormat::Tiff => Some(image::ImageFormat::Tiff),
        ContainerFormat::WebP => Some(image::ImageFormat::WebP),
        _ => None,
    }
}

fn map_image_error(err: image::ImageError) -> DetectionError {
    match err {
        image::ImageError::Unsupported(e) => DetectionError::UnsupportedFormat(e.to_string()),
        other => DetectionError::CorruptMedia(other.to_string()),
    }
}

/// Decode to 8-bit planes. 16-bit sources are reduced to their high byte.
fn decode_image(media: &MediaFile) -> Result<PixelPlanes> {
    let format = image_format(media.format())
        .ok_or_else(|| DetectionError::UnsupportedFormat(media.format().to_string()))?;
    let img = image::load_from_memory_with_format(media.bytes(), format).map_err(map_image_error)?;

    let width = img.width() as usize;
    let height = img.height() as usize;
    let color = img.color();
    debug!("decoded {} as {}x{} {:?}", media.name(), width, height, color);

    let is_gray = matches!(
        color,
        image::ColorType::L8 | image::ColorType::L16 | image::ColorType::La8 | image::ColorType::La16
    );

    match (is_gray, color.has_alpha()) {
        (true, false) => PixelPlanes::from_interleaved(width, height, &["L"], img.to_luma8().as_raw()),
        (true, true) => {
            PixelPlanes::from_interleaved(width, height, &["L", "A"], img.to_luma_alpha8().as_raw())
        }
        (false, false) => {
            PixelPlanes::from_interleaved(width, height, &["R", "G", "B"], img.to_rgb8().as_raw())
        }
        (false, true) => PixelPlanes::from_interleaved(
            width,
            height,
            &["R", "G", "B", "A"],
            img.to_rgba8().as_raw(),
        ),
    }
}

fn map_hound_error(err: hound::Error) -> DetectionError {
    match err {
        hound::Error::Unsupported => DetectionError::UnsupportedFormat("WAV encoding not supported".to_string()),
        other => DetectionError::CorruptMedia(other.to_string()),
    }
}

/// Decode WAV keeping the exact integer samples. A truncated data chunk
/// yields the samples read before the break.
fn decode_wav(bytes: &[u8]) -> Result<PcmBuffer> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).map_err(map_hound_error)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let (samples, bits, truncated) = match spec.sample_format {
        hound::SampleFormat::Int => {
            let mut samples = Vec::with_capacity(reader.len() as usize);
            let mut truncated = false;
            for sample in reader.into_samples::<i32>() {
                match sample {
                    Ok(s) => samples.push(s),
                    Err(_) => {
                        truncated = true;
                        break;
                    }
                }
            }
            (samples, spec.bits_per_sample as u32, truncated)
        }
        hound::SampleFormat::Float => {
            let scale = (1i32 << 23) as f32;
            let mut samples = Vec::with_capacity(reader.len() as usize);
            let mut truncated = false;
            for sample in reader.into_samples::<f32>() {
                match sample {
                    Ok(s) => samples.push((s.clamp(-1.0, 1.0) * (scale - 1.0)).round() as i32),
                    Err(_) => {
                        truncated = true;
                        break;
                    }
                }
            }
            (samples, 24, truncated)
        }
    };

    finish_pcm(spec.sample_rate, channels, bits, samples, truncated)
}

fn finish_pcm(sample_rate: u32, channels: usize, bits: u32, mut samples: Vec<i32>, truncated: bool) -> Result<PcmBuffer> {
    if channels == 0 {
        return Err(DetectionError::CorruptMedia("stream reports 0 channels".to_string()));
    }
    if truncated {
        warn!("audio stream truncated after {} samples; analyzing the readable portion", samples.len());
    }
    samples.truncate(samples.len() - samples.len() % channels);
    if samples.is_empty() {
        return Err(DetectionError::CorruptMedia("no audio samples decoded".to_string()));
    }
    PcmBuffer::new(sample_rate, channels, bits, samples)
}

fn decode_symphonia(media: &MediaFile) -> Result<PcmBuffer> {
    let cursor = Cursor::new(media.bytes().to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(media.format().name());

    let mut probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DetectionError::UnsupportedFormat(format!("probe failed: {}", e)))?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DetectionError::UnsupportedFormat("no supported audio track".to_string()))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DetectionError::CorruptMedia("stream does not specify a sample rate".to_string()))?;
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);
    let bits = track.codec_params.bits_per_sample.unwrap_or(16).clamp(8, 32);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DetectionError::UnsupportedFormat(format!("no codec: {}", e)))?;

    let shift = 32 - bits;
    let mut samples: Vec<i32> = Vec::new();
    let mut sample_buf: Option<SymphoniaBuffer<i32>> = None;
    let mut truncated = false;

    loop {
        let packet = match probed.format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(symphonia::core::errors::Error::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(_) => {
                truncated = true;
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(buf) => buf,
            Err(symphonia::core::errors::Error::DecodeError(_)) => {
                truncated = true;
                continue;
            }
            Err(_) => {
                truncated = true;
                break;
            }
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            sample_buf = Some(SymphoniaBuffer::new(decoded.capacity() as u64, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend(buf.samples().iter().map(|&s| s >> shift));
        }
    }

    finish_pcm(sample_rate, channels, bits, samples, truncated)
}
