// src/core/buffer.rs
//
// Canonical decoded shapes consumed by the statistical analyzers.
// Buffers are read-only once built; analyzers derive their own views.

use crate::error::{DetectionError, Result};

/// One 8-bit channel of an image, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPlane {
    pub name: String,
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl ChannelPlane {
    pub fn new(name: impl Into<String>, width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        if width.checked_mul(height) != Some(data.len()) {
            return Err(DetectionError::CorruptMedia(format!(
                "plane {}x{} does not match {} samples",
                width,
                height,
                data.len()
            )));
        }
        Ok(Self {
            name: name.into(),
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn row(&self, y: usize) -> &[u8] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 256-bin value histogram
    pub fn histogram(&self) -> [u64; 256] {
        let mut hist = [0u64; 256];
        for &v in &self.data {
            hist[v as usize] += 1;
        }
        hist
    }
}

/// Decoded image: ordered channel planes of equal dimensions
#[derive(Debug, Clone, PartialEq)]
pub struct PixelPlanes {
    width: usize,
    height: usize,
    planes: Vec<ChannelPlane>,
}

impl PixelPlanes {
    pub fn new(width: usize, height: usize, planes: Vec<ChannelPlane>) -> Result<Self> {
        if planes.is_empty() {
            return Err(DetectionError::CorruptMedia("image has no channel planes".to_string()));
        }
        if let Some(bad) = planes.iter().find(|p| p.width != width || p.height != height) {
            return Err(DetectionError::CorruptMedia(format!(
                "plane {} is {}x{}, expected {}x{}",
                bad.name, bad.width, bad.height, width, height
            )));
        }
        Ok(Self { width, height, planes })
    }

    /// Split an interleaved 8-bit buffer into named planes
    pub fn from_interleaved(width: usize, height: usize, names: &[&str], samples: &[u8]) -> Result<Self> {
        let channels = names.len();
        if channels == 0 || samples.len() != width * height * channels {
            return Err(DetectionError::CorruptMedia(format!(
                "interleaved buffer of {} bytes does not match {}x{}x{}",
                samples.len(),
                width,
                height,
                channels
            )));
        }
        let planes = names
            .iter()
            .enumerate()
            .map(|(c, name)| {
                let data: Vec<u8> = samples.iter().skip(c).step_by(channels).copied().collect();
                ChannelPlane::new(*name, width, height, data)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(width, height, planes)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn planes(&self) -> &[ChannelPlane] {
        &self.planes
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

/// Decoded audio: interleaved signed PCM
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    sample_rate: u32,
    channels: usize,
    bits_per_sample: u32,
    samples: Vec<i32>,
}

impl PcmBuffer {
    pub fn new(sample_rate: u32, channels: usize, bits_per_sample: u32, samples: Vec<i32>) -> Result<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(DetectionError::CorruptMedia(format!(
                "invalid stream layout: {} Hz, {} channels",
                sample_rate, channels
            )));
        }
        if !(2..=32).contains(&bits_per_sample) {
            return Err(DetectionError::CorruptMedia(format!(
                "unsupported sample width: {} bits",
                bits_per_sample
            )));
        }
        if samples.len() % channels != 0 {
            return Err(DetectionError::CorruptMedia(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            sample_rate,
            channels,
            bits_per_sample,
            samples,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample
    }

    pub fn samples(&self) -> &[i32] {
        &self.samples
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Analyzer-local copy of one channel normalized to [-1, 1]
    pub fn channel_f32(&self, channel: usize) -> Vec<f32> {
        let scale = self.full_scale();
        self.samples
            .iter()
            .skip(channel)
            .step_by(self.channels)
            .map(|&s| s as f32 / scale)
            .collect()
    }

    /// Analyzer-local mono downmix normalized to [-1, 1]
    pub fn mono_f32(&self) -> Vec<f32> {
        if self.channels == 1 {
            return self.channel_f32(0);
        }
        let scale = self.full_scale() * self.channels as f32;
        self.samples
            .chunks_exact(self.channels)
            .map(|frame| frame.iter().map(|&s| s as f32).sum::<f32>() / scale)
            .collect()
    }

    fn full_scale(&self) -> f32 {
        (1u64 << (self.bits_per_sample - 1)) as f32
    }
}

/// Canonical decoded form of a media file
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBuffer {
    Image(PixelPlanes),
    Audio(PcmBuffer),
}

impl SampleBuffer {
    pub fn as_image(&self) -> Result<&PixelPlanes> {
        match self {
            SampleBuffer::Image(planes) => Ok(planes),
            SampleBuffer::Audio(_) => Err(DetectionError::UnsupportedFormat(
                "expected an image buffer, got audio".to_string(),
            )),
        }
    }

    pub fn as_audio(&self) -> Result<&PcmBuffer> {
        match self {
            SampleBuffer::Audio(pcm) => Ok(pcm),
            SampleBuffer::Image(_) => Err(DetectionError::UnsupportedFormat(
                "expected an audio buffer, got an image".to_string(),
            )),
        }
    }

    /// Approximate resident size, used for large-buffer backpressure
    pub fn byte_size(&self) -> u64 {
        match self {
            SampleBuffer::Image(planes) => (planes.pixel_count() * planes.planes().len()) as u64,
            SampleBuffer::Audio(pcm) => (pcm.samples().len() * std::mem::size_of::<i32>()) as u64,
        }
    }
}
