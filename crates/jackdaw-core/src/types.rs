//! Common types for Jackdaw
//!
//! Fundamental audio types shared by the DSP, effect and engine layers:
//! stereo sample frames, stereo chunk buffers, channel identifiers and the
//! project-wide constants that bound chunk and transform sizes.

use std::ops::{Index, IndexMut};

/// Default project sample rate (48kHz)
pub const SAMPLE_RATE: u32 = 48000;

/// Number of output channels processed by the pipeline
pub const NUM_CHANNELS: usize = 2;

/// Default chunk length in sample-frames (one audio callback)
pub const DEFAULT_CHUNK_LEN: usize = 1024;

/// Largest chunk the pipeline accepts
///
/// FIR filters transform `2 * fourier_len` points, and the spectral engine
/// tops out at 8192, so chunks are capped at 4096 frames.
pub const MAX_CHUNK_LEN: usize = 4096;

/// Amplitude below which a buffer is treated as silent
pub const SILENCE_EPSILON: f32 = 1e-7;

/// Audio sample type (32-bit float in buffers; filter state runs in f64)
pub type Sample = f32;

/// Channel identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Channel {
    Left = 0,
    Right = 1,
}

impl Channel {
    /// Both channels in processing order
    pub const ALL: [Channel; NUM_CHANNELS] = [Channel::Left, Channel::Right];

    /// Convert from index (0-1) to Channel
    pub fn from_index(idx: usize) -> Option<Self> {
        match idx {
            0 => Some(Channel::Left),
            1 => Some(Channel::Right),
            _ => None,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// A single stereo sample (left and right channels)
///
/// Uses `#[repr(C)]` so a `&[StereoSample]` can be viewed as interleaved
/// `&[f32]` through bytemuck without copying.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    /// Create a new stereo sample
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    /// Create a silent stereo sample
    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Create a mono sample (same value in both channels)
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Read one channel
    #[inline]
    pub fn get(&self, channel: Channel) -> Sample {
        match channel {
            Channel::Left => self.left,
            Channel::Right => self.right,
        }
    }

    /// Mutable access to one channel
    #[inline]
    pub fn get_mut(&mut self, channel: Channel) -> &mut Sample {
        match channel {
            Channel::Left => &mut self.left,
            Channel::Right => &mut self.right,
        }
    }

    /// Sum of absolute channel values
    #[inline]
    pub fn abs_sum(&self) -> Sample {
        self.left.abs() + self.right.abs()
    }

    /// Get the peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }

    /// Hard-clip both channels to `[-limit, limit]`
    #[inline]
    pub fn clip(&mut self, limit: Sample) {
        self.left = self.left.clamp(-limit, limit);
        self.right = self.right.clamp(-limit, limit);
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

impl std::ops::MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, factor: Sample) {
        self.left *= factor;
        self.right *= factor;
    }
}

/// A chunk of stereo samples
///
/// Track renders, effect processing and the master bus all operate on this
/// type. Buffers are allocated once per track and reused chunk after chunk.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Create a buffer from interleaved samples [L, R, L, R, ...]
    pub fn from_interleaved(interleaved: &[Sample]) -> Self {
        assert!(interleaved.len() % 2 == 0, "Interleaved buffer must have even length");
        let samples = interleaved
            .chunks_exact(2)
            .map(|chunk| StereoSample::new(chunk[0], chunk[1]))
            .collect();
        Self { samples }
    }

    /// Create a buffer from separate left and right channel slices
    pub fn from_channels(left: &[Sample], right: &[Sample]) -> Self {
        assert_eq!(left.len(), right.len(), "Channel lengths must match");
        let samples = left
            .iter()
            .zip(right.iter())
            .map(|(&l, &r)| StereoSample::new(l, r))
            .collect();
        Self { samples }
    }

    /// Get the number of stereo samples in the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Resize the buffer, filling with silence if growing
    pub fn resize(&mut self, new_len: usize) {
        self.samples.resize(new_len, StereoSample::silence());
    }

    /// Fill the buffer with silence
    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    /// Get a slice of the samples
    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    /// Get a mutable slice of the samples
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Zero-copy view of samples as interleaved f32 [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Copy one channel into `dst` (widened to f64 for filter work)
    pub fn read_channel(&self, channel: Channel, dst: &mut [f64]) {
        for (d, s) in dst.iter_mut().zip(self.samples.iter()) {
            *d = s.get(channel) as f64;
        }
    }

    /// Overwrite one channel from `src`
    pub fn write_channel(&mut self, channel: Channel, src: &[f64]) {
        for (s, v) in self.samples.iter_mut().zip(src.iter()) {
            *s.get_mut(channel) = *v as Sample;
        }
    }

    /// Add another buffer to this one (summing samples)
    pub fn add_buffer(&mut self, other: &StereoBuffer) {
        assert_eq!(self.len(), other.len(), "Buffer lengths must match");
        for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
            *dst += *src;
        }
    }

    /// Scale all samples by a factor
    pub fn scale(&mut self, factor: Sample) {
        for sample in &mut self.samples {
            *sample *= factor;
        }
    }

    /// Hard-clip every sample to `[-1, 1]`
    pub fn clip(&mut self) {
        for sample in &mut self.samples {
            sample.clip(1.0);
        }
    }

    /// Get an iterator over the samples
    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.samples.iter()
    }

    /// Get a mutable iterator over the samples
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StereoSample> {
        self.samples.iter_mut()
    }

    /// Summed absolute amplitude over both channels
    ///
    /// Effects report this after processing; the chain compares it against
    /// [`SILENCE_EPSILON`] to skip work on silent input.
    pub fn amplitude(&self) -> Sample {
        self.samples.iter().map(StereoSample::abs_sum).sum()
    }

    /// Get the peak amplitude in the buffer
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.peak()).fold(0.0, Sample::max)
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_sample_channel_access() {
        let mut s = StereoSample::new(0.25, -0.5);
        assert_eq!(s.get(Channel::Left), 0.25);
        *s.get_mut(Channel::Right) = 2.0;
        s.clip(1.0);
        assert_eq!(s.right, 1.0);
        assert_eq!(s.abs_sum(), 1.25);
    }

    #[test]
    fn test_stereo_buffer_channel_roundtrip() {
        let mut buffer = StereoBuffer::from_interleaved(&[1.0, 2.0, 3.0, 4.0]);
        let mut left = [0.0f64; 2];
        buffer.read_channel(Channel::Left, &mut left);
        assert_eq!(left, [1.0, 3.0]);

        buffer.write_channel(Channel::Right, &[-1.0, -2.0]);
        assert_eq!(buffer.as_interleaved(), &[1.0, -1.0, 3.0, -2.0]);
    }

    #[test]
    fn test_stereo_buffer_amplitude_and_clip() {
        let mut buffer = StereoBuffer::from_channels(&[0.5, -2.0], &[0.0, 0.25]);
        assert_eq!(buffer.amplitude(), 2.75);
        buffer.clip();
        assert_eq!(buffer[1].left, -1.0);
        assert_eq!(buffer.peak(), 1.0);
    }

    #[test]
    fn test_channel_enumeration() {
        assert_eq!(Channel::ALL.len(), NUM_CHANNELS);
        assert_eq!(Channel::from_index(1), Some(Channel::Right));
        assert_eq!(Channel::from_index(2), None);
    }
}
