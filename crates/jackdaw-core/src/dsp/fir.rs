//! Windowed-sinc FIR filter applied by frequency-domain block convolution
//!
//! - Impulse responses come from the closed-form ideal responses for
//!   lowpass / highpass / bandpass / bandcut, Hamming windowed
//! - The response is zero-padded to `frequency_response_len` and transformed
//!   once (unscaled) whenever a parameter changes
//! - Each chunk is padded, transformed (scaled), multiplied bin by bin,
//!   inverse transformed, and stitched to the previous chunk with overlap-add
//!
//! All frequencies are normalized to the sample rate (`0.0 ..= 0.5`); the
//! `_hz` setters divide by the sample rate first.

use std::f64::consts::{PI, TAU};

use num_complex::Complex64;

use super::error::{try_zeroed, DspError, DspResult};
use super::spectral::{magnitudes, spectral_engine, SpectralEngine};
use super::util::hamming;
use crate::types::{Channel, StereoBuffer, NUM_CHANNELS};

/// Filter response shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum FilterType {
    #[default]
    Lowpass = 0,
    Highpass = 1,
    Bandpass = 2,
    Bandcut = 3,
}

impl FilterType {
    /// Convert from the integer stored in the `type` endpoint
    pub fn from_index(idx: i32) -> Option<Self> {
        match idx {
            0 => Some(FilterType::Lowpass),
            1 => Some(FilterType::Highpass),
            2 => Some(FilterType::Bandpass),
            3 => Some(FilterType::Bandcut),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FilterType::Lowpass => "Lowpass",
            FilterType::Highpass => "Highpass",
            FilterType::Bandpass => "Bandpass",
            FilterType::Bandcut => "Bandcut",
        }
    }
}

/// Ideal lowpass tap; `cutoff` is angular (radians/sample)
fn lowpass_tap(x: usize, offset: usize, cutoff: f64) -> f64 {
    if x == offset {
        cutoff / PI
    } else {
        let d = x as f64 - offset as f64;
        (cutoff * d).sin() / (PI * d)
    }
}

fn highpass_tap(x: usize, offset: usize, cutoff: f64) -> f64 {
    if x == offset {
        1.0 - cutoff / PI
    } else {
        let d = x as f64 - offset as f64;
        ((PI * d).sin() - (cutoff * d).sin()) / (PI * d)
    }
}

/// Band edges in radians, clamped to `[0, π]`
fn band_edges(center: f64, bandwidth: f64) -> (f64, f64) {
    let lower = (TAU * (center - bandwidth / 2.0)).max(0.0);
    let upper = (TAU * (center + bandwidth / 2.0)).min(PI);
    (lower, upper)
}

fn bandpass_tap(x: usize, offset: usize, center: f64, bandwidth: f64) -> f64 {
    let (lower, upper) = band_edges(center, bandwidth);
    if x == offset {
        (upper - lower) / PI
    } else {
        let d = x as f64 - offset as f64;
        ((upper * d).sin() - (lower * d).sin()) / (PI * d)
    }
}

fn bandcut_tap(x: usize, offset: usize, center: f64, bandwidth: f64) -> f64 {
    let (lower, upper) = band_edges(center, bandwidth);
    highpass_tap(x, offset, upper) + lowpass_tap(x, offset, lower)
}

/// Frequency-domain FIR filter with per-channel overlap-add state
pub struct FirFilter {
    filter_type: FilterType,
    /// Normalized cutoff (lowpass/highpass) or centre frequency (band types)
    cutoff: f64,
    /// Normalized bandwidth, used by the band types only
    bandwidth: f64,
    sample_rate: u32,

    /// Largest chunk this filter will see; also the IR length bound
    chunk_len: usize,
    impulse_response: Vec<f64>,
    impulse_response_len: usize,
    frequency_response: Vec<Complex64>,
    frequency_response_mag: Vec<f64>,

    overlap: [Vec<f64>; NUM_CHANNELS],
    overlap_len: usize,

    /// Optional per-channel output spectrum for display
    capture_output_spectrum: bool,
    output_freq_mag: [Vec<f64>; NUM_CHANNELS],

    // Scratch (sized at construction, reused every chunk)
    padded: Vec<f64>,
    spectrum: Vec<Complex64>,
    time: Vec<Complex64>,
    channel_buf: Vec<f64>,
}

impl FirFilter {
    /// Allocate a filter
    ///
    /// `frequency_response_len` must be a power of two and at least
    /// `2 * chunk_len` so that a full chunk convolved with a full-length IR
    /// never wraps. The filter starts as a lowpass at 1 kHz.
    pub fn new(
        impulse_response_len: usize,
        frequency_response_len: usize,
        chunk_len: usize,
        sample_rate: u32,
    ) -> DspResult<Self> {
        SpectralEngine::check_len(frequency_response_len)?;
        if frequency_response_len < 2 * chunk_len {
            return Err(DspError::LengthMismatch {
                expected: 2 * chunk_len,
                actual: frequency_response_len,
            });
        }
        let mut filter = Self {
            filter_type: FilterType::Lowpass,
            cutoff: 0.02,
            bandwidth: 0.1,
            sample_rate,
            chunk_len,
            impulse_response: try_zeroed("impulse response", chunk_len)?,
            impulse_response_len: 0,
            frequency_response: try_zeroed("frequency response", frequency_response_len)?,
            frequency_response_mag: try_zeroed("frequency response magnitude", frequency_response_len)?,
            overlap: [
                try_zeroed("overlap buffer", chunk_len)?,
                try_zeroed("overlap buffer", chunk_len)?,
            ],
            overlap_len: 0,
            capture_output_spectrum: false,
            output_freq_mag: [
                try_zeroed("output magnitude", frequency_response_len)?,
                try_zeroed("output magnitude", frequency_response_len)?,
            ],
            padded: try_zeroed("padded chunk", frequency_response_len)?,
            spectrum: try_zeroed("spectrum", frequency_response_len)?,
            time: try_zeroed("time domain", frequency_response_len)?,
            channel_buf: try_zeroed("channel buffer", chunk_len)?,
        };
        filter.set_impulse_response_len(impulse_response_len)?;
        filter.set_params_hz(FilterType::Lowpass, 1000.0, 1000.0)?;
        Ok(filter)
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn impulse_response_len(&self) -> usize {
        self.impulse_response_len
    }

    pub fn frequency_response_len(&self) -> usize {
        self.frequency_response.len()
    }

    pub fn overlap_len(&self) -> usize {
        self.overlap_len
    }

    /// Current impulse response (windowed taps)
    pub fn impulse_response(&self) -> &[f64] {
        &self.impulse_response[..self.impulse_response_len]
    }

    /// Magnitude of the unscaled frequency response, one value per bin
    pub fn frequency_response_mag(&self) -> &[f64] {
        &self.frequency_response_mag
    }

    /// Enable capture of the per-channel filtered spectrum
    pub fn set_capture_output_spectrum(&mut self, capture: bool) {
        self.capture_output_spectrum = capture;
    }

    /// Most recent filtered spectrum magnitude for a channel
    pub fn output_freq_mag(&self, channel: Channel) -> &[f64] {
        &self.output_freq_mag[channel.index()]
    }

    /// Regenerate the impulse and frequency responses
    pub fn set_params(&mut self, filter_type: FilterType, cutoff: f64, bandwidth: f64) -> DspResult<()> {
        self.filter_type = filter_type;
        self.cutoff = cutoff;
        self.bandwidth = bandwidth;

        let len = self.impulse_response_len;
        let offset = len / 2;
        for (i, tap) in self.impulse_response[..len].iter_mut().enumerate() {
            let ideal = match filter_type {
                FilterType::Lowpass => lowpass_tap(i, offset, TAU * cutoff),
                FilterType::Highpass => highpass_tap(i, offset, TAU * cutoff),
                FilterType::Bandpass => bandpass_tap(i, offset, cutoff, bandwidth),
                FilterType::Bandcut => bandcut_tap(i, offset, cutoff, bandwidth),
            };
            *tap = ideal * hamming(i, len);
        }
        self.refresh_frequency_response()
    }

    /// [`set_params`](Self::set_params) with frequencies in Hz
    pub fn set_params_hz(&mut self, filter_type: FilterType, cutoff_hz: f64, bandwidth_hz: f64) -> DspResult<()> {
        let sr = self.sample_rate as f64;
        self.set_params(filter_type, cutoff_hz / sr, bandwidth_hz / sr)
    }

    pub fn set_cutoff(&mut self, cutoff: f64) -> DspResult<()> {
        self.set_params(self.filter_type, cutoff, self.bandwidth)
    }

    pub fn set_cutoff_hz(&mut self, cutoff_hz: f64) -> DspResult<()> {
        self.set_cutoff(cutoff_hz / self.sample_rate as f64)
    }

    pub fn set_bandwidth(&mut self, bandwidth: f64) -> DspResult<()> {
        self.set_params(self.filter_type, self.cutoff, bandwidth)
    }

    pub fn set_bandwidth_hz(&mut self, bandwidth_hz: f64) -> DspResult<()> {
        self.set_bandwidth(bandwidth_hz / self.sample_rate as f64)
    }

    pub fn set_type(&mut self, filter_type: FilterType) -> DspResult<()> {
        self.set_params(filter_type, self.cutoff, self.bandwidth)
    }

    /// Change the IR length
    ///
    /// Lengths above the chunk length are clamped with a warning. The
    /// overlap buffers are zeroed, so the next chunk starts without the
    /// previous tail.
    pub fn set_impulse_response_len(&mut self, len: usize) -> DspResult<()> {
        let mut len = len.max(1);
        if len > self.chunk_len {
            log::warn!(
                "FIR impulse response length {} exceeds chunk length {}; clamping",
                len,
                self.chunk_len
            );
            len = self.chunk_len;
        }
        self.impulse_response_len = len;
        self.overlap_len = len - 1;
        self.set_params(self.filter_type, self.cutoff, self.bandwidth)?;
        self.clear_overlap();
        Ok(())
    }

    /// Load a user-supplied impulse response
    ///
    /// The taps are Hamming windowed over their own length. The IR length
    /// follows `ir.len()` (clamped to the chunk length).
    pub fn set_arbitrary_ir(&mut self, ir: &[f64]) -> DspResult<()> {
        self.set_impulse_response_len(ir.len())?;
        let len = self.impulse_response_len;
        for (i, (tap, &v)) in self.impulse_response[..len].iter_mut().zip(ir).enumerate() {
            *tap = v * hamming(i, len);
        }
        self.refresh_frequency_response()
    }

    /// Zero both overlap buffers
    pub fn clear_overlap(&mut self) {
        for buf in &mut self.overlap {
            buf.fill(0.0);
        }
    }

    fn refresh_frequency_response(&mut self) -> DspResult<()> {
        let len = self.impulse_response_len;
        self.padded.fill(0.0);
        self.padded[..len].copy_from_slice(&self.impulse_response[..len]);
        spectral_engine().fft_unscaled(&self.padded, &mut self.frequency_response)?;
        magnitudes(&self.frequency_response, &mut self.frequency_response_mag);
        Ok(())
    }

    /// Filter one channel of samples in place
    ///
    /// `samples.len()` may be any length up to the chunk length. The first
    /// `overlap_len` outputs receive the tail carried from the previous call,
    /// and this call's tail is carried into the next.
    pub fn apply_channel(&mut self, channel: Channel, samples: &mut [f64]) -> DspResult<()> {
        let chunk = samples.len();
        if chunk > self.chunk_len {
            return Err(DspError::LengthMismatch {
                expected: self.chunk_len,
                actual: chunk,
            });
        }
        let engine = spectral_engine();

        self.padded.fill(0.0);
        self.padded[..chunk].copy_from_slice(samples);
        engine.fft(&self.padded, &mut self.spectrum)?;
        for (bin, h) in self.spectrum.iter_mut().zip(self.frequency_response.iter()) {
            *bin *= h;
        }
        if self.capture_output_spectrum {
            magnitudes(&self.spectrum, &mut self.output_freq_mag[channel.index()]);
        }
        engine.ifft(&self.spectrum, &mut self.time)?;

        let overlap = &mut self.overlap[channel.index()];
        let overlap_len = self.overlap_len;
        for (i, s) in samples.iter_mut().enumerate() {
            *s = self.time[i].re;
            if i < overlap_len {
                *s += overlap[i];
            }
        }
        // Tail beyond this chunk; any old tail past `chunk` is carried forward too
        for j in 0..overlap_len {
            let carried = if chunk + j < overlap_len { overlap[chunk + j] } else { 0.0 };
            overlap[j] = self.time[chunk + j].re + carried;
        }
        Ok(())
    }

    /// Filter both channels of a stereo chunk in place
    pub fn process(&mut self, buffer: &mut StereoBuffer) -> DspResult<()> {
        let mut scratch = std::mem::take(&mut self.channel_buf);
        let result = self.process_with(buffer, &mut scratch);
        self.channel_buf = scratch;
        result
    }

    fn process_with(&mut self, buffer: &mut StereoBuffer, scratch: &mut [f64]) -> DspResult<()> {
        let len = buffer.len();
        if len > scratch.len() {
            return Err(DspError::LengthMismatch {
                expected: scratch.len(),
                actual: len,
            });
        }
        for channel in Channel::ALL {
            buffer.read_channel(channel, &mut scratch[..len]);
            self.apply_channel(channel, &mut scratch[..len])?;
            buffer.write_channel(channel, &scratch[..len]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::util::amp_to_db;
    use approx::assert_abs_diff_eq;

    fn direct_convolution(x: &[f64], h: &[f64]) -> Vec<f64> {
        let mut y = vec![0.0; x.len() + h.len() - 1];
        for (i, xv) in x.iter().enumerate() {
            for (j, hv) in h.iter().enumerate() {
                y[i + j] += xv * hv;
            }
        }
        y
    }

    fn test_signal(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 0.4 * (0.05 * i as f64).sin() + 0.3 * (0.9 * i as f64).cos())
            .collect()
    }

    #[test]
    fn test_lowpass_dc_and_stopband() {
        let mut filter = FirFilter::new(256, 1024, 256, 48000).unwrap();
        filter.set_params(FilterType::Lowpass, 0.1, 0.0).unwrap();
        let mag = filter.frequency_response_mag();
        assert_abs_diff_eq!(mag[0], 1.0, epsilon = 0.02);

        // Bins above cutoff * len (plus the window's transition band)
        let cutoff_bin = (0.1 * mag.len() as f64) as usize;
        for bin in (cutoff_bin + 16)..(mag.len() / 2) {
            assert!(
                amp_to_db(mag[bin] / mag[0]) < -6.0,
                "bin {} not attenuated: {}",
                bin,
                mag[bin]
            );
        }
    }

    #[test]
    fn test_highpass_blocks_dc() {
        let mut filter = FirFilter::new(255, 1024, 256, 48000).unwrap();
        filter.set_params(FilterType::Highpass, 0.2, 0.0).unwrap();
        let mag = filter.frequency_response_mag();
        assert!(mag[0] < 0.05, "DC leaks through highpass: {}", mag[0]);
        assert_abs_diff_eq!(mag[mag.len() / 2 - 8], 1.0, epsilon = 0.05);
    }

    #[test]
    fn test_bandpass_and_bandcut_are_complementary() {
        let mut bp = FirFilter::new(256, 1024, 256, 48000).unwrap();
        let mut bc = FirFilter::new(256, 1024, 256, 48000).unwrap();
        bp.set_params(FilterType::Bandpass, 0.15, 0.1).unwrap();
        bc.set_params(FilterType::Bandcut, 0.15, 0.1).unwrap();

        let centre = (0.15 * 1024.0) as usize;
        assert_abs_diff_eq!(bp.frequency_response_mag()[centre], 1.0, epsilon = 0.05);
        assert!(bc.frequency_response_mag()[centre] < 0.05);
        assert!(bp.frequency_response_mag()[0] < 0.05);
        assert_abs_diff_eq!(bc.frequency_response_mag()[0], 1.0, epsilon = 0.05);
    }

    #[test]
    fn test_block_convolution_matches_direct_convolution() {
        let mut filter = FirFilter::new(64, 512, 256, 48000).unwrap();
        filter.set_params(FilterType::Lowpass, 0.05, 0.0).unwrap();
        let h = filter.impulse_response().to_vec();

        let x = test_signal(256);
        let expected = direct_convolution(&x, &h);

        let mut y = x.clone();
        filter.apply_channel(Channel::Left, &mut y).unwrap();
        for i in 0..256 {
            assert_abs_diff_eq!(y[i], expected[i], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_overlap_add_equivalence() {
        let mut whole = FirFilter::new(100, 1024, 512, 48000).unwrap();
        let mut split = FirFilter::new(100, 1024, 512, 48000).unwrap();
        for f in [&mut whole, &mut split] {
            f.set_params(FilterType::Bandpass, 0.1, 0.05).unwrap();
        }

        let x = test_signal(512);
        let mut y_whole = x.clone();
        whole.apply_channel(Channel::Right, &mut y_whole).unwrap();

        let mut y_split = x.clone();
        let (a, b) = y_split.split_at_mut(256);
        split.apply_channel(Channel::Right, a).unwrap();
        split.apply_channel(Channel::Right, b).unwrap();

        for (p, q) in y_whole.iter().zip(y_split.iter()) {
            assert_abs_diff_eq!(p, q, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_overlap_carries_across_short_chunks() {
        // IR longer than the chunks being fed
        let mut whole = FirFilter::new(200, 1024, 512, 48000).unwrap();
        let mut split = FirFilter::new(200, 1024, 512, 48000).unwrap();
        let x = test_signal(512);

        let mut y_whole = x.clone();
        whole.apply_channel(Channel::Left, &mut y_whole).unwrap();

        let mut y_split = x.clone();
        for piece in y_split.chunks_mut(64) {
            split.apply_channel(Channel::Left, piece).unwrap();
        }
        for (p, q) in y_whole.iter().zip(y_split.iter()) {
            assert_abs_diff_eq!(p, q, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_impulse_response_len_is_clamped_and_resets_overlap() {
        let mut filter = FirFilter::new(64, 512, 128, 48000).unwrap();
        let mut y = test_signal(128);
        filter.apply_channel(Channel::Left, &mut y).unwrap();
        assert!(filter.overlap[0][..filter.overlap_len()].iter().any(|&v| v != 0.0));

        filter.set_impulse_response_len(1000).unwrap();
        assert_eq!(filter.impulse_response_len(), 128);
        assert_eq!(filter.overlap_len(), 127);
        assert!(filter.overlap[0].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_arbitrary_ir() {
        let mut filter = FirFilter::new(64, 512, 128, 48000).unwrap();
        let ir = vec![1.0; 32];
        filter.set_arbitrary_ir(&ir).unwrap();
        assert_eq!(filter.impulse_response_len(), 32);
        let expected: f64 = (0..32).map(|i| hamming(i, 32)).sum();
        assert_abs_diff_eq!(filter.frequency_response_mag()[0], expected, epsilon = 1e-9);
    }

    #[test]
    fn test_hz_setters_normalize() {
        let mut filter = FirFilter::new(64, 512, 128, 48000).unwrap();
        filter.set_cutoff_hz(4800.0).unwrap();
        assert_abs_diff_eq!(filter.cutoff(), 0.1, epsilon = 1e-12);
        filter.set_bandwidth_hz(2400.0).unwrap();
        assert_abs_diff_eq!(filter.bandwidth(), 0.05, epsilon = 1e-12);
        filter.set_type(FilterType::Bandcut).unwrap();
        assert_eq!(filter.filter_type(), FilterType::Bandcut);
        assert_abs_diff_eq!(filter.cutoff(), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_undersized_frequency_response() {
        assert!(FirFilter::new(64, 128, 128, 48000).is_err());
        assert!(FirFilter::new(64, 300, 128, 48000).is_err());
    }

    #[test]
    fn test_stereo_process_filters_both_channels() {
        let mut filter = FirFilter::new(128, 512, 256, 48000).unwrap();
        filter.set_params(FilterType::Lowpass, 0.02, 0.0).unwrap();
        // Nyquist-rate square wave is removed by a low cutoff
        let left: Vec<f32> = (0..256).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        let mut buffer = StereoBuffer::from_channels(&left, &left);
        filter.process(&mut buffer).unwrap();
        for s in buffer.as_slice()[128..].iter() {
            assert!(s.left.abs() < 0.01 && s.right.abs() < 0.01);
        }
    }
}
