//! Parametric equalizer: a cascade of peak/notch biquads
//!
//! Four bands, each a [`Biquad`] shared across both channels. A band only
//! runs when its amplitude differs from unity (and it is not bypassed). The
//! aggregate magnitude response for display is the product of the active
//! sections' responses. The output of the last processed chunk is kept per
//! channel so a display can show its spectrum next to the response.

use num_complex::Complex64;

use super::error::{try_zeroed, DspError, DspResult};
use super::iir::{Biquad, ResponseScratch};
use super::spectral::{magnitudes, spectral_engine};
use crate::types::{Channel, StereoBuffer, SILENCE_EPSILON};

/// Number of bands
pub const EQ_NUM_BANDS: usize = 4;

/// Default bandwidth as a multiple of the band frequency
pub const DEFAULT_BANDWIDTH_SCALAR: f64 = 3.0;

/// Upper bound on band amplitude
pub const EQ_MAX_AMPLITUDE: f64 = 20.0;

/// Bins in the aggregate response buffer (covering `0..π`)
pub const EQ_FREQ_RESP_RESOLUTION: usize = 1024;

const ACTIVE_EPSILON: f64 = 1e-9;

/// Control state of one band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqBand {
    /// Centre frequency normalized to Nyquist
    pub freq: f64,
    /// Linear amplitude at the centre (1.0 = flat)
    pub amp: f64,
    /// Bandwidth as a multiple of `freq`
    pub bandwidth_scalar: f64,
    /// Bandwidth the user asked for, restored when the band moves somewhere
    /// it becomes realizable again
    pub bandwidth_preferred: f64,
    pub bypass: bool,
}

impl EqBand {
    /// Whether this band currently alters the signal
    pub fn is_active(&self) -> bool {
        !self.bypass && (self.amp - 1.0).abs() >= ACTIVE_EPSILON
    }
}

/// Four-band stereo equalizer
pub struct Equalizer {
    bands: [EqBand; EQ_NUM_BANDS],
    filters: [Biquad; EQ_NUM_BANDS],
    freq_resp: Vec<f64>,
    band_resp: Vec<f64>,
    scratch: ResponseScratch,
    /// Output of the last chunk, zero-padded to a power of two
    capture: [Vec<f64>; 2],
    capture_spectrum: Vec<Complex64>,
    output_mag: [Vec<f64>; 2],
}

impl Equalizer {
    /// Build a flat equalizer
    ///
    /// Default band frequencies are spread logarithmically:
    /// `f_i = (n-1)^(0.15 + 0.15 i) / (n-1)` for `n = chunk_len`.
    pub fn new(chunk_len: usize) -> DspResult<Self> {
        let nsub1 = (chunk_len.max(2) - 1) as f64;
        let bands = std::array::from_fn(|i| EqBand {
            freq: nsub1.powf(0.15 + 0.15 * i as f64) / nsub1,
            amp: 1.0,
            bandwidth_scalar: DEFAULT_BANDWIDTH_SCALAR,
            bandwidth_preferred: DEFAULT_BANDWIDTH_SCALAR,
            bypass: false,
        });
        let mut freq_resp = try_zeroed("EQ response", EQ_FREQ_RESP_RESOLUTION)?;
        freq_resp.fill(1.0);
        let capture_len = chunk_len.max(2).next_power_of_two();
        Ok(Self {
            bands,
            filters: std::array::from_fn(|_| Biquad::new()),
            freq_resp,
            band_resp: try_zeroed("EQ band response", EQ_FREQ_RESP_RESOLUTION)?,
            scratch: ResponseScratch::with_bins(EQ_FREQ_RESP_RESOLUTION)?,
            capture: [
                try_zeroed("EQ output capture", capture_len)?,
                try_zeroed("EQ output capture", capture_len)?,
            ],
            capture_spectrum: try_zeroed("EQ output spectrum", capture_len)?,
            output_mag: [
                try_zeroed("EQ output magnitudes", capture_len / 2)?,
                try_zeroed("EQ output magnitudes", capture_len / 2)?,
            ],
        })
    }

    pub fn band(&self, index: usize) -> Option<&EqBand> {
        self.bands.get(index)
    }

    pub fn is_band_active(&self, index: usize) -> bool {
        self.bands.get(index).is_some_and(EqBand::is_active)
    }

    /// Set a band's frequency, amplitude and bandwidth (radians)
    ///
    /// Amplitude is clamped to `[0, EQ_MAX_AMPLITUDE]`. If the bandwidth has
    /// to be narrowed to be realizable, the band's scalar is updated to match
    /// while the preferred scalar is kept.
    pub fn set_peak(&mut self, index: usize, freq: f64, amp: f64, bandwidth: f64) -> DspResult<()> {
        let band = self.bands.get_mut(index).ok_or(DspError::LengthMismatch {
            expected: EQ_NUM_BANDS,
            actual: index,
        })?;
        let amp = amp.clamp(0.0, EQ_MAX_AMPLITUDE);
        let used = self.filters[index].set_peak_notch(freq, amp, bandwidth)?;
        band.freq = freq;
        band.amp = amp;
        if freq > 0.0 {
            band.bandwidth_scalar = used / freq;
        }
        Ok(())
    }

    /// Set frequency and amplitude, deriving bandwidth from the preferred scalar
    pub fn set_band(&mut self, index: usize, freq: f64, amp: f64) -> DspResult<()> {
        let scalar = self
            .bands
            .get(index)
            .map(|b| b.bandwidth_preferred)
            .unwrap_or(DEFAULT_BANDWIDTH_SCALAR);
        self.set_peak(index, freq, amp, scalar * freq)
    }

    /// Change a band's preferred bandwidth scalar and redesign it
    pub fn set_bandwidth_scalar(&mut self, index: usize, scalar: f64) -> DspResult<()> {
        let Some(band) = self.bands.get_mut(index) else {
            return Err(DspError::LengthMismatch {
                expected: EQ_NUM_BANDS,
                actual: index,
            });
        };
        band.bandwidth_preferred = scalar;
        let (freq, amp) = (band.freq, band.amp);
        self.set_peak(index, freq, amp, scalar * freq)
    }

    /// Bypass or re-enable a band without touching its settings
    pub fn set_band_bypass(&mut self, index: usize, bypass: bool) {
        if let Some(band) = self.bands.get_mut(index) {
            band.bypass = bypass;
        }
    }

    /// Clear all section memory
    pub fn reset(&mut self) {
        for f in &mut self.filters {
            f.reset();
        }
    }

    /// Run one sample of `channel` through every active band
    #[inline]
    pub fn sample(&mut self, input: f64, channel: Channel) -> f64 {
        let mut out = input;
        for (band, filter) in self.bands.iter().zip(self.filters.iter_mut()) {
            if band.is_active() {
                out = filter.sample(out, channel.index());
            }
        }
        out
    }

    /// Process a stereo chunk in place; returns summed absolute output
    ///
    /// Near-silent input only steps active sections forward by one zero
    /// sample per channel and returns `input_amp` unchanged.
    pub fn process(&mut self, buffer: &mut StereoBuffer, input_amp: f32) -> f32 {
        if input_amp < SILENCE_EPSILON {
            for channel in Channel::ALL {
                for (band, filter) in self.bands.iter().zip(self.filters.iter_mut()) {
                    if band.is_active() {
                        filter.advance(channel.index());
                    }
                }
            }
            for capture in &mut self.capture {
                capture.fill(0.0);
            }
            return input_amp;
        }
        let mut output_amp = 0.0;
        for frame in buffer.iter_mut() {
            for channel in Channel::ALL {
                let s = frame.get_mut(channel);
                *s = self.sample(*s as f64, channel) as f32;
                output_amp += s.abs();
            }
        }
        self.capture_output(buffer);
        output_amp
    }

    fn capture_output(&mut self, buffer: &StereoBuffer) {
        for channel in Channel::ALL {
            let capture = &mut self.capture[channel.index()];
            capture.fill(0.0);
            for (c, frame) in capture.iter_mut().zip(buffer.iter()) {
                *c = frame.get(channel) as f64;
            }
        }
    }

    /// Recompute the magnitude spectrum of the last processed chunk
    ///
    /// Bin `k` of [`Equalizer::output_spectrum`] corresponds to `2k / n` of
    /// Nyquist for the capture length `n`.
    pub fn update_output_spectrum(&mut self) -> DspResult<()> {
        let engine = spectral_engine();
        for channel in Channel::ALL {
            let i = channel.index();
            engine.fft(&self.capture[i], &mut self.capture_spectrum)?;
            magnitudes(&self.capture_spectrum, &mut self.output_mag[i]);
        }
        Ok(())
    }

    /// Output magnitudes from the last [`Equalizer::update_output_spectrum`]
    pub fn output_spectrum(&self, channel: Channel) -> &[f64] {
        &self.output_mag[channel.index()]
    }

    /// Recompute and return the aggregate magnitude response
    ///
    /// Bin `k` corresponds to `k / EQ_FREQ_RESP_RESOLUTION` of Nyquist.
    pub fn update_freq_response(&mut self) -> DspResult<&[f64]> {
        self.freq_resp.fill(1.0);
        for (band, filter) in self.bands.iter().zip(self.filters.iter()) {
            if !band.is_active() {
                continue;
            }
            filter.magnitude_response(&mut self.band_resp, &mut self.scratch)?;
            for (total, b) in self.freq_resp.iter_mut().zip(self.band_resp.iter()) {
                *total *= b;
            }
        }
        Ok(&self.freq_resp)
    }

    /// Last computed aggregate response
    pub fn freq_response(&self) -> &[f64] {
        &self.freq_resp
    }
}
