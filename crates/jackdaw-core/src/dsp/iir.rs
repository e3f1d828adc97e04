//! Second-order IIR sections with peak/notch design
//!
//! Difference equation (coefficients shared across channels, memory per
//! channel):
//!
//! ```text
//! out = A0·in + A1·in[-1] + A2·in[-2] + B0·out[-1] + B1·out[-2]
//! ```
//!
//! Peak/notch coefficients use the pole/zero placement from Reiss (2011),
//! "Design of Audio Parametric Equalizer Filters Directly in the Digital
//! Domain".

use num_complex::Complex64;

use super::error::{DspError, DspResult};
use super::spectral::spectral_engine;
use crate::types::NUM_CHANNELS;

/// Biquad degree
pub const IIR_DEGREE: usize = 2;

/// Stateful second-order section
#[derive(Debug, Clone)]
pub struct Biquad {
    /// Feed-forward coefficients `A0, A1, A2`
    a: [f64; IIR_DEGREE + 1],
    /// Feedback coefficients `B0, B1` (added, not subtracted)
    b: [f64; IIR_DEGREE],
    mem_in: [[f64; IIR_DEGREE]; NUM_CHANNELS],
    mem_out: [[f64; IIR_DEGREE]; NUM_CHANNELS],
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}

impl Biquad {
    /// Identity section (`A0 = 1`, everything else zero)
    pub fn new() -> Self {
        Self {
            a: [1.0, 0.0, 0.0],
            b: [0.0; IIR_DEGREE],
            mem_in: [[0.0; IIR_DEGREE]; NUM_CHANNELS],
            mem_out: [[0.0; IIR_DEGREE]; NUM_CHANNELS],
        }
    }

    pub fn set_coeffs(&mut self, a: [f64; IIR_DEGREE + 1], b: [f64; IIR_DEGREE]) {
        self.a = a;
        self.b = b;
    }

    pub fn coeffs(&self) -> ([f64; IIR_DEGREE + 1], [f64; IIR_DEGREE]) {
        (self.a, self.b)
    }

    /// Run one sample through the section for `channel`
    #[inline]
    pub fn sample(&mut self, input: f64, channel: usize) -> f64 {
        let mem_in = &mut self.mem_in[channel];
        let mem_out = &mut self.mem_out[channel];
        let mut out = self.a[0] * input;
        for i in 0..IIR_DEGREE {
            out += self.a[i + 1] * mem_in[i];
            out += self.b[i] * mem_out[i];
        }
        mem_in.copy_within(0..IIR_DEGREE - 1, 1);
        mem_out.copy_within(0..IIR_DEGREE - 1, 1);
        mem_in[0] = input;
        mem_out[0] = out;
        out
    }

    /// Step the state forward by one zero-valued input
    #[inline]
    pub fn advance(&mut self, channel: usize) {
        self.sample(0.0, channel);
    }

    /// Clear the input/output memory on every channel
    pub fn reset(&mut self) {
        self.mem_in = [[0.0; IIR_DEGREE]; NUM_CHANNELS];
        self.mem_out = [[0.0; IIR_DEGREE]; NUM_CHANNELS];
    }

    /// Design a peak (`amp > 1`) or notch (`amp < 1`) section
    ///
    /// `freq` is normalized to Nyquist (`0..1`), `bandwidth` is in radians.
    /// When the requested bandwidth has no real pole/zero placement at this
    /// frequency the bandwidth is narrowed to the widest realizable value and
    /// a warning is logged. Returns the bandwidth actually used. If nothing
    /// is realizable the coefficients are left untouched.
    pub fn set_peak_notch(&mut self, freq: f64, amp: f64, bandwidth: f64) -> DspResult<f64> {
        let w = freq * std::f64::consts::PI;
        let sin_w = w.sin();
        let mut bandwidth = bandwidth;

        let t_max = sin_w / amp.max(1.0);
        if (bandwidth / 2.0).tan() * amp.max(1.0) > sin_w {
            if t_max <= 0.0 {
                log::error!(
                    "Cannot set peak/notch params (freq={}, amp={}, bandwidth={})",
                    freq,
                    amp,
                    bandwidth
                );
                return Err(DspError::UnrealizableFilter { freq, amp, bandwidth });
            }
            let adjusted = 2.0 * (0.999 * t_max).atan();
            log::warn!(
                "Peak/notch bandwidth {} not realizable at freq {}; using {}",
                bandwidth,
                freq,
                adjusted
            );
            bandwidth = adjusted;
        }

        let (pole, zero) = reiss_2011(w, amp, bandwidth).ok_or_else(|| {
            log::error!("Cannot set peak/notch params (freq={}, amp={}, bandwidth={})", freq, amp, bandwidth);
            DspError::UnrealizableFilter { freq, amp, bandwidth }
        })?;

        self.a = [1.0, -2.0 * zero.re, zero.norm_sqr()];
        self.b = [2.0 * pole.re, -pole.norm_sqr()];
        Ok(bandwidth)
    }

    /// Complex response at angular frequency `theta` (radians/sample)
    pub fn response_at(&self, theta: f64) -> Complex64 {
        let z1 = Complex64::from_polar(1.0, -theta);
        let z2 = z1 * z1;
        let num = self.a[0] + self.a[1] * z1 + self.a[2] * z2;
        let den = 1.0 - self.b[0] * z1 - self.b[1] * z2;
        num / den
    }

    /// Magnitude response over `dst.len()` evenly spaced bins in `[0, π)`
    ///
    /// Numerator and denominator polynomials are transformed with the
    /// spectral engine at `2 * dst.len()` points; `scratch` must hold three
    /// buffers of that length.
    pub fn magnitude_response(&self, dst: &mut [f64], scratch: &mut ResponseScratch) -> DspResult<()> {
        let n = dst.len() * 2;
        scratch.ensure_len(n)?;
        let engine = spectral_engine();

        scratch.poly.fill(0.0);
        scratch.poly[..IIR_DEGREE + 1].copy_from_slice(&self.a);
        engine.fft_unscaled(&scratch.poly, &mut scratch.num)?;

        scratch.poly.fill(0.0);
        scratch.poly[0] = 1.0;
        scratch.poly[1] = -self.b[0];
        scratch.poly[2] = -self.b[1];
        engine.fft_unscaled(&scratch.poly, &mut scratch.den)?;

        for (k, d) in dst.iter_mut().enumerate() {
            *d = (scratch.num[k] / scratch.den[k]).norm();
        }
        Ok(())
    }
}

/// Reusable buffers for [`Biquad::magnitude_response`]
#[derive(Debug, Default, Clone)]
pub struct ResponseScratch {
    poly: Vec<f64>,
    num: Vec<Complex64>,
    den: Vec<Complex64>,
}

impl ResponseScratch {
    /// Pre-size for responses of `bins` points
    pub fn with_bins(bins: usize) -> DspResult<Self> {
        let mut scratch = Self::default();
        scratch.ensure_len(bins * 2)?;
        Ok(scratch)
    }

    fn ensure_len(&mut self, n: usize) -> DspResult<()> {
        super::spectral::SpectralEngine::check_len(n)?;
        if self.poly.len() != n {
            self.poly = super::error::try_zeroed("response polynomial", n)?;
            self.num = super::error::try_zeroed("response numerator", n)?;
            self.den = super::error::try_zeroed("response denominator", n)?;
        }
        Ok(())
    }
}

/// Pole and zero (upper half plane) for a peak/notch at `w` radians
///
/// Returns `None` when either discriminant is negative.
fn reiss_2011(w: f64, amp: f64, bandwidth: f64) -> Option<(Complex64, Complex64)> {
    let cos_w = w.cos();
    let tan_half_bw = (bandwidth / 2.0).tan();
    let tan_sq = tan_half_bw * tan_half_bw;
    let sin_sq_w = w.sin().powi(2);

    let zero_disc = sin_sq_w - amp * amp * tan_sq;
    let pole_disc = sin_sq_w - tan_sq;
    if zero_disc < 0.0 || pole_disc < 0.0 {
        return None;
    }

    let zero_denom = 1.0 + amp * tan_half_bw;
    let pole_denom = 1.0 + tan_half_bw;
    let zero = Complex64::new(cos_w / zero_denom, zero_disc.sqrt() / zero_denom);
    let pole = Complex64::new(cos_w / pole_denom, pole_disc.sqrt() / pole_denom);
    Some((pole, zero))
}
