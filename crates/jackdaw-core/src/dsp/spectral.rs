//! Radix-2 FFT engine with a precomputed roots-of-unity table
//!
//! The table holds every root `e^(2πi·k/n)` for each supported power of two
//! and is built exactly once, the first time [`spectral_engine`] is called.
//! After construction the engine is immutable and shared by every filter on
//! every thread.
//!
//! ## Normalization
//!
//! - [`SpectralEngine::fft`] scales by `1/n`
//! - [`SpectralEngine::fft_unscaled`] does not scale
//! - [`SpectralEngine::ifft`] does not scale
//!
//! A filter's frequency response is taken with `fft_unscaled`, signals with
//! `fft`, and the product goes back through `ifft`. The `1/n` from the signal
//! transform cancels the `n` picked up by the inverse, so the result is the
//! exact linear convolution of the signal with the impulse response (as long
//! as the padded length covers both supports).

use std::sync::OnceLock;

use num_complex::Complex64;

use super::error::{DspError, DspResult};

/// Number of table degrees (lengths `2^0 ..= 2^13`)
pub const ROU_MAX_DEGREE: usize = 14;

/// Largest supported transform length
pub const MAX_FFT_LEN: usize = 1 << (ROU_MAX_DEGREE - 1);

static ENGINE: OnceLock<SpectralEngine> = OnceLock::new();

/// Get the shared spectral engine, building the roots table on first use
pub fn spectral_engine() -> &'static SpectralEngine {
    ENGINE.get_or_init(|| {
        let engine = SpectralEngine::new();
        log::info!(
            "Spectral engine ready: roots of unity for lengths up to {}",
            MAX_FFT_LEN
        );
        engine
    })
}

/// Immutable FFT/IFFT engine
pub struct SpectralEngine {
    /// `roots[d][k] = e^(2πi·k / 2^d)`
    roots: Vec<Vec<Complex64>>,
}

impl SpectralEngine {
    /// Build the roots-of-unity table for every supported degree
    ///
    /// Prefer [`spectral_engine`]; constructing more than one engine only
    /// wastes the table.
    pub fn new() -> Self {
        let roots = (0..ROU_MAX_DEGREE)
            .map(|degree| {
                let n = 1usize << degree;
                (0..n)
                    .map(|k| Complex64::from_polar(1.0, std::f64::consts::TAU * k as f64 / n as f64))
                    .collect()
            })
            .collect();
        Self { roots }
    }

    /// Check that `len` is a power of two covered by the table
    pub fn check_len(len: usize) -> DspResult<()> {
        if !len.is_power_of_two() {
            return Err(DspError::InvalidFftLength(len));
        }
        if len > MAX_FFT_LEN {
            return Err(DspError::FftTooLarge { len, max: MAX_FFT_LEN });
        }
        Ok(())
    }

    /// Forward transform of a real signal, scaled by `1/n`
    pub fn fft(&self, input: &[f64], output: &mut [Complex64]) -> DspResult<()> {
        self.fft_unscaled(input, output)?;
        scale(output);
        Ok(())
    }

    /// Forward transform of a real signal without scaling
    ///
    /// Used for impulse responses so that `|H[0]|` equals the sum of the taps.
    pub fn fft_unscaled(&self, input: &[f64], output: &mut [Complex64]) -> DspResult<()> {
        check_pair(input.len(), output.len())?;
        self.transform(input, 1, output, false);
        Ok(())
    }

    /// Forward transform of a complex signal, scaled by `1/n`
    pub fn fft_complex(&self, input: &[Complex64], output: &mut [Complex64]) -> DspResult<()> {
        check_pair(input.len(), output.len())?;
        self.transform(input, 1, output, false);
        scale(output);
        Ok(())
    }

    /// Inverse transform (positive exponent, unscaled)
    pub fn ifft(&self, input: &[Complex64], output: &mut [Complex64]) -> DspResult<()> {
        check_pair(input.len(), output.len())?;
        self.transform(input, 1, output, true);
        Ok(())
    }

    /// Recursive even/odd split over a strided view of `input`
    ///
    /// `output.len()` is the size of this sub-problem; the sub-problem reads
    /// `input[0], input[stride], ..` and writes the spectrum in natural order.
    fn transform<T>(&self, input: &[T], stride: usize, output: &mut [Complex64], inverse: bool)
    where
        T: Copy + Into<Complex64>,
    {
        let n = output.len();
        if n == 1 {
            output[0] = input[0].into();
            return;
        }
        let half = n / 2;
        let (even, odd) = output.split_at_mut(half);
        self.transform(input, stride * 2, even, inverse);
        self.transform(&input[stride..], stride * 2, odd, inverse);

        let roots = &self.roots[n.trailing_zeros() as usize];
        for k in 0..half {
            let w = if inverse { roots[k] } else { roots[k].conj() };
            let t = w * odd[k];
            let e = even[k];
            even[k] = e + t;
            odd[k] = e - t;
        }
    }
}

impl Default for SpectralEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Write `|x|` for every bin of `spectrum` into `dst`
pub fn magnitudes(spectrum: &[Complex64], dst: &mut [f64]) {
    for (d, c) in dst.iter_mut().zip(spectrum.iter()) {
        *d = c.norm();
    }
}

fn check_pair(input: usize, output: usize) -> DspResult<()> {
    if input != output {
        return Err(DspError::LengthMismatch {
            expected: output,
            actual: input,
        });
    }
    SpectralEngine::check_len(output)
}

fn scale(buf: &mut [Complex64]) {
    let inv = 1.0 / buf.len() as f64;
    for c in buf.iter_mut() {
        *c *= inv;
    }
}
