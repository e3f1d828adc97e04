//! Small numeric helpers shared across the DSP modules

use std::f64::consts::TAU;

use crate::types::Channel;

/// Hamming window value at `x` for a window of length `len`
#[inline]
pub fn hamming(x: usize, len: usize) -> f64 {
    0.54 - 0.46 * (TAU * x as f64 / len as f64).cos()
}

/// Map a raw slider value in `[0, 1]` onto `[1 Hz, nyquist]` logarithmically
///
/// `raw = 0` gives 1 Hz, `raw = 1` gives `sample_rate / 2`.
#[inline]
pub fn scale_freq_to_hz(raw: f64, sample_rate: u32) -> f64 {
    let nyquist = sample_rate as f64 / 2.0;
    10f64.powf(nyquist.log10() * raw)
}

/// Inverse of [`scale_freq_to_hz`]
#[inline]
pub fn hz_to_freq_raw(hz: f64, sample_rate: u32) -> f64 {
    let nyquist = sample_rate as f64 / 2.0;
    hz.max(1.0).log10() / nyquist.log10()
}

/// Linear pan law
///
/// `pan` is in `[0, 1]` with 0.5 at centre. The channel on the side the pan
/// moves towards stays at unity; the other fades linearly to zero.
#[inline]
pub fn pan_scale(pan: f32, channel: Channel) -> f32 {
    match channel {
        Channel::Left => {
            if pan <= 0.5 {
                1.0
            } else {
                (1.0 - pan) * 2.0
            }
        }
        Channel::Right => {
            if pan >= 0.5 {
                1.0
            } else {
                pan * 2.0
            }
        }
    }
}

/// Convert a linear amplitude to decibels
#[inline]
pub fn amp_to_db(amp: f64) -> f64 {
    20.0 * amp.log10()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hamming_endpoints() {
        assert_relative_eq!(hamming(0, 64), 0.08, epsilon = 1e-12);
        assert_relative_eq!(hamming(32, 64), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_scale_freq_to_hz() {
        assert_relative_eq!(scale_freq_to_hz(0.0, 48000), 1.0);
        assert_relative_eq!(scale_freq_to_hz(1.0, 48000), 24000.0, max_relative = 1e-9);
        let mid = scale_freq_to_hz(0.5, 48000);
        assert_relative_eq!(mid, 24000f64.sqrt(), max_relative = 1e-9);
    }

    #[test]
    fn test_hz_to_freq_raw_inverts_scale() {
        let raw = hz_to_freq_raw(1000.0, 48000);
        assert_relative_eq!(scale_freq_to_hz(raw, 48000), 1000.0, max_relative = 1e-9);
    }

    #[test]
    fn test_pan_law() {
        assert_eq!(pan_scale(0.5, Channel::Left), 1.0);
        assert_eq!(pan_scale(0.5, Channel::Right), 1.0);
        assert_eq!(pan_scale(1.0, Channel::Left), 0.0);
        assert_eq!(pan_scale(0.0, Channel::Right), 0.0);
        assert_eq!(pan_scale(0.75, Channel::Left), 0.5);
        assert_eq!(pan_scale(0.25, Channel::Right), 0.5);
    }

    #[test]
    fn test_amp_to_db() {
        assert_relative_eq!(amp_to_db(0.5), -6.0206, epsilon = 1e-4);
    }
}
