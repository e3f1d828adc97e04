//! Waveshaping saturator

use crate::types::StereoBuffer;

pub const SATURATION_MAX_GAIN: f64 = 40.0;

/// Transfer curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum SaturationType {
    #[default]
    Tanh = 0,
    /// `sign(x) · (1 - e^(-|x·gain|))`
    Exponential = 1,
}

impl SaturationType {
    pub fn from_index(idx: i32) -> Self {
        match idx {
            1 => Self::Exponential,
            _ => Self::Tanh,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Tanh => "Tanh",
            Self::Exponential => "Exponential",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Saturation {
    kind: SaturationType,
    gain: f64,
    gain_comp: bool,
    gain_comp_val: f64,
}

impl Default for Saturation {
    fn default() -> Self {
        Self {
            kind: SaturationType::Tanh,
            gain: 1.0,
            gain_comp: true,
            gain_comp_val: 1.0,
        }
    }
}

impl Saturation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive in `[1, SATURATION_MAX_GAIN]`; recomputes `1/(ln(gain) + 1)`
    pub fn set_gain(&mut self, gain: f64) {
        self.gain = gain.clamp(1.0, SATURATION_MAX_GAIN);
        self.gain_comp_val = 1.0 / (self.gain.ln() + 1.0);
    }

    pub fn set_type(&mut self, kind: SaturationType) {
        self.kind = kind;
    }

    pub fn set_gain_comp(&mut self, enabled: bool) {
        self.gain_comp = enabled;
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn kind(&self) -> SaturationType {
        self.kind
    }

    pub fn gain_comp(&self) -> bool {
        self.gain_comp
    }

    #[inline]
    pub fn sample(&self, input: f64) -> f64 {
        let driven = input * self.gain;
        let shaped = match self.kind {
            SaturationType::Tanh => driven.tanh(),
            SaturationType::Exponential => driven.signum() * (1.0 - (-driven.abs()).exp()),
        };
        if self.gain_comp {
            shaped * self.gain_comp_val
        } else {
            shaped
        }
    }

    /// Process a stereo chunk in place; returns summed absolute output
    pub fn process(&self, buffer: &mut StereoBuffer) -> f32 {
        let mut output_amp = 0.0;
        for frame in buffer.iter_mut() {
            frame.left = self.sample(frame.left as f64) as f32;
            frame.right = self.sample(frame.right as f64) as f32;
            output_amp += frame.abs_sum();
        }
        output_amp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gain_comp_value() {
        let mut sat = Saturation::new();
        sat.set_gain(10.0);
        assert_relative_eq!(sat.sample(1.0), 10f64.tanh() / (10f64.ln() + 1.0));
        sat.set_gain_comp(false);
        assert_relative_eq!(sat.sample(1.0), 10f64.tanh());
    }

    #[test]
    fn test_unity_gain_tanh() {
        let sat = Saturation::new();
        assert_relative_eq!(sat.sample(0.5), 0.5f64.tanh());
    }

    #[test]
    fn test_exponential_is_odd() {
        let mut sat = Saturation::new();
        sat.set_type(SaturationType::Exponential);
        sat.set_gain(4.0);
        assert_relative_eq!(sat.sample(-0.3), -sat.sample(0.3));
        assert_eq!(sat.sample(0.0), 0.0);
    }

    #[test]
    fn test_gain_is_clamped() {
        let mut sat = Saturation::new();
        sat.set_gain(100.0);
        assert_eq!(sat.gain(), SATURATION_MAX_GAIN);
        sat.set_gain(0.0);
        assert_eq!(sat.gain(), 1.0);
    }

    #[test]
    fn test_output_bounded() {
        let mut sat = Saturation::new();
        sat.set_gain(SATURATION_MAX_GAIN);
        sat.set_gain_comp(false);
        let mut buffer = StereoBuffer::from_channels(&[5.0, -5.0], &[0.9, -0.9]);
        sat.process(&mut buffer);
        assert!(buffer.iter().all(|f| f.peak() <= 1.0));
    }
}
