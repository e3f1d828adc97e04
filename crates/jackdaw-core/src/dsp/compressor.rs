//! Feed-forward peak compressor
//!
//! Per sample the channel's [`EnvelopeFollower`] is fed; when the envelope is
//! above threshold the overshoot is scaled by `m = 1/ratio`. Make-up gain is
//! applied whether or not the sample was reduced. No look-ahead.

use super::envelope::EnvelopeFollower;
use crate::types::{Channel, StereoBuffer, NUM_CHANNELS};

pub const COMP_DEFAULT_ATTACK_MSEC: f64 = 5.0;
pub const COMP_DEFAULT_RELEASE_MSEC: f64 = 50.0;
pub const COMP_DEFAULT_RATIO: f64 = 2.0;
pub const COMP_DEFAULT_THRESHOLD: f64 = 0.2;
pub const COMP_MAX_MAKEUP_GAIN: f64 = 10.0;

/// Stereo compressor with per-channel detection
#[derive(Debug, Clone)]
pub struct Compressor {
    followers: [EnvelopeFollower; NUM_CHANNELS],
    attack_msec: f64,
    release_msec: f64,
    threshold: f64,
    m: f64,
    makeup_gain: f64,
    gain_reduction: [f64; NUM_CHANNELS],
    env: [f64; NUM_CHANNELS],
}

impl Compressor {
    pub fn new(sample_rate: u32) -> Self {
        let follower = EnvelopeFollower::new(
            COMP_DEFAULT_ATTACK_MSEC,
            COMP_DEFAULT_RELEASE_MSEC,
            sample_rate,
        );
        Self {
            followers: [follower; NUM_CHANNELS],
            attack_msec: COMP_DEFAULT_ATTACK_MSEC,
            release_msec: COMP_DEFAULT_RELEASE_MSEC,
            threshold: COMP_DEFAULT_THRESHOLD,
            m: 1.0 / COMP_DEFAULT_RATIO,
            makeup_gain: 1.0,
            gain_reduction: [1.0; NUM_CHANNELS],
            env: [0.0; NUM_CHANNELS],
        }
    }

    pub fn set_times_msec(&mut self, attack_msec: f64, release_msec: f64, sample_rate: u32) {
        self.attack_msec = attack_msec;
        self.release_msec = release_msec;
        for f in &mut self.followers {
            f.set_times_msec(attack_msec, release_msec, sample_rate);
        }
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold.max(0.0);
    }

    /// `ratio:1` compression; ratios below 1 are treated as 1
    pub fn set_ratio(&mut self, ratio: f64) {
        self.m = 1.0 / ratio.max(1.0);
    }

    /// Slope above threshold directly (`0..=1`)
    pub fn set_m(&mut self, m: f64) {
        self.m = m.clamp(0.0, 1.0);
    }

    pub fn set_makeup_gain(&mut self, gain: f64) {
        self.makeup_gain = gain.clamp(0.0, COMP_MAX_MAKEUP_GAIN);
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn m(&self) -> f64 {
        self.m
    }

    pub fn ratio(&self) -> f64 {
        if self.m > 0.0 {
            1.0 / self.m
        } else {
            f64::INFINITY
        }
    }

    pub fn makeup_gain(&self) -> f64 {
        self.makeup_gain
    }

    pub fn attack_msec(&self) -> f64 {
        self.attack_msec
    }

    pub fn release_msec(&self) -> f64 {
        self.release_msec
    }

    /// Gain applied to the last sample of `channel` before make-up
    pub fn gain_reduction(&self, channel: Channel) -> f64 {
        self.gain_reduction[channel.index()]
    }

    /// Envelope at the last sample of `channel`
    pub fn envelope(&self, channel: Channel) -> f64 {
        self.env[channel.index()]
    }

    #[inline]
    pub fn sample(&mut self, input: f64, channel: Channel) -> f64 {
        let idx = channel.index();
        let env = self.followers[idx].sample(input);
        let overshoot = env - self.threshold;
        let scalar = if overshoot > 0.0 {
            (self.threshold + overshoot * self.m) / env
        } else {
            1.0
        };
        self.gain_reduction[idx] = scalar;
        self.env[idx] = env;
        input * scalar * self.makeup_gain
    }

    /// Process a stereo chunk in place; returns summed absolute output
    pub fn process(&mut self, buffer: &mut StereoBuffer) -> f32 {
        let mut output_amp = 0.0;
        for frame in buffer.iter_mut() {
            for channel in Channel::ALL {
                let s = frame.get_mut(channel);
                *s = self.sample(*s as f64, channel) as f32;
                output_amp += s.abs();
            }
        }
        output_amp
    }

    /// Drop detector state
    pub fn reset(&mut self) {
        for f in &mut self.followers {
            f.reset();
        }
        self.gain_reduction = [1.0; NUM_CHANNELS];
        self.env = [0.0; NUM_CHANNELS];
    }
}
