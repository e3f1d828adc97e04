//! Asymmetric one-pole envelope follower

/// Tracks the rectified level of a signal with separate attack and release
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeFollower {
    attack_coeff: f64,
    release_coeff: f64,
    prev_out: f64,
}

impl Default for EnvelopeFollower {
    /// Coefficients of 1.0 follow the input instantly
    fn default() -> Self {
        Self {
            attack_coeff: 1.0,
            release_coeff: 1.0,
            prev_out: 0.0,
        }
    }
}

/// `1 - e^(-1/samples)`; zero or negative lengths give an instant response
fn time_coeff(samples: f64) -> f64 {
    if samples <= 0.0 {
        return 1.0;
    }
    1.0 - (-1.0 / samples).exp()
}

impl EnvelopeFollower {
    pub fn new(attack_msec: f64, release_msec: f64, sample_rate: u32) -> Self {
        let mut follower = Self::default();
        follower.set_times_msec(attack_msec, release_msec, sample_rate);
        follower
    }

    /// Set attack and release as time constants in sample frames
    pub fn set_times(&mut self, attack_sframes: f64, release_sframes: f64) {
        self.attack_coeff = time_coeff(attack_sframes);
        self.release_coeff = time_coeff(release_sframes);
    }

    pub fn set_times_msec(&mut self, attack_msec: f64, release_msec: f64, sample_rate: u32) {
        let per_msec = sample_rate as f64 / 1000.0;
        self.set_times(attack_msec * per_msec, release_msec * per_msec);
    }

    pub fn attack_coeff(&self) -> f64 {
        self.attack_coeff
    }

    pub fn release_coeff(&self) -> f64 {
        self.release_coeff
    }

    /// Last output
    pub fn level(&self) -> f64 {
        self.prev_out
    }

    #[inline]
    pub fn sample(&mut self, input: f64) -> f64 {
        let rect = input.abs();
        let coeff = if rect > self.prev_out {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        let out = rect * coeff + (1.0 - coeff) * self.prev_out;
        self.prev_out = out;
        out
    }

    pub fn reset(&mut self) {
        self.prev_out = 0.0;
    }
}
