//! Feedback delay line
//!
//! Two [`RingBuffer`]s (one per channel) sized for the longest delay the
//! project allows. Changing the length resamples the stored echoes instead of
//! discarding them, so a moving delay time bends pitch rather than cutting out.
//! The left channel's read tap can be skewed by a fraction of the length for
//! stereo widening.

use super::error::{try_zeroed, DspError, DspResult};
use super::ring::RingBuffer;
use crate::types::{Channel, StereoBuffer, NUM_CHANNELS};

/// Length in sample frames of a freshly initialized line
pub const DEFAULT_DELAY_LEN: usize = 5000;

/// Upper bound on `len_msec` exposed to the user
pub const DELAY_MAX_MSEC: i32 = 1000;

/// Upper bound on feedback amplitude
pub const DELAY_MAX_AMP: f64 = 0.99;

struct Lines {
    rings: [RingBuffer<f64>; NUM_CHANNELS],
    scratch: Vec<f64>,
}

/// Stereo feedback delay
#[derive(Default)]
pub struct DelayLine {
    lines: Option<Lines>,
    len: usize,
    amp: f64,
    stereo_offset: f64,
    sample_rate: u32,
}

impl DelayLine {
    /// Unallocated line; [`DelayLine::init`] must run before it does anything
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate buffers for up to `max_secs` of delay at `sample_rate`
    ///
    /// Calling this twice is an error; the existing buffers are kept.
    pub fn init(&mut self, sample_rate: u32, max_secs: f64) -> DspResult<()> {
        if self.lines.is_some() {
            log::warn!("Attempt to reinitialize delay line");
            return Err(DspError::AlreadyInitialized("delay line"));
        }
        let max_len = ((max_secs * sample_rate as f64) as usize).max(1);
        let mut left = RingBuffer::with_capacity("delay line L", max_len)?;
        let mut right = RingBuffer::with_capacity("delay line R", max_len)?;
        let mut scratch = try_zeroed("delay line scratch", max_len)?;
        let len = DEFAULT_DELAY_LEN.min(max_len);
        left.resize_resampled(len, &mut scratch);
        right.resize_resampled(len, &mut scratch);

        self.lines = Some(Lines {
            rings: [left, right],
            scratch,
        });
        self.len = len;
        self.amp = 0.0;
        self.stereo_offset = 0.0;
        self.sample_rate = sample_rate;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.lines.is_some()
    }

    /// Active length in sample frames
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Longest length the buffers can hold
    pub fn max_len(&self) -> usize {
        self.lines
            .as_ref()
            .map(|l| l.rings[0].capacity())
            .unwrap_or(0)
    }

    pub fn amp(&self) -> f64 {
        self.amp
    }

    pub fn stereo_offset(&self) -> f64 {
        self.stereo_offset
    }

    /// Write cursor for `channel`
    pub fn pos(&self, channel: Channel) -> usize {
        self.lines
            .as_ref()
            .map(|l| l.rings[channel.index()].pos())
            .unwrap_or(0)
    }

    /// Set feedback amplitude and length, resampling on a length change
    ///
    /// `len` is clamped to `[1, max_len]`.
    pub fn set_params(&mut self, amp: f64, len: usize) {
        self.amp = amp.clamp(0.0, DELAY_MAX_AMP);
        let Some(lines) = self.lines.as_mut() else {
            return;
        };
        if len != self.len {
            let Lines { rings, scratch } = lines;
            let mut new_len = len;
            for ring in rings.iter_mut() {
                new_len = ring.resize_resampled(len, scratch);
            }
            self.len = new_len;
        }
    }

    /// Set the length from milliseconds at the initialized sample rate
    pub fn set_len_msec(&mut self, msec: i32) {
        let msec = msec.clamp(0, DELAY_MAX_MSEC);
        let len = (msec as f64 * self.sample_rate as f64 / 1000.0) as usize;
        self.set_params(self.amp, len);
    }

    pub fn set_amp(&mut self, amp: f64) {
        self.set_params(amp, self.len);
    }

    /// Skew the left read tap by `offset · len` samples (`offset` in `[0, 1]`)
    pub fn set_stereo_offset(&mut self, offset: f64) {
        self.stereo_offset = offset.clamp(0.0, 1.0);
    }

    /// Zero stored echoes
    pub fn clear(&mut self) {
        if let Some(lines) = self.lines.as_mut() {
            for ring in &mut lines.rings {
                ring.clear();
            }
        }
    }

    /// Run one channel through the line; returns summed absolute output
    pub fn apply_channel(&mut self, channel: Channel, samples: &mut [f32]) -> f32 {
        self.run(channel, samples.iter_mut())
    }

    /// Process a stereo chunk in place; returns summed absolute output
    pub fn process(&mut self, buffer: &mut StereoBuffer) -> f32 {
        Channel::ALL
            .into_iter()
            .map(|ch| self.run(ch, buffer.iter_mut().map(|f| f.get_mut(ch))))
            .sum()
    }

    fn run<'a>(&mut self, channel: Channel, samples: impl Iterator<Item = &'a mut f32>) -> f32 {
        let amp = self.amp;
        let Some(lines) = self.lines.as_mut() else {
            return samples.map(|s| s.abs()).sum();
        };
        let ring = &mut lines.rings[channel.index()];
        let tap_back = match channel {
            Channel::Left => (self.stereo_offset * ring.len() as f64) as usize,
            Channel::Right => 0,
        };
        let mut output_amp = 0.0;
        for s in samples {
            let input = *s as f64;
            *s = (input + ring.behind(tap_back)) as f32;
            output_amp += s.abs();

            let slot = ring.current_mut();
            *slot = ((*slot + input) * amp).clamp(-1.0, 1.0);
            ring.advance();
        }
        output_amp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(sample_rate: u32) -> DelayLine {
        let mut dl = DelayLine::new();
        dl.init(sample_rate, 1.0).unwrap();
        dl
    }

    #[test]
    fn test_init_defaults() {
        let dl = line(48000);
        assert_eq!(dl.len(), DEFAULT_DELAY_LEN);
        assert_eq!(dl.max_len(), 48000);
        assert_eq!(dl.amp(), 0.0);
        assert_eq!(dl.stereo_offset(), 0.0);
    }

    #[test]
    fn test_reinit_is_rejected() {
        let mut dl = line(48000);
        dl.set_params(0.5, 100);
        let err = dl.init(44100, 2.0).unwrap_err();
        assert_eq!(err, DspError::AlreadyInitialized("delay line"));
        assert_eq!(dl.len(), 100);
        assert_eq!(dl.max_len(), 48000);
    }

    #[test]
    fn test_uninitialized_passes_through() {
        let mut dl = DelayLine::new();
        let mut buffer = StereoBuffer::from_channels(&[0.5, 0.25], &[-0.5, 0.0]);
        let amp = dl.process(&mut buffer);
        assert_eq!(amp, 1.25);
        assert_eq!(buffer[0].left, 0.5);
    }

    #[test]
    fn test_echo_after_len_samples() {
        let mut dl = line(1000);
        dl.set_params(0.5, 10);
        let mut samples = vec![0.0f32; 25];
        samples[0] = 1.0;
        dl.apply_channel(Channel::Right, &mut samples);
        assert_eq!(samples[0], 1.0);
        assert_eq!(samples[10], 0.5);
        assert_eq!(samples[20], 0.25);
        assert!(samples[1..10].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_stereo_offset_shortens_left_tap() {
        let mut dl = line(1000);
        dl.set_params(0.5, 10);
        dl.set_stereo_offset(0.3);
        let mut samples = vec![0.0f32; 12];
        samples[0] = 1.0;
        dl.apply_channel(Channel::Left, &mut samples);
        // written at slot 0, left reads 3 slots behind the cursor
        assert_eq!(samples[3], 0.5);
        assert_eq!(samples[10], 0.0);
    }

    #[test]
    fn test_feedback_is_clipped() {
        let mut dl = line(1000);
        dl.set_params(0.99, 2);
        let mut samples = vec![4.0f32; 64];
        dl.apply_channel(Channel::Right, &mut samples);
        let ring_max = dl.lines.as_ref().unwrap().rings[1]
            .as_slice()
            .iter()
            .fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(ring_max <= 1.0);
    }

    #[test]
    fn test_resize_keeps_cursor_in_range() {
        let mut dl = line(48000);
        dl.set_params(0.5, 1000);
        let mut buffer = StereoBuffer::silence(737);
        buffer[0].left = 1.0;
        dl.process(&mut buffer);
        assert_eq!(dl.pos(Channel::Left), 737);

        dl.set_params(0.5, 400);
        for ch in Channel::ALL {
            let after = dl.pos(ch) as f64 / 400.0;
            assert!((0.737 - after).abs() <= 1.0 / 400.0);
        }

        for new_len in [333, 4000, 1, 48000, 999_999] {
            dl.set_params(0.5, new_len);
            for ch in Channel::ALL {
                assert!(dl.pos(ch) < dl.len());
            }
        }
        assert_eq!(dl.len(), 48000);
    }

    #[test]
    fn test_len_msec_converts_at_sample_rate() {
        let mut dl = line(48000);
        dl.set_len_msec(250);
        assert_eq!(dl.len(), 12000);
        dl.set_len_msec(5000);
        assert_eq!(dl.len(), 48000);
    }

    #[test]
    fn test_clear_silences_tail() {
        let mut dl = line(1000);
        dl.set_params(0.5, 4);
        let mut samples = vec![1.0f32, 0.0, 0.0, 0.0];
        dl.apply_channel(Channel::Right, &mut samples);
        dl.clear();
        let mut tail = vec![0.0f32; 8];
        assert_eq!(dl.apply_channel(Channel::Right, &mut tail), 0.0);
    }
}
