//! FIR filter effect
//!
//! Cutoff and bandwidth endpoints hold raw `[0, 1]` slider values mapped
//! logarithmically onto `[1 Hz, nyquist]`.

use crate::dsp::util::{hz_to_freq_raw, scale_freq_to_hz};
use crate::dsp::{DspResult, FilterType, FirFilter};
use crate::effect::{dsp_param, Effect, EffectContext, EffectKind};
use crate::endpoint::{Endpoint, EndpointWatch, ThreadId};
use crate::types::StereoBuffer;

/// Shortest impulse response the endpoint allows
pub const MIN_IMPULSE_RESPONSE_LEN: i32 = 4;

const DEFAULT_CUTOFF_HZ: f64 = 1000.0;

pub struct FirEffect {
    filter: FirFilter,
    sample_rate: u32,
    cutoff: EndpointWatch,
    bandwidth: EndpointWatch,
    impulse_response_len: EndpointWatch,
    filter_type: EndpointWatch,
}

impl FirEffect {
    /// Lowpass at 1 kHz with an IR as long as a chunk
    pub fn new(ctx: &EffectContext) -> DspResult<Self> {
        let chunk_len = ctx.chunk_len;
        let filter = FirFilter::new(chunk_len, 2 * ctx.fourier_len(), chunk_len, ctx.sample_rate)?;
        let default_raw = hz_to_freq_raw(DEFAULT_CUTOFF_HZ, ctx.sample_rate);
        let max_ir = (chunk_len as i32).max(MIN_IMPULSE_RESPONSE_LEN);
        Ok(Self {
            filter,
            sample_rate: ctx.sample_rate,
            cutoff: EndpointWatch::new(dsp_param("cutoff", "Cutoff", default_raw, 0.0, 1.0)),
            bandwidth: EndpointWatch::new(dsp_param("bandwidth", "Bandwidth", default_raw, 0.0, 1.0)),
            impulse_response_len: EndpointWatch::new(dsp_param(
                "impulse_response_len",
                "Impulse response length",
                max_ir,
                MIN_IMPULSE_RESPONSE_LEN,
                max_ir,
            )),
            filter_type: EndpointWatch::new(dsp_param("type", "Type", 0i32, 0i32, 3i32)),
        })
    }

    pub fn filter(&self) -> &FirFilter {
        &self.filter
    }

    pub fn cutoff(&self) -> &Endpoint {
        self.cutoff.endpoint()
    }

    pub fn bandwidth(&self) -> &Endpoint {
        self.bandwidth.endpoint()
    }

    pub fn impulse_response_len(&self) -> &Endpoint {
        self.impulse_response_len.endpoint()
    }

    pub fn filter_type(&self) -> &Endpoint {
        self.filter_type.endpoint()
    }

    fn redesign(&mut self) -> DspResult<()> {
        let t = ThreadId::Dsp;
        let mut changed = false;
        if let Some(len) = self.impulse_response_len.poll(t) {
            self.filter.set_impulse_response_len(len.as_i32().max(1) as usize)?;
            changed = true;
        }
        changed |= self.filter_type.poll(t).is_some();
        changed |= self.cutoff.poll(t).is_some();
        changed |= self.bandwidth.poll(t).is_some();
        if !changed {
            return Ok(());
        }
        let filter_type =
            FilterType::from_index(self.filter_type.value(t).as_i32()).unwrap_or(FilterType::Lowpass);
        let cutoff_hz = scale_freq_to_hz(self.cutoff.value(t).as_f64(), self.sample_rate);
        let bandwidth_hz = scale_freq_to_hz(self.bandwidth.value(t).as_f64(), self.sample_rate);
        self.filter.set_params_hz(filter_type, cutoff_hz, bandwidth_hz)
    }
}

impl Effect for FirEffect {
    fn kind(&self) -> EffectKind {
        EffectKind::Fir
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        vec![
            self.cutoff.endpoint().clone(),
            self.bandwidth.endpoint().clone(),
            self.impulse_response_len.endpoint().clone(),
            self.filter_type.endpoint().clone(),
        ]
    }

    fn sync_params(&mut self) {
        if let Err(e) = self.redesign() {
            log::warn!("FIR filter redesign failed: {}", e);
        }
    }

    fn process(&mut self, buffer: &mut StereoBuffer, _input_amp: f32) -> f32 {
        if let Err(e) = self.filter.process(buffer) {
            log::error!("FIR filter: {}", e);
        }
        buffer.amplitude()
    }

    fn silence(&mut self) {
        self.filter.clear_overlap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{Session, Value, WriteFlags};
    use approx::assert_relative_eq;

    fn ctx() -> EffectContext {
        EffectContext {
            sample_rate: 48000,
            chunk_len: 256,
            delay_max_secs: 1.0,
        }
    }

    #[test]
    fn test_defaults() {
        let fx = FirEffect::new(&ctx()).unwrap();
        assert_eq!(fx.filter().filter_type(), FilterType::Lowpass);
        assert_eq!(fx.filter().impulse_response_len(), 256);
        assert_eq!(fx.filter().frequency_response_len(), 512);
        let raw = fx.cutoff().read(ThreadId::Dsp).as_f64();
        assert_relative_eq!(scale_freq_to_hz(raw, 48000), 1000.0, max_relative = 1e-9);
    }

    #[test]
    fn test_endpoint_write_redesigns_on_sync() {
        let session = Session::new();
        let mut fx = FirEffect::new(&ctx()).unwrap();
        let before = fx.filter().cutoff();

        fx.filter_type()
            .write(&session, ThreadId::Dsp, Value::Int(1), WriteFlags::NONE)
            .unwrap();
        fx.cutoff()
            .write(&session, ThreadId::Dsp, Value::Double(0.8), WriteFlags::NONE)
            .unwrap();
        assert_eq!(fx.filter().cutoff(), before);

        fx.sync_params();
        assert_eq!(fx.filter().filter_type(), FilterType::Highpass);
        let expected = scale_freq_to_hz(0.8, 48000) / 48000.0;
        assert_relative_eq!(fx.filter().cutoff(), expected, max_relative = 1e-9);
    }

    #[test]
    fn test_ir_len_endpoint_is_bounded_by_chunk() {
        let session = Session::new();
        let mut fx = FirEffect::new(&ctx()).unwrap();
        fx.impulse_response_len()
            .write(&session, ThreadId::Dsp, Value::Int(10_000), WriteFlags::NONE)
            .unwrap();
        assert_eq!(fx.impulse_response_len().read(ThreadId::Dsp), Value::Int(256));
        fx.impulse_response_len()
            .write(&session, ThreadId::Dsp, Value::Int(32), WriteFlags::NONE)
            .unwrap();
        fx.sync_params();
        assert_eq!(fx.filter().impulse_response_len(), 32);
        assert_eq!(fx.filter().overlap_len(), 31);
    }

    #[test]
    fn test_lowpass_attenuates_nyquist() {
        let mut fx = FirEffect::new(&ctx()).unwrap();
        let nyquist = || {
            let mut buffer = StereoBuffer::silence(256);
            for (i, frame) in buffer.iter_mut().enumerate() {
                let s = if i % 2 == 0 { 0.5 } else { -0.5 };
                frame.left = s;
                frame.right = s;
            }
            buffer
        };
        let input_amp = nyquist().amplitude();
        let mut out = 0.0;
        // steady state once the overlap tail is populated
        for _ in 0..3 {
            let mut buffer = nyquist();
            out = fx.process(&mut buffer, input_amp);
        }
        assert!(out < input_amp * 0.1, "out={} in={}", out, input_amp);
    }
}
