//! Feedback delay effect
//!
//! Wraps a [`DelayLine`] sized for the project's longest delay. The length
//! endpoint is in milliseconds; changing it resamples the stored echoes.

use crate::dsp::delay::{DEFAULT_DELAY_LEN, DELAY_MAX_AMP, DELAY_MAX_MSEC};
use crate::dsp::{DelayLine, DspResult};
use crate::effect::{dsp_param, Effect, EffectContext, EffectKind};
use crate::endpoint::{Endpoint, EndpointWatch, ThreadId};
use crate::types::StereoBuffer;

pub struct DelayEffect {
    line: DelayLine,
    len_msec: EndpointWatch,
    amp: EndpointWatch,
    stereo_offset: EndpointWatch,
}

impl DelayEffect {
    pub fn new(ctx: &EffectContext) -> DspResult<Self> {
        let mut line = DelayLine::new();
        line.init(ctx.sample_rate, ctx.delay_max_secs)?;
        let default_msec = ((DEFAULT_DELAY_LEN as f64 * 1000.0 / ctx.sample_rate as f64).round() as i32)
            .clamp(0, DELAY_MAX_MSEC);
        line.set_len_msec(default_msec);
        Ok(Self {
            line,
            len_msec: EndpointWatch::new(dsp_param("len_msec", "Time (ms)", default_msec, 0i32, DELAY_MAX_MSEC)),
            amp: EndpointWatch::new(dsp_param("amp", "Amplitude", 0.0, 0.0, DELAY_MAX_AMP)),
            stereo_offset: EndpointWatch::new(dsp_param("stereo_offset", "Stereo offset", 0.0, 0.0, 1.0)),
        })
    }

    pub fn line(&self) -> &DelayLine {
        &self.line
    }

    pub fn len_msec(&self) -> &Endpoint {
        self.len_msec.endpoint()
    }

    pub fn amp(&self) -> &Endpoint {
        self.amp.endpoint()
    }

    pub fn stereo_offset(&self) -> &Endpoint {
        self.stereo_offset.endpoint()
    }
}

impl Effect for DelayEffect {
    fn kind(&self) -> EffectKind {
        EffectKind::Delay
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        vec![
            self.len_msec.endpoint().clone(),
            self.amp.endpoint().clone(),
            self.stereo_offset.endpoint().clone(),
        ]
    }

    fn sync_params(&mut self) {
        let t = ThreadId::Dsp;
        if let Some(amp) = self.amp.poll(t) {
            self.line.set_amp(amp.as_f64());
        }
        if let Some(msec) = self.len_msec.poll(t) {
            self.line.set_len_msec(msec.as_i32());
        }
        if let Some(offset) = self.stereo_offset.poll(t) {
            self.line.set_stereo_offset(offset.as_f64());
        }
    }

    fn process(&mut self, buffer: &mut StereoBuffer, _input_amp: f32) -> f32 {
        self.line.process(buffer)
    }

    fn silence(&mut self) {
        self.line.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{Session, Value, WriteFlags};
    use crate::types::StereoSample;

    fn ctx() -> EffectContext {
        EffectContext {
            sample_rate: 1000,
            chunk_len: 64,
            delay_max_secs: 1.0,
        }
    }

    #[test]
    fn test_defaults() {
        let fx = DelayEffect::new(&ctx()).unwrap();
        // 5000 frames at 1 kHz exceeds the 1 s line
        assert_eq!(fx.len_msec().read(ThreadId::Dsp), Value::Int(1000));
        assert_eq!(fx.line().len(), 1000);
        assert_eq!(fx.line().amp(), 0.0);
    }

    #[test]
    fn test_params_apply_on_sync() {
        let session = Session::new();
        let mut fx = DelayEffect::new(&ctx()).unwrap();
        fx.len_msec()
            .write(&session, ThreadId::Main, Value::Int(10), WriteFlags::NONE)
            .unwrap();
        fx.amp()
            .write(&session, ThreadId::Main, Value::Double(0.5), WriteFlags::NONE)
            .unwrap();
        fx.sync_params();
        assert_eq!(fx.line().len(), 10);
        assert_eq!(fx.line().amp(), 0.5);

        let mut buffer = StereoBuffer::silence(32);
        buffer.as_mut_slice()[0] = StereoSample::new(1.0, 1.0);
        fx.process(&mut buffer, 2.0);
        assert_eq!(buffer[10].right, 0.5);
        assert_eq!(buffer[20].right, 0.25);
    }

    #[test]
    fn test_silence_clears_echoes() {
        let session = Session::new();
        let mut fx = DelayEffect::new(&ctx()).unwrap();
        fx.len_msec()
            .write(&session, ThreadId::Dsp, Value::Int(4), WriteFlags::NONE)
            .unwrap();
        fx.amp()
            .write(&session, ThreadId::Dsp, Value::Double(0.9), WriteFlags::NONE)
            .unwrap();
        fx.sync_params();
        let mut buffer = StereoBuffer::silence(8);
        buffer.as_mut_slice()[0] = StereoSample::new(1.0, 1.0);
        fx.process(&mut buffer, 2.0);

        fx.silence();
        let mut tail = StereoBuffer::silence(16);
        assert_eq!(fx.process(&mut tail, 0.0), 0.0);
    }
}
