//! Saturation effect

use crate::dsp::saturation::SATURATION_MAX_GAIN;
use crate::dsp::{Saturation, SaturationType};
use crate::effect::{dsp_param, Effect, EffectKind};
use crate::endpoint::{Endpoint, EndpointWatch, ThreadId};
use crate::types::StereoBuffer;

pub struct SaturationEffect {
    saturation: Saturation,
    gain: EndpointWatch,
    gain_comp: EndpointWatch,
    kind: EndpointWatch,
}

impl Default for SaturationEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl SaturationEffect {
    pub fn new() -> Self {
        Self {
            saturation: Saturation::new(),
            gain: EndpointWatch::new(dsp_param("gain", "Gain", 1.0, 1.0, SATURATION_MAX_GAIN)),
            gain_comp: EndpointWatch::new(dsp_param("gain_comp", "Gain compensation", true, false, true)),
            kind: EndpointWatch::new(dsp_param("type", "Type", 0i32, 0i32, 1i32)),
        }
    }

    pub fn saturation(&self) -> &Saturation {
        &self.saturation
    }

    pub fn gain(&self) -> &Endpoint {
        self.gain.endpoint()
    }

    pub fn gain_comp(&self) -> &Endpoint {
        self.gain_comp.endpoint()
    }

    pub fn saturation_type(&self) -> &Endpoint {
        self.kind.endpoint()
    }
}

impl Effect for SaturationEffect {
    fn kind(&self) -> EffectKind {
        EffectKind::Saturation
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        vec![
            self.gain.endpoint().clone(),
            self.gain_comp.endpoint().clone(),
            self.kind.endpoint().clone(),
        ]
    }

    fn sync_params(&mut self) {
        let t = ThreadId::Dsp;
        if let Some(gain) = self.gain.poll(t) {
            self.saturation.set_gain(gain.as_f64());
        }
        if let Some(comp) = self.gain_comp.poll(t) {
            self.saturation.set_gain_comp(comp.as_bool());
        }
        if let Some(kind) = self.kind.poll(t) {
            self.saturation.set_type(SaturationType::from_index(kind.as_i32()));
        }
    }

    fn process(&mut self, buffer: &mut StereoBuffer, _input_amp: f32) -> f32 {
        self.saturation.process(buffer)
    }

    fn silence(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{Session, Value, WriteFlags};
    use approx::assert_relative_eq;

    #[test]
    fn test_endpoints_drive_saturation() {
        let session = Session::new();
        let mut fx = SaturationEffect::new();
        fx.gain()
            .write(&session, ThreadId::Dsp, Value::Double(10.0), WriteFlags::NONE)
            .unwrap();
        fx.saturation_type()
            .write(&session, ThreadId::Dsp, Value::Int(1), WriteFlags::NONE)
            .unwrap();
        fx.gain_comp()
            .write(&session, ThreadId::Dsp, Value::Bool(false), WriteFlags::NONE)
            .unwrap();
        fx.sync_params();
        assert_eq!(fx.saturation().gain(), 10.0);
        assert_eq!(fx.saturation().kind(), SaturationType::Exponential);
        assert!(!fx.saturation().gain_comp());

        let mut buffer = StereoBuffer::from_channels(&[0.1], &[-0.1]);
        fx.process(&mut buffer, 0.2);
        assert_relative_eq!(buffer[0].left, 1.0 - (-1.0f32).exp(), max_relative = 1e-6);
        assert_relative_eq!(buffer[0].right, -buffer[0].left);
    }

    #[test]
    fn test_gain_endpoint_range() {
        let fx = SaturationEffect::new();
        let (min, max) = fx.gain().range().unwrap();
        assert_eq!(min, Value::Double(1.0));
        assert_eq!(max, Value::Double(SATURATION_MAX_GAIN));
    }
}
