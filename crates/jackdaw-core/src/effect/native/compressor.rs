//! Compressor effect

use crate::dsp::compressor::{
    COMP_DEFAULT_ATTACK_MSEC, COMP_DEFAULT_RATIO, COMP_DEFAULT_RELEASE_MSEC, COMP_DEFAULT_THRESHOLD,
    COMP_MAX_MAKEUP_GAIN,
};
use crate::dsp::Compressor;
use crate::effect::{dsp_param, Effect, EffectContext, EffectKind};
use crate::endpoint::{Endpoint, EndpointWatch, ThreadId};
use crate::types::StereoBuffer;

pub const COMP_MAX_ATTACK_MSEC: f64 = 200.0;
pub const COMP_MAX_RELEASE_MSEC: f64 = 2000.0;
pub const COMP_MAX_RATIO: f64 = 20.0;

pub struct CompressorEffect {
    comp: Compressor,
    sample_rate: u32,
    attack_msec: EndpointWatch,
    release_msec: EndpointWatch,
    threshold: EndpointWatch,
    ratio: EndpointWatch,
    makeup_gain: EndpointWatch,
}

impl CompressorEffect {
    pub fn new(ctx: &EffectContext) -> Self {
        Self {
            comp: Compressor::new(ctx.sample_rate),
            sample_rate: ctx.sample_rate,
            attack_msec: EndpointWatch::new(dsp_param(
                "attack_time",
                "Attack (ms)",
                COMP_DEFAULT_ATTACK_MSEC,
                0.0,
                COMP_MAX_ATTACK_MSEC,
            )),
            release_msec: EndpointWatch::new(dsp_param(
                "release_time",
                "Release (ms)",
                COMP_DEFAULT_RELEASE_MSEC,
                0.0,
                COMP_MAX_RELEASE_MSEC,
            )),
            threshold: EndpointWatch::new(dsp_param("threshold", "Threshold", COMP_DEFAULT_THRESHOLD, 0.0, 1.0)),
            ratio: EndpointWatch::new(dsp_param("ratio", "Ratio", COMP_DEFAULT_RATIO, 1.0, COMP_MAX_RATIO)),
            makeup_gain: EndpointWatch::new(dsp_param(
                "makeup_gain",
                "Makeup gain",
                1.0,
                1.0,
                COMP_MAX_MAKEUP_GAIN,
            )),
        }
    }

    pub fn compressor(&self) -> &Compressor {
        &self.comp
    }

    pub fn attack_msec(&self) -> &Endpoint {
        self.attack_msec.endpoint()
    }

    pub fn release_msec(&self) -> &Endpoint {
        self.release_msec.endpoint()
    }

    pub fn threshold(&self) -> &Endpoint {
        self.threshold.endpoint()
    }

    pub fn ratio(&self) -> &Endpoint {
        self.ratio.endpoint()
    }

    pub fn makeup_gain(&self) -> &Endpoint {
        self.makeup_gain.endpoint()
    }
}

impl Effect for CompressorEffect {
    fn kind(&self) -> EffectKind {
        EffectKind::Compressor
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        [
            &self.attack_msec,
            &self.release_msec,
            &self.threshold,
            &self.ratio,
            &self.makeup_gain,
        ]
        .into_iter()
        .map(|w| w.endpoint().clone())
        .collect()
    }

    fn sync_params(&mut self) {
        let t = ThreadId::Dsp;
        let attack = self.attack_msec.poll(t);
        let release = self.release_msec.poll(t);
        if attack.is_some() || release.is_some() {
            self.comp.set_times_msec(
                self.attack_msec.value(t).as_f64(),
                self.release_msec.value(t).as_f64(),
                self.sample_rate,
            );
        }
        if let Some(threshold) = self.threshold.poll(t) {
            self.comp.set_threshold(threshold.as_f64());
        }
        if let Some(ratio) = self.ratio.poll(t) {
            self.comp.set_ratio(ratio.as_f64());
        }
        if let Some(gain) = self.makeup_gain.poll(t) {
            self.comp.set_makeup_gain(gain.as_f64());
        }
    }

    fn process(&mut self, buffer: &mut StereoBuffer, _input_amp: f32) -> f32 {
        self.comp.process(buffer)
    }

    fn silence(&mut self) {
        self.comp.reset();
    }
}
