//! Four-band parametric equalizer effect
//!
//! Band frequency endpoints are exponents: a raw value `e` places the band at
//! `(n-1)^e / (n-1)` of Nyquist for chunk length `n`, so the slider sweeps the
//! spectrum logarithmically.

use crate::dsp::eq::{DEFAULT_BANDWIDTH_SCALAR, EQ_MAX_AMPLITUDE};
use crate::dsp::{DspResult, Equalizer, EQ_NUM_BANDS};
use crate::effect::{dsp_param, Effect, EffectContext, EffectKind};
use crate::endpoint::{Endpoint, EndpointWatch, ThreadId};
use crate::types::StereoBuffer;

struct BandParams {
    freq_exp: EndpointWatch,
    amp: EndpointWatch,
    bandwidth: EndpointWatch,
    bypass: EndpointWatch,
}

pub struct EqEffect {
    eq: Equalizer,
    /// `chunk_len - 1`, the base of the frequency exponent
    freq_base: f64,
    bands: [BandParams; EQ_NUM_BANDS],
}

/// Exponent of the default frequency of band `i`
fn default_freq_exp(i: usize) -> f64 {
    0.15 + 0.15 * i as f64
}

impl EqEffect {
    /// Flat equalizer
    pub fn new(ctx: &EffectContext) -> DspResult<Self> {
        let bands = std::array::from_fn(|i| {
            let n = i + 1;
            BandParams {
                freq_exp: EndpointWatch::new(dsp_param(
                    &format!("band_{}_freq", n),
                    &format!("Band {} frequency", n),
                    default_freq_exp(i),
                    0.0,
                    1.0,
                )),
                amp: EndpointWatch::new(dsp_param(
                    &format!("band_{}_amp", n),
                    &format!("Band {} amplitude", n),
                    1.0,
                    0.0,
                    EQ_MAX_AMPLITUDE,
                )),
                bandwidth: EndpointWatch::new(dsp_param(
                    &format!("band_{}_bandwidth", n),
                    &format!("Band {} bandwidth", n),
                    DEFAULT_BANDWIDTH_SCALAR,
                    0.01,
                    10.0,
                )),
                bypass: EndpointWatch::new(dsp_param(
                    &format!("band_{}_bypass", n),
                    &format!("Band {} bypass", n),
                    false,
                    false,
                    true,
                )),
            }
        });
        Ok(Self {
            eq: Equalizer::new(ctx.chunk_len)?,
            freq_base: (ctx.chunk_len.max(2) - 1) as f64,
            bands,
        })
    }

    pub fn equalizer(&self) -> &Equalizer {
        &self.eq
    }

    /// Normalized frequency for a raw exponent
    pub fn freq_from_exp(&self, exp: f64) -> f64 {
        self.freq_base.powf(exp) / self.freq_base
    }

    pub fn band_freq(&self, band: usize) -> Option<&Endpoint> {
        self.bands.get(band).map(|b| b.freq_exp.endpoint())
    }

    pub fn band_amp(&self, band: usize) -> Option<&Endpoint> {
        self.bands.get(band).map(|b| b.amp.endpoint())
    }

    pub fn band_bandwidth(&self, band: usize) -> Option<&Endpoint> {
        self.bands.get(band).map(|b| b.bandwidth.endpoint())
    }

    pub fn band_bypass(&self, band: usize) -> Option<&Endpoint> {
        self.bands.get(band).map(|b| b.bypass.endpoint())
    }

    fn sync_band(&mut self, i: usize) -> DspResult<bool> {
        let t = ThreadId::Dsp;
        let params = &mut self.bands[i];
        if let Some(bypass) = params.bypass.poll(t) {
            self.eq.set_band_bypass(i, bypass.as_bool());
        }
        let scalar = params.bandwidth.poll(t);
        let freq = params.freq_exp.poll(t);
        let amp = params.amp.poll(t);
        if scalar.is_none() && freq.is_none() && amp.is_none() {
            return Ok(false);
        }
        let freq = self.freq_base.powf(params.freq_exp.value(t).as_f64()) / self.freq_base;
        let amp = params.amp.value(t).as_f64();
        if let Some(scalar) = scalar {
            self.eq.set_bandwidth_scalar(i, scalar.as_f64())?;
        }
        self.eq.set_band(i, freq, amp)?;
        Ok(true)
    }
}

impl Effect for EqEffect {
    fn kind(&self) -> EffectKind {
        EffectKind::Eq
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        self.bands
            .iter()
            .flat_map(|b| [&b.freq_exp, &b.amp, &b.bandwidth, &b.bypass])
            .map(|w| w.endpoint().clone())
            .collect()
    }

    fn sync_params(&mut self) {
        let mut redesigned = false;
        for i in 0..EQ_NUM_BANDS {
            match self.sync_band(i) {
                Ok(changed) => redesigned |= changed,
                Err(e) => log::warn!("EQ band {} not updated: {}", i + 1, e),
            }
        }
        if redesigned {
            if let Err(e) = self.eq.update_freq_response() {
                log::warn!("EQ response not updated: {}", e);
            }
        }
    }

    fn process(&mut self, buffer: &mut StereoBuffer, input_amp: f32) -> f32 {
        self.eq.process(buffer, input_amp)
    }

    fn silence(&mut self) {
        self.eq.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{Session, Value, WriteFlags};
    use approx::assert_relative_eq;

    fn eq() -> EqEffect {
        EqEffect::new(&EffectContext::default()).unwrap()
    }

    #[test]
    fn test_default_bands_match_equalizer() {
        let fx = eq();
        assert_eq!(fx.endpoints().len(), 4 * EQ_NUM_BANDS);
        for i in 0..EQ_NUM_BANDS {
            let exp = fx.band_freq(i).unwrap().read(ThreadId::Dsp).as_f64();
            assert_relative_eq!(fx.freq_from_exp(exp), fx.equalizer().band(i).unwrap().freq);
            assert!(!fx.equalizer().is_band_active(i));
        }
        assert_eq!(
            fx.band_bandwidth(0).unwrap().default_value(),
            Value::Double(DEFAULT_BANDWIDTH_SCALAR)
        );
    }

    #[test]
    fn test_amp_write_activates_band() {
        let session = Session::new();
        let mut fx = eq();
        fx.band_amp(1)
            .unwrap()
            .write(&session, ThreadId::Dsp, Value::Double(1.5), WriteFlags::NONE)
            .unwrap();
        fx.sync_params();
        assert!(fx.equalizer().is_band_active(1));
        assert_relative_eq!(fx.equalizer().band(1).unwrap().amp, 1.5);
        let peak = fx
            .equalizer()
            .freq_response()
            .iter()
            .fold(0.0f64, |m, &v| m.max(v));
        assert!(peak > 1.2);

        fx.band_bypass(1)
            .unwrap()
            .write(&session, ThreadId::Dsp, Value::Bool(true), WriteFlags::NONE)
            .unwrap();
        fx.sync_params();
        assert!(!fx.equalizer().is_band_active(1));
    }

    #[test]
    fn test_amp_is_clamped_by_endpoint() {
        let session = Session::new();
        let fx = eq();
        fx.band_amp(0)
            .unwrap()
            .write(&session, ThreadId::Dsp, Value::Double(100.0), WriteFlags::NONE)
            .unwrap();
        assert_eq!(fx.band_amp(0).unwrap().read(ThreadId::Dsp), Value::Double(EQ_MAX_AMPLITUDE));
    }
}
