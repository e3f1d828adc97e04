//! Effect system - trait, kinds, and the per-track chain
//!
//! Every effect a track can host is one of five kinds, applied in chain
//! order. Parameters are DSP-owned [`Endpoint`]s; an effect re-derives its
//! processing state in [`Effect::sync_params`] once per chunk, only for the
//! endpoints that changed.
//!
//! - [`EffectKind`]: the closed set of kinds and their static properties
//! - [`EffectUnit`]: tagged union over the native implementations
//! - [`EffectChain`]: ordered, named effects with an `active` endpoint each

pub mod chain;
pub mod native;

pub use chain::{ChainEffect, EffectChain};
pub use native::{CompressorEffect, DelayEffect, EqEffect, FirEffect, SaturationEffect};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dsp::DspError;
use crate::endpoint::{Endpoint, ThreadId, Value};
use crate::types::{StereoBuffer, DEFAULT_CHUNK_LEN, SAMPLE_RATE};

/// Maximum number of effects on one chain
pub const MAX_EFFECTS_PER_CHAIN: usize = 16;

/// Error type for effect chain operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EffectError {
    /// The chain does not accept this kind
    #[error("{0:?} effects are blocked on this chain")]
    KindBlocked(EffectKind),

    /// Effect index is out of bounds
    #[error("Effect index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Chain is full
    #[error("Effect chain already has maximum {0} effects")]
    ChainFull(usize),

    /// Building the effect's DSP state failed
    #[error("DSP error: {0}")]
    Dsp(#[from] DspError),
}

/// Result type for effect operations
pub type EffectResult<T> = Result<T, EffectError>;

/// Effect kinds in default chain order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    Eq,
    Fir,
    Delay,
    Saturation,
    Compressor,
}

impl EffectKind {
    pub const ALL: [EffectKind; 5] = [
        EffectKind::Eq,
        EffectKind::Fir,
        EffectKind::Delay,
        EffectKind::Saturation,
        EffectKind::Compressor,
    ];

    /// Display name; also the base for route components
    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::Eq => "Equalizer",
            EffectKind::Fir => "FIR Filter",
            EffectKind::Delay => "Delay",
            EffectKind::Saturation => "Saturation",
            EffectKind::Compressor => "Compressor",
        }
    }

    /// Whether the effect must run on silent input
    ///
    /// Delay lines keep emitting echoes and compressor followers keep
    /// releasing after the input stops.
    pub fn operate_on_empty_buf(&self) -> bool {
        matches!(self, EffectKind::Delay | EffectKind::Compressor)
    }
}

/// Project parameters an effect is built against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectContext {
    pub sample_rate: u32,
    /// Largest chunk the effect will be handed
    pub chunk_len: usize,
    /// Longest delay line, in seconds
    pub delay_max_secs: f64,
}

impl Default for EffectContext {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            chunk_len: DEFAULT_CHUNK_LEN,
            delay_max_secs: 1.0,
        }
    }
}

impl EffectContext {
    /// Smallest power of two holding a chunk
    pub fn fourier_len(&self) -> usize {
        self.chunk_len.next_power_of_two()
    }
}

/// The core effect trait - implemented by every native effect
pub trait Effect: Send {
    fn kind(&self) -> EffectKind;

    /// Parameter endpoints, in display order
    fn endpoints(&self) -> Vec<Endpoint>;

    /// Re-derive processing state from endpoints that changed since the
    /// previous call; runs on the DSP thread
    fn sync_params(&mut self);

    /// Process a stereo chunk in place
    ///
    /// `input_amp` is the summed absolute amplitude of the input; the return
    /// value is the same measure of the output.
    fn process(&mut self, buffer: &mut StereoBuffer, input_amp: f32) -> f32;

    /// Drop all internal signal state (filter memory, echoes, envelopes)
    fn silence(&mut self);
}

/// Build a DSP-owned parameter endpoint
pub(crate) fn dsp_param(
    local_id: &str,
    display_name: &str,
    default: impl Into<Value>,
    min: impl Into<Value>,
    max: impl Into<Value>,
) -> Endpoint {
    Endpoint::builder(local_id, display_name, default, ThreadId::Dsp)
        .with_range(min, max)
        .build()
}

/// One of the native effects
pub enum EffectUnit {
    Eq(EqEffect),
    Fir(FirEffect),
    Delay(DelayEffect),
    Saturation(SaturationEffect),
    Compressor(CompressorEffect),
}

impl EffectUnit {
    /// Build an effect of `kind` with default parameters
    pub fn new(kind: EffectKind, ctx: &EffectContext) -> EffectResult<Self> {
        Ok(match kind {
            EffectKind::Eq => EffectUnit::Eq(EqEffect::new(ctx)?),
            EffectKind::Fir => EffectUnit::Fir(FirEffect::new(ctx)?),
            EffectKind::Delay => EffectUnit::Delay(DelayEffect::new(ctx)?),
            EffectKind::Saturation => EffectUnit::Saturation(SaturationEffect::new()),
            EffectKind::Compressor => EffectUnit::Compressor(CompressorEffect::new(ctx)),
        })
    }

    fn inner(&self) -> &dyn Effect {
        match self {
            EffectUnit::Eq(e) => e,
            EffectUnit::Fir(e) => e,
            EffectUnit::Delay(e) => e,
            EffectUnit::Saturation(e) => e,
            EffectUnit::Compressor(e) => e,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Effect {
        match self {
            EffectUnit::Eq(e) => e,
            EffectUnit::Fir(e) => e,
            EffectUnit::Delay(e) => e,
            EffectUnit::Saturation(e) => e,
            EffectUnit::Compressor(e) => e,
        }
    }
}

impl Effect for EffectUnit {
    fn kind(&self) -> EffectKind {
        self.inner().kind()
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        self.inner().endpoints()
    }

    fn sync_params(&mut self) {
        self.inner_mut().sync_params();
    }

    fn process(&mut self, buffer: &mut StereoBuffer, input_amp: f32) -> f32 {
        self.inner_mut().process(buffer, input_amp)
    }

    fn silence(&mut self) {
        self.inner_mut().silence();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_properties() {
        let names: Vec<&str> = EffectKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(
            names,
            vec!["Equalizer", "FIR Filter", "Delay", "Saturation", "Compressor"]
        );
        assert!(EffectKind::Delay.operate_on_empty_buf());
        assert!(EffectKind::Compressor.operate_on_empty_buf());
        assert!(!EffectKind::Eq.operate_on_empty_buf());
        assert!(!EffectKind::Fir.operate_on_empty_buf());
    }

    #[test]
    fn test_fourier_len() {
        let ctx = EffectContext {
            chunk_len: 600,
            ..Default::default()
        };
        assert_eq!(ctx.fourier_len(), 1024);
        assert_eq!(EffectContext::default().fourier_len(), 1024);
    }

    #[test]
    fn test_unit_dispatch() {
        let ctx = EffectContext::default();
        for kind in EffectKind::ALL {
            let unit = EffectUnit::new(kind, &ctx).unwrap();
            assert_eq!(unit.kind(), kind);
            assert!(!unit.endpoints().is_empty());
            for ep in unit.endpoints() {
                assert_eq!(ep.owner(), ThreadId::Dsp);
            }
        }
    }
}
