//! Native effects
//!
//! Thin wrappers that bind each DSP processor to its parameter endpoints.

mod compressor;
mod delay;
mod eq;
mod fir;
mod saturation;

pub use compressor::CompressorEffect;
pub use delay::DelayEffect;
pub use eq::EqEffect;
pub use fir::{FirEffect, MIN_IMPULSE_RESPONSE_LEN};
pub use saturation::SaturationEffect;
