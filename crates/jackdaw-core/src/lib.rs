//! Jackdaw Core - real-time DSP core of the Jackdaw audio workstation
//!
//! - [`dsp`]: FFT, FIR, biquad EQ, delay, compressor, saturation
//! - [`endpoint`]: thread-owned parameters with deferred cross-thread writes
//! - [`automation`]: keyframed parameter curves
//! - [`effect`]: effect kinds and per-track chains
//! - [`engine`]: tracks, mixdown and the main-to-DSP command queue
//! - [`config`]: project settings

pub mod automation;
pub mod config;
pub mod dsp;
pub mod effect;
pub mod endpoint;
pub mod engine;
pub mod types;

pub use types::*;
