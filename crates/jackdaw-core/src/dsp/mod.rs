//! Signal processing building blocks
//!
//! Everything in here is plain data plus `&mut self` methods; nothing locks
//! or allocates once constructed, so every type can live on the DSP thread.
//!
//! - [`spectral`] - radix-2 FFT over a shared roots-of-unity table
//! - [`fir`] - windowed-sinc FIR filters with overlap-add block convolution
//! - [`iir`] / [`eq`] - Reiss peak/notch biquads and the four-band equalizer
//! - [`delay`] - feedback delay line with resampling on resize
//! - [`envelope`] / [`compressor`] - peak compressor
//! - [`saturation`] - waveshaper

pub mod compressor;
pub mod delay;
pub mod envelope;
pub mod eq;
pub mod error;
pub mod fir;
pub mod iir;
pub mod ring;
pub mod saturation;
pub mod spectral;
pub mod util;

pub use compressor::Compressor;
pub use delay::DelayLine;
pub use envelope::EnvelopeFollower;
pub use eq::{EqBand, Equalizer, EQ_NUM_BANDS};
pub use error::{DspError, DspResult};
pub use fir::{FilterType, FirFilter};
pub use iir::Biquad;
pub use ring::RingBuffer;
pub use saturation::{Saturation, SaturationType};
pub use spectral::{spectral_engine, SpectralEngine, MAX_FFT_LEN};
