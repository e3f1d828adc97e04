//! Engine error types

use thiserror::Error;

use crate::dsp::DspError;
use crate::effect::EffectError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Requested chunk is empty or longer than the engine's buffers
    #[error("Invalid chunk length {len} (max {max})")]
    InvalidChunkLength { len: usize, max: usize },

    /// Track index is out of bounds
    #[error("Track index {index} out of bounds (len {len})")]
    TrackOutOfBounds { index: usize, len: usize },

    /// Track limit reached
    #[error("Timeline already has maximum {0} tracks")]
    TooManyTracks(usize),

    /// Clip limit of one track reached
    #[error("Track already holds maximum {0} clips")]
    TooManyClips(usize),

    /// Engine command queue is full
    #[error("Engine command queue full")]
    QueueFull,

    #[error("DSP error: {0}")]
    Dsp(#[from] DspError),

    #[error("Effect error: {0}")]
    Effect(#[from] EffectError),
}

pub type EngineResult<T> = Result<T, EngineError>;
