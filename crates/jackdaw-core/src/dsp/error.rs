//! DSP error types

use thiserror::Error;

/// Errors raised while building or reconfiguring DSP objects
///
/// None of these are surfaced synchronously from the audio thread; callers
/// on the DSP thread log them and keep the previous state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    /// A buffer allocation failed
    #[error("Failed to allocate {len} elements for {what}")]
    AllocationFailed { what: &'static str, len: usize },

    /// Transform length is not a power of two
    #[error("FFT length {0} is not a power of two")]
    InvalidFftLength(usize),

    /// Transform length exceeds the precomputed roots table
    #[error("FFT length {len} exceeds maximum {max}")]
    FftTooLarge { len: usize, max: usize },

    /// Object was already initialized
    #[error("{0} already initialized")]
    AlreadyInitialized(&'static str),

    /// Peak/notch parameters have no realizable pole/zero placement
    #[error("Cannot realize peak/notch filter (freq={freq}, amp={amp}, bandwidth={bandwidth})")]
    UnrealizableFilter { freq: f64, amp: f64, bandwidth: f64 },

    /// Input and output buffers disagree in length
    #[error("Buffer length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Result type for DSP operations
pub type DspResult<T> = Result<T, DspError>;

/// Allocate a zeroed vector, reporting failure instead of aborting
pub(crate) fn try_zeroed<T: Clone + Default>(what: &'static str, len: usize) -> DspResult<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| DspError::AllocationFailed { what, len })?;
    v.resize(len, T::default());
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_zeroed() {
        let v: Vec<f64> = try_zeroed("test", 16).unwrap();
        assert_eq!(v.len(), 16);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_allocation_failure_is_reported() {
        let err = try_zeroed::<u64>("huge", usize::MAX / 4).unwrap_err();
        assert!(matches!(err, DspError::AllocationFailed { what: "huge", .. }));
    }
}
