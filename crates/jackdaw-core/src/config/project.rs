//! Project-wide audio settings
//!
//! Fixed for the lifetime of an open project: every filter, delay line and
//! track buffer is sized from these values when it is built.

use serde::{Deserialize, Serialize};

use crate::effect::{EffectContext, EffectKind};
#[cfg(feature = "control-server")]
use crate::endpoint::{route::RouteTable, server::ControlServer, Session};
#[cfg(feature = "control-server")]
use std::sync::{Arc, Mutex};
use crate::types::{DEFAULT_CHUNK_LEN, MAX_CHUNK_LEN, NUM_CHANNELS, SAMPLE_RATE};

/// Longest delay line a project may request, in seconds
pub const MAX_DELAY_SECS: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Sample frames per second
    /// Default: 48000
    pub sample_rate: u32,

    /// Output channels; only stereo is rendered
    /// Default: 2
    pub channels: u8,

    /// Frames per audio chunk; a power of two no larger than 4096
    /// Default: 1024
    pub chunk_len_sframes: usize,

    /// Capacity of every delay line, in seconds
    /// Default: 1.0
    pub delay_max_secs: f64,

    /// UDP port of the control server; no server when unset
    pub server_port: Option<u16>,

    /// Effect kinds track chains refuse
    pub blocked_effects: Vec<EffectKind>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: NUM_CHANNELS as u8,
            chunk_len_sframes: DEFAULT_CHUNK_LEN,
            delay_max_secs: 1.0,
            server_port: None,
            blocked_effects: Vec::new(),
        }
    }
}

impl ProjectConfig {
    /// Clamp out-of-range values, logging each correction
    pub fn validate(&mut self) {
        if self.sample_rate == 0 {
            log::warn!("sample_rate 0 is invalid, using {}", SAMPLE_RATE);
            self.sample_rate = SAMPLE_RATE;
        }
        if self.channels as usize != NUM_CHANNELS {
            log::warn!("{} channels requested, rendering stereo", self.channels);
            self.channels = NUM_CHANNELS as u8;
        }
        let chunk = self.chunk_len_sframes.clamp(1, MAX_CHUNK_LEN);
        let chunk = if chunk.is_power_of_two() {
            chunk
        } else {
            // Largest power of two not above the request
            1 << (usize::BITS - 1 - chunk.leading_zeros())
        };
        if chunk != self.chunk_len_sframes {
            log::warn!(
                "chunk_len_sframes {} must be a power of two <= {}, using {}",
                self.chunk_len_sframes,
                MAX_CHUNK_LEN,
                chunk
            );
            self.chunk_len_sframes = chunk;
        }
        if !(self.delay_max_secs > 0.0 && self.delay_max_secs <= MAX_DELAY_SECS) {
            let secs = if self.delay_max_secs.is_nan() {
                1.0
            } else {
                self.delay_max_secs.clamp(0.001, MAX_DELAY_SECS)
            };
            log::warn!("delay_max_secs {} out of range, using {}", self.delay_max_secs, secs);
            self.delay_max_secs = secs;
        }
    }

    /// Smallest power of two holding a chunk
    pub fn fourier_len(&self) -> usize {
        self.chunk_len_sframes.next_power_of_two()
    }

    /// Build parameters for effects in this project
    pub fn effect_context(&self) -> EffectContext {
        EffectContext {
            sample_rate: self.sample_rate,
            chunk_len: self.chunk_len_sframes,
            delay_max_secs: self.delay_max_secs,
        }
    }

    /// Start the control server on `server_port`, if one is configured
    #[cfg(feature = "control-server")]
    pub fn start_control_server(
        &self,
        table: Arc<Mutex<RouteTable>>,
        session: Arc<Session>,
    ) -> std::io::Result<Option<ControlServer>> {
        match self.server_port {
            Some(port) => ControlServer::start(port, table, session).map(Some),
            None => Ok(None),
        }
    }
}
