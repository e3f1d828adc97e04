//! Project settings
//!
//! - [`ProjectConfig`]: sample rate, chunk length, delay capacity, control
//!   server port, blocked effect kinds
//! - generic YAML load/save for any serde settings type
//! - default settings locations
//!
//! # Usage
//!
//! ```ignore
//! use jackdaw_core::config::{default_config_path, load_config, ProjectConfig};
//!
//! let mut config: ProjectConfig = load_config(&default_config_path());
//! config.validate();
//! let ctx = config.effect_context();
//! ```

mod io;
mod paths;
mod project;

pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path, PROJECT_CONFIG_FILE};
pub use project::{ProjectConfig, MAX_DELAY_SECS};
