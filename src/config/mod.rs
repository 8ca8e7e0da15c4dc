//! Line Configuration Module
//!
//! Engine defaults and deployment settings loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `LINEWATCH_CONFIG` environment variable (path to TOML file)
//! 2. `linewatch.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! The binary calls `config::init()` once at startup, then `config::get()`
//! where it needs a value. Library engines never read the global; callers
//! pass values explicitly.
//!
//! ```ignore
//! config::init(LinewatchConfig::load());
//! let n_sigma = config::get().control_limits.n_sigma;
//! ```

mod linewatch_config;
pub mod validation;

pub use linewatch_config::*;

use std::sync::OnceLock;

static LINE_CONFIG: OnceLock<LinewatchConfig> = OnceLock::new();

/// Install the global configuration. Later calls are ignored with a warning.
pub fn init(config: LinewatchConfig) {
    if LINE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// The global configuration, or the built-in defaults if `init()` never ran.
pub fn get() -> &'static LinewatchConfig {
    LINE_CONFIG.get_or_init(LinewatchConfig::default)
}

pub fn is_initialized() -> bool {
    LINE_CONFIG.get().is_some()
}
