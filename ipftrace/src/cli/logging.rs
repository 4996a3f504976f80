//! Logger setup
//!
//! Records the trace loop drops are reported at `warn`, so that level is the
//! floor when no filter is given. `RUST_LOG` still overrides it.

use env_logger::{Builder, Env};

pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Logger configuration reading its filter from `filter_var`
pub fn log_env(filter_var: &str) -> Env<'_> {
    Env::new().filter_or(filter_var, DEFAULT_LOG_FILTER)
}

/// Install the global logger, filtered by `RUST_LOG`
pub fn init_logging() {
    Builder::from_env(log_env(env_logger::DEFAULT_FILTER_ENV)).init();
}
