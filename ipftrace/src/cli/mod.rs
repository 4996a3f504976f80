//! Command-line interface

pub mod args;
pub mod logging;

pub use args::Args;
pub use logging::init_logging;
