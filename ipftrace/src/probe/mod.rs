//! Probe program generation
//!
//! The probe program is the fixed match/report template followed by one
//! generated kprobe stub per catalog function.

pub mod assembler;

pub use assembler::{assemble, program_name, ProbeProgram, TEMPLATE};
