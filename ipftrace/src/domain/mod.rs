//! Domain model for ipftrace
//!
//! Newtypes for the raw identifiers that travel between the probes and
//! userspace, plus the structured errors of every pipeline stage.

pub mod errors;
pub mod types;

pub use types::{EventId, L3Proto, L4Proto};

pub use errors::{CatalogError, DecodeError, FilterError, ProtocolError, RuntimeError};
