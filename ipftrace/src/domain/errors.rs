//! Structured error types for ipftrace
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;
use thiserror::Error;

use super::types::{EventId, L3Proto, L4Proto};

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Failed to read protocol table {path}: {source}")]
    TableUnreadable { path: PathBuf, source: std::io::Error },

    #[error("Malformed line {line} in {table}: {content:?}")]
    MalformedLine { table: &'static str, line: usize, content: String },

    #[error("Unknown L3 protocol name: {0}")]
    UnknownL3(String),

    #[error("Unknown L4 protocol name: {0}")]
    UnknownL4(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read function catalog {path}: {source}")]
    Unreadable { path: PathBuf, source: std::io::Error },

    #[error("Malformed function catalog: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Malformed function catalog: {0}")]
    MalformedYaml(#[from] serde_yaml::Error),

    #[error("Function {name} is listed more than once (groups {first} and {second})")]
    DuplicateFunction { name: String, first: String, second: String },

    #[error("Function with empty name in group {0}")]
    EmptyName(String),

    #[error("Catalog has {0} functions, at most {max} fit in an event id", max = EventId::SPACE)]
    TooManyFunctions(usize),

    #[error("Function {name} declares {count} arguments, kprobes support at most {max}")]
    TooManyArgs { name: String, count: usize, max: usize },

    #[error("Function {0} has no skb argument to match packets against")]
    MissingSkbArg(String),
}

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Conflicting definitions for filter dimension {dimension}: {first} and {second}")]
    Conflict { dimension: &'static str, first: String, second: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Per-record decoding failure. Never fatal: the record is dropped.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Record too short: {len} bytes, expected {expected}")]
    ShortRecord { len: usize, expected: usize },

    #[error("Unknown event id {0}")]
    UnknownEventId(EventId),

    #[error("Unsupported l3 protocol {0}")]
    UnsupportedL3(L3Proto),

    #[error("Unsupported l4 protocol {0}")]
    UnsupportedL4(L4Proto),
}

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Failed to run probe compiler {compiler}: {source}")]
    CompilerUnavailable { compiler: String, source: std::io::Error },

    #[error("Probe compilation failed:\n{0}")]
    CompileFailed(String),

    #[error("Probe program {0} not found in compiled object")]
    ProgramNotFound(String),

    #[error("Failed to attach {probe} to {function}: {error}")]
    ProbeAttachFailed { probe: String, function: String, error: String },

    #[error("Map {0} not found in compiled object")]
    MapNotFound(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Ebpf(#[from] aya::EbpfError),

    #[error(transparent)]
    Map(#[from] aya::maps::MapError),
}
