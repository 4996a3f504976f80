//! # ipftrace - Packet Path Tracer for the Linux Network Stack
//!
//! ipftrace instruments kernel networking functions with kprobes, filters the
//! packets they see against an operator filter, and reports for every flow
//! which traced functions it passed through.
//!
//! ## Architecture Overview
//!
//! ```text
//!  conf/base/<ver>.json        /etc/ethertypes, /etc/protocols      CLI filter
//!          │                               │                            │
//!          ▼                               ▼                            ▼
//!  ┌───────────────┐             ┌──────────────────┐          ┌────────────────┐
//!  │FunctionCatalog│             │ ProtocolCatalog  │─────────▶│ filter::compile│
//!  └───────┬───────┘             └────────┬─────────┘          └───────┬────────┘
//!          │ probe_points()               │                            │ SymbolSet
//!          ▼                              │                            ▼
//!  ┌───────────────┐   source + ids       │              ┌──────────────────────┐
//!  │probe::assemble│──────────────────────┼─────────────▶│ ProbeRuntime (clang, │
//!  └───────────────┘                      │              │ aya kprobes)         │
//!                                         ▼              └──────────┬───────────┘
//!                               ┌──────────────────┐   raw records  │
//!                               │   EventDecoder   │◀───────────────┘
//!                               └────────┬─────────┘
//!                                        ▼
//!                               ┌──────────────────┐
//!                               │  FlowAggregator  │──▶ flow table on stdout
//!                               └──────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`protocols`]: ethertype and IP protocol name tables
//! - [`catalog`]: function catalog loading and event id assignment
//! - [`filter`]: filter specification and compilation into probe symbols
//! - [`probe`]: probe source assembly
//! - [`decoder`]: raw record parsing into flows
//! - [`aggregator`]: flow → function table and rendering
//! - [`processor`]: decode/aggregate pipeline and the poll loop
//! - [`runtime`]: compilation, loading and attachment of the probes
//! - [`preflight`]: system checks and kernel version detection
//! - [`cli`]: command-line arguments
//! - [`domain`]: identifiers and errors

pub mod aggregator;
pub mod catalog;
pub mod cli;
pub mod decoder;
pub mod domain;
pub mod filter;
pub mod preflight;
pub mod probe;
pub mod processor;
pub mod protocols;
pub mod runtime;
