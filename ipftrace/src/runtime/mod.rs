//! # Probe Runtime Boundary
//!
//! The runtime compiles the assembled probe source with the filter symbols,
//! attaches one kprobe per catalog function and hands back a channel of raw
//! records.
//!
//! - [`compiler`]: clang invocation producing the BPF object
//! - [`ebpf_setup`]: aya loading, kprobe attachment and the ring buffer channel
//! - [`replay`]: in-memory channel fed from captured records

pub mod compiler;
pub mod ebpf_setup;
pub mod replay;

use std::time::Duration;

use crate::domain::RuntimeError;
use crate::filter::SymbolSet;
use crate::probe::ProbeProgram;

pub use compiler::{CompiledProbe, ProbeCompiler};
pub use ebpf_setup::{attach_probes, KernelRuntime, RingBufChannel};
pub use replay::ReplayChannel;

/// Source of raw event records
#[allow(async_fn_in_trait)]
pub trait EventChannel {
    /// Wait up to `timeout` for records, then pass every available record to
    /// `on_record`
    ///
    /// Returns the number of records delivered, or `None` once the channel is
    /// closed for good.
    async fn poll(
        &mut self,
        timeout: Duration,
        on_record: &mut dyn FnMut(&[u8]),
    ) -> Result<Option<usize>, RuntimeError>;
}

/// Turns probe source plus filter symbols into a live [`EventChannel`]
pub trait ProbeRuntime {
    type Channel: EventChannel;

    /// Compile, load and attach the probe program
    ///
    /// # Errors
    /// Any failure is fatal: compilation, loading or attaching a probe
    fn load(&self, program: &ProbeProgram, symbols: &SymbolSet) -> Result<Self::Channel, RuntimeError>;
}
