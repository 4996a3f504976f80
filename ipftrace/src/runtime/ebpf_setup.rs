//! # eBPF Program Loading and Attachment
//!
//! Loads the compiled probe object with aya, attaches one kprobe per catalog
//! function and exposes the `events` ring buffer as an [`EventChannel`].
//!
//! Attachment failures are not retried: they point at a catalog that does not
//! match the running kernel.

use std::time::Duration;

use aya::maps::{MapData, RingBuf};
use aya::programs::{KProbe, ProgramError};
use aya::Ebpf;
use log::{debug, info};
use tokio::io::unix::AsyncFd;

use super::{EventChannel, ProbeCompiler, ProbeRuntime};
use crate::catalog::EventNames;
use crate::domain::RuntimeError;
use crate::filter::SymbolSet;
use crate::probe::{program_name, ProbeProgram};

/// Ring buffer map the template reports into
pub const EVENTS_MAP: &str = "events";

/// Probe runtime backed by clang and the running kernel
pub struct KernelRuntime {
    compiler: ProbeCompiler,
}

impl KernelRuntime {
    pub fn new(compiler: ProbeCompiler) -> Self {
        Self { compiler }
    }
}

impl ProbeRuntime for KernelRuntime {
    type Channel = RingBufChannel;

    fn load(&self, program: &ProbeProgram, symbols: &SymbolSet) -> Result<RingBufChannel, RuntimeError> {
        let object = self.compiler.compile(&program.source, symbols)?;
        let mut bpf = Ebpf::load_file(object.path())?;

        attach_probes(&mut bpf, &program.events)?;

        let map = bpf.take_map(EVENTS_MAP).ok_or(RuntimeError::MapNotFound(EVENTS_MAP))?;
        let ring_buf = RingBuf::try_from(map)?;
        Ok(RingBufChannel { ring_buf: AsyncFd::new(ring_buf)?, _bpf: bpf })
    }
}

/// Attach the stub of every catalog function as a kprobe
///
/// # Errors
/// Returns an error if a stub is missing, fails verification or cannot attach
pub fn attach_probes(bpf: &mut Ebpf, events: &EventNames) -> Result<usize, RuntimeError> {
    for function in events.iter() {
        let probe = program_name(function);
        let attach_failed = |error: &dyn std::fmt::Display| RuntimeError::ProbeAttachFailed {
            probe: probe.clone(),
            function: function.to_string(),
            error: error.to_string(),
        };

        let program =
            bpf.program_mut(&probe).ok_or_else(|| RuntimeError::ProgramNotFound(probe.clone()))?;
        let program: &mut KProbe = program.try_into().map_err(|e: ProgramError| attach_failed(&e))?;
        program.load().map_err(|e| attach_failed(&e))?;
        program.attach(function, 0).map_err(|e| attach_failed(&e))?;
        debug!("✓ Attached kprobe: {function}");
    }

    info!("✓ Attached {} kprobes", events.len());
    Ok(events.len())
}

/// Live channel over the `events` ring buffer
///
/// Owns the loaded programs; dropping it detaches every probe.
pub struct RingBufChannel {
    ring_buf: AsyncFd<RingBuf<MapData>>,
    _bpf: Ebpf,
}

impl EventChannel for RingBufChannel {
    async fn poll(
        &mut self,
        timeout: Duration,
        on_record: &mut dyn FnMut(&[u8]),
    ) -> Result<Option<usize>, RuntimeError> {
        let Ok(guard) = tokio::time::timeout(timeout, self.ring_buf.readable_mut()).await else {
            return Ok(Some(0));
        };
        let mut guard = guard?;

        let mut count = 0;
        let ring_buf = guard.get_inner_mut();
        while let Some(item) = ring_buf.next() {
            let bytes: &[u8] = &item;
            on_record(bytes);
            count += 1;
        }
        guard.clear_ready();

        Ok(Some(count))
    }
}
