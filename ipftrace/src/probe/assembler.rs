//! # Probe Assembly
//!
//! Emits the probe source for a [`FunctionCatalog`]. Stub text and the
//! event id → name table are produced in the same walk over
//! [`FunctionCatalog::probe_points`], so the id embedded in a stub is always
//! the index the decoder resolves.
//!
//! A stub for `ip_rcv` with id 0 looks like:
//!
//! ```c
//! SEC("kprobe/ip_rcv")
//! int BPF_KPROBE(kprobe__ip_rcv, struct sk_buff *skb, struct net_device *dev)
//! {
//!   struct event_data e = { 0 };
//!   if (!match(ctx, skb, &e)) {
//!     return 0;
//!   }
//!   action(ctx, &e);
//!   return 0;
//! }
//! ```

use std::fmt::{self, Write};

use crate::catalog::{EventNames, FunctionCatalog, ProbePoint};

/// Shared match predicate and reporting routine
pub const TEMPLATE: &str = include_str!("../../bpf/ipftrace.bpf.c");

/// Assembled probe source plus the id table it was generated with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeProgram {
    pub source: String,
    pub events: EventNames,
}

/// BPF program name of the stub for a kernel function
pub fn program_name(function: &str) -> String {
    format!("kprobe__{function}")
}

/// Assemble the probe program for a catalog
pub fn assemble(catalog: &FunctionCatalog) -> ProbeProgram {
    let mut source = String::from(TEMPLATE);
    let mut names = Vec::with_capacity(catalog.len());

    for point in catalog.probe_points() {
        // Writing into a String cannot fail
        let _ = write!(source, "{}", Stub(point));
        names.push(point.function.name.clone());
    }

    ProbeProgram { source, events: names.into_iter().collect() }
}

/// One generated kprobe handler
struct Stub<'a>(ProbePoint<'a>);

impl fmt::Display for Stub<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ProbePoint { id, function, .. } = self.0;
        let name = &function.name;

        writeln!(f)?;
        writeln!(f, "SEC(\"kprobe/{name}\")")?;
        write!(f, "int BPF_KPROBE({}", program_name(name))?;
        for arg in &function.args {
            write!(f, ", {arg}")?;
        }
        writeln!(f, ")")?;
        writeln!(f, "{{")?;
        writeln!(f, "  struct event_data e = {{ {id} }};")?;
        writeln!(f, "  if (!match(ctx, skb, &e)) {{")?;
        writeln!(f, "    return 0;")?;
        writeln!(f, "  }}")?;
        writeln!(f, "  action(ctx, &e);")?;
        writeln!(f, "  return 0;")?;
        writeln!(f, "}}")
    }
}
