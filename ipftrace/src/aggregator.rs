//! # Flow Aggregation
//!
//! Live table of every flow seen so far and the traced functions it passed
//! through, in first-observed order. Flows are never evicted; the table is
//! re-rendered in full after every poll cycle.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;

/// Normalised 6-tuple identifying one conversation
///
/// All fields are in host representation, so two records describing the same
/// packets always produce equal flows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Flow {
    pub l3_protocol: String,
    pub l4_protocol: String,
    pub saddr: String,
    pub daddr: String,
    pub sport: u16,
    pub dport: u16,
}

impl Flow {
    /// `saddr[:sport]`, the port omitted when zero
    pub fn source(&self) -> Endpoint<'_> {
        Endpoint { addr: &self.saddr, port: self.sport }
    }

    /// `daddr[:dport]`, the port omitted when zero
    pub fn destination(&self) -> Endpoint<'_> {
        Endpoint { addr: &self.daddr, port: self.dport }
    }
}

pub struct Endpoint<'a> {
    addr: &'a str,
    port: u16,
}

impl fmt::Display for Endpoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == 0 {
            f.write_str(self.addr)
        } else {
            write!(f, "{}:{}", self.addr, self.port)
        }
    }
}

/// Flow → ordered, deduplicated function names
#[derive(Debug, Default)]
pub struct FlowAggregator {
    index: HashMap<Flow, usize>,
    flows: Vec<(Flow, Vec<String>)>,
}

impl FlowAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `flow` passed through `function`
    ///
    /// Returns true if the function was new for this flow.
    pub fn record(&mut self, flow: Flow, function: &str) -> bool {
        let slot = match self.index.get(&flow) {
            Some(&slot) => slot,
            None => {
                let slot = self.flows.len();
                self.index.insert(flow.clone(), slot);
                self.flows.push((flow, Vec::new()));
                slot
            }
        };

        let functions = &mut self.flows[slot].1;
        if functions.iter().any(|f| f == function) {
            return false;
        }
        functions.push(function.to_string());
        true
    }

    /// Functions recorded for a flow
    pub fn functions(&self, flow: &Flow) -> Option<&[String]> {
        self.index.get(flow).map(|&slot| self.flows[slot].1.as_slice())
    }

    /// Flows in first-observed order
    pub fn iter(&self) -> impl Iterator<Item = (&Flow, &[String])> {
        self.flows.iter().map(|(flow, functions)| (flow, functions.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Write one line per known flow
    ///
    /// # Errors
    /// Returns an error if writing fails
    pub fn render(&self, out: &mut impl Write) -> std::io::Result<()> {
        for (flow, functions) in self.iter() {
            writeln!(
                out,
                "{}\t{}\t->\t{}\t[{}]",
                flow.l4_protocol,
                flow.source(),
                flow.destination(),
                functions.join(", ")
            )?;
        }
        Ok(())
    }
}
