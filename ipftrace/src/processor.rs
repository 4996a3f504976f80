//! # Event Processing
//!
//! Decodes each raw record, feeds it to the [`FlowAggregator`] and counts
//! what was dropped. [`run_trace_loop`] drives the poll → render cycle.
//!
//! Records are handled synchronously in arrival order on a single thread, so
//! the flow table needs no locking.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::aggregator::FlowAggregator;
use crate::decoder::EventDecoder;
use crate::domain::DecodeError;
use crate::runtime::EventChannel;

/// Per-reason record counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorStats {
    pub records: u64,
    pub aggregated: u64,
    pub short_records: u64,
    pub unknown_event_ids: u64,
    pub unsupported_l3: u64,
    pub unsupported_l4: u64,
}

impl ProcessorStats {
    pub fn dropped(&self) -> u64 {
        self.short_records + self.unknown_event_ids + self.unsupported_l3 + self.unsupported_l4
    }
}

/// Encapsulates decoding and aggregation state
pub struct EventProcessor<'a> {
    decoder: EventDecoder<'a>,
    aggregator: FlowAggregator,
    pub stats: ProcessorStats,
}

impl<'a> EventProcessor<'a> {
    #[must_use]
    pub fn new(decoder: EventDecoder<'a>) -> Self {
        Self { decoder, aggregator: FlowAggregator::new(), stats: ProcessorStats::default() }
    }

    /// Process a single record; undecodable records are logged and dropped
    pub fn process_record(&mut self, bytes: &[u8]) {
        self.stats.records += 1;

        match self.decoder.decode(bytes) {
            Ok(event) => {
                debug!("{} {:?}", event.function, event.flow);
                self.aggregator.record(event.flow, event.function);
                self.stats.aggregated += 1;
            }
            Err(e) => {
                match e {
                    DecodeError::ShortRecord { .. } => self.stats.short_records += 1,
                    DecodeError::UnknownEventId(_) => self.stats.unknown_event_ids += 1,
                    DecodeError::UnsupportedL3(_) => self.stats.unsupported_l3 += 1,
                    DecodeError::UnsupportedL4(_) => self.stats.unsupported_l4 += 1,
                }
                warn!("Dropping record: {e}");
            }
        }
    }

    pub fn aggregator(&self) -> &FlowAggregator {
        &self.aggregator
    }

    /// Render the full flow table
    ///
    /// # Errors
    /// Returns an error if writing fails
    pub fn render(&self, out: &mut impl Write) -> std::io::Result<()> {
        self.aggregator.render(out)?;
        out.flush()
    }

    /// Log the counters
    pub fn log_summary(&self) {
        let s = &self.stats;
        info!(
            "{} records, {} aggregated into {} flows, {} dropped (short: {}, unknown id: {}, l3: {}, l4: {})",
            s.records,
            s.aggregated,
            self.aggregator.len(),
            s.dropped(),
            s.short_records,
            s.unknown_event_ids,
            s.unsupported_l3,
            s.unsupported_l4,
        );
    }
}

/// Why the trace loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Interrupted,
    ChannelClosed,
}

/// Poll the channel, aggregate every delivered record and re-render the
/// whole table after each poll until `shutdown` resolves or the channel closes
///
/// An interrupt during a poll ends the loop immediately without rendering.
///
/// # Errors
/// Returns an error if polling or writing the table fails
pub async fn run_trace_loop<C, W, S>(
    channel: &mut C,
    processor: &mut EventProcessor<'_>,
    interval: Duration,
    out: &mut W,
    shutdown: S,
) -> Result<ExitReason>
where
    C: EventChannel,
    W: Write,
    S: Future,
{
    tokio::pin!(shutdown);

    loop {
        let mut on_record = |bytes: &[u8]| processor.process_record(bytes);
        let delivered = tokio::select! {
            biased;
            _ = &mut shutdown => return Ok(ExitReason::Interrupted),
            polled = channel.poll(interval, &mut on_record) => {
                polled.context("Failed to poll event channel")?
            }
        };

        let Some(count) = delivered else {
            return Ok(ExitReason::ChannelClosed);
        };
        debug!("Poll delivered {count} records");

        processor.render(out).context("Failed to write flow table")?;
    }
}
