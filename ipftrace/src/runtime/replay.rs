//! In-memory event channel
//!
//! Delivers pre-recorded batches of raw records, one batch per poll, then
//! reports the channel as closed. Used to drive the trace loop without a
//! kernel.

use std::collections::VecDeque;
use std::time::Duration;

use super::EventChannel;
use crate::domain::RuntimeError;

#[derive(Debug, Default)]
pub struct ReplayChannel {
    batches: VecDeque<Vec<Vec<u8>>>,
}

impl ReplayChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a batch delivered by a single poll (may be empty)
    #[must_use]
    pub fn with_batch<I, R>(mut self, records: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Vec<u8>>,
    {
        self.batches.push_back(records.into_iter().map(Into::into).collect());
        self
    }
}

impl EventChannel for ReplayChannel {
    async fn poll(
        &mut self,
        _timeout: Duration,
        on_record: &mut dyn FnMut(&[u8]),
    ) -> Result<Option<usize>, RuntimeError> {
        let Some(batch) = self.batches.pop_front() else {
            return Ok(None);
        };
        for record in &batch {
            on_record(record);
        }
        Ok(Some(batch.len()))
    }
}
