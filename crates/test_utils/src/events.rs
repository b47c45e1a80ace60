//! Recording event sink

use std::sync::Mutex;

use async_trait::async_trait;

use domain_ledger::{EventSink, LedgerEvent};
use domain_ledger::event::EventError;

/// Captures every published event for later assertions
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LedgerEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything published so far
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Number of events published so far
    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: &LedgerEvent) -> Result<(), EventError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
