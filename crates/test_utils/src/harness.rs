//! Fully wired in-memory ledger
//!
//! Integration suites build one of these instead of wiring the store,
//! directory, rule engine, sink, and clock by hand. Time starts at the
//! fixture epoch and only moves through [`FixedClock`].

use std::sync::Arc;

use domain_catalog::GroupDirectory;
use domain_ledger::{Ledger, LedgerConfig, MemoryStore};
use domain_rules::RuleEngine;

use crate::clock::FixedClock;
use crate::events::RecordingSink;
use crate::fixtures::TemporalFixtures;

/// An in-memory ledger with every collaborator exposed
pub struct LedgerHarness {
    pub store: Arc<MemoryStore>,
    pub directory: Arc<GroupDirectory>,
    pub rules: Arc<RuleEngine>,
    pub events: Arc<RecordingSink>,
    pub clock: Arc<FixedClock>,
    pub ledger: Arc<Ledger<MemoryStore>>,
}

impl LedgerHarness {
    /// Harness with the default ledger configuration
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    /// Harness with a custom ledger configuration
    pub fn with_config(config: LedgerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(GroupDirectory::new());
        let rules = Arc::new(RuleEngine::new());
        let events = Arc::new(RecordingSink::new());
        let clock = Arc::new(FixedClock::at(TemporalFixtures::epoch()));
        let ledger = Arc::new(Ledger::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            Arc::clone(&rules),
            events.clone(),
            clock.clone(),
            config,
        ));
        Self {
            store,
            directory,
            rules,
            events,
            clock,
            ledger,
        }
    }
}

impl Default for LedgerHarness {
    fn default() -> Self {
        Self::new()
    }
}
