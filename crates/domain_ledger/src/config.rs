//! Ledger configuration

use rust_decimal::Decimal;

use core_kernel::temporal::RollingWindow;

/// Tunables of the ledger service
///
/// # Example
///
/// ```rust,ignore
/// let config = LedgerConfig::default()
///     .max_transfers_sent(5)
///     .transfer_window(RollingWindow::from_hours(12));
/// ```
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Slug of the product whose debits may drive a balance negative
    pub revert_product_slug: String,
    /// Slug of the product transfers settle under
    pub transfer_product_slug: String,
    /// Rolling window both transfer limits are evaluated against
    pub transfer_window: RollingWindow,
    /// Max transfers one sender may make per window
    pub max_transfers_sent: u32,
    /// Max transfers one receiver may accept per window
    pub max_transfers_received: u32,
    /// Max credits one receiver may accept per window
    pub max_received_volume: Decimal,
    /// Attempts per operation before a serialization conflict becomes fatal
    pub retry_budget: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            revert_product_slug: "revert".to_string(),
            transfer_product_slug: "transfer".to_string(),
            transfer_window: RollingWindow::from_hours(24),
            max_transfers_sent: 10,
            max_transfers_received: 20,
            max_received_volume: Decimal::from(10_000),
            retry_budget: 3,
        }
    }
}

impl LedgerConfig {
    pub fn transfer_window(mut self, window: RollingWindow) -> Self {
        self.transfer_window = window;
        self
    }

    pub fn max_transfers_sent(mut self, max: u32) -> Self {
        self.max_transfers_sent = max;
        self
    }

    pub fn max_transfers_received(mut self, max: u32) -> Self {
        self.max_transfers_received = max;
        self
    }

    pub fn max_received_volume(mut self, max: Decimal) -> Self {
        self.max_received_volume = max;
        self
    }

    pub fn retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget.max(1);
        self
    }
}
