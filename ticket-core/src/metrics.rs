//! Metrics collection for observability
//!
//! Prometheus metrics for the ticket ledger and marketplace. Collectors live
//! in a registry owned by each [`Metrics`] instance, so several exchanges can
//! run in one process (tests do).
//!
//! # Metrics
//!
//! - `ticketing_operations_total{operation,outcome}` - Operations by outcome
//!   (`committed` or an error-kind label)
//! - `ticketing_tickets_minted_total` - Tickets minted
//! - `ticketing_sales_total` - Marketplace sales
//! - `ticketing_sale_volume_base_units_total` - Sum of sale prices (base units)

use crate::{error::ErrorKind, types::Amount};
use prometheus::{Counter, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Outcome label of a committed operation
pub const OUTCOME_COMMITTED: &str = "committed";

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Operations by name and outcome
    pub operations_total: IntCounterVec,

    /// Tickets minted
    pub tickets_minted: IntCounter,

    /// Marketplace sales
    pub sales_total: IntCounter,

    /// Sale volume in base units
    pub sale_volume: Counter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("tickets_minted", &self.tickets_minted.get())
            .field("sales_total", &self.sales_total.get())
            .finish()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_total = IntCounterVec::new(
            Opts::new(
                "ticketing_operations_total",
                "Ticketing operations by outcome",
            ),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let tickets_minted = IntCounter::new(
            "ticketing_tickets_minted_total",
            "Total number of tickets minted",
        )?;
        registry.register(Box::new(tickets_minted.clone()))?;

        let sales_total = IntCounter::new(
            "ticketing_sales_total",
            "Total number of marketplace sales",
        )?;
        registry.register(Box::new(sales_total.clone()))?;

        let sale_volume = Counter::new(
            "ticketing_sale_volume_base_units_total",
            "Sum of marketplace sale prices in base units",
        )?;
        registry.register(Box::new(sale_volume.clone()))?;

        Ok(Self {
            operations_total,
            tickets_minted,
            sales_total,
            sale_volume,
            registry,
        })
    }

    /// Record a committed operation
    pub fn record_committed(&self, operation: &str) {
        self.operations_total
            .with_label_values(&[operation, OUTCOME_COMMITTED])
            .inc();
    }

    /// Record a rejected operation
    pub fn record_rejected(&self, operation: &str, kind: ErrorKind) {
        self.operations_total
            .with_label_values(&[operation, kind.as_str()])
            .inc();
    }

    /// Record minted tickets
    pub fn record_minted(&self, count: usize) {
        self.tickets_minted.inc_by(count as u64);
    }

    /// Record a marketplace sale
    pub fn record_sale(&self, price: Amount) {
        self.sales_total.inc();
        self.sale_volume.inc_by(price.base_units() as f64);
    }

    /// Operation count for one label pair
    pub fn operation_count(&self, operation: &str, outcome: &str) -> u64 {
        self.operations_total
            .with_label_values(&[operation, outcome])
            .get()
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
