//! Ticket Core
//!
//! Event-admission ticket ledger with a secondary marketplace.
//!
//! # Architecture
//!
//! - **Ledger**: events, tickets, ownership, approvals, exactly-once redemption
//! - **Marketplace**: authorization-based escrow, atomic sale with fee/royalty split
//! - **Single Writer**: one actor task executes one operation at a time
//! - **Atomic Commit**: each operation is one RocksDB `WriteBatch` or nothing
//!
//! # Invariants
//!
//! - Supply: `tickets_sold <= max_supply` for every event
//! - Conservation: `seller + platform fee + royalty == price` for every sale
//! - Refunds: overpayment returns exactly `paid - required`
//! - Redemption: a ticket is verified at most once
//! - Listings: at most one active listing per ticket; inactive is final

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod error;
pub mod exchange;
pub mod ledger;
pub mod marketplace;
pub mod metrics;
pub mod notifications;
pub mod payments;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use exchange::Exchange;
pub use ledger::{TicketLedger, TransferPolicy};
pub use marketplace::{Marketplace, SaleReceipt};
pub use notifications::{Notification, NotificationRecord};
pub use payments::{AcceptAll, DenyList, ValueReceiver};
pub use storage::Storage;
pub use types::{
    Address, Amount, Event, EventId, Listing, ListingId, NewEvent, RoyaltyInfo, SaleSplit,
    Ticket, TicketId, TransferRestriction,
};
