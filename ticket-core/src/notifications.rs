//! Structured notifications emitted by committed operations
//!
//! Each mutating operation stages notifications in its transaction. They are
//! persisted with the same write batch as the state change and published to
//! subscribers only after commit, so observers never see a notification for
//! a rolled-back call.

use crate::types::{Address, Amount, EventId, ListingId, TicketId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification payload (name + arguments)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "args")]
#[allow(missing_docs)]
pub enum Notification {
    /// Event created
    EventCreated {
        event_id: EventId,
        organizer: Address,
        name: String,
        max_supply: u32,
        ticket_price: Amount,
    },

    /// Event closed for minting
    EventDeactivated { event_id: EventId },

    /// Ticket minted
    TicketMinted {
        ticket_id: TicketId,
        event_id: EventId,
        buyer: Address,
        price: Amount,
    },

    /// Primary sale payment accepted
    PaymentReceived {
        buyer: Address,
        amount: Amount,
        event_id: EventId,
    },

    /// Overpayment returned
    RefundIssued { recipient: Address, amount: Amount },

    /// Ticket redeemed
    TicketVerified {
        ticket_id: TicketId,
        verifier: Address,
    },

    /// Ticket ownership changed
    TicketTransferred {
        ticket_id: TicketId,
        from: Address,
        to: Address,
    },

    /// Single-token approval set or cleared
    Approval {
        owner: Address,
        approved: Option<Address>,
        ticket_id: TicketId,
    },

    /// Operator approval toggled
    ApprovalForAll {
        owner: Address,
        operator: Address,
        approved: bool,
    },

    /// Listing created
    TicketListed {
        listing_id: ListingId,
        token_id: TicketId,
        seller: Address,
        price: Amount,
    },

    /// Listing sold
    TicketSold {
        listing_id: ListingId,
        token_id: TicketId,
        seller: Address,
        buyer: Address,
        price: Amount,
    },

    /// Sale proceeds paid out
    ProceedsDistributed {
        listing_id: ListingId,
        seller_amount: Amount,
        platform_fee: Amount,
        royalty: Amount,
    },

    /// Listing cancelled
    ListingCancelled {
        listing_id: ListingId,
        token_id: TicketId,
    },

    /// Royalty record upserted
    RoyaltySet {
        collection: Address,
        recipient: Address,
        royalty_bps: u16,
    },

    /// Platform fee replaced
    PlatformFeeUpdated { fee_bps: u16 },
}

impl Notification {
    /// Notification name
    pub fn name(&self) -> &'static str {
        match self {
            Notification::EventCreated { .. } => "EventCreated",
            Notification::EventDeactivated { .. } => "EventDeactivated",
            Notification::TicketMinted { .. } => "TicketMinted",
            Notification::PaymentReceived { .. } => "PaymentReceived",
            Notification::RefundIssued { .. } => "RefundIssued",
            Notification::TicketVerified { .. } => "TicketVerified",
            Notification::TicketTransferred { .. } => "TicketTransferred",
            Notification::Approval { .. } => "Approval",
            Notification::ApprovalForAll { .. } => "ApprovalForAll",
            Notification::TicketListed { .. } => "TicketListed",
            Notification::TicketSold { .. } => "TicketSold",
            Notification::ProceedsDistributed { .. } => "ProceedsDistributed",
            Notification::ListingCancelled { .. } => "ListingCancelled",
            Notification::RoyaltySet { .. } => "RoyaltySet",
            Notification::PlatformFeeUpdated { .. } => "PlatformFeeUpdated",
        }
    }
}

/// Committed notification with its position in the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Position in the notification log (starts at 1)
    pub sequence: u64,

    /// Unique record ID (UUIDv7 for time-ordering)
    pub record_id: Uuid,

    /// Commit timestamp
    pub recorded_at: DateTime<Utc>,

    /// Payload
    pub notification: Notification,
}

impl NotificationRecord {
    /// JSON form for indexers
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "sequence": self.sequence,
            "record_id": self.record_id.to_string(),
            "recorded_at": self.recorded_at.to_rfc3339(),
            "notification": self.notification,
        })
    }
}
