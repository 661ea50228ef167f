//! Error types for the ticket ledger and marketplace
//!
//! Every rejection is synchronous and aborts the whole operation. Display
//! strings are the reasons surfaced to callers; [`Error::kind`] groups them
//! for tooling that reacts by category.

use crate::types::{Address, Amount, EventId, ListingId, TicketId};
use thiserror::Error;

/// Result type for ticketing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Referenced event, ticket or listing does not exist
    NotFound,
    /// Record not in the required phase
    Precondition,
    /// Caller lacks ownership, approval or role
    Authorization,
    /// Attached value below the requirement, or a value movement failed
    Payment,
    /// Disallowed by event policy or configured cap
    Policy,
    /// Storage, serialization, configuration or actor failure
    Infrastructure,
}

impl ErrorKind {
    /// Stable label (metrics, logs)
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Precondition => "precondition",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Payment => "payment",
            ErrorKind::Policy => "policy",
            ErrorKind::Infrastructure => "infrastructure",
        }
    }
}

/// Ticketing errors
#[derive(Error, Debug)]
pub enum Error {
    /// Event not found
    #[error("Event does not exist")]
    EventNotFound(EventId),

    /// Ticket not found
    #[error("Ticket does not exist")]
    TicketNotFound(TicketId),

    /// Listing not found
    #[error("Listing does not exist")]
    ListingNotFound(ListingId),

    /// Event date not in the future
    #[error("Event date must be in the future")]
    EventDateNotInFuture,

    /// Zero max supply
    #[error("Max supply must be greater than 0")]
    ZeroSupply,

    /// Event deactivated
    #[error("Event not active")]
    EventNotActive(EventId),

    /// Every ticket already minted
    #[error("Sold out")]
    SoldOut(EventId),

    /// Batch with no seats
    #[error("No seats requested")]
    NoSeatsRequested,

    /// Ticket already redeemed
    #[error("Ticket already used")]
    TicketAlreadyUsed(TicketId),

    /// Listing sold or cancelled
    #[error("Listing not active")]
    ListingNotActive(ListingId),

    /// Token has an active listing
    #[error("Token already listed")]
    TokenAlreadyListed(TicketId),

    /// Listing price of zero
    #[error("Price must be greater than 0")]
    ZeroPrice,

    /// Caller does not own the token
    #[error("Not token owner")]
    NotTokenOwner,

    /// Marketplace not approved for the token
    #[error("Not approved")]
    NotApproved,

    /// Caller may not perform the operation
    #[error("Not authorized")]
    NotAuthorized,

    /// Caller is not the event organizer
    #[error("Not event organizer")]
    NotOrganizer,

    /// Caller is not the marketplace administrator
    #[error("Caller is not the administrator")]
    NotAdministrator,

    /// Approval target already owns the token
    #[error("Approval to current owner")]
    ApprovalToCurrentOwner,

    /// Ticket sent to the null address
    #[error("Invalid recipient")]
    InvalidRecipient,

    /// Buyer is the seller
    #[error("Cannot buy own listing")]
    CannotBuyOwnListing,

    /// Attached value below requirement
    #[error("Insufficient payment")]
    InsufficientPayment {
        /// Required amount
        required: Amount,
        /// Attached amount
        paid: Amount,
    },

    /// Recipient refused a value transfer
    #[error("Transfer failed: recipient {0} rejected funds")]
    PaymentRejected(Address),

    /// Arithmetic overflow on an amount
    #[error("Amount overflow")]
    AmountOverflow,

    /// Invalid amount input
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Per-address mint limit reached
    #[error("Ticket limit exceeded")]
    TicketLimitExceeded {
        /// Configured limit
        limit: u32,
    },

    /// Event forbids transfers
    #[error("Transfer not allowed")]
    TransferNotAllowed(TicketId),

    /// Resale price above the event cap
    #[error("Price exceeds transfer cap")]
    PriceAboveTransferCap {
        /// Asking price
        price: Amount,
        /// Event cap
        cap: Amount,
    },

    /// Royalty above 10%
    #[error("Royalty too high")]
    RoyaltyTooHigh(u16),

    /// Platform fee above 10%
    #[error("Fee too high")]
    FeeTooHigh(u16),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Invariant violation (supply overrun, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Error category
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EventNotFound(_) | Error::TicketNotFound(_) | Error::ListingNotFound(_) => {
                ErrorKind::NotFound
            }

            Error::EventDateNotInFuture
            | Error::ZeroSupply
            | Error::EventNotActive(_)
            | Error::SoldOut(_)
            | Error::NoSeatsRequested
            | Error::TicketAlreadyUsed(_)
            | Error::ListingNotActive(_)
            | Error::TokenAlreadyListed(_)
            | Error::ZeroPrice
            | Error::InvalidRecipient
            | Error::InvalidAmount(_) => ErrorKind::Precondition,

            Error::NotTokenOwner
            | Error::NotApproved
            | Error::NotAuthorized
            | Error::NotOrganizer
            | Error::NotAdministrator
            | Error::ApprovalToCurrentOwner
            | Error::CannotBuyOwnListing => ErrorKind::Authorization,

            Error::InsufficientPayment { .. }
            | Error::PaymentRejected(_)
            | Error::AmountOverflow => ErrorKind::Payment,

            Error::TicketLimitExceeded { .. }
            | Error::TransferNotAllowed(_)
            | Error::PriceAboveTransferCap { .. }
            | Error::RoyaltyTooHigh(_)
            | Error::FeeTooHigh(_) => ErrorKind::Policy,

            Error::Storage(_)
            | Error::Serialization(_)
            | Error::InvariantViolation(_)
            | Error::Concurrency(_)
            | Error::Config(_)
            | Error::Io(_) => ErrorKind::Infrastructure,
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
