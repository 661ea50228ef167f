//! Core types for the ticket ledger and marketplace
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact integer arithmetic for money (base units, truncating splits)
//! - Sequential identifiers seeded at 1 (0 means "none")

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Event identifier
pub type EventId = u64;

/// Ticket (token) identifier
pub type TicketId = u64;

/// Listing identifier
pub type ListingId = u64;

/// Basis point denominator (10000 bps = 100%)
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Decimal places of one whole currency unit
pub const ETHER_DECIMALS: u32 = 18;

/// Caller or recipient identity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Create new address
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key bytes for storage
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Empty identity (the null address)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Monetary amount in base units (1 ether = 10^18 base units)
///
/// Human-readable formats carry the base units as a decimal string, since
/// JSON numbers cannot hold the full `u128` range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u128);

impl Serialize for Amount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.0.to_string())
        } else {
            serializer.serialize_u128(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let units = String::deserialize(deserializer)?;
            units
                .parse::<u128>()
                .map(Amount)
                .map_err(serde::de::Error::custom)
        } else {
            u128::deserialize(deserializer).map(Amount)
        }
    }
}

impl Amount {
    /// Zero
    pub const ZERO: Amount = Amount(0);

    /// Create from base units
    pub const fn from_base_units(units: u128) -> Self {
        Self(units)
    }

    /// Base units
    pub const fn base_units(&self) -> u128 {
        self.0
    }

    /// Parse a decimal ether string ("0.12") into base units
    ///
    /// Digits beyond 18 decimal places are truncated.
    pub fn from_ether(value: &str) -> crate::Result<Self> {
        let decimal = Decimal::from_str(value)
            .map_err(|e| crate::Error::InvalidAmount(format!("{}: {}", value, e)))?;
        Self::from_ether_decimal(decimal)
    }

    /// Convert an ether-denominated decimal into base units
    pub fn from_ether_decimal(value: Decimal) -> crate::Result<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(crate::Error::InvalidAmount(format!(
                "negative amount {}",
                value
            )));
        }

        let scale = Decimal::from(10u64.pow(ETHER_DECIMALS));
        let units = value
            .checked_mul(scale)
            .ok_or(crate::Error::AmountOverflow)?
            .trunc()
            .to_u128()
            .ok_or(crate::Error::AmountOverflow)?;

        Ok(Self(units))
    }

    /// Ether-denominated value, when it fits a 96-bit decimal mantissa
    pub fn to_ether(&self) -> Option<Decimal> {
        let units = i128::try_from(self.0).ok()?;
        Decimal::try_from_i128_with_scale(units, ETHER_DECIMALS)
            .ok()
            .map(|d| d.normalize())
    }

    /// Is zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition
    pub fn checked_add(self, other: Amount) -> crate::Result<Amount> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or(crate::Error::AmountOverflow)
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Amount) -> crate::Result<Amount> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or(crate::Error::AmountOverflow)
    }

    /// Checked multiplication by a count
    pub fn checked_mul(self, count: u128) -> crate::Result<Amount> {
        self.0
            .checked_mul(count)
            .map(Amount)
            .ok_or(crate::Error::AmountOverflow)
    }

    /// Fraction in basis points, truncating: `self * bps / 10000`
    pub fn bps_share(self, bps: u16) -> crate::Result<Amount> {
        self.0
            .checked_mul(u128::from(bps))
            .map(|scaled| Amount(scaled / BPS_DENOMINATOR))
            .ok_or(crate::Error::AmountOverflow)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_ether() {
            Some(ether) => write!(f, "{} ETH", ether),
            None => write!(f, "{} wei", self.0),
        }
    }
}

/// Transfer restriction of an event's tickets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransferRestriction {
    /// Transfers always allowed
    None = 0,
    /// Transfers always rejected
    NoTransfer = 1,
    /// Resale price capped at the event's max transfer price (marketplace)
    PriceCapped = 2,
}

/// Parameters for creating an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Event start (must be in the future)
    pub date: DateTime<Utc>,
    /// Venue
    pub venue: String,
    /// Maximum number of tickets
    pub max_supply: u32,
    /// Primary sale price per ticket
    pub ticket_price: Amount,
    /// Resale cap (zero = unconstrained)
    pub max_transfer_price: Amount,
    /// Whether tickets may change hands after minting
    pub transferable: bool,
}

/// Event record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Sequential event ID
    pub event_id: EventId,
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Venue
    pub venue: String,
    /// Event start
    pub date: DateTime<Utc>,
    /// Organizer (creator)
    pub organizer: Address,
    /// Primary sale price per ticket
    pub ticket_price: Amount,
    /// Resale cap (zero = unconstrained)
    pub max_transfer_price: Amount,
    /// Maximum number of tickets
    pub max_supply: u32,
    /// Tickets minted so far
    pub tickets_sold: u32,
    /// Whether tickets may change hands after minting
    pub transferable: bool,
    /// Minting gate
    pub is_active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Transfer restriction derived from the transferable flag and resale cap
    pub fn transfer_restriction(&self) -> TransferRestriction {
        if !self.transferable {
            TransferRestriction::NoTransfer
        } else if self.max_transfer_price.is_zero() {
            TransferRestriction::None
        } else {
            TransferRestriction::PriceCapped
        }
    }

    /// Tickets still available
    pub fn remaining(&self) -> u32 {
        self.max_supply.saturating_sub(self.tickets_sold)
    }

    /// Check if every ticket has been minted
    pub fn is_sold_out(&self) -> bool {
        self.tickets_sold >= self.max_supply
    }
}

/// Ticket record (ownership lives in the ownership map)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Sequential ticket ID
    pub ticket_id: TicketId,
    /// Event this ticket admits to (never changes)
    pub event_id: EventId,
    /// Seat number
    pub seat_number: u32,
    /// Opaque redemption code (QR payload)
    pub redemption_code: String,
    /// First owner (immutable)
    pub original_buyer: Address,
    /// Redeemed flag (false -> true, never back)
    pub is_used: bool,
}

/// Marketplace listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Sequential listing ID
    pub listing_id: ListingId,
    /// Listed ticket
    pub token_id: TicketId,
    /// Seller (owner at listing time)
    pub seller: Address,
    /// Asking price
    pub price: Amount,
    /// Active until sold or cancelled
    pub active: bool,
}

/// Collection-level royalty record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoyaltyInfo {
    /// Royalty recipient
    pub recipient: Address,
    /// Royalty fraction in basis points
    pub royalty_bps: u16,
}

/// Split of a sale price between seller, platform and royalty recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleSplit {
    /// Sale price
    pub price: Amount,
    /// Platform fee (`price * fee_bps / 10000`)
    pub platform_fee: Amount,
    /// Royalty (`price * royalty_bps / 10000`)
    pub royalty: Amount,
    /// Remainder to the seller
    pub seller_amount: Amount,
}

impl SaleSplit {
    /// Compute the split; the three parts always sum to `price`
    pub fn compute(price: Amount, fee_bps: u16, royalty_bps: u16) -> crate::Result<Self> {
        let platform_fee = price.bps_share(fee_bps)?;
        let royalty = price.bps_share(royalty_bps)?;
        let seller_amount = price
            .checked_sub(platform_fee)?
            .checked_sub(royalty)?;

        Ok(Self {
            price,
            platform_fee,
            royalty,
            seller_amount,
        })
    }
}
