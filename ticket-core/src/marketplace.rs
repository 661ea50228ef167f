//! Marketplace escrow engine
//!
//! Owns Listing and Royalty records. Escrow is authorization-based: a listed
//! ticket stays with its seller until sale, and the marketplace moves it only
//! through [`TicketLedger::transfer_from`] using the approval the seller
//! granted to the marketplace address.
//!
//! # Sale ordering
//!
//! 1. Listing marked inactive (and removed from the active index)
//! 2. Ownership transferred seller -> buyer
//! 3. Proceeds split and credited: seller, fee recipient, royalty recipient
//! 4. Excess payment refunded to the buyer
//!
//! A rejected credit at step 3 or 4 drops the transaction, so the listing
//! flag and the ownership change roll back with it.

use crate::{
    config::{MarketplaceConfig, MAX_FEE_BPS},
    ledger::TicketLedger,
    notifications::Notification,
    payments::{self, ValueReceiver},
    storage::{
        id_key, StoreTx, CF_ACTIVE_LISTINGS, CF_LISTINGS, CF_META, CF_ROYALTIES, NEXT_LISTING_ID,
    },
    types::{Address, Amount, Listing, ListingId, RoyaltyInfo, SaleSplit, TicketId, TransferRestriction},
    Error, Result,
};
use std::sync::Arc;

const PLATFORM_FEE_KEY: &[u8] = b"platform_fee_bps";

/// Outcome of a completed purchase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleReceipt {
    /// Sold listing
    pub listing_id: ListingId,
    /// Transferred ticket
    pub token_id: TicketId,
    /// Proceeds split
    pub split: SaleSplit,
    /// Overpayment returned to the buyer
    pub refund: Amount,
}

/// Marketplace escrow engine
#[derive(Clone)]
pub struct Marketplace {
    address: Address,
    administrator: Address,
    fee_recipient: Address,
    default_fee_bps: u16,
    ledger: TicketLedger,
    receiver: Arc<dyn ValueReceiver>,
}

impl std::fmt::Debug for Marketplace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marketplace")
            .field("address", &self.address)
            .field("administrator", &self.administrator)
            .field("fee_recipient", &self.fee_recipient)
            .finish()
    }
}

impl Marketplace {
    /// Create marketplace over `ledger`
    pub fn new(
        config: &MarketplaceConfig,
        ledger: TicketLedger,
        receiver: Arc<dyn ValueReceiver>,
    ) -> Self {
        Self {
            address: config.address.clone(),
            administrator: config.administrator.clone(),
            fee_recipient: config.fee_recipient.clone(),
            default_fee_bps: config.platform_fee_bps,
            ledger,
            receiver,
        }
    }

    /// Identity sellers approve
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Administrator identity
    pub fn administrator(&self) -> &Address {
        &self.administrator
    }

    /// Platform fee recipient
    pub fn fee_recipient(&self) -> &Address {
        &self.fee_recipient
    }

    /// Current platform fee (bps)
    pub fn platform_fee(&self, tx: &StoreTx<'_>) -> Result<u16> {
        Ok(tx.get(CF_META, PLATFORM_FEE_KEY)?.unwrap_or(self.default_fee_bps))
    }

    /// Royalty record for `collection`
    pub fn royalty_info(&self, tx: &StoreTx<'_>, collection: &Address) -> Result<Option<RoyaltyInfo>> {
        tx.get(CF_ROYALTIES, collection.as_bytes())
    }

    /// Get listing
    pub fn get_listing(&self, tx: &StoreTx<'_>, listing_id: ListingId) -> Result<Listing> {
        tx.get(CF_LISTINGS, &id_key(listing_id))?
            .ok_or(Error::ListingNotFound(listing_id))
    }

    /// Active listing of `token_id`, if any
    pub fn active_listing(&self, tx: &StoreTx<'_>, token_id: TicketId) -> Result<Option<ListingId>> {
        tx.get(CF_ACTIVE_LISTINGS, &id_key(token_id))
    }

    /// Check if `token_id` has an active listing
    pub fn is_token_listed(&self, tx: &StoreTx<'_>, token_id: TicketId) -> Result<bool> {
        tx.contains(CF_ACTIVE_LISTINGS, &id_key(token_id))
    }

    fn close_listing(&self, tx: &mut StoreTx<'_>, listing: &mut Listing) -> Result<()> {
        listing.active = false;
        tx.put(CF_LISTINGS, &id_key(listing.listing_id), listing)?;
        tx.delete(CF_ACTIVE_LISTINGS, &id_key(listing.token_id));
        Ok(())
    }

    /// List an owned, marketplace-approved ticket at `price`
    pub fn list_ticket(
        &self,
        tx: &mut StoreTx<'_>,
        caller: &Address,
        token_id: TicketId,
        price: Amount,
    ) -> Result<ListingId> {
        if price.is_zero() {
            return Err(Error::ZeroPrice);
        }

        let owner = self.ledger.owner_of(tx, token_id)?;
        if &owner != caller {
            return Err(Error::NotTokenOwner);
        }

        let approved = self.ledger.get_approved(tx, token_id)?.as_ref() == Some(&self.address)
            || self.ledger.is_approved_for_all(tx, &owner, &self.address)?;
        if !approved {
            return Err(Error::NotApproved);
        }

        let policy = self.ledger.transfer_policy(tx, token_id)?;
        match policy.restriction {
            TransferRestriction::NoTransfer => return Err(Error::TransferNotAllowed(token_id)),
            TransferRestriction::PriceCapped if price > policy.max_transfer_price => {
                return Err(Error::PriceAboveTransferCap {
                    price,
                    cap: policy.max_transfer_price,
                });
            }
            _ => {}
        }

        if let Some(existing_id) = self.active_listing(tx, token_id)? {
            let mut existing = self.get_listing(tx, existing_id)?;
            if existing.seller == owner {
                return Err(Error::TokenAlreadyListed(token_id));
            }

            // Seller gave up the token after listing it
            self.close_listing(tx, &mut existing)?;
            tx.emit(Notification::ListingCancelled {
                listing_id: existing_id,
                token_id,
            });
            tracing::info!(listing_id = existing_id, token_id, "Stale listing closed");
        }

        let listing_id = tx.next_id(NEXT_LISTING_ID)?;
        let listing = Listing {
            listing_id,
            token_id,
            seller: caller.clone(),
            price,
            active: true,
        };
        tx.put(CF_LISTINGS, &id_key(listing_id), &listing)?;
        tx.put(CF_ACTIVE_LISTINGS, &id_key(token_id), &listing_id)?;

        tx.emit(Notification::TicketListed {
            listing_id,
            token_id,
            seller: caller.clone(),
            price,
        });

        tracing::info!(listing_id, token_id, seller = %caller, price = %price, "Ticket listed");
        Ok(listing_id)
    }

    /// Buy an active listing against `paid`
    pub fn buy_ticket(
        &self,
        tx: &mut StoreTx<'_>,
        caller: &Address,
        listing_id: ListingId,
        paid: Amount,
    ) -> Result<SaleReceipt> {
        let mut listing = self.get_listing(tx, listing_id)?;
        if !listing.active {
            return Err(Error::ListingNotActive(listing_id));
        }
        if paid < listing.price {
            return Err(Error::InsufficientPayment {
                required: listing.price,
                paid,
            });
        }
        if caller == &listing.seller {
            return Err(Error::CannotBuyOwnListing);
        }

        // Inactive before any value moves
        self.close_listing(tx, &mut listing)?;

        self.ledger
            .transfer_from(tx, &self.address, &listing.seller, caller, listing.token_id)?;

        let fee_bps = self.platform_fee(tx)?;
        let royalty = self.royalty_info(tx, self.ledger.collection())?;
        let royalty_bps = royalty.as_ref().map_or(0, |info| info.royalty_bps);
        let split = SaleSplit::compute(listing.price, fee_bps, royalty_bps)?;
        let refund = paid.checked_sub(listing.price)?;

        let receiver = self.receiver.as_ref();
        payments::credit(tx, receiver, &listing.seller, split.seller_amount)?;
        payments::credit(tx, receiver, &self.fee_recipient, split.platform_fee)?;
        if let Some(info) = &royalty {
            payments::credit(tx, receiver, &info.recipient, split.royalty)?;
        }
        payments::credit(tx, receiver, caller, refund)?;

        tx.emit(Notification::TicketSold {
            listing_id,
            token_id: listing.token_id,
            seller: listing.seller.clone(),
            buyer: caller.clone(),
            price: listing.price,
        });
        tx.emit(Notification::ProceedsDistributed {
            listing_id,
            seller_amount: split.seller_amount,
            platform_fee: split.platform_fee,
            royalty: split.royalty,
        });
        if !refund.is_zero() {
            tx.emit(Notification::RefundIssued {
                recipient: caller.clone(),
                amount: refund,
            });
        }

        tracing::info!(
            listing_id,
            token_id = listing.token_id,
            seller = %listing.seller,
            buyer = %caller,
            price = %listing.price,
            platform_fee = %split.platform_fee,
            royalty = %split.royalty,
            "Ticket sold"
        );

        Ok(SaleReceipt {
            listing_id,
            token_id: listing.token_id,
            split,
            refund,
        })
    }

    /// Cancel an active listing (seller or administrator)
    pub fn cancel_listing(
        &self,
        tx: &mut StoreTx<'_>,
        caller: &Address,
        listing_id: ListingId,
    ) -> Result<()> {
        let mut listing = self.get_listing(tx, listing_id)?;
        if !listing.active {
            return Err(Error::ListingNotActive(listing_id));
        }
        if caller != &listing.seller && caller != &self.administrator {
            return Err(Error::NotAuthorized);
        }

        self.close_listing(tx, &mut listing)?;
        tx.emit(Notification::ListingCancelled {
            listing_id,
            token_id: listing.token_id,
        });

        tracing::info!(listing_id, token_id = listing.token_id, caller = %caller, "Listing cancelled");
        Ok(())
    }

    fn require_administrator(&self, caller: &Address) -> Result<()> {
        if caller != &self.administrator {
            return Err(Error::NotAdministrator);
        }
        Ok(())
    }

    /// Upsert the royalty record of `collection` (administrator only)
    pub fn set_royalty_info(
        &self,
        tx: &mut StoreTx<'_>,
        caller: &Address,
        collection: &Address,
        recipient: &Address,
        royalty_bps: u16,
    ) -> Result<()> {
        self.require_administrator(caller)?;
        if royalty_bps > MAX_FEE_BPS {
            return Err(Error::RoyaltyTooHigh(royalty_bps));
        }

        let info = RoyaltyInfo {
            recipient: recipient.clone(),
            royalty_bps,
        };
        tx.put(CF_ROYALTIES, collection.as_bytes(), &info)?;

        tx.emit(Notification::RoyaltySet {
            collection: collection.clone(),
            recipient: recipient.clone(),
            royalty_bps,
        });

        tracing::info!(collection = %collection, recipient = %recipient, royalty_bps, "Royalty set");
        Ok(())
    }

    /// Replace the platform fee (administrator only)
    pub fn set_platform_fee(&self, tx: &mut StoreTx<'_>, caller: &Address, fee_bps: u16) -> Result<()> {
        self.require_administrator(caller)?;
        if fee_bps > MAX_FEE_BPS {
            return Err(Error::FeeTooHigh(fee_bps));
        }

        tx.put(CF_META, PLATFORM_FEE_KEY, &fee_bps)?;
        tx.emit(Notification::PlatformFeeUpdated { fee_bps });

        tracing::info!(fee_bps, "Platform fee updated");
        Ok(())
    }
}
