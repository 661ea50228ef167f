//! Event & ticket ledger
//!
//! Owns Event and Ticket records and the non-fungible ownership map
//! (owners, approvals, operators). Every operation takes the caller's
//! [`StoreTx`]; an `Err` leaves the transaction to be dropped, so a failed
//! call changes nothing.
//!
//! Mutation order inside a paid mint: supply counter, ticket record and
//! ownership first, value movements (treasury credit, refund) last.

use crate::{
    config::LedgerConfig,
    notifications::Notification,
    payments::{self, ValueReceiver},
    storage::{
        id_key, pair_key, StoreTx, CF_APPROVALS, CF_EVENTS, CF_HOLDINGS, CF_MINT_COUNTS,
        CF_OPERATORS, CF_OWNERS, CF_TICKETS, CF_VERIFIED, NEXT_EVENT_ID, NEXT_TICKET_ID,
    },
    types::{Address, Amount, Event, EventId, NewEvent, Ticket, TicketId, TransferRestriction},
    Error, Result,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

const COLLECTION_SCOPE: &[u8] = b"collection";

/// Transfer policy of a ticket, as seen by the marketplace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPolicy {
    /// Restriction derived from the owning event
    pub restriction: TransferRestriction,
    /// Resale cap (meaningful for `PriceCapped`)
    pub max_transfer_price: Amount,
}

/// Event & ticket ledger
#[derive(Clone)]
pub struct TicketLedger {
    collection: Address,
    max_tickets_per_address: u32,
    receiver: Arc<dyn ValueReceiver>,
}

impl std::fmt::Debug for TicketLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketLedger")
            .field("collection", &self.collection)
            .field("max_tickets_per_address", &self.max_tickets_per_address)
            .finish()
    }
}

impl TicketLedger {
    /// Create ledger
    pub fn new(config: &LedgerConfig, receiver: Arc<dyn ValueReceiver>) -> Self {
        Self {
            collection: config.collection.clone(),
            max_tickets_per_address: config.max_tickets_per_address,
            receiver,
        }
    }

    /// Collection identity
    pub fn collection(&self) -> &Address {
        &self.collection
    }

    /// Per-address mint limit
    pub fn max_tickets_per_address(&self) -> u32 {
        self.max_tickets_per_address
    }

    // Events

    /// Create an event organized by `caller`
    pub fn create_event(
        &self,
        tx: &mut StoreTx<'_>,
        caller: &Address,
        params: NewEvent,
        now: DateTime<Utc>,
    ) -> Result<EventId> {
        if params.date <= now {
            return Err(Error::EventDateNotInFuture);
        }
        if params.max_supply == 0 {
            return Err(Error::ZeroSupply);
        }

        let event_id = tx.next_id(NEXT_EVENT_ID)?;
        let event = Event {
            event_id,
            name: params.name,
            description: params.description,
            venue: params.venue,
            date: params.date,
            organizer: caller.clone(),
            ticket_price: params.ticket_price,
            max_transfer_price: params.max_transfer_price,
            max_supply: params.max_supply,
            tickets_sold: 0,
            transferable: params.transferable,
            is_active: true,
            created_at: now,
        };
        tx.put(CF_EVENTS, &id_key(event_id), &event)?;

        tx.emit(Notification::EventCreated {
            event_id,
            organizer: caller.clone(),
            name: event.name.clone(),
            max_supply: event.max_supply,
            ticket_price: event.ticket_price,
        });

        tracing::info!(
            event_id,
            organizer = %caller,
            max_supply = event.max_supply,
            ticket_price = %event.ticket_price,
            "Event created"
        );

        Ok(event_id)
    }

    /// Close an event for minting (organizer only)
    pub fn deactivate_event(
        &self,
        tx: &mut StoreTx<'_>,
        caller: &Address,
        event_id: EventId,
    ) -> Result<()> {
        let mut event = self.get_event(tx, event_id)?;
        if &event.organizer != caller {
            return Err(Error::NotOrganizer);
        }
        if !event.is_active {
            return Err(Error::EventNotActive(event_id));
        }

        event.is_active = false;
        tx.put(CF_EVENTS, &id_key(event_id), &event)?;
        tx.emit(Notification::EventDeactivated { event_id });

        tracing::info!(event_id, "Event deactivated");
        Ok(())
    }

    /// Get event
    pub fn get_event(&self, tx: &StoreTx<'_>, event_id: EventId) -> Result<Event> {
        tx.get(CF_EVENTS, &id_key(event_id))?
            .ok_or(Error::EventNotFound(event_id))
    }

    // Minting

    /// Mint one ticket against `paid`, refunding any excess
    pub fn mint_ticket(
        &self,
        tx: &mut StoreTx<'_>,
        caller: &Address,
        event_id: EventId,
        seat_number: u32,
        redemption_code: String,
        paid: Amount,
    ) -> Result<TicketId> {
        if caller.is_empty() {
            return Err(Error::InvalidRecipient);
        }
        let mut event = self.get_event(tx, event_id)?;
        if !event.is_active {
            return Err(Error::EventNotActive(event_id));
        }
        if event.is_sold_out() {
            return Err(Error::SoldOut(event_id));
        }
        if paid < event.ticket_price {
            return Err(Error::InsufficientPayment {
                required: event.ticket_price,
                paid,
            });
        }
        self.check_mint_limit(tx, caller, 1)?;

        let ticket_id = self.mint_one(tx, caller, &mut event, seat_number, redemption_code)?;
        tx.put(CF_EVENTS, &id_key(event_id), &event)?;

        self.settle_primary_payment(tx, caller, event_id, event.ticket_price, paid)?;

        Ok(ticket_id)
    }

    /// Mint one ticket per seat against a single aggregate payment
    ///
    /// Either every seat is minted or none is.
    pub fn mint_tickets_batch(
        &self,
        tx: &mut StoreTx<'_>,
        caller: &Address,
        event_id: EventId,
        seat_numbers: &[u32],
        paid: Amount,
    ) -> Result<Vec<TicketId>> {
        if seat_numbers.is_empty() {
            return Err(Error::NoSeatsRequested);
        }
        if caller.is_empty() {
            return Err(Error::InvalidRecipient);
        }

        let count = u32::try_from(seat_numbers.len()).map_err(|_| Error::SoldOut(event_id))?;
        let mut event = self.get_event(tx, event_id)?;
        if !event.is_active {
            return Err(Error::EventNotActive(event_id));
        }
        if event.remaining() < count {
            return Err(Error::SoldOut(event_id));
        }

        let required = event.ticket_price.checked_mul(u128::from(count))?;
        if paid < required {
            return Err(Error::InsufficientPayment { required, paid });
        }
        self.check_mint_limit(tx, caller, count)?;

        let mut ticket_ids = Vec::with_capacity(seat_numbers.len());
        for &seat_number in seat_numbers {
            let code = Uuid::new_v4().simple().to_string();
            ticket_ids.push(self.mint_one(tx, caller, &mut event, seat_number, code)?);
        }
        tx.put(CF_EVENTS, &id_key(event_id), &event)?;

        self.settle_primary_payment(tx, caller, event_id, required, paid)?;

        Ok(ticket_ids)
    }

    fn check_mint_limit(&self, tx: &StoreTx<'_>, buyer: &Address, count: u32) -> Result<()> {
        let minted = self.ticket_count(tx, buyer)?;
        if minted.saturating_add(count) > self.max_tickets_per_address {
            return Err(Error::TicketLimitExceeded {
                limit: self.max_tickets_per_address,
            });
        }
        Ok(())
    }

    fn mint_one(
        &self,
        tx: &mut StoreTx<'_>,
        buyer: &Address,
        event: &mut Event,
        seat_number: u32,
        redemption_code: String,
    ) -> Result<TicketId> {
        if event.is_sold_out() {
            return Err(Error::SoldOut(event.event_id));
        }
        event.tickets_sold += 1;

        let ticket_id = tx.next_id(NEXT_TICKET_ID)?;
        let ticket = Ticket {
            ticket_id,
            event_id: event.event_id,
            seat_number,
            redemption_code,
            original_buyer: buyer.clone(),
            is_used: false,
        };
        tx.put(CF_TICKETS, &id_key(ticket_id), &ticket)?;
        tx.put(CF_OWNERS, &id_key(ticket_id), buyer)?;
        self.adjust_holdings(tx, buyer, 1)?;

        let collection_key = pair_key(COLLECTION_SCOPE, buyer.as_bytes());
        let minted = self.ticket_count(tx, buyer)? + 1;
        tx.put(CF_MINT_COUNTS, &collection_key, &minted)?;

        let event_key = pair_key(&id_key(event.event_id), buyer.as_bytes());
        let event_minted = self.event_mint_count(tx, event.event_id, buyer)? + 1;
        tx.put(CF_MINT_COUNTS, &event_key, &event_minted)?;

        tx.emit(Notification::TicketMinted {
            ticket_id,
            event_id: event.event_id,
            buyer: buyer.clone(),
            price: event.ticket_price,
        });

        tracing::info!(
            ticket_id,
            event_id = event.event_id,
            seat_number,
            buyer = %buyer,
            "Ticket minted"
        );

        Ok(ticket_id)
    }

    /// Retain `required` in the collection treasury and refund the rest
    fn settle_primary_payment(
        &self,
        tx: &mut StoreTx<'_>,
        buyer: &Address,
        event_id: EventId,
        required: Amount,
        paid: Amount,
    ) -> Result<()> {
        let excess = paid.checked_sub(required)?;

        tx.emit(Notification::PaymentReceived {
            buyer: buyer.clone(),
            amount: required,
            event_id,
        });
        payments::credit(tx, self.receiver.as_ref(), &self.collection, required)?;

        if !excess.is_zero() {
            payments::credit(tx, self.receiver.as_ref(), buyer, excess)?;
            tx.emit(Notification::RefundIssued {
                recipient: buyer.clone(),
                amount: excess,
            });
            tracing::info!(buyer = %buyer, refund = %excess, "Excess payment refunded");
        }

        Ok(())
    }

    /// Tickets minted by `buyer` in this collection
    pub fn ticket_count(&self, tx: &StoreTx<'_>, buyer: &Address) -> Result<u32> {
        let key = pair_key(COLLECTION_SCOPE, buyer.as_bytes());
        Ok(tx.get(CF_MINT_COUNTS, &key)?.unwrap_or(0))
    }

    /// Tickets minted by `buyer` for one event
    pub fn event_mint_count(
        &self,
        tx: &StoreTx<'_>,
        event_id: EventId,
        buyer: &Address,
    ) -> Result<u32> {
        let key = pair_key(&id_key(event_id), buyer.as_bytes());
        Ok(tx.get(CF_MINT_COUNTS, &key)?.unwrap_or(0))
    }

    // Redemption

    /// Redeem a ticket; succeeds exactly once per ticket
    pub fn verify_ticket(
        &self,
        tx: &mut StoreTx<'_>,
        caller: &Address,
        ticket_id: TicketId,
    ) -> Result<()> {
        let mut ticket = self.get_ticket(tx, ticket_id)?;
        if ticket.is_used || self.is_verified(tx, ticket_id)? {
            return Err(Error::TicketAlreadyUsed(ticket_id));
        }

        ticket.is_used = true;
        tx.put(CF_TICKETS, &id_key(ticket_id), &ticket)?;
        tx.put(CF_VERIFIED, &id_key(ticket_id), &true)?;

        tx.emit(Notification::TicketVerified {
            ticket_id,
            verifier: caller.clone(),
        });

        tracing::info!(ticket_id, verifier = %caller, "Ticket verified");
        Ok(())
    }

    /// Get ticket
    pub fn get_ticket(&self, tx: &StoreTx<'_>, ticket_id: TicketId) -> Result<Ticket> {
        tx.get(CF_TICKETS, &id_key(ticket_id))?
            .ok_or(Error::TicketNotFound(ticket_id))
    }

    /// Check redemption marker
    pub fn is_verified(&self, tx: &StoreTx<'_>, ticket_id: TicketId) -> Result<bool> {
        tx.contains(CF_VERIFIED, &id_key(ticket_id))
    }

    // Ownership

    /// Current owner
    pub fn owner_of(&self, tx: &StoreTx<'_>, ticket_id: TicketId) -> Result<Address> {
        tx.get(CF_OWNERS, &id_key(ticket_id))?
            .ok_or(Error::TicketNotFound(ticket_id))
    }

    /// Number of tickets held by `owner`
    pub fn balance_of(&self, tx: &StoreTx<'_>, owner: &Address) -> Result<u64> {
        Ok(tx.get(CF_HOLDINGS, owner.as_bytes())?.unwrap_or(0))
    }

    fn adjust_holdings(&self, tx: &mut StoreTx<'_>, owner: &Address, delta: i64) -> Result<()> {
        let held = self.balance_of(tx, owner)?;
        let updated = held.checked_add_signed(delta).ok_or_else(|| {
            Error::InvariantViolation(format!("holdings of {} out of range", owner))
        })?;
        tx.put(CF_HOLDINGS, owner.as_bytes(), &updated)
    }

    /// Approve `to` (or clear with `None`) to move one ticket
    pub fn approve(
        &self,
        tx: &mut StoreTx<'_>,
        caller: &Address,
        to: Option<Address>,
        ticket_id: TicketId,
    ) -> Result<()> {
        let owner = self.owner_of(tx, ticket_id)?;
        if to.as_ref() == Some(&owner) {
            return Err(Error::ApprovalToCurrentOwner);
        }
        if caller != &owner && !self.is_approved_for_all(tx, &owner, caller)? {
            return Err(Error::NotAuthorized);
        }

        match &to {
            Some(approved) => tx.put(CF_APPROVALS, &id_key(ticket_id), approved)?,
            None => tx.delete(CF_APPROVALS, &id_key(ticket_id)),
        }

        tx.emit(Notification::Approval {
            owner,
            approved: to,
            ticket_id,
        });
        Ok(())
    }

    /// Approved address for one ticket
    pub fn get_approved(&self, tx: &StoreTx<'_>, ticket_id: TicketId) -> Result<Option<Address>> {
        // Existence check
        self.owner_of(tx, ticket_id)?;
        tx.get(CF_APPROVALS, &id_key(ticket_id))
    }

    /// Grant or revoke `operator` over all of the caller's tickets
    pub fn set_approval_for_all(
        &self,
        tx: &mut StoreTx<'_>,
        caller: &Address,
        operator: &Address,
        approved: bool,
    ) -> Result<()> {
        if caller == operator {
            return Err(Error::ApprovalToCurrentOwner);
        }

        let key = pair_key(caller.as_bytes(), operator.as_bytes());
        if approved {
            tx.put(CF_OPERATORS, &key, &true)?;
        } else {
            tx.delete(CF_OPERATORS, &key);
        }

        tx.emit(Notification::ApprovalForAll {
            owner: caller.clone(),
            operator: operator.clone(),
            approved,
        });
        Ok(())
    }

    /// Check operator approval
    pub fn is_approved_for_all(
        &self,
        tx: &StoreTx<'_>,
        owner: &Address,
        operator: &Address,
    ) -> Result<bool> {
        tx.contains(CF_OPERATORS, &pair_key(owner.as_bytes(), operator.as_bytes()))
    }

    /// Capability check: may `spender` move `ticket_id`?
    pub fn is_approved_or_owner(
        &self,
        tx: &StoreTx<'_>,
        spender: &Address,
        ticket_id: TicketId,
    ) -> Result<bool> {
        let owner = self.owner_of(tx, ticket_id)?;
        if spender == &owner {
            return Ok(true);
        }
        if self.get_approved(tx, ticket_id)?.as_ref() == Some(spender) {
            return Ok(true);
        }
        self.is_approved_for_all(tx, &owner, spender)
    }

    /// Transfer policy of the ticket's event
    pub fn transfer_policy(&self, tx: &StoreTx<'_>, ticket_id: TicketId) -> Result<TransferPolicy> {
        let ticket = self.get_ticket(tx, ticket_id)?;
        let event = self.get_event(tx, ticket.event_id)?;
        Ok(TransferPolicy {
            restriction: event.transfer_restriction(),
            max_transfer_price: event.max_transfer_price,
        })
    }

    /// Move a ticket from `from` to `to` on behalf of `caller`
    pub fn transfer_from(
        &self,
        tx: &mut StoreTx<'_>,
        caller: &Address,
        from: &Address,
        to: &Address,
        ticket_id: TicketId,
    ) -> Result<()> {
        if to.is_empty() {
            return Err(Error::InvalidRecipient);
        }
        let owner = self.owner_of(tx, ticket_id)?;
        if &owner != from {
            return Err(Error::NotTokenOwner);
        }
        if !self.is_approved_or_owner(tx, caller, ticket_id)? {
            return Err(Error::NotAuthorized);
        }
        if self.transfer_policy(tx, ticket_id)?.restriction == TransferRestriction::NoTransfer {
            return Err(Error::TransferNotAllowed(ticket_id));
        }

        tx.delete(CF_APPROVALS, &id_key(ticket_id));
        self.adjust_holdings(tx, from, -1)?;
        self.adjust_holdings(tx, to, 1)?;
        tx.put(CF_OWNERS, &id_key(ticket_id), to)?;

        tx.emit(Notification::TicketTransferred {
            ticket_id,
            from: from.clone(),
            to: to.clone(),
        });

        tracing::info!(ticket_id, from = %from, to = %to, "Ticket transferred");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::{AcceptAll, DenyList};
    use crate::storage::Storage;
    use crate::Config;
    use chrono::Duration;
    use tempfile::TempDir;

    struct Fixture {
        storage: Storage,
        ledger: TicketLedger,
        _temp: TempDir,
    }

    fn fixture_with(receiver: Arc<dyn ValueReceiver>) -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;

        Fixture {
            storage: Storage::open(&config).unwrap(),
            ledger: TicketLedger::new(&config.ledger, receiver),
            _temp: temp_dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(AcceptAll))
    }

    fn ether(value: &str) -> Amount {
        Amount::from_ether(value).unwrap()
    }

    fn new_event(max_supply: u32, transferable: bool) -> NewEvent {
        NewEvent {
            name: "Test Event".to_string(),
            description: "Test Description".to_string(),
            date: Utc::now() + Duration::days(30),
            venue: "Test Venue".to_string(),
            max_supply,
            ticket_price: ether("0.1"),
            max_transfer_price: ether("0.15"),
            transferable,
        }
    }

    fn organizer() -> Address {
        Address::new("organizer")
    }

    fn create_event(fx: &Fixture, max_supply: u32, transferable: bool) -> EventId {
        let mut tx = fx.storage.begin();
        let id = fx
            .ledger
            .create_event(&mut tx, &organizer(), new_event(max_supply, transferable), Utc::now())
            .unwrap();
        tx.commit().unwrap();
        id
    }

    fn mint(fx: &Fixture, buyer: &Address, event_id: EventId, paid: Amount) -> Result<TicketId> {
        let mut tx = fx.storage.begin();
        let id = fx
            .ledger
            .mint_ticket(&mut tx, buyer, event_id, 1, "QR_CODE_123".to_string(), paid)?;
        tx.commit()?;
        Ok(id)
    }

    #[test]
    fn test_create_event_assigns_sequential_ids() {
        let fx = fixture();
        assert_eq!(create_event(&fx, 100, true), 1);
        assert_eq!(create_event(&fx, 100, true), 2);

        let tx = fx.storage.begin();
        let event = fx.ledger.get_event(&tx, 1).unwrap();
        assert_eq!(event.organizer, organizer());
        assert_eq!(event.tickets_sold, 0);
        assert!(event.is_active);
    }

    #[test]
    fn test_create_event_rejects_past_date_and_zero_supply() {
        let fx = fixture();
        let mut tx = fx.storage.begin();

        let mut params = new_event(10, true);
        params.date = Utc::now() - Duration::hours(1);
        let result = fx.ledger.create_event(&mut tx, &organizer(), params, Utc::now());
        assert!(matches!(result, Err(Error::EventDateNotInFuture)));

        let result = fx
            .ledger
            .create_event(&mut tx, &organizer(), new_event(0, true), Utc::now());
        assert!(matches!(result, Err(Error::ZeroSupply)));
    }

    #[test]
    fn test_mint_with_exact_payment() {
        let fx = fixture();
        let event_id = create_event(&fx, 100, true);
        let buyer = Address::new("buyer1");

        let ticket_id = mint(&fx, &buyer, event_id, ether("0.1")).unwrap();
        assert_eq!(ticket_id, 1);

        let tx = fx.storage.begin();
        assert_eq!(fx.ledger.owner_of(&tx, ticket_id).unwrap(), buyer);
        assert!(!fx.ledger.get_ticket(&tx, ticket_id).unwrap().is_used);
        assert_eq!(fx.ledger.ticket_count(&tx, &buyer).unwrap(), 1);
        assert_eq!(fx.ledger.event_mint_count(&tx, event_id, &buyer).unwrap(), 1);
        assert_eq!(fx.ledger.balance_of(&tx, &buyer).unwrap(), 1);
        assert_eq!(fx.ledger.get_event(&tx, event_id).unwrap().tickets_sold, 1);
        assert_eq!(payments::balance(&tx, fx.ledger.collection()).unwrap(), ether("0.1"));
        assert_eq!(payments::balance(&tx, &buyer).unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_mint_refunds_excess() {
        let fx = fixture();
        let event_id = create_event(&fx, 100, true);
        let buyer = Address::new("buyer1");

        let mut tx = fx.storage.begin();
        fx.ledger
            .mint_ticket(&mut tx, &buyer, event_id, 1, "QR".to_string(), ether("0.15"))
            .unwrap();

        assert!(tx.pending_notifications().contains(&Notification::RefundIssued {
            recipient: buyer.clone(),
            amount: ether("0.05"),
        }));
        assert_eq!(payments::balance(&tx, &buyer).unwrap(), ether("0.05"));
        assert_eq!(payments::balance(&tx, fx.ledger.collection()).unwrap(), ether("0.1"));
    }

    #[test]
    fn test_mint_insufficient_payment() {
        let fx = fixture();
        let event_id = create_event(&fx, 100, true);

        let result = mint(&fx, &Address::new("buyer1"), event_id, ether("0.05"));
        assert!(matches!(result, Err(Error::InsufficientPayment { .. })));
    }

    #[test]
    fn test_mint_sold_out() {
        let fx = fixture();
        let event_id = create_event(&fx, 1, true);

        mint(&fx, &Address::new("buyer1"), event_id, ether("0.1")).unwrap();
        let result = mint(&fx, &Address::new("buyer2"), event_id, ether("0.1"));
        assert!(matches!(result, Err(Error::SoldOut(id)) if id == event_id));

        let tx = fx.storage.begin();
        assert_eq!(fx.ledger.get_event(&tx, event_id).unwrap().tickets_sold, 1);
    }

    #[test]
    fn test_mint_enforces_per_address_limit() {
        let fx = fixture();
        let event_id = create_event(&fx, 100, true);
        let buyer = Address::new("buyer1");

        for _ in 0..10 {
            mint(&fx, &buyer, event_id, ether("0.1")).unwrap();
        }

        let result = mint(&fx, &buyer, event_id, ether("0.1"));
        assert!(matches!(result, Err(Error::TicketLimitExceeded { limit: 10 })));
    }

    #[test]
    fn test_mint_unknown_and_inactive_event() {
        let fx = fixture();
        let result = mint(&fx, &Address::new("buyer1"), 42, ether("0.1"));
        assert!(matches!(result, Err(Error::EventNotFound(42))));

        let event_id = create_event(&fx, 10, true);
        let mut tx = fx.storage.begin();
        assert!(matches!(
            fx.ledger.deactivate_event(&mut tx, &Address::new("mallory"), event_id),
            Err(Error::NotOrganizer)
        ));
        fx.ledger.deactivate_event(&mut tx, &organizer(), event_id).unwrap();
        tx.commit().unwrap();

        let result = mint(&fx, &Address::new("buyer1"), event_id, ether("0.1"));
        assert!(matches!(result, Err(Error::EventNotActive(_))));
    }

    #[test]
    fn test_refund_rejection_rolls_back_mint() {
        let deny = Arc::new(DenyList::new());
        let fx = fixture_with(deny.clone());
        let event_id = create_event(&fx, 10, true);
        let buyer = Address::new("buyer1");
        deny.deny(buyer.clone());

        let result = mint(&fx, &buyer, event_id, ether("0.2"));
        assert!(matches!(result, Err(Error::PaymentRejected(_))));

        let tx = fx.storage.begin();
        assert_eq!(fx.ledger.get_event(&tx, event_id).unwrap().tickets_sold, 0);
        assert!(matches!(fx.ledger.owner_of(&tx, 1), Err(Error::TicketNotFound(1))));
        assert_eq!(fx.ledger.ticket_count(&tx, &buyer).unwrap(), 0);
        assert_eq!(payments::balance(&tx, fx.ledger.collection()).unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_batch_mint() {
        let fx = fixture();
        let event_id = create_event(&fx, 100, true);
        let buyer = Address::new("buyer1");

        let mut tx = fx.storage.begin();
        let ids = fx
            .ledger
            .mint_tickets_batch(&mut tx, &buyer, event_id, &[1, 2, 3], ether("0.3"))
            .unwrap();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(tx.pending_notifications().contains(&Notification::PaymentReceived {
            buyer: buyer.clone(),
            amount: ether("0.3"),
            event_id,
        }));
        tx.commit().unwrap();

        let tx = fx.storage.begin();
        assert_eq!(fx.ledger.ticket_count(&tx, &buyer).unwrap(), 3);
        assert_eq!(fx.ledger.get_ticket(&tx, 2).unwrap().seat_number, 2);
    }

    #[test]
    fn test_batch_mint_is_all_or_nothing() {
        let fx = fixture();
        let event_id = create_event(&fx, 2, true);
        let buyer = Address::new("buyer1");

        let mut tx = fx.storage.begin();
        let result =
            fx.ledger
                .mint_tickets_batch(&mut tx, &buyer, event_id, &[1, 2, 3], ether("0.3"));
        assert!(matches!(result, Err(Error::SoldOut(_))));
        drop(tx);

        let mut tx = fx.storage.begin();
        let result = fx
            .ledger
            .mint_tickets_batch(&mut tx, &buyer, event_id, &[1, 2], ether("0.1"));
        assert!(matches!(result, Err(Error::InsufficientPayment { .. })));

        let result = fx
            .ledger
            .mint_tickets_batch(&mut tx, &buyer, event_id, &[], ether("0.1"));
        assert!(matches!(result, Err(Error::NoSeatsRequested)));

        assert_eq!(fx.ledger.get_event(&tx, event_id).unwrap().tickets_sold, 0);
    }

    #[test]
    fn test_batch_mint_crossing_limit_mints_nothing() {
        let fx = fixture();
        let event_id = create_event(&fx, 100, true);
        let buyer = Address::new("buyer1");

        for _ in 0..8 {
            mint(&fx, &buyer, event_id, ether("0.1")).unwrap();
        }

        let mut tx = fx.storage.begin();
        let result =
            fx.ledger
                .mint_tickets_batch(&mut tx, &buyer, event_id, &[1, 2, 3], ether("0.3"));
        assert!(matches!(result, Err(Error::TicketLimitExceeded { limit: 10 })));
        assert!(!tx
            .pending_notifications()
            .iter()
            .any(|n| matches!(n, Notification::TicketMinted { .. })));
        drop(tx);

        let tx = fx.storage.begin();
        assert_eq!(fx.ledger.get_event(&tx, event_id).unwrap().tickets_sold, 8);
        assert_eq!(fx.ledger.ticket_count(&tx, &buyer).unwrap(), 8);
        assert_eq!(fx.ledger.balance_of(&tx, &buyer).unwrap(), 8);
        assert_eq!(payments::balance(&tx, fx.ledger.collection()).unwrap(), ether("0.8"));
    }

    #[test]
    fn test_null_address_cannot_receive_tickets() {
        let fx = fixture();
        let event_id = create_event(&fx, 10, true);
        let nobody = Address::new("");

        let result = mint(&fx, &nobody, event_id, ether("0.1"));
        assert!(matches!(result, Err(Error::InvalidRecipient)));

        let mut tx = fx.storage.begin();
        let result = fx
            .ledger
            .mint_tickets_batch(&mut tx, &nobody, event_id, &[1, 2], ether("0.2"));
        assert!(matches!(result, Err(Error::InvalidRecipient)));
        drop(tx);

        let alice = Address::new("alice");
        let ticket_id = mint(&fx, &alice, event_id, ether("0.1")).unwrap();
        let mut tx = fx.storage.begin();
        let result = fx
            .ledger
            .transfer_from(&mut tx, &alice, &alice, &nobody, ticket_id);
        assert!(matches!(result, Err(Error::InvalidRecipient)));
        assert_eq!(fx.ledger.owner_of(&tx, ticket_id).unwrap(), alice);
        assert_eq!(fx.ledger.get_event(&tx, event_id).unwrap().tickets_sold, 1);
    }

    #[test]
    fn test_verify_exactly_once() {
        let fx = fixture();
        let event_id = create_event(&fx, 10, true);
        let ticket_id = mint(&fx, &Address::new("buyer1"), event_id, ether("0.1")).unwrap();
        let scanner = Address::new("gate-1");

        let mut tx = fx.storage.begin();
        fx.ledger.verify_ticket(&mut tx, &scanner, ticket_id).unwrap();
        tx.commit().unwrap();

        let mut tx = fx.storage.begin();
        assert!(fx.ledger.get_ticket(&tx, ticket_id).unwrap().is_used);
        assert!(fx.ledger.is_verified(&tx, ticket_id).unwrap());
        assert!(matches!(
            fx.ledger.verify_ticket(&mut tx, &scanner, ticket_id),
            Err(Error::TicketAlreadyUsed(_))
        ));
        assert!(matches!(
            fx.ledger.verify_ticket(&mut tx, &scanner, 99),
            Err(Error::TicketNotFound(99))
        ));
    }

    #[test]
    fn test_transfer_under_open_policy() {
        let fx = fixture();
        let event_id = create_event(&fx, 10, true);
        let alice = Address::new("alice");
        let bob = Address::new("bob");
        let ticket_id = mint(&fx, &alice, event_id, ether("0.1")).unwrap();

        let mut tx = fx.storage.begin();
        assert!(matches!(
            fx.ledger.transfer_from(&mut tx, &bob, &alice, &bob, ticket_id),
            Err(Error::NotAuthorized)
        ));
        fx.ledger
            .transfer_from(&mut tx, &alice, &alice, &bob, ticket_id)
            .unwrap();
        tx.commit().unwrap();

        let tx = fx.storage.begin();
        let ticket = fx.ledger.get_ticket(&tx, ticket_id).unwrap();
        assert_eq!(fx.ledger.owner_of(&tx, ticket_id).unwrap(), bob);
        assert_eq!(ticket.original_buyer, alice);
        assert_eq!(ticket.event_id, event_id);
        assert_eq!(fx.ledger.balance_of(&tx, &alice).unwrap(), 0);
        assert_eq!(fx.ledger.balance_of(&tx, &bob).unwrap(), 1);
    }

    #[test]
    fn test_transfer_rejected_under_no_transfer_policy() {
        let fx = fixture();
        let event_id = create_event(&fx, 10, false);
        let alice = Address::new("alice");
        let ticket_id = mint(&fx, &alice, event_id, ether("0.1")).unwrap();

        let mut tx = fx.storage.begin();
        let result = fx
            .ledger
            .transfer_from(&mut tx, &alice, &alice, &Address::new("bob"), ticket_id);
        assert!(matches!(result, Err(Error::TransferNotAllowed(_))));
        assert_eq!(fx.ledger.owner_of(&tx, ticket_id).unwrap(), alice);
    }

    #[test]
    fn test_approvals() {
        let fx = fixture();
        let event_id = create_event(&fx, 10, true);
        let alice = Address::new("alice");
        let market = Address::new("market");
        let carol = Address::new("carol");
        let ticket_id = mint(&fx, &alice, event_id, ether("0.1")).unwrap();

        let mut tx = fx.storage.begin();
        assert!(matches!(
            fx.ledger.approve(&mut tx, &market, Some(market.clone()), ticket_id),
            Err(Error::NotAuthorized)
        ));
        assert!(matches!(
            fx.ledger.approve(&mut tx, &alice, Some(alice.clone()), ticket_id),
            Err(Error::ApprovalToCurrentOwner)
        ));

        fx.ledger
            .approve(&mut tx, &alice, Some(market.clone()), ticket_id)
            .unwrap();
        assert!(fx.ledger.is_approved_or_owner(&tx, &market, ticket_id).unwrap());
        assert!(!fx.ledger.is_approved_or_owner(&tx, &carol, ticket_id).unwrap());

        fx.ledger
            .set_approval_for_all(&mut tx, &alice, &carol, true)
            .unwrap();
        assert!(fx.ledger.is_approved_or_owner(&tx, &carol, ticket_id).unwrap());

        // Transfer by the approved address clears the single-token approval
        fx.ledger
            .transfer_from(&mut tx, &market, &alice, &carol, ticket_id)
            .unwrap();
        assert_eq!(fx.ledger.get_approved(&tx, ticket_id).unwrap(), None);
        assert_eq!(fx.ledger.owner_of(&tx, ticket_id).unwrap(), carol);
    }
}
