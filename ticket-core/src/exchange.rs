//! Ticket exchange: the high-level API
//!
//! Ties together storage, the ledger, the marketplace and the actor. Every
//! call is one message to the single-writer actor, so calls are linearized
//! and each mutating call either commits entirely or leaves no trace.
//!
//! # Example
//!
//! ```no_run
//! use ticket_core::{Address, Amount, Config, Exchange, NewEvent};
//!
//! #[tokio::main]
//! async fn main() -> ticket_core::Result<()> {
//!     let exchange = Exchange::open(Config::default()).await?;
//!
//!     let organizer = Address::new("organizer");
//!     let event_id = exchange
//!         .create_event(&organizer, NewEvent {
//!             name: "Concert".to_string(),
//!             description: "Live".to_string(),
//!             date: chrono::Utc::now() + chrono::Duration::days(30),
//!             venue: "Arena".to_string(),
//!             max_supply: 100,
//!             ticket_price: Amount::from_ether("0.1")?,
//!             max_transfer_price: Amount::ZERO,
//!             transferable: true,
//!         })
//!         .await?;
//!
//!     let buyer = Address::new("buyer");
//!     exchange
//!         .mint_ticket(&buyer, event_id, 1, "QR_CODE_123", Amount::from_ether("0.1")?)
//!         .await?;
//!
//!     exchange.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_exchange_actor, ExchangeHandle, ExchangeMessage},
    ledger::{TicketLedger, TransferPolicy},
    marketplace::{Marketplace, SaleReceipt},
    metrics::Metrics,
    notifications::NotificationRecord,
    payments::{self, AcceptAll, ValueReceiver},
    storage::Storage,
    types::{
        Address, Amount, Event, EventId, Listing, ListingId, NewEvent, RoyaltyInfo, Ticket,
        TicketId,
    },
    Config, Error, Result,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Ticket exchange interface
#[derive(Clone)]
pub struct Exchange {
    /// Actor handle
    handle: ExchangeHandle,

    /// Committed notification fan-out
    notifications: broadcast::Sender<NotificationRecord>,

    /// Metrics
    metrics: Metrics,

    /// Collection identity
    collection: Address,

    /// Identity sellers approve
    marketplace_address: Address,

    /// Platform fee recipient
    fee_recipient: Address,
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("collection", &self.collection)
            .field("marketplace_address", &self.marketplace_address)
            .finish()
    }
}

impl Exchange {
    /// Open exchange with configuration
    pub async fn open(config: Config) -> Result<Self> {
        Self::open_with_receiver(config, Arc::new(AcceptAll)).await
    }

    /// Open exchange with a custom value receiver hook
    pub async fn open_with_receiver(
        config: Config,
        receiver: Arc<dyn ValueReceiver>,
    ) -> Result<Self> {
        config.validate()?;

        // Open storage
        let storage = Storage::open(&config)?;

        let ledger = TicketLedger::new(&config.ledger, receiver.clone());
        let market = Marketplace::new(&config.marketplace, ledger.clone(), receiver);
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;
        let (notifications, _) = broadcast::channel(config.actor.notification_buffer);

        // Spawn actor
        let handle = spawn_exchange_actor(
            storage,
            ledger,
            market,
            metrics.clone(),
            notifications.clone(),
            config.actor.mailbox_capacity,
        );

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            collection = %config.ledger.collection,
            marketplace = %config.marketplace.address,
            "Ticket exchange opened"
        );

        Ok(Self {
            handle,
            notifications,
            metrics,
            collection: config.ledger.collection,
            marketplace_address: config.marketplace.address,
            fee_recipient: config.marketplace.fee_recipient,
        })
    }

    /// Collection identity
    pub fn collection(&self) -> &Address {
        &self.collection
    }

    /// Identity sellers must approve before listing
    pub fn marketplace_address(&self) -> &Address {
        &self.marketplace_address
    }

    /// Platform fee recipient
    pub fn fee_recipient(&self) -> &Address {
        &self.fee_recipient
    }

    /// Metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Subscribe to committed notifications
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationRecord> {
        self.notifications.subscribe()
    }

    /// Committed notifications as a stream
    pub fn notification_stream(&self) -> BroadcastStream<NotificationRecord> {
        BroadcastStream::new(self.subscribe())
    }

    // Ledger operations

    /// Create an event organized by `caller`
    pub async fn create_event(&self, caller: &Address, params: NewEvent) -> Result<EventId> {
        self.handle
            .request(|response| ExchangeMessage::CreateEvent {
                caller: caller.clone(),
                params,
                response,
            })
            .await
    }

    /// Close an event for minting (organizer only)
    pub async fn deactivate_event(&self, caller: &Address, event_id: EventId) -> Result<()> {
        self.handle
            .request(|response| ExchangeMessage::DeactivateEvent {
                caller: caller.clone(),
                event_id,
                response,
            })
            .await
    }

    /// Mint one ticket; any excess over the price is refunded
    pub async fn mint_ticket(
        &self,
        caller: &Address,
        event_id: EventId,
        seat_number: u32,
        redemption_code: impl Into<String>,
        paid: Amount,
    ) -> Result<TicketId> {
        let redemption_code = redemption_code.into();
        self.handle
            .request(|response| ExchangeMessage::MintTicket {
                caller: caller.clone(),
                event_id,
                seat_number,
                redemption_code,
                paid,
                response,
            })
            .await
    }

    /// Mint one ticket per seat against one payment
    pub async fn mint_tickets_batch(
        &self,
        caller: &Address,
        event_id: EventId,
        seat_numbers: Vec<u32>,
        paid: Amount,
    ) -> Result<Vec<TicketId>> {
        self.handle
            .request(|response| ExchangeMessage::MintTicketsBatch {
                caller: caller.clone(),
                event_id,
                seat_numbers,
                paid,
                response,
            })
            .await
    }

    /// Redeem a ticket (exactly once)
    pub async fn verify_ticket(&self, caller: &Address, ticket_id: TicketId) -> Result<()> {
        self.handle
            .request(|response| ExchangeMessage::VerifyTicket {
                caller: caller.clone(),
                ticket_id,
                response,
            })
            .await
    }

    /// Move a ticket from `from` to `to`
    pub async fn transfer_from(
        &self,
        caller: &Address,
        from: &Address,
        to: &Address,
        ticket_id: TicketId,
    ) -> Result<()> {
        self.handle
            .request(|response| ExchangeMessage::TransferFrom {
                caller: caller.clone(),
                from: from.clone(),
                to: to.clone(),
                ticket_id,
                response,
            })
            .await
    }

    /// Approve `to` for one ticket (`None` clears)
    pub async fn approve(
        &self,
        caller: &Address,
        to: Option<&Address>,
        ticket_id: TicketId,
    ) -> Result<()> {
        self.handle
            .request(|response| ExchangeMessage::Approve {
                caller: caller.clone(),
                to: to.cloned(),
                ticket_id,
                response,
            })
            .await
    }

    /// Grant or revoke an operator over all of the caller's tickets
    pub async fn set_approval_for_all(
        &self,
        caller: &Address,
        operator: &Address,
        approved: bool,
    ) -> Result<()> {
        self.handle
            .request(|response| ExchangeMessage::SetApprovalForAll {
                caller: caller.clone(),
                operator: operator.clone(),
                approved,
                response,
            })
            .await
    }

    // Marketplace operations

    /// List a ticket for sale
    pub async fn list_ticket(
        &self,
        caller: &Address,
        token_id: TicketId,
        price: Amount,
    ) -> Result<ListingId> {
        self.handle
            .request(|response| ExchangeMessage::ListTicket {
                caller: caller.clone(),
                token_id,
                price,
                response,
            })
            .await
    }

    /// Buy a listed ticket
    pub async fn buy_ticket(
        &self,
        caller: &Address,
        listing_id: ListingId,
        paid: Amount,
    ) -> Result<SaleReceipt> {
        self.handle
            .request(|response| ExchangeMessage::BuyTicket {
                caller: caller.clone(),
                listing_id,
                paid,
                response,
            })
            .await
    }

    /// Cancel a listing
    pub async fn cancel_listing(&self, caller: &Address, listing_id: ListingId) -> Result<()> {
        self.handle
            .request(|response| ExchangeMessage::CancelListing {
                caller: caller.clone(),
                listing_id,
                response,
            })
            .await
    }

    /// Set the royalty record of `collection` (administrator only)
    pub async fn set_royalty_info(
        &self,
        caller: &Address,
        collection: &Address,
        recipient: &Address,
        royalty_bps: u16,
    ) -> Result<()> {
        self.handle
            .request(|response| ExchangeMessage::SetRoyaltyInfo {
                caller: caller.clone(),
                collection: collection.clone(),
                recipient: recipient.clone(),
                royalty_bps,
                response,
            })
            .await
    }

    /// Replace the platform fee (administrator only)
    pub async fn set_platform_fee(&self, caller: &Address, fee_bps: u16) -> Result<()> {
        self.handle
            .request(|response| ExchangeMessage::SetPlatformFee {
                caller: caller.clone(),
                fee_bps,
                response,
            })
            .await
    }

    // Queries

    /// Get event
    pub async fn get_event(&self, event_id: EventId) -> Result<Event> {
        self.handle
            .read(move |tx, ledger, _| ledger.get_event(tx, event_id))
            .await
    }

    /// Get ticket
    pub async fn get_ticket(&self, ticket_id: TicketId) -> Result<Ticket> {
        self.handle
            .read(move |tx, ledger, _| ledger.get_ticket(tx, ticket_id))
            .await
    }

    /// Current owner of a ticket
    pub async fn owner_of(&self, ticket_id: TicketId) -> Result<Address> {
        self.handle
            .read(move |tx, ledger, _| ledger.owner_of(tx, ticket_id))
            .await
    }

    /// Tickets held by `owner`
    pub async fn balance_of(&self, owner: &Address) -> Result<u64> {
        let owner = owner.clone();
        self.handle
            .read(move |tx, ledger, _| ledger.balance_of(tx, &owner))
            .await
    }

    /// Approved address for a ticket
    pub async fn get_approved(&self, ticket_id: TicketId) -> Result<Option<Address>> {
        self.handle
            .read(move |tx, ledger, _| ledger.get_approved(tx, ticket_id))
            .await
    }

    /// Check operator approval
    pub async fn is_approved_for_all(&self, owner: &Address, operator: &Address) -> Result<bool> {
        let (owner, operator) = (owner.clone(), operator.clone());
        self.handle
            .read(move |tx, ledger, _| ledger.is_approved_for_all(tx, &owner, &operator))
            .await
    }

    /// Check whether `spender` may move a ticket
    pub async fn is_approved_or_owner(&self, spender: &Address, ticket_id: TicketId) -> Result<bool> {
        let spender = spender.clone();
        self.handle
            .read(move |tx, ledger, _| ledger.is_approved_or_owner(tx, &spender, ticket_id))
            .await
    }

    /// Check redemption marker
    pub async fn is_verified(&self, ticket_id: TicketId) -> Result<bool> {
        self.handle
            .read(move |tx, ledger, _| ledger.is_verified(tx, ticket_id))
            .await
    }

    /// Tickets minted by `buyer` in this collection
    pub async fn ticket_count(&self, buyer: &Address) -> Result<u32> {
        let buyer = buyer.clone();
        self.handle
            .read(move |tx, ledger, _| ledger.ticket_count(tx, &buyer))
            .await
    }

    /// Tickets minted by `buyer` for one event
    pub async fn event_mint_count(&self, event_id: EventId, buyer: &Address) -> Result<u32> {
        let buyer = buyer.clone();
        self.handle
            .read(move |tx, ledger, _| ledger.event_mint_count(tx, event_id, &buyer))
            .await
    }

    /// Transfer policy of a ticket
    pub async fn transfer_policy(&self, ticket_id: TicketId) -> Result<TransferPolicy> {
        self.handle
            .read(move |tx, ledger, _| ledger.transfer_policy(tx, ticket_id))
            .await
    }

    /// Get listing
    pub async fn get_listing(&self, listing_id: ListingId) -> Result<Listing> {
        self.handle
            .read(move |tx, _, market| market.get_listing(tx, listing_id))
            .await
    }

    /// Check if a ticket has an active listing
    pub async fn is_token_listed(&self, token_id: TicketId) -> Result<bool> {
        self.handle
            .read(move |tx, _, market| market.is_token_listed(tx, token_id))
            .await
    }

    /// Current platform fee (bps)
    pub async fn platform_fee(&self) -> Result<u16> {
        self.handle
            .read(|tx, _, market| market.platform_fee(tx))
            .await
    }

    /// Royalty record of `collection`
    pub async fn royalty_info(&self, collection: &Address) -> Result<Option<RoyaltyInfo>> {
        let collection = collection.clone();
        self.handle
            .read(move |tx, _, market| market.royalty_info(tx, &collection))
            .await
    }

    /// Withdrawable balance of `address`
    pub async fn balance(&self, address: &Address) -> Result<Amount> {
        let address = address.clone();
        self.handle
            .read(move |tx, _, _| payments::balance(tx, &address))
            .await
    }

    /// Replay committed notifications starting at `from_sequence`
    pub async fn notifications_since(
        &self,
        from_sequence: u64,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>> {
        self.handle
            .request(|response| ExchangeMessage::NotificationsSince {
                from_sequence,
                limit,
                response,
            })
            .await
    }

    /// Shutdown exchange (closes the store)
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await?;
        tracing::info!("Ticket exchange shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::Notification;
    use crate::payments::DenyList;
    use crate::types::TransferRestriction;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;
    use tokio_stream::StreamExt;

    fn test_config(temp_dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        config
    }

    async fn test_exchange() -> (Exchange, TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let exchange = Exchange::open(test_config(&temp_dir)).await.unwrap();
        (exchange, temp_dir)
    }

    fn ether(value: &str) -> Amount {
        Amount::from_ether(value).unwrap()
    }

    fn params(max_supply: u32, transferable: bool) -> NewEvent {
        NewEvent {
            name: "Test Event".to_string(),
            description: "Test Description".to_string(),
            date: Utc::now() + Duration::days(30),
            venue: "Test Venue".to_string(),
            max_supply,
            ticket_price: ether("0.1"),
            max_transfer_price: Amount::ZERO,
            transferable,
        }
    }

    fn organizer() -> Address {
        Address::new("organizer")
    }

    fn admin() -> Address {
        Address::new("marketplace-admin")
    }

    #[tokio::test]
    async fn test_open_refuses_invalid_config() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&temp_dir);
        config.actor.mailbox_capacity = 0;

        let result = Exchange::open(config).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_sold_out_scenario() {
        let (exchange, _temp) = test_exchange().await;
        let event_id = exchange.create_event(&organizer(), params(1, true)).await.unwrap();

        let buyer1 = Address::new("buyer1");
        let ticket_id = exchange
            .mint_ticket(&buyer1, event_id, 1, "QR_CODE_123", ether("0.1"))
            .await
            .unwrap();
        assert_eq!(exchange.owner_of(ticket_id).await.unwrap(), buyer1);
        assert!(!exchange.get_ticket(ticket_id).await.unwrap().is_used);

        let result = exchange
            .mint_ticket(&Address::new("buyer2"), event_id, 2, "QR_CODE_456", ether("0.1"))
            .await;
        assert!(matches!(result, Err(Error::SoldOut(_))));
        assert_eq!(result.unwrap_err().to_string(), "Sold out");

        assert_eq!(exchange.metrics().tickets_minted.get(), 1);
        assert_eq!(exchange.metrics().operation_count("mint_ticket", "precondition"), 1);

        exchange.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_refund_notification_scenario() {
        let (exchange, _temp) = test_exchange().await;
        let event_id = exchange.create_event(&organizer(), params(10, true)).await.unwrap();
        let mut notifications = exchange.subscribe();

        let buyer = Address::new("buyer1");
        exchange
            .mint_ticket(&buyer, event_id, 1, "QR", ether("0.15"))
            .await
            .unwrap();

        let mut names = Vec::new();
        let mut refund = None;
        for _ in 0..3 {
            let record = notifications.recv().await.unwrap();
            names.push(record.notification.name());
            if let Notification::RefundIssued { recipient, amount } = record.notification {
                refund = Some((recipient, amount));
            }
        }

        assert_eq!(names, vec!["TicketMinted", "PaymentReceived", "RefundIssued"]);
        assert_eq!(refund, Some((buyer.clone(), ether("0.05"))));
        assert_eq!(exchange.balance(&buyer).await.unwrap(), ether("0.05"));
        assert_eq!(exchange.balance(exchange.collection()).await.unwrap(), ether("0.1"));

        exchange.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_resale_scenario() {
        let (exchange, _temp) = test_exchange().await;
        let event_id = exchange.create_event(&organizer(), params(10, true)).await.unwrap();
        let seller = Address::new("seller");
        let buyer = Address::new("buyer");
        let artist = Address::new("artist");

        let ticket_id = exchange
            .mint_ticket(&seller, event_id, 7, "QR", ether("0.1"))
            .await
            .unwrap();

        let result = exchange.list_ticket(&seller, ticket_id, ether("0.12")).await;
        assert!(matches!(result, Err(Error::NotApproved)));

        exchange
            .approve(&seller, Some(exchange.marketplace_address()), ticket_id)
            .await
            .unwrap();
        let listing_id = exchange
            .list_ticket(&seller, ticket_id, ether("0.12"))
            .await
            .unwrap();
        assert!(exchange.is_token_listed(ticket_id).await.unwrap());

        let collection = exchange.collection().clone();
        exchange
            .set_royalty_info(&admin(), &collection, &artist, 500)
            .await
            .unwrap();
        assert_eq!(exchange.platform_fee().await.unwrap(), 250);

        let receipt = exchange
            .buy_ticket(&buyer, listing_id, ether("0.12"))
            .await
            .unwrap();
        assert_eq!(receipt.split.seller_amount, ether("0.111"));

        assert_eq!(exchange.owner_of(ticket_id).await.unwrap(), buyer);
        assert_eq!(exchange.balance(&seller).await.unwrap(), ether("0.111"));
        assert_eq!(exchange.balance(exchange.fee_recipient()).await.unwrap(), ether("0.003"));
        assert_eq!(exchange.balance(&artist).await.unwrap(), ether("0.006"));
        assert!(!exchange.get_listing(listing_id).await.unwrap().active);
        assert_eq!(exchange.get_approved(ticket_id).await.unwrap(), None);

        let result = exchange
            .buy_ticket(&Address::new("carol"), listing_id, ether("0.12"))
            .await;
        assert!(matches!(result, Err(Error::ListingNotActive(_))));

        assert_eq!(exchange.metrics().sales_total.get(), 1);
        exchange.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_non_transferable_tickets() {
        let (exchange, _temp) = test_exchange().await;
        let event_id = exchange.create_event(&organizer(), params(10, false)).await.unwrap();
        let holder = Address::new("holder");

        let ticket_id = exchange
            .mint_ticket(&holder, event_id, 1, "QR", ether("0.1"))
            .await
            .unwrap();
        assert_eq!(
            exchange.transfer_policy(ticket_id).await.unwrap().restriction,
            TransferRestriction::NoTransfer
        );

        let result = exchange
            .transfer_from(&holder, &holder, &Address::new("friend"), ticket_id)
            .await;
        assert!(matches!(result, Err(Error::TransferNotAllowed(_))));
        assert_eq!(exchange.owner_of(ticket_id).await.unwrap(), holder);

        exchange.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_and_notification_stream() {
        let (exchange, _temp) = test_exchange().await;
        let event_id = exchange.create_event(&organizer(), params(10, true)).await.unwrap();
        let ticket_id = exchange
            .mint_ticket(&Address::new("buyer"), event_id, 1, "QR", ether("0.1"))
            .await
            .unwrap();

        let mut stream = exchange.notification_stream();
        let gate = Address::new("gate-3");
        exchange.verify_ticket(&gate, ticket_id).await.unwrap();

        let record = stream.next().await.unwrap().unwrap();
        assert_eq!(
            record.notification,
            Notification::TicketVerified {
                ticket_id,
                verifier: gate.clone(),
            }
        );

        let result = exchange.verify_ticket(&gate, ticket_id).await;
        assert!(matches!(result, Err(Error::TicketAlreadyUsed(_))));
        assert!(exchange.is_verified(ticket_id).await.unwrap());

        exchange.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_refund_rolls_back_everything() {
        let temp_dir = tempfile::tempdir().unwrap();
        let deny = Arc::new(DenyList::new());
        let exchange = Exchange::open_with_receiver(test_config(&temp_dir), deny.clone())
            .await
            .unwrap();
        let event_id = exchange.create_event(&organizer(), params(10, true)).await.unwrap();

        let buyer = Address::new("contract-without-receive");
        deny.deny(buyer.clone());

        let before = exchange.notifications_since(1, 100).await.unwrap().len();
        let result = exchange
            .mint_ticket(&buyer, event_id, 1, "QR", ether("0.2"))
            .await;
        assert!(matches!(result, Err(Error::PaymentRejected(_))));

        assert_eq!(exchange.get_event(event_id).await.unwrap().tickets_sold, 0);
        assert_eq!(exchange.ticket_count(&buyer).await.unwrap(), 0);
        assert_eq!(exchange.balance(exchange.collection()).await.unwrap(), Amount::ZERO);
        assert_eq!(exchange.notifications_since(1, 100).await.unwrap().len(), before);

        // Exact payment needs no refund
        let ticket_id = exchange
            .mint_ticket(&buyer, event_id, 1, "QR", ether("0.1"))
            .await
            .unwrap();
        assert_eq!(ticket_id, 1);

        exchange.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let buyer = Address::new("buyer");

        let exchange = Exchange::open(test_config(&temp_dir)).await.unwrap();
        let event_id = exchange.create_event(&organizer(), params(10, true)).await.unwrap();
        let ticket_ids = exchange
            .mint_tickets_batch(&buyer, event_id, vec![1, 2], ether("0.2"))
            .await
            .unwrap();
        exchange.set_platform_fee(&admin(), 400).await.unwrap();
        exchange.shutdown().await.unwrap();

        let exchange = Exchange::open(test_config(&temp_dir)).await.unwrap();
        assert_eq!(exchange.owner_of(ticket_ids[1]).await.unwrap(), buyer);
        assert_eq!(exchange.balance_of(&buyer).await.unwrap(), 2);
        assert_eq!(exchange.ticket_count(&buyer).await.unwrap(), 2);
        assert_eq!(exchange.event_mint_count(event_id, &buyer).await.unwrap(), 2);
        assert_eq!(exchange.platform_fee().await.unwrap(), 400);

        // Counters continue, never reset
        let next_event = exchange.create_event(&organizer(), params(5, true)).await.unwrap();
        assert_eq!(next_event, event_id + 1);

        let log = exchange.notifications_since(1, 100).await.unwrap();
        assert_eq!(log.first().unwrap().notification.name(), "EventCreated");
        assert!(log.windows(2).all(|pair| pair[0].sequence + 1 == pair[1].sequence));

        exchange.shutdown().await.unwrap();
    }
}
