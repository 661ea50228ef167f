//! Actor-based concurrency for the ticket exchange
//!
//! Single-writer pattern using a Tokio actor:
//! - One task owns the store, so every operation is an exclusive transaction
//! - Reads travel through the same mailbox and are linearized with writes
//! - Bounded mailbox gives backpressure
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │              ExchangeHandle (Clone)                   │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              ExchangeActor (Single Task)              │
//! │  begin StoreTx → TicketLedger / Marketplace          │
//! │       Ok  → commit (one WriteBatch) → broadcast       │
//! │       Err → drop StoreTx (nothing written)            │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::{
    ledger::TicketLedger,
    marketplace::{Marketplace, SaleReceipt},
    metrics::Metrics,
    notifications::NotificationRecord,
    storage::{Storage, StoreTx},
    types::{Address, Amount, EventId, ListingId, NewEvent, TicketId},
    Error, Result,
};
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Read-only closure executed against a fresh transaction
pub type ReadFn = Box<dyn FnOnce(&StoreTx<'_>, &TicketLedger, &Marketplace) + Send>;

/// Message sent to the exchange actor
#[allow(missing_docs)]
pub enum ExchangeMessage {
    /// Create an event
    CreateEvent {
        caller: Address,
        params: NewEvent,
        response: oneshot::Sender<Result<EventId>>,
    },

    /// Close an event for minting
    DeactivateEvent {
        caller: Address,
        event_id: EventId,
        response: oneshot::Sender<Result<()>>,
    },

    /// Mint one ticket
    MintTicket {
        caller: Address,
        event_id: EventId,
        seat_number: u32,
        redemption_code: String,
        paid: Amount,
        response: oneshot::Sender<Result<TicketId>>,
    },

    /// Mint one ticket per seat
    MintTicketsBatch {
        caller: Address,
        event_id: EventId,
        seat_numbers: Vec<u32>,
        paid: Amount,
        response: oneshot::Sender<Result<Vec<TicketId>>>,
    },

    /// Redeem a ticket
    VerifyTicket {
        caller: Address,
        ticket_id: TicketId,
        response: oneshot::Sender<Result<()>>,
    },

    /// Move a ticket
    TransferFrom {
        caller: Address,
        from: Address,
        to: Address,
        ticket_id: TicketId,
        response: oneshot::Sender<Result<()>>,
    },

    /// Set or clear a single-token approval
    Approve {
        caller: Address,
        to: Option<Address>,
        ticket_id: TicketId,
        response: oneshot::Sender<Result<()>>,
    },

    /// Toggle an operator approval
    SetApprovalForAll {
        caller: Address,
        operator: Address,
        approved: bool,
        response: oneshot::Sender<Result<()>>,
    },

    /// List a ticket
    ListTicket {
        caller: Address,
        token_id: TicketId,
        price: Amount,
        response: oneshot::Sender<Result<ListingId>>,
    },

    /// Buy a listing
    BuyTicket {
        caller: Address,
        listing_id: ListingId,
        paid: Amount,
        response: oneshot::Sender<Result<SaleReceipt>>,
    },

    /// Cancel a listing
    CancelListing {
        caller: Address,
        listing_id: ListingId,
        response: oneshot::Sender<Result<()>>,
    },

    /// Upsert a royalty record
    SetRoyaltyInfo {
        caller: Address,
        collection: Address,
        recipient: Address,
        royalty_bps: u16,
        response: oneshot::Sender<Result<()>>,
    },

    /// Replace the platform fee
    SetPlatformFee {
        caller: Address,
        fee_bps: u16,
        response: oneshot::Sender<Result<()>>,
    },

    /// Run a query
    Read { read: ReadFn },

    /// Replay the notification log
    NotificationsSince {
        from_sequence: u64,
        limit: usize,
        response: oneshot::Sender<Result<Vec<NotificationRecord>>>,
    },

    /// Close the store and stop
    Shutdown { response: oneshot::Sender<Result<()>> },
}

impl ExchangeMessage {
    /// Operation name (metrics label)
    pub fn operation(&self) -> &'static str {
        match self {
            ExchangeMessage::CreateEvent { .. } => "create_event",
            ExchangeMessage::DeactivateEvent { .. } => "deactivate_event",
            ExchangeMessage::MintTicket { .. } => "mint_ticket",
            ExchangeMessage::MintTicketsBatch { .. } => "mint_tickets_batch",
            ExchangeMessage::VerifyTicket { .. } => "verify_ticket",
            ExchangeMessage::TransferFrom { .. } => "transfer_from",
            ExchangeMessage::Approve { .. } => "approve",
            ExchangeMessage::SetApprovalForAll { .. } => "set_approval_for_all",
            ExchangeMessage::ListTicket { .. } => "list_ticket",
            ExchangeMessage::BuyTicket { .. } => "buy_ticket",
            ExchangeMessage::CancelListing { .. } => "cancel_listing",
            ExchangeMessage::SetRoyaltyInfo { .. } => "set_royalty_info",
            ExchangeMessage::SetPlatformFee { .. } => "set_platform_fee",
            ExchangeMessage::Read { .. } => "read",
            ExchangeMessage::NotificationsSince { .. } => "notifications_since",
            ExchangeMessage::Shutdown { .. } => "shutdown",
        }
    }
}

impl std::fmt::Debug for ExchangeMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeMessage")
            .field("operation", &self.operation())
            .finish()
    }
}

/// Actor that processes exchange messages
pub struct ExchangeActor {
    storage: Storage,
    ledger: TicketLedger,
    market: Marketplace,
    metrics: Metrics,
    notifications: broadcast::Sender<NotificationRecord>,
    mailbox: mpsc::Receiver<ExchangeMessage>,
}

impl std::fmt::Debug for ExchangeActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeActor")
            .field("storage", &self.storage)
            .field("ledger", &self.ledger)
            .field("market", &self.market)
            .finish()
    }
}

impl ExchangeActor {
    /// Create new actor
    pub fn new(
        storage: Storage,
        ledger: TicketLedger,
        market: Marketplace,
        metrics: Metrics,
        notifications: broadcast::Sender<NotificationRecord>,
        mailbox: mpsc::Receiver<ExchangeMessage>,
    ) -> Self {
        Self {
            storage,
            ledger,
            market,
            metrics,
            notifications,
            mailbox,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let mut shutdown_response = None;

        while let Some(msg) = self.mailbox.recv().await {
            if let ExchangeMessage::Shutdown { response } = msg {
                shutdown_response = Some(response);
                break;
            }
            self.handle_message(msg);
        }

        // Release the database before acknowledging shutdown
        let Self { storage, .. } = self;
        let result = storage.close();
        if let Some(response) = shutdown_response {
            let _ = response.send(result);
        }

        tracing::info!("Exchange actor stopped");
    }

    /// Handle a single message
    fn handle_message(&self, msg: ExchangeMessage) {
        let operation = msg.operation();
        let ledger = &self.ledger;
        let market = &self.market;

        match msg {
            ExchangeMessage::CreateEvent {
                caller,
                params,
                response,
            } => {
                let result = self.execute(operation, |tx| {
                    ledger.create_event(tx, &caller, params, Utc::now())
                });
                let _ = response.send(result);
            }

            ExchangeMessage::DeactivateEvent {
                caller,
                event_id,
                response,
            } => {
                let result =
                    self.execute(operation, |tx| ledger.deactivate_event(tx, &caller, event_id));
                let _ = response.send(result);
            }

            ExchangeMessage::MintTicket {
                caller,
                event_id,
                seat_number,
                redemption_code,
                paid,
                response,
            } => {
                let result = self.execute(operation, |tx| {
                    ledger.mint_ticket(tx, &caller, event_id, seat_number, redemption_code, paid)
                });
                if result.is_ok() {
                    self.metrics.record_minted(1);
                }
                let _ = response.send(result);
            }

            ExchangeMessage::MintTicketsBatch {
                caller,
                event_id,
                seat_numbers,
                paid,
                response,
            } => {
                let result = self.execute(operation, |tx| {
                    ledger.mint_tickets_batch(tx, &caller, event_id, &seat_numbers, paid)
                });
                if let Ok(ticket_ids) = &result {
                    self.metrics.record_minted(ticket_ids.len());
                }
                let _ = response.send(result);
            }

            ExchangeMessage::VerifyTicket {
                caller,
                ticket_id,
                response,
            } => {
                let result =
                    self.execute(operation, |tx| ledger.verify_ticket(tx, &caller, ticket_id));
                let _ = response.send(result);
            }

            ExchangeMessage::TransferFrom {
                caller,
                from,
                to,
                ticket_id,
                response,
            } => {
                let result = self.execute(operation, |tx| {
                    ledger.transfer_from(tx, &caller, &from, &to, ticket_id)
                });
                let _ = response.send(result);
            }

            ExchangeMessage::Approve {
                caller,
                to,
                ticket_id,
                response,
            } => {
                let result =
                    self.execute(operation, |tx| ledger.approve(tx, &caller, to, ticket_id));
                let _ = response.send(result);
            }

            ExchangeMessage::SetApprovalForAll {
                caller,
                operator,
                approved,
                response,
            } => {
                let result = self.execute(operation, |tx| {
                    ledger.set_approval_for_all(tx, &caller, &operator, approved)
                });
                let _ = response.send(result);
            }

            ExchangeMessage::ListTicket {
                caller,
                token_id,
                price,
                response,
            } => {
                let result =
                    self.execute(operation, |tx| market.list_ticket(tx, &caller, token_id, price));
                let _ = response.send(result);
            }

            ExchangeMessage::BuyTicket {
                caller,
                listing_id,
                paid,
                response,
            } => {
                let result =
                    self.execute(operation, |tx| market.buy_ticket(tx, &caller, listing_id, paid));
                if let Ok(receipt) = &result {
                    self.metrics.record_sale(receipt.split.price);
                }
                let _ = response.send(result);
            }

            ExchangeMessage::CancelListing {
                caller,
                listing_id,
                response,
            } => {
                let result =
                    self.execute(operation, |tx| market.cancel_listing(tx, &caller, listing_id));
                let _ = response.send(result);
            }

            ExchangeMessage::SetRoyaltyInfo {
                caller,
                collection,
                recipient,
                royalty_bps,
                response,
            } => {
                let result = self.execute(operation, |tx| {
                    market.set_royalty_info(tx, &caller, &collection, &recipient, royalty_bps)
                });
                let _ = response.send(result);
            }

            ExchangeMessage::SetPlatformFee {
                caller,
                fee_bps,
                response,
            } => {
                let result =
                    self.execute(operation, |tx| market.set_platform_fee(tx, &caller, fee_bps));
                let _ = response.send(result);
            }

            ExchangeMessage::Read { read } => {
                let tx = self.storage.begin();
                read(&tx, ledger, market);
            }

            ExchangeMessage::NotificationsSince {
                from_sequence,
                limit,
                response,
            } => {
                let _ = response.send(self.storage.notifications_since(from_sequence, limit));
            }

            ExchangeMessage::Shutdown { .. } => {
                // Handled in run loop
            }
        }
    }

    /// Run `op` as one transaction: commit on `Ok`, discard on `Err`
    fn execute<T>(
        &self,
        operation: &'static str,
        op: impl FnOnce(&mut StoreTx<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut tx = self.storage.begin();

        let outcome = match op(&mut tx) {
            Ok(value) => tx.commit().map(|records| (value, records)),
            // Dropping the transaction discards its writes
            Err(e) => Err(e),
        };

        match outcome {
            Ok((value, records)) => {
                self.metrics.record_committed(operation);
                tracing::debug!(operation, notifications = records.len(), "Operation committed");

                for record in records {
                    // No subscribers is fine
                    let _ = self.notifications.send(record);
                }
                Ok(value)
            }
            Err(e) => {
                self.metrics.record_rejected(operation, e.kind());
                tracing::warn!(operation, kind = e.kind().as_str(), error = %e, "Operation rejected");
                Err(e)
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct ExchangeHandle {
    sender: mpsc::Sender<ExchangeMessage>,
}

impl ExchangeHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<ExchangeMessage>) -> Self {
        Self { sender }
    }

    /// Send a message built around a fresh reply channel and await the reply
    pub async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> ExchangeMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Run a query inside the actor
    pub async fn read<T, F>(&self, query: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&StoreTx<'_>, &TicketLedger, &Marketplace) -> Result<T> + Send + 'static,
    {
        self.request(move |response| {
            let read: ReadFn = Box::new(move |tx: &StoreTx<'_>, ledger: &TicketLedger, market: &Marketplace| {
                let _ = response.send(query(tx, ledger, market));
            });
            ExchangeMessage::Read { read }
        })
        .await
    }

    /// Stop the actor and close the store
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|response| ExchangeMessage::Shutdown { response })
            .await
    }
}

/// Spawn the exchange actor
pub fn spawn_exchange_actor(
    storage: Storage,
    ledger: TicketLedger,
    market: Marketplace,
    metrics: Metrics,
    notifications: broadcast::Sender<NotificationRecord>,
    mailbox_capacity: usize,
) -> ExchangeHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity);
    let actor = ExchangeActor::new(storage, ledger, market, metrics, notifications, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    ExchangeHandle::new(tx)
}
