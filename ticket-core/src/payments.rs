//! Value movements (mint proceeds, payouts, refunds)
//!
//! Every movement credits the recipient's withdrawable balance inside the
//! caller's [`StoreTx`]. Before crediting, the configured [`ValueReceiver`]
//! may refuse the funds; the refusal propagates as an error and the whole
//! transaction is dropped, taking every earlier mutation of the call with it.
//!
//! Callers perform all record mutations (flags, counters, ownership) before
//! the first movement. A receiver hook runs inside the actor that owns the
//! transaction, so it cannot start another operation until this one ends.

use crate::{
    storage::{StoreTx, CF_BALANCES},
    types::{Address, Amount},
    Error, Result,
};
use parking_lot::RwLock;
use std::collections::HashSet;

/// Hook consulted before a recipient is credited
pub trait ValueReceiver: Send + Sync {
    /// Accept or refuse `amount` for `recipient`
    fn on_receive(&self, recipient: &Address, amount: Amount) -> Result<()>;
}

/// Accepts every credit
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl ValueReceiver for AcceptAll {
    fn on_receive(&self, _recipient: &Address, _amount: Amount) -> Result<()> {
        Ok(())
    }
}

/// Refuses credits to listed recipients (e.g. accounts that cannot hold funds)
#[derive(Debug, Default)]
pub struct DenyList {
    denied: RwLock<HashSet<Address>>,
}

impl DenyList {
    /// Create empty deny list
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse future credits to `recipient`
    pub fn deny(&self, recipient: Address) {
        self.denied.write().insert(recipient);
    }

    /// Accept credits to `recipient` again
    pub fn allow(&self, recipient: &Address) {
        self.denied.write().remove(recipient);
    }

    /// Check if `recipient` is refused
    pub fn is_denied(&self, recipient: &Address) -> bool {
        self.denied.read().contains(recipient)
    }
}

impl ValueReceiver for DenyList {
    fn on_receive(&self, recipient: &Address, _amount: Amount) -> Result<()> {
        if self.is_denied(recipient) {
            return Err(Error::PaymentRejected(recipient.clone()));
        }
        Ok(())
    }
}

/// Withdrawable balance of `address`
pub fn balance(tx: &StoreTx<'_>, address: &Address) -> Result<Amount> {
    Ok(tx
        .get::<Amount>(CF_BALANCES, address.as_bytes())?
        .unwrap_or(Amount::ZERO))
}

/// Move `amount` to `recipient`; zero amounts are skipped
pub fn credit(
    tx: &mut StoreTx<'_>,
    receiver: &dyn ValueReceiver,
    recipient: &Address,
    amount: Amount,
) -> Result<()> {
    if amount.is_zero() {
        return Ok(());
    }

    receiver.on_receive(recipient, amount)?;

    let updated = balance(tx, recipient)?.checked_add(amount)?;
    tx.put(CF_BALANCES, recipient.as_bytes(), &updated)?;

    tracing::debug!(recipient = %recipient, amount = %amount, "Value credited");

    Ok(())
}
