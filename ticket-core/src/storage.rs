//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `events` - Event records (key: event_id)
//! - `tickets` - Ticket records (key: ticket_id)
//! - `owners` - Ownership map (key: ticket_id)
//! - `approvals` - Single-token approvals (key: ticket_id)
//! - `operators` - Operator approvals (key: owner || operator)
//! - `verified` - Redemption markers (key: ticket_id)
//! - `holdings` - Tickets held per owner (key: owner)
//! - `mint_counts` - Mints per buyer, collection-wide and per event
//! - `listings` - Marketplace listings (key: listing_id)
//! - `active_listings` - Active listing per token (key: ticket_id)
//! - `royalties` - Royalty records (key: collection)
//! - `balances` - Withdrawable balances (key: address)
//! - `meta` - Counters and marketplace settings
//! - `notifications` - Committed notification log (key: sequence)
//!
//! # Transactions
//!
//! Every operation runs against a [`StoreTx`]. Reads see the transaction's own
//! writes, writes are buffered, and [`StoreTx::commit`] applies everything as
//! one `WriteBatch`. Dropping a transaction discards it.

use crate::{
    error::{Error, Result},
    notifications::{Notification, NotificationRecord},
    Config,
};
use chrono::Utc;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Column family names
pub(crate) const CF_EVENTS: &str = "events";
pub(crate) const CF_TICKETS: &str = "tickets";
pub(crate) const CF_OWNERS: &str = "owners";
pub(crate) const CF_APPROVALS: &str = "approvals";
pub(crate) const CF_OPERATORS: &str = "operators";
pub(crate) const CF_VERIFIED: &str = "verified";
pub(crate) const CF_HOLDINGS: &str = "holdings";
pub(crate) const CF_MINT_COUNTS: &str = "mint_counts";
pub(crate) const CF_LISTINGS: &str = "listings";
pub(crate) const CF_ACTIVE_LISTINGS: &str = "active_listings";
pub(crate) const CF_ROYALTIES: &str = "royalties";
pub(crate) const CF_BALANCES: &str = "balances";
pub(crate) const CF_META: &str = "meta";
pub(crate) const CF_NOTIFICATIONS: &str = "notifications";

const COLUMN_FAMILIES: [&str; 14] = [
    CF_EVENTS,
    CF_TICKETS,
    CF_OWNERS,
    CF_APPROVALS,
    CF_OPERATORS,
    CF_VERIFIED,
    CF_HOLDINGS,
    CF_MINT_COUNTS,
    CF_LISTINGS,
    CF_ACTIVE_LISTINGS,
    CF_ROYALTIES,
    CF_BALANCES,
    CF_META,
    CF_NOTIFICATIONS,
];

/// Counter keys in `meta`
pub(crate) const NEXT_EVENT_ID: &[u8] = b"next_event_id";
pub(crate) const NEXT_TICKET_ID: &[u8] = b"next_ticket_id";
pub(crate) const NEXT_LISTING_ID: &[u8] = b"next_listing_id";
const NEXT_NOTIFICATION_SEQ: &[u8] = b"next_notification_seq";

/// Key for a sequential identifier (big-endian keeps iteration ordered)
pub(crate) fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

/// Composite key: `len(left) || left || right`
pub(crate) fn pair_key(left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + left.len() + right.len());
    key.extend_from_slice(&(left.len() as u32).to_be_bytes());
    key.extend_from_slice(left);
    key.extend_from_slice(right);
    key
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
    sync_writes: bool,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name)))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(
            path = ?path,
            column_families = COLUMN_FAMILIES.len(),
            "Opened ticket store"
        );

        Ok(Self {
            db,
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    fn cf_options(name: &str) -> Options {
        let mut opts = Options::default();
        match name {
            // Append-only log, rarely read back
            CF_NOTIFICATIONS => {
                opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
            }
            // Point lookups on every transfer and listing
            CF_OWNERS | CF_APPROVALS | CF_ACTIVE_LISTINGS => {
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
                let mut block_opts = rocksdb::BlockBasedOptions::default();
                block_opts.set_bloom_filter(10.0, false);
                opts.set_block_based_table_factory(&block_opts);
            }
            _ => {
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
            }
        }
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    /// Get raw value
    pub fn get_raw(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(cf)?;
        Ok(self.db.get_cf(cf, key)?)
    }

    /// Get typed value
    pub fn get<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.get_raw(cf, key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Begin a transaction
    pub fn begin(&self) -> StoreTx<'_> {
        StoreTx {
            storage: self,
            writes: BTreeMap::new(),
            notifications: Vec::new(),
        }
    }

    /// Read committed notifications starting at `from_sequence`
    pub fn notifications_since(
        &self,
        from_sequence: u64,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>> {
        let cf = self.cf_handle(CF_NOTIFICATIONS)?;
        let start = from_sequence.to_be_bytes();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&start, Direction::Forward));

        let mut records = Vec::new();
        for item in iter.take(limit) {
            let (_, value) = item?;
            let record: NotificationRecord = serde_json::from_slice(&value)
                .map_err(|e| Error::Storage(format!("Corrupt notification record: {}", e)))?;
            records.push(record);
        }

        Ok(records)
    }

    fn apply(&self, writes: BTreeMap<(&'static str, Vec<u8>), Option<Vec<u8>>>) -> Result<()> {
        let mut batch = WriteBatch::default();

        for ((cf_name, key), value) in writes {
            let cf = self.cf_handle(cf_name)?;
            match value {
                Some(value) => batch.put_cf(cf, key, value),
                None => batch.delete_cf(cf, key),
            }
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);

        // Atomic commit
        self.db.write_opt(batch, &write_opts)?;
        Ok(())
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("Ticket store closed gracefully");
        Ok(())
    }
}

/// Buffered, all-or-nothing unit of work against [`Storage`]
pub struct StoreTx<'a> {
    storage: &'a Storage,
    writes: BTreeMap<(&'static str, Vec<u8>), Option<Vec<u8>>>,
    notifications: Vec<Notification>,
}

impl std::fmt::Debug for StoreTx<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreTx")
            .field("writes", &self.writes.len())
            .field("notifications", &self.notifications.len())
            .finish()
    }
}

impl<'a> StoreTx<'a> {
    /// Get typed value (own writes first, then committed state)
    pub fn get<T: DeserializeOwned>(&self, cf: &'static str, key: &[u8]) -> Result<Option<T>> {
        let bytes = match self.writes.get(&(cf, key.to_vec())) {
            Some(Some(bytes)) => Some(bytes.clone()),
            Some(None) => None,
            None => self.storage.get_raw(cf, key)?,
        };

        match bytes {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Check key presence
    pub fn contains(&self, cf: &'static str, key: &[u8]) -> Result<bool> {
        match self.writes.get(&(cf, key.to_vec())) {
            Some(value) => Ok(value.is_some()),
            None => Ok(self.storage.get_raw(cf, key)?.is_some()),
        }
    }

    /// Stage a put
    pub fn put<T: Serialize>(&mut self, cf: &'static str, key: &[u8], value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        self.writes.insert((cf, key.to_vec()), Some(bytes));
        Ok(())
    }

    /// Stage a delete
    pub fn delete(&mut self, cf: &'static str, key: &[u8]) {
        self.writes.insert((cf, key.to_vec()), None);
    }

    /// Allocate the next value of a sequential counter (seeded at 1)
    pub fn next_id(&mut self, counter: &[u8]) -> Result<u64> {
        let id = self.get::<u64>(CF_META, counter)?.unwrap_or(1);
        let next = id
            .checked_add(1)
            .ok_or_else(|| Error::InvariantViolation("identifier counter overflow".to_string()))?;
        self.put(CF_META, counter, &next)?;
        Ok(id)
    }

    /// Stage a notification
    pub fn emit(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    /// Staged notifications
    pub fn pending_notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Number of staged writes
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Apply all staged writes and notifications atomically
    pub fn commit(mut self) -> Result<Vec<NotificationRecord>> {
        let notifications = std::mem::take(&mut self.notifications);
        let mut records = Vec::with_capacity(notifications.len());

        if !notifications.is_empty() {
            let mut sequence = self.get::<u64>(CF_META, NEXT_NOTIFICATION_SEQ)?.unwrap_or(1);
            let recorded_at = Utc::now();

            for notification in notifications {
                let record = NotificationRecord {
                    sequence,
                    record_id: Uuid::now_v7(),
                    recorded_at,
                    notification,
                };
                let value = serde_json::to_vec(&record)
                    .map_err(|e| Error::Storage(format!("Notification encoding: {}", e)))?;
                self.writes
                    .insert((CF_NOTIFICATIONS, sequence.to_be_bytes().to_vec()), Some(value));
                records.push(record);
                sequence += 1;
            }

            self.put(CF_META, NEXT_NOTIFICATION_SEQ, &sequence)?;
        }

        if self.writes.is_empty() {
            return Ok(records);
        }

        let write_count = self.writes.len();
        self.storage.apply(std::mem::take(&mut self.writes))?;

        tracing::debug!(
            writes = write_count,
            notifications = records.len(),
            "Transaction committed"
        );

        Ok(records)
    }
}
