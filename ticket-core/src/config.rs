//! Configuration for the ticket ledger and marketplace

use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Maximum platform fee / royalty (10%)
pub const MAX_FEE_BPS: u16 = 1_000;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Ticket ledger configuration
    pub ledger: LedgerConfig,

    /// Marketplace configuration
    pub marketplace: MarketplaceConfig,

    /// Actor configuration
    pub actor: ActorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/tickets"),
            service_name: "ticket-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            rocksdb: RocksDBConfig::default(),
            ledger: LedgerConfig::default(),
            marketplace: MarketplaceConfig::default(),
            actor: ActorConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Fsync every committed operation
    pub sync_writes: bool,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            sync_writes: true,
            enable_statistics: false,
        }
    }
}

/// Ticket ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Collection identity (royalties are keyed by it; mint proceeds accrue to it)
    pub collection: Address,

    /// Tickets one address may mint in this collection
    pub max_tickets_per_address: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            collection: Address::new("ticket-collection"),
            max_tickets_per_address: 10,
        }
    }
}

/// Marketplace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceConfig {
    /// Identity sellers must approve for transfers
    pub address: Address,

    /// Privileged administrator (fees, royalties, cancellation)
    pub administrator: Address,

    /// Platform fee recipient
    pub fee_recipient: Address,

    /// Initial platform fee (bps); later changes are persisted
    pub platform_fee_bps: u16,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            address: Address::new("ticket-marketplace"),
            administrator: Address::new("marketplace-admin"),
            fee_recipient: Address::new("marketplace-fees"),
            platform_fee_bps: 250, // 2.5%
        }
    }
}

/// Actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Bounded mailbox capacity (backpressure)
    pub mailbox_capacity: usize,

    /// Notification broadcast buffer
    pub notification_buffer: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
            notification_buffer: 1024,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("TICKET_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(collection) = std::env::var("TICKET_COLLECTION") {
            config.ledger.collection = Address::new(collection);
        }

        if let Ok(limit) = std::env::var("TICKET_MAX_PER_ADDRESS") {
            config.ledger.max_tickets_per_address = limit
                .parse()
                .map_err(|e| crate::Error::Config(format!("TICKET_MAX_PER_ADDRESS: {}", e)))?;
        }

        if let Ok(address) = std::env::var("TICKET_MARKETPLACE_ADDRESS") {
            config.marketplace.address = Address::new(address);
        }

        if let Ok(admin) = std::env::var("TICKET_MARKETPLACE_ADMIN") {
            config.marketplace.administrator = Address::new(admin);
        }

        if let Ok(recipient) = std::env::var("TICKET_FEE_RECIPIENT") {
            config.marketplace.fee_recipient = Address::new(recipient);
        }

        if let Ok(fee) = std::env::var("TICKET_PLATFORM_FEE_BPS") {
            config.marketplace.platform_fee_bps = fee
                .parse()
                .map_err(|e| crate::Error::Config(format!("TICKET_PLATFORM_FEE_BPS: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the core cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.marketplace.platform_fee_bps > MAX_FEE_BPS {
            return Err(crate::Error::Config(format!(
                "platform_fee_bps {} exceeds {}",
                self.marketplace.platform_fee_bps, MAX_FEE_BPS
            )));
        }

        if self.ledger.max_tickets_per_address == 0 {
            return Err(crate::Error::Config(
                "max_tickets_per_address must be greater than 0".to_string(),
            ));
        }

        if self.actor.mailbox_capacity == 0 || self.actor.notification_buffer == 0 {
            return Err(crate::Error::Config(
                "actor buffers must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
