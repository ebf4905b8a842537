//! # Chanstore
//!
//! Persistent state for a payment-channel client: channels, transfers,
//! on-chain transactions, withdrawal commitments and disputes, kept in one
//! SQLite database per client identity.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chanstore::{open_store, EngineStore, StoreConfig};
//!
//! async fn example() {
//!     // Root from CHANSTORE_STORAGE_ROOT, database "<identifier>-store"
//!     let config = StoreConfig::from_env("vector8Uz1BdpA9hV5uTm6QUv5jj1PsUyCH8m8ciA94voCzsxVmrBRor");
//!     let store = open_store(&config).unwrap();
//!
//!     for channel in store.get_channel_states().await.unwrap() {
//!         let active = store.get_active_transfers(&channel.channel_address).await.unwrap();
//!         println!("{}: {} active transfers", channel.channel_address, active.len());
//!     }
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `chanstore::core` - Domain types
//! - `chanstore::store` - Adapter, migrations, repositories and the SQLite store

pub mod config;
pub mod factory;

pub use chanstore_core as core;
pub use chanstore_store as store;

pub use config::{StoreConfig, DEFAULT_STORAGE_ROOT, LEGACY_DATABASE_NAME, STORAGE_ROOT_ENV};
pub use factory::{database_name, open_store, resolve_database_name};

pub use chanstore_store::{ChainServiceStore, EngineStore, ResetScope, SqliteStore, StoreError, Table};
