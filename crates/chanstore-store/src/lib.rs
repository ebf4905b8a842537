//! # Chanstore Store
//!
//! Persistence for a payment-channel client: channel state, transfers,
//! on-chain transactions with their retry attempts, withdrawal commitments
//! and disputes, on an embedded SQLite database.
//!
//! ## Overview
//!
//! The protocol engine talks to [`EngineStore`] and the chain service to
//! [`ChainServiceStore`]. [`SqliteStore`] implements both on top of the
//! [`Database`] adapter, which serializes all access through one connection
//! and runs every composite write in a single SQLite transaction.
//!
//! ## Key Types
//!
//! - [`SqliteStore`] - The store, one per client identity
//! - [`Database`] - Named SQLite database with migrations applied at open
//! - [`ResetScope`] - The tables a `clear` empties
//! - [`StoreError`] - Everything that can go wrong
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chanstore_store::{ChainServiceStore, EngineStore, SqliteStore};
//!
//! async fn example() {
//!     // One database per identity under a storage root
//!     let store = SqliteStore::open("./data", "alice-store").unwrap();
//!
//!     // Or in memory for tests
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     let channels = store.get_channel_states().await.unwrap();
//!     let pending = store.get_active_transactions().await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Active set**: a transfer is active while its `resolve_update_nonce`
//!   is 0; replacing a channel's active set archives what drops out
//! - **Attempts**: resubmitting a transaction appends an attempt, never
//!   rewrites one
//! - **Migrations**: a contiguous typed list, each step idempotent and
//!   applied in its own transaction

pub mod adapter;
pub mod codec;
pub mod error;
pub mod migration;
pub mod repo;
pub mod sqlite;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

pub use adapter::Database;
pub use error::{Result, StoreError};
pub use repo::Table;
pub use sqlite::SqliteStore;
pub use traits::{ChainServiceStore, EngineStore, ResetScope};
