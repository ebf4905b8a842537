//! # Chanstore Testkit
//!
//! Testing utilities for the channel store.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a [`ChannelFixture`] that produces the channel states and
//!   transfers of a channel advancing update by update, plus transaction
//!   responses and receipts
//! - **Generators**: proptest strategies and a reference model of the
//!   transaction state machine
//!
//! ## Test Fixtures
//!
//! ```rust
//! use chanstore_testkit::fixtures::{ChannelFixture, HASHLOCK_DEFINITION};
//!
//! let mut channel = ChannelFixture::new();
//! let setup = channel.setup();
//! let transfer = channel.transfer(HASHLOCK_DEFINITION, None);
//! let created = channel.create(&transfer);
//! assert_eq!(created.nonce, setup.nonce + 1);
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use chanstore_testkit::generators::{TxModel, TxOp};
//!
//! proptest! {
//!     #[test]
//!     fn store_follows_model(ops in prop::collection::vec(any::<TxOp>(), 0..20)) {
//!         let mut model = TxModel::default();
//!         for op in &ops {
//!             let expected = model.apply(op);
//!             // apply `op` to the store and compare with `expected`
//!         }
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{memory_store, ChannelFixture};
pub use generators::{TxModel, TxOp, TxOutcome};
