//! # Chanstore Core
//!
//! Domain types for the channel store: channel state, transfers, on-chain
//! transactions, withdrawal commitments, and disputes.
//!
//! This crate contains no I/O and no storage. It defines what the store
//! persists and the pure projections between domain and stored shapes.
//!
//! ## Key Types
//!
//! - [`ChannelState`] / [`StoredChannel`] - A party's view of a bilateral channel and its persisted form
//! - [`TransferState`] / [`StoredTransfer`] - A transfer and its persisted form
//! - [`StoredTransaction`] - An on-chain transaction with its attempt history
//! - [`StoredTransactionReceipt`] - The sanitized projection of a receipt
//! - [`WithdrawCommitment`] - A signed withdrawal payload
//! - [`ChannelDispute`] / [`TransferDispute`] - On-chain challenges
//!
//! ## Status Transitions
//!
//! Transactions move `submitted -> mined | failed` and never back. See
//! [`TransactionStatus::can_transition_to`].

pub mod channel;
pub mod dispute;
pub mod error;
pub mod transaction;
pub mod transfer;
pub mod types;
pub mod withdrawal;

pub use channel::{Balance, ChannelState, ChannelUpdate, CoreChannelState, NetworkContext, StoredChannel, UpdateDetails, UpdateType};
pub use dispute::{ChannelDispute, ChannelDisputeRecord, TransferDispute, TransferDisputeRecord};
pub use error::{CoreError, Result};
pub use transaction::{
    logs_digest, Log, StoredTransaction, StoredTransactionReceipt, TransactionAttempt,
    TransactionReason, TransactionReceipt, TransactionResponse, TransactionStatus,
};
pub use transfer::{ArchivedTransfer, CoreTransferState, StoredTransfer, TransferFilter, TransferMeta, TransferState};
pub use types::{
    now_millis, Address, ChannelAddress, EncodedFields, PublicIdentifier, RoutingId, TransactionId,
    TransferId, TxHash,
};
pub use withdrawal::{UnsubmittedWithdrawal, WithdrawCommitment};
