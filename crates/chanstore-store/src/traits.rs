//! Store traits: the interfaces the protocol engine and the chain service
//! program against.
//!
//! [`EngineStore`] covers channel, transfer, withdrawal and dispute state.
//! [`ChainServiceStore`] covers on-chain transactions. [`SqliteStore`]
//! implements both.
//!
//! [`SqliteStore`]: crate::SqliteStore

use std::collections::BTreeSet;

use async_trait::async_trait;
use chanstore_core::{
    Address, ArchivedTransfer, ChannelAddress, ChannelDispute, ChannelDisputeRecord,
    ChannelState, ChannelUpdate, CoreChannelState, CoreTransferState, PublicIdentifier,
    RoutingId, StoredChannel, StoredTransaction, StoredTransfer, TransactionId, TransactionReason,
    TransactionReceipt, TransactionResponse, TransferDispute, TransferDisputeRecord,
    TransferFilter, TransferId, TransferState, TxHash, UnsubmittedWithdrawal, WithdrawCommitment,
};

use crate::error::Result;
use crate::repo::Table;

/// The set of tables a `clear` empties.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResetScope {
    tables: BTreeSet<Table>,
}

impl ResetScope {
    /// Every table.
    pub fn all() -> Self {
        Self::only(Table::ALL)
    }

    /// Channels, their update log, transfers (live and archived) and
    /// transactions. Withdrawal commitments, disputes and values survive.
    pub fn channel_data() -> Self {
        Self::only([
            Table::Channels,
            Table::ChannelUpdates,
            Table::Transfers,
            Table::TransferArchive,
            Table::Transactions,
        ])
    }

    pub fn only(tables: impl IntoIterator<Item = Table>) -> Self {
        Self {
            tables: tables.into_iter().collect(),
        }
    }

    pub fn with(mut self, table: Table) -> Self {
        self.tables.insert(table);
        self
    }

    pub fn contains(&self, table: Table) -> bool {
        self.tables.contains(&table)
    }

    pub fn tables(&self) -> impl Iterator<Item = Table> + '_ {
        self.tables.iter().copied()
    }
}

/// Persistence for the channel protocol engine.
///
/// Getters return `Ok(None)` or an empty list for missing entities. Every
/// write that touches more than one table is atomic.
#[async_trait]
pub trait EngineStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Schema
    // ─────────────────────────────────────────────────────────────────────────

    /// Highest applied schema migration.
    async fn get_schema_version(&self) -> Result<u32>;

    /// Migrate forward to `target`, or to the latest version when `None`.
    ///
    /// Moving to an older version fails with `StoreError::Unimplemented`.
    async fn update_schema_version(&self, target: Option<u32>) -> Result<u32>;

    /// Empty every table in `scope` in one transaction.
    async fn clear(&self, scope: &ResetScope) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Channels
    // ─────────────────────────────────────────────────────────────────────────

    /// Save a channel together with the transfer change its latest update
    /// implies.
    ///
    /// A `create` update inserts `transfer`, which is then required. A
    /// `resolve` update resolves the transfer it names. Other updates leave
    /// transfers alone. The update is appended to the update log.
    async fn save_channel_state(
        &self,
        channel: &ChannelState,
        transfer: Option<&TransferState>,
    ) -> Result<()>;

    /// Save a channel and replace its whole active transfer set.
    ///
    /// Used on restore and sync, where the counterparty's view is adopted.
    async fn save_channel_state_and_transfers(
        &self,
        channel: &ChannelState,
        active_transfers: &[TransferState],
    ) -> Result<()>;

    async fn get_channel_states(&self) -> Result<Vec<ChannelState>>;

    async fn get_channel_state(&self, channel_address: &ChannelAddress) -> Result<Option<ChannelState>>;

    /// The channel with the time the store first saved it.
    async fn get_stored_channel(&self, channel_address: &ChannelAddress) -> Result<Option<StoredChannel>>;

    /// The channel between two identities on a chain, in either role order.
    async fn get_channel_state_by_participants(
        &self,
        a: &PublicIdentifier,
        b: &PublicIdentifier,
        chain_id: u64,
    ) -> Result<Option<ChannelState>>;

    /// A previously saved update of a channel.
    async fn get_channel_update(
        &self,
        channel_address: &ChannelAddress,
        nonce: u64,
    ) -> Result<Option<ChannelUpdate>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Transfers
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_active_transfers(&self, channel_address: &ChannelAddress) -> Result<Vec<TransferState>>;

    async fn get_transfer_state(&self, transfer_id: &TransferId) -> Result<Option<TransferState>>;

    /// The transfer with its store bookkeeping (nonces, creation time).
    async fn get_stored_transfer(&self, transfer_id: &TransferId) -> Result<Option<StoredTransfer>>;

    async fn get_transfer_by_routing_id(
        &self,
        channel_address: &ChannelAddress,
        routing_id: &RoutingId,
    ) -> Result<Option<TransferState>>;

    /// Every hop of a routed transfer, across channels.
    async fn get_transfers_by_routing_id(&self, routing_id: &RoutingId) -> Result<Vec<TransferState>>;

    async fn get_transfers(&self, filter: &TransferFilter) -> Result<Vec<TransferState>>;

    /// Transfers that dropped out of the channel's active set unresolved.
    async fn get_archived_transfers(&self, channel_address: &ChannelAddress) -> Result<Vec<ArchivedTransfer>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Withdrawals
    // ─────────────────────────────────────────────────────────────────────────

    async fn save_withdrawal_commitment(
        &self,
        transfer_id: &TransferId,
        commitment: &WithdrawCommitment,
    ) -> Result<()>;

    async fn get_withdrawal_commitment(&self, transfer_id: &TransferId) -> Result<Option<WithdrawCommitment>>;

    async fn get_withdrawal_commitment_by_transaction_hash(
        &self,
        transaction_hash: &TxHash,
    ) -> Result<Option<WithdrawCommitment>>;

    /// Signed withdrawals of a channel that were never submitted on-chain.
    async fn get_unsubmitted_withdrawals(
        &self,
        channel_address: &ChannelAddress,
        withdrawal_definition: &Address,
    ) -> Result<Vec<UnsubmittedWithdrawal>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Disputes
    // ─────────────────────────────────────────────────────────────────────────

    async fn save_channel_dispute(
        &self,
        channel_address: &ChannelAddress,
        dispute: &ChannelDispute,
        disputed_channel: Option<&CoreChannelState>,
    ) -> Result<()>;

    async fn get_channel_dispute(&self, channel_address: &ChannelAddress) -> Result<Option<ChannelDisputeRecord>>;

    /// Keyed by `dispute.transfer_id`.
    async fn save_transfer_dispute(
        &self,
        dispute: &TransferDispute,
        disputed_transfer: Option<&CoreTransferState>,
    ) -> Result<()>;

    async fn get_transfer_dispute(&self, transfer_id: &TransferId) -> Result<Option<TransferDisputeRecord>>;
}

/// Persistence for the chain service's submitted transactions.
#[async_trait]
pub trait ChainServiceStore: Send + Sync {
    async fn get_transaction_by_id(&self, id: &TransactionId) -> Result<Option<StoredTransaction>>;

    /// Lookup by the hash of any attempt.
    async fn get_transaction_by_hash(&self, hash: &TxHash) -> Result<Option<StoredTransaction>>;

    /// Submitted transactions with no receipt yet.
    async fn get_active_transactions(&self) -> Result<Vec<StoredTransaction>>;

    /// Record a (re)submission. Fails with `InvalidTransition` once the
    /// transaction is mined or failed.
    async fn save_transaction_attempt(
        &self,
        id: &TransactionId,
        channel_address: &ChannelAddress,
        reason: TransactionReason,
        response: &TransactionResponse,
    ) -> Result<StoredTransaction>;

    async fn save_transaction_receipt(
        &self,
        id: &TransactionId,
        receipt: &TransactionReceipt,
    ) -> Result<StoredTransaction>;

    async fn save_transaction_failure(
        &self,
        id: &TransactionId,
        error: &str,
        receipt: Option<&TransactionReceipt>,
    ) -> Result<StoredTransaction>;
}
