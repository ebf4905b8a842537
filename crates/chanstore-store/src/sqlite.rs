//! SQLite implementation of the store traits.
//!
//! Each operation is one call into the [`Database`] adapter, so it runs on
//! the blocking pool under the connection lock. Composite writes run in one
//! SQLite transaction and roll back entirely on any error.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use chanstore_core::{
    Address, ArchivedTransfer, ChannelAddress, ChannelDispute, ChannelDisputeRecord,
    ChannelState, ChannelUpdate, CoreChannelState, CoreTransferState, PublicIdentifier,
    RoutingId, StoredChannel, StoredTransaction, StoredTransfer, TransactionId, TransactionReason,
    TransactionReceipt, TransactionResponse, TransferDispute, TransferDisputeRecord,
    TransferFilter, TransferId, TransferState, TxHash, UnsubmittedWithdrawal, UpdateType,
    WithdrawCommitment,
};

use crate::adapter::Database;
use crate::error::{Result, StoreError};
use crate::migration;
use crate::repo::{self, channels, disputes, transactions, transfers, updates, withdrawals};
use crate::traits::{ChainServiceStore, EngineStore, ResetScope};

/// SQLite-backed store for one client identity.
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Open (or create) the database `name` under `root`.
    pub fn open(root: impl AsRef<Path>, name: &str) -> Result<Self> {
        Ok(Self::from_database(Database::open(root, name)?))
    }

    /// Open an in-memory store.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_memory("memory")?))
    }

    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn close(&self) -> Result<()> {
        self.db.close().await
    }
}

#[async_trait]
impl EngineStore for SqliteStore {
    async fn get_schema_version(&self) -> Result<u32> {
        self.db.read(|conn| migration::current_version(conn)).await
    }

    async fn update_schema_version(&self, target: Option<u32>) -> Result<u32> {
        let target = target.unwrap_or_else(migration::latest_version);
        let version = self
            .db
            .with_connection_mut(move |conn| migration::migrate_to(conn, target))
            .await?;
        info!(version, "schema version updated");
        Ok(version)
    }

    async fn clear(&self, scope: &ResetScope) -> Result<()> {
        let tables: Vec<_> = scope.tables().collect();
        self.db
            .run_transaction(move |tx| {
                for table in tables {
                    let deleted = repo::clear_table(tx, table)?;
                    debug!(%table, deleted, "cleared table");
                }
                Ok(())
            })
            .await
    }

    async fn save_channel_state(
        &self,
        channel: &ChannelState,
        transfer: Option<&TransferState>,
    ) -> Result<()> {
        let channel = channel.clone();
        let transfer = transfer.cloned();
        self.db
            .run_transaction(move |tx| {
                channels::put(tx, &channel)?;
                updates::put(tx, &channel.latest_update)?;

                let update_type = channel.latest_update.update_type();
                match update_type {
                    UpdateType::Create => {
                        let transfer = transfer.ok_or_else(|| {
                            warn!(
                                channel = %channel.channel_address,
                                nonce = channel.nonce,
                                "create update saved without its transfer"
                            );
                            StoreError::Integrity(format!(
                                "create update {} of channel {} needs a transfer",
                                channel.latest_update.nonce, channel.channel_address
                            ))
                        })?;
                        transfers::create_on_channel_create_update(tx, &channel, &transfer)?;
                    }
                    UpdateType::Resolve => {
                        transfers::resolve_on_channel_resolve_update(tx, &channel)?;
                    }
                    UpdateType::Setup | UpdateType::Deposit => {}
                }

                debug!(
                    channel = %channel.channel_address,
                    nonce = channel.nonce,
                    %update_type,
                    "saved channel state"
                );
                Ok(())
            })
            .await
    }

    async fn save_channel_state_and_transfers(
        &self,
        channel: &ChannelState,
        active_transfers: &[TransferState],
    ) -> Result<()> {
        let channel = channel.clone();
        let active = active_transfers.to_vec();
        self.db
            .run_transaction(move |tx| {
                channels::put(tx, &channel)?;
                updates::put(tx, &channel.latest_update)?;
                let archived =
                    transfers::save_active_transfer_set(tx, &channel.channel_address, &active)?;

                debug!(
                    channel = %channel.channel_address,
                    nonce = channel.nonce,
                    active = active.len(),
                    archived,
                    "saved channel state and active transfers"
                );
                Ok(())
            })
            .await
    }

    async fn get_channel_states(&self) -> Result<Vec<ChannelState>> {
        self.db.read(|conn| channels::get_all(conn)).await
    }

    async fn get_channel_state(&self, channel_address: &ChannelAddress) -> Result<Option<ChannelState>> {
        let address = channel_address.clone();
        self.db
            .read(move |conn| channels::get_by_address(conn, &address))
            .await
    }

    async fn get_stored_channel(&self, channel_address: &ChannelAddress) -> Result<Option<StoredChannel>> {
        let address = channel_address.clone();
        self.db
            .read(move |conn| channels::get_stored(conn, &address))
            .await
    }

    async fn get_channel_state_by_participants(
        &self,
        a: &PublicIdentifier,
        b: &PublicIdentifier,
        chain_id: u64,
    ) -> Result<Option<ChannelState>> {
        let (a, b) = (a.clone(), b.clone());
        self.db
            .read(move |conn| channels::get_by_participants(conn, &a, &b, chain_id))
            .await
    }

    async fn get_channel_update(
        &self,
        channel_address: &ChannelAddress,
        nonce: u64,
    ) -> Result<Option<ChannelUpdate>> {
        let address = channel_address.clone();
        self.db
            .read(move |conn| updates::get(conn, &address, nonce))
            .await
    }

    async fn get_active_transfers(&self, channel_address: &ChannelAddress) -> Result<Vec<TransferState>> {
        let address = channel_address.clone();
        let active = self
            .db
            .read(move |conn| transfers::active(conn, &address))
            .await?;
        Ok(active.into_iter().map(TransferState::from).collect())
    }

    async fn get_transfer_state(&self, transfer_id: &TransferId) -> Result<Option<TransferState>> {
        Ok(self
            .get_stored_transfer(transfer_id)
            .await?
            .map(TransferState::from))
    }

    async fn get_stored_transfer(&self, transfer_id: &TransferId) -> Result<Option<StoredTransfer>> {
        let transfer_id = transfer_id.clone();
        self.db
            .read(move |conn| transfers::get(conn, &transfer_id))
            .await
    }

    async fn get_transfer_by_routing_id(
        &self,
        channel_address: &ChannelAddress,
        routing_id: &RoutingId,
    ) -> Result<Option<TransferState>> {
        let (address, routing_id) = (channel_address.clone(), routing_id.clone());
        let stored = self
            .db
            .read(move |conn| transfers::get_by_routing_id(conn, &address, &routing_id))
            .await?;
        Ok(stored.map(TransferState::from))
    }

    async fn get_transfers_by_routing_id(&self, routing_id: &RoutingId) -> Result<Vec<TransferState>> {
        let routing_id = routing_id.clone();
        let stored = self
            .db
            .read(move |conn| transfers::get_all_by_routing_id(conn, &routing_id))
            .await?;
        Ok(stored.into_iter().map(TransferState::from).collect())
    }

    async fn get_transfers(&self, filter: &TransferFilter) -> Result<Vec<TransferState>> {
        let filter = filter.clone();
        let stored = self
            .db
            .read(move |conn| transfers::query(conn, &filter))
            .await?;
        Ok(stored.into_iter().map(TransferState::from).collect())
    }

    async fn get_archived_transfers(&self, channel_address: &ChannelAddress) -> Result<Vec<ArchivedTransfer>> {
        let address = channel_address.clone();
        self.db
            .read(move |conn| transfers::archived(conn, &address))
            .await
    }

    async fn save_withdrawal_commitment(
        &self,
        transfer_id: &TransferId,
        commitment: &WithdrawCommitment,
    ) -> Result<()> {
        let (transfer_id, commitment) = (transfer_id.clone(), commitment.clone());
        self.db
            .run_transaction(move |tx| withdrawals::put(tx, &transfer_id, &commitment))
            .await
    }

    async fn get_withdrawal_commitment(&self, transfer_id: &TransferId) -> Result<Option<WithdrawCommitment>> {
        let transfer_id = transfer_id.clone();
        self.db
            .read(move |conn| withdrawals::get(conn, &transfer_id))
            .await
    }

    async fn get_withdrawal_commitment_by_transaction_hash(
        &self,
        transaction_hash: &TxHash,
    ) -> Result<Option<WithdrawCommitment>> {
        let hash = transaction_hash.clone();
        self.db
            .read(move |conn| withdrawals::get_by_transaction_hash(conn, &hash))
            .await
    }

    async fn get_unsubmitted_withdrawals(
        &self,
        channel_address: &ChannelAddress,
        withdrawal_definition: &Address,
    ) -> Result<Vec<UnsubmittedWithdrawal>> {
        let (address, definition) = (channel_address.clone(), withdrawal_definition.clone());
        self.db
            .read(move |conn| withdrawals::unsubmitted(conn, &address, &definition))
            .await
    }

    async fn save_channel_dispute(
        &self,
        channel_address: &ChannelAddress,
        dispute: &ChannelDispute,
        disputed_channel: Option<&CoreChannelState>,
    ) -> Result<()> {
        let address = channel_address.clone();
        let dispute = dispute.clone();
        let disputed = disputed_channel.cloned();
        self.db
            .run_transaction(move |tx| {
                disputes::put_channel(tx, &address, &dispute, disputed.as_ref())
            })
            .await
    }

    async fn get_channel_dispute(&self, channel_address: &ChannelAddress) -> Result<Option<ChannelDisputeRecord>> {
        let address = channel_address.clone();
        self.db
            .read(move |conn| disputes::get_channel(conn, &address))
            .await
    }

    async fn save_transfer_dispute(
        &self,
        dispute: &TransferDispute,
        disputed_transfer: Option<&CoreTransferState>,
    ) -> Result<()> {
        let dispute = dispute.clone();
        let disputed = disputed_transfer.cloned();
        self.db
            .run_transaction(move |tx| {
                disputes::put_transfer(tx, &dispute.transfer_id, &dispute, disputed.as_ref())
            })
            .await
    }

    async fn get_transfer_dispute(&self, transfer_id: &TransferId) -> Result<Option<TransferDisputeRecord>> {
        let transfer_id = transfer_id.clone();
        self.db
            .read(move |conn| disputes::get_transfer(conn, &transfer_id))
            .await
    }
}

#[async_trait]
impl ChainServiceStore for SqliteStore {
    async fn get_transaction_by_id(&self, id: &TransactionId) -> Result<Option<StoredTransaction>> {
        let id = id.clone();
        self.db
            .read(move |conn| transactions::get_by_id(conn, &id))
            .await
    }

    async fn get_transaction_by_hash(&self, hash: &TxHash) -> Result<Option<StoredTransaction>> {
        let hash = hash.clone();
        self.db
            .read(move |conn| transactions::get_by_hash(conn, &hash))
            .await
    }

    async fn get_active_transactions(&self) -> Result<Vec<StoredTransaction>> {
        self.db.read(|conn| transactions::get_active(conn)).await
    }

    async fn save_transaction_attempt(
        &self,
        id: &TransactionId,
        channel_address: &ChannelAddress,
        reason: TransactionReason,
        response: &TransactionResponse,
    ) -> Result<StoredTransaction> {
        let (id, address, response) = (id.clone(), channel_address.clone(), response.clone());
        let stored = self
            .db
            .run_transaction(move |tx| {
                transactions::record_attempt(tx, &id, &address, reason, &response)
            })
            .await?;
        debug!(
            transaction = %stored.id,
            attempts = stored.attempts.len(),
            reason = %stored.reason,
            "saved transaction attempt"
        );
        Ok(stored)
    }

    async fn save_transaction_receipt(
        &self,
        id: &TransactionId,
        receipt: &TransactionReceipt,
    ) -> Result<StoredTransaction> {
        let (id, receipt) = (id.clone(), receipt.clone());
        self.db
            .run_transaction(move |tx| transactions::record_mined(tx, &id, &receipt))
            .await
    }

    async fn save_transaction_failure(
        &self,
        id: &TransactionId,
        error: &str,
        receipt: Option<&TransactionReceipt>,
    ) -> Result<StoredTransaction> {
        let id = id.clone();
        let error = error.to_string();
        let receipt = receipt.cloned();
        self.db
            .run_transaction(move |tx| {
                transactions::record_failed(tx, &id, &error, receipt.as_ref())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::Table;
    use crate::test_support::{channel, commitment, create_update, resolve_update, response, transfer};
    use chanstore_core::EncodedFields;

    #[tokio::test]
    async fn test_create_and_resolve_through_channel_saves() {
        let store = SqliteStore::open_memory().unwrap();
        let t1 = transfer("t1", "0xA", 4, None);

        store
            .save_channel_state(&create_update("0xA", 5, &t1), Some(&t1))
            .await
            .unwrap();
        let stored = store.get_stored_transfer(&t1.transfer_id).await.unwrap().unwrap();
        assert_eq!((stored.create_update_nonce, stored.resolve_update_nonce), (5, 0));

        store
            .save_channel_state(&resolve_update("0xA", 6, "t1", EncodedFields::new()), None)
            .await
            .unwrap();
        let stored = store.get_stored_transfer(&t1.transfer_id).await.unwrap().unwrap();
        assert_eq!(stored.resolve_update_nonce, 6);
        assert_eq!(store.get_channel_state(&ChannelAddress::from("0xA")).await.unwrap().unwrap().nonce, 6);
    }

    #[tokio::test]
    async fn test_create_without_transfer_rolls_back_channel() {
        let store = SqliteStore::open_memory().unwrap();
        let t1 = transfer("t1", "0xA", 4, None);

        let err = store
            .save_channel_state(&create_update("0xA", 5, &t1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
        assert!(store.get_channel_state(&ChannelAddress::from("0xA")).await.unwrap().is_none());
        assert!(store
            .get_channel_update(&ChannelAddress::from("0xA"), 5)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_clear_scope() {
        let store = SqliteStore::open_memory().unwrap();
        let state = channel("0xA", "alice", "bob", 1, 1);
        store.save_channel_state(&state, None).await.unwrap();
        store
            .save_withdrawal_commitment(&TransferId::from("w1"), &commitment("0xA", None))
            .await
            .unwrap();
        store
            .save_transaction_attempt(
                &TransactionId::from("tx"),
                &state.channel_address,
                TransactionReason::Withdraw,
                &response("0x1", 1),
            )
            .await
            .unwrap();

        store.clear(&ResetScope::channel_data()).await.unwrap();
        assert!(store.get_channel_states().await.unwrap().is_empty());
        assert!(store.get_active_transactions().await.unwrap().is_empty());
        assert!(store
            .get_withdrawal_commitment(&TransferId::from("w1"))
            .await
            .unwrap()
            .is_some());

        store.clear(&ResetScope::only([Table::WithdrawCommitments])).await.unwrap();
        assert!(store
            .get_withdrawal_commitment(&TransferId::from("w1"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_schema_version_moves_forward_only() {
        let store = SqliteStore::open_memory().unwrap();
        let latest = migration::latest_version();
        assert_eq!(store.get_schema_version().await.unwrap(), latest);
        assert_eq!(store.update_schema_version(None).await.unwrap(), latest);

        let err = store.update_schema_version(Some(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Unimplemented(_)));
    }
}
