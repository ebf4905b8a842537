//! Transfers and their persisted form.
//!
//! [`TransferState`] is what the protocol engine hands the store.
//! [`StoredTransfer`] adds the bookkeeping the store needs to keep the
//! active/resolved partition of a channel's transfers. The two convert
//! explicitly; nothing is stripped from or bolted onto a shared object.

use serde::{Deserialize, Serialize};

use crate::channel::Balance;
use crate::error::{CoreError, Result};
use crate::types::{Address, ChannelAddress, EncodedFields, PublicIdentifier, RoutingId, TransferId};

/// Free-form transfer metadata. Only `routing_id` is interpreted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferMeta {
    pub routing_id: Option<RoutingId>,
    #[serde(default)]
    pub extra: EncodedFields,
}

/// A conditional transfer routed through a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferState {
    pub transfer_id: TransferId,
    pub channel_address: ChannelAddress,
    pub channel_factory_address: Address,
    pub chain_id: u64,
    pub transfer_definition: Address,
    pub initiator: Address,
    pub responder: Address,
    pub initiator_identifier: PublicIdentifier,
    pub responder_identifier: PublicIdentifier,
    pub asset_id: Address,
    pub balance: Balance,
    pub transfer_timeout: String,
    pub transfer_state: EncodedFields,
    pub transfer_encodings: Vec<String>,
    pub transfer_resolver: Option<EncodedFields>,
    /// Channel nonce at the time the transfer was proposed.
    pub channel_nonce: u64,
    pub meta: Option<TransferMeta>,
    pub in_dispute: bool,
}

impl TransferState {
    pub fn routing_id(&self) -> Option<&RoutingId> {
        self.meta.as_ref().and_then(|m| m.routing_id.as_ref())
    }

    /// The subset of state that is committed to on-chain.
    pub fn core(&self) -> CoreTransferState {
        CoreTransferState {
            channel_address: self.channel_address.clone(),
            transfer_id: self.transfer_id.clone(),
            transfer_definition: self.transfer_definition.clone(),
            initiator: self.initiator.clone(),
            responder: self.responder.clone(),
            asset_id: self.asset_id.clone(),
            balance: self.balance.clone(),
            transfer_timeout: self.transfer_timeout.clone(),
            transfer_state: self.transfer_state.clone(),
        }
    }
}

/// On-chain committed transfer state, used as a dispute snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreTransferState {
    pub channel_address: ChannelAddress,
    pub transfer_id: TransferId,
    pub transfer_definition: Address,
    pub initiator: Address,
    pub responder: Address,
    pub asset_id: Address,
    pub balance: Balance,
    pub transfer_timeout: String,
    pub transfer_state: EncodedFields,
}

/// A transfer as persisted by the store.
///
/// Invariant: `resolve_update_nonce == 0` if and only if the transfer is
/// active, and `transfer.transfer_resolver` is set exactly when it is not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTransfer {
    pub transfer: TransferState,
    pub create_update_nonce: u64,
    pub resolve_update_nonce: u64,
    pub routing_id: Option<RoutingId>,
    pub created_at: i64,
}

impl StoredTransfer {
    /// Stamp a transfer as active, created at `create_update_nonce`.
    pub fn active(transfer: TransferState, create_update_nonce: u64, created_at: i64) -> Self {
        let routing_id = transfer.routing_id().cloned();
        Self {
            transfer,
            create_update_nonce,
            resolve_update_nonce: 0,
            routing_id,
            created_at,
        }
    }

    pub fn is_active(&self) -> bool {
        self.resolve_update_nonce == 0
    }

    pub fn transfer_id(&self) -> &TransferId {
        &self.transfer.transfer_id
    }

    /// Mark the transfer resolved at `nonce` with the given resolver.
    ///
    /// Fields set here are set exactly once.
    pub fn resolve(&mut self, nonce: u64, resolver: EncodedFields) -> Result<()> {
        if !self.is_active() {
            return Err(CoreError::AlreadyResolved(self.transfer.transfer_id.clone()));
        }
        if nonce == 0 || nonce < self.create_update_nonce {
            return Err(CoreError::InvalidResolveNonce {
                transfer_id: self.transfer.transfer_id.clone(),
                nonce,
            });
        }
        self.resolve_update_nonce = nonce;
        self.transfer.transfer_resolver = Some(resolver);
        Ok(())
    }

    pub fn into_transfer_state(self) -> TransferState {
        self.transfer
    }
}

impl From<StoredTransfer> for TransferState {
    fn from(stored: StoredTransfer) -> Self {
        stored.into_transfer_state()
    }
}

/// A copy of a transfer that was dropped from a channel's active set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedTransfer {
    pub transfer: TransferState,
    pub create_update_nonce: u64,
    pub created_at: i64,
    pub archived_at: i64,
}

/// Conjunctive filter over stored transfers.
///
/// `start_date..end_date` is half-open over `created_at` (Unix ms).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferFilter {
    pub channel_address: Option<ChannelAddress>,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
    pub active_only: bool,
    pub routing_id: Option<RoutingId>,
    pub transfer_definition: Option<Address>,
}

impl TransferFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(mut self, channel_address: ChannelAddress) -> Self {
        self.channel_address = Some(channel_address);
        self
    }

    pub fn created_between(mut self, start: Option<i64>, end: Option<i64>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    pub fn active_only(mut self) -> Self {
        self.active_only = true;
        self
    }

    pub fn routing_id(mut self, routing_id: RoutingId) -> Self {
        self.routing_id = Some(routing_id);
        self
    }

    pub fn transfer_definition(mut self, definition: Address) -> Self {
        self.transfer_definition = Some(definition);
        self
    }
}
