//! Channel and transfer disputes.
//!
//! At most one current dispute exists per channel or transfer. A new record
//! replaces the previous one.

use serde::{Deserialize, Serialize};

use crate::channel::CoreChannelState;
use crate::transfer::CoreTransferState;
use crate::types::{ChannelAddress, TransferId};

/// An on-chain challenge against a channel's latest state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDispute {
    pub channel_state_hash: String,
    pub nonce: u64,
    pub merkle_root: String,
    pub consensus_expiry: String,
    pub defund_expiry: String,
}

/// An on-chain challenge against a single transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDispute {
    pub transfer_id: TransferId,
    pub transfer_state_hash: String,
    pub transfer_dispute_expiry: String,
    pub is_defunded: bool,
}

/// A channel dispute with the channel state that was disputed, if known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDisputeRecord {
    pub channel_address: ChannelAddress,
    pub dispute: ChannelDispute,
    pub disputed_channel: Option<CoreChannelState>,
}

/// A transfer dispute with the transfer state that was disputed, if known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDisputeRecord {
    pub transfer_id: TransferId,
    pub dispute: TransferDispute,
    pub disputed_transfer: Option<CoreTransferState>,
}
