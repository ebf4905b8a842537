//! Withdrawal commitments.

use serde::{Deserialize, Serialize};

use crate::transfer::TransferState;
use crate::types::{Address, ChannelAddress, TxHash};

/// A signed withdrawal payload, one-to-one with a withdrawal transfer.
///
/// `transaction_hash` is set once the withdrawal has been submitted on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawCommitment {
    pub channel_address: ChannelAddress,
    pub alice: Address,
    pub bob: Address,
    pub recipient: Address,
    pub asset_id: Address,
    pub amount: String,
    pub nonce: String,
    pub call_to: Address,
    pub call_data: String,
    pub alice_signature: Option<String>,
    pub bob_signature: Option<String>,
    pub transaction_hash: Option<TxHash>,
}

impl WithdrawCommitment {
    pub fn is_submitted(&self) -> bool {
        self.transaction_hash.is_some()
    }
}

/// A withdrawal that has been signed but never submitted, with its transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubmittedWithdrawal {
    pub commitment: WithdrawCommitment,
    pub transfer: TransferState,
}
