//! Channel state and channel updates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::transfer::TransferMeta;
use crate::types::{Address, ChannelAddress, EncodedFields, PublicIdentifier, TransferId};

/// Chain-level context a channel lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkContext {
    pub chain_id: u64,
    pub channel_factory_address: Address,
    pub transfer_registry_address: Address,
}

/// Balance of one asset split between two recipients.
///
/// Amounts are decimal strings; they routinely exceed 64 bits.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub amount: Vec<String>,
    pub to: Vec<Address>,
}

/// Tag of a channel update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Setup,
    Deposit,
    Create,
    Resolve,
}

impl UpdateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateType::Setup => "setup",
            UpdateType::Deposit => "deposit",
            UpdateType::Create => "create",
            UpdateType::Resolve => "resolve",
        }
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "setup" => Ok(UpdateType::Setup),
            "deposit" => Ok(UpdateType::Deposit),
            "create" => Ok(UpdateType::Create),
            "resolve" => Ok(UpdateType::Resolve),
            other => Err(CoreError::UnknownVariant {
                kind: "update type",
                value: other.to_string(),
            }),
        }
    }
}

/// Update-specific details. The variant is the update's tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UpdateDetails {
    Setup {
        timeout: String,
        network_context: NetworkContext,
    },
    Deposit {
        total_deposits_alice: String,
        total_deposits_bob: String,
    },
    Create {
        transfer_id: TransferId,
        transfer_definition: Address,
        transfer_timeout: String,
        balance: Balance,
        meta: Option<TransferMeta>,
    },
    Resolve {
        transfer_id: TransferId,
        transfer_definition: Address,
        transfer_resolver: EncodedFields,
        meta: Option<TransferMeta>,
    },
}

/// A single signed advance of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelUpdate {
    pub channel_address: ChannelAddress,
    pub from_identifier: PublicIdentifier,
    pub to_identifier: PublicIdentifier,
    pub nonce: u64,
    pub balance: Balance,
    pub asset_id: Address,
    pub details: UpdateDetails,
    pub alice_signature: Option<String>,
    pub bob_signature: Option<String>,
}

impl ChannelUpdate {
    /// The update's tag, derived from its details.
    pub fn update_type(&self) -> UpdateType {
        match self.details {
            UpdateDetails::Setup { .. } => UpdateType::Setup,
            UpdateDetails::Deposit { .. } => UpdateType::Deposit,
            UpdateDetails::Create { .. } => UpdateType::Create,
            UpdateDetails::Resolve { .. } => UpdateType::Resolve,
        }
    }

    /// The transfer this update creates or resolves, if any.
    pub fn transfer_id(&self) -> Option<&TransferId> {
        match &self.details {
            UpdateDetails::Create { transfer_id, .. } | UpdateDetails::Resolve { transfer_id, .. } => {
                Some(transfer_id)
            }
            _ => None,
        }
    }
}

/// Full channel state as seen by one party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    pub channel_address: ChannelAddress,
    pub alice: Address,
    pub bob: Address,
    pub alice_identifier: PublicIdentifier,
    pub bob_identifier: PublicIdentifier,
    pub network_context: NetworkContext,
    pub asset_ids: Vec<Address>,
    pub balances: Vec<Balance>,
    pub processed_deposits_a: Vec<String>,
    pub processed_deposits_b: Vec<String>,
    pub defund_nonces: Vec<String>,
    pub timeout: String,
    pub nonce: u64,
    pub merkle_root: String,
    pub latest_update: ChannelUpdate,
    pub in_dispute: bool,
}

impl ChannelState {
    pub fn chain_id(&self) -> u64 {
        self.network_context.chain_id
    }

    /// The subset of state that is committed to on-chain.
    pub fn core(&self) -> CoreChannelState {
        CoreChannelState {
            channel_address: self.channel_address.clone(),
            alice: self.alice.clone(),
            bob: self.bob.clone(),
            asset_ids: self.asset_ids.clone(),
            balances: self.balances.clone(),
            processed_deposits_a: self.processed_deposits_a.clone(),
            processed_deposits_b: self.processed_deposits_b.clone(),
            defund_nonces: self.defund_nonces.clone(),
            timeout: self.timeout.clone(),
            nonce: self.nonce,
            merkle_root: self.merkle_root.clone(),
        }
    }
}

/// A channel as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChannel {
    pub state: ChannelState,
    /// Unix ms of the first save; later saves keep it.
    pub created_at: i64,
}

/// On-chain committed channel state, used as a dispute snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreChannelState {
    pub channel_address: ChannelAddress,
    pub alice: Address,
    pub bob: Address,
    pub asset_ids: Vec<Address>,
    pub balances: Vec<Balance>,
    pub processed_deposits_a: Vec<String>,
    pub processed_deposits_b: Vec<String>,
    pub defund_nonces: Vec<String>,
    pub timeout: String,
    pub nonce: u64,
    pub merkle_root: String,
}
