//! Test fixtures and helpers.
//!
//! [`ChannelFixture`] plays one channel forward update by update, producing
//! the channel states and transfers the engine would hand the store.

use rand::RngCore;

use chanstore_core::{
    Address, Balance, ChannelAddress, ChannelState, ChannelUpdate, EncodedFields,
    NetworkContext, PublicIdentifier, RoutingId, TransactionReceipt, TransactionResponse,
    TransferId, TransferMeta, TransferState, TxHash, UpdateDetails, WithdrawCommitment,
};
use chanstore_store::SqliteStore;

/// Transfer definition of withdrawals in fixtures.
pub const WITHDRAW_DEFINITION: &str = "0x00000000000000000000000000000000000000ad";

/// Transfer definition of hashlock payments in fixtures.
pub const HASHLOCK_DEFINITION: &str = "0x00000000000000000000000000000000000000b1";

/// Default chain of fixtures.
pub const CHAIN_ID: u64 = 1337;

/// `0x`-prefixed random hex of `bytes` bytes.
pub fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    format!("0x{}", hex::encode(buf))
}

pub fn random_address() -> Address {
    Address::new(random_hex(20))
}

pub fn random_tx_hash() -> TxHash {
    TxHash::new(random_hex(32))
}

/// An in-memory store with every migration applied.
pub fn memory_store() -> SqliteStore {
    SqliteStore::open_memory().expect("in-memory store")
}

/// A two-party channel whose state advances one update at a time.
#[derive(Debug, Clone)]
pub struct ChannelFixture {
    pub channel_address: ChannelAddress,
    pub alice: Address,
    pub bob: Address,
    pub alice_identifier: PublicIdentifier,
    pub bob_identifier: PublicIdentifier,
    pub chain_id: u64,
    /// Nonce of the latest update produced so far.
    pub nonce: u64,
}

impl ChannelFixture {
    /// A channel between two random identities on [`CHAIN_ID`].
    pub fn new() -> Self {
        Self::between(
            &format!("alice{}", &random_hex(8)[2..]),
            &format!("bob{}", &random_hex(8)[2..]),
            CHAIN_ID,
        )
    }

    pub fn between(alice_identifier: &str, bob_identifier: &str, chain_id: u64) -> Self {
        Self {
            channel_address: ChannelAddress::new(random_hex(20)),
            alice: random_address(),
            bob: random_address(),
            alice_identifier: PublicIdentifier::from(alice_identifier),
            bob_identifier: PublicIdentifier::from(bob_identifier),
            chain_id,
            nonce: 0,
        }
    }

    pub fn network_context(&self) -> NetworkContext {
        NetworkContext {
            chain_id: self.chain_id,
            channel_factory_address: Address::from("0x00000000000000000000000000000000000000fa"),
            transfer_registry_address: Address::from("0x00000000000000000000000000000000000000fe"),
        }
    }

    fn balance(&self, alice: &str, bob: &str) -> Balance {
        Balance {
            amount: vec![alice.to_string(), bob.to_string()],
            to: vec![self.alice.clone(), self.bob.clone()],
        }
    }

    fn next_update(&mut self, details: UpdateDetails) -> ChannelUpdate {
        self.nonce += 1;
        ChannelUpdate {
            channel_address: self.channel_address.clone(),
            from_identifier: self.alice_identifier.clone(),
            to_identifier: self.bob_identifier.clone(),
            nonce: self.nonce,
            balance: self.balance("100", "0"),
            asset_id: Address::from("0x0000000000000000000000000000000000000000"),
            details,
            alice_signature: Some(random_hex(65)),
            bob_signature: Some(random_hex(65)),
        }
    }

    /// The channel state with `latest` as its latest update.
    pub fn state(&self, latest: ChannelUpdate) -> ChannelState {
        ChannelState {
            channel_address: self.channel_address.clone(),
            alice: self.alice.clone(),
            bob: self.bob.clone(),
            alice_identifier: self.alice_identifier.clone(),
            bob_identifier: self.bob_identifier.clone(),
            network_context: self.network_context(),
            asset_ids: vec![latest.asset_id.clone()],
            balances: vec![latest.balance.clone()],
            processed_deposits_a: vec!["100".into()],
            processed_deposits_b: vec!["0".into()],
            defund_nonces: vec!["1".into()],
            timeout: "86400".into(),
            nonce: latest.nonce,
            merkle_root: random_hex(32),
            latest_update: latest,
            in_dispute: false,
        }
    }

    pub fn setup(&mut self) -> ChannelState {
        let details = UpdateDetails::Setup {
            timeout: "86400".into(),
            network_context: self.network_context(),
        };
        let update = self.next_update(details);
        self.state(update)
    }

    pub fn deposit(&mut self, total_deposits_alice: &str) -> ChannelState {
        let details = UpdateDetails::Deposit {
            total_deposits_alice: total_deposits_alice.into(),
            total_deposits_bob: "0".into(),
        };
        let update = self.next_update(details);
        self.state(update)
    }

    /// A new transfer proposed at the current nonce.
    pub fn transfer(&self, definition: &str, routing_id: Option<&str>) -> TransferState {
        TransferState {
            transfer_id: TransferId::new(random_hex(32)),
            channel_address: self.channel_address.clone(),
            channel_factory_address: self.network_context().channel_factory_address,
            chain_id: self.chain_id,
            transfer_definition: Address::from(definition),
            initiator: self.alice.clone(),
            responder: self.bob.clone(),
            initiator_identifier: self.alice_identifier.clone(),
            responder_identifier: self.bob_identifier.clone(),
            asset_id: Address::from("0x0000000000000000000000000000000000000000"),
            balance: self.balance("10", "0"),
            transfer_timeout: "3600".into(),
            transfer_state: EncodedFields::from([("lockHash".to_string(), random_hex(32))]),
            transfer_encodings: vec!["tuple(bytes32 lockHash)".into(), "tuple(bytes32 preImage)".into()],
            transfer_resolver: None,
            channel_nonce: self.nonce,
            meta: routing_id.map(|r| TransferMeta {
                routing_id: Some(RoutingId::from(r)),
                extra: EncodedFields::new(),
            }),
            in_dispute: false,
        }
    }

    /// The channel state whose latest update creates `transfer`.
    pub fn create(&mut self, transfer: &TransferState) -> ChannelState {
        let details = UpdateDetails::Create {
            transfer_id: transfer.transfer_id.clone(),
            transfer_definition: transfer.transfer_definition.clone(),
            transfer_timeout: transfer.transfer_timeout.clone(),
            balance: transfer.balance.clone(),
            meta: transfer.meta.clone(),
        };
        let update = self.next_update(details);
        self.state(update)
    }

    /// The channel state whose latest update resolves `transfer`.
    pub fn resolve(&mut self, transfer: &TransferState, resolver: EncodedFields) -> ChannelState {
        let details = UpdateDetails::Resolve {
            transfer_id: transfer.transfer_id.clone(),
            transfer_definition: transfer.transfer_definition.clone(),
            transfer_resolver: resolver,
            meta: transfer.meta.clone(),
        };
        let update = self.next_update(details);
        self.state(update)
    }

    pub fn withdraw_commitment(&self, transaction_hash: Option<TxHash>) -> WithdrawCommitment {
        WithdrawCommitment {
            channel_address: self.channel_address.clone(),
            alice: self.alice.clone(),
            bob: self.bob.clone(),
            recipient: self.alice.clone(),
            asset_id: Address::from("0x0000000000000000000000000000000000000000"),
            amount: "10".into(),
            nonce: self.nonce.to_string(),
            call_to: Address::from("0x0000000000000000000000000000000000000000"),
            call_data: "0x".into(),
            alice_signature: Some(random_hex(65)),
            bob_signature: Some(random_hex(65)),
            transaction_hash,
        }
    }
}

impl Default for ChannelFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A resolver revealing a random preimage.
pub fn preimage_resolver() -> EncodedFields {
    EncodedFields::from([("preImage".to_string(), random_hex(32))])
}

/// What a provider returns when broadcasting at `gas_price`.
pub fn transaction_response(hash: TxHash, gas_price: u128) -> TransactionResponse {
    TransactionResponse {
        hash,
        to: Address::from("0x00000000000000000000000000000000000000fa"),
        from: random_address(),
        data: "0x".into(),
        value: 0,
        chain_id: CHAIN_ID,
        nonce: 7,
        gas_limit: 500_000,
        gas_price,
    }
}

/// A receipt for `hash`. `status` is 1 for success, 0 for a revert.
pub fn transaction_receipt(hash: TxHash, status: u8) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: hash,
        contract_address: None,
        transaction_index: 3,
        root: None,
        gas_used: 48_211,
        cumulative_gas_used: 1_204_511,
        logs_bloom: random_hex(256),
        block_hash: random_hex(32),
        block_number: 17_000_000,
        logs: vec![],
        byzantium: true,
        status: Some(status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanstore_core::UpdateType;

    #[test]
    fn test_fixture_advances_nonce() {
        let mut channel = ChannelFixture::new();
        assert_eq!(channel.setup().nonce, 1);
        assert_eq!(channel.deposit("100").latest_update.update_type(), UpdateType::Deposit);

        let transfer = channel.transfer(HASHLOCK_DEFINITION, Some("r1"));
        assert_eq!(transfer.channel_nonce, 2);
        let created = channel.create(&transfer);
        assert_eq!(created.nonce, 3);
        assert_eq!(created.latest_update.transfer_id(), Some(&transfer.transfer_id));
    }

    #[test]
    fn test_random_hex_shape() {
        let hex = random_hex(20);
        assert!(hex.starts_with("0x"));
        assert_eq!(hex.len(), 42);
        assert_ne!(random_tx_hash(), random_tx_hash());
    }
}
