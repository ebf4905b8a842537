//! Builders for unit tests in this crate.

use rusqlite::Connection;

use chanstore_core::{
    Address, Balance, ChannelAddress, ChannelState, ChannelUpdate, EncodedFields, NetworkContext,
    PublicIdentifier, RoutingId, TransactionReceipt, TransactionResponse, TransferId, TransferMeta,
    TransferState, TxHash, UpdateDetails, WithdrawCommitment,
};

use crate::migration;

pub fn migrated() -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    migration::migrate(&mut conn).unwrap();
    conn
}

fn update(address: &str, nonce: u64, details: UpdateDetails) -> ChannelUpdate {
    ChannelUpdate {
        channel_address: ChannelAddress::from(address),
        from_identifier: PublicIdentifier::from("alice"),
        to_identifier: PublicIdentifier::from("bob"),
        nonce,
        balance: Balance::default(),
        asset_id: Address::from("0x0"),
        details,
        alice_signature: Some("0xsigA".into()),
        bob_signature: Some("0xsigB".into()),
    }
}

fn channel_with(address: &str, alice: &str, bob: &str, chain_id: u64, latest: ChannelUpdate) -> ChannelState {
    ChannelState {
        channel_address: ChannelAddress::from(address),
        alice: Address::new(format!("0x{alice}")),
        bob: Address::new(format!("0x{bob}")),
        alice_identifier: PublicIdentifier::from(alice),
        bob_identifier: PublicIdentifier::from(bob),
        network_context: NetworkContext {
            chain_id,
            channel_factory_address: Address::from("0xfactory"),
            transfer_registry_address: Address::from("0xregistry"),
        },
        asset_ids: vec![Address::from("0x0")],
        balances: vec![Balance::default()],
        processed_deposits_a: vec!["0".into()],
        processed_deposits_b: vec!["0".into()],
        defund_nonces: vec!["1".into()],
        timeout: "86400".into(),
        nonce: latest.nonce,
        merkle_root: "0x00".into(),
        latest_update: latest,
        in_dispute: false,
    }
}

/// A channel whose latest update is a deposit at `nonce`.
pub fn channel(address: &str, alice: &str, bob: &str, chain_id: u64, nonce: u64) -> ChannelState {
    let latest = update(
        address,
        nonce,
        UpdateDetails::Deposit {
            total_deposits_alice: "10".into(),
            total_deposits_bob: "0".into(),
        },
    );
    channel_with(address, alice, bob, chain_id, latest)
}

pub fn create_update(address: &str, nonce: u64, transfer: &TransferState) -> ChannelState {
    let latest = update(
        address,
        nonce,
        UpdateDetails::Create {
            transfer_id: transfer.transfer_id.clone(),
            transfer_definition: transfer.transfer_definition.clone(),
            transfer_timeout: transfer.transfer_timeout.clone(),
            balance: transfer.balance.clone(),
            meta: transfer.meta.clone(),
        },
    );
    channel_with(address, "alice", "bob", 1, latest)
}

pub fn resolve_update(address: &str, nonce: u64, transfer_id: &str, resolver: EncodedFields) -> ChannelState {
    let latest = update(
        address,
        nonce,
        UpdateDetails::Resolve {
            transfer_id: TransferId::from(transfer_id),
            transfer_definition: Address::from("0xwithdraw"),
            transfer_resolver: resolver,
            meta: None,
        },
    );
    channel_with(address, "alice", "bob", 1, latest)
}

pub fn transfer(id: &str, channel: &str, channel_nonce: u64, routing_id: Option<&str>) -> TransferState {
    TransferState {
        transfer_id: TransferId::from(id),
        channel_address: ChannelAddress::from(channel),
        channel_factory_address: Address::from("0xfactory"),
        chain_id: 1,
        transfer_definition: Address::from("0xwithdraw"),
        initiator: Address::from("0xalice"),
        responder: Address::from("0xbob"),
        initiator_identifier: PublicIdentifier::from("alice"),
        responder_identifier: PublicIdentifier::from("bob"),
        asset_id: Address::from("0x0"),
        balance: Balance {
            amount: vec!["5".into(), "0".into()],
            to: vec![Address::from("0xalice"), Address::from("0xbob")],
        },
        transfer_timeout: "3600".into(),
        transfer_state: EncodedFields::new(),
        transfer_encodings: vec!["tuple(bytes32 lockHash)".into()],
        transfer_resolver: None,
        channel_nonce,
        meta: routing_id.map(|r| TransferMeta {
            routing_id: Some(RoutingId::from(r)),
            extra: EncodedFields::new(),
        }),
        in_dispute: false,
    }
}

pub fn response(hash: &str, gas_price: u128) -> TransactionResponse {
    TransactionResponse {
        hash: TxHash::from(hash),
        to: Address::from("0xcontract"),
        from: Address::from("0xalice"),
        data: "0xdeadbeef".into(),
        value: 0,
        chain_id: 1,
        nonce: 9,
        gas_limit: 100_000,
        gas_price,
    }
}

pub fn receipt(hash: &str) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: TxHash::from(hash),
        contract_address: None,
        transaction_index: 0,
        root: None,
        gas_used: 21_000,
        cumulative_gas_used: 42_000,
        logs_bloom: "0x00".into(),
        block_hash: "0xblock".into(),
        block_number: 12,
        logs: vec![],
        byzantium: true,
        status: Some(1),
    }
}

pub fn commitment(channel: &str, transaction_hash: Option<&str>) -> WithdrawCommitment {
    WithdrawCommitment {
        channel_address: ChannelAddress::from(channel),
        alice: Address::from("0xalice"),
        bob: Address::from("0xbob"),
        recipient: Address::from("0xalice"),
        asset_id: Address::from("0x0"),
        amount: "5".into(),
        nonce: "1".into(),
        call_to: Address::from("0x0"),
        call_data: "0x".into(),
        alice_signature: Some("0xsigA".into()),
        bob_signature: Some("0xsigB".into()),
        transaction_hash: transaction_hash.map(TxHash::from),
    }
}
