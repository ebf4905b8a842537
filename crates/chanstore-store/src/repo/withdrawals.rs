//! Withdrawal commitments, keyed by the withdrawal transfer's id.

use rusqlite::{params, Connection, OptionalExtension};

use chanstore_core::{
    Address, ChannelAddress, TransferId, TransferState, TxHash, UnsubmittedWithdrawal,
    WithdrawCommitment,
};

use crate::codec;
use crate::error::Result;

pub fn put(conn: &Connection, transfer_id: &TransferId, commitment: &WithdrawCommitment) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO withdraw_commitments (
            transfer_id, commitment, transaction_hash, channel_address
        ) VALUES (?1, ?2, ?3, ?4)",
        params![
            transfer_id.as_str(),
            codec::encode(commitment)?,
            commitment.transaction_hash.as_ref().map(|h| h.as_str()),
            commitment.channel_address.as_str(),
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, transfer_id: &TransferId) -> Result<Option<WithdrawCommitment>> {
    let bytes: Option<Vec<u8>> = conn
        .query_row(
            "SELECT commitment FROM withdraw_commitments WHERE transfer_id = ?1",
            params![transfer_id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    bytes
        .map(|b| codec::decode(&b, "withdraw_commitments", "commitment"))
        .transpose()
}

pub fn get_by_transaction_hash(conn: &Connection, hash: &TxHash) -> Result<Option<WithdrawCommitment>> {
    let bytes: Option<Vec<u8>> = conn
        .query_row(
            "SELECT commitment FROM withdraw_commitments WHERE transaction_hash = ?1 LIMIT 1",
            params![hash.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    bytes
        .map(|b| codec::decode(&b, "withdraw_commitments", "commitment"))
        .transpose()
}

/// Commitments of a channel never submitted on-chain, paired with their
/// withdrawal transfer of the given definition.
pub fn unsubmitted(
    conn: &Connection,
    channel_address: &ChannelAddress,
    withdrawal_definition: &Address,
) -> Result<Vec<UnsubmittedWithdrawal>> {
    let mut stmt = conn.prepare(
        "SELECT w.commitment, t.state
         FROM withdraw_commitments w
         JOIN transfers t ON t.transfer_id = w.transfer_id
         WHERE w.channel_address = ?1
           AND w.transaction_hash IS NULL
           AND t.transfer_definition = ?2
         ORDER BY t.created_at ASC, t.transfer_id ASC",
    )?;
    let rows = stmt
        .query_map(
            params![channel_address.as_str(), withdrawal_definition.as_str()],
            |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?)),
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(commitment, state)| {
            let transfer: TransferState = codec::decode(&state, "transfers", "state")?;
            Ok(UnsubmittedWithdrawal {
                commitment: codec::decode(&commitment, "withdraw_commitments", "commitment")?,
                transfer,
            })
        })
        .collect()
}
