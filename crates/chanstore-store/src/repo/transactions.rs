//! On-chain transactions and their submission attempts.
//!
//! Status moves `submitted -> mined | failed`. Resubmitting a submitted
//! transaction appends an attempt; nothing else touches the attempt table.

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::warn;

use chanstore_core::{
    now_millis, Address, ChannelAddress, StoredTransaction, StoredTransactionReceipt,
    TransactionAttempt, TransactionId, TransactionReason, TransactionReceipt,
    TransactionResponse, TransactionStatus, TxHash,
};

use crate::codec;
use crate::error::{Result, StoreError};
use crate::repo::{parse_column, sql_int};

const SELECT: &str = "SELECT id, channel_address, reason, status, to_address, from_address,
            call_data, value, chain_id, tx_nonce, receipt, error
     FROM transactions";

struct TransactionRow {
    id: String,
    channel_address: String,
    reason: String,
    status: String,
    to: String,
    from: String,
    data: String,
    value: String,
    chain_id: i64,
    nonce: i64,
    receipt: Option<Vec<u8>>,
    error: Option<String>,
}

fn transaction_row(row: &Row<'_>) -> rusqlite::Result<TransactionRow> {
    Ok(TransactionRow {
        id: row.get(0)?,
        channel_address: row.get(1)?,
        reason: row.get(2)?,
        status: row.get(3)?,
        to: row.get(4)?,
        from: row.get(5)?,
        data: row.get(6)?,
        value: row.get(7)?,
        chain_id: row.get(8)?,
        nonce: row.get(9)?,
        receipt: row.get(10)?,
        error: row.get(11)?,
    })
}

fn attempts(conn: &Connection, id: &str) -> Result<Vec<TransactionAttempt>> {
    let mut stmt = conn.prepare(
        "SELECT gas_limit, gas_price, transaction_hash, created_at FROM transaction_attempts
         WHERE transaction_id = ?1 ORDER BY attempt_index ASC",
    )?;
    let attempts = stmt
        .query_map(params![id], |row| {
            Ok(TransactionAttempt {
                gas_limit: row.get(0)?,
                gas_price: row.get(1)?,
                transaction_hash: TxHash::new(row.get::<_, String>(2)?),
                created_at: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(attempts)
}

fn load(conn: &Connection, row: TransactionRow) -> Result<StoredTransaction> {
    let receipt: Option<StoredTransactionReceipt> = row
        .receipt
        .map(|bytes| codec::decode(&bytes, "transactions", "receipt"))
        .transpose()?;
    Ok(StoredTransaction {
        attempts: attempts(conn, &row.id)?,
        status: parse_column(&row.status, "transactions", "status")?,
        reason: parse_column(&row.reason, "transactions", "reason")?,
        id: TransactionId::new(row.id),
        channel_address: ChannelAddress::new(row.channel_address),
        to: Address::new(row.to),
        from: Address::new(row.from),
        data: row.data,
        value: row.value,
        chain_id: row.chain_id as u64,
        nonce: row.nonce as u64,
        receipt,
        error: row.error,
    })
}

fn status_of(conn: &Connection, id: &TransactionId) -> Result<Option<TransactionStatus>> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM transactions WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    status
        .map(|s| parse_column(&s, "transactions", "status"))
        .transpose()
}

fn check_transition(
    id: &TransactionId,
    from: TransactionStatus,
    to: TransactionStatus,
) -> Result<()> {
    if from.can_transition_to(to) {
        return Ok(());
    }
    warn!(transaction = %id, %from, %to, "rejected status transition");
    Err(StoreError::InvalidTransition {
        id: id.clone(),
        from,
        to,
    })
}

fn expect_stored(conn: &Connection, id: &TransactionId) -> Result<StoredTransaction> {
    get_by_id(conn, id)?
        .ok_or_else(|| StoreError::Integrity(format!("transaction {id} vanished mid-write")))
}

/// Record a (re)submission of transaction `id`.
///
/// A new transaction is created with this single attempt. An existing one
/// must still be submitted; the attempt is appended and the provider fields
/// refreshed. Reason and channel keep their first recorded values.
pub fn record_attempt(
    conn: &Connection,
    id: &TransactionId,
    channel_address: &ChannelAddress,
    reason: TransactionReason,
    response: &TransactionResponse,
) -> Result<StoredTransaction> {
    let now = now_millis();
    let attempt = TransactionAttempt::from_response(response, now);
    let chain_id = sql_int(response.chain_id, "chain_id")?;
    let tx_nonce = sql_int(response.nonce, "tx_nonce")?;

    match status_of(conn, id)? {
        Some(status) => {
            check_transition(id, status, TransactionStatus::Submitted)?;
            conn.execute(
                "UPDATE transactions SET
                    transaction_hash = ?1, to_address = ?2, from_address = ?3, call_data = ?4,
                    value = ?5, chain_id = ?6, tx_nonce = ?7, updated_at = ?8
                 WHERE id = ?9",
                params![
                    response.hash.as_str(),
                    response.to.as_str(),
                    response.from.as_str(),
                    response.data,
                    response.value.to_string(),
                    chain_id,
                    tx_nonce,
                    now,
                    id.as_str(),
                ],
            )?;
        }
        None => {
            conn.execute(
                "INSERT INTO transactions (
                    id, channel_address, reason, status, transaction_hash, to_address,
                    from_address, call_data, value, chain_id, tx_nonce, receipt, error,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, NULL, NULL, ?12, ?12)",
                params![
                    id.as_str(),
                    channel_address.as_str(),
                    reason.as_str(),
                    TransactionStatus::Submitted.as_str(),
                    response.hash.as_str(),
                    response.to.as_str(),
                    response.from.as_str(),
                    response.data,
                    response.value.to_string(),
                    chain_id,
                    tx_nonce,
                    now,
                ],
            )?;
        }
    }

    let next_index: i64 = conn.query_row(
        "SELECT COALESCE(MAX(attempt_index) + 1, 0) FROM transaction_attempts WHERE transaction_id = ?1",
        params![id.as_str()],
        |row| row.get(0),
    )?;
    conn.execute(
        "INSERT INTO transaction_attempts (
            transaction_id, attempt_index, transaction_hash, gas_limit, gas_price, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id.as_str(),
            next_index,
            attempt.transaction_hash.as_str(),
            attempt.gas_limit,
            attempt.gas_price,
            attempt.created_at,
        ],
    )?;

    expect_stored(conn, id)
}

fn finish(
    conn: &Connection,
    id: &TransactionId,
    to: TransactionStatus,
    receipt: Option<&TransactionReceipt>,
    error: Option<&str>,
) -> Result<StoredTransaction> {
    let from = status_of(conn, id)?.ok_or_else(|| {
        warn!(transaction = %id, status = %to, "status change for unknown transaction");
        StoreError::Integrity(format!("transaction {id} not found"))
    })?;
    check_transition(id, from, to)?;

    let receipt = receipt
        .map(|r| codec::encode(&StoredTransactionReceipt::from(r)))
        .transpose()?;
    conn.execute(
        "UPDATE transactions SET status = ?1, receipt = ?2, error = ?3, updated_at = ?4 WHERE id = ?5",
        params![to.as_str(), receipt, error, now_millis(), id.as_str()],
    )?;

    expect_stored(conn, id)
}

/// Mark a submitted transaction mined, storing its sanitized receipt.
pub fn record_mined(
    conn: &Connection,
    id: &TransactionId,
    receipt: &TransactionReceipt,
) -> Result<StoredTransaction> {
    finish(conn, id, TransactionStatus::Mined, Some(receipt), None)
}

/// Mark a submitted transaction failed, with the receipt if one exists.
pub fn record_failed(
    conn: &Connection,
    id: &TransactionId,
    error: &str,
    receipt: Option<&TransactionReceipt>,
) -> Result<StoredTransaction> {
    finish(conn, id, TransactionStatus::Failed, receipt, Some(error))
}

pub fn get_by_id(conn: &Connection, id: &TransactionId) -> Result<Option<StoredTransaction>> {
    let row = conn
        .query_row(
            &format!("{SELECT} WHERE id = ?1"),
            params![id.as_str()],
            transaction_row,
        )
        .optional()?;
    row.map(|row| load(conn, row)).transpose()
}

/// The transaction any of whose attempts has `hash`.
pub fn get_by_hash(conn: &Connection, hash: &TxHash) -> Result<Option<StoredTransaction>> {
    let id: Option<String> = conn
        .query_row(
            "SELECT transaction_id FROM transaction_attempts WHERE transaction_hash = ?1
             UNION ALL
             SELECT id FROM transactions WHERE transaction_hash = ?1
             LIMIT 1",
            params![hash.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    match id {
        Some(id) => get_by_id(conn, &TransactionId::new(id)),
        None => Ok(None),
    }
}

/// Submitted transactions without a receipt, oldest first.
pub fn get_active(conn: &Connection) -> Result<Vec<StoredTransaction>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT} WHERE status = ?1 AND receipt IS NULL ORDER BY created_at ASC, id ASC"
    ))?;
    let rows = stmt
        .query_map(params![TransactionStatus::Submitted.as_str()], transaction_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(|row| load(conn, row)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{migrated, receipt, response};

    #[test]
    fn test_attempts_append_in_order() {
        let conn = migrated();
        let id = TransactionId::from("tx-1");
        let channel = ChannelAddress::from("0xA");

        record_attempt(&conn, &id, &channel, TransactionReason::DepositA, &response("0x1", 10)).unwrap();
        let stored = record_attempt(
            &conn,
            &id,
            &channel,
            TransactionReason::SpeedUpTransaction,
            &response("0x2", 20),
        )
        .unwrap();

        assert_eq!(stored.status, TransactionStatus::Submitted);
        assert_eq!(stored.reason, TransactionReason::DepositA);
        let prices: Vec<&str> = stored.attempts.iter().map(|a| a.gas_price.as_str()).collect();
        assert_eq!(prices, vec!["10", "20"]);
        assert_eq!(stored.transaction_hash(), Some(&TxHash::from("0x2")));
    }

    #[test]
    fn test_lookup_by_any_attempt_hash() {
        let conn = migrated();
        let id = TransactionId::from("tx-1");
        let channel = ChannelAddress::from("0xA");
        record_attempt(&conn, &id, &channel, TransactionReason::Withdraw, &response("0x1", 10)).unwrap();
        record_attempt(&conn, &id, &channel, TransactionReason::Withdraw, &response("0x2", 20)).unwrap();

        for hash in ["0x1", "0x2"] {
            let found = get_by_hash(&conn, &TxHash::from(hash)).unwrap().unwrap();
            assert_eq!(found.id, id);
        }
        assert!(get_by_hash(&conn, &TxHash::from("0x3")).unwrap().is_none());
    }

    #[test]
    fn test_mined_is_terminal() {
        let conn = migrated();
        let id = TransactionId::from("tx-1");
        let channel = ChannelAddress::from("0xA");
        record_attempt(&conn, &id, &channel, TransactionReason::DepositB, &response("0x1", 10)).unwrap();

        let mined = record_mined(&conn, &id, &receipt("0x1")).unwrap();
        assert_eq!(mined.status, TransactionStatus::Mined);
        assert_eq!(mined.receipt.as_ref().unwrap().gas_used, "21000");
        assert!(get_active(&conn).unwrap().is_empty());

        let err = record_attempt(&conn, &id, &channel, TransactionReason::DepositB, &response("0x2", 20))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition { from: TransactionStatus::Mined, to: TransactionStatus::Submitted, .. }
        ));
        let err = record_failed(&conn, &id, "late", None).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert_eq!(get_by_id(&conn, &id).unwrap().unwrap().attempts.len(), 1);
    }

    #[test]
    fn test_failed_without_receipt() {
        let conn = migrated();
        let id = TransactionId::from("tx-1");
        record_attempt(
            &conn,
            &id,
            &ChannelAddress::from("0xA"),
            TransactionReason::DisputeChannel,
            &response("0x1", 10),
        )
        .unwrap();

        let failed = record_failed(&conn, &id, "reverted", None).unwrap();
        assert_eq!(failed.status, TransactionStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("reverted"));
        assert!(failed.receipt.is_none());
        assert!(get_active(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_transaction_is_integrity_error() {
        let conn = migrated();
        let err = record_mined(&conn, &TransactionId::from("ghost"), &receipt("0x1")).unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
        assert!(get_by_id(&conn, &TransactionId::from("ghost")).unwrap().is_none());
    }
}
