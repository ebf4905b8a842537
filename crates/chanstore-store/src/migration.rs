//! Database schema migrations for SQLite.
//!
//! Migrations are an ordered, contiguous list starting at version 1. The
//! runner applies every migration above the recorded version, each in its
//! own transaction that also records the version, so a failure leaves the
//! previous schema intact.
//!
//! Every step is safe to re-run against a schema it has already touched:
//! tables and indexes use `IF NOT EXISTS`, columns are added only when
//! missing, backfills only touch rows not yet backfilled, and copies use
//! `INSERT OR IGNORE` on a key that is derived deterministically from the
//! row itself.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::info;

use chanstore_core::{
    now_millis, Address, ChannelAddress, StoredTransactionReceipt, TransactionAttempt,
    TransactionId, TransactionReason, TransactionStatus, TxHash, WithdrawCommitment,
};

use crate::codec;
use crate::error::{Result, StoreError};

/// A single schema step.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    apply: fn(&Connection) -> Result<()>,
}

/// Every migration, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration { version: 1, name: "initial schema", apply: v1_initial },
    Migration { version: 2, name: "created_at on channels and transfers", apply: v2_created_at },
    Migration { version: 3, name: "withdraw commitment transaction hash", apply: v3_withdraw_transaction_hash },
    Migration { version: 4, name: "disputes", apply: v4_disputes },
    Migration { version: 5, name: "copy transactions into id-keyed temp table", apply: v5_transactions_to_temp },
    Migration { version: 6, name: "drop hash-keyed transactions", apply: v6_drop_legacy_transactions },
    Migration { version: 7, name: "id-keyed transactions with attempts", apply: v7_transactions_with_attempts },
    Migration { version: 8, name: "drop transactions temp table", apply: v8_drop_temp_transactions },
    Migration { version: 9, name: "channel update log", apply: v9_channel_updates },
    Migration { version: 10, name: "transfer archive", apply: v10_transfer_archive },
];

/// Highest version in [`MIGRATIONS`].
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Apply every pending migration. Returns the resulting version.
pub fn migrate(conn: &mut Connection) -> Result<u32> {
    migrate_to(conn, latest_version())
}

/// Apply pending migrations up to and including `target`.
pub fn migrate_to(conn: &mut Connection, target: u32) -> Result<u32> {
    validate(MIGRATIONS)?;

    let latest = latest_version();
    if target > latest {
        return Err(StoreError::Migration(format!(
            "unknown target version {target}, latest is {latest}"
        )));
    }

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current = current_version(conn)?;
    if target < current {
        return Err(StoreError::Unimplemented("schema downgrade"));
    }

    for migration in MIGRATIONS
        .iter()
        .filter(|m| m.version > current && m.version <= target)
    {
        let tx = conn.transaction()?;
        (migration.apply)(&*tx).map_err(|e| {
            StoreError::Migration(format!("v{} ({}): {}", migration.version, migration.name, e))
        })?;
        tx.execute(
            "INSERT OR REPLACE INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, now_millis()],
        )?;
        tx.commit()?;

        info!(version = migration.version, name = migration.name, "applied migration");
    }

    current_version(conn)
}

/// Highest applied version, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<u32> {
    if !table_exists(conn, "schema_migrations")? {
        return Ok(0);
    }
    let version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Migrations must be numbered 1, 2, 3, ... with no gaps or reordering.
fn validate(migrations: &[Migration]) -> Result<()> {
    for (index, migration) in migrations.iter().enumerate() {
        let expected = index as u32 + 1;
        if migration.version != expected {
            return Err(StoreError::Migration(format!(
                "migration list out of order: expected v{expected}, found v{} ({})",
                migration.version, migration.name
            )));
        }
    }
    Ok(())
}

/// Transaction row shape before the primary key moved to `id`.
///
/// Rows written by old clients carry no `id` and no attempt list.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LegacyTransaction {
    #[serde(default)]
    id: Option<TransactionId>,
    transaction_hash: TxHash,
    channel_address: ChannelAddress,
    #[serde(default)]
    status: TransactionStatus,
    reason: TransactionReason,
    to: Address,
    from: Address,
    data: String,
    value: String,
    chain_id: u64,
    nonce: u64,
    #[serde(default)]
    attempts: Vec<TransactionAttempt>,
    #[serde(default)]
    receipt: Option<StoredTransactionReceipt>,
    #[serde(default)]
    error: Option<String>,
}

/// Migration v1: Initial schema.
fn v1_initial(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS channels (
            channel_address TEXT PRIMARY KEY,
            alice_identifier TEXT NOT NULL,
            bob_identifier TEXT NOT NULL,
            alice TEXT NOT NULL,
            bob TEXT NOT NULL,
            chain_id INTEGER NOT NULL,
            nonce INTEGER NOT NULL,
            state BLOB NOT NULL              -- CBOR ChannelState
        );

        CREATE TABLE IF NOT EXISTS transfers (
            transfer_id TEXT PRIMARY KEY,
            channel_address TEXT NOT NULL,
            routing_id TEXT,
            create_update_nonce INTEGER NOT NULL,
            resolve_update_nonce INTEGER NOT NULL DEFAULT 0,  -- 0 while active
            transfer_definition TEXT NOT NULL,
            state BLOB NOT NULL              -- CBOR TransferState
        );

        -- Keyed by hash; moved to a generated id in v5..v8
        CREATE TABLE IF NOT EXISTS transactions (
            transaction_hash TEXT PRIMARY KEY,
            channel_address TEXT,
            record BLOB NOT NULL
        );

        CREATE TABLE IF NOT EXISTS withdraw_commitments (
            transfer_id TEXT PRIMARY KEY,
            commitment BLOB NOT NULL         -- CBOR WithdrawCommitment
        );

        CREATE TABLE IF NOT EXISTS kv_values (
            key TEXT PRIMARY KEY,
            value BLOB
        );

        CREATE INDEX IF NOT EXISTS idx_channels_identifiers
            ON channels(alice_identifier, bob_identifier, chain_id);
        CREATE INDEX IF NOT EXISTS idx_channels_participants
            ON channels(alice, bob, chain_id);
        CREATE INDEX IF NOT EXISTS idx_transfers_routing
            ON transfers(routing_id, channel_address);
        CREATE INDEX IF NOT EXISTS idx_transfers_create_nonce
            ON transfers(create_update_nonce, channel_address);
        CREATE INDEX IF NOT EXISTS idx_transfers_resolve_nonce
            ON transfers(resolve_update_nonce, channel_address);
        "#,
    )?;
    Ok(())
}

/// Migration v2: `created_at` on channels and transfers, backfilled to now.
fn v2_created_at(conn: &Connection) -> Result<()> {
    add_column(conn, "channels", "created_at", "INTEGER NOT NULL DEFAULT 0")?;
    add_column(conn, "transfers", "created_at", "INTEGER NOT NULL DEFAULT 0")?;

    let now = now_millis();
    conn.execute("UPDATE channels SET created_at = ?1 WHERE created_at = 0", params![now])?;
    conn.execute("UPDATE transfers SET created_at = ?1 WHERE created_at = 0", params![now])?;

    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_channels_created_at ON channels(created_at);
        CREATE INDEX IF NOT EXISTS idx_transfers_created_at ON transfers(created_at);
        CREATE INDEX IF NOT EXISTS idx_transfers_resolve ON transfers(resolve_update_nonce);
        CREATE INDEX IF NOT EXISTS idx_transfers_channel ON transfers(channel_address);
        "#,
    )?;
    Ok(())
}

/// Migration v3: index withdraw commitments by submitted transaction hash.
fn v3_withdraw_transaction_hash(conn: &Connection) -> Result<()> {
    add_column(conn, "withdraw_commitments", "transaction_hash", "TEXT")?;
    backfill_commitment_column(conn, "transaction_hash", |c| {
        c.transaction_hash.as_ref().map(|h| h.to_string())
    })?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_withdraw_tx_hash ON withdraw_commitments(transaction_hash)",
        [],
    )?;
    Ok(())
}

/// Migration v4: dispute tables.
fn v4_disputes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS channel_disputes (
            channel_address TEXT PRIMARY KEY,
            dispute BLOB NOT NULL,
            disputed_channel BLOB            -- CBOR CoreChannelState, optional
        );

        CREATE TABLE IF NOT EXISTS transfer_disputes (
            transfer_id TEXT PRIMARY KEY,
            dispute BLOB NOT NULL,
            disputed_transfer BLOB           -- CBOR CoreTransferState, optional
        );
        "#,
    )?;
    Ok(())
}

/// Migration v5: index commitments by channel, and copy hash-keyed
/// transactions into `transactions2` keyed by id.
///
/// Rows without an id get their legacy hash as id, so a re-run produces the
/// same key and the copy is ignored.
fn v5_transactions_to_temp(conn: &Connection) -> Result<()> {
    add_column(conn, "withdraw_commitments", "channel_address", "TEXT")?;
    backfill_commitment_column(conn, "channel_address", |c| {
        Some(c.channel_address.to_string())
    })?;

    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_withdraw_channel ON withdraw_commitments(channel_address);

        CREATE TABLE IF NOT EXISTS transactions2 (
            id TEXT PRIMARY KEY,
            transaction_hash TEXT NOT NULL,
            record BLOB NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_transactions2_hash ON transactions2(transaction_hash);
        "#,
    )?;

    if !is_hash_keyed_transactions(conn)? {
        return Ok(());
    }

    let rows = {
        let mut stmt = conn.prepare("SELECT transaction_hash, record FROM transactions")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    for (hash, record) in rows {
        let mut legacy: LegacyTransaction = codec::decode(&record, "transactions", "record")?;
        let id = legacy
            .id
            .clone()
            .unwrap_or_else(|| TransactionId::new(hash.clone()));
        legacy.id = Some(id.clone());

        conn.execute(
            "INSERT OR IGNORE INTO transactions2 (id, transaction_hash, record) VALUES (?1, ?2, ?3)",
            params![id.as_str(), hash, codec::encode(&legacy)?],
        )?;
    }
    Ok(())
}

/// Migration v6: drop the hash-keyed table once its rows are in `transactions2`.
fn v6_drop_legacy_transactions(conn: &Connection) -> Result<()> {
    if is_hash_keyed_transactions(conn)? {
        conn.execute("DROP TABLE transactions", [])?;
    }
    Ok(())
}

/// Migration v7: recreate `transactions` keyed by id, with attempts in their
/// own append-only table, and copy rows back from `transactions2`.
fn v7_transactions_with_attempts(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            channel_address TEXT NOT NULL,
            reason TEXT NOT NULL,
            status TEXT NOT NULL,            -- submitted | mined | failed
            transaction_hash TEXT,           -- hash of the latest attempt
            to_address TEXT NOT NULL,
            from_address TEXT NOT NULL,
            call_data TEXT NOT NULL,
            value TEXT NOT NULL,
            chain_id INTEGER NOT NULL,
            tx_nonce INTEGER NOT NULL,
            receipt BLOB,                    -- CBOR StoredTransactionReceipt
            error TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS transaction_attempts (
            transaction_id TEXT NOT NULL,
            attempt_index INTEGER NOT NULL,
            transaction_hash TEXT NOT NULL,
            gas_limit TEXT NOT NULL,
            gas_price TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (transaction_id, attempt_index)
        );

        CREATE INDEX IF NOT EXISTS idx_transactions_hash ON transactions(transaction_hash);
        CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions(status);
        CREATE INDEX IF NOT EXISTS idx_transactions_channel ON transactions(channel_address);
        CREATE INDEX IF NOT EXISTS idx_attempts_hash ON transaction_attempts(transaction_hash);
        "#,
    )?;

    if !table_exists(conn, "transactions2")? {
        return Ok(());
    }

    let rows = {
        let mut stmt = conn.prepare("SELECT id, record FROM transactions2")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    let now = now_millis();
    for (id, record) in rows {
        let legacy: LegacyTransaction = codec::decode(&record, "transactions2", "record")?;
        let created_at = legacy.attempts.first().map(|a| a.created_at).unwrap_or(now);
        let receipt = legacy.receipt.as_ref().map(codec::encode).transpose()?;
        let latest_hash = legacy
            .attempts
            .last()
            .map(|a| a.transaction_hash.clone())
            .unwrap_or_else(|| legacy.transaction_hash.clone());

        conn.execute(
            "INSERT OR IGNORE INTO transactions (
                id, channel_address, reason, status, transaction_hash, to_address,
                from_address, call_data, value, chain_id, tx_nonce, receipt, error,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                id,
                legacy.channel_address.as_str(),
                legacy.reason.as_str(),
                legacy.status.as_str(),
                latest_hash.as_str(),
                legacy.to.as_str(),
                legacy.from.as_str(),
                legacy.data,
                legacy.value,
                legacy.chain_id as i64,
                legacy.nonce as i64,
                receipt,
                legacy.error,
                created_at,
                now,
            ],
        )?;

        // Rows from before attempts were tracked keep their only hash as attempt 0.
        let attempts = if legacy.attempts.is_empty() {
            vec![TransactionAttempt {
                gas_limit: "0".into(),
                gas_price: "0".into(),
                transaction_hash: legacy.transaction_hash.clone(),
                created_at,
            }]
        } else {
            legacy.attempts
        };
        for (index, attempt) in attempts.iter().enumerate() {
            conn.execute(
                "INSERT OR IGNORE INTO transaction_attempts (
                    transaction_id, attempt_index, transaction_hash, gas_limit, gas_price, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    index as i64,
                    attempt.transaction_hash.as_str(),
                    attempt.gas_limit,
                    attempt.gas_price,
                    attempt.created_at,
                ],
            )?;
        }
    }
    Ok(())
}

/// Migration v8: drop `transactions2` once the id-keyed table exists.
fn v8_drop_temp_transactions(conn: &Connection) -> Result<()> {
    if table_exists(conn, "transactions")? && column_exists(conn, "transactions", "id")? {
        conn.execute("DROP TABLE IF EXISTS transactions2", [])?;
    }
    Ok(())
}

/// Migration v9: log of every channel update the store has persisted.
fn v9_channel_updates(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS channel_updates (
            channel_address TEXT NOT NULL,
            nonce INTEGER NOT NULL,
            update_type TEXT NOT NULL,
            update_data BLOB NOT NULL,       -- CBOR ChannelUpdate
            PRIMARY KEY (channel_address, nonce)
        );
        "#,
    )?;
    Ok(())
}

/// Migration v10: history of transfers dropped from an active set.
fn v10_transfer_archive(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS transfer_archive (
            archive_id INTEGER PRIMARY KEY AUTOINCREMENT,
            transfer_id TEXT NOT NULL,
            channel_address TEXT NOT NULL,
            create_update_nonce INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            archived_at INTEGER NOT NULL,
            state BLOB NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_transfer_archive_channel
            ON transfer_archive(channel_address);
        "#,
    )?;
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![table],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns.iter().any(|c| c == column))
}

fn add_column(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<()> {
    if !column_exists(conn, table, column)? {
        conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"), [])?;
    }
    Ok(())
}

/// The pre-v5 transactions table: present and without an `id` column.
fn is_hash_keyed_transactions(conn: &Connection) -> Result<bool> {
    Ok(table_exists(conn, "transactions")? && !column_exists(conn, "transactions", "id")?)
}

/// Fill a withdraw commitment index column from the stored payload.
fn backfill_commitment_column(
    conn: &Connection,
    column: &str,
    value: impl Fn(&WithdrawCommitment) -> Option<String>,
) -> Result<()> {
    let rows = {
        let mut stmt = conn.prepare(&format!(
            "SELECT transfer_id, commitment FROM withdraw_commitments WHERE {column} IS NULL"
        ))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    for (transfer_id, bytes) in rows {
        let commitment: WithdrawCommitment =
            codec::decode(&bytes, "withdraw_commitments", "commitment")?;
        if let Some(v) = value(&commitment) {
            conn.execute(
                &format!("UPDATE withdraw_commitments SET {column} = ?1 WHERE transfer_id = ?2"),
                params![v, transfer_id],
            )?;
        }
    }
    Ok(())
}
