//! Row access per concern.
//!
//! Each submodule owns the SQL for one group of tables and works on a
//! borrowed connection. The facade composes them inside one transaction, so
//! nothing here commits on its own.

pub mod channels;
pub mod disputes;
pub mod transactions;
pub mod transfers;
pub mod updates;
pub mod withdrawals;

use std::fmt;
use std::str::FromStr;

use rusqlite::Connection;

use chanstore_core::CoreError;

use crate::error::{Result, StoreError};

/// A logical table of the store.
///
/// Some logical tables span more than one SQL table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    Channels,
    ChannelUpdates,
    Transfers,
    TransferArchive,
    /// Transactions and their attempts.
    Transactions,
    WithdrawCommitments,
    ChannelDisputes,
    TransferDisputes,
    Values,
}

impl Table {
    pub const ALL: [Table; 9] = [
        Table::Channels,
        Table::ChannelUpdates,
        Table::Transfers,
        Table::TransferArchive,
        Table::Transactions,
        Table::WithdrawCommitments,
        Table::ChannelDisputes,
        Table::TransferDisputes,
        Table::Values,
    ];

    /// SQL tables backing this logical table.
    pub fn table_names(&self) -> &'static [&'static str] {
        match self {
            Table::Channels => &["channels"],
            Table::ChannelUpdates => &["channel_updates"],
            Table::Transfers => &["transfers"],
            Table::TransferArchive => &["transfer_archive"],
            Table::Transactions => &["transactions", "transaction_attempts"],
            Table::WithdrawCommitments => &["withdraw_commitments"],
            Table::ChannelDisputes => &["channel_disputes"],
            Table::TransferDisputes => &["transfer_disputes"],
            Table::Values => &["kv_values"],
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_names()[0])
    }
}

/// Delete every row backing `table`.
pub fn clear_table(conn: &Connection, table: Table) -> Result<usize> {
    let mut deleted = 0;
    for name in table.table_names() {
        deleted += conn.execute(&format!("DELETE FROM {name}"), [])?;
    }
    Ok(deleted)
}

/// Parse an enum stored as text, reporting the column on failure.
pub(crate) fn parse_column<T>(value: &str, table: &str, column: &str) -> Result<T>
where
    T: FromStr<Err = CoreError>,
{
    value
        .parse()
        .map_err(|e: CoreError| StoreError::Integrity(format!("{table}.{column}: {e}")))
}

/// A `u64` as an SQLite INTEGER. Values past `i64::MAX` would wrap and
/// break numeric ordering, so they are refused.
pub(crate) fn sql_int(value: u64, column: &str) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::Integrity(format!("{column} {value} exceeds the storable range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanstore_core::TransactionStatus;

    #[test]
    fn test_every_table_has_backing_sql_table() {
        let mut conn = Connection::open_in_memory().unwrap();
        crate::migration::migrate(&mut conn).unwrap();
        for table in Table::ALL {
            assert_eq!(clear_table(&conn, table).unwrap(), 0, "{table}");
        }
    }

    #[test]
    fn test_parse_column_reports_location() {
        let status: TransactionStatus = parse_column("mined", "transactions", "status").unwrap();
        assert_eq!(status, TransactionStatus::Mined);

        let err = parse_column::<TransactionStatus>("pending", "transactions", "status").unwrap_err();
        assert!(matches!(err, StoreError::Integrity(ref msg) if msg.contains("transactions.status")));
    }

    #[test]
    fn test_sql_int_refuses_wrapping_values() {
        assert_eq!(sql_int(i64::MAX as u64, "nonce").unwrap(), i64::MAX);
        let err = sql_int(i64::MAX as u64 + 1, "nonce").unwrap_err();
        assert!(matches!(err, StoreError::Integrity(ref msg) if msg.contains("nonce")));
    }
}
