//! CBOR encoding for row payload columns.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StoreError};

/// Encode a value as CBOR for a BLOB column.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

/// Decode a CBOR BLOB column, naming the column on failure.
pub fn decode<T: DeserializeOwned>(bytes: &[u8], table: &str, column: &str) -> Result<T> {
    ciborium::from_reader(bytes)
        .map_err(|e| StoreError::Serialization(format!("{table}.{column}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanstore_core::{Balance, TransferMeta};

    #[test]
    fn test_decode_reports_column() {
        let err = decode::<Balance>(&[0xff, 0x00], "transfers", "state").unwrap_err();
        assert!(err.to_string().contains("transfers.state"));
    }

    #[test]
    fn test_meta_default_extra() {
        let meta = TransferMeta::default();
        let bytes = encode(&meta).unwrap();
        let back: TransferMeta = decode(&bytes, "t", "c").unwrap();
        assert_eq!(back, meta);
    }
}
