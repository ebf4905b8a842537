//! Log of persisted channel updates, keyed by `(channel_address, nonce)`.

use rusqlite::{params, Connection, OptionalExtension};

use chanstore_core::{ChannelAddress, ChannelUpdate};

use crate::codec;
use crate::error::Result;
use crate::repo::sql_int;

/// Record an update. Saving the same nonce again overwrites it.
pub fn put(conn: &Connection, update: &ChannelUpdate) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO channel_updates (channel_address, nonce, update_type, update_data)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            update.channel_address.as_str(),
            sql_int(update.nonce, "nonce")?,
            update.update_type().as_str(),
            codec::encode(update)?,
        ],
    )?;
    Ok(())
}

pub fn get(
    conn: &Connection,
    channel_address: &ChannelAddress,
    nonce: u64,
) -> Result<Option<ChannelUpdate>> {
    let Ok(nonce) = i64::try_from(nonce) else {
        return Ok(None);
    };
    let bytes: Option<Vec<u8>> = conn
        .query_row(
            "SELECT update_data FROM channel_updates WHERE channel_address = ?1 AND nonce = ?2",
            params![channel_address.as_str(), nonce],
            |row| row.get(0),
        )
        .optional()?;
    bytes
        .map(|b| codec::decode(&b, "channel_updates", "update_data"))
        .transpose()
}
