//! Channel rows.

use rusqlite::{params, Connection, OptionalExtension};

use chanstore_core::{now_millis, ChannelAddress, ChannelState, PublicIdentifier, StoredChannel};

use crate::codec;
use crate::error::Result;
use crate::repo::sql_int;

/// Insert or replace a channel. `created_at` of an existing row is kept.
pub fn put(conn: &Connection, channel: &ChannelState) -> Result<()> {
    conn.execute(
        "INSERT INTO channels (
            channel_address, alice_identifier, bob_identifier, alice, bob,
            chain_id, nonce, state, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(channel_address) DO UPDATE SET
            alice_identifier = excluded.alice_identifier,
            bob_identifier = excluded.bob_identifier,
            alice = excluded.alice,
            bob = excluded.bob,
            chain_id = excluded.chain_id,
            nonce = excluded.nonce,
            state = excluded.state",
        params![
            channel.channel_address.as_str(),
            channel.alice_identifier.as_str(),
            channel.bob_identifier.as_str(),
            channel.alice.as_str(),
            channel.bob.as_str(),
            sql_int(channel.chain_id(), "chain_id")?,
            sql_int(channel.nonce, "nonce")?,
            codec::encode(channel)?,
            now_millis(),
        ],
    )?;
    Ok(())
}

pub fn get_by_address(conn: &Connection, address: &ChannelAddress) -> Result<Option<ChannelState>> {
    let state: Option<Vec<u8>> = conn
        .query_row(
            "SELECT state FROM channels WHERE channel_address = ?1",
            params![address.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    state
        .map(|bytes| codec::decode(&bytes, "channels", "state"))
        .transpose()
}

/// Every channel, oldest first.
pub fn get_all(conn: &Connection) -> Result<Vec<ChannelState>> {
    let mut stmt =
        conn.prepare("SELECT state FROM channels ORDER BY created_at ASC, channel_address ASC")?;
    let blobs = stmt
        .query_map([], |row| row.get::<_, Vec<u8>>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    blobs
        .iter()
        .map(|bytes| codec::decode(bytes, "channels", "state"))
        .collect()
}

/// The channel between two identities on a chain, in either role order.
///
/// Probes `(a, b)` as `(alice, bob)` first, then `(b, a)`.
pub fn get_by_participants(
    conn: &Connection,
    a: &PublicIdentifier,
    b: &PublicIdentifier,
    chain_id: u64,
) -> Result<Option<ChannelState>> {
    let Ok(chain_id) = i64::try_from(chain_id) else {
        return Ok(None);
    };
    for (alice, bob) in [(a, b), (b, a)] {
        let state: Option<Vec<u8>> = conn
            .query_row(
                "SELECT state FROM channels
                 WHERE alice_identifier = ?1 AND bob_identifier = ?2 AND chain_id = ?3
                 ORDER BY created_at ASC LIMIT 1",
                params![alice.as_str(), bob.as_str(), chain_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(bytes) = state {
            return codec::decode(&bytes, "channels", "state").map(Some);
        }
    }
    Ok(None)
}

/// The channel with the time it was first written.
pub fn get_stored(conn: &Connection, address: &ChannelAddress) -> Result<Option<StoredChannel>> {
    let row: Option<(Vec<u8>, i64)> = conn
        .query_row(
            "SELECT state, created_at FROM channels WHERE channel_address = ?1",
            params![address.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    row.map(|(bytes, created_at)| {
        Ok(StoredChannel {
            state: codec::decode(&bytes, "channels", "state")?,
            created_at,
        })
    })
    .transpose()
}
