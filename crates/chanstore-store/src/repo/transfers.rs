//! Transfer rows and the active/resolved partition of a channel.
//!
//! A transfer is active while `resolve_update_nonce` is 0. The active set of
//! a channel is replaced wholesale; transfers that drop out of it without
//! being resolved are copied to `transfer_archive` first.

use std::collections::{HashMap, HashSet};

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::warn;

use chanstore_core::{
    now_millis, ArchivedTransfer, ChannelAddress, ChannelState, RoutingId, StoredTransfer,
    TransferFilter, TransferId, TransferState, UpdateDetails,
};

use crate::codec;
use crate::error::{Result, StoreError};
use crate::repo::sql_int;

const SELECT: &str = "SELECT state, create_update_nonce, resolve_update_nonce, routing_id, created_at
     FROM transfers";

type RawTransfer = (Vec<u8>, i64, i64, Option<String>, i64);

fn raw_transfer(row: &Row<'_>) -> rusqlite::Result<RawTransfer> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_transfer(raw: RawTransfer) -> Result<StoredTransfer> {
    let (state, create_update_nonce, resolve_update_nonce, routing_id, created_at) = raw;
    Ok(StoredTransfer {
        transfer: codec::decode(&state, "transfers", "state")?,
        create_update_nonce: create_update_nonce as u64,
        resolve_update_nonce: resolve_update_nonce as u64,
        routing_id: routing_id.map(RoutingId::new),
        created_at,
    })
}

fn query_transfers(
    conn: &Connection,
    sql: &str,
    values: impl IntoIterator<Item = Value>,
) -> Result<Vec<StoredTransfer>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), raw_transfer)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(decode_transfer).collect()
}

fn insert(conn: &Connection, stored: &StoredTransfer) -> Result<()> {
    let transfer = &stored.transfer;
    let create_update_nonce = sql_int(stored.create_update_nonce, "create_update_nonce")?;
    let resolve_update_nonce = sql_int(stored.resolve_update_nonce, "resolve_update_nonce")?;
    conn.execute(
        "INSERT OR REPLACE INTO transfers (
            transfer_id, channel_address, routing_id, create_update_nonce,
            resolve_update_nonce, transfer_definition, state, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            transfer.transfer_id.as_str(),
            transfer.channel_address.as_str(),
            stored.routing_id.as_ref().map(|r| r.as_str()),
            create_update_nonce,
            resolve_update_nonce,
            transfer.transfer_definition.as_str(),
            codec::encode(transfer)?,
            stored.created_at,
        ],
    )?;
    Ok(())
}

/// Refuse to overwrite a resolved transfer or one stored under another
/// channel; return the creation time of an active one so it survives the
/// rewrite.
fn existing_created_at(conn: &Connection, transfer: &TransferState) -> Result<Option<i64>> {
    match get(conn, &transfer.transfer_id)? {
        Some(existing) if existing.transfer.channel_address != transfer.channel_address => {
            warn!(
                transfer = %transfer.transfer_id,
                stored_in = %existing.transfer.channel_address,
                channel = %transfer.channel_address,
                "transfer id already used by another channel"
            );
            Err(StoreError::Integrity(format!(
                "transfer {} already belongs to channel {}",
                transfer.transfer_id, existing.transfer.channel_address
            )))
        }
        Some(existing) if !existing.is_active() => Err(StoreError::Integrity(format!(
            "transfer {} is already resolved at nonce {}",
            transfer.transfer_id, existing.resolve_update_nonce
        ))),
        Some(existing) => Ok(Some(existing.created_at)),
        None => Ok(None),
    }
}

/// Creation nonce of a transfer proposed at `channel_nonce`.
fn next_nonce(transfer: &TransferState) -> Result<u64> {
    transfer.channel_nonce.checked_add(1).ok_or_else(|| {
        StoreError::Integrity(format!(
            "transfer {} has no nonce after {}",
            transfer.transfer_id, transfer.channel_nonce
        ))
    })
}

/// Replace the active transfers of `channel_address` with `new_active`.
///
/// Each transfer is stamped with `create_update_nonce = channel_nonce + 1`.
/// Active transfers not in `new_active` are archived before deletion.
/// Returns the number archived.
pub fn save_active_transfer_set(
    conn: &Connection,
    channel_address: &ChannelAddress,
    new_active: &[TransferState],
) -> Result<usize> {
    if let Some(stray) = new_active
        .iter()
        .find(|t| t.channel_address != *channel_address)
    {
        return Err(StoreError::Integrity(format!(
            "transfer {} belongs to channel {}, not {}",
            stray.transfer_id, stray.channel_address, channel_address
        )));
    }

    let now = now_millis();
    let keep: HashSet<&TransferId> = new_active.iter().map(|t| &t.transfer_id).collect();
    let mut kept_created_at: HashMap<TransferId, i64> = HashMap::new();
    let mut archived = 0;

    for stored in active(conn, channel_address)? {
        if keep.contains(stored.transfer_id()) {
            kept_created_at.insert(stored.transfer_id().clone(), stored.created_at);
        } else {
            archive(conn, &stored, now)?;
            archived += 1;
        }
    }

    conn.execute(
        "DELETE FROM transfers WHERE channel_address = ?1 AND resolve_update_nonce = 0",
        params![channel_address.as_str()],
    )?;

    for transfer in new_active {
        let created_at = match kept_created_at.get(&transfer.transfer_id) {
            Some(created_at) => *created_at,
            None => existing_created_at(conn, transfer)?.unwrap_or(now),
        };
        let stored = StoredTransfer::active(transfer.clone(), next_nonce(transfer)?, created_at);
        insert(conn, &stored)?;
    }

    Ok(archived)
}

/// Insert the transfer created by the channel's latest (create) update.
pub fn create_on_channel_create_update(
    conn: &Connection,
    channel: &ChannelState,
    transfer: &TransferState,
) -> Result<StoredTransfer> {
    let update = &channel.latest_update;
    match &update.details {
        UpdateDetails::Create { transfer_id, .. } if *transfer_id == transfer.transfer_id => {}
        UpdateDetails::Create { transfer_id, .. } => {
            return Err(StoreError::Integrity(format!(
                "create update names transfer {}, got {}",
                transfer_id, transfer.transfer_id
            )));
        }
        _ => {
            return Err(StoreError::Integrity(format!(
                "update {} of channel {} is not a create",
                update.nonce, channel.channel_address
            )));
        }
    }
    if transfer.channel_address != channel.channel_address {
        return Err(StoreError::Integrity(format!(
            "transfer {} belongs to channel {}, not {}",
            transfer.transfer_id, transfer.channel_address, channel.channel_address
        )));
    }

    let created_at = existing_created_at(conn, transfer)?.unwrap_or_else(now_millis);
    let stored = StoredTransfer::active(transfer.clone(), update.nonce, created_at);
    insert(conn, &stored)?;
    Ok(stored)
}

/// Resolve the transfer named by the channel's latest (resolve) update.
///
/// A missing or already-resolved transfer is an integrity error.
pub fn resolve_on_channel_resolve_update(
    conn: &Connection,
    channel: &ChannelState,
) -> Result<StoredTransfer> {
    let update = &channel.latest_update;
    let (transfer_id, resolver) = match &update.details {
        UpdateDetails::Resolve {
            transfer_id,
            transfer_resolver,
            ..
        } => (transfer_id, transfer_resolver),
        _ => {
            return Err(StoreError::Integrity(format!(
                "update {} of channel {} is not a resolve",
                update.nonce, channel.channel_address
            )));
        }
    };

    let mut stored = get(conn, transfer_id)?
        .filter(|s| s.transfer.channel_address == channel.channel_address)
        .ok_or_else(|| {
            warn!(
                channel = %channel.channel_address,
                transfer = %transfer_id,
                nonce = update.nonce,
                "resolve update for unknown transfer"
            );
            StoreError::Integrity(format!(
                "transfer {} not found in channel {}",
                transfer_id, channel.channel_address
            ))
        })?;

    stored.resolve(update.nonce, resolver.clone()).map_err(|e| {
        warn!(transfer = %transfer_id, nonce = update.nonce, error = %e, "rejected resolve");
        StoreError::Integrity(e.to_string())
    })?;

    conn.execute(
        "UPDATE transfers SET resolve_update_nonce = ?1, state = ?2 WHERE transfer_id = ?3",
        params![
            sql_int(stored.resolve_update_nonce, "resolve_update_nonce")?,
            codec::encode(&stored.transfer)?,
            transfer_id.as_str(),
        ],
    )?;
    Ok(stored)
}

pub fn get(conn: &Connection, transfer_id: &TransferId) -> Result<Option<StoredTransfer>> {
    let raw = conn
        .query_row(
            &format!("{SELECT} WHERE transfer_id = ?1"),
            params![transfer_id.as_str()],
            raw_transfer,
        )
        .optional()?;
    raw.map(decode_transfer).transpose()
}

/// Active transfers of a channel, in creation order.
pub fn active(conn: &Connection, channel_address: &ChannelAddress) -> Result<Vec<StoredTransfer>> {
    query_transfers(
        conn,
        &format!(
            "{SELECT} WHERE channel_address = ?1 AND resolve_update_nonce = 0
             ORDER BY create_update_nonce ASC, transfer_id ASC"
        ),
        [Value::Text(channel_address.to_string())],
    )
}

pub fn get_by_routing_id(
    conn: &Connection,
    channel_address: &ChannelAddress,
    routing_id: &RoutingId,
) -> Result<Option<StoredTransfer>> {
    let raw = conn
        .query_row(
            &format!(
                "{SELECT} WHERE routing_id = ?1 AND channel_address = ?2
                 ORDER BY created_at DESC LIMIT 1"
            ),
            params![routing_id.as_str(), channel_address.as_str()],
            raw_transfer,
        )
        .optional()?;
    raw.map(decode_transfer).transpose()
}

/// Every hop of a routed transfer, across channels.
pub fn get_all_by_routing_id(conn: &Connection, routing_id: &RoutingId) -> Result<Vec<StoredTransfer>> {
    query_transfers(
        conn,
        &format!("{SELECT} WHERE routing_id = ?1 ORDER BY created_at ASC, transfer_id ASC"),
        [Value::Text(routing_id.to_string())],
    )
}

/// Transfers matching every set field of `filter`.
pub fn query(conn: &Connection, filter: &TransferFilter) -> Result<Vec<StoredTransfer>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(channel) = &filter.channel_address {
        clauses.push("channel_address = ?");
        values.push(Value::Text(channel.to_string()));
    }
    if let Some(start) = filter.start_date {
        clauses.push("created_at >= ?");
        values.push(Value::Integer(start));
    }
    if let Some(end) = filter.end_date {
        clauses.push("created_at < ?");
        values.push(Value::Integer(end));
    }
    if filter.active_only {
        clauses.push("resolve_update_nonce = 0");
    }
    if let Some(routing_id) = &filter.routing_id {
        clauses.push("routing_id = ?");
        values.push(Value::Text(routing_id.to_string()));
    }
    if let Some(definition) = &filter.transfer_definition {
        clauses.push("transfer_definition = ?");
        values.push(Value::Text(definition.to_string()));
    }

    let mut sql = SELECT.to_string();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at ASC, transfer_id ASC");

    query_transfers(conn, &sql, values)
}

fn archive(conn: &Connection, stored: &StoredTransfer, archived_at: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO transfer_archive (
            transfer_id, channel_address, create_update_nonce, created_at, archived_at, state
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            stored.transfer_id().as_str(),
            stored.transfer.channel_address.as_str(),
            sql_int(stored.create_update_nonce, "create_update_nonce")?,
            stored.created_at,
            archived_at,
            codec::encode(&stored.transfer)?,
        ],
    )?;
    Ok(())
}

/// Transfers dropped from the channel's active set, oldest first.
pub fn archived(conn: &Connection, channel_address: &ChannelAddress) -> Result<Vec<ArchivedTransfer>> {
    let mut stmt = conn.prepare(
        "SELECT state, create_update_nonce, created_at, archived_at FROM transfer_archive
         WHERE channel_address = ?1 ORDER BY archive_id ASC",
    )?;
    let rows = stmt
        .query_map(params![channel_address.as_str()], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(state, create_update_nonce, created_at, archived_at)| {
            Ok(ArchivedTransfer {
                transfer: codec::decode(&state, "transfer_archive", "state")?,
                create_update_nonce: create_update_nonce as u64,
                created_at,
                archived_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_update, migrated, resolve_update, transfer};
    use chanstore_core::EncodedFields;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn ids(transfers: &[StoredTransfer]) -> Vec<&str> {
        transfers.iter().map(|t| t.transfer_id().as_str()).collect()
    }

    #[test]
    fn test_active_set_replaced_and_superseded_archived() {
        let conn = migrated();
        let channel = ChannelAddress::from("0xA");

        let first = [transfer("t1", "0xA", 3, None), transfer("t2", "0xA", 4, None)];
        assert_eq!(save_active_transfer_set(&conn, &channel, &first).unwrap(), 0);
        let stored = active(&conn, &channel).unwrap();
        assert_eq!(ids(&stored), vec!["t1", "t2"]);
        assert_eq!(stored[0].create_update_nonce, 4);
        assert_eq!(stored[1].create_update_nonce, 5);

        let second = [transfer("t2", "0xA", 4, None), transfer("t3", "0xA", 6, None)];
        assert_eq!(save_active_transfer_set(&conn, &channel, &second).unwrap(), 1);
        assert_eq!(ids(&active(&conn, &channel).unwrap()), vec!["t2", "t3"]);
        assert!(get(&conn, &TransferId::from("t1")).unwrap().is_none());

        let archive = archived(&conn, &channel).unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive[0].transfer.transfer_id, TransferId::from("t1"));
        assert_eq!(archive[0].create_update_nonce, 4);
    }

    #[test]
    fn test_active_set_rejects_foreign_channel() {
        let conn = migrated();
        let err = save_active_transfer_set(
            &conn,
            &ChannelAddress::from("0xA"),
            &[transfer("t1", "0xB", 1, None)],
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
    }

    #[test]
    fn test_transfer_id_of_another_channel_is_not_taken_over() {
        let conn = migrated();
        let channel_b = ChannelAddress::from("0xB");
        save_active_transfer_set(&conn, &channel_b, &[transfer("t1", "0xB", 2, None)]).unwrap();

        let t1_in_a = transfer("t1", "0xA", 4, None);
        let err = create_on_channel_create_update(&conn, &create_update("0xA", 5, &t1_in_a), &t1_in_a)
            .unwrap_err();
        assert!(matches!(err, StoreError::Integrity(ref msg) if msg.contains("0xB")));

        let err = save_active_transfer_set(&conn, &ChannelAddress::from("0xA"), &[t1_in_a]).unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));

        assert_eq!(ids(&active(&conn, &channel_b).unwrap()), vec!["t1"]);
        assert!(archived(&conn, &channel_b).unwrap().is_empty());
    }

    #[test]
    fn test_nonces_beyond_storable_range_rejected() {
        let conn = migrated();
        let channel = ChannelAddress::from("0xA");

        let err = save_active_transfer_set(&conn, &channel, &[transfer("t1", "0xA", u64::MAX, None)])
            .unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));

        let err = save_active_transfer_set(&conn, &channel, &[transfer("t2", "0xA", i64::MAX as u64, None)])
            .unwrap_err();
        assert!(matches!(err, StoreError::Integrity(ref msg) if msg.contains("create_update_nonce")));
        assert!(active(&conn, &channel).unwrap().is_empty());
    }

    #[test]
    fn test_create_then_resolve() {
        let conn = migrated();
        let t1 = transfer("t1", "0xA", 4, Some("r1"));

        let created = create_on_channel_create_update(&conn, &create_update("0xA", 5, &t1), &t1).unwrap();
        assert_eq!(created.create_update_nonce, 5);
        assert_eq!(created.resolve_update_nonce, 0);
        assert_eq!(created.routing_id, Some(RoutingId::from("r1")));

        let mut resolver = EncodedFields::new();
        resolver.insert("preImage".into(), "0xbeef".into());
        let resolved =
            resolve_on_channel_resolve_update(&conn, &resolve_update("0xA", 6, "t1", resolver.clone()))
                .unwrap();
        assert_eq!(resolved.resolve_update_nonce, 6);

        let stored = get(&conn, &TransferId::from("t1")).unwrap().unwrap();
        assert_eq!(stored.resolve_update_nonce, 6);
        assert_eq!(stored.transfer.transfer_resolver, Some(resolver));
        assert!(active(&conn, &ChannelAddress::from("0xA")).unwrap().is_empty());
    }

    #[test]
    fn test_resolve_missing_transfer_is_integrity_error() {
        let conn = migrated();
        let err = resolve_on_channel_resolve_update(
            &conn,
            &resolve_update("0xA", 6, "ghost", EncodedFields::new()),
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
    }

    #[test]
    fn test_resolve_twice_is_integrity_error() {
        let conn = migrated();
        let t1 = transfer("t1", "0xA", 4, None);
        create_on_channel_create_update(&conn, &create_update("0xA", 5, &t1), &t1).unwrap();
        resolve_on_channel_resolve_update(&conn, &resolve_update("0xA", 6, "t1", EncodedFields::new()))
            .unwrap();

        let err = resolve_on_channel_resolve_update(
            &conn,
            &resolve_update("0xA", 7, "t1", EncodedFields::new()),
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
        assert_eq!(get(&conn, &TransferId::from("t1")).unwrap().unwrap().resolve_update_nonce, 6);
    }

    #[test]
    fn test_create_with_mismatched_transfer_rejected() {
        let conn = migrated();
        let t1 = transfer("t1", "0xA", 4, None);
        let t2 = transfer("t2", "0xA", 4, None);
        let err = create_on_channel_create_update(&conn, &create_update("0xA", 5, &t1), &t2).unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
    }

    #[test]
    fn test_filter_is_conjunctive_and_half_open() {
        let conn = migrated();
        save_active_transfer_set(
            &conn,
            &ChannelAddress::from("0xA"),
            &[transfer("t1", "0xA", 1, Some("r1")), transfer("t2", "0xA", 2, Some("r2"))],
        )
        .unwrap();
        save_active_transfer_set(
            &conn,
            &ChannelAddress::from("0xB"),
            &[transfer("t3", "0xB", 1, Some("r1"))],
        )
        .unwrap();
        conn.execute("UPDATE transfers SET created_at = 100 WHERE transfer_id = 't1'", []).unwrap();
        conn.execute("UPDATE transfers SET created_at = 200 WHERE transfer_id = 't2'", []).unwrap();
        conn.execute("UPDATE transfers SET created_at = 300 WHERE transfer_id = 't3'", []).unwrap();

        let all = query(&conn, &TransferFilter::new()).unwrap();
        assert_eq!(ids(&all), vec!["t1", "t2", "t3"]);

        let window = query(&conn, &TransferFilter::new().created_between(Some(100), Some(300))).unwrap();
        assert_eq!(ids(&window), vec!["t1", "t2"]);

        let routed = query(
            &conn,
            &TransferFilter::new()
                .routing_id(RoutingId::from("r1"))
                .channel(ChannelAddress::from("0xB")),
        )
        .unwrap();
        assert_eq!(ids(&routed), vec!["t3"]);

        assert_eq!(ids(&get_all_by_routing_id(&conn, &RoutingId::from("r1")).unwrap()), vec!["t1", "t3"]);
        let hop = get_by_routing_id(&conn, &ChannelAddress::from("0xA"), &RoutingId::from("r1"))
            .unwrap()
            .unwrap();
        assert_eq!(hop.transfer_id().as_str(), "t1");
    }

    proptest! {
        #[test]
        fn test_active_set_matches_last_save(
            sets in prop::collection::vec(prop::collection::btree_set(0u8..8, 0..5), 1..6),
        ) {
            let conn = migrated();
            let channel = ChannelAddress::from("0xA");
            let mut previous: BTreeSet<u8> = BTreeSet::new();
            let mut expected_archived = 0;

            for set in &sets {
                let transfers: Vec<TransferState> = set
                    .iter()
                    .map(|n| transfer(&format!("t{n}"), "0xA", u64::from(*n), None))
                    .collect();
                let archived = save_active_transfer_set(&conn, &channel, &transfers).unwrap();
                prop_assert_eq!(archived, previous.difference(set).count());
                expected_archived += archived;
                previous = set.clone();
            }

            let active_ids: BTreeSet<String> = active(&conn, &channel)
                .unwrap()
                .iter()
                .map(|t| t.transfer_id().to_string())
                .collect();
            let expected: BTreeSet<String> = previous.iter().map(|n| format!("t{n}")).collect();
            prop_assert_eq!(active_ids, expected);
            prop_assert_eq!(archived(&conn, &channel).unwrap().len(), expected_archived);
        }
    }
}
