//! Channel and transfer disputes. One row per key; a save replaces it.

use rusqlite::{params, Connection, OptionalExtension};

use chanstore_core::{
    ChannelAddress, ChannelDispute, ChannelDisputeRecord, CoreChannelState, CoreTransferState,
    TransferDispute, TransferDisputeRecord, TransferId,
};

use crate::codec;
use crate::error::Result;

pub fn put_channel(
    conn: &Connection,
    channel_address: &ChannelAddress,
    dispute: &ChannelDispute,
    disputed_channel: Option<&CoreChannelState>,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO channel_disputes (channel_address, dispute, disputed_channel)
         VALUES (?1, ?2, ?3)",
        params![
            channel_address.as_str(),
            codec::encode(dispute)?,
            disputed_channel.map(codec::encode).transpose()?,
        ],
    )?;
    Ok(())
}

pub fn get_channel(
    conn: &Connection,
    channel_address: &ChannelAddress,
) -> Result<Option<ChannelDisputeRecord>> {
    let row: Option<(Vec<u8>, Option<Vec<u8>>)> = conn
        .query_row(
            "SELECT dispute, disputed_channel FROM channel_disputes WHERE channel_address = ?1",
            params![channel_address.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    row.map(|(dispute, disputed)| {
        Ok(ChannelDisputeRecord {
            channel_address: channel_address.clone(),
            dispute: codec::decode(&dispute, "channel_disputes", "dispute")?,
            disputed_channel: disputed
                .map(|b| codec::decode(&b, "channel_disputes", "disputed_channel"))
                .transpose()?,
        })
    })
    .transpose()
}

pub fn put_transfer(
    conn: &Connection,
    transfer_id: &TransferId,
    dispute: &TransferDispute,
    disputed_transfer: Option<&CoreTransferState>,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO transfer_disputes (transfer_id, dispute, disputed_transfer)
         VALUES (?1, ?2, ?3)",
        params![
            transfer_id.as_str(),
            codec::encode(dispute)?,
            disputed_transfer.map(codec::encode).transpose()?,
        ],
    )?;
    Ok(())
}

pub fn get_transfer(
    conn: &Connection,
    transfer_id: &TransferId,
) -> Result<Option<TransferDisputeRecord>> {
    let row: Option<(Vec<u8>, Option<Vec<u8>>)> = conn
        .query_row(
            "SELECT dispute, disputed_transfer FROM transfer_disputes WHERE transfer_id = ?1",
            params![transfer_id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    row.map(|(dispute, disputed)| {
        Ok(TransferDisputeRecord {
            transfer_id: transfer_id.clone(),
            dispute: codec::decode(&dispute, "transfer_disputes", "dispute")?,
            disputed_transfer: disputed
                .map(|b| codec::decode(&b, "transfer_disputes", "disputed_transfer"))
                .transpose()?,
        })
    })
    .transpose()
}
