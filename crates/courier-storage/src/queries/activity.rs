// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recipient inbound activity, used for the free-messaging window check.

use chrono::{DateTime, Utc};
use courier_core::{CourierError, RecipientId, TenantId};
use rusqlite::{OptionalExtension, params};

use super::{from_millis, to_millis};
use crate::database::{Database, map_tr_err};

/// Record an inbound message. Older timestamps never overwrite newer ones.
pub async fn record_inbound(
    db: &Database,
    tenant: &TenantId,
    recipient: &RecipientId,
    at: DateTime<Utc>,
) -> Result<(), CourierError> {
    let tenant = tenant.0.clone();
    let recipient = recipient.0.clone();
    let at_ms = to_millis(at);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO recipient_activity (tenant_id, recipient_id, last_inbound_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (tenant_id, recipient_id)
                 DO UPDATE SET last_inbound_at = MAX(last_inbound_at, excluded.last_inbound_at)",
                params![tenant, recipient, at_ms],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Last inbound message time for the recipient, if any.
pub async fn last_inbound(
    db: &Database,
    tenant: &TenantId,
    recipient: &RecipientId,
) -> Result<Option<DateTime<Utc>>, CourierError> {
    let tenant = tenant.0.clone();
    let recipient = recipient.0.clone();
    let ms = db
        .connection()
        .call(move |conn| -> Result<Option<i64>, rusqlite::Error> {
            conn.query_row(
                "SELECT last_inbound_at FROM recipient_activity
                 WHERE tenant_id = ?1 AND recipient_id = ?2",
                params![tenant, recipient],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;
    Ok(ms.map(from_millis))
}
