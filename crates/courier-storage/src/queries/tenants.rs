// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant settings table.

use chrono::{DateTime, Utc};
use courier_core::{CourierError, RateOverride, TenantId, TenantSettings};
use rusqlite::params;

use super::to_millis;
use crate::database::{Database, map_tr_err};

/// All tenants, ordered by id.
pub async fn list_tenants(db: &Database) -> Result<Vec<TenantSettings>, CourierError> {
    db.connection()
        .call(|conn| -> Result<Vec<TenantSettings>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT tenant_id, enabled, baseline_rate, burst_ceiling, hard_guardrail,
                        recipient_min_gap_secs, max_backoff_secs
                 FROM tenant_settings ORDER BY tenant_id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(TenantSettings {
                        tenant_id: TenantId(row.get(0)?),
                        enabled: row.get(1)?,
                        overrides: RateOverride {
                            baseline_rate: row.get(2)?,
                            burst_ceiling: row.get(3)?,
                            hard_guardrail: row.get(4)?,
                            recipient_min_gap_secs: row.get(5)?,
                            max_backoff_secs: row.get(6)?,
                        },
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or fully replace a tenant's settings.
pub async fn upsert_tenant(
    db: &Database,
    settings: &TenantSettings,
    now: DateTime<Utc>,
) -> Result<(), CourierError> {
    let s = settings.clone();
    let now_ms = to_millis(now);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO tenant_settings
                    (tenant_id, enabled, baseline_rate, burst_ceiling, hard_guardrail,
                     recipient_min_gap_secs, max_backoff_secs, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT (tenant_id) DO UPDATE SET
                    enabled = excluded.enabled,
                    baseline_rate = excluded.baseline_rate,
                    burst_ceiling = excluded.burst_ceiling,
                    hard_guardrail = excluded.hard_guardrail,
                    recipient_min_gap_secs = excluded.recipient_min_gap_secs,
                    max_backoff_secs = excluded.max_backoff_secs,
                    updated_at = excluded.updated_at",
                params![
                    s.tenant_id.0,
                    s.enabled,
                    s.overrides.baseline_rate,
                    s.overrides.burst_ceiling,
                    s.overrides.hard_guardrail,
                    s.overrides.recipient_min_gap_secs,
                    s.overrides.max_backoff_secs,
                    now_ms,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Enable or disable a tenant, creating it with no overrides if unknown.
pub async fn set_enabled(
    db: &Database,
    tenant: &TenantId,
    enabled: bool,
    now: DateTime<Utc>,
) -> Result<(), CourierError> {
    let tenant = tenant.0.clone();
    let now_ms = to_millis(now);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO tenant_settings (tenant_id, enabled, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (tenant_id) DO UPDATE SET
                    enabled = excluded.enabled,
                    updated_at = excluded.updated_at",
                params![tenant, enabled, now_ms],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Remove a tenant. Returns whether a row existed.
pub async fn delete_tenant(db: &Database, tenant: &TenantId) -> Result<bool, CourierError> {
    let tenant = tenant.0.clone();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed =
                conn.execute("DELETE FROM tenant_settings WHERE tenant_id = ?1", params![tenant])?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn upsert_enable_and_delete() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        let now = Utc::now();

        set_enabled(&db, &TenantId::from("beta"), false, now).await.unwrap();
        upsert_tenant(
            &db,
            &TenantSettings {
                tenant_id: TenantId::from("alpha"),
                enabled: true,
                overrides: RateOverride {
                    burst_ceiling: Some(10),
                    ..RateOverride::default()
                },
            },
            now,
        )
        .await
        .unwrap();

        let tenants = list_tenants(&db).await.unwrap();
        assert_eq!(tenants.len(), 2);
        assert_eq!(tenants[0].tenant_id, TenantId::from("alpha"));
        assert_eq!(tenants[0].overrides.burst_ceiling, Some(10));
        assert!(!tenants[1].enabled);

        // Toggling keeps overrides.
        set_enabled(&db, &TenantId::from("alpha"), false, now).await.unwrap();
        let tenants = list_tenants(&db).await.unwrap();
        assert!(!tenants[0].enabled);
        assert_eq!(tenants[0].overrides.burst_ceiling, Some(10));

        assert!(delete_tenant(&db, &TenantId::from("beta")).await.unwrap());
        assert!(!delete_tenant(&db, &TenantId::from("beta")).await.unwrap());
    }
}
