// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message task queue operations.

use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_core::{
    CourierError, MessageTask, NewTask, PolicyTag, RecipientId, StatusCounts, TaskId, TaskStatus,
    TenantId,
};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};

use super::{from_millis, to_millis};
use crate::database::{Database, map_tr_err};

const TASK_COLUMNS: &str = "id, tenant_id, recipient_id, body, policy_tag, priority, \
     idempotency_key, status, retry_count, not_before, created_at, updated_at, claimed_at, \
     completed_at, error_message, provider_message_id";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<MessageTask> {
    let policy_tag: Option<String> = row.get(4)?;
    let policy_tag = policy_tag
        .map(|t| {
            t.parse::<PolicyTag>()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))
        })
        .transpose()?;
    let status: String = row.get(7)?;
    let status = status
        .parse::<TaskStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;

    Ok(MessageTask {
        id: TaskId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        recipient_id: RecipientId(row.get(2)?),
        body: row.get(3)?,
        policy_tag,
        priority: row.get(5)?,
        idempotency_key: row.get(6)?,
        status,
        retry_count: row.get(8)?,
        not_before: from_millis(row.get(9)?),
        created_at: from_millis(row.get(10)?),
        updated_at: from_millis(row.get(11)?),
        claimed_at: row.get::<_, Option<i64>>(12)?.map(from_millis),
        completed_at: row.get::<_, Option<i64>>(13)?.map(from_millis),
        error_message: row.get(14)?,
        provider_message_id: row.get(15)?,
    })
}

enum Inserted {
    Fresh(i64),
    Existing(i64),
}

/// Insert a new `queued` task.
///
/// A second insert with the same `(tenant_id, idempotency_key)` creates no row
/// and fails with [`CourierError::DuplicateKey`] carrying the existing id.
pub async fn enqueue(
    db: &Database,
    task: &NewTask,
    now: DateTime<Utc>,
) -> Result<TaskId, CourierError> {
    let task = task.clone();
    let key = task.idempotency_key.clone();
    let now_ms = to_millis(now);
    let not_before = task.not_before.map(to_millis).unwrap_or(now_ms);

    let inserted = db
        .connection()
        .call(move |conn| -> Result<Inserted, rusqlite::Error> {
            let changed = conn.execute(
                "INSERT INTO message_tasks
                    (tenant_id, recipient_id, body, policy_tag, priority, idempotency_key,
                     status, retry_count, not_before, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'queued', 0, ?7, ?8, ?8)
                 ON CONFLICT (tenant_id, idempotency_key) DO NOTHING",
                params![
                    task.tenant_id.0,
                    task.recipient_id.0,
                    task.body,
                    task.policy_tag.map(|t| t.to_string()),
                    task.priority,
                    task.idempotency_key,
                    not_before,
                    now_ms,
                ],
            )?;
            if changed == 1 {
                return Ok(Inserted::Fresh(conn.last_insert_rowid()));
            }
            let existing: i64 = conn.query_row(
                "SELECT id FROM message_tasks WHERE tenant_id = ?1 AND idempotency_key = ?2",
                params![task.tenant_id.0, task.idempotency_key],
                |row| row.get(0),
            )?;
            Ok(Inserted::Existing(existing))
        })
        .await
        .map_err(map_tr_err)?;

    match inserted {
        Inserted::Fresh(id) => Ok(TaskId(id)),
        Inserted::Existing(id) => Err(CourierError::DuplicateKey {
            idempotency_key: key,
            existing: TaskId(id),
        }),
    }
}

/// Claim the next eligible task for `tenant`.
///
/// A single conditional `UPDATE ... RETURNING`: the row is selected and moved
/// to `sending` in one statement, so two callers never receive the same task.
pub async fn claim_next(
    db: &Database,
    tenant: &TenantId,
    now: DateTime<Utc>,
) -> Result<Option<MessageTask>, CourierError> {
    let tenant = tenant.0.clone();
    let now_ms = to_millis(now);
    db.connection()
        .call(move |conn| -> Result<Option<MessageTask>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "UPDATE message_tasks
                     SET status = 'sending', claimed_at = ?2, updated_at = ?2
                     WHERE id = (
                         SELECT id FROM message_tasks
                         WHERE tenant_id = ?1 AND status = 'queued' AND not_before <= ?2
                         ORDER BY priority DESC, created_at ASC, id ASC
                         LIMIT 1
                     ) AND status = 'queued'
                     RETURNING {TASK_COLUMNS}"
                ),
                params![tenant, now_ms],
                task_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Outcome of a conditional status update.
enum Transition {
    Applied,
    Missing,
    Rejected(String),
}

fn transition_outcome(
    conn: &rusqlite::Connection,
    id: i64,
    changed: usize,
) -> rusqlite::Result<Transition> {
    if changed > 0 {
        return Ok(Transition::Applied);
    }
    let current: Option<String> = conn
        .query_row(
            "SELECT status FROM message_tasks WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(match current {
        Some(status) => Transition::Rejected(status),
        None => Transition::Missing,
    })
}

fn finish_transition(id: TaskId, to: TaskStatus, outcome: Transition) -> Result<(), CourierError> {
    match outcome {
        Transition::Applied => Ok(()),
        Transition::Missing => Err(CourierError::TaskNotFound(id)),
        Transition::Rejected(from) => {
            let from = from
                .parse::<TaskStatus>()
                .map_err(|e| CourierError::storage(format!("task {id} has unknown status: {e}")))?;
            Err(CourierError::InvalidTransition { id, from, to })
        }
    }
}

/// Move a `sending` task to a terminal status.
pub async fn mark_terminal(
    db: &Database,
    id: TaskId,
    status: TaskStatus,
    error_message: Option<&str>,
    provider_message_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), CourierError> {
    if !status.is_terminal() {
        return Err(CourierError::InvalidTransition {
            id,
            from: TaskStatus::Sending,
            to: status,
        });
    }
    let error_message = error_message.map(str::to_string);
    let provider_message_id = provider_message_id.map(str::to_string);
    let status_str = status.to_string();
    let now_ms = to_millis(now);
    let raw = id.0;

    let outcome = db
        .connection()
        .call(move |conn| -> Result<Transition, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE message_tasks
                 SET status = ?2,
                     error_message = COALESCE(?3, error_message),
                     provider_message_id = COALESCE(?4, provider_message_id),
                     completed_at = ?5,
                     updated_at = ?5
                 WHERE id = ?1 AND status = 'sending'",
                params![raw, status_str, error_message, provider_message_id, now_ms],
            )?;
            transition_outcome(conn, raw, changed)
        })
        .await
        .map_err(map_tr_err)?;

    finish_transition(id, status, outcome)
}

/// Return a `sending` task to `queued` after `delay`, counting a retry.
pub async fn requeue(
    db: &Database,
    id: TaskId,
    delay: Duration,
    error_message: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), CourierError> {
    let error_message = error_message.map(str::to_string);
    let now_ms = to_millis(now);
    let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
    let not_before = now_ms.saturating_add(delay_ms);
    let raw = id.0;

    let outcome = db
        .connection()
        .call(move |conn| -> Result<Transition, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE message_tasks
                 SET status = 'queued',
                     retry_count = retry_count + 1,
                     not_before = ?2,
                     claimed_at = NULL,
                     error_message = COALESCE(?3, error_message),
                     updated_at = ?4
                 WHERE id = ?1 AND status = 'sending'",
                params![raw, not_before, error_message, now_ms],
            )?;
            transition_outcome(conn, raw, changed)
        })
        .await
        .map_err(map_tr_err)?;

    finish_transition(id, TaskStatus::Queued, outcome)
}

/// Return a `sending` task to `queued` without counting a retry.
pub async fn release(db: &Database, id: TaskId, now: DateTime<Utc>) -> Result<(), CourierError> {
    let now_ms = to_millis(now);
    let raw = id.0;

    let outcome = db
        .connection()
        .call(move |conn| -> Result<Transition, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE message_tasks
                 SET status = 'queued', claimed_at = NULL, updated_at = ?2
                 WHERE id = ?1 AND status = 'sending'",
                params![raw, now_ms],
            )?;
            transition_outcome(conn, raw, changed)
        })
        .await
        .map_err(map_tr_err)?;

    finish_transition(id, TaskStatus::Queued, outcome)
}

/// Refresh `claimed_at` on a task that is still `sending`.
///
/// Returns `false` when the claim was lost, e.g. to a reclaim sweep.
pub async fn touch_claim(
    db: &Database,
    id: TaskId,
    now: DateTime<Utc>,
) -> Result<bool, CourierError> {
    let now_ms = to_millis(now);
    let raw = id.0;
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE message_tasks
                 SET claimed_at = ?2, updated_at = ?2
                 WHERE id = ?1 AND status = 'sending'",
                params![raw, now_ms],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Return every task claimed at or before `now - older_than` to `queued`.
pub async fn reclaim_stale(
    db: &Database,
    older_than: Duration,
    now: DateTime<Utc>,
) -> Result<u64, CourierError> {
    let now_ms = to_millis(now);
    let cutoff = now_ms.saturating_sub(i64::try_from(older_than.as_millis()).unwrap_or(i64::MAX));
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE message_tasks
                 SET status = 'queued', claimed_at = NULL, updated_at = ?2
                 WHERE status = 'sending' AND claimed_at <= ?1",
                params![cutoff, now_ms],
            )?;
            Ok(changed as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Number of `queued` tasks for the tenant, including ones scheduled later.
pub async fn queue_depth(db: &Database, tenant: &TenantId) -> Result<u64, CourierError> {
    let tenant = tenant.0.clone();
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM message_tasks WHERE tenant_id = ?1 AND status = 'queued'",
                params![tenant],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Task counts by status for the tenant.
pub async fn status_counts(db: &Database, tenant: &TenantId) -> Result<StatusCounts, CourierError> {
    let tenant = tenant.0.clone();
    let rows = db
        .connection()
        .call(move |conn| -> Result<Vec<(String, i64)>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM message_tasks WHERE tenant_id = ?1 GROUP BY status",
            )?;
            let rows = stmt
                .query_map(params![tenant], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)?;

    let mut counts = StatusCounts::default();
    for (status, count) in rows {
        let count = count as u64;
        match status.parse::<TaskStatus>() {
            Ok(TaskStatus::Queued) => counts.queued = count,
            Ok(TaskStatus::Sending) => counts.sending = count,
            Ok(TaskStatus::Sent) => counts.sent = count,
            Ok(TaskStatus::Failed) => counts.failed = count,
            Ok(TaskStatus::BlockedPolicy) => counts.blocked_policy = count,
            Err(e) => {
                return Err(CourierError::storage(format!(
                    "unknown task status `{status}`: {e}"
                )));
            }
        }
    }
    Ok(counts)
}

/// Fetch a task by id.
pub async fn get_task(db: &Database, id: TaskId) -> Result<Option<MessageTask>, CourierError> {
    let raw = id.0;
    db.connection()
        .call(move |conn| -> Result<Option<MessageTask>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {TASK_COLUMNS} FROM message_tasks WHERE id = ?1"),
                params![raw],
                task_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn new_task(key: &str, priority: i32) -> NewTask {
        NewTask {
            tenant_id: TenantId::from("acme"),
            recipient_id: RecipientId::from("psid-1"),
            body: format!("hello {key}"),
            policy_tag: None,
            priority,
            idempotency_key: key.to_string(),
            not_before: None,
        }
    }

    #[tokio::test]
    async fn enqueue_and_claim_lifecycle() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();

        let id = enqueue(&db, &new_task("k1", 0), now).await.unwrap();
        let claimed = claim_next(&db, &TenantId::from("acme"), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.status, TaskStatus::Sending);
        assert_eq!(claimed.retry_count, 0);
        assert!(claimed.claimed_at.is_some());

        assert!(
            claim_next(&db, &TenantId::from("acme"), now)
                .await
                .unwrap()
                .is_none()
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claim_orders_by_priority_then_age() {
        let (db, _dir) = setup_db().await;
        let t0 = Utc::now();
        let low = enqueue(&db, &new_task("low", 0), t0).await.unwrap();
        let old_high = enqueue(&db, &new_task("old-high", 5), t0 + TimeDelta::milliseconds(1))
            .await
            .unwrap();
        let new_high = enqueue(&db, &new_task("new-high", 5), t0 + TimeDelta::milliseconds(2))
            .await
            .unwrap();

        let at = t0 + TimeDelta::seconds(1);
        let tenant = TenantId::from("acme");
        let order: Vec<TaskId> = vec![
            claim_next(&db, &tenant, at).await.unwrap().unwrap().id,
            claim_next(&db, &tenant, at).await.unwrap().unwrap().id,
            claim_next(&db, &tenant, at).await.unwrap().unwrap().id,
        ];
        assert_eq!(order, vec![old_high, new_high, low]);
    }

    #[tokio::test]
    async fn claim_skips_future_not_before_and_other_tenants() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let mut later = new_task("later", 0);
        later.not_before = Some(now + TimeDelta::seconds(60));
        enqueue(&db, &later, now).await.unwrap();

        let mut other = new_task("other", 0);
        other.tenant_id = TenantId::from("globex");
        enqueue(&db, &other, now).await.unwrap();

        let tenant = TenantId::from("acme");
        assert!(claim_next(&db, &tenant, now).await.unwrap().is_none());
        let claimed = claim_next(&db, &tenant, now + TimeDelta::seconds(61))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.idempotency_key, "later");
    }

    #[tokio::test]
    async fn duplicate_key_reports_existing_id() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let first = enqueue(&db, &new_task("dup", 0), now).await.unwrap();
        let err = enqueue(&db, &new_task("dup", 9), now).await.unwrap_err();
        match err {
            CourierError::DuplicateKey { existing, idempotency_key } => {
                assert_eq!(existing, first);
                assert_eq!(idempotency_key, "dup");
            }
            other => panic!("expected DuplicateKey, got {other:?}"),
        }

        // Same key under another tenant is a different task.
        let mut other = new_task("dup", 0);
        other.tenant_id = TenantId::from("globex");
        assert!(enqueue(&db, &other, now).await.is_ok());
    }

    #[tokio::test]
    async fn requeue_schedules_and_counts_retry() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let tenant = TenantId::from("acme");
        let id = enqueue(&db, &new_task("r", 0), now).await.unwrap();
        claim_next(&db, &tenant, now).await.unwrap().unwrap();

        requeue(&db, id, Duration::from_secs(5), Some("rate limited"), now)
            .await
            .unwrap();
        let task = get_task(&db, id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.retry_count, 1);
        assert_eq!(
            task.not_before.timestamp_millis(),
            (now + TimeDelta::seconds(5)).timestamp_millis()
        );
        assert_eq!(task.error_message.as_deref(), Some("rate limited"));
        assert!(task.claimed_at.is_none());

        assert!(claim_next(&db, &tenant, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn release_keeps_retry_count_and_schedule() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let tenant = TenantId::from("acme");
        let id = enqueue(&db, &new_task("rel", 0), now).await.unwrap();
        claim_next(&db, &tenant, now).await.unwrap().unwrap();

        release(&db, id, now).await.unwrap();
        let task = get_task(&db, id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.retry_count, 0);
        assert!(claim_next(&db, &tenant, now).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn mark_terminal_only_from_sending() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let id = enqueue(&db, &new_task("t", 0), now).await.unwrap();

        let err = mark_terminal(&db, id, TaskStatus::Sent, None, Some("mid.1"), now)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CourierError::InvalidTransition { from: TaskStatus::Queued, to: TaskStatus::Sent, .. }
        ));

        claim_next(&db, &TenantId::from("acme"), now).await.unwrap();
        mark_terminal(&db, id, TaskStatus::Sent, None, Some("mid.1"), now)
            .await
            .unwrap();
        let task = get_task(&db, id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Sent);
        assert_eq!(task.provider_message_id.as_deref(), Some("mid.1"));
        assert!(task.completed_at.is_some());

        let err = release(&db, id, now).await.unwrap_err();
        assert!(matches!(err, CourierError::InvalidTransition { from: TaskStatus::Sent, .. }));

        let err = mark_terminal(&db, TaskId(999), TaskStatus::Failed, None, None, now)
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::TaskNotFound(TaskId(999))));

        let err = mark_terminal(&db, id, TaskStatus::Queued, None, None, now)
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::InvalidTransition { to: TaskStatus::Queued, .. }));
    }

    #[tokio::test]
    async fn reclaim_returns_only_stale_claims() {
        let (db, _dir) = setup_db().await;
        let t0 = Utc::now();
        let tenant = TenantId::from("acme");
        enqueue(&db, &new_task("a", 0), t0).await.unwrap();
        enqueue(&db, &new_task("b", 0), t0).await.unwrap();
        claim_next(&db, &tenant, t0).await.unwrap().unwrap();
        claim_next(&db, &tenant, t0 + TimeDelta::seconds(200))
            .await
            .unwrap()
            .unwrap();

        let now = t0 + TimeDelta::seconds(301);
        assert_eq!(
            reclaim_stale(&db, Duration::from_secs(300), now).await.unwrap(),
            1
        );
        let counts = status_counts(&db, &tenant).await.unwrap();
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.sending, 1);

        assert_eq!(reclaim_stale(&db, Duration::ZERO, now).await.unwrap(), 1);
        let counts = status_counts(&db, &tenant).await.unwrap();
        assert_eq!(counts.sending, 0);
        assert_eq!(queue_depth(&db, &tenant).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn touch_keeps_claim_fresh_until_reclaimed() {
        let (db, _dir) = setup_db().await;
        let t0 = Utc::now();
        let tenant = TenantId::from("acme");
        let id = enqueue(&db, &new_task("a", 0), t0).await.unwrap();
        claim_next(&db, &tenant, t0).await.unwrap().unwrap();

        let later = t0 + TimeDelta::seconds(250);
        assert!(touch_claim(&db, id, later).await.unwrap());
        let now = t0 + TimeDelta::seconds(301);
        assert_eq!(
            reclaim_stale(&db, Duration::from_secs(300), now).await.unwrap(),
            0
        );

        assert_eq!(reclaim_stale(&db, Duration::ZERO, now).await.unwrap(), 1);
        assert!(!touch_claim(&db, id, now).await.unwrap());
        let task = get_task(&db, id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
        assert!(task.claimed_at.is_none());
    }

    #[tokio::test]
    async fn policy_tag_round_trips_through_storage() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let mut task = new_task("tagged", 0);
        task.policy_tag = Some(PolicyTag::PostPurchaseUpdate);
        let id = enqueue(&db, &task, now).await.unwrap();
        let stored = get_task(&db, id).await.unwrap().unwrap();
        assert_eq!(stored.policy_tag, Some(PolicyTag::PostPurchaseUpdate));
        assert!(get_task(&db, TaskId(4242)).await.unwrap().is_none());
    }
}
