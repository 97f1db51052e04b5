//! Postgres-backed [`Datastore`].
//!
//! All SQL is runtime-checked (`sqlx::query_as`, not `query_as!`) so the
//! crate builds without a live database.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Postgres;
use uuid::Uuid;

use sitekick_core::config::DatabaseConfig;
use sitekick_core::models::{
    DemoLinks, LifecycleEventRecord, NewLifecycleEvent, PaymentCompletion, PaymentRecord, Project,
    Subject,
};
use sitekick_core::store::{Datastore, NotificationLease};
use sitekick_core::types::EventType;
use sitekick_core::{Result, SitekickError};

fn storage(err: sqlx::Error) -> SitekickError {
    SitekickError::Storage(err.to_string())
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct SubjectRow {
    id: Uuid,
    email: String,
    full_name: Option<String>,
}

impl From<SubjectRow> for Subject {
    fn from(row: SubjectRow) -> Self {
        Subject {
            id: row.id,
            email: row.email,
            full_name: row.full_name,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    status: String,
    final_url: Option<String>,
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    subject_id: Uuid,
    event_type: String,
    trigger_snapshot: serde_json::Value,
    sent_at: DateTime<Utc>,
    outcome: String,
    actor_id: Option<Uuid>,
    provider_message_id: Option<String>,
    error: Option<String>,
}

impl TryFrom<EventRow> for LifecycleEventRecord {
    type Error = SitekickError;

    fn try_from(row: EventRow) -> Result<Self> {
        Ok(LifecycleEventRecord {
            id: row.id,
            subject_id: row.subject_id,
            event_type: row.event_type.parse()?,
            trigger_snapshot: row.trigger_snapshot,
            sent_at: row.sent_at,
            outcome: row.outcome.parse()?,
            actor_id: row.actor_id,
            provider_message_id: row.provider_message_id,
            error: row.error,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: String,
    subject_id: Uuid,
    status: String,
    processor_payment_id: Option<String>,
    processor_customer_id: Option<String>,
    amount_cents: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for PaymentRecord {
    type Error = SitekickError;

    fn try_from(row: PaymentRow) -> Result<Self> {
        Ok(PaymentRecord {
            id: row.id,
            subject_id: row.subject_id,
            status: row.status.parse()?,
            processor_payment_id: row.processor_payment_id,
            processor_customer_id: row.processor_customer_id,
            amount_cents: row.amount_cents,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const EVENT_COLUMNS: &str = "id, subject_id, event_type, trigger_snapshot, sent_at, outcome, \
                             actor_id, provider_message_id, error";
const PAYMENT_COLUMNS: &str = "id, subject_id, status, processor_payment_id, \
                               processor_customer_id, amount_cents, created_at, updated_at";

// ---------------------------------------------------------------------------
// Advisory lease
// ---------------------------------------------------------------------------

/// Session-level advisory lock pinned to one pooled connection. Dropping it
/// unlocks in the background; if that is impossible the connection is
/// detached from the pool and closed, which ends the session and its locks.
struct AdvisoryLock {
    conn: Option<PoolConnection<Postgres>>,
    key: String,
}

impl AdvisoryLock {
    async fn acquire(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.as_mut() {
            sqlx::query("SELECT pg_advisory_lock(hashtextextended($1, 0))")
                .bind(&self.key)
                .execute(&mut **conn)
                .await
                .map_err(storage)?;
        }
        Ok(())
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        let key = std::mem::take(&mut self.key);
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            drop(conn.detach());
            return;
        };
        handle.spawn(async move {
            let unlocked = sqlx::query("SELECT pg_advisory_unlock(hashtextextended($1, 0))")
                .bind(&key)
                .execute(&mut *conn)
                .await;
            if let Err(e) = unlocked {
                tracing::warn!(%key, error = %e, "advisory unlock failed, closing connection");
                drop(conn.detach());
            }
        });
    }
}

// ---------------------------------------------------------------------------
// PgStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| SitekickError::Config("database.url is not set".into()))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(url)
            .await
            .map_err(storage)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SitekickError::Storage(format!("migration failed: {e}")))
    }
}

#[async_trait]
impl Datastore for PgStore {
    async fn find_subject(&self, id: Uuid) -> Result<Option<Subject>> {
        let row = sqlx::query_as::<_, SubjectRow>(
            "SELECT id, email, full_name FROM profiles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        Ok(row.map(Subject::from))
    }

    async fn find_subject_by_email(&self, email: &str) -> Result<Option<Subject>> {
        let row = sqlx::query_as::<_, SubjectRow>(
            "SELECT id, email, full_name FROM profiles WHERE lower(email) = lower($1) LIMIT 1",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        Ok(row.map(Subject::from))
    }

    async fn demo_links(&self, subject_id: Uuid) -> Result<Option<DemoLinks>> {
        let row = sqlx::query_as::<_, (Option<String>, Option<String>, Option<String>)>(
            "SELECT option_1_url, option_2_url, option_3_url FROM demo_links WHERE subject_id = $1",
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        Ok(row.map(|(option_1_url, option_2_url, option_3_url)| DemoLinks {
            option_1_url,
            option_2_url,
            option_3_url,
        }))
    }

    async fn project(&self, subject_id: Uuid) -> Result<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>(
            "SELECT status, final_url FROM projects WHERE subject_id = $1",
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        row.map(|r| {
            Ok(Project {
                status: r.status.parse()?,
                final_url: r.final_url,
            })
        })
        .transpose()
    }

    async fn last_sent_event(
        &self,
        subject_id: Uuid,
        event_type: EventType,
    ) -> Result<Option<LifecycleEventRecord>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM lifecycle_emails \
             WHERE subject_id = $1 AND event_type = $2 AND outcome = 'sent' \
             ORDER BY sent_at DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(subject_id)
            .bind(event_type.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.map(LifecycleEventRecord::try_from).transpose()
    }

    async fn list_events(
        &self,
        subject_id: Uuid,
        event_type: Option<EventType>,
    ) -> Result<Vec<LifecycleEventRecord>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM lifecycle_emails \
             WHERE subject_id = $1 AND ($2::text IS NULL OR event_type = $2) \
             ORDER BY sent_at DESC"
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(subject_id)
            .bind(event_type.map(|t| t.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        rows.into_iter().map(LifecycleEventRecord::try_from).collect()
    }

    async fn append_event(&self, event: NewLifecycleEvent) -> Result<LifecycleEventRecord> {
        let sql = format!(
            "INSERT INTO lifecycle_emails \
             (id, subject_id, event_type, trigger_snapshot, outcome, \
              actor_id, provider_message_id, error) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {EVENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(event.subject_id)
            .bind(event.event_type.as_str())
            .bind(&event.trigger_snapshot)
            .bind(event.outcome.as_str())
            .bind(event.actor_id)
            .bind(&event.provider_message_id)
            .bind(&event.error)
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        row.try_into()
    }

    async fn lock_notification(
        &self,
        subject_id: Uuid,
        event_type: EventType,
    ) -> Result<NotificationLease> {
        let conn = self.pool.acquire().await.map_err(storage)?;
        // Guard first so a cancelled acquire still unlocks on drop.
        let mut lock = AdvisoryLock {
            conn: Some(conn),
            key: format!("{subject_id}:{event_type}"),
        };
        lock.acquire().await?;
        Ok(NotificationLease::new(lock))
    }

    async fn payment(&self, id: &str) -> Result<Option<PaymentRecord>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1");
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.map(PaymentRecord::try_from).transpose()
    }

    async fn payment_by_processor_id(
        &self,
        processor_payment_id: &str,
    ) -> Result<Option<PaymentRecord>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE processor_payment_id = $1");
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(processor_payment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.map(PaymentRecord::try_from).transpose()
    }

    async fn complete_payment(
        &self,
        id: &str,
        completion: &PaymentCompletion,
    ) -> Result<Option<PaymentRecord>> {
        let sql = format!(
            "UPDATE payments SET status = 'completed', \
                 processor_payment_id = COALESCE($2, processor_payment_id), \
                 processor_customer_id = COALESCE($3, processor_customer_id), \
                 updated_at = now() \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {PAYMENT_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(id)
            .bind(&completion.processor_payment_id)
            .bind(&completion.processor_customer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        if let Some(row) = updated {
            return row.try_into().map(Some);
        }

        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 AND status = 'completed'"
        );
        let existing = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        existing.map(PaymentRecord::try_from).transpose()
    }

    async fn fail_payment(&self, id: &str) -> Result<Option<PaymentRecord>> {
        let sql = format!(
            "UPDATE payments SET status = 'failed', updated_at = now() \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {PAYMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.map(PaymentRecord::try_from).transpose()
    }

    async fn latest_pending_payment(&self, subject_id: Uuid) -> Result<Option<PaymentRecord>> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments \
             WHERE subject_id = $1 AND status = 'pending' \
             ORDER BY created_at DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(subject_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.map(PaymentRecord::try_from).transpose()
    }
}
