//! Postgres-backed quota tracker.
//!
//! Reservations live in `quota_reservations` (see
//! `migrations/0001_quota_reservations.sql`). Check-and-reserve runs in one
//! transaction that first takes a transaction-scoped advisory lock keyed on
//! (organizer, channel); concurrent reservations for the same pair queue on
//! that lock, so the windowed `SUM` they read is never stale.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::instrument;

use eventcrm_core::{CampaignId, Channel, OrganizerId, PlanTier};
use eventcrm_quota::{QuotaGrant, QuotaPolicy, QuotaStatus};

use crate::error::{QuotaError, QuotaStoreError};
use crate::quota::QuotaTracker;

const SCHEMA: &str = include_str!("../../migrations/0001_quota_reservations.sql");

#[derive(Debug, Clone)]
pub struct PostgresQuotaTracker {
    pool: PgPool,
    policy: QuotaPolicy,
}

impl PostgresQuotaTracker {
    pub fn new(pool: PgPool, policy: QuotaPolicy) -> Self {
        Self { pool, policy }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        policy: QuotaPolicy,
    ) -> Result<Self, QuotaStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, policy))
    }

    /// Create the reservation table if it does not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), QuotaStoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    #[instrument(
        skip(self),
        fields(
            organizer_id = %organizer_id,
            channel = %channel,
            campaign_id = %campaign_id
        ),
        err
    )]
    pub async fn reserve(
        &self,
        organizer_id: OrganizerId,
        channel: Channel,
        tier: PlanTier,
        campaign_id: CampaignId,
        count: u32,
        now: DateTime<Utc>,
    ) -> Result<QuotaGrant, QuotaError> {
        let limit = self.policy.limit_for(tier, channel);
        let window_start = self.policy.window_start(now);
        let recipients = i32::try_from(count).map_err(|_| QuotaStoreError::Database {
            operation: "reserve_quota".into(),
            message: format!("count {count} out of range"),
        })?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(lock_key(organizer_id, channel))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("advisory_lock", e))?;

        let existing: Option<(i32, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT recipients, reserved_at
            FROM quota_reservations
            WHERE organizer_id = $1 AND channel = $2 AND campaign_id = $3
            "#,
        )
        .bind(*organizer_id.as_uuid())
        .bind(channel.as_str())
        .bind(*campaign_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load_reservation", e))?;

        let used: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(recipients), 0)::BIGINT
            FROM quota_reservations
            WHERE organizer_id = $1 AND channel = $2 AND reserved_at >= $3
            "#,
        )
        .bind(*organizer_id.as_uuid())
        .bind(channel.as_str())
        .bind(window_start)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("sum_window", e))?;

        let status = QuotaStatus::new(u32::try_from(used).unwrap_or(u32::MAX), limit);

        if let Some((reserved, reserved_at)) = existing {
            return Ok(QuotaGrant {
                campaign_id,
                count: u32::try_from(reserved).unwrap_or_default(),
                reserved_at,
                remaining: status.remaining,
                limit,
            });
        }

        // Dropping `tx` on rejection rolls back and releases the lock.
        let remaining = status.admit(count)?;

        sqlx::query(
            r#"
            INSERT INTO quota_reservations
                (organizer_id, channel, campaign_id, recipients, reserved_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(*organizer_id.as_uuid())
        .bind(channel.as_str())
        .bind(*campaign_id.as_uuid())
        .bind(recipients)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_reservation", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(QuotaGrant {
            campaign_id,
            count,
            reserved_at: now,
            remaining,
            limit,
        })
    }

    #[instrument(skip(self), fields(organizer_id = %organizer_id, campaign_id = %campaign_id), err)]
    pub async fn release_reservation(
        &self,
        organizer_id: OrganizerId,
        channel: Channel,
        campaign_id: CampaignId,
    ) -> Result<(), QuotaStoreError> {
        sqlx::query(
            r#"
            DELETE FROM quota_reservations
            WHERE organizer_id = $1 AND channel = $2 AND campaign_id = $3
            "#,
        )
        .bind(*organizer_id.as_uuid())
        .bind(channel.as_str())
        .bind(*campaign_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("release_reservation", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(organizer_id = %organizer_id, channel = %channel), err)]
    pub async fn window_status(
        &self,
        organizer_id: OrganizerId,
        channel: Channel,
        tier: PlanTier,
        now: DateTime<Utc>,
    ) -> Result<QuotaStatus, QuotaStoreError> {
        let used: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(recipients), 0)::BIGINT
            FROM quota_reservations
            WHERE organizer_id = $1 AND channel = $2 AND reserved_at >= $3
            "#,
        )
        .bind(*organizer_id.as_uuid())
        .bind(channel.as_str())
        .bind(self.policy.window_start(now))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("window_status", e))?;

        Ok(QuotaStatus::new(
            u32::try_from(used).unwrap_or(u32::MAX),
            self.policy.limit_for(tier, channel),
        ))
    }

    /// Drive an async call from synchronous code.
    ///
    /// Must run on a thread that is not itself polling a future (e.g. inside
    /// `tokio::task::spawn_blocking`) while a runtime is active.
    fn block_on<F: Future>(&self, fut: F) -> Result<F::Output, QuotaStoreError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| QuotaStoreError::NoRuntime)?;
        Ok(handle.block_on(fut))
    }
}

impl QuotaTracker for PostgresQuotaTracker {
    fn try_reserve(
        &self,
        organizer_id: OrganizerId,
        channel: Channel,
        tier: PlanTier,
        campaign_id: CampaignId,
        count: u32,
        now: DateTime<Utc>,
    ) -> Result<QuotaGrant, QuotaError> {
        self.block_on(self.reserve(organizer_id, channel, tier, campaign_id, count, now))?
    }

    fn release(
        &self,
        organizer_id: OrganizerId,
        channel: Channel,
        campaign_id: CampaignId,
    ) -> Result<(), QuotaStoreError> {
        self.block_on(self.release_reservation(organizer_id, channel, campaign_id))?
    }

    fn status(
        &self,
        organizer_id: OrganizerId,
        channel: Channel,
        tier: PlanTier,
        now: DateTime<Utc>,
    ) -> Result<QuotaStatus, QuotaStoreError> {
        self.block_on(self.window_status(organizer_id, channel, tier, now))?
    }
}

fn lock_key(organizer_id: OrganizerId, channel: Channel) -> String {
    format!("quota:{organizer_id}:{channel}")
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> QuotaStoreError {
    let message = match err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => format!("{} (code {code})", db_err.message()),
            None => db_err.message().to_string(),
        },
        sqlx::Error::PoolClosed => "connection pool closed".to_string(),
        sqlx::Error::PoolTimedOut => "timed out acquiring a connection".to_string(),
        other => other.to_string(),
    };
    QuotaStoreError::Database {
        operation: operation.to_string(),
        message,
    }
}
