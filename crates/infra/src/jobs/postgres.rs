//! Postgres-backed job queue.
//!
//! The claim is a single CTE: select the oldest queued row with
//! `FOR UPDATE SKIP LOCKED`, transition it to `running` in the same
//! statement. Two workers racing for the same row cannot both win — the
//! second skips the locked row and either claims the next one or sees an
//! empty queue. That statement is the whole coordination story; workers
//! share nothing else.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use leadops_core::{CoreError, CoreResult, SiteId};

use super::store::JobStore;
use super::types::{Job, JobId, JobKind, JobState};

#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn store_error(operation: &str, err: sqlx::Error) -> CoreError {
    CoreError::transient(format!("job store {operation} failed: {err}"))
}

const JOB_COLUMNS: &str = "id, site_id, kind, state, payload, result, attempts, created_at, updated_at";

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, job), fields(site_id = %job.site_id, kind = %job.kind), err)]
    async fn enqueue(&self, job: Job) -> CoreResult<JobId> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, site_id, kind, state, payload, result, attempts, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.site_id.as_uuid())
        .bind(job.kind.as_str())
        .bind(job.state.as_str())
        .bind(&job.payload)
        .bind(&job.result)
        .bind(job.attempts)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| store_error("enqueue", e))?;

        Ok(job.id)
    }

    #[instrument(skip(self), fields(site_id = %site_id, job_id = %job_id), err)]
    async fn get(&self, site_id: SiteId, job_id: JobId) -> CoreResult<Option<Job>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 AND site_id = $2"
        ))
        .bind(job_id.as_uuid())
        .bind(site_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| store_error("get", e))?;

        row.map(|r| job_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(kind = kind.map(|k| k.as_str())), err)]
    async fn claim_next(&self, kind: Option<&JobKind>) -> CoreResult<Option<Job>> {
        let row = sqlx::query(
            r#"
            WITH next AS (
                SELECT id
                FROM jobs
                WHERE state = 'queued' AND ($1::text IS NULL OR kind = $1)
                ORDER BY created_at ASC, id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            UPDATE jobs
            SET state = 'running', attempts = attempts + 1, updated_at = now()
            WHERE id IN (SELECT id FROM next)
            RETURNING id, site_id, kind, state, payload, result, attempts, created_at, updated_at
            "#,
        )
        .bind(kind.map(|k| k.as_str().to_string()))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| store_error("claim", e))?;

        row.map(|r| job_from_row(&r)).transpose()
    }

    #[instrument(skip(self, result), fields(job_id = %job_id), err)]
    async fn complete(&self, job_id: JobId, result: serde_json::Value) -> CoreResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'ready', result = $2, updated_at = now()
            WHERE id = $1 AND state = 'running'
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(&result)
        .execute(&*self.pool)
        .await
        .map_err(|e| store_error("complete", e))?;

        if updated.rows_affected() == 0 {
            return Err(self.transition_rejection(job_id).await);
        }
        Ok(())
    }

    #[instrument(skip(self, error), fields(job_id = %job_id), err)]
    async fn fail(&self, job_id: JobId, error: String) -> CoreResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'failed', result = $2, updated_at = now()
            WHERE id = $1 AND state = 'running'
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(serde_json::json!({ "error": error }))
        .execute(&*self.pool)
        .await
        .map_err(|e| store_error("fail", e))?;

        if updated.rows_affected() == 0 {
            return Err(self.transition_rejection(job_id).await);
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn reclaim_stale(&self, older_than: Duration) -> CoreResult<Vec<JobId>> {
        let cutoff: DateTime<Utc> = Utc::now() - older_than;

        let rows = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'queued', updated_at = now()
            WHERE state = 'running' AND updated_at < $1
            RETURNING id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| store_error("reclaim", e))?;

        let mut ids: Vec<JobId> = rows
            .iter()
            .map(|r| r.try_get("id").map(JobId::from_uuid))
            .collect::<Result<_, _>>()
            .map_err(|e| store_error("reclaim decode", e))?;
        ids.sort();
        Ok(ids)
    }
}

impl PostgresJobStore {
    /// A guarded transition matched zero rows: distinguish "no such job" from
    /// "job is not running" for the caller.
    async fn transition_rejection(&self, job_id: JobId) -> CoreError {
        let state: Result<Option<String>, _> =
            sqlx::query_scalar("SELECT state FROM jobs WHERE id = $1")
                .bind(job_id.as_uuid())
                .fetch_optional(&*self.pool)
                .await;

        match state {
            Ok(Some(state)) => CoreError::conflict(format!("job {job_id} is {state}, not running")),
            Ok(None) => CoreError::NotFound,
            Err(e) => store_error("transition check", e),
        }
    }
}

fn job_from_row(row: &PgRow) -> CoreResult<Job> {
    let decode = |e: sqlx::Error| CoreError::transient(format!("job store: undecodable row: {e}"));

    let kind: String = row.try_get("kind").map_err(decode)?;
    let state: String = row.try_get("state").map_err(decode)?;

    Ok(Job {
        id: JobId::from_uuid(row.try_get("id").map_err(decode)?),
        site_id: SiteId::from_uuid(row.try_get("site_id").map_err(decode)?),
        kind: JobKind::new(kind),
        state: JobState::from_str(&state)?,
        payload: row.try_get("payload").map_err(decode)?,
        result: row.try_get("result").map_err(decode)?,
        attempts: row.try_get("attempts").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}
