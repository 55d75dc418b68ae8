//! Postgres-backed lead store.
//!
//! ## Concurrency
//!
//! The conditional `UPDATE ... WHERE id = $n AND site_id = $n AND version = $n`
//! is the concurrency primitive: the read-then-write race is closed by the
//! condition, not by locking. Audit rows are inserted in the same transaction
//! as the update they describe, so partial application is never observable.
//!
//! ## Tenant isolation
//!
//! Every statement carries `site_id` in its WHERE clause or column list.
//!
//! ## Error mapping
//!
//! sqlx failures surface as `CoreError::Transient` — driver internals never
//! leak to callers, and the taxonomy tells them the operation is retriable.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{PgPool, Postgres, Row};
use tracing::instrument;

use leadops_core::{CoreError, CoreResult, LeadId, SiteId, UserId};
use leadops_leads::{ActivityType, Lead, LeadEvent, LeadEventType, LeadNote, LeadStatusHistory};
use leadops_query::QueryPlan;

use super::sql::{self, SqlParam};
use super::{LeadStore, NoteInsert, StatusUpdate};

/// Postgres backend. Cheap to clone; the pool is shared.
#[derive(Debug, Clone)]
pub struct PostgresLeadStore {
    pool: Arc<PgPool>,
}

impl PostgresLeadStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn store_error(operation: &str, err: sqlx::Error) -> CoreError {
    CoreError::transient(format!("lead store {operation} failed: {err}"))
}

fn decode_error(operation: &str, err: impl core::fmt::Display) -> CoreError {
    CoreError::transient(format!("lead store {operation}: undecodable row: {err}"))
}

fn bind_params(
    query: sqlx::query::Query<'_, Postgres, PgArguments>,
    params: Vec<SqlParam>,
) -> sqlx::query::Query<'_, Postgres, PgArguments> {
    let mut q = query;
    for param in params {
        q = match param {
            SqlParam::Uuid(v) => q.bind(v),
            SqlParam::Text(v) => q.bind(v),
            SqlParam::TextArray(v) => q.bind(v),
            SqlParam::Int(v) => q.bind(v),
            SqlParam::Timestamp(v) => q.bind(v),
            SqlParam::Numeric(v) => q.bind(v),
        };
    }
    q
}

#[async_trait]
impl LeadStore for PostgresLeadStore {
    #[instrument(skip(self, lead), fields(site_id = %lead.site_id, lead_id = %lead.id), err)]
    async fn insert(&self, lead: &Lead) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO leads (
                id, site_id, kind, status, sub_status, reason_code,
                full_name, phone, email, region,
                name_normalized, phone_digits, email_normalized,
                priority_score, priority_reason,
                estimated_monthly_premium, estimated_commission,
                source_page,
                last_activity_at, last_activity_type, next_action_at, next_action_type,
                archived_at, version, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6,
                $7, $8, $9, $10,
                $11, $12, $13,
                $14, $15,
                $16, $17,
                $18,
                $19, $20, $21, $22,
                $23, $24, $25, $26
            )
            "#,
        )
        .bind(lead.id.as_uuid())
        .bind(lead.site_id.as_uuid())
        .bind(&lead.kind)
        .bind(lead.status.as_str())
        .bind(&lead.sub_status)
        .bind(&lead.reason_code)
        .bind(&lead.full_name)
        .bind(&lead.phone)
        .bind(&lead.email)
        .bind(&lead.region)
        .bind(&lead.name_normalized)
        .bind(&lead.phone_digits)
        .bind(&lead.email_normalized)
        .bind(lead.priority_score)
        .bind(&lead.priority_reason)
        .bind(lead.estimated_monthly_premium)
        .bind(lead.estimated_commission)
        .bind(&lead.source_page)
        .bind(lead.last_activity_at)
        .bind(lead.last_activity_type.map(|t| t.as_str()))
        .bind(lead.next_action_at)
        .bind(&lead.next_action_type)
        .bind(lead.archived_at)
        .bind(lead.version)
        .bind(lead.created_at)
        .bind(lead.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| store_error("insert", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(site_id = %site_id, lead_id = %lead_id), err)]
    async fn get(&self, site_id: SiteId, lead_id: LeadId) -> CoreResult<Option<Lead>> {
        let row = sqlx::query(
            r#"
            SELECT id, site_id, kind, status, sub_status, reason_code,
                   full_name, phone, email, region,
                   name_normalized, phone_digits, email_normalized,
                   priority_score, priority_reason,
                   estimated_monthly_premium, estimated_commission,
                   source_page,
                   last_activity_at, last_activity_type, next_action_at, next_action_type,
                   archived_at, version, created_at, updated_at
            FROM leads
            WHERE id = $1 AND site_id = $2
            "#,
        )
        .bind(lead_id.as_uuid())
        .bind(site_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| store_error("get", e))?;

        row.map(|r| lead_from_row(&r).map_err(|e| decode_error("get", e)))
            .transpose()
    }

    #[instrument(skip(self, plan), fields(site_id = %plan.site_id(), sort = %plan.sort()), err)]
    async fn list(&self, plan: &QueryPlan) -> CoreResult<Vec<Lead>> {
        let rendered = sql::render_list(plan);
        let rows = bind_params(sqlx::query(&rendered.sql), rendered.params)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| store_error("list", e))?;

        rows.iter()
            .map(|r| lead_from_row(r).map_err(|e| decode_error("list", e)))
            .collect()
    }

    #[instrument(skip(self, plan), fields(site_id = %plan.site_id()), err)]
    async fn count(&self, plan: &QueryPlan) -> CoreResult<u64> {
        let rendered = sql::render_count(plan);
        let row = bind_params(sqlx::query(&rendered.sql), rendered.params)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| store_error("count", e))?;

        let total: i64 = row.try_get(0).map_err(|e| decode_error("count", e))?;
        Ok(total.max(0) as u64)
    }

    #[instrument(skip(self), fields(site_id = %site_id, lead_id = %lead_id), err)]
    async fn list_notes(
        &self,
        site_id: SiteId,
        lead_id: LeadId,
        limit: u32,
    ) -> CoreResult<Vec<LeadNote>> {
        let rows = sqlx::query(
            r#"
            SELECT id, site_id, lead_id, author, body, pinned, created_at
            FROM lead_notes
            WHERE lead_id = $1 AND site_id = $2
            ORDER BY pinned DESC, created_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(lead_id.as_uuid())
        .bind(site_id.as_uuid())
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| store_error("list_notes", e))?;

        rows.iter()
            .map(|r| note_from_row(r).map_err(|e| decode_error("list_notes", e)))
            .collect()
    }

    #[instrument(skip(self), fields(site_id = %site_id, lead_id = %lead_id), err)]
    async fn list_events(
        &self,
        site_id: SiteId,
        lead_id: LeadId,
        limit: u32,
    ) -> CoreResult<Vec<LeadEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, site_id, lead_id, actor, event_type, channel, metadata, occurred_at
            FROM lead_events
            WHERE lead_id = $1 AND site_id = $2
            ORDER BY occurred_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(lead_id.as_uuid())
        .bind(site_id.as_uuid())
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| store_error("list_events", e))?;

        rows.iter()
            .map(|r| event_from_row(r).map_err(|e| decode_error("list_events", e)))
            .collect()
    }

    #[instrument(skip(self), fields(site_id = %site_id, lead_id = %lead_id), err)]
    async fn list_status_history(
        &self,
        site_id: SiteId,
        lead_id: LeadId,
        limit: u32,
    ) -> CoreResult<Vec<LeadStatusHistory>> {
        let rows = sqlx::query(
            r#"
            SELECT id, site_id, lead_id, from_status, to_status, actor, reason_code, created_at
            FROM lead_status_history
            WHERE lead_id = $1 AND site_id = $2
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(lead_id.as_uuid())
        .bind(site_id.as_uuid())
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| store_error("list_status_history", e))?;

        rows.iter()
            .map(|r| history_from_row(r).map_err(|e| decode_error("list_status_history", e)))
            .collect()
    }

    #[instrument(
        skip(self, update),
        fields(
            site_id = %update.site_id,
            lead_id = %update.lead_id,
            expected_version = update.change.expected_version
        ),
        err
    )]
    async fn apply_status_change(&self, update: StatusUpdate) -> CoreResult<Lead> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("begin", e))?;

        // The condition on `version` IS the optimistic lock. Zero matched
        // rows means a concurrent writer won; nothing in this transaction
        // survives.
        let row = sqlx::query(
            r#"
            UPDATE leads
            SET status = $1,
                sub_status = COALESCE($2, sub_status),
                reason_code = COALESCE($3, reason_code),
                next_action_at = COALESCE($4, next_action_at),
                next_action_type = COALESCE($5, next_action_type),
                archived_at = CASE WHEN $1 = 'archived' THEN COALESCE(archived_at, $6) ELSE NULL END,
                last_activity_at = $6,
                last_activity_type = 'status_change',
                version = version + 1,
                updated_at = $6
            WHERE id = $7 AND site_id = $8 AND version = $9
            RETURNING id, site_id, kind, status, sub_status, reason_code,
                      full_name, phone, email, region,
                      name_normalized, phone_digits, email_normalized,
                      priority_score, priority_reason,
                      estimated_monthly_premium, estimated_commission,
                      source_page,
                      last_activity_at, last_activity_type, next_action_at, next_action_type,
                      archived_at, version, created_at, updated_at
            "#,
        )
        .bind(update.change.status.as_str())
        .bind(&update.change.sub_status)
        .bind(&update.change.reason_code)
        .bind(update.change.next_action_at)
        .bind(&update.change.next_action_type)
        .bind(update.occurred_at)
        .bind(update.lead_id.as_uuid())
        .bind(update.site_id.as_uuid())
        .bind(update.change.expected_version)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| store_error("conditional update", e))?;

        let Some(row) = row else {
            tx.rollback().await.map_err(|e| store_error("rollback", e))?;
            return Err(CoreError::conflict(format!(
                "lead {} changed since version {}",
                update.lead_id, update.change.expected_version
            )));
        };

        let updated = lead_from_row(&row).map_err(|e| decode_error("conditional update", e))?;

        let h = &update.history;
        sqlx::query(
            r#"
            INSERT INTO lead_status_history
                (id, site_id, lead_id, from_status, to_status, actor, reason_code, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(h.id)
        .bind(h.site_id.as_uuid())
        .bind(h.lead_id.as_uuid())
        .bind(h.from_status.as_str())
        .bind(h.to_status.as_str())
        .bind(h.actor.map(|a| *a.as_uuid()))
        .bind(&h.reason_code)
        .bind(h.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| store_error("insert status history", e))?;

        insert_event(&mut tx, &update.event).await?;

        tx.commit().await.map_err(|e| store_error("commit", e))?;

        Ok(updated)
    }

    #[instrument(
        skip(self, insert),
        fields(site_id = %insert.note.site_id, lead_id = %insert.note.lead_id),
        err
    )]
    async fn add_note(&self, insert: NoteInsert) -> CoreResult<LeadNote> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("begin", e))?;

        // No version precondition — but the rollup still advances `version`
        // so status editors holding a stale version observe the write.
        let rolled = sqlx::query(
            r#"
            UPDATE leads
            SET last_activity_at = $1,
                last_activity_type = 'note',
                version = version + 1,
                updated_at = $1
            WHERE id = $2 AND site_id = $3
            "#,
        )
        .bind(insert.note.created_at)
        .bind(insert.note.lead_id.as_uuid())
        .bind(insert.note.site_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| store_error("activity rollup", e))?;

        if rolled.rows_affected() == 0 {
            tx.rollback().await.map_err(|e| store_error("rollback", e))?;
            return Err(CoreError::NotFound);
        }

        let n = &insert.note;
        sqlx::query(
            r#"
            INSERT INTO lead_notes (id, site_id, lead_id, author, body, pinned, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(n.id)
        .bind(n.site_id.as_uuid())
        .bind(n.lead_id.as_uuid())
        .bind(n.author.as_uuid())
        .bind(&n.body)
        .bind(n.pinned)
        .bind(n.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| store_error("insert note", e))?;

        insert_event(&mut tx, &insert.event).await?;

        tx.commit().await.map_err(|e| store_error("commit", e))?;

        Ok(insert.note)
    }
}

async fn insert_event(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    event: &LeadEvent,
) -> CoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO lead_events
            (id, site_id, lead_id, actor, event_type, channel, metadata, occurred_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(event.id)
    .bind(event.site_id.as_uuid())
    .bind(event.lead_id.as_uuid())
    .bind(event.actor.map(|a| *a.as_uuid()))
    .bind(event.event_type.as_str())
    .bind(&event.channel)
    .bind(&event.metadata)
    .bind(event.occurred_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| store_error("insert event", e))?;

    Ok(())
}

// Row decoding. Text columns hold the enum wire names; a value that fails to
// parse is a corrupt row and surfaces as a store error, not a panic.

fn lead_from_row(row: &PgRow) -> Result<Lead, Box<dyn std::error::Error + Send + Sync>> {
    let status: String = row.try_get("status")?;
    let last_activity_type: Option<String> = row.try_get("last_activity_type")?;

    Ok(Lead {
        id: LeadId::from_uuid(row.try_get("id")?),
        site_id: SiteId::from_uuid(row.try_get("site_id")?),
        kind: row.try_get("kind")?,
        status: leadops_leads::LeadStatus::from_str(&status)?,
        sub_status: row.try_get("sub_status")?,
        reason_code: row.try_get("reason_code")?,
        full_name: row.try_get("full_name")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        region: row.try_get("region")?,
        name_normalized: row.try_get("name_normalized")?,
        phone_digits: row.try_get("phone_digits")?,
        email_normalized: row.try_get("email_normalized")?,
        priority_score: row.try_get("priority_score")?,
        priority_reason: row.try_get("priority_reason")?,
        estimated_monthly_premium: row.try_get::<Option<Decimal>, _>("estimated_monthly_premium")?,
        estimated_commission: row.try_get::<Option<Decimal>, _>("estimated_commission")?,
        source_page: row.try_get("source_page")?,
        last_activity_at: row.try_get::<Option<DateTime<Utc>>, _>("last_activity_at")?,
        last_activity_type: last_activity_type
            .map(|t| ActivityType::from_str(&t))
            .transpose()?,
        next_action_at: row.try_get::<Option<DateTime<Utc>>, _>("next_action_at")?,
        next_action_type: row.try_get("next_action_type")?,
        archived_at: row.try_get::<Option<DateTime<Utc>>, _>("archived_at")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn note_from_row(row: &PgRow) -> Result<LeadNote, Box<dyn std::error::Error + Send + Sync>> {
    Ok(LeadNote {
        id: row.try_get("id")?,
        site_id: SiteId::from_uuid(row.try_get("site_id")?),
        lead_id: LeadId::from_uuid(row.try_get("lead_id")?),
        author: UserId::from_uuid(row.try_get("author")?),
        body: row.try_get("body")?,
        pinned: row.try_get("pinned")?,
        created_at: row.try_get("created_at")?,
    })
}

fn event_from_row(row: &PgRow) -> Result<LeadEvent, Box<dyn std::error::Error + Send + Sync>> {
    let event_type: String = row.try_get("event_type")?;
    let actor: Option<uuid::Uuid> = row.try_get("actor")?;

    Ok(LeadEvent {
        id: row.try_get("id")?,
        site_id: SiteId::from_uuid(row.try_get("site_id")?),
        lead_id: LeadId::from_uuid(row.try_get("lead_id")?),
        actor: actor.map(UserId::from_uuid),
        event_type: LeadEventType::from_str(&event_type)?,
        channel: row.try_get("channel")?,
        metadata: row.try_get("metadata")?,
        occurred_at: row.try_get("occurred_at")?,
    })
}

fn history_from_row(
    row: &PgRow,
) -> Result<LeadStatusHistory, Box<dyn std::error::Error + Send + Sync>> {
    let from_status: String = row.try_get("from_status")?;
    let to_status: String = row.try_get("to_status")?;
    let actor: Option<uuid::Uuid> = row.try_get("actor")?;

    Ok(LeadStatusHistory {
        id: row.try_get("id")?,
        site_id: SiteId::from_uuid(row.try_get("site_id")?),
        lead_id: LeadId::from_uuid(row.try_get("lead_id")?),
        from_status: leadops_leads::LeadStatus::from_str(&from_status)?,
        to_status: leadops_leads::LeadStatus::from_str(&to_status)?,
        actor: actor.map(UserId::from_uuid),
        reason_code: row.try_get("reason_code")?,
        created_at: row.try_get("created_at")?,
    })
}
