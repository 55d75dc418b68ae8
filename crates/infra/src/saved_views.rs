//! Saved view storage: read-mostly presets, seeded on first read.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use leadops_core::{CoreError, CoreResult, SiteId, UserId};
use leadops_query::{default_presets, SavedView};

/// Saved view persistence.
#[async_trait]
pub trait SavedViewStore: Send + Sync {
    /// Views for one owner within a site, presets first then by name.
    async fn list_for_owner(&self, site_id: SiteId, owner: UserId) -> CoreResult<Vec<SavedView>>;

    async fn insert(&self, view: &SavedView) -> CoreResult<()>;
}

/// List an owner's views, seeding the system presets when they have none.
pub async fn list_or_seed<S: SavedViewStore + ?Sized>(
    store: &S,
    site_id: SiteId,
    owner: UserId,
    now: DateTime<Utc>,
) -> CoreResult<Vec<SavedView>> {
    let existing = store.list_for_owner(site_id, owner).await?;
    if !existing.is_empty() {
        return Ok(existing);
    }

    for preset in default_presets(site_id, owner, now) {
        store.insert(&preset).await?;
    }
    store.list_for_owner(site_id, owner).await
}

fn sort_views(views: &mut [SavedView]) {
    views.sort_by(|a, b| {
        b.is_preset
            .cmp(&a.is_preset)
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// In-memory backend for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySavedViewStore {
    views: Mutex<Vec<SavedView>>,
}

impl InMemorySavedViewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl SavedViewStore for InMemorySavedViewStore {
    async fn list_for_owner(&self, site_id: SiteId, owner: UserId) -> CoreResult<Vec<SavedView>> {
        let views = self.views.lock().unwrap();
        let mut owned: Vec<SavedView> = views
            .iter()
            .filter(|v| v.site_id == site_id && v.owner == owner)
            .cloned()
            .collect();
        sort_views(&mut owned);
        Ok(owned)
    }

    async fn insert(&self, view: &SavedView) -> CoreResult<()> {
        self.views.lock().unwrap().push(view.clone());
        Ok(())
    }
}

/// Postgres backend. The query shape lives in a `jsonb` column; it is opaque
/// to SQL and round-trips through serde.
#[derive(Debug, Clone)]
pub struct PostgresSavedViewStore {
    pool: Arc<PgPool>,
}

impl PostgresSavedViewStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn store_error(operation: &str, err: sqlx::Error) -> CoreError {
    CoreError::transient(format!("saved view store {operation} failed: {err}"))
}

#[async_trait]
impl SavedViewStore for PostgresSavedViewStore {
    #[instrument(skip(self), fields(site_id = %site_id, owner = %owner), err)]
    async fn list_for_owner(&self, site_id: SiteId, owner: UserId) -> CoreResult<Vec<SavedView>> {
        let rows = sqlx::query(
            r#"
            SELECT id, site_id, owner, name, is_preset, is_default, query, created_at, updated_at
            FROM lead_saved_views
            WHERE site_id = $1 AND owner = $2
            ORDER BY is_preset DESC, name ASC
            "#,
        )
        .bind(site_id.as_uuid())
        .bind(owner.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| store_error("list", e))?;

        rows.iter()
            .map(|row| {
                let query: serde_json::Value = row
                    .try_get("query")
                    .map_err(|e| store_error("list decode", e))?;
                Ok(SavedView {
                    id: row.try_get("id").map_err(|e| store_error("list decode", e))?,
                    site_id: SiteId::from_uuid(
                        row.try_get("site_id")
                            .map_err(|e| store_error("list decode", e))?,
                    ),
                    owner: UserId::from_uuid(
                        row.try_get("owner")
                            .map_err(|e| store_error("list decode", e))?,
                    ),
                    name: row
                        .try_get("name")
                        .map_err(|e| store_error("list decode", e))?,
                    is_preset: row
                        .try_get("is_preset")
                        .map_err(|e| store_error("list decode", e))?,
                    is_default: row
                        .try_get("is_default")
                        .map_err(|e| store_error("list decode", e))?,
                    query: serde_json::from_value(query).map_err(|e| {
                        CoreError::transient(format!("saved view query undecodable: {e}"))
                    })?,
                    created_at: row
                        .try_get("created_at")
                        .map_err(|e| store_error("list decode", e))?,
                    updated_at: row
                        .try_get("updated_at")
                        .map_err(|e| store_error("list decode", e))?,
                })
            })
            .collect()
    }

    #[instrument(skip(self, view), fields(site_id = %view.site_id, name = %view.name), err)]
    async fn insert(&self, view: &SavedView) -> CoreResult<()> {
        let query = serde_json::to_value(&view.query)
            .map_err(|e| CoreError::validation(format!("unserializable view query: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO lead_saved_views
                (id, site_id, owner, name, is_preset, is_default, query, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(view.id)
        .bind(view.site_id.as_uuid())
        .bind(view.owner.as_uuid())
        .bind(&view.name)
        .bind(view.is_preset)
        .bind(view.is_default)
        .bind(&query)
        .bind(view.created_at)
        .bind(view.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| store_error("insert", e))?;

        Ok(())
    }
}
