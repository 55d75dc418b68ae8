//! Lead export: producer API + the background job handler.
//!
//! The producer enqueues a `lead_export` job carrying the stored query; a
//! worker later replays that query in bulk mode and renders CSV. The result
//! is stored inline on the job row (`csv_inline`) with `url` left null until
//! an object-store integration takes over artifact hosting.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use leadops_auth::{authorize, Permission, Principal};
use leadops_core::{CoreError, CoreResult};
use leadops_leads::Lead;
use leadops_query::LeadListQuery;

use crate::jobs::{Job, JobHandler, JobId, JobKind, JobState, JobStore};
use crate::lead_store::LeadStore;
use crate::services::query_service::LeadQueryService;

/// Hard bound on exported rows per job.
const EXPORT_ROW_CAP: usize = 5000;

/// What a producer sees when polling an export job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportStatus {
    pub job_id: JobId,
    pub state: JobState,
    /// Artifact location once hosted; currently always `None` (inline CSV).
    pub url: Option<String>,
}

/// Payload stored on a `lead_export` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExportPayload {
    query: LeadListQuery,
}

/// Producer side: enqueue and poll export jobs.
pub struct ExportService<J: JobStore> {
    jobs: Arc<J>,
}

impl<J: JobStore> ExportService<J> {
    pub fn new(jobs: Arc<J>) -> Self {
        Self { jobs }
    }

    /// Enqueue an export of the given query for the principal's site.
    #[instrument(skip(self, principal, query), fields(site_id = %principal.site_id), err)]
    pub async fn enqueue(
        &self,
        principal: &Principal,
        query: &LeadListQuery,
    ) -> CoreResult<JobId> {
        authorize(principal, &Permission::leads_export())?;

        let payload = ExportPayload {
            // The stored query is replayed later; a pagination position from
            // the requesting page would silently truncate the export.
            query: query.clone().without_cursor(),
        };
        let payload = serde_json::to_value(&payload)
            .map_err(|e| CoreError::validation(format!("unserializable export query: {e}")))?;

        let job = Job::new(principal.site_id, JobKind::lead_export(), payload);
        self.jobs.enqueue(job).await
    }

    /// Poll an export job. The producer observes handler failure here, as a
    /// `failed` state — it is never thrown at enqueue time.
    #[instrument(skip(self, principal), fields(site_id = %principal.site_id, job_id = %job_id), err)]
    pub async fn poll(&self, principal: &Principal, job_id: JobId) -> CoreResult<ExportStatus> {
        authorize(principal, &Permission::leads_export())?;

        let job = self
            .jobs
            .get(principal.site_id, job_id)
            .await?
            .filter(|j| j.kind == JobKind::lead_export())
            .ok_or(CoreError::NotFound)?;

        let url = job
            .result
            .as_ref()
            .and_then(|r| r.get("url"))
            .and_then(|u| u.as_str())
            .map(String::from);

        Ok(ExportStatus {
            job_id: job.id,
            state: job.state,
            url,
        })
    }
}

/// Worker-side handler for `lead_export` jobs.
pub struct LeadExportHandler<S: LeadStore> {
    queries: LeadQueryService<S>,
}

impl<S: LeadStore> LeadExportHandler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            queries: LeadQueryService::new(store),
        }
    }
}

#[async_trait]
impl<S: LeadStore + 'static> JobHandler for LeadExportHandler<S> {
    async fn run(&self, job: &Job) -> anyhow::Result<serde_json::Value> {
        let payload: ExportPayload =
            serde_json::from_value(job.payload.clone()).context("invalid export payload")?;

        let rows = self
            .queries
            .collect_for_export(job.site_id, &payload.query, Utc::now(), EXPORT_ROW_CAP)
            .await?;

        let csv = render_csv(&rows);

        Ok(serde_json::json!({
            "csv_inline": csv,
            "url": null,
            "rows": rows.len(),
        }))
    }
}

const CSV_HEADER: &str = "id,created_at,kind,status,full_name,phone,email,source_page";

fn render_csv(rows: &[Lead]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(CSV_HEADER.to_string());

    for lead in rows {
        let fields = [
            lead.id.to_string(),
            lead.created_at.to_rfc3339(),
            lead.kind.clone(),
            lead.status.as_str().to_string(),
            lead.full_name.clone(),
            lead.phone.clone().unwrap_or_default(),
            lead.email.clone().unwrap_or_default(),
            lead.source_page.clone().unwrap_or_default(),
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_escape(f)).collect();
        lines.push(line.join(","));
    }

    lines.join("\n")
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
