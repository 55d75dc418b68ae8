//! Core job types.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use leadops_core::{Entity, SiteId};

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job kind — the string that routes a job to its handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKind(Cow<'static, str>);

impl JobKind {
    pub fn new(kind: impl Into<Cow<'static, str>>) -> Self {
        Self(kind.into())
    }

    /// CSV export of a stored lead query.
    pub fn lead_export() -> Self {
        Self::new("lead_export")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job lifecycle: `queued → running → {ready | failed}`.
///
/// `ready` and `failed` are terminal; no transition ever leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Ready,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Ready => "ready",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Ready | JobState::Failed)
    }
}

impl core::str::FromStr for JobState {
    type Err = leadops_core::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobState::Queued),
            "running" => Ok(JobState::Running),
            "ready" => Ok(JobState::Ready),
            "failed" => Ok(JobState::Failed),
            other => Err(leadops_core::CoreError::validation(format!(
                "unknown job state: {other}"
            ))),
        }
    }
}

/// A background job row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub site_id: SiteId,
    pub kind: JobKind,
    pub state: JobState,
    /// Handler input.
    pub payload: serde_json::Value,
    /// Handler output on `ready`; error detail on `failed`.
    pub result: Option<serde_json::Value>,
    /// Incremented each time a worker claims the job.
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Job {
    type Id = JobId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Job {
    /// Create a job in `queued`.
    pub fn new(site_id: SiteId, kind: JobKind, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            site_id,
            kind,
            state: JobState::Queued,
            payload,
            result: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The claim-time transition. Only ever applied to a `queued` job, and
    /// only by the store that just claimed it.
    pub(crate) fn mark_running(&mut self, now: DateTime<Utc>) {
        self.state = JobState::Running;
        self.attempts += 1;
        self.updated_at = now;
    }

    pub(crate) fn mark_ready(&mut self, result: serde_json::Value, now: DateTime<Utc>) {
        self.state = JobState::Ready;
        self.result = Some(result);
        self.updated_at = now;
    }

    pub(crate) fn mark_failed(&mut self, error: String, now: DateTime<Utc>) {
        self.state = JobState::Failed;
        self.result = Some(serde_json::json!({ "error": error }));
        self.updated_at = now;
    }

    /// Error detail recorded on a failed job, if any.
    pub fn error_detail(&self) -> Option<&str> {
        self.result.as_ref()?.get("error")?.as_str()
    }
}
