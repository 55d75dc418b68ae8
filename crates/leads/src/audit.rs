//! Append-only audit rows: notes, events, status history.
//!
//! Rows here are inserted once and never updated or deleted. Ordering is by
//! creation timestamp; notes additionally sort pinned-first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use leadops_core::{CoreError, LeadId, SiteId, UserId};

use crate::lead::LeadStatus;

/// A free-text note attached to a lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadNote {
    pub id: Uuid,
    pub site_id: SiteId,
    pub lead_id: LeadId,
    pub author: UserId,
    pub body: String,
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
}

impl LeadNote {
    pub fn new(
        site_id: SiteId,
        lead_id: LeadId,
        author: UserId,
        body: impl Into<String>,
        pinned: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            site_id,
            lead_id,
            author,
            body: body.into(),
            pinned,
            created_at,
        }
    }
}

/// Discriminant for the event feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadEventType {
    StatusChanged,
    NoteAdded,
}

impl LeadEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadEventType::StatusChanged => "status_changed",
            LeadEventType::NoteAdded => "note_added",
        }
    }
}

impl core::str::FromStr for LeadEventType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status_changed" => Ok(LeadEventType::StatusChanged),
            "note_added" => Ok(LeadEventType::NoteAdded),
            other => Err(CoreError::validation(format!(
                "unknown lead event type: {other}"
            ))),
        }
    }
}

/// One entry in a lead's activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadEvent {
    pub id: Uuid,
    pub site_id: SiteId,
    pub lead_id: LeadId,
    pub actor: Option<UserId>,
    pub event_type: LeadEventType,
    pub channel: String,
    pub metadata: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl LeadEvent {
    /// Event emitted alongside every status change, carrying the transition
    /// in its metadata.
    #[allow(clippy::too_many_arguments)]
    pub fn status_changed(
        site_id: SiteId,
        lead_id: LeadId,
        actor: Option<UserId>,
        from_status: LeadStatus,
        to_status: LeadStatus,
        from_sub_status: Option<&str>,
        to_sub_status: Option<&str>,
        reason_code: Option<&str>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            site_id,
            lead_id,
            actor,
            event_type: LeadEventType::StatusChanged,
            channel: "status_change".to_string(),
            metadata: serde_json::json!({
                "from_status": from_status.as_str(),
                "to_status": to_status.as_str(),
                "from_sub_status": from_sub_status,
                "to_sub_status": to_sub_status,
                "reason_code": reason_code,
            }),
            occurred_at,
        }
    }

    /// Event emitted alongside every note insertion.
    pub fn note_added(
        site_id: SiteId,
        lead_id: LeadId,
        actor: UserId,
        pinned: bool,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            site_id,
            lead_id,
            actor: Some(actor),
            event_type: LeadEventType::NoteAdded,
            channel: "note".to_string(),
            metadata: serde_json::json!({ "pinned": pinned }),
            occurred_at,
        }
    }
}

/// One row of status history, written in the same transaction as the status
/// update it records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadStatusHistory {
    pub id: Uuid,
    pub site_id: SiteId,
    pub lead_id: LeadId,
    pub from_status: LeadStatus,
    pub to_status: LeadStatus,
    pub actor: Option<UserId>,
    pub reason_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LeadStatusHistory {
    pub fn new(
        site_id: SiteId,
        lead_id: LeadId,
        from_status: LeadStatus,
        to_status: LeadStatus,
        actor: Option<UserId>,
        reason_code: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            site_id,
            lead_id,
            from_status,
            to_status,
            actor,
            reason_code,
            created_at,
        }
    }
}
