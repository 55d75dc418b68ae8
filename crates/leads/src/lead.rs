use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use leadops_core::{CoreError, CoreResult, Entity, LeadId, SiteId};

/// Lead lifecycle status.
///
/// `Lost` and `Archived` are terminal-like: entering either requires a
/// non-empty reason code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Won,
    Lost,
    Archived,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Won => "won",
            LeadStatus::Lost => "lost",
            LeadStatus::Archived => "archived",
        }
    }

    /// Whether entering this status requires a reason code.
    pub fn requires_reason_code(&self) -> bool {
        matches!(self, LeadStatus::Lost | LeadStatus::Archived)
    }
}

impl core::str::FromStr for LeadStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(LeadStatus::New),
            "contacted" => Ok(LeadStatus::Contacted),
            "qualified" => Ok(LeadStatus::Qualified),
            "won" => Ok(LeadStatus::Won),
            "lost" => Ok(LeadStatus::Lost),
            "archived" => Ok(LeadStatus::Archived),
            other => Err(CoreError::validation(format!("unknown lead status: {other}"))),
        }
    }
}

impl core::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What last touched a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    StatusChange,
    Note,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::StatusChange => "status_change",
            ActivityType::Note => "note",
        }
    }
}

impl core::str::FromStr for ActivityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status_change" => Ok(ActivityType::StatusChange),
            "note" => Ok(ActivityType::Note),
            other => Err(CoreError::validation(format!(
                "unknown activity type: {other}"
            ))),
        }
    }
}

/// A lead record, owned by exactly one site.
///
/// Mutable under optimistic concurrency: every successful mutation increments
/// `version` by exactly one and stamps `updated_at`. Monetary estimates are
/// decimals, never floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub site_id: SiteId,

    /// Product line / intake vertical (free-form, site-defined).
    pub kind: String,
    pub status: LeadStatus,
    pub sub_status: Option<String>,
    pub reason_code: Option<String>,

    pub full_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub region: Option<String>,

    // Normalized shadows used by search. Maintained on every contact change.
    pub name_normalized: String,
    pub phone_digits: Option<String>,
    pub email_normalized: Option<String>,

    pub priority_score: i32,
    pub priority_reason: serde_json::Value,

    pub estimated_monthly_premium: Option<Decimal>,
    pub estimated_commission: Option<Decimal>,

    pub source_page: Option<String>,

    pub last_activity_at: Option<DateTime<Utc>>,
    pub last_activity_type: Option<ActivityType>,
    pub next_action_at: Option<DateTime<Utc>>,
    pub next_action_type: Option<String>,

    /// `None` means active; `Some` is the instant the lead was archived.
    pub archived_at: Option<DateTime<Utc>>,

    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Lead {
    type Id = LeadId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Lead {
    /// Create a fresh lead at version 1.
    pub fn new(site_id: SiteId, kind: impl Into<String>, full_name: impl Into<String>) -> Self {
        let now = Utc::now();
        let full_name = full_name.into();
        Self {
            id: LeadId::new(),
            site_id,
            kind: kind.into(),
            status: LeadStatus::New,
            sub_status: None,
            reason_code: None,
            name_normalized: normalize_name(&full_name),
            full_name,
            phone: None,
            email: None,
            region: None,
            phone_digits: None,
            email_normalized: None,
            priority_score: 0,
            priority_reason: serde_json::Value::Null,
            estimated_monthly_premium: None,
            estimated_commission: None,
            source_page: None,
            last_activity_at: None,
            last_activity_type: None,
            next_action_at: None,
            next_action_type: None,
            archived_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        let phone = phone.into();
        self.phone_digits = Some(phone_digits(&phone));
        self.phone = Some(phone);
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        let email = email.into();
        self.email_normalized = Some(normalize_email(&email));
        self.email = Some(email);
        self
    }

    pub fn with_priority(mut self, score: i32) -> Self {
        self.priority_score = score;
        self
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    /// Apply a validated status change in place.
    ///
    /// The version precondition is the *store's* job (conditional write);
    /// this only encodes what a successful change does to the row: status
    /// fields, activity rollup, archived_at bookkeeping, `version + 1` and
    /// `updated_at`. The in-memory backend calls this under its table lock;
    /// the Postgres backend expresses the same change as one UPDATE.
    pub fn apply_status_change(&mut self, change: &ChangeStatus, now: DateTime<Utc>) {
        self.status = change.status;
        // None keeps the existing value; clearing a sub-status is its own
        // transition with an explicit empty marker, not an omission.
        if change.sub_status.is_some() {
            self.sub_status = change.sub_status.clone();
        }
        if change.reason_code.is_some() {
            self.reason_code = change.reason_code.clone();
        }
        if let Some(at) = change.next_action_at {
            self.next_action_at = Some(at);
        }
        if let Some(ref ty) = change.next_action_type {
            self.next_action_type = Some(ty.clone());
        }
        self.archived_at = match change.status {
            LeadStatus::Archived => self.archived_at.or(Some(now)),
            _ => None,
        };
        self.last_activity_at = Some(now);
        self.last_activity_type = Some(ActivityType::StatusChange);
        self.version += 1;
        self.updated_at = now;
    }

    /// Roll up a note insertion onto the lead.
    ///
    /// Notes don't carry a version precondition (append-only rows can't
    /// conflict with themselves) but the rollup still advances `version` so
    /// concurrent status editors observe the write.
    pub fn apply_note_activity(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = Some(now);
        self.last_activity_type = Some(ActivityType::Note);
        self.version += 1;
        self.updated_at = now;
    }
}

/// A requested status transition, validated at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatus {
    pub status: LeadStatus,
    pub sub_status: Option<String>,
    pub reason_code: Option<String>,
    pub next_action_at: Option<DateTime<Utc>>,
    pub next_action_type: Option<String>,
    /// The version the caller last read. The write is conditional on it.
    pub expected_version: i64,
}

impl ChangeStatus {
    pub fn new(status: LeadStatus, expected_version: i64) -> Self {
        Self {
            status,
            sub_status: None,
            reason_code: None,
            next_action_at: None,
            next_action_type: None,
            expected_version,
        }
    }

    pub fn with_sub_status(mut self, sub_status: impl Into<String>) -> Self {
        self.sub_status = Some(sub_status.into());
        self
    }

    pub fn with_reason_code(mut self, reason_code: impl Into<String>) -> Self {
        self.reason_code = Some(reason_code.into());
        self
    }

    /// Business rule: terminal-like statuses require a non-empty reason code.
    pub fn validate(&self) -> CoreResult<()> {
        if self.status.requires_reason_code() {
            match self.reason_code.as_deref() {
                Some(code) if !code.trim().is_empty() => {}
                _ => {
                    return Err(CoreError::validation(format!(
                        "reason_code required for status '{}'",
                        self.status
                    )))
                }
            }
        }
        Ok(())
    }
}

/// Lowercased, trimmed name for substring search.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Lowercased, trimmed email for exact matching.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Digits only, for phone substring matching.
pub fn phone_digits(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}
