//! Filters as data: the boundary query shape and the tagged predicate set
//! plans are compiled into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use leadops_leads::Lead;

use crate::sort::SortKey;

/// Tri-state archive filter. The default hides archived leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArchivedFilter {
    #[default]
    ActiveOnly,
    ArchivedOnly,
    Any,
}

/// Due-window filter on `next_action_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextActionDue {
    Overdue,
    Today,
    #[serde(rename = "next_7_days")]
    Next7Days,
    Any,
}

/// Page size, clamped to sane bounds at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageLimit(u32);

impl PageLimit {
    pub const DEFAULT: u32 = 50;
    pub const MAX: u32 = 200;

    /// Clamp a requested limit into `[1, 200]`; `None` means the default 50.
    pub fn clamp(requested: Option<u32>) -> Self {
        Self(requested.unwrap_or(Self::DEFAULT).clamp(1, Self::MAX))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Default for PageLimit {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

/// The validated list query a caller hands to the compiler.
///
/// Site scope is *not* part of this shape — it comes from the principal and
/// is attached by the compiler, so no filter combination can drop it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LeadListQuery {
    /// Free text; classified into email/phone/name matching at compile time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub status_in: Vec<leadops_leads::LeadStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sub_status_in: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub kind_in: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub region_in: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_min: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_max: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_to: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_action_due: Option<NextActionDue>,

    pub archived: ArchivedFilter,
    pub sort: SortKey,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Opaque cursor from a previous page, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl LeadListQuery {
    pub fn sorted_by(sort: SortKey) -> Self {
        Self {
            sort,
            ..Self::default()
        }
    }

    /// Same query without pagination position (used when a stored query is
    /// replayed, e.g. by the export handler).
    pub fn without_cursor(mut self) -> Self {
        self.cursor = None;
        self
    }
}

/// One compiled filter condition.
///
/// Each kind carries a typed value; there is no string-interpolated or
/// dynamically-typed path from request input to the store. Time-relative
/// filters arrive here already resolved to concrete bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    ArchivedIsNull,
    ArchivedIsNotNull,
    StatusIn(Vec<leadops_leads::LeadStatus>),
    SubStatusIn(Vec<String>),
    KindIn(Vec<String>),
    RegionIn(Vec<String>),
    PriorityAtLeast(i32),
    PriorityAtMost(i32),
    CreatedAtOrAfter(DateTime<Utc>),
    CreatedBefore(DateTime<Utc>),
    /// `next_action_at` is set, regardless of when.
    NextActionSet,
    /// `next_action_at` is set and strictly before the bound (overdue).
    NextActionBefore(DateTime<Utc>),
    /// `next_action_at` ∈ `[from, to)`.
    NextActionBetween {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    /// Exact match on the normalized email.
    EmailEquals(String),
    /// Substring match on the digits-only phone.
    PhoneContains(String),
    /// Substring match on the normalized name.
    NameContains(String),
}

impl Predicate {
    /// Evaluate against an in-memory lead. The Postgres renderer must agree
    /// with this exactly; the pagination tests rely on it.
    pub fn matches(&self, lead: &Lead) -> bool {
        match self {
            Predicate::ArchivedIsNull => lead.archived_at.is_none(),
            Predicate::ArchivedIsNotNull => lead.archived_at.is_some(),
            Predicate::StatusIn(statuses) => statuses.contains(&lead.status),
            Predicate::SubStatusIn(subs) => lead
                .sub_status
                .as_deref()
                .is_some_and(|s| subs.iter().any(|x| x == s)),
            Predicate::KindIn(kinds) => kinds.iter().any(|k| k == &lead.kind),
            Predicate::RegionIn(regions) => lead
                .region
                .as_deref()
                .is_some_and(|r| regions.iter().any(|x| x == r)),
            Predicate::PriorityAtLeast(min) => lead.priority_score >= *min,
            Predicate::PriorityAtMost(max) => lead.priority_score <= *max,
            Predicate::CreatedAtOrAfter(from) => lead.created_at >= *from,
            Predicate::CreatedBefore(to) => lead.created_at < *to,
            Predicate::NextActionSet => lead.next_action_at.is_some(),
            Predicate::NextActionBefore(bound) => {
                lead.next_action_at.is_some_and(|at| at < *bound)
            }
            Predicate::NextActionBetween { from, to } => lead
                .next_action_at
                .is_some_and(|at| at >= *from && at < *to),
            Predicate::EmailEquals(email) => {
                lead.email_normalized.as_deref() == Some(email.as_str())
            }
            Predicate::PhoneContains(digits) => lead
                .phone_digits
                .as_deref()
                .is_some_and(|p| p.contains(digits.as_str())),
            Predicate::NameContains(needle) => lead.name_normalized.contains(needle.as_str()),
        }
    }
}

/// Classify a free-text search term the way the intake UI expects:
/// looks-like-email → exact normalized email match; looks-like-phone (≥ 7
/// digits among phone punctuation) → digits substring match; anything else →
/// normalized name substring match. Blank input means no predicate.
pub fn classify_search(raw: &str) -> Option<Predicate> {
    let term = raw.trim();
    if term.is_empty() {
        return None;
    }

    if term.contains('@') {
        return Some(Predicate::EmailEquals(term.to_lowercase()));
    }

    let digits: String = term.chars().filter(|c| c.is_ascii_digit()).collect();
    let phone_shaped = term
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '(' | ')' | '-' | ' '));
    if phone_shaped && digits.len() >= 7 {
        return Some(Predicate::PhoneContains(digits));
    }

    Some(Predicate::NameContains(term.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadops_core::SiteId;
    use leadops_leads::LeadStatus;

    #[test]
    fn limit_clamps_into_bounds() {
        assert_eq!(PageLimit::clamp(None).get(), 50);
        assert_eq!(PageLimit::clamp(Some(0)).get(), 1);
        assert_eq!(PageLimit::clamp(Some(25)).get(), 25);
        assert_eq!(PageLimit::clamp(Some(9_999)).get(), 200);
    }

    #[test]
    fn search_classification_matches_intake_heuristics() {
        assert_eq!(
            classify_search("Dana.Roe@Example.com"),
            Some(Predicate::EmailEquals("dana.roe@example.com".into()))
        );
        assert_eq!(
            classify_search("+1 (555) 010-7788"),
            Some(Predicate::PhoneContains("15550107788".into()))
        );
        // Too few digits to be a phone number.
        assert_eq!(
            classify_search("555"),
            Some(Predicate::NameContains("555".into()))
        );
        assert_eq!(
            classify_search("  Dana Roe "),
            Some(Predicate::NameContains("dana roe".into()))
        );
        assert_eq!(classify_search("   "), None);
    }

    #[test]
    fn predicates_evaluate_against_leads() {
        let lead = Lead::new(SiteId::new(), "auto", "Dana Roe")
            .with_email("dana@example.com")
            .with_phone("555-010-7788")
            .with_priority(85);

        assert!(Predicate::ArchivedIsNull.matches(&lead));
        assert!(!Predicate::ArchivedIsNotNull.matches(&lead));
        assert!(Predicate::StatusIn(vec![LeadStatus::New]).matches(&lead));
        assert!(!Predicate::StatusIn(vec![LeadStatus::Lost]).matches(&lead));
        assert!(Predicate::KindIn(vec!["auto".into()]).matches(&lead));
        assert!(Predicate::PriorityAtLeast(80).matches(&lead));
        assert!(!Predicate::PriorityAtMost(80).matches(&lead));
        assert!(Predicate::EmailEquals("dana@example.com".into()).matches(&lead));
        assert!(Predicate::PhoneContains("0107788".into()).matches(&lead));
        assert!(Predicate::NameContains("dana".into()).matches(&lead));
        // Null fields never match membership filters.
        assert!(!Predicate::RegionIn(vec!["tx".into()]).matches(&lead));
        assert!(!Predicate::SubStatusIn(vec!["callback".into()]).matches(&lead));
    }

    #[test]
    fn next_action_windows_exclude_unset_leads() {
        let now = Utc::now();
        let unset = Lead::new(SiteId::new(), "auto", "A");
        let mut due = unset.clone();
        due.next_action_at = Some(now - chrono::Duration::hours(2));

        assert!(!Predicate::NextActionSet.matches(&unset));
        assert!(!Predicate::NextActionBefore(now).matches(&unset));
        assert!(Predicate::NextActionBefore(now).matches(&due));
        assert!(!Predicate::NextActionBetween {
            from: now,
            to: now + chrono::Duration::days(7)
        }
        .matches(&due));
    }
}
