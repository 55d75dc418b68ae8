//! Sort keys and the total orders they define.
//!
//! Every sort key orders by a primary column (nulls last where nullable) and
//! deterministic tie-breakers ending in the record id, so no two leads ever
//! compare equal. That totality is what makes keyset pagination loss- and
//! duplicate-free.

use core::cmp::Ordering;

use serde::{Deserialize, Serialize};

use leadops_core::CoreError;
use leadops_leads::Lead;

/// Direction of the primary sort column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// The fixed set of supported sort keys. Wire names match the query string
/// values clients send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortKey {
    /// `created_at desc, id desc`
    #[serde(rename = "created_at_desc")]
    CreatedDesc,
    /// `priority_score desc, created_at desc, id desc`
    #[serde(rename = "priority_desc")]
    PriorityDesc,
    /// `last_activity_at desc nulls last, created_at desc, id desc`
    #[serde(rename = "last_activity_desc")]
    LastActivityDesc,
    /// `next_action_at asc nulls last, id asc`
    #[serde(rename = "next_action_asc")]
    NextActionAsc,
    /// `estimated_monthly_premium desc nulls last, created_at desc, id desc`
    #[serde(rename = "est_premium_desc")]
    EstPremiumDesc,
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey::CreatedDesc
    }
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::CreatedDesc => "created_at_desc",
            SortKey::PriorityDesc => "priority_desc",
            SortKey::LastActivityDesc => "last_activity_desc",
            SortKey::NextActionAsc => "next_action_asc",
            SortKey::EstPremiumDesc => "est_premium_desc",
        }
    }

    pub fn direction(&self) -> SortDirection {
        match self {
            SortKey::NextActionAsc => SortDirection::Asc,
            _ => SortDirection::Desc,
        }
    }

    /// Whether the primary sort column is nullable.
    ///
    /// Nullable primaries sort last and terminate cursor pagination when a
    /// page ends on a null value.
    pub fn primary_is_nullable(&self) -> bool {
        matches!(
            self,
            SortKey::LastActivityDesc | SortKey::NextActionAsc | SortKey::EstPremiumDesc
        )
    }

    /// Compare two leads in this key's display order.
    pub fn cmp_leads(&self, a: &Lead, b: &Lead) -> Ordering {
        match self {
            SortKey::CreatedDesc => b
                .created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id)),
            SortKey::PriorityDesc => b
                .priority_score
                .cmp(&a.priority_score)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id)),
            SortKey::LastActivityDesc => desc_nulls_last(&a.last_activity_at, &b.last_activity_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id)),
            SortKey::NextActionAsc => asc_nulls_last(&a.next_action_at, &b.next_action_at)
                .then_with(|| a.id.cmp(&b.id)),
            SortKey::EstPremiumDesc => desc_nulls_last(
                &a.estimated_monthly_premium,
                &b.estimated_monthly_premium,
            )
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| b.id.cmp(&a.id)),
        }
    }
}

impl core::str::FromStr for SortKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created_at_desc" => Ok(SortKey::CreatedDesc),
            "priority_desc" => Ok(SortKey::PriorityDesc),
            "last_activity_desc" => Ok(SortKey::LastActivityDesc),
            "next_action_asc" => Ok(SortKey::NextActionAsc),
            "est_premium_desc" => Ok(SortKey::EstPremiumDesc),
            other => Err(CoreError::validation(format!("unknown sort key: {other}"))),
        }
    }
}

impl core::fmt::Display for SortKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn desc_nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn asc_nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
