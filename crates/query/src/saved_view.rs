//! Saved views: named filter/sort presets.
//!
//! Read-mostly configuration, not part of the concurrency-sensitive core.
//! System presets are seeded per owner the first time their list is read.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use leadops_core::{SiteId, UserId};
use leadops_leads::LeadStatus;

use crate::filter::{ArchivedFilter, LeadListQuery, NextActionDue};
use crate::sort::SortKey;

/// A named filter/sort preset, either system-provided or user-saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedView {
    pub id: Uuid,
    pub site_id: SiteId,
    pub owner: UserId,
    pub name: String,
    pub is_preset: bool,
    pub is_default: bool,
    pub query: LeadListQuery,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SavedView {
    pub fn preset(
        site_id: SiteId,
        owner: UserId,
        name: impl Into<String>,
        query: LeadListQuery,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            site_id,
            owner,
            name: name.into(),
            is_preset: true,
            is_default: false,
            query,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The system presets seeded for an owner with no views yet.
pub fn default_presets(site_id: SiteId, owner: UserId, now: DateTime<Utc>) -> Vec<SavedView> {
    vec![
        SavedView::preset(
            site_id,
            owner,
            "New (24h)",
            LeadListQuery {
                created_from: Some(now - Duration::hours(24)),
                ..LeadListQuery::default()
            },
            now,
        ),
        SavedView::preset(
            site_id,
            owner,
            "Hot (>=80)",
            LeadListQuery {
                priority_min: Some(80),
                sort: SortKey::PriorityDesc,
                ..LeadListQuery::default()
            },
            now,
        ),
        SavedView::preset(
            site_id,
            owner,
            "Needs follow-up",
            LeadListQuery {
                next_action_due: Some(NextActionDue::Overdue),
                sort: SortKey::NextActionAsc,
                ..LeadListQuery::default()
            },
            now,
        ),
        SavedView::preset(
            site_id,
            owner,
            "High value",
            LeadListQuery::sorted_by(SortKey::EstPremiumDesc),
            now,
        ),
        SavedView::preset(
            site_id,
            owner,
            "Lost/Archived",
            LeadListQuery {
                status_in: vec![LeadStatus::Lost, LeadStatus::Archived],
                archived: ArchivedFilter::Any,
                ..LeadListQuery::default()
            },
            now,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::QueryPlan;

    #[test]
    fn presets_compile_into_valid_plans() {
        let site = SiteId::new();
        let now = Utc::now();
        let presets = default_presets(site, UserId::new(), now);
        assert_eq!(presets.len(), 5);

        for preset in &presets {
            assert!(preset.is_preset);
            QueryPlan::compile(site, &preset.query, now).unwrap();
        }
    }

    #[test]
    fn preset_queries_survive_json_storage() {
        let presets = default_presets(SiteId::new(), UserId::new(), Utc::now());
        for preset in presets {
            let json = serde_json::to_string(&preset.query).unwrap();
            let back: LeadListQuery = serde_json::from_str(&json).unwrap();
            assert_eq!(back, preset.query);
        }
    }
}
