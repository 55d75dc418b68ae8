//! In-memory lead store for tests and development.
//!
//! Semantics mirror the Postgres backend exactly — same predicate
//! evaluation, same total orders, same seek exclusion — so the pagination
//! and concurrency properties can be exercised without a database. The
//! table-wide `RwLock` is the linearization point that stands in for
//! Postgres row atomicity.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use leadops_core::{CoreError, CoreResult, LeadId, SiteId};
use leadops_leads::{Lead, LeadEvent, LeadNote, LeadStatusHistory};
use leadops_query::QueryPlan;

use super::{LeadStore, NoteInsert, StatusUpdate};

#[derive(Debug, Default)]
struct Tables {
    leads: HashMap<LeadId, Lead>,
    notes: Vec<LeadNote>,
    events: Vec<LeadEvent>,
    status_history: Vec<LeadStatusHistory>,
}

/// In-memory backend.
#[derive(Debug, Default)]
pub struct InMemoryLeadStore {
    tables: RwLock<Tables>,
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn insert(&self, lead: &Lead) -> CoreResult<()> {
        let mut tables = self.tables.write().unwrap();
        if tables.leads.contains_key(&lead.id) {
            return Err(CoreError::conflict(format!("lead {} already exists", lead.id)));
        }
        tables.leads.insert(lead.id, lead.clone());
        Ok(())
    }

    async fn get(&self, site_id: SiteId, lead_id: LeadId) -> CoreResult<Option<Lead>> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .leads
            .get(&lead_id)
            .filter(|l| l.site_id == site_id)
            .cloned())
    }

    async fn list(&self, plan: &QueryPlan) -> CoreResult<Vec<Lead>> {
        let tables = self.tables.read().unwrap();
        let mut rows: Vec<Lead> = tables
            .leads
            .values()
            .filter(|l| plan.admits(l))
            .cloned()
            .collect();
        rows.sort_by(|a, b| plan.sort().cmp_leads(a, b));
        rows.truncate(plan.limit() as usize);
        Ok(rows)
    }

    async fn count(&self, plan: &QueryPlan) -> CoreResult<u64> {
        let tables = self.tables.read().unwrap();
        // Filter predicates only — the seek position never affects a count.
        Ok(tables.leads.values().filter(|l| plan.matches(l)).count() as u64)
    }

    async fn list_notes(
        &self,
        site_id: SiteId,
        lead_id: LeadId,
        limit: u32,
    ) -> CoreResult<Vec<LeadNote>> {
        let tables = self.tables.read().unwrap();
        let mut notes: Vec<LeadNote> = tables
            .notes
            .iter()
            .filter(|n| n.site_id == site_id && n.lead_id == lead_id)
            .cloned()
            .collect();
        notes.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        notes.truncate(limit as usize);
        Ok(notes)
    }

    async fn list_events(
        &self,
        site_id: SiteId,
        lead_id: LeadId,
        limit: u32,
    ) -> CoreResult<Vec<LeadEvent>> {
        let tables = self.tables.read().unwrap();
        let mut events: Vec<LeadEvent> = tables
            .events
            .iter()
            .filter(|e| e.site_id == site_id && e.lead_id == lead_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            b.occurred_at
                .cmp(&a.occurred_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        events.truncate(limit as usize);
        Ok(events)
    }

    async fn list_status_history(
        &self,
        site_id: SiteId,
        lead_id: LeadId,
        limit: u32,
    ) -> CoreResult<Vec<LeadStatusHistory>> {
        let tables = self.tables.read().unwrap();
        let mut history: Vec<LeadStatusHistory> = tables
            .status_history
            .iter()
            .filter(|h| h.site_id == site_id && h.lead_id == lead_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        history.truncate(limit as usize);
        Ok(history)
    }

    async fn apply_status_change(&self, update: StatusUpdate) -> CoreResult<Lead> {
        let mut tables = self.tables.write().unwrap();

        let lead = match tables.leads.get_mut(&update.lead_id) {
            Some(lead) if lead.site_id == update.site_id => lead,
            _ => return Err(CoreError::NotFound),
        };

        // The conditional-write race is closed here by the table write lock,
        // exactly as it is closed by `WHERE version = $n` in Postgres.
        if lead.version != update.change.expected_version {
            return Err(CoreError::conflict(format!(
                "expected version {}, found {}",
                update.change.expected_version, lead.version
            )));
        }

        lead.apply_status_change(&update.change, update.occurred_at);
        let updated = lead.clone();

        tables.status_history.push(update.history);
        tables.events.push(update.event);

        Ok(updated)
    }

    async fn add_note(&self, insert: NoteInsert) -> CoreResult<LeadNote> {
        let mut tables = self.tables.write().unwrap();

        let lead = match tables.leads.get_mut(&insert.note.lead_id) {
            Some(lead) if lead.site_id == insert.note.site_id => lead,
            _ => return Err(CoreError::NotFound),
        };

        lead.apply_note_activity(insert.note.created_at);

        let note = insert.note.clone();
        tables.notes.push(insert.note);
        tables.events.push(insert.event);

        Ok(note)
    }
}
