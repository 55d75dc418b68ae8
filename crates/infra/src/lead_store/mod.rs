//! Lead persistence: the store trait and its backends.
//!
//! The trait is deliberately transactional at the operation level: a status
//! change or a note insertion is one call, and each backend guarantees the
//! row update and its audit rows land together or not at all. The service
//! layer composes validation around these calls; it never sequences partial
//! writes itself.

mod memory;
mod postgres;
pub(crate) mod sql;

pub use memory::InMemoryLeadStore;
pub use postgres::PostgresLeadStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use leadops_core::{CoreResult, LeadId, SiteId};
use leadops_leads::{ChangeStatus, Lead, LeadEvent, LeadNote, LeadStatusHistory};
use leadops_query::QueryPlan;

/// A fully-prepared status mutation.
///
/// Built by the mutation service from a row it has already read: the audit
/// rows capture the observed `from` state. If a concurrent writer slips in
/// between that read and this write, the conditional update matches zero rows
/// and the whole package is rejected with `Conflict` — the stale audit rows
/// are never written.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub site_id: SiteId,
    pub lead_id: LeadId,
    pub change: ChangeStatus,
    pub history: LeadStatusHistory,
    pub event: LeadEvent,
    pub occurred_at: DateTime<Utc>,
}

/// A prepared note insertion: the note row, its feed event, and the implied
/// activity rollup on the lead.
#[derive(Debug, Clone)]
pub struct NoteInsert {
    pub note: LeadNote,
    pub event: LeadEvent,
}

/// Lead storage operations.
///
/// Every method is scoped by `SiteId`; there is no way to address a lead
/// without naming its site. Store unavailability surfaces as
/// `CoreError::Transient`.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Insert a new lead (intake/provisioning path).
    async fn insert(&self, lead: &Lead) -> CoreResult<()>;

    /// Point lookup scoped to a site.
    async fn get(&self, site_id: SiteId, lead_id: LeadId) -> CoreResult<Option<Lead>>;

    /// Execute a compiled plan: filters + order + seek + limit.
    async fn list(&self, plan: &QueryPlan) -> CoreResult<Vec<Lead>>;

    /// Count rows matching the plan's *filter predicates*. The seek position
    /// is never part of a count; callers pass `plan.without_seek()`.
    async fn count(&self, plan: &QueryPlan) -> CoreResult<u64>;

    /// Notes for a lead, pinned first then newest first.
    async fn list_notes(
        &self,
        site_id: SiteId,
        lead_id: LeadId,
        limit: u32,
    ) -> CoreResult<Vec<LeadNote>>;

    /// Events for a lead, newest first.
    async fn list_events(
        &self,
        site_id: SiteId,
        lead_id: LeadId,
        limit: u32,
    ) -> CoreResult<Vec<LeadEvent>>;

    /// Status history for a lead, newest first.
    async fn list_status_history(
        &self,
        site_id: SiteId,
        lead_id: LeadId,
        limit: u32,
    ) -> CoreResult<Vec<LeadStatusHistory>>;

    /// Apply a status change conditionally on `(id, site_id, version)` and
    /// append its audit rows, atomically. Zero matched rows → `Conflict`.
    /// Returns the updated lead.
    async fn apply_status_change(&self, update: StatusUpdate) -> CoreResult<Lead>;

    /// Insert a note + feed event and roll activity up onto the lead,
    /// atomically. The rollup advances `version` but takes no version
    /// precondition. Missing lead → `NotFound`.
    async fn add_note(&self, insert: NoteInsert) -> CoreResult<LeadNote>;
}
