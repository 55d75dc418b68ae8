//! `leadops-leads` — the `Lead` record and its append-only audit trail.
//!
//! A lead is a mutable, site-owned record guarded by optimistic concurrency
//! (`version`); notes, events and status history are append-only rows that
//! reference it. Pure domain logic lives here — persistence is in
//! `leadops-infra`.

pub mod audit;
pub mod lead;

pub use audit::{LeadEvent, LeadEventType, LeadNote, LeadStatusHistory};
pub use lead::{
    normalize_email, normalize_name, phone_digits, ActivityType, ChangeStatus, Lead, LeadStatus,
};
