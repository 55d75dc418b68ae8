//! `leadops-infra` — stores, services and the background job system.
//!
//! Store traits come with two backends each: an in-memory one for tests and
//! development, and a Postgres one (sqlx) for production. All cross-worker
//! coordination is delegated to the store's atomic primitives — conditional
//! updates for lead mutations, a locking claim for jobs — never to in-process
//! state. `schema.sql` at the crate root holds the table definitions the
//! Postgres backends expect.

pub mod jobs;
pub mod lead_store;
pub mod saved_views;
pub mod services;

pub use jobs::{
    InMemoryJobStore, Job, JobHandler, JobId, JobKind, JobState, JobStore, JobWorker,
    PostgresJobStore, WorkerConfig, WorkerHandle,
};
pub use lead_store::{InMemoryLeadStore, LeadStore, NoteInsert, PostgresLeadStore, StatusUpdate};
pub use saved_views::{
    list_or_seed, InMemorySavedViewStore, PostgresSavedViewStore, SavedViewStore,
};
pub use services::{
    ExportService, ExportStatus, LeadDetail, LeadExportHandler, LeadMutationService, LeadPage,
    LeadQueryService,
};
