//! Background job system: durable queue + polling worker loop.
//!
//! ## Components
//!
//! - `Job`: one unit of asynchronous work, site-scoped and typed
//! - `JobStore`: the durable queue (in-memory or Postgres)
//! - `JobWorker`: claims, executes and records outcomes
//!
//! ## Guarantees
//!
//! - claiming and the `queued → running` transition are one atomic operation,
//!   so at most one worker ever executes a job
//! - terminal states (`ready`, `failed`) are never left
//! - a handler failure is terminal for that attempt — retrying is an explicit
//!   re-enqueue, never implicit

pub mod postgres;
pub mod store;
pub mod types;
pub mod worker;

pub use postgres::PostgresJobStore;
pub use store::{InMemoryJobStore, JobStore};
pub use types::{Job, JobId, JobKind, JobState};
pub use worker::{JobHandler, JobOutcome, JobWorker, WorkerConfig, WorkerHandle, WorkerStats};
