//! Service layer: the boundary an HTTP shell or worker bootstrap calls.
//!
//! Services own validation, authorization checks and the composition of
//! store operations; all atomicity lives below them in the stores. Errors
//! surface as `CoreError` values the shell maps to response statuses.

mod export;
mod mutation_service;
mod query_service;

pub use export::{ExportService, ExportStatus, LeadExportHandler};
pub use mutation_service::LeadMutationService;
pub use query_service::{LeadDetail, LeadPage, LeadQueryService};
