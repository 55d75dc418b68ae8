//! `leadops-query` — filter/sort compilation and cursor (keyset) pagination.
//!
//! The pieces fit together like this: a validated [`LeadListQuery`] plus an
//! optional opaque cursor goes into [`QueryPlan::compile`], which produces an
//! immutable plan — mandatory site scope, a tagged [`Predicate`] set, a
//! [`SortKey`] total order, an optional seek position and a clamped limit.
//! Backends either render the plan to SQL (`leadops-infra`) or evaluate it
//! directly against in-memory records; both agree because the plan is fully
//! resolved at compile time (`now` is an explicit input).

pub mod cursor;
pub mod filter;
pub mod plan;
pub mod saved_view;
pub mod sort;

pub use cursor::{Cursor, CursorError};
pub use filter::{ArchivedFilter, LeadListQuery, NextActionDue, PageLimit, Predicate};
pub use plan::QueryPlan;
pub use saved_view::{default_presets, SavedView};
pub use sort::{SortDirection, SortKey};
