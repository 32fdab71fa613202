//! Concurrent spreadsheet import core
//!
//! A sheet is classified by name, its rows fanned out to a worker pool, and
//! each row run through an entity-specific pipeline. Shared state (identity
//! cache, group registry, stats) lives in an `ImportContext` built per job.

pub mod context;
pub mod dispatch;
pub mod identity;
pub mod outcome;
pub mod pipeline;
pub mod registry;
pub mod row;
pub mod scheduler;
pub mod sheet;
pub mod stats;

pub use context::{ImportContext, ImportOptions};
pub use dispatch::{SheetKind, import_sheet, import_workbook};
pub use identity::{CreateSlot, IdentityCache};
pub use outcome::RowOutcome;
pub use registry::GroupRegistry;
pub use row::{Row, RowContext};
pub use scheduler::{DeferredRow, RowSource, WorkerPool};
pub use stats::ImportStats;
