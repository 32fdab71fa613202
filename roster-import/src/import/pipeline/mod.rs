//! Entity-specific row pipelines
//!
//! Each pipeline runs one row through validate -> resolve identity ->
//! resolve dependencies -> commit -> classify, against the shared
//! `ImportContext`.

pub mod event;
pub mod group;
pub mod membership;
pub mod mixed;
pub mod user;

use async_trait::async_trait;

use super::context::ImportContext;
use super::outcome::RowOutcome;
use super::row::Row;

pub use event::EventPipeline;
pub use group::GroupPipeline;
pub use membership::MembershipPipeline;
pub use mixed::MixedPipeline;
pub use user::UserPipeline;

/// A per-row state machine for one entity type
#[async_trait]
pub trait RowPipeline: Send + Sync {
    /// Short label for log lines ("User", "Group", ...)
    fn label(&self) -> &'static str;

    /// Process one row; never panics, never aborts the sheet
    async fn run(&self, ctx: &ImportContext, row: &Row) -> RowOutcome;
}
