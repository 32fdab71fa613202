//! Sheet classification and per-sheet import runs
//!
//! Sheets are routed by name, the way the workbooks are laid out in
//! practice. A sheet whose name isn't recognized is logged and skipped; a
//! sheet whose column row can't be parsed aborts that sheet only.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use log::{debug, error, info};

use super::context::ImportContext;
use super::pipeline::{
    EventPipeline, GroupPipeline, MembershipPipeline, MixedPipeline, RowPipeline, UserPipeline,
};
use super::scheduler::{RowSource, WorkerPool};
use super::sheet::{RawSheet, normalize_columns};

/// Default pool sizes per sheet kind, overridable from the options
const MIXED_WORKERS: usize = 7;
const GROUP_WORKERS: usize = 5;

/// What a sheet contains, decided by its name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetKind {
    /// Participants, their parents and group assignments in one row
    Mixed,
    Users,
    Groups,
    Memberships,
    Events,
}

impl SheetKind {
    pub fn classify(name: &str) -> Option<SheetKind> {
        match name {
            "Participant Information" => Some(SheetKind::Mixed),
            "Users" => Some(SheetKind::Users),
            "Groups" | "Group Information" | "Duplicates" => Some(SheetKind::Groups),
            "Users in Groups" => Some(SheetKind::Memberships),
            "Events" => Some(SheetKind::Events),
            _ => None,
        }
    }

    fn pipeline(self) -> Arc<dyn RowPipeline> {
        match self {
            SheetKind::Mixed => Arc::new(MixedPipeline),
            SheetKind::Users => Arc::new(UserPipeline::new("User")),
            SheetKind::Groups => Arc::new(GroupPipeline),
            SheetKind::Memberships => Arc::new(MembershipPipeline),
            SheetKind::Events => Arc::new(EventPipeline),
        }
    }

    /// Group and mixed sheets fan out; the rest keep sheet order
    fn pool(self, ctx: &ImportContext) -> WorkerPool {
        let run_character = ctx.options.run_character.clone();
        match self {
            SheetKind::Mixed => WorkerPool::new(
                ctx.options.worker_count.unwrap_or(MIXED_WORKERS),
                run_character,
            ),
            SheetKind::Groups => WorkerPool::new(
                ctx.options.worker_count.unwrap_or(GROUP_WORKERS),
                run_character,
            ),
            _ => WorkerPool::sequential(),
        }
    }
}

/// Import one sheet end to end, stats reported at the end
///
/// Fails only on a fatal column-definition parse error; row-level problems
/// are logged and the run continues.
pub async fn import_sheet(ctx: &Arc<ImportContext>, sheet: &RawSheet) -> Result<()> {
    let Some(kind) = SheetKind::classify(&sheet.name) else {
        info!("don't know what to do with sheet {}, skipping", sheet.name);
        return Ok(());
    };

    let mut rows = sheet.rows.iter();
    // The first row holds extended field descriptions; the second defines
    // the columns.
    let Some(_descriptions) = rows.next() else {
        info!("sheet {} is empty, skipping", sheet.name);
        return Ok(());
    };
    debug!("skipping descriptions row");
    let Some(column_row) = rows.next() else {
        info!("sheet {} has no column row, skipping", sheet.name);
        return Ok(());
    };
    let columns = Arc::new(normalize_columns(column_row)?);

    let skip = ctx.options.skip_rows;
    if skip > 0 {
        info!("skipping {} rows", skip);
        for _ in 0..skip {
            rows.next();
        }
        debug!("skipped {} rows", skip);
    }

    info!("importing sheet {} ({:?})", sheet.name, kind);
    let start = Instant::now();

    // Row numbering counts the descriptions row, the column row and any
    // skipped rows, matching what a person sees in the spreadsheet.
    let first_index = 3 + skip;
    let source = Arc::new(RowSource::new(rows.cloned().collect(), first_index));

    kind.pool(ctx)
        .run(ctx.clone(), columns, source, kind.pipeline())
        .await;

    ctx.stats.report(start.elapsed());
    Ok(())
}

/// Import every sheet of a workbook; a failed sheet doesn't stop the rest
pub async fn import_workbook(ctx: &Arc<ImportContext>, sheets: &[RawSheet]) {
    for sheet in sheets {
        if let Err(err) = import_sheet(ctx, sheet).await {
            error!("sheet {} aborted: {:#}", sheet.name, err);
        }
    }
}
