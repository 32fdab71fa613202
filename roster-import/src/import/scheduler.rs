//! Worker pool draining a shared row source
//!
//! N workers take rows one at a time under a single dequeue lock; all
//! validation and remote calls run outside it. Rows whose dependency is not
//! yet resolvable come back as `Deferred` and are replayed strictly
//! sequentially, in original row order, after every worker has exited.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, error, info, warn};
use tokio::sync::Mutex;

use super::context::ImportContext;
use super::outcome::RowOutcome;
use super::pipeline::RowPipeline;
use super::row::Row;

struct SourceInner {
    rows: VecDeque<Vec<String>>,
    next_index: usize,
}

/// Shared, mutable row source; the dequeue lock also assigns row numbers
pub struct RowSource {
    inner: Mutex<SourceInner>,
}

impl RowSource {
    /// `first_index` is the 1-based sheet row number of the first entry
    pub fn new(rows: Vec<Vec<String>>, first_index: usize) -> Self {
        Self {
            inner: Mutex::new(SourceInner {
                rows: rows.into(),
                next_index: first_index,
            }),
        }
    }

    /// Take the next row and its source index; `None` when exhausted
    pub async fn next(&self) -> Option<(Vec<String>, usize)> {
        let mut inner = self.inner.lock().await;
        let row = inner.rows.pop_front()?;
        let index = inner.next_index;
        inner.next_index += 1;
        Some((row, index))
    }

    pub async fn remaining(&self) -> usize {
        self.inner.lock().await.rows.len()
    }
}

/// A row postponed until the sequential retry pass
#[derive(Debug, Clone)]
pub struct DeferredRow {
    pub row: Row,
    /// Name of the dependency the row is waiting on
    pub dependency: String,
}

/// Fixed-size pool of workers for one sheet
pub struct WorkerPool {
    pub workers: usize,
    /// Partition filter: skip rows whose `run_character` doesn't match
    pub run_character: Option<String>,
}

impl WorkerPool {
    pub fn new(workers: usize, run_character: Option<String>) -> Self {
        Self {
            workers: workers.max(1),
            run_character,
        }
    }

    /// Single worker, rows processed in sheet order
    pub fn sequential() -> Self {
        Self::new(1, None)
    }

    /// Drain the source with the pool, then replay deferred rows
    /// sequentially (one retry each, no further deferral)
    pub async fn run(
        &self,
        ctx: Arc<ImportContext>,
        columns: Arc<Vec<String>>,
        source: Arc<RowSource>,
        pipeline: Arc<dyn RowPipeline>,
    ) {
        let deferred = self.parallel_pass(&ctx, &columns, &source, &pipeline).await;
        replay_deferred(&ctx, &pipeline, deferred).await;
    }

    /// The parallel pass alone; returns the rows to replay
    pub async fn parallel_pass(
        &self,
        ctx: &Arc<ImportContext>,
        columns: &Arc<Vec<String>>,
        source: &Arc<RowSource>,
        pipeline: &Arc<dyn RowPipeline>,
    ) -> Vec<DeferredRow> {
        let deferred: Arc<Mutex<Vec<DeferredRow>>> = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::with_capacity(self.workers);
        for worker_id in 0..self.workers {
            let ctx = ctx.clone();
            let columns = columns.clone();
            let source = source.clone();
            let pipeline = pipeline.clone();
            let deferred = deferred.clone();
            let run_character = self.run_character.clone();

            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, ctx, columns, source, pipeline, run_character, deferred)
                    .await;
            }));
        }

        for result in join_all(handles).await {
            if let Err(err) = result {
                error!("worker panicked: {}", err);
            }
        }

        let mut deferred = Arc::try_unwrap(deferred)
            .map(Mutex::into_inner)
            .unwrap_or_default();
        // Original row order for the retry pass.
        deferred.sort_by_key(|entry| entry.row.source_index());
        deferred
    }
}

async fn worker_loop(
    worker_id: usize,
    ctx: Arc<ImportContext>,
    columns: Arc<Vec<String>>,
    source: Arc<RowSource>,
    pipeline: Arc<dyn RowPipeline>,
    run_character: Option<String>,
    deferred: Arc<Mutex<Vec<DeferredRow>>>,
) {
    while let Some((cells, index)) = source.next().await {
        let row = Row::from_cells(&cells, &columns, index);
        if row.is_empty() {
            continue;
        }

        if let Some(partition) = &run_character {
            if row.get("run_character") != Some(partition.as_str()) {
                info!("{}: skipping row (run character mismatch)", row.context());
                continue;
            }
        }

        let outcome = pipeline.run(&ctx, &row).await;
        log_outcome(pipeline.label(), &row, &outcome);

        if let RowOutcome::Deferred { dependency } = outcome {
            deferred.lock().await.push(DeferredRow { row, dependency });
        }
    }
    debug!("worker {} exited", worker_id);
}

/// Replay deferred rows one at a time against the now-more-complete state
pub async fn replay_deferred(
    ctx: &Arc<ImportContext>,
    pipeline: &Arc<dyn RowPipeline>,
    deferred: Vec<DeferredRow>,
) {
    if deferred.is_empty() {
        return;
    }
    info!("retrying {} deferred row(s)", deferred.len());

    for entry in deferred {
        let outcome = pipeline.run(ctx, &entry.row).await;
        match &outcome {
            RowOutcome::Deferred { dependency } => {
                // No third attempt; the dependency never materialized.
                error!(
                    "{}: couldn't find {} after retry, giving up",
                    entry.row.context(),
                    dependency
                );
            }
            _ => log_outcome(pipeline.label(), &entry.row, &outcome),
        }
    }
}

/// One log line per row outcome, attributed to the source row number
pub fn log_outcome(label: &str, row: &Row, outcome: &RowOutcome) {
    let ctx = row.context();
    match outcome {
        RowOutcome::Success { uuid } => info!("{}: {} imported at UUID {}", ctx, label, uuid),
        RowOutcome::AlreadyExists { uuid } => {
            info!("{}: {} already exists at UUID {}", ctx, label, uuid)
        }
        RowOutcome::Invalid { reason } => error!("{}: {} skipped: {}", ctx, label, reason),
        RowOutcome::Deferred { dependency } => {
            warn!("{}: {} deferred, waiting on {}", ctx, label, dependency)
        }
        RowOutcome::RemoteFailure { reason } => {
            error!("{}: {} failed: {}", ctx, label, reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::api::testing::MockDirectory;

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    /// Pipeline that records which row indexes it saw
    struct Recorder {
        seen: StdMutex<Vec<usize>>,
        attempts: AtomicUsize,
        /// Row indexes to defer on first sight
        defer_once: StdMutex<HashSet<usize>>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                seen: StdMutex::new(Vec::new()),
                attempts: AtomicUsize::new(0),
                defer_once: StdMutex::new(HashSet::new()),
            }
        }

        fn deferring(indexes: &[usize]) -> Self {
            let recorder = Self::new();
            *recorder.defer_once.lock().unwrap() = indexes.iter().copied().collect();
            recorder
        }
    }

    #[async_trait]
    impl RowPipeline for Recorder {
        fn label(&self) -> &'static str {
            "Test row"
        }

        async fn run(&self, _ctx: &ImportContext, row: &Row) -> RowOutcome {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(row.source_index());
            if self.defer_once.lock().unwrap().remove(&row.source_index()) {
                return RowOutcome::Deferred {
                    dependency: format!("dep-{}", row.source_index()),
                };
            }
            RowOutcome::Success {
                uuid: format!("u-{}", row.source_index()),
            }
        }
    }

    #[tokio::test]
    async fn test_row_source_assigns_indexes_once() {
        let source = RowSource::new(vec![cells(&["a"]), cells(&["b"]), cells(&["c"])], 3);
        assert_eq!(source.remaining().await, 3);

        let (first, index) = source.next().await.unwrap();
        assert_eq!((first[0].as_str(), index), ("a", 3));
        assert_eq!(source.next().await.unwrap().1, 4);
        assert_eq!(source.next().await.unwrap().1, 5);
        assert!(source.next().await.is_none());
    }

    #[tokio::test]
    async fn test_pool_drains_every_row_exactly_once() {
        let ctx = ImportContext::for_test(Arc::new(MockDirectory::new()));
        let columns = Arc::new(vec!["value".to_string()]);
        let rows: Vec<Vec<String>> = (0..50).map(|i| cells(&[&format!("v{}", i)])).collect();
        let source = Arc::new(RowSource::new(rows, 3));

        let recorder = Arc::new(Recorder::new());
        let pipeline: Arc<dyn RowPipeline> = recorder.clone();
        WorkerPool::new(5, None)
            .run(ctx, columns, source, pipeline)
            .await;

        let mut seen = recorder.seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, (3..53).collect::<Vec<_>>());
        assert_eq!(recorder.attempts.load(Ordering::SeqCst), 50);
    }

    #[tokio::test]
    async fn test_deferred_rows_retried_once_in_row_order() {
        let ctx = ImportContext::for_test(Arc::new(MockDirectory::new()));
        let columns = Arc::new(vec!["value".to_string()]);
        let rows: Vec<Vec<String>> = (0..6).map(|i| cells(&[&format!("v{}", i)])).collect();
        let source = Arc::new(RowSource::new(rows, 3));

        // Rows 7 and 4 defer on their first attempt.
        let recorder = Arc::new(Recorder::deferring(&[7, 4]));
        let pipeline: Arc<dyn RowPipeline> = recorder.clone();

        let pool = WorkerPool::new(3, None);
        let deferred = pool
            .parallel_pass(&ctx, &columns, &source, &pipeline)
            .await;
        assert_eq!(
            deferred
                .iter()
                .map(|d| d.row.source_index())
                .collect::<Vec<_>>(),
            vec![4, 7],
            "replayed in original row order"
        );

        replay_deferred(&ctx, &pipeline, deferred).await;

        // 6 first attempts + 2 retries, never a third attempt.
        assert_eq!(recorder.attempts.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_run_character_partition_skips_rows() {
        let ctx = ImportContext::for_test(Arc::new(MockDirectory::new()));
        let columns = Arc::new(vec!["value".to_string(), "run_character".to_string()]);
        let rows = vec![
            cells(&["a", "1"]),
            cells(&["b", "2"]),
            cells(&["c", "1"]),
        ];
        let source = Arc::new(RowSource::new(rows, 3));

        let recorder = Arc::new(Recorder::new());
        let pipeline: Arc<dyn RowPipeline> = recorder.clone();
        WorkerPool::new(2, Some("1".to_string()))
            .run(ctx, columns, source, pipeline)
            .await;

        let mut seen = recorder.seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![3, 5]);
    }
}
