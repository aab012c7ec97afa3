//! The orchestrator's reporting sink. Algorithms in `collector` and
//! `transport` never log directly about run-level progress; they report
//! through `Stats` so the orchestrator controls how (and whether) that
//! surfaces.

use std::time::Instant;
use tracing::info;

/// An in-flight stage timer handed back by [`Stats::start_stage`].
pub struct StageHandle {
    pub name: &'static str,
    pub started_at: Instant,
}

/// Object-safe so the orchestrator can hold `Box<dyn Stats>` without
/// committing callers to a concrete reporting backend.
pub trait Stats: Send + Sync {
    fn start_stage(&self, name: &'static str) -> StageHandle {
        StageHandle {
            name,
            started_at: Instant::now(),
        }
    }

    fn finish_stage(&self, handle: StageHandle);

    fn record_table(&self, table: &str, count: usize);
}

/// Logs every stage and table count via `tracing`. The default used
/// outside of tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStats;

impl Stats for TracingStats {
    fn finish_stage(&self, handle: StageHandle) {
        info!(
            stage = handle.name,
            elapsed_ms = handle.started_at.elapsed().as_millis() as u64,
            "stage finished"
        );
    }

    fn record_table(&self, table: &str, count: usize) {
        info!(table, count, "table processed");
    }
}

/// Discards everything. Used in unit tests that exercise orchestration
/// logic without wanting log noise.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStats;

impl Stats for NullStats {
    fn finish_stage(&self, _handle: StageHandle) {}
    fn record_table(&self, _table: &str, _count: usize) {}
}
