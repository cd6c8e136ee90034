//! Sequential and parallel drivers for evaluating one tree against many
//! parameter sets.
//!
//! Both drivers return one [`BatchResult`] per input set, at the same index
//! as its input. A failing set never stops the others.

use std::{env, num::NonZeroUsize, thread};

use rayon::{ThreadPoolBuilder, prelude::*};
use tracing::{debug, warn};

use crate::{
    ast::Stage, error::EvalError, evaluator::Evaluator, parameters::Parameters, value::Value,
};

/// Outcome of evaluating one parameter set.
pub type BatchResult = Result<Value, EvalError>;

pub(crate) fn run_sequential<P: Parameters>(root: &Stage, sets: &[P]) -> Vec<BatchResult> {
    debug!(sets = sets.len(), "evaluating batch sequentially");
    sets.iter()
        .map(|params| Evaluator::new(params).eval(root))
        .collect()
}

/// Evaluates on a dedicated pool of at most `workers` threads.
///
/// `par_iter().collect()` writes each result into its input slot, so the
/// output order does not depend on which worker finished first.
pub(crate) fn run_parallel<P: Parameters + Sync>(
    root: &Stage,
    sets: &[P],
    workers: usize,
) -> Vec<BatchResult> {
    if sets.is_empty() {
        return Vec::new();
    }

    let workers = resolve_workers(workers, sets.len());
    let pool = match ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("valuate-batch-{}", i))
        .build()
    {
        Ok(pool) => pool,
        Err(e) => {
            warn!(error = %e, workers, "could not build batch pool, evaluating sequentially");
            return run_sequential(root, sets);
        }
    };

    debug!(sets = sets.len(), workers, "evaluating batch in parallel");
    pool.install(|| {
        sets.par_iter()
            .map(|params| Evaluator::new(params).eval(root))
            .collect()
    })
}

/// Pool size for a batch of `sets` items.
///
/// `0` picks the default parallelism: `RAYON_NUM_THREADS` when set to a
/// positive number, otherwise the available hardware threads. The result is
/// never below one nor above the number of sets.
pub fn resolve_workers(requested: usize, sets: usize) -> usize {
    let workers = if requested == 0 {
        default_workers()
    } else {
        requested
    };
    workers.min(sets).max(1)
}

// Leaves rayon's global pool uninitialised.
fn default_workers() -> usize {
    workers_from_env(env::var("RAYON_NUM_THREADS").ok().as_deref())
        .or_else(|| thread::available_parallelism().ok().map(NonZeroUsize::get))
        .unwrap_or(1)
}

fn workers_from_env(value: Option<&str>) -> Option<usize> {
    value
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
}
