//! Shared-memory parallel policy iteration: the valid state space is
//! partitioned into contiguous, disjoint ranges, one per worker, and
//! every worker runs the same two-phase loop against the shared value
//! and policy buffers, synchronizing with a barrier between phases.
//!
//! A semaphore-and-event coordinator collapses, in a language with
//! first-class threads, to `std::sync::Barrier`: every worker blocks on
//! the same barrier at the end of each phase, which is exactly a "wait
//! for value_event" / "signal(semaphore)" pair folded into one call.

use std::ops::Range;
use std::sync::{Barrier, Mutex};

use tracing::warn;

use crate::density::TransitionDensity;
use crate::error::Error;
use crate::geometry::ACTIONS;
use crate::policy::Policy;
use crate::reward::RewardFunction;
use crate::sequential::{masked_q_value, q_value, IterationConfig, IterationStats};
use crate::value::ValueFunctions;
use crate::vss::ValidStateSpace;

/// Split `space_size` indices into `num_workers` contiguous, roughly
/// equal chunks, remainder distributed to the earliest workers. When
/// there are more workers than states, the trailing workers receive
/// empty ranges: they still participate in every barrier but do no
/// work, which is the spec's documented degenerate-case behavior for
/// `W > space_size`.
fn partition(space_size: usize, num_workers: usize) -> Vec<Range<usize>> {
    let num_workers = num_workers.max(1);
    if num_workers > space_size && space_size > 0 {
        warn!(
            num_workers,
            space_size, "more workers requested than valid states; extra workers will sit idle in every barrier"
        );
    }
    let base = space_size / num_workers;
    let remainder = space_size % num_workers;
    let mut ranges = Vec::with_capacity(num_workers);
    let mut start = 0;
    for worker in 0..num_workers {
        let len = base + if worker < remainder { 1 } else { 0 };
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// Run policy iteration across `num_workers` OS threads sharing the
/// same value and policy buffers. Returns one [`IterationStats`] per
/// iteration actually performed, or the first worker failure observed.
pub fn run<D, R>(
    vss: &ValidStateSpace,
    values: &ValueFunctions,
    policy: &Policy,
    density: &D,
    reward: &R,
    config: &IterationConfig,
    num_workers: usize,
) -> Result<Vec<IterationStats>, Error>
where
    D: TransitionDensity + Sync,
    R: RewardFunction + Sync,
{
    let ranges = partition(vss.space_size(), num_workers);
    let effective_workers = ranges.len();

    let value_barrier = Barrier::new(effective_workers);
    let policy_barrier = Barrier::new(effective_workers);
    let report_barrier = Barrier::new(effective_workers);
    let partial_value_sum = Mutex::new(vec![0.0f64; effective_workers]);
    let partial_max_diff = Mutex::new(vec![0.0f64; effective_workers]);
    let partial_changed = Mutex::new(vec![0usize; effective_workers]);
    let failure: Mutex<Option<String>> = Mutex::new(None);
    let converged = Mutex::new(false);
    let reports = Mutex::new(Vec::with_capacity(config.max_iterations));

    std::thread::scope(|scope| {
        for (worker_id, range) in ranges.into_iter().enumerate() {
            let value_barrier = &value_barrier;
            let policy_barrier = &policy_barrier;
            let report_barrier = &report_barrier;
            let partial_value_sum = &partial_value_sum;
            let partial_max_diff = &partial_max_diff;
            let partial_changed = &partial_changed;
            let failure = &failure;
            let converged = &converged;
            let reports = &reports;
            scope.spawn(move || {
                worker_loop(
                    worker_id,
                    range,
                    vss,
                    values,
                    policy,
                    density,
                    reward,
                    config,
                    value_barrier,
                    policy_barrier,
                    report_barrier,
                    partial_value_sum,
                    partial_max_diff,
                    partial_changed,
                    failure,
                    converged,
                    reports,
                );
            });
        }
    });

    if let Some(message) = failure.into_inner().unwrap() {
        return Err(Error::WorkerFailed(message));
    }
    Ok(reports.into_inner().unwrap())
}

#[allow(clippy::too_many_arguments)]
fn worker_loop<D, R>(
    worker_id: usize,
    range: Range<usize>,
    vss: &ValidStateSpace,
    values: &ValueFunctions,
    policy: &Policy,
    density: &D,
    reward: &R,
    config: &IterationConfig,
    value_barrier: &Barrier,
    policy_barrier: &Barrier,
    report_barrier: &Barrier,
    partial_value_sum: &Mutex<Vec<f64>>,
    partial_max_diff: &Mutex<Vec<f64>>,
    partial_changed: &Mutex<Vec<usize>>,
    failure: &Mutex<Option<String>>,
    converged: &Mutex<bool>,
    reports: &Mutex<Vec<IterationStats>>,
) where
    D: TransitionDensity + Sync,
    R: RewardFunction + Sync,
{
    for _iteration in 0..config.max_iterations {
        if *converged.lock().unwrap() {
            break;
        }

        // Value phase: read V_cur anywhere, write V_next only in `range`.
        // Caught so a panicking worker still reaches every barrier below —
        // otherwise the other workers would block on it forever.
        let value_phase = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut local_value_sum = 0.0;
            for index in range.clone() {
                let state = vss.get(index);
                let action = policy.get(index);
                let value = q_value(vss, values, density, reward, &state, index, action, config.discount);
                values.set_next(index, value);
                local_value_sum += value;
            }
            let local_max_diff = values.max_abs_delta_in_range(range.clone());
            (local_value_sum, local_max_diff)
        }));
        let (local_value_sum, local_max_diff) = match value_phase {
            Ok(result) => result,
            Err(payload) => {
                record_failure(failure, worker_id, &payload);
                (0.0, 0.0)
            }
        };
        partial_value_sum.lock().unwrap()[worker_id] = local_value_sum;
        partial_max_diff.lock().unwrap()[worker_id] = local_max_diff;

        // Barrier: every worker's value phase is complete before anyone
        // swaps. The swap itself is single-threaded (worker 0) between
        // the two barrier waits, so no worker observes a half-swapped view.
        value_barrier.wait();
        if worker_id == 0 {
            values.swap();
        }
        value_barrier.wait();

        // Policy phase: reverse order within this worker's range, writing
        // only into `range`. Every worker now sees the fully-swapped V_cur.
        let policy_phase = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut local_changed = 0;
            for index in range.clone().rev() {
                let state = vss.get(index);
                let old_action = policy.get(index);
                let mut best_action = ACTIONS[0];
                let mut best_value = f64::NEG_INFINITY;
                for action in ACTIONS {
                    let value = masked_q_value(
                        vss, values, density, reward, &state, index, action, config.discount,
                    );
                    if value > best_value {
                        best_value = value;
                        best_action = action;
                    }
                }
                if best_action != old_action {
                    local_changed += 1;
                }
                policy.set(index, best_action);
            }
            local_changed
        }));
        let local_changed = match policy_phase {
            Ok(result) => result,
            Err(payload) => {
                record_failure(failure, worker_id, &payload);
                0
            }
        };
        partial_changed.lock().unwrap()[worker_id] = local_changed;

        policy_barrier.wait();

        if worker_id == 0 {
            let mean_value =
                partial_value_sum.lock().unwrap().iter().sum::<f64>() / vss.space_size() as f64;
            let max_value_diff = partial_max_diff.lock().unwrap().iter().copied().fold(0.0, f64::max);
            let changed_actions = partial_changed.lock().unwrap().iter().sum::<usize>();
            let stats = IterationStats {
                mean_value,
                max_value_diff,
                changed_actions,
            };
            let converged_now = config.has_converged(&stats, vss.space_size());
            reports.lock().unwrap().push(stats);
            if converged_now || failure.lock().unwrap().is_some() {
                *converged.lock().unwrap() = true;
            }
        }

        report_barrier.wait();
    }
}

/// Records the first worker panic observed; later panics are dropped
/// since only one `Err` is ever surfaced from [`run`].
fn record_failure(failure: &Mutex<Option<String>>, worker_id: usize, payload: &(dyn std::any::Any + Send)) {
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked with a non-string payload".to_string()
    };
    let mut failure = failure.lock().unwrap();
    if failure.is_none() {
        *failure = Some(format!("worker {worker_id}: {message}"));
    }
}
