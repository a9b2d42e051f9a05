//! Tasking and barrier coupling: deferred execution, taskwait, inline
//! `if(false)` tasks, drain-at-barrier, and panic routing.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crossbeam_channel::unbounded;
use omp_runtime::team::{parallel_run, RegionOptions};
use omp_runtime::*;

#[test]
fn task_runs_before_region_ends() {
    let (tx, rx) = unbounded();
    parallel_run(
        &|| {
            if single_enter().unwrap() {
                let tx = tx.clone();
                task_submit(Box::new(move || tx.send(7).unwrap()), true).unwrap();
            }
            barrier().unwrap();
        },
        RegionOptions::with_num_threads(2),
    )
    .unwrap();
    assert_eq!(rx.try_iter().collect::<Vec<i64>>(), vec![7]);
}

#[test]
fn region_end_barrier_drains_pending_tasks() {
    let hits = Arc::new(AtomicI64::new(0));
    let hits2 = hits.clone();
    parallel_run(
        &move || {
            if single_enter().unwrap() {
                for _ in 0..16 {
                    let hits = hits2.clone();
                    task_submit(
                        Box::new(move || {
                            hits.fetch_add(1, Ordering::SeqCst);
                        }),
                        true,
                    )
                    .unwrap();
                }
            }
            // No explicit taskwait: the implicit region-end barrier drains.
        },
        RegionOptions::with_num_threads(2),
    )
    .unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 16, "no task leaks past the region");
}

#[test]
fn taskwait_blocks_until_submitted_tasks_finish() {
    let (tx, rx) = unbounded();
    let value = Arc::new(AtomicI64::new(1));
    let value2 = value.clone();
    parallel_run(
        &move || {
            if single_enter().unwrap() {
                let v = value2.clone();
                task_submit(
                    Box::new(move || {
                        std::thread::sleep(std::time::Duration::from_millis(20));
                        v.fetch_add(2, Ordering::SeqCst);
                    }),
                    true,
                )
                .unwrap();
            }
            // The single's implicit barrier publishes the submission to the
            // whole team before anyone waits.
            barrier().unwrap();
            task_wait().unwrap();
            tx.send(value2.load(Ordering::SeqCst)).unwrap();
        },
        RegionOptions::with_num_threads(2),
    )
    .unwrap();
    assert_eq!(
        rx.try_iter().collect::<Vec<i64>>(),
        vec![3, 3],
        "every worker observes the task's effect after taskwait"
    );
}

#[test]
fn task_if_false_runs_inline_on_submitter() {
    let (tx, rx) = unbounded();
    parallel_run(
        &|| {
            if single_enter().unwrap() {
                let submitter = omp_get_thread_num();
                let executed_on = Arc::new(AtomicI64::new(-1));
                let slot = executed_on.clone();
                task_submit(
                    Box::new(move || {
                        slot.store(omp_get_thread_num(), Ordering::SeqCst);
                    }),
                    false,
                )
                .unwrap();
                // Inline tasks complete synchronously.
                tx.send((submitter, executed_on.load(Ordering::SeqCst)))
                    .unwrap();
            }
        },
        RegionOptions::with_num_threads(2),
    )
    .unwrap();
    let got: Vec<(i64, i64)> = rx.try_iter().collect();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].0, got[0].1, "inline task ran on the submitting worker");
}

#[test]
fn task_panic_reraised_by_taskwait() {
    omp_set_num_threads(2);
    let outcome = std::panic::catch_unwind(|| {
        parallel_run(
            &|| {
                if single_enter().unwrap() {
                    task_submit(Box::new(|| panic!("task failed")), true).unwrap();
                    task_wait().unwrap();
                }
            },
            RegionOptions::default(),
        )
        .unwrap();
    });
    let payload = outcome.unwrap_err();
    let msg = payload.downcast_ref::<&str>().copied().unwrap_or("");
    assert_eq!(msg, "task failed");
}

#[test]
fn barrier_makes_prior_writes_visible() {
    let slots: Vec<AtomicI64> = (0..4).map(|_| AtomicI64::new(-1)).collect();
    let (tx, rx) = unbounded();
    parallel_run(
        &|| {
            let me = omp_get_thread_num();
            slots[me as usize].store(me * 10, Ordering::Release);
            barrier().unwrap();
            let seen: Vec<i64> = slots.iter().map(|s| s.load(Ordering::Acquire)).collect();
            tx.send(seen).unwrap();
        },
        RegionOptions::with_num_threads(4),
    )
    .unwrap();
    for seen in rx.try_iter() {
        assert_eq!(seen, vec![0, 10, 20, 30], "every write before the barrier is visible after it");
    }
}

#[test]
fn explicit_barrier_synchronizes_all_workers() {
    // Sequencing across a barrier: every "before" precedes every "after".
    let (tx, rx) = unbounded();
    parallel_run(
        &|| {
            tx.send("before").unwrap();
            barrier().unwrap();
            tx.send("after").unwrap();
        },
        RegionOptions::with_num_threads(3),
    )
    .unwrap();
    let log: Vec<&str> = rx.try_iter().collect();
    let last_before = log.iter().rposition(|&s| s == "before").unwrap();
    let first_after = log.iter().position(|&s| s == "after").unwrap();
    assert!(last_before < first_after, "log order violates the barrier: {log:?}");
}

#[test]
fn tasks_submitted_by_many_workers_all_run() {
    let hits = Arc::new(AtomicI64::new(0));
    let hits_outer = hits.clone();
    parallel_run(
        &move || {
            for _ in 0..8 {
                let hits = hits_outer.clone();
                task_submit(
                    Box::new(move || {
                        hits.fetch_add(1, Ordering::SeqCst);
                    }),
                    true,
                )
                .unwrap();
            }
            task_wait().unwrap();
        },
        RegionOptions::with_num_threads(4),
    )
    .unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 32);
}
