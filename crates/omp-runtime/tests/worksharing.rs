//! Work-sharing semantics: loop schedules, collapse, ordered, single,
//! sections, copyprivate.
//!
//! The loop tests drive `for_bounds`/`for_init`/`for_next` exactly the way
//! lowered code does, with a small host-range emulator for the inner `for`.

use crossbeam_channel::unbounded;
use omp_runtime::sched::{SCHED_DEFAULT, SCHED_DYNAMIC, SCHED_GUIDED, SCHED_RUNTIME, SCHED_STATIC};
use omp_runtime::team::{parallel_run, RegionOptions};
use omp_runtime::*;

/// Emulates the host's `range(lo, hi, step)`.
fn host_range(lo: i64, hi: i64, step: i64) -> Vec<i64> {
    let mut out = Vec::new();
    let mut i = lo;
    while (step > 0 && i < hi) || (step < 0 && i > hi) {
        out.push(i);
        i += step;
    }
    out
}

/// Run `parallel for` over one range loop and collect `(index, worker)`.
fn run_loop(
    workers: i64,
    range: (i64, i64, i64),
    kind: i64,
    chunk: i64,
) -> Vec<(i64, i64)> {
    let (tx, rx) = unbounded();
    let bounds0 = for_bounds(&[range.0, range.1, range.2]);
    parallel_run(
        &|| {
            let mut bounds = bounds0.clone();
            for_init(&bounds, kind, chunk, true, 0, -1).unwrap();
            while for_next(&mut bounds) {
                for i in host_range(bounds[0], bounds[1], range.2) {
                    tx.send((i, omp_get_thread_num())).unwrap();
                }
            }
            barrier().unwrap();
        },
        RegionOptions::with_num_threads(workers),
    )
    .unwrap();
    let mut got: Vec<(i64, i64)> = rx.try_iter().collect();
    got.sort();
    got
}

fn indices(assignment: &[(i64, i64)]) -> Vec<i64> {
    assignment.iter().map(|&(i, _)| i).collect()
}

fn worker_of(assignment: &[(i64, i64)], idx: i64) -> i64 {
    assignment
        .iter()
        .find(|&&(i, _)| i == idx)
        .map(|&(_, w)| w)
        .expect("index assigned")
}

#[test]
fn static_default_splits_in_blocks() {
    let got = run_loop(2, (0, 11, 1), SCHED_STATIC, -1);
    assert_eq!(indices(&got), host_range(0, 11, 1));
    for i in 0..6 {
        assert_eq!(worker_of(&got, i), 0);
    }
    for i in 6..11 {
        assert_eq!(worker_of(&got, i), 1);
    }
}

#[test]
fn static_chunk_one_interleaves() {
    let got = run_loop(2, (0, 11, 1), SCHED_STATIC, 1);
    assert_eq!(indices(&got), host_range(0, 11, 1));
    for i in 0..11 {
        assert_eq!(worker_of(&got, i), i % 2, "index {i}");
    }
}

#[test]
fn default_kind_behaves_as_static() {
    let got = run_loop(2, (0, 10, 1), SCHED_DEFAULT, -1);
    assert_eq!(indices(&got), host_range(0, 10, 1));
}

#[test]
fn static_with_step_covers_exact_index_set() {
    let got = run_loop(2, (0, 20, 3), SCHED_STATIC, -1);
    assert_eq!(indices(&got), host_range(0, 20, 3));
}

#[test]
fn negative_step_covers_exact_index_set() {
    let got = run_loop(2, (10, 0, -1), SCHED_STATIC, -1);
    assert_eq!(indices(&got), {
        let mut v = host_range(10, 0, -1);
        v.sort();
        v
    });
    let got = run_loop(2, (10, 0, -3), SCHED_DYNAMIC, 1);
    assert_eq!(indices(&got), {
        let mut v = host_range(10, 0, -3);
        v.sort();
        v
    });
}

#[test]
fn dynamic_assigns_every_index_once() {
    let got = run_loop(2, (0, 100, 1), SCHED_DYNAMIC, 3);
    assert_eq!(indices(&got), host_range(0, 100, 1));
}

#[test]
fn guided_assigns_every_index_once() {
    let got = run_loop(3, (0, 100, 1), SCHED_GUIDED, 2);
    assert_eq!(indices(&got), host_range(0, 100, 1));
}

#[test]
fn guided_chunks_shrink_but_respect_minimum() {
    // Single worker makes the claim sequence deterministic: each claim takes
    // ceil(remaining / team_size) bounded below by the chunk.
    let (tx, rx) = unbounded();
    let bounds0 = for_bounds(&[0, 16, 1]);
    parallel_run(
        &|| {
            let mut bounds = bounds0.clone();
            for_init(&bounds, SCHED_GUIDED, 2, true, 0, -1).unwrap();
            while for_next(&mut bounds) {
                tx.send(bounds[1] - bounds[0]).unwrap();
            }
            barrier().unwrap();
        },
        RegionOptions::with_num_threads(1),
    )
    .unwrap();
    let sizes: Vec<i64> = rx.try_iter().collect();
    assert_eq!(sizes.iter().sum::<i64>(), 16);
    assert_eq!(sizes, vec![16], "one worker claims everything in one guided chunk");
}

#[test]
fn runtime_kind_reads_schedule_icv() {
    omp_set_schedule(SchedKind::Static, -1);
    let got = run_loop(2, (0, 11, 1), SCHED_RUNTIME, -1);
    for i in 0..6 {
        assert_eq!(worker_of(&got, i), 0);
    }
    for i in 6..11 {
        assert_eq!(worker_of(&got, i), 1);
    }
}

#[test]
fn runtime_kind_rejects_explicit_chunk() {
    omp_set_num_threads(1);
    let err = parallel_run(
        &|| {
            let bounds0 = for_bounds(&[0, 4, 1]);
            let err = for_init(&bounds0, SCHED_RUNTIME, 2, true, 0, -1).unwrap_err();
            assert!(matches!(err, OmpError::InvalidControl { .. }));
        },
        RegionOptions::default(),
    );
    err.unwrap();
}

#[test]
fn collapse_two_loops_covers_product() {
    let (tx, rx) = unbounded();
    let bounds0 = for_bounds(&[0, 4, 1, 10, 40, 10]);
    parallel_run(
        &|| {
            let mut bounds = bounds0.clone();
            for_init(&bounds, SCHED_DYNAMIC, 1, true, 0, -1).unwrap();
            while for_next(&mut bounds) {
                let mut remaining = bounds[0];
                let mut first_row = true;
                'outer: for i in host_range(bounds[2] + bounds[5], bounds[3], bounds[4]) {
                    let inner_start = bounds[8] + if first_row { bounds[11] } else { 0 };
                    for j in host_range(inner_start, bounds[9], bounds[10]) {
                        tx.send((i, j)).unwrap();
                        remaining -= 1;
                        if remaining == 0 {
                            break 'outer;
                        }
                    }
                    first_row = false;
                }
            }
            barrier().unwrap();
        },
        RegionOptions::with_num_threads(2),
    )
    .unwrap();
    let mut got: Vec<(i64, i64)> = rx.try_iter().collect();
    got.sort();
    let mut expected = Vec::new();
    for i in host_range(0, 4, 1) {
        for j in host_range(10, 40, 10) {
            expected.push((i, j));
        }
    }
    assert_eq!(got, expected);
}

#[test]
fn ordered_serializes_by_iteration_number() {
    let (tx, rx) = unbounded();
    let bounds0 = for_bounds(&[0, 12, 1]);
    parallel_run(
        &|| {
            let mut bounds = bounds0.clone();
            for_init(&bounds, SCHED_STATIC, 1, true, 1, -1).unwrap();
            while for_next(&mut bounds) {
                for i in host_range(bounds[0], bounds[1], 1) {
                    ordered_start(i).unwrap();
                    tx.send(i).unwrap();
                    ordered_end().unwrap();
                }
            }
            barrier().unwrap();
        },
        RegionOptions::with_num_threads(2),
    )
    .unwrap();
    let got: Vec<i64> = rx.try_iter().collect();
    assert_eq!(got, host_range(0, 12, 1), "emission order equals iteration order");
}

#[test]
fn exactly_one_worker_holds_the_last_iteration() {
    let (tx, rx) = unbounded();
    let bounds0 = for_bounds(&[0, 11, 1]);
    parallel_run(
        &|| {
            let mut bounds = bounds0.clone();
            for_init(&bounds, SCHED_STATIC, 1, true, 0, -1).unwrap();
            let mut top = -1;
            while for_next(&mut bounds) {
                top = bounds[1] - 1;
            }
            if for_last() {
                tx.send((omp_get_thread_num(), top)).unwrap();
            }
            barrier().unwrap();
        },
        RegionOptions::with_num_threads(2),
    )
    .unwrap();
    let got: Vec<(i64, i64)> = rx.try_iter().collect();
    assert_eq!(got.len(), 1, "exactly one worker owns the final iteration");
    assert_eq!(got[0].1, 10, "and its final chunk ends at the last index");
}

#[test]
fn single_executes_exactly_once_per_entry() {
    let (tx, rx) = unbounded();
    parallel_run(
        &|| {
            for round in 0..3 {
                if single_enter().unwrap() {
                    tx.send(round).unwrap();
                }
                barrier().unwrap();
            }
        },
        RegionOptions::with_num_threads(2),
    )
    .unwrap();
    let mut got: Vec<i64> = rx.try_iter().collect();
    got.sort();
    assert_eq!(got, vec![0, 1, 2], "each single entry ran exactly once");
}

#[test]
fn single_nowait_does_not_deadlock() {
    use std::sync::atomic::{AtomicBool, Ordering};
    let advanced = AtomicBool::new(false);
    let (tx, rx) = unbounded();
    parallel_run(
        &|| {
            if single_enter().unwrap() {
                // The executor blocks until the other worker has moved past
                // the region, which only works because nowait skips the
                // implicit barrier.
                while !advanced.load(Ordering::Acquire) {
                    std::thread::yield_now();
                }
                tx.send("executor").unwrap();
            } else {
                advanced.store(true, Ordering::Release);
                tx.send("bystander").unwrap();
            }
            barrier().unwrap();
        },
        RegionOptions::with_num_threads(2),
    )
    .unwrap();
    let mut got: Vec<&str> = rx.try_iter().collect();
    got.sort();
    assert_eq!(got, vec!["bystander", "executor"]);
}

#[test]
fn sections_each_run_once() {
    let (tx, rx) = unbounded();
    parallel_run(
        &|| {
            for sect in 0..3 {
                if section_claim(sect, 2).unwrap() {
                    tx.send(sect).unwrap();
                }
            }
            barrier().unwrap();
        },
        RegionOptions::with_num_threads(2),
    )
    .unwrap();
    let mut got: Vec<i64> = rx.try_iter().collect();
    got.sort();
    assert_eq!(got, vec![0, 1, 2]);
}

#[test]
fn copyprivate_broadcasts_the_single_value() {
    let (tx, rx) = unbounded();
    parallel_run(
        &|| {
            let value = if single_enter().unwrap() {
                copyprivate_publish(false, 4i64).unwrap();
                4i64
            } else {
                copyprivate_receive::<i64>(false).unwrap()
            };
            tx.send(value).unwrap();
        },
        RegionOptions::with_num_threads(2),
    )
    .unwrap();
    assert_eq!(rx.try_iter().collect::<Vec<i64>>(), vec![4, 4]);
}

#[test]
fn critical_serializes_updates() {
    use std::sync::atomic::{AtomicI64, Ordering};
    // Split load/store: without the team mutex this would lose updates.
    let total = AtomicI64::new(0);
    parallel_run(
        &|| {
            for _ in 0..200 {
                critical(|| {
                    let v = total.load(Ordering::Relaxed);
                    total.store(v + 1, Ordering::Relaxed);
                });
            }
        },
        RegionOptions::with_num_threads(2),
    )
    .unwrap();
    assert_eq!(total.load(Ordering::SeqCst), 400);
}

#[test]
fn mutex_lock_unlock_pairs_work_unpaired() {
    use std::sync::atomic::{AtomicI64, Ordering};
    let total = AtomicI64::new(0);
    parallel_run(
        &|| {
            for _ in 0..200 {
                mutex_lock();
                let v = total.load(Ordering::Relaxed);
                total.store(v + 1, Ordering::Relaxed);
                mutex_unlock();
            }
        },
        RegionOptions::with_num_threads(2),
    )
    .unwrap();
    assert_eq!(total.load(Ordering::SeqCst), 400);
}

#[test]
fn divergent_worksharing_is_diagnosed() {
    use std::sync::Mutex;
    let seen: Mutex<Vec<bool>> = Mutex::new(Vec::new());
    let outcome = parallel_run(
        &|| {
            // Worker 0 issues `single`, worker 1 issues `sections`: a
            // divergent instruction stream.
            let diverged = if omp_get_thread_num() == 0 {
                single_enter().is_err()
            } else {
                section_claim(0, 0).is_err()
            };
            seen.lock().unwrap().push(diverged);
        },
        RegionOptions::with_num_threads(2),
    );
    outcome.unwrap();
    let seen = seen.into_inner().unwrap();
    assert!(
        seen.iter().any(|&d| d),
        "at least the losing worker observes divergence"
    );
}
