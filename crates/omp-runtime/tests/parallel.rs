//! Parallel region semantics: team formation, ICVs, `if`, panics.
//!
//! Closures stand in for lifted region bodies; a channel stands in for the
//! host-side queue the original programs collect into.

use crossbeam_channel::unbounded;
use omp_runtime::team::{parallel_run, RegionOptions};
use omp_runtime::*;

fn collect_sorted<T: Ord>(rx: &crossbeam_channel::Receiver<T>) -> Vec<T> {
    let mut v: Vec<T> = rx.try_iter().collect();
    v.sort();
    v
}

#[test]
fn two_workers_get_distinct_thread_nums() {
    let (tx, rx) = unbounded();
    omp_set_num_threads(2);
    parallel_run(
        &|| {
            tx.send(omp_get_thread_num()).unwrap();
        },
        RegionOptions::default(),
    )
    .unwrap();
    assert_eq!(collect_sorted(&rx), vec![0, 1]);
}

#[test]
fn num_threads_clause_overrides_icv() {
    let (tx, rx) = unbounded();
    omp_set_num_threads(2);
    parallel_run(
        &|| {
            tx.send(omp_get_thread_num()).unwrap();
        },
        RegionOptions::with_num_threads(3),
    )
    .unwrap();
    assert_eq!(collect_sorted(&rx), vec![0, 1, 2]);
}

#[test]
fn zero_threads_is_a_region_error() {
    let err = parallel_run(&|| {}, RegionOptions::with_num_threads(0)).unwrap_err();
    assert!(matches!(err, OmpError::Region { .. }));
}

#[test]
fn zero_threads_with_warning_severity_degrades() {
    let (tx, rx) = unbounded();
    let opts = RegionOptions {
        num_threads: vec![0],
        severity: Severity::Warning,
        message: "bad size".into(),
        ..Default::default()
    };
    parallel_run(
        &|| {
            tx.send(omp_get_thread_num()).unwrap();
        },
        opts,
    )
    .unwrap();
    assert_eq!(collect_sorted(&rx), vec![0]);
}

#[test]
fn if_false_runs_inline_and_stays_inactive() {
    let (tx, rx) = unbounded();
    omp_set_num_threads(2);
    let caller = std::thread::current().id();
    parallel_run(
        &|| {
            assert_eq!(std::thread::current().id(), caller);
            tx.send((omp_get_thread_num(), omp_in_parallel(), omp_get_level()))
                .unwrap();
        },
        RegionOptions::serial_if(false),
    )
    .unwrap();
    assert_eq!(collect_sorted(&rx), vec![(0, false, 1)]);
}

#[test]
fn num_threads_in_region_reports_team_size() {
    let (tx, rx) = unbounded();
    omp_set_num_threads(2);
    parallel_run(
        &|| {
            tx.send(omp_get_num_threads()).unwrap();
        },
        RegionOptions::default(),
    )
    .unwrap();
    assert_eq!(collect_sorted(&rx), vec![2, 2]);
}

#[test]
fn levels_and_active_levels_track_nesting() {
    let (tx, rx) = unbounded();
    omp_set_num_threads(2);
    assert_eq!(omp_get_level(), 0);
    parallel_run(
        &|| {
            tx.send((omp_get_level(), omp_get_active_level(), omp_in_parallel()))
                .unwrap();
        },
        RegionOptions::default(),
    )
    .unwrap();
    assert_eq!(collect_sorted(&rx), vec![(1, 1, true), (1, 1, true)]);
    assert_eq!(omp_get_level(), 0, "region exit restores the caller's frame");
}

#[test]
fn nested_region_consumes_nthreads_list() {
    let (tx, rx) = unbounded();
    let opts = RegionOptions {
        num_threads: vec![2, 3],
        ..Default::default()
    };
    parallel_run(
        &|| {
            let inner_tx = tx.clone();
            parallel_run(
                &move || {
                    inner_tx
                        .send((omp_get_level(), omp_get_thread_num()))
                        .unwrap();
                },
                RegionOptions::default(),
            )
            .unwrap();
        },
        opts,
    )
    .unwrap();
    let got = collect_sorted(&rx);
    // 2 outer workers × 3 inner workers, all at nesting level 2.
    assert_eq!(got.len(), 6);
    assert!(got.iter().all(|&(level, _)| level == 2));
    let inner_ids: Vec<i64> = got.iter().map(|&(_, t)| t).collect();
    assert_eq!(inner_ids, vec![0, 0, 1, 1, 2, 2]);
}

#[test]
fn max_active_levels_serializes_deep_nesting() {
    let (tx, rx) = unbounded();
    omp_set_max_active_levels(1);
    omp_set_num_threads(2);
    parallel_run(
        &|| {
            let inner_tx = tx.clone();
            parallel_run(
                &move || {
                    inner_tx.send(omp_get_num_threads()).unwrap();
                },
                RegionOptions::with_num_threads(4),
            )
            .unwrap();
        },
        RegionOptions::default(),
    )
    .unwrap();
    // Each outer worker's inner region collapsed to a team of one.
    assert_eq!(collect_sorted(&rx), vec![1, 1]);
}

#[test]
fn worker_panic_reraised_on_entering_thread() {
    omp_set_num_threads(2);
    let outcome = std::panic::catch_unwind(|| {
        parallel_run(
            &|| {
                panic!("region body failed");
            },
            RegionOptions::default(),
        )
        .unwrap();
    });
    let payload = outcome.unwrap_err();
    let msg = payload.downcast_ref::<&str>().copied().unwrap_or("");
    assert_eq!(msg, "region body failed");
    // The runtime is still usable afterwards.
    let (tx, rx) = unbounded();
    parallel_run(
        &|| {
            tx.send(omp_get_thread_num()).unwrap();
        },
        RegionOptions::with_num_threads(2),
    )
    .unwrap();
    let mut got: Vec<i64> = rx.try_iter().collect();
    got.sort();
    assert_eq!(got, vec![0, 1]);
}

#[test]
fn one_sided_panic_still_releases_the_team() {
    omp_set_num_threads(2);
    let outcome = std::panic::catch_unwind(|| {
        parallel_run(
            &|| {
                if omp_get_thread_num() == 1 {
                    panic!("one worker failed");
                }
            },
            RegionOptions::default(),
        )
        .unwrap();
    });
    assert!(outcome.is_err(), "the surviving worker joins and the panic surfaces");
}

#[test]
fn schedule_api_roundtrip() {
    omp_set_schedule(SchedKind::Dynamic, 4);
    let sched = omp_get_schedule();
    assert_eq!(sched.kind, SchedKind::Dynamic);
    assert_eq!(sched.chunk, 4);
    assert!(!sched.monotonic);
    omp_set_schedule(SchedKind::Static, -1);
    let sched = omp_get_schedule();
    assert_eq!(sched.kind, SchedKind::Static);
    assert!(sched.monotonic);
}

#[test]
fn teams_league_dispatch() {
    let (tx, rx) = unbounded();
    teams_run(
        &|| {
            tx.send((omp_get_team_num(), omp_get_num_teams())).unwrap();
        },
        true,
        (1, 3),
        0,
    )
    .unwrap();
    assert_eq!(collect_sorted(&rx), vec![(0, 3), (1, 3), (2, 3)]);
}

#[test]
fn threadprivate_copyin_across_regions() {
    let (tx, rx) = unbounded();
    // First region: a team of one seeds the master's thread-private value.
    parallel_run(
        &|| {
            tp_store("seed", 2i64);
        },
        RegionOptions::with_num_threads(1),
    )
    .unwrap();
    // Second region: copyin propagates the master's value to every worker.
    parallel_run(
        &|| {
            if master() {
                copyin_publish::<i64>("seed").unwrap();
            } else {
                copyin_apply::<i64>("seed").unwrap();
            }
            tx.send(tp_load::<i64>("seed")).unwrap();
        },
        RegionOptions::with_num_threads(2),
    )
    .unwrap();
    assert_eq!(collect_sorted(&rx), vec![Some(2), Some(2)]);
}
