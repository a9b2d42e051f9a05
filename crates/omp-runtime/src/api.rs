//! The `omp_*` query/set routines.
//!
//! All of them act on the calling worker's current ICV frame, so a value
//! set inside a region affects only that region (and what it spawns), while
//! a value set outside persists on the calling thread.

use crate::icv::{n_cores, SchedKind, Schedule};
use crate::worker::{with_worker, FrameKind};

pub fn omp_set_num_threads(num_threads: i64) {
    with_worker(|w| {
        let list = &mut w.cvars_mut().dataenv.nthreads;
        if list.is_empty() {
            list.push(num_threads);
        } else {
            list[0] = num_threads;
        }
    });
}

pub fn omp_get_num_threads() -> i64 {
    with_worker(|w| w.cvars().dataenv.team_size)
}

pub fn omp_get_thread_num() -> i64 {
    with_worker(|w| w.cvars().dataenv.thread_num)
}

pub fn omp_get_max_threads() -> i64 {
    with_worker(|w| *w.cvars().dataenv.nthreads.first().unwrap_or(&1))
}

pub fn omp_get_thread_limit() -> i64 {
    with_worker(|w| w.cvars().dataenv.thread_limit)
}

pub fn omp_get_num_procs() -> i64 {
    n_cores()
}

pub fn omp_in_parallel() -> bool {
    with_worker(|w| w.cvars().dataenv.active_levels > 0)
}

pub fn omp_set_dynamic(dynamic_threads: bool) {
    with_worker(|w| w.cvars_mut().dataenv.dynamic = dynamic_threads);
}

pub fn omp_get_dynamic() -> bool {
    with_worker(|w| w.cvars().dataenv.dynamic)
}

pub fn omp_set_schedule(kind: SchedKind, chunk_size: i64) {
    with_worker(|w| {
        let sched = &mut w.cvars_mut().dataenv.run_sched;
        sched.kind = kind;
        sched.monotonic = kind == SchedKind::Static;
        sched.chunk = if chunk_size > 0 { chunk_size } else { -1 };
    });
}

pub fn omp_get_schedule() -> Schedule {
    with_worker(|w| w.cvars().dataenv.run_sched)
}

pub fn omp_get_supported_active_levels() -> i64 {
    i64::MAX / 4
}

pub fn omp_set_max_active_levels(max_levels: i64) {
    if max_levels > 0 && max_levels < omp_get_supported_active_levels() {
        with_worker(|w| w.cvars_mut().dataenv.max_active_levels = max_levels);
    }
}

pub fn omp_get_max_active_levels() -> i64 {
    with_worker(|w| w.cvars().dataenv.max_active_levels)
}

pub fn omp_get_level() -> i64 {
    with_worker(|w| w.cvars().dataenv.levels)
}

pub fn omp_get_active_level() -> i64 {
    with_worker(|w| w.cvars().dataenv.active_levels)
}

pub fn omp_get_num_teams() -> i64 {
    with_worker(|w| w.cvars().dataenv.league_size)
}

pub fn omp_get_team_num() -> i64 {
    with_worker(|w| w.cvars().dataenv.team_num)
}

pub fn omp_get_cancellation() -> bool {
    with_worker(|w| w.cvars().global.cancel)
}

/// Thread number of this thread's ancestor at nesting `level`. Only levels
/// whose parallel frames live on this thread are known; others report 0
/// (the spawning thread of every deeper team).
pub fn omp_get_ancestor_thread_num(level: i64) -> i64 {
    let current = omp_get_level();
    if level < 0 || level > current {
        return -1;
    }
    if level == current {
        return omp_get_thread_num();
    }
    ancestor_field(level, |cv| cv.dataenv.thread_num).unwrap_or(0)
}

/// Team size at nesting `level`, subject to the same visibility as
/// [`omp_get_ancestor_thread_num`].
pub fn omp_get_team_size(level: i64) -> i64 {
    let current = omp_get_level();
    if level < 0 || level > current {
        return -1;
    }
    if level == current {
        return omp_get_num_threads();
    }
    ancestor_field(level, |cv| cv.dataenv.team_size).unwrap_or(1)
}

fn ancestor_field(level: i64, pick: impl Fn(&crate::icv::ControlVars) -> i64) -> Option<i64> {
    with_worker(|w| {
        w.frames
            .iter()
            .filter(|f| matches!(f.kind, FrameKind::Parallel | FrameKind::Implicit))
            .find(|f| f.cvars.dataenv.levels == level)
            .map(|f| pick(&f.cvars))
    })
}
