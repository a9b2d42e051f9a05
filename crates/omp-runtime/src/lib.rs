//! omp-runtime: the concurrency runtime behind rompy's lowered code.
//!
//! Lowered host programs call a small set of entry points: `parallel_run`
//! for regions, `for_bounds`/`for_init`/`for_next` for work-shared loops,
//! `single_enter`/`section_claim`/`copyprivate_*` for the non-loop
//! constructs, `task_submit`/`task_wait`/`barrier` for tasking, the team
//! mutex for `critical`/`atomic`, and the `omp_*` query routines. The same
//! entry points are the crate's public Rust API, driven directly by the
//! test suite with closures standing in for lifted host functions.
//!
//! Scheduling model: preemptive OS threads. A team is `team_size` scoped
//! threads; nested regions start additional workers when the active-levels
//! cap permits. Barriers drain the team task queue cooperatively, so a
//! barrier is also the point where pending tasks are guaranteed to finish.

pub mod api;
pub mod barrier;
pub mod config;
pub mod error;
pub mod icv;
pub mod sched;
pub mod shared;
pub mod sync;
pub mod task;
pub mod tasking;
pub mod team;
pub mod worker;
pub mod workshare;

pub use api::*;
pub use barrier::barrier;
pub use error::{OmpError, Result};
pub use icv::{ControlVars, SchedKind, Schedule};
pub use sched::{for_bounds, for_init, for_last, for_next, ordered_end, ordered_start};
pub use tasking::{task_submit, task_wait};
pub use team::{cancel_region, parallel_run, teams_run, RegionOptions, Severity};
pub use workshare::{
    copyin_apply, copyin_publish, copyprivate_publish, copyprivate_receive, critical, master,
    mutex_lock, mutex_unlock, section_claim, single_enter, tp_load, tp_store,
};
