//! Parallel regions: team state, region entry, and the league dispatch.
//!
//! A team owns the shared structures every worker reaches through its
//! cursors: the shared-context chain, the task queue, the team mutex, the
//! cancellation flag, and a slot for the first panic raised by any worker.
//! Workers always join the region-end barrier — panicking bodies included —
//! so peers are released and pending tasks drain; the parked panic is then
//! re-raised on the thread that entered the region.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::barrier::{task_barrier, BarrierState};
use crate::error::{OmpError, Result};
use crate::icv::ControlVars;
use crate::shared::{ChainEntry, QueueEntry, TaskQueue};
use crate::sync::{AtomicFlag, RawMutex};
use crate::worker::{install_worker, with_worker, Frame, FrameKind, TeamBinding, WorkerState};

type PanicPayload = Box<dyn Any + Send>;

pub struct Team {
    ctx_root: Arc<ChainEntry>,
    pub(crate) queue: TaskQueue,
    pub(crate) mutex: RawMutex,
    pub(crate) cancel: AtomicFlag,
    panic_slot: Mutex<Option<PanicPayload>>,
    pub(crate) latest_barrier: Mutex<Option<Arc<BarrierState>>>,
}

impl Team {
    pub(crate) fn new() -> Arc<Team> {
        Arc::new(Team {
            ctx_root: ChainEntry::root(),
            queue: TaskQueue::new(),
            mutex: RawMutex::new(),
            cancel: AtomicFlag::new(),
            panic_slot: Mutex::new(None),
            latest_barrier: Mutex::new(None),
        })
    }

    pub(crate) fn ctx_root(&self) -> Arc<ChainEntry> {
        self.ctx_root.clone()
    }

    pub(crate) fn queue_root(&self) -> Arc<QueueEntry> {
        self.queue.root()
    }

    /// Park the first panic raised by any worker of this team.
    pub(crate) fn park_panic(&self, payload: PanicPayload) {
        let mut slot = self.panic_slot.lock().expect("panic slot poisoned");
        if slot.is_none() {
            *slot = Some(payload);
        }
    }

    fn take_panic(&self) -> Option<PanicPayload> {
        self.panic_slot.lock().expect("panic slot poisoned").take()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Warning,
}

/// Region-entry arguments lowered from the `parallel` clause set.
#[derive(Clone)]
pub struct RegionOptions {
    pub if_clause: bool,
    pub num_threads: Vec<i64>,
    pub message: String,
    pub severity: Severity,
    pub safesync: i64,
}

impl Default for RegionOptions {
    fn default() -> Self {
        Self {
            if_clause: true,
            num_threads: Vec::new(),
            message: String::new(),
            severity: Severity::Fatal,
            safesync: -1,
        }
    }
}

impl RegionOptions {
    pub fn with_num_threads(n: i64) -> Self {
        Self {
            num_threads: vec![n],
            ..Default::default()
        }
    }

    pub fn serial_if(flag: bool) -> Self {
        Self {
            if_clause: flag,
            ..Default::default()
        }
    }
}

/// Execute `body` on a newly formed team.
///
/// Team size comes from the head of the effective `num_threads` list; the
/// tail feeds nested regions. `if_clause == false` runs the region inline as
/// a team of one without counting an active level. Any worker panic is
/// re-raised here after the team joins and the task queue drains.
pub fn parallel_run(body: &(dyn Fn() + Sync), opts: RegionOptions) -> Result<()> {
    let mut cvars = with_worker(|w| w.cvars().clone());

    if !opts.num_threads.is_empty() {
        cvars.dataenv.nthreads = opts.num_threads.clone();
    }
    let requested = cvars.take_team_size();
    let mut team_size = requested;
    if team_size < 1 {
        let reason = if opts.message.is_empty() {
            format!("num_threads({requested}) must be positive")
        } else {
            opts.message.clone()
        };
        if opts.severity == Severity::Fatal {
            return Err(OmpError::Region { reason });
        }
        warn!(target: "runtime.team", %reason, "continuing with a team of one");
        team_size = 1;
    }
    team_size = team_size.min(cvars.dataenv.thread_limit.max(1));
    if cvars.dataenv.active_levels >= cvars.dataenv.max_active_levels {
        team_size = 1;
    }
    if !opts.if_clause {
        team_size = 1;
    }

    cvars.dataenv.levels += 1;
    if opts.if_clause {
        cvars.dataenv.active_levels += 1;
    }
    cvars.dataenv.team_size = team_size;

    let team = Team::new();
    debug!(target: "runtime.team", team_size, level = cvars.dataenv.levels, "entering region");

    if team_size <= 1 {
        run_region_worker(0, body, cvars, &team);
    } else {
        let parent_cvars = with_worker(|w| w.cvars().clone());
        std::thread::scope(|scope| {
            for i in 1..team_size {
                let cv = cvars.clone();
                let team = team.clone();
                let parent = parent_cvars.clone();
                scope.spawn(move || {
                    install_worker(WorkerState::for_spawned(parent));
                    run_region_worker(i, body, cv, &team);
                });
            }
            run_region_worker(0, body, cvars.clone(), &team);
        });
    }

    debug!(target: "runtime.team", "region joined");
    if let Some(payload) = team.take_panic() {
        panic::resume_unwind(payload);
    }
    Ok(())
}

/// One worker's life inside a region: push the team frame, run the body,
/// join the region-end barrier no matter what, pop.
fn run_region_worker(thread_num: i64, body: &(dyn Fn() + Sync), mut cvars: ControlVars, team: &Arc<Team>) {
    cvars.dataenv.thread_num = thread_num;
    with_worker(|w| {
        w.frames.push(Frame {
            cvars: cvars.clone(),
            kind: FrameKind::Parallel,
            team: Some(TeamBinding::new(team.clone())),
        });
    });

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(body)) {
        team.park_panic(payload);
    }

    if let Err(err) = task_barrier() {
        team.park_panic(Box::new(err));
    }

    with_worker(|w| {
        w.frames.pop();
    });
}

/// Execute `body` once per team of a league.
///
/// League size comes from `num_teams(lower[, upper])` clamped by the
/// `OMP_NUM_TEAMS` control when set. Each league member is an initial task
/// of its own team of one; nested `parallel` regions widen it.
pub fn teams_run(
    body: &(dyn Fn() + Sync),
    if_clause: bool,
    num_teams: (i64, i64),
    thread_limit: i64,
) -> Result<()> {
    let parent_cvars = with_worker(|w| w.cvars().clone());

    let (lower, upper) = num_teams;
    let upper = upper.max(lower).max(1);
    let nteams_icv = parent_cvars.device.nteams;
    let mut league = if nteams_icv > 0 {
        nteams_icv.clamp(lower.max(1), upper)
    } else {
        upper
    };
    if !if_clause {
        league = 1;
    }

    let mut cvars = parent_cvars.clone();
    cvars.dataenv.league_size = league;
    if thread_limit > 0 {
        cvars.dataenv.thread_limit = thread_limit;
    }
    debug!(target: "runtime.team", league, "dispatching league");

    let panic_slot: Mutex<Option<PanicPayload>> = Mutex::new(None);
    std::thread::scope(|scope| {
        for t in 1..league {
            let mut cv = cvars.clone();
            cv.dataenv.team_num = t;
            let parent = parent_cvars.clone();
            let slot = &panic_slot;
            scope.spawn(move || {
                install_worker(WorkerState::for_spawned(parent));
                if let Err(payload) = run_league_member(body, cv) {
                    let mut guard = slot.lock().expect("league panic slot poisoned");
                    if guard.is_none() {
                        *guard = Some(payload);
                    }
                }
            });
        }
        let mut cv = cvars.clone();
        cv.dataenv.team_num = 0;
        if let Err(payload) = run_league_member(body, cv) {
            let mut guard = panic_slot.lock().expect("league panic slot poisoned");
            if guard.is_none() {
                *guard = Some(payload);
            }
        }
    });

    if let Some(payload) = panic_slot.into_inner().expect("league panic slot poisoned") {
        panic::resume_unwind(payload);
    }
    Ok(())
}

fn run_league_member(
    body: &(dyn Fn() + Sync),
    cvars: ControlVars,
) -> std::result::Result<(), PanicPayload> {
    let team = Team::new();
    with_worker(|w| {
        w.frames.push(Frame {
            cvars: cvars.clone(),
            kind: FrameKind::Teams,
            team: Some(TeamBinding::new(team)),
        });
    });
    let outcome = panic::catch_unwind(AssertUnwindSafe(body));
    with_worker(|w| {
        w.frames.pop();
    });
    outcome.map_err(|p| p)
}

/// Request cancellation of the innermost region. Workers observe the flag
/// at chunk boundaries and barrier entries when `OMP_CANCELLATION` is on.
pub fn cancel_region() {
    if let Some(team) = with_worker(|w| w.team()) {
        team.cancel.test_and_set();
    }
}
