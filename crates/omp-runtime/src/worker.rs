//! Per-thread worker state.
//!
//! Every OS thread that touches the runtime owns a stack of task frames;
//! the topmost frame's ICV block answers all `omp_*` queries. A thread that
//! calls in with no state gets a lazily-created "implicit team of one", so
//! the API works outside any parallel region.
//!
//! Discipline: user code and blocking waits never run inside a
//! [`with_worker`] closure. Callers snapshot what they need, drop the
//! borrow, then block or call out.

use std::cell::RefCell;
use std::sync::Arc;

use crate::icv::ControlVars;
use crate::shared::{ChainCursor, QueueCursor};
use crate::team::Team;
use crate::workshare::SectionsState;

/// A worker's cursors into its team's shared structures.
pub(crate) struct TeamBinding {
    pub team: Arc<Team>,
    pub ctx: ChainCursor,
    pub queue: QueueCursor,
}

impl TeamBinding {
    pub fn new(team: Arc<Team>) -> Self {
        let ctx = ChainCursor::at(team.ctx_root());
        let queue = QueueCursor::at(team.queue_root());
        Self { team, ctx, queue }
    }
}

pub(crate) enum FrameKind {
    /// The thread's base frame (implicit team of one, or a spawned worker's
    /// view of its parent task).
    Implicit,
    Parallel,
    Teams,
    For(crate::sched::ForState),
    Barrier,
    Task,
}

pub(crate) struct Frame {
    pub cvars: ControlVars,
    pub kind: FrameKind,
    pub team: Option<TeamBinding>,
}

pub(crate) struct WorkerState {
    pub frames: Vec<Frame>,
    /// Sections construct currently being walked by this worker.
    pub sections: Option<Arc<SectionsState>>,
    /// Whether this worker's most recently finished loop claimed the chunk
    /// containing the sequentially-last iteration (`lastprivate`).
    pub for_last: bool,
}

impl WorkerState {
    /// Implicit team of one, ICVs from the environment.
    fn implicit() -> Self {
        let cvars = ControlVars::initial();
        let team = Team::new();
        Self {
            frames: vec![Frame {
                cvars,
                kind: FrameKind::Implicit,
                team: Some(TeamBinding::new(team)),
            }],
            sections: None,
            for_last: false,
        }
    }

    /// Base state for a spawned region worker: it sees its parent task's
    /// ICVs underneath the parallel frame the region pushes next.
    pub fn for_spawned(parent_cvars: ControlVars) -> Self {
        Self {
            frames: vec![Frame {
                cvars: parent_cvars,
                kind: FrameKind::Implicit,
                team: None,
            }],
            sections: None,
            for_last: false,
        }
    }

    pub fn cvars(&self) -> &ControlVars {
        &self.frames.last().expect("frame stack never empty").cvars
    }

    pub fn cvars_mut(&mut self) -> &mut ControlVars {
        &mut self
            .frames
            .last_mut()
            .expect("frame stack never empty")
            .cvars
    }

    /// Index of the innermost frame bound to a team.
    pub fn team_index(&self) -> Option<usize> {
        self.frames.iter().rposition(|f| f.team.is_some())
    }

    pub fn team(&self) -> Option<Arc<Team>> {
        self.team_index()
            .map(|i| self.frames[i].team.as_ref().expect("index picked Some").team.clone())
    }

    /// Index of the innermost worksharing-loop frame.
    pub fn for_index(&self) -> Option<usize> {
        self.frames
            .iter()
            .rposition(|f| matches!(f.kind, FrameKind::For(_)))
    }
}

thread_local! {
    static WORKER: RefCell<Option<WorkerState>> = const { RefCell::new(None) };
}

/// Run `f` against this thread's worker state, creating the implicit state
/// on first use.
pub(crate) fn with_worker<R>(f: impl FnOnce(&mut WorkerState) -> R) -> R {
    WORKER.with(|cell| {
        let mut slot = cell.borrow_mut();
        let state = slot.get_or_insert_with(WorkerState::implicit);
        f(state)
    })
}

/// Replace this thread's worker state (spawned region workers only).
pub(crate) fn install_worker(state: WorkerState) {
    WORKER.with(|cell| {
        *cell.borrow_mut() = Some(state);
    });
}
