//! The team barrier as a cooperative task-drain loop.
//!
//! A barrier is not a bare count-down latch: every arriving worker first
//! drains the team queue, running any task it can claim, and only then
//! parks on the current round's event. The last arriver releases the round.
//! If tasks land while workers are parked, `task_notify` flips the round's
//! `more_tasks` flag and wakes everyone, and the loop starts a fresh round.
//! Tasks submitted immediately before a barrier therefore never leak past
//! the region's lifetime.

use std::sync::Arc;

use tracing::trace;

use crate::error::Result;
use crate::shared::{ChainCursor, ChainEntry, SharedTag};
use crate::sync::{AtomicCounter, AtomicFlag, Event};
use crate::task::CustomTask;
use crate::team::Team;
use crate::worker::{with_worker, Frame, FrameKind};

/// Shared state of one barrier occurrence: the chain of rounds plus the
/// count of workers currently inside.
pub(crate) struct BarrierState {
    rounds: Arc<ChainEntry>,
    count: AtomicCounter,
}

impl BarrierState {
    pub(crate) fn new() -> Self {
        Self {
            rounds: ChainEntry::root(),
            count: AtomicCounter::new(0),
        }
    }
}

/// One wait round within a barrier occurrence.
struct BarrierRound {
    event: Event,
    more_tasks: AtomicFlag,
}

impl BarrierRound {
    fn new() -> Self {
        Self {
            event: Event::new(),
            more_tasks: AtomicFlag::new(),
        }
    }
}

/// Explicit `barrier` directive entry point.
pub fn barrier() -> Result<()> {
    task_barrier()
}

/// Join the current team's barrier, draining tasks cooperatively.
pub(crate) fn task_barrier() -> Result<()> {
    let (team, parties, cvars, bstate) = with_worker(|w| {
        let cvars = w.cvars().clone();
        let parties = cvars.dataenv.team_size;
        let idx = w.team_index().expect("every worker has a team frame");
        let binding = w.frames[idx].team.as_mut().expect("index picked a binding");
        let team = binding.team.clone();
        let bstate = binding.ctx.push(SharedTag::Barrier, BarrierState::new);
        (team, parties, cvars, bstate)
    });
    let bstate = bstate?;
    *team
        .latest_barrier
        .lock()
        .expect("latest barrier slot poisoned") = Some(bstate.clone());

    with_worker(|w| {
        w.frames.push(Frame {
            cvars: cvars.clone(),
            kind: FrameKind::Barrier,
            team: None,
        });
    });
    let outcome = barrier_loop(parties, &bstate);
    with_worker(|w| {
        w.frames.pop();
    });
    outcome
}

fn barrier_loop(parties: i64, bstate: &Arc<BarrierState>) -> Result<()> {
    let mut rounds = ChainCursor::at(bstate.rounds.clone());
    loop {
        drain_queue();

        let round = rounds.push(SharedTag::BarrierRound, BarrierRound::new)?;
        let exit_round = if bstate.count.add(1) == parties {
            // Last arriver: release the newest round (stragglers that kept
            // draining may have advanced past the one we just adopted).
            rounds.move_last();
            let latest: Arc<BarrierRound> = rounds.current()?;
            latest.more_tasks.clear();
            latest.event.notify();
            latest
        } else {
            round.event.wait();
            bstate.count.sub(1);
            round
        };

        if !exit_round.more_tasks.get() {
            return Ok(());
        }
        trace!(target: "runtime.task", "tasks arrived during barrier wait; re-draining");
    }
}

/// Claim-and-run every queue entry this worker can get. Claimed tasks run
/// under their own frame with the ICVs captured at submission.
pub(crate) fn drain_queue() {
    loop {
        let task = with_worker(|w| {
            let idx = w.team_index()?;
            let binding = w.frames[idx].team.as_mut()?;
            binding.queue.take()
        });
        let Some(task) = task else { return };
        run_claimed(&task);
    }
}

/// Run one claimed task on this worker. The task catches its own panic so
/// the drain loop (and the barrier above it) always completes.
pub(crate) fn run_claimed(task: &Arc<CustomTask>) {
    with_worker(|w| {
        w.frames.push(Frame {
            cvars: task.cvars.clone(),
            kind: FrameKind::Task,
            team: None,
        });
    });
    task.run();
    with_worker(|w| {
        w.frames.pop();
    });
}

/// Wake barrier waiters after a task submission so they restart their
/// drain loops.
pub(crate) fn task_notify(team: &Team) {
    let bstate = team
        .latest_barrier
        .lock()
        .expect("latest barrier slot poisoned")
        .clone();
    let Some(bstate) = bstate else { return };
    let mut cursor = ChainCursor::at(bstate.rounds.clone());
    cursor.move_last();
    if let Ok(round) = cursor.current::<BarrierRound>() {
        round.more_tasks.test_and_set();
        round.event.notify();
    }
}
