//! Explicit tasks: submission and `taskwait`.

use std::panic;
use std::sync::Arc;

use tracing::trace;

use crate::barrier::{drain_queue, task_notify};
use crate::error::Result;
use crate::task::CustomTask;
use crate::worker::{with_worker, Frame, FrameKind};

/// Submit a task to the enclosing team's queue.
///
/// With `if_clause == false` the task is undeferred: it runs inline on the
/// submitting worker, synchronously, and a panic inside it propagates right
/// here instead of being parked for `taskwait`.
pub fn task_submit(body: Box<dyn FnOnce() + Send>, if_clause: bool) -> Result<()> {
    let mut cvars = with_worker(|w| w.cvars().clone());
    cvars.dataenv.explicit_task = true;

    if !if_clause {
        let task = CustomTask::new(cvars.clone(), body);
        with_worker(|w| {
            w.frames.push(Frame {
                cvars,
                kind: FrameKind::Task,
                team: None,
            });
        });
        task.run();
        with_worker(|w| {
            w.frames.pop();
        });
        if let Some(payload) = task.take_panic() {
            panic::resume_unwind(payload);
        }
        return Ok(());
    }

    let team = with_worker(|w| w.team()).expect("every worker has a team frame");
    let task = Arc::new(CustomTask::new(cvars, body));
    team.queue.add(task);
    trace!(target: "runtime.task", "task queued");
    task_notify(&team);
    Ok(())
}

/// Wait for every task submitted before this point.
///
/// The worker first snapshots the queue tail as its wait boundary, then
/// drains and runs whatever it can claim itself, then walks its history
/// cursor up to the boundary awaiting each task's completion event. Panics
/// captured on awaited tasks are re-raised here, on the waiting side.
pub fn task_wait() -> Result<()> {
    let team = with_worker(|w| w.team()).expect("every worker has a team frame");
    let boundary = team.queue.snapshot_tail();

    drain_queue();

    let pending = with_worker(|w| {
        let idx = w.team_index().expect("every worker has a team frame");
        let binding = w.frames[idx].team.as_mut().expect("index picked a binding");
        binding.queue.drain_history(&boundary)
    });
    trace!(target: "runtime.task", waiting = pending.len(), "taskwait boundary");
    for task in pending {
        task.done.wait();
        if let Some(payload) = task.take_panic() {
            panic::resume_unwind(payload);
        }
    }
    Ok(())
}
