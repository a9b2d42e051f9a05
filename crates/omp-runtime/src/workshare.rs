//! Non-loop worksharing: `single`, `sections`, `copyprivate`, `master`,
//! `critical`, and thread-private storage.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::barrier::task_barrier;
use crate::error::{OmpError, Result};
use crate::shared::SharedTag;
use crate::sync::{AtomicFlag, Event};
use crate::worker::with_worker;

struct SingleState {
    claimed: AtomicFlag,
}

/// Claim a `single` region: exactly one worker per team gets `true`.
pub fn single_enter() -> Result<bool> {
    let state = with_worker(|w| {
        let idx = w.team_index().expect("every worker has a team frame");
        let binding = w.frames[idx].team.as_mut().expect("index picked a binding");
        binding.ctx.push(SharedTag::Single, || SingleState {
            claimed: AtomicFlag::new(),
        })
    })?;
    Ok(state.claimed.test_and_set())
}

pub(crate) struct SectionsState {
    claims: Vec<AtomicFlag>,
}

/// Claim section `index` of a `sections` construct with sections
/// `0..=last`. The first section call publishes the construct's claim
/// table; every worker must walk the same section sequence.
pub fn section_claim(index: i64, last: i64) -> Result<bool> {
    let state = with_worker(|w| -> Result<Arc<SectionsState>> {
        if index == 0 {
            let idx = w.team_index().expect("every worker has a team frame");
            let binding = w.frames[idx].team.as_mut().expect("index picked a binding");
            let state = binding.ctx.push(SharedTag::Sections, || SectionsState {
                claims: (0..=last).map(|_| AtomicFlag::new()).collect(),
            })?;
            w.sections = Some(state.clone());
            Ok(state)
        } else {
            w.sections
                .clone()
                .ok_or(OmpError::OutsideConstruct("section"))
        }
    })?;
    if index < 0 || index as usize >= state.claims.len() {
        return Err(OmpError::WorkerDivergence);
    }
    let claimed = state.claims[index as usize].test_and_set();
    if index == last {
        with_worker(|w| w.sections = None);
    }
    Ok(claimed)
}

struct CopySlot {
    value: Mutex<Option<Box<dyn Any + Send + Sync>>>,
    ready: Event,
}

/// Publish `value` from the worker that executed a `single copyprivate`
/// body. Replaces the implicit barrier: readers synchronize on the value's
/// readiness, then everyone joins the trailing barrier unless `nowait`.
pub fn copyprivate_publish<T: Clone + Send + Sync + 'static>(nowait: bool, value: T) -> Result<()> {
    let slot = push_copy_slot()?;
    *slot.value.lock().expect("copyprivate slot poisoned") = Some(Box::new(value));
    slot.ready.notify();
    trace!(target: "runtime.task", "copyprivate published");
    if !nowait {
        task_barrier()?;
    }
    Ok(())
}

/// Receive the value published by the executing worker.
pub fn copyprivate_receive<T: Clone + Send + Sync + 'static>(nowait: bool) -> Result<T> {
    let slot = push_copy_slot()?;
    slot.ready.wait();
    let guard = slot.value.lock().expect("copyprivate slot poisoned");
    let value = guard
        .as_ref()
        .and_then(|v| v.downcast_ref::<T>())
        .cloned()
        .ok_or(OmpError::WorkerDivergence)?;
    drop(guard);
    if !nowait {
        task_barrier()?;
    }
    Ok(value)
}

fn push_copy_slot() -> Result<Arc<CopySlot>> {
    with_worker(|w| {
        let idx = w.team_index().expect("every worker has a team frame");
        let binding = w.frames[idx].team.as_mut().expect("index picked a binding");
        binding.ctx.push(SharedTag::Copy, || CopySlot {
            value: Mutex::new(None),
            ready: Event::new(),
        })
    })
}

/// `master` gate: true on the team's thread 0 only.
pub fn master() -> bool {
    with_worker(|w| w.cvars().dataenv.thread_num == 0)
}

/// Acquire the team mutex (the `critical` / `atomic` lowering).
pub fn mutex_lock() {
    let team = with_worker(|w| w.team()).expect("every worker has a team frame");
    team.mutex.lock();
}

pub fn mutex_unlock() {
    let team = with_worker(|w| w.team()).expect("every worker has a team frame");
    team.mutex.unlock();
}

/// Run `f` under the team mutex with release on all exit paths.
pub fn critical<R>(f: impl FnOnce() -> R) -> R {
    let team = with_worker(|w| w.team()).expect("every worker has a team frame");
    team.mutex.with(f)
}

thread_local! {
    static THREAD_PRIVATE: RefCell<HashMap<String, Box<dyn Any>>> =
        RefCell::new(HashMap::new());
}

/// Store this thread's binding for a `threadprivate` name.
pub fn tp_store<T: Clone + 'static>(name: &str, value: T) {
    THREAD_PRIVATE.with(|map| {
        map.borrow_mut().insert(name.to_string(), Box::new(value));
    });
}

/// Load this thread's binding for a `threadprivate` name.
pub fn tp_load<T: Clone + 'static>(name: &str) -> Option<T> {
    THREAD_PRIVATE.with(|map| {
        map.borrow()
            .get(name)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    })
}

/// `copyin` support: the master publishes its thread-private value at
/// region entry...
pub fn copyin_publish<T: Clone + Send + Sync + 'static>(name: &str) -> Result<()> {
    let value: Option<T> = tp_load(name);
    let slot = push_copy_slot()?;
    *slot.value.lock().expect("copyin slot poisoned") = value
        .map(|v| Box::new(v) as Box<dyn Any + Send + Sync>);
    slot.ready.notify();
    Ok(())
}

/// ...and every other worker adopts it as its own binding.
pub fn copyin_apply<T: Clone + Send + Sync + 'static>(name: &str) -> Result<()> {
    let slot = push_copy_slot()?;
    slot.ready.wait();
    let guard = slot.value.lock().expect("copyin slot poisoned");
    if let Some(v) = guard.as_ref().and_then(|v| v.downcast_ref::<T>()) {
        let v = v.clone();
        drop(guard);
        tp_store(name, v);
    }
    Ok(())
}
