//! Deferred user tasks.
//!
//! A task owns its callable, a completion event, and a slot for a panic
//! raised while running it. The panic is re-raised on whoever waits for the
//! task (`taskwait` or the region-exit drain), not on the worker that
//! happened to execute it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;

use tracing::trace;

use crate::icv::ControlVars;
use crate::sync::Event;

type TaskFn = Box<dyn FnOnce() + Send>;
type PanicPayload = Box<dyn Any + Send>;

pub struct CustomTask {
    /// ICVs captured at submission; the executing worker runs under them.
    pub cvars: ControlVars,
    body: Mutex<Option<TaskFn>>,
    pub done: Event,
    panic: Mutex<Option<PanicPayload>>,
    #[cfg(test)]
    test_id: i64,
}

impl CustomTask {
    pub fn new(cvars: ControlVars, body: TaskFn) -> Self {
        Self {
            cvars,
            body: Mutex::new(Some(body)),
            done: Event::new(),
            panic: Mutex::new(None),
            #[cfg(test)]
            test_id: 0,
        }
    }

    /// Run the callable exactly once; later calls are no-ops. Always sets
    /// the completion event, panicking bodies included.
    pub fn run(&self) {
        let body = self.body.lock().expect("task body poisoned").take();
        if let Some(body) = body {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(body)) {
                trace!(target: "runtime.task", "task body panicked; parking payload");
                *self.panic.lock().expect("task panic slot poisoned") = Some(payload);
            }
        }
        self.done.notify();
    }

    /// Take a captured panic, if any. The waiter re-raises it.
    pub fn take_panic(&self) -> Option<PanicPayload> {
        self.panic.lock().expect("task panic slot poisoned").take()
    }

    #[cfg(test)]
    pub(crate) fn noop_for_tests(id: i64) -> Self {
        let mut task = Self::new(
            ControlVars::with_config(&crate::config::FileConfig::default()),
            Box::new(|| {}),
        );
        task.test_id = id;
        task
    }

    #[cfg(test)]
    pub(crate) fn id_for_tests(&self) -> i64 {
        self.test_id
    }
}
