//! Synchronization primitives.
//!
//! Everything here is safe under preemptive threading and intentionally
//! small: a test-and-set flag, a counter with the full read-modify-write
//! menu, a one-shot event, and lockable mutexes whose `lock`/`unlock` pairs
//! may straddle statements (the lowered `critical` region acquires in one
//! call and releases in a `finally` block, so guard-based locking does not
//! fit the generated code).

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread::ThreadId;

/// One-way boolean flag.
#[derive(Debug, Default)]
pub struct AtomicFlag(AtomicBool);

impl AtomicFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Returns `true` iff this call transitioned the flag false→true.
    pub fn test_and_set(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Cheap read before the atomic attempt, for "already consumed" paths
    /// that are queried far more often than they win.
    pub fn no_clear_test_and_set(&self) -> bool {
        if self.0.load(Ordering::Acquire) {
            return false;
        }
        self.test_and_set()
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Shared counter. `add`/`sub` return the *updated* value; `fetch_add`
/// returns the previous one.
#[derive(Debug, Default)]
pub struct AtomicCounter(AtomicI64);

impl AtomicCounter {
    pub fn new(value: i64) -> Self {
        Self(AtomicI64::new(value))
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, value: i64) {
        self.0.store(value, Ordering::Release);
    }

    pub fn add(&self, arg: i64) -> i64 {
        self.0.fetch_add(arg, Ordering::AcqRel) + arg
    }

    pub fn sub(&self, arg: i64) -> i64 {
        self.0.fetch_sub(arg, Ordering::AcqRel) - arg
    }

    pub fn fetch_add(&self, arg: i64) -> i64 {
        self.0.fetch_add(arg, Ordering::AcqRel)
    }

    pub fn and(&self, arg: i64) -> i64 {
        self.0.fetch_and(arg, Ordering::AcqRel) & arg
    }

    pub fn or(&self, arg: i64) -> i64 {
        self.0.fetch_or(arg, Ordering::AcqRel) | arg
    }

    pub fn xor(&self, arg: i64) -> i64 {
        self.0.fetch_xor(arg, Ordering::AcqRel) ^ arg
    }

    pub fn exchange(&self, desired: i64) -> i64 {
        self.0.swap(desired, Ordering::AcqRel)
    }

    /// Returns `true` on success; on failure the caller re-reads.
    pub fn compare_exchange_weak(&self, expected: i64, desired: i64) -> bool {
        self.0
            .compare_exchange_weak(expected, desired, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn compare_exchange_strong(&self, expected: i64, desired: i64) -> bool {
        self.0
            .compare_exchange(expected, desired, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// One-shot latch: `wait` blocks until the first `notify`, then every later
/// `wait` returns immediately.
#[derive(Debug, Default)]
pub struct Event {
    set: Mutex<bool>,
    cv: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        let mut set = self.set.lock().expect("event mutex poisoned");
        *set = true;
        self.cv.notify_all();
    }

    pub fn wait(&self) {
        let mut set = self.set.lock().expect("event mutex poisoned");
        while !*set {
            set = self.cv.wait(set).expect("event mutex poisoned");
        }
    }

    pub fn is_set(&self) -> bool {
        *self.set.lock().expect("event mutex poisoned")
    }
}

/// Non-recursive mutex with free `lock`/`unlock` calls.
#[derive(Debug, Default)]
pub struct RawMutex {
    locked: Mutex<bool>,
    cv: Condvar,
}

impl RawMutex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) {
        let mut locked = self.locked.lock().expect("mutex poisoned");
        while *locked {
            locked = self.cv.wait(locked).expect("mutex poisoned");
        }
        *locked = true;
    }

    pub fn unlock(&self) {
        let mut locked = self.locked.lock().expect("mutex poisoned");
        *locked = false;
        self.cv.notify_one();
    }

    pub fn try_lock(&self) -> bool {
        let mut locked = self.locked.lock().expect("mutex poisoned");
        if *locked {
            false
        } else {
            *locked = true;
            true
        }
    }

    /// Scoped acquisition with release on every exit path, panics included.
    pub fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        self.lock();
        let guard = UnlockOnDrop(self);
        let out = f();
        drop(guard);
        out
    }
}

struct UnlockOnDrop<'a>(&'a RawMutex);

impl Drop for UnlockOnDrop<'_> {
    fn drop(&mut self) {
        self.0.unlock();
    }
}

/// Recursive variant: the owning thread may re-lock without deadlocking.
#[derive(Debug, Default)]
pub struct RecursiveMutex {
    state: Mutex<RecState>,
    cv: Condvar,
}

#[derive(Debug, Default)]
struct RecState {
    owner: Option<ThreadId>,
    depth: usize,
}

impl RecursiveMutex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) {
        let me = std::thread::current().id();
        let mut state = self.state.lock().expect("mutex poisoned");
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    return;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    return;
                }
                Some(_) => {
                    state = self.cv.wait(state).expect("mutex poisoned");
                }
            }
        }
    }

    pub fn unlock(&self) {
        let mut state = self.state.lock().expect("mutex poisoned");
        debug_assert_eq!(state.owner, Some(std::thread::current().id()));
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            state.owner = None;
            self.cv.notify_one();
        }
    }

    pub fn try_lock(&self) -> bool {
        let me = std::thread::current().id();
        let mut state = self.state.lock().expect("mutex poisoned");
        match state.owner {
            None => {
                state.owner = Some(me);
                state.depth = 1;
                true
            }
            Some(owner) if owner == me => {
                state.depth += 1;
                true
            }
            Some(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn flag_transitions_once() {
        let flag = AtomicFlag::new();
        assert!(flag.test_and_set());
        assert!(!flag.test_and_set());
        assert!(!flag.no_clear_test_and_set());
        flag.clear();
        assert!(flag.no_clear_test_and_set());
    }

    #[test]
    fn flag_single_winner_under_contention() {
        let flag = Arc::new(AtomicFlag::new());
        let wins: Vec<bool> = thread::scope(|s| {
            (0..8)
                .map(|_| {
                    let flag = flag.clone();
                    s.spawn(move || flag.test_and_set())
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect()
        });
        assert_eq!(wins.iter().filter(|&&w| w).count(), 1);
    }

    #[test]
    fn counter_add_returns_updated() {
        let c = AtomicCounter::new(-3);
        assert_eq!(c.add(3), 0);
        assert_eq!(c.add(3), 3);
        assert_eq!(c.fetch_add(3), 3);
        assert_eq!(c.get(), 6);
        assert_eq!(c.sub(1), 5);
    }

    #[test]
    fn counter_cas_loop() {
        let c = AtomicCounter::new(0);
        let mut cur = c.get();
        while !c.compare_exchange_weak(cur, cur + 10) {
            cur = c.get();
        }
        assert_eq!(c.get(), 10);
    }

    #[test]
    fn event_releases_all_waiters() {
        let ev = Arc::new(Event::new());
        thread::scope(|s| {
            for _ in 0..4 {
                let ev = ev.clone();
                s.spawn(move || ev.wait());
            }
            thread::sleep(std::time::Duration::from_millis(10));
            ev.notify();
        });
        assert!(ev.is_set());
        ev.wait(); // already set: returns immediately
    }

    #[test]
    fn raw_mutex_serializes() {
        let m = Arc::new(RawMutex::new());
        let counter = Arc::new(AtomicCounter::new(0));
        thread::scope(|s| {
            for _ in 0..4 {
                let m = m.clone();
                let counter = counter.clone();
                s.spawn(move || {
                    for _ in 0..100 {
                        m.lock();
                        let v = counter.get();
                        counter.set(v + 1);
                        m.unlock();
                    }
                });
            }
        });
        assert_eq!(counter.get(), 400);
    }

    #[test]
    fn recursive_mutex_reenters() {
        let m = RecursiveMutex::new();
        m.lock();
        assert!(m.try_lock());
        m.unlock();
        m.unlock();
        assert!(m.try_lock());
        m.unlock();
    }

    #[test]
    fn with_releases_on_panic() {
        let m = Arc::new(RawMutex::new());
        let m2 = m.clone();
        let result = std::panic::catch_unwind(move || m2.with(|| panic!("boom")));
        assert!(result.is_err());
        assert!(m.try_lock(), "mutex must be free after a panicking region");
        m.unlock();
    }
}
