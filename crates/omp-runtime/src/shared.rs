//! Team-shared lock-free structures.
//!
//! Both structures are append-only singly-linked lists whose links are
//! `OnceLock`s: the first worker to publish a node wins, losers read the
//! winner's node. This encodes the worksharing invariant that all workers of
//! a team issue the same sequence of constructs; a tag mismatch at a link is
//! diagnosed as divergence rather than tolerated.
//!
//! Each worker traverses through its own cursor, so traversal never blocks
//! and never contends with publication.

use std::any::Any;
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::{OmpError, Result};
use crate::sync::AtomicFlag;
use crate::task::CustomTask;

/// Tags carried by shared-context entries. Workers pushing different tags at
/// the same position have diverged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedTag {
    Root,
    Barrier,
    BarrierRound,
    ForLoop,
    Single,
    Sections,
    Ordered,
    Copy,
}

type SharedObj = Arc<dyn Any + Send + Sync>;

/// One published entry of a shared-context chain.
pub struct ChainEntry {
    tag: SharedTag,
    obj: SharedObj,
    next: OnceLock<Arc<ChainEntry>>,
}

impl ChainEntry {
    pub fn root() -> Arc<ChainEntry> {
        Arc::new(ChainEntry {
            tag: SharedTag::Root,
            obj: Arc::new(()),
            next: OnceLock::new(),
        })
    }
}

/// A worker's position in a shared chain. Cloning the cursor clones the
/// position, not the chain.
#[derive(Clone)]
pub struct ChainCursor {
    tail: Arc<ChainEntry>,
}

impl ChainCursor {
    pub fn at(root: Arc<ChainEntry>) -> Self {
        Self { tail: root }
    }

    /// Publish the next entry, or adopt the one another worker already
    /// published at this position. The factory runs unconditionally; only
    /// the winning value is kept.
    pub fn push<T: Send + Sync + 'static>(
        &mut self,
        tag: SharedTag,
        make: impl FnOnce() -> T,
    ) -> Result<Arc<T>> {
        let candidate = Arc::new(ChainEntry {
            tag,
            obj: Arc::new(make()),
            next: OnceLock::new(),
        });
        let published = match self.tail.next.set(candidate.clone()) {
            Ok(()) => candidate,
            Err(_) => self
                .tail
                .next
                .get()
                .expect("failed set means a winner exists")
                .clone(),
        };
        // Adopt the published position even on mismatch: the loser reports
        // divergence but stays positionally aligned, so the region-end
        // barrier can still form.
        self.tail = published.clone();
        if published.tag != tag {
            return Err(OmpError::WorkerDivergence);
        }
        published
            .obj
            .clone()
            .downcast::<T>()
            .map_err(|_| OmpError::WorkerDivergence)
    }

    /// Advance to the newest published entry.
    pub fn move_last(&mut self) {
        while let Some(next) = self.tail.next.get() {
            self.tail = next.clone();
        }
    }

    /// The object at the cursor position.
    pub fn current<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.tail
            .obj
            .clone()
            .downcast::<T>()
            .map_err(|_| OmpError::WorkerDivergence)
    }

    pub fn has_next(&self) -> bool {
        self.tail.next.get().is_some()
    }
}

/// One task-queue node. Claimed nodes stay linked so history traversal can
/// wait on their completion events.
pub struct QueueEntry {
    task: Option<Arc<CustomTask>>,
    claimed: AtomicFlag,
    next: OnceLock<Arc<QueueEntry>>,
}

impl QueueEntry {
    fn root() -> Arc<QueueEntry> {
        let entry = QueueEntry {
            task: None,
            claimed: AtomicFlag::new(),
            next: OnceLock::new(),
        };
        entry.claimed.test_and_set();
        Arc::new(entry)
    }
}

/// The team-owned side of the queue: the chain root plus an insertion tail
/// hint. Links are still published through `OnceLock`, the mutex only keeps
/// the hint from racing backwards.
pub struct TaskQueue {
    root: Arc<QueueEntry>,
    tail: Mutex<Arc<QueueEntry>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        let root = QueueEntry::root();
        Self {
            tail: Mutex::new(root.clone()),
            root,
        }
    }

    pub fn root(&self) -> Arc<QueueEntry> {
        self.root.clone()
    }

    pub fn add(&self, task: Arc<CustomTask>) {
        let entry = Arc::new(QueueEntry {
            task: Some(task),
            claimed: AtomicFlag::new(),
            next: OnceLock::new(),
        });
        let mut tail = self.tail.lock().expect("queue tail poisoned");
        let mut at = tail.clone();
        loop {
            match at.next.set(entry.clone()) {
                Ok(()) => break,
                Err(_) => {
                    let next = at.next.get().expect("failed set means a link exists");
                    at = next.clone();
                }
            }
        }
        *tail = entry;
    }

    /// Newest entry currently published, used as a wait boundary.
    pub fn snapshot_tail(&self) -> Arc<QueueEntry> {
        let mut at = self.tail.lock().expect("queue tail poisoned").clone();
        while let Some(next) = at.next.get() {
            at = next.clone();
        }
        at
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// A worker's claim and history positions in a team queue.
#[derive(Clone)]
pub struct QueueCursor {
    head: Arc<QueueEntry>,
    history: Arc<QueueEntry>,
}

impl QueueCursor {
    pub fn at(root: Arc<QueueEntry>) -> Self {
        Self {
            head: root.clone(),
            history: root,
        }
    }

    /// Claim the next unclaimed entry, skipping past entries claimed by
    /// other workers. At most one worker wins each entry.
    pub fn take(&mut self) -> Option<Arc<CustomTask>> {
        let mut entry = self.head.next.get()?.clone();
        loop {
            if entry.claimed.no_clear_test_and_set() {
                self.head = entry.clone();
                return entry.task.clone();
            }
            let next = entry.next.get()?.clone();
            entry = next;
        }
    }

    /// Walk history from the last wait boundary up to (and including)
    /// `boundary`, yielding every task in publication order regardless of
    /// who claimed it.
    pub fn drain_history(&mut self, boundary: &Arc<QueueEntry>) -> Vec<Arc<CustomTask>> {
        let mut out = Vec::new();
        while !Arc::ptr_eq(&self.history, boundary) {
            let Some(next) = self.history.next.get() else {
                break;
            };
            let next = next.clone();
            if let Some(task) = &next.task {
                out.push(task.clone());
            }
            self.history = next;
        }
        out
    }
}
