//! Work-sharing loop scheduler: bounds encoding, chunk claiming, collapse
//! arithmetic, and `ordered` sequencing.
//!
//! ## Bounds layout
//!
//! Lowered loops carry a flat `bounds` array:
//!
//! ```text
//! [cursor_lo, total_iters,
//!  start, stop, step, offset, extent, stride,   # outermost loop
//!  start, stop, step, offset, extent, stride,   # next collapsed loop
//!  ...]
//! ```
//!
//! `extent` is the cumulative iteration count from this loop inward and
//! `stride` the count strictly inward, so a flattened iteration number maps
//! to per-loop indices by `(n % extent) / stride * step`. For a single
//! (non-collapsed) loop the claimed chunk is written into
//! `bounds[0]..bounds[1]` in index space; for collapsed nests `bounds[0]`
//! holds the chunk's remaining-iteration countdown and the per-loop
//! `offset` slots position each level's range.

use std::sync::{Arc, Condvar, Mutex};

use tracing::trace;

use crate::error::{OmpError, Result};
use crate::icv::SchedKind;
use crate::shared::SharedTag;
use crate::sync::AtomicCounter;
use crate::worker::{with_worker, Frame, FrameKind};

/// Schedule kind codes used by lowered `for_init` calls.
pub const SCHED_DEFAULT: i64 = -1;
pub const SCHED_STATIC: i64 = 0;
pub const SCHED_DYNAMIC: i64 = 1;
pub const SCHED_GUIDED: i64 = 2;
pub const SCHED_AUTO: i64 = 3;
pub const SCHED_RUNTIME: i64 = 4;

/// Per-worker state of one work-shared loop.
pub(crate) struct ForState {
    kind: SchedKind,
    collapse: usize,
    #[allow(dead_code)]
    monotonic: bool,
    /// Total flattened iterations.
    iters: i64,
    /// Iterations per claim (positive, in iteration counts).
    chunk: i64,
    /// Signed index distance per claim (`chunk * step`; `chunk` when
    /// collapsed, which iterates in count space).
    unit: i64,
    start: i64,
    stop: i64,
    step: i64,
    team_size: i64,
    /// Static schedule: start of this worker's next chunk.
    next_start: i64,
    /// Dynamic/guided: shared claim counter in index (or count) space.
    shared: Option<Arc<AtomicCounter>>,
    ordered: Option<Arc<OrderedState>>,
    /// This worker claimed the chunk holding the final iteration.
    saw_last: bool,
}

/// Sequencing state for `ordered` regions inside this loop.
pub(crate) struct OrderedState {
    next: Mutex<i64>,
    cv: Condvar,
    step: i64,
}

impl OrderedState {
    fn new(start: i64, step: i64) -> Self {
        Self {
            next: Mutex::new(start),
            cv: Condvar::new(),
            step,
        }
    }
}

fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

/// Iterations of `range(start, stop, step)`.
fn range_len(start: i64, stop: i64, step: i64) -> i64 {
    if step == 0 {
        return 0;
    }
    let sign = if step > 0 { 1 } else { -1 };
    floor_div(stop - start + step - sign, step).max(0)
}

fn ceil_div(a: i64, b: i64) -> i64 {
    -floor_div(-a, b)
}

/// Build the bounds array from `(start, stop, step)` triples, outermost
/// first.
pub fn for_bounds(elems: &[i64]) -> Vec<i64> {
    let n = elems.len() / 3;
    let mut b = vec![0i64; 2 + 6 * n];
    let mut stride = 1i64;
    for i in (0..n).rev() {
        let start = elems[3 * i];
        let stop = elems[3 * i + 1];
        let step = elems[3 * i + 2];
        b[2 + 6 * i] = start;
        b[3 + 6 * i] = stop;
        b[4 + 6 * i] = step;
        b[5 + 6 * i] = 0;
        b[6 + 6 * i] = range_len(start, stop, step) * stride;
        b[7 + 6 * i] = stride;
        stride = b[6 + 6 * i];
    }
    b[1] = stride;
    b
}

/// Select a strategy and attach the loop to the current worker.
///
/// `runtime` reads the current schedule ICV; `auto` maps to static. The
/// default static chunk is `ceil(iters / team_size)`; dynamic and guided
/// default to a chunk of one.
pub fn for_init(
    bounds: &[i64],
    kind: i64,
    chunk: i64,
    monotonic: bool,
    ordered: i64,
    order: i64,
) -> Result<()> {
    let _ = order;
    let cvars = with_worker(|w| w.cvars().clone());

    let team_size = cvars.dataenv.team_size.max(1);
    let thread_num = cvars.dataenv.thread_num;

    let (mut kind, mut chunk, mut monotonic) = (kind, chunk, monotonic);
    if kind == SCHED_RUNTIME {
        if chunk > 0 {
            return Err(OmpError::InvalidControl {
                what: "schedule(runtime)",
                value: format!("chunk {chunk}"),
            });
        }
        let sched = cvars.dataenv.run_sched;
        kind = match sched.kind {
            SchedKind::Dynamic => SCHED_DYNAMIC,
            SchedKind::Guided => SCHED_GUIDED,
            _ => SCHED_STATIC,
        };
        chunk = sched.chunk;
        monotonic = sched.monotonic;
    }
    let kind = match kind {
        SCHED_DYNAMIC => SchedKind::Dynamic,
        SCHED_GUIDED => SchedKind::Guided,
        _ => SchedKind::Static,
    };

    let collapse = (bounds.len() - 2) / 6;
    let iters = bounds[1].max(0);
    let chunk = if chunk < 1 {
        if kind == SchedKind::Static {
            ceil_div(iters, team_size).max(1)
        } else {
            1
        }
    } else {
        chunk
    };

    let (start, stop, step) = if collapse == 1 {
        (bounds[2], bounds[3], bounds[4])
    } else {
        (0, iters, 1)
    };
    let unit = chunk * step;

    let mut state = ForState {
        kind,
        collapse,
        monotonic,
        iters,
        chunk,
        unit,
        start,
        stop,
        step,
        team_size,
        next_start: start + unit * thread_num,
        shared: None,
        ordered: None,
        saw_last: false,
    };

    with_worker(|w| -> Result<()> {
        let idx = w.team_index().expect("every worker has a team frame");
        let binding = w.frames[idx].team.as_mut().expect("index picked a binding");
        if matches!(kind, SchedKind::Dynamic | SchedKind::Guided) {
            state.shared = Some(
                binding
                    .ctx
                    .push(SharedTag::ForLoop, || AtomicCounter::new(start))?,
            );
        }
        if ordered > 0 {
            state.ordered = Some(
                binding
                    .ctx
                    .push(SharedTag::Ordered, || OrderedState::new(start, step))?,
            );
        }
        let cvars = w.cvars().clone();
        w.frames.push(Frame {
            cvars,
            kind: FrameKind::For(state),
            team: None,
        });
        Ok(())
    })?;
    trace!(
        target: "runtime.sched",
        kind = kind.name(),
        chunk,
        iters,
        collapse,
        "loop initialized"
    );
    Ok(())
}

/// Claim the next chunk for this worker, writing it into `bounds`.
/// Returns `false` when the loop is exhausted (or cancelled), popping the
/// loop frame.
pub fn for_next(bounds: &mut [i64]) -> bool {
    #[derive(Clone, Copy)]
    enum Claim {
        Done,
        Chunk { lo: i64, hi: i64, count: i64 },
    }

    let claim = with_worker(|w| {
        let cancelled = w.cvars().global.cancel
            && w.team().map(|t| t.cancel.get()).unwrap_or(false);
        let Some(idx) = w.for_index() else {
            return Claim::Done;
        };
        let FrameKind::For(state) = &mut w.frames[idx].kind else {
            unreachable!("for_index returned a loop frame");
        };
        if cancelled {
            return Claim::Done;
        }

        let stop = state.stop;
        let forward = state.step >= 0;
        let exhausted = move |lo: i64| if forward { lo >= stop } else { lo <= stop };
        let clamp = move |hi: i64| if forward { hi.min(stop) } else { hi.max(stop) };

        let claim = match state.kind {
            SchedKind::Static => {
                let lo = state.next_start;
                state.next_start += state.unit * state.team_size;
                if exhausted(lo) {
                    Claim::Done
                } else {
                    Claim::Chunk {
                        lo,
                        hi: clamp(lo + state.unit),
                        count: state.chunk,
                    }
                }
            }
            SchedKind::Dynamic => {
                let shared = state.shared.as_ref().expect("dynamic loop has a counter");
                let lo = shared.fetch_add(state.unit);
                if exhausted(lo) {
                    Claim::Done
                } else {
                    Claim::Chunk {
                        lo,
                        hi: clamp(lo + state.unit),
                        count: state.chunk,
                    }
                }
            }
            SchedKind::Guided => {
                let shared = state.shared.as_ref().expect("guided loop has a counter");
                loop {
                    let cur = shared.get();
                    if exhausted(cur) {
                        break Claim::Done;
                    }
                    let remaining = range_len(cur, state.stop, state.step);
                    let q = ceil_div(remaining, state.team_size).max(state.chunk);
                    let hi = clamp(cur + q * state.step);
                    if shared.compare_exchange_weak(cur, hi) {
                        break Claim::Chunk {
                            lo: cur,
                            hi,
                            count: q,
                        };
                    }
                }
            }
            _ => Claim::Done,
        };
        if let Claim::Chunk { lo, hi, .. } = claim {
            let last = if state.collapse == 1 {
                state.start + (state.iters - 1) * state.step
            } else {
                state.iters - 1
            };
            let holds_last = if forward {
                lo <= last && last < hi
            } else {
                lo >= last && last > hi
            };
            if state.iters > 0 && holds_last {
                state.saw_last = true;
            }
        }
        claim
    });

    match claim {
        Claim::Done => {
            with_worker(|w| {
                if let Some(idx) = w.for_index() {
                    let saw_last = match &w.frames[idx].kind {
                        FrameKind::For(state) => state.saw_last,
                        _ => false,
                    };
                    w.frames.remove(idx);
                    w.for_last = saw_last;
                }
            });
            false
        }
        Claim::Chunk { lo, hi, count } => {
            let (collapse, iters) = with_worker(|w| {
                let idx = w.for_index().expect("loop frame is live");
                let FrameKind::For(state) = &w.frames[idx].kind else {
                    unreachable!()
                };
                (state.collapse, state.iters)
            });
            if collapse == 1 {
                bounds[0] = lo;
                bounds[1] = hi;
            } else {
                let cc = count.min(iters - lo);
                bounds[0] = cc;
                bounds[1] = cc;
                for k in 0..collapse {
                    let extent = bounds[6 + 6 * k];
                    let stride = bounds[7 + 6 * k];
                    let step_k = bounds[4 + 6 * k];
                    bounds[5 + 6 * k] = if extent > 0 {
                        (lo % extent) / stride * step_k
                    } else {
                        0
                    };
                }
            }
            true
        }
    }
}

/// Whether this worker's most recently finished loop executed the
/// sequentially-last iteration (the `lastprivate` publication guard).
pub fn for_last() -> bool {
    with_worker(|w| w.for_last)
}

/// Block until the ordered sequence reaches `seq` (an index value of the
/// work-shared loop).
pub fn ordered_start(seq: i64) -> Result<()> {
    let ordered = with_worker(|w| {
        let idx = w.for_index()?;
        let FrameKind::For(state) = &w.frames[idx].kind else {
            return None;
        };
        state.ordered.clone()
    });
    let Some(ordered) = ordered else {
        return Err(OmpError::OutsideConstruct("ordered"));
    };
    let mut next = ordered.next.lock().expect("ordered mutex poisoned");
    while *next != seq {
        next = ordered.cv.wait(next).expect("ordered mutex poisoned");
    }
    Ok(())
}

/// Release the ordered region, admitting the next iteration.
pub fn ordered_end() -> Result<()> {
    let ordered = with_worker(|w| {
        let idx = w.for_index()?;
        let FrameKind::For(state) = &w.frames[idx].kind else {
            return None;
        };
        state.ordered.clone()
    });
    let Some(ordered) = ordered else {
        return Err(OmpError::OutsideConstruct("ordered"));
    };
    let mut next = ordered.next.lock().expect("ordered mutex poisoned");
    *next += ordered.step;
    ordered.cv.notify_all();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_layout_single_loop() {
        let b = for_bounds(&[0, 11, 1]);
        assert_eq!(b.len(), 8);
        assert_eq!(b[1], 11);
        assert_eq!(&b[2..8], &[0, 11, 1, 0, 11, 1]);
    }

    #[test]
    fn bounds_layout_collapsed() {
        // for i in range(3): for j in range(4)
        let b = for_bounds(&[0, 3, 1, 0, 4, 1]);
        assert_eq!(b[1], 12);
        // outer: extent 12, stride 4
        assert_eq!(b[6], 12);
        assert_eq!(b[7], 4);
        // inner: extent 4, stride 1
        assert_eq!(b[12], 4);
        assert_eq!(b[13], 1);
    }

    #[test]
    fn bounds_negative_step() {
        let b = for_bounds(&[10, 0, -1]);
        assert_eq!(b[1], 10);
        let b = for_bounds(&[10, 0, -3]);
        assert_eq!(b[1], 4);
    }

    #[test]
    fn range_len_matches_host_semantics() {
        assert_eq!(range_len(0, 10, 1), 10);
        assert_eq!(range_len(0, 10, 3), 4);
        assert_eq!(range_len(10, 0, -1), 10);
        assert_eq!(range_len(10, 0, -3), 4);
        assert_eq!(range_len(0, 0, 1), 0);
        assert_eq!(range_len(5, 0, 1), 0);
    }

    #[test]
    fn collapse_offsets_reconstruct_indices() {
        let b = for_bounds(&[0, 3, 1, 10, 40, 10]);
        // flattened iteration 7 = outer 2, inner 1 → offsets 2*1 and 1*10
        let extent0 = b[6];
        let stride0 = b[7];
        let extent1 = b[12];
        let stride1 = b[13];
        let n = 7i64;
        assert_eq!((n % extent0) / stride0 * b[4], 2);
        assert_eq!((n % extent1) / stride1 * b[10], 10);
    }
}
