//! # Deferred Calls
//!
//! Callbacks scheduled to run later in the same tick, outside the call stack
//! that scheduled them. Used for structural changes (spawning, destroying)
//! that must not happen while a live collection is being iterated.
//!
//! ```text
//!   drain():
//!     pass 1: [f, g]        f queues h
//!     pass 2: [h]           h queues i
//!     pass 3: [i]
//!     pending empty -> return 4
//! ```
//!
//! Each pass swaps the pending list out before running it, so a callback
//! that queues more work never grows the stack. Depth is bounded by the
//! number of calls, not by nesting.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::{trace, warn};

type DeferredFn = Box<dyn FnOnce()>;

struct Shared {
    pending: RefCell<Vec<DeferredFn>>,
    draining: Cell<bool>,
}

/// Sim-thread queue of zero-argument callbacks.
///
/// Clones share the same queue, so a callback can capture a clone and queue
/// follow-up work.
#[derive(Clone)]
pub struct DeferredCalls {
    shared: Rc<Shared>,
}

impl DeferredCalls {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Rc::new(Shared {
                pending: RefCell::new(Vec::new()),
                draining: Cell::new(false),
            }),
        }
    }

    /// Appends `callback`. Safe to call from inside a running callback; the
    /// call runs in the same [`drain`](Self::drain).
    pub fn queue_deferred_call<F>(&self, callback: F)
    where
        F: FnOnce() + 'static,
    {
        self.shared.pending.borrow_mut().push(Box::new(callback));
    }

    /// Number of callbacks waiting.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.pending.borrow().len()
    }

    /// Returns true while a drain is running.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.shared.draining.get()
    }

    /// Runs pending callbacks, including those queued along the way, until
    /// none are left. Returns how many ran.
    ///
    /// Calling `drain` from inside a callback does nothing and returns 0: the
    /// outer drain picks up the work.
    ///
    /// If a callback panics the rest of its pass is dropped, not retried.
    pub fn drain(&self) -> usize {
        if self.shared.draining.replace(true) {
            warn!("deferred call drain requested while already draining, ignored");
            return 0;
        }
        let _guard = DrainGuard(&self.shared.draining);

        let mut executed = 0;
        let mut passes = 0u32;
        loop {
            let batch = std::mem::take(&mut *self.shared.pending.borrow_mut());
            if batch.is_empty() {
                break;
            }
            passes += 1;
            for callback in batch {
                callback();
                executed += 1;
            }
        }

        if executed > 0 {
            trace!(executed, passes, "drained deferred calls");
        }
        executed
    }
}

impl Default for DeferredCalls {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DeferredCalls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredCalls")
            .field("pending", &self.pending_count())
            .field("draining", &self.is_draining())
            .finish()
    }
}

/// Clears the draining flag on every exit path, unwinding included.
struct DrainGuard<'a>(&'a Cell<bool>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}
