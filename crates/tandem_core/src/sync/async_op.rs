//! # AsyncOp
//!
//! Single-assignment result cell shared between the thread that submits a
//! command and the core thread that executes it.
//!
//! ```text
//!   Sim thread                          Core thread
//!   ──────────                          ───────────
//!   op = submit_with_result(cmd)  ───>  run cmd
//!   op.has_completed() == false         op.complete(value)
//!   op.block_until_complete()   <───    notify_all
//!   op.return_value::<T>()
//! ```
//!
//! Blocking support (a mutex + condvar pair) is opt-in at construction. Ops
//! that will only ever be polled skip it.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{AsyncOpError, AsyncOpResult};

const PENDING: u8 = 0;
const COMPLETED: u8 = 1;
const ABANDONED: u8 = 2;

/// Wake-up machinery, only allocated for ops that may be blocked on.
struct SyncData {
    lock: Mutex<()>,
    cond: Condvar,
}

struct Inner {
    /// PENDING -> COMPLETED or PENDING -> ABANDONED, never back.
    state: AtomicU8,
    /// Written once, under this lock, before `state` becomes COMPLETED.
    result: Mutex<Option<Box<dyn Any + Send>>>,
    sync: Option<SyncData>,
}

/// Cross-thread future with a single-assignment result.
///
/// Cloning an `AsyncOp` clones the reference, not the result: every clone
/// observes the same completion. The op is freed when the last clone (the
/// submitter's copy or the queue entry's copy) is dropped.
///
/// ## Usage
///
/// ```rust,ignore
/// let op = core_thread.submit_with_result(|ctx| ctx.len())?;
/// op.block_until_complete()?;
/// let live: usize = op.return_value()?;
/// ```
#[derive(Clone)]
pub struct AsyncOp {
    inner: Arc<Inner>,
}

impl AsyncOp {
    /// Creates an op that can only be polled.
    ///
    /// [`block_until_complete`](Self::block_until_complete) on this op fails
    /// with [`AsyncOpError::NoSyncData`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_sync(None)
    }

    /// Creates an op that supports blocking waits.
    #[must_use]
    pub fn new_blocking() -> Self {
        Self::with_sync(Some(SyncData {
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }))
    }

    fn with_sync(sync: Option<SyncData>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(PENDING),
                result: Mutex::new(None),
                sync,
            }),
        }
    }

    /// Returns true if this op was created with blocking support.
    #[inline]
    #[must_use]
    pub fn supports_blocking(&self) -> bool {
        self.inner.sync.is_some()
    }

    /// Stores `value` and marks the op complete, waking every blocked waiter.
    ///
    /// # Errors
    ///
    /// [`AsyncOpError::AlreadyCompleted`] if a result was already stored or
    /// the op was abandoned. The first value is kept.
    pub fn complete<T: Any + Send>(&self, value: T) -> AsyncOpResult<()> {
        {
            let mut slot = self.inner.result.lock();
            if self.inner.state.load(Ordering::Acquire) != PENDING {
                return Err(AsyncOpError::AlreadyCompleted);
            }
            *slot = Some(Box::new(value));
            self.inner.state.store(COMPLETED, Ordering::Release);
        }
        self.wake_waiters();
        Ok(())
    }

    /// Marks the op complete without a payload.
    ///
    /// The stored value is `()`.
    ///
    /// # Errors
    ///
    /// Same as [`complete`](Self::complete).
    pub fn complete_empty(&self) -> AsyncOpResult<()> {
        self.complete(())
    }

    /// Marks a still-pending op as abandoned and wakes waiters.
    ///
    /// Called when the bound command is dropped without running.
    pub(crate) fn abandon(&self) {
        let swapped = {
            let _slot = self.inner.result.lock();
            self.inner
                .state
                .compare_exchange(PENDING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        };
        if swapped {
            self.wake_waiters();
        }
    }

    fn wake_waiters(&self) {
        if let Some(sync) = &self.inner.sync {
            // Taking the lock orders this notify after any waiter's state check.
            let _guard = sync.lock.lock();
            sync.cond.notify_all();
        }
    }

    /// Non-blocking completion check, safe from any thread.
    #[inline]
    #[must_use]
    pub fn has_completed(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == COMPLETED
    }

    /// Returns true if the bound command was dropped without running.
    #[inline]
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == ABANDONED
    }

    /// Blocks the calling thread until the op completes.
    ///
    /// There is no timeout.
    ///
    /// # Errors
    ///
    /// - [`AsyncOpError::NoSyncData`] if the op was created with [`AsyncOp::new`].
    /// - [`AsyncOpError::Abandoned`] if the bound command will never run.
    pub fn block_until_complete(&self) -> AsyncOpResult<()> {
        let sync = self.inner.sync.as_ref().ok_or(AsyncOpError::NoSyncData)?;

        let mut guard = sync.lock.lock();
        while self.inner.state.load(Ordering::Acquire) == PENDING {
            sync.cond.wait(&mut guard);
        }
        drop(guard);

        if self.is_abandoned() {
            return Err(AsyncOpError::Abandoned);
        }
        Ok(())
    }

    /// Returns a clone of the stored result.
    ///
    /// # Errors
    ///
    /// - [`AsyncOpError::NotCompleted`] if called before completion.
    /// - [`AsyncOpError::Abandoned`] if the command never ran.
    /// - [`AsyncOpError::TypeMismatch`] if `T` is not the stored type.
    pub fn return_value<T: Any + Clone>(&self) -> AsyncOpResult<T> {
        self.map_return_value(T::clone)
    }

    /// Borrows the stored result and maps it.
    ///
    /// # Errors
    ///
    /// Same as [`return_value`](Self::return_value).
    pub fn map_return_value<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> AsyncOpResult<R> {
        match self.inner.state.load(Ordering::Acquire) {
            PENDING => return Err(AsyncOpError::NotCompleted),
            ABANDONED => return Err(AsyncOpError::Abandoned),
            _ => {}
        }

        let slot = self.inner.result.lock();
        let value = slot
            .as_ref()
            .and_then(|boxed| boxed.downcast_ref::<T>())
            .ok_or(AsyncOpError::TypeMismatch {
                expected: type_name::<T>(),
            })?;
        Ok(f(value))
    }
}

impl Default for AsyncOp {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AsyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.state.load(Ordering::Acquire) {
            PENDING => "pending",
            COMPLETED => "completed",
            _ => "abandoned",
        };
        f.debug_struct("AsyncOp")
            .field("state", &state)
            .field("blocking", &self.supports_blocking())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_complete_and_read() {
        let op = AsyncOp::new();
        assert!(!op.has_completed());
        assert_eq!(op.return_value::<u32>(), Err(AsyncOpError::NotCompleted));

        op.complete(42u32).unwrap();
        assert!(op.has_completed());
        assert_eq!(op.return_value::<u32>(), Ok(42));
        assert_eq!(op.return_value::<u32>(), Ok(42));
    }

    #[test]
    fn test_double_complete_keeps_first_value() {
        let op = AsyncOp::new();
        op.complete(1u32).unwrap();
        assert_eq!(op.complete(2u32), Err(AsyncOpError::AlreadyCompleted));
        assert_eq!(op.return_value::<u32>(), Ok(1));
    }

    #[test]
    fn test_type_mismatch() {
        let op = AsyncOp::new();
        op.complete(String::from("mesh")).unwrap();
        assert!(matches!(
            op.return_value::<u32>(),
            Err(AsyncOpError::TypeMismatch { .. })
        ));
        assert_eq!(op.map_return_value(|s: &String| s.len()), Ok(4));
    }

    #[test]
    fn test_block_without_sync_data() {
        let op = AsyncOp::new();
        assert_eq!(op.block_until_complete(), Err(AsyncOpError::NoSyncData));
    }

    #[test]
    fn test_block_across_threads() {
        let op = AsyncOp::new_blocking();
        let remote = op.clone();

        let worker = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(5));
            remote.complete(7i64).unwrap();
        });

        op.block_until_complete().unwrap();
        assert!(op.has_completed());
        assert_eq!(op.return_value::<i64>(), Ok(7));
        worker.join().unwrap();
    }

    #[test]
    fn test_block_after_completion_returns_immediately() {
        let op = AsyncOp::new_blocking();
        op.complete_empty().unwrap();
        op.block_until_complete().unwrap();
        assert_eq!(op.return_value::<()>(), Ok(()));
    }

    #[test]
    fn test_abandon_wakes_waiter() {
        let op = AsyncOp::new_blocking();
        let remote = op.clone();

        let worker = thread::spawn(move || remote.block_until_complete());
        thread::sleep(std::time::Duration::from_millis(5));
        op.abandon();

        assert_eq!(worker.join().unwrap(), Err(AsyncOpError::Abandoned));
        assert!(op.is_abandoned());
        assert_eq!(op.complete(1u8), Err(AsyncOpError::AlreadyCompleted));
    }

    #[test]
    fn test_abandon_after_complete_is_ignored() {
        let op = AsyncOp::new();
        op.complete(3u8).unwrap();
        op.abandon();
        assert!(op.has_completed());
        assert_eq!(op.return_value::<u8>(), Ok(3));
    }

    #[test]
    fn test_no_missed_wakeups_under_contention() {
        for _ in 0..500 {
            let op = AsyncOp::new_blocking();
            let waiters: Vec<_> = (0..3)
                .map(|_| {
                    let op = op.clone();
                    thread::spawn(move || {
                        op.block_until_complete().unwrap();
                        op.return_value::<u32>().unwrap()
                    })
                })
                .collect();

            op.complete(9u32).unwrap();
            for waiter in waiters {
                assert_eq!(waiter.join().unwrap(), 9);
            }
        }
    }
}
