//! The producer side of the core thread's command queue.
//!
//! Many producers, one consumer. Commands run in exactly the order they were
//! enqueued: no priorities, no coalescing. A [`CommandBatch`] is a single
//! queue entry whose commands run back to back in recording order.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::warn;

use super::context::CoreContext;
use crate::error::{CommandError, CommandResult};
use crate::object::CoreObjectId;
use crate::sync::AsyncOp;

/// A queued unit of work for the core thread.
pub(crate) type CommandFn = Box<dyn FnOnce(&mut CoreContext) + Send + 'static>;

/// What travels through the channel.
pub(crate) enum Message {
    /// A single command.
    Command(CommandFn),
    /// Several commands that run back to back.
    Batch(Vec<CommandFn>),
    /// Stop after everything queued before this message.
    Shutdown,
}

/// State shared between producers and the run loop.
pub(crate) struct QueueShared {
    pub(crate) halted: AtomicBool,
    pub(crate) failure: Mutex<Option<CommandError>>,
    pub(crate) submitted: AtomicU64,
    pub(crate) executed: AtomicU64,
    pub(crate) slowest_us: AtomicU64,
    pub(crate) core_thread: OnceLock<ThreadId>,
    /// Source of core object ids for every manager feeding this queue.
    next_object_id: AtomicU64,
}

impl QueueShared {
    /// Stops accepting commands, keeping the first recorded failure.
    pub(crate) fn halt(&self, failure: Option<CommandError>) {
        if let Some(failure) = failure {
            let mut slot = self.failure.lock();
            if slot.is_none() {
                *slot = Some(failure);
            }
        }
        self.halted.store(true, Ordering::Release);
    }
}

thread_local! {
    /// `Some` while the core thread runs a command. Ops of a command that
    /// panics land here instead of being abandoned mid-unwind, so waiters
    /// only wake once the failure is recorded.
    static UNWOUND_OPS: RefCell<Option<Vec<AsyncOp>>> = const { RefCell::new(None) };
}

/// Starts collecting ops dropped by a panicking command on this thread.
pub(crate) fn track_unwound_ops() {
    UNWOUND_OPS.with(|ops| *ops.borrow_mut() = Some(Vec::new()));
}

/// Stops collecting and returns what was collected.
pub(crate) fn take_unwound_ops() -> Vec<AsyncOp> {
    UNWOUND_OPS.with(|ops| ops.borrow_mut().take().unwrap_or_default())
}

/// Completes its op when finished, abandons it if dropped unrun.
struct Completion {
    op: AsyncOp,
}

impl Completion {
    fn finish<R: Any + Send>(self, value: R) {
        if let Err(err) = self.op.complete(value) {
            warn!(%err, "command result could not be stored");
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if thread::panicking() {
            let deferred = UNWOUND_OPS
                .try_with(|ops| match ops.borrow_mut().as_mut() {
                    Some(ops) => {
                        ops.push(self.op.clone());
                        true
                    }
                    None => false,
                })
                .unwrap_or(false);
            if deferred {
                return;
            }
        }
        // No-op once completed.
        self.op.abandon();
    }
}

/// Wraps a value-returning command so its result lands in a fresh op.
pub(crate) fn bind_result<R, F>(command: F) -> (CommandFn, AsyncOp)
where
    R: Any + Send,
    F: FnOnce(&mut CoreContext) -> R + Send + 'static,
{
    let op = AsyncOp::new_blocking();
    let completion = Completion { op: op.clone() };
    let body: CommandFn = Box::new(move |ctx| {
        let value = command(ctx);
        completion.finish(value);
    });
    (body, op)
}

/// Handle for submitting commands to the core thread.
///
/// Cheap to clone and safe to share: every clone feeds the same FIFO.
/// Submission never blocks.
#[derive(Clone)]
pub struct CommandQueue {
    sender: Sender<Message>,
    pub(crate) shared: Arc<QueueShared>,
}

impl CommandQueue {
    /// Creates a queue and the receiving end for the run loop.
    pub(crate) fn new() -> (Self, Receiver<Message>) {
        let (sender, receiver) = unbounded();
        let queue = Self {
            sender,
            shared: Arc::new(QueueShared {
                halted: AtomicBool::new(false),
                failure: Mutex::new(None),
                submitted: AtomicU64::new(0),
                executed: AtomicU64::new(0),
                slowest_us: AtomicU64::new(0),
                core_thread: OnceLock::new(),
                next_object_id: AtomicU64::new(1),
            }),
        };
        (queue, receiver)
    }

    /// Enqueues a fire-and-forget command.
    ///
    /// # Errors
    ///
    /// [`CommandError::CoreThreadHalted`] if the core thread stopped.
    pub fn submit<F>(&self, command: F) -> CommandResult<()>
    where
        F: FnOnce(&mut CoreContext) + Send + 'static,
    {
        self.send(Message::Command(Box::new(command)), 1)
    }

    /// Enqueues a command whose return value is reported through an op.
    ///
    /// The op supports blocking and completes on the core thread right after
    /// the command body returns.
    ///
    /// # Errors
    ///
    /// [`CommandError::CoreThreadHalted`] if the core thread stopped.
    pub fn submit_with_result<R, F>(&self, command: F) -> CommandResult<AsyncOp>
    where
        R: Any + Send,
        F: FnOnce(&mut CoreContext) -> R + Send + 'static,
    {
        let (body, op) = bind_result(command);
        self.send(Message::Command(body), 1)?;
        Ok(op)
    }

    /// Enqueues every command of `batch` as one entry. Empty batches are
    /// dropped without touching the channel.
    ///
    /// Returns the number of commands enqueued.
    ///
    /// # Errors
    ///
    /// [`CommandError::CoreThreadHalted`] if the core thread stopped. Ops
    /// recorded in the batch are abandoned.
    pub fn submit_batch(&self, batch: CommandBatch) -> CommandResult<usize> {
        let count = batch.len();
        if count == 0 {
            return Ok(0);
        }
        self.send(Message::Batch(batch.commands), count as u64)?;
        Ok(count)
    }

    /// Asks the run loop to stop after everything queued so far.
    pub(crate) fn request_shutdown(&self) {
        // A closed channel means the loop is already gone.
        let _ = self.sender.send(Message::Shutdown);
    }

    fn send(&self, message: Message, count: u64) -> CommandResult<()> {
        if self.is_halted() {
            return Err(CommandError::CoreThreadHalted);
        }
        // On failure the message is dropped here, abandoning any bound ops.
        self.sender
            .send(message)
            .map_err(|_| CommandError::CoreThreadHalted)?;
        self.shared.submitted.fetch_add(count, Ordering::Relaxed);
        Ok(())
    }

    /// Returns true once the core thread stopped accepting commands.
    #[inline]
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.shared.halted.load(Ordering::Acquire)
    }

    /// The fatal error that halted the core thread, if any.
    #[must_use]
    pub fn failure(&self) -> Option<CommandError> {
        self.shared.failure.lock().clone()
    }

    /// The failure if one was recorded, otherwise a plain halt.
    #[must_use]
    pub(crate) fn halt_error(&self) -> CommandError {
        self.failure().unwrap_or(CommandError::CoreThreadHalted)
    }

    /// Hands out the next core object id. Ids are unique across every
    /// manager that shares this queue.
    pub(crate) fn allocate_object_id(&self) -> CoreObjectId {
        CoreObjectId::new(self.shared.next_object_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns true when called from the core thread itself.
    #[must_use]
    pub fn is_core_thread(&self) -> bool {
        self.shared.core_thread.get() == Some(&thread::current().id())
    }

    /// Total commands accepted so far.
    #[must_use]
    pub fn submitted_count(&self) -> u64 {
        self.shared.submitted.load(Ordering::Relaxed)
    }

    /// Total commands the core thread has finished.
    #[must_use]
    pub fn executed_count(&self) -> u64 {
        self.shared.executed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandQueue")
            .field("submitted", &self.submitted_count())
            .field("executed", &self.executed_count())
            .field("halted", &self.is_halted())
            .finish()
    }
}

/// Commands recorded locally and enqueued later as a single entry.
///
/// Recording costs no channel traffic. The batch keeps recording order, and
/// nothing submitted by other producers can interleave with it.
///
/// ```rust,ignore
/// let mut batch = CommandBatch::new();
/// batch.push(|ctx| upload_vertices(ctx));
/// let op = batch.push_with_result(|ctx| read_back(ctx));
/// queue.submit_batch(batch)?;
/// ```
#[derive(Default)]
pub struct CommandBatch {
    commands: Vec<CommandFn>,
}

impl CommandBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty batch with room for `capacity` commands.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            commands: Vec::with_capacity(capacity),
        }
    }

    /// Records a fire-and-forget command.
    pub fn push<F>(&mut self, command: F)
    where
        F: FnOnce(&mut CoreContext) + Send + 'static,
    {
        self.commands.push(Box::new(command));
    }

    /// Records a command whose return value is reported through an op.
    pub fn push_with_result<R, F>(&mut self, command: F) -> AsyncOp
    where
        R: Any + Send,
        F: FnOnce(&mut CoreContext) -> R + Send + 'static,
    {
        let (body, op) = bind_result(command);
        self.commands.push(body);
        op
    }

    pub(crate) fn push_boxed(&mut self, command: CommandFn) {
        self.commands.push(command);
    }

    /// Number of recorded commands.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if nothing was recorded.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl fmt::Debug for CommandBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBatch")
            .field("len", &self.commands.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AsyncOpError;

    fn run_all(receiver: &Receiver<Message>, ctx: &mut CoreContext) {
        for message in receiver.try_iter() {
            match message {
                Message::Command(command) => command(&mut *ctx),
                Message::Batch(commands) => commands.into_iter().for_each(|c| c(&mut *ctx)),
                Message::Shutdown => break,
            }
        }
    }

    #[test]
    fn test_submit_counts() {
        let (queue, receiver) = CommandQueue::new();
        queue.submit(|_| {}).unwrap();
        let op = queue.submit_with_result(|_| 3u8).unwrap();
        assert_eq!(queue.submitted_count(), 2);
        assert!(!op.has_completed());

        run_all(&receiver, &mut CoreContext::new());
        assert_eq!(op.return_value::<u8>(), Ok(3));
    }

    #[test]
    fn test_batch_records_in_order() {
        let (queue, receiver) = CommandQueue::new();
        let mut batch = CommandBatch::with_capacity(3);
        batch.push(|ctx| {
            ctx.resources_mut().insert(vec![1u32]);
        });
        batch.push(|ctx| {
            if let Some(log) = ctx.resources_mut().get_mut::<Vec<u32>>() {
                log.push(2);
            }
        });
        let op = batch.push_with_result(|ctx| ctx.resources().get::<Vec<u32>>().cloned());
        assert_eq!(batch.len(), 3);
        assert_eq!(queue.submit_batch(batch).unwrap(), 3);

        run_all(&receiver, &mut CoreContext::new());
        assert_eq!(op.return_value::<Option<Vec<u32>>>(), Ok(Some(vec![1, 2])));
    }

    #[test]
    fn test_empty_batch_is_skipped() {
        let (queue, receiver) = CommandQueue::new();
        assert_eq!(queue.submit_batch(CommandBatch::new()).unwrap(), 0);
        assert!(receiver.try_recv().is_err());
        assert_eq!(queue.submitted_count(), 0);
    }

    #[test]
    fn test_dropped_command_abandons_op() {
        let (queue, receiver) = CommandQueue::new();
        let op = queue.submit_with_result(|_| 1u32).unwrap();
        drop(receiver);

        assert!(op.is_abandoned());
        assert_eq!(op.block_until_complete(), Err(AsyncOpError::Abandoned));
    }

    #[test]
    fn test_halted_queue_rejects() {
        let (queue, _receiver) = CommandQueue::new();
        queue.shared.halt(None);
        assert_eq!(queue.submit(|_| {}), Err(CommandError::CoreThreadHalted));
        assert!(queue.failure().is_none());
    }
}
