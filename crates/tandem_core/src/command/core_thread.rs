//! # Core Thread
//!
//! The single consumer of the command queue.
//!
//! ```text
//!   producers ──submit──> [ C1 | C2 | batch(C3,C4) | C5 | ... ] ──> run loop
//!                                                                    │
//!                                         for each command, in order:│
//!                                           run body(&mut CoreContext)
//!                                           complete bound AsyncOp
//! ```
//!
//! A command that panics is fatal. The run loop records a crash report,
//! halts, and abandons every command still queued so no waiter hangs. With
//! `panic = "abort"` the process stops at the panic instead.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;

use crossbeam_channel::Receiver;
use tracing::{debug, error, info, warn};

use super::context::CoreContext;
use super::queue::{self, CommandFn, CommandQueue, Message, QueueShared};
use crate::config::CoreThreadConfig;
use crate::error::{CommandError, CommandResult};

/// Counters describing the core thread's work so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoreThreadStats {
    /// Commands accepted by the queue.
    pub submitted: u64,
    /// Commands the run loop finished (including one that panicked).
    pub executed: u64,
    /// Longest single command, in microseconds.
    pub slowest_command_us: u64,
}

impl CoreThreadStats {
    /// Commands accepted but not yet finished.
    #[must_use]
    pub fn pending(&self) -> u64 {
        self.submitted.saturating_sub(self.executed)
    }
}

/// Owner of the core thread and its queue.
///
/// Dropping it shuts the thread down after the queued commands ran.
pub struct CoreThread {
    queue: CommandQueue,
    handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl CoreThread {
    /// Starts the core thread.
    ///
    /// # Errors
    ///
    /// [`CommandError::SpawnFailed`] if the OS refuses to start the thread.
    pub fn spawn(config: CoreThreadConfig) -> CommandResult<Self> {
        let (queue, receiver) = CommandQueue::new();
        let shared = Arc::clone(&queue.shared);

        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || run_loop(&receiver, &shared, &config))
            .map_err(|e| CommandError::SpawnFailed(e.to_string()))?;
        let thread_id = handle.thread().id();
        // Set here as well as in the loop so the id is known before the
        // first command runs.
        let _ = queue.shared.core_thread.set(thread_id);

        Ok(Self {
            queue,
            handle: Some(handle),
            thread_id,
        })
    }

    /// The submitting end. Clone it to hand out to other producers.
    #[inline]
    #[must_use]
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Id of the core thread.
    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Blocks until every command submitted before this call has run.
    ///
    /// # Errors
    ///
    /// The recorded failure (or [`CommandError::CoreThreadHalted`]) if the
    /// core thread stopped before reaching the barrier.
    pub fn flush(&self) -> CommandResult<()> {
        debug_assert!(
            !self.queue.is_core_thread(),
            "flush from the core thread would wait on itself"
        );
        let barrier = self
            .queue
            .submit_with_result(|_| ())
            .map_err(|_| self.queue.halt_error())?;
        barrier
            .block_until_complete()
            .map_err(|_| self.queue.halt_error())
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CoreThreadStats {
        let shared = &self.queue.shared;
        CoreThreadStats {
            submitted: shared.submitted.load(Ordering::Relaxed),
            executed: shared.executed.load(Ordering::Acquire),
            slowest_command_us: shared.slowest_us.load(Ordering::Relaxed),
        }
    }

    /// Runs every queued command, then stops and joins the thread.
    ///
    /// # Errors
    ///
    /// The failure that halted the core thread, if one occurred.
    pub fn shutdown(mut self) -> CommandResult<CoreThreadStats> {
        self.stop();
        let stats = self.stats();
        match self.queue.failure() {
            Some(failure) => Err(failure),
            None => Ok(stats),
        }
    }

    fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.queue.request_shutdown();
        if handle.join().is_err() {
            self.queue.shared.halt(Some(CommandError::CommandPanicked {
                command: self.queue.executed_count(),
                message: String::from("core thread terminated outside a command"),
            }));
        }
    }
}

impl Drop for CoreThread {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CoreThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreThread")
            .field("thread_id", &self.thread_id)
            .field("stats", &self.stats())
            .finish()
    }
}

fn run_loop(receiver: &Receiver<Message>, shared: &QueueShared, config: &CoreThreadConfig) {
    let _ = shared.core_thread.set(thread::current().id());
    let mut ctx = CoreContext::new();
    info!(thread = %config.thread_name, "core thread started");

    'run: while let Ok(message) = receiver.recv() {
        match message {
            Message::Shutdown => {
                debug!("core thread shutdown requested");
                break 'run;
            }
            Message::Command(command) => {
                if !execute(&mut ctx, shared, config, command) {
                    break 'run;
                }
            }
            Message::Batch(commands) => {
                for command in commands {
                    if !execute(&mut ctx, shared, config, command) {
                        break 'run;
                    }
                }
            }
        }
    }

    shared.halt(None);
    // Anything still queued will never run: drop it so bound ops are abandoned.
    let abandoned = receiver.try_iter().count();
    if abandoned > 0 {
        warn!(abandoned, "core thread stopped with commands still queued");
    }
    info!(
        executed = shared.executed.load(Ordering::Relaxed),
        live_counterparts = ctx.counterpart_count(),
        "core thread stopped"
    );
}

/// Runs one command. Returns false if it panicked and the loop must halt.
fn execute(
    ctx: &mut CoreContext,
    shared: &QueueShared,
    config: &CoreThreadConfig,
    command: CommandFn,
) -> bool {
    let index = shared.executed.load(Ordering::Relaxed);
    ctx.set_command_index(index);

    let started = Instant::now();
    queue::track_unwound_ops();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| command(&mut *ctx)));
    let unwound = queue::take_unwound_ops();
    let elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);

    shared.executed.fetch_add(1, Ordering::Release);
    shared.slowest_us.fetch_max(elapsed_us, Ordering::Relaxed);

    let keep_running = match outcome {
        Ok(()) => {
            if config.slow_command_us > 0 && elapsed_us > config.slow_command_us {
                warn!(command = index, elapsed_us, "slow core thread command");
            }
            true
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(
                command = index,
                %message,
                "core thread command panicked; halting core thread, queued commands are abandoned"
            );
            shared.halt(Some(CommandError::CommandPanicked {
                command: index,
                message,
            }));
            false
        }
    };
    // Only after the halt, so a woken waiter finds the failure.
    for op in unwound {
        op.abandon();
    }
    keep_running
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        String::from("non-string panic payload")
    }
}
