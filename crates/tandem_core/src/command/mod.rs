//! # Command Queue
//!
//! Everything the sim thread wants done on the core thread travels as a
//! command: a closure over `&mut CoreContext`, executed in FIFO order by the
//! single core thread.

mod context;
mod core_thread;
mod queue;

pub use context::{CoreContext, CoreResources};
pub use core_thread::{CoreThread, CoreThreadStats};
pub use queue::{CommandBatch, CommandQueue};

pub(crate) use queue::CommandFn;
