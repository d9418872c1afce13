//! Cross-thread synchronization primitives.

mod async_op;

pub use async_op::AsyncOp;
