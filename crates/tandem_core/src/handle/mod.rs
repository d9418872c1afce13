//! # Handles
//!
//! Id-based indirection for long-lived references. Nothing outside the
//! registry stores an object pointer: a handle is an [`InstanceId`], resolved
//! on every use, so remapping an id after a reload or deserialization is
//! invisible to handle holders.

mod id;
mod registry;

pub use id::{Handle, InstanceId};
pub use registry::{HandleRegistry, IdMapping};
