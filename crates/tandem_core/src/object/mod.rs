//! # Dual Object Model
//!
//! Every synchronized entity is a pair: a sim-side [`CoreObject`] holding the
//! authoritative state and a core-side [`CoreCounterpart`] holding a lagged
//! copy. The halves only communicate through commands:
//!
//! 1. construction (queued by [`CoreObject::initialize`])
//! 2. sync payloads (queued by [`CoreObjectManager::sync_to_core`])
//! 3. destruction (queued by [`CoreObject::destroy`] or drop)
//!
//! All three travel through the same FIFO, so the core thread always sees
//! them in that order.

mod core_object;
mod counterpart;
mod dirty;
mod manager;

pub use core_object::{CoreObject, CoreObjectId, LifecycleState};
pub use counterpart::{CoreCounterpart, SimObject};
pub use dirty::DirtyFlags;
pub use manager::{CoreObjectManager, SyncStats};

pub(crate) use counterpart::ErasedCounterpart;
