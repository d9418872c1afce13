//! # Tandem Core
//!
//! Cross-thread object lifecycle for a two-thread engine:
//! - The **sim thread** owns authoritative state and decides what changed
//! - The **core thread** owns every core-side counterpart and executes
//!   queued commands strictly in submission order
//!
//! ## Architecture Rules
//!
//! 1. **One way in** - The core thread is only reached through the
//!    [`CommandQueue`]. Nothing on the sim side holds a pointer into core
//!    state.
//! 2. **Changed facets only** - Objects accumulate [`DirtyFlags`] and ship
//!    one payload per tick covering exactly those facets.
//! 3. **Ids, not pointers** - Long-lived references are [`Handle`]s resolved
//!    through a [`HandleRegistry`] that survives id remaps.
//! 4. **Sim services are `!Send`** - The dirty set, handle table, deferred
//!    calls and listener registry cannot leave the sim thread.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tandem_core::{CoreObjectManager, CoreThread, DirtyFlags};
//!
//! let core = CoreThread::spawn(Default::default())?;
//! let objects = CoreObjectManager::new(core.queue().clone(), Default::default());
//!
//! let light = objects.create(Light::default())?;
//! light.update(DirtyFlags::TRANSFORM, |l| l.position = [5.0, 0.0, 0.0]);
//!
//! objects.sync_to_core()?; // once per tick
//! core.flush()?;           // barrier: everything above has run
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod command;
pub mod config;
pub mod deferred;
pub mod error;
pub mod handle;
pub mod object;
pub mod resource;
pub mod sync;

pub use command::{CommandBatch, CommandQueue, CoreContext, CoreResources, CoreThread, CoreThreadStats};
pub use config::{CoreThreadConfig, EngineConfig, ObjectSyncConfig, SyncMode};
pub use deferred::DeferredCalls;
pub use error::{
    AsyncOpError, AsyncOpResult, CommandError, CommandResult, ConfigError, ConfigResult,
    CoreError, CoreResult, HandleError, HandleResult,
};
pub use handle::{Handle, HandleRegistry, IdMapping, InstanceId};
pub use object::{
    CoreCounterpart, CoreObject, CoreObjectId, CoreObjectManager, DirtyFlags, LifecycleState,
    SimObject, SyncStats,
};
pub use resource::{ListenerId, ResourceId, ResourceListener, ResourceListenerRegistry};
pub use sync::AsyncOp;
