//! The two halves of a dual object.
//!
//! ```text
//!   Sim thread                              Core thread
//!   ──────────                              ───────────
//!   S: SimObject                            S::Core: CoreCounterpart
//!     state (authoritative)                   lagged copy
//!     create_core()        ── construct ──>   initialize()
//!     sync_payload(flags)  ── payload ────>   apply_sync()
//!     drop / destroy()     ── destroy ────>   destroy()
//! ```
//!
//! The payload is the only thing that crosses the boundary after
//! construction. It carries the flagged facets, not the whole object.

use std::any::{type_name, Any};

use super::{CoreObjectId, DirtyFlags};
use crate::command::CoreResources;

/// Core-side counterpart of a dual object.
///
/// Lives in the core thread's context and is only ever touched there.
pub trait CoreCounterpart: Send + 'static {
    /// Snapshot produced by the sim side for one sync.
    type Payload: Send + 'static;

    /// Called once on the core thread right after construction.
    fn initialize(&mut self, id: CoreObjectId, resources: &mut CoreResources) {
        let _ = (id, resources);
    }

    /// Applies one sync payload. Each payload is consumed exactly once.
    fn apply_sync(&mut self, payload: Self::Payload, resources: &mut CoreResources);

    /// Called on the core thread before the counterpart is dropped.
    fn destroy(&mut self, id: CoreObjectId, resources: &mut CoreResources) {
        let _ = (id, resources);
    }
}

/// Sim-side half of a dual object.
///
/// ## Example
///
/// ```rust,ignore
/// impl SimObject for Light {
///     type Core = CoreLight;
///
///     fn create_core(&self) -> CoreLight {
///         CoreLight { intensity: self.intensity }
///     }
///
///     fn sync_payload(&self, flags: DirtyFlags) -> LightSync {
///         LightSync {
///             intensity: flags.contains(INTENSITY).then_some(self.intensity),
///         }
///     }
/// }
/// ```
pub trait SimObject: 'static {
    /// The counterpart type constructed on the core thread.
    type Core: CoreCounterpart;

    /// Builds the counterpart from the current state. Runs on the sim thread;
    /// the result is moved into the construction command.
    fn create_core(&self) -> Self::Core;

    /// Snapshot of the facets named by `flags`.
    fn sync_payload(&self, flags: DirtyFlags) -> <Self::Core as CoreCounterpart>::Payload;

    /// Core objects that must be synced before this one in the same tick.
    fn core_dependencies(&self) -> Vec<CoreObjectId> {
        Vec::new()
    }
}

/// Object-safe view of a counterpart, as stored in the core context.
pub(crate) trait ErasedCounterpart: Send {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn counterpart_type(&self) -> &'static str;
    fn destroy(&mut self, id: CoreObjectId, resources: &mut CoreResources);
}

impl<C: CoreCounterpart> ErasedCounterpart for C {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn counterpart_type(&self) -> &'static str {
        type_name::<C>()
    }

    fn destroy(&mut self, id: CoreObjectId, resources: &mut CoreResources) {
        CoreCounterpart::destroy(self, id, resources);
    }
}
