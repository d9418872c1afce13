//! # Resource Listeners
//!
//! Objects that depend on loadable resources (a material on its shader and
//! textures, say) register as listeners. Resource lifecycle events only mark
//! dependents dirty; the once-per-tick [`ResourceListenerRegistry::update`]
//! compares what each dirty listener last saw with the current state and
//! calls back once per change.

mod registry;

use std::fmt;

pub use registry::ResourceListenerRegistry;

/// Identity of a loadable resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Wraps a raw id.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res#{}", self.0)
    }
}

/// Registration token returned by
/// [`ResourceListenerRegistry::register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Something that reacts to the resources it depends on.
pub trait ResourceListener: 'static {
    /// Resources this listener currently depends on.
    fn resource_dependencies(&self) -> Vec<ResourceId>;

    /// `resource` became available.
    fn notify_resource_loaded(&mut self, resource: ResourceId);

    /// `resource` was modified or reimported while loaded.
    fn notify_resource_changed(&mut self, resource: ResourceId);

    /// `resource` was unloaded.
    fn notify_resource_destroyed(&mut self, resource: ResourceId) {
        let _ = resource;
    }
}
