//! Listener bookkeeping and the per-tick notification pass.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::{ListenerId, ResourceId, ResourceListener};

/// What a listener has seen of one resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct ResourceState {
    loaded: bool,
    /// Bumped on every load and modification.
    revision: u64,
}

struct Entry {
    listener: Weak<RefCell<dyn ResourceListener>>,
    /// Dependencies as of the last update.
    dependencies: Vec<ResourceId>,
    observed: HashMap<ResourceId, ResourceState>,
    dirty: bool,
}

/// Tracks which listeners depend on which resources. Sim-thread only.
///
/// Listeners are held weakly: dropping one is enough to unregister it.
pub struct ResourceListenerRegistry {
    entries: BTreeMap<ListenerId, Entry>,
    /// Resource -> listeners that depended on it at their last update.
    dependents: HashMap<ResourceId, BTreeSet<ListenerId>>,
    resources: HashMap<ResourceId, ResourceState>,
    next_id: u64,
}

impl ResourceListenerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty registry with room for `capacity` resources.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            dependents: HashMap::with_capacity(capacity),
            resources: HashMap::with_capacity(capacity),
            next_id: 1,
        }
    }

    /// Registers `listener`. It starts dirty, so the next update reports
    /// every dependency that is already loaded.
    pub fn register<L: ResourceListener>(&mut self, listener: &Rc<RefCell<L>>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        let erased: Rc<RefCell<dyn ResourceListener>> = listener.clone();
        self.entries.insert(
            id,
            Entry {
                listener: Rc::downgrade(&erased),
                dependencies: Vec::new(),
                observed: HashMap::new(),
                dirty: true,
            },
        );
        trace!(listener = %id, "resource listener registered");
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let Some(entry) = self.entries.remove(&id) else {
            return false;
        };
        self.unlink(id, &entry.dependencies);
        trace!(listener = %id, "resource listener unregistered");
        true
    }

    /// Flags a listener whose dependency set changed.
    pub fn mark_listener_dirty(&mut self, id: ListenerId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.dirty = true;
        }
    }

    /// Returns true if the listener will be re-evaluated on the next update.
    #[must_use]
    pub fn is_listener_dirty(&self, id: ListenerId) -> bool {
        self.entries.get(&id).is_some_and(|entry| entry.dirty)
    }

    /// Number of registered listeners, including dropped ones not yet pruned.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if `resource` is currently loaded.
    #[must_use]
    pub fn is_loaded(&self, resource: ResourceId) -> bool {
        self.resources.get(&resource).is_some_and(|state| state.loaded)
    }

    /// `resource` finished loading. A reload counts as a change for
    /// listeners that saw the previous load.
    pub fn resource_loaded(&mut self, resource: ResourceId) {
        let state = self.resources.entry(resource).or_default();
        state.loaded = true;
        state.revision += 1;
        self.mark_dependents(resource);
    }

    /// `resource` was modified while loaded.
    pub fn resource_modified(&mut self, resource: ResourceId) {
        self.resources.entry(resource).or_default().revision += 1;
        self.mark_dependents(resource);
    }

    /// `resource` was unloaded.
    pub fn resource_unloaded(&mut self, resource: ResourceId) {
        if let Some(state) = self.resources.get_mut(&resource) {
            state.loaded = false;
        }
        self.mark_dependents(resource);
    }

    fn mark_dependents(&mut self, resource: ResourceId) {
        let Some(listeners) = self.dependents.get(&resource) else {
            return;
        };
        for id in listeners {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.dirty = true;
            }
        }
    }

    /// Re-evaluates every dirty listener and prunes dropped ones.
    ///
    /// Each change since the listener's last update is reported exactly
    /// once: loaded, changed (loaded and modified), or destroyed. Returns
    /// the number of callbacks made.
    pub fn update(&mut self) -> usize {
        self.prune();

        let dirty: Vec<ListenerId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.dirty)
            .map(|(&id, _)| id)
            .collect();

        let mut notified = 0;
        for id in dirty {
            let Some(listener) = self.entries.get(&id).and_then(|e| e.listener.upgrade()) else {
                continue;
            };

            let dependencies = listener.borrow().resource_dependencies();
            let mut observed = HashMap::with_capacity(dependencies.len());
            for &resource in &dependencies {
                let current = self.resources.get(&resource).copied().unwrap_or_default();
                let previous = self
                    .entries
                    .get(&id)
                    .and_then(|e| e.observed.get(&resource).copied())
                    .unwrap_or_default();

                let mut target = listener.borrow_mut();
                match (previous.loaded, current.loaded) {
                    (false, true) => {
                        target.notify_resource_loaded(resource);
                        notified += 1;
                    }
                    (true, true) if previous.revision != current.revision => {
                        target.notify_resource_changed(resource);
                        notified += 1;
                    }
                    (true, false) => {
                        target.notify_resource_destroyed(resource);
                        notified += 1;
                    }
                    _ => {}
                }
                observed.insert(resource, current);
            }

            let old = self
                .entries
                .get(&id)
                .map(|e| e.dependencies.clone())
                .unwrap_or_default();
            self.unlink(id, &old);
            for &resource in &dependencies {
                self.dependents.entry(resource).or_default().insert(id);
            }
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.dependencies = dependencies;
                entry.observed = observed;
                entry.dirty = false;
            }
        }

        if notified > 0 {
            debug!(notified, "resource listeners notified");
        }
        notified
    }

    fn prune(&mut self) {
        let dead: Vec<ListenerId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.listener.strong_count() == 0)
            .map(|(&id, _)| id)
            .collect();
        for id in dead {
            self.unregister(id);
        }
    }

    fn unlink(&mut self, id: ListenerId, dependencies: &[ResourceId]) {
        for resource in dependencies {
            if let Some(listeners) = self.dependents.get_mut(resource) {
                listeners.remove(&id);
                if listeners.is_empty() {
                    self.dependents.remove(resource);
                }
            }
        }
    }
}

impl Default for ResourceListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResourceListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceListenerRegistry")
            .field("listeners", &self.entries.len())
            .field("resources", &self.resources.len())
            .finish()
    }
}
