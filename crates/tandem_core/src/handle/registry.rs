//! # Handle Registry
//!
//! Maps instance ids to live objects and keeps old ids resolving after the
//! object behind them was replaced.
//!
//! ```text
//!   objects:    #7 -> obj'   #9 -> obj''
//!   redirects:  #3 -> #7     #5 -> #9     (always one hop)
//!
//!   remap_id(#7, #9):
//!   objects:    #9 -> obj''
//!   redirects:  #3 -> #9     #5 -> #9     #7 -> #9
//! ```
//!
//! Redirect targets are never themselves redirected, so `resolve` is at most
//! two map lookups however many remaps happened. Ids are handed out from a
//! monotonic counter and never reused.

use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::id::{Handle, InstanceId};
use crate::error::{HandleError, HandleResult};

/// Id registry with remapping. Sim-thread only.
pub struct HandleRegistry<T: ?Sized> {
    objects: HashMap<InstanceId, Weak<T>>,
    /// Retired id -> live canonical id.
    redirects: HashMap<InstanceId, InstanceId>,
    /// Canonical id -> ids redirected to it. Lets a remap collapse chains.
    redirected_from: HashMap<InstanceId, Vec<InstanceId>>,
    next_id: u64,
}

impl<T: ?Sized> HandleRegistry<T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty registry with room for `capacity` objects.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            objects: HashMap::with_capacity(capacity),
            redirects: HashMap::new(),
            redirected_from: HashMap::new(),
            next_id: 1,
        }
    }

    /// Registers `object` under a fresh id.
    pub fn register(&mut self, object: &Rc<T>) -> InstanceId {
        let id = InstanceId::new(self.next_id);
        self.next_id += 1;
        self.objects.insert(id, Rc::downgrade(object));
        trace!(instance = %id, "registered");
        id
    }

    /// Registers `object` and returns a typed handle to it.
    pub fn register_handle(&mut self, object: &Rc<T>) -> Handle<T> {
        Handle::new(self.register(object))
    }

    /// Registers `object` under a known id, e.g. one restored from disk.
    /// Fresh ids handed out later are always above `id`.
    ///
    /// # Errors
    ///
    /// - [`HandleError::IdInUse`] if `id` is registered, redirected, or
    ///   still the target of a redirect. [`prune`](Self::prune) releases
    ///   a target whose object is gone.
    /// - [`HandleError::UnknownId`] for [`InstanceId::NULL`].
    pub fn register_with_id(&mut self, id: InstanceId, object: &Rc<T>) -> HandleResult<()> {
        if id.is_null() {
            return Err(HandleError::UnknownId(id));
        }
        if self.objects.contains_key(&id)
            || self.redirects.contains_key(&id)
            || self.redirected_from.contains_key(&id)
        {
            return Err(HandleError::IdInUse(id));
        }
        self.objects.insert(id, Rc::downgrade(object));
        self.next_id = self.next_id.max(id.raw() + 1);
        trace!(instance = %id, "registered with known id");
        Ok(())
    }

    /// Removes the object registered under `id`. Handles holding `id`, or
    /// redirected to it, resolve to `None` afterwards.
    ///
    /// Returns false if nothing was registered under `id`.
    pub fn unregister(&mut self, id: InstanceId) -> bool {
        let removed = self.objects.remove(&id).is_some();
        if removed {
            trace!(instance = %id, "unregistered");
        }
        removed
    }

    /// The id `id` currently stands for: its redirect target, or itself.
    #[inline]
    #[must_use]
    pub fn canonical(&self, id: InstanceId) -> InstanceId {
        self.redirects.get(&id).copied().unwrap_or(id)
    }

    /// Looks up the live object for `id`, following a remap if there is one.
    ///
    /// `None` means the handle is stale: never registered, unregistered, or
    /// the object was dropped.
    #[must_use]
    pub fn resolve(&self, id: InstanceId) -> Option<Rc<T>> {
        self.objects.get(&self.canonical(id))?.upgrade()
    }

    /// [`resolve`](Self::resolve) for a typed handle.
    #[must_use]
    pub fn resolve_handle(&self, handle: Handle<T>) -> Option<Rc<T>> {
        self.resolve(handle.id())
    }

    /// Returns true if `id` resolves to a live object.
    #[must_use]
    pub fn contains(&self, id: InstanceId) -> bool {
        self.resolve(id).is_some()
    }

    /// Redirects `old` (and everything already redirected to `old`) to the
    /// object registered at `new`.
    ///
    /// `old` stops being a registration of its own. `new` may itself be a
    /// redirected id; the redirect lands on its target.
    ///
    /// # Errors
    ///
    /// - [`HandleError::RemapCycle`] if `new` is or leads back to `old`.
    /// - [`HandleError::UnknownId`] if nothing is registered at `new`.
    pub fn remap_id(&mut self, old: InstanceId, new: InstanceId) -> HandleResult<()> {
        let target = self.canonical(new);
        if old == new || target == old {
            return Err(HandleError::RemapCycle { old, new });
        }
        if !self.objects.contains_key(&target) {
            return Err(HandleError::UnknownId(new));
        }

        self.objects.remove(&old);
        if let Some(previous) = self.redirects.remove(&old) {
            self.detach(previous, old);
        }

        let mut moved = self.redirected_from.remove(&old).unwrap_or_default();
        for id in &moved {
            self.redirects.insert(*id, target);
        }
        self.redirects.insert(old, target);
        moved.push(old);
        let chained = moved.len() - 1;
        self.redirected_from.entry(target).or_default().extend(moved);

        debug!(%old, %new, %target, chained, "remapped instance id");
        Ok(())
    }

    fn detach(&mut self, target: InstanceId, id: InstanceId) {
        if let Some(sources) = self.redirected_from.get_mut(&target) {
            sources.retain(|&source| source != id);
            if sources.is_empty() {
                self.redirected_from.remove(&target);
            }
        }
    }

    /// Applies every pair of `mapping`, in ascending order of old id.
    ///
    /// Returns the number of remaps applied.
    ///
    /// # Errors
    ///
    /// The first failing remap. Pairs before it stay applied.
    pub fn apply_mapping(&mut self, mapping: &IdMapping) -> HandleResult<usize> {
        for (&old, &new) in &mapping.pairs {
            self.remap_id(old, new)?;
        }
        Ok(mapping.len())
    }

    /// Drops registrations whose object is gone and redirects that lead to
    /// nothing. Returns the number of entries removed.
    pub fn prune(&mut self) -> usize {
        let before = self.objects.len() + self.redirects.len();
        self.objects.retain(|_, object| object.strong_count() > 0);

        let dead: Vec<InstanceId> = self
            .redirected_from
            .keys()
            .filter(|target| !self.objects.contains_key(*target))
            .copied()
            .collect();
        for target in dead {
            if let Some(sources) = self.redirected_from.remove(&target) {
                for source in sources {
                    self.redirects.remove(&source);
                }
            }
        }

        let removed = before - (self.objects.len() + self.redirects.len());
        if removed > 0 {
            debug!(removed, "pruned handle registry");
        }
        removed
    }

    /// Number of registrations, live or not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Number of retired ids that redirect elsewhere.
    #[must_use]
    pub fn redirect_count(&self) -> usize {
        self.redirects.len()
    }
}

impl<T: ?Sized> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> std::fmt::Debug for HandleRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("objects", &self.objects.len())
            .field("redirects", &self.redirects.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

/// Old-to-new id pairs collected while loading, applied in one go.
///
/// ```rust,ignore
/// let mut mapping = IdMapping::new();
/// for saved in scene.objects {
///     let fresh = registry.register(&spawn(saved));
///     mapping.insert(InstanceId::new(saved.id), fresh);
/// }
/// registry.apply_mapping(&mapping)?;
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdMapping {
    pairs: BTreeMap<InstanceId, InstanceId>,
}

impl IdMapping {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `old -> new`, replacing an earlier entry for `old`.
    pub fn insert(&mut self, old: InstanceId, new: InstanceId) -> Option<InstanceId> {
        self.pairs.insert(old, new)
    }

    /// The new id recorded for `old`.
    #[must_use]
    pub fn get(&self, old: InstanceId) -> Option<InstanceId> {
        self.pairs.get(&old).copied()
    }

    /// Number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns true if no pair was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
