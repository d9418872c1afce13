//! Core-thread-confined state handed to every command.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;

use crate::object::{CoreCounterpart, CoreObjectId, ErasedCounterpart};

/// Type-keyed storage for backend state living on the core thread.
///
/// Rendering or audio backends park their state here (one value per type)
/// and counterparts reach it through the `resources` argument of
/// [`CoreCounterpart`] callbacks.
#[derive(Default)]
pub struct CoreResources {
    map: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl CoreResources {
    /// Stores `value`, returning the previous value of the same type.
    pub fn insert<T: Any + Send>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Removes and returns the value of type `T`.
    pub fn remove<T: Any + Send>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Borrows the value of type `T`.
    #[must_use]
    pub fn get<T: Any + Send>(&self) -> Option<&T> {
        self.map.get(&TypeId::of::<T>())?.downcast_ref::<T>()
    }

    /// Mutably borrows the value of type `T`.
    pub fn get_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.map.get_mut(&TypeId::of::<T>())?.downcast_mut::<T>()
    }

    /// Returns true if a value of type `T` is stored.
    #[must_use]
    pub fn contains<T: Any + Send>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }
}

/// Everything a command may touch on the core thread.
///
/// Owns every core-side counterpart, keyed by [`CoreObjectId`]. The sim thread
/// never holds a reference into this struct; it only reaches it by queueing a
/// command.
#[derive(Default)]
pub struct CoreContext {
    counterparts: HashMap<CoreObjectId, Box<dyn ErasedCounterpart>>,
    resources: CoreResources,
    command_index: u64,
}

impl CoreContext {
    /// Creates an empty context.
    ///
    /// The core thread creates its own; this is public for driving
    /// counterparts directly in tests and tools.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number of the command currently executing.
    #[inline]
    #[must_use]
    pub fn command_index(&self) -> u64 {
        self.command_index
    }

    #[inline]
    pub(crate) fn set_command_index(&mut self, index: u64) {
        self.command_index = index;
    }

    /// Backend state.
    #[must_use]
    pub fn resources(&self) -> &CoreResources {
        &self.resources
    }

    /// Mutable backend state.
    pub fn resources_mut(&mut self) -> &mut CoreResources {
        &mut self.resources
    }

    /// Number of live counterparts.
    #[must_use]
    pub fn counterpart_count(&self) -> usize {
        self.counterparts.len()
    }

    /// Returns true if a counterpart is constructed under `id`.
    #[must_use]
    pub fn contains_counterpart(&self, id: CoreObjectId) -> bool {
        self.counterparts.contains_key(&id)
    }

    /// Borrows the counterpart under `id` if it exists and is a `C`.
    #[must_use]
    pub fn counterpart<C: CoreCounterpart>(&self, id: CoreObjectId) -> Option<&C> {
        self.counterparts.get(&id)?.as_any().downcast_ref::<C>()
    }

    /// Mutably borrows the counterpart under `id` if it exists and is a `C`.
    pub fn counterpart_mut<C: CoreCounterpart>(&mut self, id: CoreObjectId) -> Option<&mut C> {
        self.counterparts.get_mut(&id)?.as_any_mut().downcast_mut::<C>()
    }

    /// Inserts and initializes a freshly constructed counterpart.
    ///
    /// # Panics
    ///
    /// If `id` is already constructed. That means the command order was
    /// violated and the core thread must stop.
    pub(crate) fn construct<C: CoreCounterpart>(&mut self, id: CoreObjectId, core: C) {
        assert!(
            !self.counterparts.contains_key(&id),
            "counterpart {id} constructed twice"
        );
        let mut core = Box::new(core);
        core.initialize(id, &mut self.resources);
        self.counterparts.insert(id, core);
    }

    /// Applies a sync payload to the counterpart under `id`.
    ///
    /// # Panics
    ///
    /// If the counterpart is missing or of another type.
    pub(crate) fn apply_sync<C: CoreCounterpart>(&mut self, id: CoreObjectId, payload: C::Payload) {
        let Some(entry) = self.counterparts.get_mut(&id) else {
            panic!("sync payload for {id} arrived with no counterpart constructed");
        };
        let found = entry.counterpart_type();
        match entry.as_any_mut().downcast_mut::<C>() {
            Some(core) => core.apply_sync(payload, &mut self.resources),
            None => panic!("counterpart {id} is a {found}, not a {}", type_name::<C>()),
        }
    }

    /// Tears down and drops the counterpart under `id`.
    ///
    /// # Panics
    ///
    /// If no counterpart is constructed under `id`.
    pub(crate) fn destroy_counterpart(&mut self, id: CoreObjectId) {
        let Some(mut core) = self.counterparts.remove(&id) else {
            panic!("destroy for {id} arrived with no counterpart constructed");
        };
        core.destroy(id, &mut self.resources);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    struct Counter {
        value: u32,
    }

    impl CoreCounterpart for Counter {
        type Payload = u32;

        fn initialize(&mut self, id: CoreObjectId, resources: &mut CoreResources) {
            if let Some(recorder) = resources.get_mut::<Recorder>() {
                recorder.events.push(format!("init {id}"));
            }
        }

        fn apply_sync(&mut self, payload: u32, _resources: &mut CoreResources) {
            self.value = payload;
        }

        fn destroy(&mut self, id: CoreObjectId, resources: &mut CoreResources) {
            if let Some(recorder) = resources.get_mut::<Recorder>() {
                recorder.events.push(format!("destroy {id}"));
            }
        }
    }

    #[test]
    fn test_resources_by_type() {
        let mut resources = CoreResources::default();
        assert!(resources.insert(5u32).is_none());
        assert_eq!(resources.insert(6u32), Some(5));
        assert_eq!(resources.get::<u32>(), Some(&6));
        assert!(!resources.contains::<u64>());
        assert_eq!(resources.remove::<u32>(), Some(6));
        assert!(resources.get::<u32>().is_none());
    }

    #[test]
    fn test_counterpart_lifecycle() {
        let mut ctx = CoreContext::new();
        ctx.resources_mut().insert(Recorder::default());
        let id = CoreObjectId::new(1);

        ctx.construct(id, Counter { value: 0 });
        assert!(ctx.contains_counterpart(id));

        ctx.apply_sync::<Counter>(id, 12);
        assert_eq!(ctx.counterpart::<Counter>(id).map(|c| c.value), Some(12));

        ctx.destroy_counterpart(id);
        assert_eq!(ctx.counterpart_count(), 0);

        let recorder = ctx.resources().get::<Recorder>().unwrap();
        assert_eq!(recorder.events, vec!["init core#1", "destroy core#1"]);
    }

    #[test]
    #[should_panic(expected = "no counterpart constructed")]
    fn test_sync_before_construct_is_fatal() {
        let mut ctx = CoreContext::new();
        ctx.apply_sync::<Counter>(CoreObjectId::new(9), 1);
    }

    #[test]
    #[should_panic(expected = "constructed twice")]
    fn test_double_construct_is_fatal() {
        let mut ctx = CoreContext::new();
        ctx.construct(CoreObjectId::new(2), Counter { value: 0 });
        ctx.construct(CoreObjectId::new(2), Counter { value: 0 });
    }
}
