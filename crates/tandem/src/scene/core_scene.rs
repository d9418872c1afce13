//! Core-thread view of the scene.
//!
//! Stands where a rendering backend would sit: counterparts write into it
//! from the core thread, and tools read a cloned snapshot back through an
//! [`AsyncOp`](tandem_core::AsyncOp).

use std::collections::{BTreeMap, VecDeque};

use tandem_core::{CoreObjectId, DirtyFlags};

use super::actor::{Mobility, Transform};

/// What the backend knows about one actor.
#[derive(Clone, Debug, PartialEq)]
pub struct ActorView {
    /// Last synced transform.
    pub transform: Transform,
    /// Last synced active flag.
    pub active: bool,
    /// Last synced mobility.
    pub mobility: Mobility,
    /// Core id of the assigned material.
    pub material: Option<CoreObjectId>,
    /// Sync payloads applied so far.
    pub sync_count: u32,
}

/// What the backend knows about one material.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialView {
    /// Last synced shader parameters.
    pub params: BTreeMap<String, f32>,
    /// True once the shader and every texture are loaded.
    pub ready: bool,
    /// Sync payloads applied so far.
    pub sync_count: u32,
}

/// Something that happened on the core thread, in execution order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SceneEvent {
    /// A counterpart was constructed.
    Created(CoreObjectId),
    /// A sync payload was applied, covering `flags`.
    Synced {
        /// Target object.
        id: CoreObjectId,
        /// Facets carried by the payload.
        flags: DirtyFlags,
    },
    /// A counterpart was torn down.
    Destroyed(CoreObjectId),
}

/// Backend state kept in the core context's resources.
///
/// The event log is a ring: once `event_capacity` events are held, each new
/// one evicts the oldest.
#[derive(Clone, Debug, PartialEq)]
pub struct CoreScene {
    /// Live actors.
    pub actors: BTreeMap<CoreObjectId, ActorView>,
    /// Live materials.
    pub materials: BTreeMap<CoreObjectId, MaterialView>,
    events: VecDeque<SceneEvent>,
    event_capacity: usize,
    recorded: u64,
}

impl CoreScene {
    /// Events kept by [`CoreScene::default`].
    pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

    /// Creates an empty scene keeping the last `capacity` events (at least
    /// one).
    #[must_use]
    pub fn with_event_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            actors: BTreeMap::new(),
            materials: BTreeMap::new(),
            events: VecDeque::with_capacity(capacity.min(Self::DEFAULT_EVENT_CAPACITY)),
            event_capacity: capacity,
            recorded: 0,
        }
    }

    /// Appends to the event log, evicting the oldest event when full.
    pub fn record(&mut self, event: SceneEvent) {
        if self.events.len() == self.event_capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
        self.recorded += 1;
    }

    /// Retained events, oldest first.
    #[must_use]
    pub fn events(&self) -> &VecDeque<SceneEvent> {
        &self.events
    }

    /// Events recorded since startup, evicted ones included.
    #[must_use]
    pub fn recorded_events(&self) -> u64 {
        self.recorded
    }

    /// Most events the log retains.
    #[must_use]
    pub fn event_capacity(&self) -> usize {
        self.event_capacity
    }

    /// Retained sync events for `id`.
    #[must_use]
    pub fn syncs_of(&self, id: CoreObjectId) -> Vec<DirtyFlags> {
        self.events
            .iter()
            .filter_map(|event| match event {
                SceneEvent::Synced { id: target, flags } if *target == id => Some(*flags),
                _ => None,
            })
            .collect()
    }

    /// Index of the first retained occurrence of `event`.
    #[must_use]
    pub fn event_index(&self, event: &SceneEvent) -> Option<usize> {
        self.events.iter().position(|e| e == event)
    }
}

impl Default for CoreScene {
    fn default() -> Self {
        Self::with_event_capacity(Self::DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_evicts_oldest() {
        let mut scene = CoreScene::with_event_capacity(3);
        for raw in 1..=5 {
            scene.record(SceneEvent::Created(CoreObjectId::new(raw)));
        }

        let kept: Vec<_> = scene.events().iter().cloned().collect();
        assert_eq!(
            kept,
            vec![
                SceneEvent::Created(CoreObjectId::new(3)),
                SceneEvent::Created(CoreObjectId::new(4)),
                SceneEvent::Created(CoreObjectId::new(5)),
            ]
        );
        assert_eq!(scene.recorded_events(), 5);
        assert_eq!(scene.event_index(&SceneEvent::Created(CoreObjectId::new(1))), None);
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let mut scene = CoreScene::with_event_capacity(0);
        scene.record(SceneEvent::Created(CoreObjectId::new(1)));
        scene.record(SceneEvent::Destroyed(CoreObjectId::new(1)));
        assert_eq!(scene.event_capacity(), 1);
        assert_eq!(
            scene.events().back(),
            Some(&SceneEvent::Destroyed(CoreObjectId::new(1)))
        );
    }
}
