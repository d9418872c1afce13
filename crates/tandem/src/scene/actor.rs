//! # Scene Actor
//!
//! A positioned, toggleable object with a core-side counterpart. Each setter
//! changes the sim state and marks only the facet it touched:
//!
//! | Setter                    | Flag            |
//! |---------------------------|-----------------|
//! | position/rotation/scale   | `TRANSFORM`     |
//! | `set_active`              | `ACTIVE`        |
//! | `set_mobility`            | `MOBILITY`      |
//! | `set_material`            | `GENERIC_STATE` |

use tandem_core::{
    CommandResult, CoreCounterpart, CoreObject, CoreObjectId, CoreObjectManager, CoreResources,
    DirtyFlags, LifecycleState, SimObject,
};
use tracing::warn;

use super::core_scene::{ActorView, CoreScene, SceneEvent};
use super::material::Material;

/// Position, rotation (quaternion, xyzw) and scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// World position.
    pub position: [f32; 3],
    /// Rotation quaternion.
    pub rotation: [f32; 4],
    /// Per-axis scale.
    pub scale: [f32; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
        }
    }
}

/// Whether the backend may bake the actor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mobility {
    /// Never moves after creation.
    Static,
    /// May move every frame.
    #[default]
    Movable,
}

/// Sim-side state of an actor.
#[derive(Clone, Debug, PartialEq)]
pub struct ActorState {
    /// Display name.
    pub name: String,
    /// Current transform.
    pub transform: Transform,
    /// Enabled flag.
    pub active: bool,
    /// Static or movable.
    pub mobility: Mobility,
    /// Core id of the assigned material.
    pub material: Option<CoreObjectId>,
}

impl ActorState {
    fn new(name: String) -> Self {
        Self {
            name,
            transform: Transform::default(),
            active: true,
            mobility: Mobility::default(),
            material: None,
        }
    }
}

/// Sync payload: only the flagged facets are filled in.
#[derive(Clone, Debug, PartialEq)]
pub struct ActorSync {
    /// Facets this payload covers.
    pub flags: DirtyFlags,
    /// Set with `TRANSFORM`.
    pub transform: Option<Transform>,
    /// Set with `ACTIVE`.
    pub active: Option<bool>,
    /// Set with `MOBILITY`.
    pub mobility: Option<Mobility>,
    /// Set with `GENERIC_STATE`.
    pub material: Option<Option<CoreObjectId>>,
}

/// Core-side counterpart of an actor.
#[derive(Debug)]
pub struct CoreActor {
    id: CoreObjectId,
    view: ActorView,
}

impl CoreActor {
    /// The backend's copy of the actor.
    #[must_use]
    pub fn view(&self) -> &ActorView {
        &self.view
    }

    fn publish(&self, resources: &mut CoreResources, event: SceneEvent) {
        if let Some(scene) = resources.get_mut::<CoreScene>() {
            scene.actors.insert(self.id, self.view.clone());
            scene.record(event);
        }
    }
}

impl CoreCounterpart for CoreActor {
    type Payload = ActorSync;

    fn initialize(&mut self, id: CoreObjectId, resources: &mut CoreResources) {
        self.id = id;
        self.publish(resources, SceneEvent::Created(id));
    }

    fn apply_sync(&mut self, payload: ActorSync, resources: &mut CoreResources) {
        if let Some(transform) = payload.transform {
            self.view.transform = transform;
        }
        if let Some(active) = payload.active {
            self.view.active = active;
        }
        if let Some(mobility) = payload.mobility {
            self.view.mobility = mobility;
        }
        if let Some(material) = payload.material {
            self.view.material = material;
        }
        self.view.sync_count += 1;
        self.publish(
            resources,
            SceneEvent::Synced {
                id: self.id,
                flags: payload.flags,
            },
        );
    }

    fn destroy(&mut self, id: CoreObjectId, resources: &mut CoreResources) {
        if let Some(scene) = resources.get_mut::<CoreScene>() {
            scene.actors.remove(&id);
            scene.record(SceneEvent::Destroyed(id));
        }
    }
}

impl SimObject for ActorState {
    type Core = CoreActor;

    fn create_core(&self) -> CoreActor {
        CoreActor {
            id: CoreObjectId::new(0),
            view: ActorView {
                transform: self.transform,
                active: self.active,
                mobility: self.mobility,
                material: self.material,
                sync_count: 0,
            },
        }
    }

    fn sync_payload(&self, flags: DirtyFlags) -> ActorSync {
        ActorSync {
            flags,
            transform: flags.contains(DirtyFlags::TRANSFORM).then_some(self.transform),
            active: flags.contains(DirtyFlags::ACTIVE).then_some(self.active),
            mobility: flags.contains(DirtyFlags::MOBILITY).then_some(self.mobility),
            material: flags
                .contains(DirtyFlags::GENERIC_STATE)
                .then_some(self.material),
        }
    }

    fn core_dependencies(&self) -> Vec<CoreObjectId> {
        self.material.into_iter().collect()
    }
}

/// An actor in the scene.
#[derive(Debug)]
pub struct SceneActor {
    object: CoreObject<ActorState>,
}

impl SceneActor {
    /// Creates an actor and queues its counterpart.
    ///
    /// # Errors
    ///
    /// The core thread has halted.
    pub fn spawn(objects: &CoreObjectManager, name: impl Into<String>) -> CommandResult<Self> {
        Ok(Self {
            object: objects.create(ActorState::new(name.into()))?,
        })
    }

    /// Creates an actor without queueing its counterpart. Configure it, then
    /// call [`SceneActor::initialize`].
    #[must_use]
    pub fn spawn_uninitialized(objects: &CoreObjectManager, name: impl Into<String>) -> Self {
        Self {
            object: objects.create_uninitialized(ActorState::new(name.into())),
        }
    }

    /// Queues the counterpart of an actor made with
    /// [`spawn_uninitialized`](Self::spawn_uninitialized).
    ///
    /// # Errors
    ///
    /// The core thread has halted.
    pub fn initialize(&self) -> CommandResult<()> {
        self.object.initialize()
    }

    /// Core identity.
    #[must_use]
    pub fn core_id(&self) -> CoreObjectId {
        self.object.id()
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> String {
        self.object.state().name.clone()
    }

    /// Current transform.
    #[must_use]
    pub fn transform(&self) -> Transform {
        self.object.state().transform
    }

    /// Current position.
    #[must_use]
    pub fn position(&self) -> [f32; 3] {
        self.object.state().transform.position
    }

    /// Moves the actor.
    pub fn set_position(&self, x: f32, y: f32, z: f32) {
        self.object.update(DirtyFlags::TRANSFORM, |state| {
            if state.mobility == Mobility::Static {
                warn!(actor = %state.name, "moving a static actor");
            }
            state.transform.position = [x, y, z];
        });
    }

    /// Rotates the actor.
    pub fn set_rotation(&self, rotation: [f32; 4]) {
        self.object
            .update(DirtyFlags::TRANSFORM, |state| state.transform.rotation = rotation);
    }

    /// Scales the actor.
    pub fn set_scale(&self, scale: [f32; 3]) {
        self.object
            .update(DirtyFlags::TRANSFORM, |state| state.transform.scale = scale);
    }

    /// Returns true if the actor is enabled.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.object.state().active
    }

    /// Enables or disables the actor. Setting the current value is a no-op.
    pub fn set_active(&self, active: bool) {
        if self.is_active() != active {
            self.object
                .update(DirtyFlags::ACTIVE, |state| state.active = active);
        }
    }

    /// Current mobility.
    #[must_use]
    pub fn mobility(&self) -> Mobility {
        self.object.state().mobility
    }

    /// Changes mobility. Setting the current value is a no-op.
    pub fn set_mobility(&self, mobility: Mobility) {
        if self.mobility() != mobility {
            self.object
                .update(DirtyFlags::MOBILITY, |state| state.mobility = mobility);
        }
    }

    /// Assigns `material`. Its counterpart is synced ahead of this actor's
    /// from then on.
    pub fn set_material(&self, material: &Material) {
        let id = material.core_id();
        self.object
            .update(DirtyFlags::GENERIC_STATE, |state| state.material = Some(id));
    }

    /// Marks facets dirty without changing state, e.g. to force a resend.
    pub fn mark_core_dirty(&self, flags: DirtyFlags) {
        self.object.mark_core_dirty(flags);
    }

    /// Where the actor is in its lifecycle.
    #[must_use]
    pub fn lifecycle(&self) -> LifecycleState {
        self.object.lifecycle()
    }

    /// The underlying dual object.
    #[must_use]
    pub fn core_object(&self) -> &CoreObject<ActorState> {
        &self.object
    }

    /// Queues destruction of the counterpart. Dropping the actor does the
    /// same.
    pub fn destroy(&self) {
        self.object.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core_actor() -> (CoreActor, CoreResources) {
        let mut resources = CoreResources::default();
        resources.insert(CoreScene::default());
        let mut core = ActorState::new("core".into()).create_core();
        core.initialize(CoreObjectId::new(7), &mut resources);
        (core, resources)
    }

    #[test]
    fn test_payload_carries_flagged_facets_only() {
        let mut state = ActorState::new("a".into());
        state.transform.position = [1.0, 2.0, 3.0];
        state.active = false;

        let payload = state.sync_payload(DirtyFlags::TRANSFORM);
        assert_eq!(payload.transform.map(|t| t.position), Some([1.0, 2.0, 3.0]));
        assert!(payload.active.is_none());
        assert!(payload.mobility.is_none());
        assert!(payload.material.is_none());
    }

    #[test]
    fn test_apply_sync_updates_view() {
        let (mut core, mut resources) = core_actor();
        let mut state = ActorState::new("a".into());
        state.active = false;
        state.mobility = Mobility::Static;

        core.apply_sync(
            state.sync_payload(DirtyFlags::ACTIVE | DirtyFlags::MOBILITY),
            &mut resources,
        );

        assert!(!core.view().active);
        assert_eq!(core.view().mobility, Mobility::Static);
        assert_eq!(core.view().sync_count, 1);

        let scene = resources.get::<CoreScene>().unwrap();
        assert_eq!(scene.actors[&CoreObjectId::new(7)], *core.view());
        assert_eq!(
            scene.syncs_of(CoreObjectId::new(7)),
            vec![DirtyFlags::ACTIVE | DirtyFlags::MOBILITY]
        );
    }

    #[test]
    fn test_destroy_removes_from_scene() {
        let (mut core, mut resources) = core_actor();
        core.destroy(CoreObjectId::new(7), &mut resources);

        let scene = resources.get::<CoreScene>().unwrap();
        assert!(scene.actors.is_empty());
        assert_eq!(scene.events().back(), Some(&SceneEvent::Destroyed(CoreObjectId::new(7))));
    }

    #[test]
    fn test_material_is_a_dependency() {
        let mut state = ActorState::new("a".into());
        assert!(state.core_dependencies().is_empty());
        state.material = Some(CoreObjectId::new(3));
        assert_eq!(state.core_dependencies(), vec![CoreObjectId::new(3)]);
    }
}
