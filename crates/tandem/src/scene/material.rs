//! # Material
//!
//! A shader plus textures plus named parameters. The material listens for
//! its resources: the core side learns it is `ready` only once the shader
//! and every texture are loaded, and stops being ready as soon as one of
//! them unloads.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use tandem_core::{
    CommandResult, CoreCounterpart, CoreObject, CoreObjectId, CoreObjectManager, CoreResources,
    DirtyFlags, LifecycleState, ListenerId, ResourceId, ResourceListener,
    ResourceListenerRegistry, SimObject,
};
use tracing::debug;

use super::core_scene::{CoreScene, MaterialView, SceneEvent};

/// Shader parameters changed.
pub const PARAMS: DirtyFlags = DirtyFlags::custom(DirtyFlags::FIRST_CUSTOM_BIT);

/// Sim-side state of a material.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialState {
    /// Display name.
    pub name: String,
    /// Shader resource.
    pub shader: ResourceId,
    /// Texture resources.
    pub textures: Vec<ResourceId>,
    /// Named shader parameters.
    pub params: BTreeMap<String, f32>,
    /// Dependencies currently loaded.
    pub loaded: BTreeSet<ResourceId>,
}

impl MaterialState {
    /// True once the shader and every texture are loaded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.loaded.contains(&self.shader)
            && self.textures.iter().all(|t| self.loaded.contains(t))
    }
}

/// Sync payload for a material.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialSync {
    /// Facets this payload covers.
    pub flags: DirtyFlags,
    /// Set with [`PARAMS`].
    pub params: Option<BTreeMap<String, f32>>,
    /// Set with `GENERIC_STATE`.
    pub ready: Option<bool>,
}

/// Core-side counterpart of a material.
#[derive(Debug)]
pub struct CoreMaterial {
    id: CoreObjectId,
    view: MaterialView,
}

impl CoreMaterial {
    /// The backend's copy of the material.
    #[must_use]
    pub fn view(&self) -> &MaterialView {
        &self.view
    }

    fn publish(&self, resources: &mut CoreResources, event: SceneEvent) {
        if let Some(scene) = resources.get_mut::<CoreScene>() {
            scene.materials.insert(self.id, self.view.clone());
            scene.record(event);
        }
    }
}

impl CoreCounterpart for CoreMaterial {
    type Payload = MaterialSync;

    fn initialize(&mut self, id: CoreObjectId, resources: &mut CoreResources) {
        self.id = id;
        self.publish(resources, SceneEvent::Created(id));
    }

    fn apply_sync(&mut self, payload: MaterialSync, resources: &mut CoreResources) {
        if let Some(params) = payload.params {
            self.view.params = params;
        }
        if let Some(ready) = payload.ready {
            self.view.ready = ready;
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
            scene.materials.remove(&id);
            scene.record(SceneEvent::Destroyed(id));
        }
    }
}

impl SimObject for MaterialState {
    type Core = CoreMaterial;

    fn create_core(&self) -> CoreMaterial {
        CoreMaterial {
            id: CoreObjectId::new(0),
            view: MaterialView {
                params: self.params.clone(),
                ready: self.is_ready(),
                sync_count: 0,
            },
        }
    }

    fn sync_payload(&self, flags: DirtyFlags) -> MaterialSync {
        MaterialSync {
            flags,
            params: flags.contains(PARAMS).then(|| self.params.clone()),
            ready: flags
                .contains(DirtyFlags::GENERIC_STATE)
                .then(|| self.is_ready()),
        }
    }
}

/// A material shared between actors.
///
/// Lives behind `Rc<RefCell<_>>` so the listener registry can reach it.
#[derive(Debug)]
pub struct Material {
    object: CoreObject<MaterialState>,
    listener: Option<ListenerId>,
}

impl Material {
    /// Creates a material, queues its counterpart and registers it as a
    /// listener for `shader` and `textures`.
    ///
    /// # Errors
    ///
    /// The core thread has halted.
    pub fn create(
        objects: &CoreObjectManager,
        listeners: &mut ResourceListenerRegistry,
        name: impl Into<String>,
        shader: ResourceId,
        textures: Vec<ResourceId>,
    ) -> CommandResult<Rc<RefCell<Self>>> {
        let object = objects.create(MaterialState {
            name: name.into(),
            shader,
            textures,
            params: BTreeMap::new(),
            loaded: BTreeSet::new(),
        })?;
        let material = Rc::new(RefCell::new(Self {
            object,
            listener: None,
        }));
        let id = listeners.register(&material);
        material.borrow_mut().listener = Some(id);
        Ok(material)
    }

    /// Core identity.
    #[must_use]
    pub fn core_id(&self) -> CoreObjectId {
        self.object.id()
    }

    /// Listener registration, if registered.
    #[must_use]
    pub fn listener_id(&self) -> Option<ListenerId> {
        self.listener
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> String {
        self.object.state().name.clone()
    }

    /// True once the shader and every texture are loaded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.object.state().is_ready()
    }

    /// Current value of a parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<f32> {
        self.object.state().params.get(name).copied()
    }

    /// Sets a shader parameter.
    pub fn set_param(&self, name: impl Into<String>, value: f32) {
        let name = name.into();
        self.object.update(PARAMS, |state| {
            state.params.insert(name, value);
        });
    }

    /// Replaces the texture set. The registry re-reads dependencies on its
    /// next update.
    pub fn set_textures(&self, textures: Vec<ResourceId>, listeners: &mut ResourceListenerRegistry) {
        self.object.update(DirtyFlags::GENERIC_STATE, |state| {
            let shader = state.shader;
            state.loaded.retain(|r| *r == shader || textures.contains(r));
            state.textures = textures;
        });
        if let Some(id) = self.listener {
            listeners.mark_listener_dirty(id);
        }
    }

    /// Where the material is in its lifecycle.
    #[must_use]
    pub fn lifecycle(&self) -> LifecycleState {
        self.object.lifecycle()
    }

    /// The underlying dual object.
    #[must_use]
    pub fn core_object(&self) -> &CoreObject<MaterialState> {
        &self.object
    }
}

impl ResourceListener for Material {
    fn resource_dependencies(&self) -> Vec<ResourceId> {
        let state = self.object.state();
        let mut dependencies = Vec::with_capacity(state.textures.len() + 1);
        dependencies.push(state.shader);
        dependencies.extend_from_slice(&state.textures);
        dependencies
    }

    fn notify_resource_loaded(&mut self, resource: ResourceId) {
        debug!(material = %self.object.id(), %resource, "material dependency loaded");
        self.object.update(DirtyFlags::GENERIC_STATE, |state| {
            state.loaded.insert(resource);
        });
    }

    fn notify_resource_changed(&mut self, resource: ResourceId) {
        let _ = resource;
        self.object.mark_core_dirty(DirtyFlags::GENERIC_STATE);
    }

    fn notify_resource_destroyed(&mut self, resource: ResourceId) {
        self.object.update(DirtyFlags::GENERIC_STATE, |state| {
            state.loaded.remove(&resource);
        });
    }
}
