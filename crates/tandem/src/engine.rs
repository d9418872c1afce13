//! # Engine
//!
//! Owns every core service and drives the per-tick order:
//!
//! ```text
//! tick()
//!   1. DeferredCalls::drain            callbacks queued since last tick
//!   2. ResourceListenerRegistry::update  loaded/changed/destroyed fan-out
//!   3. CoreObjectManager::sync_to_core   one payload per dirty object
//! ```
//!
//! Listener callbacks may dirty objects, and deferred calls may load
//! resources, so each step feeds the next within the same tick.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use tandem_core::{
    AsyncOp, AsyncOpError, CommandQueue, CoreObjectManager, CoreThread, CoreThreadStats,
    DeferredCalls, EngineConfig, Handle, HandleRegistry, IdMapping, InstanceId, ResourceId,
    ResourceListenerRegistry, SyncStats,
};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::scene::{CoreScene, Material, SceneActor};

/// What one [`Engine::tick`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame number, starting at 1.
    pub frame: u64,
    /// Deferred callbacks run.
    pub deferred_calls: usize,
    /// Listener callbacks made.
    pub listener_notifications: usize,
    /// Dirty sync counters.
    pub sync: SyncStats,
    /// Sim-side time spent in the tick, in microseconds.
    pub total_us: u64,
}

/// The application context.
///
/// Sim-thread only. The core thread is joined when the engine is shut down
/// or dropped.
pub struct Engine {
    config: EngineConfig,
    objects: CoreObjectManager,
    deferred: DeferredCalls,
    listeners: ResourceListenerRegistry,
    handles: HandleRegistry<dyn Any>,
    frame: u64,
    // Declared last: joined after every sim-side service is gone.
    core: CoreThread,
}

impl Engine {
    /// Validates `config`, starts the core thread and installs an empty
    /// [`CoreScene`] on it.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Config`] if `config` is invalid.
    /// - [`EngineError::Command`] if the core thread could not start.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let core = CoreThread::spawn(config.core_thread.clone())?;
        let event_capacity = config.event_log_capacity;
        core.queue().submit(move |ctx| {
            ctx.resources_mut()
                .insert(CoreScene::with_event_capacity(event_capacity));
        })?;

        info!(
            sync_mode = ?config.object_sync.mode,
            thread = %config.core_thread.thread_name,
            "engine started"
        );

        Ok(Self {
            objects: CoreObjectManager::new(core.queue().clone(), config.object_sync.clone()),
            deferred: DeferredCalls::new(),
            listeners: ResourceListenerRegistry::with_capacity(config.listener_capacity),
            handles: HandleRegistry::with_capacity(config.handle_capacity),
            frame: 0,
            config,
            core,
        })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Dual-object factory and dirty set.
    #[must_use]
    pub fn objects(&self) -> &CoreObjectManager {
        &self.objects
    }

    /// Deferred call queue.
    #[must_use]
    pub fn deferred(&self) -> &DeferredCalls {
        &self.deferred
    }

    /// Resource listener registry.
    #[must_use]
    pub fn listeners(&self) -> &ResourceListenerRegistry {
        &self.listeners
    }

    /// Mutable access for resource lifecycle events.
    pub fn listeners_mut(&mut self) -> &mut ResourceListenerRegistry {
        &mut self.listeners
    }

    /// Queue to the core thread.
    #[must_use]
    pub fn queue(&self) -> &CommandQueue {
        self.core.queue()
    }

    /// The core thread.
    #[must_use]
    pub fn core(&self) -> &CoreThread {
        &self.core
    }

    /// Frames ticked so far.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Creates a scene actor and queues its counterpart.
    ///
    /// # Errors
    ///
    /// The core thread has halted.
    pub fn spawn_actor(&self, name: impl Into<String>) -> EngineResult<SceneActor> {
        Ok(SceneActor::spawn(&self.objects, name)?)
    }

    /// Creates a material listening on `shader` and `textures`.
    ///
    /// # Errors
    ///
    /// The core thread has halted.
    pub fn create_material(
        &mut self,
        name: impl Into<String>,
        shader: ResourceId,
        textures: Vec<ResourceId>,
    ) -> EngineResult<Rc<RefCell<Material>>> {
        Ok(Material::create(
            &self.objects,
            &mut self.listeners,
            name,
            shader,
            textures,
        )?)
    }

    /// Registers `object` under a fresh id.
    pub fn register<T: Any>(&mut self, object: &Rc<T>) -> Handle<T> {
        let erased: Rc<dyn Any> = object.clone();
        Handle::new(self.handles.register(&erased))
    }

    /// Registers `object` under a persisted id.
    ///
    /// # Errors
    ///
    /// [`HandleError::IdInUse`](tandem_core::HandleError::IdInUse) if `id` is
    /// taken.
    pub fn register_with_id<T: Any>(&mut self, id: InstanceId, object: &Rc<T>) -> EngineResult<Handle<T>> {
        let erased: Rc<dyn Any> = object.clone();
        self.handles.register_with_id(id, &erased)?;
        Ok(Handle::new(id))
    }

    /// Resolves `handle`, following remaps. `None` if the object is gone.
    #[must_use]
    pub fn resolve<T: Any>(&self, handle: Handle<T>) -> Option<Rc<T>> {
        self.handles.resolve(handle.id())?.downcast::<T>().ok()
    }

    /// Redirects every handle holding `old` to the object at `new`.
    ///
    /// # Errors
    ///
    /// See [`HandleRegistry::remap_id`].
    pub fn remap_id(&mut self, old: InstanceId, new: InstanceId) -> EngineResult<()> {
        Ok(self.handles.remap_id(old, new)?)
    }

    /// Applies a batch of remaps collected during a load pass.
    ///
    /// # Errors
    ///
    /// Stops at the first failing pair.
    pub fn apply_mapping(&mut self, mapping: &IdMapping) -> EngineResult<usize> {
        Ok(self.handles.apply_mapping(mapping)?)
    }

    /// Drops a registration.
    pub fn unregister(&mut self, id: InstanceId) -> bool {
        self.handles.unregister(id)
    }

    /// The handle table.
    #[must_use]
    pub fn handles(&self) -> &HandleRegistry<dyn Any> {
        &self.handles
    }

    /// Runs one sim tick.
    ///
    /// # Errors
    ///
    /// The core thread halted before the sync could be queued.
    pub fn tick(&mut self) -> EngineResult<FrameStats> {
        let start = Instant::now();
        self.frame += 1;

        let deferred_calls = self.deferred.drain();
        let listener_notifications = self.listeners.update();
        let sync = self.objects.sync_to_core()?;

        let stats = FrameStats {
            frame: self.frame,
            deferred_calls,
            listener_notifications,
            sync,
            total_us: u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX),
        };
        debug!(
            frame = stats.frame,
            deferred = deferred_calls,
            notified = listener_notifications,
            synced = sync.synced,
            "tick"
        );
        Ok(stats)
    }

    /// Blocks until everything queued so far has run on the core thread.
    ///
    /// # Errors
    ///
    /// The core thread halted.
    pub fn flush(&self) -> EngineResult<()> {
        Ok(self.core.flush()?)
    }

    /// Clones the core thread's scene. Reflects every command queued before
    /// the call.
    ///
    /// # Errors
    ///
    /// The core thread halted.
    pub fn scene_snapshot(&self) -> EngineResult<CoreScene> {
        let op = self.core.queue().submit_with_result(|ctx| {
            ctx.resources()
                .get::<CoreScene>()
                .cloned()
                .unwrap_or_default()
        })?;
        self.wait(&op)?;
        Ok(op.return_value::<CoreScene>()?)
    }

    /// Blocks on `op`, reporting the halt reason if its command never ran.
    ///
    /// # Errors
    ///
    /// [`EngineError::Command`] with the recorded failure when the core thread
    /// halted, otherwise the op's own error.
    pub fn wait(&self, op: &AsyncOp) -> EngineResult<()> {
        match op.block_until_complete() {
            Ok(()) => Ok(()),
            Err(AsyncOpError::Abandoned) => Err(self
                .core
                .queue()
                .failure()
                .map_or(EngineError::AsyncOp(AsyncOpError::Abandoned), EngineError::Command)),
            Err(err) => Err(err.into()),
        }
    }

    /// Runs the remaining queued commands and joins the core thread.
    ///
    /// # Errors
    ///
    /// The failure that halted the core thread, if any.
    pub fn shutdown(self) -> EngineResult<CoreThreadStats> {
        let frames = self.frame;
        let Self { core, .. } = self;
        let stats = core.shutdown()?;
        info!(frames, executed = stats.executed, "engine stopped");
        Ok(stats)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("frame", &self.frame)
            .field("live_objects", &self.objects.live_count())
            .field("dirty", &self.objects.dirty_count())
            .field("listeners", &self.listeners.listener_count())
            .field("handles", &self.handles.len())
            .field("core", &self.core)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::{CommandError, DirtyFlags, SyncMode};

    #[test]
    fn test_tick_order() {
        let mut engine = Engine::new(EngineConfig::default()).unwrap();
        let actor = engine.spawn_actor("a").unwrap();

        let deferred_actor = Rc::new(actor);
        let captured = Rc::clone(&deferred_actor);
        engine
            .deferred()
            .queue_deferred_call(move || captured.set_position(1.0, 2.0, 3.0));

        let stats = engine.tick().unwrap();
        assert_eq!(stats.frame, 1);
        assert_eq!(stats.deferred_calls, 1);
        // Moved by the deferred call and synced in the same tick.
        assert_eq!(stats.sync.synced, 1);

        let scene = engine.scene_snapshot().unwrap();
        let view = &scene.actors[&deferred_actor.core_id()];
        assert_eq!(view.transform.position, [1.0, 2.0, 3.0]);
        assert_eq!(view.sync_count, 1);
    }

    #[test]
    fn test_clean_tick_submits_nothing() {
        let mut engine = Engine::new(EngineConfig::default()).unwrap();
        let actor = engine.spawn_actor("a").unwrap();
        engine.tick().unwrap();

        actor.mark_core_dirty(DirtyFlags::NONE);
        let stats = engine.tick().unwrap();
        assert_eq!(stats.sync.commands, 0);
    }

    #[test]
    fn test_per_object_mode() {
        let mut config = EngineConfig::default();
        config.object_sync.mode = SyncMode::PerObject;
        let mut engine = Engine::new(config).unwrap();
        let a = engine.spawn_actor("a").unwrap();
        let b = engine.spawn_actor("b").unwrap();
        a.set_active(false);
        b.set_active(false);

        let stats = engine.tick().unwrap();
        assert_eq!(stats.sync.commands, 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.core_thread.thread_name = String::new();
        assert!(matches!(Engine::new(config), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_typed_handles() {
        let mut engine = Engine::new(EngineConfig::default()).unwrap();
        let value = Rc::new(5_u32);
        let handle = engine.register(&value);
        assert_eq!(engine.resolve(handle).as_deref(), Some(&5));

        // Same id, wrong type.
        assert!(engine.resolve(handle.cast::<String>()).is_none());
    }

    #[test]
    fn test_event_log_is_bounded() {
        let config = EngineConfig {
            event_log_capacity: 8,
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(config).unwrap();
        let actor = engine.spawn_actor("a").unwrap();
        for step in 0..20u8 {
            actor.set_position(f32::from(step), 0.0, 0.0);
            engine.tick().unwrap();
        }

        let scene = engine.scene_snapshot().unwrap();
        assert_eq!(scene.events().len(), 8);
        assert_eq!(scene.recorded_events(), 21);
        assert_eq!(scene.actors[&actor.core_id()].transform.position[0], 19.0);
    }

    #[test]
    fn test_wait_reports_panic_of_the_awaited_command() {
        for _ in 0..50 {
            let engine = Engine::new(EngineConfig::default()).unwrap();
            let op = engine
                .queue()
                .submit_with_result(|_| -> u8 { panic!("bad query") })
                .unwrap();

            match engine.wait(&op) {
                Err(EngineError::Command(CommandError::CommandPanicked { message, .. })) => {
                    assert_eq!(message, "bad query");
                }
                other => panic!("expected the recorded panic, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_shutdown_reports_stats() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        engine.flush().unwrap();
        let stats = engine.shutdown().unwrap();
        assert!(stats.executed >= 2);
        assert_eq!(stats.pending(), 0);
    }
}
