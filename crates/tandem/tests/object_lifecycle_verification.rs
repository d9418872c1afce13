//! # Object Lifecycle Verification Tests
//!
//! Dual objects from construction to teardown:
//!
//! 1. **End to end**: construct, dirty, sync, observe through a barrier
//! 2. **Convergence**: any number of marks collapse into one payload
//! 3. **Ordering**: construction, syncs and destruction arrive in order,
//!    dependencies ahead of dependents
//! 4. **Listeners**: resource events reach the core side within one tick
//!
//! Run with: cargo test --test object_lifecycle_verification -- --nocapture

use tandem::{
    CoreScene, DirtyFlags, Engine, EngineConfig, Mobility, ResourceId, SceneActor, SceneEvent,
};
use tandem_core::{
    CoreObjectManager, CoreThread, CoreThreadConfig, LifecycleState, ObjectSyncConfig,
};

const SHADER: ResourceId = ResourceId::new(10);
const ALBEDO: ResourceId = ResourceId::new(11);

fn engine() -> Engine {
    Engine::new(EngineConfig::default()).unwrap()
}

// ============================================================================
// END TO END
// ============================================================================

#[test]
fn verify_end_to_end_single_sync() {
    let core = CoreThread::spawn(CoreThreadConfig::default()).unwrap();
    core.queue()
        .submit(|ctx| {
            ctx.resources_mut().insert(CoreScene::default());
        })
        .unwrap();
    let objects = CoreObjectManager::new(core.queue().clone(), ObjectSyncConfig::default());

    let actor = SceneActor::spawn(&objects, "o").unwrap();
    actor.mark_core_dirty(DirtyFlags::TRANSFORM);
    actor.set_position(5.0, 0.0, 0.0);
    objects.sync_to_core().unwrap();

    // Trailing no-op query used as a barrier.
    let barrier = core
        .queue()
        .submit_with_result(|ctx| ctx.resources().get::<CoreScene>().cloned())
        .unwrap();
    barrier.block_until_complete().unwrap();
    let scene = barrier.return_value::<Option<CoreScene>>().unwrap().unwrap();

    assert_eq!(scene.syncs_of(actor.core_id()), vec![DirtyFlags::TRANSFORM]);
    let view = &scene.actors[&actor.core_id()];
    assert_eq!(view.transform.position, [5.0, 0.0, 0.0]);
    assert_eq!(view.sync_count, 1);
    assert!(!actor.core_object().is_core_dirty());
    assert_eq!(objects.dirty_count(), 0);
}

#[test]
fn verify_block_until_core_initialized() {
    let engine = engine();
    let actor = engine.spawn_actor("a").unwrap();
    actor.core_object().block_until_core_initialized().unwrap();
    assert_eq!(actor.lifecycle(), LifecycleState::Synced);

    let late = SceneActor::spawn_uninitialized(engine.objects(), "late");
    assert_eq!(late.lifecycle(), LifecycleState::Uninitialized);
    assert!(late.core_object().block_until_core_initialized().is_err());
}

// ============================================================================
// CONVERGENCE
// ============================================================================

#[test]
fn verify_second_manager_on_engine_queue_gets_distinct_ids() {
    let mut engine = engine();
    let tools = CoreObjectManager::new(engine.queue().clone(), ObjectSyncConfig::default());

    let a = engine.spawn_actor("a").unwrap();
    let b = SceneActor::spawn(&tools, "b").unwrap();
    assert_ne!(a.core_id(), b.core_id());

    b.set_position(2.0, 0.0, 0.0);
    engine.tick().unwrap();
    tools.sync_to_core().unwrap();
    engine.flush().unwrap();

    let scene = engine.scene_snapshot().unwrap();
    assert_eq!(scene.actors.len(), 2);
    assert_eq!(scene.actors[&b.core_id()].transform.position, [2.0, 0.0, 0.0]);
}

#[test]
fn verify_dirty_flag_convergence() {
    let mut engine = engine();
    let actor = engine.spawn_actor("a").unwrap();

    for i in 0..50 {
        actor.set_position(i as f32, 0.0, 0.0);
        actor.mark_core_dirty(DirtyFlags::TRANSFORM);
    }
    actor.set_mobility(Mobility::Static);
    actor.set_active(false);
    assert_eq!(engine.objects().dirty_count(), 1);

    let stats = engine.tick().unwrap();
    assert_eq!(stats.sync.synced, 1);
    assert_eq!(engine.objects().dirty_count(), 0);

    let scene = engine.scene_snapshot().unwrap();
    assert_eq!(
        scene.syncs_of(actor.core_id()),
        vec![DirtyFlags::TRANSFORM | DirtyFlags::MOBILITY | DirtyFlags::ACTIVE]
    );
    let view = &scene.actors[&actor.core_id()];
    assert_eq!(view.transform.position, [49.0, 0.0, 0.0]);
    assert_eq!(view.mobility, Mobility::Static);
    assert!(!view.active);
}

#[test]
fn verify_flags_set_before_initialize_are_synced() {
    let mut engine = engine();
    let actor = SceneActor::spawn_uninitialized(engine.objects(), "staged");
    actor.set_position(1.0, 1.0, 1.0);
    assert_eq!(engine.objects().dirty_count(), 0);

    actor.initialize().unwrap();
    engine.tick().unwrap();

    let scene = engine.scene_snapshot().unwrap();
    assert_eq!(scene.syncs_of(actor.core_id()), vec![DirtyFlags::TRANSFORM]);
}

// ============================================================================
// ORDERING
// ============================================================================

#[test]
fn verify_construct_sync_destroy_order() {
    let mut engine = engine();
    let actor = engine.spawn_actor("a").unwrap();
    let id = actor.core_id();
    actor.set_active(false);
    engine.tick().unwrap();
    drop(actor);

    let scene = engine.scene_snapshot().unwrap();
    let created = scene.event_index(&SceneEvent::Created(id)).unwrap();
    let synced = scene
        .event_index(&SceneEvent::Synced {
            id,
            flags: DirtyFlags::ACTIVE,
        })
        .unwrap();
    let destroyed = scene.event_index(&SceneEvent::Destroyed(id)).unwrap();
    assert!(created < synced && synced < destroyed);
    assert!(!scene.actors.contains_key(&id));
}

#[test]
fn verify_destroyed_while_dirty_is_not_synced() {
    let mut engine = engine();
    let actor = engine.spawn_actor("a").unwrap();
    let id = actor.core_id();
    actor.set_position(3.0, 0.0, 0.0);
    actor.destroy();
    assert_ne!(actor.lifecycle(), LifecycleState::Synced);

    let stats = engine.tick().unwrap();
    assert_eq!(stats.sync.synced, 0);

    let scene = engine.scene_snapshot().unwrap();
    assert!(scene.syncs_of(id).is_empty());
    assert!(scene.event_index(&SceneEvent::Destroyed(id)).is_some());
    assert_eq!(actor.lifecycle(), LifecycleState::Destroyed);
}

#[test]
fn verify_material_synced_before_dependent_actor() {
    let mut engine = engine();
    // Spawned first so it would otherwise be synced first.
    let actor = engine.spawn_actor("a").unwrap();
    let material = engine.create_material("m", SHADER, vec![]).unwrap();
    engine.tick().unwrap();

    actor.set_material(&material.borrow());
    material.borrow().set_param("metallic", 1.0);
    engine.tick().unwrap();

    let scene = engine.scene_snapshot().unwrap();
    let material_id = material.borrow().core_id();
    let material_sync = scene
        .event_index(&SceneEvent::Synced {
            id: material_id,
            flags: tandem::scene::PARAMS,
        })
        .unwrap();
    let actor_sync = scene
        .event_index(&SceneEvent::Synced {
            id: actor.core_id(),
            flags: DirtyFlags::GENERIC_STATE,
        })
        .unwrap();
    assert!(material_sync < actor_sync);
    assert_eq!(scene.actors[&actor.core_id()].material, Some(material_id));
}

// ============================================================================
// LISTENERS
// ============================================================================

#[test]
fn verify_resource_events_reach_core_in_one_tick() {
    let mut engine = engine();
    let material = engine.create_material("m", SHADER, vec![ALBEDO]).unwrap();
    let id = material.borrow().core_id();
    engine.tick().unwrap();

    engine.listeners_mut().resource_loaded(SHADER);
    let stats = engine.tick().unwrap();
    assert_eq!(stats.listener_notifications, 1);
    assert!(!engine.scene_snapshot().unwrap().materials[&id].ready);

    engine.listeners_mut().resource_loaded(ALBEDO);
    engine.tick().unwrap();
    assert!(material.borrow().is_ready());
    assert!(engine.scene_snapshot().unwrap().materials[&id].ready);

    engine.listeners_mut().resource_unloaded(ALBEDO);
    engine.tick().unwrap();
    assert!(!engine.scene_snapshot().unwrap().materials[&id].ready);
}

#[test]
fn verify_texture_swap_rewires_listener() {
    const DETAIL: ResourceId = ResourceId::new(12);

    let mut engine = engine();
    let material = engine.create_material("m", SHADER, vec![ALBEDO]).unwrap();
    engine.listeners_mut().resource_loaded(SHADER);
    engine.listeners_mut().resource_loaded(DETAIL);
    engine.tick().unwrap();
    assert!(!material.borrow().is_ready());

    material
        .borrow()
        .set_textures(vec![DETAIL], engine.listeners_mut());
    let stats = engine.tick().unwrap();
    assert_eq!(stats.listener_notifications, 1);
    assert!(material.borrow().is_ready());

    // The old texture no longer reaches the material.
    engine.listeners_mut().resource_loaded(ALBEDO);
    assert_eq!(engine.tick().unwrap().listener_notifications, 0);
}
