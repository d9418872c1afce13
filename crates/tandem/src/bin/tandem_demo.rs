//! # Tandem Demo
//!
//! Spawns a small scene, runs a few ticks and prints what reached the core
//! thread.

use tandem::{DirtyFlags, Engine, EngineConfig, Mobility, ResourceId, SceneEvent};

const SHADER: ResourceId = ResourceId::new(1);
const ALBEDO: ResourceId = ResourceId::new(2);
const FRAMES: u16 = 60;

fn main() {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                        TANDEM DEMO                               ║");
    println!("╠══════════════════════════════════════════════════════════════════╣");
    println!("║  Sim thread mutates, core thread applies. One payload per dirty  ║");
    println!("║  object per tick, in submission order.                           ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    if let Err(err) = run() {
        println!("✗ demo failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> tandem::EngineResult<()> {
    let mut engine = Engine::new(EngineConfig::default())?;

    let material = engine.create_material("crate_mat", SHADER, vec![ALBEDO])?;
    material.borrow().set_param("roughness", 0.8);

    let ground = engine.spawn_actor("ground")?;
    ground.set_mobility(Mobility::Static);
    let mover = engine.spawn_actor("mover")?;
    mover.set_material(&material.borrow());

    let mut synced = 0;
    let mut commands = 0;
    for frame in 0..FRAMES {
        if frame == 10 {
            engine.listeners_mut().resource_loaded(SHADER);
            engine.listeners_mut().resource_loaded(ALBEDO);
        }
        if frame == 30 {
            engine.listeners_mut().resource_modified(ALBEDO);
        }
        mover.set_position(f32::from(frame) * 0.1, 0.0, 0.0);
        if frame % 20 == 0 {
            mover.mark_core_dirty(DirtyFlags::ACTIVE);
        }

        let stats = engine.tick()?;
        synced += stats.sync.synced;
        commands += stats.sync.commands;
    }

    let scene = engine.scene_snapshot()?;
    let view = &scene.actors[&mover.core_id()];
    let material_ready = scene
        .materials
        .get(&material.borrow().core_id())
        .is_some_and(|m| m.ready);

    println!("┌─ Results ─────────────────────────────────────────────────────────");
    println!("│  Frames ticked:        {FRAMES}");
    println!("│  Objects synced:       {synced}");
    println!("│  Sync commands:        {commands}");
    println!("│  Mover position:       {:?}", view.transform.position);
    println!("│  Mover syncs applied:  {}", view.sync_count);
    println!("│  Material ready:       {material_ready}");
    println!("│  Core events:          {}", scene.recorded_events());

    drop(mover);
    drop(ground);
    let scene = engine.scene_snapshot()?;
    let destroyed = scene
        .events()
        .iter()
        .filter(|e| matches!(e, SceneEvent::Destroyed(_)))
        .count();
    println!("│  Destroyed on drop:    {destroyed}");

    let stats = engine.shutdown()?;
    println!("│  Commands executed:    {}", stats.executed);
    println!("│  Slowest command:      {} µs", stats.slowest_command_us);
    println!("└───────────────────────────────────────────────────────────────────");
    Ok(())
}
