//! # Tandem
//!
//! Application context on top of [`tandem_core`]. One [`Engine`] per
//! process; it owns the core thread and every sim-side service.
//!
//! ```text
//!  SIM THREAD                                            CORE THREAD
//! ┌────────────────────────────────────────────┐       ┌──────────────────┐
//! │ Engine::tick                               │       │ run loop         │
//! │  ├─ DeferredCalls::drain                   │       │  ├─ construct    │
//! │  ├─ ResourceListenerRegistry::update       │ queue │  ├─ apply_sync   │
//! │  └─ CoreObjectManager::sync_to_core  ──────┼──────▶│  └─ destroy      │
//! │                                            │       │                  │
//! │ HandleRegistry (ids, remaps)               │◀──────┤ AsyncOp results  │
//! └────────────────────────────────────────────┘       └──────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use tandem::{Engine, EngineConfig};
//!
//! let mut engine = Engine::new(EngineConfig::default())?;
//! let actor = engine.spawn_actor("crate")?;
//! actor.set_position(5.0, 0.0, 0.0);
//! engine.tick()?;
//!
//! let scene = engine.scene_snapshot()?;
//! assert_eq!(scene.actors[&actor.core_id()].transform.position, [5.0, 0.0, 0.0]);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod engine;
pub mod error;
pub mod scene;

pub use engine::{Engine, FrameStats};
pub use error::{EngineError, EngineResult};
pub use scene::{
    ActorView, CoreScene, Material, MaterialView, Mobility, SceneActor, SceneEvent, Transform,
};

pub use tandem_core::{DirtyFlags, EngineConfig, Handle, InstanceId, ResourceId, SyncMode};
