//! # Scene Objects
//!
//! Concrete dual objects built on `tandem_core`:
//!
//! ```text
//!   SIM THREAD                         CORE THREAD
//!   ┌──────────────┐  ActorSync        ┌──────────────┐
//!   │ SceneActor   │ ────────────────▶ │ CoreActor    │──┐
//!   └──────┬───────┘                   └──────────────┘  │
//!          │ depends on                                  ▼
//!   ┌──────▼───────┐  MaterialSync     ┌──────────────┐ ┌───────────┐
//!   │ Material     │ ────────────────▶ │ CoreMaterial │▶│ CoreScene │
//!   └──────▲───────┘                   └──────────────┘ └───────────┘
//!          │ loaded / changed / destroyed
//!   ResourceListenerRegistry
//! ```

mod actor;
mod core_scene;
mod material;

pub use actor::{ActorState, ActorSync, CoreActor, Mobility, SceneActor, Transform};
pub use core_scene::{ActorView, CoreScene, MaterialView, SceneEvent};
pub use material::{CoreMaterial, Material, MaterialState, MaterialSync, PARAMS};
