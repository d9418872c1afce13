//! # Core Object
//!
//! The sim-side owner of a dual object.
//!
//! ```text
//!   Uninitialized ──initialize()──> Initializing ──(core constructs)──> Synced
//!                                                                        │  ▲
//!                                                  mark_core_dirty(flag) │  │ sync_to_core()
//!                                                                        ▼  │
//!                                                                    DirtyPending
//!
//!   any state ──destroy()/drop──> DestroyPending ──(core destroys)──> Destroyed
//! ```
//!
//! The sim side never waits on the core side except through
//! [`CoreObject::block_until_core_initialized`].

use std::any::type_name;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::counterpart::SimObject;
use super::manager::{DirtySource, ManagerShared};
use super::DirtyFlags;
use crate::command::CommandFn;
use crate::error::{CommandError, CommandResult};
use crate::sync::AsyncOp;

/// Process-unique identity of a dual object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoreObjectId(u64);

impl CoreObjectId {
    /// Wraps a raw id.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CoreObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "core#{}", self.0)
    }
}

/// Where a dual object is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// Sim side exists, construction not queued yet.
    Uninitialized,
    /// Construction queued, counterpart not built yet.
    Initializing,
    /// Counterpart built and no flags pending.
    Synced,
    /// Flags pending for the next sync.
    DirtyPending,
    /// Destroy queued, counterpart not torn down yet.
    DestroyPending,
    /// Counterpart torn down.
    Destroyed,
}

// Progress reported back by core-thread commands.
const CORE_NONE: u8 = 0;
const CORE_CONSTRUCTED: u8 = 1;
const CORE_DESTROYED: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SimStage {
    Uninitialized,
    Initialized,
    Destroyed,
}

/// Sim-side storage of one object, shared with the dirty set by weak ref.
pub(crate) struct Slot<S: SimObject> {
    id: CoreObjectId,
    state: S,
    flags: DirtyFlags,
    stage: SimStage,
    in_dirty_set: bool,
    core_stage: Arc<AtomicU8>,
    init_op: Option<AsyncOp>,
}

impl<S: SimObject> DirtySource for Slot<S> {
    fn dependencies(&self) -> Vec<CoreObjectId> {
        self.state.core_dependencies()
    }

    fn take_sync(&mut self) -> Option<CommandFn> {
        self.in_dirty_set = false;
        if self.stage != SimStage::Initialized || self.flags.is_empty() {
            return None;
        }

        let flags = self.flags.take();
        let payload = self.state.sync_payload(flags);
        let id = self.id;
        trace!(object = %id, %flags, "sync payload built");
        Some(Box::new(move |ctx| ctx.apply_sync::<S::Core>(id, payload)))
    }
}

/// Sim-side handle owning one dual object.
///
/// Not `Clone`: the owner decides when the object dies. Dropping it queues
/// the counterpart's destruction without waiting for it.
pub struct CoreObject<S: SimObject> {
    slot: Rc<RefCell<Slot<S>>>,
    manager: Rc<ManagerShared>,
}

impl<S: SimObject> CoreObject<S> {
    pub(crate) fn new(id: CoreObjectId, state: S, manager: Rc<ManagerShared>) -> Self {
        Self {
            slot: Rc::new(RefCell::new(Slot {
                id,
                state,
                flags: DirtyFlags::NONE,
                stage: SimStage::Uninitialized,
                in_dirty_set: false,
                core_stage: Arc::new(AtomicU8::new(CORE_NONE)),
                init_op: None,
            })),
            manager,
        }
    }

    /// Identity of this object.
    #[inline]
    #[must_use]
    pub fn id(&self) -> CoreObjectId {
        self.slot.borrow().id
    }

    /// Borrows the sim-side state.
    ///
    /// # Panics
    ///
    /// If the state is mutably borrowed.
    #[must_use]
    pub fn state(&self) -> Ref<'_, S> {
        Ref::map(self.slot.borrow(), |slot| &slot.state)
    }

    /// Mutably borrows the sim-side state. Call
    /// [`mark_core_dirty`](Self::mark_core_dirty) after changing anything the
    /// counterpart mirrors.
    ///
    /// # Panics
    ///
    /// If the state is already borrowed.
    #[must_use]
    pub fn state_mut(&self) -> RefMut<'_, S> {
        RefMut::map(self.slot.borrow_mut(), |slot| &mut slot.state)
    }

    /// Mutates the state and marks `flags` dirty in one step.
    pub fn update<R>(&self, flags: DirtyFlags, f: impl FnOnce(&mut S) -> R) -> R {
        let result = f(&mut self.state_mut());
        self.mark_core_dirty(flags);
        result
    }

    /// Records that the facets in `flags` changed.
    ///
    /// The first flag since the last sync puts the object in the manager's
    /// dirty set. Further calls only widen the flags. Flags set before
    /// [`initialize`](Self::initialize) are kept and synced after it.
    pub fn mark_core_dirty(&self, flags: DirtyFlags) {
        {
            let mut slot = self.slot.borrow_mut();
            if slot.stage == SimStage::Destroyed {
                debug!(object = %slot.id, "dirty flags on destroyed object ignored");
                return;
            }
            slot.flags.insert(flags);
        }
        self.enlist();
    }

    /// Puts the object in the dirty set if it is initialized, has pending
    /// flags and is not already listed.
    pub(crate) fn enlist(&self) {
        let register = {
            let mut slot = self.slot.borrow_mut();
            let register = slot.stage == SimStage::Initialized
                && !slot.in_dirty_set
                && !slot.flags.is_empty();
            if register {
                slot.in_dirty_set = true;
            }
            register
        };
        if register {
            self.manager.register_dirty(self.id(), self.source());
        }
    }

    /// Takes the object out of the dirty set. Its flags stay pending.
    pub(crate) fn delist(&self) {
        let id = {
            let mut slot = self.slot.borrow_mut();
            slot.in_dirty_set = false;
            slot.id
        };
        self.manager.unregister_dirty(id);
    }

    /// Flags pending for the next sync.
    #[inline]
    #[must_use]
    pub fn core_dirty_flags(&self) -> DirtyFlags {
        self.slot.borrow().flags
    }

    /// Returns true if any flag is pending.
    #[inline]
    #[must_use]
    pub fn is_core_dirty(&self) -> bool {
        !self.core_dirty_flags().is_empty()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> LifecycleState {
        let slot = self.slot.borrow();
        let core = slot.core_stage.load(Ordering::Acquire);
        match slot.stage {
            SimStage::Uninitialized => LifecycleState::Uninitialized,
            SimStage::Destroyed if core == CORE_DESTROYED || slot.init_op.is_none() => {
                LifecycleState::Destroyed
            }
            SimStage::Destroyed => LifecycleState::DestroyPending,
            SimStage::Initialized if core != CORE_CONSTRUCTED => LifecycleState::Initializing,
            SimStage::Initialized if slot.flags.is_empty() => LifecycleState::Synced,
            SimStage::Initialized => LifecycleState::DirtyPending,
        }
    }

    /// Queues construction of the counterpart.
    ///
    /// Does nothing if already initialized or destroyed.
    ///
    /// # Errors
    ///
    /// [`CommandError::CoreThreadHalted`] if the core thread stopped.
    pub fn initialize(&self) -> CommandResult<()> {
        {
            let mut slot = self.slot.borrow_mut();
            if slot.stage != SimStage::Uninitialized {
                return Ok(());
            }

            let id = slot.id;
            let core = slot.state.create_core();
            let core_stage = Arc::clone(&slot.core_stage);
            let op = self.manager.queue.submit_with_result(move |ctx| {
                ctx.construct(id, core);
                core_stage.store(CORE_CONSTRUCTED, Ordering::Release);
            })?;

            slot.init_op = Some(op);
            slot.stage = SimStage::Initialized;
            debug!(object = %id, kind = type_name::<S>(), "core object construction queued");
        }
        self.enlist();
        Ok(())
    }

    /// Blocks until the counterpart has been constructed on the core thread.
    ///
    /// # Errors
    ///
    /// - [`CommandError::NotInitialized`] if [`initialize`](Self::initialize)
    ///   was never called.
    /// - The core thread's failure if construction will never run.
    pub fn block_until_core_initialized(&self) -> CommandResult<()> {
        let (id, op) = {
            let slot = self.slot.borrow();
            (slot.id, slot.init_op.clone())
        };
        let op = op.ok_or(CommandError::NotInitialized(id))?;
        op.block_until_complete()
            .map_err(|_| self.manager.queue.halt_error())
    }

    /// Queues destruction of the counterpart. Idempotent.
    ///
    /// Pending dirty flags are dropped. The sim side is gone as soon as the
    /// command is queued; the counterpart is torn down later on the core
    /// thread.
    pub fn destroy(&self) {
        let (id, queued) = {
            let mut slot = self.slot.borrow_mut();
            if slot.stage == SimStage::Destroyed {
                return;
            }
            let was_initialized = slot.stage == SimStage::Initialized;
            slot.stage = SimStage::Destroyed;
            slot.flags = DirtyFlags::NONE;
            (slot.id, was_initialized)
        };

        self.manager.unregister_dirty(id);
        self.manager.object_released();

        if !queued {
            debug!(object = %id, "uninitialized core object destroyed");
            return;
        }

        let core_stage = Arc::clone(&self.slot.borrow().core_stage);
        let submitted = self.manager.queue.submit(move |ctx| {
            ctx.destroy_counterpart(id);
            core_stage.store(CORE_DESTROYED, Ordering::Release);
        });
        match submitted {
            Ok(()) => debug!(object = %id, kind = type_name::<S>(), "core object destroy queued"),
            Err(err) => warn!(object = %id, %err, "core object destroy could not be queued"),
        }
    }

    fn source(&self) -> std::rc::Weak<RefCell<dyn DirtySource>> {
        let strong: Rc<RefCell<dyn DirtySource>> = self.slot.clone();
        Rc::downgrade(&strong)
    }
}

impl<S: SimObject> Drop for CoreObject<S> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<S: SimObject> fmt::Debug for CoreObject<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreObject")
            .field("id", &self.id())
            .field("kind", &type_name::<S>())
            .field("lifecycle", &self.lifecycle())
            .field("dirty", &self.core_dirty_flags())
            .finish()
    }
}
