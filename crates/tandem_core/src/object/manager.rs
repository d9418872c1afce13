//! # Core Object Manager
//!
//! Owns the per-tick dirty set and turns it into sync commands.
//!
//! ```text
//!   mark_core_dirty(A)   mark_core_dirty(B)   mark_core_dirty(A)
//!          │                    │                    │ (already listed)
//!          ▼                    ▼                    ▼
//!   dirty set: [A, B] ──sync_to_core()──> deps first ──> payloads ──> queue
//!          │
//!          └─ cleared here and nowhere else
//! ```
//!
//! `sync_to_core` is the only place that decides an object is clean.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::core_object::CoreObject;
use super::counterpart::SimObject;
use super::CoreObjectId;
use crate::command::{CommandBatch, CommandFn, CommandQueue};
use crate::config::{ObjectSyncConfig, SyncMode};
use crate::error::CommandResult;

/// What the manager needs from a listed object, independent of its kind.
pub(crate) trait DirtySource {
    fn dependencies(&self) -> Vec<CoreObjectId>;
    /// Clears the pending flags and builds the sync command, if any.
    fn take_sync(&mut self) -> Option<CommandFn>;
}

type SourceRef = Weak<RefCell<dyn DirtySource>>;

/// Insertion-ordered set of dirty objects.
///
/// `remove` leaves a stale slot in `order`; a slot is live only while its
/// sequence number matches the entry's. Stale slots are compacted once they
/// outnumber live ones.
struct DirtySet {
    order: Vec<(CoreObjectId, u64)>,
    entries: HashMap<CoreObjectId, (u64, SourceRef)>,
    next_seq: u64,
}

impl DirtySet {
    /// Stale slots tolerated before `remove` compacts.
    const COMPACT_SLACK: usize = 32;

    fn with_capacity(capacity: usize) -> Self {
        Self {
            order: Vec::with_capacity(capacity),
            entries: HashMap::with_capacity(capacity),
            next_seq: 0,
        }
    }

    fn insert(&mut self, id: CoreObjectId, source: SourceRef) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(id, (seq, source));
        self.order.push((id, seq));
        true
    }

    fn remove(&mut self, id: CoreObjectId) -> bool {
        if self.entries.remove(&id).is_none() {
            return false;
        }
        if self.order.len() > 2 * self.entries.len() + Self::COMPACT_SLACK {
            let entries = &self.entries;
            self.order
                .retain(|(id, seq)| entries.get(id).is_some_and(|(live, _)| live == seq));
        }
        true
    }

    fn take(&mut self) -> Vec<(CoreObjectId, SourceRef)> {
        let mut taken = Vec::with_capacity(self.entries.len());
        for (id, seq) in self.order.drain(..) {
            if self.entries.get(&id).is_some_and(|(live, _)| *live == seq) {
                if let Some((_, source)) = self.entries.remove(&id) {
                    taken.push((id, source));
                }
            }
        }
        taken
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// State shared by the manager and every object it created.
pub(crate) struct ManagerShared {
    pub(crate) queue: CommandQueue,
    config: ObjectSyncConfig,
    live: Cell<usize>,
    dirty: RefCell<DirtySet>,
}

impl ManagerShared {
    pub(crate) fn register_dirty(&self, id: CoreObjectId, source: SourceRef) {
        if self.dirty.borrow_mut().insert(id, source) {
            trace!(object = %id, "registered dirty");
        }
    }

    pub(crate) fn unregister_dirty(&self, id: CoreObjectId) {
        if self.dirty.borrow_mut().remove(id) {
            trace!(object = %id, "unregistered dirty");
        }
    }

    pub(crate) fn object_released(&self) {
        self.live.set(self.live.get().saturating_sub(1));
    }
}

/// Counters for one [`CoreObjectManager::sync_to_core`] pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Entries taken from the dirty set.
    pub dirty: usize,
    /// Objects whose payload was queued.
    pub synced: usize,
    /// Entries dropped: object gone, destroyed, or nothing left to sync.
    pub skipped: usize,
    /// Queue entries submitted.
    pub commands: usize,
}

/// Creates dual objects and ships their dirty state to the core thread.
///
/// Sim-thread only: the manager is `!Send`. Cloning gives another handle to
/// the same manager.
#[derive(Clone)]
pub struct CoreObjectManager {
    shared: Rc<ManagerShared>,
}

impl CoreObjectManager {
    /// Creates a manager feeding `queue`.
    #[must_use]
    pub fn new(queue: CommandQueue, config: ObjectSyncConfig) -> Self {
        let dirty = DirtySet::with_capacity(config.dirty_capacity);
        Self {
            shared: Rc::new(ManagerShared {
                queue,
                config,
                live: Cell::new(0),
                dirty: RefCell::new(dirty),
            }),
        }
    }

    /// Creates an object and queues construction of its counterpart.
    ///
    /// # Errors
    ///
    /// [`CommandError::CoreThreadHalted`](crate::CommandError::CoreThreadHalted)
    /// if the core thread stopped.
    pub fn create<S: SimObject>(&self, state: S) -> CommandResult<CoreObject<S>> {
        let object = self.create_uninitialized(state);
        object.initialize()?;
        Ok(object)
    }

    /// Creates an object without queueing construction. Call
    /// [`CoreObject::initialize`] once the state is fully set up.
    #[must_use]
    pub fn create_uninitialized<S: SimObject>(&self, state: S) -> CoreObject<S> {
        let id = self.shared.queue.allocate_object_id();
        self.shared.live.set(self.shared.live.get() + 1);
        CoreObject::new(id, state, Rc::clone(&self.shared))
    }

    /// Lists `object` in the dirty set if it has pending flags. Listing an
    /// already listed object does nothing.
    pub fn register_dirty<S: SimObject>(&self, object: &CoreObject<S>) {
        object.enlist();
    }

    /// Takes `object` out of the dirty set. Absent objects are ignored.
    pub fn unregister_dirty<S: SimObject>(&self, object: &CoreObject<S>) {
        object.delist();
    }

    /// Number of objects currently listed as dirty.
    #[must_use]
    pub fn dirty_count(&self) -> usize {
        self.shared.dirty.borrow().len()
    }

    /// Number of objects created and not yet destroyed.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.shared.live.get()
    }

    /// The queue sync commands go to.
    #[must_use]
    pub fn queue(&self) -> &CommandQueue {
        &self.shared.queue
    }

    /// Ships every dirty object to the core thread and clears the dirty set.
    ///
    /// Call once per tick. Each object produces one payload covering the union
    /// of its flags. Declared core dependencies that are dirty in the same
    /// tick are shipped first.
    ///
    /// # Panics
    ///
    /// If a listed object's state is borrowed while this runs.
    ///
    /// # Errors
    ///
    /// [`CommandError::CoreThreadHalted`](crate::CommandError::CoreThreadHalted)
    /// if the core thread stopped. Objects whose payload was not built yet
    /// stay listed with their flags pending.
    pub fn sync_to_core(&self) -> CommandResult<SyncStats> {
        let taken = self.shared.dirty.borrow_mut().take();
        let mut stats = SyncStats {
            dirty: taken.len(),
            ..SyncStats::default()
        };
        if taken.is_empty() {
            return Ok(stats);
        }

        let mut order = Vec::with_capacity(taken.len());
        let mut sources = HashMap::with_capacity(taken.len());
        for (id, source) in taken {
            match source.upgrade() {
                Some(source) => {
                    order.push(id);
                    sources.insert(id, source);
                }
                None => stats.skipped += 1,
            }
        }

        let ordered = dependency_order(&order, &sources);
        let mut batch = CommandBatch::with_capacity(ordered.len());
        for (position, &id) in ordered.iter().enumerate() {
            let Some(source) = sources.get(&id) else {
                continue;
            };
            let Some(command) = source.borrow_mut().take_sync() else {
                stats.skipped += 1;
                continue;
            };
            stats.synced += 1;
            match self.shared.config.mode {
                SyncMode::Batched => batch.push_boxed(command),
                SyncMode::PerObject => {
                    if let Err(err) = self.shared.queue.submit(command) {
                        self.relist(&ordered[position + 1..], &sources);
                        return Err(err);
                    }
                    stats.commands += 1;
                }
            }
        }
        if !batch.is_empty() {
            self.shared.queue.submit_batch(batch)?;
            stats.commands += 1;
        }

        debug!(
            dirty = stats.dirty,
            synced = stats.synced,
            skipped = stats.skipped,
            commands = stats.commands,
            "synced dirty objects to core"
        );
        Ok(stats)
    }

    /// Puts taken but unprocessed objects back in the dirty set.
    fn relist(
        &self,
        ids: &[CoreObjectId],
        sources: &HashMap<CoreObjectId, Rc<RefCell<dyn DirtySource>>>,
    ) {
        for id in ids {
            if let Some(source) = sources.get(id) {
                self.shared.register_dirty(*id, Rc::downgrade(source));
            }
        }
        debug!(relisted = ids.len(), "sync interrupted, objects kept dirty");
    }
}

impl std::fmt::Debug for CoreObjectManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreObjectManager")
            .field("live", &self.live_count())
            .field("dirty", &self.dirty_count())
            .field("mode", &self.shared.config.mode)
            .finish()
    }
}

/// Orders `roots` so that each object comes after its dirty dependencies.
/// Dependencies outside the dirty set are already synced and ignored. Cycles
/// are broken at the first revisit.
fn dependency_order(
    roots: &[CoreObjectId],
    sources: &HashMap<CoreObjectId, Rc<RefCell<dyn DirtySource>>>,
) -> Vec<CoreObjectId> {
    let mut ordered = Vec::with_capacity(roots.len());
    let mut visited = HashSet::with_capacity(roots.len());
    // (id, dependencies expanded)
    let mut stack: Vec<(CoreObjectId, bool)> = Vec::new();

    for &root in roots {
        stack.push((root, false));
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                ordered.push(id);
                continue;
            }
            if !visited.insert(id) {
                continue;
            }
            let Some(source) = sources.get(&id) else {
                continue;
            };
            stack.push((id, true));
            let dependencies = source.borrow().dependencies();
            for dep in dependencies.into_iter().rev() {
                if sources.contains_key(&dep) && !visited.contains(&dep) {
                    stack.push((dep, false));
                }
            }
        }
    }
    ordered
}
