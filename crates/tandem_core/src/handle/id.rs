//! Instance ids and typed handles.

use std::any::type_name;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Stable identity of a logical entity.
///
/// Unrelated to [`CoreObjectId`](crate::CoreObjectId): handles name entities
/// whether or not they have a core-side counterpart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Never assigned. Resolves to nothing.
    pub const NULL: Self = Self(0);

    /// Wraps a raw id, e.g. one read back from a saved scene.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id, for persisting.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns true for [`InstanceId::NULL`].
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Typed, indirect reference to an entity.
///
/// Holds only the id. Every dereference goes through the registry, so a
/// remap of the id is picked up without touching the handle.
#[repr(transparent)]
pub struct Handle<T: ?Sized> {
    id: InstanceId,
    _marker: PhantomData<fn() -> *const T>,
}

impl<T: ?Sized> Handle<T> {
    /// A handle that never resolves.
    pub const NULL: Self = Self::new(InstanceId::NULL);

    /// Wraps `id`.
    #[inline]
    #[must_use]
    pub const fn new(id: InstanceId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// The id this handle was created with. Resolution may follow a remap
    /// to a different id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> InstanceId {
        self.id
    }

    /// Returns true if this is [`Handle::NULL`].
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.id.is_null()
    }

    /// Reinterprets the handle for another type. Resolution still checks the
    /// actual type where the registry stores erased objects.
    #[inline]
    #[must_use]
    pub const fn cast<U: ?Sized>(self) -> Handle<U> {
        Handle::new(self.id)
    }
}

// Manual impls: no bounds on T.
impl<T: ?Sized> Clone for Handle<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Handle<T> {}

impl<T: ?Sized> PartialEq for Handle<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T: ?Sized> Eq for Handle<T> {}

impl<T: ?Sized> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T: ?Sized> Default for Handle<T> {
    fn default() -> Self {
        Self::NULL
    }
}

impl<T: ?Sized> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Handle<{}>(null)", type_name::<T>())
        } else {
            write!(f, "Handle<{}>({})", type_name::<T>(), self.id)
        }
    }
}

impl<T: ?Sized> From<Handle<T>> for InstanceId {
    fn from(handle: Handle<T>) -> Self {
        handle.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Mesh;

    #[test]
    fn test_handle_is_plain_id() {
        let handle: Handle<Mesh> = Handle::new(InstanceId::new(5));
        let copy = handle;
        assert_eq!(handle, copy);
        assert_eq!(InstanceId::from(copy), InstanceId::new(5));
        assert!(!handle.is_null());
        assert!(Handle::<Mesh>::default().is_null());
    }

    #[test]
    fn test_debug_names_type() {
        let handle: Handle<Mesh> = Handle::new(InstanceId::new(2));
        assert!(format!("{handle:?}").ends_with("Mesh>(#2)"));
        assert!(format!("{:?}", Handle::<Mesh>::NULL).ends_with("(null)"));
    }
}
