//! Lazily-resolvable handles to values identified by a key.

use std::cell::RefCell;
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use crate::deferred::Deferred;
use crate::error::LoadError;
use crate::key::Key;

struct RefInner<V> {
    key: Key,
    slot: RefCell<Option<Deferred<Option<V>>>>,
}

/// A lazy handle bound to a key that eventually yields a resolved value.
///
/// A `Ref` starts unresolved (key only) and is wired to a deferred source at
/// most once; it is never partially populated. The resolved value may
/// legitimately be `None` when no record exists for the key. Clones share
/// the same slot, which is what lets an upgrade worklist hold the same
/// reference the caller holds.
pub struct Ref<V> {
    inner: Rc<RefInner<V>>,
}

impl<V> Clone for Ref<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<V: Clone + 'static> Ref<V> {
    /// An unresolved reference for `key`.
    pub fn new(key: Key) -> Self {
        Self {
            inner: Rc::new(RefInner {
                key,
                slot: RefCell::new(None),
            }),
        }
    }

    pub fn key(&self) -> &Key {
        &self.inner.key
    }

    /// Wire this reference to resolve from `result`. Set-once: a second
    /// bind is a no-op that keeps the first wiring, and returns `false`.
    /// Binding does not force anything.
    pub fn bind(&self, result: Deferred<Option<V>>) -> bool {
        let mut slot = self.inner.slot.borrow_mut();
        if slot.is_some() {
            return false;
        }
        *slot = Some(result);
        true
    }

    /// Whether this reference has been wired to a load.
    pub fn is_bound(&self) -> bool {
        self.inner.slot.borrow().is_some()
    }

    /// Force the resolved value, blocking on the owning round's fetch and
    /// translation if they have not run yet. `Ok(None)` means the key has no
    /// record. An unbound reference reports [`LoadError::Unloaded`].
    pub fn get(&self) -> Result<Option<V>, LoadError> {
        let bound = self.inner.slot.borrow().clone();
        match bound {
            Some(result) => result.force(),
            None => Err(LoadError::Unloaded(self.inner.key.clone())),
        }
    }
}

impl<V> Debug for Ref<V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("key", &self.inner.key)
            .field("bound", &self.inner.slot.borrow().is_some())
            .finish()
    }
}
