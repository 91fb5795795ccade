//! The unit-of-work session cache.
//!
//! One entry per key ever requested within the unit of work; entries are
//! never evicted while the session lives. The cache is the sole gate for
//! "has this key already been scheduled for fetch", which is what gives the
//! at-most-one-fetch-per-key guarantee for the whole unit of work, not just
//! one round. It is also what terminates recursive parent resolution on a
//! malformed ancestry.

use std::cell::RefCell;
use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use crate::deferred::Deferred;
use crate::key::Key;
use crate::policy::{LoadGroups, Property};
use crate::reference::Ref;

/// A deferred promotion record: a reference whose resolution was skipped
/// because the load-group policy did not require it at creation time. It is
/// removed from its worklist exactly when it is resolved.
pub(crate) struct Upgrade<V> {
    pub(crate) property: Property,
    pub(crate) reference: Ref<V>,
}

/// One session entry: the deferred result for the key, plus the ordered
/// worklist of pending upgrades registered against that key.
pub(crate) struct SessionValue<V> {
    result: Deferred<Option<V>>,
    upgrades: Rc<RefCell<Vec<Upgrade<V>>>>,
}

impl<V> Clone for SessionValue<V> {
    fn clone(&self) -> Self {
        Self {
            result: self.result.clone(),
            upgrades: Rc::clone(&self.upgrades),
        }
    }
}

impl<V: Clone + 'static> SessionValue<V> {
    pub(crate) fn new(result: Deferred<Option<V>>) -> Self {
        Self {
            result,
            upgrades: Rc::default(),
        }
    }

    pub(crate) fn result(&self) -> Deferred<Option<V>> {
        self.result.clone()
    }

    pub(crate) fn add_upgrade(&self, upgrade: Upgrade<V>) {
        self.upgrades.borrow_mut().push(upgrade);
    }

    /// Remove and return every upgrade whose property qualifies under the
    /// active groups. Removal happens before the caller resolves anything,
    /// so a promotion that re-enters this entry cannot see the same upgrade
    /// twice.
    pub(crate) fn take_ready(&self, active: &LoadGroups) -> Vec<Upgrade<V>> {
        let mut upgrades = self.upgrades.borrow_mut();
        if upgrades.is_empty() {
            return Vec::new();
        }
        let (due, kept) = mem::take(&mut *upgrades)
            .into_iter()
            .partition(|upgrade| upgrade.property.should_load(active));
        *upgrades = kept;
        due
    }
}

pub(crate) struct Session<V> {
    entries: RefCell<HashMap<Key, SessionValue<V>>>,
}

impl<V: Clone + 'static> Session<V> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
        }
    }

    pub(crate) fn get(&self, key: &Key) -> Option<SessionValue<V>> {
        self.entries.borrow().get(key).cloned()
    }

    pub(crate) fn add(&self, key: Key, value: SessionValue<V>) {
        self.entries.borrow_mut().insert(key, value);
    }
}
