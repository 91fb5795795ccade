//! The load engine: resolve keys and references against the current round,
//! recurse over parents, and promote deferred references when the active
//! load groups change.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::deferred::Deferred;
use crate::error::LoadError;
use crate::key::Key;
use crate::policy::{LoadGroups, Property};
use crate::reference::Ref;
use crate::round::Round;
use crate::session::{Session, SessionValue, Upgrade};

/// An opaque handle to a storage transaction, forwarded untouched to the
/// fetcher with every bulk get.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxnHandle(pub u64);

/// The map a fetcher produces: raw records keyed by their record key. Keys
/// with no existing record are simply absent; that is not a failure.
pub type RecordMap<R> = Rc<HashMap<Key, R>>;

/// The bulk storage call. `bulk_get` must return a deferred handle
/// immediately; the engine registers many keys across many logical requests
/// before anything blocks on a concrete value.
pub trait Fetcher {
    type Record;

    fn bulk_get(&self, txn: Option<&TxnHandle>, keys: &BTreeSet<Key>) -> Deferred<RecordMap<Self::Record>>;
}

/// Translates one raw record into an application value. Runs inside a
/// round's translated-map computation with a fresh [`LoadContext`]; nested
/// loads discovered during translation go through the context's engine and
/// batch into whatever round is current at that point.
pub trait Translator {
    type Record;
    type Value: Clone + 'static;

    fn translate(
        &self,
        key: &Key,
        record: &Self::Record,
        ctx: &mut LoadContext<Self::Record, Self::Value>,
    ) -> Result<Self::Value, LoadError>;
}

/// Key introspection: whether resolving `key` also requires resolving its
/// parent under the active load groups.
pub trait KeyMetadata {
    fn should_load_parent(&self, key: &Key, groups: &LoadGroups) -> bool;
}

/// Configuration bundle for a [`Loader`]. The groups handle is shared with
/// the owning unit of work, which may change the active set between calls.
pub struct LoadRules<R, V> {
    pub fetcher: Rc<dyn Fetcher<Record = R>>,
    pub translator: Rc<dyn Translator<Record = R, Value = V>>,
    pub metadata: Rc<dyn KeyMetadata>,
    pub groups: LoadGroups,
    pub txn: Option<TxnHandle>,
    /// When set, a round is executed as soon as this many keys are pending,
    /// without waiting for an explicit `execute` call.
    pub max_pending: Option<NonZeroUsize>,
}

pub(crate) struct LoaderInner<R, V> {
    rules: LoadRules<R, V>,
    session: Session<V>,
    /// The current round, replaced whenever a round executes.
    round: RefCell<Rc<Round<V>>>,
}

/// The batch-loading engine for one unit of work.
///
/// Resolving a key only accumulates it into the current round; nothing
/// touches storage until [`execute`](Loader::execute) retires the round, and
/// nothing blocks until a deferred result is forced. Cheap to clone; clones
/// share the session and the current round.
pub struct Loader<R, V> {
    inner: Rc<LoaderInner<R, V>>,
}

impl<R, V> Clone for Loader<R, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<R: 'static, V: Clone + 'static> Loader<R, V> {
    pub fn new(rules: LoadRules<R, V>) -> Self {
        trace!(groups = ?rules.groups.snapshot(), "starting loader");
        Self {
            inner: Rc::new(LoaderInner {
                rules,
                session: Session::new(),
                round: RefCell::new(Round::new()),
            }),
        }
    }

    /// Get the deferred result for `key`, scheduling a fetch in the current
    /// round on a session miss, then recursively schedule `key`'s parent
    /// when the key metadata calls for it. The parent lands in the same
    /// round as the child (no execution has happened in between), and the
    /// session cache keeps an already-requested ancestor from being
    /// scheduled twice, which is also what terminates a malformed ancestry
    /// cycle.
    pub fn resolve(&self, key: &Key) -> Deferred<Option<V>> {
        let round = Rc::clone(&*self.inner.round.borrow());
        let result = Round::get(&round, self, key);

        if let Some(parent) = key.parent() {
            if self
                .inner
                .rules
                .metadata
                .should_load_parent(key, &self.inner.rules.groups)
            {
                self.resolve(parent);
            }
        }

        if let Some(max) = self.inner.rules.max_pending {
            let full = self.inner.round.borrow().pending_len() >= max.get();
            if full {
                self.execute();
            }
        }

        result
    }

    /// The fundamental ref operation: wire `reference` to resolve from the
    /// deferred result for its key. Lazy on both ends; neither the resolve
    /// nor the wiring forces anything. A reference that is already bound
    /// keeps its original wiring.
    pub fn load_ref(&self, reference: &Ref<V>) {
        let result = self.resolve(reference.key());
        if !reference.bind(result) {
            trace!(key = %reference.key(), "reference already bound; keeping original wiring");
        }
    }

    /// Convenience: create a new reference for `key` and load it.
    pub fn new_ref(&self, key: Key) -> Ref<V> {
        let reference = Ref::new(key);
        self.load_ref(&reference);
        reference
    }

    /// Create a reference for `key` held by the `property` field of the
    /// record identified by `owner`, resolving it now, registering it for
    /// later upgrade, or leaving it permanently unresolved, depending on the
    /// property's load policy and the active groups.
    pub fn make_ref(&self, owner: &Key, property: &Property, key: Key) -> Ref<V> {
        let reference = Ref::new(key);

        if self.should_load(property) {
            self.load_ref(&reference);
        } else if property.has_load_policy() {
            // Skipped for now, but a later group change could qualify it.
            // No live owner entry means there is nothing to upgrade later;
            // the registration is silently dropped.
            if let Some(entry) = self.inner.session.get(owner) {
                entry.add_upgrade(Upgrade {
                    property: property.clone(),
                    reference: reference.clone(),
                });
            }
        }

        reference
    }

    /// Whether `property` qualifies for eager loading under the active
    /// groups. Pure predicate.
    pub fn should_load(&self, property: &Property) -> bool {
        property.should_load(&self.inner.rules.groups)
    }

    /// Retire the current round and start its bulk fetch; a fresh empty
    /// round takes over so further resolves batch into a new generation.
    /// This is the only point where a fetch is issued.
    pub fn execute(&self) {
        let retired = std::mem::replace(&mut *self.inner.round.borrow_mut(), Round::new());
        retired.execute(self);
    }

    /// Seed the session with an already-known value so the key never hits
    /// storage in this unit of work. No-op when the key already has a
    /// session entry.
    pub fn prime(&self, key: Key, value: V) {
        if self.inner.session.get(&key).is_none() {
            trace!(key = %key, "priming session");
            self.inner
                .session
                .add(key, SessionValue::new(Deferred::ready(Some(value))));
        }
    }

    /// The shared active-groups handle.
    pub fn groups(&self) -> &LoadGroups {
        &self.inner.rules.groups
    }

    pub(crate) fn session(&self) -> &Session<V> {
        &self.inner.session
    }

    pub(crate) fn fetcher(&self) -> &Rc<dyn Fetcher<Record = R>> {
        &self.inner.rules.fetcher
    }

    pub(crate) fn translator(&self) -> &Rc<dyn Translator<Record = R, Value = V>> {
        &self.inner.rules.translator
    }

    pub(crate) fn txn(&self) -> Option<&TxnHandle> {
        self.inner.rules.txn.as_ref()
    }

    /// A weak engine handle for round-bound computations, so a long-lived
    /// deferred map does not keep the whole session alive through a cycle.
    pub(crate) fn weak(&self) -> Weak<LoaderInner<R, V>> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn from_weak(weak: &Weak<LoaderInner<R, V>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

/// A translation pass scoped to one round. Translators can reach the engine
/// for nested loads, or defer work until the whole round has translated.
pub struct LoadContext<R, V> {
    loader: Loader<R, V>,
    deferred: Vec<Box<dyn FnOnce(&Loader<R, V>)>>,
}

impl<R: 'static, V: Clone + 'static> LoadContext<R, V> {
    pub(crate) fn new(loader: Loader<R, V>) -> Self {
        Self {
            loader,
            deferred: Vec::new(),
        }
    }

    /// The engine this round belongs to. Loads issued here accumulate into
    /// the engine's current round and need their own `execute`.
    pub fn loader(&self) -> &Loader<R, V> {
        &self.loader
    }

    /// Run `hook` after every record in this round has been translated.
    pub fn defer(&mut self, hook: impl FnOnce(&Loader<R, V>) + 'static) {
        self.deferred.push(Box::new(hook));
    }

    /// Signal the end of the translation pass, running deferred hooks in
    /// registration order.
    pub(crate) fn done(self) {
        let LoadContext { loader, deferred } = self;
        for hook in deferred {
            hook(&loader);
        }
    }
}
