//! One generation of batched fetch work.
//!
//! A round accumulates pending keys until it executes, at which point it
//! snapshots them into a single bulk fetch and a shared translated-map
//! computation. Each per-key deferred created by a round captures *that*
//! round, not whatever round is current when it is eventually forced; this
//! is what lets references issued against round N resolve correctly after
//! round N has been superseded by round N+1.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::mem;
use std::rc::Rc;

use tracing::trace;

use crate::deferred::Deferred;
use crate::error::LoadError;
use crate::key::Key;
use crate::loader::{LoadContext, Loader};
use crate::session::SessionValue;

/// The shared output of a round: per-key translation outcomes. Stored as a
/// `Result` per key so one untranslatable record fails only its own key.
pub(crate) type TranslatedMap<V> = Rc<HashMap<Key, Result<V, LoadError>>>;

pub(crate) struct Round<V> {
    /// Keys this round will fetch; may be empty if everything was a
    /// session hit. Never grows after the round executes.
    pending: RefCell<BTreeSet<Key>>,
    /// Installed by `execute`; absent while the round is still accumulating.
    translated: RefCell<Option<Deferred<TranslatedMap<V>>>>,
}

impl<V: Clone + 'static> Round<V> {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            pending: RefCell::new(BTreeSet::new()),
            translated: RefCell::new(None),
        })
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Get the deferred result for `key`, using the session cache if
    /// possible. On a miss the key joins this round's pending set and the
    /// installed deferred binds to this round's translated map. On either
    /// path, any upgrades on the entry that now qualify under the active
    /// groups are drained and resolved.
    pub(crate) fn get<R: 'static>(
        this: &Rc<Self>,
        loader: &Loader<R, V>,
        key: &Key,
    ) -> Deferred<Option<V>> {
        let entry = match loader.session().get(key) {
            Some(entry) => {
                trace!(key = %key, "session hit");
                entry
            }
            None => {
                trace!(key = %key, "adding to round (session miss)");
                this.pending.borrow_mut().insert(key.clone());

                let round = Rc::clone(this);
                let lookup = key.clone();
                let result = Deferred::new(move || {
                    let translated = round.translated.borrow().clone();
                    let map = translated
                        .ok_or_else(|| LoadError::NotExecuted(lookup.clone()))?
                        .force()?;
                    match map.get(&lookup) {
                        None => Ok(None),
                        Some(Ok(value)) => Ok(Some(value.clone())),
                        Some(Err(error)) => Err(error.clone()),
                    }
                });

                let entry = SessionValue::new(result);
                loader.session().add(key.clone(), entry.clone());
                entry
            }
        };

        // A previously-skipped reference can catch up here: the active
        // groups may have changed since the upgrade was recorded.
        for upgrade in entry.take_ready(loader.groups()) {
            trace!(
                key = %upgrade.reference.key(),
                property = upgrade.property.name(),
                "promoting deferred reference"
            );
            loader.load_ref(&upgrade.reference);
        }

        entry.result()
    }

    /// Issue the bulk fetch for everything pending and install the shared
    /// translated-map computation. No-op when nothing is pending. The fetch
    /// handle is obtained immediately; fetching, translation, and the
    /// post-translation hooks all run when the map is first forced.
    pub(crate) fn execute<R: 'static>(&self, loader: &Loader<R, V>) {
        let pending = mem::take(&mut *self.pending.borrow_mut());
        if pending.is_empty() {
            return;
        }

        trace!(keys = ?pending, "executing round");
        let fetched = loader.fetcher().bulk_get(loader.txn(), &pending);
        let engine = loader.weak();

        let translated = Deferred::new(move || {
            let loader = Loader::from_weak(&engine).ok_or(LoadError::SessionGone)?;
            let records = fetched.force()?;

            let mut map = HashMap::with_capacity(records.len());
            let mut ctx = LoadContext::new(loader.clone());
            for (key, record) in records.iter() {
                let value = loader.translator().translate(key, record, &mut ctx);
                if let Err(error) = &value {
                    trace!(key = %key, error = %error, "translation failed");
                }
                map.insert(key.clone(), value);
            }
            ctx.done();

            Ok(Rc::new(map))
        });

        *self.translated.borrow_mut() = Some(translated);
    }
}
