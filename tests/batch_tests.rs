//! These tests ensure that keys accumulated in one round are served by a
//! single bulk fetch, that rounds stay independent across generations, and
//! that parent chains batch into the round that triggered them.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use roundloader::{
    Deferred, Fetcher, Key, KeyMetadata, LoadContext, LoadError, LoadGroups, LoadRules, Loader,
    RecordMap, Translator, TxnHandle,
};

#[derive(Debug, Clone)]
struct TestRecord {
    name: String,
}

/// In-memory backend that records every bulk call it receives.
#[derive(Default)]
struct MemStore {
    records: RefCell<HashMap<Key, TestRecord>>,
    calls: RefCell<Vec<BTreeSet<Key>>>,
    txns: RefCell<Vec<Option<TxnHandle>>>,
}

impl MemStore {
    fn insert(&self, key: Key, name: &str) {
        self.records.borrow_mut().insert(
            key,
            TestRecord {
                name: name.to_string(),
            },
        );
    }

    fn calls(&self) -> Vec<BTreeSet<Key>> {
        self.calls.borrow().clone()
    }
}

impl Fetcher for MemStore {
    type Record = TestRecord;

    fn bulk_get(
        &self,
        txn: Option<&TxnHandle>,
        keys: &BTreeSet<Key>,
    ) -> Deferred<RecordMap<TestRecord>> {
        self.calls.borrow_mut().push(keys.clone());
        self.txns.borrow_mut().push(txn.cloned());

        let mut found = HashMap::new();
        for key in keys {
            if let Some(record) = self.records.borrow().get(key) {
                found.insert(key.clone(), record.clone());
            }
        }
        Deferred::ready(Rc::new(found))
    }
}

struct Upcase;

impl Translator for Upcase {
    type Record = TestRecord;
    type Value = String;

    fn translate(
        &self,
        _key: &Key,
        record: &TestRecord,
        _ctx: &mut LoadContext<TestRecord, String>,
    ) -> Result<String, LoadError> {
        Ok(record.name.to_uppercase())
    }
}

struct NoParents;

impl KeyMetadata for NoParents {
    fn should_load_parent(&self, _key: &Key, _groups: &LoadGroups) -> bool {
        false
    }
}

struct AlwaysParents;

impl KeyMetadata for AlwaysParents {
    fn should_load_parent(&self, _key: &Key, _groups: &LoadGroups) -> bool {
        true
    }
}

fn loader_with(
    store: &Rc<MemStore>,
    metadata: Rc<dyn KeyMetadata>,
    txn: Option<TxnHandle>,
    max_pending: Option<NonZeroUsize>,
) -> Loader<TestRecord, String> {
    let fetcher: Rc<dyn Fetcher<Record = TestRecord>> = store.clone();
    Loader::new(LoadRules {
        fetcher,
        translator: Rc::new(Upcase),
        metadata,
        groups: LoadGroups::new(),
        txn,
        max_pending,
    })
}

fn loader(store: &Rc<MemStore>) -> Loader<TestRecord, String> {
    loader_with(store, Rc::new(NoParents), None, None)
}

fn keys(list: &[&Key]) -> BTreeSet<Key> {
    list.iter().map(|key| (*key).clone()).collect()
}

#[test]
fn coalesces_accumulated_keys() {
    let store = Rc::new(MemStore::default());
    let k1 = Key::new("user", 1);
    let k2 = Key::new("user", 2);
    store.insert(k1.clone(), "alice");
    store.insert(k2.clone(), "bob");

    let loader = loader(&store);
    let first = loader.resolve(&k1);
    let second = loader.resolve(&k2);
    loader.execute();

    assert_eq!(first.force().unwrap(), Some("ALICE".to_string()));
    assert_eq!(second.force().unwrap(), Some("BOB".to_string()));
    assert_eq!(store.calls(), vec![keys(&[&k1, &k2])]);
}

#[test]
fn session_caches_repeated_keys() {
    let store = Rc::new(MemStore::default());
    let k1 = Key::new("user", 1);
    store.insert(k1.clone(), "alice");

    let loader = loader(&store);
    let first = loader.resolve(&k1);
    loader.execute();
    assert_eq!(first.force().unwrap(), Some("ALICE".to_string()));

    // A later request for the same key is a session hit: same settled
    // result, nothing pending, no second fetch even after another execute.
    let again = loader.resolve(&k1);
    loader.execute();
    assert_eq!(again.force().unwrap(), Some("ALICE".to_string()));
    assert_eq!(store.calls(), vec![keys(&[&k1])]);
}

#[test]
fn parent_chain_joins_same_round() {
    let store = Rc::new(MemStore::default());
    let org = Key::new("org", 1);
    let team = Key::child(org.clone(), "team", 2);
    let user = Key::child(team.clone(), "user", 3);
    store.insert(org.clone(), "acme");
    store.insert(team.clone(), "core");
    store.insert(user.clone(), "alice");

    let loader = loader_with(&store, Rc::new(AlwaysParents), None, None);
    let result = loader.resolve(&user);
    loader.execute();

    assert_eq!(result.force().unwrap(), Some("ALICE".to_string()));
    assert_eq!(store.calls(), vec![keys(&[&org, &team, &user])]);
}

#[test]
fn parent_already_requested_is_not_duplicated() {
    let store = Rc::new(MemStore::default());
    let org = Key::new("org", 1);
    let team = Key::child(org.clone(), "team", 2);
    store.insert(org.clone(), "acme");
    store.insert(team.clone(), "core");

    let loader = loader_with(&store, Rc::new(AlwaysParents), None, None);
    let parent = loader.resolve(&org);
    let child = loader.resolve(&team);
    loader.execute();

    assert_eq!(parent.force().unwrap(), Some("ACME".to_string()));
    assert_eq!(child.force().unwrap(), Some("CORE".to_string()));
    assert_eq!(store.calls(), vec![keys(&[&org, &team])]);
}

#[test]
fn sequential_rounds_fetch_separately() {
    let store = Rc::new(MemStore::default());
    let k1 = Key::new("user", 1);
    let k2 = Key::new("user", 2);
    store.insert(k1.clone(), "alice");
    store.insert(k2.clone(), "bob");

    let loader = loader(&store);
    let first = loader.resolve(&k1);
    loader.execute();
    let second = loader.resolve(&k2);
    loader.execute();

    assert_eq!(first.force().unwrap(), Some("ALICE".to_string()));
    assert_eq!(second.force().unwrap(), Some("BOB".to_string()));
    assert_eq!(store.calls(), vec![keys(&[&k1]), keys(&[&k2])]);
}

#[test]
fn results_stay_bound_to_their_round() {
    let store = Rc::new(MemStore::default());
    let k1 = Key::new("user", 1);
    let k2 = Key::new("user", 2);
    store.insert(k1.clone(), "alice");
    store.insert(k2.clone(), "bob");

    let loader = loader(&store);
    let first = loader.resolve(&k1);
    loader.execute();
    let second = loader.resolve(&k2);
    loader.execute();

    // Forcing in reverse creation order: each result resolves against the
    // round that created it, not the round current at force time.
    assert_eq!(second.force().unwrap(), Some("BOB".to_string()));
    assert_eq!(first.force().unwrap(), Some("ALICE".to_string()));
}

#[test]
fn missing_key_resolves_to_none() {
    let store = Rc::new(MemStore::default());
    let ghost = Key::new("user", 404);

    let loader = loader(&store);
    let result = loader.resolve(&ghost);
    loader.execute();

    assert_eq!(result.force().unwrap(), None);
}

#[test]
fn empty_round_issues_no_fetch() {
    let store = Rc::new(MemStore::default());
    let loader = loader(&store);

    loader.execute();
    loader.execute();

    assert_eq!(store.calls(), Vec::<BTreeSet<Key>>::new());
}

#[test]
fn max_pending_dispatches_early() {
    let store = Rc::new(MemStore::default());
    let k1 = Key::new("user", 1);
    let k2 = Key::new("user", 2);
    store.insert(k1.clone(), "alice");
    store.insert(k2.clone(), "bob");

    let loader = loader_with(&store, Rc::new(NoParents), None, NonZeroUsize::new(2));
    let first = loader.resolve(&k1);
    assert_eq!(store.calls().len(), 0);

    // The second key fills the round; the fetch goes out without an
    // explicit execute call.
    let second = loader.resolve(&k2);
    assert_eq!(store.calls(), vec![keys(&[&k1, &k2])]);
    assert_eq!(first.force().unwrap(), Some("ALICE".to_string()));
    assert_eq!(second.force().unwrap(), Some("BOB".to_string()));
}

#[test]
fn primed_key_skips_storage() {
    let store = Rc::new(MemStore::default());
    let k1 = Key::new("user", 1);

    let loader = loader(&store);
    loader.prime(k1.clone(), "SEEDED".to_string());
    let result = loader.resolve(&k1);
    loader.execute();

    assert_eq!(result.force().unwrap(), Some("SEEDED".to_string()));
    assert_eq!(store.calls(), Vec::<BTreeSet<Key>>::new());
}

#[test]
fn txn_handle_reaches_fetcher() {
    let store = Rc::new(MemStore::default());
    let k1 = Key::new("user", 1);
    store.insert(k1.clone(), "alice");

    let loader = loader_with(&store, Rc::new(NoParents), Some(TxnHandle(42)), None);
    loader.resolve(&k1);
    loader.execute();

    assert_eq!(*store.txns.borrow(), vec![Some(TxnHandle(42))]);
}

/// Translator that discovers a nested load while translating `trigger` and
/// defers it to the end of the round's translation pass.
struct Chain {
    trigger: Key,
    next: Key,
}

impl Translator for Chain {
    type Record = TestRecord;
    type Value = String;

    fn translate(
        &self,
        key: &Key,
        record: &TestRecord,
        ctx: &mut LoadContext<TestRecord, String>,
    ) -> Result<String, LoadError> {
        if *key == self.trigger {
            let next = self.next.clone();
            ctx.defer(move |loader| {
                loader.resolve(&next);
            });
        }
        Ok(record.name.to_uppercase())
    }
}

#[test]
fn deferred_hooks_run_after_translation() {
    let store = Rc::new(MemStore::default());
    let k1 = Key::new("user", 1);
    let k2 = Key::new("user", 2);
    store.insert(k1.clone(), "alice");
    store.insert(k2.clone(), "bob");

    let fetcher: Rc<dyn Fetcher<Record = TestRecord>> = store.clone();
    let loader = Loader::new(LoadRules {
        fetcher,
        translator: Rc::new(Chain {
            trigger: k1.clone(),
            next: k2.clone(),
        }),
        metadata: Rc::new(NoParents),
        groups: LoadGroups::new(),
        txn: None,
        max_pending: None,
    });

    let first = loader.resolve(&k1);
    loader.execute();
    assert_eq!(first.force().unwrap(), Some("ALICE".to_string()));

    // The hook resolved k2 into the then-current round; executing it
    // fetches the nested key.
    loader.execute();
    assert_eq!(store.calls(), vec![keys(&[&k1]), keys(&[&k2])]);
    assert_eq!(loader.resolve(&k2).force().unwrap(), Some("BOB".to_string()));
}
