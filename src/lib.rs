//! Roundloader is a batch-loading engine in the
//! [dataloader pattern](https://github.com/graphql/dataloader): it sits
//! between application code requesting individual records by key and a
//! storage service that only supports bulk multi-key fetches, and coalesces
//! the point lookups issued over one logical unit of work into the minimum
//! number of bulk round-trips. Each caller gets a deferred handle that
//! resolves to its individual result once the shared round-trip completes.
//!
//! On top of the classic N+1 avoidance, roundloader adds:
//!
//! - a **session cache** scoped to the unit of work, so a key requested
//!   twice is fetched at most once for the whole session;
//! - **recursive parent resolution**: loading a record can require loading
//!   its parent (and so on up the ancestry chain), and the whole chain
//!   batches into the same round;
//! - **conditional, upgradable references**: a reference can be deliberately
//!   left unresolved because the active load groups did not require it, and
//!   promoted later if a subsequent access happens under groups that do.
//!
//! ## Overview
//!
//! Work is organized into *rounds*. Calling [`Loader::resolve`] only adds
//! the key to the current round's pending set and hands back a [`Deferred`]
//! result; nothing touches storage. Calling [`Loader::execute`] retires the
//! round, issues one bulk fetch for everything it accumulated, and installs
//! a fresh round for the next generation of resolves. Forcing any deferred
//! result from the retired round blocks on that round's fetch and
//! translation, exactly once, no matter how many results share it.
//!
//! ```
//! use std::collections::{BTreeSet, HashMap};
//! use std::rc::Rc;
//!
//! use roundloader::{
//!     Deferred, Fetcher, Key, KeyMetadata, LoadContext, LoadError, LoadGroups, LoadRules,
//!     Loader, RecordMap, Translator, TxnHandle,
//! };
//!
//! // A storage backend with one record kind: string payloads keyed by Key.
//! struct Directory {
//!     records: HashMap<Key, String>,
//! }
//!
//! impl Fetcher for Directory {
//!     type Record = String;
//!
//!     fn bulk_get(
//!         &self,
//!         _txn: Option<&TxnHandle>,
//!         keys: &BTreeSet<Key>,
//!     ) -> Deferred<RecordMap<String>> {
//!         let mut found = HashMap::new();
//!         for key in keys {
//!             if let Some(record) = self.records.get(key) {
//!                 found.insert(key.clone(), record.clone());
//!             }
//!         }
//!         Deferred::ready(Rc::new(found))
//!     }
//! }
//!
//! struct Plain;
//!
//! impl Translator for Plain {
//!     type Record = String;
//!     type Value = String;
//!
//!     fn translate(
//!         &self,
//!         _key: &Key,
//!         record: &String,
//!         _ctx: &mut LoadContext<String, String>,
//!     ) -> Result<String, LoadError> {
//!         Ok(record.clone())
//!     }
//! }
//!
//! struct NoParents;
//!
//! impl KeyMetadata for NoParents {
//!     fn should_load_parent(&self, _key: &Key, _groups: &LoadGroups) -> bool {
//!         false
//!     }
//! }
//!
//! let mut records = HashMap::new();
//! records.insert(Key::new("user", 7), "alice".to_string());
//!
//! let loader = Loader::new(LoadRules {
//!     fetcher: Rc::new(Directory { records }),
//!     translator: Rc::new(Plain),
//!     metadata: Rc::new(NoParents),
//!     groups: LoadGroups::new(),
//!     txn: None,
//!     max_pending: None,
//! });
//!
//! // Both keys accumulate into the same round; one bulk fetch serves both.
//! let alice = loader.resolve(&Key::new("user", 7));
//! let bob = loader.resolve(&Key::new("user", 8));
//! loader.execute();
//!
//! assert_eq!(alice.force().unwrap(), Some("alice".to_string()));
//! // A key with no record is absent, not an error.
//! assert_eq!(bob.force().unwrap(), None);
//! ```
//!
//! ## Design notes
//!
//! ### Explicit deferred cells
//!
//! All laziness goes through [`Deferred`], an explicit memoizing result cell,
//! rather than a runtime's async primitives. The point is that "which round
//! satisfies this result" is a concrete, inspectable relationship: each
//! per-key result captures the round that created it, so a reference issued
//! while round N was current still resolves against round N's map after
//! round N+1 has taken over. Forcing is also where failures surface: a
//! fetch or translation error is memoized and re-observed on every force,
//! never retried inside the engine.
//!
//! ### Session cache and upgrades
//!
//! The session cache holds one entry per key ever requested in the unit of
//! work and never evicts, which is what makes the at-most-one-fetch-per-key
//! guarantee session-wide instead of round-wide. Each entry carries a
//! worklist of *upgrades*: references whose resolution was skipped under the
//! load groups active at creation time. Every later access to the entry
//! drains whatever part of the worklist qualifies under the groups active at
//! *that* moment, so a "skip now, maybe load later" decision is revisited
//! for free.
//!
//! ### Single thread of control
//!
//! One logical thread drives a unit of work, so the engine uses `Rc` and
//! `RefCell` and provides no internal synchronization; a host that fans
//! resolution out across threads must serialize access to the loader.

mod deferred;
mod error;
mod key;
mod loader;
mod policy;
mod reference;
mod round;
mod session;

pub use deferred::Deferred;
pub use error::LoadError;
pub use key::{Key, KeyId};
pub use loader::{Fetcher, KeyMetadata, LoadContext, LoadRules, Loader, RecordMap, Translator, TxnHandle};
pub use policy::{LoadGroup, LoadGroups, LoadPolicy, Property};
pub use reference::Ref;
