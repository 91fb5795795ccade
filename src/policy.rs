//! Load-group policy: which optional relationships are followed eagerly.
//!
//! The active group set belongs to the owning unit of work and may change
//! between calls within the same session; the engine only ever reads it.
//! That mutability is what makes upgrade promotion meaningful: a property
//! skipped under one group set can qualify under a later one.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

/// A caller-configurable policy token controlling eager resolution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadGroup(String);

impl LoadGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for LoadGroup {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LoadGroup {
    fn from(name: &str) -> Self {
        LoadGroup::new(name)
    }
}

/// Shared handle to the active group set. The unit of work and the engine
/// hold clones of the same handle; activation is visible to both.
#[derive(Debug, Clone, Default)]
pub struct LoadGroups {
    active: Rc<RefCell<BTreeSet<LoadGroup>>>,
}

impl LoadGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activate(&self, group: impl Into<LoadGroup>) {
        self.active.borrow_mut().insert(group.into());
    }

    pub fn deactivate(&self, group: &LoadGroup) {
        self.active.borrow_mut().remove(group);
    }

    pub fn contains(&self, group: &LoadGroup) -> bool {
        self.active.borrow().contains(group)
    }

    /// A copy of the currently active set.
    pub fn snapshot(&self) -> BTreeSet<LoadGroup> {
        self.active.borrow().clone()
    }
}

/// The load policy a property carries. No named groups means unconditional:
/// the property is loaded under any active group set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPolicy {
    groups: BTreeSet<LoadGroup>,
}

impl LoadPolicy {
    /// Load regardless of which groups are active.
    pub fn always() -> Self {
        Self {
            groups: BTreeSet::new(),
        }
    }

    /// Load only while at least one of `groups` is active.
    pub fn with_groups(groups: impl IntoIterator<Item = impl Into<LoadGroup>>) -> Self {
        Self {
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }
}

/// A property/field descriptor as the engine sees it: a name plus an
/// optional load policy. A property with no policy at all is never loaded
/// and never a candidate for upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    name: String,
    load: Option<LoadPolicy>,
}

impl Property {
    /// A property loaded under any active group set.
    pub fn eager(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            load: Some(LoadPolicy::always()),
        }
    }

    /// A property loaded only while one of `groups` is active.
    pub fn in_groups(
        name: impl Into<String>,
        groups: impl IntoIterator<Item = impl Into<LoadGroup>>,
    ) -> Self {
        Self {
            name: name.into(),
            load: Some(LoadPolicy::with_groups(groups)),
        }
    }

    /// A property with no load policy: permanently unresolved references.
    pub fn unloaded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            load: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this property carries any load policy at all, which makes it
    /// a candidate for later upgrade even when it does not qualify now.
    pub fn has_load_policy(&self) -> bool {
        self.load.is_some()
    }

    /// Whether this property qualifies for eager loading under the active
    /// groups. Pure predicate, no side effects.
    pub fn should_load(&self, active: &LoadGroups) -> bool {
        match &self.load {
            None => false,
            Some(policy) => {
                policy.groups.is_empty() || policy.groups.iter().any(|group| active.contains(group))
            }
        }
    }
}
