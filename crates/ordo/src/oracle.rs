//! Partition ownership answers.

use std::collections::HashMap;
use std::sync::RwLock;

use ordo_core::ContextId;

/// What this node knows about owning a context right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    NotOwned,
    /// The partition is moving; ask again later.
    InDoubt,
}

ordo_core::enum_str! {
    impl Ownership {
        pub fn as_str(&self) -> &'static str;
        pub fn parse_str(raw: &str) -> Option<Self>;
        variants {
            Owned => ["owned"],
            NotOwned => ["not_owned"],
            InDoubt => ["in_doubt"],
        }
    }
}

pub trait OwnershipOracle: Send + Sync {
    fn ownership(&self, context: &ContextId) -> Ownership;

    fn is_owned_by_this_node(&self, context: &ContextId) -> bool {
        self.ownership(context) == Ownership::Owned
    }
}

/// Ownership answered from a table, with a default for unlisted contexts.
pub struct OwnershipTable {
    default: RwLock<Ownership>,
    overrides: RwLock<HashMap<ContextId, Ownership>>,
}

impl OwnershipTable {
    pub fn new(default: Ownership) -> Self {
        Self {
            default: RwLock::new(default),
            overrides: RwLock::new(HashMap::new()),
        }
    }

    /// This node owns every context.
    pub fn owning_all() -> Self {
        Self::new(Ownership::Owned)
    }

    pub fn set(&self, context: ContextId, ownership: Ownership) {
        self.overrides
            .write()
            .expect("ownership table poisoned")
            .insert(context, ownership);
    }

    pub fn clear(&self, context: &ContextId) {
        self.overrides
            .write()
            .expect("ownership table poisoned")
            .remove(context);
    }

    pub fn set_default(&self, ownership: Ownership) {
        *self.default.write().expect("ownership table poisoned") = ownership;
    }
}

impl Default for OwnershipTable {
    fn default() -> Self {
        Self::owning_all()
    }
}

impl OwnershipOracle for OwnershipTable {
    fn ownership(&self, context: &ContextId) -> Ownership {
        if let Some(ownership) = self
            .overrides
            .read()
            .expect("ownership table poisoned")
            .get(context)
        {
            return *ownership;
        }
        *self.default.read().expect("ownership table poisoned")
    }
}
