//! The vault interface (spec §6 "Vault interface", §1 "out of scope").
//!
//! The cryptographic vault itself is an external collaborator; this module
//! only defines the narrow trait the resolver is allowed to call through,
//! plus a minimal in-memory fake for tests. Grounded on
//! `session_manager.rs`'s split between "what the core owns" and "what an
//! external driver provides".

use crate::exprid::ExprId;
use crate::ir::Value;

/// The five operations spec §6 names. A real vault serializes concurrent
/// mutation through its own locking (spec §5 "Shared resources"); this trait
/// says nothing about that — it is the caller's concern.
pub trait Vault {
    /// Registers a variable name with a provenance hint, returning a fresh
    /// `ExprId`. `provenance_key` is opaque to this trait (e.g. a transport
    /// identifier or secret classification tag).
    fn declare_variable(&mut self, name: &str, provenance_key: &str) -> ExprId;

    /// Binds a value to an id without marking it touched.
    fn store_unresolved_value(&mut self, id: &ExprId, value: Value);

    /// Reads a value previously stored for `id`.
    fn get_unresolved_value(&self, id: &ExprId) -> Option<Value>;

    /// Marks `id` as part of the reachable resolution set (spec §3
    /// invariant 5, §4.5 branch pruning).
    fn touch(&mut self, id: &ExprId);

    /// Whether `id` has been touched.
    fn is_touched(&self, id: &ExprId) -> bool;
}

/// An in-memory `Vault` for tests and the CLI demo harness. Not a
/// production vault implementation (that stays an external collaborator
/// per spec §1) — this exists purely so the resolver and its tests have
/// something concrete to drive.
#[derive(Debug, Default)]
pub struct InMemoryVault {
    values: std::collections::HashMap<String, Value>,
    touched: std::collections::HashSet<String>,
    next_declare: u64,
}

impl InMemoryVault {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Vault for InMemoryVault {
    fn declare_variable(&mut self, name: &str, provenance_key: &str) -> ExprId {
        self.next_declare += 1;
        ExprId::from_raw(format!("decl:{provenance_key}:{name}:{}", self.next_declare))
    }

    fn store_unresolved_value(&mut self, id: &ExprId, value: Value) {
        self.values.insert(id.as_str().to_owned(), value);
    }

    fn get_unresolved_value(&self, id: &ExprId) -> Option<Value> {
        self.values.get(id.as_str()).cloned()
    }

    fn touch(&mut self, id: &ExprId) {
        self.touched.insert(id.as_str().to_owned());
    }

    fn is_touched(&self, id: &ExprId) -> bool {
        self.touched.contains(id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_get_round_trips() {
        let mut vault = InMemoryVault::new();
        let id = ExprId::from_raw("x");
        vault.store_unresolved_value(&id, Value::Int(42));
        assert_eq!(vault.get_unresolved_value(&id), Some(Value::Int(42)));
    }

    #[test]
    fn touch_is_observable_and_idempotent() {
        let mut vault = InMemoryVault::new();
        let id = ExprId::from_raw("x");
        assert!(!vault.is_touched(&id));
        vault.touch(&id);
        vault.touch(&id);
        assert!(vault.is_touched(&id));
    }
}
