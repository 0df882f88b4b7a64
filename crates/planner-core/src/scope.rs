//! Lexically nested variable scope (spec §3 "ScopeStack", §4.1).
//!
//! Grounded on `namespace.rs`'s index-based frame stack: a small stack of
//! maps, pushed and popped around exactly the constructs the spec names as
//! scope-creating (`if`/`when`/`for` bodies, `try`/`catch`/`finally`,
//! function bodies). Ordinary statements and decorator argument blocks
//! share the enclosing frame — they never push.

use std::collections::HashMap;

use crate::exprid::ExprId;

/// A lexically nested mapping from variable name to `ExprId`.
///
/// # Design rationale
///
/// Function bodies must see the scope captured at *definition* site, not at
/// call site (spec §3 invariant 4, §4.1). `clone()` exists for exactly that:
/// snapshotting the enclosing frame into a `FunctionIR` at the point the
/// `fun` declaration is built, independent of whatever scopes come and go
/// later while the builder keeps walking.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ScopeStack {
    frames: Vec<HashMap<String, ExprId>>,
}

impl ScopeStack {
    /// A scope stack with a single (global) frame.
    #[must_use]
    pub fn new() -> Self {
        Self { frames: vec![HashMap::new()] }
    }

    /// Pushes a new lexical frame. Call this on entry to a then-branch,
    /// else-branch, when-arm body, for-body, catch body, finally body, or
    /// function body — and nowhere else (spec §4.1).
    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    /// Pops the innermost lexical frame.
    ///
    /// # Panics
    /// Panics if called without a matching `push()` — every call site in
    /// this crate is structured as a push/pop pair around a single block,
    /// so an unbalanced pop is a builder bug, not a runtime condition.
    pub fn pop(&mut self) {
        assert!(self.frames.len() > 1, "pop() called on the outermost scope frame");
        self.frames.pop();
    }

    /// Binds `name` to `id` in the innermost frame, shadowing any outer
    /// binding of the same name for the remainder of this frame's lifetime.
    pub fn define(&mut self, name: impl Into<String>, id: ExprId) {
        self.frames
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name.into(), id);
    }

    /// Looks up `name`, walking outward from the innermost frame to the
    /// global frame. Returns `None` when undefined anywhere reachable —
    /// callers surface that as `PlannerError::UndefinedName`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&ExprId> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Number of frames currently pushed, for scope-discipline assertions
    /// in tests (spec §8 property 2).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_parents() {
        let mut scope = ScopeStack::new();
        scope.define("a", ExprId::from_raw("id-a"));
        scope.push();
        scope.define("b", ExprId::from_raw("id-b"));
        assert_eq!(scope.lookup("a").map(ExprId::as_str), Some("id-a"));
        assert_eq!(scope.lookup("b").map(ExprId::as_str), Some("id-b"));
        scope.pop();
        assert_eq!(scope.lookup("b"), None, "name declared inside a popped block must not leak");
        assert_eq!(scope.lookup("a").map(ExprId::as_str), Some("id-a"));
    }

    #[test]
    fn inner_frame_shadows_outer() {
        let mut scope = ScopeStack::new();
        scope.define("x", ExprId::from_raw("outer"));
        scope.push();
        scope.define("x", ExprId::from_raw("inner"));
        assert_eq!(scope.lookup("x").map(ExprId::as_str), Some("inner"));
        scope.pop();
        assert_eq!(scope.lookup("x").map(ExprId::as_str), Some("outer"));
    }

    #[test]
    fn clone_snapshots_independently() {
        let mut scope = ScopeStack::new();
        scope.define("x", ExprId::from_raw("v1"));
        let snapshot = scope.clone();
        scope.define("x", ExprId::from_raw("v2"));
        assert_eq!(snapshot.lookup("x").map(ExprId::as_str), Some("v1"));
        assert_eq!(scope.lookup("x").map(ExprId::as_str), Some("v2"));
    }

    #[test]
    #[should_panic(expected = "outermost scope frame")]
    fn pop_below_global_panics() {
        let mut scope = ScopeStack::new();
        scope.pop();
    }
}
