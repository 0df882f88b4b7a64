//! The ExprID scheme (spec §4.6, §3 "ExprID").
//!
//! An `ExprId` is an opaque, content-addressed identity: two expressions
//! share an `ExprId` iff they are semantically interchangeable in the
//! current *transport × scope × raw-expression* triple (spec §3). It is
//! computed, not allocated — there is no counter anywhere in this module.

use std::fmt;

use sha2::{Digest, Sha256};

/// Opaque content-addressed identity for a resolvable expression.
///
/// Follows the teacher's newtype-with-accessor idiom (`namespace.rs`'s
/// `NamespaceId`), but the payload is a hash digest rather than a raw index,
/// since identity here must be computed deterministically from expression
/// content rather than assigned by allocation order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ExprId(String);

impl ExprId {
    /// Derives an `ExprId` from the three components spec §4.6 names:
    ///
    /// 1. `transport` — the transport identifier seen by the enclosing statement.
    /// 2. `raw_identity` — the canonical string form of the IR subtree.
    /// 3. `iteration` — `None` outside an unrolled loop body; `Some(loop_var_id)`
    ///    inside one, so that two iterations differ iff the loop variable differs.
    #[must_use]
    pub fn derive(transport: &str, raw_identity: &str, iteration: Option<&ExprId>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"transport:");
        hasher.update(transport.as_bytes());
        hasher.update(b"\0expr:");
        hasher.update(raw_identity.as_bytes());
        hasher.update(b"\0iter:");
        match iteration {
            Some(id) => hasher.update(id.as_str().as_bytes()),
            None => hasher.update(b"-"),
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Builds an `ExprId` that is defined to equal another one, e.g. a
    /// var-decl whose value is a var-ref copies the referent's `ExprId`
    /// outright (spec §3, §4.6 "var Y = @var.X").
    #[must_use]
    pub fn alias_of(other: &Self) -> Self {
        other.clone()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Only for tests and fixtures that need a deterministic id unrelated to
    /// content hashing (e.g. synthetic vault entries in unit tests).
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
