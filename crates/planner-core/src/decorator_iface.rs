//! The decorator interface (spec §6 "Decorator interface", §1 "out of
//! scope: ... individual decorator implementations").
//!
//! The registry and every concrete decorator (`@env`, `@secret`, `@retry`,
//! ...) live outside this crate. This module defines the trait the resolver
//! batches calls through, plus a minimal in-memory fake for tests.

use std::collections::BTreeMap;

use crate::ir::Value;

/// What a decorator can do, consulted by the resolver when deciding
/// transport-sensitive identity (spec §4.6 "Transport identifier").
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Capabilities {
    pub transport_scope: bool,
}

/// Static description of a decorator (spec §6).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Descriptor {
    pub path: String,
    pub capabilities: Capabilities,
}

/// Context passed to every batch resolve call (spec §6 `ValueEvalContext`).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValueEvalContext {
    pub plan_hash: String,
    pub step_path: Vec<usize>,
}

/// One call within a batch (spec §6 `ValueCall`). Positional args are keyed
/// `arg1`, `arg2`, ... unless rebound to canonical names by the schema
/// (spec §4.3) before reaching here.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValueCall {
    pub path: String,
    pub primary: Option<String>,
    pub params: BTreeMap<String, Value>,
}

/// The outcome of one call in a batch (spec §6).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CallResult {
    pub value: Value,
    pub origin: String,
}

/// A decorator error, propagated verbatim with the decorator path and call
/// index prepended by the resolver (spec §7 `DecoratorError`).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DecoratorError(pub String);

impl std::fmt::Display for DecoratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for DecoratorError {}

/// A decorator, consumed only through this narrow interface (spec §6).
/// `Resolve` is synchronous here; spec §5 allows a real implementation to
/// invoke concurrently internally so long as results return in the order
/// the calls were submitted.
pub trait Decorator {
    fn descriptor(&self) -> &Descriptor;

    /// Resolves every call in the batch, in the order given, returning one
    /// result per call or an error for the whole batch.
    fn resolve(&self, ctx: &ValueEvalContext, calls: &[ValueCall]) -> Result<Vec<CallResult>, DecoratorError>;
}

/// A decorator registry, consulted read-only by the resolver (spec §5
/// "Shared resources: Decorator registry — read-only from the planner's
/// point of view").
pub trait DecoratorRegistry {
    fn get(&self, path: &str) -> Option<&dyn Decorator>;
}

/// A minimal in-memory registry for tests: every decorator just echoes its
/// primary parameter (or the first positional arg) back as a string value.
/// Not a real decorator implementation (out of scope, spec §1).
#[derive(Default)]
pub struct EchoRegistry {
    known: std::collections::HashSet<String>,
}

impl EchoRegistry {
    #[must_use]
    pub fn with_paths(paths: impl IntoIterator<Item = &'static str>) -> Self {
        Self { known: paths.into_iter().map(str::to_owned).collect() }
    }
}

struct EchoDecorator(Descriptor);

impl Decorator for EchoDecorator {
    fn descriptor(&self) -> &Descriptor {
        &self.0
    }

    fn resolve(&self, _ctx: &ValueEvalContext, calls: &[ValueCall]) -> Result<Vec<CallResult>, DecoratorError> {
        Ok(calls
            .iter()
            .map(|call| {
                let value = call
                    .primary
                    .as_ref()
                    .and_then(|p| call.params.get(p))
                    .or_else(|| call.params.get("arg1"))
                    .cloned()
                    .unwrap_or(Value::Null);
                CallResult { value, origin: call.path.clone() }
            })
            .collect())
    }
}

impl DecoratorRegistry for EchoRegistry {
    fn get(&self, path: &str) -> Option<&dyn Decorator> {
        // Leaks a small boxed value per lookup would be wasteful; tests
        // using this fake only need a descriptor + echo behavior, so we
        // build it on demand via a thread-local-free approach: return None
        // for unknown paths, and for known ones hand back a static table
        // entry built once.
        if self.known.contains(path) {
            EchoRegistry::cached(path)
        } else {
            None
        }
    }
}

impl EchoRegistry {
    fn cached(path: &str) -> Option<&'static dyn Decorator> {
        use std::collections::HashMap;
        use std::sync::OnceLock;
        static TABLE: OnceLock<std::sync::Mutex<HashMap<String, &'static EchoDecorator>>> = OnceLock::new();
        let table = TABLE.get_or_init(|| std::sync::Mutex::new(HashMap::new()));
        let mut guard = table.lock().expect("echo registry table lock poisoned");
        if let Some(existing) = guard.get(path) {
            return Some(*existing);
        }
        let leaked: &'static EchoDecorator = Box::leak(Box::new(EchoDecorator(Descriptor {
            path: path.to_owned(),
            capabilities: Capabilities { transport_scope: true },
        })));
        guard.insert(path.to_owned(), leaked);
        Some(leaked)
    }
}
