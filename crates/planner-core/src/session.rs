//! The session interface (spec §6 "Session interface", §1 "out of scope:
//! transport/session implementations").
//!
//! The planner only ever reads `transport_scope()`, `id()`, and `env()` (for
//! `@env` decorator pre-evaluation, spec §6) — everything else a real
//! session exposes (`Run`, `Put`/`Get`, `WithEnv`, `WithWorkdir`, `Cwd`,
//! `Close`) is irrelevant to this crate and intentionally omitted from the
//! trait below rather than stubbed.

/// The slice of a session's interface the planner core actually consumes.
pub trait Session {
    /// The execution target identity (local host, remote host key,
    /// container identity) — feeds directly into `ExprId` derivation
    /// (spec §4.6 "Transport identifier").
    fn transport_scope(&self) -> &str;

    /// A stable session identifier, surfaced in diagnostics.
    fn id(&self) -> &str;

    /// Environment variable lookup, used only for `@env` decorator
    /// pre-evaluation (spec §6).
    fn env(&self, name: &str) -> Option<String>;
}

/// A local, in-process `Session` for tests and the CLI demo.
#[derive(Debug, Clone)]
pub struct LocalSession {
    id: String,
    env: std::collections::HashMap<String, String>,
}

impl LocalSession {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), env: std::env::vars().collect() }
    }

    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }
}

impl Session for LocalSession {
    fn transport_scope(&self) -> &str {
        "local"
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn env(&self, name: &str) -> Option<String> {
        self.env.get(name).cloned()
    }
}
