//! Planner core for a shell-automation DSL: turns a parsed event/token
//! stream into an executable plan through three stages — IR construction
//! ([`builder`]), wave-based resolution ([`resolver`]), and plan
//! materialization ([`precedence`], [`plan`]) — orchestrated by
//! [`dispatcher`] for script vs. command mode.
//!
//! Out of scope, consumed only through the trait interfaces in [`vault`],
//! [`decorator_iface`], and [`session`]: the lexer/parser that produces a
//! [`events::ParseTree`], the execution engine that runs a materialized
//! [`plan::Plan`], transport/session implementations, the decorator
//! registry and individual decorators, the vault, CLI/config surfaces
//! beyond [`config::PlannerConfig`], and file I/O.

pub mod builder;
pub mod config;
pub mod decorator;
pub mod decorator_iface;
pub mod dispatcher;
pub mod error;
pub mod eval;
pub mod events;
pub mod exprid;
pub mod ir;
pub mod plan;
pub mod precedence;
pub mod resolver;
pub mod scope;
pub mod session;
pub mod telemetry;
pub mod vault;

pub use config::{IdFactory, PlannerConfig, SequentialIdFactory, Telemetry};
pub use error::{Example, EventPosition, PlannerError, PlannerResult};
pub use events::{Event, NodeKind, ParseTree, Token};
pub use exprid::ExprId;
pub use plan::{Command, ExecutionNode, Plan, PlanKind, Step};
pub use telemetry::{DebugLevel, NoopTracer, PlannerTracer, TraceEvent};

use decorator::DecoratorSchemaRegistry;
use decorator_iface::DecoratorRegistry;
use session::Session;
use vault::Vault;

/// Runs all three stages end to end: build IR from `tree` (which refuses a
/// stream the parser already flagged, spec §7 `ParseConsumed`), resolve it
/// (script mode when `config.target` is empty, command mode otherwise), and
/// materialize the result as a `kind` plan.
///
/// # Errors
/// Any `PlannerError` raised by a stage; the first one encountered, never
/// accumulated (spec §9 Design Notes "Error channels").
pub fn plan<T: telemetry::PlannerTracer>(
    tree: &events::ParseTree,
    schemas: &dyn DecoratorSchemaRegistry,
    config: &config::PlannerConfig,
    kind: plan::PlanKind,
    vault: &mut dyn Vault,
    decorators: &dyn DecoratorRegistry,
    session: &dyn Session,
    tracer: &mut T,
) -> error::PlannerResult<plan::Plan> {
    let graph = builder::build(tree, schemas)?;
    dispatcher::dispatch(graph, config.target.as_deref(), kind, vault, decorators, session, tracer)
}
