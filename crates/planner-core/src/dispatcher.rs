//! The command dispatcher (spec §4.8): chooses script mode vs. command
//! mode, and is the only module that knows how to report a missing target.
//!
//! Grounded on `repl.rs`'s top-level "what do we run, and how do we report
//! when we can't find it" orchestration role — the same shape, narrowed to
//! one lookup instead of a whole REPL command table.

use crate::decorator_iface::DecoratorRegistry;
use crate::error::{EventPosition, Example, PlannerError, PlannerResult};
use crate::ir::ExecutionGraph;
use crate::plan::{Plan, PlanKind};
use crate::precedence;
use crate::resolver;
use crate::session::Session;
use crate::telemetry::PlannerTracer;
use crate::vault::Vault;

/// Plans `graph`, either as a whole script (`target` empty, spec §4.8
/// "script mode") or as a single named function (`target` set, "command
/// mode"). Command mode never touches a non-target function's body — it
/// looks the name up, resolves only that `FunctionIr`, and materializes only
/// its steps (spec §8 S6).
///
/// # Errors
/// `TargetNotFound` in command mode when no function matches `target`
/// (carrying a fuzzy suggestion, the full available list, an example, and
/// the event position); resolver/materializer errors otherwise; surfaces
/// `PlanValidation` if the materialized plan fails its own format checks.
pub fn dispatch<T: PlannerTracer>(
    graph: ExecutionGraph,
    target: Option<&str>,
    kind: PlanKind,
    vault: &mut dyn Vault,
    decorators: &dyn DecoratorRegistry,
    session: &dyn Session,
    tracer: &mut T,
) -> PlannerResult<Plan> {
    let steps = match target {
        None => {
            let resolved = resolver::resolve(graph, vault, decorators, session, tracer)?;
            precedence::materialize(&resolved.top_level)?
        }
        Some(name) => {
            let func = graph.functions.get(name).cloned().ok_or_else(|| target_not_found(&graph, name))?;
            let body = resolver::resolve_function(&graph, &func, vault, decorators, session, tracer)?;
            precedence::materialize(&body)?
        }
    };
    let plan = Plan { kind, steps };
    plan.validate()?;
    Ok(plan)
}

fn target_not_found(graph: &ExecutionGraph, name: &str) -> PlannerError {
    let available = graph.function_names();
    let suggestion = closest_name(name, &available);
    PlannerError::TargetNotFound {
        name: name.to_owned(),
        suggestion,
        available,
        example: Example {
            description: "define a function with `fun` and call it by name".to_owned(),
            snippet: format!("fun {name}=echo \"hello from {name}\""),
        },
        position: EventPosition { index: 0, total: 0 },
    }
}

/// Closest of `available` to `name` by Levenshtein distance, ties broken by
/// whichever sorts first (spec §4.8 "closest fuzzy match among known
/// names"). No extra crate: a small hand-rolled edit-distance table is
/// plenty for a handful of function names, and keeps this module's only
/// dependency on the rest of the crate.
fn closest_name(name: &str, available: &[String]) -> Option<String> {
    available.iter().min_by_key(|candidate| edit_distance(name, candidate)).cloned()
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for i in 1..=a.len() {
        let mut prev_diag = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let above = row[j];
            row[j] = (row[j] + 1).min(row[j - 1] + 1).min(prev_diag + cost);
            prev_diag = above;
        }
    }
    row[b.len()]
}
