//! The materialized plan (spec §4.7, §6 "Plan format").
//!
//! Everything here is data, produced once by [`crate::precedence`] and
//! otherwise immutable. Grounded on `expressions.rs`'s closed `Expr` sum type
//! (spec Design Notes §9: implement the core's two closed sums as tagged
//! variants, keep virtual dispatch to a handful of named operations) —
//! `ExecutionNode` is this crate's third closed sum, alongside `StatementIr`
//! and `ExprIr`.

use std::collections::BTreeMap;

use crate::error::{PlannerError, PlannerResult};
use crate::ir::{RedirectMode, Value};

/// Whether a plan is for display (`ouros view`-style dry run) or for actual
/// execution. Carried on the plan header (spec §6 "Plan format").
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanKind {
    View,
    Run,
}

/// The materialized output: ordered Steps whose Trees are `ExecutionNode`s
/// (GLOSSARY "Plan").
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Plan {
    #[serde(rename = "PlanKind")]
    pub kind: PlanKind,
    pub steps: Vec<Step>,
}

/// One top-level statement's materialized tree, numbered in document order.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Step {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "Tree")]
    pub tree: ExecutionNode,
}

/// A single materialized command: its decorator path (`"@shell"` for a bare
/// shell command), its canonicalized, now-concrete argument values, and the
/// `>`/`>>`/`<` redirect (if any) applied to it (spec §4.2 "apply to the
/// immediately preceding command statement"). `BTreeMap` keeps the arg map's
/// keys sorted, so two equal commands always serialize byte-identically
/// (spec §6 "deterministic serialization").
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Command {
    pub path: String,
    pub args: BTreeMap<String, Value>,
    pub redirect: Option<(RedirectMode, Value)>,
}

impl Command {
    #[must_use]
    pub fn is_shell(&self) -> bool {
        self.path == "@shell"
    }
}

/// Plan-tree node (spec §4.7). A `CommandNode` is either a bare shell command
/// (`path == "@shell"`) or a decorator call; `block` holds the nested child
/// Steps a decorator-with-body form produces, empty for a bare command.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ExecutionNode {
    CommandNode { command: Command, block: Vec<Step> },
    /// Left-to-right `|` grouping: `a | b | c` is one `PipelineNode` of three
    /// members, not a right-nested chain (spec §4.7 "`|` groups left-to-right
    /// into one PipelineNode").
    PipelineNode(Vec<ExecutionNode>),
    /// Left-associative `&&`.
    AndNode(Box<ExecutionNode>, Box<ExecutionNode>),
    /// Left-associative `||`.
    OrNode(Box<ExecutionNode>, Box<ExecutionNode>),
    /// `;`-separated statements at the same precedence level (spec §4.7
    /// "`;` builds one SequenceNode"; the lowest-precedence operator,
    /// GLOSSARY "LogicNode").
    SequenceNode(Vec<ExecutionNode>),
    /// Wraps the surviving branch(es) of an `if`/`for`/`when`/`try` (GLOSSARY
    /// "LogicNode"). `taken` is `Some` for `If`/`When` (mirrors
    /// `BlockerIr::taken`), `None` for `For`/`Try`, which have no single
    /// taken/not-taken flag. `steps` may be empty, to preserve plan shape
    /// when every branch was pruned.
    LogicNode { taken: Option<bool>, steps: Vec<Step> },
}

impl Plan {
    /// Plan-format validation (spec §4.7 "validation rejects..."): non-empty
    /// step lists throughout, strictly monotonic Step IDs starting at 1, no
    /// empty `PipelineNode`/`SequenceNode`, and every `@shell` `CommandNode`
    /// carries a non-empty `command` arg.
    ///
    /// # Errors
    /// `PlannerError::PlanValidation` naming the first rule violated.
    pub fn validate(&self) -> PlannerResult<()> {
        validate_steps(&self.steps)
    }
}

fn validate_steps(steps: &[Step]) -> PlannerResult<()> {
    if steps.is_empty() {
        return Err(PlannerError::PlanValidation { message: "a plan/block must have at least one step".to_owned() });
    }
    let mut expected = 1u32;
    for step in steps {
        if step.id != expected {
            return Err(PlannerError::PlanValidation {
                message: format!("step IDs must be monotonic from 1, got {} where {expected} was expected", step.id),
            });
        }
        expected += 1;
        validate_node(&step.tree)?;
    }
    Ok(())
}

fn validate_node(node: &ExecutionNode) -> PlannerResult<()> {
    match node {
        ExecutionNode::CommandNode { command, block } => {
            if command.path.is_empty() {
                return Err(PlannerError::PlanValidation { message: "CommandNode has an empty decorator path".to_owned() });
            }
            if command.is_shell() {
                match command.args.get("command") {
                    Some(Value::String(s)) if !s.is_empty() => {}
                    _ => {
                        return Err(PlannerError::PlanValidation {
                            message: "`@shell` CommandNode must carry a non-empty `command` arg".to_owned(),
                        });
                    }
                }
            }
            if !block.is_empty() {
                validate_steps(block)?;
            }
            Ok(())
        }
        ExecutionNode::PipelineNode(members) => {
            if members.len() < 2 {
                return Err(PlannerError::PlanValidation {
                    message: "PipelineNode must have at least two members".to_owned(),
                });
            }
            members.iter().try_for_each(validate_node)
        }
        ExecutionNode::SequenceNode(members) => {
            if members.is_empty() {
                return Err(PlannerError::PlanValidation { message: "SequenceNode must not be empty".to_owned() });
            }
            members.iter().try_for_each(validate_node)
        }
        ExecutionNode::AndNode(left, right) | ExecutionNode::OrNode(left, right) => {
            validate_node(left)?;
            validate_node(right)
        }
        ExecutionNode::LogicNode { steps, .. } => {
            if steps.is_empty() {
                // A fully-pruned branch legitimately produces no steps
                // (GLOSSARY "LogicNode ... may be empty to preserve display
                // structure"); nothing further to validate.
                return Ok(());
            }
            validate_steps(steps)
        }
    }
}
