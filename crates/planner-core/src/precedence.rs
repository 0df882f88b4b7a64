//! Plan materialization and the shell operator-precedence parser (spec
//! §4.7).
//!
//! Turns a resolved block's flat statement list into an ordered `Vec<Step>`
//! of `ExecutionNode` trees, grouping runs of chained shell commands by
//! `|` > `&&` > `||` > `;` precedence. Grounded on `expressions.rs`'s
//! precedence-climbing binary-operator evaluator, retargeted from Python's
//! arithmetic operators to this crate's shell operators — same "split at the
//! lowest-precedence boundary first, recurse into each side" shape, except
//! here the result is a tree to keep rather than a value to return.
//!
//! By the time a block reaches this module the resolver (`crate::resolver`)
//! has already folded every command argument down to `ExprIr::Literal` and
//! recorded which `If`/`When` branch and `For` iterations were taken, so
//! none of this needs the vault, the decorator registry, or a scope — it is
//! a pure structural transform over already-resolved IR.

use std::collections::BTreeMap;

use crate::error::{EventPosition, PlannerError, PlannerResult};
use crate::ir::{BlockerIr, BlockerKind, CommandStmtIr, ExprIr, ShellOperator, StatementIr, TryIr, Value};
use crate::plan::{Command, ExecutionNode, Step};

/// Materializes a resolved block (top-level statements, or a called
/// function's resolved body) into its plan Steps, numbered from 1 in
/// document order.
///
/// # Errors
/// `PlannerError::StructuralIr` if a command argument was not folded to a
/// literal by the resolver (a resolver bug, never a user-facing outcome of a
/// successfully resolved graph).
pub fn materialize(stmts: &[StatementIr]) -> PlannerResult<Vec<Step>> {
    let mut steps = Vec::new();
    let mut next_id = 1u32;
    push_block(stmts, &mut steps, &mut next_id)?;
    Ok(steps)
}

fn push_block(stmts: &[StatementIr], steps: &mut Vec<Step>, next_id: &mut u32) -> PlannerResult<()> {
    let mut i = 0;
    while i < stmts.len() {
        match &stmts[i] {
            // VarDecl contributes no plan node of its own: its only effect
            // was binding a value in the vault, already consumed by any
            // command argument that referenced it (spec §8 S3: the `var`
            // statement produces no Step).
            StatementIr::VarDecl(_) => i += 1,
            StatementIr::Command(_) => {
                let end = command_run_end(stmts, i);
                let run = collect_run(&stmts[i..end]);
                let tree = build_command_tree(run)?;
                steps.push(Step { id: *next_id, tree });
                *next_id += 1;
                i = end;
            }
            StatementIr::Blocker(blocker) => {
                let tree = materialize_blocker(blocker)?;
                steps.push(Step { id: *next_id, tree });
                *next_id += 1;
                i += 1;
            }
            StatementIr::Try(try_ir) => {
                let tree = materialize_try(try_ir)?;
                steps.push(Step { id: *next_id, tree });
                *next_id += 1;
                i += 1;
            }
            StatementIr::FunctionCall(call) => {
                // Transparent inlining (spec §4.5 "script mode: process
                // top-level statements ... including reachable functions
                // only if called"): the call's resolved body becomes part of
                // the surrounding plan in place, not a node of its own.
                push_block(&call.resolved_body, steps, next_id)?;
                i += 1;
            }
        }
    }
    Ok(())
}

/// End (exclusive) of the maximal run of `Command` statements starting at
/// `start`, chained by non-`None` `operator` fields. The run always
/// includes at least one statement (`start` itself).
fn command_run_end(stmts: &[StatementIr], start: usize) -> usize {
    let mut i = start;
    loop {
        let StatementIr::Command(command) = &stmts[i] else { return i };
        let chains_onward = command.operator.is_some() && matches!(stmts.get(i + 1), Some(StatementIr::Command(_)));
        i += 1;
        if !chains_onward {
            return i;
        }
    }
}

fn collect_run(run: &[StatementIr]) -> Vec<(&CommandStmtIr, Option<ShellOperator>)> {
    run.iter()
        .map(|stmt| match stmt {
            StatementIr::Command(command) => (command, command.operator),
            _ => unreachable!("command_run_end only ever includes Command statements"),
        })
        .collect()
}

/// Splits a chained command run at every boundary matching `op`, dropping
/// that boundary from the result (it has been consumed by this split); the
/// caller recurses into each group at the next precedence level. Always
/// yields at least one group, even when `op` never occurs.
fn split_on<'a>(
    items: Vec<(&'a CommandStmtIr, Option<ShellOperator>)>,
    op: ShellOperator,
) -> Vec<Vec<(&'a CommandStmtIr, Option<ShellOperator>)>> {
    let mut groups = Vec::new();
    let mut current = Vec::new();
    for (command, boundary) in items {
        let splits_here = boundary == Some(op);
        current.push((command, if splits_here { None } else { boundary }));
        if splits_here {
            groups.push(std::mem::take(&mut current));
        }
    }
    groups.push(current);
    groups
}

/// `;` is the lowest-precedence operator (spec §4.7, §9 Open Questions):
/// split on it first so a mixed chain terminates in one pass instead of the
/// historical infinite loop the spec's design notes warn about.
fn build_command_tree(items: Vec<(&CommandStmtIr, Option<ShellOperator>)>) -> PlannerResult<ExecutionNode> {
    let mut groups = split_on(items, ShellOperator::Semicolon).into_iter();
    let first = build_or_level(groups.next().expect("split_on always yields at least one group"))?;
    let rest: Vec<_> = groups.map(build_or_level).collect::<PlannerResult<_>>()?;
    if rest.is_empty() {
        Ok(first)
    } else {
        let mut nodes = Vec::with_capacity(rest.len() + 1);
        nodes.push(first);
        nodes.extend(rest);
        Ok(ExecutionNode::SequenceNode(nodes))
    }
}

/// `||` is left-associative and binds looser than `&&`.
fn build_or_level(items: Vec<(&CommandStmtIr, Option<ShellOperator>)>) -> PlannerResult<ExecutionNode> {
    let mut groups = split_on(items, ShellOperator::Or).into_iter();
    let mut acc = build_and_level(groups.next().expect("split_on always yields at least one group"))?;
    for group in groups {
        acc = ExecutionNode::OrNode(Box::new(acc), Box::new(build_and_level(group)?));
    }
    Ok(acc)
}

/// `&&` is left-associative and binds looser than `|`.
fn build_and_level(items: Vec<(&CommandStmtIr, Option<ShellOperator>)>) -> PlannerResult<ExecutionNode> {
    let mut groups = split_on(items, ShellOperator::And).into_iter();
    let mut acc = build_pipe_level(groups.next().expect("split_on always yields at least one group"))?;
    for group in groups {
        acc = ExecutionNode::AndNode(Box::new(acc), Box::new(build_pipe_level(group)?));
    }
    Ok(acc)
}

/// `|` is the highest-precedence operator: every command left in this group
/// is joined by pipes, so it groups left-to-right into one flat
/// `PipelineNode` rather than a binary chain (spec §4.7).
fn build_pipe_level(items: Vec<(&CommandStmtIr, Option<ShellOperator>)>) -> PlannerResult<ExecutionNode> {
    let mut nodes = Vec::with_capacity(items.len());
    for (command, _boundary) in items {
        nodes.push(build_command_node(command)?);
    }
    if nodes.len() == 1 {
        Ok(nodes.into_iter().next().expect("checked len == 1"))
    } else {
        Ok(ExecutionNode::PipelineNode(nodes))
    }
}

fn build_command_node(command: &CommandStmtIr) -> PlannerResult<ExecutionNode> {
    let mut args = BTreeMap::new();
    for (name, expr) in &command.decorator.args {
        args.insert(name.clone(), literal_value(expr)?);
    }
    let redirect = match &command.redirect {
        Some((mode, target)) => Some((*mode, literal_value(target)?)),
        None => None,
    };
    let plan_command = Command { path: command.decorator.path(), args, redirect };
    let block = match &command.block {
        Some(body) => materialize(body)?,
        None => Vec::new(),
    };
    Ok(ExecutionNode::CommandNode { command: plan_command, block })
}

fn literal_value(expr: &ExprIr) -> PlannerResult<Value> {
    match expr {
        ExprIr::Literal(value) => Ok(value.clone()),
        other => Err(PlannerError::StructuralIr {
            message: format!("command argument reached materialization unresolved: {other:?}"),
            position: EventPosition { index: 0, total: 0 },
        }),
    }
}

fn materialize_blocker(blocker: &BlockerIr) -> PlannerResult<ExecutionNode> {
    match blocker.kind {
        BlockerKind::If => {
            let taken = blocker.taken.unwrap_or(false);
            let branch = if taken { &blocker.then_branch } else { &blocker.else_branch };
            let steps = if branch.is_empty() { Vec::new() } else { materialize(branch)? };
            Ok(ExecutionNode::LogicNode { taken: Some(taken), steps })
        }
        BlockerKind::When => {
            let taken = blocker.taken.unwrap_or(false);
            let steps = match blocker.matched_arm {
                Some(index) => materialize(&blocker.arms[index].body)?,
                None => Vec::new(),
            };
            Ok(ExecutionNode::LogicNode { taken: Some(taken), steps })
        }
        BlockerKind::For => {
            // No single taken/not-taken flag applies to a loop (spec §3
            // BlockerIr: "Taken ... never set for For"); each iteration's
            // body contributes its own steps to one shared, continuously
            // numbered list (spec §8 S4: three iterations, three Steps).
            let mut steps = Vec::new();
            let mut next_id = 1u32;
            for iteration in &blocker.iterations {
                push_block(&iteration.body, &mut steps, &mut next_id)?;
            }
            Ok(ExecutionNode::LogicNode { taken: None, steps })
        }
    }
}

/// `try`/`catch`/`finally` are all materialized unconditionally, mirroring
/// the resolver's conservative choice to resolve every section of a `Try`
/// (spec §9 Open Questions); there is no `Taken` flag for `Try`.
fn materialize_try(try_ir: &TryIr) -> PlannerResult<ExecutionNode> {
    let mut steps = Vec::new();
    let mut next_id = 1u32;
    push_block(&try_ir.try_body, &mut steps, &mut next_id)?;
    push_block(&try_ir.catch_body, &mut steps, &mut next_id)?;
    push_block(&try_ir.finally_body, &mut steps, &mut next_id)?;
    Ok(ExecutionNode::LogicNode { taken: None, steps })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DecoratorRef, RedirectMode, Value};
    use smallvec::smallvec;

    fn shell(text: &str, operator: Option<ShellOperator>) -> StatementIr {
        StatementIr::Command(CommandStmtIr {
            decorator: DecoratorRef {
                name: "shell".to_owned(),
                selector: None,
                args: smallvec![("command".to_owned(), ExprIr::Literal(Value::String(text.to_owned())))],
            },
            block: None,
            operator,
            redirect: None,
        })
    }

    fn shell_path(node: &ExecutionNode) -> &str {
        match node {
            ExecutionNode::CommandNode { command, .. } => command.path.as_str(),
            other => panic!("expected CommandNode, got {other:?}"),
        }
    }

    fn command_text(node: &ExecutionNode) -> &str {
        match node {
            ExecutionNode::CommandNode { command, .. } => match command.args.get("command") {
                Some(Value::String(s)) => s.as_str(),
                other => panic!("expected a `command` string arg, got {other:?}"),
            },
            other => panic!("expected CommandNode, got {other:?}"),
        }
    }

    #[test]
    fn single_command_is_one_step_no_wrapper() {
        let stmts = vec![shell("echo hi", None)];
        let steps = materialize(&stmts).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].id, 1);
        assert_eq!(shell_path(&steps[0].tree), "@shell");
    }

    /// `echo a | grep a && echo b | grep b || echo fallback` (spec §8 S5)
    /// must materialize as one Step whose tree is
    /// `OrNode(AndNode(Pipeline[a,a], Pipeline[b,b]), fallback)`.
    #[test]
    fn full_precedence_chain_matches_spec_s5() {
        let stmts = vec![
            shell("echo a", Some(ShellOperator::Pipe)),
            shell("grep a", Some(ShellOperator::And)),
            shell("echo b", Some(ShellOperator::Pipe)),
            shell("grep b", Some(ShellOperator::Or)),
            shell("echo fallback", None),
        ];
        let steps = materialize(&stmts).unwrap();
        assert_eq!(steps.len(), 1, "the whole chain is one Step");
        match &steps[0].tree {
            ExecutionNode::OrNode(left, right) => {
                assert_eq!(command_text(right), "echo fallback");
                match left.as_ref() {
                    ExecutionNode::AndNode(pipe_a, pipe_b) => {
                        match pipe_a.as_ref() {
                            ExecutionNode::PipelineNode(members) => {
                                assert_eq!(members.len(), 2);
                                assert_eq!(command_text(&members[0]), "echo a");
                                assert_eq!(command_text(&members[1]), "grep a");
                            }
                            other => panic!("expected PipelineNode, got {other:?}"),
                        }
                        match pipe_b.as_ref() {
                            ExecutionNode::PipelineNode(members) => {
                                assert_eq!(command_text(&members[0]), "echo b");
                                assert_eq!(command_text(&members[1]), "grep b");
                            }
                            other => panic!("expected PipelineNode, got {other:?}"),
                        }
                    }
                    other => panic!("expected AndNode, got {other:?}"),
                }
            }
            other => panic!("expected OrNode, got {other:?}"),
        }
    }

    #[test]
    fn semicolon_chain_builds_sequence_node() {
        let stmts = vec![shell("echo a", Some(ShellOperator::Semicolon)), shell("echo b", None)];
        let steps = materialize(&stmts).unwrap();
        assert_eq!(steps.len(), 1);
        match &steps[0].tree {
            ExecutionNode::SequenceNode(members) => assert_eq!(members.len(), 2),
            other => panic!("expected SequenceNode, got {other:?}"),
        }
    }

    #[test]
    fn var_decl_and_pruned_else_contribute_no_steps() {
        let stmts = vec![
            StatementIr::VarDecl(crate::ir::VarDeclIr { name: "X".to_owned(), expr_id: Some(crate::exprid::ExprId::from_raw("x")), value: ExprIr::Literal(Value::Int(1)) }),
            StatementIr::Blocker(BlockerIr {
                kind: BlockerKind::If,
                condition: Some(ExprIr::Literal(Value::Bool(true))),
                loop_var: None,
                collection: None,
                then_branch: vec![shell("echo yes", None)],
                else_branch: vec![],
                arms: vec![],
                taken: Some(true),
                iterations: vec![],
                matched_arm: None,
            }),
        ];
        let steps = materialize(&stmts).unwrap();
        assert_eq!(steps.len(), 1, "the VarDecl contributes no Step of its own");
        match &steps[0].tree {
            ExecutionNode::LogicNode { taken, steps } => {
                assert_eq!(*taken, Some(true));
                assert_eq!(steps.len(), 1);
            }
            other => panic!("expected LogicNode, got {other:?}"),
        }
    }

    /// `echo hi > out.txt` (spec §4.2) must still carry its redirect once
    /// materialized, not just during resolution.
    #[test]
    fn redirect_survives_into_materialized_command() {
        let stmts = vec![StatementIr::Command(CommandStmtIr {
            decorator: DecoratorRef {
                name: "shell".to_owned(),
                selector: None,
                args: smallvec![("command".to_owned(), ExprIr::Literal(Value::String("echo hi".to_owned())))],
            },
            block: None,
            operator: None,
            redirect: Some((RedirectMode::Truncate, ExprIr::Literal(Value::String("out.txt".to_owned())))),
        })];
        let steps = materialize(&stmts).unwrap();
        match &steps[0].tree {
            ExecutionNode::CommandNode { command, .. } => {
                assert_eq!(command.redirect, Some((RedirectMode::Truncate, Value::String("out.txt".to_owned()))));
            }
            other => panic!("expected CommandNode, got {other:?}"),
        }
    }

    #[test]
    fn unfolded_literal_is_a_structural_error() {
        let stmts = vec![StatementIr::Command(CommandStmtIr {
            decorator: DecoratorRef { name: "shell".to_owned(), selector: None, args: smallvec![("command".to_owned(), ExprIr::VarRef("X".to_owned()))] },
            block: None,
            operator: None,
            redirect: Some((RedirectMode::Truncate, ExprIr::Literal(Value::String("out.txt".to_owned())))),
        })];
        let err = materialize(&stmts).unwrap_err();
        assert!(matches!(err, PlannerError::StructuralIr { .. }));
    }
}
